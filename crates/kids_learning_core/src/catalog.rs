//! crates/kids_learning_core/src/catalog.rs
//!
//! The lesson catalog: cache-first listing per subject, lesson saves, media
//! uploads and per-user completion records.

use crate::cache::{lessons_key, LocalCache, LESSONS_PREFIX};
use crate::domain::{Lesson, LessonMedia, MediaFile, MediaUrls, ProgressRecord, Subject};
use crate::ports::{
    from_document, to_document, DocumentData, Direction, Gateway, PortError, PortResult, Query,
    SetMode, Snapshot,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const LESSONS_COLLECTION: &str = "lessons";
pub const PROGRESS_COLLECTION: &str = "progress";
pub const DEFAULT_PAGE_SIZE: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub page_size: usize,
    /// `createdAt` of the last lesson on the previous page.
    pub cursor: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cursor: None,
        }
    }
}

pub struct LessonCatalog {
    gateway: Gateway,
    cache: LocalCache,
    page_size: usize,
}

/// Lesson timestamps are written as millisecond RFC3339 strings, the same
/// shape as lessons already in the store, so string order matches time order.
pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn lesson_from_snapshot(snapshot: Snapshot) -> PortResult<Lesson> {
    let mut lesson: Lesson = from_document(snapshot.data)?;
    lesson.id = Some(snapshot.id);
    Ok(lesson)
}

/// The cursor that continues a listing after the given page.
pub fn next_cursor(page: &[Lesson]) -> Option<String> {
    page.last()
        .and_then(|lesson| lesson.created_at)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl LessonCatalog {
    pub fn new(gateway: Gateway, cache: LocalCache, page_size: usize) -> Self {
        Self {
            gateway,
            cache,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Lists one page of a subject's lessons, newest first.
    ///
    /// A cached page is returned as-is: `page_size` and the entry's age are
    /// ignored on a hit. Pages are cached per (subject, cursor).
    pub async fn list_lessons(&self, subject: Subject, options: &ListOptions) -> PortResult<Vec<Lesson>> {
        let key = lessons_key(subject.as_str(), options.cursor.as_deref());
        if let Some(cached) = self.cache.get::<Vec<Lesson>>(&key) {
            return Ok(cached);
        }

        let query = Query::collection(LESSONS_COLLECTION)
            .where_eq("subject", subject.as_str())
            .order_by("createdAt", Direction::Descending)
            .limit(options.page_size.max(1))
            .start_after(options.cursor.clone().map(Value::String));

        let snapshots = self.gateway.documents.query(&query).await?;
        let mut lessons = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let id = snapshot.id.clone();
            match lesson_from_snapshot(snapshot) {
                Ok(lesson) => lessons.push(lesson),
                Err(e) => warn!(lesson_id = %id, "skipping unreadable lesson: {}", e),
            }
        }

        debug!(%subject, count = lessons.len(), "lessons fetched");
        self.cache.put(&key, &lessons);
        Ok(lessons)
    }

    /// The first page of a subject with the configured page size.
    pub async fn first_page(&self, subject: Subject) -> PortResult<Vec<Lesson>> {
        let options = ListOptions {
            page_size: self.page_size,
            cursor: None,
        };
        self.list_lessons(subject, &options).await
    }

    /// Loads one lesson of the subject by id, whichever page it lists on.
    /// Always read from the store, never from cached pages.
    pub async fn find_lesson(&self, subject: Subject, id: &str) -> PortResult<Lesson> {
        let not_found = || PortError::NotFound(format!("lesson {}", id));
        let data = self
            .gateway
            .documents
            .get(LESSONS_COLLECTION, id)
            .await?
            .ok_or_else(not_found)?;
        let lesson = lesson_from_snapshot(Snapshot {
            id: id.to_string(),
            data,
        })?;
        if lesson.subject != subject {
            debug!(lesson_id = id, %subject, actual = %lesson.subject, "lesson belongs to another subject");
            return Err(not_found());
        }
        Ok(lesson)
    }

    /// Updates the lesson in place when it has an id, otherwise inserts it.
    /// Returns the effective id.
    pub async fn save_lesson(&self, lesson: &Lesson) -> PortResult<String> {
        let now = Utc::now();
        let mut body = to_document(lesson)?;
        body.remove("id");
        if let Some(created_at) = lesson.created_at {
            body.insert("createdAt".to_string(), timestamp(created_at));
        }

        let id = match lesson.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => {
                body.insert("updatedAt".to_string(), timestamp(now));
                self.gateway
                    .documents
                    .update(LESSONS_COLLECTION, id, body)
                    .await?;
                info!(lesson_id = id, "lesson updated");
                id.to_string()
            }
            None => {
                body.insert("createdAt".to_string(), timestamp(now));
                let id = self.gateway.documents.add(LESSONS_COLLECTION, body).await?;
                info!(lesson_id = %id, "lesson created");
                id
            }
        };

        // A lesson may have moved between subjects, so every cached page goes.
        self.cache.clear_prefix(LESSONS_PREFIX);
        Ok(id)
    }

    async fn upload_one(&self, folder: &str, lesson_id: &str, file: &MediaFile) -> PortResult<String> {
        let path = format!("{}/{}_{}", folder, lesson_id, file.name);
        let handle = self
            .gateway
            .blobs
            .upload(&path, file.bytes.clone(), file.content_type.as_deref())
            .await?;
        let url = self.gateway.blobs.resolve_url(&handle).await?;
        debug!(%path, "media uploaded");
        Ok(url)
    }

    /// Uploads whichever of the image and audio files were supplied.
    /// Only supplied files produce URLs.
    pub async fn upload_lesson_media(&self, lesson_id: &str, media: &LessonMedia) -> PortResult<MediaUrls> {
        let mut urls = MediaUrls::default();
        if let Some(image) = &media.image {
            urls.image_url = Some(self.upload_one("lesson_images", lesson_id, image).await?);
        }
        if let Some(audio) = &media.audio {
            urls.audio_url = Some(self.upload_one("lesson_audio", lesson_id, audio).await?);
        }
        Ok(urls)
    }

    /// Writes the uploaded media URLs onto an existing lesson.
    pub async fn attach_media(&self, lesson_id: &str, urls: &MediaUrls) -> PortResult<()> {
        let mut partial: DocumentData = to_document(urls)?;
        partial.insert("updatedAt".to_string(), timestamp(Utc::now()));
        self.gateway
            .documents
            .update(LESSONS_COLLECTION, lesson_id, partial)
            .await?;
        self.cache.clear_prefix(LESSONS_PREFIX);
        Ok(())
    }

    /// Marks the lesson completed for the signed-in user.
    /// Without a signed-in user this silently does nothing.
    pub async fn mark_completed(&self, lesson_id: &str) -> PortResult<Option<ProgressRecord>> {
        let Some(user) = self.gateway.identity.current_user() else {
            debug!(lesson_id, "no signed-in user; completion not recorded");
            return Ok(None);
        };

        let record = ProgressRecord {
            uid: user.uid.clone(),
            lesson_id: lesson_id.to_string(),
            completed: true,
            updated_at: Utc::now(),
        };
        self.gateway
            .documents
            .set(
                PROGRESS_COLLECTION,
                &ProgressRecord::key(&user.uid, lesson_id),
                to_document(&record)?,
                SetMode::Merge,
            )
            .await?;
        Ok(Some(record))
    }

    /// All progress records of one user.
    pub async fn progress_for(&self, uid: &str) -> PortResult<Vec<ProgressRecord>> {
        let query = Query::collection(PROGRESS_COLLECTION).where_eq("uid", uid);
        self.gateway
            .documents
            .query(&query)
            .await?
            .into_iter()
            .map(|snapshot| from_document(snapshot.data))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::memory::{
        MemoryAccounts, MemoryBlobStore, MemoryDocumentStore, MemoryIdentityProvider,
        MemoryKeyValueStore,
    };
    use crate::ports::{DocumentStore, IdentityProvider};
    use bytes::Bytes;
    use std::sync::Arc;

    struct Fixture {
        identity: Arc<MemoryIdentityProvider>,
        docs: Arc<MemoryDocumentStore>,
        blobs: Arc<MemoryBlobStore>,
        catalog: LessonCatalog,
    }

    fn fixture() -> Fixture {
        let identity = Arc::new(MemoryIdentityProvider::new(MemoryAccounts::new()));
        let docs = Arc::new(MemoryDocumentStore::new());
        let blobs = Arc::new(MemoryBlobStore::new("https://cdn.test"));
        let gateway = Gateway::new(identity.clone(), docs.clone(), blobs.clone());
        let cache = LocalCache::new(Arc::new(MemoryKeyValueStore::new()), CachePolicy::default());
        Fixture {
            identity,
            docs,
            blobs,
            catalog: LessonCatalog::new(gateway, cache, DEFAULT_PAGE_SIZE),
        }
    }

    fn file(name: &str) -> MediaFile {
        MediaFile {
            name: name.to_string(),
            bytes: Bytes::from_static(b"data"),
            content_type: None,
        }
    }

    #[tokio::test]
    async fn listing_is_served_from_cache_until_a_save() {
        let f = fixture();
        f.catalog.save_lesson(&Lesson::new(Subject::Maths, "Counting")).await.unwrap();

        let first = f.catalog.first_page(Subject::Maths).await.unwrap();
        assert_eq!(first.len(), 1);

        // Written behind the catalog's back: the cached page stays.
        let mut shapes = to_document(&Lesson::new(Subject::Maths, "Shapes")).unwrap();
        shapes.insert("createdAt".to_string(), timestamp(Utc::now()));
        f.docs.add(LESSONS_COLLECTION, shapes).await.unwrap();
        let reads = f.docs.reads();
        let second = f.catalog.first_page(Subject::Maths).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.docs.reads(), reads);

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        f.catalog.save_lesson(&Lesson::new(Subject::Maths, "Adding")).await.unwrap();
        let third = f.catalog.first_page(Subject::Maths).await.unwrap();
        assert_eq!(third.len(), 3);
        assert_eq!(third[0].lesson_title, "Adding");
    }

    #[tokio::test]
    async fn cached_page_ignores_page_size() {
        let f = fixture();
        for title in ["a", "b", "c"] {
            f.catalog.save_lesson(&Lesson::new(Subject::Reading, title)).await.unwrap();
        }
        let all = f.catalog.first_page(Subject::Reading).await.unwrap();
        assert_eq!(all.len(), 3);

        let small = ListOptions { page_size: 1, cursor: None };
        assert_eq!(f.catalog.list_lessons(Subject::Reading, &small).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cursor_pages_are_cached_separately() {
        let f = fixture();
        let mut ids = Vec::new();
        for title in ["one", "two", "three"] {
            ids.push(f.catalog.save_lesson(&Lesson::new(Subject::General, title)).await.unwrap());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let page = ListOptions { page_size: 2, cursor: None };
        let first = f.catalog.list_lessons(Subject::General, &page).await.unwrap();
        assert_eq!(first.len(), 2);

        let page = ListOptions { page_size: 2, cursor: next_cursor(&first) };
        let second = f.catalog.list_lessons(Subject::General, &page).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].lesson_title, "one");
    }

    #[tokio::test]
    async fn lessons_past_the_first_page_can_be_found() {
        let f = fixture();
        let mut ids = Vec::new();
        for title in ["one", "two", "three"] {
            ids.push(f.catalog.save_lesson(&Lesson::new(Subject::Maths, title)).await.unwrap());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let page = ListOptions { page_size: 2, cursor: None };
        let first = f.catalog.list_lessons(Subject::Maths, &page).await.unwrap();
        let page = ListOptions { page_size: 2, cursor: next_cursor(&first) };
        let second = f.catalog.list_lessons(Subject::Maths, &page).await.unwrap();
        let listed = second[0].id.clone().unwrap();
        assert_eq!(listed, ids[0]);

        let found = f.catalog.find_lesson(Subject::Maths, &listed).await.unwrap();
        assert_eq!(found.lesson_title, "one");
        assert_eq!(found.id.as_deref(), Some(listed.as_str()));
    }

    #[tokio::test]
    async fn find_lesson_rejects_unknown_ids_and_other_subjects() {
        let f = fixture();
        let id = f.catalog.save_lesson(&Lesson::new(Subject::Reading, "Letters")).await.unwrap();

        let err = f.catalog.find_lesson(Subject::Reading, "missing").await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        let err = f.catalog.find_lesson(Subject::Maths, &id).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn media_paths_are_namespaced_by_lesson() {
        let f = fixture();
        let media = LessonMedia {
            image: Some(file("cat.png")),
            audio: None,
        };
        let urls = f.catalog.upload_lesson_media("L1", &media).await.unwrap();
        assert_eq!(urls.image_url.as_deref(), Some("https://cdn.test/lesson_images/L1_cat.png"));
        assert!(urls.audio_url.is_none());
        assert!(f.blobs.contains("lesson_images/L1_cat.png"));

        let none = f.catalog.upload_lesson_media("L1", &LessonMedia::default()).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn mark_completed_is_idempotent_and_skips_anonymous() {
        let f = fixture();
        assert!(f.catalog.mark_completed("L1").await.unwrap().is_none());
        assert_eq!(f.docs.writes(), 0);

        let user = f.identity.create_account("kid@school.et", "secret1").await.unwrap();
        f.catalog.mark_completed("L1").await.unwrap();
        f.catalog.mark_completed("L1").await.unwrap();

        assert_eq!(f.docs.count(PROGRESS_COLLECTION), 1);
        let stored = f
            .docs
            .peek(PROGRESS_COLLECTION, &ProgressRecord::key(&user.uid, "L1"))
            .unwrap();
        assert_eq!(stored["completed"], Value::Bool(true));

        let progress = f.catalog.progress_for(&user.uid).await.unwrap();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].lesson_id, "L1");

        f.identity.sign_out().await.unwrap();
        f.identity.sign_in("kid@school.et", "secret1").await.unwrap();
        assert!(f.catalog.mark_completed("L2").await.unwrap().is_some());
        assert_eq!(f.docs.count(PROGRESS_COLLECTION), 2);
    }

    #[test]
    fn timestamps_use_millisecond_precision() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:20:30.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(at), Value::String("2024-05-01T10:20:30.123Z".into()));
    }

    #[tokio::test]
    async fn updating_an_unknown_lesson_fails() {
        let f = fixture();
        let lesson = Lesson {
            id: Some("missing".into()),
            ..Lesson::new(Subject::Maths, "Ghost")
        };
        let err = f.catalog.save_lesson(&lesson).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }
}
