//! crates/kids_learning_core/src/editor.rs
//!
//! The admin lesson editor: prefilled forms, and the save → upload → attach
//! → reload sequence run on submit.

use crate::catalog::LessonCatalog;
use crate::domain::{Lesson, LessonMedia, MediaUrls, QuizItem, Subject, DEFAULT_DIFFICULTY};
use crate::ports::{PortError, PortResult};
use crate::view::{AdminLessonRow, FormMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// The editor dialog's fields, as shown to the admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorForm {
    pub id: Option<String>,
    pub subject: Subject,
    pub lesson_title: String,
    pub content: String,
    pub difficulty: String,
    /// The quiz as pretty-printed JSON text.
    pub quiz: String,
}

/// The editor dialog's fields, as submitted.
#[derive(Debug, Clone, Deserialize)]
pub struct EditorSubmission {
    #[serde(default)]
    pub id: Option<String>,
    pub subject: Subject,
    #[serde(default)]
    pub lesson_title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub quiz: String,
    /// The subject selected in the admin grid, reloaded after a save.
    pub admin_subject: Subject,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditorOutcome {
    pub message: FormMessage,
    pub lesson_id: Option<String>,
    pub media: MediaUrls,
    /// The reloaded admin grid; absent when the submission failed.
    pub lessons: Option<Vec<AdminLessonRow>>,
}

impl EditorOutcome {
    fn failed(err: &PortError) -> Self {
        Self {
            message: FormMessage::error(err.to_string()),
            lesson_id: None,
            media: MediaUrls::default(),
            lessons: None,
        }
    }
}

pub struct LessonEditor {
    catalog: Arc<LessonCatalog>,
}

fn parse_quiz(raw: &str) -> PortResult<Vec<QuizItem>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| PortError::Invalid(format!("Quiz is not valid JSON: {}", e)))
}

impl LessonEditor {
    pub fn new(catalog: Arc<LessonCatalog>) -> Self {
        Self { catalog }
    }

    /// The admin grid for one subject.
    pub async fn load(&self, subject: Subject) -> PortResult<Vec<AdminLessonRow>> {
        let lessons = self.catalog.first_page(subject).await?;
        Ok(lessons.iter().map(AdminLessonRow::from).collect())
    }

    /// The editor prefilled from an existing lesson, or blank for a new one.
    pub fn open(&self, lesson: Option<&Lesson>, admin_subject: Subject) -> EditorForm {
        let quiz = lesson.map(|l| l.quiz.as_slice()).unwrap_or_default();
        EditorForm {
            id: lesson.and_then(|l| l.id.clone()),
            subject: lesson.map(|l| l.subject).unwrap_or(admin_subject),
            lesson_title: lesson.map(|l| l.lesson_title.clone()).unwrap_or_default(),
            content: lesson.map(|l| l.content.clone()).unwrap_or_default(),
            difficulty: lesson
                .map(|l| l.difficulty.clone())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
            quiz: serde_json::to_string_pretty(quiz).unwrap_or_else(|_| "[]".to_string()),
        }
    }

    /// Runs the whole submit sequence. The first failing step aborts the rest
    /// and its message is reported unchanged.
    pub async fn submit(&self, submission: &EditorSubmission, media: &LessonMedia) -> EditorOutcome {
        match self.run(submission, media).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("lesson save failed: {}", e);
                EditorOutcome::failed(&e)
            }
        }
    }

    async fn run(&self, submission: &EditorSubmission, media: &LessonMedia) -> PortResult<EditorOutcome> {
        let lesson_title = submission.lesson_title.trim();
        if lesson_title.is_empty() {
            return Err(PortError::Invalid("Lesson title is required".to_string()));
        }
        let quiz = parse_quiz(&submission.quiz)?;
        let difficulty = match submission.difficulty.trim() {
            "" => DEFAULT_DIFFICULTY.to_string(),
            other => other.to_string(),
        };

        let lesson = Lesson {
            id: submission.id.clone().filter(|id| !id.is_empty()),
            content: submission.content.trim().to_string(),
            difficulty,
            quiz,
            ..Lesson::new(submission.subject, lesson_title)
        };

        let lesson_id = self.catalog.save_lesson(&lesson).await?;
        let urls = self.catalog.upload_lesson_media(&lesson_id, media).await?;
        if !urls.is_empty() {
            self.catalog.attach_media(&lesson_id, &urls).await?;
        }
        info!(lesson_id = %lesson_id, "lesson saved from editor");

        let lessons = self.load(submission.admin_subject).await?;
        Ok(EditorOutcome {
            message: FormMessage::success("Saved"),
            lesson_id: Some(lesson_id),
            media: urls,
            lessons: Some(lessons),
        })
    }
}
