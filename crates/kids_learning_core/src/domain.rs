//! crates/kids_learning_core/src/domain.rs
//!
//! Defines the core data structures for the portal.
//! Documents are stored by the hosted backend as JSON, so every type here
//! carries its camelCase wire shape via serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Identity
//=========================================================================================

/// The identity handle for a signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Email/password pair used for sign-in.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Everything the signup form collects.
#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub age: u32,
}

/// Hints used when a default profile has to be created.
#[derive(Debug, Clone, Default)]
pub struct ProfileHints {
    pub display_name: Option<String>,
}

//=========================================================================================
// Profiles and roles
//=========================================================================================

/// Access tier gating which dashboard and actions a user may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Admin,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One profile document per user, keyed by uid in the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Role,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub avatar_url: String,
    /// Absent on profiles written by hand in the backend console.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// The profile written for a user signing in for the first time.
    pub fn new_student(uid: &str, hints: &ProfileHints, now: DateTime<Utc>) -> Self {
        let display_name = hints
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("Student")
            .to_string();
        Self {
            uid: uid.to_string(),
            display_name,
            role: Role::Student,
            points: 0,
            avatar_url: String::new(),
            created_at: Some(now),
        }
    }
}

/// Missing or unrecognised role strings fall back to `student`.
fn lenient_role<'de, D>(deserializer: D) -> Result<Role, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| match s.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                tracing::warn!("{}; treating as student", e);
                None
            }
        })
        .unwrap_or_default())
}

//=========================================================================================
// Lessons
//=========================================================================================

/// The four fixed subjects of the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    Amharic,
    Reading,
    Maths,
    General,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown subject '{0}'")]
pub struct UnknownSubject(pub String);

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Amharic,
        Subject::Reading,
        Subject::Maths,
        Subject::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Amharic => "Amharic",
            Subject::Reading => "Reading",
            Subject::Maths => "Maths",
            Subject::General => "General",
        }
    }
}

impl FromStr for Subject {
    type Err = UnknownSubject;

    /// Accepts both the display name and the lowercase page slug.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subject::ALL
            .into_iter()
            .find(|subject| subject.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownSubject(s.to_string()))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single quiz question. No option is marked as correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

pub const DEFAULT_DIFFICULTY: &str = "Easy";

fn default_difficulty() -> String {
    DEFAULT_DIFFICULTY.to_string()
}

/// A lesson document. `id` is assigned by the document store and is never
/// written into the document body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub subject: Subject,
    pub lesson_title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub quiz: Vec<QuizItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Lesson {
    pub fn new(subject: Subject, lesson_title: impl Into<String>) -> Self {
        Self {
            id: None,
            subject,
            lesson_title: lesson_title.into(),
            content: String::new(),
            difficulty: default_difficulty(),
            quiz: Vec::new(),
            image_url: None,
            audio_url: None,
            created_at: None,
            updated_at: None,
        }
    }
}

//=========================================================================================
// Media
//=========================================================================================

/// A file picked in the editor form.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub name: String,
    pub bytes: bytes::Bytes,
    pub content_type: Option<String>,
}

/// The optional image and audio attachments of one editor submission.
#[derive(Debug, Clone, Default)]
pub struct LessonMedia {
    pub image: Option<MediaFile>,
    pub audio: Option<MediaFile>,
}

/// URLs for the media that was actually uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl MediaUrls {
    pub fn is_empty(&self) -> bool {
        self.image_url.is_none() && self.audio_url.is_none()
    }
}

//=========================================================================================
// Progress
//=========================================================================================

/// Per-user, per-lesson completion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub uid: String,
    pub lesson_id: String,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// The composite natural key used as the document id.
    pub fn key(uid: &str, lesson_id: &str) -> String {
        format!("{}_{}", uid, lesson_id)
    }
}
