//! crates/kids_learning_core/src/view.rs
//!
//! Serializable view models handed to whatever renders the pages.

use crate::domain::{Lesson, Subject};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Success,
    Error,
}

/// The text shown in a form's message area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormMessage {
    pub text: String,
    pub kind: MessageKind,
}

impl FormMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: MessageKind::Success,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: MessageKind::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardAction {
    Start,
    Quiz,
}

/// A lesson as shown on a subject page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonCard {
    pub id: Option<String>,
    pub badge: Subject,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub actions: [CardAction; 2],
}

impl From<&Lesson> for LessonCard {
    fn from(lesson: &Lesson) -> Self {
        Self {
            id: lesson.id.clone(),
            badge: lesson.subject,
            title: lesson.lesson_title.clone(),
            content: lesson.content.clone(),
            image_url: lesson.image_url.clone(),
            audio_url: lesson.audio_url.clone(),
            actions: [CardAction::Start, CardAction::Quiz],
        }
    }
}

/// A lesson as listed in the admin grid, with its edit action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminLessonRow {
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    pub edit_path: Option<String>,
}

impl From<&Lesson> for AdminLessonRow {
    fn from(lesson: &Lesson) -> Self {
        Self {
            id: lesson.id.clone(),
            title: lesson.lesson_title.clone(),
            content: lesson.content.clone(),
            edit_path: lesson.id.as_ref().map(|id| {
                format!("/admin/lessons/editor?subject={}&id={}", lesson.subject, id)
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HomeView {
    /// The dashboard buttons are only shown to signed-in visitors.
    pub show_dashboard: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StudentStats {
    pub points: u32,
    pub stars: u32,
    pub badges: u32,
    pub progress_percent: u8,
}

impl StudentStats {
    pub fn new(points: u32, completed: usize, available: usize) -> Self {
        let progress_percent = if available == 0 {
            0
        } else {
            ((completed.min(available) * 100) / available) as u8
        };
        Self {
            points,
            stars: completed as u32,
            badges: 0,
            progress_percent,
        }
    }
}
