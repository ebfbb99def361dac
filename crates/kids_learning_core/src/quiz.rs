//! crates/kids_learning_core/src/quiz.rs
//!
//! Renders a lesson's quiz as single-choice groups and accepts submissions.
//!
//! Quiz items do not say which option is correct, so a submission is never
//! scored: every attempt is acknowledged as participation.

use crate::domain::Lesson;
use crate::events::{PageEvent, PageEvents};
use crate::view::FormMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    pub value: String,
    pub label: String,
}

/// One question rendered as a radio group named `q{index}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizFieldset {
    pub name: String,
    pub legend: String,
    pub options: Vec<QuizOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizForm {
    pub lesson_id: Option<String>,
    pub title: String,
    pub fieldsets: Vec<QuizFieldset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizSubmission {
    pub message: FormMessage,
    pub answered: usize,
    pub total: usize,
    /// Always `None` until quiz items designate a correct option.
    pub score: Option<u32>,
}

pub struct QuizPresenter;

impl QuizPresenter {
    pub fn render(lesson: &Lesson) -> QuizForm {
        let fieldsets = lesson
            .quiz
            .iter()
            .enumerate()
            .map(|(idx, item)| QuizFieldset {
                name: format!("q{}", idx),
                legend: format!("{}. {}", idx + 1, item.question),
                options: item
                    .options
                    .iter()
                    .enumerate()
                    .map(|(opt_idx, option)| QuizOption {
                        id: format!("q{}_o{}", idx, opt_idx),
                        value: option.clone(),
                        label: option.clone(),
                    })
                    .collect(),
            })
            .collect();

        QuizForm {
            lesson_id: lesson.id.clone(),
            title: format!("Quiz: {}", lesson.lesson_title),
            fieldsets,
        }
    }

    /// `selections` maps a group name (`q0`, `q1`, ...) to the chosen value.
    pub fn submit(form: &QuizForm, selections: &HashMap<String, String>) -> QuizSubmission {
        let answered = form
            .fieldsets
            .iter()
            .filter(|fieldset| {
                selections.get(&fieldset.name).is_some_and(|chosen| {
                    fieldset.options.iter().any(|option| &option.value == chosen)
                })
            })
            .count();

        QuizSubmission {
            message: FormMessage::success("Submitted!"),
            answered,
            total: form.fieldsets.len(),
            score: None,
        }
    }

    /// Starts listening for `open-quiz` events.
    pub fn bind(events: &PageEvents) -> QuizBinding {
        QuizBinding {
            receiver: events.subscribe(),
        }
    }
}

pub struct QuizBinding {
    receiver: broadcast::Receiver<PageEvent>,
}

impl QuizBinding {
    /// Waits for the next `open-quiz` event and renders its lesson.
    /// Returns `None` once the event bus is gone.
    pub async fn next_quiz(&mut self) -> Option<QuizForm> {
        loop {
            match self.receiver.recv().await {
                Ok(PageEvent::OpenQuiz { lesson }) => return Some(QuizPresenter::render(&lesson)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "quiz listener fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QuizItem, Subject};
    use crate::view::MessageKind;

    fn lesson() -> Lesson {
        let mut lesson = Lesson::new(Subject::Maths, "Counting");
        lesson.id = Some("L1".into());
        lesson.quiz = vec![
            QuizItem {
                question: "2 + 2?".into(),
                options: vec!["3".into(), "4".into()],
            },
            QuizItem {
                question: "1 + 2?".into(),
                options: vec!["3".into(), "4".into()],
            },
        ];
        lesson
    }

    #[test]
    fn renders_one_group_per_question() {
        let form = QuizPresenter::render(&lesson());
        assert_eq!(form.title, "Quiz: Counting");
        assert_eq!(form.fieldsets.len(), 2);
        assert_eq!(form.fieldsets[0].legend, "1. 2 + 2?");
        assert_eq!(form.fieldsets[1].name, "q1");
        assert_eq!(form.fieldsets[1].options[0].label, "3");
        // Same option text in two questions still yields distinct input ids.
        assert_ne!(form.fieldsets[0].options[0].id, form.fieldsets[1].options[0].id);
    }

    #[test]
    fn submission_is_participation_only_and_never_scored() {
        let form = QuizPresenter::render(&lesson());
        let wrong: HashMap<String, String> =
            [("q0".to_string(), "3".to_string())].into_iter().collect();
        let outcome = QuizPresenter::submit(&form, &wrong);

        // Incomplete feature: no option is marked correct, so nothing is graded.
        assert_eq!(outcome.message.text, "Submitted!");
        assert_eq!(outcome.message.kind, MessageKind::Success);
        assert_eq!(outcome.score, None);
        assert_eq!(outcome.answered, 1);
        assert_eq!(outcome.total, 2);

        let empty = QuizPresenter::submit(&form, &HashMap::new());
        assert_eq!(empty.message.text, "Submitted!");
        assert_eq!(empty.answered, 0);
    }

    #[test]
    fn lesson_without_quiz_renders_empty_form() {
        let form = QuizPresenter::render(&Lesson::new(Subject::General, "Colours"));
        assert!(form.fieldsets.is_empty());
    }

    #[tokio::test]
    async fn binding_renders_published_lessons() {
        let events = PageEvents::new();
        let mut binding = QuizPresenter::bind(&events);
        assert_eq!(events.publish(PageEvent::OpenQuiz { lesson: lesson() }), 1);
        let form = binding.next_quiz().await.unwrap();
        assert_eq!(form.lesson_id.as_deref(), Some("L1"));
    }
}
