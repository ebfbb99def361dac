//! crates/kids_learning_core/src/bootstrap.rs
//!
//! The page bootstrapper. A `Portal` is one browser's view of the site: it
//! owns that browser's session, catalog and local cache, dispatches page
//! identifiers to their initializers, and handles the generic buttons and
//! forms shared across pages.

use crate::cache::{CachePolicy, LocalCache};
use crate::catalog::{LessonCatalog, DEFAULT_PAGE_SIZE};
use crate::domain::{Credentials, Lesson, Role, SignUpRequest, Subject};
use crate::editor::LessonEditor;
use crate::events::{PageEvent, PageEvents};
use crate::ports::{Gateway, KeyValueStore, PortResult};
use crate::routing::{Access, Destination};
use crate::session::SessionManager;
use crate::view::{AdminLessonRow, CardAction, FormMessage, HomeView, LessonCard, StudentStats};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

//=========================================================================================
// Page identifiers
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageId {
    Home,
    Login,
    Signup,
    DashboardAdmin,
    DashboardStudent,
    Amharic,
    Reading,
    Maths,
    General,
}

impl PageId {
    /// Unrecognised identifiers yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let page = match raw {
            "home" => PageId::Home,
            "login" => PageId::Login,
            "signup" => PageId::Signup,
            "dashboard-admin" => PageId::DashboardAdmin,
            "dashboard-student" => PageId::DashboardStudent,
            "amharic" => PageId::Amharic,
            "reading" => PageId::Reading,
            "maths" => PageId::Maths,
            "general" => PageId::General,
            _ => return None,
        };
        Some(page)
    }

    pub fn subject(self) -> Option<Subject> {
        match self {
            PageId::Amharic => Some(Subject::Amharic),
            PageId::Reading => Some(Subject::Reading),
            PageId::Maths => Some(Subject::Maths),
            PageId::General => Some(Subject::General),
            _ => None,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageId::Home => "home",
            PageId::Login => "login",
            PageId::Signup => "signup",
            PageId::DashboardAdmin => "dashboard-admin",
            PageId::DashboardStudent => "dashboard-student",
            PageId::Amharic => "amharic",
            PageId::Reading => "reading",
            PageId::Maths => "maths",
            PageId::General => "general",
        };
        f.write_str(name)
    }
}

//=========================================================================================
// Page views and outcomes
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageBody {
    Home(HomeView),
    Login,
    Signup,
    AdminDashboard {
        subject: Subject,
        lessons: Vec<AdminLessonRow>,
    },
    StudentDashboard(StudentStats),
    Subject {
        subject: Subject,
        cards: Vec<LessonCard>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub page: PageId,
    /// Shown in every page footer.
    pub year: i32,
    pub body: PageBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Render(PageView),
    Redirect(Destination),
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Button {
    Login,
    Signup,
    Dashboard,
    GetStarted,
    Explore,
    Logout,
    ToSubjects,
}

/// What a login or signup form shows, and where it goes next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormResult {
    pub message: FormMessage,
    pub redirect: Option<Destination>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardOutcome {
    /// The lesson was started; play `audio_url` if there is one.
    Started {
        recorded: bool,
        audio_url: Option<String>,
    },
    /// An `open-quiz` event went out to `listeners` quiz bindings.
    QuizOpened { listeners: usize },
}

//=========================================================================================
// Portal
//=========================================================================================

#[derive(Debug, Clone, Copy)]
pub struct PortalSettings {
    pub cache_policy: CachePolicy,
    pub page_size: usize,
    /// The subject the admin grid starts on.
    pub admin_subject: Subject,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            cache_policy: CachePolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            admin_subject: Subject::Amharic,
        }
    }
}

pub struct Portal {
    session: SessionManager,
    catalog: Arc<LessonCatalog>,
    editor: LessonEditor,
    events: PageEvents,
    settings: PortalSettings,
}

impl Portal {
    pub fn new(gateway: Gateway, storage: Arc<dyn KeyValueStore>, settings: PortalSettings) -> Self {
        let cache = LocalCache::new(storage, settings.cache_policy);
        let session = SessionManager::new(
            gateway.identity.clone(),
            gateway.documents.clone(),
            cache.clone(),
        );
        let catalog = Arc::new(LessonCatalog::new(gateway, cache, settings.page_size));
        let editor = LessonEditor::new(catalog.clone());
        Self {
            session,
            catalog,
            editor,
            events: PageEvents::new(),
            settings,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn catalog(&self) -> &LessonCatalog {
        &self.catalog
    }

    pub fn editor(&self) -> &LessonEditor {
        &self.editor
    }

    pub fn events(&self) -> &PageEvents {
        &self.events
    }

    pub fn settings(&self) -> &PortalSettings {
        &self.settings
    }

    fn view(page: PageId, body: PageBody) -> PageOutcome {
        PageOutcome::Render(PageView {
            page,
            year: Utc::now().year(),
            body,
        })
    }

    /// Dispatches a page identifier to its initializer.
    pub async fn boot(&self, page: &str) -> PortResult<PageOutcome> {
        let Some(page) = PageId::parse(page) else {
            return Ok(PageOutcome::Ignored);
        };

        let body = match page {
            PageId::Home => PageBody::Home(HomeView {
                show_dashboard: self.session.current_user().is_some(),
            }),
            PageId::Login => PageBody::Login,
            PageId::Signup => PageBody::Signup,
            PageId::DashboardAdmin => {
                if let Access::Redirect(to) = self.session.require_role(Role::Admin).await? {
                    return Ok(PageOutcome::Redirect(to));
                }
                let subject = self.settings.admin_subject;
                PageBody::AdminDashboard {
                    subject,
                    lessons: self.editor.load(subject).await?,
                }
            }
            PageId::DashboardStudent => PageBody::StudentDashboard(self.student_stats().await?),
            PageId::Amharic | PageId::Reading | PageId::Maths | PageId::General => {
                let subject = page.subject().unwrap_or(Subject::General);
                let lessons = self.catalog.first_page(subject).await?;
                PageBody::Subject {
                    subject,
                    cards: lessons.iter().map(LessonCard::from).collect(),
                }
            }
        };

        Ok(Self::view(page, body))
    }

    async fn student_stats(&self) -> PortResult<StudentStats> {
        let Some(user) = self.session.current_user() else {
            return Ok(StudentStats::default());
        };
        let points = self
            .session
            .cached_profile()
            .map(|profile| profile.points)
            .unwrap_or(0);
        let completed = self
            .catalog
            .progress_for(&user.uid)
            .await?
            .iter()
            .filter(|record| record.completed)
            .count();

        let mut available = 0;
        for subject in Subject::ALL {
            available += self.catalog.first_page(subject).await?.len();
        }
        Ok(StudentStats::new(points, completed, available))
    }

    /// Handles the generic buttons. `None` means stay on the current page.
    pub async fn press(&self, button: Button) -> PortResult<Option<Destination>> {
        let destination = match button {
            Button::Login => Destination::Login,
            Button::Signup => Destination::Signup,
            Button::Dashboard => self.session.route_to_dashboard().await?,
            Button::GetStarted => {
                if self.session.current_user().is_some() {
                    self.session.route_to_dashboard().await?
                } else {
                    Destination::Signup
                }
            }
            Button::Explore | Button::ToSubjects => Destination::Subjects,
            Button::Logout => {
                self.session.sign_out().await?;
                return Ok(None);
            }
        };
        Ok(Some(destination))
    }

    async fn after_success(&self, text: &str) -> FormResult {
        let redirect = match self.session.route_to_dashboard().await {
            Ok(destination) => Some(destination),
            Err(e) => {
                error!("could not resolve dashboard: {}", e);
                None
            }
        };
        FormResult {
            message: FormMessage::success(text),
            redirect,
        }
    }

    pub async fn submit_login(&self, credentials: &Credentials) -> FormResult {
        let credentials = Credentials {
            email: credentials.email.trim().to_string(),
            password: credentials.password.clone(),
        };
        match self.session.sign_in(&credentials).await {
            Ok(_) => self.after_success("Success! Redirecting...").await,
            Err(e) => FormResult {
                message: FormMessage::error(e.to_string()),
                redirect: None,
            },
        }
    }

    pub async fn submit_signup(&self, request: &SignUpRequest) -> FormResult {
        let request = SignUpRequest {
            email: request.email.trim().to_string(),
            display_name: request.display_name.trim().to_string(),
            ..request.clone()
        };
        match self.session.sign_up(&request).await {
            Ok(_) => self.after_success("Account created! Redirecting...").await,
            Err(e) => FormResult {
                message: FormMessage::error(e.to_string()),
                redirect: None,
            },
        }
    }

    /// Handles a click on one of a lesson card's buttons.
    pub async fn card_action(&self, lesson: &Lesson, action: CardAction) -> PortResult<CardOutcome> {
        match action {
            CardAction::Start => {
                let recorded = match lesson.id.as_deref() {
                    Some(id) => self.catalog.mark_completed(id).await?.is_some(),
                    None => false,
                };
                info!(lesson = %lesson.lesson_title, recorded, "lesson started");
                Ok(CardOutcome::Started {
                    recorded,
                    audio_url: lesson.audio_url.clone(),
                })
            }
            CardAction::Quiz => {
                let listeners = self.events.publish(PageEvent::OpenQuiz {
                    lesson: lesson.clone(),
                });
                Ok(CardOutcome::QuizOpened { listeners })
            }
        }
    }
}
