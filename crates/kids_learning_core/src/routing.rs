//! crates/kids_learning_core/src/routing.rs
//!
//! The page lifecycle as an explicit state machine, free of any rendering
//! concern. Session events move the portal between states; each state knows
//! its dashboard and which role-gated pages it may enter.

use crate::domain::{Role, Subject};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalState {
    #[default]
    Unauthenticated,
    Student,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    SignedIn(Role),
    RoleResolved(Role),
    SignedOut,
}

/// Where a page flow sends the browser next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "page", content = "subject", rename_all = "snake_case")]
pub enum Destination {
    Home,
    Subjects,
    Login,
    Signup,
    StudentDashboard,
    AdminDashboard,
    Subject(Subject),
}

/// Outcome of a role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Redirect(Destination),
}

impl PortalState {
    fn for_role(role: Role) -> Self {
        match role {
            Role::Student => PortalState::Student,
            Role::Admin => PortalState::Admin,
        }
    }

    pub fn apply(self, transition: Transition) -> Self {
        match transition {
            Transition::SignedIn(role) | Transition::RoleResolved(role) => Self::for_role(role),
            Transition::SignedOut => PortalState::Unauthenticated,
        }
    }

    pub fn role(self) -> Option<Role> {
        match self {
            PortalState::Unauthenticated => None,
            PortalState::Student => Some(Role::Student),
            PortalState::Admin => Some(Role::Admin),
        }
    }

    pub fn dashboard(self) -> Destination {
        match self {
            PortalState::Unauthenticated => Destination::Login,
            PortalState::Student => Destination::StudentDashboard,
            PortalState::Admin => Destination::AdminDashboard,
        }
    }

    pub fn admit(self, expected: Role) -> Access {
        match (self.role(), expected) {
            (None, _) => Access::Redirect(Destination::Login),
            (Some(role), expected) if role == expected => Access::Granted,
            (Some(_), Role::Admin) => Access::Redirect(Destination::StudentDashboard),
            (Some(_), Role::Student) => Access::Redirect(Destination::AdminDashboard),
        }
    }
}

impl Destination {
    pub fn path(&self) -> String {
        match self {
            Destination::Home => "/pages/home".to_string(),
            Destination::Subjects => "/pages/home#subjects".to_string(),
            Destination::Login => "/pages/login".to_string(),
            Destination::Signup => "/pages/signup".to_string(),
            Destination::StudentDashboard => "/pages/dashboard-student".to_string(),
            Destination::AdminDashboard => "/pages/dashboard-admin".to_string(),
            Destination::Subject(subject) => {
                format!("/pages/{}", subject.as_str().to_lowercase())
            }
        }
    }
}
