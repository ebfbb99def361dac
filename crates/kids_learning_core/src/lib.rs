pub mod bootstrap;
pub mod cache;
pub mod catalog;
pub mod domain;
pub mod editor;
pub mod events;
pub mod memory;
pub mod ports;
pub mod quiz;
pub mod routing;
pub mod session;
pub mod view;

pub use bootstrap::{Button, CardOutcome, FormResult, PageBody, PageId, PageOutcome, PageView, Portal, PortalSettings};
pub use cache::{CachePolicy, LocalCache};
pub use catalog::{LessonCatalog, ListOptions};
pub use domain::{
    AuthUser, Credentials, Lesson, LessonMedia, MediaFile, MediaUrls, ProfileHints, ProgressRecord,
    QuizItem, Role, SignUpRequest, Subject, UserProfile,
};
pub use editor::{EditorForm, EditorOutcome, EditorSubmission, LessonEditor};
pub use events::{PageEvent, PageEvents};
pub use ports::{
    BlobStore, DocumentStore, Gateway, IdentityProvider, KeyValueStore, PortError, PortResult,
};
pub use quiz::{QuizForm, QuizPresenter, QuizSubmission};
pub use routing::{Access, Destination, PortalState};
pub use session::SessionManager;
