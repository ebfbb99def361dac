pub mod firebase;

pub use firebase::{FirebaseBackend, FirebaseSettings};
