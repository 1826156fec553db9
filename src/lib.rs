//! Photo triage engine.
//!
//! Indexes a photo library by month and by collection, records keep/delete
//! decisions per photo, and keeps both in step with a library that can change
//! outside the application at any time.

pub mod cache;
pub mod config;
pub mod db;
pub mod decisions;
pub mod export;
pub mod images;
pub mod index;
pub mod library;
pub mod logging;
pub mod manager;
pub mod model;
pub mod reconcile;
pub mod scanner;
pub mod stats;
pub mod trash;

pub use config::Config;
pub use decisions::{DecisionStore, StoreError};
pub use library::{LibraryError, PhotoLibrary};
pub use manager::{LibraryManager, ManagerOptions};
pub use model::{AlbumId, Decision, PhotoId, ReviewState};
