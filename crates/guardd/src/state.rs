use std::sync::Arc;
use tokio::sync::Mutex;

use crate::credentials::CredentialStore;
use crate::diagnostic::DiagnosticCommand;
use crate::redirect::RedirectPolicy;
use crate::upload::UploadRoot;

/// Shared application state passed to all axum handlers via State extractor.
pub struct AppState {
    pub credentials: Mutex<CredentialStore>,
    pub uploads: UploadRoot,
    pub redirects: RedirectPolicy,
    pub diagnostic: DiagnosticCommand,
}

/// Type alias for the shared state used across the application.
pub type SharedState = Arc<AppState>;
