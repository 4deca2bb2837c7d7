//! Shared application state
//!
//! Everything in here is immutable after startup, so handlers share it by
//! cheap clones instead of locks.

use crate::config::Config;
use crate::error::AppError;
use crate::services::files::FileService;
use std::sync::Arc;

/// State handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<Config>,
    /// File storage service
    pub files: Arc<FileService>,
}

impl AppState {
    /// Build the state, bootstrapping the storage directory
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let files = FileService::new(&config.storage).await?;
        Ok(Self {
            config: Arc::new(config),
            files: Arc::new(files),
        })
    }
}
