use std::sync::Arc;

use crate::error::AppError;
use crate::store::Store;

/// Router state. The store is absent when no `DATABASE_URL` was configured.
#[derive(Clone, Default)]
pub struct AppState {
    store: Option<Arc<dyn Store>>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store: Some(store) }
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn store(&self) -> Result<&dyn Store, AppError> {
        self.store.as_deref().ok_or(AppError::DatabaseNotConfigured)
    }
}
