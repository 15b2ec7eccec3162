//! Admin authentication collaborator.
//!
//! A hardcoded credential check plus a sentinel key in the local store;
//! the persistence core never consults it. Admin routes in the UI gate
//! on [`AdminAuth::is_authenticated`] by convention only.

use std::sync::Arc;
use tracing::info;

use crate::storage::{LocalStore, ADMIN_AUTH_KEY};
use crate::StoreError;

const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "admin123";
const SENTINEL: &str = "true";

/// Sentinel-based admin session over the local store.
pub struct AdminAuth {
    local: Arc<LocalStore>,
}

impl AdminAuth {
    pub fn new(local: Arc<LocalStore>) -> Self {
        Self { local }
    }

    /// Check the hardcoded admin credentials. Pure; does not touch the
    /// session sentinel.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        username == ADMIN_USERNAME && password == ADMIN_PASSWORD
    }

    /// Mark the session as authenticated.
    pub fn login(&self) -> Result<(), StoreError> {
        self.local.write(ADMIN_AUTH_KEY, &SENTINEL)?;
        info!("admin session opened");
        Ok(())
    }

    /// Clear the session sentinel.
    pub fn logout(&self) -> Result<(), StoreError> {
        self.local.remove(ADMIN_AUTH_KEY)?;
        info!("admin session closed");
        Ok(())
    }

    /// Whether the sentinel marks this session as authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.local
            .read::<String>(ADMIN_AUTH_KEY)
            .is_some_and(|v| v == SENTINEL)
    }
}
