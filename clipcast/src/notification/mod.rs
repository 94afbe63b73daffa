//! Status reporting to the remote coordinator.
//!
//! Delivery failures are returned to the caller as [`crate::Error::Notify`];
//! callers log them and carry on, since no run outcome depends on them.

pub mod events;
mod webhook;

pub use events::{StatusEvent, StatusPhase};
pub use webhook::{HttpStatusNotifier, LogOnlyNotifier};

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::config::NotifierConfig;

/// Delivers status events.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn notify(&self, event: &StatusEvent) -> Result<()>;
}

/// Notifier for `config`: HTTP when a status URL is set, log-only otherwise.
pub fn notifier_from_config(config: &NotifierConfig) -> Result<Arc<dyn StatusNotifier>> {
    match &config.status_url {
        Some(url) => Ok(Arc::new(HttpStatusNotifier::new(url, config)?)),
        None => Ok(Arc::new(LogOnlyNotifier)),
    }
}
