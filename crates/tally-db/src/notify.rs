//! # Notification Dispatch
//!
//! The engine hands user notifications to a [`Notifier`] only after the
//! owning transaction has committed. A failing notifier is logged and never
//! undoes a ledger change.

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

use crate::error::DbError;
use crate::repository::outbox::OutboxRepository;
use tally_core::Notification;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Fire-and-forget target for user notifications.
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Queues notifications in the `notification_outbox` table.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    outbox: OutboxRepository,
}

impl OutboxNotifier {
    pub fn new(outbox: OutboxRepository) -> Self {
        OutboxNotifier { outbox }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let id = self.outbox.queue(notification).await?;
        debug!(outbox_id = %id, "Notification queued");
        Ok(())
    }
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}
