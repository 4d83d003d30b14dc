//! Outbound notifications (reset link emails, password-changed notices)
//!
//! The credential managers never wait on delivery: [`dispatch`] hands the
//! notification to a spawned task and a failure is only logged.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Message for the templating/email layer
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ResetRequested {
        user_id: i64,
        email: String,
        display_name: String,
        reset_url: String,
    },
    PasswordChanged {
        user_id: i64,
        email: String,
        display_name: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResetRequested { .. } => "reset_requested",
            Self::PasswordChanged { .. } => "password_changed",
        }
    }

    pub fn user_id(&self) -> i64 {
        match self {
            Self::ResetRequested { user_id, .. } | Self::PasswordChanged { user_id, .. } => *user_id,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Self::ResetRequested { email, .. } | Self::PasswordChanged { email, .. } => email,
        }
    }
}

// The reset link is a live credential
impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("kind", &self.kind())
            .field("user_id", &self.user_id())
            .finish_non_exhaustive()
    }
}

/// Delivery abstraction
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification or return an error to have it logged
    async fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Local dev notifier that logs instead of sending
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        info!(
            kind = notification.kind(),
            user_id = notification.user_id(),
            to_email = %notification.email(),
            "notification send stub"
        );
        Ok(())
    }
}

/// Forwards notifications to a channel; used by tests and by embedders
/// that run their own delivery worker
#[derive(Clone, Debug)]
pub struct QueueNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl QueueNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for QueueNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        self.tx
            .send(notification)
            .map_err(|_| anyhow::anyhow!("notification queue closed"))
    }
}

/// Fire-and-forget delivery
pub fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        let kind = notification.kind();
        let user_id = notification.user_id();
        if let Err(e) = notifier.send(notification).await {
            warn!(kind, user_id, error = %e, "Notification delivery failed");
        }
    });
}
