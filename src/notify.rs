use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
    Info,
    Warning,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Error => "error",
            Level::Info => "info",
            Level::Warning => "warning",
        }
    }
}

/// A transient message. It dismisses itself once `ttl` has elapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub level: Level,
    pub ttl: Duration,
}

impl Notification {
    pub fn new(message: impl Into<String>, level: Level) -> Self {
        Self {
            message: message.into(),
            level,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn lasting(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Fire-and-forget sink for user-facing messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Keeps the notifications that are still on screen.
#[derive(Default)]
pub struct NotificationCenter {
    entries: Mutex<Vec<(Instant, Notification)>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible notifications, oldest first. Expired ones are dropped.
    pub fn active(&self) -> Vec<Notification> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut entries, Instant::now());
        entries.iter().map(|(_, n)| n.clone()).collect()
    }
}

fn prune(entries: &mut Vec<(Instant, Notification)>, now: Instant) {
    entries.retain(|(expires_at, _)| *expires_at > now);
}

impl Notifier for NotificationCenter {
    fn notify(&self, notification: Notification) {
        info!(level = notification.level.as_str(), "{}", notification.message);
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut entries, now);
        entries.push((now + notification.ttl, notification));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_notifications_auto_dismiss() {
        let center = NotificationCenter::new();
        center.notify(Notification::new("Comment added successfully!", Level::Success));
        center.notify(
            Notification::new("Draft saved successfully", Level::Success)
                .lasting(Duration::from_secs(5)),
        );
        assert_eq!(center.active().len(), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        let active = center.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "Draft saved successfully");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(center.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_drops_expired_entries() {
        let center = NotificationCenter::new();
        for _ in 0..50 {
            center.notify(Notification::new("Tweet liked", Level::Success));
        }
        tokio::time::advance(Duration::from_secs(4)).await;
        center.notify(Notification::new("Like removed", Level::Success));

        let entries = center.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.message, "Like removed");
    }
}
