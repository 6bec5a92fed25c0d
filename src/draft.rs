//! Draft autosave for the tweet composer.
//!
//! The timer never restarts on input: it fires every period and saves only if
//! the composer changed since the last confirmed save.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{Ack, ApiClient};
use crate::document::RestorePrompt;
use crate::error::ActionError;
use crate::notify::{Level, Notification, Notifier};

pub const DRAFT_TTL: Duration = Duration::from_secs(5);
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftState {
    pub content: String,
    pub media_ids: Vec<u64>,
    pub dirty: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Bumped on every input; a save only clears `dirty` for the revision it sent.
    pub revision: u64,
    pub submitting: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SavedDraft {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media: Vec<DraftMedia>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DraftMedia {
    pub id: u64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DraftPayload {
    #[serde(default)]
    draft: Option<SavedDraft>,
}

struct Shared {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
    ttl: Duration,
    state: Mutex<DraftState>,
    media: broadcast::Sender<Vec<DraftMedia>>,
}

impl Shared {
    fn notify(&self, message: impl Into<String>, level: Level) {
        self.notifier
            .notify(Notification::new(message, level).lasting(self.ttl));
    }

    /// Current composer content (trimmed) and attached media.
    async fn snapshot(&self) -> Option<(String, Vec<u64>)> {
        let document = self.api.document().lock().await;
        let composer = document.composer.as_ref()?;
        Some((composer.text.trim().to_string(), composer.media_ids.clone()))
    }

    async fn autosave(&self) -> Result<bool, ActionError> {
        {
            let state = self.state.lock().await;
            if !state.dirty || state.submitting {
                return Ok(false);
            }
        }
        let Some((content, media_ids)) = self.snapshot().await else {
            return Ok(false);
        };
        if content.is_empty() {
            return Ok(false);
        }
        self.save(content, media_ids).await?;
        Ok(true)
    }

    async fn save(&self, content: String, media_ids: Vec<u64>) -> Result<(), ActionError> {
        let revision = self.state.lock().await.revision;
        self.api
            .post::<Ack>(
                "/draft/save/",
                Some(json!({ "content": content, "media_ids": media_ids })),
            )
            .await?
            .into_result("Failed to save draft")?;

        let mut state = self.state.lock().await;
        if state.revision == revision {
            state.dirty = false;
            state.content = content;
            state.media_ids = media_ids;
        } else {
            debug!(sent = revision, current = state.revision, "draft edited during save");
        }
        state.last_saved_at = Some(Utc::now());
        Ok(())
    }
}

pub struct DraftCoordinator {
    shared: Arc<Shared>,
    timer: Option<CancellationToken>,
}

impl DraftCoordinator {
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>) -> Self {
        let (media, _) = broadcast::channel(8);
        Self {
            shared: Arc::new(Shared {
                api,
                notifier,
                ttl: DRAFT_TTL,
                state: Mutex::new(DraftState::default()),
                media,
            }),
            timer: None,
        }
    }

    /// Must be called before the coordinator is shared or started.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.ttl = ttl;
        }
        self
    }

    pub async fn state(&self) -> DraftState {
        self.shared.state.lock().await.clone()
    }

    /// Receives the media list of every restored draft.
    pub fn subscribe_media(&self) -> broadcast::Receiver<Vec<DraftMedia>> {
        self.shared.media.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Starts the autosave timer. The first check runs one period from now.
    pub fn start(&mut self, period: Duration) {
        self.stop();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => match shared.autosave().await {
                        Ok(true) => debug!("draft autosaved"),
                        Ok(false) => {}
                        Err(err) => warn!("draft autosave failed: {err}"),
                    }
                }
            }
        });

        self.timer = Some(cancel);
    }

    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    /// Records an edit of the composer text.
    pub async fn on_input(&self, text: &str) {
        {
            let mut document = self.shared.api.document().lock().await;
            if let Some(composer) = document.composer.as_mut() {
                composer.text = text.to_string();
            }
        }
        let mut state = self.shared.state.lock().await;
        state.content = text.to_string();
        state.dirty = true;
        state.revision += 1;
    }

    /// One silent autosave check. Returns whether a save went out and succeeded.
    pub async fn autosave(&self) -> Result<bool, ActionError> {
        self.shared.autosave().await
    }

    /// Explicit save: reports the result to the user.
    pub async fn save_now(&self) -> Result<(), ActionError> {
        let (content, media_ids) = self.shared.snapshot().await.unwrap_or_default();
        if content.is_empty() {
            self.shared
                .notify("Draft content cannot be empty", Level::Warning);
            return Err(ActionError::InvalidInput("Draft content cannot be empty"));
        }

        match self.shared.save(content, media_ids).await {
            Ok(()) => {
                self.shared.notify("Draft saved successfully", Level::Success);
                Ok(())
            }
            Err(ActionError::Rejected(reason)) => {
                error!("saving draft rejected: {reason}");
                self.shared.notify(reason.clone(), Level::Error);
                Err(ActionError::Rejected(reason))
            }
            Err(err) => {
                error!("saving draft failed: {err}");
                self.shared.notify("Error saving draft", Level::Error);
                Err(err)
            }
        }
    }

    /// The saved draft on the server, if there is one with content.
    pub async fn fetch(&self) -> Result<Option<SavedDraft>, ActionError> {
        let envelope = self.shared.api.get::<DraftPayload>("/draft/get/").await?;
        if !envelope.success {
            return Ok(None);
        }
        Ok(envelope
            .data
            .draft
            .filter(|draft| !draft.content.is_empty()))
    }

    /// Looks for a saved draft once, on load. Offers it only while the composer
    /// is blank so typed text is never overwritten.
    pub async fn check_for_restore(&self) -> Option<SavedDraft> {
        let draft = match self.fetch().await {
            Ok(Some(draft)) => draft,
            Ok(None) => return None,
            Err(err) => {
                error!("checking for draft failed: {err}");
                return None;
            }
        };

        let mut document = self.shared.api.document().lock().await;
        let composer = document.composer.as_mut()?;
        if !composer.text.trim().is_empty() {
            debug!("composer has content, not offering draft");
            return None;
        }
        composer.restore_prompt = Some(RestorePrompt {
            saved_at: draft.updated_at,
        });
        Some(draft)
    }

    pub async fn restore(&self, draft: &SavedDraft) {
        {
            let mut document = self.shared.api.document().lock().await;
            let Some(composer) = document.composer.as_mut() else {
                return;
            };
            composer.text = draft.content.clone();
            composer.restore_prompt = None;
        }
        {
            let mut state = self.shared.state.lock().await;
            state.content = draft.content.clone();
            state.dirty = false;
            state.revision += 1;
        }

        if !draft.media.is_empty() {
            info!(count = draft.media.len(), "restoring draft media");
            // Nobody listening is fine.
            let _ = self.shared.media.send(draft.media.clone());
        }
        self.shared
            .notify("Draft restored successfully", Level::Success);
    }

    /// Dismisses the restore offer and deletes the saved draft.
    pub async fn discard(&self) -> Result<(), ActionError> {
        if let Some(composer) = self.shared.api.document().lock().await.composer.as_mut() {
            composer.restore_prompt = None;
        }
        self.clear().await
    }

    pub async fn clear(&self) -> Result<(), ActionError> {
        let result = self
            .shared
            .api
            .post::<Ack>("/draft/clear/", None)
            .await
            .and_then(|envelope| envelope.into_result("Failed to clear draft"));

        match result {
            Ok(_) => {
                self.shared.state.lock().await.dirty = false;
                self.shared.notify("Draft cleared", Level::Info);
                Ok(())
            }
            Err(err) => {
                error!("clearing draft failed: {err}");
                Err(err)
            }
        }
    }

    /// The host form is being submitted; autosave stands down from here on.
    pub async fn mark_submitting(&self) {
        self.shared.state.lock().await.submitting = true;
    }
}

impl Drop for DraftCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::document::{Composer, Document, SharedDocument};
    use crate::notify::NotificationCenter;
    use crate::transport::testing::FakeTransport;
    use crate::transport::{Method, Request, Response, Transport};
    use async_trait::async_trait;
    use tokio::sync::oneshot;

    const SAVED: &str = r#"{"success":true}"#;
    const DRAFT: &str = r#"{"success":true,"draft":{"content":"saved words","media":[{"id":3,"url":"/m/3.jpg","file_type":"image"}],"updated_at":"2026-03-01T10:00:00Z"}}"#;

    fn composer_page(text: &str) -> SharedDocument {
        let mut document = Document::new("/create/");
        document.composer = Some(Composer {
            text: text.into(),
            media_ids: vec![7],
            restore_prompt: None,
        });
        document.into_shared()
    }

    fn coordinator(
        transport: Arc<dyn Transport>,
        document: SharedDocument,
    ) -> (DraftCoordinator, Arc<NotificationCenter>) {
        let center = Arc::new(NotificationCenter::new());
        let api = ApiClient::new(transport, document, &ServerConfig::default());
        (DraftCoordinator::new(api, center.clone()), center)
    }

    #[tokio::test]
    async fn test_autosave_only_when_dirty() {
        let transport = FakeTransport::new();
        transport.respond(Method::Post, "/draft/save/", 200, SAVED);
        let (drafts, center) = coordinator(transport.clone(), composer_page(""));

        assert!(!drafts.autosave().await.unwrap());
        assert!(transport.requests().is_empty());

        drafts.on_input("  hello  ").await;
        assert!(drafts.autosave().await.unwrap());
        let sent = &transport.requests()[0];
        assert_eq!(
            sent.body,
            Some(json!({ "content": "hello", "media_ids": [7] }))
        );

        let state = drafts.state().await;
        assert!(!state.dirty);
        assert_eq!(state.content, "hello");
        assert!(state.last_saved_at.is_some());

        // Clean again: the next check sends nothing.
        assert!(!drafts.autosave().await.unwrap());
        assert_eq!(transport.requests().len(), 1);
        assert!(center.active().is_empty());
    }

    #[tokio::test]
    async fn test_autosave_skips_blank_content() {
        let transport = FakeTransport::new();
        let (drafts, _) = coordinator(transport.clone(), composer_page(""));
        drafts.on_input("   ").await;
        assert!(!drafts.autosave().await.unwrap());
        assert!(transport.requests().is_empty());
        assert!(drafts.state().await.dirty);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_dirty() {
        let transport = FakeTransport::new();
        transport.respond(Method::Post, "/draft/save/", 500, "");
        let (drafts, center) = coordinator(transport.clone(), composer_page(""));
        drafts.on_input("text").await;

        assert!(matches!(drafts.autosave().await, Err(ActionError::Status(500))));
        assert!(drafts.state().await.dirty);
        assert!(center.active().is_empty());
    }

    #[tokio::test]
    async fn test_no_autosave_while_submitting() {
        let transport = FakeTransport::new();
        let (drafts, _) = coordinator(transport.clone(), composer_page(""));
        drafts.on_input("posting this").await;
        drafts.mark_submitting().await;
        assert!(!drafts.autosave().await.unwrap());
        assert!(transport.requests().is_empty());
    }

    /// Holds the save response until released.
    struct HeldSave {
        release: Mutex<Option<oneshot::Receiver<()>>>,
        entered: Mutex<Option<oneshot::Sender<()>>>,
    }

    #[async_trait]
    impl Transport for HeldSave {
        async fn send(&self, _request: Request) -> anyhow::Result<Response> {
            if let Some(entered) = self.entered.lock().await.take() {
                let _ = entered.send(());
            }
            let release = self.release.lock().await.take();
            if let Some(release) = release {
                let _ = release.await;
            }
            Ok(Response::new(200, SAVED))
        }
    }

    #[tokio::test]
    async fn test_input_during_save_stays_dirty() {
        let (release_tx, release_rx) = oneshot::channel();
        let (entered_tx, entered_rx) = oneshot::channel();
        let transport = Arc::new(HeldSave {
            release: Mutex::new(Some(release_rx)),
            entered: Mutex::new(Some(entered_tx)),
        });
        let (drafts, _) = coordinator(transport, composer_page(""));
        let drafts = Arc::new(drafts);
        drafts.on_input("first").await;

        let pending = {
            let drafts = Arc::clone(&drafts);
            tokio::spawn(async move { drafts.autosave().await })
        };
        entered_rx.await.unwrap();
        drafts.on_input("first and more").await;
        release_tx.send(()).unwrap();

        assert!(pending.await.unwrap().unwrap());
        let state = drafts.state().await;
        assert!(state.dirty);
        assert_eq!(state.content, "first and more");
    }

    #[tokio::test]
    async fn test_restore_during_save_keeps_restored_text() {
        let (release_tx, release_rx) = oneshot::channel();
        let (entered_tx, entered_rx) = oneshot::channel();
        let transport = Arc::new(HeldSave {
            release: Mutex::new(Some(release_rx)),
            entered: Mutex::new(Some(entered_tx)),
        });
        let document = composer_page("");
        let (drafts, _) = coordinator(transport, document.clone());
        let drafts = Arc::new(drafts);
        drafts.on_input("typed before restore").await;

        let pending = {
            let drafts = Arc::clone(&drafts);
            tokio::spawn(async move { drafts.autosave().await })
        };
        entered_rx.await.unwrap();
        let saved = SavedDraft {
            content: "restored words".into(),
            media: Vec::new(),
            updated_at: None,
        };
        drafts.restore(&saved).await;
        release_tx.send(()).unwrap();

        assert!(pending.await.unwrap().unwrap());
        let state = drafts.state().await;
        assert_eq!(state.content, "restored words");
        assert!(!state.dirty);
        let composer = document.lock().await.composer.clone().unwrap();
        assert_eq!(composer.text, "restored words");
    }

    #[tokio::test]
    async fn test_manual_save_reports() {
        let transport = FakeTransport::new();
        transport.respond(Method::Post, "/draft/save/", 200, r#"{"success":false,"error":"Draft too long"}"#);
        transport.respond(Method::Post, "/draft/save/", 200, SAVED);
        let (drafts, center) = coordinator(transport.clone(), composer_page(""));

        assert!(matches!(drafts.save_now().await, Err(ActionError::InvalidInput(_))));
        assert!(transport.requests().is_empty());

        drafts.on_input("words").await;
        assert!(matches!(drafts.save_now().await, Err(ActionError::Rejected(_))));
        drafts.save_now().await.unwrap();

        let active = center.active();
        let messages: Vec<&str> = active.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Draft content cannot be empty", "Draft too long", "Draft saved successfully"]
        );
        assert_eq!(active[0].level, Level::Warning);
        assert_eq!(active[2].ttl, DRAFT_TTL);
    }

    #[tokio::test]
    async fn test_restore_prompt_and_restore() {
        let transport = FakeTransport::new();
        transport.respond(Method::Get, "/draft/get/", 200, DRAFT);
        let document = composer_page("");
        let (drafts, center) = coordinator(transport.clone(), document.clone());
        let mut media = drafts.subscribe_media();

        let draft = drafts.check_for_restore().await.unwrap();
        assert_eq!(draft.content, "saved words");
        let prompt = document.lock().await.composer.clone().unwrap().restore_prompt;
        assert_eq!(prompt.unwrap().saved_at, draft.updated_at);

        drafts.restore(&draft).await;
        let composer = document.lock().await.composer.clone().unwrap();
        assert_eq!(composer.text, "saved words");
        assert!(composer.restore_prompt.is_none());
        assert!(!drafts.state().await.dirty);

        let restored = media.recv().await.unwrap();
        assert_eq!(restored[0].id, 3);
        assert_eq!(center.active()[0].message, "Draft restored successfully");
    }

    #[tokio::test]
    async fn test_no_prompt_over_typed_text() {
        let transport = FakeTransport::new();
        transport.respond(Method::Get, "/draft/get/", 200, DRAFT);
        let document = composer_page("already typing");
        let (drafts, _) = coordinator(transport.clone(), document.clone());

        assert!(drafts.check_for_restore().await.is_none());
        let composer = document.lock().await.composer.clone().unwrap();
        assert_eq!(composer.text, "already typing");
        assert!(composer.restore_prompt.is_none());
    }

    #[tokio::test]
    async fn test_whitespace_only_text_still_gets_prompt() {
        let transport = FakeTransport::new();
        transport.respond(Method::Get, "/draft/get/", 200, DRAFT);
        let document = composer_page("  \n\t ");
        let (drafts, _) = coordinator(transport.clone(), document.clone());

        let draft = drafts.check_for_restore().await.unwrap();
        assert_eq!(draft.content, "saved words");
        let composer = document.lock().await.composer.clone().unwrap();
        assert!(composer.restore_prompt.is_some());
    }

    #[tokio::test]
    async fn test_no_prompt_without_draft() {
        let transport = FakeTransport::new();
        transport.respond(Method::Get, "/draft/get/", 200, r#"{"success":false,"message":"No draft found"}"#);
        let (drafts, _) = coordinator(transport.clone(), composer_page(""));
        assert!(drafts.check_for_restore().await.is_none());

        transport.respond(Method::Get, "/draft/get/", 500, "");
        assert!(drafts.check_for_restore().await.is_none());
    }

    #[tokio::test]
    async fn test_discard_clears_server_draft() {
        let transport = FakeTransport::new();
        transport.respond(Method::Get, "/draft/get/", 200, DRAFT);
        transport.respond(Method::Post, "/draft/clear/", 200, SAVED);
        let document = composer_page("");
        let (drafts, center) = coordinator(transport.clone(), document.clone());

        drafts.check_for_restore().await.unwrap();
        drafts.discard().await.unwrap();

        let composer = document.lock().await.composer.clone().unwrap();
        assert!(composer.restore_prompt.is_none());
        assert!(composer.text.is_empty());
        assert_eq!(transport.requests_to("/draft/clear/").len(), 1);
        assert_eq!(center.active()[0].message, "Draft cleared");
        assert_eq!(center.active()[0].level, Level::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_cadence_ignores_typing() {
        let transport = FakeTransport::new();
        transport.respond(Method::Post, "/draft/save/", 200, SAVED);
        let (mut drafts, _) = coordinator(transport.clone(), composer_page(""));
        drafts.start(DEFAULT_AUTOSAVE_INTERVAL);

        for i in 0..5 {
            drafts.on_input(&format!("typing {i}")).await;
            time::sleep(Duration::from_secs(5)).await;
        }
        // 25s in: the first check has not fired yet.
        assert!(transport.requests().is_empty());

        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(transport.requests().len(), 1);

        // Nothing typed since: the next period sends nothing.
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.requests().len(), 1);

        drafts.stop();
        assert!(!drafts.is_running());
    }
}
