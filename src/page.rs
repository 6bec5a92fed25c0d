//! One loaded page and every controller running on it.
//!
//! `Page` is the only owner of the poller, the draft coordinator, the theme
//! coordinator and the action client. Nothing here is global: two pages are
//! two independent sets of timers.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::actions::{ActionClient, Confirm};
use crate::api::ApiClient;
use crate::config::Config;
use crate::dispatch::{Dispatch, Dispatcher, UiEvent};
use crate::document::{Document, SharedDocument};
use crate::draft::{DraftCoordinator, SavedDraft};
use crate::error::ActionError;
use crate::extract;
use crate::notify::Notifier;
use crate::refresh::{Poller, PollerState, Reconciler, TaskKey};
use crate::theme::{Theme, ThemeCoordinator, ThemeStore};
use crate::transport::{Request, Transport};

/// External collaborators a page is wired to.
pub struct Services {
    pub transport: Arc<dyn Transport>,
    pub notifier: Arc<dyn Notifier>,
    pub confirm: Arc<dyn Confirm>,
    pub theme_store: Box<dyn ThemeStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

pub struct Page {
    document: SharedDocument,
    actions: Arc<ActionClient>,
    dispatcher: Dispatcher,
    poller: Poller,
    drafts: Option<DraftCoordinator>,
    theme: ThemeCoordinator,
    pending_draft: Option<SavedDraft>,
}

impl Page {
    /// Fetches `path` and boots every controller the page calls for.
    pub async fn load(config: &Config, services: Services, path: &str) -> Result<Self> {
        let response = services.transport.send(Request::get(path)).await?;
        if !response.is_success() {
            bail!("loading {path} returned HTTP {}", response.status);
        }
        let document = extract::document(path, &response.body);
        Ok(Self::boot(config, services, document).await)
    }

    pub async fn boot(config: &Config, services: Services, mut document: Document) -> Self {
        let Services {
            transport,
            notifier,
            confirm,
            theme_store,
        } = services;

        let mut theme = ThemeCoordinator::new(theme_store, Arc::clone(&notifier))
            .with_ttl(config.notifications.ttl());
        theme.init(&mut document);

        let has_composer = document.composer.is_some();
        let has_gallery = document.media.is_some();
        let document = document.into_shared();

        let api = ApiClient::new(Arc::clone(&transport), document.clone(), &config.server);
        let actions = Arc::new(
            ActionClient::new(api.clone(), Arc::clone(&notifier), confirm)
                .with_ttl(config.notifications.ttl()),
        );
        let dispatcher = Dispatcher::new(document.clone(), Arc::clone(&actions));

        let reconciler = Arc::new(Reconciler::new(transport, document.clone()));
        let mut poller = Poller::new(reconciler, config.refresh.interval());
        match poller.start_for_current_path().await {
            Some(key) => info!(task = key.as_str(), "auto-refresh started"),
            None => debug!("no auto-refresh for this page"),
        }

        let mut drafts = has_composer.then(|| {
            DraftCoordinator::new(api, notifier).with_ttl(config.notifications.draft_ttl())
        });
        if let Some(drafts) = drafts.as_mut() {
            drafts.start(config.draft.autosave_interval());
        }

        let restore_check = async {
            match &drafts {
                Some(drafts) => drafts.check_for_restore().await,
                None => None,
            }
        };
        let gallery = async {
            if has_gallery {
                if let Err(err) = actions.load_media_gallery().await {
                    warn!("media gallery unavailable: {err}");
                }
            }
        };
        let (pending_draft, ()) = futures::join!(restore_check, gallery);

        Self {
            document,
            actions,
            dispatcher,
            poller,
            drafts,
            theme,
            pending_draft,
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn actions(&self) -> &Arc<ActionClient> {
        &self.actions
    }

    pub fn drafts(&self) -> Option<&DraftCoordinator> {
        self.drafts.as_ref()
    }

    pub fn refresh_state(&self) -> PollerState {
        self.poller.state()
    }

    pub fn refresh_task(&self) -> Option<TaskKey> {
        self.poller.tasks().next().map(|task| task.key)
    }

    pub fn theme(&self) -> Theme {
        self.theme.current()
    }

    /// The saved draft on offer, until it is restored or discarded.
    pub fn pending_draft(&self) -> Option<&SavedDraft> {
        self.pending_draft.as_ref()
    }

    pub async fn dispatch(&self, event: UiEvent) -> Dispatch {
        self.dispatcher.dispatch(event).await
    }

    pub async fn toggle_theme(&mut self) -> Theme {
        let mut document = self.document.lock().await;
        self.theme.toggle(&mut document)
    }

    pub async fn set_visibility(&mut self, visibility: Visibility) {
        match visibility {
            Visibility::Hidden => {
                debug!("page hidden, pausing auto-refresh");
                self.poller.pause();
            }
            Visibility::Visible => {
                if let Some(key) = self.poller.resume().await {
                    debug!(task = key.as_str(), "page visible, auto-refresh resumed");
                }
            }
        }
    }

    pub async fn restore_draft(&mut self) -> bool {
        let (Some(drafts), Some(draft)) = (self.drafts.as_ref(), self.pending_draft.take()) else {
            return false;
        };
        drafts.restore(&draft).await;
        true
    }

    pub async fn discard_draft(&mut self) -> Result<(), ActionError> {
        let Some(drafts) = self.drafts.as_ref() else {
            return Ok(());
        };
        self.pending_draft = None;
        drafts.discard().await
    }

    /// Stops every timer. Requests already in flight are left to finish.
    pub fn unload(&mut self) {
        self.poller.stop();
        if let Some(drafts) = self.drafts.as_mut() {
            drafts.stop();
        }
        info!("page unloaded");
    }
}
