use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::{Document, ToggleControl};
use crate::notify::{Level, Notification, Notifier, DEFAULT_TTL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Theme::Dark => "Dark",
            Theme::Light => "Light",
        }
    }

    /// Icon and tooltip of the toggle while this theme is active.
    pub fn toggle_control(&self) -> ToggleControl {
        match self {
            Theme::Dark => ToggleControl {
                icon: "bi bi-sun-fill".into(),
                title: "Switch to light theme".into(),
            },
            Theme::Light => ToggleControl {
                icon: "bi bi-moon-fill".into(),
                title: "Switch to dark theme".into(),
            },
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(anyhow!("unknown theme {other:?}")),
        }
    }
}

/// Durable storage for the theme preference.
pub trait ThemeStore: Send + Sync {
    fn load(&self) -> Result<Option<Theme>>;
    fn save(&self, theme: Theme) -> Result<()>;
}

pub struct FileThemeStore {
    path: PathBuf,
}

impl FileThemeStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ThemeStore for FileThemeStore {
    fn load(&self) -> Result<Option<Theme>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("read theme from {}", self.path.display()))?;
        data.parse().map(Some)
    }

    fn save(&self, theme: Theme) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&self.path, theme.as_str())
            .with_context(|| format!("write theme to {}", self.path.display()))
    }
}

/// In-process store for embedders without a writable config directory.
#[derive(Debug, Default)]
pub struct MemoryThemeStore {
    value: Mutex<Option<Theme>>,
}

impl MemoryThemeStore {
    pub fn with(theme: Theme) -> Self {
        Self {
            value: Mutex::new(Some(theme)),
        }
    }
}

impl ThemeStore for MemoryThemeStore {
    fn load(&self) -> Result<Option<Theme>> {
        Ok(*self.value.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn save(&self, theme: Theme) -> Result<()> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(theme);
        Ok(())
    }
}

pub struct ThemeCoordinator {
    store: Box<dyn ThemeStore>,
    notifier: Arc<dyn Notifier>,
    ttl: Duration,
    current: Theme,
    initialized: bool,
}

impl ThemeCoordinator {
    pub fn new(store: Box<dyn ThemeStore>, notifier: Arc<dyn Notifier>) -> Self {
        let current = match store.load() {
            Ok(theme) => theme.unwrap_or_default(),
            Err(err) => {
                warn!("ignoring stored theme: {err:#}");
                Theme::default()
            }
        };
        Self {
            store,
            notifier,
            ttl: DEFAULT_TTL,
            current,
            initialized: false,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn current(&self) -> Theme {
        self.current
    }

    /// Applies the stored preference without announcing it.
    pub fn init(&mut self, document: &mut Document) {
        self.set_theme(self.current, document);
    }

    pub fn set_theme(&mut self, theme: Theme, document: &mut Document) {
        self.current = theme;
        document.theme = Some(theme);
        if let Err(err) = self.store.save(theme) {
            warn!("failed to persist theme: {err:#}");
        }
        if document.theme_toggle.is_some() {
            document.theme_toggle = Some(theme.toggle_control());
        }

        if self.initialized {
            self.notifier.notify(
                Notification::new(
                    format!("{} theme activated", theme.display_name()),
                    Level::Info,
                )
                .lasting(self.ttl),
            );
        }
        self.initialized = true;
    }

    pub fn toggle(&mut self, document: &mut Document) -> Theme {
        let next = self.current.toggled();
        self.set_theme(next, document);
        next
    }
}
