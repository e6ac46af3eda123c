//! Persisted dark/light theme preference.
//!
//! The preference lives in an injected [`PreferenceStore`], read once when
//! the setting is loaded and written on every toggle.

use anyhow::Result;
use async_trait::async_trait;

/// Preference key of the theme flag.
pub const THEME_KEY: &str = "theme";

// ============================================================================
// Preference Store
// ============================================================================

/// Local string key-value persistence.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_string(&self, key: &str) -> Result<Option<String>>;
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;
}

// ============================================================================
// Theme Preference
// ============================================================================

/// Available theme variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemePreference {
    #[default]
    Dark,
    Light,
}

impl ThemePreference {
    /// Parse a variant name from a string (case-insensitive).
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }

    /// Cycle to the next variant: Dark → Light → Dark.
    pub fn next(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    /// Human-readable name for status display.
    pub fn name(self) -> &'static str {
        match self {
            Self::Dark => "Dark",
            Self::Light => "Light",
        }
    }

    /// Stored value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

// ============================================================================
// Theme Setting
// ============================================================================

/// The current theme, bound to the store it persists to.
pub struct ThemeSetting<S> {
    store: S,
    current: ThemePreference,
}

impl<S: PreferenceStore> ThemeSetting<S> {
    /// Read the stored theme, falling back to `default` when nothing (or
    /// something unrecognised) is stored. A first run writes the default.
    pub async fn load(store: S, default: ThemePreference) -> Result<Self> {
        let current = match store.get_string(THEME_KEY).await? {
            Some(value) => ThemePreference::from_str_name(&value).unwrap_or_else(|| {
                tracing::warn!(value = %value, "Unknown stored theme, using default");
                default
            }),
            None => {
                store.set_string(THEME_KEY, default.as_str()).await?;
                default
            }
        };
        tracing::debug!(theme = current.as_str(), "Theme loaded");
        Ok(Self { store, current })
    }

    pub fn current(&self) -> ThemePreference {
        self.current
    }

    /// Flip the theme and persist it. The in-memory value only changes once
    /// the write succeeded.
    pub async fn toggle(&mut self) -> Result<ThemePreference> {
        let next = self.current.next();
        self.store.set_string(THEME_KEY, next.as_str()).await?;
        self.current = next;
        Ok(next)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
