//! Terminal registry: detection, selection, and persistence.
//!
//! Built-in profiles are fixed. User-defined profiles and the active
//! selection persist as `terminals.json` in the settings store.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use boxforge_foundation::{Error, Result, SettingsStore};

use crate::profile::{build_launch_args, built_in_profiles, TerminalProfile};

/// Settings file under the store's base directory.
const SETTINGS_FILE: &str = "terminals.json";

// ============================================================================
// Availability Probe
// ============================================================================

/// Check whether a terminal command exists on the host.
pub trait TerminalProbe: Send + Sync {
    fn available(&self, command: &str) -> bool;
}

/// Probe backed by a `PATH` lookup.
#[derive(Debug, Default)]
pub struct WhichProbe;

impl TerminalProbe for WhichProbe {
    fn available(&self, command: &str) -> bool {
        which::which(command).is_ok()
    }
}

// ============================================================================
// Persisted Settings
// ============================================================================

/// On-disk shape of `terminals.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TerminalSettings {
    #[serde(default)]
    custom: Vec<StoredProfile>,
    /// Name of the selected profile.
    #[serde(default)]
    active: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredProfile {
    name: String,
    display_name: String,
    command: String,
    separator: String,
}

impl StoredProfile {
    fn into_profile(self) -> TerminalProfile {
        TerminalProfile {
            name: self.name,
            display_name: self.display_name,
            command: self.command,
            separator: self.separator,
            built_in: false,
        }
    }
}

impl From<&TerminalProfile> for StoredProfile {
    fn from(profile: &TerminalProfile) -> Self {
        Self {
            name: profile.name.clone(),
            display_name: profile.display_name.clone(),
            command: profile.command.clone(),
            separator: profile.separator.clone(),
        }
    }
}

// ============================================================================
// Terminal Registry
// ============================================================================

/// Registry of terminal profiles with one active selection.
///
/// Mutating operations persist immediately; a registry loaded later from the
/// same store sees the same custom profiles and selection.
pub struct TerminalRegistry {
    profiles: Vec<TerminalProfile>,
    active: Option<String>,
    store: SettingsStore,
    probe: Box<dyn TerminalProbe>,
}

impl TerminalRegistry {
    /// Load the registry using a `PATH`-based availability probe.
    pub fn load(store: SettingsStore) -> Self {
        Self::load_with_probe(store, Box::new(WhichProbe))
    }

    /// Load built-ins plus persisted custom profiles, then resolve the
    /// active selection. A saved selection that no longer exists, or an
    /// unreadable settings file, falls back to detection.
    pub fn load_with_probe(store: SettingsStore, probe: Box<dyn TerminalProbe>) -> Self {
        let settings: TerminalSettings = match store.load_optional(SETTINGS_FILE) {
            Ok(Some(settings)) => settings,
            Ok(None) => TerminalSettings::default(),
            Err(err) => {
                warn!("Ignoring unreadable terminal settings: {}", err);
                TerminalSettings::default()
            }
        };

        let mut registry = Self {
            profiles: built_in_profiles(),
            active: None,
            store,
            probe,
        };

        for stored in settings.custom {
            let profile = stored.into_profile();
            if profile.name.trim().is_empty() || profile.command.trim().is_empty() {
                warn!("Skipping malformed custom terminal entry");
                continue;
            }
            if registry.find(&profile.name).is_some() {
                warn!(name = %profile.name, "Skipping duplicate custom terminal");
                continue;
            }
            registry.profiles.push(profile);
        }

        registry.active = settings
            .active
            .filter(|name| registry.find(name).is_some());
        if registry.active.is_none() {
            registry.active = registry.detect_default().ok().map(|p| p.name.clone());
        }
        debug!(
            profiles = registry.profiles.len(),
            active = ?registry.active,
            "Terminal registry loaded"
        );
        registry
    }

    /// All profiles, built-ins first in detection priority order.
    pub fn profiles(&self) -> &[TerminalProfile] {
        &self.profiles
    }

    /// Look up a profile by name.
    pub fn find(&self, name: &str) -> Option<&TerminalProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The currently selected profile, if any.
    pub fn active_profile(&self) -> Option<&TerminalProfile> {
        self.active.as_deref().and_then(|name| self.find(name))
    }

    /// Probe the host for the first available built-in terminal, in
    /// catalog order.
    pub fn detect_default(&self) -> Result<&TerminalProfile> {
        self.profiles
            .iter()
            .filter(|p| p.built_in)
            .find(|p| self.probe.available(&p.command))
            .ok_or_else(|| Error::NotFound("No known terminal emulator is available".to_string()))
    }

    /// Add a user-defined profile and persist it.
    pub fn add_custom(
        &mut self,
        name: &str,
        display_name: &str,
        command: &str,
        separator: &str,
    ) -> Result<()> {
        let name = name.trim();
        let command = command.trim();
        if name.is_empty() {
            return Err(Error::InvalidRequest(
                "Terminal name cannot be empty".to_string(),
            ));
        }
        if command.is_empty() {
            return Err(Error::InvalidRequest(
                "Terminal command cannot be empty".to_string(),
            ));
        }
        if self.find(name).is_some() {
            return Err(Error::InvalidRequest(format!(
                "A terminal named '{}' already exists",
                name
            )));
        }
        if !self.probe.available(command) {
            warn!(command, "Terminal command not found on PATH");
        }

        let display_name = if display_name.trim().is_empty() {
            name
        } else {
            display_name
        };
        self.profiles
            .push(TerminalProfile::custom(name, display_name, command, separator));
        info!(name, command, "Added custom terminal");
        self.save()
    }

    /// Replace a user-defined profile's fields and persist the change.
    /// Built-in profiles cannot be edited.
    pub fn edit(
        &mut self,
        name: &str,
        display_name: &str,
        command: &str,
        separator: &str,
    ) -> Result<()> {
        let command = command.trim();
        if command.is_empty() {
            return Err(Error::InvalidRequest(
                "Terminal command cannot be empty".to_string(),
            ));
        }
        let index = self
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::NotFound(format!("Unknown terminal '{}'", name)))?;
        if self.profiles[index].built_in {
            return Err(Error::InvalidRequest(format!(
                "Built-in terminal '{}' cannot be edited",
                name
            )));
        }
        if !self.probe.available(command) {
            warn!(command, "Terminal command not found on PATH");
        }

        let profile = &mut self.profiles[index];
        profile.display_name = display_name.to_string();
        profile.command = command.to_string();
        profile.separator = separator.to_string();
        info!(name, "Updated terminal profile");
        self.save()
    }

    /// Remove a user-defined profile. The active selection must be moved
    /// off the profile first.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let profile = self
            .find(name)
            .ok_or_else(|| Error::NotFound(format!("Unknown terminal '{}'", name)))?;
        if profile.built_in {
            return Err(Error::InvalidRequest(format!(
                "Built-in terminal '{}' cannot be removed",
                name
            )));
        }
        if self.active.as_deref() == Some(name) {
            return Err(Error::InvalidRequest(format!(
                "'{}' is the selected terminal; select another before removing it",
                name
            )));
        }
        self.profiles.retain(|p| p.name != name);
        info!(name, "Removed terminal profile");
        self.save()
    }

    /// Select the active profile.
    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if self.find(name).is_none() {
            return Err(Error::NotFound(format!("Unknown terminal '{}'", name)));
        }
        self.active = Some(name.to_string());
        info!(name, "Selected terminal");
        self.save()
    }

    /// Discard all custom profiles and re-detect the active terminal.
    /// Detection failure leaves the selection unset.
    pub fn reset_to_defaults(&mut self) -> Result<()> {
        self.profiles.retain(|p| p.built_in);
        self.active = self.detect_default().ok().map(|p| p.name.clone());
        info!(active = ?self.active, "Terminal settings reset to defaults");
        self.save()
    }

    /// Argument vector that opens `payload` in the selected terminal.
    pub fn active_launch_args(&self, payload: &str) -> Result<Vec<String>> {
        let profile = self
            .active_profile()
            .ok_or_else(|| Error::NotFound("No terminal emulator is selected".to_string()))?;
        Ok(build_launch_args(profile, payload))
    }

    fn save(&self) -> Result<()> {
        let settings = TerminalSettings {
            custom: self
                .profiles
                .iter()
                .filter(|p| !p.built_in)
                .map(StoredProfile::from)
                .collect(),
            active: self.active.clone(),
        };
        self.store.save(SETTINGS_FILE, &settings)
    }
}

// ============================================================================
// Tests
// ============================================================================
