//! Configuration for KeyBoy
//!
//! The shortcut table and user settings, their JSON schema, and the store that
//! keeps them in sync with `shortcuts.json`.

mod store;
mod watcher;

pub use store::{
    ConfigHandle, ConfigStore, SETTLE_DELAY, SUPPRESSION_WINDOW, StoreTimings, WatchDecision,
    parse_import,
};
pub use watcher::ConfigWatcher;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::keymap::KeyId;

const APP_DIR_NAME: &str = "KeyBoy";
const CONFIG_FILE_NAME: &str = "shortcuts.json";

const DEFAULT_SHORTCUTS: [(&str, &str); 5] = [
    ("g", "/Applications/Ghostty.app"),
    ("a", "/Applications/Arc.app"),
    ("s", "/Applications/Slack.app"),
    ("c", "/Applications/Claude.app"),
    ("z", "/Applications/zoom.us.app"),
];

/// Path of an application bundle to start or bring to the front.
///
/// Not validated; the launcher reports missing bundles when they are used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LaunchTarget(Arc<str>);

impl LaunchTarget {
    pub fn new(path: impl AsRef<str>) -> Self {
        LaunchTarget(Arc::from(path.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key → application mapping.
///
/// Never edited once published; reloads build a new table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct ShortcutTable {
    entries: HashMap<KeyId, LaunchTarget>,
}

impl ShortcutTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: KeyId, target: LaunchTarget) -> Self {
        self.entries.insert(key, target);
        self
    }

    pub fn get(&self, key: KeyId) -> Option<&LaunchTarget> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by key, for logs and listings.
    pub fn sorted(&self) -> Vec<(KeyId, &LaunchTarget)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(k, t)| (*k, t)).collect();
        entries.sort_by_key(|(k, _)| *k);
        entries
    }
}

impl FromIterator<(KeyId, LaunchTarget)> for ShortcutTable {
    fn from_iter<I: IntoIterator<Item = (KeyId, LaunchTarget)>>(iter: I) -> Self {
        ShortcutTable {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, String>> for ShortcutTable {
    fn from(raw: BTreeMap<String, String>) -> Self {
        raw.into_iter()
            .filter_map(|(key, path)| match KeyId::parse(&key) {
                Some(id) => Some((id, LaunchTarget::new(path))),
                None => {
                    tracing::warn!(key = %key, "ignoring shortcut for unsupported key");
                    None
                }
            })
            .collect()
    }
}

impl From<ShortcutTable> for BTreeMap<String, String> {
    fn from(table: ShortcutTable) -> Self {
        table
            .entries
            .into_iter()
            .map(|(k, t)| (k.to_string(), t.as_str().to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Post a user notification when a launch fails.
    #[serde(default)]
    pub show_notifications: bool,
    /// Play a sound with those notifications.
    #[serde(default)]
    pub play_sound: bool,
}

/// Contents of `shortcuts.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub shortcuts: ShortcutTable,
    #[serde(default, deserialize_with = "settings_or_default")]
    pub settings: Settings,
}

/// `"settings": null` reads the same as a missing key.
fn settings_or_default<'de, D>(deserializer: D) -> Result<Settings, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Settings>::deserialize(deserializer)?.unwrap_or_default())
}

impl Config {
    /// The starter table written when no configuration exists yet.
    pub fn seed() -> Self {
        let shortcuts = DEFAULT_SHORTCUTS
            .iter()
            .filter_map(|(key, path)| Some((KeyId::parse(key)?, LaunchTarget::new(path))))
            .collect();

        Config {
            shortcuts,
            settings: Settings::default(),
        }
    }

    /// Pretty-printed JSON, as written to disk.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Where the configuration lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub dir: PathBuf,
    pub file: PathBuf,
}

impl ConfigPaths {
    /// `<config dir>/KeyBoy/shortcuts.json`; on macOS the config dir is
    /// `~/Library/Application Support`.
    pub fn default_location() -> Result<Self, ConfigError> {
        let dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join(APP_DIR_NAME);
        Ok(Self::in_dir(dir))
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let file = dir.join(CONFIG_FILE_NAME);
        ConfigPaths { dir, file }
    }

    pub fn from_file(file: impl AsRef<Path>) -> Self {
        let file = file.as_ref().to_path_buf();
        let dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        ConfigPaths { dir, file }
    }

    pub(crate) fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.file.file_name()
    }
}
