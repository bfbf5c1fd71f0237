//! Loading, saving and publishing the configuration.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;

use super::{Config, ConfigPaths};
use crate::error::{ConfigError, ImportStage};

/// Wait after an external change notification before reading the file.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);
/// How long our own writes keep the watcher quiet. Must exceed the OS
/// notification coalescing latency.
pub const SUPPRESSION_WINDOW: Duration = Duration::from_millis(500);

const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTimings {
    pub settle: Duration,
    pub suppression: Duration,
}

impl Default for StoreTimings {
    fn default() -> Self {
        StoreTimings {
            settle: SETTLE_DELAY,
            suppression: SUPPRESSION_WINDOW,
        }
    }
}

/// Published configuration shared with the dispatch path.
///
/// Writers install a new value; readers never lock.
#[derive(Debug, Clone)]
pub struct ConfigHandle(Arc<ArcSwap<Config>>);

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        ConfigHandle(Arc::new(ArcSwap::from_pointee(config)))
    }

    /// Cheap guard for the per-event path.
    pub fn current(&self) -> Guard<Arc<Config>> {
        self.0.load()
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.0.load_full()
    }

    pub(crate) fn publish(&self, config: Arc<Config>) {
        self.0.store(config);
    }
}

/// What the watcher should do with a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDecision {
    /// The change is our own write.
    Suppressed,
    /// Reload once the settle delay has passed.
    ReloadAt(Instant),
}

pub struct ConfigStore {
    paths: ConfigPaths,
    timings: StoreTimings,
    handle: ConfigHandle,
    suppress_until: Mutex<Option<Instant>>,
}

impl ConfigStore {
    pub fn new(paths: ConfigPaths, timings: StoreTimings) -> Self {
        ConfigStore {
            paths,
            timings,
            handle: ConfigHandle::new(Config::default()),
            suppress_until: Mutex::new(None),
        }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn handle(&self) -> ConfigHandle {
        self.handle.clone()
    }

    pub fn current(&self) -> Arc<Config> {
        self.handle.snapshot()
    }

    /// Load the configuration from disk and publish it.
    ///
    /// A missing file is created with the seed shortcuts. A file that does not
    /// parse is replaced by the seed shortcuts as well.
    pub fn load(&self) -> Result<Arc<Config>, ConfigError> {
        fs::create_dir_all(&self.paths.dir)
            .map_err(|e| ConfigError::io("create", &self.paths.dir, e))?;

        if !self.paths.file.exists() {
            tracing::info!(path = %self.paths.file.display(), "no configuration found, writing defaults");
            return self.save(Config::seed());
        }

        match self.read_file() {
            Ok(config) => Ok(self.publish(config, "loaded")),
            Err(e @ ConfigError::Parse { .. }) => {
                tracing::warn!(error = %e, "configuration is corrupt, restoring defaults");
                self.save(Config::seed())
            }
            Err(e) => Err(e),
        }
    }

    /// Write `config` to disk and publish it.
    ///
    /// The published value is updated only once the file is in place, so a
    /// failed save leaves everything as it was.
    pub fn save(&self, config: Config) -> Result<Arc<Config>, ConfigError> {
        let json = config.to_json()?;

        self.suppress_from(Instant::now());
        if let Err(e) = write_atomically(&self.paths, &json) {
            *self.suppress_until.lock() = None;
            tracing::error!(error = %e, "failed to save configuration");
            return Err(e);
        }
        self.suppress_from(Instant::now());

        Ok(self.publish(config, "saved"))
    }

    /// Re-read the file after an external edit. On failure the current
    /// configuration stays published.
    pub fn reload(&self) -> Result<Arc<Config>, ConfigError> {
        match self.read_file() {
            Ok(config) => Ok(self.publish(config, "reloaded")),
            Err(e) => {
                tracing::warn!(error = %e, "failed to reload configuration, keeping previous shortcuts");
                Err(e)
            }
        }
    }

    /// Replace the configuration with a user-supplied JSON document.
    pub fn import_json(&self, text: &str) -> Result<Arc<Config>, ConfigError> {
        let config = parse_import(text)?;
        self.save(config)
    }

    pub fn on_notification(&self, now: Instant) -> WatchDecision {
        if let Some(until) = *self.suppress_until.lock()
            && now < until
        {
            return WatchDecision::Suppressed;
        }
        WatchDecision::ReloadAt(now + self.timings.settle)
    }

    fn suppress_from(&self, now: Instant) {
        *self.suppress_until.lock() = Some(now + self.timings.suppression);
    }

    fn read_file(&self) -> Result<Config, ConfigError> {
        let path = &self.paths.file;
        // Bytes, not a string: bad encoding is corruption, not an I/O failure.
        let content = fs::read(path).map_err(|e| ConfigError::io("read", path, e))?;
        serde_json::from_slice(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })
    }

    fn publish(&self, config: Config, reason: &str) -> Arc<Config> {
        let config = Arc::new(config);
        self.handle.publish(Arc::clone(&config));

        tracing::info!(count = config.shortcuts.len(), "configuration {}", reason);
        for (key, target) in config.shortcuts.sorted() {
            tracing::debug!("  {} → {}", key, target);
        }
        config
    }
}

fn write_atomically(paths: &ConfigPaths, json: &str) -> Result<(), ConfigError> {
    fs::create_dir_all(&paths.dir).map_err(|e| ConfigError::io("create", &paths.dir, e))?;

    let tmp = temp_path(&paths.file);
    fs::write(&tmp, json).map_err(|e| ConfigError::io("write", &tmp, e))?;
    fs::rename(&tmp, &paths.file).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ConfigError::io("replace", &paths.file, e)
    })
}

fn temp_path(file: &Path) -> std::path::PathBuf {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    file.with_file_name(format!(".{}.tmp", name))
}

/// Validate and decode an imported document without applying it.
///
/// Whitespace and a leading byte-order mark are stripped, the text is parsed
/// as generic JSON, re-serialized, and then decoded into [`Config`].
pub fn parse_import(text: &str) -> Result<Config, ConfigError> {
    let cleaned = text.trim().trim_start_matches(BYTE_ORDER_MARK).trim_start();

    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| import_error(ImportStage::Syntax, &e))?;

    if !value.is_object() {
        return Err(ConfigError::Import {
            stage: ImportStage::Structure,
            line: 1,
            column: 1,
            message: "top-level value must be an object".to_string(),
        });
    }

    let normalized = serde_json::to_string_pretty(&value).map_err(ConfigError::Serialize)?;
    serde_json::from_str::<Config>(&normalized).map_err(|e| {
        // Report the position in the text the user gave us where possible.
        match serde_json::from_str::<Config>(cleaned) {
            Err(original) => import_error(ImportStage::Schema, &original),
            Ok(_) => import_error(ImportStage::Schema, &e),
        }
    })
}

fn import_error(stage: ImportStage, e: &serde_json::Error) -> ConfigError {
    ConfigError::Import {
        stage,
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LaunchTarget, Settings, ShortcutTable};
    use crate::keymap::KeyId;

    fn store_in(dir: &Path) -> ConfigStore {
        ConfigStore::new(ConfigPaths::in_dir(dir.join("KeyBoy")), StoreTimings::default())
    }

    fn custom_config() -> Config {
        Config {
            shortcuts: ShortcutTable::new()
                .with(KeyId::parse("k").unwrap(), LaunchTarget::new("/Applications/Kitty.app"))
                .with(KeyId::parse(";").unwrap(), LaunchTarget::new("/Applications/Notes.app")),
            settings: Settings {
                show_notifications: true,
                play_sound: false,
            },
        }
    }

    #[test]
    fn test_load_missing_writes_seed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());

        let loaded = store.load().unwrap();

        assert_eq!(*loaded, Config::seed());
        assert_eq!(*store.current(), Config::seed());
        let on_disk: Config =
            serde_json::from_str(&fs::read_to_string(&store.paths().file).unwrap()).unwrap();
        assert_eq!(on_disk, Config::seed());
    }

    #[test]
    fn test_load_malformed_restores_seed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        fs::create_dir_all(&store.paths().dir).unwrap();
        fs::write(&store.paths().file, "{ \"shortcuts\": { \"g\": ").unwrap();

        let loaded = store.load().unwrap();

        assert_eq!(*loaded, Config::seed());
        let on_disk: Config =
            serde_json::from_str(&fs::read_to_string(&store.paths().file).unwrap()).unwrap();
        assert_eq!(on_disk, Config::seed());
    }

    #[test]
    fn test_load_invalid_utf8_restores_seed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        fs::create_dir_all(&store.paths().dir).unwrap();
        fs::write(&store.paths().file, [0xff, 0xfe, 0x00, 0x7b]).unwrap();

        let loaded = store.load().unwrap();

        assert_eq!(*loaded, Config::seed());
        let on_disk: Config =
            serde_json::from_str(&fs::read_to_string(&store.paths().file).unwrap()).unwrap();
        assert_eq!(on_disk, Config::seed());
    }

    #[test]
    fn test_load_keeps_shortcuts_with_null_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        fs::create_dir_all(&store.paths().dir).unwrap();
        let json = r#"{"shortcuts":{"k":"/Applications/Kitty.app"},"settings":null}"#;
        fs::write(&store.paths().file, json).unwrap();

        let loaded = store.load().unwrap();

        assert_eq!(loaded.shortcuts.len(), 1);
        assert_eq!(loaded.settings, Settings::default());
        assert_eq!(fs::read_to_string(&store.paths().file).unwrap(), json);
    }

    #[test]
    fn test_load_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        fs::create_dir_all(&store.paths().dir).unwrap();
        fs::write(&store.paths().file, custom_config().to_json().unwrap()).unwrap();

        store.load().unwrap();

        assert_eq!(*store.current(), custom_config());
    }

    #[test]
    fn test_save_publishes_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        store.load().unwrap();
        let handle = store.handle();

        store.save(custom_config()).unwrap();

        assert_eq!(**handle.current(), custom_config());
        assert!(!temp_path(&store.paths().file).exists());
    }

    #[test]
    fn test_save_failure_leaves_published_config() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the directory should be.
        let blocker = tmp.path().join("KeyBoy");
        fs::write(&blocker, "").unwrap();
        let store = ConfigStore::new(ConfigPaths::in_dir(&blocker), StoreTimings::default());

        assert!(store.save(custom_config()).is_err());
        assert_eq!(*store.current(), Config::default());
        assert!(matches!(
            store.on_notification(Instant::now()),
            WatchDecision::ReloadAt(_)
        ));
    }

    #[test]
    fn test_notification_suppressed_after_save() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        store.load().unwrap();

        let now = Instant::now();
        assert_eq!(store.on_notification(now), WatchDecision::Suppressed);

        let later = now + SUPPRESSION_WINDOW + Duration::from_millis(1);
        assert_eq!(
            store.on_notification(later),
            WatchDecision::ReloadAt(later + SETTLE_DELAY)
        );
    }

    #[test]
    fn test_reload_picks_up_external_edit() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        store.load().unwrap();

        fs::write(&store.paths().file, custom_config().to_json().unwrap()).unwrap();
        store.reload().unwrap();

        assert_eq!(*store.current(), custom_config());
    }

    #[test]
    fn test_failed_reload_keeps_last_good() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        store.load().unwrap();

        fs::write(&store.paths().file, "not json").unwrap();

        assert!(store.reload().is_err());
        assert_eq!(*store.current(), Config::seed());
    }

    #[test]
    fn test_import_ignores_byte_order_mark() {
        let json = custom_config().to_json().unwrap();
        let with_bom = format!("\u{feff}{}", json);

        assert_eq!(parse_import(&with_bom).unwrap(), parse_import(&json).unwrap());
        assert_eq!(parse_import(&with_bom).unwrap(), custom_config());
    }

    #[test]
    fn test_import_syntax_error_position() {
        let text = "{\n  \"shortcuts\": {\n    \"g\": \"/Applications/Ghostty.app\",,\n  }\n}";

        match parse_import(text) {
            Err(ConfigError::Import {
                stage, line, column, ..
            }) => {
                assert_eq!(stage, ImportStage::Syntax);
                assert_eq!(line, 3);
                assert!(column > 0);
            }
            other => panic!("expected import error, got {:?}", other),
        }
    }

    #[test]
    fn test_import_rejects_non_object() {
        assert!(matches!(
            parse_import("[1, 2, 3]"),
            Err(ConfigError::Import {
                stage: ImportStage::Structure,
                ..
            })
        ));
    }

    #[test]
    fn test_import_schema_error() {
        let text = r#"{ "shortcuts": { "g": 42 } }"#;

        assert!(matches!(
            parse_import(text),
            Err(ConfigError::Import {
                stage: ImportStage::Schema,
                line: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_failed_import_changes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        store.load().unwrap();
        let before = fs::read_to_string(&store.paths().file).unwrap();

        assert!(store.import_json(r#"{ "shortcuts": "nope" }"#).is_err());

        assert_eq!(*store.current(), Config::seed());
        assert_eq!(fs::read_to_string(&store.paths().file).unwrap(), before);
    }

    #[test]
    fn test_import_applies_whole_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        store.load().unwrap();

        store
            .import_json(&format!("\u{feff}  {}\n", custom_config().to_json().unwrap()))
            .unwrap();

        assert_eq!(*store.current(), custom_config());
    }
}
