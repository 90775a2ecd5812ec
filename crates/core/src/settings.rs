//! Layered configuration: built-in defaults, then a JSON file, then
//! command-line overrides applied with [`ConfigStore::set`]. The tree is
//! resolved once into an immutable [`Settings`] before the loop starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ConfigError;
use crate::types::*;

pub const CONFIG_FILE_NAME: &str = "config.json";
const MAX_SCAN_INTERVAL_SECS: f64 = 86_400.0;
const MAX_COMMAND_TIMEOUT_SECS: f64 = 3_600.0;
const TEMPLATE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Built-in configuration tree.
pub fn defaults() -> Value {
    json!({
        "click_speed": {
            "min_delay": 0.1,
            "max_delay": 0.2,
            "description": "Random delay range between clicks in seconds"
        },
        "image_matching": {
            "threshold": 0.8,
            "description": "Template matching confidence threshold (0.0-1.0)"
        },
        "automation": {
            "scan_interval": 30,
            "random_offset": 2,
            "description": "How often to rescan for the template (seconds, null disables) and click randomization offset in pixels"
        },
        "click_mode": {
            "mode": "template",
            "description": "'template' for image matching, 'coordinates' for fixed coordinates"
        },
        "coordinates": {
            "x": null,
            "y": null,
            "description": "Fixed coordinates for clicking (only used in coordinates mode)"
        },
        "paths": {
            "template_path": "images/default.png",
            "tmp_directory": "tmp",
            "description": "Default template and temporary file locations"
        },
        "logging": {
            "max_file_size_mb": 10,
            "description": "Log file size in MB before it is rotated"
        },
        "device": {
            "command_timeout": 10,
            "description": "Seconds any single adb command may run before it is killed"
        }
    })
}

/// Where the configuration tree came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File(PathBuf),
    Defaults,
    /// No file was found; defaults were written here for the operator to edit.
    DefaultsCreated(PathBuf),
    /// No file was found and writing defaults to `path` failed.
    DefaultsUnsaved { path: PathBuf, error: String },
    /// The file existed but could not be used.
    DefaultsAfterError { path: PathBuf, error: String },
}

impl ConfigOrigin {
    /// Emit the startup line describing this origin.
    pub fn log(&self) {
        match self {
            ConfigOrigin::File(p) => log::info!("loaded configuration from: {}", p.display()),
            ConfigOrigin::Defaults => log::info!("no config file found, using default configuration"),
            ConfigOrigin::DefaultsCreated(p) => {
                log::info!("no config file found, created default configuration file: {}", p.display())
            }
            ConfigOrigin::DefaultsUnsaved { path, error } => {
                log::info!("no config file found, using default configuration");
                log::debug!("could not create default config file {}: {}", path.display(), error);
            }
            ConfigOrigin::DefaultsAfterError { path, error } => {
                log::warn!("failed to load config file {}: {}", path.display(), error);
                log::warn!("using default configuration");
            }
        }
    }
}

/// Nested objects merge key by key; anything else in `overlay` replaces.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (k, v) in overlay {
                let nested = v.is_object() && base.get(&k).map_or(false, Value::is_object);
                if !nested {
                    base.insert(k, v);
                } else if let Some(existing) = base.get_mut(&k) {
                    merge(existing, v);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    tree: Value,
    origin: ConfigOrigin,
    /// Explicit path that did not exist; discovery fell through to the search list.
    missing_explicit: Option<PathBuf>,
}

impl ConfigStore {
    pub fn from_defaults() -> Self {
        Self { tree: defaults(), origin: ConfigOrigin::Defaults, missing_explicit: None }
    }

    /// Defaults overlaid with the JSON file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut tree = defaults();
        merge(&mut tree, file);
        Ok(Self { tree, origin: ConfigOrigin::File(path.to_path_buf()), missing_explicit: None })
    }

    /// Find and load the configuration the way the CLI does: explicit path,
    /// then `./config.json`, then `config.json` beside the executable.
    pub fn load(explicit: Option<&Path>) -> Self {
        let mut search = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
            search.push(dir.join(CONFIG_FILE_NAME));
        }
        Self::discover(explicit, &search, Path::new(CONFIG_FILE_NAME))
    }

    /// Load the first existing candidate. When none exists, use defaults and
    /// try to write them to `create_at`. Runs before logging is up, so what
    /// happened is recorded and emitted later by [`ConfigStore::log_origin`].
    pub fn discover(explicit: Option<&Path>, search: &[PathBuf], create_at: &Path) -> Self {
        let missing_explicit = explicit.filter(|p| !p.exists()).map(Path::to_path_buf);
        let found = explicit
            .filter(|p| p.exists())
            .map(Path::to_path_buf)
            .or_else(|| search.iter().find(|p| p.exists()).cloned());

        let mut store = match found {
            Some(path) => Self::from_file(&path).unwrap_or_else(|e| Self {
                tree: defaults(),
                origin: ConfigOrigin::DefaultsAfterError { path, error: e.to_string() },
                missing_explicit: None,
            }),
            None => {
                let mut store = Self::from_defaults();
                store.origin = match store.save(create_at) {
                    Ok(()) => ConfigOrigin::DefaultsCreated(create_at.to_path_buf()),
                    Err(e) => ConfigOrigin::DefaultsUnsaved {
                        path: create_at.to_path_buf(),
                        error: e.to_string(),
                    },
                };
                store
            }
        };
        store.missing_explicit = missing_explicit;
        store
    }

    pub fn origin(&self) -> &ConfigOrigin {
        &self.origin
    }

    pub fn missing_explicit(&self) -> Option<&Path> {
        self.missing_explicit.as_deref()
    }

    /// Emit the startup lines describing how the configuration was found.
    pub fn log_origin(&self) {
        if let Some(p) = &self.missing_explicit {
            log::warn!("config file {} does not exist, searching default locations", p.display());
        }
        self.origin.log();
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// Value at a dotted path such as `click_speed.min_delay`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.').try_fold(&self.tree, |node, part| node.get(part))
    }

    /// Set a dotted path, creating intermediate objects as needed.
    pub fn set(&mut self, key: &str, value: Value) {
        let mut parts: Vec<&str> = key.split('.').collect();
        let Some(last) = parts.pop() else { return };
        let mut node = &mut self.tree;
        for part in parts {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = match node {
                Value::Object(map) => map.entry(part).or_insert_with(|| Value::Object(Map::new())),
                _ => return,
            };
        }
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Some(m) = node.as_object_mut() {
            m.insert(last.to_string(), value);
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(&self.tree).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn number(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "a number")),
        }
    }

    fn required_number(&self, key: &str) -> Result<f64, ConfigError> {
        self.number(key)?.ok_or_else(|| wrong_type(key, "a number"))
    }

    fn string(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| wrong_type(key, "a string"))
    }

    /// Validate the tree and produce the settings the loop runs with.
    /// `template_override` replaces `paths.template_path`.
    pub fn resolve(&self, template_override: Option<&Path>) -> Result<Settings, ConfigError> {
        let timing = TimingWindow::new(
            self.required_number("click_speed.min_delay")?,
            self.required_number("click_speed.max_delay")?,
        )?;
        let threshold = Threshold::new(self.required_number("image_matching.threshold")?)?;

        let scan_interval = match self.number("automation.scan_interval")? {
            None => None,
            Some(secs) if (1.0..=MAX_SCAN_INTERVAL_SECS).contains(&secs) => Some(Duration::from_secs_f64(secs)),
            Some(secs) => return Err(ConfigError::InvalidScanInterval(secs)),
        };

        let random_offset = match self.get("automation.random_offset") {
            Some(v) => match v.as_i64() {
                Some(n) if n < 0 => return Err(ConfigError::NegativeOffset(n)),
                Some(n) => u32::try_from(n).map_err(|_| wrong_type("automation.random_offset", "a pixel count"))?,
                None => return Err(wrong_type("automation.random_offset", "a non-negative integer")),
            },
            None => 0,
        };

        let mode = self.get("click_mode.mode").cloned().unwrap_or(Value::Null);
        let mode_name: ModeName = serde_json::from_value(mode.clone())
            .map_err(|_| ConfigError::UnknownClickMode(mode.as_str().map_or_else(|| mode.to_string(), str::to_string)))?;

        let click_mode = match mode_name {
            ModeName::Coordinates => ClickMode::Coordinates(self.coordinates()?),
            ModeName::Template => {
                let path = match template_override {
                    Some(p) => p.to_path_buf(),
                    None => PathBuf::from(self.string("paths.template_path")?),
                };
                check_template_path(&path)?;
                ClickMode::Template { path }
            }
        };

        let tmp_dir = PathBuf::from(self.string("paths.tmp_directory")?);

        let log_mb = self.required_number("logging.max_file_size_mb")?;
        if !(log_mb > 0.0 && log_mb.is_finite()) {
            return Err(wrong_type("logging.max_file_size_mb", "a positive number"));
        }
        let timeout = self.required_number("device.command_timeout")?;
        if !(timeout > 0.0 && timeout <= MAX_COMMAND_TIMEOUT_SECS) {
            return Err(wrong_type("device.command_timeout", "between 0 and 3600 seconds"));
        }

        Ok(Settings {
            click_mode,
            threshold,
            timing,
            scan_interval,
            random_offset,
            tmp_dir,
            log_max_bytes: (log_mb * 1024.0 * 1024.0) as u64,
            command_timeout: Duration::from_secs_f64(timeout),
        })
    }

    fn coordinates(&self) -> Result<ScreenPoint, ConfigError> {
        let (x, y) = match (self.number("coordinates.x"), self.number("coordinates.y")) {
            (Ok(Some(x)), Ok(Some(y))) => (x, y),
            (Err(e), _) | (_, Err(e)) => return Err(e),
            _ => return Err(ConfigError::MissingCoordinates),
        };
        if x < 0.0 || y < 0.0 {
            return Err(ConfigError::NegativeCoordinates { x: x as i64, y: y as i64 });
        }
        Ok(ScreenPoint::new(x as u32, y as u32))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ModeName {
    Template,
    Coordinates,
}

fn wrong_type(key: &str, expected: &'static str) -> ConfigError {
    ConfigError::WrongType { key: key.to_string(), expected }
}

/// The reference image must exist and be PNG or JPEG.
pub fn check_template_path(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::TemplateMissing(path.to_path_buf()));
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !TEMPLATE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ConfigError::UnsupportedTemplateFormat(ext));
    }
    Ok(())
}

/// Resolved, validated settings. Built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub click_mode: ClickMode,
    pub threshold: Threshold,
    pub timing: TimingWindow,
    /// `None` disables re-validation after the initial acquisition.
    pub scan_interval: Option<Duration>,
    pub random_offset: u32,
    pub tmp_dir: PathBuf,
    pub log_max_bytes: u64,
    pub command_timeout: Duration,
}

impl Settings {
    pub fn log_summary(&self) {
        log::info!("click mode: {}", self.click_mode.name());
        match &self.click_mode {
            ClickMode::Coordinates(p) => log::info!("click coordinates: {}", p),
            ClickMode::Template { path } => {
                log::info!("template image: {}", path.display());
                log::info!("image threshold: {}", self.threshold.value());
            }
        }
        log::info!("click speed: {}-{}s", self.timing.min(), self.timing.max());
        match self.scan_interval {
            None => log::info!("scan interval: disabled (no rescanning)"),
            Some(d) => log::info!("scan interval: {}s", d.as_secs_f64()),
        }
        log::info!("random offset: {}px", self.random_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn template_file(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, b"not decoded here").unwrap();
        p
    }

    #[test]
    fn get_and_set_dotted_paths() {
        let mut store = ConfigStore::from_defaults();
        assert_eq!(store.get("click_speed.min_delay"), Some(&json!(0.1)));
        assert_eq!(store.get("click_speed.nope"), None);
        store.set("image_matching.threshold", json!(0.9));
        store.set("brand.new.key", json!(true));
        assert_eq!(store.get("image_matching.threshold"), Some(&json!(0.9)));
        assert_eq!(store.get("brand.new.key"), Some(&json!(true)));
    }

    #[test]
    fn merge_keeps_sibling_defaults() {
        let mut base = defaults();
        merge(&mut base, json!({"click_speed": {"max_delay": 0.5}, "extra": 1}));
        assert_eq!(base["click_speed"]["min_delay"], json!(0.1));
        assert_eq!(base["click_speed"]["max_delay"], json!(0.5));
        assert_eq!(base["extra"], json!(1));
    }

    #[test]
    fn defaults_resolve_in_template_mode() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = template_file(dir.path(), "button.PNG");
        let settings = ConfigStore::from_defaults().resolve(Some(&tpl)).unwrap();
        assert_eq!(settings.click_mode, ClickMode::Template { path: tpl });
        assert_eq!(settings.threshold.value(), 0.8);
        assert_eq!(settings.scan_interval, Some(Duration::from_secs(30)));
        assert_eq!(settings.random_offset, 2);
        assert_eq!(settings.log_max_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.command_timeout, Duration::from_secs(10));
    }

    #[test]
    fn coordinates_mode_needs_both_axes() {
        let mut store = ConfigStore::from_defaults();
        store.set("click_mode.mode", json!("coordinates"));
        store.set("coordinates.x", json!(500));
        assert!(matches!(store.resolve(None), Err(ConfigError::MissingCoordinates)));

        store.set("coordinates.y", json!(300));
        let settings = store.resolve(None).unwrap();
        assert_eq!(settings.click_mode, ClickMode::Coordinates(ScreenPoint::new(500, 300)));
    }

    #[test]
    fn negative_coordinates_rejected() {
        let mut store = ConfigStore::from_defaults();
        store.set("click_mode.mode", json!("coordinates"));
        store.set("coordinates.x", json!(-1));
        store.set("coordinates.y", json!(3));
        assert!(matches!(
            store.resolve(None),
            Err(ConfigError::NegativeCoordinates { x: -1, y: 3 })
        ));
    }

    #[test]
    fn coordinates_mode_ignores_template_path() {
        let mut store = ConfigStore::from_defaults();
        store.set("click_mode.mode", json!("coordinates"));
        store.set("coordinates.x", json!(1));
        store.set("coordinates.y", json!(2));
        store.set("paths.template_path", json!("/does/not/exist.png"));
        assert!(store.resolve(None).is_ok());
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = template_file(dir.path(), "t.png");
        let cases: Vec<(&str, Value)> = vec![
            ("click_speed.min_delay", json!(0.5)),
            ("click_speed.max_delay", json!(-1)),
            ("image_matching.threshold", json!(1.5)),
            ("automation.scan_interval", json!(0.5)),
            ("automation.random_offset", json!(-2)),
            ("click_mode.mode", json!("swipe")),
            ("click_speed.min_delay", json!("fast")),
            ("click_speed.max_delay", json!(1e20)),
            ("automation.scan_interval", json!(1e20)),
            ("device.command_timeout", json!(1e20)),
            ("device.command_timeout", json!(0)),
            ("logging.max_file_size_mb", json!(0)),
        ];
        for (key, value) in cases {
            let mut store = ConfigStore::from_defaults();
            store.set(key, value.clone());
            assert!(store.resolve(Some(&tpl)).is_err(), "{key} = {value} should be rejected");
        }
    }

    #[test]
    fn null_scan_interval_disables_rescan() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = template_file(dir.path(), "t.jpeg");
        let mut store = ConfigStore::from_defaults();
        store.set("automation.scan_interval", Value::Null);
        assert_eq!(store.resolve(Some(&tpl)).unwrap().scan_interval, None);
    }

    #[test]
    fn template_checks() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            check_template_path(&dir.path().join("missing.png")),
            Err(ConfigError::TemplateMissing(_))
        ));
        let gif = template_file(dir.path(), "anim.gif");
        assert!(matches!(
            check_template_path(&gif),
            Err(ConfigError::UnsupportedTemplateFormat(ext)) if ext == "gif"
        ));
        assert!(check_template_path(&template_file(dir.path(), "a.JPG")).is_ok());
    }

    #[test]
    fn discover_prefers_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("mine.json");
        fs::write(&explicit, r#"{"image_matching": {"threshold": 0.95}}"#).unwrap();
        let store = ConfigStore::discover(Some(&explicit), &[], &dir.path().join(CONFIG_FILE_NAME));
        assert_eq!(store.origin(), &ConfigOrigin::File(explicit));
        assert_eq!(store.get("image_matching.threshold"), Some(&json!(0.95)));
        assert_eq!(store.get("click_speed.max_delay"), Some(&json!(0.2)));
    }

    #[test]
    fn discover_writes_defaults_when_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(CONFIG_FILE_NAME);
        let store = ConfigStore::discover(None, &[dir.path().join("absent.json")], &target);
        assert_eq!(store.origin(), &ConfigOrigin::DefaultsCreated(target.clone()));
        let reloaded = ConfigStore::from_file(&target).unwrap();
        assert_eq!(reloaded.tree(), store.tree());
    }

    #[test]
    fn discover_records_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let found = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&found, "{}").unwrap();
        let absent = dir.path().join("typo.json");
        let store = ConfigStore::discover(Some(&absent), &[found.clone()], &found);
        assert_eq!(store.missing_explicit(), Some(absent.as_path()));
        assert_eq!(store.origin(), &ConfigOrigin::File(found));
    }

    #[test]
    fn discover_records_unwritable_default_location() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("no-such-dir").join(CONFIG_FILE_NAME);
        let store = ConfigStore::discover(None, &[], &target);
        assert!(matches!(store.origin(), ConfigOrigin::DefaultsUnsaved { path, .. } if *path == target));
        assert_eq!(store.missing_explicit(), None);
        assert_eq!(store.tree(), &defaults());
    }

    #[test]
    fn discover_falls_back_on_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&bad, "{ not json").unwrap();
        let store = ConfigStore::discover(None, &[bad.clone()], &bad);
        assert!(matches!(store.origin(), ConfigOrigin::DefaultsAfterError { path, .. } if *path == bad));
        assert_eq!(store.tree(), &defaults());
    }
}
