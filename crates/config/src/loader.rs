//! Config file discovery, loading and persistence.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use {
    anyhow::{Context, bail},
    serde::de::DeserializeOwned,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::WicketConfig};

/// File names tried in each search directory, in order.
const FILE_NAMES: [&str; 4] = ["wicket.toml", "wicket.yaml", "wicket.yml", "wicket.json"];

static DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Serializes read-modify-write cycles on the config file.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Restrict discovery to `path`. The working directory and the user config
/// directory are no longer searched.
pub fn set_config_dir(path: PathBuf) {
    *lock(&DIR_OVERRIDE) = Some(path);
}

pub fn clear_config_dir() {
    *lock(&DIR_OVERRIDE) = None;
}

/// Serialization format, picked from the file extension.
#[derive(Debug, Clone, Copy)]
enum Format {
    Toml,
    Yaml,
    Json,
}

impl Format {
    fn of(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("toml") {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => bail!("unsupported config format: .{other}"),
        }
    }

    fn parse<T: DeserializeOwned>(self, raw: &str) -> anyhow::Result<T> {
        Ok(match self {
            Self::Toml => toml::from_str(raw)?,
            Self::Yaml => serde_yaml::from_str(raw)?,
            Self::Json => serde_json::from_str(raw)?,
        })
    }
}

fn read<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let format = Format::of(path)?;
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    format
        .parse(&substitute_env(&raw))
        .with_context(|| format!("parse {}", path.display()))
}

/// Load a config file in any supported format.
pub fn load_config(path: &Path) -> anyhow::Result<WicketConfig> {
    read(path)
}

/// Load a config file without applying the schema.
pub fn load_config_value(path: &Path) -> anyhow::Result<serde_json::Value> {
    read(path)
}

/// The user config directory: the override if set, else `~/.config/wicket`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = lock(&DIR_OVERRIDE).clone() {
        return Some(dir);
    }
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("wicket"))
}

/// Directories searched for a config file, most specific first.
fn search_dirs() -> Vec<PathBuf> {
    if let Some(dir) = lock(&DIR_OVERRIDE).clone() {
        return vec![dir];
    }
    std::iter::once(PathBuf::new()).chain(config_dir()).collect()
}

fn find_config_file() -> Option<PathBuf> {
    search_dirs()
        .iter()
        .flat_map(|dir| FILE_NAMES.into_iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// The config file in use, or where a new one would be written.
pub fn find_or_default_config_path() -> PathBuf {
    find_config_file().unwrap_or_else(|| {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(FILE_NAMES[0])
    })
}

/// Load the first config file found in `./` then `~/.config/wicket/`.
///
/// A file that fails to load is reported and replaced by defaults. When no
/// file exists, the defaults are also written out for the user to edit.
pub fn discover_and_load() -> WicketConfig {
    let Some(path) = find_config_file() else {
        let config = WicketConfig::default();
        let path = find_or_default_config_path();
        match write_toml(&path, &config) {
            Ok(()) => debug!(path = %path.display(), "wrote default config"),
            Err(e) => warn!(path = %path.display(), error = %e, "could not write default config"),
        }
        return config;
    };

    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "config unusable, using defaults");
        WicketConfig::default()
    })
}

/// Load, modify and save the config while holding the write lock.
/// Returns the path written.
pub fn update_config(f: impl FnOnce(&mut WicketConfig)) -> anyhow::Result<PathBuf> {
    let _guard = lock(&WRITE_LOCK);
    let mut config = discover_and_load();
    f(&mut config);
    save_unlocked(&config)
}

/// Write `config` as TOML to the file in use. Returns the path written.
pub fn save_config(config: &WicketConfig) -> anyhow::Result<PathBuf> {
    let _guard = lock(&WRITE_LOCK);
    save_unlocked(config)
}

fn save_unlocked(config: &WicketConfig) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    write_toml(&path, config)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

fn write_toml(path: &Path, config: &WicketConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(config).context("serialize config")?;
    fs::write(path, text).with_context(|| format!("write {}", path.display()))
}
