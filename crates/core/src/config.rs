use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::{Table, Value};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

/// Environment variable that may shadow `[section] key`, e.g. `DWH_CLUSTER_DB_PASSWORD`.
pub fn override_var(section: &str, key: &str) -> String {
    format!("DWH_{}_{}", section.to_uppercase(), key.to_uppercase())
}

fn render_scalar(section: &str, key: &str, value: &Value) -> Result<String, ConfigError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::Datetime(d) => Ok(d.to_string()),
        Value::Array(_) | Value::Table(_) => Err(ConfigError::Invalid {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a scalar value".to_string(),
        }),
    }
}

// ── ConfigFile ────────────────────────────────────────────────

/// Section/key/value settings persisted as a TOML document.
///
/// Every top-level table is a section. Section names are matched exactly,
/// keys case-insensitively. Reading, changing one key and writing leaves
/// every other key untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    path: Option<PathBuf>,
    sections: Table,
    /// `Some(profile)` once env overrides are enabled (empty = no profile).
    env_profile: Option<String>,
}

impl ConfigFile {
    /// Read and parse the file at `path`. The path is remembered for [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let sections = toml::from_str::<Table>(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), sections = sections.len(), "Config loaded");

        Ok(Self {
            path: Some(path.to_path_buf()),
            sections,
            env_profile: None,
        })
    }

    /// Parse an in-memory document with no backing file.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let sections = toml::from_str::<Table>(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<memory>"),
            source,
        })?;
        Ok(Self {
            path: None,
            sections,
            env_profile: None,
        })
    }

    /// Let `DWH_<SECTION>_<KEY>` environment variables shadow file values.
    ///
    /// Profile is read from `DWH_PROFILE`. When set (e.g. `PROD`), every key is
    /// first looked up as `PROD_DWH_<SECTION>_<KEY>`. Overrides are never written back.
    pub fn with_env_overrides(mut self) -> Self {
        let profile = env_opt("DWH_PROFILE").unwrap_or_default().to_uppercase();
        self.env_profile = Some(profile);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.get(section).is_some_and(Value::is_table)
    }

    /// Look up `[section] key`, returning `None` when either is absent.
    pub fn get_opt(&self, section: &str, key: &str) -> Result<Option<String>, ConfigError> {
        if let Some(profile) = &self.env_profile {
            if let Some(v) = profiled_env_opt(profile, &override_var(section, key)) {
                return Ok(Some(v));
            }
        }

        let Some(table) = self.sections.get(section).and_then(Value::as_table) else {
            return Ok(None);
        };
        match table.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, value)) => render_scalar(section, key, value).map(Some),
            None => Ok(None),
        }
    }

    /// Look up `[section] key`, failing with [`ConfigError::MissingKey`] when absent.
    pub fn get(&self, section: &str, key: &str) -> Result<String, ConfigError> {
        self.get_opt(section, key)?
            .ok_or_else(|| ConfigError::missing(section, key))
    }

    /// Set `[section] key = value`, creating the section if needed.
    ///
    /// An existing key keeps its spelling; new keys are stored lowercase.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let entry = self
            .sections
            .entry(section.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        if !entry.is_table() {
            *entry = Value::Table(Table::new());
        }
        let Value::Table(table) = entry else {
            return;
        };

        let name = table
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned()
            .unwrap_or_else(|| key.to_lowercase());
        table.insert(name, Value::String(value.into()));
    }

    /// Remove `[section] key`. Returns `true` if a value was removed.
    pub fn remove(&mut self, section: &str, key: &str) -> bool {
        let Some(table) = self.sections.get_mut(section).and_then(Value::as_table_mut) else {
            return false;
        };
        let name = table.keys().find(|k| k.eq_ignore_ascii_case(key)).cloned();
        match name {
            Some(name) => table.remove(&name).is_some(),
            None => false,
        }
    }

    /// Serialize every section back to TOML text.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(&self.sections)?)
    }

    /// Write all sections to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = self.to_toml_string()?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Config written");
        Ok(())
    }

    /// Write back to the file this config was loaded from.
    ///
    /// Comments are not kept, and sections and keys are written sorted.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.path.as_ref().ok_or(ConfigError::NoPath)?;
        self.write(path)
    }
}

// ── Tests ────────────────────────────────────────────────────────
