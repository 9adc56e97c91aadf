//! Persisted settings for sprite cutting.
//!
//! The record is a versioned JSON document. Every field has an explicit
//! default, so partial records load cleanly. Records written before
//! versioning existed (flat key/value maps without a `version` key, using the
//! converter's historical key names) are migrated on load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, EncodeError};
use crate::sprite_ops::encode::{EncodingSettings, OutputFormat};

/// Version written by this build
pub const CONFIG_VERSION: u64 = 1;

/// Recommended blur radius
pub const DEFAULT_SHARPNESS: f32 = 1.5;
/// Recommended noise threshold
pub const DEFAULT_NOISE_THRESHOLD: f32 = 1.0;

/// Sprite cutting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u64,
    /// Directory sprites (and mask previews) are written to
    pub output_dir: PathBuf,
    /// Blur radius applied to the difference before thresholding.
    /// 0 turns smoothing off, 1.5 is recommended, 7 gives paper-cut edges.
    pub sharpness: f32,
    /// Largest summed RGB difference still treated as background.
    /// 0 cleans nothing, 1 is recommended, 20 and above is rarely useful.
    pub noise_threshold: f32,
    /// Process candidates on every available core instead of one
    pub concurrent: bool,
    /// Also write the red/transparent mask preview next to each sprite
    pub save_mask_preview: bool,
    /// Replace the candidate's extension (e.g. `"png"`); `None` keeps it
    pub output_extension: Option<String>,
    pub encoding: EncodingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            output_dir: PathBuf::from("sprites"),
            sharpness: DEFAULT_SHARPNESS,
            noise_threshold: DEFAULT_NOISE_THRESHOLD,
            concurrent: true,
            save_mask_preview: true,
            output_extension: None,
            encoding: EncodingSettings::default(),
        }
    }
}

impl Config {
    /// Parses a JSON record, migrating older layouts first
    ///
    /// # Errors
    ///
    /// * `ConfigError::Parse` - Malformed JSON or a field of the wrong type
    /// * `ConfigError::UnsupportedVersion` - Record written by a newer release
    /// * `ConfigError::InvalidSetting` - A legacy value that cannot be converted
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;
        let value = migrate(value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Loads and migrates the record stored at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Loads `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Writes the record as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_error)
    }

    /// Checks every numeric setting against its accepted domain
    ///
    /// # Errors
    ///
    /// * `ConfigError::InvalidSetting` - For the first offending setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sharpness.is_finite() || self.sharpness < 0.0 {
            return Err(ConfigError::InvalidSetting {
                key: "sharpness",
                reason: format!("must be a finite value >= 0, got {}", self.sharpness),
            });
        }

        if !self.noise_threshold.is_finite() || self.noise_threshold < 0.0 {
            return Err(ConfigError::InvalidSetting {
                key: "noise_threshold",
                reason: format!("must be a finite value >= 0, got {}", self.noise_threshold),
            });
        }

        if let Some(extension) = &self.output_extension {
            if OutputFormat::from_extension(extension).is_none() {
                return Err(ConfigError::InvalidSetting {
                    key: "output_extension",
                    reason: format!("unknown image format `{extension}`"),
                });
            }
        }

        self.encoding.validate().map_err(|e| {
            let key = match &e {
                EncodeError::InvalidSetting { key, .. } => *key,
                _ => "encoding",
            };
            ConfigError::InvalidSetting {
                key,
                reason: e.to_string(),
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum LegacyKind {
    Float,
    Integer,
    Bool,
    Text,
}

/// Historical flat keys and where they live in the current layout
const LEGACY_KEYS: &[(&str, &[&str], LegacyKind)] = &[
    ("sharpness_lvl", &["sharpness"], LegacyKind::Float),
    ("noise_threshold", &["noise_threshold"], LegacyKind::Float),
    ("save_masks_preview", &["save_mask_preview"], LegacyKind::Bool),
    ("save_output_files_as", &["output_extension"], LegacyKind::Text),
    ("place_only_changed_sprites_into", &["output_dir"], LegacyKind::Text),
    ("multithreading", &["concurrent"], LegacyKind::Bool),
    ("compress_level", &["encoding", "png", "compress_level"], LegacyKind::Integer),
    ("lossless", &["encoding", "webp", "lossless"], LegacyKind::Bool),
    ("quality", &["encoding", "webp", "quality"], LegacyKind::Integer),
    ("method", &["encoding", "webp", "method"], LegacyKind::Integer),
];

fn migrate(value: Value) -> Result<Value, ConfigError> {
    let version = match value.get("version") {
        None => 0,
        Some(version) => version.as_u64().ok_or_else(|| ConfigError::InvalidSetting {
            key: "version",
            reason: format!("expected a non-negative integer, got {version}"),
        })?,
    };

    if version > CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion {
            found: version,
            supported: CONFIG_VERSION,
        });
    }

    if version == 0 {
        tracing::info!("migrating unversioned config record to version {CONFIG_VERSION}");
        return migrate_v0(value);
    }

    Ok(value)
}

fn migrate_v0(value: Value) -> Result<Value, ConfigError> {
    let Value::Object(mut legacy) = value else {
        return Err(ConfigError::InvalidSetting {
            key: "config",
            reason: "expected a key/value record".to_string(),
        });
    };

    let mut migrated = Map::new();
    for &(legacy_key, path, kind) in LEGACY_KEYS {
        if let Some(raw) = legacy.remove(legacy_key) {
            let converted = convert_legacy(legacy_key, raw, kind)?;
            if converted.is_null() && legacy_key != "save_output_files_as" {
                continue;
            }
            insert_at(&mut migrated, path, converted);
        }
    }

    // Keys already using the current names pass through untouched
    for (key, raw) in legacy {
        migrated.entry(key).or_insert(raw);
    }
    migrated.insert("version".to_string(), Value::from(CONFIG_VERSION));

    Ok(Value::Object(migrated))
}

fn convert_legacy(key: &'static str, raw: Value, kind: LegacyKind) -> Result<Value, ConfigError> {
    let invalid = |raw: &Value| ConfigError::InvalidSetting {
        key,
        reason: format!("cannot interpret legacy value {raw}"),
    };

    let converted = match (kind, &raw) {
        (LegacyKind::Float, Value::Number(_)) => raw.clone(),
        (LegacyKind::Float, Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid(&raw))?,
        (LegacyKind::Integer, Value::Number(number)) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .map(Value::from)
            .ok_or_else(|| invalid(&raw))?,
        (LegacyKind::Integer, Value::String(text)) => text
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| invalid(&raw))?,
        (LegacyKind::Bool, Value::Bool(_)) => raw.clone(),
        (LegacyKind::Bool, Value::Number(number)) => match number.as_u64() {
            Some(0) => Value::Bool(false),
            Some(1) => Value::Bool(true),
            _ => return Err(invalid(&raw)),
        },
        (LegacyKind::Bool, Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Bool(true),
            "false" | "0" | "no" => Value::Bool(false),
            _ => return Err(invalid(&raw)),
        },
        (LegacyKind::Text, Value::String(text)) if text.trim().is_empty() => Value::Null,
        (LegacyKind::Text, Value::String(text)) if key == "save_output_files_as" => {
            Value::String(text.trim().trim_start_matches('.').to_string())
        }
        (LegacyKind::Text, Value::String(_)) => raw.clone(),
        (_, Value::Null) => Value::Null,
        _ => return Err(invalid(&raw)),
    };

    Ok(converted)
}

fn insert_at(map: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [last] => {
            map.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let child = map
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                insert_at(child, rest, value);
            }
        }
    }
}
