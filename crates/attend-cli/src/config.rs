use attend_core::builder::DEFAULT_DATASET_DIR;
use attend_core::gallery::DEFAULT_GALLERY_PATH;
use attend_core::ledger::DEFAULT_LEDGER_PATH;
use attend_core::recognition::{DEFAULT_CADENCE, DEFAULT_SCALE};
use attend_core::ONNX_TOLERANCE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "attend.toml";

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Runtime configuration.
///
/// Layered, last wins: built-in defaults, TOML file, `ATTEND_*` environment
/// variables, command-line flags (applied by the caller).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the labeled image tree.
    pub dataset_dir: PathBuf,
    /// Gallery blob written by `encode` and read by `run`.
    pub gallery_path: PathBuf,
    /// Attendance CSV.
    pub ledger_path: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Capture device index (`/dev/video{N}`).
    pub camera_index: usize,
    /// Maximum Euclidean distance for a positive match. The default is
    /// calibrated for the ONNX encoder, which is the one `run` uses.
    pub tolerance: f32,
    /// Run detection on every Nth frame.
    pub cadence: u32,
    /// Downsampling factor applied before detection.
    pub scale: f32,
    /// Where to write the latest annotated frame, if anywhere.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from(DEFAULT_DATASET_DIR),
            gallery_path: PathBuf::from(DEFAULT_GALLERY_PATH),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            model_dir: default_model_dir(),
            camera_index: 0,
            tolerance: ONNX_TOLERANCE,
            cadence: DEFAULT_CADENCE,
            scale: DEFAULT_SCALE,
            snapshot_path: None,
        }
    }
}

impl Config {
    /// Load defaults, then `path` (or `attend.toml` if present), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigFileError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Override fields from `ATTEND_*` variables. Unparseable numbers are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ATTEND_DATASET_DIR") {
            self.dataset_dir = v.into();
        }
        if let Some(v) = var("ATTEND_GALLERY_PATH") {
            self.gallery_path = v.into();
        }
        if let Some(v) = var("ATTEND_LEDGER_PATH") {
            self.ledger_path = v.into();
        }
        if let Some(v) = var("ATTEND_MODEL_DIR") {
            self.model_dir = v.into();
        }
        if let Some(v) = var("ATTEND_SNAPSHOT_PATH") {
            self.snapshot_path = Some(v.into());
        }
        self.camera_index = parsed(&var, "ATTEND_CAMERA_INDEX", self.camera_index);
        self.tolerance = parsed(&var, "ATTEND_TOLERANCE", self.tolerance);
        self.cadence = parsed(&var, "ATTEND_CADENCE", self.cadence);
        self.scale = parsed(&var, "ATTEND_SCALE", self.scale);
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match var(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            current
        }),
        None => current,
    }
}

/// `$XDG_DATA_HOME/attend/models`, falling back to `~/.local/share/attend/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("attend")
        .join("models")
}
