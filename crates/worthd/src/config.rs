use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use worth_core::{NormPolicy, DEFAULT_TOP_K};
use worth_models::{AlignMode, ModelOptions, PixelNorm};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Optional settings read from the TOML file named by `WORTH_CONFIG`.
///
/// Every field may be omitted; environment variables override the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub gallery_path: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub bind: Option<String>,
    pub top_k: Option<usize>,
    pub image_size: Option<u32>,
    pub margin: Option<u32>,
    pub align: Option<String>,
    pub norm_policy: Option<String>,
    pub pixel_norm: Option<String>,
    pub detection_threshold: Option<f32>,
    pub max_upload_bytes: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn read(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reference gallery JSON (default: data/reference_data.json).
    pub gallery_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// HTTP listen address.
    pub bind: String,
    /// Number of gallery matches blended into an estimate.
    pub top_k: usize,
    /// Side of the square face crop fed to the embedder.
    pub image_size: u32,
    /// Border around the detected face, in crop pixels.
    pub margin: u32,
    pub align: AlignMode,
    pub norm_policy: NormPolicy,
    pub pixel_norm: PixelNorm,
    /// Minimum SCRFD score for a face.
    pub detection_threshold: f32,
    /// Largest accepted upload.
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gallery_path: PathBuf::from("data/reference_data.json"),
            model_dir: PathBuf::from("models"),
            bind: "0.0.0.0:8000".to_string(),
            top_k: DEFAULT_TOP_K,
            image_size: 160,
            margin: 0,
            align: AlignMode::Crop,
            norm_policy: NormPolicy::Trust,
            pixel_norm: PixelNorm::FACENET,
            detection_threshold: 0.5,
            max_upload_bytes: 10 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from the optional `WORTH_CONFIG` file, then
    /// `WORTH_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("WORTH_CONFIG") {
            Ok(path) => {
                tracing::info!(path = %path, "reading config file");
                FileConfig::read(&path)?
            }
            Err(_) => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge defaults, file values and environment lookups (highest wins).
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let d = Config::default();

        let text = |key: &str, file_value: Option<String>| env(key).or(file_value);

        let config = Self {
            gallery_path: env("WORTH_GALLERY_PATH")
                .map(PathBuf::from)
                .or(file.gallery_path)
                .unwrap_or(d.gallery_path),
            model_dir: env("WORTH_MODEL_DIR")
                .map(PathBuf::from)
                .or(file.model_dir)
                .unwrap_or(d.model_dir),
            bind: text("WORTH_BIND", file.bind).unwrap_or(d.bind),
            top_k: env_parse(&env, "WORTH_TOP_K").or(file.top_k).unwrap_or(d.top_k),
            image_size: env_parse(&env, "WORTH_IMAGE_SIZE")
                .or(file.image_size)
                .unwrap_or(d.image_size),
            margin: env_parse(&env, "WORTH_MARGIN").or(file.margin).unwrap_or(d.margin),
            align: parse_choice("WORTH_ALIGN", text("WORTH_ALIGN", file.align))?
                .unwrap_or(d.align),
            norm_policy: parse_choice("WORTH_NORM_POLICY", text("WORTH_NORM_POLICY", file.norm_policy))?
                .unwrap_or(d.norm_policy),
            pixel_norm: match text("WORTH_PIXEL_NORM", file.pixel_norm) {
                Some(name) => pixel_norm(&name)?,
                None => d.pixel_norm,
            },
            detection_threshold: env_parse(&env, "WORTH_DETECTION_THRESHOLD")
                .or(file.detection_threshold)
                .unwrap_or(d.detection_threshold),
            max_upload_bytes: env_parse(&env, "WORTH_MAX_UPLOAD_BYTES")
                .or(file.max_upload_bytes)
                .unwrap_or(d.max_upload_bytes),
            request_timeout: env_parse(&env, "WORTH_REQUEST_TIMEOUT_SECS")
                .or(file.request_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(d.request_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "top_k",
                reason: "must be at least 1".into(),
            });
        }
        if self.image_size <= self.margin.saturating_mul(2) {
            return Err(ConfigError::Invalid {
                key: "image_size",
                reason: format!("{} leaves no room for margin {}", self.image_size, self.margin),
            });
        }
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(ConfigError::Invalid {
                key: "detection_threshold",
                reason: format!("{} is outside [0, 1]", self.detection_threshold),
            });
        }
        Ok(())
    }

    /// Options for the ONNX normalizer and embedder.
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            model_dir: self.model_dir.clone(),
            image_size: self.image_size,
            margin: self.margin,
            align: self.align,
            detection_threshold: self.detection_threshold,
            pixel_norm: self.pixel_norm,
        }
    }
}

/// Numeric env override; unparsable values are ignored with a warning.
fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable config value");
            None
        }
    }
}

fn parse_choice<T: FromStr<Err = String>>(
    key: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| v.parse().map_err(|reason| ConfigError::Invalid { key, reason }))
        .transpose()
}

fn pixel_norm(name: &str) -> Result<PixelNorm, ConfigError> {
    match name.to_ascii_lowercase().as_str() {
        "facenet" => Ok(PixelNorm::FACENET),
        "arcface" => Ok(PixelNorm::ARCFACE),
        other => Err(ConfigError::Invalid {
            key: "pixel_norm",
            reason: format!("unknown pixel normalization: {other}"),
        }),
    }
}
