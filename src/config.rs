use anyhow::{Context, Result};
use faceverify_vision::model::{
    ARCFACE_MODEL_FILE, DETECTOR_MODEL_FILE, FACENET_MODEL_FILE, SFACE_MODEL_FILE,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::profile::ModelProfile;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("FACEVERIFY_CONFIG_PATH").unwrap_or("/usr/local/etc/faceverify/config.toml"),
    )
});

pub static MODEL_DIR: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEVERIFY_MODEL_DIR").unwrap_or("/usr/local/share/faceverify"))
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub max_upload_bytes: usize,
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5001)),
            max_upload_bytes: 10 * 1024 * 1024,
            cors: true,
        }
    }
}

/// Which backend produces embeddings. Selected once, at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum ProviderConfig {
    Onnx(OnnxConfig),
    Remote(RemoteConfig),
    Histogram,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Histogram
    }
}

impl ProviderConfig {
    pub fn profile(&self) -> ModelProfile {
        match self {
            ProviderConfig::Onnx(cfg) => cfg.profile,
            ProviderConfig::Remote(cfg) => cfg.profile,
            ProviderConfig::Histogram => ModelProfile::PixelHistogram,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnnxConfig {
    pub profile: ModelProfile,
    pub detector_model: PathBuf,
    /// Defaults to the stock export for `profile` under [`MODEL_DIR`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recognizer_model: Option<PathBuf>,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            profile: ModelProfile::Sface,
            detector_model: MODEL_DIR.join(DETECTOR_MODEL_FILE),
            recognizer_model: None,
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

impl OnnxConfig {
    /// Recognizer to load for `profile`. `None` when the profile has no
    /// local model and none was configured.
    pub fn recognizer_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.recognizer_model {
            return Some(path.clone());
        }
        let file = match self.profile {
            ModelProfile::Sface => SFACE_MODEL_FILE,
            ModelProfile::ArcFace => ARCFACE_MODEL_FILE,
            ModelProfile::Facenet => FACENET_MODEL_FILE,
            ModelProfile::DlibResnet | ModelProfile::PixelHistogram => return None,
        };
        Some(MODEL_DIR.join(file))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub profile: ModelProfile,
    /// Base URL of a service exposing `POST /get-embedding`.
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            profile: ModelProfile::DlibResnet,
            url: "http://localhost:5002".to_string(),
            timeout_secs: 30,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.provider.profile(), ModelProfile::PixelHistogram);
        assert_eq!(cfg.server.bind.port(), 5001);
    }

    #[test]
    fn parses_onnx_section() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            bind = "127.0.0.1:8080"

            [provider]
            backend = "onnx"
            profile = "arc-face"
            recognizer_model = "/models/arcface.onnx"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.bind.port(), 8080);
        assert!(cfg.server.cors);
        let ProviderConfig::Onnx(onnx) = &cfg.provider else {
            panic!("expected onnx provider, got {:?}", cfg.provider);
        };
        assert_eq!(onnx.profile, ModelProfile::ArcFace);
        assert_eq!(
            onnx.recognizer_path(),
            Some(PathBuf::from("/models/arcface.onnx"))
        );
        assert_eq!(onnx.detector_model, MODEL_DIR.join(DETECTOR_MODEL_FILE));
        assert_eq!(onnx.nms_threshold, 0.3);
    }

    #[test]
    fn recognizer_defaults_follow_profile() {
        let cfg: Config = toml::from_str(
            r#"
            [provider]
            backend = "onnx"
            profile = "arc-face"
            "#,
        )
        .unwrap();
        let ProviderConfig::Onnx(onnx) = &cfg.provider else {
            panic!("expected onnx provider, got {:?}", cfg.provider);
        };
        assert_eq!(onnx.recognizer_path(), Some(MODEL_DIR.join(ARCFACE_MODEL_FILE)));

        let expected = [
            (ModelProfile::Sface, Some(SFACE_MODEL_FILE)),
            (ModelProfile::ArcFace, Some(ARCFACE_MODEL_FILE)),
            (ModelProfile::Facenet, Some(FACENET_MODEL_FILE)),
            (ModelProfile::DlibResnet, None),
            (ModelProfile::PixelHistogram, None),
        ];
        for (profile, file) in expected {
            let onnx = OnnxConfig {
                profile,
                ..OnnxConfig::default()
            };
            assert_eq!(onnx.recognizer_path(), file.map(|f| MODEL_DIR.join(f)), "{profile}");
        }
    }

    #[test]
    fn parses_remote_section() {
        let cfg: Config = toml::from_str(
            r#"
            [provider]
            backend = "remote"
            url = "http://face:5001"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.provider.profile(), ModelProfile::DlibResnet);
        let ProviderConfig::Remote(remote) = cfg.provider else {
            panic!("expected remote provider");
        };
        assert_eq!(remote.url, "http://face:5001");
        assert_eq!(remote.timeout_secs, 30);
    }

    #[test]
    fn rejects_unknown_backend() {
        let res: Result<Config, _> = toml::from_str("[provider]\nbackend = \"dlib\"\n");
        assert!(res.is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = Config {
            server: ServerConfig {
                cors: false,
                ..ServerConfig::default()
            },
            provider: ProviderConfig::Remote(RemoteConfig {
                timeout_secs: 5,
                ..RemoteConfig::default()
            }),
        };
        save_config(&cfg, Some(&path)).unwrap();

        assert_eq!(load_config(Some(&path)).unwrap(), cfg);
    }
}
