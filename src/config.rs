//! Configuration management for TuneHub Server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub provider: StorageProvider,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    /// Root directory for the local backend
    pub local_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
}

impl StorageProvider {
    /// Region used when `S3_REGION` is unset
    pub fn default_region(self) -> &'static str {
        match self {
            StorageProvider::R2 => "auto",
            _ => "us-east-1",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StorageProvider::Minio => "minio",
            StorageProvider::R2 => "r2",
            StorageProvider::S3 => "s3",
            StorageProvider::B2 => "b2",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Bucket receiving audio files
    pub audio_bucket: String,
    /// Bucket receiving cover images
    pub image_bucket: String,
    /// `Cache-Control: max-age` applied to stored objects
    pub cache_control_seconds: u32,
    /// Request body limit for the upload endpoint
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the principal id, set by the upstream identity provider
    pub principal_header: String,
}

pub const DEFAULT_AUDIO_BUCKET: &str = "songs";
pub const DEFAULT_IMAGE_BUCKET: &str = "images";
pub const DEFAULT_CACHE_CONTROL_SECONDS: u32 = 3600;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_PRINCIPAL_HEADER: &str = "x-user-id";

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            audio_bucket: DEFAULT_AUDIO_BUCKET.to_string(),
            image_bucket: DEFAULT_IMAGE_BUCKET.to_string(),
            cache_control_seconds: DEFAULT_CACHE_CONTROL_SECONDS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                provider: StorageProvider::Minio,
                endpoint: "http://localhost:9000".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
                local_path: PathBuf::from("./data/objects"),
            },
            database: DatabaseConfig {
                url: "sqlite:./tunehub.db".to_string(),
            },
            upload: UploadConfig::default(),
            auth: AuthConfig {
                principal_header: DEFAULT_PRINCIPAL_HEADER.to_string(),
            },
        }
    }
}

/// Configuration that cannot be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set when STORAGE_BACKEND=s3")]
    MissingS3Variable(&'static str),
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, fallback: &str| lookup(name).unwrap_or_else(|| fallback.to_string());

        let backend = match var("STORAGE_BACKEND", "s3").to_lowercase().as_str() {
            "local" => StorageBackend::Local,
            _ => StorageBackend::S3,
        };

        // S3 credentials are only mandatory when the S3 backend is selected
        let s3_var = |name: &'static str, fallback: &str| -> Result<String, ConfigError> {
            match (backend, lookup(name)) {
                (_, Some(value)) => Ok(value),
                (StorageBackend::S3, None) => Err(ConfigError::MissingS3Variable(name)),
                (StorageBackend::Local, None) => Ok(fallback.to_string()),
            }
        };

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST", "0.0.0.0"),
                port: var("SERVER_PORT", "3000").parse().unwrap_or(3000),
            },
            storage: StorageConfig {
                backend,
                provider: match var("S3_PROVIDER", "minio").to_lowercase().as_str() {
                    "r2" => StorageProvider::R2,
                    "s3" => StorageProvider::S3,
                    "b2" => StorageProvider::B2,
                    _ => StorageProvider::Minio,
                },
                endpoint: s3_var("S3_ENDPOINT", "http://localhost:9000")?,
                access_key: s3_var("S3_ACCESS_KEY", "")?,
                secret_key: s3_var("S3_SECRET_KEY", "")?,
                region: lookup("S3_REGION"),
                local_path: PathBuf::from(var("LOCAL_STORAGE_PATH", "./data/objects")),
            },
            database: DatabaseConfig {
                url: var("DATABASE_URL", "sqlite:./tunehub.db"),
            },
            upload: UploadConfig {
                audio_bucket: var("AUDIO_BUCKET", DEFAULT_AUDIO_BUCKET),
                image_bucket: var("IMAGE_BUCKET", DEFAULT_IMAGE_BUCKET),
                cache_control_seconds: lookup("CACHE_CONTROL_SECONDS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CACHE_CONTROL_SECONDS),
                max_upload_bytes: lookup("MAX_UPLOAD_BYTES")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            },
            auth: AuthConfig {
                principal_header: var("PRINCIPAL_HEADER", DEFAULT_PRINCIPAL_HEADER),
            },
        })
    }
}
