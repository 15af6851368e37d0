use anyhow::{anyhow, Result};
use rand::RngCore;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct YapperConfig {
    pub api_port: u16,
    pub paths: YapperPaths,
    pub session: SessionConfig,
    pub file: FileConfig,
    pub allowed_origins: Vec<String>,
}

impl YapperConfig {
    pub fn from_env() -> Result<Self> {
        let paths = match env::var("YAPPER_HOME") {
            Ok(raw) if !raw.trim().is_empty() => YapperPaths::from_base_dir(raw.trim())?,
            _ => YapperPaths::discover()?,
        };
        let api_port = env::var("YAPPER_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(1337);
        let allowed_origins = env::var("YAPPER_ALLOWED_ORIGINS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(Self {
            api_port,
            paths,
            session: SessionConfig::from_env(),
            file: FileConfig::from_env(),
            allowed_origins,
        })
    }

    pub fn new(api_port: u16, paths: YapperPaths, session: SessionConfig) -> Self {
        Self {
            api_port,
            paths,
            session,
            file: FileConfig::default(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct SessionConfig {
    /// Secret the session credential MAC key is derived from.
    pub secret: String,
    pub ttl_secs: i64,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl SessionConfig {
    pub const DEFAULT_TTL_SECS: i64 = 3_600;

    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs: Self::DEFAULT_TTL_SECS,
        }
    }

    pub fn from_env() -> Self {
        let secret = env::var("YAPPER_SESSION_SECRET")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| {
                tracing::warn!(
                    "YAPPER_SESSION_SECRET not set; generated an ephemeral secret, sessions will not survive a restart"
                );
                let mut bytes = [0u8; 32];
                rand::rng().fill_bytes(&mut bytes);
                bytes.iter().map(|b| format!("{b:02x}")).collect()
            });
        let ttl_secs = env::var("YAPPER_SESSION_TTL_SECS")
            .ok()
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|ttl| *ttl > 0)
            .unwrap_or(Self::DEFAULT_TTL_SECS);
        Self { secret, ttl_secs }
    }
}

#[derive(Debug, Clone)]
pub struct FileConfig {
    pub max_upload_bytes: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl FileConfig {
    pub fn from_env() -> Self {
        let max_upload_bytes = env::var("YAPPER_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(Self::default().max_upload_bytes);
        Self { max_upload_bytes }
    }
}

#[derive(Debug, Clone, Default)]
pub struct YapperPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub files_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl YapperPaths {
    pub fn discover() -> Result<Self> {
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("yapper.db");
        let files_dir = base.join("files");
        let uploads_dir = files_dir.join("uploads");
        let logs_dir = base.join("logs");

        Ok(Self {
            base,
            data_dir,
            db_path,
            files_dir,
            uploads_dir,
            logs_dir,
        })
    }
}
