use crate::api;
use crate::bootstrap::{self, BootstrapResources};
use crate::config::YapperConfig;
use crate::database::Database;
use crate::sessions::SessionRegistry;
use anyhow::Result;

/// Convenience wrapper that bootstraps the backend once and hands out
/// cloned handles for whichever entrypoint (CLI command or REST server)
/// needs them.
pub struct YapperNode {
    config: YapperConfig,
    bootstrap: BootstrapResources,
    sessions: SessionRegistry,
}

impl YapperNode {
    /// Prepares directories, opens the store and creates the process-wide
    /// session registry.
    pub async fn start(config: YapperConfig) -> Result<Self> {
        let bootstrap = bootstrap::initialize(&config).await?;

        tracing::info!(
            directories_created = ?bootstrap.directories_created,
            database_initialized = bootstrap.database_initialized,
            db_path = %config.paths.db_path.display(),
            "yapper node initialized"
        );

        Ok(Self {
            config,
            bootstrap,
            sessions: SessionRegistry::new(),
        })
    }

    /// Runs the REST API server until shutdown.
    pub async fn run_http_server(&self) -> Result<()> {
        api::serve_http(self.config.clone(), self.database(), self.sessions.clone()).await
    }

    pub fn config(&self) -> &YapperConfig {
        &self.config
    }

    /// Returns a clone of the database handle.
    pub fn database(&self) -> Database {
        self.bootstrap.database.clone()
    }

    /// Returns the live session registry.
    pub fn sessions(&self) -> SessionRegistry {
        self.sessions.clone()
    }
}
