//! Configuration lookup and the store section of the config document.

use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use postbox_common::internal;
use postbox_store::{FileStore, MailboxStore, MemoryStore, StoreError};
use serde::Deserialize;

pub const CONFIG_ENV: &str = "POSTBOX_CONFIG";

const DEFAULT_PATHS: [&str; 2] = ["./postbox.config.ron", "/etc/postbox/postbox.config.ron"];

/// Find the configuration file using the following precedence:
/// 1. `POSTBOX_CONFIG` environment variable
/// 2. ./postbox.config.ron (current working directory)
/// 3. /etc/postbox/postbox.config.ron (system-wide config)
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    if let Some(path) = DEFAULT_PATHS.iter().map(Path::new).find(|path| path.exists()) {
        return Ok(path.to_path_buf());
    }

    let paths_tried = DEFAULT_PATHS
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// The configured name, else `$HOSTNAME`, else `localhost`.
#[must_use]
pub fn resolve_hostname(configured: Option<String>) -> String {
    configured
        .filter(|name| !name.trim().is_empty())
        .or_else(|| env::var("HOSTNAME").ok().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file. Without one, mailboxes live in memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Accounts created when the store starts out empty
    #[serde(default)]
    pub users: Vec<(String, String)>,
}

impl StoreConfig {
    /// Open the configured store, seeding it if it has no users yet.
    pub async fn open(&self) -> Result<Arc<dyn MailboxStore>, StoreError> {
        let store: Arc<dyn MailboxStore> = match &self.path {
            Some(path) => Arc::new(FileStore::open(path).await?),
            None => Arc::new(MemoryStore::new()),
        };

        if store.users().is_empty() && !self.users.is_empty() {
            for (name, password) in &self.users {
                store.add_user(name, password)?;
            }
            internal!(level = INFO, "Seeded {} users", self.users.len());
            store.persist().await?;
        }

        Ok(store)
    }
}
