//! Mailbox store backed by a single snapshot file.
//!
//! The whole user table is encoded with bincode and replaced atomically on
//! every [`MailboxStore::persist`] call.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use postbox_common::internal;
use tokio::{fs, sync::Mutex};

use crate::{Mailbox, MailboxStore, MemoryStore, Result, UserRecord};

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    writer: Arc<Mutex<()>>,
}

impl FileStore {
    /// Load `path` if it exists, otherwise start empty. Missing parent
    /// directories are created.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let inner = if fs::try_exists(&path).await? {
            let bytes = fs::read(&path).await?;
            let (records, _): (Vec<UserRecord>, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
            internal!(
                level = INFO,
                "Loaded {} users from {}",
                records.len(),
                path.display()
            );
            MemoryStore::from_records(records)
        } else {
            MemoryStore::new()
        };

        Ok(Self {
            path,
            inner,
            writer: Arc::default(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl MailboxStore for FileStore {
    fn find_user(&self, name: &str) -> Result<Arc<Mailbox>> {
        self.inner.find_user(name)
    }

    fn add_user(&self, name: &str, password: &str) -> Result<Arc<Mailbox>> {
        self.inner.add_user(name, password)
    }

    fn users(&self) -> Vec<Arc<Mailbox>> {
        self.inner.users()
    }

    async fn persist(&self) -> Result<()> {
        let _writer = self.writer.lock().await;

        let bytes =
            bincode::serde::encode_to_vec(self.inner.records(), bincode::config::standard())?;

        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "store".into(), |name| name.to_string_lossy());
        let temp = self.path.with_file_name(format!(".tmp_{file_name}"));

        fs::write(&temp, &bytes).await?;
        fs::rename(&temp, &self.path).await?;

        internal!(
            level = DEBUG,
            "Wrote {} bytes to {}",
            bytes.len(),
            self.path.display()
        );

        Ok(())
    }
}
