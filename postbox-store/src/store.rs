use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{Mailbox, Result, StoreError, UserRecord};

/// Registry of users and their mailboxes.
#[async_trait]
pub trait MailboxStore: Send + Sync + Debug {
    fn find_user(&self, name: &str) -> Result<Arc<Mailbox>>;

    /// Names are lower-cased before validation and insertion.
    fn add_user(&self, name: &str, password: &str) -> Result<Arc<Mailbox>>;

    /// Every user, ordered by name.
    fn users(&self) -> Vec<Arc<Mailbox>>;

    /// Write durable state, if this store has any.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Lower-case `name` and check it is 1 to 13 ASCII letters.
pub fn normalise_name(name: &str) -> Result<String> {
    let name = name.to_ascii_lowercase();

    if (1..=13).contains(&name.len()) && name.bytes().all(|b| b.is_ascii_lowercase()) {
        Ok(name)
    } else {
        Err(StoreError::InvalidName(name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<String, Arc<Mailbox>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store
                .users
                .insert(record.name.clone(), Arc::new(Mailbox::from_record(record)));
        }
        store
    }

    #[must_use]
    pub fn records(&self) -> Vec<UserRecord> {
        self.users().iter().map(|mailbox| mailbox.record()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl MailboxStore for MemoryStore {
    fn find_user(&self, name: &str) -> Result<Arc<Mailbox>> {
        self.users
            .get(name)
            .map(|mailbox| Arc::clone(mailbox.value()))
            .ok_or_else(|| StoreError::NoSuchUser(name.to_string()))
    }

    fn add_user(&self, name: &str, password: &str) -> Result<Arc<Mailbox>> {
        let name = normalise_name(name)?;

        match self.users.entry(name) {
            Entry::Occupied(entry) => Err(StoreError::UserExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let mailbox = Arc::new(Mailbox::new(entry.key().clone(), password.to_string()));
                entry.insert(Arc::clone(&mailbox));
                tracing::info!(user = mailbox.name(), "Added user");
                Ok(mailbox)
            }
        }
    }

    fn users(&self) -> Vec<Arc<Mailbox>> {
        let mut users: Vec<_> = self
            .users
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        users.sort_by(|a, b| a.name().cmp(b.name()));
        users
    }
}
