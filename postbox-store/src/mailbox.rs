//! A single user's mailbox.
//!
//! Only [`UserRecord`] is durable. Deletion marks and the owner lock belong to
//! the running server and are never written to a snapshot.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkState {
    #[default]
    Unmarked,
    Marked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    headers: String,
    body: String,
}

impl StoredMessage {
    /// Split on the first blank line once CRLF has been normalised to LF.
    ///
    /// Text without a blank line is all headers.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.replace("\r\n", "\n");

        match text.split_once("\n\n") {
            Some((headers, body)) => Self {
                headers: headers.to_string(),
                body: body.to_string(),
            },
            None => Self {
                headers: text,
                body: String::new(),
            },
        }
    }

    #[must_use]
    pub fn headers(&self) -> &str {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Headers, a blank line, then the body.
    #[must_use]
    pub fn text(&self) -> String {
        format!("{}\n\n{}", self.headers, self.body)
    }

    /// Octet count of [`StoredMessage::text`].
    #[must_use]
    pub fn size(&self) -> usize {
        self.headers.len() + 2 + self.body.len()
    }
}

/// The persistent part of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub password: String,
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug)]
struct Entry {
    message: StoredMessage,
    mark: MarkState,
}

#[derive(Debug)]
pub struct Mailbox {
    name: String,
    password: String,
    entries: Mutex<Vec<Entry>>,
    owner: AtomicBool,
}

impl Mailbox {
    pub(crate) fn new(name: String, password: String) -> Self {
        Self::from_record(UserRecord {
            name,
            password,
            messages: Vec::new(),
        })
    }

    pub(crate) fn from_record(record: UserRecord) -> Self {
        Self {
            name: record.name,
            password: record.password,
            entries: Mutex::new(
                record
                    .messages
                    .into_iter()
                    .map(|message| Entry {
                        message,
                        mark: MarkState::Unmarked,
                    })
                    .collect(),
            ),
            owner: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn check_password(&self, password: &str) -> bool {
        self.password == password
    }

    /// Take exclusive ownership for a session. Returns `false` if another
    /// session already holds it.
    #[must_use]
    pub fn try_lock_owner(&self) -> bool {
        self.owner
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release_owner(&self) {
        self.owner.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Acquire)
    }

    /// Returns the new message count.
    pub fn append_message(&self, text: &str) -> usize {
        let mut entries = self.entries.lock();
        entries.push(Entry {
            message: StoredMessage::parse(text),
            mark: MarkState::Unmarked,
        });
        entries.len()
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Sum of every message size, marked or not.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.entries.lock().iter().map(|e| e.message.size()).sum()
    }

    /// Count and total size of the messages not marked for deletion.
    #[must_use]
    pub fn unmarked_summary(&self) -> (usize, usize) {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.mark == MarkState::Unmarked)
            .fold((0, 0), |(count, size), e| (count + 1, size + e.message.size()))
    }

    /// Sizes of every message in position order.
    #[must_use]
    pub fn sizes(&self) -> Vec<usize> {
        self.entries.lock().iter().map(|e| e.message.size()).collect()
    }

    /// Position and size of each unmarked message. Positions stay those of
    /// the full mailbox.
    #[must_use]
    pub fn unmarked_sizes(&self) -> Vec<(usize, usize)> {
        self.entries
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.mark == MarkState::Unmarked)
            .map(|(index, e)| (index, e.message.size()))
            .collect()
    }

    pub fn message_state(&self, index: usize) -> Result<MarkState> {
        self.with_entry(index, |entry| entry.mark)
    }

    pub fn set_message_state(&self, index: usize, state: MarkState) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(index)
            .ok_or(StoreError::NoSuchMessage(index))?;
        entry.mark = state;
        Ok(())
    }

    pub fn message(&self, index: usize) -> Result<StoredMessage> {
        self.with_entry(index, |entry| entry.message.clone())
    }

    pub fn message_headers(&self, index: usize) -> Result<String> {
        self.with_entry(index, |entry| entry.message.headers.clone())
    }

    pub fn message_body(&self, index: usize) -> Result<String> {
        self.with_entry(index, |entry| entry.message.body.clone())
    }

    pub fn message_size(&self, index: usize) -> Result<usize> {
        self.with_entry(index, |entry| entry.message.size())
    }

    pub fn delete_message(&self, index: usize) -> Result<StoredMessage> {
        let mut entries = self.entries.lock();
        if index >= entries.len() {
            return Err(StoreError::NoSuchMessage(index));
        }
        Ok(entries.remove(index).message)
    }

    /// Forget every deletion mark.
    pub fn reset_marks(&self) {
        for entry in self.entries.lock().iter_mut() {
            entry.mark = MarkState::Unmarked;
        }
    }

    /// Remove every marked message. Returns how many were removed.
    pub fn commit_marked(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.mark == MarkState::Unmarked);
        before - entries.len()
    }

    #[must_use]
    pub fn record(&self) -> UserRecord {
        UserRecord {
            name: self.name.clone(),
            password: self.password.clone(),
            messages: self
                .entries
                .lock()
                .iter()
                .map(|entry| entry.message.clone())
                .collect(),
        }
    }

    fn with_entry<T>(&self, index: usize, f: impl FnOnce(&Entry) -> T) -> Result<T> {
        self.entries
            .lock()
            .get(index)
            .map(f)
            .ok_or(StoreError::NoSuchMessage(index))
    }
}
