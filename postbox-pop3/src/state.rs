use std::sync::Arc;

use postbox_store::Mailbox;

#[derive(Debug, Default)]
pub enum State {
    /// Waiting for `USER`.
    #[default]
    AuthUser,
    /// `USER` accepted, waiting for `PASS`.
    AuthPass { user: String },
    /// Authenticated; the mailbox owner lock is held.
    Transaction { mailbox: Arc<Mailbox> },
    End,
}

impl State {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AuthUser => "AuthUser",
            Self::AuthPass { .. } => "AuthPass",
            Self::Transaction { .. } => "Transaction",
            Self::End => "End",
        }
    }
}
