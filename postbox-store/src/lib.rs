pub mod context;
pub mod error;
pub mod mailbox;
pub mod queue;
pub mod snapshot;
pub mod store;

pub use context::ServerContext;
pub use error::{Result, SerializationError, StoreError};
pub use mailbox::{Mailbox, MarkState, StoredMessage, UserRecord};
pub use queue::{DeliveryId, DeliveryQueue, DrainGuard, PendingDelivery};
pub use snapshot::FileStore;
pub use store::{MailboxStore, MemoryStore};
