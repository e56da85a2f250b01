use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use postbox_common::{address::Classifier, connections::ActiveConnections};

use crate::{DeliveryQueue, MailboxStore};

/// State shared by every session, the drain and the admin interface.
#[derive(Debug)]
pub struct ServerContext {
    classifier: Classifier,
    online: AtomicBool,
    mailboxes: Arc<dyn MailboxStore>,
    queue: DeliveryQueue,
    pop3: Arc<ActiveConnections>,
    smtp: Arc<ActiveConnections>,
}

impl ServerContext {
    /// Starts online with an empty queue.
    #[must_use]
    pub fn new(classifier: Classifier, mailboxes: Arc<dyn MailboxStore>) -> Self {
        Self {
            classifier,
            online: AtomicBool::new(true),
            mailboxes,
            queue: DeliveryQueue::new(),
            pop3: Arc::default(),
            smtp: Arc::default(),
        }
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        self.classifier.hostname()
    }

    #[must_use]
    pub const fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::AcqRel)
    }

    #[must_use]
    pub fn mailboxes(&self) -> &Arc<dyn MailboxStore> {
        &self.mailboxes
    }

    #[must_use]
    pub const fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    #[must_use]
    pub const fn pop3_connections(&self) -> &Arc<ActiveConnections> {
        &self.pop3
    }

    #[must_use]
    pub const fn smtp_connections(&self) -> &Arc<ActiveConnections> {
        &self.smtp
    }
}
