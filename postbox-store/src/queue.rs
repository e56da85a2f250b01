//! Messages accepted for delivery but not yet handed off.

use std::{
    fmt::{self, Display, Formatter},
    net::IpAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use postbox_common::address::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryId(ulid::Ulid);

impl DeliveryId {
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Display for DeliveryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One accepted message and everything needed to deliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    pub id: DeliveryId,
    pub sender: Address,
    pub recipients: Vec<Address>,
    /// Body exactly as collected, CRLF line endings.
    pub body: String,
    pub helo_name: String,
    pub submitting_host: String,
    pub submitting_address: IpAddr,
    pub received_at: DateTime<Utc>,
}

impl PendingDelivery {
    #[must_use]
    pub fn new(
        sender: Address,
        recipients: Vec<Address>,
        body: String,
        helo_name: String,
        submitting_address: IpAddr,
    ) -> Self {
        Self {
            id: DeliveryId::generate(),
            sender,
            recipients,
            body,
            helo_name,
            submitting_host: submitting_address.to_string(),
            submitting_address,
            received_at: Utc::now(),
        }
    }
}

/// Shared, unordered set of pending deliveries.
///
/// Cloning yields another handle onto the same queue.
#[derive(Debug, Clone, Default)]
pub struct DeliveryQueue {
    pending: Arc<DashMap<DeliveryId, PendingDelivery>>,
    draining: Arc<AtomicBool>,
}

impl DeliveryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, delivery: PendingDelivery) -> DeliveryId {
        let id = delivery.id;
        self.pending.insert(id, delivery);
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &DeliveryId) -> Option<PendingDelivery> {
        self.pending.get(id).map(|entry| entry.value().clone())
    }

    /// Copies of every pending delivery, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PendingDelivery> {
        let mut deliveries: Vec<_> = self
            .pending
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        deliveries.sort_by_key(|delivery| delivery.id);
        deliveries
    }

    pub fn remove(&self, id: &DeliveryId) -> Option<PendingDelivery> {
        self.pending.remove(id).map(|(_, delivery)| delivery)
    }

    /// Drop `delivered` from the recipient list, removing the entry once
    /// nobody is left. Returns `true` if the entry was removed.
    pub fn complete_recipients(&self, id: &DeliveryId, delivered: &[Address]) -> bool {
        if let Some(mut entry) = self.pending.get_mut(id) {
            entry
                .recipients
                .retain(|recipient| !delivered.contains(recipient));
        }

        self.pending
            .remove_if(id, |_, delivery| delivery.recipients.is_empty())
            .is_some()
    }

    /// At most one drain runs at a time. `None` means one is already running.
    #[must_use]
    pub fn try_begin_drain(&self) -> Option<DrainGuard> {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard(Arc::clone(&self.draining)))
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }
}

/// Clears the draining flag when dropped.
#[derive(Debug)]
pub struct DrainGuard(Arc<AtomicBool>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
