use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// Number of live sessions for one protocol.
#[derive(Debug, Default)]
pub struct ActiveConnections(AtomicUsize);

impl ActiveConnections {
    /// Count a new session until the returned guard is dropped.
    #[must_use]
    pub fn enter(self: &Arc<Self>) -> ConnectionGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard(Arc::clone(self))
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct ConnectionGuard(Arc<ActiveConnections>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.0.fetch_sub(1, Ordering::AcqRel);
    }
}
