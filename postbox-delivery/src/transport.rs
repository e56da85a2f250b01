use std::fmt::Debug;

use async_trait::async_trait;
use postbox_smtp::{
    RelayClient, RelayOutcome,
    client::ClientError,
};

/// Outbound hand-off used by the drain for recipients that are not local.
#[async_trait]
pub trait RelayTransport: Send + Sync + Debug {
    async fn relay(
        &self,
        host: &str,
        port: u16,
        sender: &str,
        recipient: &str,
        payload: &str,
    ) -> Result<RelayOutcome, ClientError>;
}

#[async_trait]
impl RelayTransport for RelayClient {
    async fn relay(
        &self,
        host: &str,
        port: u16,
        sender: &str,
        recipient: &str,
        payload: &str,
    ) -> Result<RelayOutcome, ClientError> {
        self.deliver(host, port, sender, recipient, payload).await
    }
}
