use postbox_smtp::client::ClientError;
use postbox_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery processor not initialised")]
    NotInitialised,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Relay error: {0}")]
    Relay(#[from] ClientError),
}
