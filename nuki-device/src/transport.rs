//! The GATT link the session drives

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::TransportError;

/// Called for every indication or notification, with the source characteristic.
///
/// Runs on the transport's receive path and must not block.
pub type NotificationHandler = Arc<dyn Fn(Uuid, &[u8]) + Send + Sync>;

/// A connection to one Nuki device.
///
/// Implementations are bound to a single peripheral. Connecting an already
/// connected transport is a no-op.
#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn is_connected(&self) -> bool;

    /// Characteristics discovered on the connected peripheral
    async fn characteristics(&self) -> Result<Vec<Uuid>, TransportError>;

    /// Write with response
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError>;

    /// Enables indications on `characteristic`
    async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError>;

    /// Replaces the handler that receives every notification
    fn set_notification_handler(&self, handler: NotificationHandler);
}
