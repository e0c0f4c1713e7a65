//! Payment-aware network: accounts every envelope crossing the transport.

use std::sync::Arc;

use async_trait::async_trait;

use meter_core::wire::WireError;
use meter_core::{Envelope, PeerId};

use crate::coordinator::{CoordinatorError, CoordinatorHandle};

/// Envelope delivery to a connected peer.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send_envelope(&self, peer: PeerId, envelope: &Envelope) -> std::io::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    #[error("wire: {0}")]
    Wire(#[from] WireError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

pub struct PaymentNetwork<T: Transport> {
    transport: Arc<T>,
    coordinator: CoordinatorHandle,
}

impl<T: Transport> PaymentNetwork<T> {
    pub fn new(transport: Arc<T>, coordinator: CoordinatorHandle) -> Self {
        Self {
            transport,
            coordinator,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Send and, once delivered, account the block bytes it carried.
    pub async fn send_message(&self, peer: PeerId, envelope: Envelope) -> Result<(), NetworkError> {
        let bytes = envelope.block_bytes();
        self.transport.send_envelope(peer, &envelope).await?;
        if bytes > 0 {
            self.coordinator.register_sent(peer, bytes).await?;
        }
        Ok(())
    }

    /// Account an incoming envelope and hand its payment payload, if any,
    /// to the coordinator. The envelope is returned for block processing.
    pub async fn receive_message(
        &self,
        peer: PeerId,
        envelope: Envelope,
    ) -> Result<Envelope, NetworkError> {
        let bytes = envelope.block_bytes();
        if bytes > 0 {
            self.coordinator.register_received(peer, bytes).await?;
        }
        if let Some(payment) = envelope.payment.clone() {
            tracing::debug!(peer = %peer.short(), kind = payment.kind(), "payment received");
            self.coordinator.dispatch(peer, payment).await?;
        }
        Ok(envelope)
    }

    /// Decode one raw frame from `peer` and receive it.
    pub async fn receive_frame(
        &self,
        peer: PeerId,
        frame: &[u8],
    ) -> Result<Envelope, NetworkError> {
        let envelope = Envelope::decode(frame)?;
        self.receive_message(peer, envelope).await
    }
}
