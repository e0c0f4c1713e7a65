//! Payment coordinator: the single writer of the debt ledger.
//!
//! Every producer (send path, receive path, callback handlers) posts a
//! [`CoordinatorCommand`] through a [`CoordinatorHandle`]. One worker
//! drains the bounded queue in arrival order, so ledger updates and the
//! gateway calls they trigger never interleave.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};

use meter_core::config::{ClaimPolicy, PaymentConfig};
use meter_core::{PaymentMessage, PeerId};

use crate::correlator::SessionCorrelator;
use crate::gateway::{CommandRequest, Gateway, ResponseRequest};
use crate::ledger::{DebtLedger, DebtSnapshot};
use crate::notifier::PeerNotifier;

pub enum CoordinatorCommand {
    RegisterSent {
        peer: PeerId,
        bytes: u64,
    },
    RegisterReceived {
        peer: PeerId,
        bytes: u64,
    },
    InitiatePayment {
        peer: PeerId,
        payment_request: String,
    },
    PaymentCommand {
        peer: PeerId,
        command_id: String,
        command_body: Bytes,
        command_type: i32,
        session_id: String,
    },
    PaymentResponse {
        peer: PeerId,
        command_id: String,
        command_reply: Bytes,
        session_id: String,
    },
    PaymentStatus {
        peer: PeerId,
        session_id: String,
        status: bool,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<DebtSnapshot>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("payment coordinator stopped")]
    Stopped,
}

/// Cloneable producer side of the coordinator queue.
///
/// Every method waits for queue space; none of them drop a command.
/// Once the worker has exited they fail with [`CoordinatorError::Stopped`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// A handle plus the receiver to hand to [`Coordinator::new`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CoordinatorCommand>) {
        let (command_tx, command_rx) = mpsc::channel(capacity.max(1));
        (Self { command_tx }, command_rx)
    }

    async fn send(&self, command: CoordinatorCommand) -> Result<(), CoordinatorError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| CoordinatorError::Stopped)
    }

    pub async fn register_sent(&self, peer: PeerId, bytes: u64) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::RegisterSent { peer, bytes })
            .await
    }

    pub async fn register_received(
        &self,
        peer: PeerId,
        bytes: u64,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::RegisterReceived { peer, bytes })
            .await
    }

    pub async fn handle_initiate_payment(
        &self,
        peer: PeerId,
        payment_request: String,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::InitiatePayment {
            peer,
            payment_request,
        })
        .await
    }

    pub async fn handle_payment_command(
        &self,
        peer: PeerId,
        command_id: String,
        command_body: Bytes,
        command_type: i32,
        session_id: String,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::PaymentCommand {
            peer,
            command_id,
            command_body,
            command_type,
            session_id,
        })
        .await
    }

    pub async fn handle_payment_response(
        &self,
        peer: PeerId,
        command_id: String,
        command_reply: Bytes,
        session_id: String,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::PaymentResponse {
            peer,
            command_id,
            command_reply,
            session_id,
        })
        .await
    }

    pub async fn handle_payment_status_response(
        &self,
        peer: PeerId,
        session_id: String,
        status: bool,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::PaymentStatus {
            peer,
            session_id,
            status,
        })
        .await
    }

    /// Route a payment payload received from `peer` to its command.
    pub async fn dispatch(
        &self,
        peer: PeerId,
        payment: PaymentMessage,
    ) -> Result<(), CoordinatorError> {
        match payment {
            PaymentMessage::InitiatePayment { payment_request } => {
                self.handle_initiate_payment(peer, payment_request).await
            }
            PaymentMessage::PaymentCommand {
                command_id,
                command_body,
                command_type,
                session_id,
            } => {
                self.handle_payment_command(
                    peer,
                    command_id,
                    command_body,
                    command_type,
                    session_id,
                )
                .await
            }
            PaymentMessage::PaymentResponse {
                command_id,
                command_reply,
                session_id,
            } => {
                self.handle_payment_response(peer, command_id, command_reply, session_id)
                    .await
            }
            PaymentMessage::PaymentStatusResponse { session_id, status } => {
                self.handle_payment_status_response(peer, session_id, status)
                    .await
            }
        }
    }

    /// Every debt record, taken between two commands.
    pub async fn debts(&self) -> Result<Vec<DebtSnapshot>, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::Stopped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub threshold_bytes: u64,
    pub claim_policy: ClaimPolicy,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&PaymentConfig::default())
    }
}

impl From<&PaymentConfig> for CoordinatorSettings {
    fn from(config: &PaymentConfig) -> Self {
        Self {
            threshold_bytes: config.threshold_bytes,
            claim_policy: config.claim_policy,
        }
    }
}

pub struct Coordinator {
    ledger: DebtLedger,
    gateway: Arc<dyn Gateway>,
    notifier: Arc<dyn PeerNotifier>,
    correlator: SessionCorrelator,
    settings: CoordinatorSettings,
    command_rx: mpsc::Receiver<CoordinatorCommand>,
    shutdown: broadcast::Receiver<()>,
}

impl Coordinator {
    pub fn new(
        command_rx: mpsc::Receiver<CoordinatorCommand>,
        gateway: Arc<dyn Gateway>,
        notifier: Arc<dyn PeerNotifier>,
        correlator: SessionCorrelator,
        settings: CoordinatorSettings,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            ledger: DebtLedger::new(),
            gateway,
            notifier,
            correlator,
            settings,
            command_rx,
            shutdown,
        }
    }

    /// Process commands until shutdown. The command being handled when
    /// shutdown arrives completes; nothing queued after it runs.
    pub async fn run(mut self) {
        tracing::info!(
            threshold = self.settings.threshold_bytes,
            policy = ?self.settings.claim_policy,
            "payment coordinator started"
        );
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    tracing::info!("payment coordinator shutting down");
                    return;
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(c) => self.handle(c).await,
                        None => {
                            tracing::info!("all coordinator handles dropped, exiting");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::RegisterSent { peer, bytes } => {
                self.register_sent(peer, bytes).await
            }
            CoordinatorCommand::RegisterReceived { peer, bytes } => {
                let debt = self.ledger.get_or_create(peer);
                debt.received_bytes = debt.received_bytes.saturating_add(bytes);
                tracing::debug!(
                    peer = %peer.short(),
                    bytes,
                    total = debt.received_bytes,
                    "registered received bytes"
                );
            }
            CoordinatorCommand::InitiatePayment {
                peer,
                payment_request,
            } => self.initiate_payment(peer, payment_request).await,
            CoordinatorCommand::PaymentCommand {
                peer,
                command_id,
                command_body,
                command_type,
                session_id,
            } => {
                let request = CommandRequest {
                    command_id,
                    command_type,
                    command_body,
                    node_id: peer.to_hex(),
                    session_id,
                };
                if let Err(e) = self.gateway.process_command(request).await {
                    tracing::error!(peer = %peer.short(), error = %e, "process command failed");
                }
            }
            CoordinatorCommand::PaymentResponse {
                peer,
                command_id,
                command_reply,
                session_id,
            } => {
                let response = ResponseRequest {
                    command_id,
                    response_body: command_reply,
                    node_id: peer.to_hex(),
                    session_id,
                };
                if let Err(e) = self.gateway.process_response(response).await {
                    tracing::error!(peer = %peer.short(), error = %e, "process response failed");
                }
            }
            CoordinatorCommand::PaymentStatus {
                peer,
                session_id,
                status,
            } => self.settle(peer, session_id, status).await,
            CoordinatorCommand::Snapshot { reply } => {
                let _ = reply.send(self.ledger.snapshot());
            }
        }
    }

    async fn register_sent(&mut self, peer: PeerId, bytes: u64) {
        let amount = {
            let debt = self.ledger.get_or_create(peer);
            debt.transferred_bytes = debt.transferred_bytes.saturating_add(bytes);
            if debt.transferred_bytes < self.settings.threshold_bytes {
                tracing::debug!(
                    peer = %peer.short(),
                    bytes,
                    pending = debt.transferred_bytes,
                    "registered sent bytes"
                );
                return;
            }
            debt.transferred_bytes
        };

        // Bytes stay pending on failure so the next send retries.
        let payment_request = match self.gateway.create_payment_info(amount).await {
            Ok(claim) => claim,
            Err(e) => {
                tracing::error!(
                    peer = %peer.short(),
                    amount,
                    error = %e,
                    "create payment info failed"
                );
                return;
            }
        };

        self.notifier
            .notify(peer, PaymentMessage::InitiatePayment { payment_request });

        let debt = self.ledger.get_or_create(peer);
        debt.requested_amount = debt.requested_amount.saturating_add(amount);
        debt.transferred_bytes = 0;
        tracing::info!(
            peer = %peer.short(),
            amount,
            requested = debt.requested_amount,
            "settlement requested"
        );
    }

    async fn initiate_payment(&mut self, peer: PeerId, payment_request: String) {
        let reject = self.settings.claim_policy == ClaimPolicy::Reject;

        match self.gateway.validate_payment(&payment_request).await {
            Ok(quantity) => {
                let received = self.ledger.get_or_create(peer).received_bytes;
                if quantity > received {
                    tracing::warn!(
                        peer = %peer.short(),
                        claimed = quantity,
                        received,
                        "claim exceeds bytes received"
                    );
                    if reject {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(peer = %peer.short(), error = %e, "claim validation failed");
                if reject {
                    return;
                }
            }
        }

        match self
            .gateway
            .process_payment(&payment_request, &peer.to_hex())
            .await
        {
            Ok(session_id) => {
                tracing::info!(
                    peer = %peer.short(),
                    session_id = %session_id,
                    "payment session opened"
                );
                self.correlator.open(session_id, peer).await;
            }
            Err(e) => {
                tracing::error!(peer = %peer.short(), error = %e, "process payment failed");
            }
        }
    }

    async fn settle(&mut self, peer: PeerId, session_id: String, status: bool) {
        if !status {
            // Not final. No retry is attempted.
            tracing::info!(
                peer = %peer.short(),
                session_id = %session_id,
                "settlement not confirmed"
            );
            return;
        }

        let trx = match self.gateway.get_transaction(&session_id).await {
            Ok(trx) => trx,
            Err(e) => {
                tracing::error!(
                    peer = %peer.short(),
                    session_id = %session_id,
                    error = %e,
                    "transaction lookup failed"
                );
                return;
            }
        };

        let debt = self.ledger.get_or_create(peer);
        if trx.amount_out > debt.requested_amount {
            tracing::warn!(
                peer = %peer.short(),
                settled = trx.amount_out,
                requested = debt.requested_amount,
                "settled more than requested"
            );
        }
        debt.requested_amount = debt.requested_amount.saturating_sub(trx.amount_out);
        tracing::info!(
            peer = %peer.short(),
            session_id = %session_id,
            settled = trx.amount_out,
            requested = debt.requested_amount,
            "settlement confirmed"
        );
    }
}
