//! Peer notifier: piggybacks payment payloads on per-peer outgoing queues.
//!
//! Each peer gets a [`PeerQueue`] with its own worker. The worker
//! coalesces queued content into one envelope per flush and attaches at
//! most one payment payload to it.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};

use meter_core::{Envelope, PaymentMessage, PeerId};

use crate::network::{PaymentNetwork, Transport};

/// Delivers a payment payload to a peer without blocking the caller.
/// Delivery is best-effort.
pub trait PeerNotifier: Send + Sync {
    fn notify(&self, peer: PeerId, payment: PaymentMessage);
}

enum QueueItem {
    Content(Envelope),
    Payment(PaymentMessage),
}

struct PeerQueue {
    tx: mpsc::Sender<QueueItem>,
}

/// Outgoing message queues, one per peer, created on first use.
pub struct PeerQueues<T: Transport> {
    queues: DashMap<PeerId, PeerQueue>,
    network: Arc<PaymentNetwork<T>>,
    capacity: usize,
    shutdown: broadcast::Sender<()>,
}

impl<T: Transport> PeerQueues<T> {
    pub fn new(
        network: Arc<PaymentNetwork<T>>,
        capacity: usize,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            queues: DashMap::new(),
            network,
            capacity: capacity.max(1),
            shutdown,
        }
    }

    fn sender(&self, peer: PeerId) -> mpsc::Sender<QueueItem> {
        self.queues
            .entry(peer)
            .or_insert_with(|| self.start(peer))
            .tx
            .clone()
    }

    fn start(&self, peer: PeerId) -> PeerQueue {
        let (tx, rx) = mpsc::channel(self.capacity);
        let worker = QueueWorker {
            peer,
            rx,
            network: self.network.clone(),
            shutdown: self.shutdown.subscribe(),
        };
        tokio::spawn(worker.run());
        tracing::debug!(peer = %peer.short(), "peer queue started");
        PeerQueue { tx }
    }

    /// Queue ordinary block/want content for `peer`. Waits for space.
    pub async fn enqueue(&self, peer: PeerId, envelope: Envelope) {
        let tx = self.sender(peer);
        if tx.send(QueueItem::Content(envelope)).await.is_err() {
            tracing::warn!(peer = %peer.short(), "peer queue closed, content dropped");
        }
    }

    /// Stop the queue for a disconnected peer. Already queued items
    /// are still flushed.
    pub fn remove(&self, peer: &PeerId) {
        if self.queues.remove(peer).is_some() {
            tracing::debug!(peer = %peer.short(), "peer queue removed");
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

impl<T: Transport> PeerNotifier for PeerQueues<T> {
    fn notify(&self, peer: PeerId, payment: PaymentMessage) {
        let kind = payment.kind();
        match self.sender(peer).try_send(QueueItem::Payment(payment)) {
            Ok(()) => tracing::debug!(peer = %peer.short(), kind, "payment queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(peer = %peer.short(), kind, "peer queue full, payment dropped")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(peer = %peer.short(), kind, "peer queue closed, payment dropped")
            }
        }
    }
}

struct QueueWorker<T: Transport> {
    peer: PeerId,
    rx: mpsc::Receiver<QueueItem>,
    network: Arc<PaymentNetwork<T>>,
    shutdown: broadcast::Receiver<()>,
}

impl<T: Transport> QueueWorker<T> {
    /// Flush loop. Each envelope takes at most one payload; draining stops
    /// at the next one, which is carried into the following flush. Later
    /// items stay in the bounded channel, so a backlog makes `notify` drop.
    async fn run(mut self) {
        let mut carried: Option<PaymentMessage> = None;

        loop {
            let mut envelope = Envelope::default();
            let mut payment = carried.take();

            // A carried payload goes out without waiting.
            if payment.is_none() {
                tokio::select! {
                    _ = self.shutdown.recv() => return,
                    item = self.rx.recv() => match item {
                        Some(QueueItem::Content(content)) => envelope.merge_content(content),
                        Some(QueueItem::Payment(p)) => payment = Some(p),
                        None => return,
                    },
                }
            }
            while let Ok(item) = self.rx.try_recv() {
                match item {
                    QueueItem::Content(content) => envelope.merge_content(content),
                    QueueItem::Payment(p) if payment.is_none() => payment = Some(p),
                    QueueItem::Payment(p) => {
                        carried = Some(p);
                        break;
                    }
                }
            }
            envelope.payment = payment;

            if envelope.is_empty() {
                continue;
            }
            if let Err(e) = self.network.send_message(self.peer, envelope).await {
                tracing::warn!(peer = %self.peer.short(), error = %e, "flush failed");
            }
        }
    }
}
