//! Envelope: the application view of one block-exchange message.
//!
//! Block and want content is carried opaquely; this crate only needs to
//! size it for accounting. The payment slot is typed.

use bytes::Bytes;
use prost::Message as _;

use crate::payment::PaymentMessage;
use crate::wire::{self, message as pb, WireError, MAX_ENVELOPE_SIZE};

pub use crate::wire::message::wantlist::WantType;
pub use crate::wire::message::BlockPresenceType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WantEntry {
    pub cid: Bytes,
    pub priority: i32,
    pub cancel: bool,
    pub want_type: WantType,
    pub send_dont_have: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub prefix: Bytes,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPresence {
    pub cid: Bytes,
    pub presence: BlockPresenceType,
}

/// One outgoing or incoming block-exchange message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub wants: Vec<WantEntry>,
    pub full_wantlist: bool,
    /// Legacy raw blocks.
    pub blocks: Vec<Bytes>,
    pub payload: Vec<Block>,
    pub block_presences: Vec<BlockPresence>,
    pub payment: Option<PaymentMessage>,
}

impl Envelope {
    /// An envelope carrying only a payment payload.
    pub fn with_payment(payment: PaymentMessage) -> Self {
        Self {
            payment: Some(payment),
            ..Default::default()
        }
    }

    /// Bytes of block data carried: the quantity peers pay for.
    /// Want entries, presences and payment control are free.
    pub fn block_bytes(&self) -> u64 {
        let legacy: usize = self.blocks.iter().map(Bytes::len).sum();
        let payload: usize = self.payload.iter().map(|b| b.data.len()).sum();
        (legacy + payload) as u64
    }

    pub fn has_payment(&self) -> bool {
        self.payment.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.wants.is_empty()
            && self.blocks.is_empty()
            && self.payload.is_empty()
            && self.block_presences.is_empty()
            && self.payment.is_none()
    }

    /// Merge ordinary block/want content from `other` into `self`.
    /// The payment slot is left alone; callers attach it explicitly.
    pub fn merge_content(&mut self, other: Envelope) {
        self.wants.extend(other.wants);
        self.full_wantlist |= other.full_wantlist;
        self.blocks.extend(other.blocks);
        self.payload.extend(other.payload);
        self.block_presences.extend(other.block_presences);
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        wire::Message::from(self.clone()).encode_to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() > MAX_ENVELOPE_SIZE {
            return Err(WireError::TooLarge(buf.len()));
        }
        Ok(wire::Message::decode(buf)?.into())
    }
}

// ── Proto conversions ─────────────────────────────────────────────────────────

/// The wantlist is always written, even when empty, the same way existing
/// block-exchange peers encode it. Re-encoding a decoded frame is therefore
/// byte-identical only when the frame already carried field 1; a frame
/// without it comes back two bytes longer (`0x0a 0x00`).
impl From<Envelope> for wire::Message {
    fn from(env: Envelope) -> Self {
        let wantlist = pb::Wantlist {
            entries: env
                .wants
                .into_iter()
                .map(|w| pb::wantlist::Entry {
                    block: w.cid.to_vec(),
                    priority: w.priority,
                    cancel: w.cancel,
                    want_type: w.want_type as i32,
                    send_dont_have: w.send_dont_have,
                })
                .collect(),
            full: env.full_wantlist,
        };

        wire::Message {
            wantlist: Some(wantlist),
            blocks: env.blocks.into_iter().map(|b| b.to_vec()).collect(),
            payload: env
                .payload
                .into_iter()
                .map(|b| pb::Block {
                    prefix: b.prefix.to_vec(),
                    data: b.data.to_vec(),
                })
                .collect(),
            block_presences: env
                .block_presences
                .into_iter()
                .map(|p| pb::BlockPresence {
                    cid: p.cid.to_vec(),
                    r#type: p.presence as i32,
                })
                .collect(),
            payment_message: env.payment.map(Into::into),
        }
    }
}

impl From<wire::Message> for Envelope {
    fn from(msg: wire::Message) -> Self {
        let wantlist = msg.wantlist.unwrap_or_default();

        Envelope {
            wants: wantlist
                .entries
                .into_iter()
                .map(|e| WantEntry {
                    cid: Bytes::from(e.block),
                    priority: e.priority,
                    cancel: e.cancel,
                    want_type: WantType::try_from(e.want_type).unwrap_or(WantType::Block),
                    send_dont_have: e.send_dont_have,
                })
                .collect(),
            full_wantlist: wantlist.full,
            blocks: msg.blocks.into_iter().map(Bytes::from).collect(),
            payload: msg
                .payload
                .into_iter()
                .map(|b| Block {
                    prefix: Bytes::from(b.prefix),
                    data: Bytes::from(b.data),
                })
                .collect(),
            block_presences: msg
                .block_presences
                .into_iter()
                .map(|p| BlockPresence {
                    cid: Bytes::from(p.cid),
                    presence: BlockPresenceType::try_from(p.r#type)
                        .unwrap_or(BlockPresenceType::Have),
                })
                .collect(),
            payment: msg.payment_message.map(Into::into),
        }
    }
}
