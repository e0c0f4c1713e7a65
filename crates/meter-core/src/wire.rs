//! Meter wire format: protobuf types of the block-exchange envelope.
//!
//! These types ARE the protocol. Field numbers 1-4 are the block-exchange
//! message as peers already speak it; 5-8 are the payment control slot.
//! Changing a tag is a breaking change for every deployed node.
//!
//! The structs are declared with prost derives directly, there is no
//! `.proto` build step. Application code works with [`crate::Envelope`]
//! and [`crate::PaymentMessage`] and converts at the edge.

/// The block-exchange envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    #[prost(message, optional, tag = "1")]
    pub wantlist: Option<message::Wantlist>,

    /// Legacy block payloads (raw data, no CID prefix).
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub blocks: Vec<Vec<u8>>,

    #[prost(message, repeated, tag = "3")]
    pub payload: Vec<message::Block>,

    #[prost(message, repeated, tag = "4")]
    pub block_presences: Vec<message::BlockPresence>,

    /// At most one payment control payload per envelope.
    /// Absent on the wire when `None`.
    #[prost(oneof = "message::PaymentMessage", tags = "5, 6, 7, 8")]
    pub payment_message: Option<message::PaymentMessage>,
}

pub mod message {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Wantlist {
        #[prost(message, repeated, tag = "1")]
        pub entries: Vec<wantlist::Entry>,

        /// Whether this is the full wantlist or a diff.
        #[prost(bool, tag = "2")]
        pub full: bool,
    }

    pub mod wantlist {
        #[derive(Clone, PartialEq, prost::Message)]
        pub struct Entry {
            /// CID bytes of the wanted block.
            #[prost(bytes = "vec", tag = "1")]
            pub block: Vec<u8>,

            #[prost(int32, tag = "2")]
            pub priority: i32,

            #[prost(bool, tag = "3")]
            pub cancel: bool,

            #[prost(enumeration = "WantType", tag = "4")]
            pub want_type: i32,

            #[prost(bool, tag = "5")]
            pub send_dont_have: bool,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
        #[repr(i32)]
        pub enum WantType {
            Block = 0,
            Have = 1,
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Block {
        /// CID prefix (version, codec, multihash type and length).
        #[prost(bytes = "vec", tag = "1")]
        pub prefix: Vec<u8>,

        #[prost(bytes = "vec", tag = "2")]
        pub data: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct BlockPresence {
        #[prost(bytes = "vec", tag = "1")]
        pub cid: Vec<u8>,

        #[prost(enumeration = "BlockPresenceType", tag = "2")]
        pub r#type: i32,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum BlockPresenceType {
        Have = 0,
        DontHave = 1,
    }

    /// Payment control slot of the envelope.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum PaymentMessage {
        #[prost(message, tag = "5")]
        InitiatePayment(InitiatePayment),

        #[prost(message, tag = "6")]
        PaymentCommand(PaymentCommand),

        #[prost(message, tag = "7")]
        PaymentResponse(PaymentResponse),

        #[prost(message, tag = "8")]
        PaymentStatusResponse(PaymentStatusResponse),
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct InitiatePayment {
        #[prost(string, tag = "1")]
        pub payment_request: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PaymentCommand {
        #[prost(string, tag = "1")]
        pub command_id: String,

        #[prost(bytes = "vec", tag = "2")]
        pub command_body: Vec<u8>,

        #[prost(int32, tag = "3")]
        pub command_type: i32,

        #[prost(string, tag = "4")]
        pub session_id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PaymentResponse {
        #[prost(string, tag = "1")]
        pub command_id: String,

        #[prost(bytes = "vec", tag = "2")]
        pub command_reply: Vec<u8>,

        #[prost(string, tag = "3")]
        pub session_id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PaymentStatusResponse {
        #[prost(string, tag = "1")]
        pub session_id: String,

        #[prost(bool, tag = "2")]
        pub status: bool,
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Largest envelope a node accepts from a single frame.
/// Matches the block-exchange limit of 4 MiB per message.
pub const MAX_ENVELOPE_SIZE: usize = 4 * 1024 * 1024;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("envelope decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("envelope length {0} exceeds maximum {}", MAX_ENVELOPE_SIZE)]
    TooLarge(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
