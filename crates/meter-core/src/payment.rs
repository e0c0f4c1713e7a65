//! Payment control payloads carried in the envelope's payment slot.

use bytes::Bytes;

use crate::wire::message as pb;

/// One payment control message. An envelope carries at most one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMessage {
    /// The sender claims payment; `payment_request` is an opaque gateway claim.
    InitiatePayment { payment_request: String },

    /// Opaque negotiation step issued by the payer's gateway.
    PaymentCommand {
        command_id: String,
        command_body: Bytes,
        command_type: i32,
        session_id: String,
    },

    /// Reply to a [`PaymentMessage::PaymentCommand`] from the payee's gateway.
    PaymentResponse {
        command_id: String,
        command_reply: Bytes,
        session_id: String,
    },

    /// Final outcome of a settlement session.
    PaymentStatusResponse { session_id: String, status: bool },
}

impl PaymentMessage {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentMessage::InitiatePayment { .. } => "initiate_payment",
            PaymentMessage::PaymentCommand { .. } => "payment_command",
            PaymentMessage::PaymentResponse { .. } => "payment_response",
            PaymentMessage::PaymentStatusResponse { .. } => "payment_status_response",
        }
    }
}

impl From<pb::PaymentMessage> for PaymentMessage {
    fn from(value: pb::PaymentMessage) -> Self {
        match value {
            pb::PaymentMessage::InitiatePayment(m) => PaymentMessage::InitiatePayment {
                payment_request: m.payment_request,
            },
            pb::PaymentMessage::PaymentCommand(m) => PaymentMessage::PaymentCommand {
                command_id: m.command_id,
                command_body: Bytes::from(m.command_body),
                command_type: m.command_type,
                session_id: m.session_id,
            },
            pb::PaymentMessage::PaymentResponse(m) => PaymentMessage::PaymentResponse {
                command_id: m.command_id,
                command_reply: Bytes::from(m.command_reply),
                session_id: m.session_id,
            },
            pb::PaymentMessage::PaymentStatusResponse(m) => {
                PaymentMessage::PaymentStatusResponse {
                    session_id: m.session_id,
                    status: m.status,
                }
            }
        }
    }
}

impl From<PaymentMessage> for pb::PaymentMessage {
    fn from(value: PaymentMessage) -> Self {
        match value {
            PaymentMessage::InitiatePayment { payment_request } => {
                pb::PaymentMessage::InitiatePayment(pb::InitiatePayment { payment_request })
            }
            PaymentMessage::PaymentCommand {
                command_id,
                command_body,
                command_type,
                session_id,
            } => pb::PaymentMessage::PaymentCommand(pb::PaymentCommand {
                command_id,
                command_body: command_body.to_vec(),
                command_type,
                session_id,
            }),
            PaymentMessage::PaymentResponse {
                command_id,
                command_reply,
                session_id,
            } => pb::PaymentMessage::PaymentResponse(pb::PaymentResponse {
                command_id,
                command_reply: command_reply.to_vec(),
                session_id,
            }),
            PaymentMessage::PaymentStatusResponse { session_id, status } => {
                pb::PaymentMessage::PaymentStatusResponse(pb::PaymentStatusResponse {
                    session_id,
                    status,
                })
            }
        }
    }
}
