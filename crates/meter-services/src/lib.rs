//! meter-services: debt accounting, settlement coordination, and the
//! plumbing that connects it to peers and the payment gateway.

pub mod coordinator;
pub mod correlator;
pub mod gateway;
pub mod gateway_client;
pub mod ledger;
pub mod network;
pub mod notifier;

pub use coordinator::{
    Coordinator, CoordinatorCommand, CoordinatorError, CoordinatorHandle, CoordinatorSettings,
};
pub use correlator::{CorrelatorError, Session, SessionCorrelator};
pub use gateway::{CommandRequest, Gateway, GatewayError, PaymentTransaction, ResponseRequest};
pub use gateway_client::HttpGateway;
pub use ledger::{Debt, DebtLedger, DebtSnapshot};
pub use network::{NetworkError, PaymentNetwork, Transport};
pub use notifier::{PeerNotifier, PeerQueues};
