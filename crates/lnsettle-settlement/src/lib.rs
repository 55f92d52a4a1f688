//! Bilateral settlement of Interledger transfers over Lightning.
//!
//! [`SettlementCoordinator`] drives one peer relationship: it exchanges
//! Lightning addresses, makes sure a channel exists, tracks transfers in a
//! [`TransferLedger`] and pays or gets paid through an [`ILightningNode`].

pub mod adapters;
pub mod bootstrap;
pub mod coordinator;
pub mod error;
pub mod invoice;
pub mod ledger;
pub mod protocol;
pub mod traits;
pub mod types;

pub use bootstrap::{BootstrapState, ChannelBootstrap};
pub use coordinator::SettlementCoordinator;
pub use error::{LightningError, SettlementError, TransportError};
pub use invoice::{Invoice, InvoiceRegistry};
pub use ledger::{CancelReason, InFlightBalance, LedgerEvent, OutgoingReservation, TransferLedger};
pub use protocol::{PeerMessage, PeerResponse};
pub use traits::{ChannelOpenStream, DataHandler, ILightningNode, IPeerTransport, MoneyHandler};
pub use types::{
    AddedInvoice, ChannelOpenStatus, ChannelSummary, NodeInfo, PeerSummary, SettlementReceipt,
    WalletBalance,
};
