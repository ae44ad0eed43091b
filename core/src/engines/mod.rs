// coopflow/src/engines/mod.rs

//! The four lifecycle engines. Each validates state, performs its
//! transition inside a single ledger transaction and appends the matching
//! audit entry; the order desk sequences them.

pub mod delivery;
pub mod dispute;
pub mod negotiation;
pub mod settlement;

pub use delivery::DeliveryEngine;
pub use dispute::{DisputeEngine, DisputeRequest};
pub use negotiation::{CounterOffer, EnquiryRequest, NegotiationEngine, QuoteTerms};
pub use settlement::SettlementEngine;
