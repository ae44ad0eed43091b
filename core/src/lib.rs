// coopflow/src/lib.rs

//! Coopflow: an evidence-based order negotiation and settlement core for a
//! poultry marketplace.
//!
//! The crate models the full order lifecycle as an explicit state machine:
//!  - Enquiry and quote negotiation with a dual-agreement price lock.
//!  - Phased payment settlement (full, advance + balance, or cash) with
//!    proof-of-payment evidence and seller verification.
//!  - Proof-of-delivery via handover codes (OTP) or photos, selected per
//!    order and mutually exclusive.
//!  - Dispute intake and moderator resolution against any live order.
//!
//! Every transition is validated against a central legal-transition table
//! and committed atomically with its audit entry in the in-memory
//! [`ledger::Ledger`]. UI, persistence backends, push notifications and
//! identity verification are external collaborators; the media-storage and
//! geolocation seams live in [`collab`].

// Declare modules
pub mod collab;
pub mod desk;
pub mod domain;
pub mod engines;
pub mod error;
pub mod ledger;
pub mod otp;

// --- Re-exports for the Public API ---

// Entities and status enums callers interact with frequently
pub use crate::domain::{
  Actor, ActorRole, AuditLogEntry, ConfirmationMode, DeliveryTerms, Dispute, DisputeReason, DisputeStatus,
  Evidence, EvidenceKind, GeoPoint, MediaKind, MediaUpload, Order, OrderStatus, Payment, PaymentPhase,
  PaymentStatus, PaymentType, Quote, QuoteStatus, ResolutionKind,
};

// Engine request types and the engines themselves, for callers that wire
// their own composition instead of using the desk
pub use crate::engines::{
  CounterOffer, DeliveryEngine, DisputeEngine, DisputeRequest, EnquiryRequest, NegotiationEngine, QuoteTerms,
  SettlementEngine,
};

// The façade owning the ledger and engines
pub use crate::desk::{OrderDesk, SYSTEM_ACTOR};

pub use crate::collab::{FixedLocator, GeoLocator, MediaStorage, MemoryMediaStorage, NoLocator};
pub use crate::error::{CoopflowError, CoopflowResult};
pub use crate::ledger::{Ledger, OrderRecord};
