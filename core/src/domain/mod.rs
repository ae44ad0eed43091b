// coopflow/src/domain/mod.rs

//! Entities and closed status enums of the order lifecycle.

pub mod audit;
pub mod dispute;
pub mod evidence;
pub mod order;
pub mod party;
pub mod payment;
pub mod quote;

pub use audit::AuditLogEntry;
pub use dispute::{Dispute, DisputeReason, DisputeStatus, ResolutionKind, MIN_DISPUTE_DESCRIPTION_CHARS};
pub use evidence::{Evidence, EvidenceKind, GeoPoint, MediaKind, MediaUpload};
pub use order::{ConfirmationMode, DeliveryTerms, Order, OrderStatus, PaymentType};
pub use party::{Actor, ActorRole};
pub use payment::{Payment, PaymentPhase, PaymentStatus};
pub use quote::{Quote, QuoteStatus};
