// coopflow/src/domain/order.rs

//! The order aggregate root: status enum, legal-transition table, delivery
//! terms and payment type discriminants.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Aggregate order status. Transitions are only legal along
/// [`OrderStatus::can_transition_to`]; the ledger checks this centrally on
/// every commit, so no call site re-derives legality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Enquiry,
  QuoteSent,
  Negotiating,
  AgreementLocked,
  AdvancePending,
  PaymentProofSubmitted,
  PaymentVerified,
  Preparing,
  Dispatched,
  ReadyForPickup,
  Delivered,
  Completed,
  Dispute,
  Cancelled,
  Expired,
}

impl OrderStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Enquiry => "enquiry",
      OrderStatus::QuoteSent => "quote_sent",
      OrderStatus::Negotiating => "negotiating",
      OrderStatus::AgreementLocked => "agreement_locked",
      OrderStatus::AdvancePending => "advance_pending",
      OrderStatus::PaymentProofSubmitted => "payment_proof_submitted",
      OrderStatus::PaymentVerified => "payment_verified",
      OrderStatus::Preparing => "preparing",
      OrderStatus::Dispatched => "dispatched",
      OrderStatus::ReadyForPickup => "ready_for_pickup",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Completed => "completed",
      OrderStatus::Dispute => "dispute",
      OrderStatus::Cancelled => "cancelled",
      OrderStatus::Expired => "expired",
    }
  }

  /// Terminal states admit no further transition of any kind.
  pub fn is_terminal(&self) -> bool {
    matches!(self, OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Expired)
  }

  /// A dispute may be raised against any order that is not terminal and has
  /// progressed past the enquiry stage. An order already in `Dispute` can
  /// accumulate further disputes without a status transition.
  pub fn accepts_dispute(&self) -> bool {
    !self.is_terminal() && *self != OrderStatus::Enquiry
  }

  /// States from which a party (buyer or seller) may still withdraw.
  /// Once payment is verified, cancellation only happens through dispute
  /// resolution.
  pub fn is_cancellable(&self) -> bool {
    matches!(
      self,
      OrderStatus::Enquiry
        | OrderStatus::QuoteSent
        | OrderStatus::Negotiating
        | OrderStatus::AgreementLocked
        | OrderStatus::AdvancePending
        | OrderStatus::PaymentProofSubmitted
    )
  }

  /// The legal-transition table of the order state machine.
  ///
  /// `Dispute` is special-cased: it is reachable from any dispute-accepting
  /// state, and leaving it either reverts to the recorded pre-dispute
  /// status or settles the order (cancel / complete) per the resolution.
  pub fn can_transition_to(self, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match (self, to) {
      // Raising a second dispute never re-records the Dispute status.
      (Dispute, Dispute) => false,
      (Dispute, target) => target == Cancelled || target == Completed || !target.is_terminal(),
      (from, Dispute) => from.accepts_dispute(),

      (Enquiry, QuoteSent) | (Enquiry, Cancelled) => true,
      (QuoteSent, Negotiating) | (QuoteSent, AgreementLocked) => true,
      (QuoteSent, Expired) | (QuoteSent, Cancelled) => true,
      (Negotiating, QuoteSent) | (Negotiating, AgreementLocked) => true,
      (Negotiating, Expired) | (Negotiating, Cancelled) => true,
      // Cash settlement skips the digital payment phases entirely.
      (AgreementLocked, AdvancePending) | (AgreementLocked, Preparing) | (AgreementLocked, Cancelled) => true,
      (AdvancePending, PaymentProofSubmitted) | (AdvancePending, Cancelled) => true,
      // Proof rejection sends the order back for resubmission.
      (PaymentProofSubmitted, PaymentVerified) | (PaymentProofSubmitted, AdvancePending) => true,
      (PaymentProofSubmitted, Cancelled) => true,
      (PaymentVerified, Preparing) => true,
      (Preparing, Dispatched) | (Preparing, ReadyForPickup) => true,
      (Dispatched, Delivered) | (ReadyForPickup, Delivered) => true,
      (Delivered, Completed) => true,

      _ => false,
    }
  }
}

impl std::fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How the agreed total is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
  /// The full amount is paid digitally up front.
  FullAdvance,
  /// A digital advance up front, the balance at handover.
  AdvancePlusBalance,
  /// Everything is settled in cash at delivery; no digital proof phase.
  CashOnDelivery,
  /// Everything is settled in cash at pickup; no digital proof phase.
  CashOnPickup,
}

impl PaymentType {
  /// Whether the total is split into an advance and a balance amount.
  pub fn splits(&self) -> bool {
    matches!(self, PaymentType::AdvancePlusBalance)
  }

  /// Cash types skip the digital proof-of-payment workflow.
  pub fn is_cash(&self) -> bool {
    matches!(self, PaymentType::CashOnDelivery | PaymentType::CashOnPickup)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentType::FullAdvance => "full_advance",
      PaymentType::AdvancePlusBalance => "advance_plus_balance",
      PaymentType::CashOnDelivery => "cash_on_delivery",
      PaymentType::CashOnPickup => "cash_on_pickup",
    }
  }
}

impl std::fmt::Display for PaymentType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Which proof-of-delivery path is invocable for an order. Chosen at
/// enquiry time and immutable thereafter; the delivery engine rejects the
/// other path outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationMode {
  Otp,
  Photo,
}

/// Delivery terms agreed at enquiry time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryTerms {
  HomeDelivery {
    address: String,
    distance_km: Option<f64>,
    confirmation: ConfirmationMode,
  },
  Pickup {
    confirmation: ConfirmationMode,
  },
}

impl DeliveryTerms {
  pub fn confirmation(&self) -> ConfirmationMode {
    match self {
      DeliveryTerms::HomeDelivery { confirmation, .. } => *confirmation,
      DeliveryTerms::Pickup { confirmation } => *confirmation,
    }
  }

  pub fn is_pickup(&self) -> bool {
    matches!(self, DeliveryTerms::Pickup { .. })
  }
}

/// Root aggregate. Owns its quotes, payments, evidence and audit trail
/// through the ledger record; nothing is ever deleted (orders are retained
/// indefinitely for audit purposes).
#[derive(Debug, Clone, Serialize)]
pub struct Order {
  pub order_id: Uuid,
  pub buyer_id: Uuid,
  pub seller_id: Uuid,
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: u32,
  pub unit: String,
  pub status: OrderStatus,
  pub delivery: DeliveryTerms,
  pub payment_type: PaymentType,
  /// Recorded when the order enters `Dispute`, so a resolution can revert
  /// to the interrupted flow.
  pub status_before_dispute: Option<OrderStatus>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
