// coopflow/src/domain/payment.rs

//! Phased payments against a locked quote.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPhase {
  Advance,
  Balance,
  Full,
}

impl PaymentPhase {
  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentPhase::Advance => "advance",
      PaymentPhase::Balance => "balance",
      PaymentPhase::Full => "full",
    }
  }
}

impl std::fmt::Display for PaymentPhase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  ProofSubmitted,
  Verified,
  /// Non-terminal: the buyer may resubmit proof.
  Rejected,
}

impl PaymentStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentStatus::Pending => "pending",
      PaymentStatus::ProofSubmitted => "proof_submitted",
      PaymentStatus::Verified => "verified",
      PaymentStatus::Rejected => "rejected",
    }
  }
}

impl std::fmt::Display for PaymentStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single installment of the locked total.
///
/// Invariant: a payment is never `Verified` without a prior
/// `ProofSubmitted` carrying a non-null `evidence_id`, unless it is a cash
/// phase (cash skips digital proof and is verified at collection).
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
  pub payment_id: Uuid,
  pub order_id: Uuid,
  pub phase: PaymentPhase,
  pub amount_cents: i64,
  pub transaction_ref: Option<String>,
  pub evidence_id: Option<Uuid>,
  pub status: PaymentStatus,
  pub rejection_reason: Option<String>,
  pub updated_at: DateTime<Utc>,
}

impl Payment {
  pub fn new(order_id: Uuid, phase: PaymentPhase, amount_cents: i64) -> Self {
    Payment {
      payment_id: Uuid::new_v4(),
      order_id,
      phase,
      amount_cents,
      transaction_ref: None,
      evidence_id: None,
      status: PaymentStatus::Pending,
      rejection_reason: None,
      updated_at: Utc::now(),
    }
  }
}
