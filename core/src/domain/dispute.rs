// coopflow/src/domain/dispute.rs

//! Disputes and their resolution outcomes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::party::ActorRole;

/// Minimum length of a dispute description, enforced at the boundary.
pub const MIN_DISPUTE_DESCRIPTION_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
  WrongProduct,
  QualityIssue,
  PaymentNotReceived,
  DeliveryIssue,
  SellerUnresponsive,
  BuyerUnresponsive,
  Other,
}

impl DisputeReason {
  /// Monetary reasons require a claimed amount at the boundary.
  pub fn requires_claimed_amount(&self) -> bool {
    matches!(self, DisputeReason::PaymentNotReceived | DisputeReason::QualityIssue)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      DisputeReason::WrongProduct => "wrong_product",
      DisputeReason::QualityIssue => "quality_issue",
      DisputeReason::PaymentNotReceived => "payment_not_received",
      DisputeReason::DeliveryIssue => "delivery_issue",
      DisputeReason::SellerUnresponsive => "seller_unresponsive",
      DisputeReason::BuyerUnresponsive => "buyer_unresponsive",
      DisputeReason::Other => "other",
    }
  }
}

impl std::fmt::Display for DisputeReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
  Open,
  UnderReview,
  Escalated,
  Resolved,
}

impl DisputeStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      DisputeStatus::Open => "open",
      DisputeStatus::UnderReview => "under_review",
      DisputeStatus::Escalated => "escalated",
      DisputeStatus::Resolved => "resolved",
    }
  }

  pub fn is_open(&self) -> bool {
    !matches!(self, DisputeStatus::Resolved)
  }
}

impl std::fmt::Display for DisputeStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The moderator's verdict. Carries the order outcome: cancelling kinds
/// settle the order as `Cancelled`, the rest revert it to the interrupted
/// flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
  Refund,
  PartialRefund,
  Replacement,
  ReleaseToSeller,
  CancelOrder,
  NoAction,
}

impl ResolutionKind {
  pub fn cancels_order(&self) -> bool {
    matches!(
      self,
      ResolutionKind::Refund | ResolutionKind::PartialRefund | ResolutionKind::CancelOrder
    )
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ResolutionKind::Refund => "refund",
      ResolutionKind::PartialRefund => "partial_refund",
      ResolutionKind::Replacement => "replacement",
      ResolutionKind::ReleaseToSeller => "release_to_seller",
      ResolutionKind::CancelOrder => "cancel_order",
      ResolutionKind::NoAction => "no_action",
    }
  }
}

impl std::fmt::Display for ResolutionKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Dispute {
  pub dispute_id: Uuid,
  pub order_id: Uuid,
  pub raised_by: Uuid,
  pub raised_by_role: ActorRole,
  pub reason: DisputeReason,
  pub description: String,
  pub requested_resolution: Option<String>,
  pub claimed_amount_cents: Option<i64>,
  pub status: DisputeStatus,
  pub resolution: Option<ResolutionKind>,
  pub resolution_note: Option<String>,
  pub evidence_ids: Vec<Uuid>,
  pub created_at: DateTime<Utc>,
}
