// coopflow/src/domain/quote.rs

//! Quotes and the dual-agreement lock protocol.
//!
//! One active quote per order at a time; a counter-offer supersedes the
//! current quote with a fresh record and cleared agreement timestamps.
//! Once both parties have agreed the quote is `Locked` and its final total
//! is immutable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::order::PaymentType;
use crate::error::{CoopflowError, CoopflowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
  Draft,
  Sent,
  Negotiating,
  BuyerAgreed,
  SellerAgreed,
  Locked,
  Expired,
  Rejected,
}

impl QuoteStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      QuoteStatus::Draft => "draft",
      QuoteStatus::Sent => "sent",
      QuoteStatus::Negotiating => "negotiating",
      QuoteStatus::BuyerAgreed => "buyer_agreed",
      QuoteStatus::SellerAgreed => "seller_agreed",
      QuoteStatus::Locked => "locked",
      QuoteStatus::Expired => "expired",
      QuoteStatus::Rejected => "rejected",
    }
  }

  /// Statuses from which an agreement (or further negotiation) is possible.
  pub fn is_open(&self) -> bool {
    matches!(
      self,
      QuoteStatus::Sent | QuoteStatus::Negotiating | QuoteStatus::BuyerAgreed | QuoteStatus::SellerAgreed
    )
  }
}

impl std::fmt::Display for QuoteStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A priced proposal for an order. All amounts are integer cents.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
  pub quote_id: Uuid,
  pub order_id: Uuid,
  pub base_price_cents: i64,
  pub quantity: u32,
  pub unit: String,
  pub delivery_charge_cents: i64,
  pub packing_charge_cents: i64,
  pub discount_cents: i64,
  pub total_product_price_cents: i64,
  pub final_total_cents: i64,
  pub allowed_payment_types: Vec<PaymentType>,
  pub payment_type: PaymentType,
  /// Present exactly when `payment_type.splits()`.
  pub advance_amount_cents: Option<i64>,
  pub balance_amount_cents: Option<i64>,
  pub buyer_notes: Option<String>,
  pub seller_notes: Option<String>,
  pub buyer_agreed_at: Option<DateTime<Utc>>,
  pub seller_agreed_at: Option<DateTime<Utc>>,
  pub locked_at: Option<DateTime<Utc>>,
  pub expires_at: Option<DateTime<Utc>>,
  pub status: QuoteStatus,
  /// Set on the old quote when a counter-offer supersedes it, making the
  /// negotiation chain navigable.
  pub superseded_by: Option<Uuid>,
  pub created_at: DateTime<Utc>,
}

impl Quote {
  /// Recomputes `total_product_price` and `final_total` from the priced
  /// fields. Fails if any charge is negative, the totals overflow `i64`
  /// cents, or the discount exceeds the gross amount.
  pub fn recompute_totals(&mut self) -> CoopflowResult<()> {
    if self.base_price_cents <= 0 {
      return Err(CoopflowError::validation("base price must be positive"));
    }
    if self.delivery_charge_cents < 0 || self.packing_charge_cents < 0 || self.discount_cents < 0 {
      return Err(CoopflowError::validation("charges and discount must be non-negative"));
    }
    let total = self
      .base_price_cents
      .checked_mul(i64::from(self.quantity))
      .ok_or_else(|| CoopflowError::validation("quote amounts overflow"))?;
    let gross = total
      .checked_add(self.delivery_charge_cents)
      .and_then(|g| g.checked_add(self.packing_charge_cents))
      .ok_or_else(|| CoopflowError::validation("quote amounts overflow"))?;
    if self.discount_cents > gross {
      return Err(CoopflowError::validation("discount exceeds the gross quote amount"));
    }
    self.total_product_price_cents = total;
    self.final_total_cents = gross - self.discount_cents;
    Ok(())
  }

  /// The phase-split invariant checked before locking: for split payment
  /// types, advance + balance must equal the final total exactly (amounts
  /// are integer cents, so no rounding tolerance is needed).
  pub fn check_phase_split(&self) -> CoopflowResult<()> {
    if !self.payment_type.splits() {
      return Ok(());
    }
    match (self.advance_amount_cents, self.balance_amount_cents) {
      (Some(advance), Some(balance)) if advance > 0 && balance > 0 && advance + balance == self.final_total_cents => {
        Ok(())
      }
      _ => Err(CoopflowError::validation(
        "advance and balance amounts must be positive and sum to the final total",
      )),
    }
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.map(|at| at <= now).unwrap_or(false)
  }
}
