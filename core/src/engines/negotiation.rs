// coopflow/src/engines/negotiation.rs

//! Quote negotiation: enquiry, quoting, counter-offers and the
//! dual-agreement lock.
//!
//! The lock transition is the one place where two independent actors race
//! to complete the same transition. Every mutation here runs inside a
//! single ledger transaction, so the `Locked` transition fires exactly
//! once regardless of interleaving.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{
  Actor, ActorRole, DeliveryTerms, Order, OrderStatus, PaymentType, Quote, QuoteStatus,
};
use crate::error::{CoopflowError, CoopflowResult};
use crate::ledger::{Ledger, OrderRecord};

/// Buyer-supplied terms that open an enquiry. No price yet; the seller
/// prices the draft via [`NegotiationEngine::send_quote`].
#[derive(Debug, Clone)]
pub struct EnquiryRequest {
  pub seller_id: Uuid,
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: u32,
  pub unit: String,
  pub delivery: DeliveryTerms,
  pub payment_type: PaymentType,
  pub notes: Option<String>,
}

/// Seller-side pricing of a draft or renegotiated quote.
#[derive(Debug, Clone)]
pub struct QuoteTerms {
  pub base_price_cents: i64,
  pub delivery_charge_cents: i64,
  pub packing_charge_cents: i64,
  pub discount_cents: i64,
  pub allowed_payment_types: Vec<PaymentType>,
  /// Required when the order's payment type splits the total.
  pub advance_amount_cents: Option<i64>,
  pub seller_notes: Option<String>,
  pub expires_in_hours: i64,
}

/// Fields a counter-offer may override; everything else carries over from
/// the superseded quote.
#[derive(Debug, Clone, Default)]
pub struct CounterOffer {
  pub base_price_cents: Option<i64>,
  pub delivery_charge_cents: Option<i64>,
  pub notes: Option<String>,
}

pub struct NegotiationEngine {
  ledger: Arc<Ledger>,
}

impl NegotiationEngine {
  pub fn new(ledger: Arc<Ledger>) -> Self {
    NegotiationEngine { ledger }
  }

  /// Creates an order in `Enquiry` with a draft quote carrying the buyer's
  /// terms.
  #[instrument(name = "negotiation::open_enquiry", skip(self, request), fields(buyer_id = %buyer.id), err(Display))]
  pub fn open_enquiry(&self, buyer: Actor, request: EnquiryRequest) -> CoopflowResult<Order> {
    buyer.require_role(ActorRole::Buyer, "open_enquiry")?;
    if request.quantity == 0 {
      return Err(CoopflowError::validation("quantity must be positive"));
    }

    let now = Utc::now();
    let order = Order {
      order_id: Uuid::new_v4(),
      buyer_id: buyer.id,
      seller_id: request.seller_id,
      product_id: request.product_id,
      product_name: request.product_name.clone(),
      quantity: request.quantity,
      unit: request.unit.clone(),
      status: OrderStatus::Enquiry,
      delivery: request.delivery,
      payment_type: request.payment_type,
      status_before_dispute: None,
      created_at: now,
      updated_at: now,
    };
    let draft = Quote {
      quote_id: Uuid::new_v4(),
      order_id: order.order_id,
      base_price_cents: 0,
      quantity: request.quantity,
      unit: request.unit,
      delivery_charge_cents: 0,
      packing_charge_cents: 0,
      discount_cents: 0,
      total_product_price_cents: 0,
      final_total_cents: 0,
      allowed_payment_types: Vec::new(),
      payment_type: request.payment_type,
      advance_amount_cents: None,
      balance_amount_cents: None,
      buyer_notes: request.notes,
      seller_notes: None,
      buyer_agreed_at: None,
      seller_agreed_at: None,
      locked_at: None,
      expires_at: None,
      status: QuoteStatus::Draft,
      superseded_by: None,
      created_at: now,
    };

    let mut record = OrderRecord::new(order.clone());
    record.quotes.push(draft);
    self.ledger.open(record)?;
    info!(order_id = %order.order_id, product = %order.product_name, quantity = order.quantity, "enquiry opened");
    Ok(order)
  }

  /// Prices a draft (or renegotiated) quote and sends it to the buyer.
  /// Computes the totals and sets the expiry timestamp.
  #[instrument(name = "negotiation::send_quote", skip(self, terms), fields(quote_id = %quote_id), err(Display))]
  pub fn send_quote(&self, seller: Actor, quote_id: Uuid, terms: QuoteTerms) -> CoopflowResult<Quote> {
    seller.require_role(ActorRole::Seller, "send_quote")?;
    if terms.expires_in_hours <= 0 {
      return Err(CoopflowError::validation("quote expiry must be in the future"));
    }
    if terms.allowed_payment_types.is_empty() {
      return Err(CoopflowError::validation("at least one payment type must be allowed"));
    }

    let order_id = self.ledger.order_id_for_quote(quote_id)?;
    let quote = self.ledger.transact(order_id, |record| {
      if record.order.seller_id != seller.id {
        return Err(CoopflowError::illegal_state(
          "send_quote",
          "only the order's seller may send a quote",
        ));
      }
      match record.order.status {
        OrderStatus::Enquiry | OrderStatus::QuoteSent | OrderStatus::Negotiating => {}
        other => {
          return Err(CoopflowError::illegal_state(
            "send_quote",
            format!("order is '{}'", other),
          ));
        }
      }
      let payment_type = record.order.payment_type;
      if !terms.allowed_payment_types.contains(&payment_type) {
        return Err(CoopflowError::validation(format!(
          "buyer's preferred payment type '{}' is not among the allowed types",
          payment_type
        )));
      }

      let now = Utc::now();
      let quote = record.quote_mut(quote_id)?;
      Self::require_not_superseded(quote, "send_quote")?;
      match quote.status {
        QuoteStatus::Draft | QuoteStatus::Negotiating => {}
        other => {
          return Err(CoopflowError::illegal_state(
            "send_quote",
            format!("quote is '{}', expected draft or negotiating", other),
          ));
        }
      }

      quote.base_price_cents = terms.base_price_cents;
      quote.delivery_charge_cents = terms.delivery_charge_cents;
      quote.packing_charge_cents = terms.packing_charge_cents;
      quote.discount_cents = terms.discount_cents;
      quote.allowed_payment_types = terms.allowed_payment_types.clone();
      quote.seller_notes = terms.seller_notes.clone();
      quote.recompute_totals()?;

      if payment_type.splits() {
        let advance = terms
          .advance_amount_cents
          .ok_or_else(|| CoopflowError::validation("an advance amount is required for split payment"))?;
        quote.advance_amount_cents = Some(advance);
        quote.balance_amount_cents = Some(quote.final_total_cents - advance);
        quote.check_phase_split()?;
      } else if terms.advance_amount_cents.is_some() {
        return Err(CoopflowError::validation(
          "advance amount only applies to split payment types",
        ));
      }

      quote.buyer_agreed_at = None;
      quote.seller_agreed_at = None;
      quote.expires_at = Some(now + Duration::hours(terms.expires_in_hours));
      quote.status = QuoteStatus::Sent;
      let snapshot = quote.clone();

      if record.order.status != OrderStatus::QuoteSent {
        record.transition(OrderStatus::QuoteSent, seller.id, Some("quote sent".to_string()))?;
      }
      Ok(snapshot)
    })?;

    info!(order_id = %order_id, final_total_cents = quote.final_total_cents, "quote sent");
    Ok(quote)
  }

  /// Records the caller's agreement. Idempotent per actor; when both sides
  /// have agreed, the quote locks atomically (price immutable from then on)
  /// and the order moves to `AgreementLocked`.
  #[instrument(name = "negotiation::agree_to_quote", skip(self), fields(quote_id = %quote_id, role = %actor.role), err(Display))]
  pub fn agree_to_quote(&self, actor: Actor, quote_id: Uuid) -> CoopflowResult<Quote> {
    let order_id = self.ledger.order_id_for_quote(quote_id)?;
    let quote = self
      .ledger
      .transact(order_id, |record| record_agreement(record, actor, quote_id))?;

    if quote.status == QuoteStatus::Locked {
      info!(order_id = %order_id, final_total_cents = quote.final_total_cents, "quote locked");
    }
    Ok(quote)
  }

  /// Supersedes the current quote with a fresh `Negotiating` record.
  /// Clears both agreement timestamps and recomputes totals with any
  /// overridden fields. Legal only while the buyer has not yet agreed.
  #[instrument(name = "negotiation::counter_offer", skip(self, counter), fields(quote_id = %quote_id, role = %actor.role), err(Display))]
  pub fn counter_offer(&self, actor: Actor, quote_id: Uuid, counter: CounterOffer) -> CoopflowResult<Quote> {
    let order_id = self.ledger.order_id_for_quote(quote_id)?;
    let new_quote = self.ledger.transact(order_id, |record| {
      actor.require_party(record.order.buyer_id, record.order.seller_id, "counter_offer")?;
      let now = Utc::now();
      let original = record.quote_mut(quote_id)?;
      Self::require_not_superseded(original, "counter_offer")?;

      match original.status {
        QuoteStatus::Sent | QuoteStatus::Negotiating | QuoteStatus::SellerAgreed => {}
        other => {
          return Err(CoopflowError::illegal_state(
            "counter_offer",
            format!("quote is '{}'", other),
          ));
        }
      }
      if original.buyer_agreed_at.is_some() {
        return Err(CoopflowError::illegal_state(
          "counter_offer",
          "buyer has already agreed to this quote",
        ));
      }
      if original.is_expired(now) {
        return Err(CoopflowError::illegal_state("counter_offer", "quote has expired"));
      }

      let mut next = original.clone();
      next.quote_id = Uuid::new_v4();
      next.created_at = now;
      next.superseded_by = None;
      next.status = QuoteStatus::Negotiating;
      next.buyer_agreed_at = None;
      next.seller_agreed_at = None;
      next.locked_at = None;
      if let Some(price) = counter.base_price_cents {
        next.base_price_cents = price;
      }
      if let Some(charge) = counter.delivery_charge_cents {
        next.delivery_charge_cents = charge;
      }
      match actor.role {
        ActorRole::Buyer => next.buyer_notes = counter.notes.clone().or(next.buyer_notes),
        _ => next.seller_notes = counter.notes.clone().or(next.seller_notes),
      }
      next.recompute_totals()?;
      // Carry the advance only while it still fits under the new total.
      if next.payment_type.splits() {
        match next.advance_amount_cents {
          Some(advance) if advance > 0 && advance < next.final_total_cents => {
            next.balance_amount_cents = Some(next.final_total_cents - advance);
          }
          _ => {
            next.advance_amount_cents = None;
            next.balance_amount_cents = None;
          }
        }
      }

      original.superseded_by = Some(next.quote_id);
      let snapshot = next.clone();
      record.quotes.push(next);

      if record.order.status != OrderStatus::Negotiating {
        record.transition(OrderStatus::Negotiating, actor.id, Some("counter-offer".to_string()))?;
      }
      Ok(snapshot)
    })?;

    info!(order_id = %order_id, new_quote_id = %new_quote.quote_id, "counter-offer recorded");
    Ok(new_quote)
  }

  /// Buyer declines the quote outright; the enquiry is withdrawn and the
  /// order cancelled.
  #[instrument(name = "negotiation::reject_quote", skip(self), fields(quote_id = %quote_id), err(Display))]
  pub fn reject_quote(&self, buyer: Actor, quote_id: Uuid) -> CoopflowResult<Quote> {
    buyer.require_role(ActorRole::Buyer, "reject_quote")?;
    let order_id = self.ledger.order_id_for_quote(quote_id)?;
    self.ledger.transact(order_id, |record| {
      if record.order.buyer_id != buyer.id {
        return Err(CoopflowError::illegal_state(
          "reject_quote",
          "only the order's buyer may reject a quote",
        ));
      }
      let quote = record.quote_mut(quote_id)?;
      Self::require_not_superseded(quote, "reject_quote")?;
      match quote.status {
        QuoteStatus::Sent | QuoteStatus::Negotiating | QuoteStatus::SellerAgreed => {}
        other => {
          return Err(CoopflowError::illegal_state(
            "reject_quote",
            format!("quote is '{}'", other),
          ));
        }
      }
      quote.status = QuoteStatus::Rejected;
      let snapshot = quote.clone();
      record.transition(OrderStatus::Cancelled, buyer.id, Some("quote rejected by buyer".to_string()))?;
      Ok(snapshot)
    })
  }

  // A superseded quote stays in the history but is closed to every
  // further operation; only the counter-offer that replaced it is live.
  fn require_not_superseded(quote: &Quote, operation: &str) -> CoopflowResult<()> {
    if quote.superseded_by.is_some() {
      Err(CoopflowError::illegal_state(
        operation,
        "quote has been superseded by a counter-offer",
      ))
    } else {
      Ok(())
    }
  }
}

/// Applies one party's agreement to the record. Record-level so the desk
/// can commit the lock and its payment schedule in one transaction.
pub(crate) fn record_agreement(record: &mut OrderRecord, actor: Actor, quote_id: Uuid) -> CoopflowResult<Quote> {
  actor.require_party(record.order.buyer_id, record.order.seller_id, "agree_to_quote")?;
  let now = Utc::now();
  let quote = record.quote_mut(quote_id)?;
  NegotiationEngine::require_not_superseded(quote, "agree_to_quote")?;

  let already_agreed = match actor.role {
    ActorRole::Buyer => quote.buyer_agreed_at.is_some(),
    ActorRole::Seller => quote.seller_agreed_at.is_some(),
    ActorRole::Moderator => unreachable!("require_party rejects moderators"),
  };
  if already_agreed {
    // Idempotent no-op: no state change, no audit entry.
    return Ok(quote.clone());
  }

  if !quote.status.is_open() {
    return Err(CoopflowError::illegal_state(
      "agree_to_quote",
      format!("quote is '{}'", quote.status),
    ));
  }
  if quote.is_expired(now) {
    return Err(CoopflowError::illegal_state("agree_to_quote", "quote has expired"));
  }

  match actor.role {
    ActorRole::Buyer => quote.buyer_agreed_at = Some(now),
    ActorRole::Seller => quote.seller_agreed_at = Some(now),
    ActorRole::Moderator => unreachable!(),
  }

  if quote.buyer_agreed_at.is_some() && quote.seller_agreed_at.is_some() {
    quote.check_phase_split()?;
    quote.status = QuoteStatus::Locked;
    quote.locked_at = Some(now);
    let snapshot = quote.clone();
    record.transition(
      OrderStatus::AgreementLocked,
      actor.id,
      Some("quote locked by dual agreement".to_string()),
    )?;
    Ok(snapshot)
  } else {
    quote.status = match actor.role {
      ActorRole::Buyer => QuoteStatus::BuyerAgreed,
      _ => QuoteStatus::SellerAgreed,
    };
    Ok(quote.clone())
  }
}
