// coopflow/src/desk.rs

//! The order desk: owns the ledger and the four engines, exposes the whole
//! order lifecycle as one façade and sequences cross-engine steps (quote
//! lock → payment schedule, delivery → completion, expiry sweeps).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::collab::{GeoLocator, MediaStorage};
use crate::domain::{
  Actor, AuditLogEntry, Dispute, Evidence, EvidenceKind, MediaUpload, Order, OrderStatus, Payment, PaymentStatus,
  Quote, QuoteStatus, ResolutionKind,
};
use crate::engines::{
  CounterOffer, DeliveryEngine, DisputeEngine, DisputeRequest, EnquiryRequest, NegotiationEngine, QuoteTerms,
  SettlementEngine,
};
use crate::error::{CoopflowError, CoopflowResult};
use crate::ledger::Ledger;

/// Actor id recorded on time-driven transitions (expiry sweeps), where no
/// authenticated caller exists.
pub const SYSTEM_ACTOR: Uuid = Uuid::nil();

pub struct OrderDesk {
  ledger: Arc<Ledger>,
  negotiation: NegotiationEngine,
  settlement: SettlementEngine,
  delivery: DeliveryEngine,
  disputes: DisputeEngine,
}

impl OrderDesk {
  pub fn new(media: Arc<dyn MediaStorage>, geo: Arc<dyn GeoLocator>) -> Self {
    let ledger = Arc::new(Ledger::new());
    OrderDesk {
      negotiation: NegotiationEngine::new(Arc::clone(&ledger)),
      settlement: SettlementEngine::new(Arc::clone(&ledger), Arc::clone(&media)),
      delivery: DeliveryEngine::new(Arc::clone(&ledger), Arc::clone(&media), geo),
      disputes: DisputeEngine::new(Arc::clone(&ledger), media),
      ledger,
    }
  }

  // --- Quote negotiation ---

  pub fn open_enquiry(&self, buyer: Actor, request: EnquiryRequest) -> CoopflowResult<Order> {
    self.negotiation.open_enquiry(buyer, request)
  }

  pub fn send_quote(&self, seller: Actor, quote_id: Uuid, terms: QuoteTerms) -> CoopflowResult<Quote> {
    self.negotiation.send_quote(seller, quote_id, terms)
  }

  /// Records the caller's agreement; on the lock transition the payment
  /// schedule implied by the quote's payment type is materialized in the
  /// same transaction, so no interleaved write can separate the two.
  #[instrument(name = "desk::agree_to_quote", skip(self), fields(quote_id = %quote_id, role = %actor.role), err(Display))]
  pub fn agree_to_quote(&self, actor: Actor, quote_id: Uuid) -> CoopflowResult<Quote> {
    let order_id = self.ledger.order_id_for_quote(quote_id)?;
    let quote = self.ledger.transact(order_id, |record| {
      let quote = crate::engines::negotiation::record_agreement(record, actor, quote_id)?;
      if quote.status == QuoteStatus::Locked {
        // Idempotent when the schedule already exists (repeat agreements).
        crate::engines::settlement::materialize_schedule(record, actor)?;
      }
      Ok(quote)
    })?;
    if quote.status == QuoteStatus::Locked {
      info!(%order_id, final_total_cents = quote.final_total_cents, "quote locked, payment schedule opened");
    }
    Ok(quote)
  }

  pub fn counter_offer(&self, actor: Actor, quote_id: Uuid, counter: CounterOffer) -> CoopflowResult<Quote> {
    self.negotiation.counter_offer(actor, quote_id, counter)
  }

  pub fn reject_quote(&self, buyer: Actor, quote_id: Uuid) -> CoopflowResult<Quote> {
    self.negotiation.reject_quote(buyer, quote_id)
  }

  // --- Payment settlement ---

  pub async fn submit_payment_proof(
    &self,
    buyer: Actor,
    payment_id: Uuid,
    proof: MediaUpload,
    transaction_ref: Option<String>,
  ) -> CoopflowResult<Payment> {
    self.settlement.submit_payment_proof(buyer, payment_id, proof, transaction_ref).await
  }

  pub fn verify_payment(&self, seller: Actor, payment_id: Uuid) -> CoopflowResult<Payment> {
    self.settlement.verify_payment(seller, payment_id)
  }

  pub fn reject_payment(&self, seller: Actor, payment_id: Uuid, reason: String) -> CoopflowResult<Payment> {
    self.settlement.reject_payment(seller, payment_id, reason)
  }

  pub async fn mark_balance_collected(
    &self,
    seller: Actor,
    order_id: Uuid,
    receipt: Option<MediaUpload>,
  ) -> CoopflowResult<Payment> {
    self.settlement.mark_balance_collected(seller, order_id, receipt).await
  }

  // --- Delivery confirmation ---

  pub fn mark_dispatched(&self, seller: Actor, order_id: Uuid) -> CoopflowResult<Order> {
    self.delivery.mark_dispatched(seller, order_id)
  }

  pub fn mark_ready_for_pickup(&self, seller: Actor, order_id: Uuid) -> CoopflowResult<Order> {
    self.delivery.mark_ready_for_pickup(seller, order_id)
  }

  pub fn generate_delivery_otp(&self, buyer: Actor, order_id: Uuid) -> CoopflowResult<String> {
    self.delivery.generate_delivery_otp(buyer, order_id)
  }

  pub async fn verify_delivery_otp(&self, seller: Actor, order_id: Uuid, code: &str) -> CoopflowResult<Order> {
    self.delivery.verify_delivery_otp(seller, order_id, code).await
  }

  pub async fn confirm_delivery_with_photo(
    &self,
    seller: Actor,
    order_id: Uuid,
    delivery_photo: MediaUpload,
    buyer_photo: Option<MediaUpload>,
  ) -> CoopflowResult<Order> {
    self
      .delivery
      .confirm_delivery_with_photo(seller, order_id, delivery_photo, buyer_photo)
      .await
  }

  // --- Disputes ---

  pub async fn raise_dispute(&self, actor: Actor, order_id: Uuid, request: DisputeRequest) -> CoopflowResult<Dispute> {
    self.disputes.raise_dispute(actor, order_id, request).await
  }

  pub fn begin_review(&self, moderator: Actor, dispute_id: Uuid) -> CoopflowResult<Dispute> {
    self.disputes.begin_review(moderator, dispute_id)
  }

  pub fn escalate_dispute(&self, moderator: Actor, dispute_id: Uuid, note: Option<String>) -> CoopflowResult<Dispute> {
    self.disputes.escalate(moderator, dispute_id, note)
  }

  pub fn resolve_dispute(
    &self,
    moderator: Actor,
    dispute_id: Uuid,
    resolution: ResolutionKind,
    note: Option<String>,
  ) -> CoopflowResult<Dispute> {
    self.disputes.resolve(moderator, dispute_id, resolution, note)
  }

  // --- Orchestrator-owned transitions ---

  /// Buyer or seller withdraws. Legal until payment is verified; later
  /// cancellation only happens through dispute resolution.
  #[instrument(name = "desk::cancel_order", skip(self, note), fields(order_id = %order_id), err(Display))]
  pub fn cancel_order(&self, actor: Actor, order_id: Uuid, note: Option<String>) -> CoopflowResult<Order> {
    self.ledger.transact(order_id, |record| {
      actor.require_party(record.order.buyer_id, record.order.seller_id, "cancel_order")?;
      if !record.order.status.is_cancellable() {
        return Err(CoopflowError::illegal_state(
          "cancel_order",
          format!("order is '{}'", record.order.status),
        ));
      }
      record.transition(
        OrderStatus::Cancelled,
        actor.id,
        note.clone().or_else(|| Some(format!("cancelled by {}", actor.role))),
      )?;
      Ok(record.order.clone())
    })
  }

  /// Closes out a delivered order once every payment phase is verified.
  #[instrument(name = "desk::complete_order", skip(self), fields(order_id = %order_id), err(Display))]
  pub fn complete_order(&self, actor: Actor, order_id: Uuid) -> CoopflowResult<Order> {
    let order = self.ledger.transact(order_id, |record| {
      actor.require_party(record.order.buyer_id, record.order.seller_id, "complete_order")?;
      if record.order.status != OrderStatus::Delivered {
        return Err(CoopflowError::illegal_state(
          "complete_order",
          format!("order is '{}', expected delivered", record.order.status),
        ));
      }
      if record.payments.iter().any(|p| p.status != PaymentStatus::Verified) {
        return Err(CoopflowError::illegal_state(
          "complete_order",
          "a payment phase is still outstanding",
        ));
      }
      record.transition(OrderStatus::Completed, actor.id, Some("order completed".to_string()))?;
      Ok(record.order.clone())
    })?;
    info!(%order_id, "order completed");
    Ok(order)
  }

  /// Expires every unlocked quote whose expiry elapsed before `now`, and
  /// the orders carrying them. The single time-driven entry point; an
  /// external scheduler decides when to call it.
  #[instrument(name = "desk::sweep_expired", skip(self))]
  pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<Uuid> {
    let mut swept = Vec::new();
    for order_id in self.ledger.order_ids() {
      let expired = self.ledger.transact(order_id, |record| {
        if !matches!(record.order.status, OrderStatus::QuoteSent | OrderStatus::Negotiating) {
          return Ok(false);
        }
        let Some(active) = record.active_quote() else {
          return Ok(false);
        };
        if !active.is_expired(now) {
          return Ok(false);
        }
        let quote_id = active.quote_id;
        record.quote_mut(quote_id)?.status = QuoteStatus::Expired;
        record.transition(OrderStatus::Expired, SYSTEM_ACTOR, Some("quote expired".to_string()))?;
        Ok(true)
      });
      if matches!(expired, Ok(true)) {
        swept.push(order_id);
      }
    }
    if !swept.is_empty() {
      info!(count = swept.len(), "expired stale quotes");
    }
    swept
  }

  // --- Queries ---

  pub fn order(&self, order_id: Uuid) -> CoopflowResult<Order> {
    self.ledger.order(order_id)
  }

  /// The record's optimistic-concurrency revision; advances once per
  /// committed transaction.
  pub fn revision(&self, order_id: Uuid) -> CoopflowResult<u64> {
    self.ledger.revision(order_id)
  }

  pub fn active_quote(&self, order_id: Uuid) -> CoopflowResult<Option<Quote>> {
    self.ledger.active_quote(order_id)
  }

  pub fn payments(&self, order_id: Uuid) -> CoopflowResult<Vec<Payment>> {
    self.ledger.payments(order_id)
  }

  pub fn disputes(&self, order_id: Uuid) -> CoopflowResult<Vec<Dispute>> {
    self.ledger.disputes(order_id)
  }

  pub fn evidence_by_kind(&self, order_id: Uuid) -> CoopflowResult<BTreeMap<EvidenceKind, Vec<Evidence>>> {
    self.ledger.evidence_by_kind(order_id)
  }

  /// The full audit trail, ascending by timestamp.
  pub fn timeline(&self, order_id: Uuid) -> CoopflowResult<Vec<AuditLogEntry>> {
    self.ledger.audit_trail(order_id)
  }
}
