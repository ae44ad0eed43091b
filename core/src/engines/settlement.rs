// coopflow/src/engines/settlement.rs

//! Phased payment settlement: proof submission, seller verification and
//! the cash collection path.
//!
//! Proof uploads run against the media collaborator before any state is
//! touched; the subsequent commit is a compare-and-swap on the order
//! revision, so a write that slipped in during the upload surfaces as
//! `ConcurrencyConflict` instead of clobbering state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::collab::MediaStorage;
use crate::domain::{
  Actor, ActorRole, Evidence, EvidenceKind, MediaUpload, OrderStatus, Payment, PaymentPhase, PaymentStatus,
  PaymentType, QuoteStatus,
};
use crate::error::{CoopflowError, CoopflowResult};
use crate::ledger::{Ledger, OrderRecord};

/// Materializes the pending payments implied by the locked quote's payment
/// type and advances the order out of `AgreementLocked`. Idempotent:
/// returns the existing schedule if one was already opened. Record-level
/// so the desk can commit it in the same transaction as the lock itself.
pub(crate) fn materialize_schedule(record: &mut OrderRecord, actor: Actor) -> CoopflowResult<Vec<Payment>> {
  let order_id = record.order.order_id;
  if !record.payments.is_empty() {
    return Ok(record.payments.clone());
  }
  if record.order.status != OrderStatus::AgreementLocked {
    return Err(CoopflowError::illegal_state(
      "open_payment_schedule",
      format!("order is '{}'", record.order.status),
    ));
  }
  let quote = record
    .active_quote()
    .filter(|q| q.status == QuoteStatus::Locked)
    .ok_or_else(|| CoopflowError::illegal_state("open_payment_schedule", "no locked quote on this order"))?;
  let final_total = quote.final_total_cents;
  let advance = quote.advance_amount_cents;
  let balance = quote.balance_amount_cents;

  match record.order.payment_type {
    PaymentType::FullAdvance => {
      record.payments.push(Payment::new(order_id, PaymentPhase::Full, final_total));
      record.transition(OrderStatus::AdvancePending, actor.id, Some("payment schedule opened".to_string()))?;
    }
    PaymentType::AdvancePlusBalance => {
      let advance = advance
        .ok_or_else(|| CoopflowError::illegal_state("open_payment_schedule", "locked quote lacks an advance amount"))?;
      let balance = balance
        .ok_or_else(|| CoopflowError::illegal_state("open_payment_schedule", "locked quote lacks a balance amount"))?;
      record.payments.push(Payment::new(order_id, PaymentPhase::Advance, advance));
      record.payments.push(Payment::new(order_id, PaymentPhase::Balance, balance));
      record.transition(OrderStatus::AdvancePending, actor.id, Some("payment schedule opened".to_string()))?;
    }
    PaymentType::CashOnDelivery | PaymentType::CashOnPickup => {
      // Cash settles at handover; no digital proof phase blocks
      // preparation.
      record.payments.push(Payment::new(order_id, PaymentPhase::Balance, final_total));
      record.transition(
        OrderStatus::Preparing,
        actor.id,
        Some("cash settlement at handover; preparing".to_string()),
      )?;
    }
  }
  Ok(record.payments.clone())
}

pub struct SettlementEngine {
  ledger: Arc<Ledger>,
  media: Arc<dyn MediaStorage>,
}

impl SettlementEngine {
  pub fn new(ledger: Arc<Ledger>, media: Arc<dyn MediaStorage>) -> Self {
    SettlementEngine { ledger, media }
  }

  /// Opens the payment schedule for a locked order. See
  /// [`materialize_schedule`] for the semantics.
  #[instrument(name = "settlement::open_payment_schedule", skip(self), fields(order_id = %order_id), err(Display))]
  pub fn open_payment_schedule(&self, actor: Actor, order_id: Uuid) -> CoopflowResult<Vec<Payment>> {
    self.ledger.transact(order_id, |record| materialize_schedule(record, actor))
  }

  /// Uploads payment proof and links it to the pending payment. Legal from
  /// `Pending` or `Rejected` (resubmission). Cash phases have no digital
  /// proof and are settled via [`SettlementEngine::mark_balance_collected`].
  #[instrument(name = "settlement::submit_payment_proof", skip(self, proof, transaction_ref), fields(payment_id = %payment_id), err(Display))]
  pub async fn submit_payment_proof(
    &self,
    buyer: Actor,
    payment_id: Uuid,
    proof: MediaUpload,
    transaction_ref: Option<String>,
  ) -> CoopflowResult<Payment> {
    buyer.require_role(ActorRole::Buyer, "submit_payment_proof")?;
    let order_id = self.ledger.order_id_for_payment(payment_id)?;

    // Validate before paying the upload cost; the authoritative check
    // happens again inside the commit.
    let (record, revision) = self.ledger.snapshot(order_id)?;
    if record.order.buyer_id != buyer.id {
      return Err(CoopflowError::illegal_state(
        "submit_payment_proof",
        "only the order's buyer may submit payment proof",
      ));
    }
    if record.order.payment_type.is_cash() {
      return Err(CoopflowError::illegal_state(
        "submit_payment_proof",
        "cash settlement has no digital proof phase",
      ));
    }
    let payment = record.payment(payment_id)?;
    match payment.status {
      PaymentStatus::Pending | PaymentStatus::Rejected => {}
      other => {
        return Err(CoopflowError::illegal_state(
          "submit_payment_proof",
          format!("payment is '{}'", other),
        ));
      }
    }

    let uri = self
      .media
      .store(order_id, &proof.file_name, &proof.bytes)
      .await
      .map_err(|e| CoopflowError::upstream("payment_proof_upload", e))?;

    let payment = self.ledger.transact_at(order_id, revision, |record| {
      let evidence = Evidence::new(order_id, EvidenceKind::PaymentScreenshot, buyer.id, buyer.role)
        .with_media(proof.kind, uri.clone());
      let evidence_id = evidence.evidence_id;
      record.evidence.push(evidence);

      let payment = record.payment_mut(payment_id)?;
      payment.evidence_id = Some(evidence_id);
      payment.transaction_ref = transaction_ref.clone();
      payment.status = PaymentStatus::ProofSubmitted;
      payment.rejection_reason = None;
      payment.updated_at = Utc::now();
      let snapshot = payment.clone();

      if record.order.status == OrderStatus::AdvancePending {
        record.transition(
          OrderStatus::PaymentProofSubmitted,
          buyer.id,
          Some(format!("proof submitted for {} phase", snapshot.phase)),
        )?;
      }
      Ok(snapshot)
    })?;

    info!(%order_id, phase = %payment.phase, "payment proof submitted");
    Ok(payment)
  }

  /// Seller accepts the submitted proof. Verifying the last pre-dispatch
  /// phase moves the order through `PaymentVerified` to `Preparing`.
  #[instrument(name = "settlement::verify_payment", skip(self), fields(payment_id = %payment_id), err(Display))]
  pub fn verify_payment(&self, seller: Actor, payment_id: Uuid) -> CoopflowResult<Payment> {
    seller.require_role(ActorRole::Seller, "verify_payment")?;
    let order_id = self.ledger.order_id_for_payment(payment_id)?;
    let payment = self.ledger.transact(order_id, |record| {
      if record.order.seller_id != seller.id {
        return Err(CoopflowError::illegal_state(
          "verify_payment",
          "only the order's seller may verify payments",
        ));
      }
      let payment = record.payment_mut(payment_id)?;
      if payment.status != PaymentStatus::ProofSubmitted {
        return Err(CoopflowError::illegal_state(
          "verify_payment",
          format!("payment is '{}', expected proof_submitted", payment.status),
        ));
      }
      payment.status = PaymentStatus::Verified;
      payment.updated_at = Utc::now();
      let snapshot = payment.clone();

      // The accepted proof is itself verified evidence from here on.
      if let Some(evidence_id) = snapshot.evidence_id {
        if let Some(evidence) = record.evidence.iter_mut().find(|e| e.evidence_id == evidence_id) {
          evidence.is_verified = true;
        }
      }

      let unblocks_preparation = matches!(
        (record.order.payment_type, snapshot.phase),
        (PaymentType::FullAdvance, PaymentPhase::Full) | (PaymentType::AdvancePlusBalance, PaymentPhase::Advance)
      );
      if unblocks_preparation && record.order.status == OrderStatus::PaymentProofSubmitted {
        record.transition(OrderStatus::PaymentVerified, seller.id, Some("payment verified".to_string()))?;
        record.transition(OrderStatus::Preparing, seller.id, None)?;
      }
      Ok(snapshot)
    })?;

    info!(%order_id, phase = %payment.phase, amount_cents = payment.amount_cents, "payment verified");
    Ok(payment)
  }

  /// Seller rejects the submitted proof; the buyer may resubmit.
  #[instrument(name = "settlement::reject_payment", skip(self, reason), fields(payment_id = %payment_id), err(Display))]
  pub fn reject_payment(&self, seller: Actor, payment_id: Uuid, reason: String) -> CoopflowResult<Payment> {
    seller.require_role(ActorRole::Seller, "reject_payment")?;
    let order_id = self.ledger.order_id_for_payment(payment_id)?;
    let payment = self.ledger.transact(order_id, |record| {
      if record.order.seller_id != seller.id {
        return Err(CoopflowError::illegal_state(
          "reject_payment",
          "only the order's seller may reject payments",
        ));
      }
      let payment = record.payment_mut(payment_id)?;
      if payment.status != PaymentStatus::ProofSubmitted {
        return Err(CoopflowError::illegal_state(
          "reject_payment",
          format!("payment is '{}', expected proof_submitted", payment.status),
        ));
      }
      payment.status = PaymentStatus::Rejected;
      payment.rejection_reason = Some(reason.clone());
      payment.updated_at = Utc::now();
      let snapshot = payment.clone();

      if record.order.status == OrderStatus::PaymentProofSubmitted {
        record.transition(
          OrderStatus::AdvancePending,
          seller.id,
          Some(format!("proof rejected: {}", reason)),
        )?;
      }
      Ok(snapshot)
    })?;

    warn!(%order_id, phase = %payment.phase, "payment proof rejected");
    Ok(payment)
  }

  /// Cash completion path: marks the outstanding balance as collected at
  /// handover, optionally attaching a cash receipt.
  #[instrument(name = "settlement::mark_balance_collected", skip(self, receipt), fields(order_id = %order_id), err(Display))]
  pub async fn mark_balance_collected(
    &self,
    seller: Actor,
    order_id: Uuid,
    receipt: Option<MediaUpload>,
  ) -> CoopflowResult<Payment> {
    seller.require_role(ActorRole::Seller, "mark_balance_collected")?;

    let (record, revision) = self.ledger.snapshot(order_id)?;
    if record.order.seller_id != seller.id {
      return Err(CoopflowError::illegal_state(
        "mark_balance_collected",
        "only the order's seller may collect the balance",
      ));
    }
    match record.order.status {
      OrderStatus::Dispatched | OrderStatus::ReadyForPickup | OrderStatus::Delivered => {}
      other => {
        return Err(CoopflowError::illegal_state(
          "mark_balance_collected",
          format!("order is '{}', balance is collected at handover", other),
        ));
      }
    }
    let outstanding = record
      .payments
      .iter()
      .find(|p| p.phase == PaymentPhase::Balance && p.status != PaymentStatus::Verified)
      .ok_or_else(|| CoopflowError::illegal_state("mark_balance_collected", "no outstanding balance payment"))?;
    let payment_id = outstanding.payment_id;

    let receipt_uri = match &receipt {
      Some(upload) => Some(
        self
          .media
          .store(order_id, &upload.file_name, &upload.bytes)
          .await
          .map_err(|e| CoopflowError::upstream("cash_receipt_upload", e))?,
      ),
      None => None,
    };

    let payment = self.ledger.transact_at(order_id, revision, |record| {
      let evidence_id = match (receipt_uri.clone(), &receipt) {
        (Some(uri), Some(upload)) => {
          let evidence = Evidence::new(order_id, EvidenceKind::CashReceipt, seller.id, seller.role)
            .with_media(upload.kind, uri);
          let id = evidence.evidence_id;
          record.evidence.push(evidence);
          Some(id)
        }
        _ => None,
      };
      let payment = record.payment_mut(payment_id)?;
      if payment.status == PaymentStatus::Verified {
        return Err(CoopflowError::illegal_state(
          "mark_balance_collected",
          "balance already verified",
        ));
      }
      payment.status = PaymentStatus::Verified;
      payment.evidence_id = payment.evidence_id.or(evidence_id);
      payment.updated_at = Utc::now();
      let snapshot = payment.clone();

      // Collection verifies the attached receipt along with the payment.
      if let Some(id) = snapshot.evidence_id {
        if let Some(evidence) = record.evidence.iter_mut().find(|e| e.evidence_id == id) {
          evidence.is_verified = true;
        }
      }
      Ok(snapshot)
    })?;

    info!(%order_id, amount_cents = payment.amount_cents, "balance collected");
    Ok(payment)
  }
}
