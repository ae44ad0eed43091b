// coopflow/src/engines/dispute.rs

//! Dispute intake and the moderator resolution workflow.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::collab::MediaStorage;
use crate::domain::{
  Actor, ActorRole, Dispute, DisputeReason, DisputeStatus, Evidence, EvidenceKind, MediaUpload, OrderStatus,
  ResolutionKind, MIN_DISPUTE_DESCRIPTION_CHARS,
};
use crate::error::{CoopflowError, CoopflowResult};
use crate::ledger::Ledger;

/// Intake form for a new dispute.
#[derive(Debug, Clone)]
pub struct DisputeRequest {
  pub reason: DisputeReason,
  pub description: String,
  pub requested_resolution: Option<String>,
  pub claimed_amount_cents: Option<i64>,
  /// Existing evidence records of the order to attach.
  pub evidence_ids: Vec<Uuid>,
  /// New media to upload and attach as dispute evidence.
  pub attachments: Vec<MediaUpload>,
}

pub struct DisputeEngine {
  ledger: Arc<Ledger>,
  media: Arc<dyn MediaStorage>,
}

impl DisputeEngine {
  pub fn new(ledger: Arc<Ledger>, media: Arc<dyn MediaStorage>) -> Self {
    DisputeEngine { ledger, media }
  }

  /// Opens a dispute against any order that is past enquiry and not
  /// terminal. Fresh attachments are uploaded first and recorded as
  /// dispute evidence alongside any pre-existing evidence the caller
  /// referenced. The first open dispute moves the order to `Dispute` and
  /// records the interrupted status; further disputes accumulate without
  /// another transition.
  #[instrument(name = "dispute::raise_dispute", skip(self, request), fields(order_id = %order_id, reason = %request.reason), err(Display))]
  pub async fn raise_dispute(&self, actor: Actor, order_id: Uuid, request: DisputeRequest) -> CoopflowResult<Dispute> {
    if actor.role == ActorRole::Moderator {
      return Err(CoopflowError::illegal_state(
        "raise_dispute",
        "moderators review disputes, parties raise them",
      ));
    }
    let description = request.description.trim().to_string();
    if description.chars().count() < MIN_DISPUTE_DESCRIPTION_CHARS {
      return Err(CoopflowError::validation(format!(
        "description must be at least {} characters",
        MIN_DISPUTE_DESCRIPTION_CHARS
      )));
    }
    if request.reason.requires_claimed_amount() && request.claimed_amount_cents.is_none() {
      return Err(CoopflowError::validation(format!(
        "a claimed amount is required for reason '{}'",
        request.reason
      )));
    }
    if let Some(amount) = request.claimed_amount_cents {
      if amount <= 0 {
        return Err(CoopflowError::validation("claimed amount must be positive"));
      }
    }

    // Validate before paying the upload cost; the authoritative check
    // happens again inside the commit.
    let (record, revision) = self.ledger.snapshot(order_id)?;
    actor.require_party(record.order.buyer_id, record.order.seller_id, "raise_dispute")?;
    if !record.order.status.accepts_dispute() {
      return Err(CoopflowError::illegal_state(
        "raise_dispute",
        format!("order is '{}'", record.order.status),
      ));
    }
    for evidence_id in &request.evidence_ids {
      if !record.evidence.iter().any(|e| e.evidence_id == *evidence_id) {
        return Err(CoopflowError::validation(format!(
          "evidence {} does not belong to this order",
          evidence_id
        )));
      }
    }

    let mut attachment_uris = Vec::with_capacity(request.attachments.len());
    for upload in &request.attachments {
      let uri = self
        .media
        .store(order_id, &upload.file_name, &upload.bytes)
        .await
        .map_err(|e| CoopflowError::upstream("dispute_attachment_upload", e))?;
      attachment_uris.push(uri);
    }

    let dispute = self.ledger.transact_at(order_id, revision, |record| {
      if !record.order.status.accepts_dispute() {
        return Err(CoopflowError::illegal_state(
          "raise_dispute",
          format!("order is '{}'", record.order.status),
        ));
      }

      let mut evidence_ids = request.evidence_ids.clone();
      for (upload, uri) in request.attachments.iter().zip(&attachment_uris) {
        let evidence = Evidence::new(order_id, EvidenceKind::DisputeAttachment, actor.id, actor.role)
          .with_media(upload.kind, uri.clone());
        evidence_ids.push(evidence.evidence_id);
        record.evidence.push(evidence);
      }

      let dispute = Dispute {
        dispute_id: Uuid::new_v4(),
        order_id,
        raised_by: actor.id,
        raised_by_role: actor.role,
        reason: request.reason,
        description: description.clone(),
        requested_resolution: request.requested_resolution.clone(),
        claimed_amount_cents: request.claimed_amount_cents,
        status: DisputeStatus::Open,
        resolution: None,
        resolution_note: None,
        evidence_ids,
        created_at: Utc::now(),
      };
      let snapshot = dispute.clone();
      record.disputes.push(dispute);

      if record.order.status != OrderStatus::Dispute {
        record.order.status_before_dispute = Some(record.order.status);
        record.transition(
          OrderStatus::Dispute,
          actor.id,
          Some(format!("dispute raised: {}", request.reason)),
        )?;
      }
      Ok(snapshot)
    })?;

    warn!(%order_id, dispute_id = %dispute.dispute_id, reason = %dispute.reason, "dispute raised");
    Ok(dispute)
  }

  /// Moderator takes the dispute into review.
  #[instrument(name = "dispute::begin_review", skip(self), fields(dispute_id = %dispute_id), err(Display))]
  pub fn begin_review(&self, moderator: Actor, dispute_id: Uuid) -> CoopflowResult<Dispute> {
    moderator.require_role(ActorRole::Moderator, "begin_review")?;
    let order_id = self.ledger.order_id_for_dispute(dispute_id)?;
    self.ledger.transact(order_id, |record| {
      let dispute = record.dispute_mut(dispute_id)?;
      if dispute.status != DisputeStatus::Open {
        return Err(CoopflowError::illegal_state(
          "begin_review",
          format!("dispute is '{}', expected open", dispute.status),
        ));
      }
      dispute.status = DisputeStatus::UnderReview;
      Ok(dispute.clone())
    })
  }

  /// Promotes a dispute from moderator review to the higher-authority
  /// resolution track. The order stays in `Dispute`.
  #[instrument(name = "dispute::escalate", skip(self, note), fields(dispute_id = %dispute_id), err(Display))]
  pub fn escalate(&self, moderator: Actor, dispute_id: Uuid, note: Option<String>) -> CoopflowResult<Dispute> {
    moderator.require_role(ActorRole::Moderator, "escalate")?;
    let order_id = self.ledger.order_id_for_dispute(dispute_id)?;
    self.ledger.transact(order_id, |record| {
      let dispute = record.dispute_mut(dispute_id)?;
      if dispute.status != DisputeStatus::UnderReview {
        return Err(CoopflowError::illegal_state(
          "escalate",
          format!("dispute is '{}', expected under_review", dispute.status),
        ));
      }
      dispute.status = DisputeStatus::Escalated;
      dispute.resolution_note = note.clone();
      Ok(dispute.clone())
    })
  }

  /// Settles the dispute with a verdict. Once no dispute on the order
  /// remains open, the verdict decides the order outcome: cancelling kinds
  /// settle it as `Cancelled`, the rest revert to the interrupted status.
  #[instrument(name = "dispute::resolve", skip(self, note), fields(dispute_id = %dispute_id, resolution = %resolution), err(Display))]
  pub fn resolve(
    &self,
    moderator: Actor,
    dispute_id: Uuid,
    resolution: ResolutionKind,
    note: Option<String>,
  ) -> CoopflowResult<Dispute> {
    moderator.require_role(ActorRole::Moderator, "resolve")?;
    let order_id = self.ledger.order_id_for_dispute(dispute_id)?;
    let dispute = self.ledger.transact(order_id, |record| {
      let dispute = record.dispute_mut(dispute_id)?;
      match dispute.status {
        DisputeStatus::UnderReview | DisputeStatus::Escalated => {}
        other => {
          return Err(CoopflowError::illegal_state(
            "resolve",
            format!("dispute is '{}', expected under_review or escalated", other),
          ));
        }
      }
      dispute.status = DisputeStatus::Resolved;
      dispute.resolution = Some(resolution);
      dispute.resolution_note = note.clone();
      let snapshot = dispute.clone();

      if record.open_dispute_count() == 0 {
        if resolution.cancels_order() {
          record.order.status_before_dispute = None;
          record.transition(
            OrderStatus::Cancelled,
            moderator.id,
            Some(format!("dispute resolved: {}", resolution)),
          )?;
        } else {
          let prior = record.order.status_before_dispute.take().ok_or_else(|| {
            CoopflowError::illegal_state("resolve", "no pre-dispute status recorded for this order")
          })?;
          record.transition(
            prior,
            moderator.id,
            Some(format!("dispute resolved: {}, resuming flow", resolution)),
          )?;
        }
      }
      Ok(snapshot)
    })?;

    info!(%order_id, dispute_id = %dispute_id, resolution = %resolution, "dispute resolved");
    Ok(dispute)
  }
}
