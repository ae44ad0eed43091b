// coopflow/src/engines/delivery.rs

//! Proof-of-delivery: dispatch, OTP handover codes and photo confirmation.
//!
//! The order's delivery terms carry a confirmation-mode discriminant; only
//! the matching path is invocable, the other is rejected outright.
//! Geolocation is best-effort: a failed fetch never blocks the delivery
//! transition, it only means no location is recorded.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::collab::{GeoLocator, MediaStorage};
use crate::domain::{
  Actor, ActorRole, ConfirmationMode, Evidence, EvidenceKind, MediaUpload, Order, OrderStatus,
};
use crate::error::{CoopflowError, CoopflowResult};
use crate::ledger::{Ledger, OtpIssue};
use crate::otp;

enum OtpCheck {
  Delivered(Order),
  Mismatch(u32),
}

pub struct DeliveryEngine {
  ledger: Arc<Ledger>,
  media: Arc<dyn MediaStorage>,
  geo: Arc<dyn GeoLocator>,
}

impl DeliveryEngine {
  pub fn new(ledger: Arc<Ledger>, media: Arc<dyn MediaStorage>, geo: Arc<dyn GeoLocator>) -> Self {
    DeliveryEngine { ledger, media, geo }
  }

  /// Seller hands the order to the courier. Home-delivery orders only.
  #[instrument(name = "delivery::mark_dispatched", skip(self), fields(order_id = %order_id), err(Display))]
  pub fn mark_dispatched(&self, seller: Actor, order_id: Uuid) -> CoopflowResult<Order> {
    seller.require_role(ActorRole::Seller, "mark_dispatched")?;
    self.ledger.transact(order_id, |record| {
      if record.order.seller_id != seller.id {
        return Err(CoopflowError::illegal_state(
          "mark_dispatched",
          "only the order's seller may dispatch",
        ));
      }
      if record.order.delivery.is_pickup() {
        return Err(CoopflowError::illegal_state(
          "mark_dispatched",
          "pickup orders are marked ready for pickup instead",
        ));
      }
      record.transition(OrderStatus::Dispatched, seller.id, Some("dispatched".to_string()))?;
      Ok(record.order.clone())
    })
  }

  /// Seller announces the order is ready for collection. Pickup orders only.
  #[instrument(name = "delivery::mark_ready_for_pickup", skip(self), fields(order_id = %order_id), err(Display))]
  pub fn mark_ready_for_pickup(&self, seller: Actor, order_id: Uuid) -> CoopflowResult<Order> {
    seller.require_role(ActorRole::Seller, "mark_ready_for_pickup")?;
    self.ledger.transact(order_id, |record| {
      if record.order.seller_id != seller.id {
        return Err(CoopflowError::illegal_state(
          "mark_ready_for_pickup",
          "only the order's seller may do this",
        ));
      }
      if !record.order.delivery.is_pickup() {
        return Err(CoopflowError::illegal_state(
          "mark_ready_for_pickup",
          "home-delivery orders are dispatched instead",
        ));
      }
      record.transition(OrderStatus::ReadyForPickup, seller.id, Some("ready for pickup".to_string()))?;
      Ok(record.order.clone())
    })
  }

  /// Issues a fresh handover code to the buyer. Only the argon2 hash is
  /// persisted; the cleartext is returned exactly once. Regenerating
  /// replaces the previous code and resets the attempt budget.
  #[instrument(name = "delivery::generate_delivery_otp", skip(self), fields(order_id = %order_id), err(Display))]
  pub fn generate_delivery_otp(&self, buyer: Actor, order_id: Uuid) -> CoopflowResult<String> {
    buyer.require_role(ActorRole::Buyer, "generate_delivery_otp")?;
    let code = otp::generate_code();
    let code_hash = otp::hash_code(&code)?;
    self.ledger.transact(order_id, |record| {
      if record.order.buyer_id != buyer.id {
        return Err(CoopflowError::illegal_state(
          "generate_delivery_otp",
          "only the order's buyer may generate the handover code",
        ));
      }
      Self::require_awaiting_handover(&record.order, "generate_delivery_otp")?;
      Self::require_mode(&record.order, ConfirmationMode::Otp, "generate_delivery_otp")?;
      record.otp = Some(OtpIssue {
        code_hash: code_hash.clone(),
        issued_at: chrono::Utc::now(),
        failed_attempts: 0,
      });
      Ok(())
    })?;
    info!(%order_id, "delivery code issued");
    Ok(code)
  }

  /// Seller enters the buyer's code at handover. On a match the order is
  /// `Delivered` and, when a location is available, a geotag evidence
  /// record is appended for posteriori dispute use. Mismatches burn one
  /// attempt from the budget of five.
  #[instrument(name = "delivery::verify_delivery_otp", skip(self, code), fields(order_id = %order_id), err(Display))]
  pub async fn verify_delivery_otp(&self, seller: Actor, order_id: Uuid, code: &str) -> CoopflowResult<Order> {
    seller.require_role(ActorRole::Seller, "verify_delivery_otp")?;

    // Best-effort: missing permission or provider never blocks handover.
    let geo = match self.geo.locate().await {
      Ok(point) => Some(point),
      Err(e) => {
        warn!(%order_id, error = %e, "geolocation unavailable, continuing without");
        None
      }
    };

    let outcome = self.ledger.transact(order_id, |record| {
      if record.order.seller_id != seller.id {
        return Err(CoopflowError::illegal_state(
          "verify_delivery_otp",
          "only the order's seller may confirm handover",
        ));
      }
      Self::require_awaiting_handover(&record.order, "verify_delivery_otp")?;
      Self::require_mode(&record.order, ConfirmationMode::Otp, "verify_delivery_otp")?;
      let issue = record
        .otp
        .as_mut()
        .ok_or_else(|| CoopflowError::illegal_state("verify_delivery_otp", "no delivery code issued"))?;
      if issue.failed_attempts >= otp::MAX_OTP_ATTEMPTS {
        return Err(CoopflowError::validation(
          "delivery code attempt limit reached; generate a new code",
        ));
      }
      if otp::verify_code(&issue.code_hash, code)? {
        let evidence = Evidence::new(order_id, EvidenceKind::DeliveryGeotag, seller.id, seller.role)
          .with_text("delivery confirmed via handover code")
          .with_geo(geo);
        record.evidence.push(evidence);
        record.transition(
          OrderStatus::Delivered,
          seller.id,
          Some("delivery confirmed via handover code".to_string()),
        )?;
        Ok(OtpCheck::Delivered(record.order.clone()))
      } else {
        // Commit the burned attempt; the caller still gets an error.
        issue.failed_attempts += 1;
        Ok(OtpCheck::Mismatch(issue.failed_attempts))
      }
    })?;

    match outcome {
      OtpCheck::Delivered(order) => {
        info!(%order_id, located = geo.is_some(), "delivery confirmed via code");
        Ok(order)
      }
      OtpCheck::Mismatch(attempts) => {
        warn!(%order_id, attempts, "delivery code mismatch");
        Err(CoopflowError::validation("invalid delivery code"))
      }
    }
  }

  /// Photo-path confirmation: a mandatory handover photo, optionally a
  /// photo of the buyer receiving the goods.
  #[instrument(name = "delivery::confirm_delivery_with_photo", skip(self, delivery_photo, buyer_photo), fields(order_id = %order_id), err(Display))]
  pub async fn confirm_delivery_with_photo(
    &self,
    seller: Actor,
    order_id: Uuid,
    delivery_photo: MediaUpload,
    buyer_photo: Option<MediaUpload>,
  ) -> CoopflowResult<Order> {
    seller.require_role(ActorRole::Seller, "confirm_delivery_with_photo")?;

    let (record, revision) = self.ledger.snapshot(order_id)?;
    if record.order.seller_id != seller.id {
      return Err(CoopflowError::illegal_state(
        "confirm_delivery_with_photo",
        "only the order's seller may confirm handover",
      ));
    }
    Self::require_awaiting_handover(&record.order, "confirm_delivery_with_photo")?;
    Self::require_mode(&record.order, ConfirmationMode::Photo, "confirm_delivery_with_photo")?;

    let delivery_uri = self
      .media
      .store(order_id, &delivery_photo.file_name, &delivery_photo.bytes)
      .await
      .map_err(|e| CoopflowError::upstream("delivery_photo_upload", e))?;
    let buyer_uri = match &buyer_photo {
      Some(upload) => Some(
        self
          .media
          .store(order_id, &upload.file_name, &upload.bytes)
          .await
          .map_err(|e| CoopflowError::upstream("buyer_photo_upload", e))?,
      ),
      None => None,
    };

    let order = self.ledger.transact_at(order_id, revision, |record| {
      record.evidence.push(
        Evidence::new(order_id, EvidenceKind::DeliveryPhoto, seller.id, seller.role)
          .with_media(delivery_photo.kind, delivery_uri.clone()),
      );
      if let (Some(uri), Some(upload)) = (buyer_uri.clone(), &buyer_photo) {
        record.evidence.push(
          Evidence::new(order_id, EvidenceKind::BuyerConfirmationPhoto, seller.id, seller.role)
            .with_media(upload.kind, uri),
        );
      }
      record.transition(
        OrderStatus::Delivered,
        seller.id,
        Some("delivery confirmed with photo".to_string()),
      )?;
      Ok(record.order.clone())
    })?;

    info!(%order_id, with_buyer_photo = buyer_photo.is_some(), "delivery confirmed with photo");
    Ok(order)
  }

  fn require_awaiting_handover(order: &Order, operation: &str) -> CoopflowResult<()> {
    match order.status {
      OrderStatus::Dispatched | OrderStatus::ReadyForPickup => Ok(()),
      other => Err(CoopflowError::illegal_state(
        operation,
        format!("order is '{}', expected dispatched or ready_for_pickup", other),
      )),
    }
  }

  fn require_mode(order: &Order, mode: ConfirmationMode, operation: &str) -> CoopflowResult<()> {
    if order.delivery.confirmation() == mode {
      Ok(())
    } else {
      Err(CoopflowError::illegal_state(
        operation,
        "the order's delivery terms select the other confirmation path",
      ))
    }
  }
}
