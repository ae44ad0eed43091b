// tests/dispute_tests.rs

mod common;

use std::sync::Arc;

use common::*;
use coopflow::{
  ConfirmationMode, CoopflowError, DisputeReason, DisputeRequest, DisputeStatus, EvidenceKind, FixedLocator,
  OrderStatus, PaymentType, ResolutionKind,
};
use uuid::Uuid;

fn delivery_issue(description: &str) -> DisputeRequest {
  DisputeRequest {
    reason: DisputeReason::DeliveryIssue,
    description: description.to_string(),
    requested_resolution: None,
    claimed_amount_cents: None,
    evidence_ids: Vec::new(),
    attachments: Vec::new(),
  }
}

#[tokio::test]
async fn description_must_carry_twenty_characters() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;

  let err = fx
    .desk
    .raise_dispute(fx.buyer, order.order_id, delivery_issue(&"x".repeat(19)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoopflowError::Validation { .. }), "got {err}");

  // Surrounding whitespace does not count.
  let err = fx
    .desk
    .raise_dispute(fx.buyer, order.order_id, delivery_issue(&format!("   {}   ", "x".repeat(19))))
    .await
    .unwrap_err();
  assert!(matches!(err, CoopflowError::Validation { .. }), "got {err}");

  let dispute = fx
    .desk
    .raise_dispute(fx.buyer, order.order_id, delivery_issue(&"x".repeat(20)))
    .await
    .unwrap();
  assert_eq!(dispute.status, DisputeStatus::Open);
}

#[tokio::test]
async fn an_open_dispute_freezes_the_order() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;

  fx.desk
    .raise_dispute(fx.buyer, order.order_id, delivery_issue("courier has been circling for two days"))
    .await
    .unwrap();
  let frozen = fx.desk.order(order.order_id).unwrap();
  assert_eq!(frozen.status, OrderStatus::Dispute);

  // No lifecycle operation goes through while the dispute is open.
  let code_err = fx.desk.generate_delivery_otp(fx.buyer, order.order_id).unwrap_err();
  assert!(matches!(code_err, CoopflowError::IllegalState { .. }), "got {code_err}");
  let cancel_err = fx.desk.cancel_order(fx.buyer, order.order_id, None).unwrap_err();
  assert!(matches!(cancel_err, CoopflowError::IllegalState { .. }), "got {cancel_err}");
  let quote = fx.desk.active_quote(order.order_id).unwrap().unwrap();
  let quote_err = fx.desk.send_quote(fx.seller, quote.quote_id, standard_terms(PaymentType::FullAdvance)).unwrap_err();
  assert!(matches!(quote_err, CoopflowError::IllegalState { .. }), "got {quote_err}");
}

#[tokio::test]
async fn disputes_are_rejected_for_enquiries_and_settled_orders() {
  let fx = Fixture::new();

  let (enquiry, _) = fx.opened(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp));
  let err = fx
    .desk
    .raise_dispute(fx.buyer, enquiry.order_id, delivery_issue("nothing has even happened yet"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");

  let cancelled = fx.locked(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp));
  fx.desk.cancel_order(fx.buyer, cancelled.order_id, None).unwrap();
  let err = fx
    .desk
    .raise_dispute(fx.seller, cancelled.order_id, delivery_issue("buyer walked away from the deal"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");
}

#[tokio::test]
async fn monetary_reasons_require_a_positive_claim() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;

  let mut request = delivery_issue("three of the birds arrived visibly sick");
  request.reason = DisputeReason::QualityIssue;
  let err = fx.desk.raise_dispute(fx.buyer, order.order_id, request.clone()).await.unwrap_err();
  assert!(matches!(err, CoopflowError::Validation { .. }), "got {err}");

  request.claimed_amount_cents = Some(-1);
  let err = fx.desk.raise_dispute(fx.buyer, order.order_id, request.clone()).await.unwrap_err();
  assert!(matches!(err, CoopflowError::Validation { .. }), "got {err}");

  request.claimed_amount_cents = Some(150_000);
  let dispute = fx.desk.raise_dispute(fx.buyer, order.order_id, request).await.unwrap();
  assert_eq!(dispute.claimed_amount_cents, Some(150_000));
}

#[tokio::test]
async fn attached_evidence_must_belong_to_the_order() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;

  let mut request = delivery_issue("package photo shows somebody else's crate");
  request.evidence_ids = vec![Uuid::new_v4()];
  let err = fx.desk.raise_dispute(fx.buyer, order.order_id, request).await.unwrap_err();
  assert!(matches!(err, CoopflowError::Validation { .. }), "got {err}");
}

#[tokio::test]
async fn fresh_attachments_become_dispute_evidence() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;

  let mut request = delivery_issue("crate arrived with a broken side panel");
  request.attachments = vec![proof_image("broken-panel.png")];
  let dispute = fx.desk.raise_dispute(fx.buyer, order.order_id, request).await.unwrap();

  let evidence = fx.desk.evidence_by_kind(order.order_id).unwrap();
  let attachments = &evidence[&EvidenceKind::DisputeAttachment];
  assert_eq!(attachments.len(), 1);
  assert!(attachments[0].image_uri.as_deref().unwrap().contains("broken-panel.png"));
  assert!(dispute.evidence_ids.contains(&attachments[0].evidence_id));
}

#[tokio::test]
async fn failed_attachment_upload_leaves_the_order_undisturbed() {
  let fx = Fixture::with_collaborators(Arc::new(FailingMediaStorage), Arc::new(FixedLocator(FARM_GATE)));
  // Cash settles at handover, so the flow up to dispatch touches no media.
  let order = fx
    .awaiting_handover(PaymentType::CashOnDelivery, home_delivery(ConfirmationMode::Otp))
    .await;

  let mut request = delivery_issue("crate arrived with a broken side panel");
  request.attachments = vec![proof_image("broken-panel.png")];
  let err = fx.desk.raise_dispute(fx.buyer, order.order_id, request).await.unwrap_err();
  assert!(matches!(err, CoopflowError::Upstream { .. }), "got {err}");

  // Nothing was recorded; the order is free to proceed.
  assert!(fx.desk.disputes(order.order_id).unwrap().is_empty());
  assert_eq!(fx.desk.order(order.order_id).unwrap().status, OrderStatus::Dispatched);
}

#[tokio::test]
async fn resolution_reverts_the_order_to_the_interrupted_flow() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;
  let dispute = fx
    .desk
    .raise_dispute(fx.buyer, order.order_id, delivery_issue("courier has been circling for two days"))
    .await
    .unwrap();

  fx.desk.begin_review(fx.moderator, dispute.dispute_id).unwrap();
  let resolved = fx
    .desk
    .resolve_dispute(fx.moderator, dispute.dispute_id, ResolutionKind::ReleaseToSeller, None)
    .unwrap();
  assert_eq!(resolved.status, DisputeStatus::Resolved);
  assert_eq!(resolved.resolution, Some(ResolutionKind::ReleaseToSeller));

  // Back to where the dispute interrupted it; delivery can proceed.
  assert_eq!(fx.desk.order(order.order_id).unwrap().status, OrderStatus::Dispatched);
  let code = fx.desk.generate_delivery_otp(fx.buyer, order.order_id).unwrap();
  fx.desk.verify_delivery_otp(fx.seller, order.order_id, &code).await.unwrap();

  assert_trail_is_legal(&fx.desk.timeline(order.order_id).unwrap());
}

#[tokio::test]
async fn refund_resolutions_cancel_the_order() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;
  let dispute = fx
    .desk
    .raise_dispute(fx.buyer, order.order_id, delivery_issue("crate never arrived at the address"))
    .await
    .unwrap();

  fx.desk.begin_review(fx.moderator, dispute.dispute_id).unwrap();
  fx.desk
    .resolve_dispute(fx.moderator, dispute.dispute_id, ResolutionKind::Refund, Some("full refund issued".to_string()))
    .unwrap();

  assert_eq!(fx.desk.order(order.order_id).unwrap().status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn escalated_disputes_resolve_the_same_way() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;
  let dispute = fx
    .desk
    .raise_dispute(fx.seller, order.order_id, delivery_issue("buyer refuses to take the delivery call"))
    .await
    .unwrap();

  // Resolution straight from `Open` is out of order.
  let err = fx
    .desk
    .resolve_dispute(fx.moderator, dispute.dispute_id, ResolutionKind::NoAction, None)
    .unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");

  fx.desk.begin_review(fx.moderator, dispute.dispute_id).unwrap();
  let escalated = fx
    .desk
    .escalate_dispute(fx.moderator, dispute.dispute_id, Some("needs senior review".to_string()))
    .unwrap();
  assert_eq!(escalated.status, DisputeStatus::Escalated);

  fx.desk
    .resolve_dispute(fx.moderator, dispute.dispute_id, ResolutionKind::NoAction, None)
    .unwrap();
  assert_eq!(fx.desk.order(order.order_id).unwrap().status, OrderStatus::Dispatched);
}

#[tokio::test]
async fn the_order_stays_frozen_until_every_dispute_is_resolved() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;

  let first = fx
    .desk
    .raise_dispute(fx.buyer, order.order_id, delivery_issue("courier has been circling for two days"))
    .await
    .unwrap();
  let second = fx
    .desk
    .raise_dispute(fx.seller, order.order_id, delivery_issue("buyer gave an unreachable address"))
    .await
    .unwrap();
  assert_eq!(fx.desk.disputes(order.order_id).unwrap().len(), 2);

  fx.desk.begin_review(fx.moderator, first.dispute_id).unwrap();
  fx.desk
    .resolve_dispute(fx.moderator, first.dispute_id, ResolutionKind::NoAction, None)
    .unwrap();
  // One dispute is still open; the order does not move.
  assert_eq!(fx.desk.order(order.order_id).unwrap().status, OrderStatus::Dispute);

  fx.desk.begin_review(fx.moderator, second.dispute_id).unwrap();
  fx.desk
    .resolve_dispute(fx.moderator, second.dispute_id, ResolutionKind::NoAction, None)
    .unwrap();
  assert_eq!(fx.desk.order(order.order_id).unwrap().status, OrderStatus::Dispatched);
}

#[tokio::test]
async fn intake_and_resolution_authority_are_separated() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;

  // Moderators review disputes, they do not raise them.
  let err = fx
    .desk
    .raise_dispute(fx.moderator, order.order_id, delivery_issue("spotted a suspicious delivery claim"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");

  let dispute = fx
    .desk
    .raise_dispute(fx.buyer, order.order_id, delivery_issue("courier has been circling for two days"))
    .await
    .unwrap();

  // And parties do not review or resolve.
  let err = fx.desk.begin_review(fx.buyer, dispute.dispute_id).unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");
  let err = fx
    .desk
    .resolve_dispute(fx.seller, dispute.dispute_id, ResolutionKind::NoAction, None)
    .unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");
}
