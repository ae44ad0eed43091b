// tests/lifecycle_tests.rs

mod common;

use chrono::{Duration, Utc};
use common::*;
use coopflow::{
  ConfirmationMode, CoopflowError, CounterOffer, DisputeReason, DisputeRequest, OrderStatus, PaymentType,
  QuoteStatus, ResolutionKind, SYSTEM_ACTOR,
};

#[tokio::test]
async fn a_full_advance_order_runs_end_to_end() {
  let fx = Fixture::new();
  let (order, draft) = fx.opened(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp));

  fx.desk
    .send_quote(fx.seller, draft.quote_id, standard_terms(PaymentType::FullAdvance))
    .unwrap();
  fx.desk.agree_to_quote(fx.buyer, draft.quote_id).unwrap();
  let locked = fx.desk.agree_to_quote(fx.seller, draft.quote_id).unwrap();
  assert_eq!(locked.final_total_cents, FINAL_TOTAL_CENTS);

  let payment = fx.desk.payments(order.order_id).unwrap().remove(0);
  assert_eq!(payment.amount_cents, FINAL_TOTAL_CENTS);
  fx.desk
    .submit_payment_proof(fx.buyer, payment.payment_id, proof_image("upi.png"), Some("UPI-889".to_string()))
    .await
    .unwrap();
  fx.desk.verify_payment(fx.seller, payment.payment_id).unwrap();

  fx.desk.mark_dispatched(fx.seller, order.order_id).unwrap();
  let code = fx.desk.generate_delivery_otp(fx.buyer, order.order_id).unwrap();
  fx.desk.verify_delivery_otp(fx.seller, order.order_id, &code).await.unwrap();
  let done = fx.desk.complete_order(fx.buyer, order.order_id).unwrap();
  assert_eq!(done.status, OrderStatus::Completed);

  let trail = fx.desk.timeline(order.order_id).unwrap();
  assert_trail_is_legal(&trail);
  let path: Vec<OrderStatus> = trail.iter().map(|e| e.to_state).collect();
  assert_eq!(
    path,
    vec![
      OrderStatus::QuoteSent,
      OrderStatus::AgreementLocked,
      OrderStatus::AdvancePending,
      OrderStatus::PaymentProofSubmitted,
      OrderStatus::PaymentVerified,
      OrderStatus::Preparing,
      OrderStatus::Dispatched,
      OrderStatus::Delivered,
      OrderStatus::Completed,
    ]
  );
}

#[tokio::test]
async fn a_contested_renegotiated_order_still_leaves_a_legal_trail() {
  let fx = Fixture::new();
  let (order, draft) = fx.opened(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp));

  // Haggle once, then settle on the counter.
  fx.desk
    .send_quote(fx.seller, draft.quote_id, standard_terms(PaymentType::FullAdvance))
    .unwrap();
  let counter = fx
    .desk
    .counter_offer(
      fx.buyer,
      draft.quote_id,
      CounterOffer { base_price_cents: Some(48_000), delivery_charge_cents: None, notes: None },
    )
    .unwrap();
  fx.desk.agree_to_quote(fx.seller, counter.quote_id).unwrap();
  fx.desk.agree_to_quote(fx.buyer, counter.quote_id).unwrap();

  // First proof bounces, the second sticks.
  let payment = fx.desk.payments(order.order_id).unwrap().remove(0);
  fx.desk
    .submit_payment_proof(fx.buyer, payment.payment_id, proof_image("blurry.png"), None)
    .await
    .unwrap();
  fx.desk
    .reject_payment(fx.seller, payment.payment_id, "wrong account".to_string())
    .unwrap();
  fx.desk
    .submit_payment_proof(fx.buyer, payment.payment_id, proof_image("sharp.png"), None)
    .await
    .unwrap();
  fx.desk.verify_payment(fx.seller, payment.payment_id).unwrap();
  fx.desk.mark_dispatched(fx.seller, order.order_id).unwrap();

  // A dispute interrupts the delivery, then releases it.
  let dispute = fx
    .desk
    .raise_dispute(
      fx.buyer,
      order.order_id,
      DisputeRequest {
        reason: DisputeReason::DeliveryIssue,
        description: "courier has been circling for two days".to_string(),
        requested_resolution: None,
        claimed_amount_cents: None,
        evidence_ids: Vec::new(),
        attachments: Vec::new(),
      },
    )
    .await
    .unwrap();
  fx.desk.begin_review(fx.moderator, dispute.dispute_id).unwrap();
  fx.desk
    .resolve_dispute(fx.moderator, dispute.dispute_id, ResolutionKind::ReleaseToSeller, None)
    .unwrap();

  let code = fx.desk.generate_delivery_otp(fx.buyer, order.order_id).unwrap();
  fx.desk.verify_delivery_otp(fx.seller, order.order_id, &code).await.unwrap();
  fx.desk.complete_order(fx.seller, order.order_id).unwrap();

  let trail = fx.desk.timeline(order.order_id).unwrap();
  assert_trail_is_legal(&trail);
  assert_eq!(trail.last().unwrap().to_state, OrderStatus::Completed);
}

#[tokio::test]
async fn sweeping_expires_stale_quotes_but_not_locked_or_unquoted_orders() {
  let fx = Fixture::new();

  let (stale, stale_draft) = fx.opened(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp));
  fx.desk
    .send_quote(fx.seller, stale_draft.quote_id, standard_terms(PaymentType::FullAdvance))
    .unwrap();
  let locked = fx.locked(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp));
  let (enquiry_only, _) = fx.opened(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp));

  let swept = fx.desk.sweep_expired(Utc::now() + Duration::hours(49));
  assert_eq!(swept, vec![stale.order_id]);

  let expired = fx.desk.order(stale.order_id).unwrap();
  assert_eq!(expired.status, OrderStatus::Expired);
  let quote = fx.desk.active_quote(stale.order_id).unwrap().unwrap();
  assert_eq!(quote.status, QuoteStatus::Expired);
  // The sweep runs under the system actor, not a party.
  let trail = fx.desk.timeline(stale.order_id).unwrap();
  assert_eq!(trail.last().unwrap().actor_id, SYSTEM_ACTOR);

  assert_eq!(fx.desk.order(locked.order_id).unwrap().status, OrderStatus::AdvancePending);
  assert_eq!(fx.desk.order(enquiry_only.order_id).unwrap().status, OrderStatus::Enquiry);

  // Expired quotes are closed to agreement.
  let err = fx.desk.agree_to_quote(fx.buyer, stale_draft.quote_id).unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");
}

#[tokio::test]
async fn cancellation_is_open_before_verification_and_closed_after() {
  let fx = Fixture::new();

  let early = fx.locked(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp));
  let cancelled = fx
    .desk
    .cancel_order(fx.buyer, early.order_id, Some("found a closer farm".to_string()))
    .unwrap();
  assert_eq!(cancelled.status, OrderStatus::Cancelled);

  let late = fx
    .preparing(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;
  let err = fx.desk.cancel_order(fx.buyer, late.order_id, None).unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");
}

#[tokio::test]
async fn completion_requires_a_delivered_order() {
  let fx = Fixture::new();
  let order = fx
    .preparing(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;

  let err = fx.desk.complete_order(fx.buyer, order.order_id).unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");
}

#[tokio::test]
async fn settled_orders_accept_no_further_operations() {
  let fx = Fixture::new();
  let order = fx
    .awaiting_handover(PaymentType::FullAdvance, home_delivery(ConfirmationMode::Otp))
    .await;
  let code = fx.desk.generate_delivery_otp(fx.buyer, order.order_id).unwrap();
  fx.desk.verify_delivery_otp(fx.seller, order.order_id, &code).await.unwrap();
  fx.desk.complete_order(fx.buyer, order.order_id).unwrap();

  let err = fx.desk.cancel_order(fx.buyer, order.order_id, None).unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");
  let err = fx.desk.mark_dispatched(fx.seller, order.order_id).unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");
  let err = fx.desk.complete_order(fx.buyer, order.order_id).unwrap_err();
  assert!(matches!(err, CoopflowError::IllegalState { .. }), "got {err}");
}
