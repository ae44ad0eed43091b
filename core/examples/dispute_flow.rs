// coopflow/examples/dispute_flow.rs

use std::sync::Arc;

use coopflow::{
  Actor, ConfirmationMode, CoopflowError, DeliveryTerms, DisputeReason, DisputeRequest, EnquiryRequest,
  MediaUpload, MemoryMediaStorage, NoLocator, OrderDesk, PaymentType, QuoteTerms, ResolutionKind,
};
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), CoopflowError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Dispute Flow Example ---");

  let desk = OrderDesk::new(Arc::new(MemoryMediaStorage::new()), Arc::new(NoLocator));
  let buyer = Actor::buyer(Uuid::new_v4());
  let seller = Actor::seller(Uuid::new_v4());
  let moderator = Actor::moderator(Uuid::new_v4());

  // 1. Drive an order up to dispatch: 2 country roosters, cash on delivery
  let order = desk.open_enquiry(
    buyer,
    EnquiryRequest {
      seller_id: seller.id,
      product_id: Uuid::new_v4(),
      product_name: "Country Roosters".to_string(),
      quantity: 2,
      unit: "birds".to_string(),
      delivery: DeliveryTerms::HomeDelivery {
        address: "4 Lakeview Street, Salem".to_string(),
        distance_km: Some(9.5),
        confirmation: ConfirmationMode::Photo,
      },
      payment_type: PaymentType::CashOnDelivery,
      notes: None,
    },
  )?;
  let draft = desk.active_quote(order.order_id)?.expect("enquiry always has a draft");
  let quote = desk.send_quote(
    seller,
    draft.quote_id,
    QuoteTerms {
      base_price_cents: 120_000,
      delivery_charge_cents: 8_000,
      packing_charge_cents: 0,
      discount_cents: 0,
      allowed_payment_types: vec![PaymentType::CashOnDelivery],
      advance_amount_cents: None,
      seller_notes: None,
      expires_in_hours: 24,
    },
  )?;
  desk.agree_to_quote(buyer, quote.quote_id)?;
  desk.agree_to_quote(seller, quote.quote_id)?;
  // Cash settles at handover, so the order goes straight to preparing.
  desk.mark_dispatched(seller, order.order_id)?;
  info!(order_id = %order.order_id, "order dispatched");

  // 2. The buyer raises a dispute against the in-flight delivery, attaching
  //    a photo of the stalled courier tracking screen
  let dispute = desk
    .raise_dispute(
      buyer,
      order.order_id,
      DisputeRequest {
        reason: DisputeReason::DeliveryIssue,
        description: "courier has been circling the area for two days".to_string(),
        requested_resolution: Some("deliver today or cancel".to_string()),
        claimed_amount_cents: None,
        evidence_ids: Vec::new(),
        attachments: vec![MediaUpload::image("tracking-screen.png", vec![0x89, 0x50, 0x4e, 0x47])],
      },
    )
    .await?;
  info!(dispute_id = %dispute.dispute_id, status = %desk.order(order.order_id)?.status, "order frozen");

  // 3. The moderator reviews and releases the delivery back to the seller
  desk.begin_review(moderator, dispute.dispute_id)?;
  let resolved = desk.resolve_dispute(
    moderator,
    dispute.dispute_id,
    ResolutionKind::ReleaseToSeller,
    Some("courier confirmed en route".to_string()),
  )?;
  info!(resolution = ?resolved.resolution, status = %desk.order(order.order_id)?.status, "dispute resolved");

  // 4. Delivery resumes on the photo path, cash is collected, order closes
  desk
    .confirm_delivery_with_photo(
      seller,
      order.order_id,
      MediaUpload::image("doorstep.jpg", vec![0xff, 0xd8]),
      Some(MediaUpload::image("buyer_receiving.jpg", vec![0xff, 0xd8])),
    )
    .await?;
  desk
    .mark_balance_collected(seller, order.order_id, Some(MediaUpload::image("receipt.jpg", vec![0xff, 0xd8])))
    .await?;
  let done = desk.complete_order(seller, order.order_id)?;
  info!(status = %done.status, "order settled after dispute");

  let trail = desk.timeline(order.order_id)?;
  for entry in &trail {
    info!("- {} -> {} {}", entry.from_state, entry.to_state, entry.note.as_deref().unwrap_or(""));
  }

  Ok(())
}
