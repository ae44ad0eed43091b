// coopflow/examples/full_order_flow.rs

use std::sync::Arc;

use coopflow::{
  Actor, ConfirmationMode, CoopflowError, DeliveryTerms, EnquiryRequest, FixedLocator, GeoPoint, MediaUpload,
  MemoryMediaStorage, OrderDesk, PaymentType, QuoteTerms,
};
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), CoopflowError> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Full Order Flow Example ---");

  // 1. Wire the desk with in-process collaborators
  let desk = OrderDesk::new(
    Arc::new(MemoryMediaStorage::new()),
    Arc::new(FixedLocator(GeoPoint { latitude: 12.9716, longitude: 77.5946 })),
  );
  let buyer = Actor::buyer(Uuid::new_v4());
  let seller = Actor::seller(Uuid::new_v4());

  // 2. Buyer opens an enquiry: 10 Aseel chicks, home delivery, full advance
  let order = desk.open_enquiry(
    buyer,
    EnquiryRequest {
      seller_id: seller.id,
      product_id: Uuid::new_v4(),
      product_name: "Aseel Chicks".to_string(),
      quantity: 10,
      unit: "birds".to_string(),
      delivery: DeliveryTerms::HomeDelivery {
        address: "12 Farm Road, Hosur".to_string(),
        distance_km: Some(18.0),
        confirmation: ConfirmationMode::Otp,
      },
      payment_type: PaymentType::FullAdvance,
      notes: Some("need a vaccinated batch".to_string()),
    },
  )?;
  info!(order_id = %order.order_id, "enquiry opened");

  // 3. Seller prices the draft quote: 500.00 per bird + 100.00 delivery
  let draft = desk.active_quote(order.order_id)?.expect("enquiry always has a draft");
  let quote = desk.send_quote(
    seller,
    draft.quote_id,
    QuoteTerms {
      base_price_cents: 50_000,
      delivery_charge_cents: 10_000,
      packing_charge_cents: 0,
      discount_cents: 0,
      allowed_payment_types: vec![PaymentType::FullAdvance, PaymentType::AdvancePlusBalance],
      advance_amount_cents: None,
      seller_notes: Some("healthy 6-week batch".to_string()),
      expires_in_hours: 48,
    },
  )?;
  info!(final_total_cents = quote.final_total_cents, "quote sent");

  // 4. Both parties agree; the second agreement locks the price and opens
  //    the payment schedule
  desk.agree_to_quote(buyer, quote.quote_id)?;
  let locked = desk.agree_to_quote(seller, quote.quote_id)?;
  info!(locked_at = ?locked.locked_at, "quote locked by dual agreement");

  // 5. Buyer pays the full amount and uploads the proof screenshot
  let payment = desk.payments(order.order_id)?.remove(0);
  desk
    .submit_payment_proof(
      buyer,
      payment.payment_id,
      MediaUpload::image("upi_screenshot.png", vec![0x89, 0x50, 0x4e, 0x47]),
      Some("UPI-2024-000889".to_string()),
    )
    .await?;
  desk.verify_payment(seller, payment.payment_id)?;
  info!("payment verified, order is preparing");

  // 6. Seller dispatches; the buyer reads the handover code to the courier
  desk.mark_dispatched(seller, order.order_id)?;
  let code = desk.generate_delivery_otp(buyer, order.order_id)?;
  desk.verify_delivery_otp(seller, order.order_id, &code).await?;
  info!("delivery confirmed via handover code");

  // 7. Close the order and print the timeline
  let done = desk.complete_order(buyer, order.order_id)?;
  info!(status = %done.status, "order settled");

  let trail = desk.timeline(order.order_id)?;
  info!("timeline ({} transitions):", trail.len());
  for entry in &trail {
    info!("- {} -> {} {}", entry.from_state, entry.to_state, entry.note.as_deref().unwrap_or(""));
  }
  println!("{}", serde_json::to_string_pretty(&trail).expect("audit entries serialize"));

  Ok(())
}
