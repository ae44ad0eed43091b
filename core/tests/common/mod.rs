// tests/common/mod.rs
#![allow(dead_code)] // Allow unused helpers in this common test module

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coopflow::{
  Actor, AuditLogEntry, ConfirmationMode, DeliveryTerms, EnquiryRequest, FixedLocator, GeoLocator, GeoPoint,
  MediaStorage, MediaUpload, MemoryMediaStorage, Order, OrderDesk, PaymentPhase, PaymentType, Quote, QuoteTerms,
};
use tracing::Level;
use uuid::Uuid;

// --- Shared pricing constants (10 birds at 500.00, delivery 100.00) ---
pub const QUANTITY: u32 = 10;
pub const BASE_PRICE_CENTS: i64 = 50_000;
pub const DELIVERY_CHARGE_CENTS: i64 = 10_000;
pub const FINAL_TOTAL_CENTS: i64 = 510_000;
pub const ADVANCE_CENTS: i64 = 200_000;
pub const BALANCE_CENTS: i64 = 310_000;

pub const FARM_GATE: GeoPoint = GeoPoint { latitude: 12.9716, longitude: 77.5946 };

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Fixture: a desk plus one buyer, seller and moderator ---
pub struct Fixture {
  pub desk: OrderDesk,
  pub buyer: Actor,
  pub seller: Actor,
  pub moderator: Actor,
}

impl Fixture {
  pub fn new() -> Self {
    Self::with_collaborators(Arc::new(MemoryMediaStorage::new()), Arc::new(FixedLocator(FARM_GATE)))
  }

  pub fn with_collaborators(media: Arc<dyn MediaStorage>, geo: Arc<dyn GeoLocator>) -> Self {
    setup_tracing();
    Fixture {
      desk: OrderDesk::new(media, geo),
      buyer: Actor::buyer(Uuid::new_v4()),
      seller: Actor::seller(Uuid::new_v4()),
      moderator: Actor::moderator(Uuid::new_v4()),
    }
  }

  pub fn chick_enquiry(&self, payment_type: PaymentType, delivery: DeliveryTerms) -> EnquiryRequest {
    EnquiryRequest {
      seller_id: self.seller.id,
      product_id: Uuid::new_v4(),
      product_name: "Aseel Chicks".to_string(),
      quantity: QUANTITY,
      unit: "birds".to_string(),
      delivery,
      payment_type,
      notes: Some("need a vaccinated batch".to_string()),
    }
  }

  /// Enquiry plus the draft quote it opens.
  pub fn opened(&self, payment_type: PaymentType, delivery: DeliveryTerms) -> (Order, Quote) {
    let order = self
      .desk
      .open_enquiry(self.buyer, self.chick_enquiry(payment_type, delivery))
      .unwrap();
    let draft = self.desk.active_quote(order.order_id).unwrap().unwrap();
    (order, draft)
  }

  /// Drives the negotiation through send + dual agreement; the desk opens
  /// the payment schedule on the lock.
  pub fn locked(&self, payment_type: PaymentType, delivery: DeliveryTerms) -> Order {
    let (order, draft) = self.opened(payment_type, delivery);
    self
      .desk
      .send_quote(self.seller, draft.quote_id, standard_terms(payment_type))
      .unwrap();
    self.desk.agree_to_quote(self.buyer, draft.quote_id).unwrap();
    self.desk.agree_to_quote(self.seller, draft.quote_id).unwrap();
    self.desk.order(order.order_id).unwrap()
  }

  /// Locked order driven to `Preparing`: the pre-dispatch payment phase is
  /// submitted and verified (a no-op for cash, which starts there).
  pub async fn preparing(&self, payment_type: PaymentType, delivery: DeliveryTerms) -> Order {
    let order = self.locked(payment_type, delivery);
    if payment_type.is_cash() {
      return order;
    }
    let upfront = self
      .desk
      .payments(order.order_id)
      .unwrap()
      .into_iter()
      .find(|p| p.phase != PaymentPhase::Balance)
      .unwrap();
    self
      .desk
      .submit_payment_proof(self.buyer, upfront.payment_id, proof_image("upi.png"), Some("UPI-001".to_string()))
      .await
      .unwrap();
    self.desk.verify_payment(self.seller, upfront.payment_id).unwrap();
    self.desk.order(order.order_id).unwrap()
  }

  /// Preparing order moved to the handover stage matching its delivery
  /// terms (`Dispatched` or `ReadyForPickup`).
  pub async fn awaiting_handover(&self, payment_type: PaymentType, delivery: DeliveryTerms) -> Order {
    let pickup = delivery.is_pickup();
    let order = self.preparing(payment_type, delivery).await;
    if pickup {
      self.desk.mark_ready_for_pickup(self.seller, order.order_id).unwrap()
    } else {
      self.desk.mark_dispatched(self.seller, order.order_id).unwrap()
    }
  }
}

pub fn home_delivery(confirmation: ConfirmationMode) -> DeliveryTerms {
  DeliveryTerms::HomeDelivery {
    address: "12 Farm Road, Hosur".to_string(),
    distance_km: Some(18.0),
    confirmation,
  }
}

pub fn pickup(confirmation: ConfirmationMode) -> DeliveryTerms {
  DeliveryTerms::Pickup { confirmation }
}

pub fn standard_terms(payment_type: PaymentType) -> QuoteTerms {
  QuoteTerms {
    base_price_cents: BASE_PRICE_CENTS,
    delivery_charge_cents: DELIVERY_CHARGE_CENTS,
    packing_charge_cents: 0,
    discount_cents: 0,
    allowed_payment_types: vec![payment_type],
    advance_amount_cents: payment_type.splits().then_some(ADVANCE_CENTS),
    seller_notes: None,
    expires_in_hours: 48,
  }
}

pub fn proof_image(name: &str) -> MediaUpload {
  MediaUpload::image(name, vec![0x89, 0x50, 0x4e, 0x47])
}

/// Every entry must be a legal edge and the trail must be gapless.
pub fn assert_trail_is_legal(trail: &[AuditLogEntry]) {
  for pair in trail.windows(2) {
    assert_eq!(
      pair[0].to_state, pair[1].from_state,
      "audit trail has a gap between {} and {}",
      pair[0].to_state, pair[1].from_state
    );
  }
  for entry in trail {
    assert!(
      entry.from_state.can_transition_to(entry.to_state),
      "audit trail records an illegal transition {} -> {}",
      entry.from_state,
      entry.to_state
    );
  }
}

// --- Collaborator doubles ---

/// Object store that is always down.
pub struct FailingMediaStorage;

#[async_trait]
impl MediaStorage for FailingMediaStorage {
  async fn store(&self, _order_id: Uuid, _file_name: &str, _bytes: &[u8]) -> anyhow::Result<String> {
    Err(anyhow::anyhow!("object store unreachable"))
  }
}

/// Object store with a fixed upload latency, for interleaving writes
/// against an in-flight upload.
pub struct SlowMediaStorage {
  pub delay: Duration,
}

#[async_trait]
impl MediaStorage for SlowMediaStorage {
  async fn store(&self, order_id: Uuid, file_name: &str, _bytes: &[u8]) -> anyhow::Result<String> {
    tokio::time::sleep(self.delay).await;
    Ok(format!("mem://{}/{}", order_id, file_name))
  }
}
