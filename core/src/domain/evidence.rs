// coopflow/src/domain/evidence.rs

//! Immutable proof artifacts attached to an order.
//!
//! Evidence records are created once on upload and never deleted; the only
//! mutation the ledger allows is flipping `is_verified`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::party::ActorRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
  PaymentScreenshot,
  DeliveryPhoto,
  BuyerConfirmationPhoto,
  CashReceipt,
  DeliveryGeotag,
  DisputeAttachment,
}

impl EvidenceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EvidenceKind::PaymentScreenshot => "payment_screenshot",
      EvidenceKind::DeliveryPhoto => "delivery_photo",
      EvidenceKind::BuyerConfirmationPhoto => "buyer_confirmation_photo",
      EvidenceKind::CashReceipt => "cash_receipt",
      EvidenceKind::DeliveryGeotag => "delivery_geotag",
      EvidenceKind::DisputeAttachment => "dispute_attachment",
    }
  }
}

impl std::fmt::Display for EvidenceKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
  pub latitude: f64,
  pub longitude: f64,
}

/// Raw media handed to an engine for upload. The media storage collaborator
/// turns the bytes into a stable URI; the core only keeps the URI.
#[derive(Debug, Clone)]
pub struct MediaUpload {
  pub file_name: String,
  pub bytes: Vec<u8>,
  pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  Image,
  Video,
}

impl MediaUpload {
  pub fn image(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
    MediaUpload {
      file_name: file_name.into(),
      bytes,
      kind: MediaKind::Image,
    }
  }

  pub fn video(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
    MediaUpload {
      file_name: file_name.into(),
      bytes,
      kind: MediaKind::Video,
    }
  }
}

/// An immutable artifact record. At most one of `image_uri` / `video_uri`
/// is populated.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
  pub evidence_id: Uuid,
  pub order_id: Uuid,
  pub kind: EvidenceKind,
  pub uploaded_by: Uuid,
  pub uploaded_by_role: ActorRole,
  pub image_uri: Option<String>,
  pub video_uri: Option<String>,
  pub text_content: Option<String>,
  pub geo: Option<GeoPoint>,
  pub is_verified: bool,
  pub created_at: DateTime<Utc>,
}

impl Evidence {
  pub fn new(order_id: Uuid, kind: EvidenceKind, uploaded_by: Uuid, uploaded_by_role: ActorRole) -> Self {
    Evidence {
      evidence_id: Uuid::new_v4(),
      order_id,
      kind,
      uploaded_by,
      uploaded_by_role,
      image_uri: None,
      video_uri: None,
      text_content: None,
      geo: None,
      is_verified: false,
      created_at: Utc::now(),
    }
  }

  pub fn with_media(mut self, media_kind: MediaKind, uri: String) -> Self {
    match media_kind {
      MediaKind::Image => self.image_uri = Some(uri),
      MediaKind::Video => self.video_uri = Some(uri),
    }
    self
  }

  pub fn with_text(mut self, text: impl Into<String>) -> Self {
    self.text_content = Some(text.into());
    self
  }

  pub fn with_geo(mut self, geo: Option<GeoPoint>) -> Self {
    self.geo = geo;
    self
  }
}
