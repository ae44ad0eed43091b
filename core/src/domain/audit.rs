// coopflow/src/domain/audit.rs

//! Append-only state-transition history, used for timeline reconstruction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::order::OrderStatus;

/// One recorded order-status transition. Never mutated after append.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
  pub audit_id: Uuid,
  pub order_id: Uuid,
  pub from_state: OrderStatus,
  pub to_state: OrderStatus,
  pub actor_id: Uuid,
  pub at: DateTime<Utc>,
  pub note: Option<String>,
}

impl AuditLogEntry {
  pub fn new(
    order_id: Uuid,
    from_state: OrderStatus,
    to_state: OrderStatus,
    actor_id: Uuid,
    note: Option<String>,
  ) -> Self {
    AuditLogEntry {
      audit_id: Uuid::new_v4(),
      order_id,
      from_state,
      to_state,
      actor_id,
      at: Utc::now(),
      note,
    }
  }
}
