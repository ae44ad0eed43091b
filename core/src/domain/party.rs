// coopflow/src/domain/party.rs

//! Actors and roles.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{CoopflowError, CoopflowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
  Buyer,
  Seller,
  Moderator,
}

impl ActorRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      ActorRole::Buyer => "buyer",
      ActorRole::Seller => "seller",
      ActorRole::Moderator => "moderator",
    }
  }
}

impl std::fmt::Display for ActorRole {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The authenticated caller of an operation.
///
/// Trust boundary: the identity collaborator authenticates the caller and
/// supplies both fields; the core enforces per-operation authority (only a
/// seller sends quotes, only a moderator resolves disputes) but does not
/// re-derive the role itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actor {
  pub id: Uuid,
  pub role: ActorRole,
}

impl Actor {
  pub fn buyer(id: Uuid) -> Self {
    Actor { id, role: ActorRole::Buyer }
  }

  pub fn seller(id: Uuid) -> Self {
    Actor { id, role: ActorRole::Seller }
  }

  pub fn moderator(id: Uuid) -> Self {
    Actor { id, role: ActorRole::Moderator }
  }

  /// Rejects callers whose role lacks authority for `operation`.
  pub fn require_role(&self, role: ActorRole, operation: &str) -> CoopflowResult<()> {
    if self.role == role {
      Ok(())
    } else {
      Err(CoopflowError::illegal_state(
        operation,
        format!("requires role '{}', caller is '{}'", role, self.role),
      ))
    }
  }

  /// Rejects callers who are neither the order's buyer nor its seller.
  pub fn require_party(&self, buyer_id: Uuid, seller_id: Uuid, operation: &str) -> CoopflowResult<()> {
    let is_party = match self.role {
      ActorRole::Buyer => self.id == buyer_id,
      ActorRole::Seller => self.id == seller_id,
      ActorRole::Moderator => false,
    };
    if is_party {
      Ok(())
    } else {
      Err(CoopflowError::illegal_state(
        operation,
        format!("actor {} ({}) is not a party to this order", self.id, self.role),
      ))
    }
  }
}
