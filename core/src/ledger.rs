// coopflow/src/ledger.rs

//! In-memory transactional store for order records.
//!
//! One record per order holds the aggregate and everything it owns: quote
//! history, payments, evidence, disputes and the audit trail. Mutations go
//! through [`Ledger::transact`] (or its compare-and-swap variant
//! [`Ledger::transact_at`]), which applies the closure to a copy of the
//! record and only swaps it in on success. A status transition and its
//! audit entry therefore commit atomically or not at all, and writers to
//! the same order are serialized.
//!
//! Lock guards are `parking_lot` and are never held across an `.await`;
//! engines snapshot, await their collaborators, then commit with
//! `transact_at` so interleaved writes surface as `ConcurrencyConflict`.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::domain::{AuditLogEntry, Dispute, Evidence, EvidenceKind, Order, OrderStatus, Payment, Quote};
use crate::error::{CoopflowError, CoopflowResult};

/// The currently issued delivery OTP for an order: the argon2 hash of the
/// code plus a failed-attempt budget. Replaced wholesale on regeneration.
#[derive(Debug, Clone)]
pub struct OtpIssue {
  pub code_hash: String,
  pub issued_at: DateTime<Utc>,
  pub failed_attempts: u32,
}

/// Everything the ledger holds for one order. Composition: quotes,
/// payments, evidence and audit entries live and die with the order
/// (and orders are never deleted).
#[derive(Debug, Clone)]
pub struct OrderRecord {
  pub order: Order,
  pub quotes: Vec<Quote>,
  pub payments: Vec<Payment>,
  pub evidence: Vec<Evidence>,
  pub disputes: Vec<Dispute>,
  pub audit: Vec<AuditLogEntry>,
  pub otp: Option<OtpIssue>,
}

impl OrderRecord {
  pub fn new(order: Order) -> Self {
    OrderRecord {
      order,
      quotes: Vec::new(),
      payments: Vec::new(),
      evidence: Vec::new(),
      disputes: Vec::new(),
      audit: Vec::new(),
      otp: None,
    }
  }

  /// Moves the order to `to` and appends the matching audit entry.
  /// The legal-transition table is enforced here, centrally.
  pub fn transition(&mut self, to: OrderStatus, actor_id: Uuid, note: Option<String>) -> CoopflowResult<()> {
    let from = self.order.status;
    if !from.can_transition_to(to) {
      return Err(CoopflowError::illegal_state(
        "order_transition",
        format!("order is '{}', cannot move to '{}'", from, to),
      ));
    }
    let entry = AuditLogEntry::new(self.order.order_id, from, to, actor_id, note);
    self.order.status = to;
    self.order.updated_at = entry.at;
    self.audit.push(entry);
    trace!(order_id = %self.order.order_id, from = %from, to = %to, "order transition recorded");
    Ok(())
  }

  /// The one quote currently under negotiation or agreement: the newest
  /// record that has not been superseded by a counter-offer.
  pub fn active_quote(&self) -> Option<&Quote> {
    self.quotes.iter().rev().find(|q| q.superseded_by.is_none())
  }

  pub fn quote(&self, quote_id: Uuid) -> CoopflowResult<&Quote> {
    self
      .quotes
      .iter()
      .find(|q| q.quote_id == quote_id)
      .ok_or(CoopflowError::NotFound { entity: "quote", id: quote_id })
  }

  pub fn quote_mut(&mut self, quote_id: Uuid) -> CoopflowResult<&mut Quote> {
    self
      .quotes
      .iter_mut()
      .find(|q| q.quote_id == quote_id)
      .ok_or(CoopflowError::NotFound { entity: "quote", id: quote_id })
  }

  pub fn payment(&self, payment_id: Uuid) -> CoopflowResult<&Payment> {
    self
      .payments
      .iter()
      .find(|p| p.payment_id == payment_id)
      .ok_or(CoopflowError::NotFound { entity: "payment", id: payment_id })
  }

  pub fn payment_mut(&mut self, payment_id: Uuid) -> CoopflowResult<&mut Payment> {
    self
      .payments
      .iter_mut()
      .find(|p| p.payment_id == payment_id)
      .ok_or(CoopflowError::NotFound { entity: "payment", id: payment_id })
  }

  pub fn dispute(&self, dispute_id: Uuid) -> CoopflowResult<&Dispute> {
    self
      .disputes
      .iter()
      .find(|d| d.dispute_id == dispute_id)
      .ok_or(CoopflowError::NotFound { entity: "dispute", id: dispute_id })
  }

  pub fn dispute_mut(&mut self, dispute_id: Uuid) -> CoopflowResult<&mut Dispute> {
    self
      .disputes
      .iter_mut()
      .find(|d| d.dispute_id == dispute_id)
      .ok_or(CoopflowError::NotFound { entity: "dispute", id: dispute_id })
  }

  pub fn open_dispute_count(&self) -> usize {
    self.disputes.iter().filter(|d| d.status.is_open()).count()
  }
}

struct Slot {
  record: OrderRecord,
  revision: u64,
}

/// The in-memory ledger. Persistence backends mirror this contract:
/// per-order serializable transactions, append-only evidence and audit
/// collections, no delete anywhere.
#[derive(Default)]
pub struct Ledger {
  slots: RwLock<HashMap<Uuid, Slot>>,
  // Child-id lookups so engine operations can be addressed by quote /
  // payment / dispute id alone. Refreshed on every commit.
  quote_index: RwLock<HashMap<Uuid, Uuid>>,
  payment_index: RwLock<HashMap<Uuid, Uuid>>,
  dispute_index: RwLock<HashMap<Uuid, Uuid>>,
}

impl Ledger {
  pub fn new() -> Self {
    Ledger::default()
  }

  /// Registers a brand-new order record. Fails if the order id is taken.
  pub fn open(&self, record: OrderRecord) -> CoopflowResult<()> {
    let order_id = record.order.order_id;
    {
      let mut slots = self.slots.write();
      if slots.contains_key(&order_id) {
        return Err(CoopflowError::validation(format!("order {} already exists", order_id)));
      }
      self.index_children(&record);
      slots.insert(order_id, Slot { record, revision: 0 });
    }
    debug!(%order_id, "order record opened");
    Ok(())
  }

  /// Runs `f` against the record under the write lock. The closure sees a
  /// working copy; on `Ok` the copy replaces the record and the revision
  /// advances, on `Err` the record is untouched.
  pub fn transact<T>(
    &self,
    order_id: Uuid,
    f: impl FnOnce(&mut OrderRecord) -> CoopflowResult<T>,
  ) -> CoopflowResult<T> {
    self.commit(order_id, None, f)
  }

  /// Compare-and-swap variant: fails with `ConcurrencyConflict` when the
  /// record's revision no longer matches `expected`. Used by operations
  /// whose read-modify-write spans an `.await`.
  pub fn transact_at<T>(
    &self,
    order_id: Uuid,
    expected: u64,
    f: impl FnOnce(&mut OrderRecord) -> CoopflowResult<T>,
  ) -> CoopflowResult<T> {
    self.commit(order_id, Some(expected), f)
  }

  fn commit<T>(
    &self,
    order_id: Uuid,
    expected: Option<u64>,
    f: impl FnOnce(&mut OrderRecord) -> CoopflowResult<T>,
  ) -> CoopflowResult<T> {
    let mut slots = self.slots.write();
    let slot = slots
      .get_mut(&order_id)
      .ok_or(CoopflowError::NotFound { entity: "order", id: order_id })?;
    if let Some(expected) = expected {
      if slot.revision != expected {
        return Err(CoopflowError::ConcurrencyConflict {
          order_id,
          expected,
          actual: slot.revision,
        });
      }
    }
    let mut draft = slot.record.clone();
    let out = f(&mut draft)?;
    slot.record = draft;
    slot.revision += 1;
    self.index_children(&slot.record);
    trace!(%order_id, revision = slot.revision, "ledger commit");
    Ok(out)
  }

  // Called while the slots write lock is held; the index locks are always
  // acquired after the slots lock, never the other way around.
  fn index_children(&self, record: &OrderRecord) {
    let order_id = record.order.order_id;
    {
      let mut idx = self.quote_index.write();
      for q in &record.quotes {
        idx.insert(q.quote_id, order_id);
      }
    }
    {
      let mut idx = self.payment_index.write();
      for p in &record.payments {
        idx.insert(p.payment_id, order_id);
      }
    }
    {
      let mut idx = self.dispute_index.write();
      for d in &record.disputes {
        idx.insert(d.dispute_id, order_id);
      }
    }
  }

  pub fn revision(&self, order_id: Uuid) -> CoopflowResult<u64> {
    let slots = self.slots.read();
    slots
      .get(&order_id)
      .map(|s| s.revision)
      .ok_or(CoopflowError::NotFound { entity: "order", id: order_id })
  }

  /// A deep copy of the whole record, plus its revision for later
  /// `transact_at` commits.
  pub fn snapshot(&self, order_id: Uuid) -> CoopflowResult<(OrderRecord, u64)> {
    let slots = self.slots.read();
    slots
      .get(&order_id)
      .map(|s| (s.record.clone(), s.revision))
      .ok_or(CoopflowError::NotFound { entity: "order", id: order_id })
  }

  pub fn order(&self, order_id: Uuid) -> CoopflowResult<Order> {
    Ok(self.snapshot(order_id)?.0.order)
  }

  pub fn active_quote(&self, order_id: Uuid) -> CoopflowResult<Option<Quote>> {
    Ok(self.snapshot(order_id)?.0.active_quote().cloned())
  }

  pub fn payments(&self, order_id: Uuid) -> CoopflowResult<Vec<Payment>> {
    Ok(self.snapshot(order_id)?.0.payments)
  }

  pub fn disputes(&self, order_id: Uuid) -> CoopflowResult<Vec<Dispute>> {
    Ok(self.snapshot(order_id)?.0.disputes)
  }

  /// All evidence for the order, grouped by kind, creation order preserved
  /// within each group.
  pub fn evidence_by_kind(&self, order_id: Uuid) -> CoopflowResult<BTreeMap<EvidenceKind, Vec<Evidence>>> {
    let (record, _) = self.snapshot(order_id)?;
    let mut grouped: BTreeMap<EvidenceKind, Vec<Evidence>> = BTreeMap::new();
    for e in record.evidence {
      grouped.entry(e.kind).or_default().push(e);
    }
    Ok(grouped)
  }

  /// The full audit trail, ascending by timestamp.
  pub fn audit_trail(&self, order_id: Uuid) -> CoopflowResult<Vec<AuditLogEntry>> {
    let (record, _) = self.snapshot(order_id)?;
    let mut trail = record.audit;
    trail.sort_by_key(|e| e.at);
    Ok(trail)
  }

  pub fn order_ids(&self) -> Vec<Uuid> {
    self.slots.read().keys().copied().collect()
  }

  pub fn order_id_for_quote(&self, quote_id: Uuid) -> CoopflowResult<Uuid> {
    self
      .quote_index
      .read()
      .get(&quote_id)
      .copied()
      .ok_or(CoopflowError::NotFound { entity: "quote", id: quote_id })
  }

  pub fn order_id_for_payment(&self, payment_id: Uuid) -> CoopflowResult<Uuid> {
    self
      .payment_index
      .read()
      .get(&payment_id)
      .copied()
      .ok_or(CoopflowError::NotFound { entity: "payment", id: payment_id })
  }

  pub fn order_id_for_dispute(&self, dispute_id: Uuid) -> CoopflowResult<Uuid> {
    self
      .dispute_index
      .read()
      .get(&dispute_id)
      .copied()
      .ok_or(CoopflowError::NotFound { entity: "dispute", id: dispute_id })
  }

  /// Whether any dispute on the order is still open. Used when deciding
  /// the order outcome of a resolution.
  pub fn has_open_disputes(&self, order_id: Uuid) -> CoopflowResult<bool> {
    Ok(self.snapshot(order_id)?.0.open_dispute_count() > 0)
  }
}
