// coopflow/src/collab.rs

//! Seams for the excluded collaborators: media storage and geolocation.
//!
//! Both are best-effort relative to order state: a failed upload aborts
//! only its own sub-step (retriable, state untouched) and a failed
//! geolocation fetch degrades to "no location recorded".

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::domain::GeoPoint;

/// Accepts raw media bytes and returns a stable URI. The core only stores
/// the URI plus a verification flag.
#[async_trait]
pub trait MediaStorage: Send + Sync {
  async fn store(&self, order_id: Uuid, file_name: &str, bytes: &[u8]) -> anyhow::Result<String>;
}

/// Supplies the device location for posteriori dispute evidence.
#[async_trait]
pub trait GeoLocator: Send + Sync {
  async fn locate(&self) -> anyhow::Result<GeoPoint>;
}

/// In-process media store handing out `mem://` URIs. The reference storage
/// collaborator for demos and tests.
#[derive(Default)]
pub struct MemoryMediaStorage {
  objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryMediaStorage {
  pub fn new() -> Self {
    MemoryMediaStorage::default()
  }

  pub fn object_count(&self) -> usize {
    self.objects.lock().len()
  }
}

#[async_trait]
impl MediaStorage for MemoryMediaStorage {
  async fn store(&self, order_id: Uuid, file_name: &str, bytes: &[u8]) -> anyhow::Result<String> {
    let mut objects = self.objects.lock();
    // Suffix duplicates so resubmissions never overwrite earlier proof.
    let mut uri = format!("mem://{}/{}", order_id, file_name);
    let mut n = 1;
    while objects.contains_key(&uri) {
      uri = format!("mem://{}/{}.{}", order_id, file_name, n);
      n += 1;
    }
    objects.insert(uri.clone(), bytes.to_vec());
    debug!(%order_id, %uri, size = bytes.len(), "stored media object");
    Ok(uri)
  }
}

/// Always reports the same location. Useful where a real device locator
/// is absent.
pub struct FixedLocator(pub GeoPoint);

#[async_trait]
impl GeoLocator for FixedLocator {
  async fn locate(&self) -> anyhow::Result<GeoPoint> {
    Ok(self.0)
  }
}

/// Location permission denied or no provider available.
pub struct NoLocator;

#[async_trait]
impl GeoLocator for NoLocator {
  async fn locate(&self) -> anyhow::Result<GeoPoint> {
    Err(anyhow::anyhow!("no location provider available"))
  }
}
