// coopflow/src/otp.rs

//! Delivery OTP generation and verification.
//!
//! Codes are 6 random digits. Only a salted argon2 hash is persisted; the
//! cleartext is returned once to the buyer at generation time and entered
//! by the seller at handover.

use argon2::{
  password_hash::{rand_core::OsRng as SaltRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
  Argon2,
};
use rand_core::{OsRng, RngCore};
use tracing::debug;

use crate::error::{CoopflowError, CoopflowResult};

/// Failed verification attempts allowed per issued code. Exceeding the
/// budget requires generating a fresh code.
pub const MAX_OTP_ATTEMPTS: u32 = 5;

/// Produces a fresh 6-digit code from OS randomness.
pub fn generate_code() -> String {
  let n = OsRng.next_u32() % 1_000_000;
  format!("{:06}", n)
}

/// Hashes a code for persistence.
pub fn hash_code(code: &str) -> CoopflowResult<String> {
  let salt = SaltString::generate(&mut SaltRng);
  let hasher = Argon2::default();
  match hasher.hash_password(code.as_bytes(), &salt) {
    Ok(hash) => {
      debug!("delivery code hashed");
      Ok(hash.to_string())
    }
    Err(e) => Err(CoopflowError::upstream("otp_hash", anyhow::anyhow!(e))),
  }
}

/// Checks a candidate code against the stored hash. `Ok(false)` means a
/// plain mismatch; errors mean the stored hash is unreadable or the
/// verifier itself failed.
pub fn verify_code(stored_hash: &str, candidate: &str) -> CoopflowResult<bool> {
  let parsed = PasswordHash::new(stored_hash)
    .map_err(|e| CoopflowError::upstream("otp_verify", anyhow::anyhow!(e)))?;
  match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
    Ok(()) => Ok(true),
    Err(argon2::password_hash::Error::Password) => Ok(false),
    Err(e) => Err(CoopflowError::upstream("otp_verify", anyhow::anyhow!(e))),
  }
}
