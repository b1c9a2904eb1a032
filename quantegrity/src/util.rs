use crate::*;
use ed25519_dalek::PublicKey;
use ed25519_dalek::SecretKey;
use std::time::{SystemTime, UNIX_EPOCH};

/// Derive an ed25519 signing key from the given random source.
pub fn generate_keypair(random: &mut dyn RandomSource) -> Result<(SecretKey, PublicKey), Error> {
    let seed = random.next_bits(8 * ed25519_dalek::SECRET_KEY_LENGTH)?;
    let secret = SecretKey::from_bytes(&seed.to_bytes())
        .map_err(|e| ValidationError::InvalidSigningKey(e.to_string()))?;
    let public = PublicKey::from(&secret);
    Ok((secret, public))
}

/// Seconds since the unix epoch
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
