use crate::*;
use hkdf::Hkdf;
use sha2::Sha256;

const SHARE_INFO: &[u8] = b"quantegrity key agreement share";

/// Deterministic two-party key agreement
///
/// Given two equal-length inputs, returns one share per party. When both inputs
/// are identical both shares must be identical; the key chain checks this and
/// treats a mismatch as a consistency violation.
pub trait KeyAgreement: Send {
    fn derive(&mut self, a: &BitString, b: &BitString) -> Result<(BitString, BitString), Error>;
}

/// HKDF-SHA256 key agreement bound to an election context
///
/// Each share is expanded from its own input with the context as salt, so the
/// output depends only on (context, input) and is reproducible for the life
/// of the election.
#[derive(Clone, Debug)]
pub struct HkdfKeyAgreement {
    context: Vec<u8>,
}

impl HkdfKeyAgreement {
    pub fn new(context: &[u8]) -> Self {
        HkdfKeyAgreement {
            context: context.to_vec(),
        }
    }

    fn share(&self, input: &BitString) -> Result<BitString, Error> {
        let ikm = input.to_string();
        let hk = Hkdf::<Sha256>::new(Some(&self.context), ikm.as_bytes());
        let mut okm = vec![0u8; (input.len() + 7) / 8];
        hk.expand(SHARE_INFO, &mut okm).map_err(|_| {
            ValidationError::InvalidConfig(format!("{}-bit keys are too long", input.len()))
        })?;
        Ok(BitString::from_bytes(&okm, input.len())?)
    }
}

impl KeyAgreement for HkdfKeyAgreement {
    fn derive(&mut self, a: &BitString, b: &BitString) -> Result<(BitString, BitString), Error> {
        if a.len() != b.len() {
            return Err(ValidationError::LengthMismatch(a.len(), b.len()).into());
        }
        if a.is_empty() {
            return Err(ValidationError::EmptyBitString.into());
        }
        Ok((self.share(a)?, self.share(b)?))
    }
}
