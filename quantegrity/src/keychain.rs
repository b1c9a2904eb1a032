use crate::*;
use sha2::{Digest, Sha256};

/// Hex characters kept from the identity digest
const VOTER_ID_LEN: usize = 16;

/// Output of a successful registration
///
/// `q_k1` is handed back once so the caller can show it to the voter. It is
/// never stored: the voter record keeps only `encrypted_q_k1`.
#[derive(Debug, Clone)]
pub struct Registration {
    pub voter_id: String,
    pub q_k1: BitString,
    pub q_k2: BitString,
    pub biometric: BitString,
    pub encrypted_q_k1: BitString,
}

/// Derives and checks the voter credential hierarchy:
/// Q_K1 / Q_K2 / biometric → encrypted Q_K1 → AQ_K1 → VQ_K1.
pub struct KeyChain {
    agreement: Box<dyn KeyAgreement>,
    key_bits: usize,
}

impl KeyChain {
    pub fn new(agreement: Box<dyn KeyAgreement>, key_bits: usize) -> Self {
        KeyChain {
            agreement,
            key_bits,
        }
    }

    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Draw fresh Q_K1, Q_K2 and biometric material and bind them to an identity.
    pub fn register(
        &mut self,
        random: &mut dyn RandomSource,
        name: &str,
        national_id: &str,
        log: &mut OperationLog,
    ) -> Result<Registration, Error> {
        check_identity(name, national_id)?;

        let q_k1 = random.next_bits(self.key_bits)?;
        let q_k2 = random.next_bits(self.key_bits)?;
        let biometric = random.next_bits(self.key_bits)?;
        log.record(
            "draw_registration_keys",
            None,
            format!("3 x {} bits", self.key_bits),
        );

        self.register_with_keys(name, national_id, q_k1, q_k2, biometric, log)
    }

    /// Register with caller-supplied key material.
    pub fn register_with_keys(
        &mut self,
        name: &str,
        national_id: &str,
        q_k1: BitString,
        q_k2: BitString,
        biometric: BitString,
        log: &mut OperationLog,
    ) -> Result<Registration, Error> {
        check_identity(name, national_id)?;
        q_k1.expect_len(self.key_bits)?;
        q_k2.expect_len(self.key_bits)?;
        biometric.expect_len(self.key_bits)?;

        let encrypted_q_k1 = encrypt(&q_k1, &biometric)?;
        let voter_id = derive_voter_id(name, national_id, &biometric)?;
        log.record("encrypt_q_k1", Some(&voter_id), "Q_K1 xor biometric");

        Ok(Registration {
            voter_id,
            q_k1,
            q_k2,
            biometric,
            encrypted_q_k1,
        })
    }

    /// Recover Q_K1 from its biometric encryption.
    ///
    /// The presented biometric must equal the registered one exactly.
    pub fn recover_primary_key(
        &self,
        encrypted_q_k1: &BitString,
        registered_biometric: &BitString,
        biometric_input: &BitString,
    ) -> Result<BitString, Error> {
        biometric_input.expect_len(self.key_bits)?;
        encrypted_q_k1.expect_len(self.key_bits)?;
        if biometric_input != registered_biometric {
            return Err(AuthorizationError::BiometricMismatch.into());
        }
        Ok(decrypt(encrypted_q_k1, biometric_input)?)
    }

    /// Biometric stage: recover Q_K1 and derive AQ_K1 = KA(Q_K1, Q_K1).
    pub fn authenticate(
        &mut self,
        encrypted_q_k1: &BitString,
        registered_biometric: &BitString,
        biometric_input: &BitString,
        log: &mut OperationLog,
    ) -> Result<BitString, Error> {
        let q_k1 = self.recover_primary_key(encrypted_q_k1, registered_biometric, biometric_input)?;
        log.record("decrypt_q_k1", None, format!("{} bits", q_k1.len()));
        self.agree(&q_k1, "authentication", log)
    }

    /// Voting stage: VQ_K1 = KA(AQ_K1, AQ_K1).
    pub fn derive_voting_key(
        &mut self,
        aq_k1: &BitString,
        log: &mut OperationLog,
    ) -> Result<BitString, Error> {
        aq_k1.expect_len(self.key_bits)?;
        self.agree(aq_k1, "voting session", log)
    }

    fn agree(
        &mut self,
        key: &BitString,
        stage: &str,
        log: &mut OperationLog,
    ) -> Result<BitString, Error> {
        let (share_a, share_b) = self.agreement.derive(key, key)?;
        if share_a != share_b {
            let violation = ConsistencyViolation::KeyAgreementMismatch(stage.to_owned()).logged();
            log.record("key_agreement", None, format!("{}: shares differ", stage));
            return Err(violation.into());
        }
        if share_a.len() != key.len() {
            return Err(ValidationError::WrongLength {
                expected: key.len(),
                actual: share_a.len(),
            }
            .into());
        }
        log.record(
            "key_agreement",
            None,
            format!("{}: {} bits", stage, share_a.len()),
        );
        Ok(share_a)
    }
}

/// Voter id: leading hex of SHA-256 over the CBOR-encoded identity and biometric.
pub fn derive_voter_id(
    name: &str,
    national_id: &str,
    biometric: &BitString,
) -> Result<String, Error> {
    let encoded = serde_cbor::to_vec(&(name, national_id, biometric))?;
    let digest = Sha256::digest(&encoded);
    let mut id = hex::encode(digest);
    id.truncate(VOTER_ID_LEN);
    Ok(id)
}

fn check_identity(name: &str, national_id: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() || national_id.trim().is_empty() {
        return Err(ValidationError::EmptyIdentity);
    }
    Ok(())
}
