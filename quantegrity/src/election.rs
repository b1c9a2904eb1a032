use crate::*;
use uuid::Uuid;

/// Election-wide parameters
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionConfig {
    /// Width of Q_K1, Q_K2, the biometric signature, AQ_K1, VQ_K1 and encoded votes
    pub key_bits: usize,

    /// Width of each confirmation code
    pub code_bits: usize,

    /// Width of device and authentication one-time passwords.
    /// OTPs are encrypted with Q_K2 / AQ_K1 so this must equal `key_bits`.
    pub otp_bits: usize,

    /// Capacity of the operation log ring buffer
    pub log_capacity: usize,

    /// Draws allowed per confirmation code before giving up on a collision-free code
    pub code_draw_attempts: usize,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        ElectionConfig {
            key_bits: 16,
            code_bits: 16,
            otp_bits: 16,
            log_capacity: DEFAULT_LOG_CAPACITY,
            code_draw_attempts: 64,
        }
    }
}

impl ElectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key_bits < 2 || self.key_bits > 64 {
            return Err(ValidationError::InvalidConfig(format!(
                "key_bits must be between 2 and 64, got {}",
                self.key_bits
            )));
        }
        if self.code_bits < 4 || self.code_bits > 64 {
            return Err(ValidationError::InvalidConfig(format!(
                "code_bits must be between 4 and 64, got {}",
                self.code_bits
            )));
        }
        if self.otp_bits != self.key_bits {
            return Err(ValidationError::InvalidConfig(format!(
                "otp_bits ({}) must equal key_bits ({})",
                self.otp_bits, self.key_bits
            )));
        }
        if self.code_draw_attempts == 0 {
            return Err(ValidationError::InvalidConfig(
                "code_draw_attempts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// An election: the candidate list and the size of its ballot pool
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Election {
    pub id: Uuid,
    pub name: String,
    pub candidates: Vec<String>,
    pub pool_size: usize,
    pub config: ElectionConfig,
    pub created_at: u64,
}

impl Election {
    pub fn new(
        name: &str,
        candidates: Vec<String>,
        pool_size: usize,
        config: ElectionConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        validate_candidates(&candidates)?;
        if pool_size == 0 {
            return Err(ValidationError::EmptyPool);
        }
        // Candidates are encoded by 1-based index
        if config.key_bits < 64 && candidates.len() as u64 >= 1u64 << config.key_bits {
            return Err(ValidationError::ValueOverflow {
                value: candidates.len() as u64,
                bits: config.key_bits,
            });
        }

        Ok(Election {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            candidates,
            pool_size,
            config,
            created_at: unix_timestamp(),
        })
    }

    pub fn candidate_index(&self, candidate: &str) -> Option<usize> {
        self.candidates.iter().position(|c| c == candidate)
    }

    /// Plaintext vote: the candidate's 1-based index, `key_bits` wide
    pub fn encode_candidate(&self, candidate: &str) -> Result<BitString, ValidationError> {
        let index = self
            .candidate_index(candidate)
            .ok_or_else(|| ValidationError::UnknownCandidate(candidate.to_owned()))?;
        BitString::from_u64(index as u64 + 1, self.config.key_bits)
    }

    pub fn decode_candidate(&self, plaintext: &BitString) -> Result<String, ValidationError> {
        plaintext.expect_len(self.config.key_bits)?;
        let value = plaintext.to_u64().unwrap_or(0) as usize;
        if value == 0 || value > self.candidates.len() {
            return Err(ValidationError::UnknownCandidate(plaintext.to_string()));
        }
        Ok(self.candidates[value - 1].clone())
    }

    /// What a voter submits when casting: `encode(candidate) xor VQ_K1`
    pub fn encrypt_choice(
        &self,
        candidate: &str,
        vq_k1: &BitString,
    ) -> Result<BitString, ValidationError> {
        encrypt(&self.encode_candidate(candidate)?, vq_k1)
    }

    pub fn decrypt_choice(
        &self,
        encrypted_choice: &BitString,
        vq_k1: &BitString,
    ) -> Result<String, ValidationError> {
        self.decode_candidate(&decrypt(encrypted_choice, vq_k1)?)
    }
}

/// Candidate lists must be non-empty with distinct, non-empty names
pub fn validate_candidates(candidates: &[String]) -> Result<(), ValidationError> {
    if candidates.is_empty() {
        return Err(ValidationError::NoCandidates);
    }
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.trim().is_empty() {
            return Err(ValidationError::EmptyCandidateName);
        }
        if candidates[..i].contains(candidate) {
            return Err(ValidationError::DuplicateCandidate(candidate.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn create_new_election() {
        let election =
            Election::new("City", candidates(&["Alice", "Bob"]), 3, ElectionConfig::default())
                .unwrap();
        assert_eq!(election.candidate_index("Bob"), Some(1));

        assert_eq!(
            Election::new("x", vec![], 3, ElectionConfig::default()).unwrap_err(),
            ValidationError::NoCandidates
        );
        assert_eq!(
            Election::new("x", candidates(&["A", "A"]), 3, ElectionConfig::default()).unwrap_err(),
            ValidationError::DuplicateCandidate("A".to_owned())
        );
        assert_eq!(
            Election::new("x", candidates(&["A", ""]), 3, ElectionConfig::default()).unwrap_err(),
            ValidationError::EmptyCandidateName
        );
        assert_eq!(
            Election::new("x", candidates(&["A"]), 0, ElectionConfig::default()).unwrap_err(),
            ValidationError::EmptyPool
        );
    }

    #[test]
    fn config_validation() {
        assert!(ElectionConfig::default().validate().is_ok());
        let mut config = ElectionConfig::default();
        config.otp_bits = 8;
        assert!(config.validate().is_err());
        let mut config = ElectionConfig::default();
        config.key_bits = 65;
        assert!(config.validate().is_err());
    }

    #[test]
    fn choice_encoding() {
        let election =
            Election::new("City", candidates(&["Alice", "Bob", "Carl"]), 1, ElectionConfig::default())
                .unwrap();
        let plain = election.encode_candidate("Carl").unwrap();
        assert_eq!(plain.to_string(), "0000000000000011");
        assert_eq!(election.decode_candidate(&plain).unwrap(), "Carl");
        assert!(election.decode_candidate(&BitString::zeros(16)).is_err());
        assert!(election.encode_candidate("Mallory").is_err());

        let vq: BitString = "1100110011001100".parse().unwrap();
        let cipher = election.encrypt_choice("Bob", &vq).unwrap();
        assert_ne!(cipher, election.encode_candidate("Bob").unwrap());
        assert_eq!(election.decrypt_choice(&cipher, &vq).unwrap(), "Bob");
    }
}
