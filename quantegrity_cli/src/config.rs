use quantegrity::ElectionConfig;
use std::env;
use std::str::FromStr;

/// Settings read from the environment
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub key_bits: Option<usize>,
    pub code_bits: Option<usize>,
    pub log_capacity: Option<usize>,
    pub seed: Option<u64>,
}

impl CliConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(CliConfig {
            key_bits: var("QUANTEGRITY_KEY_BITS")?,
            code_bits: var("QUANTEGRITY_CODE_BITS")?,
            log_capacity: var("QUANTEGRITY_LOG_CAPACITY")?,
            seed: var("QUANTEGRITY_SEED")?,
        })
    }

    /// Defaults with any overrides applied. OTPs are as wide as keys.
    pub fn election_config(&self) -> Result<ElectionConfig, String> {
        let mut config = ElectionConfig::default();
        if let Some(key_bits) = self.key_bits {
            config.key_bits = key_bits;
            config.otp_bits = key_bits;
        }
        if let Some(code_bits) = self.code_bits {
            config.code_bits = code_bits;
        }
        if let Some(log_capacity) = self.log_capacity {
            config.log_capacity = log_capacity;
        }
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

fn var<T: FromStr>(name: &str) -> Result<Option<T>, String> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("invalid value for {}: {:?}", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(format!("invalid value for {}: {}", name, e)),
    }
}
