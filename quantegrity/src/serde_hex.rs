use ed25519_dalek::PublicKey;
use ed25519_dalek::Signature;
use std::borrow::Cow;
use std::convert::TryFrom;

pub use hex_buffer_serde::Hex;

// Single-purpose types for use in `#[serde(with)]`

/// ed25519 public key as lowercase hex
pub enum EdPublicKeyHex {}

impl Hex<PublicKey> for EdPublicKeyHex {
    type Error = String;

    fn create_bytes(public_key: &PublicKey) -> Cow<[u8]> {
        public_key.as_ref().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<PublicKey, String> {
        PublicKey::from_bytes(bytes).map_err(|e| format!("{}", e))
    }
}

/// ed25519 signature as lowercase hex
pub enum EdSignatureHex {}

impl Hex<Signature> for EdSignatureHex {
    type Error = String;

    fn create_bytes(sig: &Signature) -> Cow<[u8]> {
        Cow::from(sig.to_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Signature, String> {
        Signature::try_from(bytes).map_err(|e| format!("{}", e))
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use ed25519_dalek::{ExpandedSecretKey, PublicKey, Signature};

    #[derive(Serialize, Deserialize)]
    struct Signed {
        #[serde(with = "EdPublicKeyHex")]
        key: PublicKey,

        #[serde(with = "EdSignatureHex")]
        sig: Signature,
    }

    #[test]
    fn keys_and_signatures_as_hex() {
        let (secret, public) = generate_keypair(&mut SeededRandomSource::new(9)).unwrap();
        let sig = ExpandedSecretKey::from(&secret).sign(b"ballot", &public);
        let json = serde_json::to_string(&Signed { key: public, sig }).unwrap();
        assert!(json.contains(&hex::encode(public.as_bytes())));
        assert!(json.contains(&hex::encode(&sig.to_bytes()[..])));

        let back: Signed = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key, public);
        assert_eq!(back.sig, sig);
        assert!(back.key.verify_strict(b"ballot", &back.sig).is_ok());

        let bad = json.replace(&hex::encode(public.as_bytes()), "zz");
        assert!(serde_json::from_str::<Signed>(&bad).is_err());
        let short = json.replace(&hex::encode(&sig.to_bytes()[..]), "abcd");
        assert!(serde_json::from_str::<Signed>(&short).is_err());
    }
}
