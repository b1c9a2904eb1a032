use crate::*;
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    NotRequested,
    Requested,
    PendingVerification,
    Verified,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    NotAuthenticated,

    /// Biometric accepted and AQ_K1 derived, authentication OTP outstanding
    BiometricVerified,

    Authenticated,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    NotVoted,
    Voted,
    Spoiled,
}

impl VoteStatus {
    /// Voted and spoiled are both final for the election
    pub fn is_final(self) -> bool {
        self != VoteStatus::NotVoted
    }
}

/// Where a voter stands in the credential workflow
///
/// Stages are strictly ordered and each one is reached only through the
/// previous one.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum VoterStage {
    NotRegistered,
    Registered,
    DeviceRequested,
    DeviceVerified,
    BiometricAuthenticated,
    Authenticated,
    VotingSessionActive,
}

impl fmt::Display for VoterStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            VoterStage::NotRegistered => "not registered",
            VoterStage::Registered => "registered",
            VoterStage::DeviceRequested => "device requested",
            VoterStage::DeviceVerified => "device verified",
            VoterStage::BiometricAuthenticated => "biometric authenticated",
            VoterStage::Authenticated => "authenticated",
            VoterStage::VotingSessionActive => "voting session active",
        };
        f.write_str(s)
    }
}

/// A voter's stored key material
///
/// Q_K1 is never stored in the clear: only its biometric encryption is kept.
/// AQ_K1 and VQ_K1 are absent until their stage completes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyBundle {
    pub encrypted_q_k1: BitString,
    pub q_k2: BitString,
    pub aq_k1: Option<BitString>,
    pub vq_k1: Option<BitString>,
}

impl KeyBundle {
    pub fn new(encrypted_q_k1: BitString, q_k2: BitString) -> Self {
        KeyBundle {
            encrypted_q_k1,
            q_k2,
            aq_k1: None,
            vq_k1: None,
        }
    }
}

/// A registered voter. Voters are never deleted.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Voter {
    pub voter_id: String,
    pub name: String,
    pub national_id: String,
    pub keys: KeyBundle,
    pub biometric_signature: BitString,
    pub device_fingerprint: Option<String>,
    pub device_status: DeviceStatus,
    pub auth_status: AuthStatus,
    pub vote_status: VoteStatus,
    pub pending_device_otp: Option<BitString>,
    pub pending_auth_otp: Option<BitString>,
    pub ballot_id: Option<BallotId>,
    pub receipt: Option<uuid::Uuid>,
    pub registered_at: u64,
}

impl Voter {
    pub fn new(registration: &Registration, name: &str, national_id: &str) -> Self {
        Voter {
            voter_id: registration.voter_id.clone(),
            name: name.to_owned(),
            national_id: national_id.to_owned(),
            keys: KeyBundle::new(registration.encrypted_q_k1.clone(), registration.q_k2.clone()),
            biometric_signature: registration.biometric.clone(),
            device_fingerprint: None,
            device_status: DeviceStatus::NotRequested,
            auth_status: AuthStatus::NotAuthenticated,
            vote_status: VoteStatus::NotVoted,
            pending_device_otp: None,
            pending_auth_otp: None,
            ballot_id: None,
            receipt: None,
            registered_at: unix_timestamp(),
        }
    }

    pub fn stage(&self) -> VoterStage {
        if self.keys.vq_k1.is_some() {
            return VoterStage::VotingSessionActive;
        }
        match self.auth_status {
            AuthStatus::Authenticated => return VoterStage::Authenticated,
            AuthStatus::BiometricVerified => return VoterStage::BiometricAuthenticated,
            AuthStatus::NotAuthenticated => {}
        }
        match self.device_status {
            DeviceStatus::Verified => VoterStage::DeviceVerified,
            DeviceStatus::Requested | DeviceStatus::PendingVerification => {
                VoterStage::DeviceRequested
            }
            DeviceStatus::NotRequested => VoterStage::Registered,
        }
    }

    /// Drop the session keys and OTPs. Stored credentials are kept.
    pub(crate) fn end_session(&mut self) {
        self.keys.aq_k1 = None;
        self.keys.vq_k1 = None;
        self.pending_auth_otp = None;
        self.auth_status = AuthStatus::NotAuthenticated;
    }
}
