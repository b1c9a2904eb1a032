use crate::*;

use thiserror::Error;

/// Top-level error type
///
/// Each protocol failure class is its own enum so callers can match on the class
/// without caring about the exact failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Authorization(#[from] AuthorizationError),

    #[error("{0}")]
    State(#[from] StateError),

    #[error("{0}")]
    Consistency(#[from] ConsistencyViolation),

    /// An external collaborator (random source, key agreement) could not serve the request.
    /// Retrying the same operation is safe: no protocol state was touched.
    #[error("quantegrity: collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("quantegrity: JSON error: {0}")]
    JSON(#[from] serde_json::Error),

    #[error("quantegrity: CBOR error: {0}")]
    CBOR(#[from] serde_cbor::Error),
}

impl Error {
    /// A broken protocol invariant. The election-wide operation must halt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Consistency(_))
    }

    /// The operation may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}

/// Malformed input, rejected before any state mutation
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("quantegrity validation: bit strings differ in length ({0} vs {1})")]
    LengthMismatch(usize, usize),

    #[error("quantegrity validation: expected a {expected}-bit string, got {actual} bits")]
    WrongLength { expected: usize, actual: usize },

    #[error("quantegrity validation: bit string is empty")]
    EmptyBitString,

    #[error("quantegrity validation: invalid bit character {0:?}")]
    InvalidBit(char),

    #[error("quantegrity validation: value {value} does not fit in {bits} bits")]
    ValueOverflow { value: u64, bits: usize },

    #[error("quantegrity validation: {bytes} bytes cannot supply {bits} bits")]
    NotEnoughBytes { bits: usize, bytes: usize },

    #[error("quantegrity validation: bit {index} is out of range for a {len}-bit string")]
    BitIndexOutOfRange { index: usize, len: usize },

    #[error("quantegrity validation: unknown voter {0}")]
    UnknownVoter(String),

    #[error("quantegrity validation: unknown ballot {0}")]
    UnknownBallot(String),

    #[error("quantegrity validation: unknown candidate {0}")]
    UnknownCandidate(String),

    #[error("quantegrity validation: unknown confirmation code {0}")]
    UnknownCode(String),

    #[error("quantegrity validation: unknown bulletin entry {0}")]
    UnknownEntry(uuid::Uuid),

    #[error("quantegrity validation: unknown election {0}")]
    UnknownElection(uuid::Uuid),

    #[error("quantegrity validation: election has no candidates")]
    NoCandidates,

    #[error("quantegrity validation: candidate {0} is listed twice")]
    DuplicateCandidate(String),

    #[error("quantegrity validation: candidate names must not be empty")]
    EmptyCandidateName,

    #[error("quantegrity validation: ballot pool must hold at least one ballot")]
    EmptyPool,

    #[error("quantegrity validation: {needed} confirmation codes requested but the {bits}-bit code space is too small")]
    CodeSpaceTooSmall { needed: usize, bits: usize },

    #[error("quantegrity validation: a publication must reveal at least one code")]
    EmptyPublication,

    #[error("quantegrity validation: identity fields must not be empty")]
    EmptyIdentity,

    #[error("quantegrity validation: invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("quantegrity validation: invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("quantegrity validation: unsupported record schema version {0}")]
    UnsupportedSchema(u32),

    #[error("quantegrity validation: stored record {0} is not of the expected kind")]
    UnexpectedRecord(String),

    #[error("quantegrity validation: signing key does not match the board public key")]
    SigningKeyMismatch,

    #[error("quantegrity validation: invalid signing key: {0}")]
    InvalidSigningKey(String),
}

/// The caller is not (yet) entitled to perform the operation. Never mutates state.
#[derive(Debug, Error, PartialEq)]
pub enum AuthorizationError {
    #[error("quantegrity authorization: biometric does not match")]
    BiometricMismatch,

    #[error("quantegrity authorization: one-time password does not match")]
    OtpMismatch,

    #[error("quantegrity authorization: device verification was not requested for voter {0}")]
    DeviceNotRequested(String),

    #[error("quantegrity authorization: device for voter {0} is not verified")]
    DeviceNotVerified(String),

    #[error("quantegrity authorization: no one-time password is pending for voter {0}")]
    NoPendingOtp(String),

    #[error("quantegrity authorization: voter {0} is not authenticated")]
    NotAuthenticated(String),

    #[error("quantegrity authorization: voter {0} has no active voting session")]
    NoVotingSession(String),

    #[error("quantegrity authorization: voter {0} has already voted or spoiled")]
    AlreadyVoted(String),

    #[error("quantegrity authorization: ballot {ballot_id} is not allocated to voter {voter_id}")]
    BallotNotOwned { voter_id: String, ballot_id: String },
}

/// The operation conflicts with the current lifecycle state
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("quantegrity state: ballot {0} is already finalized as {1}")]
    AlreadyFinalized(String, BallotStatus),

    #[error("quantegrity state: ballot {0} is not allocated")]
    NotAllocated(String),

    #[error("quantegrity state: ballot {0} is already allocated")]
    AlreadyAllocated(String),

    #[error("quantegrity state: ballot {0} is not finalized")]
    NotFinalized(String),

    #[error("quantegrity state: bulletin board is sealed")]
    BoardSealed,

    #[error("quantegrity state: bulletin board is read-only (no signing key)")]
    BoardReadOnly,

    #[error("quantegrity state: ballot {0} is already published")]
    DuplicatePublication(String),

    #[error("quantegrity state: a voter with national id {0} is already registered")]
    DuplicateVoter(String),

    #[error("quantegrity state: voter id {0} collides with an existing voter")]
    VoterIdCollision(String),

    #[error("quantegrity state: device for voter {0} is already verified")]
    DeviceAlreadyVerified(String),

    #[error("quantegrity state: ballot pool is exhausted")]
    PoolExhausted,
}

/// A broken protocol invariant. Fatal: never retried, never shown as a normal voting failure.
#[derive(Debug, Error, PartialEq)]
pub enum ConsistencyViolation {
    #[error("quantegrity CONSISTENCY: key agreement returned mismatched shares during {0}")]
    KeyAgreementMismatch(String),

    #[error("quantegrity CONSISTENCY: confirmation code {0} appears more than once in the pool")]
    DuplicateCode(String),

    #[error("quantegrity CONSISTENCY: table R does not hold exactly one row for ballot {ballot_id} / {candidate}")]
    MalformedTableR { ballot_id: String, candidate: String },

    #[error("quantegrity CONSISTENCY: code {code} maps to {found}, expected {expected}")]
    CodeCandidateMismatch {
        code: String,
        expected: String,
        found: String,
    },

    #[error("quantegrity CONSISTENCY: board tally {board:?} diverges from live tally {live:?}")]
    TallyMismatch {
        board: Vec<(String, usize)>,
        live: Vec<(String, usize)>,
    },

    #[error("quantegrity CONSISTENCY: published code {0} is unknown to the mixnet tables")]
    UnknownPublishedCode(String),

    #[error("quantegrity CONSISTENCY: bulletin entries failed verification: {0:?}")]
    TamperedEntries(Vec<uuid::Uuid>),

    #[error("quantegrity CONSISTENCY: published code {0} appears in more than one place on the board")]
    DuplicatePublishedCode(String),

    #[error("quantegrity CONSISTENCY: published code {code} does not belong to ballot {ballot_id}")]
    MisattributedCode { code: String, ballot_id: String },

    #[error("quantegrity CONSISTENCY: bulletin entry {0} does not reveal the expected codes of its ballot")]
    IncompleteDisclosure(uuid::Uuid),

    #[error("quantegrity CONSISTENCY: finalized ballot {0} holds no codes to publish")]
    OutcomeWithoutCodes(String),

    #[error("quantegrity CONSISTENCY: election state lock was poisoned")]
    Poisoned,
}

impl ConsistencyViolation {
    /// Log at error level and hand the violation back for returning
    pub fn logged(self) -> Self {
        log::error!("{}", self);
        self
    }
}
