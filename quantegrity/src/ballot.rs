use crate::*;
use indexmap::IndexMap;
use std::fmt;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BallotStatus {
    /// In the pool, not yet handed to a voter
    Unallocated,
    Allocated,
    Cast,
    Spoiled,
    Audited,
}

impl BallotStatus {
    /// Cast, spoiled and audited ballots never change again
    pub fn is_final(self) -> bool {
        matches!(
            self,
            BallotStatus::Cast | BallotStatus::Spoiled | BallotStatus::Audited
        )
    }

    /// The board entry type that publishes this outcome
    pub fn entry_type(self) -> Option<EntryType> {
        match self {
            BallotStatus::Cast => Some(EntryType::Vote),
            BallotStatus::Spoiled => Some(EntryType::Spoiled),
            BallotStatus::Audited => Some(EntryType::Audit),
            _ => None,
        }
    }
}

impl fmt::Display for BallotStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BallotStatus::Unallocated => "unallocated",
            BallotStatus::Allocated => "allocated",
            BallotStatus::Cast => "cast",
            BallotStatus::Spoiled => "spoiled",
            BallotStatus::Audited => "audited",
        };
        f.write_str(s)
    }
}

/// A ballot from the pool
///
/// Exactly one of `cast`, `spoil` or `audit` ever succeeds on a ballot. After a
/// cast only the confirmation code and the encrypted vote are kept, never the
/// chosen candidate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Ballot {
    pub id: BallotId,
    pub election_id: Uuid,
    pub voter_id: Option<String>,

    /// This ballot's row of table P
    pub codes: IndexMap<String, ConfirmationCode>,

    pub status: BallotStatus,
    pub confirmation_code: Option<ConfirmationCode>,
    pub encrypted_vote: Option<BitString>,
    pub allocated_at: Option<u64>,
    pub finalized_at: Option<u64>,
}

impl Ballot {
    pub fn new(id: BallotId, election_id: Uuid, codes: IndexMap<String, ConfirmationCode>) -> Self {
        Ballot {
            id,
            election_id,
            voter_id: None,
            codes,
            status: BallotStatus::Unallocated,
            confirmation_code: None,
            encrypted_vote: None,
            allocated_at: None,
            finalized_at: None,
        }
    }

    /// Hand this ballot to a voter
    pub fn allocate(&mut self, voter_id: &str) -> Result<(), StateError> {
        match self.status {
            BallotStatus::Unallocated => {}
            BallotStatus::Allocated => return Err(StateError::AlreadyAllocated(self.id.to_string())),
            status => return Err(StateError::AlreadyFinalized(self.id.to_string(), status)),
        }
        self.voter_id = Some(voter_id.to_owned());
        self.status = BallotStatus::Allocated;
        self.allocated_at = Some(unix_timestamp());
        Ok(())
    }

    /// Allocated and not yet finalized
    pub fn check_open(&self) -> Result<(), StateError> {
        match self.status {
            BallotStatus::Allocated => Ok(()),
            BallotStatus::Unallocated => Err(StateError::NotAllocated(self.id.to_string())),
            status => Err(StateError::AlreadyFinalized(self.id.to_string(), status)),
        }
    }

    /// Mark `candidate`: flag its code in the tables and return the code.
    pub fn cast(
        &mut self,
        candidate: &str,
        tables: &mut MixnetTableSet,
    ) -> Result<ConfirmationCode, Error> {
        self.check_open()?;
        let code = self
            .codes
            .get(candidate)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownCandidate(candidate.to_owned()))?;

        // Check R agrees with P before mutating anything
        match tables.candidate_for(&code) {
            Some(found) if found == candidate => {}
            found => {
                return Err(ConsistencyViolation::CodeCandidateMismatch {
                    code: code.to_string(),
                    expected: candidate.to_owned(),
                    found: found.unwrap_or("<none>").to_owned(),
                }
                .logged()
                .into())
            }
        }
        tables.flag(&code)?;

        self.status = BallotStatus::Cast;
        self.confirmation_code = Some(code.clone());
        self.finalized_at = Some(unix_timestamp());
        Ok(code)
    }

    /// Discard the ballot, revealing every code. Contributes nothing to the tally.
    pub fn spoil(
        &mut self,
        tables: &mut MixnetTableSet,
    ) -> Result<IndexMap<String, ConfirmationCode>, Error> {
        self.reveal(tables, BallotStatus::Spoiled)
    }

    /// Reveal every code to check the ballot was printed correctly.
    pub fn audit(
        &mut self,
        tables: &mut MixnetTableSet,
    ) -> Result<IndexMap<String, ConfirmationCode>, Error> {
        self.reveal(tables, BallotStatus::Audited)
    }

    fn reveal(
        &mut self,
        tables: &mut MixnetTableSet,
        status: BallotStatus,
    ) -> Result<IndexMap<String, ConfirmationCode>, Error> {
        self.check_open()?;
        let codes = tables.reveal_all(&self.id)?;
        self.status = status;
        self.finalized_at = Some(unix_timestamp());
        Ok(codes)
    }

    /// Codes made public by this ballot's outcome
    pub fn revealed_codes(&self) -> Vec<ConfirmationCode> {
        match self.status {
            BallotStatus::Cast => self.confirmation_code.iter().cloned().collect(),
            BallotStatus::Spoiled | BallotStatus::Audited => self.codes.values().cloned().collect(),
            _ => vec![],
        }
    }

    /// The voter-facing view of this ballot
    pub fn issue(&self) -> IssuedBallot {
        IssuedBallot {
            ballot_id: self.id.clone(),
            election_id: self.election_id,
            candidates: self.codes.keys().cloned().collect(),
        }
    }
}

/// What a voter sees when a ballot is allocated. Codes stay hidden until revealed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IssuedBallot {
    pub ballot_id: BallotId,
    pub election_id: Uuid,
    pub candidates: Vec<String>,
}
