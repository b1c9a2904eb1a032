use crate::*;
use ed25519_dalek::{ExpandedSecretKey, PublicKey, SecretKey, Signature, SECRET_KEY_LENGTH};
use indexmap::IndexMap;
use log::info;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Vote,
    Spoiled,
    Audit,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            EntryType::Vote => "vote",
            EntryType::Spoiled => "spoiled",
            EntryType::Audit => "audit",
        };
        f.write_str(s)
    }
}

/// A published ballot outcome
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BulletinEntry {
    pub entry_id: Uuid,

    /// Position on the board, starting at 1
    pub sequence: u64,

    pub ballot_id: BallotId,
    pub entry_type: EntryType,
    pub codes: Vec<ConfirmationCode>,
    pub timestamp: u64,

    /// `sign_codes(ballot_id, codes)`
    pub signature: String,

    /// ed25519 signature by the board key over the rest of the entry
    #[serde(with = "EdSignatureHex")]
    pub proof: Signature,
}

/// The unsigned part of an entry. Its CBOR encoding is what the proof covers.
struct EntryBody<'a> {
    entry_id: &'a Uuid,
    sequence: u64,
    ballot_id: &'a BallotId,
    entry_type: EntryType,
    codes: &'a [ConfirmationCode],
    timestamp: u64,
    signature: &'a str,
}

impl EntryBody<'_> {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_cbor::to_vec(&(
            self.entry_id,
            self.sequence,
            self.ballot_id,
            self.entry_type,
            self.codes,
            self.timestamp,
            self.signature,
        ))?)
    }
}

impl BulletinEntry {
    fn body(&self) -> EntryBody {
        EntryBody {
            entry_id: &self.entry_id,
            sequence: self.sequence,
            ballot_id: &self.ballot_id,
            entry_type: self.entry_type,
            codes: &self.codes,
            timestamp: self.timestamp,
            signature: &self.signature,
        }
    }

    pub fn has_valid_signature(&self) -> Result<bool, Error> {
        Ok(sign_codes(&self.ballot_id, &self.codes)? == self.signature)
    }

    pub fn has_valid_proof(&self, public_key: &PublicKey) -> Result<bool, Error> {
        let message = self.body().to_bytes()?;
        Ok(public_key.verify_strict(&message, &self.proof).is_ok())
    }
}

/// Tamper-detection signature: hex SHA-256 of the CBOR-encoded `(ballot_id, codes)`.
pub fn sign_codes(ballot_id: &BallotId, codes: &[ConfirmationCode]) -> Result<String, Error> {
    let encoded = serde_cbor::to_vec(&(ballot_id, codes))?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

/// Persisted board header. Entries are stored on their own.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoardState {
    #[serde(with = "EdPublicKeyHex")]
    pub public_key: PublicKey,
    pub sealed: bool,
}

/// Append-only, sealable ledger of ballot outcomes
///
/// At most one entry per ballot, ever. Entries keep insertion order. Posting
/// requires the signing key; a board loaded from an export is read-only.
#[derive(Serialize, Deserialize, Clone)]
pub struct BulletinBoard {
    #[serde(with = "EdPublicKeyHex")]
    public_key: PublicKey,

    #[serde(skip)]
    secret: Option<[u8; SECRET_KEY_LENGTH]>,

    entries: Vec<BulletinEntry>,
    sealed: bool,
}

impl BulletinBoard {
    pub fn with_secret(secret: &SecretKey) -> Self {
        BulletinBoard {
            public_key: PublicKey::from(secret),
            secret: Some(secret.to_bytes()),
            entries: vec![],
            sealed: false,
        }
    }

    /// A read-only board
    pub fn from_parts(public_key: PublicKey, entries: Vec<BulletinEntry>, sealed: bool) -> Self {
        BulletinBoard {
            public_key,
            secret: None,
            entries,
            sealed,
        }
    }

    /// Make a read-only board writable again
    pub fn attach_secret(&mut self, secret: &SecretKey) -> Result<(), ValidationError> {
        if PublicKey::from(secret) != self.public_key {
            return Err(ValidationError::SigningKeyMismatch);
        }
        self.secret = Some(secret.to_bytes());
        Ok(())
    }

    /// Copy without the signing key, for export
    pub fn public_view(&self) -> Self {
        BulletinBoard::from_parts(self.public_key, self.entries.clone(), self.sealed)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn state(&self) -> BoardState {
        BoardState {
            public_key: self.public_key,
            sealed: self.sealed,
        }
    }

    /// Check that a post for `ballot_id` would be accepted
    pub fn can_post(&self, ballot_id: &BallotId) -> Result<(), StateError> {
        if self.sealed {
            return Err(StateError::BoardSealed);
        }
        if self.secret.is_none() {
            return Err(StateError::BoardReadOnly);
        }
        if self.entry_for_ballot(ballot_id).is_some() {
            return Err(StateError::DuplicatePublication(ballot_id.to_string()));
        }
        Ok(())
    }

    /// Publish a ballot outcome.
    pub fn post(
        &mut self,
        ballot_id: &BallotId,
        entry_type: EntryType,
        codes: Vec<ConfirmationCode>,
    ) -> Result<Uuid, Error> {
        if codes.is_empty() {
            return Err(ValidationError::EmptyPublication.into());
        }
        self.can_post(ballot_id)?;
        let secret = match &self.secret {
            Some(bytes) => SecretKey::from_bytes(bytes)
                .map_err(|e| ValidationError::InvalidSigningKey(e.to_string()))?,
            None => return Err(StateError::BoardReadOnly.into()),
        };

        let entry_id = Uuid::new_v4();
        let sequence = self.entries.last().map_or(1, |e| e.sequence + 1);
        let timestamp = unix_timestamp();
        let signature = sign_codes(ballot_id, &codes)?;
        let body = EntryBody {
            entry_id: &entry_id,
            sequence,
            ballot_id,
            entry_type,
            codes: &codes,
            timestamp,
            signature: &signature,
        };
        let expanded = ExpandedSecretKey::from(&secret);
        let proof = expanded.sign(&body.to_bytes()?, &self.public_key);

        let entry = BulletinEntry {
            entry_id,
            sequence,
            ballot_id: ballot_id.clone(),
            entry_type,
            codes,
            timestamp,
            signature,
            proof,
        };

        info!(
            "posted {} entry #{} for {}",
            entry.entry_type, entry.sequence, entry.ballot_id
        );
        self.entries.push(entry);
        Ok(entry_id)
    }

    /// Recompute the hash signature of an entry and compare.
    pub fn verify(&self, entry_id: Uuid) -> Result<bool, Error> {
        self.entry(entry_id)
            .ok_or(ValidationError::UnknownEntry(entry_id))?
            .has_valid_signature()
    }

    /// Check an entry's proof against the board key.
    pub fn verify_proof(&self, entry_id: Uuid) -> Result<bool, Error> {
        self.entry(entry_id)
            .ok_or(ValidationError::UnknownEntry(entry_id))?
            .has_valid_proof(&self.public_key)
    }

    /// Ids of entries whose signature or proof does not verify
    pub fn verify_all(&self) -> Result<Vec<Uuid>, Error> {
        let mut tampered = vec![];
        for entry in self.entries.iter() {
            if !entry.has_valid_signature()? || !entry.has_valid_proof(&self.public_key)? {
                tampered.push(entry.entry_id);
            }
        }
        Ok(tampered)
    }

    /// Close the board. Returns false if it was already sealed.
    pub fn seal(&mut self) -> bool {
        if self.sealed {
            return false;
        }
        self.sealed = true;
        info!("bulletin board sealed with {} entries", self.entries.len());
        true
    }

    pub fn entries(&self) -> &[BulletinEntry] {
        &self.entries
    }

    pub fn entry(&self, entry_id: Uuid) -> Option<&BulletinEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    pub fn entry_for_ballot(&self, ballot_id: &BallotId) -> Option<&BulletinEntry> {
        self.entries.iter().find(|e| e.ballot_id == *ballot_id)
    }

    pub fn votes(&self) -> impl Iterator<Item = &BulletinEntry> {
        self.entries
            .iter()
            .filter(|e| e.entry_type == EntryType::Vote)
    }

    /// Recount the election from published entries alone.
    ///
    /// Every published code must be printed on the entry's own ballot and
    /// appear only once on the whole board. A vote reveals exactly one code,
    /// a spoil or audit reveals the ballot's full row of table P. Vote codes
    /// are replayed through `flag` on a cleared copy of `tables` and the
    /// result must equal the live tally of `tables`.
    pub fn tally_from_board(
        &self,
        tables: &MixnetTableSet,
    ) -> Result<IndexMap<String, usize>, Error> {
        let tampered = self.verify_all()?;
        if !tampered.is_empty() {
            return Err(ConsistencyViolation::TamperedEntries(tampered).logged().into());
        }

        let mut published = HashSet::new();
        for entry in self.entries.iter() {
            for code in entry.codes.iter() {
                if !published.insert(code) {
                    return Err(ConsistencyViolation::DuplicatePublishedCode(code.to_string())
                        .logged()
                        .into());
                }
                match tables.ballot_for(code) {
                    Some(owner) if *owner == entry.ballot_id => {}
                    Some(_) => {
                        return Err(ConsistencyViolation::MisattributedCode {
                            code: code.to_string(),
                            ballot_id: entry.ballot_id.to_string(),
                        }
                        .logged()
                        .into())
                    }
                    None => {
                        return Err(ConsistencyViolation::UnknownPublishedCode(code.to_string())
                            .logged()
                            .into())
                    }
                }
            }

            let complete = match entry.entry_type {
                EntryType::Vote => entry.codes.len() == 1,
                EntryType::Spoiled | EntryType::Audit => tables
                    .codes_for(&entry.ballot_id)
                    .map_or(false, |row| row.len() == entry.codes.len()),
            };
            if !complete {
                return Err(ConsistencyViolation::IncompleteDisclosure(entry.entry_id)
                    .logged()
                    .into());
            }
        }

        let mut replay = tables.cleared();
        for entry in self.votes() {
            for code in entry.codes.iter() {
                replay.flag(code)?;
            }
        }

        let board = replay.tally();
        let live = tables.tally();
        if board != live {
            return Err(ConsistencyViolation::TallyMismatch {
                board: board.into_iter().collect(),
                live: live.into_iter().collect(),
            }
            .logged()
            .into());
        }
        Ok(board)
    }

    /// Check a voter's receipt against the board
    pub fn verify_receipt(&self, receipt: &Receipt) -> Result<bool, Error> {
        let entry = match self.entry(receipt.entry_id) {
            Some(entry) => entry,
            None => return Ok(false),
        };
        if entry.ballot_id != receipt.ballot_id || entry.entry_type != receipt.entry_type {
            return Ok(false);
        }
        if !receipt.codes.iter().all(|c| entry.codes.contains(c)) {
            return Ok(false);
        }
        entry.has_valid_signature()
    }
}

impl fmt::Debug for BulletinBoard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BulletinBoard")
            .field("public_key", &hex::encode(self.public_key.as_bytes()))
            .field("writable", &self.secret.is_some())
            .field("entries", &self.entries.len())
            .field("sealed", &self.sealed)
            .finish()
    }
}

/// What a voter keeps after their ballot outcome is published
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Receipt {
    pub entry_id: Uuid,
    pub ballot_id: BallotId,
    pub entry_type: EntryType,
    pub codes: Vec<ConfirmationCode>,
}

impl From<&BulletinEntry> for Receipt {
    fn from(entry: &BulletinEntry) -> Self {
        Receipt {
            entry_id: entry.entry_id,
            ballot_id: entry.ballot_id.clone(),
            entry_type: entry.entry_type,
            codes: entry.codes.clone(),
        }
    }
}

/// Everything needed to check an election offline
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditBundle {
    pub election: Election,
    pub board: BulletinBoard,
    pub tables: MixnetTableSet,
}

impl AuditBundle {
    /// Check table structure, every entry, and recount from the board.
    pub fn verify(&self) -> Result<IndexMap<String, usize>, Error> {
        self.tables.verify_integrity()?;
        self.board.tally_from_board(&self.tables)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}
