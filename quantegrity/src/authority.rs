use crate::*;
use ed25519_dalek::SecretKey;
use indexmap::IndexMap;
use log::{info, warn};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// External services the authority draws on
pub struct Collaborators {
    random: Box<dyn RandomSource>,
    agreement: Option<Box<dyn KeyAgreement>>,
}

impl Collaborators {
    pub fn new(random: Box<dyn RandomSource>) -> Self {
        Collaborators {
            random,
            agreement: None,
        }
    }

    /// OS entropy, HKDF key agreement bound to the election
    pub fn system() -> Self {
        Collaborators::new(Box::new(OsRandomSource))
    }

    /// Reproducible randomness, HKDF key agreement bound to the election
    pub fn seeded(seed: u64) -> Self {
        Collaborators::new(Box::new(SeededRandomSource::new(seed)))
    }

    /// Replace the default key agreement
    pub fn with_agreement(mut self, agreement: Box<dyn KeyAgreement>) -> Self {
        self.agreement = Some(agreement);
        self
    }

    fn into_parts(self, election: &Election) -> (Box<dyn RandomSource>, KeyChain) {
        let agreement = self
            .agreement
            .unwrap_or_else(|| {
                Box::new(HkdfKeyAgreement::new(election.id.as_bytes())) as Box<dyn KeyAgreement>
            });
        (
            self.random,
            KeyChain::new(agreement, election.config.key_bits),
        )
    }
}

/// Returned by `authenticate`: the voter's AQ_K1 share and the authentication
/// OTP encrypted under it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthChallenge {
    pub aq_k1: BitString,
    pub encrypted_otp: BitString,
}

/// Returned by spoil and audit: the receipt plus every revealed code
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BallotDisclosure {
    pub receipt: Receipt,
    pub codes: IndexMap<String, ConfirmationCode>,
}

/// What `restore` found in the store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub voters: usize,
    pub ballots: usize,
    pub entries: usize,

    /// Finalized ballots with no board entry. Repair with `publish_entry`.
    pub unpublished: Vec<BallotId>,
}

struct AuthorityState<S> {
    election: Election,
    keychain: KeyChain,
    random: Box<dyn RandomSource>,
    tables: MixnetTableSet,
    pool: BallotPool,
    ballots: IndexMap<BallotId, Ballot>,
    voters: IndexMap<String, Voter>,
    board: BulletinBoard,
    log: OperationLog,
    store: S,
}

/// Runs one election end to end.
///
/// All state sits behind a single lock, so every operation is linearized:
/// a ballot's outcome, its table flags and its board entry commit together,
/// and `seal_board` is ordered strictly before or after any post.
pub struct ElectionAuthority<S: Store + Send = MemStore> {
    state: Mutex<AuthorityState<S>>,
}

impl<S: Store + Send> ElectionAuthority<S> {
    /// Generate the ballot pool and open the board.
    pub fn create(
        election: Election,
        signing_key: &SecretKey,
        collaborators: Collaborators,
        store: S,
    ) -> Result<Self, Error> {
        election.config.validate()?;
        let (mut random, keychain) = collaborators.into_parts(&election);
        let mut log = OperationLog::with_capacity(election.config.log_capacity);

        let tables = MixnetTableSet::generate(
            &election.candidates,
            election.pool_size,
            election.config.code_bits,
            election.config.code_draw_attempts,
            random.as_mut(),
            &mut log,
        )?;
        let ballots: IndexMap<BallotId, Ballot> = tables
            .table_p()
            .iter()
            .map(|(id, codes)| (id.clone(), Ballot::new(id.clone(), election.id, codes.clone())))
            .collect();
        let pool = BallotPool {
            election_id: election.id,
            ballot_ids: ballots.keys().cloned().collect(),
        };

        let mut state = AuthorityState {
            board: BulletinBoard::with_secret(signing_key),
            election,
            keychain,
            random,
            tables,
            pool,
            ballots,
            voters: IndexMap::new(),
            log,
            store,
        };
        state.persist_all()?;
        info!(
            "created election {} ({}) with {} ballots for {} candidates",
            state.election.name,
            state.election.id,
            state.pool.ballot_ids.len(),
            state.election.candidates.len()
        );

        Ok(ElectionAuthority {
            state: Mutex::new(state),
        })
    }

    /// Rebuild an election from a store.
    pub fn restore(
        store: S,
        election_id: &Uuid,
        signing_key: &SecretKey,
        collaborators: Collaborators,
    ) -> Result<(Self, RestoreReport), Error> {
        let missing = || ValidationError::UnknownElection(*election_id);
        let election = store.get_election(election_id)?.ok_or_else(missing)?;
        election.config.validate()?;
        let tables = store.get_tables(election_id)?.ok_or_else(missing)?;
        let pool = store.get_pool(election_id)?.ok_or_else(missing)?;
        let board_state = store.get_board(election_id)?.ok_or_else(missing)?;
        tables.verify_integrity()?;

        let mut ballots = IndexMap::with_capacity(pool.ballot_ids.len());
        for ballot_id in pool.ballot_ids.iter() {
            let ballot = store
                .get_ballot(election_id, ballot_id)?
                .ok_or_else(|| ValidationError::UnknownBallot(ballot_id.to_string()))?;
            ballots.insert(ballot_id.clone(), ballot);
        }
        let voters: IndexMap<String, Voter> = store
            .voters()?
            .into_iter()
            .map(|v| (v.voter_id.clone(), v))
            .collect();
        let mut board =
            BulletinBoard::from_parts(board_state.public_key, store.entries()?, board_state.sealed);
        board.attach_secret(signing_key)?;

        let unpublished: Vec<BallotId> = ballots
            .values()
            .filter(|b| b.status.is_final() && board.entry_for_ballot(&b.id).is_none())
            .map(|b| b.id.clone())
            .collect();
        for ballot_id in unpublished.iter() {
            warn!("ballot {} was finalized without a board entry", ballot_id);
        }
        let report = RestoreReport {
            voters: voters.len(),
            ballots: ballots.len(),
            entries: board.entries().len(),
            unpublished,
        };

        let (random, keychain) = collaborators.into_parts(&election);
        let mut log = OperationLog::with_capacity(election.config.log_capacity);
        log.record(
            "restore",
            None,
            format!(
                "{} voters, {} ballots, {} entries",
                report.voters, report.ballots, report.entries
            ),
        );
        info!("restored election {} ({})", election.name, election.id);

        let state = AuthorityState {
            election,
            keychain,
            random,
            tables,
            pool,
            ballots,
            voters,
            board,
            log,
            store,
        };
        Ok((
            ElectionAuthority {
                state: Mutex::new(state),
            },
            report,
        ))
    }

    fn lock(&self) -> Result<MutexGuard<AuthorityState<S>>, Error> {
        self.state
            .lock()
            .map_err(|_| Error::from(ConsistencyViolation::Poisoned.logged()))
    }

    pub fn register_voter(&self, name: &str, national_id: &str) -> Result<Registration, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        state.check_new_voter(national_id)?;
        let registration =
            state
                .keychain
                .register(state.random.as_mut(), name, national_id, &mut state.log)?;
        state.add_voter(&registration, name, national_id)?;
        Ok(registration)
    }

    /// Register with caller-supplied key material
    pub fn register_voter_with_keys(
        &self,
        name: &str,
        national_id: &str,
        q_k1: BitString,
        q_k2: BitString,
        biometric: BitString,
    ) -> Result<Registration, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        state.check_new_voter(national_id)?;
        let registration = state.keychain.register_with_keys(
            name,
            national_id,
            q_k1,
            q_k2,
            biometric,
            &mut state.log,
        )?;
        state.add_voter(&registration, name, national_id)?;
        Ok(registration)
    }

    pub fn request_device_verification(
        &self,
        voter_id: &str,
        device_fingerprint: &str,
    ) -> Result<(), Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if device_fingerprint.trim().is_empty() {
            return Err(ValidationError::InvalidIdentifier(device_fingerprint.to_owned()).into());
        }
        let voter = state.voter_mut(voter_id)?;
        if voter.device_status == DeviceStatus::Verified {
            return Err(StateError::DeviceAlreadyVerified(voter_id.to_owned()).into());
        }
        voter.device_fingerprint = Some(device_fingerprint.to_owned());
        voter.device_status = DeviceStatus::Requested;
        voter.pending_device_otp = None;

        state.log.record("request_device_verification", Some(voter_id), "");
        state.persist_voter(voter_id)
    }

    /// Issue a device OTP. Returns it encrypted under the voter's Q_K2.
    pub fn approve_device_verification(&self, voter_id: &str) -> Result<BitString, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let otp_bits = state.election.config.otp_bits;
        let q_k2 = {
            let voter = state.voter(voter_id)?;
            match voter.device_status {
                DeviceStatus::Requested | DeviceStatus::PendingVerification => {}
                DeviceStatus::NotRequested => {
                    return Err(AuthorizationError::DeviceNotRequested(voter_id.to_owned()).into())
                }
                DeviceStatus::Verified => {
                    return Err(StateError::DeviceAlreadyVerified(voter_id.to_owned()).into())
                }
            }
            voter.keys.q_k2.clone()
        };

        let otp = state.random.next_bits(otp_bits)?;
        let encrypted_otp = encrypt(&otp, &q_k2)?;

        let voter = state.voter_mut(voter_id)?;
        voter.pending_device_otp = Some(otp);
        voter.device_status = DeviceStatus::PendingVerification;

        state.log.record(
            "approve_device_verification",
            Some(voter_id),
            format!("{}-bit otp under Q_K2", otp_bits),
        );
        state.persist_voter(voter_id)?;
        Ok(encrypted_otp)
    }

    /// Complete device verification with the decrypted OTP.
    pub fn verify_device(&self, voter_id: &str, otp: &BitString) -> Result<(), Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        otp.expect_len(state.election.config.otp_bits)?;
        let voter = state.voter_mut(voter_id)?;
        match voter.device_status {
            DeviceStatus::PendingVerification => {}
            DeviceStatus::Verified => {
                return Err(StateError::DeviceAlreadyVerified(voter_id.to_owned()).into())
            }
            _ => return Err(AuthorizationError::DeviceNotRequested(voter_id.to_owned()).into()),
        }
        match &voter.pending_device_otp {
            None => return Err(AuthorizationError::NoPendingOtp(voter_id.to_owned()).into()),
            Some(expected) if expected != otp => {
                return Err(AuthorizationError::OtpMismatch.into())
            }
            Some(_) => {}
        }
        voter.device_status = DeviceStatus::Verified;
        voter.pending_device_otp = None;

        state.log.record("verify_device", Some(voter_id), "");
        info!("device verified for voter {}", voter_id);
        state.persist_voter(voter_id)
    }

    /// Biometric stage. Derives AQ_K1 and issues the authentication OTP.
    pub fn authenticate(&self, voter_id: &str, biometric: &BitString) -> Result<AuthChallenge, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let otp_bits = state.election.config.otp_bits;
        let (encrypted_q_k1, registered) = {
            let voter = state.voter(voter_id)?;
            if voter.device_status != DeviceStatus::Verified {
                return Err(AuthorizationError::DeviceNotVerified(voter_id.to_owned()).into());
            }
            if voter.vote_status.is_final() {
                return Err(AuthorizationError::AlreadyVoted(voter_id.to_owned()).into());
            }
            (voter.keys.encrypted_q_k1.clone(), voter.biometric_signature.clone())
        };

        let aq_k1 =
            state
                .keychain
                .authenticate(&encrypted_q_k1, &registered, biometric, &mut state.log)?;
        let otp = state.random.next_bits(otp_bits)?;
        let encrypted_otp = encrypt(&otp, &aq_k1)?;

        let voter = state.voter_mut(voter_id)?;
        voter.end_session();
        voter.keys.aq_k1 = Some(aq_k1.clone());
        voter.pending_auth_otp = Some(otp);
        voter.pending_device_otp = None;
        voter.auth_status = AuthStatus::BiometricVerified;

        state.log.record(
            "authenticate",
            Some(voter_id),
            format!("{}-bit otp under AQ_K1", otp_bits),
        );
        state.persist_voter(voter_id)?;
        Ok(AuthChallenge {
            aq_k1,
            encrypted_otp,
        })
    }

    /// Complete authentication with the decrypted OTP.
    pub fn verify_auth_otp(&self, voter_id: &str, otp: &BitString) -> Result<(), Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        otp.expect_len(state.election.config.otp_bits)?;
        let voter = state.voter_mut(voter_id)?;
        if voter.auth_status != AuthStatus::BiometricVerified {
            return Err(AuthorizationError::NotAuthenticated(voter_id.to_owned()).into());
        }
        match &voter.pending_auth_otp {
            None => return Err(AuthorizationError::NoPendingOtp(voter_id.to_owned()).into()),
            Some(expected) if expected != otp => {
                return Err(AuthorizationError::OtpMismatch.into())
            }
            Some(_) => {}
        }
        voter.auth_status = AuthStatus::Authenticated;
        voter.pending_auth_otp = None;

        state.log.record("verify_auth_otp", Some(voter_id), "");
        state.persist_voter(voter_id)
    }

    /// Derive VQ_K1 for an authenticated voter.
    pub fn initiate_voting_session(&self, voter_id: &str) -> Result<BitString, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let aq_k1 = {
            let voter = state.voter(voter_id)?;
            if voter.vote_status.is_final() {
                return Err(AuthorizationError::AlreadyVoted(voter_id.to_owned()).into());
            }
            match (&voter.auth_status, &voter.keys.aq_k1) {
                (AuthStatus::Authenticated, Some(aq_k1)) => aq_k1.clone(),
                _ => return Err(AuthorizationError::NotAuthenticated(voter_id.to_owned()).into()),
            }
        };

        let vq_k1 = state.keychain.derive_voting_key(&aq_k1, &mut state.log)?;
        state.voter_mut(voter_id)?.keys.vq_k1 = Some(vq_k1.clone());

        state.log.record("initiate_voting_session", Some(voter_id), "");
        state.persist_voter(voter_id)?;
        Ok(vq_k1)
    }

    /// Hand the next unallocated ballot of the pool to a voter.
    ///
    /// A voter still holding an open ballot gets that ballot again.
    pub fn allocate_ballot(&self, voter_id: &str) -> Result<IssuedBallot, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let held = {
            let voter = state.voter(voter_id)?;
            if voter.vote_status.is_final() {
                return Err(AuthorizationError::AlreadyVoted(voter_id.to_owned()).into());
            }
            if voter.stage() != VoterStage::VotingSessionActive {
                return Err(AuthorizationError::NoVotingSession(voter_id.to_owned()).into());
            }
            voter.ballot_id.clone()
        };
        if let Some(ballot) = held.and_then(|id| state.ballots.get(&id)) {
            if ballot.status == BallotStatus::Allocated {
                return Ok(ballot.issue());
            }
        }

        let ballot_id = state
            .pool
            .ballot_ids
            .iter()
            .find(|id| {
                state
                    .ballots
                    .get(*id)
                    .map_or(false, |b| b.status == BallotStatus::Unallocated)
            })
            .cloned()
            .ok_or(StateError::PoolExhausted)?;

        let ballot = state.ballot_mut(&ballot_id)?;
        ballot.allocate(voter_id)?;
        let issued = ballot.issue();
        state.voter_mut(voter_id)?.ballot_id = Some(ballot_id.clone());

        state
            .log
            .record("allocate_ballot", Some(ballot_id.as_str()), "");
        state.persist_ballot(&ballot_id)?;
        state.persist_voter(voter_id)?;
        Ok(issued)
    }

    /// Cast `encrypted_choice` (the encoded candidate xor VQ_K1) on the voter's ballot.
    ///
    /// Only the confirmation code and the ciphertext are kept.
    pub fn cast_vote(
        &self,
        voter_id: &str,
        ballot_id: &BallotId,
        encrypted_choice: &BitString,
    ) -> Result<Receipt, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        encrypted_choice.expect_len(state.election.config.key_bits)?;
        state.ballot(ballot_id)?.check_open()?;
        let vq_k1 = {
            let voter = state.check_ballot_holder(voter_id, ballot_id)?;
            voter
                .keys
                .vq_k1
                .clone()
                .ok_or_else(|| AuthorizationError::NoVotingSession(voter_id.to_owned()))?
        };
        state.board.can_post(ballot_id)?;

        let code = {
            let candidate = state.election.decrypt_choice(encrypted_choice, &vq_k1)?;
            let ballot = state
                .ballots
                .get_mut(ballot_id)
                .ok_or_else(|| ValidationError::UnknownBallot(ballot_id.to_string()))?;
            let code = ballot.cast(&candidate, &mut state.tables)?;
            ballot.encrypted_vote = Some(encrypted_choice.clone());
            code
        };
        let entry_id = state.board.post(ballot_id, EntryType::Vote, vec![code])?;

        let voter = state.voter_mut(voter_id)?;
        voter.vote_status = VoteStatus::Voted;
        voter.receipt = Some(entry_id);
        voter.end_session();

        state.log.record("cast_vote", Some(ballot_id.as_str()), "1 code revealed");
        info!("vote cast on {}", ballot_id);
        state.commit_outcome(voter_id, ballot_id, entry_id)
    }

    /// Spoil the voter's ballot. Every code is revealed and the voter may not vote again.
    pub fn spoil_ballot(&self, voter_id: &str, ballot_id: &BallotId) -> Result<BallotDisclosure, Error> {
        self.reveal(voter_id, ballot_id, EntryType::Spoiled)
    }

    /// Audit the voter's ballot. Every code is revealed and the voter may take a new ballot.
    pub fn audit_ballot(&self, voter_id: &str, ballot_id: &BallotId) -> Result<BallotDisclosure, Error> {
        self.reveal(voter_id, ballot_id, EntryType::Audit)
    }

    fn reveal(
        &self,
        voter_id: &str,
        ballot_id: &BallotId,
        entry_type: EntryType,
    ) -> Result<BallotDisclosure, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        state.ballot(ballot_id)?.check_open()?;
        state.check_ballot_holder(voter_id, ballot_id)?;
        state.board.can_post(ballot_id)?;

        let codes = {
            let ballot = state
                .ballots
                .get_mut(ballot_id)
                .ok_or_else(|| ValidationError::UnknownBallot(ballot_id.to_string()))?;
            match entry_type {
                EntryType::Audit => ballot.audit(&mut state.tables)?,
                _ => ballot.spoil(&mut state.tables)?,
            }
        };
        let entry_id = state
            .board
            .post(ballot_id, entry_type, codes.values().cloned().collect())?;

        let voter = state.voter_mut(voter_id)?;
        match entry_type {
            EntryType::Audit => voter.ballot_id = None,
            _ => {
                voter.vote_status = VoteStatus::Spoiled;
                voter.receipt = Some(entry_id);
                voter.end_session();
            }
        }

        let operation = match entry_type {
            EntryType::Audit => "audit_ballot",
            _ => "spoil_ballot",
        };
        state.log.record(
            operation,
            Some(ballot_id.as_str()),
            format!("{} codes revealed", codes.len()),
        );
        info!("ballot {} published as {}", ballot_id, entry_type);
        let receipt = state.commit_outcome(voter_id, ballot_id, entry_id)?;
        Ok(BallotDisclosure { receipt, codes })
    }

    /// Publish the outcome of a finalized ballot that has no board entry yet.
    ///
    /// The ballot's table effect is applied again first, since the stored
    /// tables may predate the outcome. Flagging and revealing are idempotent.
    pub fn publish_entry(&self, ballot_id: &BallotId) -> Result<Receipt, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let (entry_type, codes, voter_id) = {
            let ballot = state.ballot(ballot_id)?;
            let entry_type = ballot
                .status
                .entry_type()
                .ok_or_else(|| StateError::NotFinalized(ballot_id.to_string()))?;
            (entry_type, ballot.revealed_codes(), ballot.voter_id.clone())
        };
        if codes.is_empty() {
            return Err(ConsistencyViolation::OutcomeWithoutCodes(ballot_id.to_string())
                .logged()
                .into());
        }
        state.board.can_post(ballot_id)?;

        match entry_type {
            EntryType::Vote => {
                for code in codes.iter() {
                    state.tables.flag(code)?;
                }
            }
            _ => {
                state.tables.reveal_all(ballot_id)?;
            }
        }
        let entry_id = state.board.post(ballot_id, entry_type, codes)?;

        if let Some(voter) = voter_id.as_ref().and_then(|id| state.voters.get_mut(id)) {
            match entry_type {
                EntryType::Audit => {
                    if voter.ballot_id.as_ref() == Some(ballot_id) {
                        voter.ballot_id = None;
                    }
                }
                EntryType::Vote | EntryType::Spoiled => {
                    voter.vote_status = match entry_type {
                        EntryType::Vote => VoteStatus::Voted,
                        _ => VoteStatus::Spoiled,
                    };
                    voter.ballot_id = Some(ballot_id.clone());
                    voter.receipt = Some(entry_id);
                    voter.end_session();
                }
            }
        }
        warn!("published missing {} entry for {}", entry_type, ballot_id);
        state.log.record("publish_entry", Some(ballot_id.as_str()), "");

        state.persist_tables()?;
        state.persist_entry(entry_id)?;
        state.persist_board()?;
        if let Some(voter_id) = voter_id {
            if state.voters.contains_key(&voter_id) {
                state.persist_voter(&voter_id)?;
            }
        }
        state.receipt(entry_id)
    }

    pub fn verify_receipt(&self, receipt: &Receipt) -> Result<bool, Error> {
        self.lock()?.board.verify_receipt(receipt)
    }

    /// Tally recounted from the board and checked against the live tables
    pub fn get_tally(&self) -> Result<IndexMap<String, usize>, Error> {
        let state = self.lock()?;
        state.board.tally_from_board(&state.tables)
    }

    /// Close the board. Returns false if it was already sealed.
    pub fn seal_board(&self) -> Result<bool, Error> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let sealed = state.board.seal();
        if sealed {
            state.log.record(
                "seal_board",
                None,
                format!("{} entries", state.board.entries().len()),
            );
            state.persist_board()?;
        }
        Ok(sealed)
    }

    pub fn election(&self) -> Result<Election, Error> {
        Ok(self.lock()?.election.clone())
    }

    pub fn voter(&self, voter_id: &str) -> Result<Voter, Error> {
        Ok(self.lock()?.voter(voter_id)?.clone())
    }

    pub fn voters(&self) -> Result<Vec<Voter>, Error> {
        Ok(self.lock()?.voters.values().cloned().collect())
    }

    pub fn ballot(&self, ballot_id: &BallotId) -> Result<Ballot, Error> {
        Ok(self.lock()?.ballot(ballot_id)?.clone())
    }

    pub fn entries(&self) -> Result<Vec<BulletinEntry>, Error> {
        Ok(self.lock()?.board.entries().to_vec())
    }

    pub fn is_sealed(&self) -> Result<bool, Error> {
        Ok(self.lock()?.board.is_sealed())
    }

    pub fn tables_snapshot(&self) -> Result<MixnetTableSet, Error> {
        Ok(self.lock()?.tables.clone())
    }

    /// Finalized ballots that have no board entry
    pub fn unpublished_outcomes(&self) -> Result<Vec<BallotId>, Error> {
        let state = self.lock()?;
        Ok(state
            .ballots
            .values()
            .filter(|b| b.status.is_final() && state.board.entry_for_ballot(&b.id).is_none())
            .map(|b| b.id.clone())
            .collect())
    }

    /// Election, public board and tables, for offline verification
    pub fn audit_bundle(&self) -> Result<AuditBundle, Error> {
        let state = self.lock()?;
        Ok(AuditBundle {
            election: state.election.clone(),
            board: state.board.public_view(),
            tables: state.tables.clone(),
        })
    }

    pub fn operation_log(&self) -> Result<Vec<OperationRecord>, Error> {
        Ok(self.lock()?.log.records())
    }

    pub fn clear_operation_log(&self) -> Result<(), Error> {
        self.lock()?.log.clear();
        Ok(())
    }

    /// Copy of the backing store
    pub fn store_snapshot(&self) -> Result<S, Error>
    where
        S: Clone,
    {
        Ok(self.lock()?.store.clone())
    }
}

impl<S: Store> AuthorityState<S> {
    fn voter(&self, voter_id: &str) -> Result<&Voter, ValidationError> {
        self.voters
            .get(voter_id)
            .ok_or_else(|| ValidationError::UnknownVoter(voter_id.to_owned()))
    }

    fn voter_mut(&mut self, voter_id: &str) -> Result<&mut Voter, ValidationError> {
        self.voters
            .get_mut(voter_id)
            .ok_or_else(|| ValidationError::UnknownVoter(voter_id.to_owned()))
    }

    fn ballot(&self, ballot_id: &BallotId) -> Result<&Ballot, ValidationError> {
        self.ballots
            .get(ballot_id)
            .ok_or_else(|| ValidationError::UnknownBallot(ballot_id.to_string()))
    }

    fn ballot_mut(&mut self, ballot_id: &BallotId) -> Result<&mut Ballot, ValidationError> {
        self.ballots
            .get_mut(ballot_id)
            .ok_or_else(|| ValidationError::UnknownBallot(ballot_id.to_string()))
    }

    fn check_new_voter(&self, national_id: &str) -> Result<(), StateError> {
        if self.voters.values().any(|v| v.national_id == national_id) {
            return Err(StateError::DuplicateVoter(national_id.to_owned()));
        }
        Ok(())
    }

    fn add_voter(
        &mut self,
        registration: &Registration,
        name: &str,
        national_id: &str,
    ) -> Result<(), Error> {
        if self.voters.contains_key(&registration.voter_id) {
            return Err(StateError::VoterIdCollision(registration.voter_id.clone()).into());
        }
        let voter = Voter::new(registration, name, national_id);
        self.voters.insert(voter.voter_id.clone(), voter);
        self.log
            .record("register_voter", Some(&registration.voter_id), "");
        info!("registered voter {}", registration.voter_id);
        self.persist_voter(&registration.voter_id)
    }

    /// The voter may act on `ballot_id`: known, not finished, and holding that ballot
    fn check_ballot_holder(&self, voter_id: &str, ballot_id: &BallotId) -> Result<&Voter, Error> {
        let voter = self.voter(voter_id)?;
        let ballot = self.ballot(ballot_id)?;
        if voter.vote_status.is_final() {
            return Err(AuthorizationError::AlreadyVoted(voter_id.to_owned()).into());
        }
        if ballot.voter_id.as_deref() != Some(voter_id) || voter.ballot_id.as_ref() != Some(ballot_id)
        {
            return Err(AuthorizationError::BallotNotOwned {
                voter_id: voter_id.to_owned(),
                ballot_id: ballot_id.to_string(),
            }
            .into());
        }
        Ok(voter)
    }

    fn receipt(&self, entry_id: Uuid) -> Result<Receipt, Error> {
        self.board
            .entry(entry_id)
            .map(Receipt::from)
            .ok_or_else(|| Error::from(ValidationError::UnknownEntry(entry_id)))
    }

    /// Persist everything a finalized ballot touched and return its receipt
    fn commit_outcome(
        &mut self,
        voter_id: &str,
        ballot_id: &BallotId,
        entry_id: Uuid,
    ) -> Result<Receipt, Error> {
        self.persist_ballot(ballot_id)?;
        self.persist_tables()?;
        self.persist_entry(entry_id)?;
        self.persist_voter(voter_id)?;
        self.receipt(entry_id)
    }

    fn persist_voter(&mut self, voter_id: &str) -> Result<(), Error> {
        let voter = self.voter(voter_id)?.clone();
        self.store.put_record(voter_id, Record::Voter(voter))
    }

    fn persist_ballot(&mut self, ballot_id: &BallotId) -> Result<(), Error> {
        let ballot = self.ballot(ballot_id)?.clone();
        let key = ballot_key(&self.election.id, ballot_id);
        self.store.put_record(&key, Record::Ballot(ballot))
    }

    fn persist_tables(&mut self) -> Result<(), Error> {
        let key = self.election.id.to_string();
        self.store
            .put_record(&key, Record::Tables(self.tables.clone()))
    }

    fn persist_entry(&mut self, entry_id: Uuid) -> Result<(), Error> {
        let entry = self
            .board
            .entry(entry_id)
            .cloned()
            .ok_or(ValidationError::UnknownEntry(entry_id))?;
        self.store
            .put_record(&entry_id.to_string(), Record::Entry(entry))
    }

    fn persist_board(&mut self) -> Result<(), Error> {
        let key = self.election.id.to_string();
        self.store.put_record(&key, Record::Board(self.board.state()))
    }

    fn persist_all(&mut self) -> Result<(), Error> {
        let key = self.election.id.to_string();
        self.store
            .put_record(&key, Record::Election(self.election.clone()))?;
        self.store.put_record(&key, Record::Pool(self.pool.clone()))?;
        self.persist_tables()?;
        self.persist_board()?;

        let ballot_ids: Vec<BallotId> = self.ballots.keys().cloned().collect();
        for ballot_id in ballot_ids.iter() {
            self.persist_ballot(ballot_id)?;
        }
        let voter_ids: Vec<String> = self.voters.keys().cloned().collect();
        for voter_id in voter_ids.iter() {
            self.persist_voter(voter_id)?;
        }
        let entry_ids: Vec<Uuid> = self.board.entries().iter().map(|e| e.entry_id).collect();
        for entry_id in entry_ids {
            self.persist_entry(entry_id)?;
        }
        Ok(())
    }
}
