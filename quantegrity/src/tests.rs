use super::*;
use ed25519_dalek::SecretKey;
use std::sync::Arc;
use std::thread;

fn new_authority(pool_size: usize, seed: u64) -> (ElectionAuthority, SecretKey) {
    let candidates = vec!["Alice".to_owned(), "Bob".to_owned()];
    let election =
        Election::new("Test Election", candidates, pool_size, ElectionConfig::default()).unwrap();
    let (secret, _) = generate_keypair(&mut SeededRandomSource::new(seed)).unwrap();
    let authority = ElectionAuthority::create(
        election,
        &secret,
        Collaborators::seeded(seed),
        MemStore::default(),
    )
    .unwrap();
    (authority, secret)
}

struct Session {
    registration: Registration,
    vq_k1: BitString,
}

impl Session {
    fn voter_id(&self) -> &str {
        &self.registration.voter_id
    }
}

fn verify_device(authority: &ElectionAuthority, registration: &Registration) {
    let voter_id = &registration.voter_id;
    authority
        .request_device_verification(voter_id, "phone-1")
        .unwrap();
    let encrypted = authority.approve_device_verification(voter_id).unwrap();
    let otp = decrypt(&encrypted, &registration.q_k2).unwrap();
    authority.verify_device(voter_id, &otp).unwrap();
}

fn open_session(authority: &ElectionAuthority, name: &str, national_id: &str) -> Session {
    let registration = authority.register_voter(name, national_id).unwrap();
    verify_device(authority, &registration);

    let voter_id = &registration.voter_id;
    let challenge = authority
        .authenticate(voter_id, &registration.biometric)
        .unwrap();
    let otp = decrypt(&challenge.encrypted_otp, &challenge.aq_k1).unwrap();
    authority.verify_auth_otp(voter_id, &otp).unwrap();
    let vq_k1 = authority.initiate_voting_session(voter_id).unwrap();

    Session {
        registration,
        vq_k1,
    }
}

fn cast(authority: &ElectionAuthority, session: &Session, candidate: &str) -> Receipt {
    let issued = authority.allocate_ballot(session.voter_id()).unwrap();
    let choice = authority
        .election()
        .unwrap()
        .encrypt_choice(candidate, &session.vq_k1)
        .unwrap();
    authority
        .cast_vote(session.voter_id(), &issued.ballot_id, &choice)
        .unwrap()
}

#[test]
fn end_to_end_election() {
    let (authority, _) = new_authority(3, 1);

    let alice_voter = open_session(&authority, "Ada", "NID-1");
    let spoiler = open_session(&authority, "Grace", "NID-2");

    // Cast a vote
    let receipt = cast(&authority, &alice_voter, "Alice");
    assert_eq!(receipt.entry_type, EntryType::Vote);
    assert_eq!(receipt.codes.len(), 1);
    assert!(authority.verify_receipt(&receipt).unwrap());

    let ballot = authority.ballot(&receipt.ballot_id).unwrap();
    assert_eq!(ballot.status, BallotStatus::Cast);
    assert_eq!(ballot.confirmation_code.as_ref(), Some(&ballot.codes["Alice"]));
    assert!(ballot.encrypted_vote.is_some());

    // Spoil a second ballot
    let issued = authority.allocate_ballot(spoiler.voter_id()).unwrap();
    let disclosure = authority
        .spoil_ballot(spoiler.voter_id(), &issued.ballot_id)
        .unwrap();
    assert_eq!(disclosure.codes.len(), 2);
    assert_eq!(disclosure.receipt.entry_type, EntryType::Spoiled);
    assert_eq!(
        disclosure.codes,
        authority.ballot(&issued.ballot_id).unwrap().codes
    );

    // Spoiling does not change the tally
    let tally = authority.get_tally().unwrap();
    assert_eq!(tally["Alice"], 1);
    assert_eq!(tally["Bob"], 0);

    // Both voters are done
    let err = authority.allocate_ballot(spoiler.voter_id()).unwrap_err();
    assert!(matches!(err, Error::Authorization(AuthorizationError::AlreadyVoted(_))));
    assert_eq!(
        authority.voter(alice_voter.voter_id()).unwrap().vote_status,
        VoteStatus::Voted
    );

    // Tampered receipts do not verify
    let mut forged = receipt.clone();
    forged.codes = disclosure.codes.values().cloned().collect();
    assert!(!authority.verify_receipt(&forged).unwrap());

    // Offline verification of the published record
    let bundle = authority.audit_bundle().unwrap();
    let bundle = AuditBundle::from_json(&bundle.to_json().unwrap()).unwrap();
    assert_eq!(bundle.verify().unwrap(), tally);
    assert_eq!(bundle.board.entries().len(), 2);
}

#[test]
fn stages_are_strictly_ordered() {
    let (authority, _) = new_authority(2, 2);
    let registration = authority.register_voter("Ada", "NID-1").unwrap();
    let voter_id = registration.voter_id.as_str();
    let stage = || authority.voter(voter_id).unwrap().stage();
    assert_eq!(stage(), VoterStage::Registered);

    let err = authority.approve_device_verification(voter_id).unwrap_err();
    assert!(matches!(
        err,
        Error::Authorization(AuthorizationError::DeviceNotRequested(_))
    ));
    let err = authority
        .authenticate(voter_id, &registration.biometric)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Authorization(AuthorizationError::DeviceNotVerified(_))
    ));
    let err = authority.initiate_voting_session(voter_id).unwrap_err();
    assert!(matches!(
        err,
        Error::Authorization(AuthorizationError::NotAuthenticated(_))
    ));
    let err = authority.allocate_ballot(voter_id).unwrap_err();
    assert!(matches!(
        err,
        Error::Authorization(AuthorizationError::NoVotingSession(_))
    ));
    assert_eq!(stage(), VoterStage::Registered);

    authority
        .request_device_verification(voter_id, "phone-1")
        .unwrap();
    assert_eq!(stage(), VoterStage::DeviceRequested);
    let encrypted = authority.approve_device_verification(voter_id).unwrap();
    let otp = decrypt(&encrypted, &registration.q_k2).unwrap();

    // A wrong OTP is rejected and the right one still works
    let err = authority
        .verify_device(voter_id, &otp.with_flipped_bit(3).unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(AuthorizationError::OtpMismatch)));
    authority.verify_device(voter_id, &otp).unwrap();
    assert_eq!(stage(), VoterStage::DeviceVerified);

    let err = authority.verify_auth_otp(voter_id, &otp).unwrap_err();
    assert!(matches!(
        err,
        Error::Authorization(AuthorizationError::NotAuthenticated(_))
    ));

    let challenge = authority
        .authenticate(voter_id, &registration.biometric)
        .unwrap();
    assert_eq!(stage(), VoterStage::BiometricAuthenticated);
    let err = authority.initiate_voting_session(voter_id).unwrap_err();
    assert!(matches!(
        err,
        Error::Authorization(AuthorizationError::NotAuthenticated(_))
    ));

    let otp = decrypt(&challenge.encrypted_otp, &challenge.aq_k1).unwrap();
    authority.verify_auth_otp(voter_id, &otp).unwrap();
    assert_eq!(stage(), VoterStage::Authenticated);

    let vq_k1 = authority.initiate_voting_session(voter_id).unwrap();
    assert_eq!(stage(), VoterStage::VotingSessionActive);
    assert_eq!(vq_k1.len(), 16);
    assert_eq!(authority.voter(voter_id).unwrap().keys.vq_k1, Some(vq_k1.clone()));

    // Re-allocating hands back the open ballot
    let first = authority.allocate_ballot(voter_id).unwrap();
    let again = authority.allocate_ballot(voter_id).unwrap();
    assert_eq!(first, again);
}

#[test]
fn flipped_biometric_bit_is_rejected() {
    let (authority, _) = new_authority(2, 3);
    let registration = authority.register_voter("Ada", "NID-1").unwrap();
    verify_device(&authority, &registration);
    assert_eq!(registration.biometric.len(), 16);

    for bit in 0..16 {
        let flipped = registration.biometric.with_flipped_bit(bit).unwrap();
        let err = authority
            .authenticate(&registration.voter_id, &flipped)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Authorization(AuthorizationError::BiometricMismatch)
        ));
    }
    let voter = authority.voter(&registration.voter_id).unwrap();
    assert_eq!(voter.stage(), VoterStage::DeviceVerified);
    assert!(voter.keys.aq_k1.is_none());

    // Wrong width is a validation failure
    let err = authority
        .authenticate(&registration.voter_id, &BitString::zeros(8))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::WrongLength { .. })));

    authority
        .authenticate(&registration.voter_id, &registration.biometric)
        .unwrap();
}

#[test]
fn registration_rules() {
    let (authority, _) = new_authority(2, 4);
    authority.register_voter("Ada", "NID-1").unwrap();

    let err = authority.register_voter("Ada Again", "NID-1").unwrap_err();
    assert!(matches!(err, Error::State(StateError::DuplicateVoter(_))));

    let err = authority.register_voter("", "NID-2").unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::EmptyIdentity)));

    let key = BitString::from_u64(0xBEEF, 16).unwrap();
    let registration = authority
        .register_voter_with_keys("Grace", "NID-3", key.clone(), key.clone(), key.clone())
        .unwrap();
    assert_eq!(registration.encrypted_q_k1, BitString::zeros(16));

    let err = authority
        .register_voter_with_keys("Linus", "NID-4", BitString::zeros(8), key.clone(), key)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::WrongLength { .. })));

    let err = authority.voter("nobody").unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::UnknownVoter(_))));
    assert_eq!(authority.voters().unwrap().len(), 2);
}

#[test]
fn audit_releases_the_voter() {
    let (authority, _) = new_authority(3, 5);
    let session = open_session(&authority, "Ada", "NID-1");

    let issued = authority.allocate_ballot(session.voter_id()).unwrap();
    let disclosure = authority
        .audit_ballot(session.voter_id(), &issued.ballot_id)
        .unwrap();
    assert_eq!(disclosure.receipt.entry_type, EntryType::Audit);
    assert_eq!(disclosure.codes.len(), 2);
    assert_eq!(
        authority.ballot(&issued.ballot_id).unwrap().status,
        BallotStatus::Audited
    );

    // The voter takes a fresh ballot and votes
    let receipt = cast(&authority, &session, "Bob");
    assert_ne!(receipt.ballot_id, issued.ballot_id);
    assert_eq!(authority.get_tally().unwrap()["Bob"], 1);

    let err = authority
        .audit_ballot(session.voter_id(), &receipt.ballot_id)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::AlreadyFinalized(_, BallotStatus::Cast))
    ));
}

#[test]
fn one_outcome_per_ballot() {
    let (authority, _) = new_authority(3, 6);
    let owner = open_session(&authority, "Ada", "NID-1");
    let other = open_session(&authority, "Grace", "NID-2");

    let issued = authority.allocate_ballot(owner.voter_id()).unwrap();
    let election = authority.election().unwrap();

    // Only the holder may act on a ballot
    let choice = election.encrypt_choice("Alice", &other.vq_k1).unwrap();
    let err = authority
        .cast_vote(other.voter_id(), &issued.ballot_id, &choice)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Authorization(AuthorizationError::BallotNotOwned { .. })
    ));

    let choice = election.encrypt_choice("Alice", &owner.vq_k1).unwrap();
    authority
        .cast_vote(owner.voter_id(), &issued.ballot_id, &choice)
        .unwrap();

    // Casting ends the voting session
    let voter = authority.voter(owner.voter_id()).unwrap();
    assert_eq!(voter.stage(), VoterStage::DeviceVerified);
    assert!(voter.keys.vq_k1.is_none());
    assert!(voter.keys.aq_k1.is_none());

    // An audited ballot is just as final
    let audited = authority.allocate_ballot(other.voter_id()).unwrap();
    authority
        .audit_ballot(other.voter_id(), &audited.ballot_id)
        .unwrap();
    let other_choice = election.encrypt_choice("Bob", &other.vq_k1).unwrap();

    let cast_id = &issued.ballot_id;
    let audited_id = &audited.ballot_id;
    let finalized = vec![
        (
            authority.cast_vote(owner.voter_id(), cast_id, &choice),
            cast_id,
            BallotStatus::Cast,
        ),
        (
            authority.spoil_ballot(owner.voter_id(), cast_id).map(|d| d.receipt),
            cast_id,
            BallotStatus::Cast,
        ),
        (
            authority.audit_ballot(owner.voter_id(), cast_id).map(|d| d.receipt),
            cast_id,
            BallotStatus::Cast,
        ),
        (
            authority.cast_vote(other.voter_id(), audited_id, &other_choice),
            audited_id,
            BallotStatus::Audited,
        ),
        (
            authority.spoil_ballot(other.voter_id(), audited_id).map(|d| d.receipt),
            audited_id,
            BallotStatus::Audited,
        ),
        (
            authority.audit_ballot(other.voter_id(), audited_id).map(|d| d.receipt),
            audited_id,
            BallotStatus::Audited,
        ),
    ];
    for (result, ballot_id, status) in finalized {
        match result.unwrap_err() {
            Error::State(e) => {
                assert_eq!(e, StateError::AlreadyFinalized(ballot_id.to_string(), status))
            }
            e => panic!("unexpected error: {}", e),
        }
    }

    // A finalized ballot already has its entry
    let err = authority.publish_entry(&issued.ballot_id).unwrap_err();
    assert!(matches!(err, Error::State(StateError::DuplicatePublication(_))));
    assert_eq!(authority.entries().unwrap().len(), 2);
    assert_eq!(authority.get_tally().unwrap()["Alice"], 1);
}

#[test]
fn undecodable_choice_is_rejected() {
    let (authority, _) = new_authority(2, 7);
    let session = open_session(&authority, "Ada", "NID-1");
    let issued = authority.allocate_ballot(session.voter_id()).unwrap();

    // Encodes index 0, which names no candidate
    let choice = xor(&BitString::zeros(16), &session.vq_k1).unwrap();
    let err = authority
        .cast_vote(session.voter_id(), &issued.ballot_id, &choice)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = authority
        .cast_vote(session.voter_id(), &issued.ballot_id, &BitString::zeros(4))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::WrongLength { .. })));

    let ballot = authority.ballot(&issued.ballot_id).unwrap();
    assert_eq!(ballot.status, BallotStatus::Allocated);
    assert_eq!(authority.tables_snapshot().unwrap().tally()["Alice"], 0);
}

#[test]
fn sealed_board_rejects_posts() {
    let (authority, _) = new_authority(3, 8);
    let session = open_session(&authority, "Ada", "NID-1");
    let issued = authority.allocate_ballot(session.voter_id()).unwrap();

    let err = authority.publish_entry(&issued.ballot_id).unwrap_err();
    assert!(matches!(err, Error::State(StateError::NotFinalized(_))));

    assert!(authority.seal_board().unwrap());
    assert!(!authority.seal_board().unwrap());
    assert!(authority.is_sealed().unwrap());

    let choice = authority
        .election()
        .unwrap()
        .encrypt_choice("Bob", &session.vq_k1)
        .unwrap();
    let err = authority
        .cast_vote(session.voter_id(), &issued.ballot_id, &choice)
        .unwrap_err();
    assert!(matches!(err, Error::State(StateError::BoardSealed)));

    // Nothing was committed
    assert_eq!(
        authority.ballot(&issued.ballot_id).unwrap().status,
        BallotStatus::Allocated
    );
    assert_eq!(authority.tables_snapshot().unwrap().tally()["Bob"], 0);
    assert_eq!(
        authority.voter(session.voter_id()).unwrap().vote_status,
        VoteStatus::NotVoted
    );
    assert!(authority.entries().unwrap().is_empty());
}

#[test]
fn pool_exhaustion() {
    let (authority, _) = new_authority(1, 9);
    let first = open_session(&authority, "Ada", "NID-1");
    let second = open_session(&authority, "Grace", "NID-2");

    authority.allocate_ballot(first.voter_id()).unwrap();
    let err = authority.allocate_ballot(second.voter_id()).unwrap_err();
    assert!(matches!(err, Error::State(StateError::PoolExhausted)));
}

#[test]
fn concurrent_voters() {
    let (authority, _) = new_authority(8, 10);
    let authority = Arc::new(authority);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let authority = authority.clone();
            thread::spawn(move || {
                let session =
                    open_session(&authority, &format!("Voter {}", i), &format!("NID-{}", i));
                let candidate = if i % 2 == 0 { "Alice" } else { "Bob" };
                cast(&authority, &session, candidate)
            })
        })
        .collect();
    let receipts: Vec<Receipt> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut ballots: Vec<_> = receipts.iter().map(|r| r.ballot_id.clone()).collect();
    ballots.sort();
    ballots.dedup();
    assert_eq!(ballots.len(), 8);

    let mut sequences: Vec<u64> = authority
        .entries()
        .unwrap()
        .iter()
        .map(|e| e.sequence)
        .collect();
    sequences.sort();
    assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());

    let tally = authority.get_tally().unwrap();
    assert_eq!(tally["Alice"], 4);
    assert_eq!(tally["Bob"], 4);
    for receipt in receipts.iter() {
        assert!(authority.verify_receipt(receipt).unwrap());
    }
}

struct SkewedAgreement;

impl KeyAgreement for SkewedAgreement {
    fn derive(&mut self, a: &BitString, _b: &BitString) -> Result<(BitString, BitString), Error> {
        Ok((a.clone(), a.with_flipped_bit(0)?))
    }
}

#[test]
fn key_agreement_mismatch_is_fatal() {
    let election = Election::new(
        "Test Election",
        vec!["Alice".to_owned(), "Bob".to_owned()],
        2,
        ElectionConfig::default(),
    )
    .unwrap();
    let (secret, _) = generate_keypair(&mut SeededRandomSource::new(11)).unwrap();
    let collaborators = Collaborators::seeded(11).with_agreement(Box::new(SkewedAgreement));
    let authority =
        ElectionAuthority::create(election, &secret, collaborators, MemStore::default()).unwrap();

    let registration = authority.register_voter("Ada", "NID-1").unwrap();
    verify_device(&authority, &registration);
    let err = authority
        .authenticate(&registration.voter_id, &registration.biometric)
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(!err.is_retryable());
    assert!(matches!(
        err,
        Error::Consistency(ConsistencyViolation::KeyAgreementMismatch(_))
    ));

    let voter = authority.voter(&registration.voter_id).unwrap();
    assert_eq!(voter.stage(), VoterStage::DeviceVerified);
    assert!(voter.keys.aq_k1.is_none());
}

#[test]
fn restore_repairs_torn_write() {
    let (authority, secret) = new_authority(3, 12);
    let session = open_session(&authority, "Ada", "NID-1");
    let receipt = cast(&authority, &session, "Alice");
    let election_id = authority.election().unwrap().id;

    // Lose the board entry, as if the process died between the two writes
    let mut store = authority.store_snapshot().unwrap();
    store
        .remove(Collection::Entries, &receipt.entry_id.to_string())
        .unwrap();
    let store = MemStore::from_json(&store.to_json().unwrap()).unwrap();

    let (restored, report) =
        ElectionAuthority::restore(store, &election_id, &secret, Collaborators::seeded(13))
            .unwrap();
    assert_eq!(report.voters, 1);
    assert_eq!(report.ballots, 3);
    assert_eq!(report.entries, 0);
    assert_eq!(report.unpublished, vec![receipt.ballot_id.clone()]);
    assert_eq!(
        restored.unpublished_outcomes().unwrap(),
        vec![receipt.ballot_id.clone()]
    );

    // The live tables count a vote the board does not show
    let err = restored.get_tally().unwrap_err();
    assert!(err.is_fatal());

    let repaired = restored.publish_entry(&receipt.ballot_id).unwrap();
    assert_eq!(repaired.codes, receipt.codes);
    assert!(restored.unpublished_outcomes().unwrap().is_empty());
    assert_eq!(restored.get_tally().unwrap()["Alice"], 1);
    assert_eq!(
        restored.voter(session.voter_id()).unwrap().receipt,
        Some(repaired.entry_id)
    );

    let err = restored.publish_entry(&receipt.ballot_id).unwrap_err();
    assert!(matches!(err, Error::State(StateError::DuplicatePublication(_))));
}

#[test]
fn restore_replays_the_table_flags() {
    let (authority, secret) = new_authority(3, 18);
    let session = open_session(&authority, "Ada", "NID-1");
    let spoiler = open_session(&authority, "Grace", "NID-2");
    let election_id = authority.election().unwrap().id;
    let before = authority.store_snapshot().unwrap();

    let receipt = cast(&authority, &session, "Alice");
    let issued = authority.allocate_ballot(spoiler.voter_id()).unwrap();
    let disclosure = authority
        .spoil_ballot(spoiler.voter_id(), &issued.ballot_id)
        .unwrap();

    // Only the ballot records made it to disk: tables, entries and voters are stale
    let mut store = before;
    for ballot_id in vec![&receipt.ballot_id, &issued.ballot_id] {
        let ballot = authority.ballot(ballot_id).unwrap();
        store
            .put_record(&ballot_key(&election_id, ballot_id), Record::Ballot(ballot))
            .unwrap();
    }

    let (restored, report) =
        ElectionAuthority::restore(store, &election_id, &secret, Collaborators::seeded(19))
            .unwrap();
    assert_eq!(
        report.unpublished,
        vec![receipt.ballot_id.clone(), issued.ballot_id.clone()]
    );
    let stale = restored.tables_snapshot().unwrap();
    assert_eq!(stale.is_flagged(&receipt.codes[0]), Some(false));
    assert_eq!(stale.tally()["Alice"], 0);

    restored.publish_entry(&receipt.ballot_id).unwrap();
    restored.publish_entry(&issued.ballot_id).unwrap();

    let tables = restored.tables_snapshot().unwrap();
    assert_eq!(tables.is_flagged(&receipt.codes[0]), Some(true));
    for code in disclosure.codes.values() {
        assert_eq!(tables.is_flagged(code), Some(true));
    }
    let tally = restored.get_tally().unwrap();
    assert_eq!(tally["Alice"], 1);
    assert_eq!(tally["Bob"], 0);
    assert_eq!(restored.audit_bundle().unwrap().verify().unwrap(), tally);

    let voter = restored.voter(session.voter_id()).unwrap();
    assert_eq!(voter.vote_status, VoteStatus::Voted);
    assert!(voter.keys.vq_k1.is_none());
    assert_eq!(
        restored.voter(spoiler.voter_id()).unwrap().vote_status,
        VoteStatus::Spoiled
    );

    // The repaired tables were written back
    let store = restored.store_snapshot().unwrap();
    assert_eq!(store.get_tables(&election_id).unwrap(), Some(tables));
}

#[test]
fn cast_record_without_its_code_is_fatal() {
    let (authority, secret) = new_authority(2, 20);
    let session = open_session(&authority, "Ada", "NID-1");
    let issued = authority.allocate_ballot(session.voter_id()).unwrap();
    let election_id = authority.election().unwrap().id;

    let mut ballot = authority.ballot(&issued.ballot_id).unwrap();
    ballot.status = BallotStatus::Cast;
    let mut store = authority.store_snapshot().unwrap();
    store
        .put_record(&ballot_key(&election_id, &issued.ballot_id), Record::Ballot(ballot))
        .unwrap();

    let (restored, report) =
        ElectionAuthority::restore(store, &election_id, &secret, Collaborators::seeded(21))
            .unwrap();
    assert_eq!(report.unpublished, vec![issued.ballot_id.clone()]);
    let err = restored.publish_entry(&issued.ballot_id).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        Error::Consistency(ConsistencyViolation::OutcomeWithoutCodes(_))
    ));
    assert!(restored.entries().unwrap().is_empty());
    assert_eq!(restored.tables_snapshot().unwrap().tally()["Alice"], 0);
}

#[test]
fn restore_needs_the_board_key() {
    let (authority, _) = new_authority(2, 14);
    let election_id = authority.election().unwrap().id;
    let store = authority.store_snapshot().unwrap();

    let (other, _) = generate_keypair(&mut SeededRandomSource::new(99)).unwrap();
    let err = ElectionAuthority::restore(
        store.clone(),
        &election_id,
        &other,
        Collaborators::seeded(1),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::SigningKeyMismatch)
    ));

    let err = ElectionAuthority::restore(
        store,
        &uuid::Uuid::new_v4(),
        &other,
        Collaborators::seeded(1),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::UnknownElection(_))
    ));
}

#[test]
fn restored_voters_keep_their_progress() {
    let (authority, secret) = new_authority(3, 15);
    let session = open_session(&authority, "Ada", "NID-1");
    let election_id = authority.election().unwrap().id;

    let store = authority.store_snapshot().unwrap();
    let (restored, report) =
        ElectionAuthority::restore(store, &election_id, &secret, Collaborators::seeded(16))
            .unwrap();
    assert!(report.unpublished.is_empty());

    // The session survives, so the voter can carry on
    let receipt = cast(&restored, &session, "Bob");
    assert!(restored.verify_receipt(&receipt).unwrap());
    assert_eq!(restored.get_tally().unwrap()["Bob"], 1);
}

#[test]
fn operation_log_is_bounded() {
    let candidates = vec!["Alice".to_owned(), "Bob".to_owned()];
    let config = ElectionConfig {
        log_capacity: 5,
        ..ElectionConfig::default()
    };
    let election = Election::new("Test Election", candidates, 2, config).unwrap();
    let (secret, _) = generate_keypair(&mut SeededRandomSource::new(17)).unwrap();
    let authority = ElectionAuthority::create(
        election,
        &secret,
        Collaborators::seeded(17),
        MemStore::default(),
    )
    .unwrap();

    open_session(&authority, "Ada", "NID-1");
    let records = authority.operation_log().unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(records.last().unwrap().operation, "initiate_voting_session");
    assert!(records.windows(2).all(|w| w[0].sequence < w[1].sequence));

    authority.clear_operation_log().unwrap();
    assert!(authority.operation_log().unwrap().is_empty());
}
