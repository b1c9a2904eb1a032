use crate::command_verify::print_winner;
use crate::config::CliConfig;
use crate::{parse_arg, parse_candidates};
use log::info;
use quantegrity::*;

/// What a simulated voter does with their ballot
#[derive(Debug, Clone, Copy, PartialEq)]
enum Behaviour {
    Cast,
    Spoil,
    AuditThenCast,
}

pub fn command_simulate(matches: &clap::ArgMatches, config: &CliConfig) {
    let candidates = parse_candidates(matches);
    let voters: usize = parse_arg(matches, "voters", "simulate").unwrap_or(3);
    let spoil: usize = parse_arg(matches, "spoil", "simulate").unwrap_or(0);
    let audit: usize = parse_arg(matches, "audit", "simulate").unwrap_or(0);
    let pool_size: usize = parse_arg(matches, "pool", "simulate").unwrap_or(voters + audit);
    let seed: Option<u64> = parse_arg(matches, "seed", "simulate").or(config.seed);

    if spoil + audit > voters {
        eprintln!("quantegrity simulate: --spoil plus --audit cannot exceed --voters");
        std::process::exit(1);
    }
    let election_config = config.election_config().unwrap_or_else(|e| {
        eprintln!("quantegrity simulate: {}", e);
        std::process::exit(1);
    });

    let election = Election::new("Simulated Election", candidates, pool_size, election_config)
        .unwrap_or_else(|e| {
            eprintln!("quantegrity simulate: {}", e);
            std::process::exit(1);
        });

    let mut random: Box<dyn RandomSource> = match seed {
        Some(seed) => Box::new(SeededRandomSource::new(seed)),
        None => Box::new(OsRandomSource),
    };
    let collaborators = match seed {
        Some(seed) => Collaborators::seeded(seed.wrapping_add(1)),
        None => Collaborators::system(),
    };
    let authority = generate_keypair(random.as_mut())
        .and_then(|(secret, _)| {
            ElectionAuthority::create(election, &secret, collaborators, MemStore::default())
        })
        .unwrap_or_else(|e| {
            eprintln!("quantegrity simulate: unable to create election: {}", e);
            std::process::exit(1);
        });
    println!("> Election created with a pool of {} ballots", pool_size);

    for i in 0..voters {
        let behaviour = if i < spoil {
            Behaviour::Spoil
        } else if i < spoil + audit {
            Behaviour::AuditThenCast
        } else {
            Behaviour::Cast
        };
        let name = format!("Voter {}", i + 1);
        let national_id = format!("SIM-{:04}", i + 1);

        if let Err(e) = run_voter(&authority, random.as_mut(), &name, &national_id, behaviour) {
            eprintln!("quantegrity simulate: {} failed: {}", name, e);
            std::process::exit(1);
        }
    }

    if let Err(e) = authority.seal_board() {
        eprintln!("quantegrity simulate: unable to seal board: {}", e);
        std::process::exit(1);
    }
    let tally = authority.get_tally().unwrap_or_else(|e| {
        eprintln!("quantegrity simulate: {}", e);
        std::process::exit(1);
    });

    println!("Tally:");
    for (candidate, votes) in tally.iter() {
        println!("  {} got {} votes", candidate, votes);
    }
    print_winner(&tally);

    if let Some(out) = matches.value_of("out") {
        let out = crate::expand(out);
        let json = authority
            .audit_bundle()
            .and_then(|bundle| bundle.to_json())
            .unwrap_or_else(|e| {
                eprintln!("quantegrity simulate: {}", e);
                std::process::exit(1);
            });
        if let Err(e) = std::fs::write(&out, json) {
            eprintln!("quantegrity simulate: unable to write {}: {}", out, e);
            std::process::exit(1);
        }
        println!("> Audit bundle written to {}", out);
    }
}

/// Walk one voter through every stage and finish with `behaviour`.
fn run_voter(
    authority: &ElectionAuthority,
    random: &mut dyn RandomSource,
    name: &str,
    national_id: &str,
    behaviour: Behaviour,
) -> Result<(), Error> {
    let registration = authority.register_voter(name, national_id)?;
    let voter_id = registration.voter_id.as_str();

    authority.request_device_verification(voter_id, &format!("device-{}", national_id))?;
    let encrypted_otp = authority.approve_device_verification(voter_id)?;
    authority.verify_device(voter_id, &decrypt(&encrypted_otp, &registration.q_k2)?)?;

    let challenge = authority.authenticate(voter_id, &registration.biometric)?;
    let otp = decrypt(&challenge.encrypted_otp, &challenge.aq_k1)?;
    authority.verify_auth_otp(voter_id, &otp)?;
    let vq_k1 = authority.initiate_voting_session(voter_id)?;
    info!("{} ({}) has an active voting session", name, voter_id);

    let mut issued = authority.allocate_ballot(voter_id)?;
    if behaviour == Behaviour::AuditThenCast {
        let disclosure = authority.audit_ballot(voter_id, &issued.ballot_id)?;
        println!(
            "> {} audited {}: {} codes revealed",
            name,
            issued.ballot_id,
            disclosure.codes.len()
        );
        issued = authority.allocate_ballot(voter_id)?;
    }

    if behaviour == Behaviour::Spoil {
        let disclosure = authority.spoil_ballot(voter_id, &issued.ballot_id)?;
        println!(
            "> {} spoiled {}: {} codes revealed",
            name,
            issued.ballot_id,
            disclosure.codes.len()
        );
        return Ok(());
    }

    let election = authority.election()?;
    let candidate = &issued.candidates[random_index(random, issued.candidates.len())?];
    let choice = election.encrypt_choice(candidate, &vq_k1)?;
    let receipt = authority.cast_vote(voter_id, &issued.ballot_id, &choice)?;
    println!(
        "> {} cast {}: confirmation code {}",
        name, receipt.ballot_id, receipt.codes[0]
    );
    if !authority.verify_receipt(&receipt)? {
        return Err(ValidationError::UnknownEntry(receipt.entry_id).into());
    }
    Ok(())
}
