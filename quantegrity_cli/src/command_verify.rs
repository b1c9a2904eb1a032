use quantegrity::*;
use tallystick::plurality::DefaultPluralityTally;

pub fn command_verify(matches: &clap::ArgMatches) {
    let filename = crate::expand(matches.value_of("INPUT").unwrap_or_default());

    let json = match std::fs::read_to_string(&filename) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("quantegrity verify: unable to read {}: {}", filename, e);
            std::process::exit(1);
        }
    };
    let bundle = AuditBundle::from_json(&json).unwrap_or_else(|e| {
        eprintln!("quantegrity verify: unable to parse {}: {}", filename, e);
        std::process::exit(1);
    });

    match bundle.board.verify_all() {
        Ok(tampered) if tampered.is_empty() => {}
        Ok(tampered) => {
            for entry_id in tampered {
                eprintln!("quantegrity verify: entry {} failed verification", entry_id);
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("quantegrity verify: {}", e);
            std::process::exit(1);
        }
    }

    let tally = bundle.verify().unwrap_or_else(|e| {
        eprintln!("quantegrity verify: {}", e);
        std::process::exit(1);
    });

    println!(
        "> Election {} verified OK ({} entries)",
        bundle.election.name,
        bundle.board.entries().len()
    );

    if matches.is_present("print-entries") {
        println!("Entries:");
        for entry in bundle.board.entries() {
            let codes: Vec<&str> = entry.codes.iter().map(|c| c.as_str()).collect();
            println!(
                "  #{} {} {} [{}]",
                entry.sequence,
                entry.entry_type,
                entry.ballot_id,
                codes.join(" ")
            );
        }
    }

    if matches.is_present("print-tally") {
        println!("Tally:");
        for (candidate, votes) in tally.iter() {
            println!("  {} got {} votes", candidate, votes);
        }
        print_winner(&tally);
    }
}

/// Plurality winner of a recounted tally
pub fn print_winner(tally: &indexmap::IndexMap<String, usize>) {
    let mut plurality = DefaultPluralityTally::new(1);
    for (candidate, votes) in tally.iter() {
        for _ in 0..*votes {
            plurality.add(candidate.clone());
        }
    }

    let winners = plurality.winners().into_unranked();
    match winners.len() {
        0 => println!("  No votes were cast"),
        1 => println!("  The winner is {}", winners[0]),
        _ => println!("  Tie between {}", winners.join(", ")),
    }
}
