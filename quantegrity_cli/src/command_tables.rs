use crate::config::CliConfig;
use crate::{parse_arg, parse_candidates};
use quantegrity::*;

pub fn command_tables(matches: &clap::ArgMatches, config: &CliConfig) {
    let candidates = parse_candidates(matches);
    let pool_size: usize = parse_arg(matches, "pool", "tables").unwrap_or(3);
    let seed: Option<u64> = parse_arg(matches, "seed", "tables").or(config.seed);

    let election_config = config.election_config().unwrap_or_else(|e| {
        eprintln!("quantegrity tables: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = validate_candidates(&candidates) {
        eprintln!("quantegrity tables: {}", e);
        std::process::exit(1);
    }

    let mut random: Box<dyn RandomSource> = match seed {
        Some(seed) => Box::new(SeededRandomSource::new(seed)),
        None => Box::new(OsRandomSource),
    };
    let mut log = OperationLog::with_capacity(election_config.log_capacity);
    let tables = MixnetTableSet::generate(
        &candidates,
        pool_size,
        election_config.code_bits,
        election_config.code_draw_attempts,
        random.as_mut(),
        &mut log,
    )
    .unwrap_or_else(|e| {
        eprintln!("quantegrity tables: {}", e);
        std::process::exit(1);
    });

    println!("Table P (ballot -> candidate -> code):");
    for (ballot_id, codes) in tables.table_p() {
        let row: Vec<String> = codes
            .iter()
            .map(|(candidate, code)| format!("{}={}", candidate, code))
            .collect();
        println!("  {}: {}", ballot_id, row.join(" "));
    }

    println!("Table Q (ballot -> shuffled codes):");
    for (ballot_id, codes) in tables.table_q() {
        let row: Vec<&str> = codes.iter().map(|c| c.as_str()).collect();
        println!("  {}: {}", ballot_id, row.join(" "));
    }

    println!("Table R (code, Q pointer, S pointer, flag):");
    for row in tables.table_r() {
        println!(
            "  {} -> Q[{}][{}] S[{}][{}] flag={}",
            row.code,
            row.q_pointer.ballot_id,
            row.q_pointer.position,
            row.s_pointer.candidate,
            row.s_pointer.slot,
            row.flag
        );
    }

    println!("Table S (candidate -> slots):");
    for (candidate, slots) in tables.table_s() {
        let row: String = slots.iter().map(|s| if *s { '1' } else { '0' }).collect();
        println!("  {}: {}", candidate, row);
    }
}
