use clap::{App, AppSettings, Arg, SubCommand};
use simplelog::{Config, LevelFilter, TermLogger, TerminalMode};

mod command_simulate;
mod command_tables;
mod command_verify;
mod config;

use command_simulate::command_simulate;
use command_tables::command_tables;
use command_verify::command_verify;
use config::CliConfig;

fn main() {
    let matches = App::new("Quantegrity CLI")
        .version("1.0")
        .about("Runs and verifies Quantegrity elections")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("Run a complete election with simulated voters")
                .arg(candidates_arg())
                .arg(
                    Arg::with_name("voters")
                        .long("voters")
                        .takes_value(true)
                        .default_value("3")
                        .help("Number of voters"),
                )
                .arg(
                    Arg::with_name("pool")
                        .long("pool")
                        .takes_value(true)
                        .help("Ballot pool size (default: voters + audits)"),
                )
                .arg(
                    Arg::with_name("spoil")
                        .long("spoil")
                        .takes_value(true)
                        .default_value("0")
                        .help("Number of voters who spoil instead of casting"),
                )
                .arg(
                    Arg::with_name("audit")
                        .long("audit")
                        .takes_value(true)
                        .default_value("0")
                        .help("Number of voters who audit a ballot before voting"),
                )
                .arg(seed_arg())
                .arg(
                    Arg::with_name("out")
                        .long("out")
                        .takes_value(true)
                        .help("Write the audit bundle to this file"),
                ),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Verify an audit bundle")
                .arg(
                    Arg::with_name("INPUT")
                        .index(1)
                        .required(true)
                        .help("Audit bundle in JSON format"),
                )
                .arg(
                    Arg::with_name("print-entries")
                        .long("print-entries")
                        .help("Print every bulletin board entry"),
                )
                .arg(
                    Arg::with_name("print-tally")
                        .long("print-tally")
                        .help("Print the tally and the winner"),
                ),
        )
        .subcommand(
            SubCommand::with_name("tables")
                .about("Generate and print the P, Q, R and S tables of a ballot pool")
                .arg(candidates_arg())
                .arg(
                    Arg::with_name("pool")
                        .long("pool")
                        .takes_value(true)
                        .default_value("3")
                        .help("Ballot pool size"),
                )
                .arg(seed_arg()),
        )
        .get_matches();

    let level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if let Err(e) = TermLogger::init(level, Config::default(), TerminalMode::Mixed) {
        eprintln!("quantegrity: unable to start logger: {}", e);
    }

    let config = CliConfig::from_env().unwrap_or_else(|e| {
        eprintln!("quantegrity: {}", e);
        std::process::exit(1);
    });

    // Subcommands
    if let Some(matches) = matches.subcommand_matches("simulate") {
        command_simulate(matches, &config);
    }
    if let Some(matches) = matches.subcommand_matches("verify") {
        command_verify(matches);
    }
    if let Some(matches) = matches.subcommand_matches("tables") {
        command_tables(matches, &config);
    }
}

fn candidates_arg() -> Arg<'static, 'static> {
    Arg::with_name("candidates")
        .long("candidates")
        .takes_value(true)
        .required(true)
        .help("Comma-separated candidate names")
}

fn seed_arg() -> Arg<'static, 'static> {
    Arg::with_name("seed")
        .long("seed")
        .takes_value(true)
        .help("Seed for reproducible runs - can also be set with QUANTEGRITY_SEED")
}

/// Expand `~` and environment variables in a path
pub fn expand(input: &str) -> String {
    match shellexpand::full(input) {
        Ok(expanded) => expanded.into_owned(),
        Err(e) => {
            eprintln!("quantegrity: unable to expand {}: {}", input, e);
            std::process::exit(1);
        }
    }
}

/// Parse a numeric argument or exit
pub fn parse_arg<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str, command: &str) -> Option<T> {
    matches.value_of(name).map(|value| {
        value.parse().unwrap_or_else(|_| {
            eprintln!("quantegrity {}: invalid --{}: {}", command, name, value);
            std::process::exit(1);
        })
    })
}

/// Split `--candidates` on commas
pub fn parse_candidates(matches: &clap::ArgMatches) -> Vec<String> {
    matches
        .value_of("candidates")
        .unwrap_or_default()
        .split(',')
        .map(|c| c.trim().to_owned())
        .collect()
}
