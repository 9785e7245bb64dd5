//! Command line parsing, built with `clap`'s builder API.

use std::path::PathBuf;

/// Fully-parsed command line invocation.
#[derive(Debug)]
pub struct Config {
    /// The entry `.eh` source file.
    pub input: PathBuf,
    /// Where to write the assembled image.
    pub output: PathBuf,
    /// Directories searched, in order, to resolve `include` statements.
    pub include_paths: Vec<PathBuf>,
    /// The label naming the program's entry point.
    pub entry: String,
    /// The virtual address the first segment is laid out at.
    pub memory_start: u32,
    /// Suppresses ELF header and program-header table emission.
    pub no_header: bool,
    /// The maximum depth of nested fragment expansion.
    pub max_fragment_depth: u32,
    /// The maximum depth of the include graph.
    pub max_include_depth: u32,
    /// Overrides the `e_machine` value declared by the sources.
    pub machine_override: Option<u16>,
    /// Number of times `-v`/`--verbose` was given.
    pub verbosity: u8,
}

/// Parses `std::env::args_os()` into a [`Config`], exiting the process (per
/// `clap`'s own convention, code 2) on a usage error.
pub fn parse_args() -> Config {
    let matches = command().get_matches();

    let memory_start = matches
        .get_one::<u32>("memory-start")
        .copied()
        .expect("memory-start has a default value");

    Config {
        input: matches
            .get_one::<PathBuf>("input")
            .cloned()
            .expect("input is a required argument"),
        output: matches
            .get_one::<PathBuf>("output")
            .cloned()
            .expect("output is a required argument"),
        include_paths: matches
            .get_many::<PathBuf>("include-path")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        entry: matches
            .get_one::<String>("entry")
            .cloned()
            .expect("entry has a default value"),
        memory_start,
        no_header: matches.get_flag("no-header"),
        max_fragment_depth: matches
            .get_one::<u32>("max-fragment-depth")
            .copied()
            .expect("max-fragment-depth has a default value"),
        max_include_depth: matches
            .get_one::<u32>("max-include-depth")
            .copied()
            .expect("max-include-depth has a default value"),
        machine_override: matches.get_one::<u16>("machine-override").copied(),
        verbosity: u8::try_from(matches.get_count("verbose")).unwrap_or(u8::MAX),
    }
}

/// Returns the command parser for the `elfhex` binary.
fn command() -> clap::Command {
    clap::Command::new("elfhex")
        .about("Assembles ELFHex .eh source files into an ELF32 executable")
        .arg(
            clap::Arg::new("input")
                .help("The entry .eh source file")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            clap::Arg::new("output")
                .help("Path to write the assembled image to")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            clap::Arg::new("include-path")
                .long("include-path")
                .value_name("DIR")
                .help("A directory searched to resolve `include` statements")
                .value_parser(clap::value_parser!(PathBuf))
                .action(clap::ArgAction::Append),
        )
        .arg(
            clap::Arg::new("entry")
                .long("entry")
                .value_name("LABEL")
                .help("The label naming the program's entry point")
                .default_value("_start"),
        )
        .arg(
            clap::Arg::new("memory-start")
                .long("memory-start")
                .value_name("ADDRESS")
                .help("The virtual address the first segment is laid out at")
                .value_parser(parse_address)
                .default_value("0x08000000"),
        )
        .arg(
            clap::Arg::new("no-header")
                .long("no-header")
                .help("Suppress ELF header and program-header table emission")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("max-fragment-depth")
                .long("max-fragment-depth")
                .value_name("DEPTH")
                .help("Maximum depth of nested fragment expansion")
                .value_parser(clap::value_parser!(u32))
                .default_value("64"),
        )
        .arg(
            clap::Arg::new("max-include-depth")
                .long("max-include-depth")
                .value_name("DEPTH")
                .help("Maximum depth of the include graph")
                .value_parser(clap::value_parser!(u32))
                .default_value("64"),
        )
        .arg(
            clap::Arg::new("machine-override")
                .long("machine-override")
                .value_name("MACHINE")
                .help("Overrides the e_machine value declared by the sources")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            clap::Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (repeatable)")
                .action(clap::ArgAction::Count),
        )
}

/// Parses a hex (`0x...`) or decimal address literal.
fn parse_address(text: &str) -> Result<u32, String> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|err| err.to_string())
    } else {
        text.parse().map_err(|err: std::num::ParseIntError| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal_addresses() {
        assert_eq!(parse_address("0x08000000"), Ok(0x0800_0000));
        assert_eq!(parse_address("0X1000"), Ok(0x1000));
        assert_eq!(parse_address("65536"), Ok(65536));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(parse_address("0xzz").is_err());
        assert!(parse_address("not-a-number").is_err());
    }
}
