//! `elfhex`: the command-line driver for the ELFHex assembler.

mod cli;
mod extensions;
mod fs;

use std::process::ExitCode;

use elfhex_core::CompileOptions;

fn main() -> ExitCode {
    let config = cli::parse_args();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(config.verbosity)),
    )
    .init();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("elfhex: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn run(config: &cli::Config) -> anyhow::Result<()> {
    let filesystem = fs::StdFileSystem;
    let parser = elfhex_syntax::Parser::new();
    let resolver = extensions::BuiltinResolver;

    let options = CompileOptions {
        search_path: config.include_paths.clone(),
        max_include_depth: config.max_include_depth,
        max_fragment_depth: config.max_fragment_depth,
        memory_start: config.memory_start,
        entry_label: config.entry.clone(),
        suppress_header: config.no_header,
        machine_override: config.machine_override,
    };

    let image = elfhex_core::compile(&config.input, &filesystem, &parser, &resolver, &options)?;

    std::fs::write(&config.output, &image).map_err(|source| {
        anyhow::anyhow!("failed to write {}: {source}", config.output.display())
    })?;

    log::info!(
        "wrote {} ({} bytes)",
        config.output.display(),
        image.len()
    );

    Ok(())
}
