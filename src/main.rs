//! ghgen CLI - generates the GitHub Actions workflows of this repository

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use ghgen::config::{Config, CONFIG_FILE};
use ghgen::generate::{select, Definition, Generator};
use ghgen::workflows::DEFINITIONS;
use ghgen::{FixSuggestion, GhgenError};

#[derive(Parser)]
#[command(name = "ghgen")]
#[command(about = "Generate GitHub Actions workflows from Rust code")]
#[command(version)]
struct Cli {
    /// Workflows to generate (all of them when omitted)
    workflows: Vec<String>,

    /// Configuration file
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Override the configured output directory
    #[arg(short = 'D', long)]
    output_directory: Option<PathBuf>,

    /// Report out-of-date workflows instead of writing them
    #[arg(long)]
    check: bool,

    /// Print workflows as JSON lines instead of writing them
    #[arg(long, conflicts_with = "check")]
    json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy)]
enum Mode {
    Write,
    Check,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let (generator, selected) = match prepare(&cli) {
        Ok(prepared) => prepared,
        Err(e) => {
            report(&e.into());
            return ExitCode::from(2);
        }
    };

    let mode = if cli.json {
        Mode::Json
    } else if cli.check {
        Mode::Check
    } else {
        Mode::Write
    };

    let mut failed = 0;
    for definition in &selected {
        if let Err(e) = generate(&generator, definition, mode) {
            report(&e);
            failed += 1;
        }
    }

    if failed > 0 {
        eprintln!(
            "{} {} of {} workflow(s) failed",
            "✗".red(),
            failed,
            selected.len()
        );
        return ExitCode::FAILURE;
    }
    match mode {
        Mode::Write => println!("{} {} workflow(s) generated", "✓".green(), selected.len()),
        Mode::Check => println!("{} {} workflow(s) up to date", "✓".green(), selected.len()),
        Mode::Json => {}
    }
    ExitCode::SUCCESS
}

fn prepare(cli: &Cli) -> Result<(Generator, Vec<&'static Definition>), GhgenError> {
    let mut config = Config::load(&cli.config)?;
    if let Some(directory) = &cli.output_directory {
        config.output_directory = Some(directory.clone());
    }
    let generator = Generator::from_config(&config)?;
    let selected = select(DEFINITIONS, &cli.workflows)?;
    Ok((generator, selected))
}

fn generate(generator: &Generator, definition: &Definition, mode: Mode) -> anyhow::Result<()> {
    match mode {
        Mode::Write => {
            let path = generator.write(definition)?;
            println!("{} {}", "→".cyan(), path.display());
        }
        Mode::Check => {
            generator.check(definition)?;
        }
        Mode::Json => println!("{}", generator.to_json(definition)?),
    }
    Ok(())
}

fn report(e: &anyhow::Error) {
    let Some(error) = e.downcast_ref::<GhgenError>() else {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        return;
    };
    if let GhgenError::OutOfDate { diff, .. } = error {
        print!("{diff}");
    }
    eprintln!("{} {}", "Error:".red().bold(), error);
    if let Some(suggestion) = error.fix_suggestion() {
        eprintln!("  {} {}", "Fix:".yellow(), suggestion);
    }
}
