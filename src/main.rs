use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect};
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::{debug, info};

use organ_match::{
    parse_request, Config, JsonFileStore, Organ, OrganSize, OrganStatus, PersonBase, PersonDetails,
    RecipientProfile, Registry, RegistryError, ReportFormat, ReportWriter, ResponseClass,
};

/// Organ donor registry and compatibility matcher
#[derive(Parser, Debug)]
#[command(
    name = "organ-match",
    version,
    about = "Organ donor registry with donor/recipient compatibility checks",
    long_about = r#"
Registers organ donors and checks them against recipient profiles:
- Donor registration (demographics, organ sizes, organ availability)
- Availability listing by organ
- Compatibility check: availability, infection, gender, blood type,
  HLA typing, age proximity and organ size tolerance
- Screening of the whole donor pool for one recipient
"#
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Donor store file (overrides the config file)
    #[arg(long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath, env = "ORGAN_MATCH_STORE")]
    store: Option<PathBuf>,

    /// Configuration file (defaults to ./organ-match.toml when present)
    #[arg(long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, global = true, default_value = "0")]
    threads: usize,

    /// Enable verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Generate shell completions
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a donor from a JSON file or interactive prompts
    Register {
        /// Person details JSON ({"person": .., "organ_size": .., "organ_status": ..})
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, required_unless_present = "interactive")]
        file: Option<PathBuf>,

        /// Prompt for every field
        #[arg(short, long, conflicts_with = "file")]
        interactive: bool,
    },
    /// List donors with an organ available
    Available {
        /// Organ flag name (cornea, kidney, liver, heart, lungs, pancreas, intestine)
        organ: String,
    },
    /// Check one donor against a recipient profile
    Check {
        /// Donor id
        donor_id: u64,

        /// Organ to check
        #[arg(long)]
        organ: String,

        /// Recipient profile JSON
        #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        recipient: PathBuf,
    },
    /// Check every registered donor against a recipient profile
    Screen {
        /// Organ to check
        #[arg(long)]
        organ: String,

        /// Recipient profile JSON
        #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        recipient: PathBuf,
    },
    /// List organ names and their size fields
    Organs,
    /// Generate shell completions
    Completions { shell: Shell },
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
    Tsv,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> ReportFormat {
        match format {
            OutputFormat::Table => ReportFormat::Table,
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::Csv => ReportFormat::Csv,
            OutputFormat::Tsv => ReportFormat::Tsv,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let format: ReportFormat = cli.format.into();

    if let Err(err) = run(cli) {
        process::exit(report_error(&err, format));
    }
}

fn run(cli: Cli) -> Result<()> {
    // Handle shell completions
    if let Some(shell) = cli.completions {
        generate_completions(shell);
        return Ok(());
    }

    let command = match cli.command {
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
            return Ok(());
        }
        Some(Commands::Organs) => {
            let mut writer = ReportWriter::new(io::stdout().lock(), cli.format.into());
            writer.write_organs()?;
            return Ok(());
        }
        Some(command) => command,
        None => return Ok(()),
    };

    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    init_logging(cli.verbose, &config.logging.level);

    // Initialize thread pool
    init_thread_pool(cli.threads)?;

    let store_path = cli.store.clone().unwrap_or_else(|| config.store.path.clone());
    debug!("Using donor store {}", store_path.display());

    let store = JsonFileStore::open(&store_path)
        .with_context(|| format!("Failed to open donor store {}", store_path.display()))?;
    let registry = Registry::with_policy(store, config.matching);

    let mut writer = ReportWriter::new(io::stdout().lock(), cli.format.into());

    match command {
        Commands::Register { file, interactive } => {
            let details = if interactive {
                prompt_person_details()?
            } else {
                let path = file.context("--file is required unless --interactive is set")?;
                read_json::<PersonDetails>(&path)?
            };

            let id = registry.add_person(details)?;
            writer.write_registration(id)?;
        }
        Commands::Available { organ } => {
            let report = registry.availability(&organ)?;
            writer.write_availability(&report)?;
        }
        Commands::Check {
            donor_id,
            organ,
            recipient,
        } => {
            let recipient: RecipientProfile = read_json(&recipient)?;
            let verdict = registry.compatibility(donor_id, &organ, &recipient)?;
            writer.write_verdict(donor_id, &organ, &verdict)?;
        }
        Commands::Screen { organ, recipient } => {
            let recipient: RecipientProfile = read_json(&recipient)?;

            let pb = ProgressBar::new_spinner();
            if matches!(cli.format, OutputFormat::Table) {
                pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
                pb.set_message(format!(
                    "Screening {} donors...",
                    registry.store().len()
                ));
                pb.enable_steady_tick(Duration::from_millis(80));
            } else {
                pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
            }

            let report = registry.screen(&organ, &recipient);
            pb.finish_and_clear();

            writer.write_screening(&report?)?;
        }
        Commands::Organs | Commands::Completions { .. } => {}
    }

    info!("Done");
    Ok(())
}

/// Print a failure and return the process exit code for it
fn report_error(err: &anyhow::Error, format: ReportFormat) -> i32 {
    match err.downcast_ref::<RegistryError>() {
        Some(registry_err) => {
            let failure = registry_err.to_failure();

            if format == ReportFormat::Json {
                let mut writer = ReportWriter::new(io::stdout().lock(), format);
                if writer.write_failure(&failure).is_err() {
                    eprintln!("{}", failure.message);
                }
            } else {
                eprintln!(
                    "{} {}: {}",
                    style("✗").red().bold(),
                    style(failure.class).red(),
                    failure.message
                );
            }

            match failure.class {
                ResponseClass::NotFound => 3,
                ResponseClass::BadRequest => 2,
                ResponseClass::Internal => 1,
            }
        }
        None => {
            eprintln!("{} {:#}", style("✗").red().bold(), err);
            1
        }
    }
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn init_logging(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("organ_match={}", level))
        .with_writer(io::stderr)
        .init();
}

fn init_thread_pool(threads: usize) -> Result<()> {
    let num_threads = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| anyhow::anyhow!("Failed to initialize thread pool: {}", e))?;

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    debug!("Parsing request payload {}", path.display());
    Ok(parse_request(&content)?)
}

fn prompt_person_details() -> Result<PersonDetails> {
    println!(
        "{}",
        style("╔══════════════════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║            Organ Donor Registration - Interactive            ║")
            .cyan()
            .bold()
    );
    println!(
        "{}",
        style("╚══════════════════════════════════════════════════════════════╝").cyan()
    );
    println!();

    let theme = ColorfulTheme::default();

    let name: String = Input::with_theme(&theme)
        .with_prompt("Name")
        .interact_text()?;
    let age: u32 = Input::with_theme(&theme)
        .with_prompt("Age")
        .interact_text()?;
    let gender: String = Input::with_theme(&theme)
        .with_prompt("Gender")
        .interact_text()?;
    let blood_type: String = Input::with_theme(&theme)
        .with_prompt("Blood type")
        .interact_text()?;
    let hla_typing: String = Input::with_theme(&theme)
        .with_prompt("HLA typing")
        .interact_text()?;
    let infection_status = Confirm::with_theme(&theme)
        .with_prompt("Active infection?")
        .default(false)
        .interact()?;

    let size = |prompt: &str| -> Result<f64> {
        Ok(Input::with_theme(&theme)
            .with_prompt(prompt)
            .interact_text()?)
    };
    let organ_size = OrganSize {
        kidney_volume: size("Kidney volume")?,
        liver_volume: size("Liver volume")?,
        heart_volume: size("Heart volume")?,
        single_lung_volume: size("Single lung volume")?,
        pancreas_size: size("Pancreas size")?,
        intestine_volume: size("Intestine volume")?,
    };

    let names: Vec<&str> = Organ::ALL.iter().map(|organ| organ.name()).collect();
    let selected = MultiSelect::with_theme(&theme)
        .with_prompt("Organs available for donation")
        .items(&names)
        .defaults(&[true; 7])
        .interact()?;

    let available = |organ: Organ| {
        Organ::ALL
            .iter()
            .position(|o| *o == organ)
            .map(|idx| selected.contains(&idx))
            .unwrap_or(false)
    };
    let organ_status = OrganStatus {
        cornea: available(Organ::Cornea),
        kidney: available(Organ::Kidney),
        liver: available(Organ::Liver),
        heart: available(Organ::Heart),
        lungs: available(Organ::Lungs),
        pancreas: available(Organ::Pancreas),
        intestine: available(Organ::Intestine),
    };

    Ok(PersonDetails {
        person: PersonBase {
            name,
            age,
            gender,
            blood_type,
            hla_typing,
            infection_status,
        },
        organ_size,
        organ_status,
    })
}
