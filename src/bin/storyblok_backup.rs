use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use storyblok_backup::api::StoryblokHttpClient;
use storyblok_backup::backup::{Backup, BackupOptions};
use storyblok_backup::catalog::SelectionSet;
use storyblok_backup::config::{self, Connection, DEFAULT_OUTPUT_DIR, DEFAULT_ZIP_PREFIX};
use storyblok_backup::error::BackupError;
use storyblok_backup::output::{ConsoleOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "storyblok-backup")]
#[command(about = "Back up every resource of a Storyblok space to JSON files")]
#[command(version)]
struct Cli {
    /// Personal OAuth access token of a Storyblok user (not a space access token)
    #[arg(long, env = "STORYBLOK_OAUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// ID of the space to back up
    #[arg(long, env = "STORYBLOK_SPACE_ID")]
    space: Option<String>,

    /// Region of the space: eu, us, ap, ca or cn
    #[arg(long, env = "STORYBLOK_REGION")]
    region: Option<String>,

    /// Download the binary of every asset next to its metadata
    #[arg(long)]
    with_asset_files: bool,

    /// Directory to write the backup to; fails if it already exists
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: String,

    /// Delete and recreate an existing output directory
    #[arg(long)]
    force: bool,

    /// Create a zip file of the backup
    #[arg(long)]
    create_zip: bool,

    /// Prefix of the zip file name; the current date and time is appended
    #[arg(long, default_value = DEFAULT_ZIP_PREFIX)]
    zip_prefix: String,

    /// Only back up these resource types (comma separated)
    #[arg(long, value_delimiter = ',')]
    types: Vec<String>,

    /// Show every written file
    #[arg(long)]
    verbose: bool,

    /// Print the backup report as JSON instead of progress lines
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BackupError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BackupError) -> u8 {
    match error {
        BackupError::OutputConflict(_) => 2,
        error if error.is_api_failure() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    config::load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let connection = Connection::resolve(
        cli.token.as_deref(),
        cli.space.as_deref(),
        cli.region.as_deref(),
    )?;
    let selection = if cli.types.is_empty() {
        SelectionSet::all()
    } else {
        SelectionSet::from_names(&cli.types)?
    };
    let options = BackupOptions {
        space_id: connection.space_id.clone(),
        output_dir: Utf8PathBuf::from(cli.output_dir),
        selection,
        with_asset_files: cli.with_asset_files,
        force: cli.force,
        zip_prefix: cli.create_zip.then_some(cli.zip_prefix),
    };

    let client = StoryblokHttpClient::new(&connection.token, connection.region)?;
    let backup = Backup::new(client);

    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };
    match mode {
        OutputMode::Json => {
            let report = backup.run(&options, &JsonOutput)?;
            JsonOutput::print_backup(&report).into_diagnostic()?;
        }
        OutputMode::Console => {
            let console = ConsoleOutput {
                verbose: cli.verbose,
            };
            let report = backup.run(&options, &console)?;
            console.print_backup(&report);
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
