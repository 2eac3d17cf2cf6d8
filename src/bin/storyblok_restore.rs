use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use storyblok_backup::api::StoryblokHttpClient;
use storyblok_backup::config::{self, Connection};
use storyblok_backup::domain::RestoreMode;
use storyblok_backup::error::BackupError;
use storyblok_backup::output::{ConsoleOutput, JsonOutput, OutputMode};
use storyblok_backup::restore::{Restore, RestoreOptions};

#[derive(Parser)]
#[command(name = "storyblok-restore")]
#[command(about = "Restore one Storyblok resource from a backup file")]
#[command(version)]
struct Cli {
    /// Personal OAuth access token of a Storyblok user (not a space access token)
    #[arg(long, env = "STORYBLOK_OAUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// ID of the space to restore into
    #[arg(long, env = "STORYBLOK_SPACE_ID")]
    space: Option<String>,

    /// Region of the space: eu, us, ap, ca or cn
    #[arg(long, env = "STORYBLOK_REGION")]
    region: Option<String>,

    /// Type of resource to restore, e.g. story, component, datasource-entries
    #[arg(long = "type")]
    resource_type: String,

    /// Backup file of the resource to restore
    #[arg(long)]
    file: String,

    /// Publish the resource after restoring it (stories)
    #[arg(long)]
    publish: bool,

    /// Create a new resource instead of updating the existing one
    #[arg(long)]
    create: bool,

    /// ID of the datasource the entries belong to (datasource-entries with --create)
    #[arg(long)]
    id: Option<String>,

    /// Show the API response of every restored resource
    #[arg(long)]
    verbose: bool,

    /// Print the restore result as JSON instead of progress lines
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
    let file = config::resolve_input_file(&cli.file)?;
    let options = RestoreOptions {
        space_id: connection.space_id.clone(),
        mode: RestoreMode::from_flag(cli.create),
        publish: cli.publish,
        datasource_id: cli.id,
    };

    let client = StoryblokHttpClient::new(&connection.token, connection.region)?;
    let restore = Restore::new(client);

    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };
    match mode {
        OutputMode::Json => {
            let result = restore.run(&cli.resource_type, &file, &options, &JsonOutput)?;
            JsonOutput::print_restore(&result).into_diagnostic()?;
        }
        OutputMode::Console => {
            let console = ConsoleOutput {
                verbose: cli.verbose,
            };
            let result = restore.run(&cli.resource_type, &file, &options, &console)?;
            console.print_restore(&result);
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
