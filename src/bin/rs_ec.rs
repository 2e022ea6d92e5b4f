use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use riverscapes_ec::app::{ArtifactSpec, CreateRequest, ProjectService, RunRequest, RunStatus};
use riverscapes_ec::config::ConfigLoader;
use riverscapes_ec::domain::OutputKind;
use riverscapes_ec::error::{ErrorKind, RsError};
use riverscapes_ec::output::JsonOutput;

#[derive(Parser)]
#[command(name = "rs-ec")]
#[command(about = "Riverscapes project tools for the watershed conductivity model")]
#[command(version, author)]
struct Cli {
    /// Path to an rs-ec.json config file
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new Riverscapes project in an empty directory")]
    Create(CreateArgs),
    #[command(about = "Record a model run as a realization of an existing project")]
    Record(RecordArgs),
    #[command(about = "Summarize an existing project")]
    Info(InfoArgs),
}

#[derive(Args)]
struct CreateArgs {
    #[arg(long)]
    root: Utf8PathBuf,

    #[arg(long)]
    name: String,

    #[arg(long)]
    region: String,

    #[arg(long)]
    watershed: String,
}

#[derive(Args)]
struct RecordArgs {
    #[arg(long)]
    root: Utf8PathBuf,

    #[arg(long, value_enum)]
    kind: OutputKind,

    #[arg(long)]
    name: String,

    /// Run parameter as NAME=VALUE
    #[arg(long = "param")]
    params: Vec<String>,

    /// Input dataset as TYPE:NAME:PATH
    #[arg(long = "input")]
    inputs: Vec<String>,

    /// Output dataset as TYPE:NAME:PATH
    #[arg(long = "output")]
    outputs: Vec<String>,

    #[arg(long)]
    failed: bool,
}

#[derive(Args)]
struct InfoArgs {
    #[arg(long)]
    root: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RsError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RsError) -> u8 {
    match error.kind() {
        ErrorKind::NotFound => 2,
        ErrorKind::AlreadyExists => 3,
        ErrorKind::Malformed => 4,
        ErrorKind::IoFailure | ErrorKind::InvalidScope | ErrorKind::InvalidInput => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let service = ProjectService::new(config);

    match cli.command {
        Commands::Create(args) => {
            let result = service.create_project(CreateRequest {
                root: args.root,
                name: args.name,
                region: args.region,
                watershed: args.watershed,
            })?;
            JsonOutput::print_create(&result).into_diagnostic()
        }
        Commands::Record(args) => {
            let request = RunRequest {
                root: args.root,
                kind: args.kind,
                name: args.name,
                parameters: args
                    .params
                    .iter()
                    .map(|value| parse_param(value))
                    .collect::<Result<_, _>>()?,
                inputs: args
                    .inputs
                    .iter()
                    .map(|value| parse_artifact(value))
                    .collect::<Result<_, _>>()?,
                outputs: args
                    .outputs
                    .iter()
                    .map(|value| parse_artifact(value))
                    .collect::<Result<_, _>>()?,
                status: if args.failed {
                    RunStatus::Failed
                } else {
                    RunStatus::Success
                },
            };
            let result = service.record_run(request)?;
            JsonOutput::print_run(&result).into_diagnostic()
        }
        Commands::Info(args) => {
            let summary = service.info(&args.root)?;
            JsonOutput::print_info(&summary).into_diagnostic()
        }
    }
}

fn parse_param(value: &str) -> miette::Result<(String, String)> {
    let (name, value) = value
        .split_once('=')
        .ok_or_else(|| miette::miette!("invalid parameter {value:?}, expected NAME=VALUE"))?;
    Ok((name.trim().to_string(), value.to_string()))
}

fn parse_artifact(value: &str) -> miette::Result<ArtifactSpec> {
    let mut parts = value.splitn(3, ':');
    let (Some(kind), Some(name), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(miette::miette!(
            "invalid dataset {value:?}, expected TYPE:NAME:PATH"
        ));
    };
    Ok(ArtifactSpec {
        kind: kind.parse()?,
        name: name.to_string(),
        source: Utf8PathBuf::from(path),
    })
}
