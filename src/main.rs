use clap::{Parser, Subcommand};

use assetline::logging::{init_logging, LoggingConfig};
use assetline::manifest::DEFAULT_MANIFEST;
use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{list, plan, run, validate};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "assetline")]
#[command(version = VERSION)]
#[command(about = "Run dependency-ordered static asset build pipelines")]
struct Cli {
    /// Pipeline manifest (JSON, YAML, or TOML)
    #[arg(
        short = 'f',
        long = "file",
        env = "ASSETLINE_FILE",
        default_value = DEFAULT_MANIFEST,
        global = true
    )]
    file: String,

    /// Workspace root that task paths resolve against (defaults to the manifest's directory)
    #[arg(long, global = true)]
    workspace: Option<String>,

    /// Increase diagnostic logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task and everything it expands to
    Run(run::RunArgs),
    /// Show the resolved step sequence for a task without running it
    Plan(plan::PlanArgs),
    /// List aliases, atomic tasks, and available tools
    List(list::ListArgs),
    /// Check every alias for graph and template problems
    Validate(validate::ValidateArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(LoggingConfig::from_verbosity(cli.verbose));

    let global = GlobalArgs {
        manifest: cli.file,
        workspace: cli.workspace,
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    if let Err(err) = output::print_json_result(json_result) {
        tracing::error!(error = %err, "failed to write response");
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
