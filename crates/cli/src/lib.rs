pub mod commands;

use actiongate_core::config::{AppConfig, ConfigError, LoadOptions, LogFormat};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::Level;

#[derive(Debug, Parser)]
#[command(
    name = "actiongate",
    about = "Actiongate operator CLI",
    long_about = "Inspect the action catalog, work the approval queue, and audit agent runs.",
    after_help = "Examples:\n  actiongate doctor --json\n  actiongate actions --role driver\n  actiongate gates pending\n  actiongate gates resolve <gate-id> approve --resolver lead-1 --role admin\n  actiongate ask --actor driver-7 --role driver \"find parking near Memphis\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, catalog completeness, dispatcher wiring, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List registered actions with risk, approval, and rate-limit metadata")]
    Actions {
        #[arg(long, help = "Only actions this role may invoke")]
        role: Option<String>,
        #[arg(long, help = "Only actions declared by this router")]
        router: Option<String>,
    },
    #[command(about = "Run one agent turn through the configured model and report the decision")]
    Ask {
        #[arg(long)]
        actor: String,
        #[arg(long, help = "Role of the actor, e.g. driver")]
        role: String,
        #[arg(long)]
        goal: Option<String>,
        message: String,
    },
    #[command(subcommand, about = "Work the approval queue")]
    Gates(GateCommand),
    #[command(subcommand, about = "Inspect agent runs")]
    Runs(RunCommand),
    #[command(subcommand, about = "Score runs and report outcome statistics")]
    Outcomes(OutcomeCommand),
}

#[derive(Debug, Subcommand)]
enum GateCommand {
    #[command(about = "List pending gates, oldest first")]
    Pending {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    #[command(about = "Approve or reject a pending gate")]
    Resolve {
        gate_id: String,
        #[arg(help = "approve | reject")]
        decision: String,
        #[arg(long)]
        resolver: String,
        #[arg(long, help = "Role of the resolver, e.g. admin")]
        role: String,
    },
    #[command(about = "Expire overdue gates and deny their steps")]
    Sweep {
        #[arg(long, help = "Keep sweeping every approvals.sweep_interval_secs until interrupted")]
        watch: bool,
        #[arg(long, requires = "watch", help = "Stop after this many sweep passes")]
        passes: Option<u32>,
    },
}

#[derive(Debug, Subcommand)]
enum RunCommand {
    #[command(about = "List runs filtered by actor, role, and status")]
    List {
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    #[command(about = "Show a run with its steps, gates, and merged timeline")]
    Trace { run_id: String },
}

#[derive(Debug, Subcommand)]
enum OutcomeCommand {
    #[command(about = "Score a completed run")]
    Evaluate { run_id: String },
    #[command(about = "Aggregate outcome statistics")]
    Stats {
        #[arg(long)]
        role: Option<String>,
        #[arg(long, help = "Only runs evaluated in the last N hours")]
        since_hours: Option<i64>,
    },
    #[command(about = "Flag actions whose success rate dropped between two windows")]
    Regressions {
        #[arg(long, default_value_t = 24)]
        window_hours: i64,
    },
}

/// Level and format for the subscriber, plus the load error to report once it is installed.
fn logging_settings(loaded: Result<AppConfig, ConfigError>) -> (Level, LogFormat, Option<String>) {
    let (config, failure) = match loaded {
        Ok(config) => (config, None),
        Err(error) => (AppConfig::default(), Some(error.to_string())),
    };
    let level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    (level, config.logging.format, failure)
}

fn init_logging() {
    let (level, format, failure) = logging_settings(AppConfig::load(LoadOptions::default()));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if let Some(error) = failure {
        tracing::warn!(
            event_name = "cli.logging.config_fallback",
            error = %error,
            "configuration failed to load; logging with default level and format"
        );
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Actions { role, router } => {
            commands::actions::run(role.as_deref(), router.as_deref())
        }
        Command::Ask { actor, role, goal, message } => {
            commands::ask::run(&actor, &role, &message, goal.as_deref())
        }
        Command::Gates(GateCommand::Pending { limit }) => commands::gates::pending(limit),
        Command::Gates(GateCommand::Resolve { gate_id, decision, resolver, role }) => {
            commands::gates::resolve(&gate_id, &decision, &resolver, &role)
        }
        Command::Gates(GateCommand::Sweep { watch: false, .. }) => commands::gates::sweep(),
        Command::Gates(GateCommand::Sweep { watch: true, passes }) => {
            commands::gates::watch(passes)
        }
        Command::Runs(RunCommand::List { actor, role, status, limit }) => {
            commands::runs::list(actor.as_deref(), role.as_deref(), status.as_deref(), limit)
        }
        Command::Runs(RunCommand::Trace { run_id }) => commands::runs::trace(&run_id),
        Command::Outcomes(OutcomeCommand::Evaluate { run_id }) => {
            commands::outcomes::evaluate(&run_id)
        }
        Command::Outcomes(OutcomeCommand::Stats { role, since_hours }) => {
            commands::outcomes::stats(role.as_deref(), since_hours)
        }
        Command::Outcomes(OutcomeCommand::Regressions { window_hours }) => {
            commands::outcomes::regressions(window_hours)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
