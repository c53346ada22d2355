mod config;
mod feedback_cmds;
mod files;
mod plan_cmds;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use trellis_core::{ConsultationMarker, Status};

use config::{TrellisConfig, ViewFormat};
use plan_cmds::{ShowOptions, Step};

#[derive(Parser)]
#[command(
    name = "trellis",
    version,
    about = "Keep epic/story/task plans consistent with their dependencies and feedback"
)]
struct Cli {
    /// Plan file (overrides TRELLIS_PLAN env var and the config file)
    #[arg(long, global = true)]
    plan: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a trellis config file
    Init {
        /// Default view format for `trellis show`
        #[arg(long, value_enum)]
        view: Option<ViewFormat>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Validate the plan and print the current consultation marker
    Validate,
    /// Render the plan
    Show {
        /// Output format (overrides TRELLIS_VIEW_FORMAT env var and the config file)
        #[arg(long, value_enum)]
        format: Option<ViewFormat>,
        /// Put the initial scope above a Markdown outline
        #[arg(long)]
        include_scope: bool,
        /// Label diagram nodes with descriptions
        #[arg(long)]
        descriptions: bool,
    },
    /// List tasks whose dependencies are all complete
    Ready {
        /// Also list tasks already in progress
        #[arg(long)]
        include_in_progress: bool,
    },
    /// Show task progress
    Status {
        /// Print progress as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move an entity to in_progress, starting pending parents too
    Start {
        /// Epic, story or task ID
        id: String,
        /// Marker printed by `trellis feedback list`
        #[arg(long)]
        marker: Option<ConsultationMarker>,
    },
    /// Move an in-progress entity to complete
    Complete {
        /// Epic, story or task ID
        id: String,
        /// Marker printed by `trellis feedback list`
        #[arg(long)]
        marker: Option<ConsultationMarker>,
    },
    /// Set a status directly; the result must still validate
    SetStatus {
        /// Epic, story or task ID
        id: String,
        /// New status: pending, in_progress or complete
        status: Status,
        /// Marker printed by `trellis feedback list`
        #[arg(long)]
        marker: Option<ConsultationMarker>,
    },
    /// Reopen a complete task and every complete task that depends on it
    Reopen {
        /// Task ID
        id: String,
        /// Marker printed by `trellis feedback list`
        #[arg(long)]
        marker: Option<ConsultationMarker>,
    },
    /// Feedback ledger
    Feedback {
        #[command(subcommand)]
        command: FeedbackCommands,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum FeedbackCommands {
    /// Print every feedback entry and the marker for them
    List,
    /// Print only the current consultation marker
    Marker,
    /// Append a feedback entry
    Add {
        /// Message, stored verbatim (`-` reads stdin)
        message: String,
        /// Entry ID (defaults to the next free FB-<n>)
        #[arg(long)]
        id: Option<String>,
    },
}

/// Execute the `trellis init` command: write config file.
fn cmd_init(plan: Option<PathBuf>, view: Option<ViewFormat>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        plan: config::PlanSection {
            path: Some(plan.unwrap_or_else(|| PathBuf::from(config::DEFAULT_PLAN_PATH))),
        },
        view: config::ViewSection {
            format: Some(view.unwrap_or_default()),
        },
        log: config::LogSection {
            filter: Some("info".to_string()),
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    if let Some(plan) = &cfg.plan.path {
        println!("  plan.path   = {}", plan.display());
    }
    if let Some(format) = cfg.view.format {
        println!("  view.format = {format}");
    }
    Ok(())
}

fn init_tracing(config_filter: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(config_filter.unwrap_or("info")))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_config = config::load_config();
    let config_filter = file_config
        .as_ref()
        .ok()
        .and_then(|cfg| cfg.as_ref())
        .and_then(|cfg| cfg.log.filter.as_deref());
    init_tracing(config_filter);
    let file_config = file_config?;

    let view = match &cli.command {
        Commands::Show { format, .. } => *format,
        _ => None,
    };
    let resolved = TrellisConfig::resolve(cli.plan.as_deref(), view, file_config.as_ref())?;
    let plan_path = resolved.plan_path.as_path();

    match cli.command {
        Commands::Init { view, force } => {
            cmd_init(cli.plan, view, force)?;
        }
        Commands::Validate => {
            plan_cmds::cmd_validate(plan_path)?;
        }
        Commands::Show {
            include_scope,
            descriptions,
            ..
        } => {
            let options = ShowOptions {
                format: resolved.view_format,
                include_scope,
                descriptions,
            };
            plan_cmds::cmd_show(plan_path, options)?;
        }
        Commands::Ready {
            include_in_progress,
        } => {
            plan_cmds::cmd_ready(plan_path, include_in_progress)?;
        }
        Commands::Status { json } => {
            plan_cmds::cmd_status(plan_path, json)?;
        }
        Commands::Start { id, marker } => {
            plan_cmds::cmd_step(plan_path, &id, Step::Start, marker)?;
        }
        Commands::Complete { id, marker } => {
            plan_cmds::cmd_step(plan_path, &id, Step::Complete, marker)?;
        }
        Commands::SetStatus { id, status, marker } => {
            plan_cmds::cmd_set_status(plan_path, &id, status, marker)?;
        }
        Commands::Reopen { id, marker } => {
            plan_cmds::cmd_reopen(plan_path, &id, marker)?;
        }
        Commands::Feedback { command } => {
            feedback_cmds::run_feedback_command(command, plan_path)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "trellis", &mut std::io::stdout());
        }
    }

    Ok(())
}
