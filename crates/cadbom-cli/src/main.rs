//! cadbom CLI: the `cadbom` command.

mod cli;
mod commands;
mod support;

use cadbom_core::Config;
use clap::Parser;
use cli::{Cli, Commands};
use commands::assembly::EdgeAction;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable consulted when `--log-level` is absent.
const LOG_ENV: &str = "CADBOM_LOG";

fn main() {
    let cli = Cli::parse();
    let config = support::load_config_or_exit(&cli.config, cli.store.as_deref());
    init_tracing(cli.log_level.as_deref(), &config);

    match cli.command {
        Commands::List { part, scope, json } => {
            commands::assembly::run_list(&config, scope, part, json)
        }

        Commands::Link {
            parent,
            child,
            qty,
            scope,
            json,
        } => commands::assembly::run_edge(
            &config,
            scope,
            parent,
            child,
            EdgeAction::Link { qty },
            json,
        ),

        Commands::Unlink {
            parent,
            child,
            scope,
            json,
        } => commands::assembly::run_edge(&config, scope, parent, child, EdgeAction::Unlink, json),

        Commands::UpdateQty {
            parent,
            child,
            qty,
            scope,
            json,
        } => commands::assembly::run_edge(
            &config,
            scope,
            parent,
            child,
            EdgeAction::UpdateQty { qty },
            json,
        ),

        Commands::Note {
            parent,
            child,
            note,
            scope,
            json,
        } => commands::assembly::run_edge(
            &config,
            scope,
            parent,
            child,
            EdgeAction::Note { note },
            json,
        ),

        Commands::SetChildren {
            parent,
            children,
            scope,
            json,
        } => commands::assembly::run_set_children(&config, scope, parent, children, json),

        Commands::Explode { root, scope, json } => {
            commands::explode::run(&config, scope, root, json)
        }

        Commands::Tree { root, scope, json } => commands::tree::run(&config, scope, root, json),

        Commands::Summary { scope, json } => commands::summary::run(&config, scope, json),

        Commands::Purge { part, scope, json } => commands::purge::run(&config, scope, part, json),

        Commands::Serve { bind } => commands::serve::run(&config, bind),
    }
}

/// Filter precedence: `--log-level`, then `CADBOM_LOG`, then `log_level`
/// from the config file. Logs go to stderr so `--json` output stays clean.
fn init_tracing(flag: Option<&str>, config: &Config) {
    let directive = flag
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_ENV).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| config.log_level.clone());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
