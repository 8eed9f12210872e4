use cadbom_core::DEFAULT_CONFIG_PATH;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cadbom",
    about = "cadbom: per-project bill-of-materials graphs for CAD parts",
    version
)]
pub struct Cli {
    /// Path to cadbom.toml (defaults apply when the file is missing)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Directory holding scope documents (overrides `store_dir`)
    #[arg(long, global = true)]
    pub store: Option<String>,

    /// Log filter directive, e.g. `debug` or `cadbom_core=trace`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Project number of the scope
    #[arg(long)]
    pub project_number: String,

    /// Project name of the scope
    #[arg(long)]
    pub project_name: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the direct children of a part and the assemblies that use it
    List {
        /// Part code, e.g. A-001
        part: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a parent -> child edge, or overwrite its quantity
    Link {
        /// Parent part code
        parent: String,

        /// Child part code
        child: String,

        /// Quantity of the child per parent
        #[arg(long, default_value = "1")]
        qty: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a parent -> child edge
    Unlink {
        parent: String,
        child: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the quantity on an existing edge
    UpdateQty {
        parent: String,
        child: String,
        qty: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Attach a free-text note to an existing edge
    Note {
        parent: String,
        child: String,
        note: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace the whole child list of a parent in one write
    SetChildren {
        /// Parent part code
        parent: String,

        /// Child codes, optionally with a quantity: `B-002=2`. None clears the list.
        children: Vec<String>,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Aggregate total quantities of every part below a root
    Explode {
        /// Root assembly code
        root: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the literal assembly tree below a root
    Tree {
        /// Root assembly code
        root: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every edge in a scope
    Summary {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every edge that references a deleted part
    Purge {
        /// Part code being deleted
        part: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the JSON HTTP API
    Serve {
        /// Socket address to bind (overrides `bind` in config)
        #[arg(long)]
        bind: Option<String>,
    },
}
