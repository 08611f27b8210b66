use clap::{Parser, Subcommand};

/// `rulesmith` - bounded generate, evaluate, patch loop over a living policy.
#[derive(Parser, Debug)]
#[command(name = "rulesmith")]
#[command(version)]
#[command(
    about = "Iteratively improve an LLM answer by patching the policy it follows.",
    long_about = None
)]
pub struct Cli {
    /// Force the deterministic simulation backends
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a run in `pending` state and print its id
    Create {
        /// Task text, including its constraints
        #[arg(short, long)]
        task: String,

        /// Display title (default: "Untitled Run")
        #[arg(long)]
        title: Option<String>,

        /// Attempt budget (default from config)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Score at or above which the run stops early (1-100, default from config)
        #[arg(long)]
        target_score: Option<u32>,
    },

    /// Execute a run from a clean slate
    Execute {
        /// Run id
        run_id: String,
    },

    /// Show a run with its attempts and policy versions
    Show {
        /// Run id
        run_id: String,

        /// Print the full run detail as JSON
        #[arg(long)]
        json: bool,
    },

    /// List runs, newest first
    List,

    /// Delete a run with its attempts and policy versions
    Delete {
        /// Run id
        run_id: String,
    },

    /// Create and execute the built-in duplicate-charge support task
    Demo {
        #[arg(long, default_value = "5")]
        max_attempts: u32,

        #[arg(long, default_value = "90")]
        target_score: u32,
    },

    /// Start the HTTP gateway
    Serve {
        /// Port to listen on (use 0 for random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Show the effective configuration
    Status,
}
