use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hinter::commands::{
    analyze_command, decide_command, inspect_command, plan_command, trace_command,
};
use hinter::load_config;
use hinter::logging::init_logging;

/// Import tracer and module whitelister for hinted standalone compilation.
///
/// This CLI is a thin wrapper around `hinter-core` (exposed in code as
/// `hinter_core`). All substantive logic lives in the library so it can be
/// tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "hinter",
    version,
    about = "Trace a program's imports and decide which modules a standalone build keeps",
    long_about = None
)]
struct Cli {
    /// Configuration file (YAML or JSON). Defaults to `hinter.yaml` in the working directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (`RUST_LOG` takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a script with import tracing and write its hints file.
    ///
    /// The hints file is written next to the script as
    /// `<script>-<major><minor>-<platform>-<bits>.json`, even when the script
    /// fails or times out.
    Trace {
        /// Script to trace.
        script: String,

        /// Minutes to wait for the script; 0 disables the timeout.
        #[arg(long)]
        timeout: Option<u64>,

        /// Interpreter to run the script with (overrides config and HINTER_PYTHON).
        #[arg(long)]
        interpreter: Option<String>,

        /// Keep the consolidated trace log and the shim.
        #[arg(long, default_value_t = false)]
        keep_logs: bool,

        /// Emit the trace report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Arguments passed through to the traced script.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Reduce an existing trace log to a hints file.
    Analyze {
        /// Consolidated trace log.
        log: String,

        /// Output hints file. Defaults to the log path with a `.json` extension.
        #[arg(long)]
        output: Option<String>,

        /// Tolerate a truncated trace (killed or timed-out program).
        #[arg(long, default_value_t = false)]
        partial: bool,

        /// Print the accept-list as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Answer keep/drop/abstain for modules against a hints file.
    ///
    /// Modules come from the arguments, or from stdin (one per line, as
    /// `name[<TAB>filename[<TAB>kind]]`) when none are given.
    Decide {
        /// Hints file produced by `trace` or `analyze`.
        #[arg(long)]
        hints: String,

        /// Dotted module names to decide on.
        modules: Vec<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show plugins, recursion targets and counts implied by a hints file.
    Inspect {
        /// Hints file produced by `trace` or `analyze`.
        #[arg(long)]
        hints: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the builder options for a hinted standalone build of a script.
    Plan {
        /// Script to build.
        script: String,

        /// Path of the builder plugin implementing the inclusion policy.
        #[arg(long)]
        plugin: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Trace { script, timeout, interpreter, keep_logs, json, args } => {
            trace_command(&config, &script, timeout, interpreter, keep_logs, json, args)?;
        }
        Command::Analyze { log, output, partial, json } => {
            analyze_command(&config, &log, output.as_deref(), partial, json)?;
        }
        Command::Decide { hints, modules, json } => {
            decide_command(&config, &hints, modules, json)?;
        }
        Command::Inspect { hints, json } => {
            inspect_command(&config, &hints, json)?;
        }
        Command::Plan { script, plugin, json } => {
            plan_command(&config, &script, plugin.as_deref(), json)?;
        }
    }

    Ok(())
}
