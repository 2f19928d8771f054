use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Switchboard chat completion translator
#[derive(Debug, Parser)]
#[command(
    name = "switchboard",
    about = "Translate canonical chat completions into vendor payloads and replay recorded vendor replies"
)]
pub struct Args {
    /// Path to configuration file; built-in defaults apply when omitted
    #[arg(short, long, global = true, env = "SWITCHBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the vendor request and diagnostics for a canonical request
    Translate(CallArgs),

    /// Replay a recorded vendor response through the full call path
    Complete {
        #[command(flatten)]
        call: CallArgs,

        /// Recorded vendor response body (JSON)
        #[arg(long)]
        response: PathBuf,
    },

    /// Replay recorded vendor stream events and print canonical chunks as JSON lines
    Stream {
        #[command(flatten)]
        call: CallArgs,

        /// Recorded events, either SSE or one JSON payload per line
        #[arg(long)]
        events: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
pub struct CallArgs {
    /// Canonical chat completion request (JSON)
    pub request: PathBuf,

    /// Provider to translate for; defaults to `llm.default_provider`
    #[arg(short, long, env = "SWITCHBOARD_PROVIDER")]
    pub provider: Option<String>,
}
