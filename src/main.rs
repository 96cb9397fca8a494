//! gwire - Gremlin wire-format toolkit
//!
//! Prints negotiation headers, encodes, decodes and transcodes messages, and
//! checks pipeline configuration files.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gwire")]
#[command(about = "Gremlin wire-format toolkit")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the content-type header negotiated for a MIME type
    Header {
        /// MIME type (e.g. graphson-v4)
        mime: String,
    },

    /// Encode a script evaluation request
    Encode {
        /// Gremlin script
        script: String,

        /// MIME type of the output
        #[arg(short, long, default_value = "graphson-v4")]
        mime: String,

        /// Request ID (generated if omitted)
        #[arg(short, long)]
        id: Option<String>,

        /// Binding as name=JSON (repeatable)
        #[arg(short, long = "binding")]
        bindings: Vec<String>,

        /// Traversal source alias
        #[arg(short, long)]
        alias: Option<String>,

        /// Evaluation timeout in milliseconds
        #[arg(long)]
        timeout: Option<i64>,

        /// Results per response
        #[arg(long)]
        batch_size: Option<i32>,
    },

    /// Decode a message (hex, or @file for raw bytes)
    Decode {
        input: String,

        /// MIME type (detected from the header if omitted)
        #[arg(short, long)]
        mime: Option<String>,

        /// Decode as a response instead of a request
        #[arg(short, long)]
        response: bool,
    },

    /// Re-encode a message under another MIME type
    Transcode {
        input: String,

        /// Target MIME type
        #[arg(short, long)]
        to: String,

        /// Transcode a response instead of a request
        #[arg(short, long)]
        response: bool,
    },

    /// Load and validate a pipeline configuration
    CheckConfig {
        /// Config file (defaults to GWIRE_CONFIG, then built-in defaults)
        #[arg(env = "GWIRE_CONFIG")]
        path: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match commands::execute(cli.command) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
