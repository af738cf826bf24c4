use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use kernel_bridge::{extract_field_to_file, Invocation, KernelBridge};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "kernel-bridge")]
#[command(about = "Resolve, probe and invoke the workspace kernel")]
struct CliOptions {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Report how the kernel resolves on this machine
    Doctor,
    /// Invoke a kernel command with a JSON request and print its response
    Run {
        /// Command identifier, e.g. `repo.info`
        command: String,

        /// JSON request payload file (use '-' or omit for stdin)
        #[arg(long = "input", short = 'i')]
        input: Option<String>,
    },
    /// Stream one top-level string field of a JSON document to a file
    Extract {
        /// Path to the JSON document
        source: PathBuf,

        /// Name of the top-level string field
        field: String,

        /// Destination file for the decoded field content
        dest: PathBuf,
    },
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opts = CliOptions::parse();

    match opts.command {
        CliCommand::Doctor => {
            let bridge = KernelBridge::from_env();
            let summary = bridge.session().summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        CliCommand::Run { command, input } => {
            let request = load_request(input.as_deref())?;
            let bridge = KernelBridge::from_env();
            match bridge.invoke(&command, &request)? {
                Invocation::Completed(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                    Ok(())
                }
                Invocation::Unavailable => {
                    let reason = bridge
                        .session()
                        .disabled_reason()
                        .map(|reason| format!(" ({reason})"))
                        .unwrap_or_default();
                    Err(anyhow!("kernel not available{reason}"))
                }
            }
        }
        CliCommand::Extract {
            source,
            field,
            dest,
        } => {
            extract_field_to_file(&source, &field, &dest).with_context(|| {
                format!(
                    "unable to extract `{field}` from {} into {}",
                    source.display(),
                    dest.display()
                )
            })?;
            Ok(())
        }
    }
}

fn load_request(input: Option<&str>) -> Result<Value> {
    let raw = match input {
        None | Some("-") => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("unable to read request from stdin")?;
            buffer
        }
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("unable to read request file {path}"))?,
    };
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(&raw).context("request payload is not valid JSON")
}
