//! CLI entrypoint for keypin operator tooling.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keypin_core::{EngineConfig, PinningMode, RetireGuard};
use keypin_harness::HarnessError;
use keypin_harness::ops::{self, EvaluateOptions, RotateOp};
use tracing_subscriber::EnvFilter;

/// Policy and pin tooling for keypin.
#[derive(Debug, Parser)]
#[command(name = "keypin-harness")]
#[command(about = "Validate, evaluate and rotate keypin policies")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a policy and print its canonical JSON.
    Validate {
        #[arg(long)]
        policy: PathBuf,
    },
    /// Evaluate one connection against a policy.
    Evaluate {
        #[arg(long)]
        policy: PathBuf,
        #[arg(long)]
        host: String,
        /// Base64 SPKI hash of a presented certificate (repeat for a chain).
        #[arg(long = "hash")]
        hashes: Vec<String>,
        #[arg(long, default_value = "0.0.0")]
        client_version: String,
        #[arg(long, default_value = "")]
        client_id: String,
        /// Builtin pins JSON.
        #[arg(long)]
        builtin: Option<PathBuf>,
        /// Write telemetry as structured JSONL here.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Override KEYPIN_MODE (`enforce`, `report_only`, `off`).
        #[arg(long)]
        mode: Option<String>,
    },
    /// Show the rollout bucket for an identifier.
    Rollout {
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        percentage: u8,
    },
    /// Add a backup pin to a host.
    RotateAdd {
        #[arg(long)]
        policy: PathBuf,
        #[arg(long)]
        host: String,
        #[arg(long)]
        pin: String,
        /// Output path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Retire a pin from a host.
    RotateRetire {
        #[arg(long)]
        policy: PathBuf,
        #[arg(long)]
        host: String,
        #[arg(long)]
        pin: String,
        /// Allow dropping below two pins; a fallback path is guaranteed.
        #[arg(long)]
        fallback_guaranteed: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the Base64 SHA-256 of a DER SubjectPublicKeyInfo.
    SpkiHash {
        #[arg(long)]
        der: PathBuf,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn write_output(output: Option<&PathBuf>, text: &str) -> Result<(), HarnessError> {
    match output {
        Some(path) => std::fs::write(path, format!("{text}\n")).map_err(|source| {
            HarnessError::Io {
                path: path.clone(),
                source,
            }
        }),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { policy } => {
            let parsed = ops::load_policy(&policy)?;
            eprintln!(
                "{}: valid, version {}, {} host(s)",
                policy.display(),
                parsed.version(),
                parsed.host_count()
            );
            println!("{}", parsed.to_json()?);
        }
        Command::Evaluate {
            policy,
            host,
            hashes,
            client_version,
            client_id,
            builtin,
            log,
            mode,
        } => {
            let mut config = EngineConfig::from_env();
            if let Some(mode) = mode {
                config = config.with_mode(PinningMode::from_str_loose(&mode));
            }
            let report = ops::evaluate(&EvaluateOptions {
                policy,
                host,
                hashes,
                client_version,
                client_id,
                builtin,
                log,
                config,
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Rollout {
            client_id,
            percentage,
        } => {
            let report = ops::rollout(&client_id, percentage)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::RotateAdd {
            policy,
            host,
            pin,
            output,
        } => {
            let current = ops::load_policy(&policy)?;
            let next = ops::rotate(&current, &host, &pin, RotateOp::Add)?;
            eprintln!("{host}: added pin, policy version {}", next.version());
            write_output(output.as_ref(), &next.to_json()?)?;
        }
        Command::RotateRetire {
            policy,
            host,
            pin,
            fallback_guaranteed,
            output,
        } => {
            let guard = if fallback_guaranteed {
                RetireGuard::FallbackGuaranteed
            } else {
                RetireGuard::Strict
            };
            let current = ops::load_policy(&policy)?;
            let next = ops::rotate(&current, &host, &pin, RotateOp::Retire(guard))?;
            eprintln!("{host}: retired pin, policy version {}", next.version());
            write_output(output.as_ref(), &next.to_json()?)?;
        }
        Command::SpkiHash { der } => {
            println!("{}", ops::spki_hash(&der)?);
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = ops::validate_log(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            if !errors.is_empty() {
                return Err(HarnessError::LogValidation {
                    path: log,
                    errors: errors.len(),
                }
                .into());
            }
            eprintln!("{}: {lines} line(s) valid", log.display());
        }
    }

    Ok(())
}
