// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Docwerk — command-line front end.
//
// Initialises logging, loads the engine configuration, and runs one document
// operation. Results are printed as JSON on stdout; failures are printed as a
// plain-language message with a suggestion on stderr.

mod metering;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use docwerk_core::error::{DocwerkError, Result};
use docwerk_core::human_errors::humanize_error;
use docwerk_core::{DocumentFormat, EngineConfig, EngineError, Permissions, QualityTier};
use docwerk_ledger::SessionId;
use docwerk_ops::DocumentOperations;
use tracing::{debug, info};

use metering::{Meter, local_identity};

#[derive(Debug, Parser)]
#[command(name = "docwerk", version, about = "Compress, protect, and convert documents")]
struct Cli {
    /// JSON engine configuration. Missing files fall back to defaults.
    #[arg(long, env = "DOCWERK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// SQLite file for anonymous usage metering. Metering is off without it.
    #[arg(long, env = "DOCWERK_LEDGER", global = true)]
    ledger: Option<PathBuf>,

    /// Correlation token identifying this caller in the usage ledger.
    #[arg(long, env = "DOCWERK_TOKEN", global = true)]
    token: Option<String>,

    /// Visit session to continue. A new one is started when absent or
    /// expired; its id is logged.
    #[arg(long, env = "DOCWERK_SESSION", global = true)]
    session: Option<SessionId>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Shrink a PDF.
    Compress {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// maximum-reduction, balanced, or high-fidelity.
        #[arg(long, default_value = "balanced")]
        tier: String,
    },
    /// Password-protect a PDF.
    Protect {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, env = "DOCWERK_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        no_printing: bool,
        #[arg(long)]
        allow_editing: bool,
        #[arg(long)]
        allow_copying: bool,
        #[arg(long)]
        no_filling: bool,
    },
    /// Wrap any file in a passphrase envelope (not a PDF).
    Seal {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, env = "DOCWERK_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },
    /// Open a file produced by `seal`.
    Unseal {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, env = "DOCWERK_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },
    /// Convert between document formats. Formats default to the file
    /// extensions.
    Convert {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Report which external engines are installed.
    Doctor,
    /// Show this caller's usage and the ledger's conversion figures.
    Usage,
    /// Link an account to this caller's usage record.
    Signup { account: String },
    /// Write the effective configuration as JSON.
    Config { path: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let human = humanize_error(&err);
            debug!(error = %err, "command failed");
            eprintln!("{}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let identity = local_identity(cli.token.as_deref());
    let mut meter = match &cli.ledger {
        Some(path) => Some(Meter::open(path, config.ledger.clone())?),
        None => None,
    };
    let caller = Caller {
        identity: &identity,
        session: cli.session,
    };

    match cli.command {
        Command::Compress { input, output, tier } => {
            let tier: QualityTier = tier.parse()?;
            let bytes = read_input(&input, meter.as_mut(), &caller, "compress").await?;
            let ops = DocumentOperations::new(config)?;
            let result = ops.compress(bytes, tier).await?;
            tokio::fs::write(&output, &result.output).await?;
            print_json(&result)?;
        }
        Command::Protect {
            input,
            output,
            password,
            no_printing,
            allow_editing,
            allow_copying,
            no_filling,
        } => {
            let permissions = Permissions {
                printing: !no_printing,
                editing: allow_editing,
                copying: allow_copying,
                filling: !no_filling,
            };
            let bytes = read_input(&input, meter.as_mut(), &caller, "protect").await?;
            let ops = DocumentOperations::new(config)?;
            let outcome = ops.protect(bytes, &password, permissions).await?;
            tokio::fs::write(&output, &outcome.output).await?;
            print_json(&outcome)?;
        }
        Command::Seal {
            input,
            output,
            passphrase,
        } => {
            let bytes = read_input(&input, meter.as_mut(), &caller, "seal").await?;
            let ops = DocumentOperations::new(config)?;
            let sealed = ops.seal(bytes, &passphrase).await?;
            tokio::fs::write(&output, &sealed).await?;
            print_json(&serde_json::json!({ "output_size": sealed.len() }))?;
        }
        Command::Unseal {
            input,
            output,
            passphrase,
        } => {
            let bytes = tokio::fs::read(&input).await?;
            let ops = DocumentOperations::new(config)?;
            let opened = ops.unseal(bytes, &passphrase).await?;
            tokio::fs::write(&output, &opened).await?;
            print_json(&serde_json::json!({ "output_size": opened.len() }))?;
        }
        Command::Convert {
            input,
            output,
            from,
            to,
        } => {
            let source = resolve_format(from.as_deref(), &input)?;
            let target = resolve_format(to.as_deref(), &output)?;
            let bytes = read_input(&input, meter.as_mut(), &caller, "convert").await?;
            let ops = DocumentOperations::new(config)?;
            let result = ops.convert(bytes, source, target).await?;
            tokio::fs::write(&output, &result.output).await?;
            print_json(&result)?;
        }
        Command::Doctor => {
            let ops = DocumentOperations::new(config)?;
            print_json(&ops.doctor().await)?;
        }
        Command::Usage => {
            let meter = require_meter(meter.as_ref())?;
            print_json(&serde_json::json!({
                "identity": identity,
                "status": meter.status(&identity),
                "visit": cli.session.as_ref().and_then(|id| meter.visit(id)),
                "stats": meter.stats(),
            }))?;
        }
        Command::Signup { account } => {
            let linked = meter_mut(&mut meter)?.attribute(&identity, &account)?;
            print_json(&serde_json::json!({ "linked": linked }))?;
        }
        Command::Config { path } => {
            config.persist(&path)?;
            info!(path = %path.display(), "configuration written");
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) if path.exists() => EngineConfig::load(path),
        Some(path) => {
            info!(path = %path.display(), "config file not found, using defaults");
            Ok(EngineConfig::default())
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Who is calling, and the visit they asked to continue.
struct Caller<'a> {
    identity: &'a docwerk_ledger::Identity,
    session: Option<SessionId>,
}

/// Read the input document, counting the submission when metering is on.
async fn read_input(path: &Path, meter: Option<&mut Meter>, caller: &Caller<'_>, tool: &str) -> Result<Vec<u8>> {
    let bytes = tokio::fs::read(path).await?;
    if let Some(meter) = meter {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (outcome, session) = meter.record(caller.identity, tool, &bytes, &name, caller.session)?;
        debug!(count = outcome.usage_count, duplicate = outcome.duplicate, "usage recorded");
        info!(%session, "visit session");
    }
    Ok(bytes)
}

fn resolve_format(explicit: Option<&str>, path: &Path) -> Result<DocumentFormat> {
    let ext = match explicit {
        Some(name) => name.to_string(),
        None => path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    DocumentFormat::from_extension(&ext).ok_or_else(|| {
        DocwerkError::Engine(EngineError::InvalidInput(format!(
            "cannot tell the document format of {} (use --from/--to)",
            path.display()
        )))
    })
}

fn require_meter(meter: Option<&Meter>) -> Result<&Meter> {
    meter.ok_or_else(|| DocwerkError::Config("usage metering needs --ledger <PATH>".into()))
}

fn meter_mut(meter: &mut Option<Meter>) -> Result<&mut Meter> {
    meter
        .as_mut()
        .ok_or_else(|| DocwerkError::Config("usage metering needs --ledger <PATH>".into()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn formats_come_from_extensions_unless_given() {
        assert_eq!(
            resolve_format(None, Path::new("report.DOCX")).expect("docx"),
            DocumentFormat::Docx
        );
        assert_eq!(
            resolve_format(Some("txt"), Path::new("notes")).expect("explicit"),
            DocumentFormat::Txt
        );
        assert!(resolve_format(None, Path::new("archive.zip")).is_err());
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/docwerk.json"))).expect("defaults");
        assert_eq!(config.governor.capacity, 3);
    }

    #[test]
    fn parses_session_and_seal() {
        let id = SessionId::new();
        let cli = Cli::try_parse_from([
            "docwerk",
            "--session",
            &id.to_string(),
            "seal",
            "notes.txt",
            "-o",
            "notes.age",
            "--passphrase",
            "pw",
        ])
        .expect("parse");
        assert_eq!(cli.session, Some(id));
        assert!(matches!(cli.command, Command::Seal { .. }));
        assert!(Cli::try_parse_from(["docwerk", "--session", "nope", "doctor"]).is_err());
    }

    #[test]
    fn parses_protect_flags() {
        let cli = Cli::try_parse_from([
            "docwerk",
            "protect",
            "in.pdf",
            "-o",
            "out.pdf",
            "--password",
            "pw",
            "--allow-copying",
        ])
        .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Protect {
                allow_copying: true,
                no_printing: false,
                ..
            }
        ));
    }
}
