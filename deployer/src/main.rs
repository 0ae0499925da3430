//! `flow-deployer`: validate, classify, generate and auto-deploy Salesforce
//! Flow metadata.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use flow_deployer::autodeploy::{DeployRequest, LoopSettings, RunOutcome, Terminal, run_auto_deploy};
use flow_deployer::core::classifier;
use flow_deployer::core::flow_name::{flow_name_from_file_name, validate_flow_name};
use flow_deployer::core::validator::validate;
use flow_deployer::exit_codes;
use flow_deployer::generate::{FlowGenerator, GenerateRequest};
use flow_deployer::io::audit_log::{AuditLog, log_path, read_from};
use flow_deployer::io::auth::Authenticator;
use flow_deployer::io::config::{DEFAULT_CONFIG_FILE, DeployerConfig, init_config, resolve_config};
use flow_deployer::io::flow_file::read_flow_file;
use flow_deployer::io::metadata::MetadataClient;
use flow_deployer::io::model::build_model;
use flow_deployer::io::retrieval::{NoRetriever, PatternDirRetriever, Retriever};
use flow_deployer::io::transport::HttpSoapTransport;
use flow_deployer::logging;
use flow_deployer::repair::RepairDispatcher;

/// Pattern files included in a generation prompt.
const PATTERN_LIMIT: usize = 5;
const TAIL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(
    name = "flow-deployer",
    version,
    about = "Repair and deploy Salesforce Flow metadata with a language model in the loop"
)]
struct Cli {
    /// Config file (TOML). Missing file means defaults plus environment.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Mirror audit log entries to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file at `--config`.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Check that a flow file is well-formed XML with a declaration.
    Validate { file: PathBuf },
    /// Print the detected flow type of a flow file.
    Classify {
        file: PathBuf,
        /// Also print the rule that decided the type.
        #[arg(long)]
        explain: bool,
    },
    /// Generate a first-draft flow from a requirement.
    Generate {
        #[arg(long)]
        requirement: String,
        /// Flow API name.
        #[arg(long)]
        name: String,
        /// Flow type label (for example `Screen`, `AutoLaunched`, `Record-Triggered`).
        #[arg(long)]
        flow_type: Option<String>,
        /// Directory of pattern files to retrieve context from.
        #[arg(long)]
        patterns: Option<PathBuf>,
        /// Write the document here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Repair, deploy and poll until the flow deploys or a budget runs out.
    Deploy {
        file: PathBuf,
        /// Flow API name. Defaults to the file name without `.flow-meta.xml`.
        #[arg(long)]
        name: Option<String>,
        /// Validate on the server without committing.
        #[arg(long)]
        check_only: bool,
        /// Write the final document here.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print a flow's audit log, optionally following new entries.
    Tail {
        name: String,
        #[arg(short, long)]
        follow: bool,
    },
}

fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate { file } => cmd_validate(&file),
        Command::Classify { file, explain } => cmd_classify(&file, explain),
        Command::Generate {
            requirement,
            name,
            flow_type,
            patterns,
            out,
        } => {
            let cfg = resolve_config(&cli.config)?;
            cmd_generate(
                &cfg,
                &GenerateRequest {
                    requirement: &requirement,
                    flow_name: &name,
                    flow_type: flow_type.as_deref(),
                },
                patterns.as_deref(),
                out.as_deref(),
            )
        }
        Command::Deploy {
            file,
            name,
            check_only,
            out,
        } => {
            let cfg = resolve_config(&cli.config)?;
            cmd_deploy(&cfg, &file, name.as_deref(), check_only, out.as_deref())
        }
        Command::Tail { name, follow } => {
            let cfg = resolve_config(&cli.config)?;
            cmd_tail(&cfg, &name, follow)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if init_config(path, force)? {
        println!("wrote {}", path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_validate(file: &Path) -> Result<i32> {
    let report = validate(&read_flow_file(file)?);
    if report.is_ok() {
        println!("valid");
        return Ok(exit_codes::OK);
    }
    for error in &report.errors {
        println!("- {error}");
    }
    Ok(exit_codes::FAILED)
}

fn cmd_classify(file: &Path, explain: bool) -> Result<i32> {
    let (flow_type, rule) = classifier::explain(&read_flow_file(file)?);
    if explain {
        println!("{flow_type} ({rule})");
    } else {
        println!("{flow_type}");
    }
    Ok(exit_codes::OK)
}

fn cmd_generate(
    cfg: &DeployerConfig,
    request: &GenerateRequest<'_>,
    patterns: Option<&Path>,
    out: Option<&Path>,
) -> Result<i32> {
    let model = build_model(&cfg.model)?;
    let retriever: Box<dyn Retriever> = match patterns {
        Some(dir) => Box::new(PatternDirRetriever::new(dir, PATTERN_LIMIT)),
        None => Box::new(NoRetriever),
    };
    let generator = FlowGenerator::new(model, retriever, &cfg.api_version);
    let document = generator.generate(request)?;
    match out {
        Some(path) => {
            fs::write(path, &document).with_context(|| format!("write {}", path.display()))?;
            info!(path = %path.display(), "generated flow written");
        }
        None => println!("{document}"),
    }
    Ok(exit_codes::OK)
}

fn cmd_deploy(
    cfg: &DeployerConfig,
    file: &Path,
    name: Option<&str>,
    check_only: bool,
    out: Option<&Path>,
) -> Result<i32> {
    let document = read_flow_file(file)?;
    let flow_name = match name {
        Some(name) => name.to_string(),
        None => {
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("cannot derive flow name from {}", file.display()))?;
            flow_name_from_file_name(file_name).to_string()
        }
    };
    validate_flow_name(&flow_name)?;

    let credentials = cfg.salesforce.credentials()?;
    let authenticator = Authenticator::new(&cfg.api_version)?;
    let session = authenticator.login(credentials)?;
    let session = authenticator.verify(&session, credentials)?;

    let log = AuditLog::open(&cfg.logs_dir, &flow_name)?;
    let transport = HttpSoapTransport::new()?;
    let client = MetadataClient::new(&transport, session, &cfg.api_version);
    let repairer = RepairDispatcher::new(build_model(&cfg.model)?);

    let outcome = run_auto_deploy(
        DeployRequest::new(&flow_name, document, check_only)?,
        &LoopSettings::from_config(cfg),
        &repairer,
        &client,
        &log,
    );

    if let Some(path) = out {
        fs::write(path, &outcome.final_document)
            .with_context(|| format!("write {}", path.display()))?;
    }
    print_outcome(&outcome, log.path());
    Ok(outcome.exit_code())
}

fn print_outcome(outcome: &RunOutcome, log: &Path) {
    match &outcome.terminal {
        Terminal::Success {
            deploy_id,
            check_only,
        } => {
            let what = if *check_only { "validated" } else { "deployed" };
            println!("{} {what} ({deploy_id})", outcome.flow_name);
        }
        Terminal::Failed { reason, errors } => {
            println!("{} failed: {reason}", outcome.flow_name);
            for error in errors {
                println!("- {error}");
            }
        }
        Terminal::TimedOut {
            deploy_id,
            last_state,
            waited,
        } => println!(
            "{} timed out after {}s waiting for {deploy_id} (last state: {})",
            outcome.flow_name,
            waited.as_secs(),
            last_state.as_deref().unwrap_or("unknown")
        ),
    }
    println!(
        "structure fixes: {}, deploy fixes: {}, submissions: {}",
        outcome.structure_fixes, outcome.deploy_fixes, outcome.submissions
    );
    println!("log: {}", log.display());
}

fn cmd_tail(cfg: &DeployerConfig, name: &str, follow: bool) -> Result<i32> {
    validate_flow_name(name)?;
    let path = log_path(&cfg.logs_dir, name);
    let mut offset = 0;
    let mut stdout = std::io::stdout();
    loop {
        let (text, next) = read_from(&path, offset)?;
        if !text.is_empty() {
            stdout.write_all(text.as_bytes()).context("write stdout")?;
            stdout.flush().context("flush stdout")?;
        }
        offset = next;
        if !follow {
            return Ok(exit_codes::OK);
        }
        thread::sleep(TAIL_INTERVAL);
    }
}
