mod cli;

use clap::Parser;
use cli::{Cli, Command, LogFormat};
use pkg_gateway::http::HttpCluster;
use pkg_provision::access::{self, AccessSummary};
use pkg_provision::setup::setup_prerequisites;
use pkg_provision::{BatchController, Confirm, ProvisionError, ProvisionSettings};
use pkg_types::batch::{BatchMode, BatchReport, Outcome};
use pkg_types::config::{WorkshopConfigFile, load_config_file};
use pkg_validation::probe::endpoints_from_env;
use pkg_validation::{ValidationError, ValidationScope};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Interactive yes/no on the terminal; anything but an explicit yes declines.
struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or_else(|e| {
                warn!("Cannot ask for confirmation: {}", e);
                false
            })
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    let command = match cli.resolve() {
        Ok(command) => command,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };
    init_tracing(cli.log_format);

    // Load config file (returns defaults if file not found)
    let file_cfg: WorkshopConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);
    let settings = cli.settings(&file_cfg).unwrap_or_else(|e| fail(&e));
    let (server, token) = cli.endpoint(&file_cfg);
    info!("Cluster API: {}", server);
    let api = HttpCluster::new(&server, token, cli.insecure)?;

    let ok = match command {
        Command::Provision {
            source,
            password,
            options,
        } => {
            let report = BatchController::new(&api, &settings)
                .run_provision(&source, &password, options)
                .await
                .unwrap_or_else(|e| fail(&e));
            print_report(&report);
            if !report.dry_run {
                let summaries: Vec<AccessSummary> = report
                    .succeeded()
                    .map(|r| AccessSummary::for_user(&settings, &r.username))
                    .collect();
                emit_summaries(&summaries, cli.output.as_deref())?;
            }
            !report.has_failures()
        }
        Command::Cleanup { source, options } => {
            let report = BatchController::new(&api, &settings)
                .run_cleanup(&source, options, &TerminalConfirm)
                .await
                .unwrap_or_else(|e| fail(&e));
            print_report(&report);
            print_credential_notice(&report, &settings);
            !report.has_failures()
        }
        Command::Setup { dry_run } => {
            let outcome = setup_prerequisites(&api, &settings, dry_run)
                .await
                .unwrap_or_else(|e| fail(&e));
            println!("Cluster admin:     {}", outcome.admin);
            println!("Workspace API:     available");
            println!(
                "Credential store:  {} ({})",
                settings.credential_store,
                if outcome.credential_store_created {
                    "created"
                } else {
                    "present"
                }
            );
            true
        }
        Command::Validate {
            source,
            report,
            probe,
        } => {
            let scope = ValidationScope {
                source,
                probes: if probe { endpoints_from_env() } else { Vec::new() },
            };
            let result = match pkg_validation::validate(&api, &settings, &scope).await {
                Ok(r) => r,
                Err(ValidationError::Setup(e)) => fail(&e),
                Err(e) => return Err(e.into()),
            };
            print!("{}", result.render_table());
            result.write_json(&report)?;
            println!("Report written to {}", report.display());
            result.succeeded()
        }
        Command::GenerateUrls { source, output } => {
            let summaries = access::generate_urls(&api, &settings, &source)
                .await
                .unwrap_or_else(|e| fail(&e));
            if summaries.is_empty() {
                println!("(no provisioned users found)");
            }
            emit_summaries(&summaries, output.as_deref())?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Print a categorized fatal error with its hint and exit 1.
fn fail(err: &ProvisionError) -> ! {
    eprintln!("Error [{}]: {}", err.category(), err);
    if let Some(hint) = err.remediation() {
        eprintln!("Hint: {}", hint);
    }
    std::process::exit(1);
}

fn print_report(report: &BatchReport) {
    let done = match (report.mode, report.dry_run) {
        (BatchMode::Provision, false) => "created",
        (BatchMode::Cleanup, false) => "removed",
        (_, true) => "planned",
    };
    println!(
        "{:<16} {:<8} {}",
        "USER", "RESULT", if report.dry_run { "PLANNED ACTIONS" } else { "ACTIONS" }
    );
    for r in &report.results {
        let label = match r.outcome {
            Outcome::Created => done,
            Outcome::Skipped => "skipped",
            Outcome::Failed => "FAILED",
        };
        println!("{:<16} {:<8} {}", r.username, label, r.actions.join("; "));
        if let Some(err) = &r.error {
            println!("{:<16} {:<8} {}", "", "", err);
        }
    }
    println!();
    println!(
        "{}: {}  Skipped: {}  Failed: {}  Total: {}",
        capitalize(done),
        report.created_count(),
        report.skipped_count(),
        report.failed_count(),
        report.total()
    );
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_credential_notice(report: &BatchReport, settings: &ProvisionSettings) {
    if report.dry_run {
        return;
    }
    let removed: Vec<&str> = report
        .succeeded()
        .filter(|r| r.outcome == Outcome::Created)
        .map(|r| r.username.as_str())
        .collect();
    if removed.is_empty() {
        return;
    }
    println!();
    println!(
        "Credential entries were left in {} for: {}",
        settings.credential_store,
        removed.join(", ")
    );
    println!("Remove them manually if these users should no longer log in.");
}

fn emit_summaries(summaries: &[AccessSummary], output: Option<&Path>) -> anyhow::Result<()> {
    if summaries.is_empty() {
        return Ok(());
    }
    println!();
    print!("{}", access::render_all(summaries));
    if let Some(path) = output {
        let content = if path.extension().is_some_and(|e| e == "json") {
            serde_json::to_string_pretty(summaries)?
        } else {
            access::render_all(summaries)
        };
        std::fs::write(path, content)?;
        info!("Wrote {} access summaries to {}", summaries.len(), path.display());
    }
    Ok(())
}
