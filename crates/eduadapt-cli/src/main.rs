//! EduAdapt CLI
//!
//! Serves the HTTP API and writes class group reports.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use eduadapt_core::{
    create_router, AppState, ClassGroup, Config, EduError, EngagementLevel, GeneratorProvider,
    JsonFileStore, Records, Role, Services, StudentPerformance,
};
use eduadapt_report::{EngagementBand, GroupReport, StudentRow};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Exit code for startup failures such as a bad config or a corrupted store.
const EXIT_FATAL: u8 = 2;

/// EduAdapt - adaptive learning server
///
/// Runs the student and teacher workflows behind an HTTP API and produces
/// performance reports for class groups.
#[derive(Parser, Debug)]
#[command(name = "eduadapt")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: eduadapt.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Never call the content provider; serve fallback content only
        #[arg(long)]
        offline: bool,
    },

    /// Write Markdown and JSON reports for class groups
    Report {
        /// Teacher username (default: every teacher with groups)
        #[arg(short, long, value_name = "USERNAME")]
        teacher: Option<String>,

        /// Only report on this group id
        #[arg(short, long, value_name = "ID", requires = "teacher")]
        group: Option<String>,

        /// Output directory for reports
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::debug!(config = ?args.config, "Config file");

    let result = match args.command {
        Command::Serve { port, offline } => serve(args.config.as_deref(), port, offline).await,
        Command::Report {
            teacher,
            group,
            output_dir,
        } => report(
            args.config.as_deref(),
            teacher.as_deref(),
            group.as_deref(),
            &output_dir,
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<EduError>().is_some_and(EduError::is_fatal) {
        EXIT_FATAL
    } else {
        1
    }
}

// ============================================================================
// serve
// ============================================================================

async fn serve(config_path: Option<&str>, port: u16, offline: bool) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if offline {
        config.generator.provider = GeneratorProvider::Offline;
    }
    print_config(&config);

    let services = Services::from_config(config)?;
    let router = create_router(AppState::new(services));

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    println!();
    println!("Shutting down...");
}

// ============================================================================
// report
// ============================================================================

fn report(
    config_path: Option<&str>,
    teacher: Option<&str>,
    group_id: Option<&str>,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = JsonFileStore::open(Path::new(&config.data_dir))?;
    let records = Records::open(Arc::new(store))?;

    let Some(teacher) = teacher else {
        let teachers = records.teachers_with_groups()?;
        if teachers.is_empty() {
            println!("No teacher has created a group yet.");
        }
        for teacher in &teachers {
            teacher_reports(&records, teacher, None, output_dir)?;
        }
        return Ok(());
    };

    match records.credential(teacher)? {
        Some(credential) if credential.role == Role::Teacher => {}
        Some(_) => anyhow::bail!("'{teacher}' is not a teacher"),
        None => anyhow::bail!(
            "Teacher '{teacher}' not found\n\nSuggestion: Check --teacher and the dataDir in your config"
        ),
    }

    teacher_reports(&records, teacher, group_id, output_dir)
}

fn teacher_reports(
    records: &Records,
    teacher: &str,
    group_id: Option<&str>,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let groups: Vec<ClassGroup> = records
        .groups(teacher)?
        .into_iter()
        .filter(|g| group_id.map_or(true, |id| g.id == id))
        .collect();

    if groups.is_empty() {
        match group_id {
            Some(id) => anyhow::bail!("Group '{id}' not found for teacher '{teacher}'"),
            None => {
                println!("Teacher '{teacher}' has no groups yet.");
                return Ok(());
            }
        }
    }

    println!("Generating reports for '{teacher}'...");
    for group in &groups {
        let report = group_report(teacher, group)?;
        let files = report
            .write_to_dir(output_dir)
            .with_context(|| format!("failed to write report for group '{}'", group.id))?;
        println!("  {} ({} students)", group.label(), report.summary.students);
        println!("    Markdown report: {}", files.markdown.display());
        println!("    JSON report: {}", files.json.display());
    }

    Ok(())
}

fn group_report(teacher: &str, group: &ClassGroup) -> anyhow::Result<GroupReport> {
    let report = GroupReport::builder()
        .teacher(teacher)
        .group_id(&group.id)
        .group_label(group.label())
        .students(group.students.iter().map(convert_performance).collect())
        .build()?;
    Ok(report)
}

fn convert_performance(performance: &StudentPerformance) -> StudentRow {
    StudentRow {
        student_name: performance.student_name.clone(),
        school: performance.school.clone(),
        grade: performance.grade.clone(),
        average_score: performance.average_score,
        completed_modules: performance.completed_modules,
        struggling_topic: performance.struggling_topic.clone(),
        engagement_level: convert_engagement(performance.engagement_level),
    }
}

const fn convert_engagement(level: EngagementLevel) -> EngagementBand {
    match level {
        EngagementLevel::High => EngagementBand::High,
        EngagementLevel::Medium => EngagementBand::Medium,
        EngagementLevel::Low => EngagementBand::Low,
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(Config::load_from_file(path)?)
        }
        None => Ok(Config::load()?),
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Data directory: {}", config.data_dir);
    println!("  Content provider: {:?}", config.generator.provider);
    println!("  Model: {}", config.generator.model);
    println!("  Timeout: {}s", config.generator.timeout_seconds);
    println!("  Demo code enabled: {}", config.demo.enabled);
}
