//! Property-manager backup/restore tool
//!
//! Provides CLI interface for database backup and restore operations

// pm-backup/src/main.rs
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use pm_backup::backup::list_backups;
use pm_backup::{AppConfig, JobEvent, JobHandle, Orchestrator};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.properties";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run_app() {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_app() -> Result<()> {
    let config_path = env::var("PM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let app_config = AppConfig::load(&config_path);

    let args: Vec<String> = env::args().skip(1).collect();
    let choice = match args.first() {
        Some(arg) => arg.trim().to_string(),
        None => prompt_choice()?,
    };
    let operand = args.get(1).map(|s| s.trim().to_string());

    match choice.as_str() {
        "1" | "backup" => {
            let directory = operand
                .map(PathBuf::from)
                .unwrap_or_else(|| app_config.backup_dir.clone());
            println!("🚀 Starting Backup Process into {}...", directory.display());
            let orchestrator = Orchestrator::postgres(app_config);
            let handle = orchestrator
                .start_backup(directory)
                .context("Failed to start backup")?;
            watch(handle).context("Backup process failed")?;
        }
        "2" | "restore" => {
            let source = match operand {
                Some(path) => PathBuf::from(path),
                None => latest_backup(&app_config)?,
            };
            println!("🔄 Starting Restore Process from {}...", source.display());
            let orchestrator = Orchestrator::postgres(app_config);
            let handle = orchestrator
                .start_restore(source)
                .context("Failed to start restore")?;
            watch(handle).context("Restore process failed")?;
        }
        "3" | "list" => {
            let json = operand.as_deref() == Some("--json");
            print_backups(&app_config, json)?;
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (backup), '2' (restore), or '3' (list).");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

/// Acts as the interactive thread: checks the job on a fixed tick and
/// prints whatever arrived, never blocking on the worker.
fn watch(mut handle: JobHandle) -> Result<()> {
    println!("Job {} ({})", handle.id(), handle.kind());
    loop {
        for event in handle.poll() {
            match event {
                JobEvent::Progress(update) => {
                    println!("[{:>3.0}%] {:?}: {}", update.fraction * 100.0, update.phase, update.message);
                }
                JobEvent::Done(summary) => {
                    println!(
                        "✓ {} finished via {} in {:.1}s: {}",
                        summary.kind,
                        summary.strategy,
                        summary.elapsed.as_secs_f32(),
                        summary.path.display()
                    );
                    for count in &summary.tables {
                        println!("    {:<32} {:>8} rows", count.table, count.rows);
                    }
                }
                JobEvent::Failed(message) => anyhow::bail!(message),
            }
        }
        if handle.is_finished() {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn latest_backup(app_config: &AppConfig) -> Result<PathBuf> {
    let backups = list_backups(&app_config.backup_dir)
        .with_context(|| format!("Failed to list backups in {}", app_config.backup_dir.display()))?;
    backups
        .into_iter()
        .next()
        .map(|entry| entry.path)
        .with_context(|| format!("No backups found in {}", app_config.backup_dir.display()))
}

fn print_backups(app_config: &AppConfig, json: bool) -> Result<()> {
    let backups = list_backups(&app_config.backup_dir)
        .with_context(|| format!("Failed to list backups in {}", app_config.backup_dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&backups).context("Failed to serialize backup list")?);
        return Ok(());
    }

    if backups.is_empty() {
        println!("No backups in {}", app_config.backup_dir.display());
    }
    for entry in &backups {
        println!(
            "{}  {:>8} KB  {}",
            entry.modified.format("%Y-%m-%d %H:%M:%S"),
            entry.size_kb,
            entry.name
        );
    }
    Ok(())
}

/// Prompts user to select an operation
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. Restore Latest Backup (or type 'restore')");
    println!("3. List Backups (or type 'list')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
