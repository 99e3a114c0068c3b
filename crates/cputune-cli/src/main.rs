//! `cputune-cli` – CPUTune daemon
//!
//! This binary is the host for the reconciliation engine.  It:
//!
//! 1. Loads `/etc/cputune/config.toml` (or `$CPUTUNE_CONFIG`) and honours the
//!    `disabled` kill switch before touching any register.
//! 2. Installs the Ctrl-C / `SIGTERM` handler; without it no register is
//!    touched.
//! 3. Detects HWP support, opens `/dev/cpu/<n>/msr`, captures the original
//!    register state and applies the configured startup intent.
//! 4. Ticks the engine on a Tokio task until **Ctrl-C** or `SIGTERM`.
//! 5. Cancels the ticker and writes every captured register back.
//!
//! `cputune init-config` writes a default configuration file instead.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::Notify;
use tracing::{error, info};

use cputune_hal::{CpuCapabilities, FileDirectiveSource, RegisterAccessor};
use cputune_middleware::{EventBus, Topic, TopicReceiver};
use cputune_runtime::{ReconciliationEngine, RestoreReport, init_tracing, ticker};
use cputune_types::{EventPayload, TuneError};

fn main() -> ExitCode {
    if let Some(command) = std::env::args().nth(1) {
        return match command.as_str() {
            "init-config" => init_config(),
            "-h" | "--help" | "help" => {
                print_usage();
                ExitCode::SUCCESS
            }
            other => {
                eprintln!("{}: unknown command {other:?}", "Error".red());
                print_usage();
                ExitCode::FAILURE
            }
        };
    }

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    // ── Structured logging ────────────────────────────────────────────────
    // Hold the guard until exit so pending spans are flushed.
    let _telemetry = init_tracing("cputune", cfg.log_format);

    print_banner();
    println!(
        "  Config: {}",
        config::config_path().display().to_string().bold()
    );

    if cfg.disabled {
        info!("cputune is disabled; leaving registers untouched");
        println!("  {}", "Disabled by configuration – exiting.".yellow());
        return ExitCode::SUCCESS;
    }

    // A signal arriving before the wait below is kept as a pending permit.
    let shutdown = match install_shutdown_handler() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            error!(error = %e, "refusing to touch registers");
            eprintln!("{}: {e}", "Error".red());
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, shutdown)) {
        Ok(report) => {
            print_report(&report);
            if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!(error = %e, "cputune stopped");
            eprintln!("{}: {e}", "Error".red());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Daemon lifecycle
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: config::Config, shutdown: Arc<Notify>) -> Result<RestoreReport, TuneError> {
    let capabilities = CpuCapabilities::detect();
    info!(
        model = format_args!("0x{:x}", capabilities.model),
        hwp = capabilities.hwp,
        "detected cpu"
    );
    let registers = open_registers(cfg.cpu)?;

    let bus = EventBus::default();
    let printer = tokio::spawn(print_changes(bus.subscribe_to(Topic::RegisterChanges)));

    let mut engine = ReconciliationEngine::new(
        registers,
        FileDirectiveSource::new(),
        capabilities,
        cfg.engine_config(),
    )
    .with_bus(bus.clone());
    engine.on_startup_capture();
    engine.on_initial_apply(&cfg.initial_intent());

    println!(
        "  Ticking every {} ms (first tick in {} ms). Press {} to stop.\n",
        cfg.update_interval_ms,
        cfg.initial_delay_ms,
        "Ctrl-C".bold()
    );
    let handle = ticker::spawn(engine, cfg.initial_delay());

    shutdown.notified().await;

    let mut engine = handle.cancel().await?;
    let report = engine.on_shutdown_restore();

    // Closing every sender ends the printer once it has drained.
    drop(engine);
    drop(bus);
    let _ = printer.await;

    Ok(report)
}

/// Route Ctrl-C / `SIGTERM` to the returned [`Notify`].
fn install_shutdown_handler() -> Result<Arc<Notify>, TuneError> {
    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Shutdown requested – restoring original register state …"
                .yellow()
                .bold()
        );
        signal.notify_one();
    })
    .map_err(|e| {
        TuneError::Config(format!(
            "cannot install signal handler, registers could not be restored: {e}"
        ))
    })?;
    Ok(shutdown)
}

#[cfg(unix)]
fn open_registers(cpu: u32) -> Result<Box<dyn RegisterAccessor>, TuneError> {
    let device = cputune_hal::MsrDevice::open(cpu)?;
    info!(path = %device.path().display(), "opened msr device");
    Ok(Box::new(device))
}

#[cfg(not(unix))]
fn open_registers(_cpu: u32) -> Result<Box<dyn RegisterAccessor>, TuneError> {
    Err(TuneError::Config(
        "msr device access is only available on Unix hosts".to_string(),
    ))
}

async fn print_changes(mut changes: TopicReceiver) {
    while let Some(event) = changes.recv().await {
        match event.payload {
            EventPayload::RegisterChanged {
                feature,
                register,
                from,
                to,
            } => {
                let label = feature.map(|f| f.to_string()).unwrap_or_default();
                println!(
                    "  {} {register}: 0x{from:x} → 0x{to:x} {}",
                    "✓".green(),
                    label.dimmed()
                );
            }
            EventPayload::RegisterRestored { register, from, to } => {
                println!(
                    "  {} {register}: 0x{from:x} → 0x{to:x} {}",
                    "↺".cyan(),
                    "restored".dimmed()
                );
            }
            EventPayload::Diagnostic { .. } => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn init_config() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        eprintln!(
            "{}: {} already exists",
            "Refusing to overwrite".red(),
            path.display()
        );
        return ExitCode::FAILURE;
    }
    match config::save_to(&config::Config::default(), &path) {
        Ok(()) => {
            println!(
                "  {} Config written to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Error saving config".red());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____ _____  _    _ _______"#.bold().cyan());
    println!("{}", r#"  / ____|  __ \| |  | |__   __|   _ _ __   ___"#.bold().cyan());
    println!("{}", r#" | |    | |__) | |  | |  | | | | | | '_ \ / _ \"#.bold().cyan());
    println!("{}", r#" | |____|  ___/| |__| |  | | | |_| | | | |  __/"#.bold().cyan());
    println!("{}", r#"  \_____|_|     \____/   |_|  \__,_|_| |_|\___|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "CPUTune".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Turbo Boost, PROCHOT and Speed Shift control via MSRs");
    println!();
}

fn print_report(report: &RestoreReport) {
    println!();
    println!(
        "  {} restored, {} unchanged, {} failed",
        report.restored.len().to_string().green(),
        report.unchanged.len(),
        if report.failed.is_empty() {
            "0".normal()
        } else {
            report.failed.len().to_string().red()
        }
    );
    for (register, e) in &report.failed {
        println!("    {} {register}: {e}", "✗".red());
    }
    println!("  {}", "✓ Exiting CPUTune.".green());
}

fn print_usage() {
    println!("Usage: cputune [init-config]");
    println!();
    println!("  (no command)   run the daemon until Ctrl-C or SIGTERM");
    println!("  init-config    write a default config to $CPUTUNE_CONFIG or /etc/cputune/config.toml");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_handler_install_is_a_config_error() {
        let first = install_shutdown_handler();
        assert!(first.is_ok());
        assert!(matches!(
            install_shutdown_handler(),
            Err(TuneError::Config(_))
        ));
    }

    #[tokio::test]
    async fn early_signal_is_not_lost() {
        let shutdown = Arc::new(Notify::new());
        shutdown.notify_one();
        let waited =
            tokio::time::timeout(std::time::Duration::from_secs(1), shutdown.notified()).await;
        assert!(waited.is_ok());
    }
}
