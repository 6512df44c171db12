//! GasCal - Main Entry Point
//!
//! Command line host for the acquisition loop and the calibration workflow.
//!
//! # Usage
//!
//! Run the acquisition loop (stop with Ctrl-D):
//! ```bash
//! gascal acquire
//! gascal acquire --simulate
//! ```
//!
//! Query and calibrate from another terminal:
//! ```bash
//! gascal read
//! gascal calibrate --reference 20.9
//! gascal history
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gascal_rs::{
    backend::{AcquisitionCommand, AcquisitionEvent, AcquisitionService, IioAdc, SimulatedAdc},
    calibration::{CommitOutcome, Decision},
    config::{app_data_dir, AppConfig, CONFIG_FILE},
    Instrument, VoltageSource,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "gascal")]
#[command(about = "Gas sensor acquisition and calibration", long_about = None)]
struct Cli {
    /// Configuration file (TOML), defaults to gascal.toml in the data directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the acquisition loop until stdin closes
    ///
    /// While running, typing `stop`, `start` or `stats` controls the loop.
    Acquire {
        /// Use the simulated ADC instead of the IIO device
        #[arg(long)]
        simulate: bool,
    },

    /// Print the current reading with concentrations
    Read,

    /// Recalibrate against a reference gas
    Calibrate {
        /// Reference concentration in percent (default from config, 20.9 for air)
        #[arg(long)]
        reference: Option<f64>,

        /// Accept without asking
        #[arg(long)]
        yes: bool,
    },

    /// List the calibration ledger
    History,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Acquire { simulate } => {
            let data_dir = config.storage.resolve_data_dir()?;
            let _guard = init_logging(Some(&data_dir));
            run_acquire(config, simulate)
        }
        Commands::Read => {
            init_logging(None);
            run_read(config)
        }
        Commands::Calibrate { reference, yes } => {
            init_logging(None);
            run_calibrate(config, reference, yes)
        }
        Commands::History => {
            init_logging(None);
            run_history(config)
        }
    }
}

/// Install the subscriber, with a daily rolling file when `log_dir` is set
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gascal.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gascal_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return AppConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    match app_data_dir().map(|dir| dir.join(CONFIG_FILE)) {
        Some(path) => AppConfig::load_or_default(&path)
            .with_context(|| format!("Invalid config at {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

fn run_acquire(config: AppConfig, simulate: bool) -> Result<()> {
    let source: Box<dyn VoltageSource> = if simulate {
        Box::new(SimulatedAdc::reference_instrument())
    } else {
        let adc = IioAdc::new(&config.hardware.iio_device);
        if !adc.is_present() {
            bail!(
                "No IIO device at {} (use --simulate to run without hardware)",
                config.hardware.iio_device.display()
            );
        }
        Box::new(adc)
    };

    let instrument = Instrument::open(config.clone())?;
    let (service, handle) = AcquisitionService::new(config, source, instrument.store());

    tracing::info!("Starting acquisition");
    let worker = std::thread::Builder::new()
        .name("acquisition".to_string())
        .spawn(move || service.run())
        .context("Failed to spawn acquisition thread")?;

    let commands = handle.command_sender.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let cmd = match line.trim() {
                "start" => AcquisitionCommand::Start,
                "stop" => AcquisitionCommand::Stop,
                "stats" => AcquisitionCommand::RequestStats,
                "" => continue,
                other => {
                    eprintln!("Unknown command '{}' (start, stop, stats)", other);
                    continue;
                }
            };
            if commands.send(cmd).is_err() {
                return;
            }
        }
        let _ = commands.send(AcquisitionCommand::Shutdown);
    });

    for event in handle.receiver.iter() {
        match event {
            AcquisitionEvent::Published(sample) => {
                tracing::trace!("Published {} readings", sample.readings.len());
            }
            AcquisitionEvent::StateChanged(state) => println!("Acquisition {}", state),
            AcquisitionEvent::Stats(stats) => {
                println!(
                    "Cycles: {}, sub-read success: {:.1}%, last cycle: {:.1} ms, dropped events: {}",
                    stats.cycles_published,
                    stats.success_rate(),
                    stats.last_cycle_ms,
                    stats.dropped_events
                );
                for (channel, adc) in &stats.channels {
                    println!(
                        "  Sensor {}: {:.1}% ok, {} timeouts, avg {:.0} us, jitter {} us",
                        channel,
                        adc.success_rate(),
                        adc.timeouts,
                        adc.avg_read_time_us(),
                        adc.jitter_us()
                    );
                }
            }
            AcquisitionEvent::ChannelFault { .. } | AcquisitionEvent::PublishFailed(_) => {}
            AcquisitionEvent::Shutdown => break,
        }
    }

    match worker.join() {
        Ok(result) => result?,
        Err(_) => bail!("Acquisition thread panicked"),
    }
    tracing::info!("Shutting down...");
    Ok(())
}

fn run_read(config: AppConfig) -> Result<()> {
    let stale_after = config.calibration.max_sample_age();
    let instrument = Instrument::open(config)?;

    match instrument.readout()? {
        Some(readout) => {
            print!("{}", readout);
            if readout.is_stale(stale_after) {
                println!("Warning: reading is stale, is the acquisition loop running?");
            }
        }
        None => println!("No reading published yet"),
    }
    Ok(())
}

fn run_calibrate(config: AppConfig, reference: Option<f64>, yes: bool) -> Result<()> {
    let reference = reference.unwrap_or(config.calibration.default_reference_pct);
    let instrument = Instrument::open(config)?;

    println!("Calibrating with {:.1}% reference gas", reference);
    let proposal = instrument
        .request_calibration(reference)
        .context("Calibration refused")?;

    for line in proposal.report_lines() {
        println!("{}", line);
    }

    let decision = if yes {
        Decision::Accept
    } else {
        print!("\nAccept calibration? (y/n): ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        if answer.trim().eq_ignore_ascii_case("y") {
            Decision::Accept
        } else {
            Decision::Decline
        }
    };

    match instrument.decide(&proposal, decision)? {
        CommitOutcome::Accepted(_) => println!("Calibration saved and applied"),
        CommitOutcome::Rejected(Some(_)) => println!("Calibration discarded (kept as rejected)"),
        CommitOutcome::Rejected(None) => println!("Calibration discarded"),
        CommitOutcome::AlreadyApplied => println!("Calibration was already applied"),
    }
    Ok(())
}

fn run_history(config: AppConfig) -> Result<()> {
    let instrument = Instrument::open(config)?;
    let history = instrument.history()?;

    if history.is_empty() {
        println!("No calibrations recorded");
        return Ok(());
    }

    for record in history {
        let gains: Vec<String> = record
            .gains
            .iter()
            .map(|g| format!("{}: {:.6}", g.channel, g.gain))
            .collect();
        let reference = record
            .reference_pct
            .map(|r| format!(" @ {:.1}%", r))
            .unwrap_or_default();
        println!(
            "{}  {:<8}{}  [{}]",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.status.to_string(),
            reference,
            gains.join(", ")
        );
    }
    Ok(())
}
