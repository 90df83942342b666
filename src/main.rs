//! bhuja-io daemon - serial link to the arm from the command line
//!
//! Two run modes:
//! - `monitor`: switch the firmware to MOVE and print logical joint
//!   angles as telemetry arrives
//! - `calibrate`: switch the firmware to CALIBRATION and run the
//!   18-capture sequence driven by the controller's capture button

use bhuja_io::calibration::{CalibrationSession, RangeObserver};
use bhuja_io::config::AppConfig;
use bhuja_io::error::{Error, Result};
use bhuja_io::link::ArmLink;
use bhuja_io::mapping::NUM_JOINTS;
use bhuja_io::protocol::{set_mode, JointTelemetry, Mode};
use bhuja_io::transport::{MockTransport, SerialTransport, Transport};
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/bhuja.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `bhuja-io --config <path> [mode]`
/// - `bhuja-io -c <path> [mode]`
fn parse_config_path(args: &[String]) -> String {
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

/// Last positional argument that is not a flag or a flag's value.
fn parse_run_mode(args: &[String]) -> String {
    let mut skip_next = false;
    let mut mode = "monitor".to_string();
    for arg in &args[1..] {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--config" || arg == "-c" {
            skip_next = true;
            continue;
        }
        if !arg.starts_with('-') {
            mode = arg.clone();
        }
    }
    mode
}

struct LogObserver;

impl RangeObserver for LogObserver {
    fn joint_range_updated(&mut self, joint: usize, min_deg: f64, max_deg: f64, start_deg: f64) {
        log::info!(
            "Joint {} range: [{:.1}°, {:.1}°], start {:.1}°",
            joint + 1,
            min_deg,
            max_deg,
            start_deg
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config_path = parse_config_path(&args);
    let run_mode = parse_run_mode(&args);

    let config = if Path::new(&config_path).exists() {
        log::info!("Using config: {}", config_path);
        AppConfig::from_file(&config_path)?
    } else {
        log::warn!("Config {} not found, using built-in defaults", config_path);
        let defaults = AppConfig::arm_defaults();
        defaults.validate()?;
        defaults
    };

    let transport: Box<dyn Transport> = if config.serial.dry_run {
        log::warn!("Dry run: packets go to a mock transport, nothing is sent");
        Box::new(MockTransport::new())
    } else {
        Box::new(SerialTransport::open(&config.serial.port, config.serial.baud)?)
    };

    let mut link = ArmLink::new(transport, config.link.clone());

    // Telemetry handler runs on the listener thread: just queue and return
    let (telemetry_tx, telemetry_rx) = crossbeam_channel::bounded(100);
    link.set_telemetry_handler(move |packet| {
        // Drop ticks when the consumer falls behind
        let _ = telemetry_tx.try_send(packet);
    });
    link.start()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let current_mode = Mode::from_u8(config.default_mode)
        .ok_or_else(|| Error::Other(format!("bad default_mode {}", config.default_mode)))?;

    let result = match run_mode.as_str() {
        "monitor" => run_monitor(&link, &config, current_mode, &running, &telemetry_rx),
        "calibrate" => run_calibrate(&link, &config, current_mode, &running, &telemetry_rx),
        other => Err(Error::Other(format!(
            "unknown run mode '{}' (expected monitor or calibrate)",
            other
        ))),
    };

    link.stop();
    result
}

fn run_monitor(
    link: &ArmLink,
    config: &AppConfig,
    current_mode: Mode,
    running: &AtomicBool,
    telemetry_rx: &crossbeam_channel::Receiver<bhuja_io::protocol::Packet>,
) -> Result<()> {
    let joints = config.joint_table()?;

    let packet = set_mode(current_mode, Mode::Move)?;
    if config.serial.dry_run {
        link.send(&packet)?; // no firmware on the other end, skip the ACK wait
    } else {
        link.send_command(&packet)?;
    }
    log::info!("Firmware in MOVE mode, printing logical angles");

    while running.load(Ordering::Relaxed) {
        let Ok(packet) = telemetry_rx.recv_timeout(Duration::from_millis(200)) else {
            continue;
        };
        let telemetry = match JointTelemetry::from_packet(&packet) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("Bad telemetry: {}", e);
                continue;
            }
        };

        let mut line = String::new();
        for i in 0..NUM_JOINTS {
            let logical = joints[i].raw_to_logical(telemetry.raw_angles[i]);
            line.push_str(&format!("J{}={:.1}° ", i + 1, logical));
        }
        log::info!("{}", line.trim_end());
    }

    Ok(())
}

fn run_calibrate(
    link: &ArmLink,
    config: &AppConfig,
    current_mode: Mode,
    running: &AtomicBool,
    telemetry_rx: &crossbeam_channel::Receiver<bhuja_io::protocol::Packet>,
) -> Result<()> {
    let mut joints = config.joint_table()?;
    let mut session = CalibrationSession::new();
    let mut observer = LogObserver;

    let packet = set_mode(current_mode, Mode::Calibration)?;
    if config.serial.dry_run {
        link.send(&packet)?;
    } else {
        link.send_command(&packet)?;
    }

    session.start();
    log::info!(
        "Calibration running: move the joint, press and release the capture button. {}",
        session.status()
    );

    while running.load(Ordering::Relaxed) && session.is_active() {
        let Ok(packet) = telemetry_rx.recv_timeout(Duration::from_millis(200)) else {
            continue;
        };
        let telemetry = match JointTelemetry::from_packet(&packet) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("Bad telemetry: {}", e);
                continue;
            }
        };

        let capture = session.process_button(telemetry.button);
        if !capture {
            continue;
        }

        let Some((joint, _)) = session.position() else {
            continue;
        };
        let done = session.capture(telemetry.raw_angles[joint], &mut joints, &mut observer);
        if done {
            log::info!("Calibration complete for all {} joints", NUM_JOINTS);
        } else {
            log::info!("Next capture: {}", session.status());
        }
    }

    if session.is_active() {
        session.stop();
        log::warn!("Calibration aborted before completion");
    }

    Ok(())
}
