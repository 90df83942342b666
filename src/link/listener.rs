//! Reader loop for the serial link
//!
//! Runs on a background thread, continuously draining the transport,
//! reassembling newline-delimited packets and routing them:
//! ACK lines into the shared [`AckSlot`], DATA lines to the registered
//! telemetry handler. Malformed input of any kind is logged and
//! dropped - a corrupt line must never stop telemetry or future ACKs
//! from flowing, so nothing on the receive path propagates an error
//! out of this loop.

use super::ack::AckSlot;
use super::TelemetryHandler;
use crate::protocol::{parse_packet, PacketType};
use crate::transport::Transport;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Reader loop - drains the transport and routes parsed packets
///
/// The port lock is taken once per read attempt and released before
/// parsing or sleeping, so the command side can interleave writes.
/// The only suspension point is the idle sleep between empty reads,
/// which is also where a `shutdown` store is observed promptly.
pub(super) fn reader_loop(
    port: Arc<Mutex<Box<dyn Transport>>>,
    shutdown: Arc<AtomicBool>,
    ack_slot: AckSlot,
    telemetry: Arc<Mutex<Option<TelemetryHandler>>>,
    idle_sleep: Duration,
) {
    let mut buffer: Vec<u8> = Vec::new();

    while !shutdown.load(Ordering::Relaxed) {
        let got_data = {
            let Ok(mut port) = port.lock() else {
                log::error!("Reader: port mutex poisoned, exiting");
                break;
            };
            match port.available() {
                Ok(0) => false,
                Ok(_) => {
                    let mut chunk = [0u8; 256];
                    match port.read(&mut chunk) {
                        Ok(0) => false,
                        Ok(n) => {
                            buffer.extend_from_slice(&chunk[..n]);
                            true
                        }
                        Err(e) => {
                            log::error!("Listener read error: {}", e);
                            false
                        }
                    }
                }
                Err(e) => {
                    log::error!("Listener poll error: {}", e);
                    false
                }
            }
        };

        if !got_data {
            thread::sleep(idle_sleep);
            continue;
        }

        // Process complete lines
        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
            let line_bytes = &line_bytes[..line_bytes.len() - 1];

            let Ok(line) = std::str::from_utf8(line_bytes) else {
                log::warn!("Failed to decode line: {:02X?}", line_bytes);
                continue;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            handle_line(line, &ack_slot, &telemetry);
        }
    }

    log::info!("Listener thread exiting");
}

fn handle_line(line: &str, ack_slot: &AckSlot, telemetry: &Arc<Mutex<Option<TelemetryHandler>>>) {
    let packet = match parse_packet(line) {
        Ok(packet) => packet,
        Err(e) => {
            log::warn!("Malformed packet: {} - {}", line, e);
            return;
        }
    };

    // Only ACK and DATA are expected from the firmware
    match packet.packet_type() {
        Some(PacketType::Ack) => {
            ack_slot.store(line.to_string());
            log::debug!("ACK received: {}", line);
        }
        Some(PacketType::Data) => {
            let handler = telemetry.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(handler) = handler.as_ref() {
                // A misbehaving handler must not take down the listener
                if catch_unwind(AssertUnwindSafe(|| handler(packet))).is_err() {
                    log::error!("Telemetry handler panicked on: {}", line);
                }
            }
            log::debug!("DATA received: {}", line);
        }
        _ => {
            log::debug!("Other packet received: {}", line);
        }
    }
}
