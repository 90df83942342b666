//! Serial link lifecycle: listener thread, command lane, telemetry lane
//!
//! One [`ArmLink`] owns a transport shared between the background
//! reader thread (read side) and the command-issuing caller (write
//! side). The two sides meet in exactly one place, the mutex-protected
//! latest-ACK slot; telemetry flows out through an injected callback
//! that runs on the listener thread.

mod ack;
mod listener;

pub use ack::AckSlot;

use crate::error::{Error, Result};
use crate::protocol::{verify_ack, Packet};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback invoked on the listener thread for each DATA packet
///
/// Handlers must not block or mutate UI state; hand the packet off
/// through a thread-safe queue and return.
pub type TelemetryHandler = Box<dyn Fn(Packet) + Send + 'static>;

/// Link timing tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    /// Listener idle sleep between empty read attempts (ms)
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
    /// Poll interval while waiting for an ACK (ms)
    #[serde(default = "default_ack_poll_ms")]
    pub ack_poll_interval_ms: u64,
    /// Default ACK timeout for `send_command` (ms)
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// How long `stop()` waits for the listener to exit (ms)
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_join_timeout_ms: u64,
}

fn default_idle_sleep_ms() -> u64 {
    10
}
fn default_ack_poll_ms() -> u64 {
    10
}
fn default_ack_timeout_ms() -> u64 {
    5000
}
fn default_stop_timeout_ms() -> u64 {
    2000
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            idle_sleep_ms: default_idle_sleep_ms(),
            ack_poll_interval_ms: default_ack_poll_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            stop_join_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

/// Serial link to the arm's microcontroller
///
/// Foreground flow: build → `send` → `wait_for_ack`. Background flow:
/// the reader thread drains the transport and routes ACK/DATA lines.
/// Dropping the link stops the listener.
pub struct ArmLink {
    /// Transport shared between reader thread (read) and callers (write)
    port: Arc<Mutex<Box<dyn Transport>>>,
    /// Latest-ACK slot, the only state shared across the two flows
    ack: AckSlot,
    /// Cooperative stop flag for the reader thread
    shutdown: Arc<AtomicBool>,
    /// Reader thread handle - joined (bounded) on stop
    reader_handle: Option<JoinHandle<()>>,
    /// Telemetry callback, settable before or after start
    telemetry: Arc<Mutex<Option<TelemetryHandler>>>,
    config: LinkConfig,
}

impl ArmLink {
    /// Create a link over an open transport. The listener is not
    /// started yet; call [`ArmLink::start`].
    pub fn new(transport: Box<dyn Transport>, config: LinkConfig) -> Self {
        Self {
            port: Arc::new(Mutex::new(transport)),
            ack: AckSlot::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            reader_handle: None,
            telemetry: Arc::new(Mutex::new(None)),
            config,
        }
    }

    /// Register the callback for incoming DATA packets.
    ///
    /// Invoked from the listener thread; keep it non-blocking.
    pub fn set_telemetry_handler<F>(&self, handler: F)
    where
        F: Fn(Packet) + Send + 'static,
    {
        let mut slot = self.telemetry.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Box::new(handler));
    }

    /// Start the background listener thread.
    ///
    /// Starting while a listener is already running is a no-op with a
    /// warning, not an error.
    pub fn start(&mut self) -> Result<()> {
        if let Some(handle) = &self.reader_handle {
            if !handle.is_finished() {
                log::warn!("Listener already running");
                return Ok(());
            }
        }

        self.shutdown.store(false, Ordering::Relaxed);
        self.ack.clear();

        let port = Arc::clone(&self.port);
        let shutdown = Arc::clone(&self.shutdown);
        let ack = self.ack.clone();
        let telemetry = Arc::clone(&self.telemetry);
        let idle_sleep = Duration::from_millis(self.config.idle_sleep_ms);

        self.reader_handle = Some(
            thread::Builder::new()
                .name("arm-link-reader".to_string())
                .spawn(move || {
                    listener::reader_loop(port, shutdown, ack, telemetry, idle_sleep);
                })
                .map_err(|e| Error::Other(format!("Failed to spawn listener thread: {}", e)))?,
        );

        log::info!("Listener thread started");
        Ok(())
    }

    /// True while the listener thread is alive.
    pub fn is_running(&self) -> bool {
        self.reader_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the listener: set the flag, wait up to the configured
    /// timeout for the thread to exit, then detach with a warning.
    ///
    /// Best-effort shutdown - never blocks indefinitely.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        let Some(handle) = self.reader_handle.take() else {
            return;
        };

        let deadline = Instant::now() + Duration::from_millis(self.config.stop_join_timeout_ms);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("Listener thread panicked");
            }
            log::info!("Listener thread stopped");
        } else {
            // Detach; the thread will still observe the flag eventually
            log::warn!("Listener thread did not stop within timeout");
        }
    }

    /// Write one packet line to the transport.
    ///
    /// Normalizes a single trailing terminator and flushes. Unlike the
    /// receive path, write failures surface to the caller.
    pub fn send(&self, packet: &str) -> Result<()> {
        let mut line = packet.trim_end_matches('\n').to_string();
        line.push('\n');

        let mut port = self
            .port
            .lock()
            .map_err(|_| Error::Other("port mutex poisoned".to_string()))?;
        port.write_all(line.as_bytes())?;
        port.flush()?;
        log::debug!("Sent: {}", line.trim_end());
        Ok(())
    }

    /// Block until the latest-ACK slot holds a verified echo of
    /// `sent`, or the timeout elapses.
    ///
    /// A present-but-unmatched ACK is left in the slot: it is never
    /// discarded speculatively, polling just continues past it.
    pub fn wait_for_ack(&self, sent: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let poll = Duration::from_millis(self.config.ack_poll_interval_ms);

        loop {
            if let Some(ack) = self.ack.peek() {
                if verify_ack(sent, &ack).is_ok() {
                    self.ack.clear();
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::AckTimeout(sent.trim().to_string()));
            }
            thread::sleep(poll);
        }
    }

    /// Send a command packet and block for its ACK using the
    /// configured default timeout.
    pub fn send_command(&self, packet: &str) -> Result<()> {
        self.send(packet)?;
        self.wait_for_ack(packet, Duration::from_millis(self.config.ack_timeout_ms))
    }
}

impl Drop for ArmLink {
    fn drop(&mut self) {
        self.stop();
    }
}
