//! bhuja-io - serial link and calibration layer for a 6-DOF hobby arm
//!
//! Talks to the arm's Teensy over a textual key-value protocol with
//! two lanes on one wire: a synchronous command/ACK lane (one
//! outstanding command, verified by verbatim echo) and an asynchronous
//! telemetry lane (periodic encoder/button reports). On top of the
//! link sit the angle-mapping engine, which converts between raw
//! wrap-around AS5600 encoder readings and the logical angle space the
//! application works in, and the 3-point-per-joint calibration
//! sequence that produces the mapping parameters.
//!
//! The GUI, process startup and the physical port lifecycle are
//! consumers of these interfaces, not part of this crate's core.

pub mod calibration;
pub mod config;
pub mod error;
pub mod link;
pub mod mapping;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use link::{ArmLink, LinkConfig};
