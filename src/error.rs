//! Error types for bhuja-io

use std::collections::BTreeMap;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// bhuja-io error types
///
/// Rough taxonomy: configuration errors are fatal at load time,
/// protocol validation errors are rejected before any bytes hit the
/// wire, transport errors surface immediately to the caller, and
/// `AckTimeout` is the only timing error. Malformed *incoming* lines
/// never become an `Error` at all - the listener logs and drops them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Config file write error
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Bad calibration entry (zero direction, wrong joint count, ...)
    #[error("Invalid calibration for joint {joint}: {reason}")]
    InvalidCalibration { joint: usize, reason: String },

    /// Packet TYPE is not CMD/DATA/ACK
    #[error("Invalid TYPE: {0}. Must be one of: CMD, DATA, ACK")]
    UnknownType(String),

    /// CMD parameter missing where the type requires one
    #[error("CMD parameter required for TYPE={0}")]
    MissingCommand(&'static str),

    /// Command name not in the schema table for its type
    #[error("Unknown {ptype} command: {cmd}")]
    UnknownCommand { ptype: &'static str, cmd: String },

    /// Command sent from a mode outside its allowed set
    #[error("Command '{cmd}' not allowed in mode {mode} ({mode_label}). Allowed modes: {allowed:?}")]
    ModeNotAllowed {
        cmd: &'static str,
        mode: u8,
        mode_label: &'static str,
        allowed: Vec<&'static str>,
    },

    /// Required keys absent from the field set
    #[error("Command '{cmd}' missing required keys: {missing:?}")]
    MissingKeys {
        cmd: &'static str,
        missing: Vec<&'static str>,
    },

    /// Keys outside required ∪ optional
    #[error("Command '{cmd}' received unexpected keys: {unexpected:?}")]
    UnexpectedKeys {
        cmd: &'static str,
        unexpected: Vec<String>,
    },

    /// Value outside a key's enumerated constraint set
    #[error("Key '{key}' = {value} not in allowed values: {allowed:?}")]
    ConstraintViolation {
        key: &'static str,
        value: String,
        allowed: Vec<&'static str>,
    },

    /// Blank line handed to the parser
    #[error("Empty packet")]
    EmptyPacket,

    /// Segment without '='
    #[error("Malformed key-value pair: {0}")]
    MalformedPair(String),

    /// Blank key before '='
    #[error("Empty key in pair: {0}")]
    EmptyKey(String),

    /// Parsed packet has no TYPE field
    #[error("Packet missing TYPE field")]
    MissingType,

    /// Telemetry packet missing or mangling a required field
    #[error("Bad telemetry field {field}: {reason}")]
    BadTelemetry { field: String, reason: String },

    /// ACK verification: received packet is not TYPE=ACK
    #[error("Expected TYPE=ACK, got TYPE={0}")]
    TypeMismatch(String),

    /// ACK verification: field sets differ
    #[error("ACK mismatch:\n  sent: {sent:?}\n  received: {received:?}")]
    AckMismatch {
        sent: BTreeMap<String, String>,
        received: BTreeMap<String, String>,
    },

    /// No matching ACK arrived within the timeout window
    #[error("Timeout waiting for ACK (sent: {0})")]
    AckTimeout(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
