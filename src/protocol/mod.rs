//! Schema-validated text protocol for the arm's serial link
//!
//! Two logical lanes share one wire:
//! - Command lane: `TYPE=CMD` out, `TYPE=ACK` back (verbatim echo)
//! - Telemetry lane: `TYPE=DATA` in, fire-and-forget

pub mod packet;
pub mod schema;

pub use packet::{
    build_packet, calibrate_joint, estop, joint_en, joints_to_angle, parse_packet, set_mode,
    verify_ack, JointTelemetry, Packet,
};
pub use schema::{schema_for, CommandSchema, Mode, PacketType, CMD_SCHEMAS, DATA_SCHEMAS};
