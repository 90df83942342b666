//! Packet construction, parsing and ACK matching
//!
//! Wire format: one ASCII line of comma-separated `KEY=VALUE` pairs,
//! `TYPE=` first, `CMD=` second when present, remaining keys sorted
//! lexicographically, terminated by `\n`. Sorted output makes packets
//! deterministic, which is what makes the verbatim-echo ACK check
//! possible without sequence numbers or checksums.

use super::schema::{schema_for, Mode, PacketType};
use crate::error::{Error, Result};
use crate::mapping::NUM_JOINTS;
use std::collections::BTreeMap;

/// Line terminator for the wire format
pub const LINE_TERMINATOR: char = '\n';

/// A parsed packet: field name → field value, TYPE included
///
/// Ephemeral - parsed, inspected, discarded. Duplicate keys within one
/// line are not part of the firmware contract; parsing is
/// last-write-wins as a side effect of map insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    fields: BTreeMap<String, String>,
}

impl Packet {
    /// Field value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The TYPE field, decoded
    pub fn packet_type(&self) -> Option<PacketType> {
        self.get("TYPE").and_then(PacketType::from_str)
    }

    /// The CMD field, when present
    pub fn cmd(&self) -> Option<&str> {
        self.get("CMD")
    }

    /// All fields except TYPE, for ACK comparison
    pub fn fields_without_type(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter(|(k, _)| k.as_str() != "TYPE")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Build and validate a protocol packet, returning the wire line.
///
/// Validation ladder for CMD/DATA packets:
/// 1. `cmd` must be present and known to the schema table.
/// 2. If `current_mode` is supplied, it must be in the command's
///    allowed set.
/// 3. The field set must contain every required key and nothing
///    outside required ∪ optional.
/// 4. Every constrained key's value must be one of its allowed values.
///
/// ACK packets only require `cmd`: an ACK echoes a CMD that was
/// already validated when it was built.
pub fn build_packet(
    ptype: PacketType,
    cmd: Option<&str>,
    current_mode: Option<Mode>,
    fields: &[(&str, String)],
) -> Result<String> {
    let cmd = match ptype {
        PacketType::Cmd | PacketType::Data => {
            let Some(cmd) = cmd else {
                return Err(Error::MissingCommand(ptype.as_str()));
            };

            let Some(schema) = schema_for(ptype, cmd) else {
                return Err(Error::UnknownCommand {
                    ptype: ptype.as_str(),
                    cmd: cmd.to_string(),
                });
            };

            if let Some(mode) = current_mode {
                if !schema.allowed_modes.contains(&mode) {
                    return Err(Error::ModeNotAllowed {
                        cmd: schema.name,
                        mode: mode as u8,
                        mode_label: mode.label(),
                        allowed: schema.allowed_modes.iter().map(|m| m.label()).collect(),
                    });
                }
            }

            let missing: Vec<&'static str> = schema
                .required_keys
                .iter()
                .filter(|k| !fields.iter().any(|(key, _)| key == *k))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(Error::MissingKeys {
                    cmd: schema.name,
                    missing,
                });
            }

            let unexpected: Vec<String> = fields
                .iter()
                .filter(|(key, _)| !schema.allows_key(key))
                .map(|(key, _)| key.to_string())
                .collect();
            if !unexpected.is_empty() {
                return Err(Error::UnexpectedKeys {
                    cmd: schema.name,
                    unexpected,
                });
            }

            for (key, allowed) in schema.key_constraints {
                if let Some((_, value)) = fields.iter().find(|(k, _)| k == key) {
                    if !allowed.contains(&value.as_str()) {
                        return Err(Error::ConstraintViolation {
                            key,
                            value: value.clone(),
                            allowed: allowed.to_vec(),
                        });
                    }
                }
            }

            Some(cmd)
        }
        PacketType::Ack => {
            if cmd.is_none() {
                return Err(Error::MissingCommand("ACK"));
            }
            cmd
        }
    };

    // TYPE first, CMD second, remaining keys sorted for determinism
    let mut parts = vec![format!("TYPE={}", ptype.as_str())];
    if let Some(cmd) = cmd {
        parts.push(format!("CMD={}", cmd));
    }
    let mut sorted: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
    sorted.sort_by_key(|(key, _)| *key);
    for (key, value) in sorted {
        parts.push(format!("{}={}", key, value));
    }

    let mut line = parts.join(",");
    line.push(LINE_TERMINATOR);
    Ok(line)
}

/// Parse one received line into a [`Packet`].
///
/// Whitespace is trimmed around the line, each pair, and each key and
/// value, so `\r\n` terminators from the firmware cost nothing.
pub fn parse_packet(line: &str) -> Result<Packet> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::EmptyPacket);
    }

    let mut fields = BTreeMap::new();
    for pair in line.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::MalformedPair(pair.to_string()));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(Error::EmptyKey(pair.to_string()));
        }

        fields.insert(key.to_string(), value.trim().to_string());
    }

    if !fields.contains_key("TYPE") {
        return Err(Error::MissingType);
    }

    Ok(Packet { fields })
}

/// Verify that a received ACK matches the sent CMD.
///
/// The received TYPE must be `ACK` and every other field must echo the
/// sent packet exactly, independent of field order. This comparison is
/// the protocol's sole correctness check on the command lane.
pub fn verify_ack(sent: &str, received: &str) -> Result<()> {
    let sent = parse_packet(sent)?;
    let ack = parse_packet(received)?;

    if ack.packet_type() != Some(PacketType::Ack) {
        return Err(Error::TypeMismatch(
            ack.get("TYPE").unwrap_or_default().to_string(),
        ));
    }

    let sent_fields = sent.fields_without_type();
    let ack_fields = ack.fields_without_type();
    if sent_fields != ack_fields {
        return Err(Error::AckMismatch {
            sent: sent_fields,
            received: ack_fields,
        });
    }

    Ok(())
}

/// Decoded `TYPE=DATA,CMD=JOINT_ANGLES` telemetry tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTelemetry {
    /// Raw encoder angles, degrees in [0, 360)
    pub raw_angles: [f64; NUM_JOINTS],
    /// Calibration button level (0 = released, 1 = pressed)
    pub button: u8,
}

impl JointTelemetry {
    /// Decode a parsed packet into typed telemetry.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        if packet.cmd() != Some("JOINT_ANGLES") {
            return Err(Error::BadTelemetry {
                field: "CMD".to_string(),
                reason: format!("expected JOINT_ANGLES, got {:?}", packet.cmd()),
            });
        }

        let mut raw_angles = [0.0; NUM_JOINTS];
        for (i, angle) in raw_angles.iter_mut().enumerate() {
            let key = format!("ENCODER_{}_ANGLE", i + 1);
            *angle = parse_field(packet, &key)?;
        }

        let button_value: f64 = parse_field(packet, "BUTTON")?;
        let button = match button_value as i64 {
            0 => 0,
            1 => 1,
            other => {
                return Err(Error::BadTelemetry {
                    field: "BUTTON".to_string(),
                    reason: format!("expected 0 or 1, got {}", other),
                })
            }
        };

        Ok(Self { raw_angles, button })
    }
}

fn parse_field(packet: &Packet, key: &str) -> Result<f64> {
    let value = packet.get(key).ok_or_else(|| Error::BadTelemetry {
        field: key.to_string(),
        reason: "missing".to_string(),
    })?;
    value.parse().map_err(|_| Error::BadTelemetry {
        field: key.to_string(),
        reason: format!("not a number: {}", value),
    })
}

// ============================================================================
// Typed command builders
// ============================================================================

/// Build a SET_MODE command (allowed from any mode).
pub fn set_mode(current: Mode, new: Mode) -> Result<String> {
    build_packet(
        PacketType::Cmd,
        Some("SET_MODE"),
        Some(current),
        &[("MODE", format!("{}", new as u8))],
    )
}

/// Build a JOINTS_TO_ANGLE command from six raw target angles.
///
/// Angles are raw encoder degrees - callers convert from logical space
/// with [`JointCalibration::logical_to_raw`] first.
///
/// [`JointCalibration::logical_to_raw`]: crate::mapping::JointCalibration::logical_to_raw
pub fn joints_to_angle(current: Mode, raw_angles: &[f64; NUM_JOINTS]) -> Result<String> {
    let fields: Vec<(String, String)> = raw_angles
        .iter()
        .enumerate()
        .map(|(i, angle)| (format!("JOINT_{}_ANG", i + 1), format!("{:.1}", angle)))
        .collect();
    let borrowed: Vec<(&str, String)> = fields
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();
    build_packet(
        PacketType::Cmd,
        Some("JOINTS_TO_ANGLE"),
        Some(current),
        &borrowed,
    )
}

/// Build a JOINT_EN command from six enable flags.
pub fn joint_en(current: Mode, enabled: &[bool; NUM_JOINTS]) -> Result<String> {
    let fields: Vec<(String, String)> = enabled
        .iter()
        .enumerate()
        .map(|(i, en)| (format!("JOINT_{}_EN", i + 1), format!("{}", *en as u8)))
        .collect();
    let borrowed: Vec<(&str, String)> = fields
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();
    build_packet(PacketType::Cmd, Some("JOINT_EN"), Some(current), &borrowed)
}

/// Build an ESTOP command.
pub fn estop(current: Mode) -> Result<String> {
    build_packet(
        PacketType::Cmd,
        Some("ESTOP"),
        Some(current),
        &[("STOP", "ALL".to_string())],
    )
}

/// Build a CALIBRATE_JOINT command for a 1-based joint id.
pub fn calibrate_joint(current: Mode, joint_id: usize) -> Result<String> {
    build_packet(
        PacketType::Cmd,
        Some("CALIBRATE_JOINT"),
        Some(current),
        &[("JOINT_ID", joint_id.to_string())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_set_mode_exact_wire_line() {
        let line = build_packet(
            PacketType::Cmd,
            Some("SET_MODE"),
            None,
            &[("MODE", "2".to_string())],
        )
        .unwrap();
        assert_eq!(line, "TYPE=CMD,CMD=SET_MODE,MODE=2\n");
    }

    #[test]
    fn test_build_sorts_fields() {
        let line = joints_to_angle(
            Mode::Move,
            &[45.5, 67.2, 10.0, 20.0, 30.0, 40.0],
        )
        .unwrap();
        assert_eq!(
            line,
            "TYPE=CMD,CMD=JOINTS_TO_ANGLE,JOINT_1_ANG=45.5,JOINT_2_ANG=67.2,\
             JOINT_3_ANG=10.0,JOINT_4_ANG=20.0,JOINT_5_ANG=30.0,JOINT_6_ANG=40.0\n"
        );
    }

    #[test]
    fn test_build_rejects_missing_cmd() {
        let err = build_packet(PacketType::Cmd, None, None, &[]).unwrap_err();
        assert!(matches!(err, Error::MissingCommand("CMD")));
    }

    #[test]
    fn test_build_rejects_unknown_command() {
        let err = build_packet(PacketType::Cmd, Some("WARP_DRIVE"), None, &[]).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand { .. }));
    }

    #[test]
    fn test_build_rejects_wrong_mode() {
        // JOINTS_TO_ANGLE only allowed in MOVE
        let err = joints_to_angle(Mode::Idle, &[0.0; 6]).unwrap_err();
        match err {
            Error::ModeNotAllowed { cmd, mode, allowed, .. } => {
                assert_eq!(cmd, "JOINTS_TO_ANGLE");
                assert_eq!(mode, 0);
                assert_eq!(allowed, vec!["MOVE"]);
            }
            other => panic!("expected ModeNotAllowed, got {:?}", other),
        }
    }

    #[test]
    fn test_build_rejects_missing_keys() {
        let err = build_packet(
            PacketType::Cmd,
            Some("ESTOP"),
            Some(Mode::Move),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingKeys { cmd: "ESTOP", .. }));
    }

    #[test]
    fn test_build_rejects_unexpected_keys() {
        let err = build_packet(
            PacketType::Cmd,
            Some("SET_MODE"),
            None,
            &[("MODE", "2".to_string()), ("EXTRA", "1".to_string())],
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnexpectedKeys { .. }));
    }

    #[test]
    fn test_build_rejects_constraint_violation() {
        let err = build_packet(
            PacketType::Cmd,
            Some("SET_MODE"),
            None,
            &[("MODE", "7".to_string())],
        )
        .unwrap_err();
        match err {
            Error::ConstraintViolation { key, value, .. } => {
                assert_eq!(key, "MODE");
                assert_eq!(value, "7");
            }
            other => panic!("expected ConstraintViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_build_ack_skips_schema_validation() {
        let line = build_packet(
            PacketType::Ack,
            Some("SET_MODE"),
            None,
            &[("MODE", "2".to_string())],
        )
        .unwrap();
        assert_eq!(line, "TYPE=ACK,CMD=SET_MODE,MODE=2\n");

        assert!(matches!(
            build_packet(PacketType::Ack, None, None, &[]),
            Err(Error::MissingCommand("ACK"))
        ));
    }

    #[test]
    fn test_parse_packet_roundtrip() {
        let pkt = parse_packet("TYPE=CMD,CMD=SET_MODE,MODE=2\n").unwrap();
        assert_eq!(pkt.packet_type(), Some(PacketType::Cmd));
        assert_eq!(pkt.cmd(), Some("SET_MODE"));
        assert_eq!(pkt.get("MODE"), Some("2"));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let pkt = parse_packet("  TYPE=ACK , CMD=ESTOP , STOP=ALL \r\n").unwrap();
        assert_eq!(pkt.packet_type(), Some(PacketType::Ack));
        assert_eq!(pkt.get("STOP"), Some("ALL"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_packet(""), Err(Error::EmptyPacket)));
        assert!(matches!(parse_packet("   \n"), Err(Error::EmptyPacket)));
        assert!(matches!(
            parse_packet("TYPE=CMD,garbage"),
            Err(Error::MalformedPair(_))
        ));
        assert!(matches!(
            parse_packet("TYPE=CMD,=VALUE"),
            Err(Error::EmptyKey(_))
        ));
        assert!(matches!(
            parse_packet("CMD=SET_MODE,MODE=2"),
            Err(Error::MissingType)
        ));
    }

    #[test]
    fn test_verify_ack_matches() {
        let sent = "TYPE=CMD,CMD=SET_MODE,MODE=2\n";
        assert!(verify_ack(sent, "TYPE=ACK,CMD=SET_MODE,MODE=2\n").is_ok());
        // Field order on the received side is irrelevant
        assert!(verify_ack(sent, "TYPE=ACK,MODE=2,CMD=SET_MODE\n").is_ok());
    }

    #[test]
    fn test_verify_ack_rejects_wrong_type() {
        let sent = "TYPE=CMD,CMD=SET_MODE,MODE=2\n";
        let err = verify_ack(sent, "TYPE=DATA,CMD=SET_MODE,MODE=2\n").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(t) if t == "DATA"));
    }

    #[test]
    fn test_verify_ack_rejects_changed_field() {
        let sent = "TYPE=CMD,CMD=SET_MODE,MODE=2\n";
        assert!(matches!(
            verify_ack(sent, "TYPE=ACK,CMD=SET_MODE,MODE=1\n"),
            Err(Error::AckMismatch { .. })
        ));
        assert!(matches!(
            verify_ack(sent, "TYPE=ACK,CMD=SET_MODE\n"),
            Err(Error::AckMismatch { .. })
        ));
        assert!(matches!(
            verify_ack(sent, "TYPE=ACK,CMD=SET_MODE,MODE=2,EXTRA=1\n"),
            Err(Error::AckMismatch { .. })
        ));
    }

    #[test]
    fn test_telemetry_decode() {
        let line = "TYPE=DATA,CMD=JOINT_ANGLES,ENCODER_1_ANGLE=10.5,ENCODER_2_ANGLE=305.0,\
                    ENCODER_3_ANGLE=203.5,ENCODER_4_ANGLE=264.3,ENCODER_5_ANGLE=83.2,\
                    ENCODER_6_ANGLE=0.0,BUTTON=1\n";
        let telemetry = JointTelemetry::from_packet(&parse_packet(line).unwrap()).unwrap();
        assert_eq!(telemetry.button, 1);
        assert!((telemetry.raw_angles[1] - 305.0).abs() < 1e-9);
        assert!((telemetry.raw_angles[5]).abs() < 1e-9);
    }

    #[test]
    fn test_telemetry_decode_rejects_missing_field() {
        let line = "TYPE=DATA,CMD=JOINT_ANGLES,ENCODER_1_ANGLE=10.5,BUTTON=0\n";
        let err = JointTelemetry::from_packet(&parse_packet(line).unwrap()).unwrap_err();
        assert!(matches!(err, Error::BadTelemetry { .. }));
    }

    #[test]
    fn test_typed_builders() {
        assert_eq!(
            set_mode(Mode::Idle, Mode::Move).unwrap(),
            "TYPE=CMD,CMD=SET_MODE,MODE=2\n"
        );
        assert_eq!(estop(Mode::Move).unwrap(), "TYPE=CMD,CMD=ESTOP,STOP=ALL\n");
        assert!(estop(Mode::Idle).is_err());
        assert_eq!(
            calibrate_joint(Mode::Calibration, 3).unwrap(),
            "TYPE=CMD,CMD=CALIBRATE_JOINT,JOINT_ID=3\n"
        );
        assert!(calibrate_joint(Mode::Calibration, 7).is_err());
        assert_eq!(
            joint_en(Mode::Move, &[true, true, false, false, true, false]).unwrap(),
            "TYPE=CMD,CMD=JOINT_EN,JOINT_1_EN=1,JOINT_2_EN=1,JOINT_3_EN=0,\
             JOINT_4_EN=0,JOINT_5_EN=1,JOINT_6_EN=0\n"
        );
    }
}
