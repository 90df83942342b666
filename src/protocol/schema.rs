//! Static command schema table for the arm's text protocol
//!
//! Every command the UI may send (and every telemetry kind the Teensy
//! may emit) is declared here as a const entry, so an unknown command
//! or a bad mode is rejected before any bytes hit the wire. The tables
//! are plain const slices rather than a string-keyed map: the set of
//! commands is fixed by the firmware, and a match over `PacketType`
//! keeps lookup exhaustive.

/// Packet type discriminator, first field of every line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Command, UI → Teensy
    Cmd,
    /// Telemetry, Teensy → UI, fire-and-forget
    Data,
    /// Acknowledgment, Teensy → UI, verbatim echo of a CMD
    Ack,
}

impl PacketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Cmd => "CMD",
            PacketType::Data => "DATA",
            PacketType::Ack => "ACK",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CMD" => Some(PacketType::Cmd),
            "DATA" => Some(PacketType::Data),
            "ACK" => Some(PacketType::Ack),
            _ => None,
        }
    }
}

/// Operating modes of the Teensy firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Idle = 0,
    Calibration = 1,
    Move = 2,
    Reserved = 3,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Idle => "IDLE",
            Mode::Calibration => "CALIBRATION",
            Mode::Move => "MOVE",
            Mode::Reserved => "RESERVED",
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Mode::Idle),
            1 => Some(Mode::Calibration),
            2 => Some(Mode::Move),
            3 => Some(Mode::Reserved),
            _ => None,
        }
    }
}

/// Schema for one command or telemetry kind
#[derive(Debug)]
pub struct CommandSchema {
    /// Wire name (value of the CMD field)
    pub name: &'static str,
    /// Modes from which this command may be sent
    pub allowed_modes: &'static [Mode],
    /// Keys that must all be present
    pub required_keys: &'static [&'static str],
    /// Keys that may additionally be present
    pub optional_keys: &'static [&'static str],
    /// Per-key enumerated value sets, where restricted
    pub key_constraints: &'static [(&'static str, &'static [&'static str])],
}

impl CommandSchema {
    /// Constraint values for a key, if that key is restricted
    pub fn constraint_for(&self, key: &str) -> Option<&'static [&'static str]> {
        self.key_constraints
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, values)| *values)
    }

    /// True if `key` is in required ∪ optional
    pub fn allows_key(&self, key: &str) -> bool {
        self.required_keys.contains(&key) || self.optional_keys.contains(&key)
    }
}

const ZERO_ONE: &[&str] = &["0", "1"];

/// Commands the UI may send (TYPE=CMD)
pub const CMD_SCHEMAS: &[CommandSchema] = &[
    CommandSchema {
        name: "SET_MODE",
        allowed_modes: &[Mode::Idle, Mode::Calibration, Mode::Move, Mode::Reserved],
        required_keys: &["MODE"],
        optional_keys: &[],
        key_constraints: &[("MODE", &["0", "1", "2", "3"])],
    },
    CommandSchema {
        name: "JOINTS_TO_ANGLE",
        allowed_modes: &[Mode::Move],
        required_keys: &[
            "JOINT_1_ANG",
            "JOINT_2_ANG",
            "JOINT_3_ANG",
            "JOINT_4_ANG",
            "JOINT_5_ANG",
            "JOINT_6_ANG",
        ],
        optional_keys: &[],
        // Float values, range-checked by the firmware
        key_constraints: &[],
    },
    CommandSchema {
        name: "JOINT_EN",
        allowed_modes: &[Mode::Move],
        required_keys: &[
            "JOINT_1_EN",
            "JOINT_2_EN",
            "JOINT_3_EN",
            "JOINT_4_EN",
            "JOINT_5_EN",
            "JOINT_6_EN",
        ],
        optional_keys: &[],
        key_constraints: &[
            ("JOINT_1_EN", ZERO_ONE),
            ("JOINT_2_EN", ZERO_ONE),
            ("JOINT_3_EN", ZERO_ONE),
            ("JOINT_4_EN", ZERO_ONE),
            ("JOINT_5_EN", ZERO_ONE),
            ("JOINT_6_EN", ZERO_ONE),
        ],
    },
    CommandSchema {
        name: "ESTOP",
        allowed_modes: &[Mode::Move],
        required_keys: &["STOP"],
        optional_keys: &[],
        key_constraints: &[("STOP", &["ALL"])],
    },
    CommandSchema {
        name: "CALIBRATE_JOINT",
        allowed_modes: &[Mode::Calibration],
        required_keys: &["JOINT_ID"],
        optional_keys: &[],
        key_constraints: &[("JOINT_ID", &["1", "2", "3", "4", "5", "6"])],
    },
];

/// Telemetry kinds the Teensy emits (TYPE=DATA)
pub const DATA_SCHEMAS: &[CommandSchema] = &[CommandSchema {
    name: "JOINT_ANGLES",
    allowed_modes: &[Mode::Calibration, Mode::Move],
    required_keys: &[
        "ENCODER_1_ANGLE",
        "ENCODER_2_ANGLE",
        "ENCODER_3_ANGLE",
        "ENCODER_4_ANGLE",
        "ENCODER_5_ANGLE",
        "ENCODER_6_ANGLE",
        "BUTTON",
    ],
    optional_keys: &[],
    key_constraints: &[("BUTTON", ZERO_ONE)],
}];

/// Look up the schema for a command name under a packet type.
///
/// ACK has no schemas: an ACK echoes an already-validated CMD.
pub fn schema_for(ptype: PacketType, cmd: &str) -> Option<&'static CommandSchema> {
    let table: &[CommandSchema] = match ptype {
        PacketType::Cmd => CMD_SCHEMAS,
        PacketType::Data => DATA_SCHEMAS,
        PacketType::Ack => return None,
    };
    table.iter().find(|s| s.name == cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lookup() {
        assert!(schema_for(PacketType::Cmd, "SET_MODE").is_some());
        assert!(schema_for(PacketType::Cmd, "JOINT_ANGLES").is_none());
        assert!(schema_for(PacketType::Data, "JOINT_ANGLES").is_some());
        assert!(schema_for(PacketType::Ack, "SET_MODE").is_none());
    }

    #[test]
    fn test_mode_gating() {
        let estop = schema_for(PacketType::Cmd, "ESTOP").unwrap();
        assert!(estop.allowed_modes.contains(&Mode::Move));
        assert!(!estop.allowed_modes.contains(&Mode::Idle));

        let set_mode = schema_for(PacketType::Cmd, "SET_MODE").unwrap();
        assert_eq!(set_mode.allowed_modes.len(), 4);
    }

    #[test]
    fn test_constraints() {
        let estop = schema_for(PacketType::Cmd, "ESTOP").unwrap();
        assert_eq!(estop.constraint_for("STOP"), Some(&["ALL"][..]));
        assert_eq!(estop.constraint_for("MODE"), None);

        let joints = schema_for(PacketType::Cmd, "JOINTS_TO_ANGLE").unwrap();
        assert!(joints.allows_key("JOINT_3_ANG"));
        assert!(!joints.allows_key("JOINT_7_ANG"));
        assert!(joints.constraint_for("JOINT_3_ANG").is_none());
    }
}
