// MIT License - Copyright (c) 2026 Peter Wright
// Omni-Link protocol constants

use std::time::Duration;

/// Default UDP port of the controller's network interface.
pub const DEFAULT_PORT: u16 = 4369;

/// Packet header: `[sequence:u16 BE][packet type][reserved]`.
pub const PACKET_HEADER_LEN: usize = 4;

/// Largest datagram we accept from the controller.
pub const MAX_DATAGRAM: usize = 1024;

/// AES block size; encrypted payloads are always a multiple of this.
pub const BLOCK_LEN: usize = 16;

/// Number of bytes of device-supplied session material.
pub const SESSION_ID_LEN: usize = 5;

/// Start-of-message sentinel for Omni-Link messages.
pub const MESSAGE_START: u8 = 0x5A;

/// Reflected CRC-16 polynomial used by the message trailer.
pub const CRC_POLY: u16 = 0xA001;

// Omni-Link message types (plaintext payload of an OmniMessage packet).
pub const MSG_ACK: u8 = 0x05;
pub const MSG_NAK: u8 = 0x06;
pub const MSG_COMMAND: u8 = 0x0F;
pub const MSG_REQ_SYSTEM_STATUS: u8 = 0x13;
pub const MSG_SYSTEM_STATUS: u8 = 0x14;
pub const MSG_REQ_ZONE_STATUS: u8 = 0x15;
pub const MSG_ZONE_STATUS: u8 = 0x16;
pub const MSG_REQ_UNIT_STATUS: u8 = 0x17;
pub const MSG_UNIT_STATUS: u8 = 0x18;
pub const MSG_REQ_AUX_STATUS: u8 = 0x19;
pub const MSG_AUX_STATUS: u8 = 0x1A;
pub const MSG_REQ_THERMO_STATUS: u8 = 0x1E;
pub const MSG_THERMO_STATUS: u8 = 0x1F;
pub const MSG_LOGIN: u8 = 0x20;
pub const MSG_LOGOUT: u8 = 0x21;
pub const MSG_REQ_SYSTEM_EVENTS: u8 = 0x22;
pub const MSG_SYSTEM_EVENTS: u8 = 0x23;
pub const MSG_REQ_VALIDATE_CODE: u8 = 0x26;
pub const MSG_VALIDATE_CODE: u8 = 0x27;

// Command codes carried by MSG_COMMAND: `[cmd][param1][param2 hi][param2 lo]`.
pub const CMD_UNIT_OFF: u8 = 0x00;
pub const CMD_UNIT_ON: u8 = 0x01;
pub const CMD_ALL_OFF: u8 = 0x02;
pub const CMD_ALL_ON: u8 = 0x03;
pub const CMD_BYPASS_ZONE: u8 = 0x04;
pub const CMD_RESTORE_ZONE: u8 = 0x05;
pub const CMD_RESTORE_ALL_ZONES: u8 = 0x06;
pub const CMD_EXECUTE_BUTTON: u8 = 0x07;
pub const CMD_UNIT_LEVEL: u8 = 0x09;
pub const CMD_SET_COUNTER: u8 = 0x0C;
/// Dim by N steps is `CMD_UNIT_DIM_BASE + N`.
pub const CMD_UNIT_DIM_BASE: u8 = 0x10;
pub const CMD_UPB_LED_OFF: u8 = 0x1A;
pub const CMD_UPB_LED_ON: u8 = 0x1B;
pub const CMD_UPB_LINK_OFF: u8 = 0x1C;
pub const CMD_UPB_LINK_ON: u8 = 0x1D;
pub const CMD_UPB_LINK_SET: u8 = 0x1E;
/// Brighten by N steps is `CMD_UNIT_BRIGHT_BASE + N`.
pub const CMD_UNIT_BRIGHT_BASE: u8 = 0x20;
/// Arm in mode M (0 = off .. 6 = night delayed) is `CMD_SECURITY_BASE + M`.
pub const CMD_SECURITY_BASE: u8 = 0x30;
pub const CMD_SET_HEAT_SETPOINT: u8 = 0x42;
pub const CMD_SET_COOL_SETPOINT: u8 = 0x43;
pub const CMD_SET_THERMO_MODE: u8 = 0x44;
pub const CMD_SET_THERMO_FAN: u8 = 0x45;
pub const CMD_SET_THERMO_HOLD: u8 = 0x46;
pub const CMD_SHOW_MESSAGE: u8 = 0x50;
pub const CMD_CLEAR_MESSAGE: u8 = 0x52;
pub const CMD_SAY_MESSAGE: u8 = 0x53;
pub const CMD_PHONE_MESSAGE: u8 = 0x54;

// Category capacities (item numbers are 1-based up to these).
pub const MAX_AREAS: usize = 8;
pub const MAX_ZONES: usize = 176;
pub const MAX_UNITS: usize = 511;
pub const MAX_THERMOSTATS: usize = 64;
pub const MAX_ENCLOSURES: usize = 8;
pub const MAX_BUTTONS: u32 = 128;
pub const MAX_MESSAGES: u32 = 128;
pub const MAX_UPB_LINKS: u32 = 255;

// Poll block sizes.
pub const ZONE_BLOCK: usize = 44;
pub const UNIT_BLOCK: usize = 32;
pub const THERMO_BLOCK: usize = 16;

// Poll intervals.
pub const EVENTS_INTERVAL: Duration = Duration::from_millis(250);
pub const SYSTEM_INTERVAL: Duration = Duration::from_secs(15);
pub const ZONE_INTERVAL: Duration = Duration::from_millis(300);
pub const UNIT_INTERVAL: Duration = Duration::from_millis(400);
pub const THERMO_INTERVAL: Duration = Duration::from_millis(500);

// Backoff applied after an arm/disarm transition; the panel is busy for a while.
pub const ZONE_BACKOFF: Duration = Duration::from_millis(2000);
pub const UNIT_BACKOFF: Duration = Duration::from_millis(2500);
pub const THERMO_BACKOFF: Duration = Duration::from_millis(3000);
pub const SYSTEM_BACKOFF: Duration = Duration::from_secs(5);

/// Consecutive poll timeouts tolerated before the connection is declared lost.
pub const MAX_POLL_TIMEOUTS: u32 = 4;

/// Sentinel item name meaning "every area".
pub const ALL_AREAS: &str = "$All$";

/// Security mode names. 0..=6 are steady modes, 7..=12 the arming-in-progress
/// variants (steady mode + 6).
pub const ARM_MODES: [&str; 13] = [
    "Off",
    "Day",
    "Night",
    "Away",
    "Vacation",
    "DayInstant",
    "NightDelayed",
    "ArmingDay",
    "ArmingNight",
    "ArmingAway",
    "ArmingVacation",
    "ArmingDayInstant",
    "ArmingNightDelayed",
];

/// Alarm type names, one per bit of an area's alarm bitmask.
pub const ALARM_TYPES: [&str; 8] = [
    "Burglary",
    "Fire",
    "Gas",
    "Auxiliary",
    "Freeze",
    "Water",
    "Duress",
    "Temperature",
];

pub const ZONE_CONDITIONS: [&str; 4] = ["Secure", "NotReady", "Trouble", "Tamper"];
pub const ZONE_LATCHED: [&str; 4] = ["Secure", "Tripped", "Reset", "Unknown"];
pub const ZONE_ARMING: [&str; 4] = ["Disarmed", "Armed", "UserBypass", "SystemBypass"];

pub const THERMO_MODES: [&str; 5] = ["Off", "Heat", "Cool", "Auto", "EmergencyHeat"];
pub const FAN_MODES: [&str; 2] = ["Auto", "On"];

/// Look up a name in one of the tables above, ignoring ASCII case.
pub fn index_of(table: &[&str], name: &str) -> Option<usize> {
    table.iter().position(|n| n.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arming_variants_offset_by_six() {
        for mode in 1..=6 {
            assert_eq!(ARM_MODES[mode + 6], format!("Arming{}", ARM_MODES[mode]));
        }
    }

    #[test]
    fn test_index_of_ignores_case() {
        assert_eq!(index_of(&THERMO_MODES, "cool"), Some(2));
        assert_eq!(index_of(&FAN_MODES, "ON"), Some(1));
        assert_eq!(index_of(&THERMO_MODES, "Dry"), None);
    }
}
