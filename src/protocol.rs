// MIT License - Copyright (c) 2026 Peter Wright
// Omni-Link packet and message codec

use chrono::{NaiveDate, NaiveDateTime};

use crate::constants::*;
use crate::crypto::crc16;
use crate::error::{OmniError, Result};

/// Packet types carried in byte 2 of every datagram.
///
/// Only `OmniMessage` payloads are encrypted. The session negotiation packets
/// carry plaintext session material, or nothing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    RequestNewSession,
    AckNewSession,
    NakNewSession,
    RequestSecureSession,
    AckSecureSession,
    TerminateSession,
    AckTerminateSession,
    OmniMessage,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::RequestNewSession),
            0x02 => Some(Self::AckNewSession),
            // 0x08 is the controller's "cannot start new session"
            0x03 | 0x08 => Some(Self::NakNewSession),
            0x04 => Some(Self::RequestSecureSession),
            0x05 => Some(Self::AckSecureSession),
            0x06 => Some(Self::TerminateSession),
            0x07 => Some(Self::AckTerminateSession),
            0x10 => Some(Self::OmniMessage),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::RequestNewSession => 0x01,
            Self::AckNewSession => 0x02,
            Self::NakNewSession => 0x03,
            Self::RequestSecureSession => 0x04,
            Self::AckSecureSession => 0x05,
            Self::TerminateSession => 0x06,
            Self::AckTerminateSession => 0x07,
            Self::OmniMessage => 0x10,
        }
    }
}

/// One UDP datagram: `[sequence:u16 BE][type][reserved][payload]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u16,
    pub packet_type: PacketType,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(sequence: u16, packet_type: PacketType, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            packet_type,
            payload,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.push(self.packet_type.to_u8());
        buf.push(0);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(datagram: &[u8]) -> Result<Self> {
        if datagram.len() < PACKET_HEADER_LEN {
            return Err(OmniError::malformed(format!(
                "datagram of {} bytes is shorter than the header",
                datagram.len()
            )));
        }
        let sequence = u16::from_be_bytes([datagram[0], datagram[1]]);
        let packet_type = PacketType::from_u8(datagram[2]).ok_or_else(|| {
            OmniError::malformed(format!("unknown packet type {:#04x}", datagram[2]))
        })?;
        Ok(Self {
            sequence,
            packet_type,
            payload: datagram[PACKET_HEADER_LEN..].to_vec(),
        })
    }
}

/// Plaintext Omni-Link message: `[0x5A][length][type][data..][crc lo][crc hi]`.
///
/// `length` counts the type byte plus the data. The CRC covers the length
/// byte through the last data byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: u8,
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: u8, data: Vec<u8>) -> Self {
        Self { msg_type, data }
    }

    pub fn is_ack(&self) -> bool {
        self.msg_type == MSG_ACK
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.data.len() + 5);
        buf.push(MESSAGE_START);
        buf.push((self.data.len() + 1) as u8);
        buf.push(self.msg_type);
        buf.extend_from_slice(&self.data);
        let crc = crc16(&buf[1..]);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode a decrypted payload. Trailing block padding is ignored.
    ///
    /// A CRC mismatch, a length byte pointing past the buffer and a Nak reply
    /// are all errors.
    pub fn decode(plain: &[u8]) -> Result<Self> {
        if plain.len() < 2 || plain[0] != MESSAGE_START {
            return Err(OmniError::malformed("missing message start byte"));
        }
        let length = plain[1] as usize;
        if length == 0 {
            return Err(OmniError::malformed("zero message length"));
        }
        let end = 2 + length;
        if end + 2 > plain.len() {
            return Err(OmniError::OversizeMessage {
                length,
                available: plain.len().saturating_sub(4),
            });
        }

        let computed = crc16(&plain[1..end]);
        let received = u16::from_le_bytes([plain[end], plain[end + 1]]);
        if computed != received {
            return Err(OmniError::CrcMismatch { computed, received });
        }

        let msg_type = plain[2];
        if msg_type == MSG_NAK {
            return Err(OmniError::Nak);
        }
        Ok(Self {
            msg_type,
            data: plain[3..end].to_vec(),
        })
    }
}

/// Parse a 4-digit security or login code into its digit values.
pub fn parse_code(code: &str) -> Result<[u8; 4]> {
    let bytes = code.trim().as_bytes();
    if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(OmniError::format(format!("code must be 4 digits, got {code:?}")));
    }
    Ok([
        bytes[0] - b'0',
        bytes[1] - b'0',
        bytes[2] - b'0',
        bytes[3] - b'0',
    ])
}

/// Requests the driver sends to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Login with the 4-digit code. Reply: Ack.
    Login { code: [u8; 4] },
    /// Reply: Ack.
    Logout,
    /// Battery, enclosures and area modes.
    SystemStatus,
    /// Drain the controller's queued notifications.
    SystemEvents,
    ZoneStatus { first: u16, last: u16 },
    /// Uses 2-byte item numbers when either end exceeds 255.
    UnitStatus { first: u16, last: u16 },
    /// Temperature/humidity readings and setpoints of sensor zones.
    AuxStatus { first: u16, last: u16 },
    ThermostatStatus { first: u16, last: u16 },
    /// Reply carries the user number and authority in `area`.
    ValidateCode { area: u8, code: [u8; 4] },
    /// `[cmd][p1][p2 hi][p2 lo]`. Reply: Ack.
    Command { cmd: u8, p1: u8, p2: u16 },
}

impl Request {
    pub fn command(cmd: u8, p1: u8, p2: u16) -> Self {
        Self::Command { cmd, p1, p2 }
    }

    pub fn to_message(&self) -> Message {
        match self {
            Request::Login { code } => Message::new(MSG_LOGIN, code.to_vec()),
            Request::Logout => Message::new(MSG_LOGOUT, Vec::new()),
            Request::SystemStatus => Message::new(MSG_REQ_SYSTEM_STATUS, Vec::new()),
            Request::SystemEvents => Message::new(MSG_REQ_SYSTEM_EVENTS, Vec::new()),
            Request::ZoneStatus { first, last } => {
                Message::new(MSG_REQ_ZONE_STATUS, vec![*first as u8, *last as u8])
            }
            Request::UnitStatus { first, last } => {
                let data = if *first > 255 || *last > 255 {
                    let mut d = first.to_be_bytes().to_vec();
                    d.extend_from_slice(&last.to_be_bytes());
                    d
                } else {
                    vec![*first as u8, *last as u8]
                };
                Message::new(MSG_REQ_UNIT_STATUS, data)
            }
            Request::AuxStatus { first, last } => {
                Message::new(MSG_REQ_AUX_STATUS, vec![*first as u8, *last as u8])
            }
            Request::ThermostatStatus { first, last } => {
                Message::new(MSG_REQ_THERMO_STATUS, vec![*first as u8, *last as u8])
            }
            Request::ValidateCode { area, code } => {
                let mut data = vec![*area];
                data.extend_from_slice(code);
                Message::new(MSG_REQ_VALIDATE_CODE, data)
            }
            Request::Command { cmd, p1, p2 } => {
                let [hi, lo] = p2.to_be_bytes();
                Message::new(MSG_COMMAND, vec![*cmd, *p1, hi, lo])
            }
        }
    }

    /// Message type the controller answers this request with.
    pub fn expected_reply(&self) -> u8 {
        match self {
            Request::Login { .. } | Request::Logout | Request::Command { .. } => MSG_ACK,
            Request::SystemStatus => MSG_SYSTEM_STATUS,
            Request::SystemEvents => MSG_SYSTEM_EVENTS,
            Request::ZoneStatus { .. } => MSG_ZONE_STATUS,
            Request::UnitStatus { .. } => MSG_UNIT_STATUS,
            Request::AuxStatus { .. } => MSG_AUX_STATUS,
            Request::ThermostatStatus { .. } => MSG_THERMO_STATUS,
            Request::ValidateCode { .. } => MSG_VALIDATE_CODE,
        }
    }

    /// Short description for logs and timeout errors.
    pub fn describe(&self) -> String {
        match self {
            Request::Login { .. } => "login".to_string(),
            Request::Logout => "logout".to_string(),
            Request::SystemStatus => "system status".to_string(),
            Request::SystemEvents => "system events".to_string(),
            Request::ZoneStatus { first, last } => format!("zone status {first}-{last}"),
            Request::UnitStatus { first, last } => format!("unit status {first}-{last}"),
            Request::AuxStatus { first, last } => format!("aux status {first}-{last}"),
            Request::ThermostatStatus { first, last } => {
                format!("thermostat status {first}-{last}")
            }
            Request::ValidateCode { area, .. } => format!("code validation (area {area})"),
            Request::Command { cmd, p1, p2 } => format!("command {cmd:#04x} {p1} {p2}"),
        }
    }
}

fn check_type(msg: &Message, expected: u8) -> Result<()> {
    if msg.msg_type != expected {
        return Err(OmniError::UnexpectedReply {
            expected: format!("{expected:#04x}"),
            got: format!("{:#04x}", msg.msg_type),
        });
    }
    Ok(())
}

fn records<const N: usize>(msg: &Message, first: u16, what: &str) -> Result<Vec<(u16, [u8; N])>> {
    if msg.data.len() % N != 0 {
        return Err(OmniError::malformed(format!(
            "{what} reply of {} bytes is not a multiple of {N}",
            msg.data.len()
        )));
    }
    Ok(msg
        .data
        .chunks_exact(N)
        .enumerate()
        .map(|(i, chunk)| {
            let mut rec = [0u8; N];
            rec.copy_from_slice(chunk);
            (first + i as u16, rec)
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneStatusRecord {
    pub status: u8,
    pub loop_reading: u8,
}

pub fn parse_zone_status(msg: &Message, first: u16) -> Result<Vec<(u16, ZoneStatusRecord)>> {
    check_type(msg, MSG_ZONE_STATUS)?;
    Ok(records::<2>(msg, first, "zone status")?
        .into_iter()
        .map(|(n, [status, loop_reading])| (n, ZoneStatusRecord { status, loop_reading }))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitStatusRecord {
    /// 0 off, 1 on, 100..=200 light level + 100.
    pub status: u8,
    pub time_remaining: u16,
}

pub fn parse_unit_status(msg: &Message, first: u16) -> Result<Vec<(u16, UnitStatusRecord)>> {
    check_type(msg, MSG_UNIT_STATUS)?;
    Ok(records::<3>(msg, first, "unit status")?
        .into_iter()
        .map(|(n, [status, hi, lo])| {
            (
                n,
                UnitStatusRecord {
                    status,
                    time_remaining: u16::from_be_bytes([hi, lo]),
                },
            )
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxStatusRecord {
    pub relay: u8,
    pub current: u8,
    pub low_setpoint: u8,
    pub high_setpoint: u8,
}

pub fn parse_aux_status(msg: &Message, first: u16) -> Result<Vec<(u16, AuxStatusRecord)>> {
    check_type(msg, MSG_AUX_STATUS)?;
    Ok(records::<4>(msg, first, "aux status")?
        .into_iter()
        .map(|(n, [relay, current, low_setpoint, high_setpoint])| {
            (
                n,
                AuxStatusRecord {
                    relay,
                    current,
                    low_setpoint,
                    high_setpoint,
                },
            )
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermostatStatusRecord {
    pub status: u8,
    pub current: u8,
    pub heat_setpoint: u8,
    pub cool_setpoint: u8,
    pub mode: u8,
    pub fan: u8,
    pub hold: u8,
}

pub fn parse_thermostat_status(
    msg: &Message,
    first: u16,
) -> Result<Vec<(u16, ThermostatStatusRecord)>> {
    check_type(msg, MSG_THERMO_STATUS)?;
    Ok(records::<7>(msg, first, "thermostat status")?
        .into_iter()
        .map(|(n, [status, current, heat_setpoint, cool_setpoint, mode, fan, hold])| {
            (
                n,
                ThermostatStatusRecord {
                    status,
                    current,
                    heat_setpoint,
                    cool_setpoint,
                    mode,
                    fan,
                    hold,
                },
            )
        })
        .collect())
}

const SYSTEM_HEADER_LEN: usize = 14;

/// Parsed system status reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStatus {
    /// Controller clock, when the controller reports it as set.
    pub clock: Option<NaiveDateTime>,
    pub battery: u8,
    /// Steady security mode per area, area 1 first.
    pub area_modes: Vec<u8>,
    /// `(flags, battery level)` per expansion enclosure.
    pub enclosures: Vec<(u8, u8)>,
}

pub fn parse_system_status(msg: &Message) -> Result<SystemStatus> {
    check_type(msg, MSG_SYSTEM_STATUS)?;
    let d = &msg.data;
    if d.len() < SYSTEM_HEADER_LEN {
        return Err(OmniError::malformed(format!(
            "system status reply of {} bytes is too short",
            d.len()
        )));
    }

    let clock = if d[0] != 0 {
        NaiveDate::from_ymd_opt(2000 + d[1] as i32, d[2] as u32, d[3] as u32)
            .and_then(|date| date.and_hms_opt(d[5] as u32, d[6] as u32, d[7] as u32))
    } else {
        None
    };

    let rest = &d[SYSTEM_HEADER_LEN..];
    let area_count = rest.len().min(MAX_AREAS);
    let area_modes = rest[..area_count].to_vec();
    let enclosures = rest[area_count..]
        .chunks_exact(2)
        .take(MAX_ENCLOSURES)
        .map(|pair| (pair[0], pair[1]))
        .collect();

    Ok(SystemStatus {
        clock,
        battery: d[13],
        area_modes,
        enclosures,
    })
}

/// Queued 2-byte notifications, oldest first.
pub fn parse_system_events(msg: &Message) -> Result<Vec<u16>> {
    check_type(msg, MSG_SYSTEM_EVENTS)?;
    if msg.data.len() % 2 != 0 {
        return Err(OmniError::malformed(format!(
            "system events reply of {} bytes is odd",
            msg.data.len()
        )));
    }
    Ok(msg
        .data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeValidation {
    pub user: u8,
    /// 0 means the code is not valid in the requested area.
    pub authority: u8,
}

impl CodeValidation {
    pub fn is_valid(&self) -> bool {
        self.authority != 0
    }
}

pub fn parse_code_validation(msg: &Message) -> Result<CodeValidation> {
    check_type(msg, MSG_VALIDATE_CODE)?;
    match msg.data.as_slice() {
        [user, authority, ..] => Ok(CodeValidation {
            user: *user,
            authority: *authority,
        }),
        _ => Err(OmniError::malformed("code validation reply too short")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_packet_header_is_big_endian() {
        let pkt = Packet::new(0x1234, PacketType::OmniMessage, vec![0xAA]);
        assert_eq!(pkt.encode(), vec![0x12, 0x34, 0x10, 0x00, 0xAA]);
        assert_eq!(Packet::decode(&pkt.encode()).unwrap(), pkt);
    }

    #[test]
    fn test_packet_decode_rejects_short_and_unknown() {
        assert!(Packet::decode(&[0, 1, 2]).is_err());
        assert!(Packet::decode(&[0, 1, 0x42, 0]).is_err());
        let nak = Packet::decode(&[0, 1, 0x08, 0]).unwrap();
        assert_eq!(nak.packet_type, PacketType::NakNewSession);
    }

    #[test]
    fn test_message_layout_and_crc() {
        let msg = Request::ZoneStatus { first: 1, last: 44 }.to_message();
        let bytes = msg.encode();
        assert_eq!(&bytes[..5], &[MESSAGE_START, 3, MSG_REQ_ZONE_STATUS, 1, 44]);
        let crc = crc16(&bytes[1..5]);
        assert_eq!(&bytes[5..], &crc.to_le_bytes());
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_message_decode_ignores_padding() {
        let msg = Message::new(MSG_ACK, Vec::new());
        let mut bytes = msg.encode();
        bytes.resize(16, 0);
        assert!(Message::decode(&bytes).unwrap().is_ack());
    }

    #[test]
    fn test_message_decode_errors() {
        let mut bytes = Message::new(MSG_ZONE_STATUS, vec![1, 2, 3, 4]).encode();
        bytes[4] ^= 0x01;
        assert!(matches!(
            Message::decode(&bytes),
            Err(OmniError::CrcMismatch { .. })
        ));

        let mut bytes = Message::new(MSG_ZONE_STATUS, vec![1, 2]).encode();
        bytes[1] = 40;
        assert!(matches!(
            Message::decode(&bytes),
            Err(OmniError::OversizeMessage { length: 40, .. })
        ));

        let nak = Message::new(MSG_NAK, Vec::new()).encode();
        let err = Message::decode(&nak).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolFormat);
    }

    #[test]
    fn test_unit_request_switches_to_wide_numbers() {
        let narrow = Request::UnitStatus { first: 225, last: 255 }.to_message();
        assert_eq!(narrow.data, vec![225, 255]);
        let wide = Request::UnitStatus { first: 225, last: 256 }.to_message();
        assert_eq!(wide.data, vec![0, 225, 1, 0]);
    }

    #[test]
    fn test_command_and_code_payloads() {
        let msg = Request::command(CMD_UNIT_LEVEL, 75, 300).to_message();
        assert_eq!(msg.msg_type, MSG_COMMAND);
        assert_eq!(msg.data, vec![CMD_UNIT_LEVEL, 75, 0x01, 0x2C]);

        let code = parse_code("1234").unwrap();
        assert_eq!(code, [1, 2, 3, 4]);
        let msg = Request::ValidateCode { area: 2, code }.to_message();
        assert_eq!(msg.data, vec![2, 1, 2, 3, 4]);

        assert_eq!(parse_code("12a4").unwrap_err().kind(), ErrorKind::Format);
        assert!(parse_code("12345").is_err());
    }

    #[test]
    fn test_parse_zone_status() {
        let msg = Message::new(MSG_ZONE_STATUS, vec![0x01, 100, 0x00, 98]);
        let zones = parse_zone_status(&msg, 45).unwrap();
        assert_eq!(
            zones,
            vec![
                (45, ZoneStatusRecord { status: 1, loop_reading: 100 }),
                (46, ZoneStatusRecord { status: 0, loop_reading: 98 }),
            ]
        );

        let odd = Message::new(MSG_ZONE_STATUS, vec![0x01]);
        assert!(parse_zone_status(&odd, 1).is_err());
        let wrong = Message::new(MSG_UNIT_STATUS, vec![0, 0]);
        assert!(matches!(
            parse_zone_status(&wrong, 1),
            Err(OmniError::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn test_parse_unit_and_thermostat_status() {
        let msg = Message::new(MSG_UNIT_STATUS, vec![150, 0x00, 0x3C]);
        let units = parse_unit_status(&msg, 7).unwrap();
        assert_eq!(units[0].0, 7);
        assert_eq!(units[0].1.status, 150);
        assert_eq!(units[0].1.time_remaining, 60);

        let msg = Message::new(MSG_THERMO_STATUS, vec![0, 150, 140, 160, 3, 1, 0xFF]);
        let thermos = parse_thermostat_status(&msg, 1).unwrap();
        assert_eq!(thermos[0].1.mode, 3);
        assert_eq!(thermos[0].1.hold, 0xFF);
    }

    #[test]
    fn test_parse_system_status() {
        let mut data = vec![1, 24, 6, 15, 7, 13, 45, 30, 1, 6, 0, 20, 30, 182];
        data.extend_from_slice(&[0, 3, 0, 0, 0, 0, 0, 0]);
        data.extend_from_slice(&[0x02, 120, 0x00, 180]);
        let status = parse_system_status(&Message::new(MSG_SYSTEM_STATUS, data)).unwrap();
        assert_eq!(status.battery, 182);
        assert_eq!(status.area_modes[1], 3);
        assert_eq!(status.enclosures, vec![(0x02, 120), (0x00, 180)]);
        assert_eq!(
            status.clock.map(|c| c.to_string()),
            Some("2024-06-15 13:45:30".to_string())
        );

        let short = Message::new(MSG_SYSTEM_STATUS, vec![0; 5]);
        assert!(parse_system_status(&short).is_err());
    }

    #[test]
    fn test_parse_events_and_validation() {
        let msg = Message::new(MSG_SYSTEM_EVENTS, vec![0x00, 0x05, 0x21, 0x31]);
        assert_eq!(parse_system_events(&msg).unwrap(), vec![0x0005, 0x2131]);

        let ok = parse_code_validation(&Message::new(MSG_VALIDATE_CODE, vec![3, 1])).unwrap();
        assert!(ok.is_valid());
        assert_eq!(ok.user, 3);
        let bad = parse_code_validation(&Message::new(MSG_VALIDATE_CODE, vec![0, 0])).unwrap();
        assert!(!bad.is_valid());
    }
}
