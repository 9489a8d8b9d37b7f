// MIT License - Copyright (c) 2026 Peter Wright
// Zones: alarm loops and temperature/humidity sensors

use std::fmt;
use std::str::FromStr;

use crate::config::{TempScale, humidity_from_raw};
use crate::constants::{ZONE_ARMING, ZONE_CONDITIONS, ZONE_LATCHED};
use crate::error::{OmniError, Result};
use crate::points::{Access, PointDef, PointId, PointKind, PointStore};
use crate::protocol::{AuxStatusRecord, ZoneStatusRecord};

use super::resolve;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Alarm,
    Humidity,
    Temp,
}

impl ZoneKind {
    /// Temperature and humidity zones also report aux status.
    pub fn is_sensor(self) -> bool {
        matches!(self, Self::Humidity | Self::Temp)
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alarm => "Alarm",
            Self::Humidity => "Humidity",
            Self::Temp => "Temp",
        })
    }
}

impl FromStr for ZoneKind {
    type Err = OmniError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "alarm" => Ok(Self::Alarm),
            "humidity" => Ok(Self::Humidity),
            "temp" => Ok(Self::Temp),
            _ => Err(OmniError::config(format!("unknown zone type {s:?}"))),
        }
    }
}

/// Zone status byte: bits 0-1 condition, bits 2-3 latched alarm, bits 4-5 arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneStatus(pub u8);

impl ZoneStatus {
    pub fn condition(self) -> &'static str {
        ZONE_CONDITIONS[(self.0 & 0x03) as usize]
    }

    pub fn latched(self) -> &'static str {
        ZONE_LATCHED[((self.0 >> 2) & 0x03) as usize]
    }

    pub fn arming(self) -> &'static str {
        ZONE_ARMING[((self.0 >> 4) & 0x03) as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneExtra {
    Alarm {
        analog: PointId,
        arming: PointId,
        latched: PointId,
    },
    Sensor {
        current: PointId,
        low: PointId,
        high: PointId,
    },
}

/// A configured zone and the points it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub number: u16,
    pub kind: ZoneKind,
    pub status: PointId,
    pub extra: ZoneExtra,
}

impl Zone {
    pub fn item_name(number: u16) -> String {
        format!("Zone{number}")
    }

    pub fn point_defs(number: u16, kind: ZoneKind) -> Vec<PointDef> {
        let item = Self::item_name(number);
        let mut defs = vec![PointDef::new(
            format!("{item}_Status"),
            PointKind::String,
            Access::Read,
        )];
        match kind {
            ZoneKind::Alarm => {
                defs.push(PointDef::new(format!("{item}_Analog"), PointKind::Card, Access::Read));
                defs.push(PointDef::new(format!("{item}_Arming"), PointKind::String, Access::Read));
                defs.push(PointDef::new(format!("{item}_Latched"), PointKind::String, Access::Read));
            }
            ZoneKind::Humidity | ZoneKind::Temp => {
                for field in ["CurrentValue", "LowSetpoint", "HighSetpoint"] {
                    defs.push(PointDef::new(format!("{item}_{field}"), PointKind::Int, Access::Read));
                }
            }
        }
        defs
    }

    pub fn resolve<S: PointStore>(number: u16, kind: ZoneKind, store: &S) -> Result<Self> {
        let item = Self::item_name(number);
        let id = |field: &str| resolve(store, &format!("{item}_{field}"));
        let extra = match kind {
            ZoneKind::Alarm => ZoneExtra::Alarm {
                analog: id("Analog")?,
                arming: id("Arming")?,
                latched: id("Latched")?,
            },
            ZoneKind::Humidity | ZoneKind::Temp => ZoneExtra::Sensor {
                current: id("CurrentValue")?,
                low: id("LowSetpoint")?,
                high: id("HighSetpoint")?,
            },
        };
        Ok(Self {
            number,
            kind,
            status: id("Status")?,
            extra,
        })
    }

    pub fn point_ids(&self) -> Vec<PointId> {
        let mut ids = vec![self.status];
        match self.extra {
            ZoneExtra::Alarm { analog, arming, latched } => ids.extend([analog, arming, latched]),
            ZoneExtra::Sensor { current, low, high } => ids.extend([current, low, high]),
        }
        ids
    }

    pub fn owns(&self, id: PointId) -> bool {
        self.point_ids().contains(&id)
    }

    pub fn apply_status<S: PointStore>(&self, rec: &ZoneStatusRecord, store: &mut S) {
        let status = ZoneStatus(rec.status);
        store.store_string(self.status, status.condition());
        if let ZoneExtra::Alarm { analog, arming, latched } = self.extra {
            store.store_card(analog, rec.loop_reading as u32);
            store.store_string(arming, status.arming());
            store.store_string(latched, status.latched());
        }
    }

    pub fn apply_aux<S: PointStore>(&self, rec: &AuxStatusRecord, scale: TempScale, store: &mut S) {
        let ZoneExtra::Sensor { current, low, high } = self.extra else {
            return;
        };
        let convert = |raw: u8| match self.kind {
            ZoneKind::Humidity => humidity_from_raw(raw) as i32,
            _ => scale.from_raw(raw),
        };
        store.store_int(current, convert(rec.current));
        store.store_int(low, convert(rec.low_setpoint));
        store.store_int(high, convert(rec.high_setpoint));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::{MemoryPointStore, PointValue};

    #[test]
    fn test_status_byte_fields() {
        let s = ZoneStatus(0b0001_0101);
        assert_eq!(s.condition(), "NotReady");
        assert_eq!(s.latched(), "Tripped");
        assert_eq!(s.arming(), "Armed");
        assert_eq!(ZoneStatus(0).condition(), "Secure");
    }

    #[test]
    fn test_alarm_and_sensor_points() {
        let alarm = Zone::point_defs(3, ZoneKind::Alarm);
        let names: Vec<&str> = alarm.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Zone3_Status", "Zone3_Analog", "Zone3_Arming", "Zone3_Latched"]);
        assert_eq!(Zone::point_defs(7, ZoneKind::Temp).len(), 4);
        assert!(Zone::point_defs(7, ZoneKind::Humidity).iter().all(|d| !d.access.writable()));
    }

    #[test]
    fn test_apply_aux_humidity() {
        let mut store = MemoryPointStore::new();
        store.set_points(Zone::point_defs(12, ZoneKind::Humidity));
        let zone = Zone::resolve(12, ZoneKind::Humidity, &store).unwrap();
        let rec = AuxStatusRecord {
            relay: 0,
            current: 100,
            low_setpoint: 0,
            high_setpoint: 255,
        };
        zone.apply_aux(&rec, TempScale::Celsius, &mut store);
        let current = store.find("Zone12_CurrentValue").unwrap();
        assert_eq!(store.value(current), Some(&PointValue::Int(50)));
        let high = store.find("Zone12_HighSetpoint").unwrap();
        assert_eq!(store.value(high), Some(&PointValue::Int(100)));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("alarm".parse::<ZoneKind>().unwrap(), ZoneKind::Alarm);
        assert_eq!("TEMP".parse::<ZoneKind>().unwrap(), ZoneKind::Temp);
        assert!("Smoke".parse::<ZoneKind>().is_err());
    }
}
