// MIT License - Copyright (c) 2026 Peter Wright
// Units: switched loads, dimmers and flags

use std::fmt;
use std::str::FromStr;

use crate::error::{OmniError, Result};
use crate::points::{Access, PointDef, PointId, PointKind, PointStore};
use crate::protocol::UnitStatusRecord;

use super::resolve;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// On/off load, exposed as a bool `State` point
    Binary,
    /// Light level 0-100, exposed as a card `Value` point
    Dimmer,
    /// Counter 0-255, exposed as a card `Value` point
    Flag,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Binary => "Binary",
            Self::Dimmer => "Dimmer",
            Self::Flag => "Flag",
        })
    }
}

impl FromStr for UnitKind {
    type Err = OmniError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(Self::Binary),
            "dimmer" => Ok(Self::Dimmer),
            "flag" => Ok(Self::Flag),
            _ => Err(OmniError::config(format!("unknown unit type {s:?}"))),
        }
    }
}

/// Decode a unit status byte: 0 off, 1 on, 100..=200 light level + 100.
pub fn light_level(status: u8) -> u32 {
    match status {
        0 => 0,
        1 => 100,
        100..=200 => (status - 100) as u32,
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub number: u16,
    pub kind: UnitKind,
    pub point: PointId,
}

impl Unit {
    pub fn item_name(number: u16) -> String {
        format!("Unit{number}")
    }

    fn field(kind: UnitKind) -> (&'static str, PointKind) {
        match kind {
            UnitKind::Binary => ("State", PointKind::Bool),
            UnitKind::Dimmer | UnitKind::Flag => ("Value", PointKind::Card),
        }
    }

    pub fn point_defs(number: u16, kind: UnitKind) -> Vec<PointDef> {
        let (field, point_kind) = Self::field(kind);
        vec![PointDef::new(
            format!("{}_{field}", Self::item_name(number)),
            point_kind,
            Access::ReadWrite,
        )]
    }

    pub fn resolve<S: PointStore>(number: u16, kind: UnitKind, store: &S) -> Result<Self> {
        let (field, _) = Self::field(kind);
        Ok(Self {
            number,
            kind,
            point: resolve(store, &format!("{}_{field}", Self::item_name(number)))?,
        })
    }

    pub fn apply_status<S: PointStore>(&self, rec: &UnitStatusRecord, store: &mut S) {
        match self.kind {
            UnitKind::Binary => store.store_bool(self.point, light_level(rec.status) > 0),
            UnitKind::Dimmer => store.store_card(self.point, light_level(rec.status)),
            UnitKind::Flag => store.store_card(self.point, rec.status as u32),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::{MemoryPointStore, PointValue};

    #[test]
    fn test_light_level() {
        assert_eq!(light_level(0), 0);
        assert_eq!(light_level(1), 100);
        assert_eq!(light_level(100), 0);
        assert_eq!(light_level(165), 65);
        assert_eq!(light_level(200), 100);
    }

    #[test]
    fn test_status_by_kind() {
        let mut store = MemoryPointStore::new();
        let mut defs = Unit::point_defs(1, UnitKind::Binary);
        defs.extend(Unit::point_defs(2, UnitKind::Dimmer));
        defs.extend(Unit::point_defs(3, UnitKind::Flag));
        store.set_points(defs);

        let binary = Unit::resolve(1, UnitKind::Binary, &store).unwrap();
        let dimmer = Unit::resolve(2, UnitKind::Dimmer, &store).unwrap();
        let flag = Unit::resolve(3, UnitKind::Flag, &store).unwrap();
        let rec = UnitStatusRecord { status: 142, time_remaining: 0 };
        binary.apply_status(&rec, &mut store);
        dimmer.apply_status(&rec, &mut store);
        flag.apply_status(&rec, &mut store);

        assert_eq!(store.value(binary.point), Some(&PointValue::Bool(true)));
        assert_eq!(store.value(dimmer.point), Some(&PointValue::Card(42)));
        assert_eq!(store.value(flag.point), Some(&PointValue::Card(142)));
        assert!(Unit::resolve(4, UnitKind::Flag, &store).is_err());
    }
}
