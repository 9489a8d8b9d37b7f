// MIT License - Copyright (c) 2026 Peter Wright
// Thermostats

use crate::config::TempScale;
use crate::constants::{FAN_MODES, THERMO_MODES};
use crate::error::Result;
use crate::points::{Access, PointDef, PointId, PointKind, PointStore};
use crate::protocol::ThermostatStatusRecord;

use super::resolve;

/// The writable and readable fields of a thermostat, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatField {
    Hold,
    CurrentTemp,
    CoolSetpoint,
    HeatSetpoint,
    FanMode,
    Mode,
}

impl ThermostatField {
    pub const ALL: [ThermostatField; 6] = [
        Self::Hold,
        Self::CurrentTemp,
        Self::CoolSetpoint,
        Self::HeatSetpoint,
        Self::FanMode,
        Self::Mode,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Hold => "Hold",
            Self::CurrentTemp => "CurrentTemp",
            Self::CoolSetpoint => "CoolSetpoint",
            Self::HeatSetpoint => "HeatSetpoint",
            Self::FanMode => "FanMode",
            Self::Mode => "Mode",
        }
    }

    fn def(self) -> (PointKind, Access) {
        match self {
            Self::Hold => (PointKind::Bool, Access::ReadWrite),
            Self::CurrentTemp => (PointKind::Int, Access::Read),
            Self::CoolSetpoint | Self::HeatSetpoint => (PointKind::Int, Access::ReadWrite),
            Self::FanMode | Self::Mode => (PointKind::String, Access::ReadWrite),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thermostat {
    pub number: u16,
    /// Point ids in `ThermostatField::ALL` order.
    pub points: [PointId; 6],
}

impl Thermostat {
    pub fn item_name(number: u16) -> String {
        format!("Thermo{number}")
    }

    pub fn point_defs(number: u16) -> Vec<PointDef> {
        let item = Self::item_name(number);
        ThermostatField::ALL
            .iter()
            .map(|f| {
                let (kind, access) = f.def();
                PointDef::new(format!("{item}_{}", f.name()), kind, access)
            })
            .collect()
    }

    pub fn resolve<S: PointStore>(number: u16, store: &S) -> Result<Self> {
        let item = Self::item_name(number);
        let mut points = [PointId(0); 6];
        for (slot, field) in points.iter_mut().zip(ThermostatField::ALL) {
            *slot = resolve(store, &format!("{item}_{}", field.name()))?;
        }
        Ok(Self { number, points })
    }

    pub fn point(&self, field: ThermostatField) -> PointId {
        self.points[field as usize]
    }

    pub fn field_of(&self, id: PointId) -> Option<ThermostatField> {
        self.points
            .iter()
            .position(|p| *p == id)
            .map(|i| ThermostatField::ALL[i])
    }

    pub fn apply_status<S: PointStore>(
        &self,
        rec: &ThermostatStatusRecord,
        scale: TempScale,
        store: &mut S,
    ) {
        use ThermostatField::*;
        store.store_bool(self.point(Hold), rec.hold != 0);
        store.store_int(self.point(CurrentTemp), scale.from_raw(rec.current));
        store.store_int(self.point(CoolSetpoint), scale.from_raw(rec.cool_setpoint));
        store.store_int(self.point(HeatSetpoint), scale.from_raw(rec.heat_setpoint));
        if let Some(fan) = FAN_MODES.get(rec.fan as usize) {
            store.store_string(self.point(FanMode), fan);
        }
        if let Some(mode) = THERMO_MODES.get(rec.mode as usize) {
            store.store_string(self.point(Mode), mode);
        }
    }
}
