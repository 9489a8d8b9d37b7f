// MIT License - Copyright (c) 2026 Peter Wright
// Controller-wide points: command entry, battery, expansion enclosures

use bitflags::bitflags;
use tracing::debug;

use crate::error::Result;
use crate::points::{Access, PointDef, PointId, PointKind, PointStore};
use crate::protocol::SystemStatus;

use super::resolve;

bitflags! {
    /// Trouble flags reported for each expansion enclosure.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EnclosureFlags: u8 {
        /// AC power failure
        const AC_FAIL     = 0b0000_0001;
        /// Battery low
        const BATTERY_LOW = 0b0000_0010;
        /// Communication with the enclosure lost
        const COMM_FAIL   = 0b0000_0100;
    }
}

pub const INVOKE_POINT: &str = "InvokeCmd";
pub const BATTERY_POINT: &str = "Battery";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosurePoints {
    pub ac_fail: PointId,
    pub battery_low: PointId,
    pub comm_fail: PointId,
    pub battery_level: PointId,
}

/// Points that belong to the controller rather than to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPoints {
    pub invoke: PointId,
    pub battery: PointId,
    pub enclosures: Vec<EnclosurePoints>,
}

impl SystemPoints {
    pub fn point_defs(enclosures: usize) -> Vec<PointDef> {
        let mut defs = vec![
            PointDef::new(INVOKE_POINT, PointKind::String, Access::Write),
            PointDef::new(BATTERY_POINT, PointKind::Card, Access::Read),
        ];
        for n in 1..=enclosures {
            defs.push(PointDef::new(format!("ENCL{n}_ACFail"), PointKind::Bool, Access::Read));
            defs.push(PointDef::new(format!("ENCL{n}_BattLow"), PointKind::Bool, Access::Read));
            defs.push(PointDef::new(format!("ENCL{n}_CommFail"), PointKind::Bool, Access::Read));
            defs.push(PointDef::new(format!("ENCL{n}_BattLevel"), PointKind::Card, Access::Read));
        }
        defs
    }

    pub fn resolve<S: PointStore>(enclosures: usize, store: &S) -> Result<Self> {
        let enclosures = (1..=enclosures)
            .map(|n| {
                Ok(EnclosurePoints {
                    ac_fail: resolve(store, &format!("ENCL{n}_ACFail"))?,
                    battery_low: resolve(store, &format!("ENCL{n}_BattLow"))?,
                    comm_fail: resolve(store, &format!("ENCL{n}_CommFail"))?,
                    battery_level: resolve(store, &format!("ENCL{n}_BattLevel"))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            invoke: resolve(store, INVOKE_POINT)?,
            battery: resolve(store, BATTERY_POINT)?,
            enclosures,
        })
    }

    pub fn owns(&self, id: PointId) -> bool {
        id == self.invoke
            || id == self.battery
            || self.enclosures.iter().any(|e| {
                [e.ac_fail, e.battery_low, e.comm_fail, e.battery_level].contains(&id)
            })
    }

    /// Store battery and enclosure readings. Area modes are handled by the registry.
    pub fn apply_status<S: PointStore>(&self, status: &SystemStatus, store: &mut S) {
        if let Some(clock) = status.clock {
            debug!("Controller clock {}", clock);
        }
        store.store_card(self.battery, status.battery as u32);
        for (points, (raw, level)) in self.enclosures.iter().zip(&status.enclosures) {
            let flags = EnclosureFlags::from_bits_truncate(*raw);
            store.store_bool(points.ac_fail, flags.contains(EnclosureFlags::AC_FAIL));
            store.store_bool(points.battery_low, flags.contains(EnclosureFlags::BATTERY_LOW));
            store.store_bool(points.comm_fail, flags.contains(EnclosureFlags::COMM_FAIL));
            store.store_card(points.battery_level, *level as u32);
        }
    }
}
