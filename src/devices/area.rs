// MIT License - Copyright (c) 2026 Peter Wright
// Security areas

use tracing::info;

use crate::constants::{ALARM_TYPES, ARM_MODES};
use crate::error::Result;
use crate::points::{Access, PointDef, PointId, PointKind, PointStore};

use super::resolve;

/// A configured area, its points, and the derived alarm/arming state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    pub number: u8,
    pub alarmed: PointId,
    pub alarm_bitmask: PointId,
    pub alarm_list: PointId,
    pub arm_status: PointId,
    pub in_delay: PointId,
    /// Index into `ARM_MODES`; `None` until first reported.
    mode: Option<usize>,
    bitmask: u8,
}

const FIELDS: [(&str, PointKind); 5] = [
    ("Alarmed", PointKind::Bool),
    ("AlarmBitmask", PointKind::Card),
    ("AlarmList", PointKind::String),
    ("ArmStatus", PointKind::String),
    ("InDelay", PointKind::Bool),
];

impl Area {
    pub fn item_name(number: u8) -> String {
        format!("Area{number}")
    }

    pub fn point_defs(number: u8) -> Vec<PointDef> {
        let item = Self::item_name(number);
        FIELDS
            .iter()
            .map(|(field, kind)| PointDef::new(format!("{item}_{field}"), *kind, Access::Read))
            .collect()
    }

    pub fn resolve<S: PointStore>(number: u8, store: &S) -> Result<Self> {
        let item = Self::item_name(number);
        let id = |field: &str| resolve(store, &format!("{item}_{field}"));
        Ok(Self {
            number,
            alarmed: id("Alarmed")?,
            alarm_bitmask: id("AlarmBitmask")?,
            alarm_list: id("AlarmList")?,
            arm_status: id("ArmStatus")?,
            in_delay: id("InDelay")?,
            mode: None,
            bitmask: 0,
        })
    }

    pub fn point_ids(&self) -> [PointId; 5] {
        [
            self.alarmed,
            self.alarm_bitmask,
            self.alarm_list,
            self.arm_status,
            self.in_delay,
        ]
    }

    pub fn mode(&self) -> Option<usize> {
        self.mode
    }

    pub fn alarm_bitmask(&self) -> u8 {
        self.bitmask
    }

    /// Record the area's security mode (an `ARM_MODES` index).
    ///
    /// Returns true for a transition from a previously known, different mode.
    /// Entering steady Off clears the alarm bitmask; nothing else does.
    pub fn set_mode<S: PointStore>(&mut self, mode: usize, store: &mut S) -> bool {
        let Some(name) = ARM_MODES.get(mode) else {
            return false;
        };
        let previous = self.mode.replace(mode);
        if previous == Some(mode) {
            return false;
        }

        store.store_string(self.arm_status, name);
        store.store_bool(self.in_delay, mode > 6);
        if mode == 0 && self.bitmask != 0 {
            info!("Area {} disarmed, clearing alarms", self.number);
            self.bitmask = 0;
            self.store_alarms(store);
        }
        previous.is_some()
    }

    /// OR one alarm type (bit 0-7) into the bitmask.
    pub fn add_alarm<S: PointStore>(&mut self, bit: u8, store: &mut S) {
        if bit >= 8 {
            return;
        }
        self.bitmask |= 1 << bit;
        self.store_alarms(store);
    }

    fn store_alarms<S: PointStore>(&self, store: &mut S) {
        let list: Vec<&str> = ALARM_TYPES
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.bitmask & (1 << bit) != 0)
            .map(|(_, name)| *name)
            .collect();
        store.store_bool(self.alarmed, self.bitmask != 0);
        store.store_card(self.alarm_bitmask, self.bitmask as u32);
        store.store_string(self.alarm_list, &list.join(","));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::{MemoryPointStore, PointValue};

    fn area() -> (Area, MemoryPointStore) {
        let mut store = MemoryPointStore::new();
        store.set_points(Area::point_defs(1));
        let area = Area::resolve(1, &store).unwrap();
        (area, store)
    }

    #[test]
    fn test_alarms_accumulate() {
        let (mut area, mut store) = area();
        area.add_alarm(0, &mut store);
        area.add_alarm(1, &mut store);
        assert_eq!(area.alarm_bitmask(), 0b11);
        assert_eq!(store.value(area.alarm_list), Some(&PointValue::String("Burglary,Fire".into())));
        assert_eq!(store.value(area.alarmed), Some(&PointValue::Bool(true)));
    }

    #[test]
    fn test_only_off_clears_alarms() {
        let (mut area, mut store) = area();
        assert!(!area.set_mode(3, &mut store));
        area.add_alarm(6, &mut store);
        assert!(area.set_mode(1, &mut store));
        assert_eq!(area.alarm_bitmask(), 0x40);

        assert!(area.set_mode(0, &mut store));
        assert_eq!(area.alarm_bitmask(), 0);
        assert_eq!(store.value(area.alarm_bitmask), Some(&PointValue::Card(0)));
        assert_eq!(store.value(area.arm_status), Some(&PointValue::String("Off".into())));
    }

    #[test]
    fn test_arming_variant_sets_in_delay() {
        let (mut area, mut store) = area();
        area.set_mode(9, &mut store);
        assert_eq!(store.value(area.arm_status), Some(&PointValue::String("ArmingAway".into())));
        assert_eq!(store.value(area.in_delay), Some(&PointValue::Bool(true)));
        assert!(!area.set_mode(9, &mut store));
        assert!(!area.set_mode(42, &mut store));
    }
}
