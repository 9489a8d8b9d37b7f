// MIT License - Copyright (c) 2026 Peter Wright
// Item registry: dense per-category arenas and point ownership

use tracing::{debug, info};

use crate::config::ItemConfig;
use crate::constants::{ALL_AREAS, MAX_AREAS, MAX_THERMOSTATS, MAX_UNITS, MAX_ZONES};
use crate::devices::{Area, SystemPoints, Thermostat, Unit, Zone};
use crate::error::{OmniError, Result};
use crate::points::{PointDef, PointId, PointStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Area,
    Zone,
    Unit,
    Thermostat,
}

impl Category {
    pub fn capacity(self) -> usize {
        match self {
            Self::Area => MAX_AREAS,
            Self::Zone => MAX_ZONES,
            Self::Unit => MAX_UNITS,
            Self::Thermostat => MAX_THERMOSTATS,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Area => "area",
            Self::Zone => "zone",
            Self::Unit => "unit",
            Self::Thermostat => "thermo",
        }
    }
}

/// The item (or controller-wide point set) a point belongs to.
#[derive(Debug, Clone, Copy)]
pub enum Owner<'a> {
    /// The free-form command point
    Invoke,
    /// Battery and enclosure points
    System,
    Area(&'a Area),
    Zone(&'a Zone),
    Unit(&'a Unit),
    Thermostat(&'a Thermostat),
}

/// Inclusive point id range of one category, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub first: PointId,
    pub last: PointId,
}

impl IdRange {
    fn contains(self, id: PointId) -> bool {
        self.first <= id && id <= self.last
    }
}

fn range_of(ids: impl Iterator<Item = PointId>) -> Option<IdRange> {
    ids.fold(None, |acc, id| match acc {
        None => Some(IdRange { first: id, last: id }),
        Some(r) => Some(IdRange {
            first: r.first.min(id),
            last: r.last.max(id),
        }),
    })
}

/// Configured items, indexed by item number − 1. An empty slot is `None`.
#[derive(Debug, Default)]
pub struct Registry {
    areas: Vec<Option<Area>>,
    zones: Vec<Option<Zone>>,
    units: Vec<Option<Unit>>,
    thermostats: Vec<Option<Thermostat>>,
    system: Option<SystemPoints>,
    area_range: Option<IdRange>,
    zone_range: Option<IdRange>,
    unit_range: Option<IdRange>,
    thermostat_range: Option<IdRange>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every item and rebuild from `items`, registering the full point
    /// set with `store` in one call and then resolving the ids it assigned.
    pub fn rebuild<S: PointStore>(
        &mut self,
        items: &ItemConfig,
        enclosures: usize,
        store: &mut S,
    ) -> Result<()> {
        *self = Self::default();

        let numbered = |flags: &[bool]| -> Vec<u16> {
            flags
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .map(|(i, _)| i as u16 + 1)
                .collect()
        };
        let areas = numbered(&items.areas);
        let thermostats = numbered(&items.thermostats);

        let mut defs: Vec<PointDef> = SystemPoints::point_defs(enclosures);
        for n in &areas {
            defs.extend(Area::point_defs(*n as u8));
        }
        for (slot, kind) in items.zones.iter().enumerate() {
            if let Some(kind) = kind {
                defs.extend(Zone::point_defs(slot as u16 + 1, *kind));
            }
        }
        for (slot, kind) in items.units.iter().enumerate() {
            if let Some(kind) = kind {
                defs.extend(Unit::point_defs(slot as u16 + 1, *kind));
            }
        }
        for n in &thermostats {
            defs.extend(Thermostat::point_defs(*n));
        }
        let total = defs.len();
        store.set_points(defs);

        self.system = Some(SystemPoints::resolve(enclosures, store)?);

        self.areas = vec![None; MAX_AREAS];
        for n in areas {
            self.areas[n as usize - 1] = Some(Area::resolve(n as u8, store)?);
        }
        self.zones = vec![None; MAX_ZONES];
        for (slot, kind) in items.zones.iter().enumerate() {
            if let Some(kind) = kind {
                self.zones[slot] = Some(Zone::resolve(slot as u16 + 1, *kind, store)?);
            }
        }
        self.units = vec![None; MAX_UNITS];
        for (slot, kind) in items.units.iter().enumerate() {
            if let Some(kind) = kind {
                self.units[slot] = Some(Unit::resolve(slot as u16 + 1, *kind, store)?);
            }
        }
        self.thermostats = vec![None; MAX_THERMOSTATS];
        for n in thermostats {
            self.thermostats[n as usize - 1] = Some(Thermostat::resolve(n, store)?);
        }

        self.area_range = range_of(self.areas.iter().flatten().flat_map(|a| a.point_ids()));
        self.zone_range = range_of(self.zones.iter().flatten().flat_map(|z| z.point_ids()));
        self.unit_range = range_of(self.units.iter().flatten().map(|u| u.point));
        self.thermostat_range =
            range_of(self.thermostats.iter().flatten().flat_map(|t| t.points));

        info!(
            "Registered {} points: {} areas, {} zones, {} units, {} thermostats",
            total,
            self.count(Category::Area),
            self.count(Category::Zone),
            self.count(Category::Unit),
            self.count(Category::Thermostat)
        );
        debug!(
            "Point ranges: areas {:?}, zones {:?}, units {:?}, thermostats {:?}",
            self.area_range, self.zone_range, self.unit_range, self.thermostat_range
        );
        Ok(())
    }

    pub fn range(&self, category: Category) -> Option<IdRange> {
        match category {
            Category::Area => self.area_range,
            Category::Zone => self.zone_range,
            Category::Unit => self.unit_range,
            Category::Thermostat => self.thermostat_range,
        }
    }

    /// Find the owner of a point: an O(1) range check per category, then a
    /// scan of that category's items.
    pub fn owner_of(&self, id: PointId) -> Option<Owner<'_>> {
        if let Some(system) = &self.system {
            if id == system.invoke {
                return Some(Owner::Invoke);
            }
            if system.owns(id) {
                return Some(Owner::System);
            }
        }
        if self.area_range.is_some_and(|r| r.contains(id)) {
            return self
                .areas
                .iter()
                .flatten()
                .find(|a| a.point_ids().contains(&id))
                .map(Owner::Area);
        }
        if self.zone_range.is_some_and(|r| r.contains(id)) {
            return self
                .zones
                .iter()
                .flatten()
                .find(|z| z.owns(id))
                .map(Owner::Zone);
        }
        if self.unit_range.is_some_and(|r| r.contains(id)) {
            return self
                .units
                .iter()
                .flatten()
                .find(|u| u.point == id)
                .map(Owner::Unit);
        }
        if self.thermostat_range.is_some_and(|r| r.contains(id)) {
            return self
                .thermostats
                .iter()
                .flatten()
                .find(|t| t.points.contains(&id))
                .map(Owner::Thermostat);
        }
        None
    }

    pub fn system(&self) -> Option<&SystemPoints> {
        self.system.as_ref()
    }

    pub fn count(&self, category: Category) -> usize {
        match category {
            Category::Area => self.areas.iter().flatten().count(),
            Category::Zone => self.zones.iter().flatten().count(),
            Category::Unit => self.units.iter().flatten().count(),
            Category::Thermostat => self.thermostats.iter().flatten().count(),
        }
    }

    /// Whether 0-based `slot` of `category` holds an item.
    pub fn is_configured(&self, category: Category, slot: usize) -> bool {
        match category {
            Category::Area => self.areas.get(slot).is_some_and(Option::is_some),
            Category::Zone => self.zones.get(slot).is_some_and(Option::is_some),
            Category::Unit => self.units.get(slot).is_some_and(Option::is_some),
            Category::Thermostat => self.thermostats.get(slot).is_some_and(Option::is_some),
        }
    }

    pub fn area(&self, number: u8) -> Option<&Area> {
        self.areas.get((number as usize).checked_sub(1)?)?.as_ref()
    }

    pub fn area_mut(&mut self, number: u8) -> Option<&mut Area> {
        self.areas.get_mut((number as usize).checked_sub(1)?)?.as_mut()
    }

    pub fn areas_mut(&mut self) -> impl Iterator<Item = &mut Area> {
        self.areas.iter_mut().flatten()
    }

    pub fn zone(&self, number: u16) -> Option<&Zone> {
        self.zones.get((number as usize).checked_sub(1)?)?.as_ref()
    }

    pub fn unit(&self, number: u16) -> Option<&Unit> {
        self.units.get((number as usize).checked_sub(1)?)?.as_ref()
    }

    pub fn thermostat(&self, number: u16) -> Option<&Thermostat> {
        self.thermostats.get((number as usize).checked_sub(1)?)?.as_ref()
    }

    /// Zones with item numbers in `first..=last`.
    pub fn zones_in(&self, first: u16, last: u16) -> impl Iterator<Item = &Zone> {
        self.zones.iter().flatten().filter(move |z| (first..=last).contains(&z.number))
    }

    /// Resolve an item name such as `Zone12` (case-insensitive) or a bare
    /// item number to a configured item number of `category`.
    pub fn resolve_name(&self, category: Category, name: &str) -> Result<u16> {
        let lower = name.trim().to_ascii_lowercase();
        let digits = lower.strip_prefix(category.prefix()).unwrap_or(&lower);
        digits
            .parse::<u16>()
            .ok()
            .filter(|n| *n >= 1 && self.is_configured(category, *n as usize - 1))
            .ok_or_else(|| OmniError::ItemNotFound {
                name: name.trim().to_string(),
            })
    }

    /// Resolve an area name, with `$All$` meaning every area (0).
    pub fn resolve_area(&self, name: &str) -> Result<u8> {
        if name.trim().eq_ignore_ascii_case(ALL_AREAS) {
            return Ok(0);
        }
        Ok(self.resolve_name(Category::Area, name)? as u8)
    }
}
