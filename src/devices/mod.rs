// MIT License - Copyright (c) 2026 Peter Wright
// Per-category item records and their points

pub mod area;
pub mod system;
pub mod thermostat;
pub mod unit;
pub mod zone;

pub use area::Area;
pub use system::{EnclosureFlags, SystemPoints};
pub use thermostat::{Thermostat, ThermostatField};
pub use unit::{Unit, UnitKind};
pub use zone::{Zone, ZoneKind, ZoneStatus};

use crate::error::{OmniError, Result};
use crate::points::{PointId, PointStore};

/// Look up a point id the registry asked the store to create.
pub(crate) fn resolve<S: PointStore>(store: &S, name: &str) -> Result<PointId> {
    store
        .find(name)
        .ok_or_else(|| OmniError::config(format!("point {name} was not registered")))
}
