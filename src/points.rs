// MIT License - Copyright (c) 2026 Peter Wright
// Point storage facility

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{EventSender, PanelEvent};

/// Identifier the storage facility hands out for a registered point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointId(pub u32);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Bool,
    Card,
    Int,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn readable(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// A point the driver asks the host to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointDef {
    pub name: String,
    pub kind: PointKind,
    pub access: Access,
}

impl PointDef {
    pub fn new(name: impl Into<String>, kind: PointKind, access: Access) -> Self {
        Self {
            name: name.into(),
            kind,
            access,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Bool(bool),
    Card(u32),
    Int(i32),
    String(String),
}

impl PointValue {
    pub fn kind(&self) -> PointKind {
        match self {
            Self::Bool(_) => PointKind::Bool,
            Self::Card(_) => PointKind::Card,
            Self::Int(_) => PointKind::Int,
            Self::String(_) => PointKind::String,
        }
    }

    /// Default value a freshly registered point holds.
    pub fn default_for(kind: PointKind) -> Self {
        match kind {
            PointKind::Bool => Self::Bool(false),
            PointKind::Card => Self::Card(0),
            PointKind::Int => Self::Int(0),
            PointKind::String => Self::String(String::new()),
        }
    }

    /// Coerce a loosely typed value (e.g. from JSON) to the point's kind.
    pub fn coerce(self, kind: PointKind) -> Option<Self> {
        match (self, kind) {
            (v, k) if v.kind() == k => Some(v),
            (Self::Int(i), PointKind::Card) => u32::try_from(i).ok().map(Self::Card),
            (Self::Card(c), PointKind::Int) => i32::try_from(c).ok().map(Self::Int),
            (Self::String(s), PointKind::Bool) => match s.to_ascii_lowercase().as_str() {
                "true" | "on" | "1" => Some(Self::Bool(true)),
                "false" | "off" | "0" => Some(Self::Bool(false)),
                _ => None,
            },
            (Self::String(s), PointKind::Card) => s.trim().parse().ok().map(Self::Card),
            (Self::String(s), PointKind::Int) => s.trim().parse().ok().map(Self::Int),
            _ => None,
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Card(c) => write!(f, "{c}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for PointValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u32> for PointValue {
    fn from(v: u32) -> Self {
        Self::Card(v)
    }
}

impl From<i32> for PointValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for PointValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// The host's point storage and notification facility.
///
/// The driver registers its whole point set in one call, then resolves the
/// ids it was given by name. Ids are assigned in registration order.
pub trait PointStore {
    /// Replace the registered point set.
    fn set_points(&mut self, defs: Vec<PointDef>);

    fn find(&self, name: &str) -> Option<PointId>;

    fn definition(&self, id: PointId) -> Option<&PointDef>;

    fn value(&self, id: PointId) -> Option<&PointValue>;

    /// Store a new value. Returns true if the stored value changed.
    fn store(&mut self, id: PointId, value: PointValue) -> bool;

    fn store_bool(&mut self, id: PointId, value: bool) -> bool {
        self.store(id, PointValue::Bool(value))
    }

    fn store_card(&mut self, id: PointId, value: u32) -> bool {
        self.store(id, PointValue::Card(value))
    }

    fn store_int(&mut self, id: PointId, value: i32) -> bool {
        self.store(id, PointValue::Int(value))
    }

    fn store_string(&mut self, id: PointId, value: &str) -> bool {
        match self.value(id) {
            Some(PointValue::String(current)) if current == value => false,
            _ => self.store(id, PointValue::String(value.to_string())),
        }
    }
}

struct Slot {
    def: PointDef,
    value: PointValue,
}

/// In-memory point store. Optionally broadcasts every change.
#[derive(Default)]
pub struct MemoryPointStore {
    slots: Vec<Slot>,
    by_name: HashMap<String, PointId>,
    event_tx: Option<EventSender>,
}

impl MemoryPointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `PanelEvent::PointChanged` on the given channel for every change.
    pub fn with_events(event_tx: EventSender) -> Self {
        Self {
            event_tx: Some(event_tx),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All readable points with their current values, in id order.
    pub fn snapshot(&self) -> Vec<(String, PointValue)> {
        self.slots
            .iter()
            .filter(|s| s.def.access.readable())
            .map(|s| (s.def.name.clone(), s.value.clone()))
            .collect()
    }
}

impl PointStore for MemoryPointStore {
    fn set_points(&mut self, defs: Vec<PointDef>) {
        debug!("Registering {} points", defs.len());
        self.by_name.clear();
        self.slots = defs
            .into_iter()
            .enumerate()
            .map(|(i, def)| {
                self.by_name.insert(def.name.clone(), PointId(i as u32));
                Slot {
                    value: PointValue::default_for(def.kind),
                    def,
                }
            })
            .collect();
    }

    fn find(&self, name: &str) -> Option<PointId> {
        self.by_name.get(name).copied()
    }

    fn definition(&self, id: PointId) -> Option<&PointDef> {
        self.slots.get(id.0 as usize).map(|s| &s.def)
    }

    fn value(&self, id: PointId) -> Option<&PointValue> {
        self.slots.get(id.0 as usize).map(|s| &s.value)
    }

    fn store(&mut self, id: PointId, value: PointValue) -> bool {
        let Some(slot) = self.slots.get_mut(id.0 as usize) else {
            return false;
        };
        if slot.value == value {
            return false;
        }
        slot.value = value;
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(PanelEvent::PointChanged {
                id,
                name: slot.def.name.clone(),
                value: slot.value.clone(),
            });
        }
        true
    }
}
