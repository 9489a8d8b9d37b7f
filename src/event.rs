// MIT License - Copyright (c) 2026 Peter Wright
// Panel event broadcast

use crate::points::{PointId, PointValue};

/// All events that can be emitted by the panel.
///
/// Users subscribe via `panel.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<PanelEvent>`.
#[derive(Debug, Clone)]
pub enum PanelEvent {
    /// Secure session established and logged in
    Connected,
    /// Session torn down or lost
    Disconnected,
    /// A point's stored value changed
    PointChanged {
        id: PointId,
        name: String,
        value: PointValue,
    },
    /// Outward notification of something a user did at the panel
    /// (category "Button" or "X10Code").
    UserAction { category: String, payload: String },
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<PanelEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<PanelEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
