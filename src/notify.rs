// MIT License - Copyright (c) 2026 Peter Wright
// Decoding of queued system notifications

use tracing::{debug, info, warn};

use crate::event::{EventSender, PanelEvent};
use crate::points::PointStore;
use crate::registry::Registry;

/// One decoded 2-byte notification.
///
/// The word is split into nibbles `n0 n1 n2 n3`, high to low; `n0` selects
/// the branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `0000`: button id in the low byte.
    Button(u8),
    /// Second nibble `11xx`: an X-10 code seen on the powerline.
    X10 { on: bool, house: char, unit: u8 },
    /// `0010`: alarm type bit (0-7) for an area.
    Alarm { area: u8, bit: u8 },
    /// Area security mode change. `mode` indexes `ARM_MODES`.
    Arming { area: u8, mode: usize, in_delay: bool },
    /// No decode is defined for this pattern.
    Unhandled(u16),
}

pub fn decode(word: u16) -> Notification {
    let n0 = (word >> 12) as u8;
    let n1 = ((word >> 8) & 0x0F) as u8;
    let n2 = ((word >> 4) & 0x0F) as u8;
    let n3 = (word & 0x0F) as u8;
    let is_x10 = n1 & 0x0C == 0x0C;
    let x10 = || Notification::X10 {
        on: n1 & 0x02 != 0,
        house: (b'A' + n2) as char,
        unit: n3 + 1,
    };

    match n0 {
        0b0000 if is_x10 => x10(),
        0b0000 => Notification::Button((word & 0xFF) as u8),
        0b0010 if (1..=8).contains(&n2) => Notification::Alarm {
            area: n3,
            bit: n2 - 1,
        },
        0b0010 | 0b0111 | 0b1111 => Notification::Unhandled(word),
        _ if is_x10 => x10(),
        _ => {
            let steady = (n0 & 0x07) as usize;
            let arming = n0 & 0x08 != 0 && steady != 0;
            Notification::Arming {
                area: n1,
                mode: if arming { steady + 6 } else { steady },
                in_delay: arming,
            }
        }
    }
}

/// Apply a buffer of notifications, oldest first.
///
/// Returns true when any area changed security mode, which asks the poll
/// scheduler to back off.
pub fn process_events<S: PointStore>(
    words: &[u16],
    registry: &mut Registry,
    store: &mut S,
    events: &EventSender,
) -> bool {
    let mut transition = false;
    for &word in words {
        match decode(word) {
            Notification::Button(id) => {
                debug!("Button {} pressed", id);
                user_action(events, "Button", id.to_string());
            }
            Notification::X10 { on, house, unit } => {
                let payload = format!("{} {}{}", if on { "On" } else { "Off" }, house, unit);
                debug!("X-10 code {}", payload);
                user_action(events, "X10Code", payload);
            }
            Notification::Alarm { area, bit } => match registry.area_mut(area) {
                Some(a) => {
                    warn!("Area {} alarm bit {}", area, bit);
                    a.add_alarm(bit, store);
                }
                None => debug!("Alarm for unconfigured area {}", area),
            },
            Notification::Arming {
                area,
                mode,
                in_delay,
            } => match registry.area_mut(area) {
                Some(a) => {
                    if a.set_mode(mode, store) {
                        info!("Area {} mode {} (in delay: {})", area, mode, in_delay);
                        transition = true;
                    }
                }
                None => debug!("Arming event for unconfigured area {}", area),
            },
            Notification::Unhandled(word) => {
                debug!("Ignoring notification {:#06x}", word);
            }
        }
    }
    transition
}

fn user_action(events: &EventSender, category: &str, payload: String) {
    let _ = events.send(PanelEvent::UserAction {
        category: category.to_string(),
        payload,
    });
}
