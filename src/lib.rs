// MIT License - Copyright (c) 2026 Peter Wright
// Driver for HAI Omni controllers over the encrypted UDP interface
//
//! # omni-lan-bridge
//!
//! Talks to HAI/Leviton Omni security and automation controllers over their
//! encrypted Omni-Link UDP interface and exposes areas, zones, units,
//! thermostats and controller-wide status as typed points.
//!
//! The controller never pushes state: the driver drains its notification
//! queue and sweeps item status in blocks on a fixed schedule. Host writes
//! to a point become exactly one controller command.
//!
//! ## Quick Start
//!
//! ```no_run
//! use omni_lan_bridge::{ItemConfig, OmniPanel, PanelConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PanelConfig::builder()
//!         .host("192.168.0.50")
//!         .private_key_hex("00112233445566778899aabbccddeeff")
//!         .login_code("1234")
//!         .build()?;
//!     let items = ItemConfig::parse("Areas=1\nZones=1:Alarm\nThermos=1")?;
//!
//!     let mut panel = OmniPanel::with_memory_store(config, items);
//!     panel.connect_with_retry().await?;
//!
//!     panel.invoke_command("Arm=Area1,Away,1234").await?;
//!
//!     for _ in 0..20 {
//!         tokio::time::sleep_until(panel.next_due()).await;
//!         panel.poll().await;
//!     }
//!     println!("{:?}", panel.store().snapshot());
//!
//!     panel.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod crypto;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod notify;
pub mod panel;
pub mod points;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod transport;

// Re-exports for convenience
pub use config::{ItemConfig, PanelConfig, PanelConfigBuilder, TempScale};
pub use devices::{Area, EnclosureFlags, Thermostat, ThermostatField, Unit, UnitKind, Zone, ZoneKind};
pub use error::{ErrorKind, OmniError, Result};
pub use event::{EventReceiver, EventSender, PanelEvent, event_channel};
pub use panel::{OmniPanel, PollOutcome};
pub use points::{Access, MemoryPointStore, PointDef, PointId, PointKind, PointStore, PointValue};
pub use registry::{Category, Registry};
pub use transport::{SessionState, Transport, UdpTransport};
