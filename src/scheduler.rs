// MIT License - Copyright (c) 2026 Peter Wright
// Round-robin block polling

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::PanelConfig;
use crate::constants::*;
use crate::event::EventSender;
use crate::notify::process_events;
use crate::points::PointStore;
use crate::protocol::{
    Request, parse_aux_status, parse_system_events, parse_system_status, parse_thermostat_status,
    parse_unit_status, parse_zone_status,
};
use crate::registry::{Category, Registry};
use crate::transport::Transport;

/// Due time and block cursor of one polled category.
#[derive(Debug, Clone)]
pub struct PollCategory {
    pub next_due: Instant,
    /// Index of the next block to consider.
    pub cursor: usize,
    pub block_size: usize,
    pub capacity: usize,
    pub interval: Duration,
}

impl PollCategory {
    pub fn new(block_size: usize, capacity: usize, interval: Duration, now: Instant) -> Self {
        Self {
            next_due: now,
            cursor: 0,
            block_size,
            capacity,
            interval,
        }
    }

    fn block_count(&self) -> usize {
        self.capacity.div_ceil(self.block_size)
    }

    /// The next block at or after the cursor holding at least one
    /// configured slot, as a 0-based inclusive slot range. Empty blocks are
    /// skipped and the search wraps at the category's capacity.
    ///
    /// The cursor stays put until [`PollCategory::advance_past`] is called,
    /// so a block whose request fails is asked for again.
    pub fn next_block(&self, configured: impl Fn(usize) -> bool) -> Option<(usize, usize)> {
        let blocks = self.block_count();
        (0..blocks)
            .map(|step| (self.cursor + step) % blocks)
            .map(|block| {
                let first = block * self.block_size;
                (first, (first + self.block_size).min(self.capacity) - 1)
            })
            .find(|(first, last)| (*first..=*last).any(&configured))
    }

    /// Move the cursor to the block after the one starting at `first`.
    pub fn advance_past(&mut self, first: usize) {
        self.cursor = (first / self.block_size + 1) % self.block_count();
    }

    fn push_back(&mut self, now: Instant, delay: Duration) {
        self.next_due = self.next_due.max(now + delay);
    }
}

/// Poll timing for the events queue, system status and the three block
/// polled categories.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    pub events_due: Instant,
    pub system_due: Instant,
    pub zones: PollCategory,
    pub units: PollCategory,
    pub thermostats: PollCategory,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollScheduler {
    /// Everything is due immediately.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            events_due: now,
            system_due: now,
            zones: PollCategory::new(ZONE_BLOCK, MAX_ZONES, ZONE_INTERVAL, now),
            units: PollCategory::new(UNIT_BLOCK, MAX_UNITS, UNIT_INTERVAL, now),
            thermostats: PollCategory::new(THERMO_BLOCK, MAX_THERMOSTATS, THERMO_INTERVAL, now),
        }
    }

    /// The controller stays busy for a while after an arm/disarm transition.
    pub fn back_off(&mut self, now: Instant) {
        debug!("Arm transition, backing off block polls");
        self.zones.push_back(now, ZONE_BACKOFF);
        self.units.push_back(now, UNIT_BACKOFF);
        self.thermostats.push_back(now, THERMO_BACKOFF);
        self.system_due = self.system_due.max(now + SYSTEM_BACKOFF);
    }

    /// Earliest instant at which [`PollScheduler::tick`] has work to do.
    pub fn next_due(&self) -> Instant {
        [
            self.events_due,
            self.system_due,
            self.zones.next_due,
            self.units.next_due,
            self.thermostats.next_due,
        ]
        .into_iter()
        .min()
        .unwrap_or(self.events_due)
    }

    /// Run one poll tick. The first error ends the tick.
    pub async fn tick<T: Transport, S: PointStore>(
        &mut self,
        transport: &mut T,
        registry: &mut Registry,
        store: &mut S,
        config: &PanelConfig,
        events: &EventSender,
    ) -> crate::error::Result<()> {
        let wait = config.reply_timeout;

        // Events first: the controller's queue is shallow and losing one
        // corrupts alarm and arming state.
        let now = Instant::now();
        if now >= self.events_due {
            let reply = transport.request(&Request::SystemEvents, wait).await?;
            let words = parse_system_events(&reply)?;
            if !words.is_empty() {
                debug!("Processing {} notifications", words.len());
            }
            if process_events(&words, registry, store, events) {
                self.back_off(Instant::now());
            }
            self.events_due = now + EVENTS_INTERVAL;
        }

        let now = Instant::now();

        if now >= self.system_due {
            let reply = transport.request(&Request::SystemStatus, wait).await?;
            let status = parse_system_status(&reply)?;
            if let Some(system) = registry.system() {
                system.apply_status(&status, store);
            }
            let mut transition = false;
            for area in registry.areas_mut() {
                if let Some(mode) = status.area_modes.get(area.number as usize - 1) {
                    transition |= area.set_mode(*mode as usize, store);
                }
            }
            self.system_due = now + SYSTEM_INTERVAL;
            if transition {
                info!("Area mode changed in system status");
                self.back_off(now);
            }
        }

        if now >= self.zones.next_due {
            if let Some((first, last)) = self
                .zones
                .next_block(|slot| registry.is_configured(Category::Zone, slot))
            {
                let slot = first;
                let (first, last) = (first as u16 + 1, last as u16 + 1);
                let reply = transport
                    .request(&Request::ZoneStatus { first, last }, wait)
                    .await?;
                for (number, rec) in parse_zone_status(&reply, first)? {
                    if let Some(zone) = registry.zone(number) {
                        zone.apply_status(&rec, store);
                    }
                }
                if registry.zones_in(first, last).any(|z| z.kind.is_sensor()) {
                    let reply = transport
                        .request(&Request::AuxStatus { first, last }, wait)
                        .await?;
                    for (number, rec) in parse_aux_status(&reply, first)? {
                        if let Some(zone) = registry.zone(number) {
                            zone.apply_aux(&rec, config.temp_scale, store);
                        }
                    }
                }
                self.zones.advance_past(slot);
            }
            self.zones.next_due = now + self.zones.interval;
        }

        if now >= self.units.next_due {
            if let Some((first, last)) = self
                .units
                .next_block(|slot| registry.is_configured(Category::Unit, slot))
            {
                let slot = first;
                let (first, last) = (first as u16 + 1, last as u16 + 1);
                let reply = transport
                    .request(&Request::UnitStatus { first, last }, wait)
                    .await?;
                for (number, rec) in parse_unit_status(&reply, first)? {
                    if let Some(unit) = registry.unit(number) {
                        unit.apply_status(&rec, store);
                    }
                }
                self.units.advance_past(slot);
            }
            self.units.next_due = now + self.units.interval;
        }

        if now >= self.thermostats.next_due {
            if let Some((first, last)) = self
                .thermostats
                .next_block(|slot| registry.is_configured(Category::Thermostat, slot))
            {
                let slot = first;
                let (first, last) = (first as u16 + 1, last as u16 + 1);
                let reply = transport
                    .request(&Request::ThermostatStatus { first, last }, wait)
                    .await?;
                for (number, rec) in parse_thermostat_status(&reply, first)? {
                    if let Some(thermo) = registry.thermostat(number) {
                        thermo.apply_status(&rec, config.temp_scale, store);
                    }
                }
                self.thermostats.advance_past(slot);
            }
            self.thermostats.next_due = now + self.thermostats.interval;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ItemConfig;
    use crate::event::event_channel;
    use crate::points::{MemoryPointStore, PointValue};
    use crate::protocol::Message;
    use crate::transport::mock::MockTransport;

    fn config() -> PanelConfig {
        PanelConfig::builder()
            .host("127.0.0.1")
            .private_key([0; 16])
            .login_code("1234")
            .build()
            .unwrap()
    }

    fn system_status(area_modes: [u8; MAX_AREAS]) -> Message {
        let mut data = vec![0u8; 13];
        data.push(200);
        data.extend_from_slice(&area_modes);
        Message::new(MSG_SYSTEM_STATUS, data)
    }

    fn events(words: &[u16]) -> Message {
        Message::new(
            MSG_SYSTEM_EVENTS,
            words.iter().flat_map(|w| w.to_be_bytes()).collect(),
        )
    }

    /// Pick the next block and commit the cursor, as a successful poll does.
    fn step(cat: &mut PollCategory, configured: impl Fn(usize) -> bool) -> Option<(usize, usize)> {
        let block = cat.next_block(configured);
        if let Some((first, _)) = block {
            cat.advance_past(first);
        }
        block
    }

    #[test]
    fn test_sweep_visits_only_occupied_blocks() {
        let now = Instant::now();
        let mut zones = PollCategory::new(44, 175, ZONE_INTERVAL, now);
        // zones 3, 7 and 12 are slots 2, 6 and 11, all in the first block
        let configured = |slot: usize| [2, 6, 11].contains(&slot);

        let mut visited = Vec::new();
        for _ in 0..zones.block_count() {
            visited.push(step(&mut zones, configured));
        }
        assert_eq!(zones.block_count(), 4);
        assert!(visited.iter().all(|b| *b == Some((0, 43))));
        assert_eq!(zones.cursor, 1);
    }

    #[test]
    fn test_sweep_wraps_and_skips_empty_blocks() {
        let now = Instant::now();
        let mut zones = PollCategory::new(44, 175, ZONE_INTERVAL, now);
        let configured = |slot: usize| [2, 99, 170].contains(&slot);

        let sweep: Vec<_> = (0..4).map(|_| step(&mut zones, configured)).collect();
        assert_eq!(
            sweep,
            vec![Some((0, 43)), Some((88, 131)), Some((132, 174)), Some((0, 43))]
        );

        let mut empty = PollCategory::new(16, 64, THERMO_INTERVAL, now);
        assert_eq!(step(&mut empty, |_| false), None);
        assert_eq!(empty.cursor, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_polls_everything_in_order() {
        let items =
            ItemConfig::parse("Areas=1\nThermos=1\nUnits=1:Binary\nZones=3:Alarm,7:Temp").unwrap();
        let mut store = MemoryPointStore::new();
        let mut registry = Registry::new();
        registry.rebuild(&items, 0, &mut store).unwrap();
        let (tx, _rx) = event_channel(16);

        let mut transport = MockTransport::new();
        transport
            .push_reply(events(&[]))
            .push_reply(system_status([3, 0, 0, 0, 0, 0, 0, 0]))
            .push_reply(Message::new(MSG_ZONE_STATUS, vec![0; 88]))
            .push_reply(Message::new(MSG_AUX_STATUS, vec![0; 176]))
            .push_reply(Message::new(MSG_UNIT_STATUS, vec![1, 0, 0].repeat(32)))
            .push_reply(Message::new(MSG_THERMO_STATUS, vec![0, 120, 0, 0, 1, 0, 0].repeat(16)));

        let mut scheduler = PollScheduler::new();
        scheduler
            .tick(&mut transport, &mut registry, &mut store, &config(), &tx)
            .await
            .unwrap();

        assert_eq!(
            transport.sent,
            vec![
                Request::SystemEvents,
                Request::SystemStatus,
                Request::ZoneStatus { first: 1, last: 44 },
                Request::AuxStatus { first: 1, last: 44 },
                Request::UnitStatus { first: 1, last: 32 },
                Request::ThermostatStatus { first: 1, last: 16 },
            ]
        );
        let value = |name: &str| store.value(store.find(name).unwrap()).cloned();
        assert_eq!(value("Battery"), Some(PointValue::Card(200)));
        assert_eq!(value("Area1_ArmStatus"), Some(PointValue::String("Away".into())));
        assert_eq!(value("Unit1_State"), Some(PointValue::Bool(true)));
        assert_eq!(value("Thermo1_Mode"), Some(PointValue::String("Heat".into())));

        // Nothing is due again until the events interval passes
        let sent = transport.sent.len();
        scheduler
            .tick(&mut transport, &mut registry, &mut store, &config(), &tx)
            .await
            .unwrap();
        assert_eq!(transport.sent.len(), sent);

        tokio::time::advance(EVENTS_INTERVAL).await;
        transport.push_reply(events(&[]));
        scheduler
            .tick(&mut transport, &mut registry, &mut store, &config(), &tx)
            .await
            .unwrap();
        assert_eq!(transport.sent.last(), Some(&Request::SystemEvents));
        assert_eq!(transport.sent.len(), sent + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_transition_backs_off_block_polls() {
        let items = ItemConfig::parse("Areas=1\nZones=3:Alarm").unwrap();
        let mut store = MemoryPointStore::new();
        let mut registry = Registry::new();
        registry.rebuild(&items, 0, &mut store).unwrap();
        let (tx, _rx) = event_channel(16);
        let cfg = config();

        let mut transport = MockTransport::new();
        transport
            .push_reply(events(&[]))
            .push_reply(system_status([0; MAX_AREAS]))
            .push_reply(Message::new(MSG_ZONE_STATUS, vec![0; 88]));
        let mut scheduler = PollScheduler::new();
        scheduler
            .tick(&mut transport, &mut registry, &mut store, &cfg, &tx)
            .await
            .unwrap();

        // Area 1 arms away
        tokio::time::advance(Duration::from_millis(300)).await;
        transport.push_reply(events(&[0x3100]));
        let before = transport.sent.len();
        scheduler
            .tick(&mut transport, &mut registry, &mut store, &cfg, &tx)
            .await
            .unwrap();
        assert_eq!(transport.sent.len(), before + 1);

        let now = Instant::now();
        assert!(scheduler.zones.next_due >= now + ZONE_BACKOFF);
        assert!(scheduler.units.next_due >= now + UNIT_BACKOFF);
        assert!(scheduler.thermostats.next_due >= now + THERMO_BACKOFF);
        assert!(scheduler.system_due >= now + SYSTEM_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_tick() {
        let items = ItemConfig::parse("Areas=1").unwrap();
        let mut store = MemoryPointStore::new();
        let mut registry = Registry::new();
        registry.rebuild(&items, 0, &mut store).unwrap();
        let (tx, _rx) = event_channel(16);

        let mut transport = MockTransport::new();
        let mut scheduler = PollScheduler::new();
        let err = scheduler
            .tick(&mut transport, &mut registry, &mut store, &config(), &tx)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(transport.sent, vec![Request::SystemEvents]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_block_is_polled_again() {
        let items = ItemConfig::parse("Zones=3:Alarm,99:Alarm").unwrap();
        let mut store = MemoryPointStore::new();
        let mut registry = Registry::new();
        registry.rebuild(&items, 0, &mut store).unwrap();
        let (tx, _rx) = event_channel(16);
        let cfg = config();

        // Zone request times out
        let mut transport = MockTransport::new();
        transport
            .push_reply(events(&[]))
            .push_reply(system_status([0; MAX_AREAS]));
        let mut scheduler = PollScheduler::new();
        let err = scheduler
            .tick(&mut transport, &mut registry, &mut store, &cfg, &tx)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(scheduler.zones.cursor, 0);

        tokio::time::advance(ZONE_INTERVAL).await;
        transport
            .push_reply(events(&[]))
            .push_reply(Message::new(MSG_ZONE_STATUS, vec![0; 88]));
        scheduler
            .tick(&mut transport, &mut registry, &mut store, &cfg, &tx)
            .await
            .unwrap();
        assert_eq!(
            transport.sent.last(),
            Some(&Request::ZoneStatus { first: 1, last: 44 })
        );

        tokio::time::advance(ZONE_INTERVAL).await;
        transport
            .push_reply(events(&[]))
            .push_reply(Message::new(MSG_ZONE_STATUS, vec![0; 88]));
        scheduler
            .tick(&mut transport, &mut registry, &mut store, &cfg, &tx)
            .await
            .unwrap();
        assert_eq!(
            transport.sent.last(),
            Some(&Request::ZoneStatus { first: 89, last: 132 })
        );
    }
}
