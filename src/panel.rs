// MIT License - Copyright (c) 2026 Peter Wright
// Panel facade: connection lifecycle, poll ticks, writes

use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::{ItemConfig, PanelConfig};
use crate::constants::MAX_POLL_TIMEOUTS;
use crate::dispatch;
use crate::error::{ErrorKind, OmniError, Result};
use crate::event::{EventReceiver, EventSender, PanelEvent, event_channel};
use crate::points::{MemoryPointStore, PointId, PointStore, PointValue};
use crate::registry::Registry;
use crate::scheduler::PollScheduler;
use crate::transport::UdpTransport;

/// What a poll tick means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ok,
    /// The tick timed out; this many in a row so far.
    TimeoutTolerated(u32),
    /// Too many timeouts, or the session was torn down. Reconnect.
    LostConnection,
    /// Any other failure. Reopen the socket and reconnect.
    LostCommResource,
}

impl PollOutcome {
    pub fn is_lost(self) -> bool {
        matches!(self, Self::LostConnection | Self::LostCommResource)
    }
}

/// Whether a failed connect is worth another attempt. A refused login is,
/// since the whole connect cycle is simply run again later.
pub fn is_retryable(err: &OmniError) -> bool {
    matches!(err, OmniError::LoginRejected)
        || matches!(err.kind(), ErrorKind::Connection | ErrorKind::Timeout)
}

/// Classify a tick result given the number of consecutive timeouts before
/// it. Returns the outcome and the new consecutive timeout count.
pub fn classify(result: &Result<()>, timeouts: u32) -> (PollOutcome, u32) {
    match result {
        Ok(()) => (PollOutcome::Ok, 0),
        Err(e) if e.is_timeout() => {
            let timeouts = timeouts + 1;
            if timeouts > MAX_POLL_TIMEOUTS {
                (PollOutcome::LostConnection, timeouts)
            } else {
                (PollOutcome::TimeoutTolerated(timeouts), timeouts)
            }
        }
        Err(e) if e.kind() == ErrorKind::Connection => (PollOutcome::LostConnection, 0),
        Err(_) => (PollOutcome::LostCommResource, 0),
    }
}

/// The main public API for a connected Omni controller.
///
/// The panel owns the socket, the item registry and the point store. Every
/// operation takes `&mut self`, so a poll tick and a write can never have
/// two requests in flight at once; hosts that poll and write from different
/// tasks share the panel behind a `tokio::sync::Mutex`.
///
/// # Example
///
/// ```no_run
/// use omni_lan_bridge::{ItemConfig, OmniPanel, PanelConfig, PollOutcome};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = PanelConfig::builder()
///         .host("192.168.0.50")
///         .private_key_hex("00112233445566778899aabbccddeeff")
///         .login_code("1234")
///         .build()?;
///     let items = ItemConfig::parse("Areas=1\nZones=1:Alarm,2:Alarm\nUnits=3:Dimmer")?;
///
///     let mut panel = OmniPanel::with_memory_store(config, items);
///     let mut events = panel.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     panel.connect_with_retry().await?;
///     panel.write_point_by_name("Unit3_Value", 40u32.into()).await?;
///     loop {
///         tokio::time::sleep_until(panel.next_due()).await;
///         if panel.poll().await.is_lost() {
///             panel.connect_with_retry().await?;
///         }
///     }
/// }
/// ```
pub struct OmniPanel<S: PointStore = MemoryPointStore> {
    config: PanelConfig,
    items: ItemConfig,
    store: S,
    registry: Registry,
    scheduler: PollScheduler,
    transport: Option<UdpTransport>,
    event_tx: EventSender,
    timeouts: u32,
}

impl OmniPanel<MemoryPointStore> {
    /// Panel with an in-memory point store that broadcasts point changes on
    /// the panel's event channel.
    pub fn with_memory_store(config: PanelConfig, items: ItemConfig) -> Self {
        let (event_tx, _event_rx) = event_channel(256);
        let store = MemoryPointStore::with_events(event_tx.clone());
        Self::new(config, items, store, event_tx)
    }
}

impl<S: PointStore> OmniPanel<S> {
    pub fn new(config: PanelConfig, items: ItemConfig, store: S, event_tx: EventSender) -> Self {
        Self {
            config,
            items,
            store,
            registry: Registry::new(),
            scheduler: PollScheduler::new(),
            transport: None,
            event_tx,
            timeouts: 0,
        }
    }

    /// Subscribe to panel events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Replace the item selection. Takes effect at the next connect.
    pub fn set_items(&mut self, items: ItemConfig) {
        self.items = items;
    }

    /// Single connection attempt: open the socket, negotiate the secure
    /// session, log in, then rebuild the registry and restart polling.
    pub async fn connect(&mut self) -> Result<()> {
        self.transport = None;
        info!("Connecting to controller at {}:{}", self.config.host, self.config.port);

        let mut transport = UdpTransport::connect(&self.config.host, self.config.port).await?;
        transport
            .establish_session(&self.config.private_key, self.config.handshake_timeout)
            .await?;
        if !transport
            .login(self.config.login_code, self.config.handshake_timeout)
            .await?
        {
            transport.terminate(self.config.reply_timeout).await;
            return Err(OmniError::LoginRejected);
        }

        self.registry
            .rebuild(&self.items, self.config.enclosures, &mut self.store)?;
        self.scheduler = PollScheduler::new();
        self.timeouts = 0;
        self.transport = Some(transport);

        let _ = self.event_tx.send(PanelEvent::Connected);
        info!("Connected to controller");
        Ok(())
    }

    /// Connect, retrying connection, timeout and login failures with
    /// exponential backoff. The base delay is `reconnect_delay_ms` and the
    /// number of retries is `max_connect_retries`.
    pub async fn connect_with_retry(&mut self) -> Result<()> {
        let max_retries = self.config.max_connect_retries;
        let base_delay_ms = self.config.reconnect_delay_ms;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay_ms = base_delay_ms * (1 << (attempt - 1).min(4));
                warn!(
                    "Connection attempt {} failed, retrying in {:.1}s...",
                    attempt,
                    delay_ms as f64 / 1000.0
                );
                sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if !is_retryable(&e) || attempt == max_retries {
                        return Err(e);
                    }
                    warn!("Connection error (attempt {}): {}", attempt + 1, e);
                }
            }
        }

        Err(OmniError::Disconnected)
    }

    /// Earliest instant at which [`OmniPanel::poll`] has work to do.
    pub fn next_due(&self) -> Instant {
        self.scheduler.next_due()
    }

    /// Run one poll tick and report what it means for the connection. A lost
    /// outcome drops the session; the host reconnects.
    pub async fn poll(&mut self) -> PollOutcome {
        let Some(transport) = self.transport.as_mut() else {
            return PollOutcome::LostConnection;
        };
        let result = self
            .scheduler
            .tick(
                transport,
                &mut self.registry,
                &mut self.store,
                &self.config,
                &self.event_tx,
            )
            .await;

        let (outcome, timeouts) = classify(&result, self.timeouts);
        self.timeouts = timeouts;
        if let Err(e) = &result {
            if outcome.is_lost() {
                warn!("Connection lost ({:?}): {}", outcome, e);
                self.transport = None;
                let _ = self.event_tx.send(PanelEvent::Disconnected);
            } else {
                debug!("Poll timeout {}: {}", self.timeouts, e);
            }
        }
        outcome
    }

    /// Write a host value to a point; see [`dispatch::write_point`].
    pub async fn write_point(&mut self, id: PointId, value: PointValue) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(OmniError::Disconnected)?;
        dispatch::write_point(
            transport,
            &self.registry,
            &mut self.store,
            &self.config,
            id,
            value,
        )
        .await
    }

    pub async fn write_point_by_name(&mut self, name: &str, value: PointValue) -> Result<()> {
        let id = self.store.find(name).ok_or_else(|| OmniError::ItemNotFound {
            name: name.to_string(),
        })?;
        self.write_point(id, value).await
    }

    /// Run a free-form command such as `Arm=Area1,Away,1234`.
    pub async fn invoke_command(&mut self, text: &str) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(OmniError::Disconnected)?;
        dispatch::invoke_command(transport, &self.registry, &self.config, text).await
    }

    /// Log out and terminate the session.
    pub async fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            info!("Disconnecting from controller");
            transport.terminate(self.config.reply_timeout).await;
            let _ = self.event_tx.send(PanelEvent::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout() -> Result<()> {
        Err(OmniError::timeout("zone status 1-44"))
    }

    #[test]
    fn test_fifth_timeout_loses_connection() {
        let mut count = 0;
        for n in 1..=MAX_POLL_TIMEOUTS {
            let (outcome, next) = classify(&timeout(), count);
            assert_eq!(outcome, PollOutcome::TimeoutTolerated(n));
            count = next;
        }
        let (outcome, _) = classify(&timeout(), count);
        assert_eq!(outcome, PollOutcome::LostConnection);
    }

    #[test]
    fn test_success_resets_timeouts() {
        let (_, count) = classify(&timeout(), 3);
        assert_eq!(count, 4);
        assert_eq!(classify(&Ok(()), count), (PollOutcome::Ok, 0));
        assert_eq!(
            classify(&timeout(), 0),
            (PollOutcome::TimeoutTolerated(1), 1)
        );
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(
            classify(&Err(OmniError::Disconnected), 2).0,
            PollOutcome::LostConnection
        );
        assert_eq!(
            classify(&Err(OmniError::CrcMismatch { computed: 1, received: 2 }), 0).0,
            PollOutcome::LostCommResource
        );
        assert_eq!(
            classify(&Err(OmniError::malformed("short")), 0).0,
            PollOutcome::LostCommResource
        );
    }

    #[test]
    fn test_connect_retry_classes() {
        assert!(is_retryable(&OmniError::LoginRejected));
        assert!(is_retryable(&OmniError::timeout("login")));
        assert!(is_retryable(&OmniError::HandshakeFailed { stage: "secure session".into() }));
        assert!(!is_retryable(&OmniError::config("items")));
        assert!(!is_retryable(&OmniError::InvalidCode { area: 1 }));
    }

    #[tokio::test]
    async fn test_disconnected_panel() {
        let config = PanelConfig::builder()
            .host("127.0.0.1")
            .private_key([0; 16])
            .login_code("1234")
            .build()
            .unwrap();
        let mut panel = OmniPanel::with_memory_store(config, ItemConfig::default());
        assert!(!panel.is_connected());
        assert_eq!(panel.poll().await, PollOutcome::LostConnection);
        assert!(matches!(
            panel.write_point(PointId(0), PointValue::Bool(true)).await,
            Err(OmniError::Disconnected)
        ));
        assert!(matches!(
            panel.invoke_command("Button=1").await,
            Err(OmniError::Disconnected)
        ));
    }
}
