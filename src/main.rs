// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Mutex;
use tokio::time::{Duration, interval};
use tracing::{debug, error, info, warn};

use omni_lan_bridge::panel::is_retryable;
use omni_lan_bridge::{
    ItemConfig, OmniPanel, PanelConfig, PanelEvent, PointId, PointValue, TempScale,
};

type Panel = OmniPanel;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "omni2mqtt")]
#[command(about = "Bridge between an Omni controller and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
    mqtt: MqttToml,
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    host: String,
    #[serde(default = "default_panel_port")]
    port: u16,
    /// 32 hex digits
    private_key: String,
    login_code: String,
    #[serde(default)]
    temp_scale: TempScale,
    #[serde(default)]
    enclosures: usize,
    /// Item selection file (`Areas=1,2` / `Zones=3:Alarm` ... lines)
    #[serde(default = "default_items_file")]
    items_file: String,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    #[serde(default = "default_max_connect_retries")]
    max_connect_retries: u32,
    #[serde(default = "default_reply_timeout")]
    reply_timeout_ms: u64,
    #[serde(default = "default_command_timeout")]
    command_timeout_ms: u64,
}

fn default_panel_port() -> u16 {
    4369
}
fn default_items_file() -> String {
    "items.conf".to_string()
}
fn default_reconnect_delay() -> u64 {
    10000
}
fn default_max_connect_retries() -> u32 {
    3
}
fn default_reply_timeout() -> u64 {
    3000
}
fn default_command_timeout() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_subscribe_topic")]
    subscribe_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
    #[serde(default = "default_snapshot_interval")]
    snapshot_interval_secs: u64,
}

fn default_client_id() -> String {
    "omni-bridge".to_string()
}
fn default_subscribe_topic() -> String {
    "omni/cmd".to_string()
}
fn default_publish_topic() -> String {
    "omni".to_string()
}
fn default_snapshot_interval() -> u64 {
    60
}

fn build_panel_config(toml: &PanelToml) -> Result<PanelConfig> {
    PanelConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .private_key_hex(&toml.private_key)
        .login_code(&toml.login_code)
        .temp_scale(toml.temp_scale)
        .enclosures(toml.enclosures)
        .reconnect_delay_ms(toml.reconnect_delay_ms)
        .max_connect_retries(toml.max_connect_retries)
        .reply_timeout(Duration::from_millis(toml.reply_timeout_ms))
        .command_timeout(Duration::from_millis(toml.command_timeout_ms))
        .build()
        .context("Invalid panel configuration")
}

/// Everything a (re)start needs, read from disk in one go.
struct Loaded {
    panel: PanelConfig,
    items: ItemConfig,
    mqtt: MqttToml,
    mqtt_host: String,
    mqtt_port: u16,
}

fn load_config(path: &str) -> Result<Loaded> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    let config: Config = toml::from_str(&text).context("Failed to parse config file")?;
    let panel = build_panel_config(&config.panel)?;
    let items = ItemConfig::load(&config.panel.items_file)
        .with_context(|| format!("Failed to load items from {}", config.panel.items_file))?;
    if items.is_empty() {
        warn!("No items enabled in {}", config.panel.items_file);
    }
    let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
    Ok(Loaded {
        panel,
        items,
        mqtt: config.mqtt,
        mqtt_host,
        mqtt_port,
    })
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages share a flat {now, op, ...} structure

#[derive(Serialize)]
struct MqttSnapshot {
    now: u64,
    op: String,
    connected: bool,
    points: BTreeMap<String, PointValue>,
}

#[derive(Serialize)]
struct MqttPointEvent {
    now: u64,
    op: String,
    id: PointId,
    name: String,
    value: PointValue,
}

#[derive(Serialize)]
struct MqttUserAction {
    now: u64,
    op: String,
    category: String,
    payload: String,
}

// CMD_ACK response
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// Simple event with just {now, op}
#[derive(Serialize)]
struct MqttSimpleEvent {
    now: u64,
    op: String,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    #[allow(dead_code)]
    op_id: Option<String>,
    #[serde(default)]
    point: Option<String>,
    #[serde(default)]
    value: Option<PointValue>,
    #[serde(default)]
    command: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    result: std::result::Result<Option<serde_json::Value>, String>,
    src: Option<serde_json::Value>,
) {
    let (success, data, error) = match result {
        Ok(data) => (true, data, None),
        Err(e) => (false, None, Some(e)),
    };
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK".to_string(),
        success,
        src,
        data,
        error,
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_simple_event(client: &AsyncClient, topic: &str, op: &str) {
    let msg = MqttSimpleEvent {
        now: now_epoch_ms(),
        op: op.to_string(),
    };
    publish_json(client, topic, &msg, false).await;
}

fn build_snapshot(panel: &Panel) -> MqttSnapshot {
    MqttSnapshot {
        now: now_epoch_ms(),
        op: "SNAPSHOT".to_string(),
        connected: panel.is_connected(),
        points: panel.store().snapshot().into_iter().collect(),
    }
}

async fn publish_snapshot(client: &AsyncClient, topic: &str, panel: &Panel) {
    let snapshot = build_snapshot(panel);
    publish_json(client, topic, &snapshot, true).await;
}

/// Exponential backoff: `base` doubled per failed attempt, capped at 16x.
fn backoff_delay_ms(base: u64, attempt: u32) -> u64 {
    base * (1u64 << attempt.saturating_sub(1).min(4))
}

/// Initial connect. Rejected logins and lost links are retried forever;
/// only setup errors (bad item file, malformed config) end the bridge.
async fn connect_forever(panel: &mut Panel, reconnect_delay_ms: u64) -> Result<()> {
    let mut attempt: u32 = 0;
    loop {
        match panel.connect_with_retry().await {
            Ok(()) => return Ok(()),
            Err(e) if is_retryable(&e) => {
                attempt += 1;
                let delay_ms = backoff_delay_ms(reconnect_delay_ms, attempt);
                error!(
                    "Panel connection failed ({e}). Retrying in {:.1}s...",
                    delay_ms as f64 / 1000.0
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e).context("Panel connection failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Panel event → MQTT
// ---------------------------------------------------------------------------

async fn handle_panel_event(event: PanelEvent, client: &AsyncClient, topic: &str) {
    match event {
        PanelEvent::PointChanged { id, name, value } => {
            debug!("Point {name} = {value}");
            let msg = MqttPointEvent {
                now: now_epoch_ms(),
                op: "POINT".to_string(),
                id,
                name,
                value,
            };
            publish_json(client, topic, &msg, false).await;
        }
        PanelEvent::UserAction { category, payload } => {
            info!("User action: {category} {payload}");
            let msg = MqttUserAction {
                now: now_epoch_ms(),
                op: "USER_ACTION".to_string(),
                category,
                payload,
            };
            publish_json(client, topic, &msg, false).await;
        }
        PanelEvent::Connected => publish_simple_event(client, topic, "CONNECTED").await,
        PanelEvent::Disconnected => publish_simple_event(client, topic, "DISCONNECTED").await,
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

async fn handle_command(
    payload_str: &str,
    cmd: MqttCommand,
    client: &AsyncClient,
    topic: &str,
    panel: &mut Panel,
) {
    // Parse the raw payload as a JSON value for the CMD_ACK src field
    let src_json = serde_json::from_str::<serde_json::Value>(payload_str).ok();

    let result = match cmd.op.as_str() {
        "SNAPSHOT" => {
            debug!("Command: SNAPSHOT");
            let snapshot = build_snapshot(panel);
            let snapshot_value = serde_json::to_value(&snapshot).ok();
            publish_json(client, topic, &snapshot, true).await;
            Ok(snapshot_value)
        }

        "PING" => {
            info!("Command: PING");
            Ok(None)
        }

        "WRITE" => match (cmd.point, cmd.value) {
            (Some(point), Some(value)) => {
                info!("Command: WRITE {point} = {value}");
                panel
                    .write_point_by_name(&point, value)
                    .await
                    .map(|()| None)
                    .map_err(|e| e.to_string())
            }
            _ => Err("WRITE needs point and value".to_string()),
        },

        "INVOKE" => match cmd.command {
            Some(text) => {
                info!("Command: INVOKE {text}");
                panel
                    .invoke_command(&text)
                    .await
                    .map(|()| None)
                    .map_err(|e| e.to_string())
            }
            None => Err("INVOKE needs command".to_string()),
        },

        other => Err(format!("Unknown command: {other}")),
    };

    if let Err(e) = &result {
        warn!("{} failed: {e}", cmd.op);
    }
    publish_cmd_ack(client, topic, result, src_json).await;
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=omni_lan_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mut loaded = load_config(&cli.config)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let reconnect_delay_ms = loaded.panel.reconnect_delay_ms;
        let publish_topic = loaded.mqtt.publish_topic.clone();
        let subscribe_topic = loaded.mqtt.subscribe_topic.clone();

        // Connect to panel
        let mut panel = OmniPanel::with_memory_store(loaded.panel.clone(), loaded.items.clone());
        let event_rx = panel.subscribe();
        tokio::select! {
            res = connect_forever(&mut panel, reconnect_delay_ms) => res?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT before the panel connected, shutting down...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM before the panel connected, shutting down...");
                break;
            }
        }
        let panel = Arc::new(Mutex::new(panel));
        info!("Panel connected");

        // Set up MQTT
        let mut mqtt_opts =
            MqttOptions::new(&loaded.mqtt.client_id, &loaded.mqtt_host, loaded.mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        // Subscribe to command topic
        client
            .subscribe(&subscribe_topic, QoS::AtLeastOnce)
            .await
            .context("Failed to subscribe to MQTT topic")?;
        info!("MQTT: subscribed to {subscribe_topic}");

        // Task 1: Panel event listener
        let client_events = client.clone();
        let topic_events = publish_topic.clone();
        let event_handle = tokio::spawn(async move {
            let mut rx = event_rx;
            loop {
                match rx.recv().await {
                    Ok(event) => handle_panel_event(event, &client_events, &topic_events).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged, missed {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                }
            }
        });

        // Task 2: Poll loop, reconnecting whenever a tick reports the link lost
        let panel_poll = Arc::clone(&panel);
        let client_poll = client.clone();
        let topic_poll = publish_topic.clone();
        let poll_handle = tokio::spawn(async move {
            loop {
                let due = panel_poll.lock().await.next_due();
                tokio::time::sleep_until(due).await;
                let outcome = panel_poll.lock().await.poll().await;
                if !outcome.is_lost() {
                    continue;
                }

                warn!("Panel link lost ({outcome:?}), will attempt reconnection");
                // Reconnect forever with exponential backoff
                let mut attempt: u32 = 0;
                loop {
                    if attempt > 0 {
                        let delay_ms = backoff_delay_ms(reconnect_delay_ms, attempt);
                        error!(
                            "Reconnection attempt {attempt} failed. Retrying in {:.1}s...",
                            delay_ms as f64 / 1000.0
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    attempt += 1;

                    info!("Attempting panel reconnection (attempt {attempt})...");
                    let mut panel_lock = panel_poll.lock().await;
                    match panel_lock.connect().await {
                        Ok(()) => {
                            info!("Panel reconnected successfully");
                            publish_snapshot(&client_poll, &topic_poll, &panel_lock).await;
                            break;
                        }
                        Err(e) => warn!("Reconnection error: {e}"),
                    }
                }
            }
        });

        // Task 3: MQTT event loop (receives messages, handles commands)
        let panel_cmds = Arc::clone(&panel);
        let client_cmds = client.clone();
        let topic_cmds = publish_topic.clone();
        let sub_topic = subscribe_topic.clone();
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe after a broker reconnect
                        info!("MQTT: connected, subscribing to {sub_topic}");
                        if let Err(e) =
                            client_cmds.subscribe(&sub_topic, QoS::AtLeastOnce).await
                        {
                            error!("Failed to subscribe to {sub_topic}: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic == sub_topic {
                            let payload = String::from_utf8_lossy(&msg.payload);
                            match serde_json::from_str::<MqttCommand>(&payload) {
                                Ok(cmd) => {
                                    if cmd.op == "SNAPSHOT" {
                                        debug!("MQTT command received: {payload}");
                                    } else {
                                        info!("MQTT command received: {payload}");
                                    }
                                    let mut panel_lock = panel_cmds.lock().await;
                                    handle_command(
                                        &payload,
                                        cmd,
                                        &client_cmds,
                                        &topic_cmds,
                                        &mut panel_lock,
                                    )
                                    .await;
                                }
                                Err(e) => {
                                    warn!("Failed to parse MQTT command: {e}");
                                }
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Task 4: Snapshot timer
        let panel_snap = Arc::clone(&panel);
        let client_snap = client.clone();
        let topic_snap = publish_topic.clone();
        let snapshot_interval_secs = loaded.mqtt.snapshot_interval_secs.max(1);
        let snap_handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(snapshot_interval_secs));
            loop {
                ticker.tick().await;
                let panel_lock = panel_snap.lock().await;
                publish_snapshot(&client_snap, &topic_snap, &panel_lock).await;
            }
        });

        // Wait for a signal
        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                true
            }
        };

        // Abort tasks
        poll_handle.abort();
        mqtt_handle.abort();
        snap_handle.abort();

        // Disconnect panel; the event task still publishes the DISCONNECTED event
        panel.lock().await.disconnect().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        event_handle.abort();

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok(new_config) => {
                loaded = new_config;
                info!("Config reloaded successfully");
            }
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }

        info!("Reconnecting...");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
