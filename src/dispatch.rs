// MIT License - Copyright (c) 2026 Peter Wright
// Point writes and free-form commands

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::config::PanelConfig;
use crate::constants::*;
use crate::devices::{ThermostatField, UnitKind};
use crate::error::{OmniError, Result};
use crate::points::{PointId, PointStore, PointValue};
use crate::protocol::{Request, parse_code, parse_code_validation};
use crate::registry::{Category, Owner, Registry};
use crate::transport::Transport;

/// Verbs accepted by the free-form command point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    AllOn,
    AllOff,
    Arm,
    Bypass,
    Restore,
    RestoreAll,
    ShowMsg,
    SayMsg,
    ClearMsg,
    PhoneMsg,
    Button,
    UnitOn,
    UnitOff,
    UnitPercent,
    UnitDim,
    UnitBright,
    UpbLinkOn,
    UpbLinkOff,
    UpbLinkSet,
    UpbLedOn,
    UpbLedOff,
}

impl Verb {
    const ALL: [Verb; 21] = [
        Verb::AllOn,
        Verb::AllOff,
        Verb::Arm,
        Verb::Bypass,
        Verb::Restore,
        Verb::RestoreAll,
        Verb::ShowMsg,
        Verb::SayMsg,
        Verb::ClearMsg,
        Verb::PhoneMsg,
        Verb::Button,
        Verb::UnitOn,
        Verb::UnitOff,
        Verb::UnitPercent,
        Verb::UnitDim,
        Verb::UnitBright,
        Verb::UpbLinkOn,
        Verb::UpbLinkOff,
        Verb::UpbLinkSet,
        Verb::UpbLedOn,
        Verb::UpbLedOff,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::AllOn => "AllOn",
            Self::AllOff => "AllOff",
            Self::Arm => "Arm",
            Self::Bypass => "Bypass",
            Self::Restore => "Restore",
            Self::RestoreAll => "RestoreAll",
            Self::ShowMsg => "ShowMsg",
            Self::SayMsg => "SayMsg",
            Self::ClearMsg => "ClearMsg",
            Self::PhoneMsg => "PhoneMsg",
            Self::Button => "Button",
            Self::UnitOn => "UnitOn",
            Self::UnitOff => "UnitOff",
            Self::UnitPercent => "UnitPercent",
            Self::UnitDim => "UnitDim",
            Self::UnitBright => "UnitBright",
            Self::UpbLinkOn => "UPBLinkOn",
            Self::UpbLinkOff => "UPBLinkOff",
            Self::UpbLinkSet => "UPBLinkSet",
            Self::UpbLedOn => "UPBLEDOn",
            Self::UpbLedOff => "UPBLEDOff",
        }
    }

    /// Exact number of parameters the verb takes.
    pub fn arity(self) -> usize {
        match self {
            Self::AllOn
            | Self::AllOff
            | Self::ShowMsg
            | Self::SayMsg
            | Self::ClearMsg
            | Self::Button
            | Self::UnitOn
            | Self::UnitOff
            | Self::UpbLinkOn
            | Self::UpbLinkOff
            | Self::UpbLinkSet => 1,
            Self::Bypass
            | Self::Restore
            | Self::RestoreAll
            | Self::PhoneMsg
            | Self::UnitPercent
            | Self::UpbLedOn
            | Self::UpbLedOff => 2,
            Self::Arm | Self::UnitDim | Self::UnitBright => 3,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Verb {
    type Err = OmniError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| OmniError::format(format!("unknown command verb {:?}", s.trim())))
    }
}

/// A tokenized command: `Verb=p1,p2,...`, split on both `,` and `=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandText {
    pub verb: Verb,
    pub params: Vec<String>,
}

impl FromStr for CommandText {
    type Err = OmniError;

    fn from_str(text: &str) -> Result<Self> {
        let mut tokens = text.split([',', '=']).map(str::trim);
        let verb: Verb = tokens.next().unwrap_or_default().parse()?;
        let params: Vec<String> = tokens.map(str::to_string).collect();
        if params.len() > 4 || params.len() != verb.arity() {
            return Err(OmniError::format(format!(
                "{verb} takes {} parameter(s), got {}",
                verb.arity(),
                params.len()
            )));
        }
        Ok(Self { verb, params })
    }
}

fn number(text: &str, what: &str, range: std::ops::RangeInclusive<u32>) -> Result<u32> {
    text.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| range.contains(n))
        .ok_or_else(|| {
            OmniError::format(format!(
                "{what} must be a number in {}..={}, got {text:?}",
                range.start(),
                range.end()
            ))
        })
}

/// Parse a number and clamp it into `0..=max`.
fn clamped(text: &str, what: &str, max: u32) -> Result<u32> {
    let n: i64 = text
        .trim()
        .parse()
        .map_err(|_| OmniError::format(format!("{what} must be a number, got {text:?}")))?;
    Ok(n.clamp(0, max as i64) as u32)
}

/// Validate a security code in `area` and return the user number it belongs
/// to. An invalid code fails before anything else is sent.
async fn validate_code<T: Transport>(
    transport: &mut T,
    config: &PanelConfig,
    area: u8,
    code: &str,
) -> Result<u8> {
    let code = parse_code(code)?;
    let reply = transport
        .request(&Request::ValidateCode { area, code }, config.command_timeout)
        .await?;
    let validation = parse_code_validation(&reply)?;
    if !validation.is_valid() {
        warn!("Security code rejected in area {}", area);
        return Err(OmniError::InvalidCode { area });
    }
    debug!("Code belongs to user {} in area {}", validation.user, area);
    Ok(validation.user)
}

/// Area to validate a code in: the named area, or area 1 for `$All$`.
fn validation_area(area: u8) -> u8 {
    if area == 0 { 1 } else { area }
}

/// Run one free-form command.
pub async fn invoke_command<T: Transport>(
    transport: &mut T,
    registry: &Registry,
    config: &PanelConfig,
    text: &str,
) -> Result<()> {
    let CommandText { verb, params } = text.parse()?;
    let p = |i: usize| params[i].as_str();
    let unit = |i: usize| registry.resolve_name(Category::Unit, p(i));

    let request = match verb {
        Verb::AllOn | Verb::AllOff => {
            let cmd = if verb == Verb::AllOn { CMD_ALL_ON } else { CMD_ALL_OFF };
            Request::command(cmd, 0, registry.resolve_area(p(0))? as u16)
        }
        Verb::Arm => {
            let area = registry.resolve_area(p(0))?;
            let mode = index_of(&ARM_MODES[..=6], p(1))
                .ok_or_else(|| OmniError::format(format!("unknown security mode {:?}", p(1))))?;
            let user = validate_code(transport, config, validation_area(area), p(2)).await?;
            Request::command(CMD_SECURITY_BASE + mode as u8, user, area as u16)
        }
        Verb::Bypass | Verb::Restore => {
            let zone = registry.resolve_name(Category::Zone, p(0))?;
            let user = validate_code(transport, config, 1, p(1)).await?;
            let cmd = if verb == Verb::Bypass { CMD_BYPASS_ZONE } else { CMD_RESTORE_ZONE };
            Request::command(cmd, user, zone)
        }
        Verb::RestoreAll => {
            let area = registry.resolve_area(p(0))?;
            let user = validate_code(transport, config, validation_area(area), p(1)).await?;
            Request::command(CMD_RESTORE_ALL_ZONES, user, area as u16)
        }
        Verb::ShowMsg | Verb::SayMsg | Verb::ClearMsg => {
            let cmd = match verb {
                Verb::ShowMsg => CMD_SHOW_MESSAGE,
                Verb::SayMsg => CMD_SAY_MESSAGE,
                _ => CMD_CLEAR_MESSAGE,
            };
            Request::command(cmd, 0, number(p(0), "message", 1..=MAX_MESSAGES)? as u16)
        }
        Verb::PhoneMsg => {
            let message = number(p(0), "message", 1..=MAX_MESSAGES)?;
            let phone = number(p(1), "phone number", 1..=255)?;
            Request::command(CMD_PHONE_MESSAGE, phone as u8, message as u16)
        }
        Verb::Button => Request::command(
            CMD_EXECUTE_BUTTON,
            0,
            number(p(0), "button", 1..=MAX_BUTTONS)? as u16,
        ),
        Verb::UnitOn => Request::command(CMD_UNIT_ON, 0, unit(0)?),
        Verb::UnitOff => Request::command(CMD_UNIT_OFF, 0, unit(0)?),
        Verb::UnitPercent => {
            let level = clamped(p(1), "percent", 100)?;
            Request::command(CMD_UNIT_LEVEL, level as u8, unit(0)?)
        }
        Verb::UnitDim | Verb::UnitBright => {
            let steps = clamped(p(1), "steps", 9)? as u8;
            let seconds = clamped(p(2), "seconds", 99)? as u8;
            let base = if verb == Verb::UnitDim {
                CMD_UNIT_DIM_BASE
            } else {
                CMD_UNIT_BRIGHT_BASE
            };
            Request::command(base + steps, seconds, unit(0)?)
        }
        Verb::UpbLinkOn | Verb::UpbLinkOff | Verb::UpbLinkSet => {
            let cmd = match verb {
                Verb::UpbLinkOn => CMD_UPB_LINK_ON,
                Verb::UpbLinkOff => CMD_UPB_LINK_OFF,
                _ => CMD_UPB_LINK_SET,
            };
            Request::command(cmd, 0, number(p(0), "link", 1..=MAX_UPB_LINKS)? as u16)
        }
        Verb::UpbLedOn | Verb::UpbLedOff => {
            let cmd = if verb == Verb::UpbLedOn { CMD_UPB_LED_ON } else { CMD_UPB_LED_OFF };
            let led = number(p(1), "LED", 1..=8)?;
            Request::command(cmd, led as u8, unit(0)?)
        }
    };

    info!("Invoking {} ({})", verb, request.describe());
    transport
        .request_ack(&request, config.command_timeout)
        .await
}

/// Translate a host write of `value` to point `id` into one controller
/// command and wait for its acknowledgement. The stored value is updated
/// only once the controller has accepted the command.
pub async fn write_point<T: Transport, S: PointStore>(
    transport: &mut T,
    registry: &Registry,
    store: &mut S,
    config: &PanelConfig,
    id: PointId,
    value: PointValue,
) -> Result<()> {
    let owner = registry
        .owner_of(id)
        .ok_or(OmniError::FieldNotFound { id })?;
    let def = store
        .definition(id)
        .ok_or(OmniError::FieldNotFound { id })?;
    if !def.access.writable() {
        return Err(OmniError::format(format!("{} is read-only", def.name)));
    }
    let name = def.name.clone();
    let value = value.clone().coerce(def.kind).ok_or_else(|| {
        OmniError::format(format!("{name} expects a {:?} value, got {value:?}", def.kind))
    })?;

    let (request, stored) = match (owner, &value) {
        (Owner::Invoke, PointValue::String(text)) => {
            return invoke_command(transport, registry, config, text).await;
        }
        (Owner::Unit(unit), _) => match (unit.kind, &value) {
            (UnitKind::Binary, PointValue::Bool(on)) => {
                let cmd = if *on { CMD_UNIT_ON } else { CMD_UNIT_OFF };
                (Request::command(cmd, 0, unit.number), value.clone())
            }
            (UnitKind::Dimmer, PointValue::Card(level)) => {
                let level = (*level).min(100);
                (
                    Request::command(CMD_UNIT_LEVEL, level as u8, unit.number),
                    PointValue::Card(level),
                )
            }
            (UnitKind::Flag, PointValue::Card(count)) => {
                let count = (*count).min(255);
                (
                    Request::command(CMD_SET_COUNTER, count as u8, unit.number),
                    PointValue::Card(count),
                )
            }
            _ => return Err(OmniError::format(format!("cannot write {value} to {name}"))),
        },
        (Owner::Thermostat(thermo), _) => {
            let field = thermo
                .field_of(id)
                .ok_or(OmniError::FieldNotFound { id })?;
            let number = thermo.number;
            match (field, &value) {
                (ThermostatField::HeatSetpoint | ThermostatField::CoolSetpoint, PointValue::Int(deg)) => {
                    let raw = config.temp_scale.to_raw(*deg);
                    let cmd = if field == ThermostatField::HeatSetpoint {
                        CMD_SET_HEAT_SETPOINT
                    } else {
                        CMD_SET_COOL_SETPOINT
                    };
                    (
                        Request::command(cmd, raw, number),
                        PointValue::Int(config.temp_scale.from_raw(raw)),
                    )
                }
                (ThermostatField::Mode | ThermostatField::FanMode, PointValue::String(s)) => {
                    let (table, cmd): (&[&str], u8) = if field == ThermostatField::Mode {
                        (&THERMO_MODES, CMD_SET_THERMO_MODE)
                    } else {
                        (&FAN_MODES, CMD_SET_THERMO_FAN)
                    };
                    let index = index_of(table, s).ok_or_else(|| {
                        OmniError::format(format!("{name} does not accept {s:?}"))
                    })?;
                    (
                        Request::command(cmd, index as u8, number),
                        PointValue::String(table[index].to_string()),
                    )
                }
                (ThermostatField::Hold, PointValue::Bool(hold)) => (
                    Request::command(CMD_SET_THERMO_HOLD, if *hold { 255 } else { 0 }, number),
                    value.clone(),
                ),
                _ => return Err(OmniError::format(format!("cannot write {value} to {name}"))),
            }
        }
        _ => return Err(OmniError::format(format!("{name} is not writable"))),
    };

    debug!("Writing {} = {} ({})", name, stored, request.describe());
    transport
        .request_ack(&request, config.command_timeout)
        .await?;
    store.store(id, stored);
    Ok(())
}
