//! Executes decoded actions against the input driver.
//!
//! Every call yields exactly one [`ActionRecord`]; failures become
//! `Error:`-prefixed records rather than propagating. The one exception is
//! the fail-safe corner, which the `try_` variants hand back to the caller.

use crate::action::{
    decode_response, AgentAction, ClickKind, Decision, DecodeError, ScrollDirection, Target,
};
use crate::errors::{PilotError, Result};
use crate::input::{parse_key_combo, InputDriver};
use crate::screenshot::ScreenCapturer;
use crate::types::{ActionRecord, ScreenElement};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Timings and magnitudes for simulated actions.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Easing duration for `mouse_move` and `hover`
    pub move_duration: Duration,
    /// How long `wait` blocks
    pub wait_duration: Duration,
    /// Wheel notches per `scroll_up` / `scroll_down`
    pub scroll_amount: i32,
    /// File overwritten by the `screenshot` action
    pub screenshot_path: PathBuf,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            move_duration: Duration::from_millis(500),
            wait_duration: Duration::from_secs(2),
            scroll_amount: 20,
            screenshot_path: PathBuf::from("screenshot.png"),
        }
    }
}

/// Pixel center of the element labelled `"icon <box_id>"`, scaled to the current display.
pub fn element_center(
    box_id: &str,
    elements: &[ScreenElement],
    driver: &dyn InputDriver,
) -> Result<Option<(i32, i32)>> {
    info!("Searching for Box ID: {}", box_id);
    let wanted = format!("icon {box_id}");
    match elements.iter().find(|e| e.id == wanted) {
        Some(element) => {
            let (width, height) = driver.display_size()?;
            Ok(Some(element.center_in(width, height)))
        }
        None => Ok(None),
    }
}

/// Decode a raw model reply and execute it.
pub fn execute_response(
    response: &str,
    elements: &[ScreenElement],
    driver: &mut dyn InputDriver,
    capturer: &mut dyn ScreenCapturer,
    config: &DispatchConfig,
) -> ActionRecord {
    match decode_response(response) {
        Ok(decision) => execute_decision(&decision, elements, driver, capturer, config),
        Err(e) => invalid_json(e),
    }
}

/// Like [`execute_response`], but a fail-safe abort is returned as an error
/// instead of being folded into the record.
pub fn try_execute_response(
    response: &str,
    elements: &[ScreenElement],
    driver: &mut dyn InputDriver,
    capturer: &mut dyn ScreenCapturer,
    config: &DispatchConfig,
) -> Result<ActionRecord> {
    match decode_response(response) {
        Ok(decision) => try_execute_decision(&decision, elements, driver, capturer, config),
        Err(e) => Ok(invalid_json(e)),
    }
}

fn invalid_json(e: DecodeError) -> ActionRecord {
    warn!("{}", e);
    ActionRecord {
        action: "None".to_string(),
        result: "Error: Invalid JSON".to_string(),
        message: "Failed to parse VLM response.".to_string(),
        previous_actions: Vec::new(),
    }
}

/// Execute one decoded action.
pub fn execute_decision(
    decision: &Decision,
    elements: &[ScreenElement],
    driver: &mut dyn InputDriver,
    capturer: &mut dyn ScreenCapturer,
    config: &DispatchConfig,
) -> ActionRecord {
    try_execute_decision(decision, elements, driver, capturer, config)
        .unwrap_or_else(|e| ActionRecord::error(decision.action.name(), e.to_string()))
}

/// Execute one decoded action. Only [`PilotError::FailSafe`] is returned as `Err`.
pub fn try_execute_decision(
    decision: &Decision,
    elements: &[ScreenElement],
    driver: &mut dyn InputDriver,
    capturer: &mut dyn ScreenCapturer,
    config: &DispatchConfig,
) -> Result<ActionRecord> {
    let action = &decision.action;
    info!("Executing action: {}", action);

    let record = match perform(action, elements, driver, capturer, config) {
        Ok(record) => record,
        Err(e @ PilotError::FailSafe { .. }) => {
            error!("{}", e);
            return Err(e);
        }
        Err(e) => ActionRecord::error(action.name(), e.to_string()),
    };

    if record.is_error() {
        warn!("{}", record.result);
    } else {
        info!("{}", record.message);
    }
    Ok(record)
}

/// A pointer target resolved to pixels, or the reason it could not be.
enum Resolved {
    Element(String, i32, i32),
    Point(i32, i32),
    Current,
    Missing(String),
}

fn resolve(target: &Target, elements: &[ScreenElement], driver: &dyn InputDriver) -> Result<Resolved> {
    Ok(match target {
        Target::BoxId(id) => match element_center(id, elements, driver)? {
            Some((x, y)) => Resolved::Element(id.clone(), x, y),
            None => Resolved::Missing(id.clone()),
        },
        Target::Coordinate(x, y) => Resolved::Point(*x, *y),
        Target::Current => Resolved::Current,
    })
}

fn not_found(action: &AgentAction, id: &str) -> ActionRecord {
    ActionRecord::error(
        action.name(),
        format!("Could not find element with Box ID '{id}'."),
    )
}

fn perform(
    action: &AgentAction,
    elements: &[ScreenElement],
    driver: &mut dyn InputDriver,
    capturer: &mut dyn ScreenCapturer,
    config: &DispatchConfig,
) -> Result<ActionRecord> {
    let name = action.name();

    let record = match action {
        AgentAction::MouseMove { target } => match resolve(target, elements, &*driver)? {
            Resolved::Element(id, x, y) => {
                driver.move_to(x, y, config.move_duration)?;
                ActionRecord::success(
                    name,
                    format!("Moved mouse to element with Box ID {id} at coordinates ({x}, {y})."),
                )
            }
            Resolved::Point(x, y) => {
                driver.move_to(x, y, config.move_duration)?;
                ActionRecord::success(name, format!("Moved mouse to coordinates ({x}, {y})."))
            }
            Resolved::Current => ActionRecord::error(name, "No coordinates or Box ID provided."),
            Resolved::Missing(id) => not_found(action, &id),
        },

        AgentAction::Hover { target } => match resolve(target, elements, &*driver)? {
            Resolved::Element(id, x, y) => {
                driver.move_to(x, y, config.move_duration)?;
                ActionRecord::success(
                    name,
                    format!("Hovered over element with Box ID {id} at ({x}, {y})."),
                )
            }
            Resolved::Point(x, y) => {
                driver.move_to(x, y, config.move_duration)?;
                ActionRecord::success(name, format!("Hovered at coordinates ({x}, {y})."))
            }
            // hover has no current-position fallback
            Resolved::Current => ActionRecord::error(name, "No coordinates or Box ID provided."),
            Resolved::Missing(id) => not_found(action, &id),
        },

        AgentAction::Click { kind, target } => {
            click(*kind, resolve(target, elements, &*driver)?, action, driver)?
        }

        AgentAction::Type { text: Some(text) } => {
            driver.type_text(text)?;
            ActionRecord::success(name, format!("Typed the text: '{text}'."))
        }
        AgentAction::Type { text: None } => ActionRecord::error(name, "No text to type."),

        AgentAction::Key { key: Some(key) } => match parse_key_combo(key) {
            Ok(keys) => {
                driver.press_keys(&keys)?;
                ActionRecord::success(name, format!("Pressed the key: '{key}'."))
            }
            Err(e) => ActionRecord::error(name, e),
        },
        AgentAction::Key { key: None } => ActionRecord::error(name, "No key specified."),

        AgentAction::Screenshot => {
            capturer.capture(&config.screenshot_path)?;
            ActionRecord::success(name, "Took a screenshot.")
        }

        AgentAction::Scroll { direction } => {
            let (clicks, message) = match direction {
                ScrollDirection::Up => (config.scroll_amount, "Scrolled up."),
                ScrollDirection::Down => (-config.scroll_amount, "Scrolled down."),
            };
            driver.scroll(clicks)?;
            ActionRecord::success(name, message)
        }

        AgentAction::Wait => {
            thread::sleep(config.wait_duration);
            ActionRecord::success(
                name,
                format!(
                    "Waited for {} seconds.",
                    config.wait_duration.as_secs_f64()
                ),
            )
        }

        AgentAction::Done => {
            info!("Task completed.");
            ActionRecord::completed()
        }

        AgentAction::Unknown { .. } => {
            ActionRecord::error(name.clone(), format!("Unknown action '{name}'."))
        }
    };

    Ok(record)
}

fn click(
    kind: ClickKind,
    resolved: Resolved,
    action: &AgentAction,
    driver: &mut dyn InputDriver,
) -> Result<ActionRecord> {
    let name = kind.action_name();
    let verb = kind.past_tense();

    Ok(match resolved {
        Resolved::Element(id, x, y) => {
            driver.move_to(x, y, Duration::ZERO)?;
            driver.click(kind)?;
            ActionRecord::success(
                name,
                format!("{verb} on element with Box ID {id} at ({x}, {y})."),
            )
        }
        Resolved::Point(x, y) => {
            driver.move_to(x, y, Duration::ZERO)?;
            driver.click(kind)?;
            ActionRecord::success(name, format!("{verb} at coordinates ({x}, {y})."))
        }
        Resolved::Current => {
            driver.click(kind)?;
            ActionRecord::success(name, format!("{verb} at the current mouse position."))
        }
        Resolved::Missing(id) => not_found(action, &id),
    })
}
