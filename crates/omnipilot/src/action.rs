//! Typed decoding of the model's next-action reply.
//!
//! The model answers with a JSON object, often wrapped in prose or a code
//! fence. Decoding tries the whole reply first, then every non-nested
//! `{...}` substring, and validates the winner into [`AgentAction`].

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("no valid JSON object found in model response")]
    InvalidJson,
}

/// Which mouse button a click uses, and how many times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Left,
    Right,
    Double,
}

impl ClickKind {
    pub fn action_name(self) -> &'static str {
        match self {
            ClickKind::Left => "left_click",
            ClickKind::Right => "right_click",
            ClickKind::Double => "double_click",
        }
    }

    /// Past-tense verb used in action messages.
    pub fn past_tense(self) -> &'static str {
        match self {
            ClickKind::Left => "Left-clicked",
            ClickKind::Right => "Right-clicked",
            ClickKind::Double => "Double-clicked",
        }
    }
}

/// Where a pointer action should land.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A detected element, looked up as `"icon <id>"`
    BoxId(String),
    /// Absolute pixel coordinates supplied by the model
    Coordinate(i32, i32),
    /// Nothing supplied
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// One action kind per variant, carrying only what that action needs.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    MouseMove { target: Target },
    Hover { target: Target },
    Click { kind: ClickKind, target: Target },
    Type { text: Option<String> },
    Key { key: Option<String> },
    Screenshot,
    Scroll { direction: ScrollDirection },
    Wait,
    /// `"Next Action": "None"`, the model's completion signal
    Done,
    /// Anything else, including a missing `Next Action`
    Unknown { name: Option<String> },
}

impl AgentAction {
    /// The action name as the model spells it.
    pub fn name(&self) -> String {
        match self {
            AgentAction::MouseMove { .. } => "mouse_move".to_string(),
            AgentAction::Hover { .. } => "hover".to_string(),
            AgentAction::Click { kind, .. } => kind.action_name().to_string(),
            AgentAction::Type { .. } => "type".to_string(),
            AgentAction::Key { .. } => "key".to_string(),
            AgentAction::Screenshot => "screenshot".to_string(),
            AgentAction::Scroll {
                direction: ScrollDirection::Up,
            } => "scroll_up".to_string(),
            AgentAction::Scroll {
                direction: ScrollDirection::Down,
            } => "scroll_down".to_string(),
            AgentAction::Wait => "wait".to_string(),
            AgentAction::Done => "None".to_string(),
            AgentAction::Unknown { name } => name.clone().unwrap_or_else(|| "None".to_string()),
        }
    }
}

impl fmt::Display for AgentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentAction::MouseMove { target }
            | AgentAction::Hover { target }
            | AgentAction::Click { target, .. } => write!(f, "{}({target:?})", self.name()),
            AgentAction::Type { text } => write!(f, "type({text:?})"),
            AgentAction::Key { key } => write!(f, "key({key:?})"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// A decoded reply: the model's reasoning plus the validated action.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub reasoning: Option<String>,
    pub action: AgentAction,
}

fn json_object_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("static regex is valid"))
}

/// Find the JSON object in a model reply.
pub fn extract_json_object(response: &str) -> Result<Map<String, Value>, DecodeError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(response.trim()) {
        return Ok(map);
    }
    debug!("Initial JSON parsing failed, scanning for embedded objects");

    json_object_regex()
        .find_iter(response)
        .find_map(|m| match serde_json::from_str::<Value>(m.as_str()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .ok_or(DecodeError::InvalidJson)
}

/// Decode a model reply into a [`Decision`].
pub fn decode_response(response: &str) -> Result<Decision, DecodeError> {
    let object = extract_json_object(response)?;
    let decision = decision_from_object(&object);
    info!(
        "Reasoning: {}",
        decision.reasoning.as_deref().unwrap_or("(none)")
    );
    Ok(decision)
}

fn decision_from_object(object: &Map<String, Value>) -> Decision {
    let reasoning = object
        .get("Reasoning")
        .and_then(Value::as_str)
        .map(str::to_string);

    let target = || target_from_object(object);
    let value = || non_empty_string(object.get("value"));

    let action = match object.get("Next Action") {
        Some(Value::String(name)) => match name.as_str() {
            "mouse_move" => AgentAction::MouseMove { target: target() },
            "hover" => AgentAction::Hover { target: target() },
            "left_click" => AgentAction::Click {
                kind: ClickKind::Left,
                target: target(),
            },
            "right_click" => AgentAction::Click {
                kind: ClickKind::Right,
                target: target(),
            },
            "double_click" => AgentAction::Click {
                kind: ClickKind::Double,
                target: target(),
            },
            "type" => AgentAction::Type { text: value() },
            "key" => AgentAction::Key { key: value() },
            "screenshot" => AgentAction::Screenshot,
            "scroll_up" => AgentAction::Scroll {
                direction: ScrollDirection::Up,
            },
            "scroll_down" => AgentAction::Scroll {
                direction: ScrollDirection::Down,
            },
            "wait" => AgentAction::Wait,
            "None" => AgentAction::Done,
            other => AgentAction::Unknown {
                name: Some(other.to_string()),
            },
        },
        Some(Value::Null) | None => AgentAction::Unknown { name: None },
        Some(other) => AgentAction::Unknown {
            name: Some(other.to_string()),
        },
    };

    Decision { reasoning, action }
}

fn target_from_object(object: &Map<String, Value>) -> Target {
    // Any non-null Box ID is looked up, even one that cannot match
    match object.get("Box ID") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => return Target::BoxId(s.trim().to_string()),
        Some(Value::Bool(b)) => {
            return Target::BoxId(if *b { "True" } else { "False" }.to_string())
        }
        Some(other) => return Target::BoxId(other.to_string()),
    }

    if let Some(Value::Array(coords)) = object.get("coordinate") {
        if let [x, y] = coords.as_slice() {
            if let (Some(x), Some(y)) = (x.as_f64(), y.as_f64()) {
                return Target::Coordinate(x as i32, y as i32);
            }
        }
    }

    Target::Current
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(response: &str) -> AgentAction {
        decode_response(response).unwrap().action
    }

    #[test]
    fn test_direct_json() {
        let decision = decode_response(
            r#"{"Reasoning": "Chrome icon is visible", "Next Action": "left_click", "Box ID": 3}"#,
        )
        .unwrap();
        assert_eq!(decision.reasoning.as_deref(), Some("Chrome icon is visible"));
        assert_eq!(
            decision.action,
            AgentAction::Click {
                kind: ClickKind::Left,
                target: Target::BoxId("3".to_string())
            }
        );
    }

    #[test]
    fn test_prose_wrapped_json() {
        assert_eq!(
            action(r#"Here is my answer: {"Next Action":"None"} Thanks"#),
            AgentAction::Done
        );
    }

    #[test]
    fn test_code_fenced_json() {
        let reply = "```json\n{\n  \"Next Action\": \"type\",\n  \"value\": \"google stock price\"\n}\n```";
        assert_eq!(
            action(reply),
            AgentAction::Type {
                text: Some("google stock price".to_string())
            }
        );
    }

    #[test]
    fn test_first_decodable_object_wins() {
        let reply = r#"{not json} then {"Next Action": "scroll_down"} and {"Next Action": "wait"}"#;
        assert_eq!(
            action(reply),
            AgentAction::Scroll {
                direction: ScrollDirection::Down
            }
        );
    }

    #[test]
    fn test_invalid_json() {
        assert_eq!(
            decode_response("I cannot help with that."),
            Err(DecodeError::InvalidJson)
        );
        assert_eq!(decode_response(""), Err(DecodeError::InvalidJson));
        assert_eq!(decode_response("[1, 2]"), Err(DecodeError::InvalidJson));
    }

    #[test]
    fn test_targets() {
        assert_eq!(
            action(r#"{"Next Action": "mouse_move", "Box ID": "7", "coordinate": [1, 2]}"#),
            AgentAction::MouseMove {
                target: Target::BoxId("7".to_string())
            }
        );
        assert_eq!(
            action(r#"{"Next Action": "hover", "coordinate": [100, 200.7]}"#),
            AgentAction::Hover {
                target: Target::Coordinate(100, 200)
            }
        );
        assert_eq!(
            action(r#"{"Next Action": "right_click", "coordinate": [100]}"#),
            AgentAction::Click {
                kind: ClickKind::Right,
                target: Target::Current
            }
        );
    }

    #[test]
    fn test_any_present_box_id_is_a_lookup() {
        let target = |reply: &str| match action(reply) {
            AgentAction::Click { target, .. } => target,
            other => panic!("expected click, got {other:?}"),
        };
        assert_eq!(
            target(r#"{"Next Action": "left_click", "Box ID": true, "coordinate": [1, 2]}"#),
            Target::BoxId("True".to_string())
        );
        assert_eq!(
            target(r#"{"Next Action": "left_click", "Box ID": ""}"#),
            Target::BoxId(String::new())
        );
        assert_eq!(
            target(r#"{"Next Action": "left_click", "Box ID": [3]}"#),
            Target::BoxId("[3]".to_string())
        );
        assert_eq!(
            target(r#"{"Next Action": "left_click", "Box ID": null, "coordinate": [1, 2]}"#),
            Target::Coordinate(1, 2)
        );
    }

    #[test]
    fn test_missing_values_are_carried() {
        assert_eq!(action(r#"{"Next Action": "type"}"#), AgentAction::Type { text: None });
        assert_eq!(
            action(r#"{"Next Action": "key", "value": ""}"#),
            AgentAction::Key { key: None }
        );
    }

    #[test]
    fn test_unknown_actions() {
        assert_eq!(
            action(r#"{"Next Action": "drag"}"#),
            AgentAction::Unknown {
                name: Some("drag".to_string())
            }
        );
        let missing = action(r#"{"Reasoning": "thinking"}"#);
        assert_eq!(missing, AgentAction::Unknown { name: None });
        assert_eq!(missing.name(), "None");
    }

    #[test]
    fn test_action_names_round_trip() {
        for name in [
            "mouse_move",
            "hover",
            "left_click",
            "right_click",
            "double_click",
            "type",
            "key",
            "screenshot",
            "scroll_up",
            "scroll_down",
            "wait",
            "None",
        ] {
            let reply = format!(r#"{{"Next Action": "{name}"}}"#);
            assert_eq!(action(&reply).name(), name);
        }
    }
}
