//! Records shared between the parser, the dispatcher and the agent loop.

use serde::{Deserialize, Serialize};

/// Result marker for a successfully executed action.
pub const RESULT_SUCCESS: &str = "Success";
/// Result marker for the completion signal (`"Next Action": "None"`).
pub const RESULT_COMPLETED: &str = "Task completed.";

/// A UI element reported by the detection service for the current screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenElement {
    /// Label from the detection output, e.g. `"icon 3"`
    pub id: String,
    /// Element classification: `"text"`, `"icon"`, ...
    #[serde(rename = "type")]
    pub element_type: String,
    /// Bounding box `[x1, y1, x2, y2]`, normalized to 0..1
    pub bbox: [f64; 4],
    /// Whether the detector considers the element interactive
    pub interactivity: bool,
    /// Caption or OCR text
    pub content: String,
}

impl ScreenElement {
    /// Midpoint of the bounding box in normalized coordinates.
    pub fn center(&self) -> (f64, f64) {
        let [x1, y1, x2, y2] = self.bbox;
        ((x1 + x2) / 2.0, (y1 + y2) / 2.0)
    }

    /// Midpoint scaled to a display of `width` x `height` pixels.
    pub fn center_in(&self, width: u32, height: u32) -> (i32, i32) {
        let (cx, cy) = self.center();
        (
            (cx * width as f64) as i32,
            (cy * height as f64) as i32,
        )
    }
}

/// Summary of one executed action, fed back to the model on the next turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: String,
    pub result: String,
    pub message: String,
    /// Always empty; kept so the record keeps its historical shape.
    #[serde(default)]
    pub previous_actions: Vec<String>,
}

impl ActionRecord {
    pub fn success(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            result: RESULT_SUCCESS.to_string(),
            message: message.into(),
            previous_actions: Vec::new(),
        }
    }

    /// Error outcome where the message repeats the `Error:`-prefixed result.
    pub fn error(action: impl Into<String>, description: impl AsRef<str>) -> Self {
        let result = format!("Error: {}", description.as_ref());
        Self {
            action: action.into(),
            message: result.clone(),
            result,
            previous_actions: Vec::new(),
        }
    }

    pub fn completed() -> Self {
        Self {
            action: "None".to_string(),
            result: RESULT_COMPLETED.to_string(),
            message: "The task was marked as completed.".to_string(),
            previous_actions: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == RESULT_SUCCESS
    }

    pub fn is_error(&self) -> bool {
        self.result.starts_with("Error:")
    }

    pub fn is_completion(&self) -> bool {
        self.result == RESULT_COMPLETED
    }
}
