use crate::history::ActionHistory;
use crate::types::ScreenElement;
use serde_json::json;

/// Instructions sent ahead of every request.
pub const SYSTEM_PROMPT: &str = r#"You are an agent operating a desktop computer on behalf of a user.
Each turn you receive the user's goal, a screenshot, the list of UI elements detected on that
screenshot and the results of your most recent actions. Choose exactly ONE next action.

Detected elements are listed as "<label>: <details>". Labels look like "icon 12" or "text 4".
Only "icon" elements can be targeted by Box ID: to act on "icon 12", answer with "Box ID": 12.
The bbox of an element is [x1, y1, x2, y2] as fractions of the screen size.

Available actions:
- mouse_move: move the pointer to an element ("Box ID") or to pixel coordinates ("coordinate": [x, y])
- hover: like mouse_move, used to reveal tooltips or menus
- left_click, right_click, double_click: click an element ("Box ID"), pixel coordinates
  ("coordinate"), or the current pointer position when neither is given
- type: type the text in "value" into the focused field
- key: press a key or combination in "value", e.g. "enter", "esc", "ctrl+a", "alt+f4"
- screenshot: take a fresh screenshot
- scroll_up, scroll_down: scroll the window under the pointer
- wait: pause for a moment while something loads
- None: the goal has been achieved, no further action is needed

Reply with a single JSON object and nothing else:
{
  "Reasoning": "what you see and why this action moves toward the goal",
  "Next Action": "<one of the actions above>",
  "Box ID": <number, only for element targets>,
  "value": "<text or key, only for type and key>",
  "coordinate": [x, y]
}

Examples:
{"Reasoning": "The Chrome icon is on the taskbar.", "Next Action": "left_click", "Box ID": 3}
{"Reasoning": "The search box is focused.", "Next Action": "type", "value": "google stock price"}
{"Reasoning": "Submit the search.", "Next Action": "key", "value": "enter"}
{"Reasoning": "The stock price is shown on screen.", "Next Action": "None"}

Check the action history before acting. If the last action failed or changed nothing, try
something different instead of repeating it."#;

/// One line per element: `<id>: <json of the remaining fields>`.
pub fn render_elements(elements: &[ScreenElement]) -> String {
    elements
        .iter()
        .map(|e| {
            let details = json!({
                "type": e.element_type,
                "bbox": e.bbox,
                "interactivity": e.interactivity,
                "content": e.content,
            });
            format!("{}: {}", e.id, details)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Action messages, most recent first; `(none)` before the first action.
pub fn render_history(history: &ActionHistory) -> String {
    if history.is_empty() {
        return "(none)".to_string();
    }
    history.messages_most_recent_first().join("\n")
}

/// Assemble the text part of the model request.
pub fn build_prompt_text(
    system: &str,
    goal: &str,
    elements: &[ScreenElement],
    history: &ActionHistory,
) -> String {
    format!(
        "{system}\n\nUser Query:\n{goal}\n\nParsed Screen Content:\n{}\n\nAction History (Most Recent First):\n{}",
        render_elements(elements),
        render_history(history)
    )
}
