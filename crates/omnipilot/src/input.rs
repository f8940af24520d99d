//! Simulated mouse and keyboard input.
//!
//! The dispatcher talks to an [`InputDriver`]; [`EnigoDriver`] is the real
//! implementation. Key names follow the pyautogui-style vocabulary models
//! tend to produce (`enter`, `ctrl+a`, `pagedown`, ...).

use crate::action::ClickKind;
use crate::errors::{PilotError, Result};
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Step interval for eased pointer movement.
const TWEEN_STEP: Duration = Duration::from_millis(10);

/// OS-level input primitives used by the dispatcher.
pub trait InputDriver {
    /// Pixel size of the main display.
    fn display_size(&self) -> Result<(u32, u32)>;

    fn cursor_position(&self) -> Result<(i32, i32)>;

    /// Move the pointer to `(x, y)`, easing over `duration`.
    fn move_to(&mut self, x: i32, y: i32, duration: Duration) -> Result<()>;

    /// Click at the current pointer position.
    fn click(&mut self, kind: ClickKind) -> Result<()>;

    fn type_text(&mut self, text: &str) -> Result<()>;

    /// Hold `keys[..n-1]`, click the last key, release in reverse order.
    fn press_keys(&mut self, keys: &[Key]) -> Result<()>;

    /// Scroll vertically by `clicks` wheel notches; positive scrolls up.
    fn scroll(&mut self, clicks: i32) -> Result<()>;
}

/// Translate a key name or `+`-joined combination into enigo keys.
///
/// `"enter"` -> `[Return]`, `"ctrl+shift+t"` -> `[Control, Shift, Unicode('t')]`.
pub fn parse_key_combo(combo: &str) -> std::result::Result<Vec<Key>, String> {
    let parts: Vec<&str> = if combo.trim() == "+" {
        vec!["+"]
    } else {
        combo.split('+').collect()
    };
    let mut keys = Vec::with_capacity(parts.len());

    for (i, part) in parts.iter().enumerate() {
        let is_last = i == parts.len() - 1;
        let name = part.trim();
        let lower = name.to_lowercase();

        let key = match lower.as_str() {
            // Modifiers
            "control" | "ctrl" | "ctrlleft" | "ctrlright" => Key::Control,
            "alt" | "altleft" | "altright" | "option" => Key::Alt,
            "shift" | "shiftleft" | "shiftright" => Key::Shift,
            "meta" | "cmd" | "command" | "win" | "winleft" | "winright" | "windows"
            | "super" => Key::Meta,

            // Common special keys
            "enter" | "return" => Key::Return,
            "tab" => Key::Tab,
            "escape" | "esc" => Key::Escape,
            "backspace" | "back" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "space" | "spacebar" => Key::Space,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "pgup" => Key::PageUp,
            "pagedown" | "pgdown" | "pgdn" => Key::PageDown,
            "capslock" => Key::CapsLock,

            // Arrow keys
            "up" | "arrowup" => Key::UpArrow,
            "down" | "arrowdown" => Key::DownArrow,
            "left" | "arrowleft" => Key::LeftArrow,
            "right" | "arrowright" => Key::RightArrow,

            "f1" => Key::F1,
            "f2" => Key::F2,
            "f3" => Key::F3,
            "f4" => Key::F4,
            "f5" => Key::F5,
            "f6" => Key::F6,
            "f7" => Key::F7,
            "f8" => Key::F8,
            "f9" => Key::F9,
            "f10" => Key::F10,
            "f11" => Key::F11,
            "f12" => Key::F12,

            // Single character, only valid as the last part of a combination
            unknown => match (is_last, single_char(name)) {
                // Keep the original case: "A" types a capital
                (true, Some(c)) => Key::Unicode(c),
                _ => {
                    return Err(format!(
                        "Unknown key '{}' in '{}'. Valid: enter, tab, esc, backspace, delete, \
                         space, up/down/left/right, home, end, pageup, pagedown, f1-f12, or \
                         modifiers (ctrl, alt, shift, win) with a single character.",
                        unknown, combo
                    ));
                }
            },
        };
        keys.push(key);
    }

    Ok(keys)
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// Points visited when easing from `from` to `to` in `steps` linear steps.
pub fn tween_points(from: (i32, i32), to: (i32, i32), steps: u32) -> Vec<(i32, i32)> {
    let steps = steps.max(1);
    (1..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            (
                from.0 + ((to.0 - from.0) as f64 * t).round() as i32,
                from.1 + ((to.1 - from.1) as f64 * t).round() as i32,
            )
        })
        .collect()
}

/// Whether `pos` is one of the four corner pixels of a `width` x `height` display.
pub fn is_fail_safe_corner(pos: (i32, i32), width: u32, height: u32) -> bool {
    let right = width as i32 - 1;
    let bottom = height as i32 - 1;
    (pos.0 <= 0 || pos.0 >= right) && (pos.1 <= 0 || pos.1 >= bottom)
}

/// Real input via enigo. Pauses after each primitive so the UI can react.
///
/// With the fail-safe enabled (the default), every primitive first checks the
/// pointer: parked in a screen corner, it refuses with [`PilotError::FailSafe`].
pub struct EnigoDriver {
    enigo: Enigo,
    pause: Duration,
    fail_safe: bool,
}

impl EnigoDriver {
    pub fn new(pause: Duration) -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())?;
        Ok(Self {
            enigo,
            pause,
            fail_safe: true,
        })
    }

    pub fn with_fail_safe(mut self, enabled: bool) -> Self {
        self.fail_safe = enabled;
        self
    }

    fn check_fail_safe(&self) -> Result<()> {
        if !self.fail_safe {
            return Ok(());
        }
        let (x, y) = self.cursor_position()?;
        let (width, height) = self.display_size()?;
        if is_fail_safe_corner((x, y), width, height) {
            return Err(PilotError::FailSafe { x, y });
        }
        Ok(())
    }

    fn settle(&self) {
        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
    }
}

impl InputDriver for EnigoDriver {
    fn display_size(&self) -> Result<(u32, u32)> {
        let (w, h) = self.enigo.main_display()?;
        if w <= 0 || h <= 0 {
            return Err(PilotError::Input(format!("invalid display size {w}x{h}")));
        }
        Ok((w as u32, h as u32))
    }

    fn cursor_position(&self) -> Result<(i32, i32)> {
        Ok(self.enigo.location()?)
    }

    fn move_to(&mut self, x: i32, y: i32, duration: Duration) -> Result<()> {
        self.check_fail_safe()?;
        let steps = (duration.as_millis() / TWEEN_STEP.as_millis()) as u32;
        if steps <= 1 {
            self.enigo.move_mouse(x, y, Coordinate::Abs)?;
        } else {
            let from = self.enigo.location()?;
            for (px, py) in tween_points(from, (x, y), steps) {
                self.enigo.move_mouse(px, py, Coordinate::Abs)?;
                thread::sleep(TWEEN_STEP);
            }
        }
        debug!("pointer moved to ({}, {})", x, y);
        self.settle();
        Ok(())
    }

    fn click(&mut self, kind: ClickKind) -> Result<()> {
        self.check_fail_safe()?;
        let (button, count) = match kind {
            ClickKind::Left => (Button::Left, 1),
            ClickKind::Right => (Button::Right, 1),
            ClickKind::Double => (Button::Left, 2),
        };
        for _ in 0..count {
            self.enigo.button(button, Direction::Click)?;
        }
        self.settle();
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        self.check_fail_safe()?;
        self.enigo.text(text)?;
        debug!("typed {} chars", text.chars().count());
        self.settle();
        Ok(())
    }

    fn press_keys(&mut self, keys: &[Key]) -> Result<()> {
        self.check_fail_safe()?;
        let Some((last, modifiers)) = keys.split_last() else {
            return Ok(());
        };
        for key in modifiers {
            self.enigo.key(*key, Direction::Press)?;
        }
        let clicked = self.enigo.key(*last, Direction::Click);
        // Release modifiers even when the final key failed
        for key in modifiers.iter().rev() {
            self.enigo.key(*key, Direction::Release)?;
        }
        clicked?;
        self.settle();
        Ok(())
    }

    fn scroll(&mut self, clicks: i32) -> Result<()> {
        self.check_fail_safe()?;
        // enigo scrolls down for positive lengths
        self.enigo.scroll(-clicks, Axis::Vertical)?;
        self.settle();
        Ok(())
    }
}
