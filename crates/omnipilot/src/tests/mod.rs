//! Recording stubs shared by the unit tests.

use crate::action::ClickKind;
use crate::errors::{PilotError, Result};
use crate::input::InputDriver;
use crate::omniparser::DetectionService;
use crate::screenshot::ScreenCapturer;
use crate::types::ScreenElement;
use crate::vlm::{ModelRequest, ModelService};
use enigo::Key;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod agent_tests;

pub fn element(id: &str, bbox: [f64; 4]) -> ScreenElement {
    ScreenElement {
        id: id.to_string(),
        element_type: "icon".to_string(),
        bbox,
        interactivity: true,
        content: "stub".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputCall {
    MoveTo(i32, i32, Duration),
    Click(ClickKind),
    Type(String),
    Keys(Vec<Key>),
    Scroll(i32),
}

/// Records every primitive instead of touching the OS.
#[derive(Debug)]
pub struct RecordingDriver {
    pub width: u32,
    pub height: u32,
    pub cursor: (i32, i32),
    pub calls: Vec<InputCall>,
    /// Make every primitive fail
    pub fail: bool,
    /// Report the pointer as parked in a corner on every primitive
    pub fail_safe: bool,
}

impl RecordingDriver {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cursor: (0, 0),
            calls: Vec::new(),
            fail: false,
            fail_safe: false,
        }
    }

    fn record(&mut self, call: InputCall) -> Result<()> {
        if self.fail_safe {
            let (x, y) = self.cursor;
            return Err(PilotError::FailSafe { x, y });
        }
        if self.fail {
            return Err(PilotError::Input("stub driver failure".to_string()));
        }
        self.calls.push(call);
        Ok(())
    }
}

impl InputDriver for RecordingDriver {
    fn display_size(&self) -> Result<(u32, u32)> {
        Ok((self.width, self.height))
    }

    fn cursor_position(&self) -> Result<(i32, i32)> {
        Ok(self.cursor)
    }

    fn move_to(&mut self, x: i32, y: i32, duration: Duration) -> Result<()> {
        self.record(InputCall::MoveTo(x, y, duration))?;
        self.cursor = (x, y);
        Ok(())
    }

    fn click(&mut self, kind: ClickKind) -> Result<()> {
        self.record(InputCall::Click(kind))
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        self.record(InputCall::Type(text.to_string()))
    }

    fn press_keys(&mut self, keys: &[Key]) -> Result<()> {
        self.record(InputCall::Keys(keys.to_vec()))
    }

    fn scroll(&mut self, clicks: i32) -> Result<()> {
        self.record(InputCall::Scroll(clicks))
    }
}

/// Remembers requested paths without writing anything.
#[derive(Debug, Default)]
pub struct RecordingCapturer {
    pub captures: Vec<PathBuf>,
}

impl ScreenCapturer for RecordingCapturer {
    fn capture(&mut self, path: &Path) -> Result<PathBuf> {
        self.captures.push(path.to_path_buf());
        Ok(path.to_path_buf())
    }
}

/// Writes placeholder bytes so the file can be encoded afterwards.
#[derive(Debug, Default)]
pub struct FileCapturer {
    pub count: usize,
}

impl ScreenCapturer for FileCapturer {
    fn capture(&mut self, path: &Path) -> Result<PathBuf> {
        fs::write(path, b"png")?;
        self.count += 1;
        Ok(path.to_path_buf())
    }
}

pub struct FailingCapturer;

impl ScreenCapturer for FailingCapturer {
    fn capture(&mut self, _path: &Path) -> Result<PathBuf> {
        Err(PilotError::Screenshot("no display".to_string()))
    }
}

/// Returns the same detection text every call, or fails.
pub struct StubDetector {
    pub output: Option<String>,
    pub calls: RefCell<usize>,
}

impl StubDetector {
    pub fn returning(output: &str) -> Self {
        Self {
            output: Some(output.to_string()),
            calls: RefCell::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            output: None,
            calls: RefCell::new(0),
        }
    }
}

impl DetectionService for StubDetector {
    fn detect(&self, _image_path: &Path) -> Result<String> {
        *self.calls.borrow_mut() += 1;
        self.output
            .clone()
            .ok_or_else(|| PilotError::Detection("stub detector failure".to_string()))
    }
}

/// Replays scripted replies in order and keeps every request it saw.
#[derive(Default)]
pub struct ScriptedModel {
    pub replies: RefCell<VecDeque<String>>,
    pub requests: RefCell<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: RefCell::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl ModelService for ScriptedModel {
    fn next_action(&self, request: &ModelRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| PilotError::Model("script exhausted".to_string()))
    }
}
