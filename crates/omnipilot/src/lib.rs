//! Vision-driven desktop agent
//!
//! Captures the screen, asks an OmniParser service what is on it, asks a
//! vision-language model for one action, and simulates that action with the
//! mouse and keyboard. Repeat.

pub mod action;
pub mod agent;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod history;
pub mod input;
pub mod omniparser;
pub mod prompt;
pub mod pyliteral;
pub mod screenshot;
#[cfg(test)]
mod tests;
pub mod types;
pub mod vlm;

pub use action::{decode_response, AgentAction, ClickKind, Decision, DecodeError, Target};
pub use agent::{Agent, AgentSettings, IterationOutcome, RunSummary, Stage, DEFAULT_GOAL};
pub use config::PilotConfig;
pub use dispatch::{
    element_center, execute_decision, execute_response, try_execute_decision,
    try_execute_response, DispatchConfig,
};
pub use errors::{PilotError, Result};
pub use history::ActionHistory;
pub use input::{is_fail_safe_corner, EnigoDriver, InputDriver};
pub use omniparser::{
    parse_omniparser_output, parse_omniparser_report, DetectionService, OmniParserClient,
    OmniParserConfig, ParseReport, ParseWarning,
};
pub use screenshot::{ScreenCapturer, XcapCapturer};
pub use types::{ActionRecord, ScreenElement};
pub use vlm::{ApiKey, ModelRequest, ModelService, VlmClient, VlmConfig};
