//! The perceive → decide → act loop.
//!
//! Each iteration captures the screen, asks the detection service what is on
//! it, asks the model for one action, executes it and remembers the outcome.
//! A failing collaborator abandons the iteration and the loop carries on. The
//! one exception is the input fail-safe: a pointer parked in a screen corner
//! aborts the run.

use crate::config::PilotConfig;
use crate::dispatch::{try_execute_response, DispatchConfig};
use crate::errors::PilotError;
use crate::history::{ActionHistory, DEFAULT_HISTORY_CAPACITY};
use crate::input::InputDriver;
use crate::omniparser::{parse_omniparser_output, DetectionService};
use crate::prompt::{build_prompt_text, SYSTEM_PROMPT};
use crate::screenshot::{encode_file_base64, ScreenCapturer};
use crate::types::ActionRecord;
use crate::vlm::{ModelRequest, ModelService};
use std::fmt;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Goal used when none is given.
pub const DEFAULT_GOAL: &str = "Open Chrome and search google stock price";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Sleep before the first iteration so the user can switch windows
    pub startup_delay: Duration,
    /// Pause after every simulated input primitive
    pub action_pause: Duration,
    /// Stop once the model answers `"Next Action": "None"`
    pub stop_on_completion: bool,
    /// Upper bound on iterations; `None` loops until the process is killed
    pub max_steps: Option<u32>,
    pub history_capacity: usize,
    pub dispatch: DispatchConfig,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(2),
            action_pause: Duration::from_millis(500),
            stop_on_completion: true,
            max_steps: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            dispatch: DispatchConfig::default(),
        }
    }
}

/// The step at which an iteration was given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Screenshot,
    Detection,
    Encoding,
    Model,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Screenshot => "screenshot",
            Stage::Detection => "detection",
            Stage::Encoding => "encoding",
            Stage::Model => "model",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum IterationOutcome {
    /// An action was decoded and dispatched; the record is now in the history
    Acted(ActionRecord),
    /// A collaborator failed before dispatch; nothing was recorded
    Abandoned { stage: Stage, error: PilotError },
    /// The input fail-safe fired; nothing was recorded and the run must stop
    Aborted(PilotError),
}

impl IterationOutcome {
    pub fn record(&self) -> Option<&ActionRecord> {
        match self {
            IterationOutcome::Acted(record) => Some(record),
            IterationOutcome::Abandoned { .. } | IterationOutcome::Aborted(_) => None,
        }
    }

    pub fn is_completion(&self) -> bool {
        self.record().is_some_and(ActionRecord::is_completion)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, IterationOutcome::Aborted(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Iterations attempted, abandoned ones included
    pub iterations: u32,
    /// Whether the model signalled completion
    pub completed: bool,
    /// Whether the input fail-safe stopped the run
    pub aborted: bool,
    /// Retained records, oldest first
    pub history: Vec<ActionRecord>,
}

pub struct Agent<D, C, S, M> {
    settings: AgentSettings,
    driver: D,
    capturer: C,
    detector: S,
    model: M,
    history: ActionHistory,
}

impl<D, C, S, M> Agent<D, C, S, M>
where
    D: InputDriver,
    C: ScreenCapturer,
    S: DetectionService,
    M: ModelService,
{
    pub fn new(config: &PilotConfig, driver: D, capturer: C, detector: S, model: M) -> Self {
        Self::with_settings(config.agent.clone(), driver, capturer, detector, model)
    }

    pub fn with_settings(
        settings: AgentSettings,
        driver: D,
        capturer: C,
        detector: S,
        model: M,
    ) -> Self {
        let history = ActionHistory::with_capacity(settings.history_capacity);
        Self {
            settings,
            driver,
            capturer,
            detector,
            model,
            history,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn capturer(&self) -> &C {
        &self.capturer
    }

    /// One perceive → decide → act pass.
    pub fn run_iteration(&mut self, goal: &str) -> IterationOutcome {
        let screenshot_path = self.settings.dispatch.screenshot_path.clone();

        let path = match self.capturer.capture(&screenshot_path) {
            Ok(path) => path,
            Err(error) => return abandon(Stage::Screenshot, error),
        };

        let raw = match self.detector.detect(&path) {
            Ok(raw) => raw,
            Err(error) => return abandon(Stage::Detection, error),
        };
        let elements = parse_omniparser_output(&raw);
        info!("Parsed {} screen elements", elements.len());

        let image_base64 = match encode_file_base64(&path) {
            Ok(encoded) => encoded,
            Err(error) => return abandon(Stage::Encoding, error),
        };

        let request = ModelRequest {
            prompt_text: build_prompt_text(SYSTEM_PROMPT, goal, &elements, &self.history),
            image_base64,
        };
        let response = match self.model.next_action(&request) {
            Ok(response) => response,
            Err(error) => return abandon(Stage::Model, error),
        };

        let record = match try_execute_response(
            &response,
            &elements,
            &mut self.driver,
            &mut self.capturer,
            &self.settings.dispatch,
        ) {
            Ok(record) => record,
            Err(error) => return IterationOutcome::Aborted(error),
        };
        self.history.push(record.clone());
        IterationOutcome::Acted(record)
    }

    /// Loop iterations until completion, the step limit or the fail-safe.
    pub fn run(&mut self, goal: &str) -> RunSummary {
        info!(
            "Starting agent loop for goal: {} (max_steps: {})",
            goal,
            self.settings
                .max_steps
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
        );
        if !self.settings.startup_delay.is_zero() {
            thread::sleep(self.settings.startup_delay);
        }

        let mut iterations = 0u32;
        let mut completed = false;
        let mut aborted = false;

        loop {
            if let Some(max) = self.settings.max_steps {
                if iterations >= max {
                    info!("Reached step limit of {}", max);
                    break;
                }
            }
            iterations += 1;
            info!("Step {}", iterations);

            let outcome = self.run_iteration(goal);
            if let IterationOutcome::Aborted(e) = &outcome {
                error!("Stopping after {} steps: {}", iterations, e);
                aborted = true;
                break;
            }
            if outcome.is_completion() {
                completed = true;
                if self.settings.stop_on_completion {
                    info!("Task completed after {} steps", iterations);
                    break;
                }
            }
        }

        RunSummary {
            iterations,
            completed,
            aborted,
            history: self.history.iter().cloned().collect(),
        }
    }
}

fn abandon(stage: Stage, error: PilotError) -> IterationOutcome {
    warn!("Abandoning iteration at {} stage: {}", stage, error);
    IterationOutcome::Abandoned { stage, error }
}
