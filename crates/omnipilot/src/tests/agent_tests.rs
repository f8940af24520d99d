//! Tests for the agent loop

use super::{FailingCapturer, FileCapturer, InputCall, RecordingDriver, ScriptedModel, StubDetector};
use crate::action::ClickKind;
use crate::agent::{Agent, AgentSettings, IterationOutcome, Stage};
use crate::dispatch::DispatchConfig;
use crate::errors::PilotError;
use std::time::Duration;

const DETECTION: &str = "icon 3: {'type': 'icon', 'bbox': [0.4, 0.4, 0.6, 0.6], 'interactivity': True, 'content': 'Chrome'}\n\
text 4: {'type': 'text', 'bbox': [0.1, 0.1, 0.2, 0.2], 'interactivity': False, 'content': 'Search'}";

fn settings(dir: &tempfile::TempDir) -> AgentSettings {
    AgentSettings {
        startup_delay: Duration::ZERO,
        action_pause: Duration::ZERO,
        max_steps: Some(10),
        dispatch: DispatchConfig {
            move_duration: Duration::ZERO,
            wait_duration: Duration::from_millis(1),
            screenshot_path: dir.path().join("screenshot.png"),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_iteration_clicks_detected_element() {
    let dir = tempfile::tempdir().unwrap();
    let detector = StubDetector::returning(DETECTION);
    let model = ScriptedModel::new(&[r#"{"Reasoning": "open it", "Next Action": "left_click", "Box ID": 3}"#]);
    let mut agent = Agent::with_settings(
        settings(&dir),
        RecordingDriver::new(1000, 1000),
        FileCapturer::default(),
        &detector,
        &model,
    );

    let outcome = agent.run_iteration("open chrome");
    let record = outcome.record().expect("iteration should act");
    assert!(record.is_success());
    assert_eq!(
        agent.driver().calls,
        vec![
            InputCall::MoveTo(500, 500, Duration::ZERO),
            InputCall::Click(ClickKind::Left)
        ]
    );
    assert_eq!(agent.history().len(), 1);

    let requests = model.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt_text.contains("User Query:\nopen chrome"));
    assert!(requests[0].prompt_text.contains("icon 3: "));
    assert!(requests[0].prompt_text.ends_with("(none)"));
    // "png" in base64
    assert_eq!(requests[0].image_base64, "cG5n");
}

#[test]
fn test_history_is_fed_back_most_recent_first() {
    let dir = tempfile::tempdir().unwrap();
    let detector = StubDetector::returning(DETECTION);
    let model = ScriptedModel::new(&[
        r#"{"Next Action": "type", "value": "stocks"}"#,
        r#"{"Next Action": "key", "value": "enter"}"#,
        r#"{"Next Action": "wait"}"#,
    ]);
    let mut agent = Agent::with_settings(
        settings(&dir),
        RecordingDriver::new(1000, 1000),
        FileCapturer::default(),
        &detector,
        &model,
    );

    for _ in 0..3 {
        agent.run_iteration("search");
    }

    let requests = model.requests.borrow();
    let last = &requests[2].prompt_text;
    let history = last
        .split("Action History (Most Recent First):\n")
        .nth(1)
        .unwrap();
    assert_eq!(
        history,
        "Pressed the key: 'enter'.\nTyped the text: 'stocks'."
    );
}

#[test]
fn test_failures_abandon_without_recording() {
    let dir = tempfile::tempdir().unwrap();
    let detector = StubDetector::returning(DETECTION);
    let model = ScriptedModel::new(&[]);
    let mut agent = Agent::with_settings(
        settings(&dir),
        RecordingDriver::new(1000, 1000),
        FailingCapturer,
        &detector,
        &model,
    );
    match agent.run_iteration("anything") {
        IterationOutcome::Abandoned { stage, error } => {
            assert_eq!(stage, Stage::Screenshot);
            assert!(matches!(error, PilotError::Screenshot(_)));
        }
        other => panic!("expected abandoned iteration, got {other:?}"),
    }
    assert_eq!(*detector.calls.borrow(), 0);
    assert!(agent.history().is_empty());

    let failing_detector = StubDetector::failing();
    let mut agent = Agent::with_settings(
        settings(&dir),
        RecordingDriver::new(1000, 1000),
        FileCapturer::default(),
        &failing_detector,
        &model,
    );
    let outcome = agent.run_iteration("anything");
    assert!(matches!(
        outcome,
        IterationOutcome::Abandoned {
            stage: Stage::Detection,
            ..
        }
    ));
    assert!(model.requests.borrow().is_empty());

    let mut agent = Agent::with_settings(
        settings(&dir),
        RecordingDriver::new(1000, 1000),
        FileCapturer::default(),
        &detector,
        &model,
    );
    let outcome = agent.run_iteration("anything");
    assert!(matches!(
        outcome,
        IterationOutcome::Abandoned {
            stage: Stage::Model,
            ..
        }
    ));
    assert!(agent.driver().calls.is_empty());
    assert!(agent.history().is_empty());
}

#[test]
fn test_empty_detection_still_asks_model() {
    let dir = tempfile::tempdir().unwrap();
    let detector = StubDetector::returning("");
    let model = ScriptedModel::new(&[r#"{"Next Action": "scroll_down"}"#]);
    let mut agent = Agent::with_settings(
        settings(&dir),
        RecordingDriver::new(1000, 1000),
        FileCapturer::default(),
        &detector,
        &model,
    );
    let outcome = agent.run_iteration("read the page");
    assert_eq!(outcome.record().unwrap().message, "Scrolled down.");
}

#[test]
fn test_run_stops_on_completion() {
    let dir = tempfile::tempdir().unwrap();
    let detector = StubDetector::returning(DETECTION);
    let model = ScriptedModel::new(&[
        r#"{"Next Action": "left_click", "Box ID": 3}"#,
        "Done! {\"Next Action\": \"None\"}",
        r#"{"Next Action": "wait"}"#,
    ]);
    let mut agent = Agent::with_settings(
        settings(&dir),
        RecordingDriver::new(1000, 1000),
        FileCapturer::default(),
        &detector,
        &model,
    );

    let summary = agent.run("open chrome");
    assert!(summary.completed);
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.history.len(), 2);
    assert!(summary.history[1].is_completion());
    assert_eq!(model.replies.borrow().len(), 1);
}

#[test]
fn test_run_honours_step_limit() {
    let dir = tempfile::tempdir().unwrap();
    let detector = StubDetector::returning(DETECTION);
    let model = ScriptedModel::new(&[
        r#"{"Next Action": "None"}"#,
        r#"{"Next Action": "wait"}"#,
        r#"{"Next Action": "wait"}"#,
    ]);
    let mut settings = settings(&dir);
    settings.max_steps = Some(3);
    settings.stop_on_completion = false;
    let mut agent = Agent::with_settings(
        settings,
        RecordingDriver::new(1000, 1000),
        FileCapturer::default(),
        &detector,
        &model,
    );

    let summary = agent.run("keep going");
    assert_eq!(summary.iterations, 3);
    assert!(summary.completed);
    assert_eq!(summary.history.len(), 3);
    assert_eq!(agent.capturer().count, 3);
}

#[test]
fn test_abandoned_iterations_count_toward_limit() {
    let dir = tempfile::tempdir().unwrap();
    let detector = StubDetector::failing();
    let model = ScriptedModel::new(&[]);
    let mut settings = settings(&dir);
    settings.max_steps = Some(4);
    let mut agent = Agent::with_settings(
        settings,
        RecordingDriver::new(1000, 1000),
        FileCapturer::default(),
        &detector,
        &model,
    );

    let summary = agent.run("never works");
    assert_eq!(summary.iterations, 4);
    assert!(!summary.completed);
    assert!(summary.history.is_empty());
    assert_eq!(*detector.calls.borrow(), 4);
}

#[test]
fn test_fail_safe_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let detector = StubDetector::returning(DETECTION);
    let model = ScriptedModel::new(&[
        r#"{"Next Action": "left_click", "Box ID": 3}"#,
        r#"{"Next Action": "type", "value": "stocks"}"#,
        r#"{"Next Action": "wait"}"#,
    ]);
    let mut driver = RecordingDriver::new(1000, 1000);
    driver.fail_safe = true;
    let mut agent = Agent::with_settings(
        settings(&dir),
        driver,
        FileCapturer::default(),
        &detector,
        &model,
    );

    let summary = agent.run("open chrome");
    assert!(summary.aborted);
    assert!(!summary.completed);
    assert_eq!(summary.iterations, 1);
    assert!(summary.history.is_empty());
    assert!(agent.driver().calls.is_empty());
    assert_eq!(model.replies.borrow().len(), 2);

    match agent.run_iteration("open chrome") {
        IterationOutcome::Aborted(PilotError::FailSafe { x: 0, y: 0 }) => {}
        other => panic!("expected aborted iteration, got {other:?}"),
    }
    assert!(agent.history().is_empty());
}
