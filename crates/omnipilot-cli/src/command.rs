use crate::cli::{DecodeArgs, ParseArgs, RunArgs};
use crate::utils::{init_logging, read_input};
use anyhow::{Context, Result};
use omnipilot::{
    decode_response, parse_omniparser_report, Agent, Decision, EnigoDriver, OmniParserClient,
    PilotConfig, VlmClient, XcapCapturer,
};
use std::time::Duration;
use tracing::info;

/// Apply command line overrides on top of the environment.
pub fn run_config(args: &RunArgs) -> Result<PilotConfig> {
    let mut config = PilotConfig::from_env().context("invalid environment configuration")?;

    if let Some(url) = &args.omniparser_url {
        config.omniparser.base_url = url.clone();
    }
    if let Some(url) = &args.vlm_base_url {
        config.vlm.base_url = url.clone();
    }
    if let Some(model) = &args.vlm_model {
        config.vlm.model = model.clone();
    }

    config.agent.max_steps = args.max_steps;
    config.agent.stop_on_completion = !args.keep_going;
    config.agent.dispatch.screenshot_path = args.screenshot.clone();
    config.agent.startup_delay = Duration::try_from_secs_f64(args.startup_delay)
        .context("--startup-delay must be a non-negative number of seconds")?;

    config.validate()?;
    Ok(config)
}

pub fn handle_run_command(args: RunArgs) -> Result<()> {
    init_logging(args.log.verbose, args.log_dir.as_deref())?;
    let config = run_config(&args)?;
    info!(
        "OmniParser: {}, VLM: {} ({})",
        config.omniparser.base_url, config.vlm.base_url, config.vlm.model
    );

    let driver = EnigoDriver::new(config.agent.action_pause)?;
    let detector = OmniParserClient::new(config.omniparser.clone())?;
    let model = VlmClient::new(config.vlm.clone())?;
    let mut agent = Agent::new(&config, driver, XcapCapturer::new(), detector, model);

    let summary = agent.run(&args.goal);
    info!(
        "Finished after {} iterations (completed: {}, aborted: {})",
        summary.iterations, summary.completed, summary.aborted
    );
    println!("{}", serde_json::to_string_pretty(&summary.history)?);
    if summary.aborted {
        anyhow::bail!("run stopped by the pointer fail-safe");
    }
    Ok(())
}

pub fn handle_parse_command(args: ParseArgs) -> Result<()> {
    init_logging(args.log.verbose, None)?;
    let raw = read_input(&args.file)?;
    let report = parse_omniparser_report(&raw);

    println!("{}", serde_json::to_string_pretty(&report.elements)?);
    for warning in &report.warnings {
        eprintln!("{warning}");
    }
    eprintln!(
        "{} elements, {} skipped lines",
        report.elements.len(),
        report.warnings.len()
    );
    Ok(())
}

pub fn handle_decode_command(args: DecodeArgs) -> Result<()> {
    init_logging(args.log.verbose, None)?;
    let raw = read_input(&args.file)?;
    let decision = decode_response(&raw).context("failed to decode model reply")?;

    println!("{}", render_decision(&decision));
    Ok(())
}

fn render_decision(decision: &Decision) -> String {
    format!(
        "Action: {}\nReasoning: {}",
        decision.action,
        decision.reasoning.as_deref().unwrap_or("(none)")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["omnipilot", "run"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn test_flags_override_environment() {
        let args = run_args(&[
            "--omniparser-url",
            "http://parser.local",
            "--vlm-base-url",
            "http://vlm.local/v1",
            "--vlm-model",
            "qwen2-vl",
            "--max-steps",
            "4",
            "--keep-going",
            "--startup-delay",
            "0",
        ]);
        let config = run_config(&args).unwrap();
        assert_eq!(config.omniparser.base_url, "http://parser.local");
        assert_eq!(config.vlm.base_url, "http://vlm.local/v1");
        assert_eq!(config.vlm.model, "qwen2-vl");
        assert_eq!(config.agent.max_steps, Some(4));
        assert!(!config.agent.stop_on_completion);
        assert_eq!(config.agent.startup_delay, Duration::ZERO);
    }

    #[test]
    fn test_decision_prints_action_once() {
        let decision =
            decode_response(r#"{"Reasoning": "type it", "Next Action": "type", "value": "hi"}"#)
                .unwrap();
        let out = render_decision(&decision);
        assert_eq!(out, "Action: type(Some(\"hi\"))\nReasoning: type it");
        assert_eq!(out.matches("type(").count(), 1);

        let bare = decode_response(r#"{"Next Action": "wait"}"#).unwrap();
        assert_eq!(render_decision(&bare), "Action: wait\nReasoning: (none)");
    }

    #[test]
    fn test_negative_startup_delay_rejected() {
        let args = run_args(&[
            "--omniparser-url",
            "http://parser.local",
            "--vlm-base-url",
            "http://vlm.local/v1",
            "--vlm-model",
            "qwen2-vl",
            "--startup-delay=-1",
        ]);
        assert!(run_config(&args).is_err());
    }
}
