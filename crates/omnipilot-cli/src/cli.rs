use clap::{Args, Parser, Subcommand};
use omnipilot::DEFAULT_GOAL;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "omnipilot")]
#[command(version, about = "Vision-guided desktop agent driven by OmniParser and a VLM")]
#[command(
    long_about = "omnipilot captures the screen, detects UI elements with an OmniParser service, asks a vision-language model for the next action and simulates it with the mouse and keyboard.\n\nService settings are read from the environment (a .env file is honoured): OMNIPARSER_API_URL, VLM_BASE_URL, VLM_API_KEY, VLM_MODEL_NAME."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent loop against the live desktop
    Run(RunArgs),
    /// Parse saved OmniParser output and print the accepted elements
    Parse(ParseArgs),
    /// Decode a saved model reply without simulating any input
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log at debug level
    #[clap(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What the agent should accomplish
    #[clap(default_value = DEFAULT_GOAL)]
    pub goal: String,

    /// Stop after this many iterations (runs until killed when omitted)
    #[clap(long)]
    pub max_steps: Option<u32>,

    /// Keep looping after the model reports the task as completed
    #[clap(long)]
    pub keep_going: bool,

    /// Where each screenshot is written
    #[clap(long, default_value = "screenshot.png")]
    pub screenshot: PathBuf,

    /// Seconds to wait before the first iteration
    #[clap(long, default_value_t = 2.0)]
    pub startup_delay: f64,

    /// OmniParser Gradio URL (overrides OMNIPARSER_API_URL)
    #[clap(long)]
    pub omniparser_url: Option<String>,

    /// OpenAI-compatible base URL (overrides VLM_BASE_URL)
    #[clap(long)]
    pub vlm_base_url: Option<String>,

    /// Model name (overrides VLM_MODEL_NAME)
    #[clap(long)]
    pub vlm_model: Option<String>,

    /// Also write daily rolling log files to this directory
    #[clap(long)]
    pub log_dir: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// File holding the raw parsed-content text, or `-` for stdin
    pub file: String,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding the raw model reply, or `-` for stdin
    pub file: String,

    #[command(flatten)]
    pub log: LogArgs,
}
