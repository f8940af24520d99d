//! Runtime configuration assembled from environment variables.

use crate::agent::AgentSettings;
use crate::errors::{PilotError, Result};
use crate::omniparser::OmniParserConfig;
use crate::vlm::{ApiKey, VlmConfig};
use std::str::FromStr;

pub const ENV_OMNIPARSER_API_URL: &str = "OMNIPARSER_API_URL";
pub const ENV_OMNIPARSER_BOX_THRESHOLD: &str = "OMNIPARSER_BOX_THRESHOLD";
pub const ENV_OMNIPARSER_IOU_THRESHOLD: &str = "OMNIPARSER_IOU_THRESHOLD";
pub const ENV_OMNIPARSER_USE_PADDLEOCR: &str = "OMNIPARSER_USE_PADDLEOCR";
pub const ENV_OMNIPARSER_IMGSZ: &str = "OMNIPARSER_IMGSZ";
pub const ENV_VLM_BASE_URL: &str = "VLM_BASE_URL";
pub const ENV_VLM_API_KEY: &str = "VLM_API_KEY";
pub const ENV_VLM_MODEL_NAME: &str = "VLM_MODEL_NAME";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PilotConfig {
    pub omniparser: OmniParserConfig,
    pub vlm: VlmConfig,
    pub agent: AgentSettings,
}

impl PilotConfig {
    /// Read the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(url) = get(ENV_OMNIPARSER_API_URL) {
            config.omniparser.base_url = url;
        }
        if let Some(v) = get(ENV_OMNIPARSER_BOX_THRESHOLD) {
            config.omniparser.box_threshold = parse_number(ENV_OMNIPARSER_BOX_THRESHOLD, &v)?;
        }
        if let Some(v) = get(ENV_OMNIPARSER_IOU_THRESHOLD) {
            config.omniparser.iou_threshold = parse_number(ENV_OMNIPARSER_IOU_THRESHOLD, &v)?;
        }
        if let Some(v) = get(ENV_OMNIPARSER_USE_PADDLEOCR) {
            config.omniparser.use_paddleocr = parse_bool(ENV_OMNIPARSER_USE_PADDLEOCR, &v)?;
        }
        if let Some(v) = get(ENV_OMNIPARSER_IMGSZ) {
            config.omniparser.imgsz = parse_number(ENV_OMNIPARSER_IMGSZ, &v)?;
        }

        if let Some(url) = get(ENV_VLM_BASE_URL) {
            config.vlm.base_url = url;
        }
        if let Some(key) = get(ENV_VLM_API_KEY) {
            config.vlm.api_key = ApiKey::new(key);
        }
        if let Some(model) = get(ENV_VLM_MODEL_NAME) {
            config.vlm.model = model;
        }

        Ok(config)
    }

    /// Check the fields the agent loop cannot run without.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.omniparser.base_url.trim().is_empty() {
            missing.push(ENV_OMNIPARSER_API_URL);
        }
        if self.vlm.base_url.trim().is_empty() {
            missing.push(ENV_VLM_BASE_URL);
        }
        if self.vlm.model.trim().is_empty() {
            missing.push(ENV_VLM_MODEL_NAME);
        }
        if !missing.is_empty() {
            return Err(PilotError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let thresholds = [
            ("box threshold", self.omniparser.box_threshold),
            ("IoU threshold", self.omniparser.iou_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(PilotError::Config(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        if self.omniparser.imgsz == 0 {
            return Err(PilotError::Config("imgsz must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| PilotError::Config(format!("{key} has invalid value '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PilotError::Config(format!(
            "{key} has invalid value '{value}', expected true or false"
        ))),
    }
}
