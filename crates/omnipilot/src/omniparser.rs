//! OmniParser detection service: Gradio client and output parser.

use crate::errors::{PilotError, Result};
use crate::pyliteral::parse_literal;
use crate::types::ScreenElement;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const REQUIRED_KEYS: [&str; 4] = ["type", "bbox", "interactivity", "content"];

// ===== Output Parsing =====

/// Why a line of detection output was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    /// 1-based line number in the trimmed input
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Skipping line {}: {}", self.line, self.reason)
    }
}

/// Elements accepted from one detection output, plus the lines that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    pub elements: Vec<ScreenElement>,
    pub warnings: Vec<ParseWarning>,
}

/// Parse OmniParser's `<label>: <python dict>` lines into elements.
///
/// Malformed lines are skipped with a warning; see [`parse_omniparser_report`].
pub fn parse_omniparser_output(output: &str) -> Vec<ScreenElement> {
    parse_omniparser_report(output).elements
}

/// Like [`parse_omniparser_output`] but also returns the skipped-line warnings.
///
/// A panic anywhere in the pass yields an empty report rather than a partial one.
pub fn parse_omniparser_report(output: &str) -> ParseReport {
    match std::panic::catch_unwind(|| fold_lines(output)) {
        Ok(report) => report,
        Err(_) => {
            warn!("Critical error parsing OmniParser output, discarding all elements");
            ParseReport::default()
        }
    }
}

fn fold_lines(output: &str) -> ParseReport {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return ParseReport::default();
    }

    trimmed
        .split('\n')
        .enumerate()
        .fold(ParseReport::default(), |mut report, (idx, raw)| {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            match parse_line(line) {
                Ok(element) => report.elements.push(element),
                Err(reason) => {
                    let warning = ParseWarning {
                        line: idx + 1,
                        reason: format!("{reason}. Line: '{line}'"),
                    };
                    warn!("{}", warning);
                    report.warnings.push(warning);
                }
            }
            report
        })
}

fn parse_line(line: &str) -> std::result::Result<ScreenElement, String> {
    let (label, fragment) = line
        .split_once(':')
        .ok_or_else(|| "No colon found".to_string())?;
    let (label, fragment) = (label.trim(), fragment.trim());

    let value = parse_literal(fragment).map_err(|e| format!("Invalid syntax. Error: {e}"))?;
    let Value::Object(map) = value else {
        return Err("Not a dictionary".to_string());
    };

    let mut missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !map.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(format!("Missing keys {missing:?}"));
    }

    element_from_map(label, &map)
}

fn element_from_map(label: &str, map: &Map<String, Value>) -> std::result::Result<ScreenElement, String> {
    let element_type = match &map["type"] {
        Value::String(s) => s.clone(),
        other => return Err(format!("Invalid 'type' value {other}")),
    };

    let bbox = match &map["bbox"] {
        Value::Array(items) if items.len() == 4 => {
            let mut bbox = [0.0f64; 4];
            for (slot, item) in bbox.iter_mut().zip(items) {
                *slot = item
                    .as_f64()
                    .ok_or_else(|| format!("Invalid 'bbox' coordinate {item}"))?;
            }
            bbox
        }
        other => return Err(format!("Invalid 'bbox' value {other}")),
    };

    let interactivity = match &map["interactivity"] {
        Value::Bool(b) => *b,
        other => return Err(format!("Invalid 'interactivity' value {other}")),
    };

    let content = match &map["content"] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        other => return Err(format!("Invalid 'content' value {other}")),
    };

    Ok(ScreenElement {
        id: label.to_string(),
        element_type,
        bbox,
        interactivity,
        content,
    })
}

// ===== Detection Service =====

/// External element detector: screenshot in, raw line-oriented text out.
pub trait DetectionService {
    fn detect(&self, image_path: &Path) -> Result<String>;
}

impl<T: DetectionService + ?Sized> DetectionService for &T {
    fn detect(&self, image_path: &Path) -> Result<String> {
        (**self).detect(image_path)
    }
}

/// Detection thresholds and endpoint for the OmniParser Gradio app.
#[derive(Debug, Clone, PartialEq)]
pub struct OmniParserConfig {
    /// Root URL of the Gradio app, e.g. `https://xxxx.gradio.live`
    pub base_url: String,
    pub box_threshold: f64,
    pub iou_threshold: f64,
    pub use_paddleocr: bool,
    pub imgsz: u32,
    /// Endpoint name registered by the app
    pub api_name: String,
    pub request_timeout: Option<Duration>,
}

impl Default for OmniParserConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            box_threshold: 0.05,
            iou_threshold: 0.1,
            use_paddleocr: true,
            imgsz: 640,
            api_name: "process".to_string(),
            request_timeout: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventIdResponse {
    event_id: String,
}

/// Blocking client for the OmniParser `/process` endpoint.
pub struct OmniParserClient {
    config: OmniParserConfig,
    http: reqwest::blocking::Client,
}

impl OmniParserClient {
    pub fn new(config: OmniParserConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(PilotError::Config("OmniParser URL is empty".to_string()));
        }
        let mut builder = reqwest::blocking::Client::builder();
        // reqwest's blocking client defaults to a 30s timeout; keep it unbounded unless asked
        builder = builder.timeout(config.request_timeout);
        Ok(Self {
            config,
            http: builder.build()?,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/gradio_api/{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    fn upload(&self, image_path: &Path) -> Result<String> {
        let form = reqwest::blocking::multipart::Form::new().file("files", image_path)?;
        let resp = self.http.post(self.endpoint("upload")).multipart(form).send()?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            warn!("OmniParser upload error: {} - {}", status, text);
            return Err(PilotError::Detection(format!(
                "upload failed ({status}): {text}"
            )));
        }
        let paths: Vec<String> = resp.json()?;
        paths
            .into_iter()
            .next()
            .ok_or_else(|| PilotError::Detection("upload returned no file path".to_string()))
    }

    fn request_payload(&self, uploaded_path: &str) -> Value {
        serde_json::json!({
            "data": [
                {
                    "path": uploaded_path,
                    "meta": { "_type": "gradio.FileData" }
                },
                self.config.box_threshold,
                self.config.iou_threshold,
                self.config.use_paddleocr,
                self.config.imgsz,
            ]
        })
    }
}

impl DetectionService for OmniParserClient {
    fn detect(&self, image_path: &Path) -> Result<String> {
        info!(
            "Calling OmniParser at {} (box_threshold: {}, iou_threshold: {}, imgsz: {})",
            self.config.base_url,
            self.config.box_threshold,
            self.config.iou_threshold,
            self.config.imgsz
        );

        let uploaded = self.upload(image_path)?;
        debug!("OmniParser upload stored at {}", uploaded);

        let call_path = format!("call/{}", self.config.api_name);
        let resp = self
            .http
            .post(self.endpoint(&call_path))
            .json(&self.request_payload(&uploaded))
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            warn!("OmniParser call error: {} - {}", status, text);
            return Err(PilotError::Detection(format!("call failed ({status}): {text}")));
        }
        let EventIdResponse { event_id } = resp.json()?;

        let stream = self
            .http
            .get(self.endpoint(&format!("{call_path}/{event_id}")))
            .send()?
            .error_for_status()?
            .text()?;
        debug!(
            "OmniParser event stream: {}",
            stream.chars().take(500).collect::<String>()
        );

        let data = completed_event_data(&stream)?;
        let parsed = parsed_content_from_data(&data)?;
        info!("OmniParser returned {} lines", parsed.lines().count());
        Ok(parsed)
    }
}

/// Extract the `data:` payload of the `complete` event from a Gradio event stream.
pub fn completed_event_data(stream: &str) -> Result<Value> {
    let mut event: Option<&str> = None;
    for line in stream.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(name) = line.strip_prefix("event:") {
            event = Some(name.trim());
        } else if let Some(data) = line.strip_prefix("data:") {
            match event {
                Some("complete") => return Ok(serde_json::from_str(data.trim())?),
                Some("error") => {
                    return Err(PilotError::Detection(format!(
                        "service reported an error: {}",
                        data.trim()
                    )))
                }
                _ => {}
            }
        }
    }
    Err(PilotError::Detection(
        "event stream ended without a complete event".to_string(),
    ))
}

/// OmniParser returns `[annotated_image, parsed_content]`; only the text is used.
pub fn parsed_content_from_data(data: &Value) -> Result<String> {
    data.get(1)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            let shape: String = data.to_string().chars().take(200).collect();
            PilotError::Detection(format!("unexpected result shape: {shape}"))
        })
}
