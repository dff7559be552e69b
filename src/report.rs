//! Findings report model and comment rendering.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ReportError;

/// First line of every published comment; also how the comment from an
/// earlier run is recognized.
pub const COMMENT_MARKER: &str = "# DBLinter Report:";

/// The subset of the SARIF-style report the renderer needs.
#[derive(Debug, Deserialize)]
pub struct FindingsReport {
    #[serde(default)]
    pub runs: Vec<AnalysisRun>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisRun {
    #[serde(default)]
    pub results: Vec<Finding>,
}

#[derive(Debug, Deserialize)]
pub struct Finding {
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    pub message: Message,
    #[serde(default)]
    pub fixes: Fixes,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub text: String,
}

/// Fix suggestions are free text or structured data depending on the
/// analyzer rule.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Fixes {
    Text(String),
    Structured(serde_json::Value),
}

impl Default for Fixes {
    fn default() -> Self {
        Fixes::Text(String::new())
    }
}

impl fmt::Display for Fixes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fixes::Text(text) => f.write_str(text),
            Fixes::Structured(value) => write!(f, "{}", value),
        }
    }
}

impl FindingsReport {
    pub fn from_file(path: &Path) -> Result<Self, ReportError> {
        let raw = fs::read_to_string(path).map_err(|source| ReportError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ReportError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Results of the first run. A report without runs has no findings.
    pub fn findings(&self) -> &[Finding] {
        self.runs
            .first()
            .map(|run| run.results.as_slice())
            .unwrap_or_default()
    }
}

/// Renders the findings as the Markdown comment body.
pub fn render_report(report: &FindingsReport) -> String {
    let mut body = format!("{}\n\n", COMMENT_MARKER);

    let findings = report.findings();
    if findings.is_empty() {
        body.push_str("No issues found");
        return body;
    }

    body.push_str("## Issues found:\n");
    body.push_str("```diff\n");
    for finding in findings {
        body.push_str(&format!(
            "- ⚠️ {} {}\n",
            finding.rule_id, finding.message.text
        ));
        body.push_str(&format!("+ ↪️ {}\n\n", finding.fixes));
    }
    body.push_str("```\n");
    body
}
