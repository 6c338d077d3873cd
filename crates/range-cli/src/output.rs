//! Command output

use anyhow::Result;
use serde::Serialize;

use ddi_range_core::{AddressRange, RangeRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// What a command reports about a range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeReport {
    pub cidr: String,
    pub start: String,
    pub end: String,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Whether the backend holds this range
    pub committed: bool,
}

impl RangeReport {
    pub fn new(range: &AddressRange) -> Self {
        Self {
            cidr: range.cidr.to_string(),
            start: range.start.to_string(),
            end: range.end.to_string(),
            count: range.count(),
            reference: None,
            comment: None,
            committed: false,
        }
    }

    pub fn with_record(mut self, record: &RangeRecord) -> Self {
        self.reference = Some(record.reference.clone());
        self.comment = record.comment.clone();
        self.committed = true;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Text => {
                let mut line = format!(
                    "{}-{} ({}), {} address{}",
                    self.start,
                    self.end,
                    self.cidr,
                    self.count,
                    if self.count == 1 { "" } else { "es" }
                );
                if let Some(reference) = &self.reference {
                    line.push_str(&format!(" [{}]", reference));
                }
                if let Some(comment) = &self.comment {
                    line.push_str(&format!(" \"{}\"", comment));
                }
                Ok(line)
            }
        }
    }
}
