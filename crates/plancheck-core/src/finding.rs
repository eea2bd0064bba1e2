//! Findings - detected performance concerns and the evidence behind them
//!
//! A `Finding` is produced by one detector looking at one plan node. It
//! always names what was observed (`Evidence`) and what could not be
//! observed (`Education::limitations`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// How much a finding is expected to matter.
///
/// Ordered `Low < Medium < High` so aggregation can take the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    /// Returns true if this is the highest impact level
    pub fn is_high(&self) -> bool {
        matches!(self, Self::High)
    }

    /// Returns true if this is at least medium
    pub fn is_medium_or_above(&self) -> bool {
        matches!(self, Self::Medium | Self::High)
    }

    /// Returns the impact level as a display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a finding was derived from the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Directly observed in the plan's own numbers
    Verified,
    /// Derived through a heuristic over observed numbers
    Inferred,
    /// General guidance, not tied to a specific node
    Educational,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Inferred => "inferred",
            Self::Educational => "educational",
        }
    }
}

/// The literal value behind a piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvidenceValue {
    Number(f64),
    Text(String),
}

impl EvidenceValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl From<f64> for EvidenceValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for EvidenceValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for EvidenceValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EvidenceValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for EvidenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One observed plan fact supporting a finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Plan property (or computed quantity) the value came from
    pub field: String,
    /// The value itself
    pub value: EvidenceValue,
    /// Human-readable rendering of the fact
    pub raw_text: String,
    /// Where the fact lives: a relation name, a node type, or "Computed"
    pub location: String,
}

impl Evidence {
    pub fn new(
        field: impl Into<String>,
        value: impl Into<EvidenceValue>,
        raw_text: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            raw_text: raw_text.into(),
            location: location.into(),
        }
    }
}

/// Explanation attached to a finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Education {
    /// One sentence describing what PostgreSQL did
    pub behavior: String,
    /// Supporting explanation lines
    pub explanation: Vec<String>,
    /// What cannot be determined from the plan alone; never empty
    pub limitations: Vec<String>,
    /// Link into the PostgreSQL documentation
    pub docs_link: String,
}

/// A detected performance concern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable rule identifier, e.g. `disk_spill`
    pub id: String,
    pub title: String,
    pub confidence: Confidence,
    pub impact: Impact,
    pub evidence: Vec<Evidence>,
    pub education: Education,
}

impl Finding {
    /// Creates a finding with no evidence and an empty education block
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        confidence: Confidence,
        impact: Impact,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            confidence,
            impact,
            evidence: Vec::new(),
            education: Education {
                behavior: String::new(),
                explanation: Vec::new(),
                limitations: Vec::new(),
                docs_link: String::new(),
            },
        }
    }

    /// Appends one piece of evidence
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    /// Appends evidence only when present
    pub fn with_optional_evidence(mut self, evidence: Option<Evidence>) -> Self {
        self.evidence.extend(evidence);
        self
    }

    /// Sets the behavior sentence
    pub fn with_behavior(mut self, behavior: impl Into<String>) -> Self {
        self.education.behavior = behavior.into();
        self
    }

    /// Sets the explanation lines, dropping empty ones
    pub fn with_explanation<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.education.explanation = lines
            .into_iter()
            .map(Into::into)
            .filter(|line: &String| !line.is_empty())
            .collect();
        self
    }

    /// Sets what the plan cannot tell us
    pub fn with_limitations<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.education.limitations = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the documentation link
    pub fn with_docs_link(mut self, link: impl Into<String>) -> Self {
        self.education.docs_link = link.into();
        self
    }

    /// Returns true if any evidence sits at the given location
    pub fn has_evidence_at(&self, location: &str) -> bool {
        self.evidence.iter().any(|e| e.location == location)
    }
}
