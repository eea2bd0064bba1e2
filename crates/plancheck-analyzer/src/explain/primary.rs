//! Primary structured parser stage
//!
//! A richer parser (for example one running in an isolated worker) can be
//! injected through [`RichParser`]. It runs on a dedicated thread with its
//! own runtime and is raced against a deadline, so a late, blocking, failed
//! or panicking parser never holds up the fallback stages.

use crate::explain::extras::{extract_jit, extract_triggers};
use crate::explain::json::{attach_wrapper_extras, plan_node_from_value};
use crate::explain::plan::PlanNode;
use crate::explain::shape::{has_node_type, resolve_tree};
use crate::explain::timing::{self, Timings};
use crate::panic_message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;

/// Result reported by a primary parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichParseOutcome {
    pub ok: bool,
    /// Parsed plan in any JSON shape the shape resolver understands
    pub tree: Option<Value>,
    pub error: Option<String>,
}

impl RichParseOutcome {
    pub fn success(tree: Value) -> Self {
        Self {
            ok: true,
            tree: Some(tree),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            tree: None,
            error: Some(error.into()),
        }
    }
}

/// A structured EXPLAIN parser tried before the built-in fallbacks
#[async_trait]
pub trait RichParser: Send + Sync {
    async fn rich_parse(&self, text: &str) -> RichParseOutcome;
}

/// Why the primary stage produced no tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrimaryParseError {
    #[error("primary parser did not finish within {0:?}")]
    Timeout(Duration),

    #[error("primary parser rejected the input: {0}")]
    Rejected(String),

    #[error("primary parser returned an unusable tree: {0}")]
    Malformed(String),

    #[error("primary parser task failed: {0}")]
    Crashed(String),
}

pub type Result<T> = std::result::Result<T, PrimaryParseError>;

/// A tree produced by the primary parser
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryPlan {
    pub tree: PlanNode,
    /// Timings found in the parser's document
    pub timings: Timings,
}

/// Runs the parser on its own thread and waits at most `deadline`.
///
/// A parser still running at the deadline is abandoned; whatever it
/// returns later is dropped.
pub async fn run_primary(
    parser: Arc<dyn RichParser>,
    text: &str,
    deadline: Duration,
) -> Result<Value> {
    let started = Instant::now();
    let (tx, rx) = oneshot::channel();
    let text = text.to_string();

    thread::Builder::new()
        .name("primary-parser".into())
        .spawn(move || {
            let outcome: std::result::Result<RichParseOutcome, String> =
                panic::catch_unwind(AssertUnwindSafe(|| {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(|e| e.to_string())?;
                    Ok(runtime.block_on(parser.rich_parse(&text)))
                }))
                .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));
            let _ = tx.send(outcome);
        })
        .map_err(|e| PrimaryParseError::Crashed(e.to_string()))?;

    let outcome = match tokio::time::timeout(deadline, rx).await {
        Ok(Ok(Ok(outcome))) => outcome,
        Ok(Ok(Err(message))) => return Err(PrimaryParseError::Crashed(message)),
        Ok(Err(_)) => {
            return Err(PrimaryParseError::Crashed(
                "parser thread exited without a result".into(),
            ));
        }
        Err(_) => return Err(PrimaryParseError::Timeout(deadline)),
    };
    if started.elapsed() > deadline {
        return Err(PrimaryParseError::Timeout(deadline));
    }

    if !outcome.ok {
        return Err(PrimaryParseError::Rejected(
            outcome
                .error
                .unwrap_or_else(|| "no reason given".to_string()),
        ));
    }
    outcome
        .tree
        .ok_or_else(|| PrimaryParseError::Malformed("no tree in a successful outcome".into()))
}

/// Converts a primary parser document into a plan tree.
///
/// Triggers and JIT missing from the tree are taken from the document's
/// wrapper object, or else from the raw text.
pub fn plan_from_document(document: &Value, raw: &str) -> Result<PrimaryPlan> {
    let tree_value = resolve_tree(document)
        .filter(|value| has_node_type(value))
        .ok_or_else(|| PrimaryParseError::Malformed("tree has no node type".into()))?;

    let wrapper = match document {
        Value::Array(items) => items.first().unwrap_or(document),
        other => other,
    };

    let mut tree = plan_node_from_value(tree_value);
    attach_wrapper_extras(&mut tree, wrapper);
    if tree.triggers.is_empty() {
        tree.triggers = extract_triggers(raw);
    }
    if tree.jit.is_none() {
        tree.jit = extract_jit(raw);
    }

    Ok(PrimaryPlan {
        tree,
        timings: timing::from_json(document),
    })
}

/// Runs the primary parser and converts its document
pub async fn parse_primary(
    parser: Arc<dyn RichParser>,
    raw: &str,
    deadline: Duration,
) -> Result<PrimaryPlan> {
    let document = run_primary(parser, raw, deadline).await?;
    plan_from_document(&document, raw)
}
