//! EXPLAIN Normalizer Module
//!
//! Turns raw EXPLAIN output into an [`AnalysisInput`]:
//! - timing pre-extraction from the raw text
//! - an optional primary structured parser, raced against a deadline
//! - fallback JSON parsing (EXPLAIN (FORMAT JSON), pgAdmin and psql exports)
//! - fallback TEXT parsing (default EXPLAIN output)
//!
//! # Example
//!
//! ```
//! use plancheck_analyzer::explain::{Normalizer, ParseSource};
//!
//! let text = "Seq Scan on users  (cost=0.00..14.40 rows=440 width=32)";
//! let input = Normalizer::new().normalize_fallback(text).unwrap();
//! assert_eq!(input.source, ParseSource::Fallback);
//! assert_eq!(input.tree.node_type, "Seq Scan");
//! assert_eq!(input.tree.relation_name.as_deref(), Some("users"));
//! ```

pub mod cleanup;
pub mod extras;
pub mod json;
pub mod normalizer;
pub mod plan;
pub mod primary;
pub mod shape;
pub mod text;
pub mod timing;

pub use json::{JsonExtractError, plan_node_from_value};
pub use normalizer::{Normalizer, PARSE_ERROR_DESCRIPTION};
pub use plan::{
    AnalysisInput, BufferCounters, JitInfo, JitTiming, JoinType, MAX_PLAN_DEPTH, NodeCost,
    NodeType, ParseSource, PlanNode, PlanNodeIterator, SortSpaceType, TriggerTiming,
};
pub use primary::{PrimaryParseError, RichParseOutcome, RichParser};
pub use shape::{Shape, resolve_tree};
pub use timing::Timings;
