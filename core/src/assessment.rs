//! Diff preview and risk scoring.
//!
//! The workflow does not interpret either value: it asks a [`ChangeAssessor`] once at
//! creation and stores the result verbatim on the record.

use crate::change_request::NewChangeRequest;
use serde_json::{Value, json};

/// Result of assessing a proposed change.
#[derive(Clone, Debug, PartialEq)]
pub struct Assessment {
    /// Opaque summary of the change's effect
    pub diff_preview: Value,
    /// Risk score, `None` when unscored
    pub risk_score: Option<i32>,
}

/// Computes the diff preview and risk score of a proposed change.
pub trait ChangeAssessor: Send + Sync {
    /// Assess `draft`.
    fn assess(&self, draft: &NewChangeRequest) -> Assessment;
}

/// Fixed assessment used until a real diff engine is wired in: one affected row, risk 10.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderAssessor;

impl ChangeAssessor for PlaceholderAssessor {
    fn assess(&self, _draft: &NewChangeRequest) -> Assessment {
        Assessment {
            diff_preview: json!({ "rows": 1 }),
            risk_score: Some(10),
        }
    }
}
