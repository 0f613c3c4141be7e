//! The change request entity and its value types.
//!
//! A [`ChangeRequest`] describes a proposed mutation of one master-data table. Its
//! structured payloads (`filter`, `proposed_changes`, `diff_preview`) are opaque to the
//! workflow: they are stored and returned verbatim.

use crate::error::WorkflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifier
// ============================================================================

/// Unique identifier for a change request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeRequestId(Uuid);

impl ChangeRequestId {
    /// Creates a new random `ChangeRequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ChangeRequestId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChangeRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChangeRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeRequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Returned when a stored status string is not one of the known workflow states.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown change request status: {0}")]
pub struct UnknownStatus(pub String);

/// Workflow state of a change request.
///
/// `Created` and `PendingApproval` are both initial states; `Applied` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeRequestStatus {
    /// Created without a dry run
    Created,
    /// Created as a dry run, waiting for an approver
    PendingApproval,
    /// Approved and ready to be applied
    Approved,
    /// Applied to the master data (terminal)
    Applied,
}

impl ChangeRequestStatus {
    /// All states, in workflow order.
    pub const ALL: [Self; 4] = [
        Self::Created,
        Self::PendingApproval,
        Self::Approved,
        Self::Applied,
    ];

    /// Initial state for a newly created change request.
    #[must_use]
    pub const fn initial(dry_run: bool) -> Self {
        if dry_run {
            Self::PendingApproval
        } else {
            Self::Created
        }
    }

    /// Convert status to its stored string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Applied => "APPLIED",
        }
    }

    /// Parse a status from its stored string representation.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownStatus`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "CREATED" => Ok(Self::Created),
            "PENDING_APPROVAL" => Ok(Self::PendingApproval),
            "APPROVED" => Ok(Self::Approved),
            "APPLIED" => Ok(Self::Applied),
            other => Err(UnknownStatus(other.to_string())),
        }
    }

    /// Whether no further transition may leave this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

impl fmt::Display for ChangeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeRequestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Entity
// ============================================================================

/// A change request as persisted by the repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Identifier, assigned once at creation
    pub id: ChangeRequestId,
    /// Customer the request is attributed to
    pub customer_id: String,
    /// Master-data domain (e.g. `supplier`)
    pub domain: String,
    /// Target table (e.g. `supplier_address`)
    pub table_name: String,
    /// Opaque operation label (e.g. `update`)
    pub operation: String,
    /// Row selector, stored verbatim
    pub filter: Value,
    /// Proposed column values, stored verbatim
    pub proposed_changes: Value,
    /// Externally computed effect summary, stored verbatim
    pub diff_preview: Value,
    /// Risk score, `None` when unscored
    pub risk_score: Option<i32>,
    /// Current workflow state
    pub status: ChangeRequestStatus,
    /// Key supplied on the first successful apply
    pub idempotency_key: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Creation payload
// ============================================================================

/// The client-supplied part of a new change request.
///
/// Missing or `null` string fields default to the empty string and missing or `null`
/// payloads default to an empty JSON object.
#[derive(Clone, Debug, PartialEq)]
pub struct NewChangeRequest {
    /// Master-data domain
    pub domain: String,
    /// Target table
    pub table: String,
    /// Operation label
    pub operation: String,
    /// Row selector
    pub filter: Value,
    /// Proposed column values
    pub proposed_changes: Value,
}

impl Default for NewChangeRequest {
    fn default() -> Self {
        Self {
            domain: String::new(),
            table: String::new(),
            operation: String::new(),
            filter: empty_object(),
            proposed_changes: empty_object(),
        }
    }
}

impl NewChangeRequest {
    /// Build a payload from a JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Serialization`] if the body is not a JSON object or if
    /// `domain`, `table` or `operation` is present with a non-string value.
    ///
    /// # Examples
    ///
    /// ```
    /// use crflow_core::change_request::NewChangeRequest;
    /// use serde_json::json;
    ///
    /// let draft = NewChangeRequest::from_json(&json!({
    ///     "domain": "supplier",
    ///     "table": "supplier_address",
    /// })).unwrap();
    /// assert_eq!(draft.table, "supplier_address");
    /// assert_eq!(draft.operation, "");
    /// assert_eq!(draft.filter, json!({}));
    /// ```
    pub fn from_json(body: &Value) -> Result<Self, WorkflowError> {
        let object = as_object(body)?;

        Ok(Self {
            domain: string_field(object, "domain")?,
            table: string_field(object, "table")?,
            operation: string_field(object, "operation")?,
            filter: payload_field(object, "filter")?,
            proposed_changes: payload_field(object, "proposed_changes")?,
        })
    }
}

/// Read the optional `customer_id` of a creation body.
///
/// # Errors
///
/// Returns [`WorkflowError::Serialization`] if the body is not an object or
/// `customer_id` is not a string.
pub fn customer_id_from_json(body: &Value) -> Result<String, WorkflowError> {
    string_field(as_object(body)?, "customer_id")
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, WorkflowError> {
    body.as_object().ok_or_else(|| {
        WorkflowError::Serialization("change request body must be a JSON object".to_string())
    })
}

fn string_field(object: &Map<String, Value>, name: &str) -> Result<String, WorkflowError> {
    match object.get(name) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) if s.contains('\0') => Err(nul_in(name)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(WorkflowError::Serialization(format!(
            "field `{name}` must be a string"
        ))),
    }
}

fn payload_field(object: &Map<String, Value>, name: &str) -> Result<Value, WorkflowError> {
    match object.get(name) {
        None | Some(Value::Null) => Ok(empty_object()),
        Some(value) if contains_nul(value) => Err(nul_in(name)),
        Some(value) => Ok(value.clone()),
    }
}

/// `\u0000` is valid JSON but cannot be stored in Postgres `TEXT` or `JSONB`.
fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.contains('\0') || contains_nul(value)),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

fn nul_in(name: &str) -> WorkflowError {
    WorkflowError::Serialization(format!("field `{name}` must not contain NUL characters"))
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}
