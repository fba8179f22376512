//! Store client contract and its supporting value types.
//!
//! The remote store is a plain document store: create/read/update/delete by
//! match conditions, plus one opaque RPC for payroll arithmetic. Calls fail
//! independently; none is atomic. Documents travel as JSON values and are
//! (de)serialized into typed entities at this boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use payrun_core::{CompanyId, EmployeeId, PayrollRecordId, PeriodId, VoucherId};
use payrun_payroll::{Adjustment, Calculation, PeriodState, PeriodType, RecordState};

/// A store document. Always object-shaped for the collections in this system.
pub type Document = JsonValue;

/// The closed set of collections this subsystem touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Periods,
    PayrollRecords,
    Vouchers,
    AuditLog,
}

impl Collection {
    /// Stable collection name used by the backing store and in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Periods => "payroll_periods",
            Collection::PayrollRecords => "payroll_records",
            Collection::Vouchers => "payment_vouchers",
            Collection::AuditLog => "audit_log",
        }
    }
}

impl core::fmt::Display for Collection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// A value a match condition compares against.
///
/// Closed union so callers never hand-roll JSON for filters; identifiers and
/// state enums convert via `From`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// Matches a field that is JSON null or absent.
    Null,
}

impl MatchValue {
    /// Compare against a document field (absent field counts as null).
    fn matches(&self, field: Option<&JsonValue>) -> bool {
        match (self, field) {
            (MatchValue::Null, None) | (MatchValue::Null, Some(JsonValue::Null)) => true,
            (MatchValue::Str(s), Some(JsonValue::String(v))) => s == v,
            (MatchValue::Int(i), Some(JsonValue::Number(n))) => n.as_i64() == Some(*i),
            (MatchValue::Bool(b), Some(JsonValue::Bool(v))) => b == v,
            _ => false,
        }
    }

    /// JSON rendering of the condition value (for adapters and logging).
    pub fn to_json(&self) -> JsonValue {
        match self {
            MatchValue::Str(s) => JsonValue::String(s.clone()),
            MatchValue::Int(i) => JsonValue::from(*i),
            MatchValue::Bool(b) => JsonValue::Bool(*b),
            MatchValue::Null => JsonValue::Null,
        }
    }
}

impl From<&str> for MatchValue {
    fn from(value: &str) -> Self {
        MatchValue::Str(value.to_string())
    }
}

impl From<String> for MatchValue {
    fn from(value: String) -> Self {
        MatchValue::Str(value)
    }
}

impl From<i64> for MatchValue {
    fn from(value: i64) -> Self {
        MatchValue::Int(value)
    }
}

impl From<bool> for MatchValue {
    fn from(value: bool) -> Self {
        MatchValue::Bool(value)
    }
}

impl From<Uuid> for MatchValue {
    fn from(value: Uuid) -> Self {
        MatchValue::Str(value.to_string())
    }
}

macro_rules! impl_match_value_id {
    ($($t:ty),+ $(,)?) => {
        $(impl From<$t> for MatchValue {
            fn from(value: $t) -> Self {
                MatchValue::Str(value.to_string())
            }
        })+
    };
}

impl_match_value_id!(CompanyId, PeriodId, EmployeeId, PayrollRecordId, VoucherId);

impl From<PeriodState> for MatchValue {
    fn from(value: PeriodState) -> Self {
        MatchValue::Str(value.as_str().to_string())
    }
}

impl From<RecordState> for MatchValue {
    fn from(value: RecordState) -> Self {
        MatchValue::Str(value.as_str().to_string())
    }
}

/// Conjunction of field = value conditions over top-level document fields.
///
/// Deterministic iteration order (sorted by field name) so the same match
/// renders the same way everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    conditions: BTreeMap<String, MatchValue>,
}

impl Match {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn field(mut self, field: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    /// Require `field` to be null or absent.
    pub fn null(mut self, field: impl Into<String>) -> Self {
        self.conditions.insert(field.into(), MatchValue::Null);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &MatchValue)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether a document satisfies every condition.
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| value.matches(doc.get(field)))
    }
}

impl core::fmt::Display for Match {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for (field, value) in self.conditions() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{field}={}", value.to_json())?;
            first = false;
        }
        Ok(())
    }
}

/// Store operation error.
///
/// Infrastructure failures only; domain decisions (preconditions, invariants)
/// are made above this boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backend rejected or failed the call (network, remote error, ...).
    #[error("store backend failure: {0}")]
    Backend(String),

    /// A document could not be (de)serialized at the boundary.
    #[error("document codec failure: {0}")]
    Codec(String),

    /// A read that required a document found none.
    #[error("no document matched in {0}")]
    NotFound(Collection),
}

/// Serialize a typed entity into a store document.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Codec(e.to_string()))
}

/// Deserialize a store document into a typed entity.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(|e| StoreError::Codec(e.to_string()))
}

/// The only I/O boundary of this subsystem.
///
/// ## Semantics implementations must provide
///
/// - `insert` stores the document and echoes it back.
/// - `update` shallow-merges `changes` into every matching document and
///   returns the matched count. That count is the compare-and-swap primitive:
///   conditional state transitions include the expected state in the match and
///   check `count == 1`.
/// - `delete` removes matching documents, returning the removed count.
/// - `query` returns matching documents (empty vector when none match).
/// - `compute_payroll` is an opaque remote computation; the arithmetic is
///   never reimplemented on this side.
///
/// Calls may be slow and may fail mid-flight; callers own compensation.
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync {
    async fn insert(&self, collection: Collection, document: Document)
        -> Result<Document, StoreError>;

    async fn update(
        &self,
        collection: Collection,
        matches: &Match,
        changes: Document,
    ) -> Result<u64, StoreError>;

    async fn delete(&self, collection: Collection, matches: &Match) -> Result<u64, StoreError>;

    async fn query(
        &self,
        collection: Collection,
        matches: &Match,
    ) -> Result<Vec<Document>, StoreError>;

    async fn compute_payroll(
        &self,
        employee_id: EmployeeId,
        base_salary: i64,
        period_type: PeriodType,
        adjustments: &[Adjustment],
    ) -> Result<Calculation, StoreError>;
}

#[async_trait::async_trait]
impl<S> StoreClient for Arc<S>
where
    S: StoreClient + ?Sized,
{
    async fn insert(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<Document, StoreError> {
        (**self).insert(collection, document).await
    }

    async fn update(
        &self,
        collection: Collection,
        matches: &Match,
        changes: Document,
    ) -> Result<u64, StoreError> {
        (**self).update(collection, matches, changes).await
    }

    async fn delete(&self, collection: Collection, matches: &Match) -> Result<u64, StoreError> {
        (**self).delete(collection, matches).await
    }

    async fn query(
        &self,
        collection: Collection,
        matches: &Match,
    ) -> Result<Vec<Document>, StoreError> {
        (**self).query(collection, matches).await
    }

    async fn compute_payroll(
        &self,
        employee_id: EmployeeId,
        base_salary: i64,
        period_type: PeriodType,
        adjustments: &[Adjustment],
    ) -> Result<Calculation, StoreError> {
        (**self)
            .compute_payroll(employee_id, base_salary, period_type, adjustments)
            .await
    }
}
