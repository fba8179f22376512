//! In-memory store client.
//!
//! Intended for tests/dev. Not optimized for performance. The payroll
//! calculator is pluggable so tests can stand in for the remote RPC,
//! including making it fail mid-saga.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value as JsonValue;

use payrun_core::EmployeeId;
use payrun_payroll::{Adjustment, Calculation, PeriodType};

use crate::client::{to_document, Collection, Document, Match, StoreClient, StoreError};

/// Stand-in for the remote payroll arithmetic RPC.
pub type Calculator =
    dyn Fn(EmployeeId, i64, PeriodType, &[Adjustment]) -> Result<Calculation, StoreError>
        + Send
        + Sync;

/// In-memory document store.
pub struct InMemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Document>>>,
    calculator: Box<Calculator>,
}

impl core::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_calculator(default_calculator)
    }

    /// Build a store with a custom payroll calculator.
    pub fn with_calculator<F>(calculator: F) -> Self
    where
        F: Fn(EmployeeId, i64, PeriodType, &[Adjustment]) -> Result<Calculation, StoreError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            collections: RwLock::new(HashMap::new()),
            calculator: Box::new(calculator),
        }
    }

    /// Insert a typed entity synchronously (test/dev seeding).
    pub fn seed<T: Serialize>(&self, collection: Collection, entity: &T) -> Result<(), StoreError> {
        let doc = to_document(entity)?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        collections.entry(collection).or_default().push(doc);
        Ok(())
    }

    /// Snapshot a collection's documents (test introspection).
    pub fn snapshot(&self, collection: Collection) -> Vec<Document> {
        self.collections
            .read()
            .map(|c| c.get(&collection).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

/// Default arithmetic: 4% health + 4% pension over gross.
///
/// Only a development stand-in; production talks to the remote RPC.
fn default_calculator(
    _employee_id: EmployeeId,
    base_salary: i64,
    _period_type: PeriodType,
    adjustments: &[Adjustment],
) -> Result<Calculation, StoreError> {
    let gross: i64 = base_salary + adjustments.iter().map(|a| a.amount).sum::<i64>();
    let health = gross * 4 / 100;
    let pension = gross * 4 / 100;
    Ok(Calculation {
        gross_pay: gross,
        health_deduction: health,
        pension_deduction: pension,
        net_pay: gross - health - pension,
    })
}

#[async_trait::async_trait]
impl StoreClient for InMemoryStore {
    async fn insert(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<Document, StoreError> {
        if !document.is_object() {
            return Err(StoreError::Backend(format!(
                "{collection}: insert requires an object-shaped document"
            )));
        }
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        collections
            .entry(collection)
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn update(
        &self,
        collection: Collection,
        matches: &Match,
        changes: Document,
    ) -> Result<u64, StoreError> {
        let JsonValue::Object(changes) = changes else {
            return Err(StoreError::Backend(format!(
                "{collection}: update requires an object-shaped change set"
            )));
        };
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let docs = collections.entry(collection).or_default();

        let mut touched = 0;
        for doc in docs.iter_mut().filter(|d| matches.matches(d)) {
            if let Some(obj) = doc.as_object_mut() {
                for (field, value) in &changes {
                    obj.insert(field.clone(), value.clone());
                }
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete(&self, collection: Collection, matches: &Match) -> Result<u64, StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let docs = collections.entry(collection).or_default();
        let before = docs.len();
        docs.retain(|d| !matches.matches(d));
        Ok((before - docs.len()) as u64)
    }

    async fn query(
        &self,
        collection: Collection,
        matches: &Match,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches.matches(d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn compute_payroll(
        &self,
        employee_id: EmployeeId,
        base_salary: i64,
        period_type: PeriodType,
        adjustments: &[Adjustment],
    ) -> Result<Calculation, StoreError> {
        (self.calculator)(employee_id, base_salary, period_type, adjustments)
    }
}
