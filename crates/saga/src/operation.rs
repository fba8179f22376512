//! The operation log: applied mutations paired with their inverses.
//!
//! Every mutating store call the saga makes is recorded as an [`Operation`].
//! The inverse is not guessed at rollback time; it is derived statically from
//! the operation's shape the moment the operation is recorded:
//!
//! - insert  → delete the inserted document
//! - update  → restore the pre-image fetched immediately before the update
//! - delete  → re-insert the deleted documents
//!
//! Both unions are closed; there is no string-keyed dispatch on collection
//! names anywhere in the compensation path.

use serde::{Deserialize, Serialize};

use payrun_store::{Collection, Document, Match, StoreClient, StoreError};

/// Kind of a recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

/// A single mutating call already issued against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// A document was inserted; `key` identifies it for the compensating delete.
    Insert { collection: Collection, key: Match },
    /// Matching documents were updated. `matches` is the identity condition
    /// (stable under the update itself), `prior` the pre-image fetched
    /// immediately before the call.
    Update {
        collection: Collection,
        matches: Match,
        changes: Document,
        prior: Document,
    },
    /// Matching documents were deleted; `prior` holds them for re-insertion.
    Delete {
        collection: Collection,
        matches: Match,
        prior: Vec<Document>,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Insert { .. } => OperationKind::Insert,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            Operation::Insert { collection, .. }
            | Operation::Update { collection, .. }
            | Operation::Delete { collection, .. } => *collection,
        }
    }

    /// Derive the compensating operation for this mutation.
    pub fn compensation(&self) -> Compensation {
        match self {
            Operation::Insert { collection, key } => Compensation::Delete {
                collection: *collection,
                matches: key.clone(),
            },
            Operation::Update {
                collection,
                matches,
                prior,
                ..
            } => Compensation::Restore {
                collection: *collection,
                matches: matches.clone(),
                prior: prior.clone(),
            },
            Operation::Delete {
                collection, prior, ..
            } => Compensation::Reinsert {
                collection: *collection,
                documents: prior.clone(),
            },
        }
    }
}

/// The inverse of a previously applied operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Undo an insert by deleting the inserted document.
    Delete { collection: Collection, matches: Match },
    /// Undo an update by writing the pre-image back over the document.
    Restore {
        collection: Collection,
        matches: Match,
        prior: Document,
    },
    /// Undo a delete by re-inserting the deleted documents.
    Reinsert {
        collection: Collection,
        documents: Vec<Document>,
    },
}

impl Compensation {
    /// Apply this compensation against the store.
    ///
    /// A delete that finds nothing is a success (the target state is already
    /// reached); a restore that matches nothing is a failure, since the
    /// document the pre-image belongs to has gone missing.
    pub async fn apply<S: StoreClient>(&self, store: &S) -> Result<(), StoreError> {
        match self {
            Compensation::Delete {
                collection,
                matches,
            } => {
                store.delete(*collection, matches).await?;
                Ok(())
            }
            Compensation::Restore {
                collection,
                matches,
                prior,
            } => {
                let touched = store.update(*collection, matches, prior.clone()).await?;
                if touched == 0 {
                    return Err(StoreError::Backend(format!(
                        "restore matched no documents in {collection} ({matches})"
                    )));
                }
                Ok(())
            }
            Compensation::Reinsert {
                collection,
                documents,
            } => {
                for doc in documents {
                    store.insert(*collection, doc.clone()).await?;
                }
                Ok(())
            }
        }
    }

    /// Short human description for rollback reports.
    pub fn describe(&self) -> String {
        match self {
            Compensation::Delete {
                collection,
                matches,
            } => format!("delete {collection} where {matches}"),
            Compensation::Restore {
                collection,
                matches,
                ..
            } => format!("restore {collection} where {matches}"),
            Compensation::Reinsert {
                collection,
                documents,
            } => format!("reinsert {} document(s) into {collection}", documents.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_inverts_to_delete_on_the_same_key() {
        let key = Match::new().field("id", "v1");
        let op = Operation::Insert {
            collection: Collection::Vouchers,
            key: key.clone(),
        };
        assert_eq!(
            op.compensation(),
            Compensation::Delete {
                collection: Collection::Vouchers,
                matches: key,
            }
        );
    }

    #[test]
    fn update_inverts_to_restore_of_the_pre_image() {
        let matches = Match::new().field("id", "p1");
        let prior = json!({"id": "p1", "state": "draft"});
        let op = Operation::Update {
            collection: Collection::Periods,
            matches: matches.clone(),
            changes: json!({"state": "processing"}),
            prior: prior.clone(),
        };
        assert_eq!(
            op.compensation(),
            Compensation::Restore {
                collection: Collection::Periods,
                matches,
                prior,
            }
        );
    }

    #[test]
    fn delete_inverts_to_reinsert_of_prior_documents() {
        let prior = vec![json!({"id": "r1"}), json!({"id": "r2"})];
        let op = Operation::Delete {
            collection: Collection::PayrollRecords,
            matches: Match::new().field("period_id", "p1"),
            prior: prior.clone(),
        };
        assert_eq!(
            op.compensation(),
            Compensation::Reinsert {
                collection: Collection::PayrollRecords,
                documents: prior,
            }
        );
    }
}
