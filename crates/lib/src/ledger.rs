use crate::statement::{ContentHash, Statement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("Ledger store lock was poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Statement already recorded ({0})")]
    Conflict(DuplicateKind),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
pub enum DuplicateKind {
    #[strum(serialize = "duplicate by content")]
    ByContent,
    #[strum(serialize = "duplicate by reference")]
    ByReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub company_name: String,
    pub registration_number: String,
    pub payer_reference: String,
    pub payment_reference: String,
    pub amount: String,
    pub content_hash: ContentHash,
    pub source_file: String,
    pub generated_file: String,
    pub batch_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        statement: &Statement,
        batch_id: Uuid,
        generated_file: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            company_name: statement.company_name.clone(),
            registration_number: statement.registration_number.clone(),
            payer_reference: statement.payer_reference.clone(),
            payment_reference: statement.payment_reference.clone(),
            amount: statement.amount.clone(),
            content_hash: statement.content_hash.clone(),
            source_file: statement.file_name.clone(),
            generated_file: generated_file.into(),
            batch_id,
            recorded_at,
        }
    }

    pub fn reference_pair(&self) -> Option<(&str, &str)> {
        if self.payer_reference.is_empty() || self.payment_reference.is_empty() {
            None
        } else {
            Some((&self.payer_reference, &self.payment_reference))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub kind: DuplicateKind,
    pub prior: LedgerEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    New,
    /// Every rule the statement collides with, content match first.
    Duplicate(Vec<DuplicateMatch>),
}

impl Classification {
    pub fn is_new(&self) -> bool {
        matches!(self, Classification::New)
    }

    pub fn kinds(&self) -> Vec<DuplicateKind> {
        match self {
            Classification::New => Vec::new(),
            Classification::Duplicate(matches) => matches.iter().map(|m| m.kind).collect(),
        }
    }
}

/// `insert` must reject an existing content hash or reference pair atomically.
pub trait LedgerStore {
    fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<LedgerEntry>, StoreError>;

    fn find_by_reference(
        &self,
        payer_reference: &str,
        payment_reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    fn insert(&self, entry: &LedgerEntry) -> Result<(), RecordError>;

    /// Points every entry of `batch_id` at a different generated file.
    fn relabel_batch(&self, batch_id: Uuid, generated_file: &str) -> Result<(), StoreError>;

    /// All entries in insertion order.
    fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError>;
}

#[derive(Default, Debug)]
struct MemoryState {
    entries: Vec<LedgerEntry>,
    by_hash: HashMap<ContentHash, usize>,
    by_reference: HashMap<(String, String), usize>,
}

#[derive(Default, Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T, StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut state))
    }
}

impl LedgerStore for MemoryStore {
    fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<LedgerEntry>, StoreError> {
        self.with_state(|state| {
            state
                .by_hash
                .get(hash)
                .map(|idx| state.entries[*idx].clone())
        })
    }

    fn find_by_reference(
        &self,
        payer_reference: &str,
        payment_reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let key = (payer_reference.to_string(), payment_reference.to_string());
        self.with_state(|state| {
            state
                .by_reference
                .get(&key)
                .map(|idx| state.entries[*idx].clone())
        })
    }

    fn insert(&self, entry: &LedgerEntry) -> Result<(), RecordError> {
        self.with_state(|state| {
            if state.by_hash.contains_key(&entry.content_hash) {
                return Err(RecordError::Conflict(DuplicateKind::ByContent));
            }
            let reference = entry
                .reference_pair()
                .map(|(payer, payment)| (payer.to_string(), payment.to_string()));
            if let Some(key) = &reference {
                if state.by_reference.contains_key(key) {
                    return Err(RecordError::Conflict(DuplicateKind::ByReference));
                }
            }

            let idx = state.entries.len();
            state.by_hash.insert(entry.content_hash.clone(), idx);
            if let Some(key) = reference {
                state.by_reference.insert(key, idx);
            }
            state.entries.push(entry.clone());
            Ok(())
        })?
    }

    fn relabel_batch(&self, batch_id: Uuid, generated_file: &str) -> Result<(), StoreError> {
        self.with_state(|state| {
            state
                .entries
                .iter_mut()
                .filter(|entry| entry.batch_id == batch_id)
                .for_each(|entry| entry.generated_file = generated_file.to_string())
        })
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.with_state(|state| state.entries.clone())
    }
}

/// Decides which statements have already been paid and remembers the ones
/// that go into a file.
#[derive(Default, Debug)]
pub struct DuplicateLedger<S> {
    store: S,
}

impl<S: LedgerStore> DuplicateLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn classify(&self, statement: &Statement) -> Result<Classification, StoreError> {
        let mut matches = Vec::new();

        if let Some(prior) = self.store.find_by_hash(&statement.content_hash)? {
            matches.push(DuplicateMatch {
                kind: DuplicateKind::ByContent,
                prior,
            });
        }
        if let Some((payer, payment)) = statement.reference_pair() {
            if let Some(prior) = self.store.find_by_reference(payer, payment)? {
                matches.push(DuplicateMatch {
                    kind: DuplicateKind::ByReference,
                    prior,
                });
            }
        }

        if matches.is_empty() {
            debug!(file = %statement.file_name, "statement is new");
            Ok(Classification::New)
        } else {
            Ok(Classification::Duplicate(matches))
        }
    }

    /// Persists the statement. A conflict means another batch got there first;
    /// callers should report it and carry on with the remaining statements.
    pub fn record(
        &self,
        statement: &Statement,
        batch_id: Uuid,
        generated_file: &str,
    ) -> Result<LedgerEntry, RecordError> {
        let entry = LedgerEntry::new(statement, batch_id, generated_file, Utc::now());
        match self.store.insert(&entry) {
            Ok(()) => Ok(entry),
            Err(RecordError::Conflict(kind)) => {
                warn!(file = %statement.file_name, %kind, "statement already recorded");
                Err(RecordError::Conflict(kind))
            }
            Err(e) => Err(e),
        }
    }

    pub fn relabel_batch(&self, batch_id: Uuid, generated_file: &str) -> Result<(), StoreError> {
        self.store.relabel_batch(batch_id, generated_file)
    }

    pub fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.store.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(bytes: &str, payer: &str, payment: &str) -> Statement {
        Statement {
            company_name: "ZYH PTY LTD".to_string(),
            registration_number: "612433502".to_string(),
            amount: "321.00".to_string(),
            payer_reference: payer.to_string(),
            payment_reference: payment.to_string(),
            content_hash: ContentHash::of(bytes.as_bytes()),
            file_name: format!("{bytes}.pdf"),
            degraded: Vec::new(),
        }
    }

    #[test]
    fn resubmitting_identical_content_is_a_content_duplicate() {
        let ledger = DuplicateLedger::new(MemoryStore::default());
        let first = statement("scan", "4X9702542480BA", "2296124335029");

        assert_eq!(ledger.classify(&first).unwrap(), Classification::New);
        ledger.record(&first, Uuid::new_v4(), "batch.ABA").unwrap();

        let again = statement("scan", "", "");
        assert_eq!(
            ledger.classify(&again).unwrap().kinds(),
            vec![DuplicateKind::ByContent]
        );
    }

    #[test]
    fn rescanned_notice_is_a_reference_duplicate() {
        let ledger = DuplicateLedger::new(MemoryStore::default());
        let batch_id = Uuid::new_v4();
        let original = statement("scan-1", "4X9702542480BA", "2296124335029");
        ledger.record(&original, batch_id, "batch.ABA").unwrap();

        let rescan = statement("scan-2", "4X9702542480BA", "2296124335029");
        match ledger.classify(&rescan).unwrap() {
            Classification::Duplicate(matches) => {
                assert_eq!(matches.len(), 1);
                assert_eq!(matches[0].kind, DuplicateKind::ByReference);
                assert_eq!(matches[0].prior.source_file, "scan-1.pdf");
                assert_eq!(matches[0].prior.batch_id, batch_id);
            }
            Classification::New => panic!("rescan should be a duplicate"),
        }
    }

    #[test]
    fn both_matches_are_reported() {
        let ledger = DuplicateLedger::new(MemoryStore::default());
        let first = statement("scan", "4X9702542480BA", "2296124335029");
        ledger.record(&first, Uuid::new_v4(), "batch.ABA").unwrap();

        assert_eq!(
            ledger.classify(&first).unwrap().kinds(),
            vec![DuplicateKind::ByContent, DuplicateKind::ByReference]
        );
    }

    #[test]
    fn conflicting_record_is_rejected_without_writing() {
        let ledger = DuplicateLedger::new(MemoryStore::default());
        let first = statement("scan-1", "4X9702542480BA", "2296124335029");
        ledger.record(&first, Uuid::new_v4(), "a.ABA").unwrap();

        let same_bytes = statement("scan-1", "OTHER", "1");
        assert!(matches!(
            ledger.record(&same_bytes, Uuid::new_v4(), "b.ABA"),
            Err(RecordError::Conflict(DuplicateKind::ByContent))
        ));

        let same_refs = statement("scan-2", "4X9702542480BA", "2296124335029");
        assert!(matches!(
            ledger.record(&same_refs, Uuid::new_v4(), "b.ABA"),
            Err(RecordError::Conflict(DuplicateKind::ByReference))
        ));

        assert_eq!(ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn empty_references_never_collide() {
        let ledger = DuplicateLedger::new(MemoryStore::default());
        ledger
            .record(&statement("a", "", ""), Uuid::new_v4(), "a.ABA")
            .unwrap();
        ledger
            .record(&statement("b", "", ""), Uuid::new_v4(), "a.ABA")
            .unwrap();

        assert!(ledger.classify(&statement("c", "", "")).unwrap().is_new());
        assert_eq!(ledger.entries().unwrap().len(), 2);
    }

    #[test]
    fn relabel_only_touches_its_own_batch() {
        let ledger = DuplicateLedger::new(MemoryStore::default());
        let batch_a = Uuid::new_v4();
        let batch_b = Uuid::new_v4();
        ledger
            .record(&statement("a", "P1", "1"), batch_a, "ASIC_Batch_2companies.ABA")
            .unwrap();
        ledger
            .record(&statement("b", "P2", "2"), batch_b, "other.ABA")
            .unwrap();

        ledger
            .relabel_batch(batch_a, "ASIC_Batch_1companies.ABA")
            .unwrap();

        let files = ledger
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.generated_file)
            .collect::<Vec<_>>();
        assert_eq!(files, vec!["ASIC_Batch_1companies.ABA", "other.ABA"]);
    }
}
