use crate::ledger::{DuplicateKind, LedgerEntry, LedgerStore, RecordError, StoreError};
use crate::statement::ContentHash;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str = "SELECT company_name, registration_number, payer_reference,
        payment_reference, amount, content_hash, source_file, generated_file, batch_id,
        recorded_at
     FROM ledger_entries";

/// Ledger store backed by a SQLite file. The table's `UNIQUE` constraints are
/// what rejects a second writer, so several processes may share one file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Opens (creating if needed) the ledger database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self {
            db_path: db_path.as_ref().to_path_buf(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn init_db(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_name TEXT NOT NULL,
                registration_number TEXT NOT NULL,
                payer_reference TEXT,
                payment_reference TEXT,
                amount TEXT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                source_file TEXT NOT NULL,
                generated_file TEXT NOT NULL,
                batch_id BLOB NOT NULL,
                recorded_at TEXT NOT NULL,
                UNIQUE (payer_reference, payment_reference)
            )",
            [],
        )?;
        info!(path = %self.db_path.display(), "ledger database ready");
        Ok(())
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        company_name: row.get(0)?,
        registration_number: row.get(1)?,
        payer_reference: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        payment_reference: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        amount: row.get(4)?,
        content_hash: ContentHash::from_hex(row.get::<_, String>(5)?),
        source_file: row.get(6)?,
        generated_file: row.get(7)?,
        batch_id: row.get(8)?,
        recorded_at: row.get(9)?,
    })
}

/// Maps a `UNIQUE` violation onto the rule it broke. Any other failure,
/// including other constraint kinds, is left for the caller as a store error.
fn conflict_kind(error: &rusqlite::Error) -> Option<DuplicateKind> {
    match error {
        rusqlite::Error::SqliteFailure(e, Some(message))
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            if message.contains("content_hash") {
                Some(DuplicateKind::ByContent)
            } else if message.contains("payer_reference") {
                Some(DuplicateKind::ByReference)
            } else {
                None
            }
        }
        _ => None,
    }
}

#[inline]
fn nullable(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

impl LedgerStore for SqliteStore {
    fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<LedgerEntry>, StoreError> {
        let conn = self.connect()?;
        let entry = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE content_hash = ?1"),
                params![hash.as_str()],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn find_by_reference(
        &self,
        payer_reference: &str,
        payment_reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let conn = self.connect()?;
        let entry = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE payer_reference = ?1 AND payment_reference = ?2"),
                params![payer_reference, payment_reference],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn insert(&self, entry: &LedgerEntry) -> Result<(), RecordError> {
        let conn = self.connect()?;
        let result = conn.execute(
            "INSERT INTO ledger_entries (company_name, registration_number, payer_reference,
                payment_reference, amount, content_hash, source_file, generated_file, batch_id,
                recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.company_name,
                entry.registration_number,
                nullable(&entry.payer_reference),
                nullable(&entry.payment_reference),
                entry.amount,
                entry.content_hash.as_str(),
                entry.source_file,
                entry.generated_file,
                entry.batch_id,
                entry.recorded_at,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) => match conflict_kind(&e) {
                Some(kind) => Err(RecordError::Conflict(kind)),
                None => Err(RecordError::Store(e.into())),
            },
        }
    }

    fn relabel_batch(&self, batch_id: Uuid, generated_file: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE ledger_entries SET generated_file = ?1 WHERE batch_id = ?2",
            params![generated_file, batch_id],
        )?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
