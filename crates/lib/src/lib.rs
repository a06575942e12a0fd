mod amount;
mod batch;
mod error;
mod extract;
mod ledger;
mod parser;
mod record;
mod sqlite;
mod statement;
mod writer;

use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub use amount::*;
pub use batch::*;
pub use error::Error;
pub use extract::*;
pub use ledger::*;
pub use parser::{first_match, parse_statement, Strategy, DEFAULT_AMOUNT, UNKNOWN_COMPANY};
pub use record::*;
pub use sqlite::SqliteStore;
pub use statement::*;
pub use writer::{write_aba, write_ledger_csv, write_skipped_csv};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchContext {
    pub originator: Originator,
    pub processing_date: NaiveDate,
    /// Classify and assemble without writing anything to the ledger.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub file_name: String,
    pub error: ExtractError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedStatement {
    pub statement: Statement,
    pub matches: Vec<DuplicateMatch>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("No amount found in the document")]
    AmountNotFound,
    #[error(transparent)]
    UntrustedAmount(#[from] AmountError),
    #[error("{kind} of `{first_file}` in the same batch")]
    RepeatedInBatch {
        kind: DuplicateKind,
        first_file: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedStatement {
    pub statement: Statement,
    pub reason: RejectReason,
}

/// Another batch recorded this statement first, so it is not in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordConflict {
    pub file_name: String,
    pub kind: DuplicateKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_id: Option<Uuid>,
    pub file: Option<AbaFile>,
    pub included: Vec<Statement>,
    pub recorded: Vec<LedgerEntry>,
    pub skipped: Vec<SkippedStatement>,
    pub rejected: Vec<RejectedStatement>,
    pub extraction_failures: Vec<ExtractionFailure>,
    pub conflicts: Vec<RecordConflict>,
}

fn check_new_statement(
    statement: &Statement,
    seen_hashes: &HashMap<ContentHash, String>,
    seen_references: &HashMap<(String, String), String>,
) -> Result<(), RejectReason> {
    if statement.is_degraded(StatementField::Amount) {
        return Err(RejectReason::AmountNotFound);
    }
    parse_minor_units(&statement.amount)?;

    if let Some(first_file) = seen_hashes.get(&statement.content_hash) {
        return Err(RejectReason::RepeatedInBatch {
            kind: DuplicateKind::ByContent,
            first_file: first_file.clone(),
        });
    }
    if let Some((payer, payment)) = statement.reference_pair() {
        if let Some(first_file) = seen_references.get(&(payer.to_string(), payment.to_string())) {
            return Err(RejectReason::RepeatedInBatch {
                kind: DuplicateKind::ByReference,
                first_file: first_file.clone(),
            });
        }
    }
    Ok(())
}

/// Runs one encode request end to end: extract and parse every document,
/// drop the ones the ledger has already paid, record the rest and assemble the
/// file from whatever was recorded.
///
/// Only an invalid originator or a failing ledger store aborts the request;
/// every per-document problem ends up in the returned [`BatchReport`].
pub fn process_batch<E: TextExtractor, S: LedgerStore>(
    documents: &[Document],
    context: &BatchContext,
    extractor: &E,
    ledger: &DuplicateLedger<S>,
) -> Result<BatchReport, Error> {
    context.originator.validate()?;

    let parsed = documents
        .par_iter()
        .map(|doc| {
            extractor
                .extract(&doc.bytes)
                .map(|text| parse_statement(&text, doc.content_hash(), doc.file_name.clone()))
                .map_err(|error| ExtractionFailure {
                    file_name: doc.file_name.clone(),
                    error,
                })
        })
        .collect::<Vec<_>>();

    let mut report = BatchReport::default();
    let mut seen_hashes = HashMap::new();
    let mut seen_references = HashMap::new();

    for result in parsed {
        let statement = match result {
            Ok(statement) => statement,
            Err(failure) => {
                warn!(file = %failure.file_name, error = %failure.error, "could not extract text");
                report.extraction_failures.push(failure);
                continue;
            }
        };

        if let Classification::Duplicate(matches) = ledger.classify(&statement)? {
            warn!(
                file = %statement.file_name,
                prior = %matches[0].prior.source_file,
                "skipping statement that was already paid"
            );
            report.skipped.push(SkippedStatement { statement, matches });
            continue;
        }

        if let Err(reason) = check_new_statement(&statement, &seen_hashes, &seen_references) {
            warn!(file = %statement.file_name, %reason, "rejecting statement");
            report.rejected.push(RejectedStatement { statement, reason });
            continue;
        }

        seen_hashes.insert(statement.content_hash.clone(), statement.file_name.clone());
        if let Some((payer, payment)) = statement.reference_pair() {
            seen_references.insert(
                (payer.to_string(), payment.to_string()),
                statement.file_name.clone(),
            );
        }
        report.included.push(statement);
    }

    if report.included.is_empty() {
        info!(
            documents = documents.len(),
            "nothing left to pay, no file generated"
        );
        return Ok(report);
    }

    // Overflow in the full set aborts before anything is recorded.
    let mut file = assemble(
        &report.included,
        &context.originator,
        context.processing_date,
    )?;

    if !context.dry_run {
        let batch_id = Uuid::new_v4();
        let candidates = std::mem::take(&mut report.included);
        for statement in candidates {
            match ledger.record(&statement, batch_id, &file.file_name) {
                Ok(entry) => {
                    report.recorded.push(entry);
                    report.included.push(statement);
                }
                Err(RecordError::Conflict(kind)) => report.conflicts.push(RecordConflict {
                    file_name: statement.file_name.clone(),
                    kind,
                }),
                Err(RecordError::Store(e)) => return Err(e.into()),
            }
        }

        if report.included.is_empty() {
            warn!(
                conflicts = report.conflicts.len(),
                "every statement was recorded by another batch, no file generated"
            );
            return Ok(report);
        }

        // The file may only pay what this batch recorded.
        if !report.conflicts.is_empty() {
            file = assemble(
                &report.included,
                &context.originator,
                context.processing_date,
            )?;
            ledger.relabel_batch(batch_id, &file.file_name)?;
            for entry in &mut report.recorded {
                entry.generated_file = file.file_name.clone();
            }
        }
        report.batch_id = Some(batch_id);
    }

    info!(
        file_name = %file.file_name,
        included = report.included.len(),
        skipped = report.skipped.len(),
        rejected = report.rejected.len(),
        failed = report.extraction_failures.len(),
        conflicts = report.conflicts.len(),
        "batch complete"
    );
    report.file = Some(file);
    Ok(report)
}
