use crate::batch::AbaFile;
use crate::ledger::LedgerEntry;
use crate::SkippedStatement;
use chrono::SecondsFormat;
use csv::WriterBuilder;
use std::io::Write;
use uuid::Uuid;

/// Writes the file exactly as assembled, CRLF line endings included.
pub fn write_aba<W: Write>(file: &AbaFile, mut writer: W) -> Result<(), std::io::Error> {
    writer.write_all(file.content.as_bytes())?;
    writer.flush()
}

pub fn write_ledger_csv<W: Write>(entries: &[LedgerEntry], writer: W) -> Result<(), csv::Error> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record([
        "recorded_at",
        "batch_id",
        "generated_file",
        "source_file",
        "company_name",
        "registration_number",
        "payer_reference",
        "payment_reference",
        "amount",
        "content_hash",
    ])?;

    let mut batch_buf = Uuid::encode_buffer();
    for entry in entries {
        let recorded_at = entry.recorded_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let record: [&str; 10] = [
            &recorded_at,
            entry.batch_id.hyphenated().encode_lower(&mut batch_buf),
            &entry.generated_file,
            &entry.source_file,
            &entry.company_name,
            &entry.registration_number,
            &entry.payer_reference,
            &entry.payment_reference,
            &entry.amount,
            entry.content_hash.as_str(),
        ];
        writer.write_record(record)?;
    }

    writer.flush()?;
    Ok(())
}

/// One row per duplicate match so the operator can see which earlier file and
/// run caused each statement to be left out.
pub fn write_skipped_csv<W: Write>(
    skipped: &[SkippedStatement],
    writer: W,
) -> Result<(), csv::Error> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record([
        "file",
        "company_name",
        "amount",
        "reason",
        "prior_recorded_at",
        "prior_source_file",
        "prior_generated_file",
    ])?;

    for skip in skipped {
        for m in &skip.matches {
            let kind = m.kind.to_string();
            let recorded_at = m.prior.recorded_at.to_rfc3339_opts(SecondsFormat::Secs, true);
            let record: [&str; 7] = [
                &skip.statement.file_name,
                &skip.statement.company_name,
                &skip.statement.amount,
                &kind,
                &recorded_at,
                &m.prior.source_file,
                &m.prior.generated_file,
            ];
            writer.write_record(record)?;
        }
    }

    writer.flush()?;
    Ok(())
}
