use cemtex_batch_lib::{
    default_extractor, process_batch, write_aba, BatchContext, Document, DuplicateLedger,
    MemoryStore, Originator, RECORD_WIDTH,
};
use chrono::NaiveDate;
use eyre::Context;
use glob::glob;
use std::path::Path;

fn context() -> BatchContext {
    BatchContext {
        originator: Originator::new("TT Accountancy P", "063-245", "10758330", "301500"),
        processing_date: NaiveDate::from_ymd_opt(2025, 7, 28).unwrap(),
        dry_run: false,
    }
}

fn load_documents(case: &Path) -> Vec<Document> {
    let mut paths = glob(&format!("{}/*.txt", case.display()))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
            Document::new(file_name, std::fs::read(&path).unwrap())
        })
        .collect()
}

#[test]
fn run_test_files() {
    let expected_files = glob("tests/test-cases/*/expected.aba")
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(!expected_files.is_empty(), "no test cases found");

    for expected_path in expected_files {
        let case = expected_path.parent().unwrap();
        let documents = load_documents(case);
        let expected = std::fs::read(&expected_path).unwrap();
        let ledger = DuplicateLedger::new(MemoryStore::default());

        let report = process_batch(&documents, &context(), &default_extractor(), &ledger)
            .with_context(|| format!("Failed to process case {case:?}"))
            .unwrap();
        let file = report.file.expect("every test case produces a file");

        let mut actual = Vec::new();
        write_aba(&file, &mut actual).unwrap();

        assert!(
            file.lines().all(|line| line.len() == RECORD_WIDTH),
            "{case:?} produced a record of the wrong width"
        );
        assert_eq!(
            String::from_utf8_lossy(&actual),
            String::from_utf8_lossy(&expected),
            "The documents in {case:?} didn't produce the expected file"
        );
        assert_eq!(
            ledger.entries().unwrap().len(),
            report.included.len(),
            "every included statement should be recorded"
        );
    }
}

#[test]
fn fallback_case_reports_what_was_left_out() {
    let documents = load_documents(Path::new("tests/test-cases/fallback-references"));
    let ledger = DuplicateLedger::new(MemoryStore::default());
    let report = process_batch(&documents, &context(), &default_extractor(), &ledger).unwrap();

    let rejected = report
        .rejected
        .iter()
        .map(|r| r.statement.file_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(rejected, vec!["03-barcode-copy.txt", "04-blank.txt"]);
    assert_eq!(
        report.file.unwrap().file_name,
        "ASIC_Batch_2companies_20250728.ABA"
    );
}

#[test]
fn rerunning_a_case_generates_nothing() {
    let documents = load_documents(Path::new("tests/test-cases/three-companies"));
    let ledger = DuplicateLedger::new(MemoryStore::default());

    let first = process_batch(&documents, &context(), &default_extractor(), &ledger).unwrap();
    assert_eq!(first.recorded.len(), 3);

    let second = process_batch(&documents, &context(), &default_extractor(), &ledger).unwrap();
    assert!(second.file.is_none());
    assert_eq!(second.skipped.len(), 3);
    assert!(second.recorded.is_empty());
}
