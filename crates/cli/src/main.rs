use cemtex_batch_lib::{
    default_extractor, parse_statement, process_batch, write_aba, write_ledger_csv,
    write_skipped_csv, BatchContext, BatchReport, Document, DuplicateLedger, Originator,
    SqliteStore, TextExtractor, DEFAULT_INSTITUTION,
};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use eyre::{Result, WrapErr};
use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::PathBuf,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Builds ABA bulk-payment files from company statements, skipping anything
/// already paid.
#[derive(Debug, Parser)]
#[command(name = "cemtex-batch", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encode statements into a single balanced ABA file.
    Encode(EncodeArgs),
    /// Print the fields extracted from one statement as JSON.
    Parse { file: PathBuf },
    /// Export the ledger of recorded payments as CSV.
    Ledger {
        #[arg(env = "ABA_LEDGER", default_value = "ledger.db")]
        ledger: PathBuf,
    },
}

#[derive(Debug, Args)]
struct OriginatorArgs {
    /// Account name shown on the file.
    #[arg(long, env = "ABA_NAME", default_value = "")]
    name: String,
    /// Routing code (BSB) of the account being debited.
    #[arg(long, env = "ABA_BSB", default_value = "")]
    bsb: String,
    #[arg(long, env = "ABA_ACCOUNT", default_value = "")]
    account: String,
    /// APCA user id.
    #[arg(long, env = "ABA_USER_ID", default_value = "")]
    user_id: String,
    #[arg(long, env = "ABA_INSTITUTION", default_value = DEFAULT_INSTITUTION)]
    institution: String,
}

impl From<OriginatorArgs> for Originator {
    fn from(args: OriginatorArgs) -> Self {
        Originator {
            name: args.name,
            routing_code: args.bsb,
            account: args.account,
            user_id: args.user_id,
            institution: args.institution,
        }
    }
}

#[derive(Debug, Args)]
struct EncodeArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,
    #[command(flatten)]
    originator: OriginatorArgs,
    /// Processing date (YYYY-MM-DD), defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, env = "ABA_LEDGER", default_value = "ledger.db")]
    ledger: PathBuf,
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    /// Write a CSV listing every skipped duplicate and the entry it matched.
    #[arg(long)]
    skipped_report: Option<PathBuf>,
    /// Classify and build the file without recording anything.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {
        Command::Encode(args) => encode(args),
        Command::Parse { file } => parse(file),
        Command::Ledger { ledger } => export_ledger(ledger),
    }
}

fn read_documents(files: &[PathBuf]) -> Vec<Document> {
    files
        .iter()
        .filter_map(|path| {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            match fs::read(path) {
                Ok(bytes) => Some(Document::new(file_name, bytes)),
                Err(error) => {
                    warn!(file = %path.display(), %error, "could not read document");
                    None
                }
            }
        })
        .collect()
}

fn encode(args: EncodeArgs) -> Result<()> {
    let context = BatchContext {
        originator: args.originator.into(),
        processing_date: args.date.unwrap_or_else(|| Local::now().date_naive()),
        dry_run: args.dry_run,
    };
    let documents = read_documents(&args.files);
    let ledger = DuplicateLedger::new(
        SqliteStore::open(&args.ledger)
            .wrap_err_with(|| format!("Failed to open ledger {:?}", args.ledger))?,
    );

    let report = process_batch(&documents, &context, &default_extractor(), &ledger)?;
    print_report(&report);

    if let Some(path) = &args.skipped_report {
        write_skipped_csv(&report.skipped, BufWriter::new(File::create(path)?))?;
    }

    if let Some(file) = &report.file {
        fs::create_dir_all(&args.out_dir)?;
        let path = args.out_dir.join(&file.file_name);
        write_aba(file, BufWriter::new(File::create(&path)?))
            .wrap_err_with(|| format!("Failed to write {path:?}"))?;
        println!("Wrote {} ({})", path.display(), file.content_type());
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    for statement in &report.included {
        println!(
            "included  {:<28} {:<32} ${:>10} ref {}",
            statement.file_name,
            statement.company_name,
            statement.amount,
            statement.payment_reference
        );
        for field in &statement.degraded {
            println!("          warning: {field} not found");
        }
    }
    for skipped in &report.skipped {
        for m in &skipped.matches {
            println!(
                "skipped   {:<28} {} of {} recorded {} in {}",
                skipped.statement.file_name,
                m.kind,
                m.prior.source_file,
                m.prior.recorded_at.format("%Y-%m-%d %H:%M"),
                m.prior.generated_file
            );
        }
    }
    for rejected in &report.rejected {
        println!(
            "rejected  {:<28} {}",
            rejected.statement.file_name, rejected.reason
        );
    }
    for failure in &report.extraction_failures {
        println!("failed    {:<28} {}", failure.file_name, failure.error);
    }
    for conflict in &report.conflicts {
        println!(
            "conflict  {:<28} {} recorded by another batch, left out of the file",
            conflict.file_name, conflict.kind
        );
    }
    match &report.file {
        Some(file) => println!(
            "{} statement(s), total ${}.{:02}",
            file.statement_count,
            file.credit_total.minor_units().unwrap_or_default() / 100,
            file.credit_total.minor_units().unwrap_or_default() % 100
        ),
        None => println!("Nothing to pay, no file generated"),
    }
}

fn parse(file: PathBuf) -> Result<()> {
    let bytes = fs::read(&file).wrap_err_with(|| format!("Failed to read {file:?}"))?;
    let text = default_extractor().extract(&bytes)?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let document = Document::new(file_name, bytes);
    let statement = parse_statement(&text, document.content_hash(), document.file_name);
    println!("{}", serde_json::to_string_pretty(&statement)?);
    Ok(())
}

fn export_ledger(ledger: PathBuf) -> Result<()> {
    let ledger = DuplicateLedger::new(SqliteStore::open(&ledger)?);
    write_ledger_csv(&ledger.entries()?, io::stdout().lock())?;
    Ok(())
}
