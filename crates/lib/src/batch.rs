use crate::amount::{encode_amount, AmountError, EncodedAmount};
use crate::record::{
    hyphenate_routing_code, Detail, Header, Record, Trailer, LINE_ENDING, MAX_DETAIL_COUNT,
};
use crate::statement::Statement;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_INSTITUTION: &str = "CBA";
pub const CONTENT_TYPE: &str = "text/plain";
const ENTRY_DESCRIPTION: &str = "ASIC";
const DEBIT_TITLE: &str = "Business";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Originator field `{0}` is empty")]
    MissingField(&'static str),
    #[error("Routing code `{0}` must contain exactly six digits")]
    InvalidRoutingCode(String),
    #[error("User id `{0}` must be at most six digits")]
    InvalidUserId(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("Invalid originator: {0}")]
    Originator(#[from] ConfigError),
    #[error("A batch needs at least one statement")]
    EmptyBatch,
    #[error("Statement from `{file_name}` has an unusable amount: {source}")]
    UntrustedAmount {
        file_name: String,
        #[source]
        source: AmountError,
    },
    #[error("Batch total exceeds the 10 digit amount field")]
    TotalOverflow,
    #[error("Batch of {0} statements exceeds the 6 digit record count")]
    CountOverflow(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Originator {
    pub name: String,
    pub routing_code: String,
    pub account: String,
    pub user_id: String,
    pub institution: String,
}

impl Originator {
    pub fn new(
        name: impl Into<String>,
        routing_code: impl Into<String>,
        account: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            routing_code: routing_code.into(),
            account: account.into(),
            user_id: user_id.into(),
            institution: DEFAULT_INSTITUTION.to_string(),
        }
    }

    /// Checks every field the file format needs, returning the routing code in
    /// its hyphenated wire form.
    pub fn validate(&self) -> Result<String, ConfigError> {
        let fields = [
            ("name", &self.name),
            ("routing code", &self.routing_code),
            ("account", &self.account),
            ("user id", &self.user_id),
            ("institution", &self.institution),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::MissingField(*name));
        }

        let user_id = self.user_id.trim();
        if user_id.len() > 6 || !user_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidUserId(self.user_id.clone()));
        }

        hyphenate_routing_code(&self.routing_code)
            .ok_or_else(|| ConfigError::InvalidRoutingCode(self.routing_code.clone()))
    }
}

/// Fixed destination for every credit: the regulator's receipts account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beneficiary {
    pub routing_code: &'static str,
    pub account: &'static str,
    pub title: &'static str,
}

pub const REGULATOR_RECEIPTS: Beneficiary = Beneficiary {
    routing_code: "093-003",
    account: "317118",
    title: "ASIC",
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbaFile {
    pub file_name: String,
    pub content: String,
    pub credit_total: EncodedAmount,
    pub statement_count: usize,
}

impl AbaFile {
    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content.split_terminator(LINE_ENDING)
    }
}

pub fn file_name(statement_count: usize, processing_date: NaiveDate) -> String {
    format!(
        "ASIC_Batch_{}companies_{}.ABA",
        statement_count,
        processing_date.format("%Y%m%d")
    )
}

fn detail_count(statement_count: usize) -> Result<usize, AssemblyError> {
    statement_count
        .checked_add(1)
        .filter(|count| *count <= MAX_DETAIL_COUNT)
        .ok_or(AssemblyError::CountOverflow(statement_count))
}

/// `DDMonYY` using the first four letters of the month name, e.g. `28July25`.
fn debit_reference(processing_date: NaiveDate) -> String {
    let month = processing_date.format("%B").to_string();
    format!(
        "{}{}{}",
        processing_date.format("%d"),
        month.chars().take(4).collect::<String>(),
        processing_date.format("%y")
    )
}

/// Builds the complete file: header, one credit per statement in input order,
/// a single balancing debit and the trailer.
pub fn assemble(
    statements: &[Statement],
    originator: &Originator,
    processing_date: NaiveDate,
) -> Result<AbaFile, AssemblyError> {
    let routing_code = originator.validate()?;
    if statements.is_empty() {
        return Err(AssemblyError::EmptyBatch);
    }
    let record_count = detail_count(statements.len())?;

    let mut records = Vec::with_capacity(statements.len() + 3);
    records.push(Record::Header(Header {
        institution: originator.institution.clone(),
        originator_name: originator.name.clone(),
        user_id: originator.user_id.trim().to_string(),
        description: ENTRY_DESCRIPTION.to_string(),
        processing_date,
    }));

    let mut total: u64 = 0;
    for statement in statements {
        let amount = encode_amount(&statement.amount);
        let minor_units = amount.minor_units().ok_or_else(|| AssemblyError::UntrustedAmount {
            file_name: statement.file_name.clone(),
            source: amount.error().cloned().unwrap_or_else(|| {
                AmountError::NotNumeric(statement.amount.clone())
            }),
        })?;
        total = total
            .checked_add(minor_units)
            .ok_or(AssemblyError::TotalOverflow)?;

        records.push(Record::Credit(Detail {
            routing_code: REGULATOR_RECEIPTS.routing_code.to_string(),
            account: REGULATOR_RECEIPTS.account.to_string(),
            amount,
            title: REGULATOR_RECEIPTS.title.to_string(),
            lodgement_reference: statement.payment_reference.clone(),
            trace_routing_code: routing_code.clone(),
            trace_account: originator.account.clone(),
            remitter_name: originator.name.clone(),
        }));
    }

    let credit_total =
        EncodedAmount::from_minor_units(total).map_err(|_| AssemblyError::TotalOverflow)?;

    records.push(Record::Debit(Detail {
        routing_code: routing_code.clone(),
        account: originator.account.clone(),
        amount: credit_total.clone(),
        title: DEBIT_TITLE.to_string(),
        lodgement_reference: debit_reference(processing_date),
        trace_routing_code: routing_code,
        trace_account: originator.account.clone(),
        remitter_name: originator.name.clone(),
    }));
    records.push(Record::Trailer(Trailer {
        credit_total: credit_total.clone(),
        debit_total: credit_total.clone(),
        detail_count: record_count,
    }));

    let mut content = String::with_capacity(records.len() * 122);
    for record in &records {
        content.push_str(record.encode().as_str());
        content.push_str(LINE_ENDING);
    }

    let file_name = file_name(statements.len(), processing_date);
    info!(
        file_name = %file_name,
        statements = statements.len(),
        total = %credit_total,
        "assembled batch"
    );

    Ok(AbaFile {
        file_name,
        content,
        credit_total,
        statement_count: statements.len(),
    })
}
