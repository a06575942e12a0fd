use crate::statement::{ContentHash, Extracted, Statement, StatementField};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

pub const UNKNOWN_COMPANY: &str = "Unknown Company";
pub const DEFAULT_AMOUNT: &str = "0.00";

pub type Strategy = fn(&str) -> Option<String>;

pub const PAYMENT_REFERENCE_STRATEGIES: &[Strategy] = &[
    standalone_payment_reference,
    barcode_payment_reference,
    spaced_payment_reference,
];

fn company_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"FOR\s+([A-Z][A-Z0-9\s&]+(?:PTY\s+LTD|LIMITED|LTD))")
            .expect("company name regex")
    })
}

fn registration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ACN\s+(\d{3}\s+\d{3}\s+\d{3})").expect("acn regex"))
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Annual Review.*?\$(\d+\.\d{2})").expect("amount regex"))
}

fn payer_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Annual Review.*?([A-Z0-9]{13}\s+[A-Z])").expect("payer reference regex")
    })
}

fn standalone_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(\d{13})\s*$").expect("standalone reference regex"))
}

fn barcode_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\*\d+\s+(\d{13})\s+\d+\s+\*").expect("barcode reference regex")
    })
}

fn spaced_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Ref:\s+(\d{4}\s+\d{4}\s+\d{4}\s+\d{3})").expect("spaced reference regex")
    })
}

#[inline]
fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[inline]
fn strip_whitespace(value: String) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

pub fn company_name(text: &str) -> Option<String> {
    capture(company_name_re(), text).map(|name| name.trim().to_string())
}

pub fn registration_number(text: &str) -> Option<String> {
    capture(registration_re(), text).map(strip_whitespace)
}

pub fn amount(text: &str) -> Option<String> {
    capture(amount_re(), text)
}

pub fn payer_reference(text: &str) -> Option<String> {
    capture(payer_reference_re(), text).map(strip_whitespace)
}

/// A line holding nothing but a 13 digit number.
pub fn standalone_payment_reference(text: &str) -> Option<String> {
    capture(standalone_reference_re(), text)
}

/// The 13 digit number inside a `*`-delimited barcode line.
pub fn barcode_payment_reference(text: &str) -> Option<String> {
    capture(barcode_reference_re(), text)
}

/// `Ref:` followed by a 4-4-4-3 digit group.
pub fn spaced_payment_reference(text: &str) -> Option<String> {
    capture(spaced_reference_re(), text).map(strip_whitespace)
}

pub fn first_match(strategies: &[Strategy], text: &str) -> Option<String> {
    strategies.iter().find_map(|strategy| strategy(text))
}

#[inline]
fn extract(
    value: Option<String>,
    sentinel: &str,
    field: StatementField,
    degraded: &mut Vec<StatementField>,
) -> String {
    let extracted = match value {
        Some(v) => Extracted::Found(v),
        None => Extracted::Fallback(sentinel.to_string()),
    };
    if extracted.is_fallback() {
        debug!(%field, sentinel, "pattern not found, using fallback");
        degraded.push(field);
    }
    extracted.into_value()
}

/// Builds a [`Statement`] from raw document text. Never fails: every field that
/// cannot be found is replaced by its sentinel and listed in
/// [`Statement::degraded`].
pub fn parse_statement(
    text: &str,
    content_hash: ContentHash,
    file_name: impl Into<String>,
) -> Statement {
    let mut degraded = Vec::new();

    let company_name = extract(
        company_name(text),
        UNKNOWN_COMPANY,
        StatementField::CompanyName,
        &mut degraded,
    );
    let registration_number = extract(
        registration_number(text),
        "",
        StatementField::RegistrationNumber,
        &mut degraded,
    );
    let amount = extract(
        amount(text),
        DEFAULT_AMOUNT,
        StatementField::Amount,
        &mut degraded,
    );
    let payer_reference = extract(
        payer_reference(text),
        "",
        StatementField::PayerReference,
        &mut degraded,
    );
    let payment_reference = extract(
        first_match(PAYMENT_REFERENCE_STRATEGIES, text),
        "",
        StatementField::PaymentReference,
        &mut degraded,
    );

    Statement {
        company_name,
        registration_number,
        amount,
        payer_reference,
        payment_reference,
        content_hash,
        file_name: file_name.into(),
        degraded,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const STATEMENT_TEXT: &str = "Australian Securities & Investments Commission
Company statement
ACN 612 433 502
FOR ZYH PTY LTD
Inquiries 1300 300 630
Annual Review - 2025 4X9702542480B A $321.00
Pay by 28 Jul 25
Biller Code: 17301
Ref: 2296 1243 3502 9
2296124335029
*814 2296124335029 32100 *
";

    fn parse(text: &str) -> Statement {
        parse_statement(text, ContentHash::of(text.as_bytes()), "statement.pdf")
    }

    #[test]
    fn extracts_all_fields() {
        let statement = parse(STATEMENT_TEXT);
        assert_eq!(statement.company_name, "ZYH PTY LTD");
        assert_eq!(statement.registration_number, "612433502");
        assert_eq!(statement.amount, "321.00");
        assert_eq!(statement.payer_reference, "4X9702542480BA");
        assert_eq!(statement.payment_reference, "2296124335029");
        assert_eq!(statement.file_name, "statement.pdf");
        assert!(statement.degraded.is_empty());
    }

    #[test]
    fn text_without_markers_falls_back_to_sentinels() {
        let statement = parse("nothing to see here\njust some words\n");
        assert_eq!(statement.company_name, UNKNOWN_COMPANY);
        assert_eq!(statement.registration_number, "");
        assert_eq!(statement.amount, DEFAULT_AMOUNT);
        assert_eq!(statement.payer_reference, "");
        assert_eq!(statement.payment_reference, "");
        assert_eq!(statement.degraded.len(), 5);
        assert!(statement.is_degraded(StatementField::Amount));
    }

    #[test]
    fn company_name_accepts_ampersand_and_limited() {
        assert_eq!(
            company_name("TAX FOR SMITH & JONES HOLDINGS LIMITED\n").as_deref(),
            Some("SMITH & JONES HOLDINGS LIMITED")
        );
        assert_eq!(company_name("FOR lowercase pty ltd"), None);
    }

    #[test]
    fn amount_must_follow_annual_review_on_the_same_line() {
        assert_eq!(amount("Late fee $80.00\nAnnual Review $321.00").as_deref(), Some("321.00"));
        assert_eq!(amount("Annual Review\n$321.00"), None);
        assert_eq!(
            amount("Annual Review $12.00 then $99.00").as_deref(),
            Some("12.00")
        );
    }

    #[test]
    fn standalone_reference_wins_over_later_strategies() {
        let text = "Ref: 1111 2222 3333 444\n*9 5555666677778 1 *\n9999888877776\n";
        assert_eq!(
            first_match(PAYMENT_REFERENCE_STRATEGIES, text).as_deref(),
            Some("9999888877776")
        );
    }

    #[test]
    fn barcode_reference_used_without_standalone_line() {
        let text = "Ref: 1111 2222 3333 444\n*9 5555666677778 1 *\n";
        assert_eq!(
            first_match(PAYMENT_REFERENCE_STRATEGIES, text).as_deref(),
            Some("5555666677778")
        );
    }

    #[test]
    fn spaced_reference_is_last_resort() {
        let text = "Pay here Ref: 1111 2222 3333 444 thanks";
        assert_eq!(
            first_match(PAYMENT_REFERENCE_STRATEGIES, text).as_deref(),
            Some("111122223333444")
        );
        assert_eq!(first_match(PAYMENT_REFERENCE_STRATEGIES, "Ref: 12"), None);
    }

    #[test]
    fn fourteen_digit_line_is_not_a_standalone_reference() {
        assert_eq!(standalone_payment_reference("12345678901234\n"), None);
    }
}
