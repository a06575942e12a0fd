use crate::amount::{EncodedAmount, AMOUNT_WIDTH};
use ascii::{AsciiChar, AsciiString};
use chrono::NaiveDate;

/// Every record is exactly this many characters, excluding the line ending.
pub const RECORD_WIDTH: usize = 120;
pub const LINE_ENDING: &str = "\r\n";

/// Largest detail record count the 6-digit trailer field can carry.
pub const MAX_DETAIL_COUNT: usize = 999_999;

const ROUTING_CODE_WIDTH: usize = 7;
const ACCOUNT_WIDTH: usize = 9;
const WITHHOLDING_TAX: &str = "00000000";
const TRAILER_ROUTING_FILLER: &str = "999-999";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justification {
    Left,
    /// Space padded on the left.
    Right,
    /// Zero padded on the left.
    Zero,
}

/// Appends `value` to `buf` occupying exactly `width` characters. Longer values
/// keep their leftmost characters; anything outside printable ASCII is written
/// as `?`.
pub fn write_field(buf: &mut AsciiString, value: &str, width: usize, justification: Justification) {
    let chars = value
        .chars()
        .take(width)
        .map(|c| match AsciiChar::from_ascii(c) {
            Ok(ch) if !ch.is_ascii_control() => ch,
            _ => AsciiChar::Question,
        })
        .collect::<Vec<_>>();
    let padding = width - chars.len();
    let pad = match justification {
        Justification::Zero => AsciiChar::_0,
        Justification::Left | Justification::Right => AsciiChar::Space,
    };

    if justification == Justification::Left {
        chars.into_iter().for_each(|ch| buf.push(ch));
        (0..padding).for_each(|_| buf.push(pad));
    } else {
        (0..padding).for_each(|_| buf.push(pad));
        chars.into_iter().for_each(|ch| buf.push(ch));
    }
}

#[inline]
fn blank(buf: &mut AsciiString, width: usize) {
    write_field(buf, "", width, Justification::Left);
}

/// Normalises a routing code to the hyphenated `ddd-ddd` wire form. Returns
/// `None` unless the code holds exactly six digits once separators are removed.
pub fn hyphenate_routing_code(code: &str) -> Option<String> {
    let digits = code
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect::<String>();
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{}", &digits[..3], &digits[3..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum RecordKind {
    Header,
    CreditDetail,
    DebitDetail,
    Trailer,
}

impl RecordKind {
    pub fn type_code(self) -> &'static str {
        match self {
            RecordKind::Header => "0",
            RecordKind::CreditDetail | RecordKind::DebitDetail => "1",
            RecordKind::Trailer => "7",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub institution: String,
    pub originator_name: String,
    pub user_id: String,
    pub description: String,
    pub processing_date: NaiveDate,
}

/// A credit or debit line. `routing_code` and `trace_routing_code` are expected
/// in hyphenated form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detail {
    pub routing_code: String,
    pub account: String,
    pub amount: EncodedAmount,
    pub title: String,
    pub lodgement_reference: String,
    pub trace_routing_code: String,
    pub trace_account: String,
    pub remitter_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub credit_total: EncodedAmount,
    pub debit_total: EncodedAmount,
    pub detail_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Header(Header),
    Credit(Detail),
    Debit(Detail),
    Trailer(Trailer),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Header(_) => RecordKind::Header,
            Record::Credit(_) => RecordKind::CreditDetail,
            Record::Debit(_) => RecordKind::DebitDetail,
            Record::Trailer(_) => RecordKind::Trailer,
        }
    }

    /// Renders the record as a single fixed-width line without line ending.
    pub fn encode(&self) -> AsciiString {
        let mut buf = AsciiString::with_capacity(RECORD_WIDTH);
        write_field(&mut buf, self.kind().type_code(), 1, Justification::Left);

        match self {
            Record::Header(header) => encode_header(&mut buf, header),
            Record::Credit(detail) => encode_detail(&mut buf, detail, "N", "53"),
            Record::Debit(detail) => encode_detail(&mut buf, detail, " ", "13"),
            Record::Trailer(trailer) => encode_trailer(&mut buf, trailer),
        }

        assert_eq!(
            buf.len(),
            RECORD_WIDTH,
            "{} record has the wrong width",
            self.kind()
        );
        buf
    }
}

fn encode_header(buf: &mut AsciiString, header: &Header) {
    blank(buf, 17);
    write_field(buf, "01", 2, Justification::Zero);
    write_field(buf, &header.institution, 3, Justification::Left);
    blank(buf, 7);
    write_field(buf, &header.originator_name, 26, Justification::Left);
    write_field(buf, &header.user_id, 6, Justification::Zero);
    write_field(buf, &header.description, 12, Justification::Left);
    let date = header.processing_date.format("%d%m%y").to_string();
    write_field(buf, &date, 6, Justification::Left);
    blank(buf, 40);
}

fn encode_detail(buf: &mut AsciiString, detail: &Detail, indicator: &str, code: &str) {
    write_field(buf, &detail.routing_code, ROUTING_CODE_WIDTH, Justification::Left);
    write_field(buf, &detail.account, ACCOUNT_WIDTH, Justification::Right);
    write_field(buf, indicator, 1, Justification::Left);
    write_field(buf, code, 2, Justification::Zero);
    write_field(buf, &detail.amount.to_string(), AMOUNT_WIDTH, Justification::Zero);
    write_field(buf, &detail.title, 32, Justification::Left);
    write_field(buf, &detail.lodgement_reference, 18, Justification::Left);
    write_field(buf, &detail.trace_routing_code, ROUTING_CODE_WIDTH, Justification::Left);
    write_field(buf, &detail.trace_account, ACCOUNT_WIDTH, Justification::Right);
    write_field(buf, &detail.remitter_name, 16, Justification::Left);
    write_field(buf, WITHHOLDING_TAX, 8, Justification::Zero);
}

fn encode_trailer(buf: &mut AsciiString, trailer: &Trailer) {
    let mut count_buf = itoa::Buffer::new();

    write_field(buf, TRAILER_ROUTING_FILLER, ROUTING_CODE_WIDTH, Justification::Left);
    blank(buf, 12);
    write_field(buf, "0", AMOUNT_WIDTH, Justification::Zero);
    write_field(buf, &trailer.credit_total.to_string(), AMOUNT_WIDTH, Justification::Zero);
    write_field(buf, &trailer.debit_total.to_string(), AMOUNT_WIDTH, Justification::Zero);
    blank(buf, 24);
    write_field(buf, count_buf.format(trailer.detail_count), 6, Justification::Zero);
    blank(buf, 40);
}
