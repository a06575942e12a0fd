use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a source document's raw bytes, lower-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Wraps a digest read back from storage, no validation is performed.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.bytes)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
pub enum StatementField {
    #[strum(serialize = "company name")]
    CompanyName,
    #[strum(serialize = "registration number")]
    RegistrationNumber,
    #[strum(serialize = "amount")]
    Amount,
    #[strum(serialize = "payer reference")]
    PayerReference,
    #[strum(serialize = "payment reference")]
    PaymentReference,
}

/// Outcome of a single extraction rule: either the pattern matched, or the
/// documented sentinel was substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted<T> {
    Found(T),
    Fallback(T),
}

impl<T> Extracted<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Extracted::Fallback(_))
    }

    pub fn into_value(self) -> T {
        match self {
            Extracted::Found(v) | Extracted::Fallback(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub company_name: String,
    pub registration_number: String,
    pub amount: String,
    pub payer_reference: String,
    pub payment_reference: String,
    pub content_hash: ContentHash,
    pub file_name: String,
    /// Fields whose pattern did not match and hold their sentinel value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<StatementField>,
}

impl Statement {
    pub fn is_degraded(&self, field: StatementField) -> bool {
        self.degraded.contains(&field)
    }

    /// The (payer reference, payment reference) pair identifying the payment
    /// obligation, `None` unless both references were extracted.
    pub fn reference_pair(&self) -> Option<(&str, &str)> {
        if self.payer_reference.is_empty() || self.payment_reference.is_empty() {
            None
        } else {
            Some((&self.payer_reference, &self.payment_reference))
        }
    }
}
