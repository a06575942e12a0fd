use thiserror::Error;
use tracing::warn;

const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("PDF text extraction failed: {0}")]
    Pdf(String),
    #[error("Document is not valid UTF-8 text")]
    NotText,
    #[error("Document contains no text")]
    Empty,
    #[error("Both extractors failed (primary: {primary}; secondary: {secondary})")]
    Exhausted {
        primary: Box<ExtractError>,
        secondary: Box<ExtractError>,
    },
}

pub trait TextExtractor: Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Layout-aware extraction from PDF content streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(ExtractError::Pdf("missing %PDF header".to_string()));
        }
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| ExtractError::NotText)
    }
}

/// Tries `primary` first and falls back to `secondary` when it errors or
/// produces only whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct Failover<P, S> {
    pub primary: P,
    pub secondary: S,
}

impl<P, S> Failover<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

#[inline]
fn non_blank(result: Result<String, ExtractError>) -> Result<String, ExtractError> {
    result.and_then(|text| {
        if text.trim().is_empty() {
            Err(ExtractError::Empty)
        } else {
            Ok(text)
        }
    })
}

impl<P: TextExtractor, S: TextExtractor> TextExtractor for Failover<P, S> {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let primary = match non_blank(self.primary.extract(bytes)) {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };
        warn!(error = %primary, "primary extractor failed, trying secondary");

        non_blank(self.secondary.extract(bytes)).map_err(|secondary| ExtractError::Exhausted {
            primary: Box::new(primary),
            secondary: Box::new(secondary),
        })
    }
}

/// PDF first, then plain text.
pub fn default_extractor() -> Failover<PdfExtractor, PlainTextExtractor> {
    Failover::new(PdfExtractor, PlainTextExtractor)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<&'static str, ExtractError>);

    impl TextExtractor for Fixed {
        fn extract(&self, _: &[u8]) -> Result<String, ExtractError> {
            self.0.clone().map(str::to_string)
        }
    }

    #[test]
    fn primary_result_is_used_when_available() {
        let extractor = Failover::new(Fixed(Ok("primary")), Fixed(Ok("secondary")));
        assert_eq!(extractor.extract(b"").unwrap(), "primary");
    }

    #[test]
    fn blank_primary_falls_over_to_secondary() {
        let extractor = Failover::new(Fixed(Ok("  \n")), Fixed(Ok("secondary")));
        assert_eq!(extractor.extract(b"").unwrap(), "secondary");
    }

    #[test]
    fn both_failing_reports_both_errors() {
        let extractor = Failover::new(
            Fixed(Err(ExtractError::Pdf("bad xref".to_string()))),
            Fixed(Err(ExtractError::NotText)),
        );
        assert_eq!(
            extractor.extract(b""),
            Err(ExtractError::Exhausted {
                primary: Box::new(ExtractError::Pdf("bad xref".to_string())),
                secondary: Box::new(ExtractError::NotText),
            })
        );
    }

    #[test]
    fn plain_text_rejects_binary() {
        assert_eq!(
            PlainTextExtractor.extract(&[0xff, 0xfe, 0x00]),
            Err(ExtractError::NotText)
        );
        assert_eq!(PlainTextExtractor.extract(b"ACN").unwrap(), "ACN");
    }

    #[test]
    fn non_pdf_bytes_fall_back_to_plain_text() {
        let text = default_extractor()
            .extract(b"FOR ZYH PTY LTD\n")
            .unwrap();
        assert_eq!(text, "FOR ZYH PTY LTD\n");
    }
}
