use crate::error::IngestError;
use crate::models::UploadedDocument;
use lopdf::Document;
use std::fmt::Display;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

impl PageText {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Turns PDF bytes into one entry per page, in page order.
///
/// Pages without extractable text (scans without OCR) come back with an
/// empty string. Only a document that cannot be parsed at all is an error.
pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, document: &UploadedDocument) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, document: &UploadedDocument) -> Result<Vec<PageText>, IngestError> {
        let parsed =
            Document::load_mem(&document.bytes).map_err(|error| unreadable(document, error))?;

        let page_numbers = parsed.get_pages().into_keys().collect::<Vec<_>>();
        if page_numbers.is_empty() {
            return Err(unreadable(document, "pdf has no pages"));
        }

        let mut pages = Vec::with_capacity(page_numbers.len());
        for number in page_numbers {
            let text = match parsed.extract_text(&[number]) {
                Ok(text) => text,
                Err(error) => {
                    debug!(
                        document = %document.filename,
                        page = number,
                        error = %error,
                        "page text could not be decoded"
                    );
                    String::new()
                }
            };
            pages.push(PageText { number, text });
        }

        Ok(pages)
    }
}

fn unreadable(document: &UploadedDocument, reason: impl Display) -> IngestError {
    IngestError::DocumentUnreadable {
        document: document.filename.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{LopdfExtractor, PdfExtractor};
    use crate::error::IngestError;
    use crate::models::UploadedDocument;
    use crate::test_util::pdf_with_pages;

    #[test]
    fn extracts_text_per_page_in_order() {
        let bytes = pdf_with_pages(&["Hydraulic pump", "Pressure relief"]);
        let document = UploadedDocument::new("manual.pdf", bytes);

        let pages = LopdfExtractor
            .extract_pages(&document)
            .expect("generated pdf should parse");

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("Hydraulic pump"));
        assert!(pages[1].text.contains("Pressure relief"));
    }

    #[test]
    fn page_without_text_is_empty_not_an_error() {
        let bytes = pdf_with_pages(&["Cover", ""]);
        let document = UploadedDocument::new("scan.pdf", bytes);

        let pages = LopdfExtractor
            .extract_pages(&document)
            .expect("generated pdf should parse");

        assert_eq!(pages.len(), 2);
        assert!(pages[0].has_text());
        assert!(!pages[1].has_text());
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let document = UploadedDocument::new("broken.pdf", b"%PDF-1.4\n%broken".to_vec());

        let error = LopdfExtractor
            .extract_pages(&document)
            .expect_err("broken pdf must not parse");

        match error {
            IngestError::DocumentUnreadable { document, .. } => assert_eq!(document, "broken.pdf"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
