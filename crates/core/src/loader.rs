use crate::config::BatchPolicy;
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::models::{DocumentCoverage, UploadedDocument};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reads files from disk, keeping the order they were given in.
pub fn read_documents(paths: &[PathBuf]) -> Result<Vec<UploadedDocument>, IngestError> {
    paths
        .iter()
        .map(|path| {
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| {
                    IngestError::InvalidArgument(format!(
                        "path has no file name: {}",
                        path.display()
                    ))
                })?;
            Ok(UploadedDocument::new(filename, fs::read(path)?))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub corpus: String,
    pub coverage: Vec<DocumentCoverage>,
    pub skipped: Vec<SkippedDocument>,
}

/// Concatenates the text of every page of every document, in upload order
/// then page order, with nothing inserted between pages or documents.
pub fn load_corpus(
    documents: &[UploadedDocument],
    extractor: &dyn PdfExtractor,
    policy: BatchPolicy,
) -> Result<LoadReport, IngestError> {
    if documents.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no documents were uploaded".to_string(),
        ));
    }

    let mut corpus = String::new();
    let mut coverage = Vec::with_capacity(documents.len());
    let mut skipped = Vec::new();

    for document in documents {
        let pages = match extractor.extract_pages(document) {
            Ok(pages) => pages,
            Err(error) if policy == BatchPolicy::SkipUnreadable => {
                warn!(document = %document.filename, reason = %error, "skipping unreadable pdf");
                skipped.push(SkippedDocument {
                    filename: document.filename.clone(),
                    reason: error.to_string(),
                });
                continue;
            }
            Err(error) => return Err(error),
        };

        let mut report = DocumentCoverage {
            filename: document.filename.clone(),
            checksum: digest_bytes(&document.bytes),
            page_count: pages.len() as u32,
            pages_with_text: 0,
            extracted_chars: 0,
        };

        for page in &pages {
            if page.has_text() {
                report.pages_with_text += 1;
            }
            report.extracted_chars += page.text.chars().count();
            corpus.push_str(&page.text);
        }

        if report.pages_without_text() > 0 {
            warn!(
                document = %report.filename,
                pages = report.page_count,
                pages_without_text = report.pages_without_text(),
                "some pages have no extractable text (scanned?)"
            );
        }
        info!(
            document = %report.filename,
            pages = report.page_count,
            chars = report.extracted_chars,
            "extracted pdf text"
        );
        coverage.push(report);
    }

    if corpus.trim().is_empty() {
        return Err(IngestError::EmptyCorpus);
    }

    Ok(LoadReport {
        corpus,
        coverage,
        skipped,
    })
}
