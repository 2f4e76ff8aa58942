//! Source report text extraction and merging.
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use lopdf::Document;
use regex::Regex;
use tracing::{debug, info};

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").unwrap_or_else(|e| panic!("invalid regex: {e}")));

/// Extract text from each report and merge into one document, separated
/// by blank lines. PDF and plain-text files are supported.
pub fn merge_reports(reports: &[PathBuf]) -> Result<String> {
    anyhow::ensure!(!reports.is_empty(), "no report files given");

    let mut parts = Vec::with_capacity(reports.len());
    for report in reports {
        let text = extract_text(report)
            .with_context(|| format!("failed to extract text from {}", report.display()))?;
        let cleaned = clean_text(&text);
        debug!("extracted {} chars from {}", cleaned.len(), report.display());
        parts.push(cleaned);
    }

    let merged = parts.join("\n\n");
    info!("merged {} reports ({} chars)", reports.len(), merged.len());
    Ok(merged)
}

fn extract_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => extract_pdf_text(path),
        "txt" => match std::fs::read_to_string(path) {
            Ok(text) => Ok(text),
            Err(_) => {
                // Non-UTF-8 text files still carry usable content
                let bytes = std::fs::read(path)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        },
        other => bail!("unsupported report format: .{other}"),
    }
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    let doc = Document::load(path)?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    anyhow::ensure!(!pages.is_empty(), "PDF has no pages");

    let mut texts = Vec::with_capacity(pages.len());
    for page in pages {
        let text = doc
            .extract_text(&[page])
            .with_context(|| format!("failed to extract text from page {page}"))?;
        texts.push(text);
    }
    Ok(texts.join("\n\n"))
}

/// Collapse whitespace runs into single spaces and trim.
fn clean_text(text: &str) -> String {
    WHITESPACE_RUNS.replace_all(text, " ").trim().to_string()
}
