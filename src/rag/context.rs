//! Token counting and context assembly.
use anyhow::{Context, Result};
use tokenizers::Tokenizer;
use tracing::{debug, warn};

const SEPARATOR: &str = "\n---\n";

/// Counts tokens either with a real tokenizer or a `chars / 4` estimate.
pub enum TokenCounter {
    Exact(Box<Tokenizer>),
    Approximate,
}

impl TokenCounter {
    /// Load a HuggingFace `tokenizer.json` for exact counting.
    pub fn from_file(path: &str) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("failed to load tokenizer: {path}"))?;
        Ok(Self::Exact(Box::new(tokenizer)))
    }

    #[must_use]
    pub fn approximate() -> Self {
        Self::Approximate
    }

    /// Token count for `text`. The exact counter falls back to the
    /// estimate if encoding fails.
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        match self {
            Self::Exact(tokenizer) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.get_ids().len(),
                Err(e) => {
                    warn!("tokenizer failed ({e}), estimating token count");
                    approximate_count(text)
                }
            },
            Self::Approximate => approximate_count(text),
        }
    }
}

fn approximate_count(text: &str) -> usize {
    text.chars().count() / 4
}

/// Assemble a context string from scored documents, best first, keeping
/// the total strictly under `max_tokens`. A document that would reach the
/// budget is excluded along with everything after it.
#[must_use]
pub fn build_context(
    scored_docs: &[(String, f64)],
    max_tokens: usize,
    counter: &TokenCounter,
) -> String {
    let mut selected: Vec<&str> = Vec::new();
    let mut current = 0usize;

    for (doc, _score) in scored_docs {
        let doc_tokens = counter.count(doc);
        if current + doc_tokens < max_tokens {
            selected.push(doc);
            current += doc_tokens;
        } else {
            break;
        }
    }

    debug!(
        "context: {} of {} documents, ~{current} tokens",
        selected.len(),
        scored_docs.len()
    );
    selected.join(SEPARATOR)
}
