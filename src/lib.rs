//! # formfill — XFA form filling from free-text reports
//!
//! Extracts structured field values from free-text source documents with a
//! retrieval-augmented pipeline, then writes them into the XFA datasets
//! packet embedded in a PDF form container.
//!
//! ## Architecture
//!
//! - **[`config`]** — Configuration loading, validation, and defaults
//! - **[`registry`]** — Immutable snapshot of available forms and templates
//! - **[`template`]** — Form templates (questions, types, XFA paths)
//! - **[`merge`]** — Report text extraction and merging (PDF/TXT)
//! - **[`provider`]** — LLM capability contract (chat, embeddings, rerank)
//! - **[`rag`]** — Chunking, vector retrieval, context assembly, answering
//! - **[`xfa`]** — Datasets packet extraction, path-addressed fill, repack
//! - **[`convert`]** — Declared-type and checkbox value conversion
//! - **[`pipeline`]** — End-to-end orchestration with artifact logging

pub mod config;
pub mod convert;
pub mod merge;
pub mod pipeline;
pub mod provider;
pub mod rag;
pub mod registry;
pub mod template;
pub mod xfa;
