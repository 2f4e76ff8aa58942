//! End-to-end orchestration: reports in, filled form out.
//!
//! Each run works through fixed stages: resolve the form, load its
//! template, merge the reports, index and answer, convert values, fill
//! the datasets packet, and repack the PDF. Intermediate artifacts are
//! written under the artifacts directory, keyed by a run timestamp, and
//! are kept even when a later stage fails.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::convert::TypeConverter;
use crate::provider::LlmProvider;
use crate::rag::FieldResponse;
use crate::rag::context::TokenCounter;
use crate::rag::engine::RagEngine;
use crate::rag::index::make_index;
use crate::registry::FormRegistry;
use crate::template::FormTemplate;
use crate::xfa;

/// Outcome of one pipeline run.
#[derive(Debug, Default, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_pdf: Option<PathBuf>,
    pub filled_fields: usize,
    pub total_fields: usize,
    pub responses: Vec<FieldResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage artifacts written during the run, by artifact name.
    pub artifacts: BTreeMap<String, PathBuf>,
}

pub struct Pipeline<'a> {
    registry: &'a FormRegistry,
    provider: &'a dyn LlmProvider,
    config: &'a Config,
    /// Show progress bars during embedding and answering.
    pub progress: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        registry: &'a FormRegistry,
        provider: &'a dyn LlmProvider,
        config: &'a Config,
    ) -> Self {
        Self {
            registry,
            provider,
            config,
            progress: true,
        }
    }

    /// Run the pipeline for one form. Never panics or returns `Err`; any
    /// stage failure is reported in the result, alongside whatever
    /// artifacts were written before it.
    pub fn process(
        &self,
        form_key: &str,
        reports: &[PathBuf],
        output: Option<&Path>,
        save_artifacts: bool,
    ) -> PipelineResult {
        let timestamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let mut artifacts = BTreeMap::new();

        match self.run(form_key, reports, output, save_artifacts, &timestamp, &mut artifacts) {
            Ok(result) => result,
            Err(e) => {
                error!("pipeline failed: {e:#}");
                PipelineResult {
                    success: false,
                    error: Some(format!("{e:#}")),
                    artifacts,
                    ..PipelineResult::default()
                }
            }
        }
    }

    fn run(
        &self,
        form_key: &str,
        reports: &[PathBuf],
        output: Option<&Path>,
        save_artifacts: bool,
        timestamp: &str,
        artifacts: &mut BTreeMap<String, PathBuf>,
    ) -> Result<PipelineResult> {
        let descriptor = self
            .registry
            .resolve(form_key)
            .with_context(|| format!("unknown form: {form_key}"))?;
        info!("processing form '{}'", descriptor.name);

        let template = FormTemplate::load_manual(descriptor)
            .unwrap_or_else(|| FormTemplate::auto(descriptor));
        if !template.is_manual {
            warn!("no template for '{}', nothing to extract", descriptor.name);
        }

        let questions = template.rag_questions();
        if questions.is_empty() {
            // Not an error condition; the form simply declares no work
            return Ok(PipelineResult {
                success: false,
                error: Some("No questions in template".to_string()),
                ..PipelineResult::default()
            });
        }

        // ── Stage 1: merge reports ───────────────────────────────────
        let merged = crate::merge::merge_reports(reports)?;
        if save_artifacts {
            self.save_artifact(
                artifacts,
                "merged_report",
                &format!("merged_report_{timestamp}.txt"),
                merged.as_bytes(),
            );
        }

        // ── Stage 2: index and answer ────────────────────────────────
        let counter = match &self.config.rag.tokenizer_json {
            Some(path) => TokenCounter::from_file(path).unwrap_or_else(|e| {
                warn!("{e:#}; using approximate token counts");
                TokenCounter::approximate()
            }),
            None => TokenCounter::approximate(),
        };
        let index = make_index(&self.config.rag.vector_store);
        let mut engine = RagEngine::new(self.config.rag.clone(), self.provider, index, counter);

        let chunk_count = engine.index_documents(&[merged], self.progress)?;
        info!("indexed {chunk_count} chunks, answering {} questions", questions.len());

        let responses = engine.process_questions(&questions, self.progress)?;
        if save_artifacts {
            if let Ok(json) = serde_json::to_vec_pretty(&responses) {
                self.save_artifact(
                    artifacts,
                    "rag_responses",
                    &format!("json/rag_responses_{timestamp}.json"),
                    &json,
                );
            }
        }

        // ── Stage 3: extract the datasets packet ─────────────────────
        let doc = lopdf::Document::load(&descriptor.form_pdf)
            .with_context(|| format!("failed to load form {}", descriptor.form_pdf.display()))?;
        let datasets = xfa::extract_datasets(&doc)?;
        if save_artifacts {
            self.save_artifact(
                artifacts,
                "datasets_extracted",
                &format!("xml/datasets_extracted_{timestamp}.xml"),
                datasets.as_bytes(),
            );
        }

        // ── Stage 4: convert values ──────────────────────────────────
        let checkbox_paths = xfa::discover_checkbox_paths(&datasets)?;
        let type_hints = template.type_hints();

        let mut values: Vec<(String, String)> = Vec::new();
        for response in &responses {
            let Some(raw) = &response.value else {
                continue;
            };
            let Some(path) = template.xml_path(&response.id) else {
                warn!("field {} has no target path, skipping", response.id);
                continue;
            };

            // Checkbox destinations override the declared type
            let converted = if checkbox_paths.iter().any(|p| p == path) {
                TypeConverter::convert_for_checkbox(raw)
            } else {
                let field_type = template.field_type(&response.id).unwrap_or("text");
                TypeConverter::convert(raw, field_type)
            };
            values.push((path.to_string(), converted));
        }
        xfa::normalize_checkboxes(&mut values, &checkbox_paths);

        // ── Stage 5: fill and repack ─────────────────────────────────
        let filled_xml = xfa::update_datasets(&datasets, &values, &type_hints, true)?;
        if save_artifacts {
            self.save_artifact(
                artifacts,
                "datasets_filled",
                &format!("xml/datasets_filled_{timestamp}.xml"),
                &filled_xml,
            );
        }

        let output_pdf = output.map_or_else(
            || {
                self.config
                    .artifacts_dir()
                    .join("pdf")
                    .join(format!("{}_filled_{timestamp}.pdf", descriptor.name))
            },
            Path::to_path_buf,
        );
        xfa::inject_datasets(&descriptor.form_pdf, &filled_xml, &output_pdf)?;
        artifacts.insert("output_pdf".to_string(), output_pdf.clone());

        let filled_fields = responses.iter().filter(|r| r.value.is_some()).count();
        info!(
            "filled {filled_fields} of {} fields in '{}'",
            questions.len(),
            descriptor.name
        );

        Ok(PipelineResult {
            success: true,
            output_pdf: Some(output_pdf),
            filled_fields,
            total_fields: questions.len(),
            responses,
            error: None,
            artifacts: std::mem::take(artifacts),
        })
    }

    /// Best-effort artifact write. Failures are logged, never fatal.
    fn save_artifact(
        &self,
        artifacts: &mut BTreeMap<String, PathBuf>,
        name: &str,
        relative: &str,
        bytes: &[u8],
    ) {
        let path = self.config.artifacts_dir().join(relative);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("failed to create artifact directory: {e}");
                return;
            }
        }
        match std::fs::write(&path, bytes) {
            Ok(()) => {
                artifacts.insert(name.to_string(), path);
            }
            Err(e) => warn!("failed to write artifact {}: {e}", path.display()),
        }
    }
}
