//! Question answering over an indexed document set.
//!
//! The engine owns the retrieval index and token counter and borrows the
//! provider. Questions are processed in batches: retrieve per question,
//! union and dedup the chunk pool, optionally rerank against the combined
//! batch query, assemble a bounded context, and make one chat call per
//! batch. Failures are contained per question wherever possible.
use std::collections::HashMap;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::RagSettings;
use crate::provider::{ChatMessage, LlmProvider};
use crate::rag::chunker::chunk_documents;
use crate::rag::context::{TokenCounter, build_context};
use crate::rag::index::{IndexedChunk, VectorIndex};
use crate::rag::parser::parse_field_entries;
use crate::rag::{FieldResponse, Question};

const EMBED_BATCH_SIZE: usize = 20;
const DEFAULT_CONFIDENCE: f64 = 0.8;

const SYSTEM_PROMPT: &str = "\
Tu es un assistant d'extraction de données. À partir du contexte documentaire \
fourni, tu réponds à chaque question par la valeur exacte trouvée dans les \
documents. Tu renvoies uniquement un objet JSON de la forme \
{\"fields\": [{\"id\": \"...\", \"value\": ..., \"source_quote\": \"...\", \
\"confidence\": 0.0}]}. Si une information est absente du contexte, mets \
\"value\" à null. N'invente jamais de valeur.";

pub struct RagEngine<'a> {
    config: RagSettings,
    provider: &'a dyn LlmProvider,
    index: Box<dyn VectorIndex>,
    counter: TokenCounter,
}

impl<'a> RagEngine<'a> {
    pub fn new(
        config: RagSettings,
        provider: &'a dyn LlmProvider,
        index: Box<dyn VectorIndex>,
        counter: TokenCounter,
    ) -> Self {
        Self {
            config,
            provider,
            index,
            counter,
        }
    }

    /// Chunk, embed, and index the given documents. Returns the number of
    /// indexed chunks.
    pub fn index_documents(&mut self, documents: &[String], progress: bool) -> Result<usize> {
        let chunks = chunk_documents(documents, self.config.chunk_size, self.config.chunk_overlap);
        anyhow::ensure!(!chunks.is_empty(), "documents contain no indexable text");
        info!("embedding {} chunks", chunks.len());

        let bar = make_bar(chunks.len() as u64, progress, "embedding");
        let mut indexed = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            // Embedding endpoints behave better without raw newlines
            let cleaned: Vec<String> = batch.iter().map(|c| c.replace('\n', " ")).collect();
            let embeddings = self
                .provider
                .embed_texts(&cleaned)
                .context("failed to embed document chunks")?;

            for (text, embedding) in batch.iter().zip(embeddings) {
                indexed.push(IndexedChunk {
                    text: text.clone(),
                    embedding,
                });
            }
            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();

        let count = indexed.len();
        self.index.build(indexed)?;
        Ok(count)
    }

    /// Answer all questions, in batches of `batch_size`. Every question
    /// gets exactly one response, in input order.
    pub fn process_questions(
        &self,
        questions: &[Question],
        progress: bool,
    ) -> Result<Vec<FieldResponse>> {
        anyhow::ensure!(
            !self.index.is_empty(),
            "no documents indexed; call index_documents first"
        );

        let bar = make_bar(questions.len() as u64, progress, "answering");
        let mut responses = Vec::with_capacity(questions.len());

        for batch in questions.chunks(self.config.batch_size.max(1)) {
            responses.extend(self.process_batch(batch));
            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();

        Ok(responses)
    }

    fn process_batch(&self, batch: &[Question]) -> Vec<FieldResponse> {
        let mut resolved: HashMap<String, FieldResponse> = HashMap::new();
        let mut pool: Vec<String> = Vec::new();
        let mut pending: Vec<&Question> = Vec::new();

        // Retrieve per question; failures become per-question errors and
        // the question is dropped from the chat call.
        for question in batch {
            match self.retrieve(&question.text) {
                Ok(docs) => {
                    for doc in docs {
                        if !pool.contains(&doc) {
                            pool.push(doc);
                        }
                    }
                    pending.push(question);
                }
                Err(e) => {
                    warn!("retrieval failed for question {}: {e:#}", question.id);
                    resolved.insert(
                        question.id.clone(),
                        FieldResponse::error(&question.id, format!("Retrieval failed: {e}")),
                    );
                }
            }
        }

        if pending.is_empty() {
            return collect_in_order(batch, resolved);
        }

        if pool.is_empty() {
            for question in &pending {
                resolved.insert(
                    question.id.clone(),
                    FieldResponse::error(&question.id, "No context found"),
                );
            }
            return collect_in_order(batch, resolved);
        }

        let scored = self.rerank_pool(&pending, pool);
        let context = build_context(&scored, self.config.max_input_tokens(), &self.counter);

        match self.call_llm(&pending, &context) {
            Ok(reply) => {
                self.reconcile(&pending, &reply, &mut resolved);
            }
            Err(e) => {
                warn!("chat completion failed for batch: {e:#}");
                for question in &pending {
                    resolved.insert(
                        question.id.clone(),
                        FieldResponse::error(&question.id, format!("LLM call failed: {e}")),
                    );
                }
            }
        }

        collect_in_order(batch, resolved)
    }

    fn retrieve(&self, question: &str) -> Result<Vec<String>> {
        let cleaned = question.replace('\n', " ");
        let embeddings = self
            .provider
            .embed_texts(std::slice::from_ref(&cleaned))
            .context("failed to embed question")?;
        let embedding = embeddings
            .first()
            .context("embedding response was empty")?;
        self.index.query(embedding, self.config.retrieval_top_k)
    }

    /// Score the chunk pool for context assembly. Reranks against the
    /// combined batch query when enabled; a rerank failure falls back to
    /// the retrieval order with descending synthetic scores.
    fn rerank_pool(&self, pending: &[&Question], pool: Vec<String>) -> Vec<(String, f64)> {
        if !self.config.use_reranking || pool.len() < 2 {
            return pool.into_iter().map(|doc| (doc, 1.0)).collect();
        }

        let combined_query = pending
            .iter()
            .map(|q| q.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        match self.provider.rerank(&combined_query, &pool, pool.len()) {
            Ok(results) => results.into_iter().map(|r| (r.document, r.score)).collect(),
            Err(e) => {
                warn!("reranking failed ({e}), keeping retrieval order");
                let len = pool.len();
                pool.into_iter()
                    .enumerate()
                    .map(|(i, doc)| (doc, 1.0 - i as f64 / len as f64))
                    .collect()
            }
        }
    }

    fn call_llm(&self, pending: &[&Question], context: &str) -> Result<String> {
        let question_list: Vec<serde_json::Value> = pending
            .iter()
            .map(|q| json!({"id": q.id, "question": q.text}))
            .collect();
        let questions_json = serde_json::to_string_pretty(&question_list)
            .context("failed to serialize question list")?;

        let user_prompt = format!(
            "CONTEXTE DOCUMENTAIRE :\n\"\"\"\n{context}\n\"\"\"\n\n\
             QUESTIONS À TRAITER :\n{questions_json}\n\n\
             Renvoie uniquement le JSON valide."
        );

        debug!(
            "chat call: {} questions, context ~{} tokens",
            pending.len(),
            self.counter.count(context)
        );

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ];
        Ok(self.provider.chat_completion(
            &messages,
            self.config.temperature,
            self.config.max_response_tokens,
        )?)
    }

    /// Match parsed reply entries to pending questions by id. Entries for
    /// unknown ids are ignored; questions the model skipped get an error
    /// response.
    fn reconcile(
        &self,
        pending: &[&Question],
        reply: &str,
        resolved: &mut HashMap<String, FieldResponse>,
    ) {
        let entries = parse_field_entries(reply);

        for entry in entries {
            let Some(id) = entry.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            if !pending.iter().any(|q| q.id == id) || resolved.contains_key(id) {
                continue;
            }

            let value = entry.get("value").filter(|v| !v.is_null()).cloned();
            let source_quote = entry
                .get("source_quote")
                .and_then(|v| v.as_str())
                .map(ToString::to_string);
            let confidence = entry
                .get("confidence")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(if value.is_some() { DEFAULT_CONFIDENCE } else { 0.0 });

            resolved.insert(
                id.to_string(),
                FieldResponse {
                    id: id.to_string(),
                    value,
                    source_quote,
                    confidence,
                    error: None,
                },
            );
        }

        for question in pending {
            if !resolved.contains_key(&question.id) {
                resolved.insert(
                    question.id.clone(),
                    FieldResponse::error(&question.id, "Not in LLM response"),
                );
            }
        }
    }
}

/// Emit responses in the batch's question order.
fn collect_in_order(
    batch: &[Question],
    mut resolved: HashMap<String, FieldResponse>,
) -> Vec<FieldResponse> {
    batch
        .iter()
        .map(|q| {
            resolved
                .remove(&q.id)
                .unwrap_or_else(|| FieldResponse::error(&q.id, "Not in LLM response"))
        })
        .collect()
}

fn make_bar(len: u64, visible: bool, label: &str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    bar.set_message(label.to_string());
    bar
}
