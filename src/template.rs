//! Form templates: the questions to ask and where answers land.
//!
//! A template is a JSON file listing fields, each with an id, an optional
//! question, a declared type, and the slash-separated path of the target
//! node in the datasets packet. Forms without a template still process
//! with an empty auto template (no questions, nothing filled).
use std::collections::HashMap;

use serde::Deserialize;
use tracing::{info, warn};

use crate::rag::Question;
use crate::registry::FormDescriptor;

fn default_field_type() -> String {
    "text".to_string()
}

/// One field entry as written in a template file.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateField {
    pub id: String,

    /// The question the extraction engine should answer. Fields without
    /// one are skipped during extraction but still count as declared.
    #[serde(default, alias = "q")]
    pub question: Option<String>,

    #[serde(rename = "type", alias = "t", default = "default_field_type")]
    pub field_type: String,

    /// Target node path in the datasets packet.
    #[serde(default, alias = "xfa_path")]
    pub xml_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    fields: Vec<TemplateField>,
}

/// A loaded template bound to a specific form.
#[derive(Debug, Clone)]
pub struct FormTemplate {
    pub form_name: String,
    pub fields: Vec<TemplateField>,
    pub is_manual: bool,
}

impl FormTemplate {
    /// Load the hand-written template for a form, if one exists and has
    /// at least one field.
    pub fn load_manual(descriptor: &FormDescriptor) -> Option<Self> {
        let path = descriptor.template_json.as_ref()?;
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) => {
                warn!("failed to read template {}: {e}", path.display());
                return None;
            }
        };
        let parsed: TemplateFile = match serde_json::from_str(&data) {
            Ok(t) => t,
            Err(e) => {
                warn!("invalid template JSON in {}: {e}", path.display());
                return None;
            }
        };
        if parsed.fields.is_empty() {
            return None;
        }
        info!(
            "loaded template for '{}' ({} fields)",
            descriptor.name,
            parsed.fields.len()
        );
        Some(Self {
            form_name: descriptor.name.clone(),
            fields: parsed.fields,
            is_manual: true,
        })
    }

    /// An empty fallback template for forms without a hand-written one.
    #[must_use]
    pub fn auto(descriptor: &FormDescriptor) -> Self {
        Self {
            form_name: descriptor.name.clone(),
            fields: Vec::new(),
            is_manual: false,
        }
    }

    /// Questions for the extraction engine, one per field that has both
    /// a question and a target path.
    #[must_use]
    pub fn rag_questions(&self) -> Vec<Question> {
        self.fields
            .iter()
            .filter(|f| f.xml_path.is_some())
            .filter_map(|f| {
                f.question.as_ref().map(|q| Question {
                    id: f.id.clone(),
                    text: q.clone(),
                    declared_type: f.field_type.clone(),
                })
            })
            .collect()
    }

    #[must_use]
    pub fn xml_path(&self, id: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.id == id)
            .and_then(|f| f.xml_path.as_deref())
    }

    #[must_use]
    pub fn field_type(&self, id: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.field_type.as_str())
    }

    /// Path-to-type map for the fill layer's declared-type coercion.
    #[must_use]
    pub fn type_hints(&self) -> HashMap<String, String> {
        self.fields
            .iter()
            .filter_map(|f| {
                f.xml_path
                    .as_ref()
                    .map(|p| (p.clone(), f.field_type.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_deserialization_aliases() {
        let json = r#"{"id": "1.1", "q": "Nom ?", "t": "str", "xfa_path": "form1/Name"}"#;
        let field: TemplateField = serde_json::from_str(json).unwrap();
        assert_eq!(field.question.as_deref(), Some("Nom ?"));
        assert_eq!(field.field_type, "str");
        assert_eq!(field.xml_path.as_deref(), Some("form1/Name"));
    }

    #[test]
    fn test_field_defaults() {
        let json = r#"{"id": "1.2"}"#;
        let field: TemplateField = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_type, "text");
        assert!(field.question.is_none());
        assert!(field.xml_path.is_none());
    }

    #[test]
    fn test_questions_require_question_and_path() {
        let template = FormTemplate {
            form_name: "test".to_string(),
            fields: vec![
                TemplateField {
                    id: "1".to_string(),
                    question: Some("A ?".to_string()),
                    field_type: "str".to_string(),
                    xml_path: Some("form1/A".to_string()),
                },
                TemplateField {
                    id: "2".to_string(),
                    question: None,
                    field_type: "str".to_string(),
                    xml_path: Some("form1/B".to_string()),
                },
                TemplateField {
                    id: "3".to_string(),
                    question: Some("C ?".to_string()),
                    field_type: "str".to_string(),
                    xml_path: None,
                },
            ],
            is_manual: true,
        };
        let questions = template.rag_questions();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "1");
    }

    #[test]
    fn test_type_hints() {
        let template = FormTemplate {
            form_name: "test".to_string(),
            fields: vec![TemplateField {
                id: "1".to_string(),
                question: None,
                field_type: "date".to_string(),
                xml_path: Some("form1/Date".to_string()),
            }],
            is_manual: true,
        };
        let hints = template.type_hints();
        assert_eq!(hints.get("form1/Date").map(String::as_str), Some("date"));
    }
}
