//! Immutable snapshot of available forms.
//!
//! Forms are discovered by scanning the templates directory: each
//! subdirectory named after a form may hold a `template.json`, and the
//! forms directory must hold the matching `<name>.pdf`. Every form gets a
//! stable id derived from its name, so ids survive restarts and rescans.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Namespace for deriving stable form ids from form names.
const FORM_NAMESPACE: Uuid = Uuid::from_bytes([
    0x8f, 0x1c, 0x2a, 0x5e, 0x41, 0x7b, 0x4d, 0x09, 0x9a, 0x33, 0xc4, 0xd1, 0x6f, 0x58, 0x02,
    0xe7,
]);

/// One discovered form and its associated files.
#[derive(Debug, Clone)]
pub struct FormDescriptor {
    pub id: Uuid,
    /// Directory name, e.g. `medical_report`.
    pub name: String,
    /// Human-readable label: the name with underscores spaced out.
    pub label: String,
    pub form_pdf: PathBuf,
    pub template_json: Option<PathBuf>,
    pub has_manual_template: bool,
}

/// Snapshot of all known forms, addressable by id or name.
pub struct FormRegistry {
    by_id: HashMap<Uuid, FormDescriptor>,
    by_name: HashMap<String, Uuid>,
}

impl FormRegistry {
    /// Scan the directories and build a fresh snapshot.
    ///
    /// Symlinked entries are skipped, and anything resolving outside the
    /// scanned directories is rejected.
    pub fn build(forms_dir: &Path, templates_dir: &Path) -> Result<Self> {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();

        if !templates_dir.is_dir() {
            warn!(
                "templates directory {} does not exist, registry is empty",
                templates_dir.display()
            );
            return Ok(Self { by_id, by_name });
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(templates_dir)
            .with_context(|| format!("failed to read {}", templates_dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for entry in entries {
            if entry.is_symlink() {
                warn!("skipping symlinked entry {}", entry.display());
                continue;
            }
            if !entry.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let form_pdf = forms_dir.join(format!("{name}.pdf"));
            if !resolves_within(&form_pdf, forms_dir) {
                warn!("form path escapes forms directory, skipping: {name}");
                continue;
            }
            if !form_pdf.is_file() {
                debug!("no PDF for template directory '{name}', skipping");
                continue;
            }

            let template_json = entry.join("template.json");
            let (template_json, has_manual) = if template_json.is_file() {
                (Some(template_json), true)
            } else {
                (None, false)
            };

            let id = Uuid::new_v5(&FORM_NAMESPACE, name.as_bytes());
            let descriptor = FormDescriptor {
                id,
                name: name.to_string(),
                label: name.replace('_', " "),
                form_pdf,
                template_json,
                has_manual_template: has_manual,
            };
            by_name.insert(name.to_string(), id);
            by_id.insert(id, descriptor);
        }

        info!("registry: {} forms available", by_id.len());
        Ok(Self { by_id, by_name })
    }

    /// Look a form up by id or by name.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<&FormDescriptor> {
        if let Ok(id) = Uuid::parse_str(key) {
            if let Some(d) = self.by_id.get(&id) {
                return Some(d);
            }
        }
        self.by_name.get(key).and_then(|id| self.by_id.get(id))
    }

    /// All forms, sorted by name.
    #[must_use]
    pub fn available(&self) -> Vec<&FormDescriptor> {
        let mut forms: Vec<&FormDescriptor> = self.by_id.values().collect();
        forms.sort_by(|a, b| a.name.cmp(&b.name));
        forms
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Check that `path` stays inside `base` after lexical normalization.
fn resolves_within(path: &Path, base: &Path) -> bool {
    let Ok(abs_path) = std::path::absolute(path) else {
        return false;
    };
    let Ok(abs_base) = std::path::absolute(base) else {
        return false;
    };
    abs_path.starts_with(abs_base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup(dir: &Path, name: &str, with_template: bool) {
        let forms = dir.join("forms");
        let templates = dir.join("templates");
        fs::create_dir_all(templates.join(name)).unwrap();
        fs::create_dir_all(&forms).unwrap();
        fs::write(forms.join(format!("{name}.pdf")), b"%PDF-1.5").unwrap();
        if with_template {
            fs::write(
                templates.join(name).join("template.json"),
                r#"{"fields": [{"id": "1"}]}"#,
            )
            .unwrap();
        }
    }

    #[test]
    fn test_build_discovers_forms() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path(), "medical_report", true);
        setup(dir.path(), "insurance_claim", false);

        let registry =
            FormRegistry::build(&dir.path().join("forms"), &dir.path().join("templates")).unwrap();
        assert_eq!(registry.len(), 2);

        let form = registry.resolve("medical_report").unwrap();
        assert_eq!(form.label, "medical report");
        assert!(form.has_manual_template);

        let other = registry.resolve("insurance_claim").unwrap();
        assert!(!other.has_manual_template);
        assert!(other.template_json.is_none());
    }

    #[test]
    fn test_ids_are_stable() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path(), "medical_report", true);

        let forms = dir.path().join("forms");
        let templates = dir.path().join("templates");
        let first = FormRegistry::build(&forms, &templates).unwrap();
        let second = FormRegistry::build(&forms, &templates).unwrap();

        let a = first.resolve("medical_report").unwrap().id;
        let b = second.resolve("medical_report").unwrap().id;
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve_by_id_string() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path(), "medical_report", true);
        let registry =
            FormRegistry::build(&dir.path().join("forms"), &dir.path().join("templates")).unwrap();

        let id = registry.resolve("medical_report").unwrap().id;
        let by_id = registry.resolve(&id.to_string()).unwrap();
        assert_eq!(by_id.name, "medical_report");
    }

    #[test]
    fn test_template_dir_without_pdf_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("templates").join("orphan")).unwrap();
        fs::create_dir_all(dir.path().join("forms")).unwrap();

        let registry =
            FormRegistry::build(&dir.path().join("forms"), &dir.path().join("templates")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_directories_yield_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FormRegistry::build(
            &dir.path().join("nope"),
            &dir.path().join("also-nope"),
        )
        .unwrap();
        assert!(registry.is_empty());
        assert!(registry.resolve("anything").is_none());
    }
}
