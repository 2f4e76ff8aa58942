//! End-to-end pipeline tests against a synthetic XFA form.
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, Stream, dictionary};

use formfill::config::Config;
use formfill::pipeline::Pipeline;
use formfill::provider::mock::MockProvider;
use formfill::registry::FormRegistry;
use formfill::xfa;

const DATASETS_XML: &str = r#"<xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/">
  <xfa:data>
    <form1>
      <PatientName/>
      <VisitDate/>
      <Smoker>Off</Smoker>
    </form1>
  </xfa:data>
</xfa:datasets>"#;

const TEMPLATE_JSON: &str = r#"{
  "fields": [
    {"id": "1.1", "question": "Quel est le nom du patient ?", "type": "str", "xml_path": "form1/PatientName"},
    {"id": "1.2", "q": "Quelle est la date de la visite ?", "t": "date", "xfa_path": "form1/VisitDate"},
    {"id": "1.3", "question": "Le patient est-il fumeur ?", "type": "checkbox", "xml_path": "form1/Smoker"}
  ]
}"#;

const LLM_REPLY: &str = r#"{
  "fields": [
    {"id": "1.1", "value": "Jean Dupont", "source_quote": "Le patient Jean Dupont", "confidence": 0.95},
    {"id": "1.2", "value": "2024-03-05"},
    {"id": "1.3", "value": "oui"}
  ]
}"#;

const REPORT_TEXT: &str = "Le patient Jean Dupont a été vu en consultation le 5 mars 2024. \
Il fume environ dix cigarettes par jour depuis quinze ans.";

/// Build a minimal XFA form PDF with the given datasets packet.
fn build_xfa_pdf(path: &Path, datasets_xml: &str, with_acroform: bool) {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Count" => 0,
        "Kids" => Object::Array(vec![]),
    });

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };

    if with_acroform {
        let config_id = doc.add_object(Stream::new(
            dictionary! {},
            b"<config/>".to_vec(),
        ));
        let datasets_id = doc.add_object(Stream::new(
            dictionary! {},
            datasets_xml.as_bytes().to_vec(),
        ));
        let acroform_id = doc.add_object(dictionary! {
            "XFA" => Object::Array(vec![
                Object::string_literal("config"),
                Object::Reference(config_id),
                Object::string_literal("datasets"),
                Object::Reference(datasets_id),
            ]),
        });
        catalog.set("AcroForm", acroform_id);
    }

    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: Config,
    report: PathBuf,
}

/// Lay out forms/, templates/, and one report under a temp directory.
fn setup(template_json: Option<&str>, with_acroform: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let forms = dir.path().join("forms");
    let templates = dir.path().join("templates").join("test_form");
    fs::create_dir_all(&forms).unwrap();
    fs::create_dir_all(&templates).unwrap();

    build_xfa_pdf(&forms.join("test_form.pdf"), DATASETS_XML, with_acroform);
    if let Some(json) = template_json {
        fs::write(templates.join("template.json"), json).unwrap();
    }

    let report = dir.path().join("report.txt");
    fs::write(&report, REPORT_TEXT).unwrap();

    let mut config = Config::default();
    config.forms_dir = forms.to_string_lossy().into_owned();
    config.templates_dir = dir.path().join("templates").to_string_lossy().into_owned();
    config.artifacts_dir = dir.path().join("logs").to_string_lossy().into_owned();
    config.rag.vector_store = "memory".to_string();

    Fixture {
        _dir: dir,
        config,
        report,
    }
}

fn run_pipeline(fixture: &Fixture, provider: &MockProvider) -> formfill::pipeline::PipelineResult {
    let registry = FormRegistry::build(
        &fixture.config.forms_dir(),
        &fixture.config.templates_dir(),
    )
    .unwrap();
    let mut pipeline = Pipeline::new(&registry, provider, &fixture.config);
    pipeline.progress = false;
    pipeline.process("test_form", &[fixture.report.clone()], None, true)
}

#[test]
fn test_full_pipeline_fills_form() {
    let fixture = setup(Some(TEMPLATE_JSON), true);
    let provider = MockProvider::with_replies(vec![LLM_REPLY.to_string()]);

    let result = run_pipeline(&fixture, &provider);
    assert!(result.success, "pipeline failed: {:?}", result.error);
    assert_eq!(result.filled_fields, 3);
    assert_eq!(result.total_fields, 3);

    // Artifacts from every stage
    for name in ["merged_report", "rag_responses", "datasets_extracted", "datasets_filled"] {
        assert!(
            result.artifacts.contains_key(name),
            "missing artifact: {name}"
        );
    }

    // Reload the output and check the packet contents
    let output = result.output_pdf.unwrap();
    let doc = Document::load(&output).unwrap();
    let datasets = xfa::extract_datasets(&doc).unwrap();
    let root = xmltree::Element::parse(datasets.as_bytes()).unwrap();

    let name = xfa::fill::find(&root, "form1/PatientName").unwrap();
    assert_eq!(name.get_text().unwrap(), "Jean Dupont");

    let date = xfa::fill::find(&root, "form1/VisitDate").unwrap();
    assert_eq!(date.get_text().unwrap(), "05.03.2024");

    let smoker = xfa::fill::find(&root, "form1/Smoker").unwrap();
    assert_eq!(smoker.get_text().unwrap(), "On");
}

#[test]
fn test_skipped_question_gets_error_response() {
    let fixture = setup(Some(TEMPLATE_JSON), true);
    let provider = MockProvider::with_replies(vec![
        r#"{"fields": [{"id": "1.1", "value": "Jean Dupont"}]}"#.to_string(),
    ]);

    let result = run_pipeline(&fixture, &provider);
    assert!(result.success);
    assert_eq!(result.filled_fields, 1);
    assert_eq!(result.total_fields, 3);

    let missing: Vec<_> = result
        .responses
        .iter()
        .filter(|r| r.error.as_deref() == Some("Not in LLM response"))
        .collect();
    assert_eq!(missing.len(), 2);
}

#[test]
fn test_empty_template_declares_no_work() {
    let fixture = setup(None, true);
    let provider = MockProvider::new();

    let result = run_pipeline(&fixture, &provider);
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("No questions in template"));
    assert_eq!(result.total_fields, 0);
}

#[test]
fn test_non_xfa_pdf_is_reported() {
    let fixture = setup(Some(TEMPLATE_JSON), false);
    let provider = MockProvider::with_replies(vec![LLM_REPLY.to_string()]);

    let result = run_pipeline(&fixture, &provider);
    assert!(!result.success);
    assert!(
        result.error.as_deref().unwrap().contains("AcroForm"),
        "unexpected error: {:?}",
        result.error
    );
}

#[test]
fn test_extract_packets_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("form.pdf");
    build_xfa_pdf(&pdf, DATASETS_XML, true);

    let doc = Document::load(&pdf).unwrap();
    let packets = xfa::extract_packets(&doc).unwrap();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].0, "config");
    assert_eq!(packets[1].0, "datasets");

    let datasets = xfa::extract_datasets(&doc).unwrap();
    assert!(datasets.contains("<form1>"));
}
