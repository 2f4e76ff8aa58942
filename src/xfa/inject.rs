//! Repacking the filled datasets into an output PDF.
use std::path::Path;

use lopdf::{Document, Object, ObjectId};
use tracing::info;

use super::XfaError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Drop a UTF-8 BOM and a leading XML declaration.
///
/// The datasets stream is a fragment inside the PDF container; viewers
/// reject a declaration there.
#[must_use]
pub(crate) fn strip_declaration(bytes: &[u8]) -> &[u8] {
    let mut rest = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if rest.starts_with(b"<?xml") {
        if let Some(end) = rest.windows(2).position(|w| w == b"?>") {
            rest = &rest[end + 2..];
        }
    }
    // Trim leading whitespace left behind by the declaration line
    while let [first, tail @ ..] = rest {
        if first.is_ascii_whitespace() {
            rest = tail;
        } else {
            break;
        }
    }
    rest
}

/// Locate the object id of the datasets stream in the XFA packet list.
fn find_datasets_stream(doc: &Document) -> Result<ObjectId, XfaError> {
    let catalog = doc.catalog().map_err(|_| XfaError::MissingRoot)?;

    let acro_form = catalog
        .get(b"AcroForm")
        .map_err(|_| XfaError::MissingAcroForm)?;
    let acro_form = match acro_form {
        Object::Reference(id) => doc.get_object(*id)?,
        other => other,
    }
    .as_dict()
    .map_err(|_| XfaError::MissingAcroForm)?;

    let xfa = acro_form.get(b"XFA").map_err(|_| XfaError::MissingXfa)?;
    let xfa = match xfa {
        Object::Reference(id) => doc.get_object(*id)?,
        other => other,
    }
    .as_array()
    .map_err(|_| XfaError::RepackMalformedPacketList)?;

    for pair in xfa.chunks(2) {
        let [name_obj, stream_obj] = pair else {
            continue;
        };
        let is_datasets = match name_obj {
            Object::String(bytes, _) | Object::Name(bytes) => bytes.as_slice() == b"datasets",
            _ => false,
        };
        if is_datasets {
            return stream_obj
                .as_reference()
                .map_err(|_| XfaError::RepackMalformedPacketList);
        }
    }
    Err(XfaError::RepackMissingDatasets)
}

/// Write `datasets_xml` into the form's datasets stream and save the
/// result as a new PDF at `output_pdf`.
pub fn inject_datasets(
    input_pdf: &Path,
    datasets_xml: &[u8],
    output_pdf: &Path,
) -> Result<(), XfaError> {
    let mut doc = Document::load(input_pdf)?;
    let stream_id = find_datasets_stream(&doc)?;

    let content = strip_declaration(datasets_xml).to_vec();
    doc.get_object_mut(stream_id)?
        .as_stream_mut()?
        .set_plain_content(content);

    if let Some(parent) = output_pdf.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    doc.save(output_pdf)?;
    info!("wrote filled form: {}", output_pdf.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_strip_declaration_removes_prolog() {
        let input = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root/>";
        assert_eq!(strip_declaration(input), b"<root/>");
    }

    #[test]
    fn test_strip_declaration_removes_bom() {
        let input = b"\xEF\xBB\xBF<?xml version=\"1.0\"?><root/>";
        assert_eq!(strip_declaration(input), b"<root/>");
    }

    #[test]
    fn test_strip_declaration_passthrough() {
        assert_eq!(strip_declaration(b"<root/>"), b"<root/>");
        assert_eq!(strip_declaration(b""), b"");
    }

    #[test]
    fn test_repack_without_datasets_packet() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("form.pdf");
        let output = dir.path().join("out.pdf");

        // XFA form carrying only a config packet
        let mut doc = Document::with_version("1.5");
        let config_id = doc.add_object(lopdf::Stream::new(
            lopdf::dictionary! {},
            b"<config/>".to_vec(),
        ));
        let acroform_id = doc.add_object(lopdf::dictionary! {
            "XFA" => Object::Array(vec![
                Object::string_literal("config"),
                Object::Reference(config_id),
            ]),
        });
        let pages_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Pages",
            "Count" => 0,
            "Kids" => Object::Array(vec![]),
        });
        let catalog_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => acroform_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(&input).unwrap();

        let err = inject_datasets(&input, b"<x/>", &output).unwrap_err();
        assert!(matches!(err, XfaError::RepackMissingDatasets));
        assert!(!output.exists());
    }
}
