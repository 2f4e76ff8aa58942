//! Packet extraction from the PDF container.
use lopdf::{Document, Object};
use tracing::{debug, warn};

use super::XfaError;

/// Resolve an object through at most one level of indirection.
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, XfaError> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// Extract all named XFA packets as `(name, bytes)` pairs.
///
/// The XFA entry is an array alternating packet names and stream
/// references. Entries whose stream cannot be read are skipped with a
/// warning rather than failing the whole extraction.
pub fn extract_packets(doc: &Document) -> Result<Vec<(String, Vec<u8>)>, XfaError> {
    let catalog = doc.catalog().map_err(|_| XfaError::MissingRoot)?;

    let acro_form = catalog
        .get(b"AcroForm")
        .map_err(|_| XfaError::MissingAcroForm)?;
    let acro_form = resolve(doc, acro_form)?
        .as_dict()
        .map_err(|_| XfaError::MissingAcroForm)?;

    let xfa = acro_form.get(b"XFA").map_err(|_| XfaError::MissingXfa)?;
    let xfa = resolve(doc, xfa)?
        .as_array()
        .map_err(|_| XfaError::MalformedPacketList)?;

    let mut packets = Vec::new();
    for pair in xfa.chunks(2) {
        let [name_obj, stream_obj] = pair else {
            warn!("XFA packet list has a dangling entry, ignoring");
            continue;
        };

        let name = match name_obj {
            Object::String(bytes, _) | Object::Name(bytes) => {
                String::from_utf8_lossy(bytes).into_owned()
            }
            _ => {
                warn!("XFA packet name is not a string, skipping entry");
                continue;
            }
        };

        let stream = match resolve(doc, stream_obj).and_then(|o| Ok(o.as_stream()?)) {
            Ok(s) => s,
            Err(_) => {
                warn!("XFA packet '{name}' has no readable stream, skipping");
                continue;
            }
        };

        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        debug!("extracted XFA packet '{name}' ({} bytes)", content.len());
        packets.push((name, content));
    }

    Ok(packets)
}

/// Extract the datasets packet as text. Non-UTF-8 bytes are replaced.
pub fn extract_datasets(doc: &Document) -> Result<String, XfaError> {
    let packets = extract_packets(doc)?;
    packets
        .into_iter()
        .find(|(name, _)| name == "datasets")
        .map(|(_, bytes)| String::from_utf8_lossy(&bytes).into_owned())
        .ok_or(XfaError::MissingDatasets)
}
