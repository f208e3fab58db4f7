//! OpenXML (DOCX) structure extraction: plain paragraphs for chunking
//! plus the raw `word/document.xml` preserved verbatim in
//! `structured_text`, per spec.md §4.1/§4.4.

use std::io::Read;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::ChunkError;

/// Extracted OpenXML content: paragraph texts (for rendering into
/// chunkable blocks) and the raw document XML (for `structured_text`).
#[derive(Debug)]
pub struct ExtractedDocx {
    pub paragraphs: Vec<String>,
    pub document_xml: String,
}

/// Pull `word/document.xml` out of a DOCX zip and reduce it to a
/// sequence of paragraph plain-text strings by walking `<w:p>`/`<w:t>`
/// elements.
pub fn extract_docx(bytes: &[u8], source_id: &str) -> Result<ExtractedDocx, ChunkError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(|e| ChunkError::MalformedPayload {
        source_id: source_id.to_string(),
        reason: e.to_string(),
    })?;

    let mut document_xml = String::new();
    {
        let mut entry = archive
            .by_name("word/document.xml")
            .map_err(|e| ChunkError::MalformedPayload {
                source_id: source_id.to_string(),
                reason: format!("missing word/document.xml: {e}"),
            })?;
        entry
            .read_to_string(&mut document_xml)
            .map_err(|e| ChunkError::MalformedPayload {
                source_id: source_id.to_string(),
                reason: e.to_string(),
            })?;
    }

    let paragraphs = parse_paragraphs(&document_xml).map_err(|e| ChunkError::MalformedPayload {
        source_id: source_id.to_string(),
        reason: e.to_string(),
    })?;

    Ok(ExtractedDocx {
        paragraphs,
        document_xml,
    })
}

fn parse_paragraphs(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Text(t) if in_text => {
                current.push_str(&t.unescape()?);
            }
            Event::End(e) if e.local_name().as_ref() == b"p" => {
                paragraphs.push(std::mem::take(&mut current));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.into_iter().filter(|p| !p.trim().is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_docx(document_xml: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut zip = zip::ZipWriter::new(cursor);
            zip.start_file::<_, ()>("word/document.xml", Default::default())
                .unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn extracts_paragraph_text() {
        let xml = r#"<w:document xmlns:w="ns"><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let bytes = build_docx(xml);
        let extracted = extract_docx(&bytes, "f1").unwrap();
        assert_eq!(extracted.paragraphs, vec!["Hello world", "Second paragraph"]);
        assert!(extracted.document_xml.contains("Hello"));
    }

    #[test]
    fn missing_document_xml_is_malformed() {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut zip = zip::ZipWriter::new(cursor);
            zip.start_file::<_, ()>("readme.txt", Default::default())
                .unwrap();
            zip.write_all(b"nothing").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_docx(&buf, "f1").unwrap_err();
        assert!(matches!(err, ChunkError::MalformedPayload { .. }));
    }
}
