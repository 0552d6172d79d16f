use std::io::{Cursor, Read};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use zip::ZipArchive;

use crate::handlers::registry::ModuleDescriptor;
use crate::handlers::traits::{HandlerError, ModuleHandler};
use crate::handlers::types::{ConfigBag, Fields, HandlerOutput};

const DOC_XML_PATH: &str = "word/document.xml";
const ATTACHMENT: &str = "attachment";
const DATA: &str = "data";
/// Largest inflated `word/document.xml` accepted
const MAX_DOCUMENT_XML_BYTES: u64 = 32 * 1024 * 1024;

/// Extracts the text of a `.docx` attachment
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxHandler;

impl DocxHandler {
    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new("docx_enrich")
            .description("Extract the text content of a .docx attachment")
            .inputs([ATTACHMENT])
    }
}

#[async_trait]
impl ModuleHandler for DocxHandler {
    async fn run(&self, fields: Fields, _config: ConfigBag) -> Result<HandlerOutput, HandlerError> {
        let filename = fields.str(ATTACHMENT).unwrap_or("attachment").to_string();
        let encoded = fields
            .str(DATA)
            .ok_or_else(|| HandlerError::MissingInput(format!("{DATA} for {filename}")))?;

        let bytes = decode_attachment(encoded)
            .map_err(|reason| HandlerError::Decode(format!("{filename}: {reason}")))?;

        // zip inflate and XML walk are CPU-bound
        let text =
            tokio::task::spawn_blocking(move || extract_text(&bytes, MAX_DOCUMENT_XML_BYTES))
                .await
                .map_err(|err| HandlerError::Internal(err.to_string()))?
                .map_err(|reason| HandlerError::Decode(format!("{filename}: {reason}")))?;

        Ok(HandlerOutput::values(text))
    }
}

fn decode_attachment(encoded: &str) -> Result<Vec<u8>, String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|err| format!("invalid base64 payload: {err}"))?;
    if bytes.is_empty() {
        return Err("empty payload".to_string());
    }
    Ok(bytes)
}

/// Document text with every paragraph prefixed by a newline
fn extract_text(bytes: &[u8], limit: u64) -> Result<String, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| format!("not a docx document: {err}"))?;

    let file = archive
        .by_name(DOC_XML_PATH)
        .map_err(|err| format!("docx missing {DOC_XML_PATH}: {err}"))?;
    let too_large = || format!("{DOC_XML_PATH} exceeds {limit} bytes");
    if file.size() > limit {
        return Err(too_large());
    }

    // The declared size is untrusted; stop inflating one byte past the cap.
    let mut xml = String::new();
    file.take(limit + 1)
        .read_to_string(&mut xml)
        .map_err(|err| format!("failed to read {DOC_XML_PATH}: {err}"))?;
    if xml.len() as u64 > limit {
        return Err(too_large());
    }

    let paragraphs =
        extract_paragraphs(&xml).map_err(|err| format!("malformed {DOC_XML_PATH}: {err}"))?;

    Ok(paragraphs
        .iter()
        .map(|paragraph| format!("\n{paragraph}"))
        .collect())
}

fn extract_paragraphs(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = XmlReader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => current = Some(String::new()),
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => {
                    if let Some(paragraph) = current.as_mut() {
                        paragraph.push('\t');
                    }
                }
                b"w:br" | b"w:cr" => {
                    if let Some(paragraph) = current.as_mut() {
                        paragraph.push('\n');
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(paragraph) = current.as_mut() {
                    paragraph.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    if let Some(paragraph) = current.take() {
                        paragraphs.push(paragraph);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}
