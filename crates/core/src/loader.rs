use crate::error::IngestError;
use lopdf::Document;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            _ => Err(IngestError::UnsupportedFormat(
                path.to_string_lossy().to_string(),
            )),
        }
    }
}

/// Parse a supported file into ordered page texts.
///
/// A file that parses but yields no text at all (a scanned PDF, an empty
/// DOCX) fails with `EmptyDocument`; nothing downstream ever sees an index
/// for it.
pub fn load_document(path: &Path) -> Result<Vec<PageText>, IngestError> {
    let pages = match DocumentFormat::from_path(path)? {
        DocumentFormat::Pdf => extract_pdf_pages(path)?,
        DocumentFormat::Docx => extract_docx_pages(path)?,
    };

    if pages.is_empty() {
        return Err(IngestError::EmptyDocument(
            path.to_string_lossy().to_string(),
        ));
    }

    Ok(pages)
}

fn extract_pdf_pages(path: &Path) -> Result<Vec<PageText>, IngestError> {
    let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        if !text.trim().is_empty() {
            pages.push(PageText {
                number: page_no,
                text,
            });
        }
    }

    Ok(pages)
}

fn local_name(qualified: &[u8]) -> &[u8] {
    match qualified.iter().position(|&byte| byte == b':') {
        Some(position) => &qualified[position + 1..],
        None => qualified,
    }
}

fn attribute_value(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .with_checks(false)
        .flatten()
        .find(|attribute| local_name(attribute.key.as_ref()) == key)
        .map(|attribute| String::from_utf8_lossy(&attribute.value).into_owned())
}

/// Walk `word/document.xml` inside the DOCX zip, collecting paragraph text
/// per page. Explicit page breaks (`<w:br w:type="page"/>`) advance the page
/// counter; a paragraph belongs to the page it starts on.
fn extract_docx_pages(path: &Path) -> Result<Vec<PageText>, IngestError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| IngestError::DocxParse(format!("not a docx archive: {error}")))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|error| IngestError::DocxParse(format!("missing word/document.xml: {error}")))?
        .read_to_string(&mut document_xml)?;

    let mut reader = Reader::from_str(&document_xml);
    reader.trim_text(false);

    let mut pages: BTreeMap<u32, String> = BTreeMap::new();
    let mut buffer = Vec::new();
    let mut current_page = 1u32;
    let mut paragraph_page = 1u32;
    let mut paragraph = String::new();
    let mut in_paragraph = false;
    let mut in_text_run = false;

    loop {
        buffer.clear();
        let event = reader
            .read_event_into(&mut buffer)
            .map_err(|error| IngestError::DocxParse(error.to_string()))?;

        match event {
            Event::Start(element) => match local_name(element.name().as_ref()) {
                b"p" => {
                    in_paragraph = true;
                    paragraph.clear();
                    paragraph_page = current_page;
                }
                b"t" => in_text_run = true,
                b"br" => {
                    if is_page_break(&element) {
                        current_page = current_page.saturating_add(1);
                    }
                    paragraph.push('\n');
                }
                b"tab" => paragraph.push('\t'),
                _ => {}
            },
            Event::Empty(element) => match local_name(element.name().as_ref()) {
                b"br" => {
                    if is_page_break(&element) {
                        current_page = current_page.saturating_add(1);
                    }
                    paragraph.push('\n');
                }
                b"tab" => paragraph.push('\t'),
                _ => {}
            },
            Event::End(element) => match local_name(element.name().as_ref()) {
                b"t" => in_text_run = false,
                b"p" => {
                    if in_paragraph {
                        let text = paragraph.trim();
                        if !text.is_empty() {
                            let entry = pages.entry(paragraph_page).or_default();
                            if !entry.is_empty() {
                                entry.push_str("\n\n");
                            }
                            entry.push_str(text);
                        }
                        in_paragraph = false;
                        paragraph.clear();
                    }
                }
                _ => {}
            },
            Event::Text(text) => {
                if in_text_run {
                    let unescaped = text
                        .unescape()
                        .map_err(|error| IngestError::DocxParse(error.to_string()))?;
                    paragraph.push_str(&unescaped);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(pages
        .into_iter()
        .map(|(number, text)| PageText { number, text })
        .collect())
}

fn is_page_break(element: &BytesStart<'_>) -> bool {
    attribute_value(element, b"type")
        .map(|value| value.eq_ignore_ascii_case("page"))
        .unwrap_or(false)
}
