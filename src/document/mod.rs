//! Plain-text extraction for uploaded documents.
//!
//! Each supported MIME type maps to one extractor. Extraction is synchronous
//! and CPU bound; callers run it on the blocking pool.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

pub const PDF: &str = "application/pdf";
pub const MSWORD: &str = "application/msword";
pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLS: &str = "application/vnd.ms-excel";
pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Extract the readable text of a document, trimmed.
pub fn extract_text(mime_type: &str, bytes: Vec<u8>) -> Result<String> {
    let text = match mime_type {
        PDF => pdf_text(&bytes).context("failed to extract text from PDF")?,
        DOCX | MSWORD => word_text(bytes).context("failed to extract text from Word document")?,
        XLS | XLSX => sheet_text(bytes).context("failed to extract text from spreadsheet")?,
        "text/plain" | "text/csv" => decode_text(bytes),
        other => anyhow::bail!("unsupported document type: {}", other),
    };

    debug!(mime = %mime_type, chars = text.chars().count(), "Extracted document text");
    Ok(text.trim().to_string())
}

/// UTF-8 first, Latin-1 otherwise. Every byte is a valid Latin-1 code point.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    }
}

fn pdf_text(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes)?;

    let mut text = String::new();
    for page in doc.get_pages().keys() {
        text.push_str(&doc.extract_text(&[*page])?);
        text.push('\n');
    }
    Ok(text)
}

/// Paragraph text of `word/document.xml`, one paragraph per line.
fn word_text(bytes: Vec<u8>) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .context("not an OOXML package (legacy binary .doc is not supported)")?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("package has no word/document.xml")?
        .read_to_string(&mut xml)?;

    paragraphs(&xml)
}

fn paragraphs(xml: &str) -> Result<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" | b"w:br" => text.push('\n'),
                b"w:tab" => text.push('\t'),
                _ => {}
            },
            Event::Text(e) if in_run_text => text.push_str(&e.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}

/// Every sheet as `Planilha: <name>` followed by its non-empty rows, cells joined by ` | `.
fn sheet_text(bytes: Vec<u8>) -> Result<String> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let mut text = String::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        text.push_str(&format!("Planilha: {}\n", name));

        for row in range.rows() {
            if row.iter().all(|cell| matches!(cell, Data::Empty)) {
                continue;
            }
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect();
            text.push_str(&cells.join(" | "));
            text.push('\n');
        }
        text.push('\n');
    }
    Ok(text)
}
