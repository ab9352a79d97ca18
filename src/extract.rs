//! Multi-format text extraction for scanned documents.
//!
//! Dispatch is by lowercase file extension through a closed set of format
//! handlers. Each handler tries its primary strategy and, where one
//! exists, a simpler fallback; all failures are contained here. The public
//! boundary [`extract_text`] never returns an error: total extraction
//! failure degrades to an empty string plus a logged diagnostic, so one
//! corrupt file can never abort a batch scan.

use std::io::Read;
use std::path::Path;

use tracing::{error, warn};

/// Extensions the extraction pipeline accepts (including image formats,
/// which are cataloged with empty text).
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".pdf", ".xlsx", ".xls", ".csv", ".txt", ".md", ".docx", ".png", ".jpg", ".jpeg",
];

/// Maximum decompressed bytes read from a single OOXML ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Spreadsheet,
    Csv,
    PlainText,
    Docx,
    Image,
}

impl Format {
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext {
            ".pdf" => Some(Format::Pdf),
            ".xlsx" | ".xls" => Some(Format::Spreadsheet),
            ".csv" => Some(Format::Csv),
            ".txt" | ".md" => Some(Format::PlainText),
            ".docx" => Some(Format::Docx),
            ".png" | ".jpg" | ".jpeg" => Some(Format::Image),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Spreadsheet(String),
    Csv(String),
    Text(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Spreadsheet(e) => write!(f, "spreadsheet extraction failed: {}", e),
            ExtractError::Csv(e) => write!(f, "CSV extraction failed: {}", e),
            ExtractError::Text(e) => write!(f, "text extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts plain text from a file, dispatching on its lowercase
/// extension. Unsupported extensions and image formats yield an empty
/// string without logging; extraction failures yield an empty string
/// with an error log.
pub fn extract_text(path: &Path, file_type: &str) -> String {
    let result = match Format::from_extension(file_type) {
        Some(Format::Pdf) => extract_pdf(path),
        Some(Format::Spreadsheet) => extract_spreadsheet(path),
        Some(Format::Csv) => extract_csv(path),
        Some(Format::PlainText) => extract_plain_text(path),
        Some(Format::Docx) => extract_docx(path),
        Some(Format::Image) | None => return String::new(),
    };
    match result {
        Ok(text) => text,
        Err(e) => {
            error!(file = %path.display(), error = %e, "text extraction failed");
            String::new()
        }
    }
}

/// Layout-aware extraction first; on any failure fall back to a simpler
/// page-by-page pass. Both failing surfaces as one error at the boundary.
fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    match pdf_extract::extract_text(path) {
        Ok(text) => Ok(text.trim().to_string()),
        Err(primary) => {
            warn!(file = %path.display(), error = %primary, "primary PDF extractor failed, trying fallback");
            extract_pdf_fallback(path)
                .map_err(|fallback| ExtractError::Pdf(format!("{}; fallback: {}", primary, fallback)))
        }
    }
}

fn extract_pdf_fallback(path: &Path) -> Result<String, String> {
    let doc = lopdf::Document::load(path).map_err(|e| e.to_string())?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    let text = doc.extract_text(&pages).map_err(|e| e.to_string())?;
    Ok(text.trim().to_string())
}

/// All sheets, each rendered under a `--- Sheet: <name> ---` header as
/// tab-separated rows.
fn extract_spreadsheet(path: &Path) -> Result<String, ExtractError> {
    use calamine::{open_workbook_auto, Data, Reader};

    let mut workbook =
        open_workbook_auto(path).map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;
    let sheet_names = workbook.sheet_names().to_owned();
    let mut out = String::new();
    for name in sheet_names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;
        out.push_str(&format!("\n--- Sheet: {} ---\n", name));
        for row in range.rows() {
            if row.iter().all(|c| matches!(c, Data::Empty)) {
                continue;
            }
            let cells: Vec<String> = row
                .iter()
                .map(|c| match c {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
    }
    Ok(out.trim().to_string())
}

fn extract_csv(path: &Path) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ExtractError::Csv(e.to_string()))?;
    let mut lines = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ExtractError::Csv(e.to_string()))?;
        lines.push(record.iter().collect::<Vec<_>>().join("\t"));
    }
    Ok(lines.join("\n"))
}

/// Sniffs the byte encoding before decoding; UTF-8 wins when detection is
/// inconclusive.
fn extract_plain_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Text(e.to_string()))?;
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(&bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, _) = encoding.decode(&bytes);
    Ok(text.into_owned())
}

fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

/// Concatenates `w:t` text runs, breaking lines at paragraph ends.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_pdf(phrase: &str) -> Vec<u8> {
        let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", phrase);
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let o1 = out.len();
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        let o2 = out.len();
        out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
        let o3 = out.len();
        out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
        let o4 = out.len();
        out.extend_from_slice(
            format!("4 0 obj << /Length {} >> stream\n{}endstream endobj\n", stream.len(), stream)
                .as_bytes(),
        );
        let o5 = out.len();
        out.extend_from_slice(
            b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
        );
        let xref_start = out.len();
        out.extend_from_slice(b"xref\n0 6\n");
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in [o1, o2, o3, o4, o5] {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
        out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    fn minimal_docx(phrase: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
                phrase
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn format_dispatch_covers_supported_extensions() {
        assert_eq!(Format::from_extension(".pdf"), Some(Format::Pdf));
        assert_eq!(Format::from_extension(".xls"), Some(Format::Spreadsheet));
        assert_eq!(Format::from_extension(".md"), Some(Format::PlainText));
        assert_eq!(Format::from_extension(".jpeg"), Some(Format::Image));
        assert_eq!(Format::from_extension(".exe"), None);
    }

    #[test]
    fn unsupported_extension_yields_empty_text() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        std::fs::write(&path, b"\x00\x01\x02").unwrap();
        assert_eq!(extract_text(&path, ".bin"), "");
    }

    #[test]
    fn pdf_fallback_recovers_page_text() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("statement.pdf");
        std::fs::write(&path, minimal_pdf("Balance: $100")).unwrap();
        let text = extract_pdf_fallback(&path).unwrap();
        assert!(text.contains("Balance: $100"), "fallback text was: {}", text);
    }

    #[test]
    fn invalid_pdf_degrades_to_empty_without_panicking() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();
        assert_eq!(extract_text(&path, ".pdf"), "");
    }

    #[test]
    fn invalid_spreadsheet_degrades_to_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert_eq!(extract_text(&path, ".xlsx"), "");
    }

    #[test]
    fn csv_renders_tab_separated_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ledger.csv");
        std::fs::write(&path, "date,amount\n2021-06-01,2500.00\n").unwrap();
        let text = extract_text(&path, ".csv");
        assert!(text.contains("date\tamount"));
        assert!(text.contains("2021-06-01\t2500.00"));
    }

    #[test]
    fn plain_text_reads_utf8() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("note.txt");
        std::fs::write(&path, "transfer to account 4411\n").unwrap();
        assert_eq!(extract_text(&path, ".txt"), "transfer to account 4411\n");
    }

    #[test]
    fn plain_text_sniffs_legacy_encoding() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("memo.txt");
        std::fs::write(&path, b"r\xe9sum\xe9 attach\xe9 for the caf\xe9 meeting").unwrap();
        let text = extract_text(&path, ".txt");
        assert!(text.contains("café"), "decoded text was: {}", text);
    }

    #[test]
    fn docx_extracts_paragraph_text() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("agreement.docx");
        std::fs::write(&path, minimal_docx("purchase agreement draft")).unwrap();
        assert_eq!(extract_text(&path, ".docx"), "purchase agreement draft");
    }

    #[test]
    fn image_extension_yields_empty_text() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("scan.png");
        std::fs::write(&path, b"\x89PNG\r\n").unwrap();
        assert_eq!(extract_text(&path, ".png"), "");
    }
}
