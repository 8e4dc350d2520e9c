use crate::core::config::Config;
use crate::error::CoreError;

/// A unit of extracted content prior to chunking. Tabular/structured sources
/// (CSV rows, XML elements, JSON leaves) set `bypass_chunker` so they are
/// emitted one-chunk-per-record instead of being re-split by the semantic
/// chunker.
#[derive(Debug, Clone)]
pub struct PreChunk {
    pub content: String,
    pub chunk_type: String,
    pub bypass_chunker: bool,
    pub page_ref: Option<u32>,
}

impl PreChunk {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            chunk_type: "text".to_string(),
            bypass_chunker: false,
            page_ref: None,
        }
    }

    fn record(content: impl Into<String>, chunk_type: &str) -> Self {
        Self {
            content: content.into(),
            chunk_type: chunk_type.to_string(),
            bypass_chunker: true,
            page_ref: None,
        }
    }
}

pub trait Extractor: Send + Sync {
    fn can_handle(&self, ext: &str, mime: Option<&str>) -> bool;
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PreChunk>, CoreError>;
}

/// Decoder cascade: utf-8 first, then windows-1252 (covers cp1252 and, for
/// all but its five undefined bytes, latin-1 too), then a raw iso-8859-1
/// byte-identity mapping as the last resort — every byte is a valid
/// iso-8859-1 code point, so this final stage cannot itself fail.
fn decode_text(bytes: &[u8]) -> Result<String, CoreError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }
    let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }
    Ok(bytes.iter().map(|&b| b as char).collect())
}

struct PlainTextExtractor;
impl Extractor for PlainTextExtractor {
    fn can_handle(&self, ext: &str, _mime: Option<&str>) -> bool {
        matches!(ext, "txt" | "md" | "markdown")
    }
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PreChunk>, CoreError> {
        let text = decode_text(bytes)?;
        Ok(vec![PreChunk::text(text)])
    }
}

struct CsvExtractor;
impl Extractor for CsvExtractor {
    fn can_handle(&self, ext: &str, _mime: Option<&str>) -> bool {
        ext == "csv"
    }
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PreChunk>, CoreError> {
        let mut reader = csv::Reader::from_reader(bytes);
        let headers = reader
            .headers()
            .map_err(|e| CoreError::ParseFailed(e.to_string()))?
            .clone();
        let mut out = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| CoreError::ParseFailed(e.to_string()))?;
            let row = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| format!("{h}: {v}"))
                .collect::<Vec<_>>()
                .join("\n");
            out.push(PreChunk::record(row, "table_row"));
        }
        Ok(out)
    }
}

struct HtmlExtractor;
impl Extractor for HtmlExtractor {
    fn can_handle(&self, ext: &str, mime: Option<&str>) -> bool {
        ext == "html" || ext == "htm" || mime == Some("text/html")
    }
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PreChunk>, CoreError> {
        let raw = String::from_utf8(bytes.to_vec())
            .map_err(|e| CoreError::DecodeFailed(e.to_string()))?;
        let document = scraper::Html::parse_document(&raw);
        let drop_selector = scraper::Selector::parse("script, style").unwrap();
        let drop_ids: std::collections::HashSet<_> = document
            .select(&drop_selector)
            .map(|el| el.id())
            .collect();
        let mut text = String::new();
        for node in document.root_element().descendants() {
            if let Some(el) = node.value().as_element() {
                if drop_ids.contains(&node.id()) || el.name() == "script" || el.name() == "style" {
                    continue;
                }
            }
            if let Some(t) = node.value().as_text() {
                text.push_str(t);
                text.push(' ');
            }
        }
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(vec![PreChunk::text(collapsed)])
    }
}

struct JsonExtractor;
impl Extractor for JsonExtractor {
    fn can_handle(&self, ext: &str, _mime: Option<&str>) -> bool {
        ext == "json"
    }
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PreChunk>, CoreError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| CoreError::ParseFailed(e.to_string()))?;
        let mut out = Vec::new();
        flatten_json("$", &value, &mut out);
        Ok(out
            .into_iter()
            .map(|(path, leaf)| PreChunk::record(format!("{path}: {leaf}"), "json_leaf"))
            .collect())
    }
}

fn flatten_json(path: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                flatten_json(&format!("{path}.{k}"), v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_json(&format!("{path}[{i}]"), v, out);
            }
        }
        serde_json::Value::Null => {}
        other => out.push((path.to_string(), other.to_string())),
    }
}

struct XmlExtractor;
impl Extractor for XmlExtractor {
    fn can_handle(&self, ext: &str, _mime: Option<&str>) -> bool {
        ext == "xml"
    }
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PreChunk>, CoreError> {
        use quick_xml::events::Event;
        use quick_xml::reader::Reader;

        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut path: Vec<String> = Vec::new();
        let mut out = Vec::new();

        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| CoreError::ParseFailed(e.to_string()))?
            {
                Event::Start(e) => {
                    path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| CoreError::ParseFailed(e.to_string()))?
                        .trim()
                        .to_string();
                    if !text.is_empty() {
                        let tag_path = path.join("/");
                        out.push(PreChunk::record(format!("{tag_path}: {text}"), "xml_element"));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(out)
    }
}

struct WordExtractor;
impl Extractor for WordExtractor {
    fn can_handle(&self, ext: &str, _mime: Option<&str>) -> bool {
        ext == "docx"
    }
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PreChunk>, CoreError> {
        let docx = docx_rs::read_docx(bytes)
            .map_err(|e| CoreError::ParseFailed(format!("{e:?}")))?;
        let text = docx
            .document
            .children
            .iter()
            .filter_map(|child| match child {
                docx_rs::DocumentChild::Paragraph(p) => Some(paragraph_text(p)),
                _ => None,
            })
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>();
        Ok(text.into_iter().map(PreChunk::text).collect())
    }
}

fn paragraph_text(p: &docx_rs::Paragraph) -> String {
    p.children
        .iter()
        .filter_map(|c| match c {
            docx_rs::ParagraphChild::Run(r) => Some(
                r.children
                    .iter()
                    .filter_map(|rc| match rc {
                        docx_rs::RunChild::Text(t) => Some(t.text.clone()),
                        _ => None,
                    })
                    .collect::<String>(),
            ),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

struct PdfExtractor;
impl Extractor for PdfExtractor {
    fn can_handle(&self, ext: &str, _mime: Option<&str>) -> bool {
        ext == "pdf"
    }
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PreChunk>, CoreError> {
        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| CoreError::ParseFailed(e.to_string()))?;
        let mut chunks = Vec::new();
        for (page_num, page_id) in doc.get_pages() {
            let text = doc
                .extract_text(&[page_num])
                .unwrap_or_default();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                let mut chunk = PreChunk::text(trimmed.to_string());
                chunk.page_ref = Some(page_num);
                chunks.push(chunk);
            }
            let _ = page_id;
        }
        Ok(chunks)
    }
}

/// Number of leading pages sampled to decide whether a PDF is scanned.
pub const PDF_OCR_PROBE_PAGES: usize = 3;

/// True when the first `k` pages (in page-number order) all yield no
/// extractable text, meaning the PDF is a scan rather than native text —
/// the caller should re-extract via OCR instead of trusting this result.
pub fn pdf_scanned(bytes: &[u8], k: usize) -> Result<bool, CoreError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| CoreError::ParseFailed(e.to_string()))?;
    let mut page_nums: Vec<u32> = doc.get_pages().into_keys().collect();
    page_nums.sort_unstable();

    let probe = &page_nums[..k.min(page_nums.len())];
    if probe.is_empty() {
        return Ok(false);
    }
    Ok(probe
        .iter()
        .all(|&page_num| doc.extract_text(&[page_num]).unwrap_or_default().trim().is_empty()))
}

const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff"];

pub fn is_image_ext(ext: &str) -> bool {
    IMAGE_EXTS.contains(&ext)
}

#[derive(serde::Serialize)]
struct OcrRequest<'a> {
    filename: &'a str,
    content_type: Option<&'a str>,
    data: String,
}

#[derive(serde::Deserialize)]
struct OcrPage {
    page: u32,
    text: String,
}

#[derive(serde::Deserialize)]
struct OcrResponse {
    pages: Vec<OcrPage>,
}

/// Dispatches bytes to the external OCR endpoint (rasterize + recognize,
/// 300 DPI monochrome per page) and turns the page texts it returns into
/// `PreChunk`s. Used both for image uploads and for PDFs classified as
/// scanned by `pdf_scanned`.
pub async fn ocr_extract(
    http_client: &reqwest::Client,
    cfg: &Config,
    filename: &str,
    bytes: &[u8],
    content_type: Option<&str>,
) -> Result<Vec<PreChunk>, CoreError> {
    let url = cfg.ocr_endpoint_url.clone().ok_or_else(|| {
        CoreError::UnsupportedFormat("OCR endpoint is not configured".to_string())
    })?;

    use base64::Engine;
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);

    let response = http_client
        .post(&url)
        .json(&OcrRequest {
            filename,
            content_type,
            data,
        })
        .timeout(cfg.http_timeout)
        .send()
        .await
        .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?
        .error_for_status()
        .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?
        .json::<OcrResponse>()
        .await
        .map_err(|e| CoreError::DecodeFailed(e.to_string()))?;

    Ok(response
        .pages
        .into_iter()
        .filter(|p| !p.text.trim().is_empty())
        .map(|p| {
            let mut chunk = PreChunk::text(p.text);
            chunk.page_ref = Some(p.page);
            chunk
        })
        .collect())
}

pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self {
            extractors: vec![
                Box::new(PlainTextExtractor),
                Box::new(CsvExtractor),
                Box::new(HtmlExtractor),
                Box::new(JsonExtractor),
                Box::new(XmlExtractor),
                Box::new(WordExtractor),
                Box::new(PdfExtractor),
            ],
        }
    }
}

impl ExtractorRegistry {
    pub fn resolve(&self, ext: &str, mime: Option<&str>) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(ext, mime))
            .map(|e| e.as_ref())
    }
}

/// Top-level entry point: validates size, resolves an extractor, and runs
/// it. Images are not in the registry — `ingest_document` routes them (and
/// PDFs `pdf_scanned` flags) to `ocr_extract` before ever calling this.
pub fn extract(
    registry: &ExtractorRegistry,
    cfg: &Config,
    filename: &str,
    bytes: &[u8],
    mime: Option<&str>,
) -> Result<Vec<PreChunk>, CoreError> {
    if bytes.len() as u64 > cfg.max_file_size_bytes {
        return Err(CoreError::PayloadTooLarge {
            size: bytes.len() as u64,
            limit: cfg.max_file_size_bytes,
        });
    }

    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if is_image_ext(&ext) {
        return Err(CoreError::UnsupportedFormat(
            "image formats require OCR dispatch, not direct extraction".to_string(),
        ));
    }

    let extractor = registry
        .resolve(&ext, mime)
        .ok_or_else(|| CoreError::UnsupportedFormat(ext.clone()))?;

    extractor
        .extract(bytes)
        .map_err(|e| CoreError::ExtractionFailed {
            filename: filename.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_extensions() {
        let registry = ExtractorRegistry::default();
        assert!(registry.resolve("csv", None).is_some());
        assert!(registry.resolve("txt", None).is_some());
        assert!(registry.resolve("unknown_ext", None).is_none());
    }

    #[test]
    fn csv_extractor_emits_one_prechunk_per_row() {
        let extractor = CsvExtractor;
        let csv_bytes = b"name,age\nAlice,30\nBob,40\n";
        let chunks = extractor.extract(csv_bytes).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].bypass_chunker);
        assert!(chunks[0].content.contains("Alice"));
    }

    #[test]
    fn json_extractor_flattens_nested_leaves() {
        let extractor = JsonExtractor;
        let json = br#"{"a": {"b": 1, "c": [2, 3]}}"#;
        let chunks = extractor.extract(json).unwrap();
        assert_eq!(chunks.len(), 3);
    }
}
