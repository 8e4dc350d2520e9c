use once_cell_lazy::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::core::config::Config;
use crate::core::types::Chunk;
use crate::ingest::extract::PreChunk;

mod once_cell_lazy {
    /// A tiny lazily-initialized static without adding `once_cell` to the
    /// dependency list (already using `std::sync::OnceLock`).
    pub struct Lazy<T>(std::sync::OnceLock<T>, fn() -> T);
    impl<T> Lazy<T> {
        pub const fn new(f: fn() -> T) -> Self {
            Self(std::sync::OnceLock::new(), f)
        }
    }
    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.0.get_or_init(self.1)
        }
    }
}

static STRUCTURE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)chapter\s+\d+",
        r"(?i)section\s+\d+",
        r"(?im)^\d+\.\s+",
        r"(?im)^\w+\s+\d+\.",
        r"(?i)part\s+\d+",
        r"(?i)article\s+\d+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static SECTION_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(chapter|section|part|article)\s+(\d+[\.\d]*)\s*[:\.]?\s*(.*)").unwrap()
});

const MIN_CHUNK_LEN: usize = 50;

fn detect_structure(text: &str) -> bool {
    let matches = STRUCTURE_PATTERNS
        .iter()
        .filter(|re| re.is_match(text))
        .count();
    matches >= 2
}

fn find_break_point(lines: &[&str], target: usize) -> usize {
    let upper = target.min(lines.len());
    for i in (0..upper).rev() {
        if lines[i].trim().is_empty() {
            return i;
        }
    }
    for i in (0..upper).rev() {
        let trimmed = lines[i].trim_end();
        if trimmed.ends_with('.') || trimmed.ends_with('!') || trimmed.ends_with('?') {
            return i + 1;
        }
    }
    lines.len() / 2
}

/// Capitalizes a matched heading keyword (`SECTION`/`section` -> `Section`)
/// to build a stable section label regardless of the source's casing.
fn capitalize_keyword(keyword: &str) -> String {
    let mut chars = keyword.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Splits freeform text on detected structural headings, tagging each
/// resulting chunk with the section label (e.g. "Section 302") active when
/// its content was written, so downstream attribution can cite it.
fn structured_chunking(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<(String, Option<String>)> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;
    let mut current_section: Option<String> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if let Some(caps) = SECTION_HEADER.captures(line.trim()) {
            let text_so_far = current.join("\n");
            if text_so_far.trim().len() >= MIN_CHUNK_LEN {
                chunks.push((text_so_far, current_section.clone()));
            }
            current.clear();
            current_len = 0;
            let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let number = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            current_section = Some(format!("{} {}", capitalize_keyword(keyword), number));
        }
        current.push(line);
        current_len += line.len() + 1;

        if current_len > chunk_size && current.len() > 1 {
            let break_point = find_break_point(&current, current.len());
            let head: Vec<&str> = current[..break_point.max(1)].to_vec();
            chunks.push((head.join("\n"), current_section.clone()));
            let overlap_start = break_point.saturating_sub(chunk_overlap / 100).max(0);
            current = current[overlap_start..].to_vec();
            current_len = current.iter().map(|l| l.len() + 1).sum();
        }
        i += 1;
    }

    let remainder = current.join("\n");
    if remainder.trim().len() >= MIN_CHUNK_LEN {
        chunks.push((remainder, current_section));
    }
    chunks
}

const SEPARATORS: &[&str] = &["\n\n", "\n", ".", "!", "?", " ", ""];

fn recursive_split(text: &str, chunk_size: usize, separators: &[&str]) -> Vec<String> {
    if text.len() <= chunk_size || separators.is_empty() {
        return vec![text.to_string()];
    }

    let (sep, rest) = (separators[0], &separators[1..]);
    let pieces: Vec<&str> = if sep.is_empty() {
        text.split("").filter(|s| !s.is_empty()).collect()
    } else {
        text.split(sep).collect()
    };

    let mut out = Vec::new();
    let mut buffer = String::new();
    for piece in pieces {
        let candidate = if buffer.is_empty() {
            piece.to_string()
        } else {
            format!("{buffer}{sep}{piece}")
        };
        if candidate.len() > chunk_size && !buffer.is_empty() {
            out.push(buffer.clone());
            buffer = piece.to_string();
        } else {
            buffer = candidate;
        }
    }
    if !buffer.is_empty() {
        out.push(buffer);
    }

    out.into_iter()
        .flat_map(|piece| {
            if piece.len() > chunk_size {
                recursive_split(&piece, chunk_size, rest)
            } else {
                vec![piece]
            }
        })
        .collect()
}

fn unstructured_chunking(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let pieces = recursive_split(text, chunk_size, SEPARATORS);
    if chunk_overlap == 0 || pieces.len() < 2 {
        return pieces;
    }
    let mut out = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        if i == 0 {
            out.push(piece.clone());
            continue;
        }
        let prev = &pieces[i - 1];
        let overlap_len = chunk_overlap.min(prev.len());
        let tail = &prev[prev.len() - overlap_len..];
        out.push(format!("{tail}{piece}"));
    }
    out
}

/// Splits a pre-extracted document into chunks. Tabular PreChunks bypass the
/// chunker and become one chunk each; freeform text is dispatched to the
/// structured or unstructured strategy based on heading-density detection.
pub fn chunk_document(
    cfg: &Config,
    document_id: &str,
    filename: &str,
    prechunks: &[PreChunk],
) -> Vec<Chunk> {
    let mut out = Vec::new();
    let mut index = 0usize;

    let freeform: Vec<&PreChunk> = prechunks.iter().filter(|p| !p.bypass_chunker).collect();
    let structured: Vec<&PreChunk> = prechunks.iter().filter(|p| p.bypass_chunker).collect();

    for p in structured {
        out.push(Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            content: p.content.clone(),
            chunk_type: p.chunk_type.clone(),
            chunk_index: index,
            domain: String::new(),
            page_refs: p.page_ref.into_iter().collect(),
            title: filename.to_string(),
            section: None,
            metadata: Default::default(),
        });
        index += 1;
    }

    if !freeform.is_empty() {
        let combined = freeform
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let page_refs: Vec<u32> = freeform.iter().filter_map(|p| p.page_ref).collect();

        let pieces: Vec<(String, Option<String>)> = if detect_structure(&combined) {
            structured_chunking(&combined, cfg.chunk_size, cfg.chunk_overlap)
        } else {
            unstructured_chunking(&combined, cfg.chunk_size, cfg.chunk_overlap)
                .into_iter()
                .map(|piece| (piece, None))
                .collect()
        };

        for (piece, section) in pieces {
            if piece.trim().is_empty() {
                continue;
            }
            out.push(Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                filename: filename.to_string(),
                content: piece,
                chunk_type: "semantic".to_string(),
                chunk_index: index,
                domain: String::new(),
                page_refs: page_refs.clone(),
                title: filename.to_string(),
                section,
                metadata: Default::default(),
            });
            index += 1;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_structure_with_two_or_more_markers() {
        let text = "Chapter 1\nintro text\nChapter 2\nmore text";
        assert!(detect_structure(text));
        assert!(!detect_structure("just some plain prose with no headings"));
    }

    #[test]
    fn unstructured_chunking_respects_size_roughly() {
        let text = "word ".repeat(500);
        let chunks = unstructured_chunking(&text, 200, 0);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn structured_chunking_splits_on_headers() {
        let text = "Chapter 1: Intro\nsome body text here that is long enough to count.\nChapter 2: Next\nmore body text that is also long enough to count as a chunk.";
        let chunks = structured_chunking(text, 10_000, 400);
        assert!(chunks.len() >= 1);
    }

    #[test]
    fn structured_chunking_tags_section_labels() {
        let text = "Section 302: Punishment for murder\nWhoever commits murder shall be punished with death or imprisonment for life.";
        let chunks = structured_chunking(text, 10_000, 400);
        assert!(chunks.iter().any(|(_, section)| section.as_deref() == Some("Section 302")));
    }

    #[test]
    fn exactly_fifty_chars_is_retained_but_forty_nine_is_dropped() {
        let fifty = "a".repeat(50);
        let forty_nine = "a".repeat(49);
        assert!(fifty.trim().len() >= MIN_CHUNK_LEN);
        assert!(forty_nine.trim().len() < MIN_CHUNK_LEN);
    }
}
