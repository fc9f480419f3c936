//! PDF reading: page geometry, positioned words, and plain text.
//!
//! Extraction is two-staged like the rest of the pipeline expects:
//! the primary backend is pure-Rust (lopdf), walking each page's content
//! stream to recover word boxes and asking lopdf for its own reading-order
//! text. When lopdf cannot parse a document at all, the whole document
//! falls back to the `pdftotext` binary, which yields plain text only
//! (form-feed separated pages, no positions).

use anyhow::{Context, Result};
use lopdf::content::Content;
use lopdf::{Document, Object};
use uuid::Uuid;

/// One word with its position on the page. Coordinates use a top-left
/// origin (`top` grows downward), which is what the layout heuristics
/// reason in.
#[derive(Debug, Clone)]
pub struct WordBox {
    pub text: String,
    pub x: f32,
    pub top: f32,
}

/// One page of positioned words plus, when available, the backend's own
/// reading-order text.
#[derive(Debug, Clone)]
pub struct Page {
    pub number: u32,
    pub width: f32,
    pub height: f32,
    pub words: Vec<WordBox>,
    pub plain_text: Option<String>,
}

const DEFAULT_PAGE_WIDTH: f32 = 612.0;
const DEFAULT_PAGE_HEIGHT: f32 = 792.0;

/// Parse a PDF from memory and return its pages.
///
/// Per-page problems (undecodable content stream, failed text extraction)
/// are recovered locally: the page is still emitted, possibly with empty
/// words or text, and the layout stage decides whether anything usable
/// remains. Only a document-level parse failure is an error.
pub fn read_pages(data: &[u8]) -> Result<Vec<Page>> {
    let doc = match Document::load_mem(data) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!(error = %err, "lopdf failed to parse document, trying pdftotext");
            return pdftotext_pages(data);
        }
    };

    let mut pages = Vec::new();
    for (number, page_id) in doc.get_pages() {
        let (width, height) = page_geometry(&doc, page_id);

        let words = match doc.get_page_content(page_id) {
            Ok(content) => extract_word_boxes(&content, height),
            Err(err) => {
                tracing::debug!(page = number, error = %err, "no readable content stream");
                Vec::new()
            }
        };

        let plain_text = match doc.extract_text(&[number]) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(page = number, error = %err, "lopdf text extraction failed");
                None
            }
        };

        pages.push(Page {
            number,
            width,
            height,
            words,
            plain_text,
        });
    }

    Ok(pages)
}

fn object_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn page_geometry(doc: &Document, page_id: lopdf::ObjectId) -> (f32, f32) {
    let media_box = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|dict| dict.get(b"MediaBox").ok())
        .and_then(|obj| obj.as_array().ok())
        .map(|arr| {
            let values: Vec<f32> = arr.iter().filter_map(object_number).collect();
            values
        });

    match media_box.as_deref() {
        Some([x0, y0, x1, y1]) => ((x1 - x0).abs(), (y1 - y0).abs()),
        _ => (DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT),
    }
}

/// Text-state tracker for the content-stream walk. Only the translation
/// part of the text matrix matters for line banding; rotation and skew are
/// rare in the target corpus and are ignored.
struct TextCursor {
    x: f32,
    y: f32,
    line_x: f32,
    leading: f32,
    font_size: f32,
}

impl TextCursor {
    fn new() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            line_x: 0.0,
            leading: 0.0,
            font_size: 12.0,
        }
    }

    fn next_line(&mut self) {
        self.y -= self.leading.max(self.font_size);
        self.x = self.line_x;
    }
}

/// Recover word boxes by interpreting the text operators of a page content
/// stream. Horizontal advance inside a shown string is estimated from the
/// font size; the estimate only needs to preserve relative word order,
/// which is all the layout strategies consume.
fn extract_word_boxes(content: &[u8], page_height: f32) -> Vec<WordBox> {
    let content = match Content::decode(content) {
        Ok(content) => content,
        Err(err) => {
            tracing::debug!(error = %err, "content stream decode failed");
            return Vec::new();
        }
    };

    let mut cursor = TextCursor::new();
    let mut words = Vec::new();

    for op in &content.operations {
        match op.operator.as_str() {
            "BT" => cursor = TextCursor::new(),
            "Tf" => {
                if let Some(size) = op.operands.get(1).and_then(object_number) {
                    cursor.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = op.operands.first().and_then(object_number) {
                    cursor.leading = leading;
                }
            }
            "Td" | "TD" => {
                let tx = op.operands.first().and_then(object_number).unwrap_or(0.0);
                let ty = op.operands.get(1).and_then(object_number).unwrap_or(0.0);
                if op.operator == "TD" {
                    cursor.leading = -ty;
                }
                cursor.line_x += tx;
                cursor.x = cursor.line_x;
                cursor.y += ty;
            }
            "Tm" => {
                let e = op.operands.get(4).and_then(object_number).unwrap_or(0.0);
                let f = op.operands.get(5).and_then(object_number).unwrap_or(0.0);
                cursor.line_x = e;
                cursor.x = e;
                cursor.y = f;
            }
            "T*" => cursor.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    show_text(bytes, &mut cursor, page_height, &mut words);
                }
            }
            "'" => {
                cursor.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    show_text(bytes, &mut cursor, page_height, &mut words);
                }
            }
            "\"" => {
                cursor.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    show_text(bytes, &mut cursor, page_height, &mut words);
                }
            }
            "TJ" => {
                if let Some(Object::Array(parts)) = op.operands.first() {
                    for part in parts {
                        match part {
                            Object::String(bytes, _) => {
                                show_text(bytes, &mut cursor, page_height, &mut words);
                            }
                            other => {
                                if let Some(adjust) = object_number(other) {
                                    cursor.x -= adjust / 1000.0 * cursor.font_size;
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    words
}

/// Decode a PDF string best-effort: UTF-16BE when marked with a BOM,
/// Latin-1 otherwise. Exotic font encodings degrade gracefully; the layout
/// stage's content heuristics reject unusable output and lopdf's own
/// extraction covers the plain-text path with full font handling.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Average glyph advance as a fraction of font size, for x estimation.
const GLYPH_ADVANCE_RATIO: f32 = 0.5;

fn show_text(bytes: &[u8], cursor: &mut TextCursor, page_height: f32, words: &mut Vec<WordBox>) {
    let decoded = decode_pdf_string(bytes);
    if decoded.is_empty() {
        return;
    }

    let advance = cursor.font_size * GLYPH_ADVANCE_RATIO;
    let top = page_height - cursor.y;
    let mut x = cursor.x;
    let mut current = String::new();

    for c in decoded.chars() {
        if c.is_whitespace() {
            if !current.is_empty() {
                let width = current.chars().count() as f32 * advance;
                words.push(WordBox {
                    text: std::mem::take(&mut current),
                    x,
                    top,
                });
                x += width;
            }
            x += advance;
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        let width = current.chars().count() as f32 * advance;
        words.push(WordBox { text: current, x, top });
        x += width;
    }

    cursor.x = x;
}

/// Whole-document fallback through the `pdftotext` binary. Pages come back
/// form-feed separated with layout preserved but no positions.
fn pdftotext_pages(data: &[u8]) -> Result<Vec<Page>> {
    let temp_file = std::env::temp_dir().join(format!("local_pdf_qa_{}.pdf", Uuid::new_v4()));
    std::fs::write(&temp_file, data).context("failed to write temp PDF for pdftotext")?;

    let output = std::process::Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(&temp_file)
        .arg("-")
        .output();
    let _ = std::fs::remove_file(&temp_file);

    let output = output.context("pdftotext command failed (is poppler installed?)")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("pdftotext failed: {}", stderr);
    }

    let text = String::from_utf8_lossy(&output.stdout).to_string();
    if text.trim().is_empty() {
        anyhow::bail!("pdftotext produced no text output");
    }

    let pages = text
        .split('\u{0c}')
        .enumerate()
        .filter(|(_, page_text)| !page_text.trim().is_empty())
        .map(|(idx, page_text)| Page {
            number: idx as u32 + 1,
            width: DEFAULT_PAGE_WIDTH,
            height: DEFAULT_PAGE_HEIGHT,
            words: Vec::new(),
            plain_text: Some(page_text.to_string()),
        })
        .collect();

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tj(text: &str) -> lopdf::content::Operation {
        lopdf::content::Operation::new(
            "Tj",
            vec![Object::String(
                text.as_bytes().to_vec(),
                lopdf::StringFormat::Literal,
            )],
        )
    }

    fn td(x: f32, y: f32) -> lopdf::content::Operation {
        lopdf::content::Operation::new("Td", vec![x.into(), y.into()])
    }

    fn encode(ops: Vec<lopdf::content::Operation>) -> Vec<u8> {
        Content { operations: ops }.encode().expect("encodable content")
    }

    #[test]
    fn word_boxes_track_position_and_order() {
        let content = encode(vec![
            lopdf::content::Operation::new("BT", vec![]),
            lopdf::content::Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 12.0_f32.into()]),
            td(72.0, 700.0),
            tj("gecme notu"),
            td(0.0, -20.0),
            tj("ikinci satir"),
            lopdf::content::Operation::new("ET", vec![]),
        ]);

        let words = extract_word_boxes(&content, 792.0);
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["gecme", "notu", "ikinci", "satir"]);

        // First line sits above the second (smaller `top`).
        assert!(words[0].top < words[2].top);
        // Words on the same line advance to the right.
        assert!(words[0].x < words[1].x);
    }

    #[test]
    fn tm_resets_position() {
        let content = encode(vec![
            lopdf::content::Operation::new("BT", vec![]),
            lopdf::content::Operation::new(
                "Tm",
                vec![
                    1.0_f32.into(),
                    0.0_f32.into(),
                    0.0_f32.into(),
                    1.0_f32.into(),
                    300.0_f32.into(),
                    400.0_f32.into(),
                ],
            ),
            tj("sag sutun"),
            lopdf::content::Operation::new("ET", vec![]),
        ]);

        let words = extract_word_boxes(&content, 792.0);
        assert_eq!(words.len(), 2);
        assert!(words[0].x >= 300.0);
        assert!((words[0].top - 392.0).abs() < 0.01);
    }

    #[test]
    fn utf16_strings_decode() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "büt".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_pdf_string(&bytes), "büt");
    }

    #[test]
    fn unreadable_content_yields_no_words() {
        assert!(extract_word_boxes(b"\xff\xfe garbage", 792.0).is_empty());
    }
}
