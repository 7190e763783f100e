// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — lay plain text out onto A4 pages using `printpdf` 0.8.
//
// printpdf 0.8 builds documents from `PdfPage` values holding `Vec<Op>`
// operation lists, serialised in one go by `PdfDocument::save()`.

use docwerk_core::error::DocwerkError;
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, TextItem,
};
use tracing::{debug, instrument};

const A4_WIDTH_MM: f32 = 210.0;
const A4_HEIGHT_MM: f32 = 297.0;

/// Produces text-only PDFs. Used by the text-reconstruction conversion
/// strategy when no office engine is installed.
pub struct PdfWriter {
    width: Mm,
    height: Mm,
    font_size_pt: f32,
    title: Option<String>,
}

impl PdfWriter {
    pub fn a4() -> Self {
        Self {
            width: Mm(A4_WIDTH_MM),
            height: Mm(A4_HEIGHT_MM),
            font_size_pt: 11.0,
            title: None,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Create a PDF from plain text content.
    ///
    /// Lines are word-wrapped at an estimated Helvetica glyph width and pages
    /// break automatically. Empty input yields a single blank page.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn create_from_text(&self, text: &str) -> Result<Vec<u8>, DocwerkError> {
        let title = self.title.as_deref().unwrap_or("Docwerk Document");

        let line_height_pt = self.font_size_pt * 1.3;
        let margin_mm: f32 = 20.0;
        let margin_pt = Mm(margin_mm).into_pt().0;
        let usable_width_mm = self.width.0 - 2.0 * margin_mm;

        // Helvetica averages about half an em per glyph; 1pt = 0.3528mm.
        let avg_char_width_mm = 0.50 * self.font_size_pt * 0.3528;
        let max_chars = ((usable_width_mm / avg_char_width_mm) as usize).max(1);

        let lines = wrap_text(text, max_chars);
        let page_h_pt = self.height.into_pt().0;
        let lines_per_page = (((page_h_pt - 2.0 * margin_pt) / line_height_pt) as usize).max(1);

        let mut pages: Vec<PdfPage> = lines
            .chunks(lines_per_page)
            .map(|chunk| {
                let mut ops = Vec::with_capacity(chunk.len() * 5);
                for (idx, line) in chunk.iter().enumerate() {
                    let y_pt = page_h_pt - margin_pt - idx as f32 * line_height_pt;
                    ops.push(Op::StartTextSection);
                    ops.push(Op::SetTextCursor {
                        pos: Point {
                            x: Pt(margin_pt),
                            y: Pt(y_pt),
                        },
                    });
                    ops.push(Op::SetFontSizeBuiltinFont {
                        size: Pt(self.font_size_pt),
                        font: BuiltinFont::Helvetica,
                    });
                    ops.push(Op::WriteTextBuiltinFont {
                        items: vec![TextItem::Text(line.clone())],
                        font: BuiltinFont::Helvetica,
                    });
                    ops.push(Op::EndTextSection);
                }
                PdfPage::new(self.width, self.height, ops)
            })
            .collect();

        if pages.is_empty() {
            pages.push(PdfPage::new(self.width, self.height, Vec::new()));
        }

        let mut doc = PdfDocument::new(title);
        doc.with_pages(pages);
        debug!(lines = lines.len(), pages = doc.pages.len(), "text layout complete");

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }
}

/// Wrap text so that no line exceeds `max_width` characters.
///
/// Existing newlines are kept; words longer than a line are broken on
/// character boundaries.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut result = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();

            if word_len > max_width {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let chars: Vec<char> = word.chars().collect();
                let mut pieces = chars.chunks(max_width).peekable();
                while let Some(piece) = pieces.next() {
                    if pieces.peek().is_some() {
                        result.push(piece.iter().collect());
                    } else {
                        current = piece.iter().collect();
                        current_len = piece.len();
                    }
                }
            } else if current.is_empty() {
                current.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len <= max_width {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
            } else {
                result.push(std::mem::replace(&mut current, word.to_string()));
                current_len = word_len;
            }
        }

        result.push(current);
    }

    while result.last().is_some_and(|l| l.is_empty()) {
        result.pop();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::PdfReader;

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn wrap_breaks_long_words_on_char_boundaries() {
        let lines = wrap_text("ééééééé", 3);
        assert_eq!(lines, vec!["ééé", "ééé", "é"]);
    }

    #[test]
    fn wrap_keeps_blank_lines_between_paragraphs() {
        let lines = wrap_text("one\n\ntwo\n\n", 80);
        assert_eq!(lines, vec!["one", "", "two"]);
    }

    #[test]
    fn long_text_spans_pages() {
        let text = (0..200).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let pdf = PdfWriter::a4().create_from_text(&text).expect("create");
        let reader = PdfReader::from_bytes(&pdf).expect("load");
        assert!(reader.page_count() >= 3);
    }

    #[test]
    fn empty_text_is_one_blank_page() {
        let pdf = PdfWriter::a4().create_from_text("").expect("create");
        assert_eq!(PdfReader::from_bytes(&pdf).expect("load").page_count(), 1);
    }
}
