//! Source map (v3) generation for rendered output.
//!
//! Mappings are rebuilt from the render piece stream: retained original
//! chunks map back to their source positions (per character in hires mode),
//! replacement text maps its first character to the start of the span it
//! replaced, and front-inserted text is unmapped.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

use crate::edits::Piece;

const VLQ_CHARS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, Default)]
pub struct SourceMapOptions {
    /// Name recorded in `sources` (typically the module id).
    pub source: Option<String>,
    /// Name of the generated file, if known.
    pub file: Option<String>,
    /// Embed the original text in `sourcesContent`.
    pub include_content: bool,
    /// Emit one mapping per character instead of one per run/line.
    pub hires: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// A `None` entry serializes as `null`, the anonymous-source form.
    pub sources: Vec<Option<String>>,
    pub sources_content: Vec<Option<String>>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Inline `data:` URL form, suitable for a `sourceMappingURL` comment.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:application/json;charset=utf-8;base64,{}",
            STANDARD.encode(self.to_json())
        )
    }
}

pub(crate) fn build_source_map(
    source: &str,
    pieces: &[Piece<'_>],
    options: &SourceMapOptions,
) -> SourceMap {
    let index = LineIndex::new(source);
    let mut builder = MappingsBuilder::default();

    for piece in pieces {
        match piece {
            Piece::Synthetic { text } => builder.advance(text),
            Piece::Replacement { src, text } => {
                let (line, col) = index.position(source, *src);
                builder.segment(line, col);
                builder.advance(text);
            }
            Piece::Retained { src, text } => {
                let (mut line, mut col) = index.position(source, *src);
                let mut pending = true;
                for ch in text.chars() {
                    if ch == '\n' {
                        builder.newline();
                        line += 1;
                        col = 0;
                        pending = true;
                    } else {
                        if pending || options.hires {
                            builder.segment(line, col);
                            pending = false;
                        }
                        builder.advance_col();
                        col += 1;
                    }
                }
            }
        }
    }

    SourceMap {
        version: 3,
        file: options.file.clone(),
        sources: vec![options.source.clone().or_else(|| options.file.clone())],
        sources_content: vec![options
            .include_content
            .then(|| source.to_string())],
        names: Vec::new(),
        mappings: builder.mappings,
    }
}

/// Byte offsets of line starts in the original text.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    /// (zero-based line, column in chars) of a byte offset.
    fn position(&self, source: &str, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let col = source[self.starts[line]..offset].chars().count();
        (line, col)
    }
}

#[derive(Default)]
struct MappingsBuilder {
    mappings: String,
    gen_col: usize,
    prev_gen_col: i64,
    prev_src_line: i64,
    prev_src_col: i64,
}

impl MappingsBuilder {
    fn segment(&mut self, src_line: usize, src_col: usize) {
        if !self.mappings.is_empty() && !self.mappings.ends_with(';') {
            self.mappings.push(',');
        }
        encode_vlq(self.gen_col as i64 - self.prev_gen_col, &mut self.mappings);
        self.prev_gen_col = self.gen_col as i64;
        // Single-source map: the source index delta is always zero.
        encode_vlq(0, &mut self.mappings);
        encode_vlq(src_line as i64 - self.prev_src_line, &mut self.mappings);
        self.prev_src_line = src_line as i64;
        encode_vlq(src_col as i64 - self.prev_src_col, &mut self.mappings);
        self.prev_src_col = src_col as i64;
    }

    fn newline(&mut self) {
        self.mappings.push(';');
        self.gen_col = 0;
        self.prev_gen_col = 0;
    }

    fn advance_col(&mut self) {
        self.gen_col += 1;
    }

    fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.newline();
            } else {
                self.gen_col += 1;
            }
        }
    }
}

fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq: u64 = if value < 0 {
        (((-value) as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(VLQ_CHARS[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn vlq_encodes_known_values() {
        let mut out = String::new();
        encode_vlq(0, &mut out);
        assert_eq!(out, "A");
        out.clear();
        encode_vlq(1, &mut out);
        assert_eq!(out, "C");
        out.clear();
        encode_vlq(-1, &mut out);
        assert_eq!(out, "D");
        out.clear();
        encode_vlq(16, &mut out);
        assert_eq!(out, "gB");
    }

    #[test]
    fn identity_map_of_single_line() {
        let source = "abc";
        let pieces = vec![Piece::Retained { src: 0, text: "abc" }];
        let map = build_source_map(source, &pieces, &SourceMapOptions::default());
        assert_eq!(map.version, 3);
        // One segment at generated (0,0) -> original (0,0).
        assert_eq!(map.mappings, "AAAA");
    }

    #[test]
    fn synthetic_prefix_shifts_mapped_lines() {
        let source = "abc\n";
        let pieces = vec![
            Piece::Synthetic { text: "pre\n" },
            Piece::Retained { src: 0, text: "abc\n" },
        ];
        let map = build_source_map(source, &pieces, &SourceMapOptions::default());
        // First generated line (the prefix) has no segments.
        assert_eq!(map.mappings, ";AAAA;");
    }

    #[test]
    fn hires_emits_a_segment_per_character() {
        let source = "ab";
        let pieces = vec![Piece::Retained { src: 0, text: "ab" }];
        let options = SourceMapOptions {
            hires: true,
            ..Default::default()
        };
        let map = build_source_map(source, &pieces, &options);
        assert_eq!(map.mappings, "AAAA,CAAC");
    }

    #[test]
    fn source_name_falls_back_to_file_then_null() {
        let source = "x";
        let pieces = vec![Piece::Retained { src: 0, text: "x" }];
        let named = build_source_map(
            source,
            &pieces,
            &SourceMapOptions {
                source: Some("mod.ts".to_string()),
                file: Some("mod.out.ts".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(named.sources, vec![Some("mod.ts".to_string())]);
        let from_file = build_source_map(
            source,
            &pieces,
            &SourceMapOptions {
                file: Some("mod.out.ts".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(from_file.sources, vec![Some("mod.out.ts".to_string())]);
        let anonymous = build_source_map(source, &pieces, &SourceMapOptions::default());
        assert_eq!(anonymous.sources, vec![None]);
        assert!(anonymous.to_json().contains("\"sources\":[null]"));
    }

    #[test]
    fn content_is_embedded_only_on_request() {
        let source = "abc";
        let pieces = vec![Piece::Retained { src: 0, text: "abc" }];
        let without = build_source_map(source, &pieces, &SourceMapOptions::default());
        assert_eq!(without.sources_content, vec![None]);
        let with = build_source_map(
            source,
            &pieces,
            &SourceMapOptions {
                include_content: true,
                ..Default::default()
            },
        );
        assert_eq!(with.sources_content, vec![Some("abc".to_string())]);
    }

    #[test]
    fn data_url_is_base64_json() {
        let source = "x";
        let pieces = vec![Piece::Retained { src: 0, text: "x" }];
        let map = build_source_map(source, &pieces, &SourceMapOptions::default());
        let url = map.to_data_url();
        assert!(url.starts_with("data:application/json;charset=utf-8;base64,"));
    }
}
