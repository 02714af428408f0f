//! Position-tracked edit buffer over one module's original text.
//!
//! Edits are recorded against original byte offsets and applied in a single
//! assembly pass at render time. Edits must target disjoint regions, with
//! one exception: a region may be overwritten and later removed as part of
//! a hoist (the overwritten text is expected to have been captured with
//! [`SourceEditor::slice`] and re-inserted via [`SourceEditor::prepend`]).
//! Rendering treats such a removal as subsuming the contained edit, so the
//! region is never counted twice.

use crate::sourcemap::{build_source_map, SourceMap, SourceMapOptions};

#[derive(Debug)]
enum Edit {
    Overwrite {
        start: usize,
        end: usize,
        text: String,
    },
    Remove {
        start: usize,
        end: usize,
    },
}

impl Edit {
    fn start(&self) -> usize {
        match self {
            Edit::Overwrite { start, .. } | Edit::Remove { start, .. } => *start,
        }
    }

    fn end(&self) -> usize {
        match self {
            Edit::Overwrite { end, .. } | Edit::Remove { end, .. } => *end,
        }
    }
}

/// One span of rendered output, tagged with where it came from.
#[derive(Debug)]
pub(crate) enum Piece<'a> {
    /// Original text kept as-is, starting at this original byte offset.
    Retained { src: usize, text: &'a str },
    /// Replacement text standing in for the original span starting here.
    Replacement { src: usize, text: &'a str },
    /// Front-inserted text with no original position.
    Synthetic { text: &'a str },
}

pub struct SourceEditor<'a> {
    source: &'a str,
    edits: Vec<Edit>,
    /// Stack of front insertions; the last pushed renders first.
    prepends: Vec<String>,
}

impl<'a> SourceEditor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            edits: Vec::new(),
            prepends: Vec::new(),
        }
    }

    pub fn overwrite(&mut self, start: usize, end: usize, text: String) {
        debug_assert!(start <= end && end <= self.source.len());
        self.edits.push(Edit::Overwrite { start, end, text });
    }

    pub fn remove(&mut self, start: usize, end: usize) {
        debug_assert!(start <= end && end <= self.source.len());
        self.edits.push(Edit::Remove { start, end });
    }

    pub fn prepend(&mut self, text: String) {
        self.prepends.push(text);
    }

    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty() || !self.prepends.is_empty()
    }

    /// Content of `[start, end)` with all edits recorded so far applied.
    /// Only edits fully contained in the range participate.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let inner = self.ordered_edits(|e| e.start() >= start && e.end() <= end);
        let mut out = String::new();
        let mut cursor = start;
        for edit in inner {
            out.push_str(&self.source[cursor..edit.start()]);
            if let Edit::Overwrite { text, .. } = edit {
                out.push_str(text);
            }
            cursor = edit.end();
        }
        out.push_str(&self.source[cursor..end]);
        out
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for piece in self.pieces() {
            match piece {
                Piece::Retained { text, .. }
                | Piece::Replacement { text, .. }
                | Piece::Synthetic { text } => out.push_str(text),
            }
        }
        out
    }

    pub fn source_map(&self, options: &SourceMapOptions) -> SourceMap {
        build_source_map(self.source, &self.pieces(), options)
    }

    /// Edits sorted by position, with edits subsumed by an enclosing
    /// removal dropped. Ties on start sort the wider edit first so the
    /// enclosing removal wins.
    fn ordered_edits(&self, keep: impl Fn(&Edit) -> bool) -> Vec<&Edit> {
        let mut sorted: Vec<&Edit> = self.edits.iter().filter(|e| keep(e)).collect();
        sorted.sort_by(|a, b| a.start().cmp(&b.start()).then(b.end().cmp(&a.end())));
        let mut out: Vec<&Edit> = Vec::new();
        let mut covered = 0usize;
        for edit in sorted {
            if out.is_empty() || edit.start() >= covered {
                covered = edit.end();
                out.push(edit);
            }
        }
        out
    }

    fn pieces(&self) -> Vec<Piece<'_>> {
        let mut pieces: Vec<Piece<'_>> = Vec::new();
        for text in self.prepends.iter().rev() {
            pieces.push(Piece::Synthetic {
                text: text.as_str(),
            });
        }
        let mut cursor = 0usize;
        for edit in self.ordered_edits(|_| true) {
            if edit.start() > cursor {
                pieces.push(Piece::Retained {
                    src: cursor,
                    text: &self.source[cursor..edit.start()],
                });
            }
            if let Edit::Overwrite { start, text, .. } = edit {
                if !text.is_empty() {
                    pieces.push(Piece::Replacement {
                        src: *start,
                        text: text.as_str(),
                    });
                }
            }
            cursor = edit.end();
        }
        if cursor < self.source.len() {
            pieces.push(Piece::Retained {
                src: cursor,
                text: &self.source[cursor..],
            });
        }
        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overwrite_replaces_span() {
        let mut editor = SourceEditor::new("abc def ghi");
        editor.overwrite(4, 7, "XYZ".to_string());
        assert_eq!(editor.render(), "abc XYZ ghi");
    }

    #[test]
    fn remove_deletes_span() {
        let mut editor = SourceEditor::new("abc def ghi");
        editor.remove(3, 7);
        assert_eq!(editor.render(), "abc ghi");
    }

    #[test]
    fn prepends_render_last_pushed_first() {
        let mut editor = SourceEditor::new("body\n");
        editor.prepend("first\n".to_string());
        editor.prepend("second\n".to_string());
        assert_eq!(editor.render(), "second\nfirst\nbody\n");
    }

    #[test]
    fn slice_applies_contained_edits() {
        let mut editor = SourceEditor::new("call(arg) tail");
        editor.overwrite(0, 4, "lowered".to_string());
        assert_eq!(editor.slice(0, 9), "lowered(arg)");
    }

    #[test]
    fn hoist_pattern_moves_rewritten_span_to_front() {
        let src = "head(x)\nrest\n";
        let mut editor = SourceEditor::new(src);
        editor.overwrite(0, 4, "H".to_string());
        let block = editor.slice(0, 7);
        editor.prepend(format!("{block}\n"));
        editor.remove(0, 7);
        assert_eq!(editor.render(), "H(x)\n\nrest\n");
    }

    #[test]
    fn disjoint_edits_apply_in_position_order_regardless_of_recording_order() {
        let mut editor = SourceEditor::new("one two three");
        editor.overwrite(8, 13, "3".to_string());
        editor.overwrite(0, 3, "1".to_string());
        assert_eq!(editor.render(), "1 two 3");
    }

    #[test]
    fn no_edits_renders_source_verbatim() {
        let editor = SourceEditor::new("untouched");
        assert!(!editor.has_edits());
        assert_eq!(editor.render(), "untouched");
    }
}
