//! String/comment classification and call-boundary matching over raw text.
//!
//! Neither routine builds an AST. The classifier runs one forward pass over
//! the whole module and records run-length state segments, so asking about
//! any number of offsets afterwards is a lookup, not a rescan.

/// Classification of a single byte offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LexicalState {
    pub inside_comment: bool,
    pub inside_string: bool,
}

/// Run-length segment: `state` holds from `start` until the next run begins.
#[derive(Clone, Copy, Debug)]
struct Run {
    start: usize,
    state: LexicalState,
}

/// One-pass scan of a module's text into string/comment/code runs.
///
/// The state machine tracks a single active string delimiter (quote, double
/// quote, or backtick), a line comment flag, and a block comment flag:
///
/// - Comment markers are only recognized while no string delimiter is
///   active. Block comments do not nest; a line comment ends at `\n` (or at
///   the `\r` of `\r\n`).
/// - Delimiter toggling is only evaluated outside comments. A delimiter
///   preceded by a backslash never toggles, even when that backslash is
///   itself escaped; this one-character lookbehind is a known imprecision
///   and is kept as-is.
///
/// The state reported for an offset is the machine state after consuming
/// the byte at that offset.
pub struct LexicalScan {
    runs: Vec<Run>,
}

impl LexicalScan {
    pub fn new(source: &str) -> Self {
        let bytes = source.as_bytes();
        let mut runs: Vec<Run> = Vec::new();

        let mut line_comment = false;
        let mut block_comment = false;
        let mut delimiter: Option<u8> = None;
        let mut prev: Option<u8> = None;

        for (i, &b) in bytes.iter().enumerate() {
            let next = bytes.get(i + 1).copied();

            if delimiter.is_none() {
                if b == b'/' && next == Some(b'*') {
                    block_comment = true;
                }
                if b == b'*' && next == Some(b'/') && block_comment {
                    block_comment = false;
                }
                if b == b'/' && next == Some(b'/') {
                    line_comment = true;
                }
                if (b == b'\n' || (b == b'\r' && next == Some(b'\n'))) && line_comment {
                    line_comment = false;
                }
            }

            if !block_comment && !line_comment {
                let is_quote = matches!(b, b'"' | b'\'' | b'`');
                if is_quote && prev != Some(b'\\') {
                    match delimiter {
                        Some(active) if active == b => delimiter = None,
                        None => delimiter = Some(b),
                        // A delimiter that doesn't match the active one is
                        // plain string content.
                        Some(_) => {}
                    }
                }
            }

            prev = Some(b);

            let state = LexicalState {
                inside_comment: block_comment || line_comment,
                inside_string: delimiter.is_some(),
            };
            if runs.last().map(|r| r.state) != Some(state) {
                runs.push(Run { start: i, state });
            }
        }

        Self { runs }
    }

    /// State at `offset`. Offsets past the end of the text report the final
    /// state of the scan.
    pub fn classify(&self, offset: usize) -> LexicalState {
        match self.runs.binary_search_by(|r| r.start.cmp(&offset)) {
            Ok(idx) => self.runs[idx].state,
            Err(0) => LexicalState::default(),
            Err(idx) => self.runs[idx - 1].state,
        }
    }
}

/// Finds where a call expression's argument list ends.
///
/// Scans `text` forward, skipping string literals (same one-character
/// escape lookbehind as [`LexicalScan`]), and counts parentheses. Returns
/// the offset immediately after the parenthesis that balances the call, or
/// `None` if the text ends first. Brackets and braces need no separate
/// bookkeeping: any parenthesis nested inside them is itself counted, so
/// the balance point is unaffected.
pub fn find_call_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut in_string: Option<u8> = None;
    let mut opened = 0usize;
    let mut closed = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        if let Some(active) = in_string {
            if b == active && (i == 0 || bytes[i - 1] != b'\\') {
                in_string = None;
            }
        } else {
            match b {
                b'"' | b'\'' | b'`' => in_string = Some(b),
                b'(' => opened += 1,
                b')' => closed += 1,
                _ => {}
            }
        }
        if opened > 0 && opened == closed {
            return Some(i + 1);
        }
    }
    None
}
