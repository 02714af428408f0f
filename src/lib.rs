//! Late-stage text transform over one JS/TS module at a time: lowers
//! `vi`/`vitest` mocking calls into their `__vitest__<method>__` runtime
//! form, hoists full mock registrations to the top of the module, and
//! hoists `vitest` imports above the hoisted blocks so mock factories can
//! reference the mocking API.
//!
//! The transform works on raw text; there is no AST and no scope analysis.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};

use futures::stream::{self, StreamExt, TryStreamExt};

pub mod edits;
pub mod lexical;
pub mod resolve;
pub mod sourcemap;

pub use edits::SourceEditor;
pub use lexical::{find_call_end, LexicalScan, LexicalState};
pub use resolve::{ModuleResolver, ResolvedTarget, DEPENDENCY_DIR_SEGMENT};
pub use sourcemap::{SourceMap, SourceMapOptions};

// -----------------------------------------------------------------------------
// Patterns
// -----------------------------------------------------------------------------

/// Head of a mock registration: namespace, method, and quoted specifier up
/// to its closing quote. The call may continue with further arguments (a
/// factory, options) beyond the `)`-or-`,` anchor.
static MOCK_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^ *\b((?:vitest|vi)\s*.\s*mock\(["'`\s]+(.*[@\w_-]+)["'`\s]+)[),];?"#)
        .expect("mock-call pattern")
});

/// Single-argument utility calls rewritten in place.
static PATH_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\b(?:vitest|vi)\s*.\s*(unmock|importActual|importMock)\(["'`\s](.*[@\w_-]+)["'`\s]\);?"#,
    )
    .expect("path-call pattern")
});

/// `import { ... } from "vitest"` statements, matched to end of line.
static VITEST_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import \{[^}]*\}.*["'`]vitest["'`].*"#).expect("vitest-import pattern")
});

// -----------------------------------------------------------------------------
// Config
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginConfig {
    /// Emit per-character source map segments.
    pub hires: bool,
    /// Embed the original text in the map's `sourcesContent`.
    pub include_content: bool,
    /// Upper bound on in-flight resolver requests per module.
    pub resolve_concurrency: usize,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            hires: true,
            include_content: false,
            resolve_concurrency: 8,
        }
    }
}

impl PluginConfig {
    /// Parses a JSON config string, falling back to defaults on malformed
    /// input.
    pub fn from_json_str(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }
}

// -----------------------------------------------------------------------------
// Outcome & errors
// -----------------------------------------------------------------------------

#[derive(Debug)]
pub enum TransformOutcome {
    /// No pattern produced an edit; the module is passed through untouched.
    Unchanged,
    Changed(TransformedModule),
}

#[derive(Debug)]
pub struct TransformedModule {
    pub code: String,
    pub map: SourceMap,
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to resolve \"{specifier}\": {source}")]
    Resolution {
        specifier: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

// -----------------------------------------------------------------------------
// Match collection
// -----------------------------------------------------------------------------

#[derive(Debug)]
struct PathCallMatch {
    start: usize,
    end: usize,
    method: String,
    specifier: String,
}

#[derive(Debug)]
struct MockCallMatch {
    start: usize,
    head_start: usize,
    head_end: usize,
    /// End of the full call, including a trailing semicolon when present.
    end: usize,
    specifier: String,
}

fn collect_path_calls(code: &str) -> Vec<PathCallMatch> {
    PATH_CALL_RE
        .captures_iter(code)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let method = cap.get(1)?;
            let specifier = cap.get(2)?;
            Some(PathCallMatch {
                start: whole.start(),
                end: whole.end(),
                method: method.as_str().to_string(),
                specifier: specifier.as_str().to_string(),
            })
        })
        .collect()
}

fn collect_mock_calls(code: &str) -> Vec<MockCallMatch> {
    let mut scan: Option<LexicalScan> = None;
    let mut out = Vec::new();

    for cap in MOCK_CALL_RE.captures_iter(code) {
        let (Some(whole), Some(head), Some(specifier)) = (cap.get(0), cap.get(1), cap.get(2))
        else {
            continue;
        };
        let start = whole.start();

        // The factory may itself contain calls and strings, so the match
        // alone cannot tell us where the registration ends.
        let Some(relative_end) = find_call_end(&code[start..]) else {
            trace!(offset = start, "mock call without balanced end, skipped");
            continue;
        };
        let mut end = start + relative_end;
        if code.as_bytes().get(end) == Some(&b';') {
            end += 1;
        }

        let state = scan
            .get_or_insert_with(|| LexicalScan::new(code))
            .classify(start);
        if state.inside_comment || state.inside_string {
            trace!(
                offset = start,
                inside_comment = state.inside_comment,
                inside_string = state.inside_string,
                "mock call outside code, skipped"
            );
            continue;
        }

        out.push(MockCallMatch {
            start,
            head_start: head.start(),
            head_end: head.end(),
            end,
            specifier: specifier.as_str().to_string(),
        });
    }
    out
}

/// Lowered call head consumed by the runtime mocking component. Left open:
/// the caller closes it with `);` (path calls) or lets the original
/// arguments continue it (mock calls).
fn lowered_call_head(method: &str, target: &ResolvedTarget, raw_specifier: &str) -> String {
    let actual_path = target.actual_path(raw_specifier);
    let dependency_arg = if target.is_dependency_module(raw_specifier) {
        format!("\"{raw_specifier}\"")
    } else {
        "null".to_string()
    };
    format!("__vitest__{method}__(\"{actual_path}\", {dependency_arg}")
}

// -----------------------------------------------------------------------------
// Plugin
// -----------------------------------------------------------------------------

pub struct MockHoistPlugin<R> {
    resolver: R,
    config: PluginConfig,
}

impl<R: ModuleResolver> MockHoistPlugin<R> {
    pub const NAME: &'static str = "vitest:mock-plugin";

    pub fn new(resolver: R) -> Self {
        Self::with_config(resolver, PluginConfig::default())
    }

    pub fn with_config(resolver: R, config: PluginConfig) -> Self {
        Self { resolver, config }
    }

    /// Runs the three rewrite passes over one module's text.
    ///
    /// Candidates are collected in a pure scan, every captured specifier is
    /// resolved through a bounded, order-preserving concurrent stream, and
    /// all edits are applied in one deterministic assembly pass. Each
    /// hoisted block is inserted at the very front of the output, so N mock
    /// registrations in source order end up top-of-file in exact reverse
    /// source order; hoisted `vitest` imports stack above them the same way.
    pub async fn transform(
        &self,
        code: &str,
        id: &str,
    ) -> Result<TransformOutcome, TransformError> {
        let path_calls = collect_path_calls(code);
        let mock_calls = collect_mock_calls(code);
        if path_calls.is_empty() && mock_calls.is_empty() {
            return Ok(TransformOutcome::Unchanged);
        }

        let mut specifiers = Vec::with_capacity(path_calls.len() + mock_calls.len());
        specifiers.extend(path_calls.iter().map(|m| m.specifier.clone()));
        specifiers.extend(mock_calls.iter().map(|m| m.specifier.clone()));
        let targets = self.resolve_targets(specifiers, id).await?;
        let (path_targets, mock_targets) = targets.split_at(path_calls.len());

        let mut editor = SourceEditor::new(code);

        for (call, target) in path_calls.iter().zip(path_targets) {
            let head = lowered_call_head(&call.method, target, &call.specifier);
            editor.overwrite(call.start, call.end, format!("{head});"));
        }

        for (call, target) in mock_calls.iter().zip(mock_targets) {
            let head = lowered_call_head("mock", target, &call.specifier);
            editor.overwrite(call.head_start, call.head_end, head);
            // Slice after the head rewrite so the hoisted block carries the
            // lowered head and any path-call rewrites inside its factory.
            let block = editor.slice(call.start, call.end);
            editor.prepend(format!("{block}\n"));
            editor.remove(call.start, call.end);
        }

        let mut hoisted_imports = 0usize;
        if editor.has_edits() {
            // A factory hoisted above its own import must still reach the
            // mocking API, so imports go one layer further up.
            for import in VITEST_IMPORT_RE.find_iter(code) {
                editor.remove(import.start(), import.end());
                editor.prepend(format!("{}\n", import.as_str()));
                hoisted_imports += 1;
            }
        }

        debug!(
            module = id,
            path_rewrites = path_calls.len(),
            hoisted_mocks = mock_calls.len(),
            hoisted_imports,
            "lowered mocking calls"
        );

        let map = editor.source_map(&SourceMapOptions {
            source: Some(id.to_string()),
            file: None,
            include_content: self.config.include_content,
            hires: self.config.hires,
        });
        Ok(TransformOutcome::Changed(TransformedModule {
            code: editor.render(),
            map,
        }))
    }

    async fn resolve_targets(
        &self,
        specifiers: Vec<String>,
        importer: &str,
    ) -> Result<Vec<ResolvedTarget>, TransformError> {
        let limit = self.config.resolve_concurrency.max(1);
        let resolver = &self.resolver;
        stream::iter(specifiers)
            .map(move |specifier| async move {
                match resolver.resolve(&specifier, importer).await {
                    Ok(id) => Ok(ResolvedTarget { id }),
                    Err(source) => Err(TransformError::Resolution {
                        specifier,
                        source: Box::new(source),
                    }),
                }
            })
            .buffered(limit)
            .try_collect()
            .await
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
