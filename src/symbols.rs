//! Lexical symbol index for the coverage fast path.
//!
//! Scans chunk text for declaration-shaped lines and maps names to the
//! chunks they were seen in. No parsing is attempted: the index is
//! best-effort and may miss symbols, but it only ever records locations
//! it actually observed.
//!
//! # Heuristics
//!
//! 1. A type declaration (`class Foo`, `struct Foo`, `impl Trait for Foo`,
//!    ...) records `Foo` and becomes the current type.
//! 2. A member declaration (`def bar`, `fn bar`, `public void bar(`, ...)
//!    indented deeper than the current type records `bar` and `Foo.bar`.
//! 3. A member at or left of the type's indentation closes the type and
//!    records only the simple name.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ChunkRecord, SymbolLocation};
use crate::traits::ChunkLoader;

const MODIFIERS: &str = r"(?:(?:pub(?:\([^)]*\))?|export|default|public|private|protected|internal|abstract|final|sealed|static|partial|data|open|async|unsafe|const|override|virtual|synchronized)\s+)*";

fn type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^(\s*){}(?:class|struct|interface|trait|enum|object|record)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
            MODIFIERS
        ))
        .expect("valid type regex")
    })
}

fn impl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\s*)impl(?:<[^>]*>)?\s+(?:[A-Za-z_][A-Za-z0-9_:<>, ]*\s+for\s+)?([A-Za-z_][A-Za-z0-9_]*)",
        )
        .expect("valid impl regex")
    })
}

fn function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^(\s*){}(?:def|fn|func|function)\s+(?:\([^)]*\)\s*)?([A-Za-z_$][A-Za-z0-9_$]*)",
            MODIFIERS
        ))
        .expect("valid function regex")
    })
}

fn method_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\s*)(?:(?:public|private|protected|internal|static|async|override|virtual|final|abstract|synchronized)\s+)+(?:[A-Za-z_][A-Za-z0-9_<>\[\],.?]*\s+)?([A-Za-z_$][A-Za-z0-9_$]*)\s*\(",
        )
        .expect("valid method regex")
    })
}

/// Width of leading whitespace, with tabs counted as four columns.
fn indent_width(s: &str) -> usize {
    s.chars().map(|c| if c == '\t' { 4 } else { 1 }).sum()
}

/// Read-only map from qualified names to the chunks declaring them.
#[derive(Debug, Default, Clone)]
pub struct SymbolIndex {
    entries: HashMap<String, Vec<SymbolLocation>>,
    chunks_scanned: usize,
    skipped: Vec<String>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over every chunk of `corpus_ids`.
    ///
    /// A corpus whose chunks cannot be loaded is skipped with a warning and
    /// listed in [`skipped`](Self::skipped).
    pub async fn build(loader: &dyn ChunkLoader, corpus_ids: &[String]) -> Self {
        let mut index = Self::new();
        for corpus_id in corpus_ids {
            match loader.load_chunks(corpus_id).await {
                Ok(chunks) => {
                    for chunk in &chunks {
                        index.add_chunk(chunk);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        corpus_id = %corpus_id,
                        error = %e,
                        "skipping corpus in symbol index"
                    );
                    index.skipped.push(corpus_id.clone());
                }
            }
        }
        tracing::debug!(
            symbols = index.len(),
            chunks = index.chunks_scanned,
            skipped = index.skipped.len(),
            "symbol index built"
        );
        index
    }

    /// Scan one chunk and append every declaration it contains.
    pub fn add_chunk(&mut self, chunk: &ChunkRecord) {
        self.chunks_scanned += 1;
        let location = SymbolLocation {
            chunk_id: chunk.chunk_id.clone(),
            doc_id: chunk.doc_id.clone(),
        };
        // (name, indent) of the enclosing type, if any.
        let mut current: Option<(String, usize)> = None;

        for line in chunk.content.lines() {
            let type_caps = type_re().captures(line).or_else(|| impl_re().captures(line));
            if let Some(caps) = type_caps {
                let indent = indent_width(&caps[1]);
                let name = caps[2].to_string();
                self.insert(&name, &location);
                current = Some((name, indent));
                continue;
            }

            let member_caps = function_re().captures(line).or_else(|| method_re().captures(line));
            if let Some(caps) = member_caps {
                let indent = indent_width(&caps[1]);
                let member = &caps[2];
                if current.as_ref().is_some_and(|(_, type_indent)| indent <= *type_indent) {
                    current = None;
                }
                self.insert(member, &location);
                if let Some((type_name, _)) = &current {
                    self.insert(&format!("{}.{}", type_name, member), &location);
                }
            }
        }
    }

    /// Append all entries of `other`, keeping existing locations.
    pub fn merge(&mut self, other: SymbolIndex) {
        self.chunks_scanned += other.chunks_scanned;
        self.skipped.extend(other.skipped);
        for (symbol, locations) in other.entries {
            for loc in &locations {
                self.insert(&symbol, loc);
            }
        }
    }

    fn insert(&mut self, symbol: &str, location: &SymbolLocation) {
        let locations = self.entries.entry(symbol.to_string()).or_default();
        if !locations.contains(location) {
            locations.push(location.clone());
        }
    }

    /// Locations where `symbol` was declared; empty if never seen.
    pub fn find(&self, symbol: &str) -> &[SymbolLocation] {
        self.entries
            .get(symbol.trim())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct symbols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks_scanned(&self) -> usize {
        self.chunks_scanned
    }

    /// Corpora whose chunks failed to load during [`build`](Self::build).
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// True when every requested corpus was scanned.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, doc: &str, content: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: id.to_string(),
            doc_id: doc.to_string(),
            content: content.to_string(),
        }
    }

    fn index_of(chunks: &[ChunkRecord]) -> SymbolIndex {
        let mut index = SymbolIndex::new();
        for c in chunks {
            index.add_chunk(c);
        }
        index
    }

    #[test]
    fn test_python_class_and_method() {
        let index = index_of(&[record(
            "c1",
            "d1",
            "class Foo:\n    def bar(self):\n        return 1\n",
        )]);
        for sym in ["Foo", "bar", "Foo.bar"] {
            let locs = index.find(sym);
            assert_eq!(locs.len(), 1, "missing {}", sym);
            assert_eq!(locs[0].chunk_id, "c1");
            assert_eq!(locs[0].doc_id, "d1");
        }
    }

    #[test]
    fn test_top_level_function_after_class_is_not_qualified() {
        let index = index_of(&[record(
            "c1",
            "d1",
            "class Foo:\n    def bar(self):\n        pass\n\ndef helper():\n    pass\n",
        )]);
        assert_eq!(index.find("helper").len(), 1);
        assert!(index.find("Foo.helper").is_empty());
    }

    #[test]
    fn test_rust_impl_block() {
        let index = index_of(&[record(
            "c1",
            "d1",
            "pub struct Engine;\n\nimpl Display for Engine {\n    pub async fn start(&self) {}\n}\n",
        )]);
        assert_eq!(index.find("Engine.start").len(), 1);
        assert_eq!(index.find("start").len(), 1);
    }

    #[test]
    fn test_java_method_signature() {
        let index = index_of(&[record(
            "c1",
            "d1",
            "public class OrderService {\n    public void placeOrder(Order o) {\n    }\n}\n",
        )]);
        assert_eq!(index.find("OrderService.placeOrder").len(), 1);
    }

    #[test]
    fn test_locations_accumulate_across_documents() {
        let index = index_of(&[
            record("c1", "d1", "def run():\n    pass\n"),
            record("c2", "d2", "def run():\n    pass\n"),
            record("c2", "d2", "def run():\n    pass\n"),
        ]);
        let locs = index.find("run");
        assert_eq!(locs.len(), 2);
        assert_eq!(locs[0].doc_id, "d1");
        assert_eq!(locs[1].doc_id, "d2");
    }

    #[test]
    fn test_merge_appends() {
        let mut a = index_of(&[record("c1", "d1", "def run():\n")]);
        let b = index_of(&[record("c9", "d2", "def run():\n")]);
        a.merge(b);
        assert_eq!(a.find("run").len(), 2);
        assert_eq!(a.chunks_scanned(), 2);
    }

    struct BrokenLoader;

    #[async_trait::async_trait]
    impl ChunkLoader for BrokenLoader {
        async fn load_chunks(&self, corpus_id: &str) -> anyhow::Result<Vec<ChunkRecord>> {
            if corpus_id == "down" {
                anyhow::bail!("connection refused");
            }
            Ok(vec![record("c1", corpus_id, "def run():\n    pass\n")])
        }
    }

    #[tokio::test]
    async fn test_build_records_skipped_corpora() {
        let ids = vec!["up".to_string(), "down".to_string()];
        let index = SymbolIndex::build(&BrokenLoader, &ids).await;

        assert_eq!(index.find("run").len(), 1);
        assert_eq!(index.skipped(), ["down".to_string()]);
        assert!(!index.is_complete());
        assert!(SymbolIndex::new().is_complete());
    }

    #[test]
    fn test_prose_records_nothing() {
        let index = index_of(&[record(
            "c1",
            "d1",
            "This document describes how the class of service is chosen.",
        )]);
        assert!(index.is_empty());
        assert!(index.find("of").is_empty());
    }
}
