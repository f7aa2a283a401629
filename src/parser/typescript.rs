//! JavaScript/TypeScript parsing with tree-sitter

use anyhow::{Context, Result};
use std::path::Path;
use tree_sitter::{Language, Node, Parser, Tree};

/// Grammar used for a file, chosen from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `.ts`, `.mts`, `.cts`, `.js`, `.mjs`, `.cjs`
    TypeScript,
    /// `.tsx`, `.jsx` (JSX needs the TSX grammar)
    Tsx,
}

impl Grammar {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "tsx" | "jsx" => Grammar::Tsx,
            _ => Grammar::TypeScript,
        }
    }

    pub fn language(self) -> Language {
        match self {
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

/// Parser for test files using tree-sitter
pub struct TypeScriptParser {
    parser: Parser,
}

impl TypeScriptParser {
    /// Create a new TypeScript parser
    pub fn new() -> Result<Self> {
        Self::with_grammar(Grammar::TypeScript)
    }

    /// Create a parser based on file extension
    pub fn for_file(path: &Path) -> Result<Self> {
        Self::with_grammar(Grammar::for_path(path))
    }

    fn with_grammar(grammar: Grammar) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&grammar.language())
            .with_context(|| format!("Failed to set {:?} language", grammar))?;
        Ok(Self { parser })
    }

    /// Parse source code into a syntax tree
    pub fn parse(&mut self, source: &str) -> Result<Tree> {
        self.parser
            .parse(source, None)
            .context("Failed to parse source")
    }
}

/// First ERROR or MISSING node in the tree, if any (0-indexed row/column).
pub fn first_syntax_error(tree: &Tree) -> Option<(usize, usize)> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    find_error(root).map(|n| (n.start_position().row, n.start_position().column))
}

fn find_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(found) = find_error(child) {
                return Some(found);
            }
        }
    }
    None
}
