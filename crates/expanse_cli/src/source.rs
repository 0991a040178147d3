//! Finds `macro_rules!` definitions and macro calls in a source file.

use std::collections::BTreeMap;

use expanse_expand::decl::token::{parse_token_trees, LexError, TokenKind, TokenTree};
use expanse_expand::DeclMacroDef;

/// A `name!(...)` call found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCall {
    /// The called macro.
    pub name: String,
    /// Text between the call's delimiters.
    pub body: String,
    /// Byte offset of the macro name.
    pub offset: usize,
}

/// The macros a file defines and the calls it makes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFile {
    /// Definitions by name; a later definition replaces an earlier one.
    pub definitions: BTreeMap<String, DeclMacroDef>,
    /// Outermost calls, in source order.
    pub calls: Vec<MacroCall>,
}

impl SourceFile {
    /// Scans `text`.
    pub fn scan(text: &str) -> Result<Self, LexError> {
        let trees = parse_token_trees(text)?;
        let mut file = SourceFile::default();
        file.walk(text, &trees);
        Ok(file)
    }

    /// The definition called `name`, if the file has one.
    pub fn resolve(&self, name: &str) -> Option<&DeclMacroDef> {
        self.definitions.get(name)
    }

    fn walk(&mut self, text: &str, trees: &[TokenTree]) {
        let mut i = 0;
        while i < trees.len() {
            if let Some(def) = definition_at(text, &trees[i..]) {
                self.definitions.insert(def.name.clone(), def);
                i += 4;
            } else if let Some(call) = call_at(text, &trees[i..]) {
                self.calls.push(call);
                i += 3;
            } else {
                if let TokenTree::Group(group) = &trees[i] {
                    self.walk(text, &group.children);
                }
                i += 1;
            }
        }
    }
}

fn ident(tree: &TokenTree) -> Option<&str> {
    tree.as_leaf()
        .filter(|token| token.kind == TokenKind::Ident)
        .map(|token| token.text.as_str())
}

/// Text between a group's delimiters.
fn inner_text<'a>(text: &'a str, tree: &TokenTree) -> Option<&'a str> {
    let TokenTree::Group(group) = tree else {
        return None;
    };
    text.get(group.range.start + 1..group.range.end - 1)
}

/// `macro_rules! name { ... }`
fn definition_at(text: &str, trees: &[TokenTree]) -> Option<DeclMacroDef> {
    let [keyword, bang, name, body, ..] = trees else {
        return None;
    };
    if !keyword.is_ident("macro_rules") || !bang.is_punct('!') {
        return None;
    }
    Some(DeclMacroDef::new(ident(name)?, inner_text(text, body)?))
}

/// `name!(...)`, `name![...]` or `name!{...}`
fn call_at(text: &str, trees: &[TokenTree]) -> Option<MacroCall> {
    let [name, bang, body, ..] = trees else {
        return None;
    };
    if !bang.is_punct('!') {
        return None;
    }
    Some(MacroCall {
        name: ident(name)?.to_string(),
        body: inner_text(text, body)?.to_string(),
        offset: name.range().start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_and_calls() {
        let text = "macro_rules! double { ($x:expr) => { $x * 2 } }\n\
                    fn main() { let a = double!(1 + 2); println!(\"{}\", a); }";
        let file = SourceFile::scan(text).unwrap();
        assert_eq!(file.definitions.len(), 1);
        assert_eq!(file.resolve("double").unwrap().body.trim(), "($x:expr) => { $x * 2 }");
        let names: Vec<_> = file.calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["double", "println"]);
        assert_eq!(file.calls[0].body, "1 + 2");
        assert_eq!(&text[file.calls[0].offset..file.calls[0].offset + 6], "double");
    }

    #[test]
    fn definition_bodies_are_not_scanned_for_calls() {
        let file = SourceFile::scan("macro_rules! m { () => { inner!() } }").unwrap();
        assert!(file.calls.is_empty());
    }

    #[test]
    fn nested_calls_are_not_reported_twice() {
        let file = SourceFile::scan("outer!(inner!(1));").unwrap();
        assert_eq!(file.calls.len(), 1);
        assert_eq!(file.calls[0].body, "inner!(1)");
    }

    #[test]
    fn inequality_is_not_a_call() {
        let file = SourceFile::scan("fn f(a: u8) -> bool { a != 1 }").unwrap();
        assert!(file.calls.is_empty());
    }

    #[test]
    fn later_definition_wins() {
        let file = SourceFile::scan(
            "macro_rules! m { () => { 1 } } macro_rules! m { () => { 2 } }",
        )
        .unwrap();
        assert_eq!(file.resolve("m").unwrap().body.trim(), "() => { 2 }");
    }

    #[test]
    fn lex_errors_are_reported() {
        assert!(SourceFile::scan("fn f() {").is_err());
    }
}
