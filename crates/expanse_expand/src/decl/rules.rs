//! Parsing `macro_rules!` bodies into matcher and transcriber programs.

use std::str::FromStr;

use super::token::{parse_token_trees, Delimiter, Token, TokenKind, TokenTree};
use crate::error::DeclMacroExpansionError;

/// Fragment specifiers (`$x:expr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// `ident`
    Ident,
    /// `lifetime`
    Lifetime,
    /// `literal`
    Literal,
    /// `tt`
    Tt,
    /// `block`
    Block,
    /// `expr`
    Expr,
    /// `ty`
    Ty,
    /// `path`
    Path,
    /// `pat`, `pat_param`
    Pat,
    /// `stmt`
    Stmt,
    /// `item`
    Item,
    /// `vis`
    Vis,
    /// `meta`
    Meta,
}

impl FromStr for FragmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ident" => FragmentKind::Ident,
            "lifetime" => FragmentKind::Lifetime,
            "literal" => FragmentKind::Literal,
            "tt" => FragmentKind::Tt,
            "block" => FragmentKind::Block,
            "expr" | "expr_2021" => FragmentKind::Expr,
            "ty" => FragmentKind::Ty,
            "path" => FragmentKind::Path,
            "pat" | "pat_param" => FragmentKind::Pat,
            "stmt" => FragmentKind::Stmt,
            "item" => FragmentKind::Item,
            "vis" => FragmentKind::Vis,
            "meta" => FragmentKind::Meta,
            other => return Err(format!("invalid fragment specifier `{other}`")),
        })
    }
}

/// `*`, `+`, or `?` after a repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatKind {
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
    /// `?`
    ZeroOrOne,
}

/// `$( ops ) sep? kind`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repeat<T> {
    /// The repeated sub-program.
    pub ops: Vec<T>,
    /// Token between iterations.
    pub separator: Option<Token>,
    /// Repetition operator.
    pub kind: RepeatKind,
}

/// One step of a matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOp {
    /// A token that must appear verbatim.
    Literal(Token),
    /// `$name:kind`
    Fragment {
        /// Variable name.
        name: String,
        /// Fragment specifier.
        kind: FragmentKind,
    },
    /// A delimited sub-matcher.
    Group {
        /// Required delimiter.
        delimiter: Delimiter,
        /// Matcher for the contents.
        ops: Vec<MatchOp>,
    },
    /// A repetition.
    Repeat(Repeat<MatchOp>),
}

/// One step of a transcriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscribeOp {
    /// A token copied from the definition.
    Literal(Token),
    /// `$name`
    Var {
        /// Variable name.
        name: String,
        /// Whitespace precedes the `$`.
        spaced: bool,
    },
    /// `$crate`
    DollarCrate {
        /// Whitespace precedes the `$`.
        spaced: bool,
    },
    /// A delimited group.
    Group {
        /// The delimiter.
        delimiter: Delimiter,
        /// Whitespace precedes the opening delimiter.
        open_spaced: bool,
        /// Whitespace precedes the closing delimiter.
        close_spaced: bool,
        /// Contents.
        ops: Vec<TranscribeOp>,
    },
    /// A repetition.
    Repeat(Repeat<TranscribeOp>),
}

/// A `(matcher) => { transcriber }` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroRule {
    /// The matcher program.
    pub matcher: Vec<MatchOp>,
    /// The transcriber program.
    pub transcriber: Vec<TranscribeOp>,
}

/// Parses the rules of a declarative macro.
pub fn parse_rules(body: &str) -> Result<Vec<MacroRule>, DeclMacroExpansionError> {
    let trees = parse_token_trees(body).map_err(|e| DeclMacroExpansionError::DefSyntax(e.to_string()))?;
    let syntax = |msg: &str| DeclMacroExpansionError::DefSyntax(msg.to_string());

    let mut rules = Vec::new();
    let mut iter = trees.iter().peekable();
    while let Some(tree) = iter.next() {
        let TokenTree::Group(matcher) = tree else {
            return Err(syntax("expected a parenthesized matcher"));
        };
        match (iter.next(), iter.next()) {
            (Some(eq), Some(gt))
                if eq.is_punct('=') && eq.as_leaf().is_some_and(|t| t.joint) && gt.is_punct('>') => {}
            _ => return Err(syntax("expected `=>` after the matcher")),
        }
        let Some(TokenTree::Group(transcriber)) = iter.next() else {
            return Err(syntax("expected a delimited transcriber after `=>`"));
        };
        rules.push(MacroRule {
            matcher: parse_matcher(&matcher.children).map_err(DeclMacroExpansionError::DefSyntax)?,
            transcriber: parse_transcriber(&transcriber.children)
                .map_err(DeclMacroExpansionError::DefSyntax)?,
        });
        match iter.peek() {
            Some(tree) if tree.is_punct(';') => {
                iter.next();
            }
            Some(_) => return Err(syntax("expected `;` between rules")),
            None => {}
        }
    }

    if rules.is_empty() {
        return Err(syntax("macro has no rules"));
    }
    Ok(rules)
}

fn parse_matcher(trees: &[TokenTree]) -> Result<Vec<MatchOp>, String> {
    let mut ops = Vec::new();
    let mut i = 0;
    while i < trees.len() {
        match &trees[i] {
            TokenTree::Leaf(token) if token.is_punct('$') => match trees.get(i + 1) {
                Some(TokenTree::Leaf(name)) if name.kind == TokenKind::Ident => {
                    if name.text == "crate" {
                        ops.push(MatchOp::Literal(token.clone()));
                        ops.push(MatchOp::Literal(name.clone()));
                        i += 2;
                        continue;
                    }
                    let colon = trees.get(i + 2).filter(|t| t.is_punct(':'));
                    let spec = trees.get(i + 3).and_then(TokenTree::as_leaf);
                    match (colon, spec) {
                        (Some(_), Some(spec)) if spec.kind == TokenKind::Ident => {
                            ops.push(MatchOp::Fragment {
                                name: name.text.clone(),
                                kind: spec.text.parse()?,
                            });
                            i += 4;
                        }
                        _ => return Err(format!("missing fragment specifier for `${}`", name.text)),
                    }
                }
                Some(TokenTree::Group(group)) if group.delimiter == Delimiter::Parenthesis => {
                    let (separator, kind, consumed) = parse_repeat_suffix(&trees[i + 2..])?;
                    ops.push(MatchOp::Repeat(Repeat {
                        ops: parse_matcher(&group.children)?,
                        separator,
                        kind,
                    }));
                    i += 2 + consumed;
                }
                _ => return Err("expected a variable or repetition after `$`".to_string()),
            },
            TokenTree::Leaf(token) => {
                ops.push(MatchOp::Literal(token.clone()));
                i += 1;
            }
            TokenTree::Group(group) => {
                ops.push(MatchOp::Group {
                    delimiter: group.delimiter,
                    ops: parse_matcher(&group.children)?,
                });
                i += 1;
            }
        }
    }
    Ok(ops)
}

fn parse_transcriber(trees: &[TokenTree]) -> Result<Vec<TranscribeOp>, String> {
    let mut ops = Vec::new();
    let mut i = 0;
    while i < trees.len() {
        match &trees[i] {
            TokenTree::Leaf(token) if token.is_punct('$') => match trees.get(i + 1) {
                Some(TokenTree::Leaf(name)) if name.kind == TokenKind::Ident => {
                    let spaced = token.spaced;
                    ops.push(if name.text == "crate" {
                        TranscribeOp::DollarCrate { spaced }
                    } else {
                        TranscribeOp::Var {
                            name: name.text.clone(),
                            spaced,
                        }
                    });
                    i += 2;
                }
                Some(TokenTree::Group(group)) if group.delimiter == Delimiter::Parenthesis => {
                    let (separator, kind, consumed) = parse_repeat_suffix(&trees[i + 2..])?;
                    ops.push(TranscribeOp::Repeat(Repeat {
                        ops: parse_transcriber(&group.children)?,
                        separator,
                        kind,
                    }));
                    i += 2 + consumed;
                }
                _ => {
                    ops.push(TranscribeOp::Literal(token.clone()));
                    i += 1;
                }
            },
            TokenTree::Leaf(token) => {
                ops.push(TranscribeOp::Literal(token.clone()));
                i += 1;
            }
            TokenTree::Group(group) => {
                ops.push(TranscribeOp::Group {
                    delimiter: group.delimiter,
                    open_spaced: group.open_spaced,
                    close_spaced: group.close_spaced,
                    ops: parse_transcriber(&group.children)?,
                });
                i += 1;
            }
        }
    }
    Ok(ops)
}

fn repeat_kind(tree: &TokenTree) -> Option<RepeatKind> {
    if tree.is_punct('*') {
        Some(RepeatKind::ZeroOrMore)
    } else if tree.is_punct('+') {
        Some(RepeatKind::OneOrMore)
    } else if tree.is_punct('?') {
        Some(RepeatKind::ZeroOrOne)
    } else {
        None
    }
}

/// Parses `sep? op` after `$( ... )`. Returns the separator, the operator
/// and the number of trees consumed.
fn parse_repeat_suffix(
    trees: &[TokenTree],
) -> Result<(Option<Token>, RepeatKind, usize), String> {
    let missing = || "expected one of `*`, `+`, or `?` after a repetition".to_string();
    let first = trees.first().ok_or_else(missing)?;
    if let Some(kind) = repeat_kind(first) {
        return Ok((None, kind, 1));
    }
    let TokenTree::Leaf(separator) = first else {
        return Err(missing());
    };
    let kind = trees.get(1).and_then(repeat_kind).ok_or_else(missing)?;
    if kind == RepeatKind::ZeroOrOne {
        return Err("the `?` repetition operator does not take a separator".to_string());
    }
    Ok((Some(separator.clone()), kind, 2))
}
