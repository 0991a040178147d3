//! Matching call bodies against rule matchers.
//!
//! Matching is greedy and does not backtrack across ops: a fragment takes as
//! much input as its kind allows, stopping early at the next literal token of
//! the matcher.

use std::collections::HashMap;
use std::ops::Range;

use super::rules::{FragmentKind, MatchOp, RepeatKind};
use super::token::{Delimiter, TokenKind, TokenTree};

/// What a matcher variable captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// A byte range of the call body.
    Fragment(Range<usize>),
    /// One binding per repetition iteration.
    Nested(Vec<Binding>),
}

/// Variable name to binding.
pub type Bindings = HashMap<String, Binding>;

/// Matches the whole of `input` against `ops`.
pub fn match_rule(ops: &[MatchOp], input: &[TokenTree]) -> Result<Bindings, String> {
    let mut bindings = Bindings::new();
    let end = match_seq(ops, input, 0, &mut bindings)?;
    match input.get(end) {
        Some(tree) => Err(format!("unexpected token `{}`", describe(tree))),
        None => Ok(bindings),
    }
}

fn describe(tree: &TokenTree) -> String {
    match tree {
        TokenTree::Leaf(token) => token.text.clone(),
        TokenTree::Group(group) => group.delimiter.open().to_string(),
    }
}

fn match_seq(
    ops: &[MatchOp],
    input: &[TokenTree],
    mut pos: usize,
    bindings: &mut Bindings,
) -> Result<usize, String> {
    for (i, op) in ops.iter().enumerate() {
        pos = match_op(op, &ops[i + 1..], input, pos, bindings)?;
    }
    Ok(pos)
}

fn match_op(
    op: &MatchOp,
    rest: &[MatchOp],
    input: &[TokenTree],
    pos: usize,
    bindings: &mut Bindings,
) -> Result<usize, String> {
    match op {
        MatchOp::Literal(expected) => match input.get(pos) {
            Some(TokenTree::Leaf(token)) if token.text == expected.text => Ok(pos + 1),
            Some(tree) => Err(format!(
                "expected `{}`, found `{}`",
                expected.text,
                describe(tree)
            )),
            None => Err(format!("expected `{}`, found end of input", expected.text)),
        },
        MatchOp::Group { delimiter, ops } => match input.get(pos) {
            Some(TokenTree::Group(group)) if group.delimiter == *delimiter => {
                let end = match_seq(ops, &group.children, 0, bindings)?;
                match group.children.get(end) {
                    Some(tree) => Err(format!("unexpected token `{}`", describe(tree))),
                    None => Ok(pos + 1),
                }
            }
            Some(tree) => Err(format!(
                "expected `{}`, found `{}`",
                delimiter.open(),
                describe(tree)
            )),
            None => Err(format!("expected `{}`, found end of input", delimiter.open())),
        },
        MatchOp::Fragment { name, kind } => {
            let end = match_fragment(*kind, rest, input, pos)?;
            bindings.insert(name.clone(), Binding::Fragment(span(input, pos, end)));
            Ok(end)
        }
        MatchOp::Repeat(rep) => {
            let mut iterations: Vec<Bindings> = Vec::new();
            let mut pos = pos;
            loop {
                if rep.kind == RepeatKind::ZeroOrOne && !iterations.is_empty() {
                    break;
                }
                let mut start = pos;
                if !iterations.is_empty() {
                    if let Some(separator) = &rep.separator {
                        match input.get(pos) {
                            Some(TokenTree::Leaf(token)) if token.text == separator.text => {
                                start = pos + 1;
                            }
                            _ => break,
                        }
                    }
                }
                let mut inner = Bindings::new();
                match match_seq(&rep.ops, input, start, &mut inner) {
                    Ok(end) if end > start => {
                        iterations.push(inner);
                        pos = end;
                    }
                    _ => break,
                }
            }
            if rep.kind == RepeatKind::OneOrMore && iterations.is_empty() {
                return Err(match input.get(pos) {
                    Some(tree) => format!("expected a repetition, found `{}`", describe(tree)),
                    None => "expected a repetition, found end of input".to_string(),
                });
            }

            let mut names = Vec::new();
            collect_vars(&rep.ops, &mut names);
            for name in names {
                let per_iteration = iterations
                    .iter_mut()
                    .map(|it| it.remove(&name).unwrap_or(Binding::Nested(Vec::new())))
                    .collect();
                bindings.insert(name, Binding::Nested(per_iteration));
            }
            Ok(pos)
        }
    }
}

fn collect_vars(ops: &[MatchOp], names: &mut Vec<String>) {
    for op in ops {
        match op {
            MatchOp::Fragment { name, .. } => names.push(name.clone()),
            MatchOp::Group { ops, .. } => collect_vars(ops, names),
            MatchOp::Repeat(rep) => collect_vars(&rep.ops, names),
            MatchOp::Literal(_) => {}
        }
    }
}

fn span(input: &[TokenTree], pos: usize, end: usize) -> Range<usize> {
    if end > pos {
        input[pos].range().start..input[end - 1].range().end
    } else {
        let at = input
            .get(pos)
            .map(|t| t.range().start)
            .or_else(|| pos.checked_sub(1).map(|p| input[p].range().end))
            .unwrap_or(0);
        at..at
    }
}

fn is_fat_arrow(input: &[TokenTree], i: usize) -> bool {
    input[i].as_leaf().is_some_and(|t| t.is_punct('=') && t.joint)
        && input.get(i + 1).is_some_and(|t| t.is_punct('>'))
}

fn leaf_kind(tree: Option<&TokenTree>) -> Option<TokenKind> {
    tree.and_then(TokenTree::as_leaf).map(|t| t.kind)
}

fn match_fragment(
    kind: FragmentKind,
    rest: &[MatchOp],
    input: &[TokenTree],
    pos: usize,
) -> Result<usize, String> {
    let expected = |what: &str| match input.get(pos) {
        Some(tree) => format!("expected {what}, found `{}`", describe(tree)),
        None => format!("expected {what}, found end of input"),
    };

    match kind {
        FragmentKind::Ident => match leaf_kind(input.get(pos)) {
            Some(TokenKind::Ident) => Ok(pos + 1),
            _ => Err(expected("an identifier")),
        },
        FragmentKind::Lifetime => match leaf_kind(input.get(pos)) {
            Some(TokenKind::Lifetime) => Ok(pos + 1),
            _ => Err(expected("a lifetime")),
        },
        FragmentKind::Literal => {
            let negated = input.get(pos).is_some_and(|t| t.is_punct('-'));
            let at = if negated { pos + 1 } else { pos };
            match leaf_kind(input.get(at)) {
                Some(TokenKind::Literal) => Ok(at + 1),
                _ if input.get(at).is_some_and(|t| t.is_ident("true") || t.is_ident("false")) => {
                    Ok(at + 1)
                }
                _ => Err(expected("a literal")),
            }
        }
        FragmentKind::Tt => match input.get(pos) {
            Some(_) => Ok(pos + 1),
            None => Err(expected("a token tree")),
        },
        FragmentKind::Block => match input.get(pos) {
            Some(TokenTree::Group(group)) if group.delimiter == Delimiter::Brace => Ok(pos + 1),
            _ => Err(expected("a block")),
        },
        FragmentKind::Vis => {
            if input.get(pos).is_some_and(|t| t.is_ident("pub")) {
                match input.get(pos + 1) {
                    Some(TokenTree::Group(group)) if group.delimiter == Delimiter::Parenthesis => {
                        Ok(pos + 2)
                    }
                    _ => Ok(pos + 1),
                }
            } else {
                Ok(pos)
            }
        }
        FragmentKind::Item => {
            let mut end = pos;
            while let Some(tree) = input.get(end) {
                end += 1;
                let closes_item = tree.is_punct(';')
                    || matches!(tree, TokenTree::Group(g) if g.delimiter == Delimiter::Brace);
                if closes_item {
                    return Ok(end);
                }
            }
            Err(expected("an item"))
        }
        FragmentKind::Expr
        | FragmentKind::Stmt
        | FragmentKind::Ty
        | FragmentKind::Path
        | FragmentKind::Pat
        | FragmentKind::Meta => {
            let next_literal = rest.first().and_then(|op| match op {
                MatchOp::Literal(token) => Some(token.text.as_str()),
                _ => None,
            });
            let tracks_angles = matches!(kind, FragmentKind::Ty | FragmentKind::Path);
            let mut angle_depth = 0usize;
            let mut end = pos;
            while end < input.len() {
                let tree = &input[end];
                if angle_depth == 0 {
                    if is_fat_arrow(input, end) || stops_fragment(kind, tree) {
                        break;
                    }
                    if let (Some(text), Some(token)) = (next_literal, tree.as_leaf()) {
                        if token.text == text {
                            break;
                        }
                    }
                }
                if tracks_angles {
                    if tree.is_punct('<') {
                        angle_depth += 1;
                    } else if tree.is_punct('>') {
                        angle_depth = angle_depth.saturating_sub(1);
                    }
                }
                end += 1;
            }
            if end == pos {
                Err(expected(fragment_name(kind)))
            } else {
                Ok(end)
            }
        }
    }
}

/// Tokens that end a greedy fragment at nesting depth zero.
fn stops_fragment(kind: FragmentKind, tree: &TokenTree) -> bool {
    match kind {
        FragmentKind::Expr | FragmentKind::Stmt => tree.is_punct(',') || tree.is_punct(';'),
        FragmentKind::Ty | FragmentKind::Path => {
            tree.is_punct(',')
                || tree.is_punct(';')
                || tree.is_punct('=')
                || tree.is_punct('|')
                || matches!(tree, TokenTree::Group(g) if g.delimiter == Delimiter::Brace)
        }
        FragmentKind::Pat => {
            tree.is_punct(',') || tree.is_punct('=') || tree.is_ident("if") || tree.is_ident("in")
        }
        FragmentKind::Meta => tree.is_punct(','),
        _ => false,
    }
}

fn fragment_name(kind: FragmentKind) -> &'static str {
    match kind {
        FragmentKind::Expr => "an expression",
        FragmentKind::Stmt => "a statement",
        FragmentKind::Ty => "a type",
        FragmentKind::Path => "a path",
        FragmentKind::Pat => "a pattern",
        FragmentKind::Meta => "an attribute",
        _ => "a fragment",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::rules::parse_rules;
    use crate::decl::token::parse_token_trees;

    fn match_first(rule: &str, input: &str) -> Result<Bindings, String> {
        let rules = parse_rules(rule).unwrap();
        let trees = parse_token_trees(input).unwrap();
        match_rule(&rules[0].matcher, &trees)
    }

    fn text<'a>(input: &'a str, binding: &Binding) -> &'a str {
        match binding {
            Binding::Fragment(range) => &input[range.clone()],
            Binding::Nested(_) => panic!("nested binding"),
        }
    }

    #[test]
    fn empty_matcher_matches_empty_input() {
        assert!(match_first("() => {}", "").unwrap().is_empty());
        assert!(match_first("() => {}", "x").is_err());
    }

    #[test]
    fn literals_must_match() {
        assert!(match_first("(a + b) => {}", "a + b").is_ok());
        assert!(match_first("(a + b) => {}", "a - b").is_err());
    }

    #[test]
    fn expression_stops_at_next_literal() {
        let input = "1 + f(2) ; x";
        let b = match_first("($e:expr ; $i:ident) => {}", input).unwrap();
        assert_eq!(text(input, &b["e"]), "1 + f(2)");
        assert_eq!(text(input, &b["i"]), "x");
    }

    #[test]
    fn expression_stops_before_fat_arrow() {
        let input = "a => b";
        let b = match_first("($l:expr => $r:expr) => {}", input).unwrap();
        assert_eq!(text(input, &b["l"]), "a");
        assert_eq!(text(input, &b["r"]), "b");
    }

    #[test]
    fn type_tracks_generics() {
        let input = "HashMap<K, V>, u8";
        let b = match_first("($a:ty, $b:ty) => {}", input).unwrap();
        assert_eq!(text(input, &b["a"]), "HashMap<K, V>");
        assert_eq!(text(input, &b["b"]), "u8");
    }

    #[test]
    fn separated_repetition() {
        let input = "a, b, c";
        let b = match_first("($($x:ident),*) => {}", input).unwrap();
        let Binding::Nested(items) = &b["x"] else {
            panic!("expected nested binding");
        };
        let names: Vec<&str> = items.iter().map(|it| text(input, it)).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn repetition_counts_are_enforced() {
        assert!(match_first("($($x:ident)+) => {}", "").is_err());
        let b = match_first("($($x:ident)*) => {}", "").unwrap();
        assert_eq!(b["x"], Binding::Nested(vec![]));
        assert!(match_first("($($x:ident)?) => {}", "a b").is_err());
    }

    #[test]
    fn trailing_separator_is_left_for_the_next_op() {
        let input = "a, b,";
        let b = match_first("($($x:ident),* $(,)?) => {}", input).unwrap();
        let Binding::Nested(items) = &b["x"] else {
            panic!("expected nested binding");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn nested_groups_and_fragments() {
        let input = "struct S { x: u32 }";
        let b = match_first(
            "($v:vis struct $name:ident { $($f:ident : $t:ty),* }) => {}",
            input,
        )
        .unwrap();
        assert_eq!(text(input, &b["name"]), "S");
        assert_eq!(b["v"], Binding::Fragment(0..0));
    }

    #[test]
    fn literal_fragment_accepts_negation() {
        let input = "-5";
        let b = match_first("($l:literal) => {}", input).unwrap();
        assert_eq!(text(input, &b["l"]), "-5");
        assert!(match_first("($l:literal) => {}", "x").is_err());
    }

    #[test]
    fn item_fragment() {
        let input = "fn f() {} struct S;";
        let b = match_first("($a:item $b:item) => {}", input).unwrap();
        assert_eq!(text(input, &b["a"]), "fn f() {}");
        assert_eq!(text(input, &b["b"]), "struct S;");
    }
}
