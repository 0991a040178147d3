//! Producing expansion text from a transcriber and matched bindings.

use super::matcher::{Binding, Bindings};
use super::rules::TranscribeOp;
use super::ExpansionLimits;
use crate::error::DeclMacroExpansionError;
use crate::ranges::{MappedTextRange, RangeMap};
use crate::result::MACRO_DOLLAR_CRATE_IDENTIFIER;

/// Accumulates expansion text and the ranges copied from the call body.
struct Output<'a> {
    call_body: &'a str,
    limits: &'a ExpansionLimits,
    text: String,
    ranges: Vec<MappedTextRange>,
    force_space: bool,
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

impl<'a> Output<'a> {
    /// Inserts a space before `next` if the definition had one there, or if
    /// gluing would fuse two words into one.
    fn separate(&mut self, next: &str, spaced: bool) {
        let forced = std::mem::take(&mut self.force_space);
        let Some(last) = self.text.chars().next_back() else {
            return;
        };
        let fuses = is_word_char(last) && next.chars().next().is_some_and(is_word_char);
        if spaced || fuses || forced {
            self.text.push(' ');
        }
    }

    fn check_size(&self) -> Result<(), DeclMacroExpansionError> {
        if self.text.len() > self.limits.max_expansion_size {
            return Err(DeclMacroExpansionError::TooLargeExpansion {
                limit: self.limits.max_expansion_size,
            });
        }
        Ok(())
    }

    fn push_token(&mut self, text: &str, spaced: bool) -> Result<(), DeclMacroExpansionError> {
        self.separate(text, spaced);
        self.text.push_str(text);
        self.check_size()
    }

    fn push_fragment(
        &mut self,
        range: std::ops::Range<usize>,
        spaced: bool,
    ) -> Result<(), DeclMacroExpansionError> {
        if range.is_empty() {
            return Ok(());
        }
        let fragment = &self.call_body[range.clone()];
        self.separate(fragment, spaced);
        let (Ok(src_offset), Ok(dst_offset), Ok(length)) = (
            u32::try_from(range.start),
            u32::try_from(self.text.len()),
            u32::try_from(range.len()),
        ) else {
            return Err(DeclMacroExpansionError::TooLargeExpansion {
                limit: self.limits.max_expansion_size,
            });
        };
        self.ranges.push(MappedTextRange {
            src_offset,
            dst_offset,
            length,
        });
        self.text.push_str(fragment);
        self.check_size()
    }
}

/// Expands `ops` with `bindings`. Fragment text is copied from `call_body`.
pub fn transcribe(
    ops: &[TranscribeOp],
    bindings: &Bindings,
    call_body: &str,
    limits: &ExpansionLimits,
) -> Result<(String, RangeMap), DeclMacroExpansionError> {
    let mut out = Output {
        call_body,
        limits,
        text: String::new(),
        ranges: Vec::new(),
        force_space: false,
    };
    let mut indices = Vec::new();
    transcribe_seq(ops, bindings, &mut indices, &mut out)?;
    Ok((out.text, RangeMap::from_ranges(out.ranges)))
}

fn transcribe_seq(
    ops: &[TranscribeOp],
    bindings: &Bindings,
    indices: &mut Vec<usize>,
    out: &mut Output<'_>,
) -> Result<(), DeclMacroExpansionError> {
    for op in ops {
        match op {
            TranscribeOp::Literal(token) => out.push_token(&token.text, token.spaced)?,
            TranscribeOp::DollarCrate { spaced } => {
                out.push_token(MACRO_DOLLAR_CRATE_IDENTIFIER, *spaced)?
            }
            TranscribeOp::Var { name, spaced } => match lookup(bindings, name, indices) {
                Some(Binding::Fragment(range)) => out.push_fragment(range.clone(), *spaced)?,
                Some(Binding::Nested(_)) => {
                    return Err(DeclMacroExpansionError::DefSyntax(format!(
                        "variable `{name}` is still repeating at this depth"
                    )))
                }
                None => {
                    out.push_token("$", *spaced)?;
                    out.push_token(name, false)?;
                }
            },
            TranscribeOp::Group {
                delimiter,
                open_spaced,
                close_spaced,
                ops,
            } => {
                out.push_token(&delimiter.open().to_string(), *open_spaced)?;
                transcribe_seq(ops, bindings, indices, out)?;
                out.push_token(&delimiter.close().to_string(), *close_spaced)?;
            }
            TranscribeOp::Repeat(rep) => {
                if indices.len() >= out.limits.max_depth {
                    return Err(DeclMacroExpansionError::DepthLimitExceeded {
                        limit: out.limits.max_depth,
                    });
                }
                let count = repeat_count(&rep.ops, bindings, indices)?;
                for i in 0..count {
                    if i > 0 {
                        if let Some(separator) = &rep.separator {
                            out.push_token(&separator.text, separator.spaced)?;
                        }
                        out.force_space = true;
                    }
                    indices.push(i);
                    let result = transcribe_seq(&rep.ops, bindings, indices, out);
                    indices.pop();
                    result?;
                }
            }
        }
    }
    Ok(())
}

/// Resolves `name` at the current repetition position. A binding captured
/// outside a repetition stays fixed at every depth.
fn lookup<'b>(bindings: &'b Bindings, name: &str, indices: &[usize]) -> Option<&'b Binding> {
    let mut binding = bindings.get(name)?;
    for &i in indices {
        match binding {
            Binding::Nested(items) => binding = items.get(i)?,
            Binding::Fragment(_) => break,
        }
    }
    Some(binding)
}

fn collect_vars<'o>(ops: &'o [TranscribeOp], names: &mut Vec<&'o str>) {
    for op in ops {
        match op {
            TranscribeOp::Var { name, .. } => names.push(name),
            TranscribeOp::Group { ops, .. } => collect_vars(ops, names),
            TranscribeOp::Repeat(rep) => collect_vars(&rep.ops, names),
            TranscribeOp::Literal(_) | TranscribeOp::DollarCrate { .. } => {}
        }
    }
}

/// Number of iterations for a repetition: every variable inside it that
/// repeats at this depth must agree.
fn repeat_count(
    ops: &[TranscribeOp],
    bindings: &Bindings,
    indices: &[usize],
) -> Result<usize, DeclMacroExpansionError> {
    let mut names = Vec::new();
    collect_vars(ops, &mut names);

    let mut count: Option<(usize, &str)> = None;
    for name in names {
        let Some(Binding::Nested(items)) = lookup(bindings, name, indices) else {
            continue;
        };
        match count {
            None => count = Some((items.len(), name)),
            Some((n, first)) if n != items.len() => {
                return Err(DeclMacroExpansionError::Matching(format!(
                    "meta-variable `{first}` repeats {n} times, but `{name}` repeats {} times",
                    items.len()
                )))
            }
            Some(_) => {}
        }
    }
    count.map(|(n, _)| n).ok_or_else(|| {
        DeclMacroExpansionError::DefSyntax(
            "repetition contains no variables that repeat at this depth".to_string(),
        )
    })
}
