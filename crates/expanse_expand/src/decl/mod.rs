//! The in-process `macro_rules!` expander.

pub mod matcher;
pub mod rules;
pub mod token;
pub mod transcribe;

use expanse_config::ExpanderConfig;

use crate::error::{DeclMacroExpansionError, MacroExpansionError};
use crate::expander::MacroExpander;
use crate::model::{DeclMacroDef, MacroCallBody, MacroCallData};
use crate::result::ExpansionOk;

use self::matcher::match_rule;
use self::rules::parse_rules;
use self::token::parse_token_trees;
use self::transcribe::transcribe;

/// Resource limits for a single declarative expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    /// Largest expansion text, in bytes.
    pub max_expansion_size: usize,
    /// Deepest repetition nesting.
    pub max_depth: usize,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self::from(&ExpanderConfig::default())
    }
}

impl From<&ExpanderConfig> for ExpansionLimits {
    fn from(config: &ExpanderConfig) -> Self {
        Self {
            max_expansion_size: config.max_expansion_size,
            max_depth: config.max_depth,
        }
    }
}

/// Expands declarative macros by trying each rule in order.
#[derive(Debug, Clone, Default)]
pub struct DeclMacroExpander {
    limits: ExpansionLimits,
}

impl DeclMacroExpander {
    /// Version of the matching and transcription algorithm.
    pub const EXPANDER_VERSION: u32 = 1;

    /// Creates an expander with the given limits.
    pub fn new(limits: ExpansionLimits) -> Self {
        Self { limits }
    }

    /// The limits in effect.
    pub fn limits(&self) -> ExpansionLimits {
        self.limits
    }
}

impl MacroExpander for DeclMacroExpander {
    type Def = DeclMacroDef;

    fn expand(
        &self,
        def: &DeclMacroDef,
        call: &MacroCallData,
    ) -> Result<ExpansionOk, MacroExpansionError> {
        let MacroCallBody::FunctionLike(body) = &call.body else {
            return Err(DeclMacroExpansionError::CallSyntax(format!(
                "`{}` can only be invoked as `{}!(...)`",
                def.name, def.name
            ))
            .into());
        };

        let rules = parse_rules(&def.body)?;
        let input = parse_token_trees(body)
            .map_err(|e| DeclMacroExpansionError::CallSyntax(e.to_string()))?;

        let mut last_error = String::new();
        for rule in &rules {
            match match_rule(&rule.matcher, &input) {
                Ok(bindings) => {
                    let (text, ranges) = transcribe(&rule.transcriber, &bindings, body, &self.limits)?;
                    tracing::trace!(name = %def.name, len = text.len(), "expanded declarative macro");
                    return Ok(ExpansionOk::new(text, ranges));
                }
                Err(reason) => last_error = reason,
            }
        }
        Err(DeclMacroExpansionError::Matching(last_error).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::MACRO_DOLLAR_CRATE_IDENTIFIER;

    fn expand(body: &str, call: &str) -> Result<ExpansionOk, MacroExpansionError> {
        DeclMacroExpander::default().expand(
            &DeclMacroDef::new("m", body),
            &MacroCallData::function_like(call),
        )
    }

    #[test]
    fn first_matching_rule_wins() {
        let body = "() => { zero }; ($x:expr) => { one($x) }; ($($x:expr),+) => { many }";
        assert_eq!(expand(body, "").unwrap().text, "zero");
        assert_eq!(expand(body, "1 + 2").unwrap().text, "one(1 + 2)");
        assert_eq!(expand(body, "1, 2").unwrap().text, "many");
    }

    #[test]
    fn literal_result() {
        let ok = expand(r#"() => { "A" }"#, "").unwrap();
        assert_eq!(ok.text, "\"A\"");
        assert!(ok.ranges.is_empty());
        assert!(ok.dollar_crate_occurrences.is_empty());
    }

    #[test]
    fn no_matching_rule() {
        let err = expand("(a) => {}", "b").unwrap_err();
        assert!(matches!(
            err,
            MacroExpansionError::Decl(DeclMacroExpansionError::Matching(_))
        ));
    }

    #[test]
    fn bad_definition_and_call() {
        assert!(matches!(
            expand("nonsense", ""),
            Err(MacroExpansionError::Decl(DeclMacroExpansionError::DefSyntax(_)))
        ));
        assert!(matches!(
            expand("() => {}", "(("),
            Err(MacroExpansionError::Decl(DeclMacroExpansionError::CallSyntax(_)))
        ));
    }

    #[test]
    fn derive_call_is_rejected() {
        let call = MacroCallData {
            body: MacroCallBody::Derive {
                item: "struct S;".to_string(),
            },
            env: Default::default(),
        };
        let err = DeclMacroExpander::default()
            .expand(&DeclMacroDef::new("m", "() => {}"), &call)
            .unwrap_err();
        assert!(matches!(
            err,
            MacroExpansionError::Decl(DeclMacroExpansionError::CallSyntax(_))
        ));
    }

    #[test]
    fn dollar_crate_occurrences_are_reported() {
        let ok = expand("($n:ident) => { $crate::$n() }", "go").unwrap();
        assert_eq!(ok.text, format!("{MACRO_DOLLAR_CRATE_IDENTIFIER}::go()"));
        assert_eq!(ok.dollar_crate_occurrences, vec![0]);
        let go = MACRO_DOLLAR_CRATE_IDENTIFIER.len() as u32 + 2;
        assert_eq!(ok.ranges.map_offset_from_expansion_to_call_body(go), Some(0));
    }

    #[test]
    fn expansion_is_deterministic() {
        let body = "($($k:ident = $v:expr),*) => { $(let $k = $v;)* }";
        let a = expand(body, "x = 1, y = 2").unwrap();
        let b = expand(body, "x = 1, y = 2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.text, "let x = 1; let y = 2;");
    }
}
