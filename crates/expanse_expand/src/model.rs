//! Macro definitions and call sites, as handed to the engine by its callers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use expanse_common::ContentHash;
use expanse_proc::{ExecutionEnvironment, ProcMacroKind};
use serde::{Deserialize, Serialize};

/// A macro definition of either backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroDefinition {
    /// A `macro_rules!` macro, expanded in-process.
    Declarative(DeclMacroDef),
    /// A procedural macro, expanded by a helper process.
    Procedural(ProcMacroDef),
}

impl MacroDefinition {
    /// The macro's name.
    pub fn name(&self) -> &str {
        match self {
            MacroDefinition::Declarative(def) => &def.name,
            MacroDefinition::Procedural(def) => &def.name,
        }
    }
}

/// A declarative macro: its name and the text between the outer braces of
/// `macro_rules! name { ... }`, i.e. the `(matcher) => { transcriber };` rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclMacroDef {
    /// Macro name, without the `!`.
    pub name: String,
    /// Rule text.
    pub body: String,
}

impl DeclMacroDef {
    /// Creates a definition from its name and rule text.
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// A procedural macro exported by a compiled library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcMacroDef {
    /// Exported macro name.
    pub name: String,
    /// How the macro is declared.
    pub kind: ProcMacroKind,
    /// The compiled library that exports the macro, if it has been built.
    pub artifact: Option<ProcMacroArtifact>,
    /// Where the macro's helper process runs.
    pub environment: ExecutionEnvironment,
}

/// A compiled procedural macro library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcMacroArtifact {
    /// Path of the library on the machine the helper runs on.
    pub path: PathBuf,
    /// Hash of the library contents, if known. Without it, expansions of this
    /// library cannot be cached.
    pub hash: Option<ContentHash>,
}

/// The syntax at a macro call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroCallBody {
    /// `name!(tokens)`: the tokens between the delimiters.
    FunctionLike(String),
    /// `#[derive(Name)] item`: the item the derive is attached to.
    Derive {
        /// Text of the annotated item.
        item: String,
    },
    /// `#[name(attr)] item`.
    Attribute {
        /// Text of the annotated item.
        item: String,
        /// Tokens inside the attribute's delimiters.
        attr: String,
    },
}

impl MacroCallBody {
    /// The procedural macro kind that can be invoked with this body.
    pub fn kind(&self) -> ProcMacroKind {
        match self {
            MacroCallBody::FunctionLike(_) => ProcMacroKind::FunctionLike,
            MacroCallBody::Derive { .. } => ProcMacroKind::Derive,
            MacroCallBody::Attribute { .. } => ProcMacroKind::Attribute,
        }
    }

    /// The main token text handed to the expander.
    pub fn text(&self) -> &str {
        match self {
            MacroCallBody::FunctionLike(text) => text,
            MacroCallBody::Derive { item } | MacroCallBody::Attribute { item, .. } => item,
        }
    }
}

/// A macro call site plus the context needed to expand it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroCallData {
    /// The call-site syntax.
    pub body: MacroCallBody,
    /// Environment variables of the calling package (`CARGO_PKG_NAME`, ...).
    /// Procedural macros may read them, so they are part of the identity.
    pub env: BTreeMap<String, String>,
}

impl MacroCallData {
    /// A function-like call with no environment.
    pub fn function_like(body: impl Into<String>) -> Self {
        Self {
            body: MacroCallBody::FunctionLike(body.into()),
            env: BTreeMap::new(),
        }
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_body_kind() {
        assert_eq!(
            MacroCallBody::FunctionLike(String::new()).kind(),
            ProcMacroKind::FunctionLike
        );
        let derive = MacroCallBody::Derive {
            item: "struct S;".to_string(),
        };
        assert_eq!(derive.kind(), ProcMacroKind::Derive);
        assert_eq!(derive.text(), "struct S;");
        let attr = MacroCallBody::Attribute {
            item: "fn f() {}".to_string(),
            attr: "inline".to_string(),
        };
        assert_eq!(attr.kind(), ProcMacroKind::Attribute);
    }

    #[test]
    fn definition_name() {
        let def = MacroDefinition::Declarative(DeclMacroDef::new("foo", "() => {}"));
        assert_eq!(def.name(), "foo");
    }

    #[test]
    fn call_with_env() {
        let call = MacroCallData::function_like("x").with_env("CARGO_PKG_NAME", "demo");
        assert_eq!(call.env.get("CARGO_PKG_NAME").map(String::as_str), Some("demo"));
    }
}
