//! Macro expansion backends and the data they operate on.
//!
//! A [`MacroExpander`] is a pure function from a definition and a call to an
//! [`ExpansionOk`] or a [`MacroExpansionError`]. Two backends are provided:
//! [`DeclMacroExpander`] for `macro_rules!` macros, run in-process, and
//! [`ProcMacroExpander`] for procedural macros, run in helper processes.
//!
//! [`mix_hash`] derives the key under which an expansion may be cached.

#![warn(missing_docs)]

pub mod decl;
pub mod error;
pub mod expander;
pub mod hash;
pub mod model;
pub mod proc;
pub mod ranges;
pub mod result;

pub use decl::token::PARSER_VERSION;
pub use decl::{DeclMacroExpander, ExpansionLimits};
pub use error::{
    DeclMacroExpansionError, GetMacroExpansionError, MacroExpansionError, ProcMacroExpansionError,
};
pub use expander::MacroExpander;
pub use hash::{mix_hash, MacroData};
pub use model::{
    DeclMacroDef, MacroCallBody, MacroCallData, MacroDefinition, ProcMacroArtifact, ProcMacroDef,
};
pub use proc::ProcMacroExpander;
pub use ranges::{MappedTextRange, RangeMap};
pub use result::{ExpansionOk, MACRO_DOLLAR_CRATE_IDENTIFIER};
