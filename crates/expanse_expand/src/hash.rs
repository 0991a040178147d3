//! Content hashes of definitions and calls, and the mixed expansion key.

use expanse_common::{ContentHash, ContentHasher};
use expanse_proc::ExecutionEnvironment;

use crate::decl::token::PARSER_VERSION;
use crate::decl::DeclMacroExpander;
use crate::model::{DeclMacroDef, MacroCallBody, MacroCallData, MacroDefinition, ProcMacroDef};
use crate::proc::ProcMacroExpander;

/// Something with a content hash that participates in expansion keys.
pub trait MacroData {
    /// Hash of everything that can influence an expansion.
    ///
    /// `None` means the value cannot be hashed reliably (e.g. a procedural
    /// macro library whose contents are unknown); such expansions are never
    /// cached.
    fn content_hash(&self) -> Option<ContentHash>;
}

impl MacroData for DeclMacroDef {
    fn content_hash(&self) -> Option<ContentHash> {
        let mut hasher = ContentHasher::new();
        hasher.write_tag(0).write_str(&self.body);
        Some(hasher.finish())
    }
}

impl MacroData for ProcMacroDef {
    fn content_hash(&self) -> Option<ContentHash> {
        let artifact = self.artifact.as_ref()?.hash?;
        let environment = match self.environment {
            ExecutionEnvironment::Local => 0,
            ExecutionEnvironment::Remote => 1,
        };
        let mut hasher = ContentHasher::new();
        hasher
            .write_tag(1)
            .write_str(&self.name)
            .write_tag(self.kind.tag())
            .write_hash(&artifact)
            .write_tag(environment);
        Some(hasher.finish())
    }
}

impl MacroData for MacroDefinition {
    fn content_hash(&self) -> Option<ContentHash> {
        match self {
            MacroDefinition::Declarative(def) => def.content_hash(),
            MacroDefinition::Procedural(def) => def.content_hash(),
        }
    }
}

impl MacroData for MacroCallData {
    fn content_hash(&self) -> Option<ContentHash> {
        let mut hasher = ContentHasher::new();
        match &self.body {
            MacroCallBody::FunctionLike(text) => {
                hasher.write_tag(0).write_str(text);
            }
            MacroCallBody::Derive { item } => {
                hasher.write_tag(1).write_str(item);
            }
            MacroCallBody::Attribute { item, attr } => {
                hasher.write_tag(2).write_str(item).write_str(attr);
            }
        }
        hasher.write_u32(u32::try_from(self.env.len()).unwrap_or(u32::MAX));
        for (key, value) in &self.env {
            hasher.write_str(key).write_str(value);
        }
        Some(hasher.finish())
    }
}

/// The salt folded into every expansion key. Changing any expander or the
/// token parser changes the salt, so results stored by an older engine are
/// never looked up again.
fn version_salt() -> ContentHash {
    let mut hasher = ContentHasher::new();
    hasher
        .write_str("expanse-expansion")
        .write_u32(DeclMacroExpander::EXPANDER_VERSION)
        .write_u32(ProcMacroExpander::EXPANDER_VERSION)
        .write_u32(PARSER_VERSION);
    hasher.finish()
}

/// Combines a definition hash and a call hash into the expansion key.
///
/// Returns `None` if either side cannot be hashed.
pub fn mix_hash(def: &impl MacroData, call: &MacroCallData) -> Option<ContentHash> {
    let def = def.content_hash()?;
    let call = call.content_hash()?;
    let mut hasher = ContentHasher::new();
    hasher
        .write_hash(&version_salt())
        .write_hash(&def)
        .write_hash(&call);
    Some(hasher.finish())
}
