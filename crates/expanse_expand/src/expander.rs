//! The interface shared by both expansion backends.

use crate::error::MacroExpansionError;
use crate::hash::MacroData;
use crate::model::MacroCallData;
use crate::result::ExpansionOk;

/// A pure function from a definition and a call to an expansion outcome.
///
/// Given equal inputs an implementation must produce equal outputs, except
/// for failures that [`MacroExpansionError::can_cache_error`] reports as
/// transient.
pub trait MacroExpander: Send + Sync {
    /// The definition type this backend expands.
    type Def: MacroData;

    /// Expands `call` using `def`.
    fn expand(
        &self,
        def: &Self::Def,
        call: &MacroCallData,
    ) -> Result<ExpansionOk, MacroExpansionError>;
}
