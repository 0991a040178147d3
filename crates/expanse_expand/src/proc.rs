//! The procedural macro expander, backed by out-of-process workers.

use std::sync::Arc;

use expanse_proc::{
    CancellationToken, ExpansionTask, PoolUnavailable, ProcMacroApplicationService,
};

use crate::error::{MacroExpansionError, ProcMacroExpansionError};
use crate::expander::MacroExpander;
use crate::model::{MacroCallBody, MacroCallData, ProcMacroArtifact, ProcMacroDef};
use crate::ranges::{MappedTextRange, RangeMap};
use crate::result::ExpansionOk;

/// Sends procedural macro calls to the worker pool of the definition's
/// execution environment.
pub struct ProcMacroExpander {
    service: Arc<ProcMacroApplicationService>,
    cancel: CancellationToken,
}

impl ProcMacroExpander {
    /// Version of the request encoding and result interpretation.
    pub const EXPANDER_VERSION: u32 = 1;

    /// Creates an expander over a shared service.
    pub fn new(service: Arc<ProcMacroApplicationService>) -> Self {
        Self {
            service,
            cancel: CancellationToken::new(),
        }
    }

    /// An expander whose requests are abandoned once `cancel` is set.
    pub fn with_cancellation(
        service: Arc<ProcMacroApplicationService>,
        cancel: CancellationToken,
    ) -> Self {
        Self { service, cancel }
    }

    /// The service this expander talks to.
    pub fn service(&self) -> &Arc<ProcMacroApplicationService> {
        &self.service
    }

    fn task(
        def: &ProcMacroDef,
        artifact: &ProcMacroArtifact,
        call: &MacroCallData,
    ) -> ExpansionTask {
        let attributes = match &call.body {
            MacroCallBody::Attribute { attr, .. } => Some(attr.clone()),
            MacroCallBody::FunctionLike(_) | MacroCallBody::Derive { .. } => None,
        };
        ExpansionTask {
            library: artifact.path.display().to_string(),
            macro_name: def.name.clone(),
            kind: def.kind,
            body: call.body.text().to_string(),
            attributes,
            env: call.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// Maps the call body into the expansion if it was echoed back verbatim.
fn echoed_body_ranges(body: &str, text: &str) -> RangeMap {
    if body.is_empty() {
        return RangeMap::new();
    }
    let found = text.find(body).and_then(|dst| {
        Some(MappedTextRange {
            src_offset: 0,
            dst_offset: u32::try_from(dst).ok()?,
            length: u32::try_from(body.len()).ok()?,
        })
    });
    RangeMap::from_ranges(found)
}

impl MacroExpander for ProcMacroExpander {
    type Def = ProcMacroDef;

    fn expand(
        &self,
        def: &ProcMacroDef,
        call: &MacroCallData,
    ) -> Result<ExpansionOk, MacroExpansionError> {
        let Some(artifact) = &def.artifact else {
            return Err(ProcMacroExpansionError::CantRunExpander {
                message: format!("no compiled library exports `{}`", def.name),
            }
            .into());
        };
        let pool = self.service.pool(def.environment).map_err(|e| match e {
            PoolUnavailable::Disabled => ProcMacroExpansionError::ProcMacroExpansionIsDisabled,
            PoolUnavailable::NoEnvironment(_) | PoolUnavailable::ExecutableNotFound(_) => {
                ProcMacroExpansionError::ExecutableNotFound
            }
        })?;

        let payload = Self::task(def, artifact, call).encode().map_err(|e| {
            ProcMacroExpansionError::IoExceptionThrown {
                message: e.to_string(),
            }
        })?;
        let output = pool
            .expand_cancellable(&payload, &self.cancel)
            .map_err(ProcMacroExpansionError::from)?;
        let text = String::from_utf8(output).map_err(|e| {
            ProcMacroExpansionError::IoExceptionThrown {
                message: e.to_string(),
            }
        })?;

        tracing::trace!(name = %def.name, kind = %def.kind, len = text.len(), "expanded procedural macro");
        let ranges = echoed_body_ranges(call.body.text(), &text);
        Ok(ExpansionOk::new(text, ranges))
    }
}
