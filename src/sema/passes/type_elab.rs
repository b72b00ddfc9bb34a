// src/sema/passes/type_elab.rs
//
// Pass 2: type elaboration. Types are registered during scoping, so this
// pass only advances the stamp on every node; it is the hook point for
// type-level work that needs the whole tree in place.

use crate::errors::CompileResult;
use crate::sema::model::SemanticModel;
use crate::sema::scope::ScopeId;

pub fn process_scope(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let scope = model.scopes.get(id);
    if scope.kind.is_type_scope() {
        tracing::trace!(name = %model.scopes.full_name(id), "type elaborated");
    }
    Ok(())
}
