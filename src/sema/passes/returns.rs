// src/sema/passes/returns.rs
//
// Pass 9: append the trailing return a void container (or initial routine)
// is allowed to omit. Non-void containers are not path-checked here; see
// DESIGN.md for the deliberate gap.

use crate::errors::CompileResult;
use crate::sema::ir::{InstKind, Instruction};
use crate::sema::model::SemanticModel;
use crate::sema::scope::{ScopeId, ScopeKind};
use crate::sema::type_registry::TypeId;

pub fn process_scope(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let scope = model.scopes.get(id);
    if !scope.kind.is_code_container() || scope.is_native {
        return Ok(());
    }
    if super::symbol_elab::in_open_generic(model, id) {
        return Ok(());
    }

    let is_initial = scope.kind == ScopeKind::InitialRoutine;
    let returns_void = scope.return_type.unwrap_or(TypeId::VOID).is_void();
    if !is_initial && !returns_void {
        return Ok(());
    }

    let needs_return = scope
        .instructions
        .last()
        .is_none_or(|inst| !inst.is_return());
    if needs_return {
        model
            .scopes
            .get_mut(id)
            .instructions
            .push(Instruction::new(InstKind::Return { value: None }));
    }
    Ok(())
}
