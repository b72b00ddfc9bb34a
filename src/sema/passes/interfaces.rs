// src/sema/passes/interfaces.rs
//
// Pass 5: build one vtable per (implementing type, implemented interface)
// pair. Direct `impl` blocks come first with exact signature validation;
// interfaces reached transitively through `extends` get vtables merged in
// next, skipping those already implemented directly; whatever is still
// unslotted falls back to the interface's default body or fails.

use crate::errors::{CompileResult, SemanticError};
use crate::frontend::ImplBlock;
use crate::sema::model::SemanticModel;
use crate::sema::passes::{PASS_CONSTRUCTORS, catch_up, scoping};
use crate::sema::scope::{ScopeId, ScopeKind, VTableSlot};
use crate::sema::symbols::{SymbolId, SymbolKind};
use crate::sema::type_registry::TypeId;
use crate::sema::types::TypeKind;

pub fn process_scope(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    if super::symbol_elab::in_open_generic(model, id) {
        return Ok(());
    }
    let impls = match model.scopes.get(id).kind {
        ScopeKind::Class => model
            .scopes
            .get(id)
            .class_syntax
            .as_ref()
            .map(|c| c.impls.clone()),
        ScopeKind::Enum => model
            .scopes
            .get(id)
            .enum_syntax
            .as_ref()
            .map(|e| e.impls.clone()),
        _ => None,
    };
    let Some(impls) = impls else { return Ok(()) };
    if impls.is_empty() {
        return Ok(());
    }

    // Phase one: a direct vtable per impl block, before any merging, so an
    // explicit `impl Base` is never mistaken for an inherited one.
    let mut directs = Vec::with_capacity(impls.len());
    for impl_block in &impls {
        directs.push(build_direct_vtable(model, id, impl_block)?);
    }

    // Phase two: merge each interface's transitively-extended interfaces
    // into the type, skipping anything already implemented directly. Phase
    // three (default-body fallback) runs inside fill_slots.
    let self_type = model.scopes.get(id).type_id.expect("type scope");
    for (iface, direct, impl_methods, span) in directs {
        let closure = interface_closure(model, iface, span)?;
        let mut used = vec![false; impl_methods.len()];

        for current in closure {
            let vtable = if current == iface {
                direct
            } else {
                if model.vtable_for(self_type, current).is_some() {
                    continue;
                }
                let vt = create_vtable_scope(model, id, current);
                catch_up(model, vt, PASS_CONSTRUCTORS)?;
                vt
            };
            fill_slots(model, vtable, current, &impl_methods, &mut used, span)?;
        }

        for (index, &method) in impl_methods.iter().enumerate() {
            if !used[index] {
                return Err(SemanticError::MethodNotInInterface {
                    interface: model.types.full_name(iface).to_string(),
                    method: model.symbols.get(method).origin_name.clone(),
                    span: model.symbols.get(method).span.into(),
                }
                .into());
            }
        }
    }
    Ok(())
}

type DirectVTable = (TypeId, ScopeId, Vec<SymbolId>, crate::frontend::Span);

fn build_direct_vtable(
    model: &mut SemanticModel,
    type_scope: ScopeId,
    impl_block: &ImplBlock,
) -> CompileResult<DirectVTable> {
    let span = impl_block.span;
    let iface = model.resolve_type_required(&impl_block.interface, type_scope, span)?;
    super::drain_catchup(model)?;
    if model.types.kind(iface) != TypeKind::Interface {
        return Err(SemanticError::NotAnInterface {
            name: model.types.full_name(iface).to_string(),
            span: span.into(),
        }
        .into());
    }
    let self_type = model.scopes.get(type_scope).type_id.expect("type scope");
    if model.vtable_for(self_type, iface).is_some() {
        return Err(SemanticError::DuplicateName {
            name: model.types.full_name(iface).to_string(),
            span: span.into(),
        }
        .into());
    }

    let direct = create_vtable_scope(model, type_scope, iface);
    let mut impl_methods: Vec<SymbolId> = Vec::new();
    for method in &impl_block.methods {
        let scope = scoping::declare_function(model, direct, method.clone())?;
        catch_up(model, scope, PASS_CONSTRUCTORS)?;
        impl_methods.push(model.scopes.get(scope).func_symbol.expect("impl method"));
    }
    catch_up(model, direct, PASS_CONSTRUCTORS)?;
    Ok((iface, direct, impl_methods, span))
}

fn create_vtable_scope(model: &mut SemanticModel, type_scope: ScopeId, iface: TypeId) -> ScopeId {
    let sanitized: String = model
        .types
        .full_name(iface)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let span = model.scopes.get(type_scope).span;
    let vt = model.scopes.alloc(
        ScopeKind::VTable,
        format!("__vtable_{sanitized}"),
        Some(type_scope),
        span,
    );
    model.scopes.get_mut(vt).vtable.interface = Some(iface);
    tracing::debug!(
        ty = %model.scopes.full_name(type_scope),
        interface = %model.types.full_name(iface),
        "vtable created"
    );
    vt
}

/// Slot every method of `iface` into `vtable`: a signature-matching user
/// implementation wins, then the interface's default body, otherwise the
/// implementation is missing and compilation fails.
fn fill_slots(
    model: &mut SemanticModel,
    vtable: ScopeId,
    iface: TypeId,
    impl_methods: &[SymbolId],
    used: &mut [bool],
    span: crate::frontend::Span,
) -> CompileResult<()> {
    let iface_scope = model.types.get(iface).scope.expect("interface scope");
    let iface_methods: Vec<SymbolId> = model
        .symbols
        .in_scope(iface_scope)
        .iter()
        .copied()
        .filter(|&s| model.symbols.get(s).kind.is_function())
        .collect();

    let mut slots = Vec::with_capacity(iface_methods.len());
    for iface_method in iface_methods {
        let iface_data = model.symbols.get(iface_method);
        let name = iface_data.origin_name.clone();

        let mut slot = None;
        for (index, &candidate) in impl_methods.iter().enumerate() {
            if model.symbols.get(candidate).origin_name != name {
                continue;
            }
            if !signatures_match(model, iface_method, candidate) {
                return Err(SemanticError::InterfaceSignatureMismatch {
                    interface: model.types.full_name(iface).to_string(),
                    method: name.clone(),
                    span: model.symbols.get(candidate).span.into(),
                }
                .into());
            }
            used[index] = true;
            slot = Some(VTableSlot::UserImpl {
                interface_method: iface_method,
                implementation: candidate,
            });
            break;
        }

        let slot = match slot {
            Some(slot) => slot,
            None => {
                let has_default = matches!(
                    &model.symbols.get(iface_method).kind,
                    SymbolKind::Function { code: Some(_), .. }
                );
                if !has_default {
                    return Err(SemanticError::InterfaceMethodMissing {
                        interface: model.types.full_name(iface).to_string(),
                        method: name,
                        span: span.into(),
                    }
                    .into());
                }
                VTableSlot::InterfaceDefault {
                    interface_method: iface_method,
                }
            }
        };
        slots.push(slot);
    }
    model.scopes.get_mut(vtable).vtable.slots = slots;
    Ok(())
}

/// Return type and non-`this` parameter types must match the interface
/// declaration exactly, position-wise.
fn signatures_match(model: &SemanticModel, iface_method: SymbolId, candidate: SymbolId) -> bool {
    let iface_type = model.types.get(model.symbols.get(iface_method).type_info);
    let impl_type = model.types.get(model.symbols.get(candidate).type_info);
    if iface_type.fn_return != impl_type.fn_return {
        return false;
    }
    let iface_params = iface_type.fn_params.iter().skip(1);
    let impl_params = impl_type.fn_params.iter().skip(1);
    iface_type.fn_params.len() == impl_type.fn_params.len()
        && iface_params.eq(impl_params)
}

/// `iface` plus everything it transitively extends, deduplicated in
/// discovery order.
fn interface_closure(
    model: &mut SemanticModel,
    iface: TypeId,
    span: crate::frontend::Span,
) -> CompileResult<Vec<TypeId>> {
    let mut closure = vec![iface];
    let mut cursor = 0;
    while cursor < closure.len() {
        let current = closure[cursor];
        cursor += 1;
        let Some(scope) = model.types.get(current).scope else {
            continue;
        };
        let Some(syntax) = model.scopes.get(scope).interface_syntax.clone() else {
            continue;
        };
        for base in &syntax.extends {
            let base_ty = model.resolve_type_required(base, scope, span)?;
            super::drain_catchup(model)?;
            if model.types.kind(base_ty) != TypeKind::Interface {
                return Err(SemanticError::NotAnInterface {
                    name: model.types.full_name(base_ty).to_string(),
                    span: span.into(),
                }
                .into());
            }
            if !closure.contains(&base_ty) {
                closure.push(base_ty);
            }
        }
    }
    Ok(closure)
}
