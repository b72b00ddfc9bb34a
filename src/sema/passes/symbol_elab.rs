// src/sema/passes/symbol_elab.rs
//
// Pass 3: declare symbols for every symbol-container scope. Containers
// nested in a still-open generic are skipped; the specialized clones get
// elaborated instead, with the formal parameters bound.

use crate::errors::{CompileResult, SemanticError};
use crate::frontend::ExprKind;
use crate::sema::model::SemanticModel;
use crate::sema::scope::{ScopeId, ScopeKind};
use crate::sema::symbols::{SymbolId, SymbolKind};
use crate::sema::type_registry::{TypeId, TypeIdVec};
use crate::sema::types::classify_literal;

/// True when `id` or an ancestor is a generic container with unbound
/// parameters; such scopes defer elaboration until specialization.
pub fn in_open_generic(model: &SemanticModel, id: ScopeId) -> bool {
    model
        .scopes
        .find_ancestor_including_self(id, |s| {
            s.type_id
                .is_some_and(|t| model.types.get(t).is_open_generic())
        })
        .is_some()
}

pub fn process_scope(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    if in_open_generic(model, id) {
        return Ok(());
    }
    match model.scopes.get(id).kind {
        ScopeKind::Namespace => elaborate_namespace(model, id),
        ScopeKind::Class => elaborate_class(model, id),
        ScopeKind::Enum => elaborate_enum(model, id),
        ScopeKind::Interface => elaborate_interface(model, id),
        ScopeKind::Function => elaborate_function(model, id),
        ScopeKind::InitialRoutine => elaborate_initial(model, id),
        ScopeKind::VTable => Ok(()),
    }
}

fn elaborate_namespace(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let decls = model.scopes.get(id).ns_syntax.clone();
    for decl in decls {
        for item in &decl.items {
            let crate::frontend::Item::Let(let_decl) = item else {
                continue;
            };
            let name = model.name_of(let_decl.name).to_string();
            let ty = match &let_decl.ty {
                Some(ty) => model.resolve_type_required(ty, id, let_decl.span)?,
                None => infer_from_literal(model, let_decl)?,
            };
            model.declare_symbol(
                id,
                &name,
                0,
                ty,
                SymbolKind::Variable {
                    is_param: false,
                    readonly: let_decl.readonly,
                },
                let_decl.span,
            )?;
        }
    }
    Ok(())
}

fn infer_from_literal(
    model: &SemanticModel,
    decl: &crate::frontend::LetDecl,
) -> CompileResult<TypeId> {
    if let Some(init) = &decl.init
        && let ExprKind::Literal(text) = &init.kind
        && let Some(kind) = classify_literal(text)
    {
        return Ok(model
            .types
            .builtin_by_name(kind.name())
            .expect("literal kinds are builtin"));
    }
    Err(SemanticError::CannotInferType {
        name: model.name_of(decl.name).to_string(),
        span: decl.span.into(),
    }
    .into())
}

fn elaborate_class(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let Some(class) = model.scopes.get(id).class_syntax.clone() else {
        return Ok(());
    };
    for field in &class.fields {
        let name = model.name_of(field.name).to_string();
        let ty = model.resolve_type_required(&field.ty, id, field.span)?;
        model.declare_symbol(
            id,
            &name,
            0,
            ty,
            SymbolKind::Variable {
                is_param: false,
                readonly: field.readonly,
            },
            field.span,
        )?;
    }
    Ok(())
}

fn elaborate_enum(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let Some(decl) = model.scopes.get(id).enum_syntax.clone() else {
        return Ok(());
    };
    let enum_type = model.scopes.get(id).type_id.expect("enum scope type");
    for (ordinal, variant) in decl.variants.iter().enumerate() {
        let name = model.name_of(variant.name).to_string();
        model.declare_symbol(
            id,
            &name,
            0,
            enum_type,
            SymbolKind::EnumMember {
                ordinal: ordinal as i64,
            },
            variant.span,
        )?;

        // Every variant doubles as a constructor function the runtime
        // provides: zero-arg, or one-arg when the variant has a payload.
        let mut params = TypeIdVec::new();
        if let Some(payload) = &variant.payload {
            params.push(model.resolve_type_required(payload, id, variant.span)?);
        }
        let fn_type = model.types.intern_function(params, enum_type, false);
        model.symbols.declare_raw(
            id,
            name,
            fn_type,
            SymbolKind::Function {
                params: Vec::new(),
                return_type: enum_type,
                code: None,
                is_static: true,
                is_native: true,
            },
            variant.span,
        );
    }
    Ok(())
}

fn elaborate_interface(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let Some(decl) = model.scopes.get(id).interface_syntax.clone() else {
        return Ok(());
    };
    // Abstract methods get symbols without code containers here; default
    // bodies have function scopes that declare themselves.
    for method in &decl.methods {
        if method.body.is_some() {
            continue;
        }
        declare_function_symbol(model, id, id, method, None)?;
    }
    Ok(())
}

fn elaborate_function(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let decl = model
        .scopes
        .get(id)
        .func_syntax
        .clone()
        .expect("function scope without syntax");
    let parent = model.scopes.get(id).parent.expect("function without parent");

    let symbol = declare_function_symbol(model, parent, id, &decl, Some(id))?;
    let data = match &model.symbols.get(symbol).kind {
        SymbolKind::Function {
            return_type,
            is_static,
            ..
        } => (*return_type, *is_static),
        _ => unreachable!("function symbol kind"),
    };
    let scope = model.scopes.get_mut(id);
    scope.func_symbol = Some(symbol);
    scope.return_type = Some(data.0);
    scope.is_static = data.1;
    Ok(())
}

/// Declare the function symbol for `decl` into `target`, resolving its
/// signature from `resolve_scope` (so `Self` and generic bindings apply).
/// Parameter symbols go into the code container, when there is one.
fn declare_function_symbol(
    model: &mut SemanticModel,
    target: ScopeId,
    resolve_scope: ScopeId,
    decl: &crate::frontend::FuncDecl,
    code: Option<ScopeId>,
) -> CompileResult<SymbolId> {
    let name = model.name_of(decl.name).to_string();
    let owner_kind = model.scopes.get(target).kind;
    let owner_type = owner_type_for(model, target);

    let mut param_types = TypeIdVec::new();
    let mut param_symbols = Vec::new();
    let mut is_static = true;

    for (index, param) in decl.params.iter().enumerate() {
        let param_name = model.name_of(param.name).to_string();
        let is_this =
            index == 0 && param_name == "this" && owner_kind.allows_instance_methods();
        let ty = if is_this {
            is_static = false;
            owner_type.expect("instance method outside a type scope")
        } else {
            model.resolve_type_required(&param.ty, resolve_scope, param.span)?
        };
        param_types.push(ty);
        if let Some(container) = code {
            let sym = model.declare_symbol(
                container,
                &param_name,
                0,
                ty,
                SymbolKind::Variable {
                    is_param: true,
                    readonly: is_this,
                },
                param.span,
            )?;
            param_symbols.push(sym);
        }
    }

    let return_type = match &decl.return_type {
        Some(ty) => model.resolve_type_required(ty, resolve_scope, decl.span)?,
        None => TypeId::VOID,
    };
    let fn_type = model
        .types
        .intern_function(param_types, return_type, decl.is_async);

    model.declare_symbol(
        target,
        &name,
        0,
        fn_type,
        SymbolKind::Function {
            params: param_symbols,
            return_type,
            code,
            is_static,
            is_native: decl.is_native,
        },
        decl.span,
    )
}

/// The type an instance method's `this` resolves to: the implementing class
/// for vtable methods, the enclosing type otherwise.
fn owner_type_for(model: &SemanticModel, target: ScopeId) -> Option<TypeId> {
    let scope = model.scopes.get(target);
    if scope.kind == ScopeKind::VTable {
        let class = scope.parent?;
        return model.scopes.get(class).type_id;
    }
    model
        .scopes
        .enclosing_type_scope(target)
        .and_then(|s| model.scopes.get(s).type_id)
}

fn elaborate_initial(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let parent = model.scopes.get(id).parent.expect("initial without parent");
    let name = model.scopes.get(id).name.clone();
    let span = model.scopes.get(id).span;
    let fn_type = model
        .types
        .intern_function(TypeIdVec::new(), TypeId::VOID, false);
    let symbol = model.symbols.declare_raw(
        parent,
        name,
        fn_type,
        SymbolKind::Function {
            params: Vec::new(),
            return_type: TypeId::VOID,
            code: Some(id),
            is_static: true,
            is_native: false,
        },
        span,
    );
    let scope = model.scopes.get_mut(id);
    scope.func_symbol = Some(symbol);
    scope.return_type = Some(TypeId::VOID);
    Ok(())
}
