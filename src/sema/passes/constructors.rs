// src/sema/passes/constructors.rs
//
// Pass 4: pick or synthesize a constructor for every class, and a module
// initializer for every namespace. Synthesized containers are caught up
// through symbol elaboration immediately so their parameters are queryable.
// Field and namespace-variable initializers lower to assignment
// instructions here; the user body (if any) lowers after them in the code
// generation pass, which keeps initializers first in the final instruction
// list.

use std::rc::Rc;

use crate::errors::{CompileResult, SemanticError};
use crate::frontend::{Block, FuncDecl, Item, Param, Span, TypeExpr};
use crate::sema::model::SemanticModel;
use crate::sema::passes::{PASS_SYMBOLS, catch_up, lower::Lowering, scoping};
use crate::sema::scope::{ScopeId, ScopeKind};
use crate::sema::symbols::SymbolKind;

/// Name of the synthesized per-namespace initializer
pub const NAMESPACE_INIT: &str = "__ns_init";

pub fn process_scope(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    if super::symbol_elab::in_open_generic(model, id) {
        return Ok(());
    }
    match model.scopes.get(id).kind {
        ScopeKind::Class => process_class(model, id),
        ScopeKind::Namespace => process_namespace(model, id),
        _ => Ok(()),
    }
}

fn process_class(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let class_type = model.scopes.get(id).type_id.expect("class scope type");

    let ctor = match model.symbols.lookup(id, "new", u32::MAX) {
        Some(user) => {
            let data = model.symbols.get(user);
            let fn_type = model.types.get(data.type_info);
            let this_matches = fn_type.fn_params.first() == Some(&class_type);
            if !data.kind.is_function() || !this_matches {
                return Err(SemanticError::BadConstructor {
                    class: model.types.full_name(class_type).to_string(),
                    span: data.span.into(),
                }
                .into());
            }
            user
        }
        None => {
            // No user constructor: synthesize the default one and replay
            // the completed passes on it.
            let decl = synthesized_ctor_decl(model, "new");
            let scope = scoping::declare_function(model, id, decl)?;
            catch_up(model, scope, PASS_SYMBOLS)?;
            model.scopes.get(scope).func_symbol.expect("ctor symbol")
        }
    };
    model.scopes.get_mut(id).constructor = Some(ctor);

    // Field initializers run at the top of the constructor body.
    let Some(code) = function_code(model, ctor) else {
        return Ok(());
    };
    let this_sym = model
        .symbols
        .lookup(code, "this", u32::MAX)
        .expect("constructor this");
    let class = model.scopes.get(id).class_syntax.clone();
    if let Some(class) = class {
        for field in &class.fields {
            let Some(init) = &field.init else { continue };
            let field_name = model.name_of(field.name).to_string();
            let field_sym = model
                .symbols
                .lookup(id, &field_name, u32::MAX)
                .expect("field symbol");
            let mut lowering = Lowering::new(model, code);
            lowering.emit_member_init(field_sym, this_sym, init)?;
        }
    }
    Ok(())
}

fn process_namespace(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    if model.symbols.lookup(id, NAMESPACE_INIT, u32::MAX).is_some() {
        return Err(SemanticError::ReservedSymbolName {
            name: NAMESPACE_INIT.to_string(),
            span: model.scopes.get(id).span.into(),
        }
        .into());
    }

    let decl = synthesized_ctor_decl(model, NAMESPACE_INIT);
    let scope = scoping::declare_function(model, id, decl)?;
    catch_up(model, scope, PASS_SYMBOLS)?;
    let init_sym = model.scopes.get(scope).func_symbol.expect("init symbol");
    model.scopes.get_mut(id).constructor = Some(init_sym);

    // Top-level declaration initializers run inside the module initializer,
    // in declaration order.
    let decls = model.scopes.get(id).ns_syntax.clone();
    for ns_decl in decls {
        for item in &ns_decl.items {
            let Item::Let(let_decl) = item else { continue };
            let Some(init) = &let_decl.init else { continue };
            let name = model.name_of(let_decl.name).to_string();
            let var_sym = model
                .symbols
                .lookup(id, &name, u32::MAX)
                .expect("namespace variable symbol");
            let mut lowering = Lowering::new(model, scope);
            lowering.emit_symbol_init(var_sym, init)?;
        }
    }
    Ok(())
}

/// Constructor/initializer declaration: instance methods take `this`, the
/// namespace initializer takes nothing.
fn synthesized_ctor_decl(model: &mut SemanticModel, name: &str) -> Rc<FuncDecl> {
    let name_sym = model.interner.intern(name);
    let params = if name == NAMESPACE_INIT {
        Vec::new()
    } else {
        vec![Param {
            name: model.interner.intern("this"),
            ty: TypeExpr::SelfType,
            span: Span::synthesized(),
        }]
    };
    Rc::new(FuncDecl {
        name: name_sym,
        params,
        return_type: None,
        body: Some(Block::new(Vec::new())),
        is_async: false,
        is_native: false,
        span: Span::synthesized(),
    })
}

fn function_code(model: &SemanticModel, symbol: crate::sema::symbols::SymbolId) -> Option<ScopeId> {
    match &model.symbols.get(symbol).kind {
        SymbolKind::Function { code, .. } => *code,
        _ => None,
    }
}
