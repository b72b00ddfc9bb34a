// src/sema/passes/scoping.rs
//
// Pass 1: materialize the scope tree from syntax. Namespaces merge by name
// across files; any other duplicate name within one scope is fatal. Later
// synthesis sites (constructors, lambda extraction, generator lowering,
// generic specialization) reuse the declaration helpers here, so a
// synthesized container is scoped exactly like a parsed one.

use std::rc::Rc;

use crate::errors::{CompileResult, SemanticError};
use crate::frontend::{ClassDecl, EnumDecl, FuncDecl, InterfaceDecl, Item, NamespaceDecl, Program};
use crate::sema::model::SemanticModel;
use crate::sema::scope::{AsyncState, ScopeId, ScopeKind};
use crate::sema::type_registry::TypeData;
use crate::sema::types::TypeKind;

/// Register every namespace up front so qualified references resolve no
/// matter which file declares the target.
pub fn declare_namespaces(model: &mut SemanticModel, program: &Program) -> CompileResult<()> {
    for file in &program.files {
        for ns in &file.namespaces {
            declare_namespace(model, model.root, ns)?;
        }
    }
    Ok(())
}

fn declare_namespace(
    model: &mut SemanticModel,
    parent: ScopeId,
    decl: &Rc<NamespaceDecl>,
) -> CompileResult<()> {
    let name = model.name_of(decl.name).to_string();
    let parent_full = model.scopes.full_name(parent);
    let full = if parent_full.is_empty() {
        name.clone()
    } else {
        format!("{parent_full}.{name}")
    };

    let scope = match model.namespaces.get(&full) {
        Some(&existing) => existing,
        None => {
            let id = model
                .scopes
                .alloc(ScopeKind::Namespace, name, Some(parent), decl.span);
            model.namespaces.insert(full, id);
            model.namespace_order.push(id);
            id
        }
    };

    for import in &decl.imports {
        let dotted = import
            .iter()
            .map(|s| model.name_of(*s).to_string())
            .collect::<Vec<_>>()
            .join(".");
        let imports = &mut model.scopes.get_mut(scope).imports;
        if !imports.contains(&dotted) {
            imports.push(dotted);
        }
    }
    model.scopes.get_mut(scope).ns_syntax.push(decl.clone());

    for item in &decl.items {
        if let Item::Namespace(nested) = item {
            declare_namespace(model, scope, nested)?;
        }
    }
    Ok(())
}

/// Build this scope's children from its attached syntax
pub fn process_scope(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    match model.scopes.get(id).kind {
        ScopeKind::Namespace => {
            let decls = model.scopes.get(id).ns_syntax.clone();
            for decl in decls {
                for item in &decl.items {
                    match item {
                        Item::Class(class) => {
                            declare_class(model, id, class.clone())?;
                        }
                        Item::Enum(decl) => {
                            declare_enum(model, id, decl.clone())?;
                        }
                        Item::Interface(decl) => {
                            declare_interface(model, id, decl.clone())?;
                        }
                        Item::Function(func) => {
                            declare_function(model, id, func.clone())?;
                        }
                        Item::Initial(init) => {
                            let name = model.synth_name("__initial");
                            let scope = model.scopes.alloc(
                                ScopeKind::InitialRoutine,
                                name,
                                Some(id),
                                init.span,
                            );
                            model.scopes.get_mut(scope).body = Some(init.body.clone());
                        }
                        // Namespace-level variables become symbols in pass 3
                        // and initializer code in pass 4
                        Item::Let(_) => {}
                        // Nested namespaces were registered up front
                        Item::Namespace(_) => {}
                    }
                }
            }
        }
        ScopeKind::Class => {
            let Some(class) = model.scopes.get(id).class_syntax.clone() else {
                return Ok(());
            };
            for method in &class.methods {
                declare_function(model, id, method.clone())?;
            }
        }
        ScopeKind::Enum => {
            let Some(decl) = model.scopes.get(id).enum_syntax.clone() else {
                return Ok(());
            };
            for method in &decl.methods {
                declare_function(model, id, method.clone())?;
            }
        }
        ScopeKind::Interface => {
            let Some(decl) = model.scopes.get(id).interface_syntax.clone() else {
                return Ok(());
            };
            // Only default bodies compile to code; abstract methods get
            // symbols in pass 3 without a container.
            for method in &decl.methods {
                if method.body.is_some() {
                    declare_function(model, id, method.clone())?;
                }
            }
        }
        // Function, initial-routine, and vtable scopes have no syntax-driven
        // children; lambdas and generators inside bodies are synthesized by
        // the rewrite pass.
        _ => {}
    }
    Ok(())
}

fn check_duplicate_child(model: &SemanticModel, parent: ScopeId, name: &str) -> CompileResult<()> {
    for &child in &model.scopes.get(parent).children {
        if model.scopes.get(child).name == name {
            return Err(SemanticError::DuplicateName {
                name: name.to_string(),
                span: model.scopes.get(child).span.into(),
            }
            .into());
        }
    }
    Ok(())
}

pub fn declare_class(
    model: &mut SemanticModel,
    parent: ScopeId,
    class: Rc<ClassDecl>,
) -> CompileResult<ScopeId> {
    let name = model.name_of(class.name).to_string();
    check_duplicate_child(model, parent, &name)?;
    let namespace = model.scopes.full_name(parent);
    let generic_defs = class
        .type_params
        .iter()
        .map(|p| model.name_of(*p).to_string())
        .collect();

    let scope = model
        .scopes
        .alloc(ScopeKind::Class, name.clone(), Some(parent), class.span);
    let type_id = model.types.intern(TypeData::nominal(
        TypeKind::Class,
        &name,
        &namespace,
        generic_defs,
    ));
    model.types.get_mut(type_id).scope = Some(scope);
    model.scopes.get_mut(scope).type_id = Some(type_id);
    model.scopes.get_mut(scope).class_syntax = Some(class);
    model.classes.push(scope);
    Ok(scope)
}

pub fn declare_enum(
    model: &mut SemanticModel,
    parent: ScopeId,
    decl: Rc<EnumDecl>,
) -> CompileResult<ScopeId> {
    let name = model.name_of(decl.name).to_string();
    check_duplicate_child(model, parent, &name)?;
    let namespace = model.scopes.full_name(parent);
    let generic_defs = decl
        .type_params
        .iter()
        .map(|p| model.name_of(*p).to_string())
        .collect();

    let scope = model
        .scopes
        .alloc(ScopeKind::Enum, name.clone(), Some(parent), decl.span);
    let type_id = model.types.intern(TypeData::nominal(
        TypeKind::Enum,
        &name,
        &namespace,
        generic_defs,
    ));
    model.types.get_mut(type_id).scope = Some(scope);
    model.scopes.get_mut(scope).type_id = Some(type_id);
    model.scopes.get_mut(scope).enum_syntax = Some(decl);
    model.enums.push(scope);
    Ok(scope)
}

pub fn declare_interface(
    model: &mut SemanticModel,
    parent: ScopeId,
    decl: Rc<InterfaceDecl>,
) -> CompileResult<ScopeId> {
    let name = model.name_of(decl.name).to_string();
    check_duplicate_child(model, parent, &name)?;
    let namespace = model.scopes.full_name(parent);
    let generic_defs = decl
        .type_params
        .iter()
        .map(|p| model.name_of(*p).to_string())
        .collect();

    let scope = model
        .scopes
        .alloc(ScopeKind::Interface, name.clone(), Some(parent), decl.span);
    let type_id = model.types.intern(TypeData::nominal(
        TypeKind::Interface,
        &name,
        &namespace,
        generic_defs,
    ));
    model.types.get_mut(type_id).scope = Some(scope);
    model.scopes.get_mut(scope).type_id = Some(type_id);
    model.scopes.get_mut(scope).interface_syntax = Some(decl);
    model.interfaces.push(scope);
    Ok(scope)
}

pub fn declare_function(
    model: &mut SemanticModel,
    parent: ScopeId,
    func: Rc<FuncDecl>,
) -> CompileResult<ScopeId> {
    let name = model.name_of(func.name).to_string();
    check_duplicate_child(model, parent, &name)?;

    let scope = model
        .scopes
        .alloc(ScopeKind::Function, name, Some(parent), func.span);
    let s = model.scopes.get_mut(scope);
    s.body = func.body.clone();
    s.is_native = func.is_native;
    s.async_state = if func.is_async {
        AsyncState::Yes
    } else {
        AsyncState::Unknown
    };
    s.func_syntax = Some(func);
    Ok(scope)
}
