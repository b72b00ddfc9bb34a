// src/sema/passes/entry.rs
//
// Pass 8: synthesize the process entry point. It calls every namespace's
// initializer, enqueues every initial routine as a scheduler job, and hands
// control to the scheduler's run loop. A user symbol squatting on the entry
// name is fatal.

use std::rc::Rc;

use crate::errors::{CompileResult, SemanticError};
use crate::frontend::{Block, FuncDecl, Span};
use crate::sema::ir::InstKind;
use crate::sema::model::{BUILTIN_NAMESPACE, ENQUEUE_JOB, RUN_SCHEDULER, SemanticModel};
use crate::sema::passes::{PASS_LOWER, catch_up, scoping};
use crate::sema::scope::ScopeKind;

pub fn synthesize(model: &mut SemanticModel) -> CompileResult<()> {
    let entry_name = model.options.entry_symbol.clone();

    let mut containers = vec![model.root];
    containers.extend(model.namespace_order.iter().copied());
    for scope in containers {
        if let Some(taken) = model.symbols.lookup(scope, &entry_name, u32::MAX) {
            return Err(SemanticError::ReservedSymbolName {
                name: entry_name,
                span: model.symbols.get(taken).span.into(),
            }
            .into());
        }
    }

    let name_sym = model.interner.intern(&entry_name);
    let decl = Rc::new(FuncDecl {
        name: name_sym,
        params: Vec::new(),
        return_type: None,
        body: Some(Block::new(Vec::new())),
        is_async: false,
        is_native: false,
        span: Span::synthesized(),
    });
    let entry = scoping::declare_function(model, model.root, decl)?;
    catch_up(model, entry, PASS_LOWER)?;

    let builtin_ns = model
        .namespace(BUILTIN_NAMESPACE)
        .expect("builtin namespace");
    let enqueue = model
        .symbols
        .lookup(builtin_ns, ENQUEUE_JOB, u32::MAX)
        .expect("scheduler enqueue hook");
    let run_loop = model
        .symbols
        .lookup(builtin_ns, RUN_SCHEDULER, u32::MAX)
        .expect("scheduler run loop");

    let mut instructions = Vec::new();
    for &ns in &model.namespace_order {
        let Some(init) = model.scopes.get(ns).constructor else {
            continue;
        };
        instructions.push(InstKind::Call {
            func: init,
            args: Vec::new(),
            dst: None,
        });
    }
    for id in model.code_containers() {
        let scope = model.scopes.get(id);
        if scope.kind != ScopeKind::InitialRoutine {
            continue;
        }
        let routine = scope.func_symbol.expect("initial routine symbol");
        instructions.push(InstKind::Call {
            func: enqueue,
            args: vec![routine],
            dst: None,
        });
    }
    instructions.push(InstKind::Call {
        func: run_loop,
        args: Vec::new(),
        dst: None,
    });

    let entry_scope = model.scopes.get_mut(entry);
    entry_scope
        .instructions
        .extend(instructions.into_iter().map(crate::sema::ir::Instruction::new));
    tracing::debug!(name = %model.scopes.full_name(entry), "entry point synthesized");
    Ok(())
}
