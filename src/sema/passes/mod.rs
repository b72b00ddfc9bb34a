// src/sema/passes/mod.rs
//
// The nine-pass pipeline. Passes run in a fixed order; every scope carries a
// monotone pass stamp, so re-processing a finished node is a no-op. Scopes
// synthesized mid-pipeline (constructors, lambda classes, generator classes,
// specialized generics) are caught up through all completed passes before
// the pipeline moves on. Sweeps snapshot the node list before iterating, so
// appends during a sweep are safe and picked up by the next round.

pub mod constructors;
pub mod entry;
pub mod interfaces;
pub mod lower;
pub mod returns;
pub mod rewrite;
pub mod scoping;
pub mod symbol_elab;
pub mod type_elab;

use crate::errors::CompileResult;
use crate::frontend::Program;
use crate::sema::model::SemanticModel;
use crate::sema::scope::ScopeId;

pub const PASS_SCOPING: u32 = 1;
pub const PASS_TYPES: u32 = 2;
pub const PASS_SYMBOLS: u32 = 3;
pub const PASS_CONSTRUCTORS: u32 = 4;
pub const PASS_INTERFACES: u32 = 5;
pub const PASS_REWRITE: u32 = 6;
pub const PASS_LOWER: u32 = 7;
pub const PASS_ENTRY: u32 = 8;
pub const PASS_RETURNS: u32 = 9;
pub const PASS_COUNT: u32 = PASS_RETURNS;

/// Run the whole pipeline over `program`
#[tracing::instrument(skip_all)]
pub fn run(model: &mut SemanticModel, program: &Program) -> CompileResult<()> {
    scoping::declare_namespaces(model, program)?;

    for pass in PASS_SCOPING..=PASS_RETURNS {
        model.current_pass = pass;
        tracing::debug!(pass, "pipeline pass");
        // Loop until stable: a sweep may synthesize scopes that still need
        // this pass.
        loop {
            let pending: Vec<ScopeId> = model
                .scopes
                .iter_dfs(model.root)
                .filter(|&id| model.scopes.get(id).pass_index < pass)
                .collect();
            if pending.is_empty() {
                break;
            }
            for id in pending {
                process(model, pass, id)?;
                drain_catchup(model)?;
            }
        }
    }
    Ok(())
}

/// Apply one pass to one scope. No-op when the scope's stamp already covers
/// the pass; the stamp never decreases.
pub fn process(model: &mut SemanticModel, pass: u32, scope: ScopeId) -> CompileResult<()> {
    if model.scopes.get(scope).pass_index >= pass {
        return Ok(());
    }
    match pass {
        PASS_SCOPING => scoping::process_scope(model, scope)?,
        PASS_TYPES => type_elab::process_scope(model, scope)?,
        PASS_SYMBOLS => symbol_elab::process_scope(model, scope)?,
        PASS_CONSTRUCTORS => constructors::process_scope(model, scope)?,
        PASS_INTERFACES => interfaces::process_scope(model, scope)?,
        PASS_REWRITE => rewrite::process_scope(model, scope)?,
        PASS_LOWER => lower::process_scope(model, scope)?,
        PASS_ENTRY => {
            if scope == model.root {
                entry::synthesize(model)?;
            }
        }
        PASS_RETURNS => returns::process_scope(model, scope)?,
        _ => {}
    }
    let stamp = &mut model.scopes.get_mut(scope).pass_index;
    *stamp = (*stamp).max(pass);
    Ok(())
}

/// Replay all passes up to and including `through` on `scope` and every
/// scope below it.
pub fn catch_up(model: &mut SemanticModel, scope: ScopeId, through: u32) -> CompileResult<()> {
    loop {
        let pending: Vec<ScopeId> = model
            .scopes
            .iter_dfs(scope)
            .filter(|&id| model.scopes.get(id).pass_index < through)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        for id in pending {
            let from = model.scopes.get(id).pass_index + 1;
            for pass in from..=through {
                process(model, pass, id)?;
            }
        }
    }
}

/// Catch up scopes queued by generic specialization. Resolution sites that
/// can specialize call this before they query the new container.
pub fn drain_catchup(model: &mut SemanticModel) -> CompileResult<()> {
    while let Some(scope) = model.pending_catchup.pop() {
        let through = model.current_pass.saturating_sub(1).max(PASS_SYMBOLS);
        catch_up(model, scope, through)?;
    }
    Ok(())
}
