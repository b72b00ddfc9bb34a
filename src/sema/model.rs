// src/sema/model.rs
//
// The semantic model: every registry of one compilation session, plus the
// name-resolution engine over them. All state is owned here; two models
// never share anything, so independent compilations can run side by side.

use rustc_hash::FxHashMap;

use crate::errors::{CompileResult, Reporter, SemanticError, UnsupportedError};
use crate::frontend::{Interner, Span, Symbol, TypeExpr};
use crate::sema::ir;
use crate::sema::scope::{ScopeArena, ScopeId, ScopeKind};
use crate::sema::symbols::{SymbolId, SymbolKind, SymbolTable};
use crate::sema::type_registry::{TypeId, TypeIdVec, TypeRegistry};
use crate::sema::types::TypeKind;

/// Namespace searched implicitly after all explicit imports
pub const BUILTIN_NAMESPACE: &str = "__builtin";

/// Default name of the synthesized process entry point
pub const DEFAULT_ENTRY_SYMBOL: &str = "__penguin_main";

/// Names of the scheduler hooks the entry pass targets
pub const ENQUEUE_JOB: &str = "__enqueue_job";
pub const RUN_SCHEDULER: &str = "__run_scheduler";

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub entry_symbol: String,
    /// Render every code container's instruction table after compilation
    pub dump_instructions: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            entry_symbol: DEFAULT_ENTRY_SYMBOL.to_string(),
            dump_instructions: false,
        }
    }
}

#[derive(Debug)]
pub struct SemanticModel {
    pub interner: Interner,
    pub types: TypeRegistry,
    pub scopes: ScopeArena,
    pub symbols: SymbolTable,
    pub reporter: Reporter,
    pub options: CompileOptions,
    /// Unnamed root of the scope tree
    pub root: ScopeId,
    /// Namespace full name -> scope
    pub namespaces: FxHashMap<String, ScopeId>,
    /// Namespace scopes in declaration order, for deterministic sweeps
    pub namespace_order: Vec<ScopeId>,
    pub classes: Vec<ScopeId>,
    pub enums: Vec<ScopeId>,
    pub interfaces: Vec<ScopeId>,
    /// Pass currently sweeping; scopes synthesized now are caught up through
    /// `current_pass - 1` before the sweep continues
    pub current_pass: u32,
    /// Scopes created mid-pass, waiting for catch-up
    pub pending_catchup: Vec<ScopeId>,
    next_synth: u32,
}

impl SemanticModel {
    pub fn new(interner: Interner, options: CompileOptions) -> Self {
        let mut scopes = ScopeArena::new();
        let root = scopes.alloc(ScopeKind::Namespace, "", None, Span::synthesized());
        Self {
            interner,
            types: TypeRegistry::new(),
            scopes,
            symbols: SymbolTable::new(),
            reporter: Reporter::new(),
            options,
            root,
            namespaces: FxHashMap::default(),
            namespace_order: Vec::new(),
            classes: Vec::new(),
            enums: Vec::new(),
            interfaces: Vec::new(),
            current_pass: 0,
            pending_catchup: Vec::new(),
            next_synth: 0,
        }
    }

    pub fn name_of(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    /// Fresh numbered name for synthesized constructs (lambda classes,
    /// generator classes, initial routines)
    pub fn synth_name(&mut self, prefix: &str) -> String {
        let n = self.next_synth;
        self.next_synth += 1;
        format!("{prefix}_{n}")
    }

    // ========================================================================
    // Query surface
    // ========================================================================

    pub fn namespace(&self, full_name: &str) -> Option<ScopeId> {
        self.namespaces.get(full_name).copied()
    }

    pub fn code_containers(&self) -> Vec<ScopeId> {
        self.scopes
            .iter_dfs(self.root)
            .filter(|&id| self.scopes.get(id).kind.is_code_container())
            .collect()
    }

    /// Symbol lookup by namespace-qualified full name, e.g. `app.main`
    pub fn symbol_by_full_name(&self, full_name: &str) -> Option<SymbolId> {
        let (prefix, simple) = full_name.rsplit_once('.')?;
        let scope = self
            .namespaces
            .get(prefix)
            .copied()
            .or_else(|| self.type_scope_by_full_name(prefix))?;
        self.symbols.lookup(scope, simple, u32::MAX)
    }

    pub fn type_scope_by_full_name(&self, full_name: &str) -> Option<ScopeId> {
        self.types
            .by_full_name(full_name)
            .and_then(|t| self.types.get(t).scope)
    }

    pub fn symbol_full_name(&self, id: SymbolId) -> String {
        let data = self.symbols.get(id);
        let owner = self.scopes.full_name(data.parent);
        if owner.is_empty() {
            data.name.clone()
        } else {
            format!("{owner}.{}", data.name)
        }
    }

    /// Render all instruction tables, one block per code container
    pub fn dump_instruction_tables(&self) -> String {
        let mut out = String::new();
        for id in self.code_containers() {
            let scope = self.scopes.get(id);
            if scope.instructions.is_empty() {
                continue;
            }
            out.push_str(&format!("== {} ==\n", self.scopes.full_name(id)));
            out.push_str(&ir::dump_table(&scope.instructions, &self.symbols, &self.types));
            out.push('\n');
        }
        out
    }

    // ========================================================================
    // Symbol declaration helpers
    // ========================================================================

    pub fn declare_symbol(
        &mut self,
        scope: ScopeId,
        origin_name: &str,
        scope_depth: u32,
        type_info: TypeId,
        kind: SymbolKind,
        span: Span,
    ) -> CompileResult<SymbolId> {
        self.symbols
            .declare(scope, origin_name, scope_depth, type_info, kind, span)
    }

    /// Allocate a fresh temporary in a code container
    pub fn alloc_temp(&mut self, container: ScopeId, type_info: TypeId, span: Span) -> SymbolId {
        let n = self.scopes.get(container).next_temp;
        self.scopes.get_mut(container).next_temp = n + 1;
        self.symbols.declare_raw(
            container,
            format!("__temp_{n}"),
            type_info,
            SymbolKind::Variable {
                is_param: false,
                readonly: false,
            },
            span,
        )
    }

    pub fn alloc_label(&mut self, container: ScopeId) -> ir::Label {
        let n = self.scopes.get(container).next_label;
        self.scopes.get_mut(container).next_label = n + 1;
        ir::Label(n)
    }

    // ========================================================================
    // Type resolution
    // ========================================================================

    /// Resolve a type expression from `scope`. Returns Ok(None) when no
    /// resolution step matches; the caller decides whether that is fatal.
    pub fn resolve_type_expr(
        &mut self,
        ty: &TypeExpr,
        scope: ScopeId,
        span: Span,
    ) -> CompileResult<Option<TypeId>> {
        match ty {
            TypeExpr::SelfType => Ok(self
                .scopes
                .enclosing_type_scope(scope)
                .and_then(|s| self.scopes.get(s).type_id)),
            TypeExpr::Fun {
                is_async,
                return_type,
                params,
            } => {
                let Some(ret) = self.resolve_type_expr(return_type, scope, span)? else {
                    return Ok(None);
                };
                let mut param_ids = TypeIdVec::new();
                for p in params {
                    let Some(id) = self.resolve_type_expr(p, scope, span)? else {
                        return Ok(None);
                    };
                    param_ids.push(id);
                }
                Ok(Some(self.types.intern_function(param_ids, ret, *is_async)))
            }
            TypeExpr::Named { path, args, open } => {
                self.resolve_named_type(path, args, *open, scope, span)
            }
        }
    }

    /// Like `resolve_type_expr` but an unresolved name is an error, and an
    /// open generic in a position that needs a concrete type is an internal
    /// limitation fault.
    pub fn resolve_type_required(
        &mut self,
        ty: &TypeExpr,
        scope: ScopeId,
        span: Span,
    ) -> CompileResult<TypeId> {
        match self.resolve_type_expr(ty, scope, span)? {
            Some(id) => {
                if self.types.get(id).is_open_generic() {
                    return Err(UnsupportedError::OpenGenericUse {
                        name: self.types.full_name(id).to_string(),
                        span: span.into(),
                    }
                    .into());
                }
                Ok(id)
            }
            None => Err(SemanticError::UnknownType {
                name: self.describe_type_expr(ty),
                span: span.into(),
            }
            .into()),
        }
    }

    fn describe_type_expr(&self, ty: &TypeExpr) -> String {
        match ty {
            TypeExpr::SelfType => "Self".to_string(),
            TypeExpr::Fun { is_async, .. } => {
                if *is_async { "async_fun<...>" } else { "fun<...>" }.to_string()
            }
            TypeExpr::Named { path, .. } => path
                .iter()
                .map(|s| self.name_of(*s).to_string())
                .collect::<Vec<_>>()
                .join("."),
        }
    }

    fn resolve_named_type(
        &mut self,
        path: &[Symbol],
        args: &[TypeExpr],
        open: bool,
        scope: ScopeId,
        span: Span,
    ) -> CompileResult<Option<TypeId>> {
        let simple = self.name_of(*path.last().expect("empty type path")).to_string();

        let base = if path.len() == 1 {
            self.resolve_simple_type_name(&simple, scope)
        } else {
            let prefix: Vec<String> = path[..path.len() - 1]
                .iter()
                .map(|s| self.name_of(*s).to_string())
                .collect();
            self.resolve_qualified_type_name(&prefix.join("."), &simple, scope)
        };
        let Some(base) = base else { return Ok(None) };

        if open || args.is_empty() {
            // A bare `<?>` (or a bare generic name) yields the open base.
            return Ok(Some(base));
        }

        let mut arg_ids = Vec::with_capacity(args.len());
        for arg in args {
            match self.resolve_type_expr(arg, scope, span)? {
                Some(id) => arg_ids.push(id),
                None => return Ok(None),
            }
        }
        let specialized = self.resolve_or_create_specialized_type(base, &arg_ids, span)?;
        Ok(Some(specialized))
    }

    /// Resolution order for a simple name: builtin, `Self` is handled by the
    /// caller, generic binding of an enclosing specialized container, type
    /// alias, enclosing namespaces innermost-first, imports in declaration
    /// order, builtin namespace.
    fn resolve_simple_type_name(&mut self, name: &str, scope: ScopeId) -> Option<TypeId> {
        if let Some(builtin) = self.types.builtin_by_name(name) {
            return Some(builtin);
        }

        if let Some(bound) = self.scopes.find_ancestor_including_self(scope, |s| {
            s.generic_binding(name).is_some()
        }) {
            return self.scopes.get(bound).generic_binding(name);
        }

        if let Some(alias) = self.resolve_short_symbol(name, scope, u32::MAX)
            && let SymbolKind::TypeAlias { target } = self.symbols.get(alias).kind
        {
            return Some(target);
        }

        let mut cursor = Some(scope);
        while let Some(current) = cursor {
            let s = self.scopes.get(current);
            if s.kind == ScopeKind::Namespace
                && let Some(found) = self.find_type_in_namespace(current, name)
            {
                return Some(found);
            }
            cursor = s.parent;
        }

        for ns_name in self.scopes.imported_namespaces(scope, true) {
            if let Some(ns) = self.namespaces.get(&ns_name).copied()
                && let Some(found) = self.find_type_in_namespace(ns, name)
            {
                return Some(found);
            }
        }
        None
    }

    fn resolve_qualified_type_name(
        &mut self,
        prefix: &str,
        simple: &str,
        scope: ScopeId,
    ) -> Option<TypeId> {
        // Absolute namespace path first, then relative to each enclosing
        // namespace, then relative to imports.
        let mut candidates: Vec<String> = vec![prefix.to_string()];
        let mut cursor = Some(scope);
        while let Some(current) = cursor {
            let s = self.scopes.get(current);
            if s.kind == ScopeKind::Namespace && !s.name.is_empty() {
                candidates.push(format!("{}.{}", self.scopes.full_name(current), prefix));
            }
            cursor = s.parent;
        }
        for import in self.scopes.imported_namespaces(scope, true) {
            candidates.push(format!("{import}.{prefix}"));
        }

        for candidate in candidates {
            if let Some(ns) = self.namespaces.get(&candidate).copied()
                && let Some(found) = self.find_type_in_namespace(ns, simple)
            {
                return Some(found);
            }
        }
        None
    }

    fn find_type_in_namespace(&self, ns: ScopeId, name: &str) -> Option<TypeId> {
        for &child in &self.scopes.get(ns).children {
            let scope = self.scopes.get(child);
            if scope.kind.is_type_scope() && scope.name == name {
                return scope.type_id;
            }
        }
        // A type alias declared at namespace level also resolves
        if let Some(alias) = self.symbols.lookup(ns, name, u32::MAX)
            && let SymbolKind::TypeAlias { target } = self.symbols.get(alias).kind
        {
            return Some(target);
        }
        None
    }

    // ========================================================================
    // Symbol resolution
    // ========================================================================

    /// Qualified resolution: `path` is `a.b.c` split into segments. The
    /// prefix resolves as a namespace or type first, then the simple name
    /// is looked up inside it.
    pub fn resolve_symbol(
        &self,
        path: &[&str],
        scope: ScopeId,
        depth_ceiling: u32,
    ) -> Option<SymbolId> {
        match path {
            [] => None,
            [simple] => self.resolve_short_symbol(simple, scope, depth_ceiling),
            [prefix @ .., simple] => {
                let prefix_name = prefix.join(".");
                let container = self
                    .namespaces
                    .get(&prefix_name)
                    .copied()
                    .or_else(|| self.type_scope_by_full_name(&prefix_name))
                    .or_else(|| {
                        // Relative namespace or type visible from here
                        let mut cursor = Some(scope);
                        while let Some(current) = cursor {
                            let s = self.scopes.get(current);
                            if s.kind == ScopeKind::Namespace {
                                let full = self.scopes.full_name(current);
                                let qualified = if full.is_empty() {
                                    prefix_name.clone()
                                } else {
                                    format!("{full}.{prefix_name}")
                                };
                                if let Some(&ns) = self.namespaces.get(&qualified) {
                                    return Some(ns);
                                }
                                if let Some(t) = self.type_scope_by_full_name(&qualified) {
                                    return Some(t);
                                }
                            }
                            cursor = s.parent;
                        }
                        None
                    })?;
                self.symbols.lookup(container, simple, u32::MAX)
            }
        }
    }

    /// Unqualified resolution: own symbols (depth-filtered, deepest wins),
    /// then the lexical parent chain, then imported namespaces in
    /// declaration order with the builtin namespace last. A local shadows a
    /// same-named import, which shadows a same-named builtin.
    pub fn resolve_short_symbol(
        &self,
        name: &str,
        scope: ScopeId,
        depth_ceiling: u32,
    ) -> Option<SymbolId> {
        if let Some(found) = self.symbols.lookup(scope, name, depth_ceiling) {
            return Some(found);
        }

        let mut cursor = self.scopes.get(scope).parent;
        while let Some(current) = cursor {
            // Parent scopes contribute their top-level symbols only; block
            // locals of an enclosing body stay invisible.
            if let Some(found) = self.symbols.lookup(current, name, 0) {
                return Some(found);
            }
            cursor = self.scopes.get(current).parent;
        }

        for ns_name in self.scopes.imported_namespaces(scope, true) {
            if let Some(&ns) = self.namespaces.get(&ns_name)
                && let Some(found) = self.symbols.lookup(ns, name, 0)
            {
                return Some(found);
            }
        }
        None
    }

    // ========================================================================
    // Generic specialization
    // ========================================================================

    /// Specialize the type `base` with `args`, materializing the specialized
    /// Class/Enum/Interface scope if the type is new. The scope clone is
    /// queued for pass catch-up; a just-specialized container is queryable
    /// immediately after its catch-up runs.
    pub fn resolve_or_create_specialized_type(
        &mut self,
        base: TypeId,
        args: &[TypeId],
        span: Span,
    ) -> CompileResult<TypeId> {
        // An already-specialized type is not generic-pending; hand it back.
        if self.types.get(base).is_specialized() {
            return Ok(base);
        }
        let specialized = self.types.specialize(base, args, span)?;
        if self.types.get(specialized).scope.is_some() {
            return Ok(specialized);
        }
        if let Some(base_scope) = self.types.get(base).scope {
            self.materialize_specialized_scope(base_scope, specialized, span)?;
        }
        Ok(specialized)
    }

    /// Scope-level entry point: specialize the container's type and return
    /// the specialized scope.
    pub fn resolve_or_create_specialized_scope(
        &mut self,
        base_scope: ScopeId,
        args: &[TypeId],
        span: Span,
    ) -> CompileResult<ScopeId> {
        let base_type = self
            .scopes
            .get(base_scope)
            .type_id
            .expect("type scope without a type");
        if self.types.get(base_type).is_specialized() {
            return Ok(base_scope);
        }
        let specialized = self.resolve_or_create_specialized_type(base_type, args, span)?;
        Ok(self.types.get(specialized).scope.expect("specialized scope"))
    }

    fn materialize_specialized_scope(
        &mut self,
        base_scope: ScopeId,
        specialized: TypeId,
        span: Span,
    ) -> CompileResult<ScopeId> {
        let data = self.types.get(specialized);
        let name = {
            let mut n = data.name.clone();
            n.push('<');
            for (i, arg) in data.generic_args.iter().enumerate() {
                if i > 0 {
                    n.push(',');
                }
                n.push_str(self.types.full_name(*arg));
            }
            n.push('>');
            n
        };
        let bindings: Vec<(String, TypeId)> = data
            .generic_defs
            .iter()
            .cloned()
            .zip(data.generic_args.iter().copied())
            .collect();

        let clone = self.scopes.alloc_specialization(base_scope, name, span);
        {
            let base = self.scopes.get(base_scope);
            let class_syntax = base.class_syntax.clone();
            let enum_syntax = base.enum_syntax.clone();
            let interface_syntax = base.interface_syntax.clone();
            let kind = base.kind;
            let scope = self.scopes.get_mut(clone);
            scope.type_id = Some(specialized);
            scope.generic_bindings = bindings;
            scope.class_syntax = class_syntax;
            scope.enum_syntax = enum_syntax;
            scope.interface_syntax = interface_syntax;
            match kind {
                ScopeKind::Class => self.classes.push(clone),
                ScopeKind::Enum => self.enums.push(clone),
                ScopeKind::Interface => self.interfaces.push(clone),
                _ => {}
            }
        }
        self.types.get_mut(specialized).scope = Some(clone);
        self.pending_catchup.push(clone);
        tracing::debug!(
            scope = %self.scopes.full_name(clone),
            "materialized specialized container"
        );
        Ok(clone)
    }

    // ========================================================================
    // Assignability
    // ========================================================================

    /// Implicit-cast check plus interface awareness: a class or enum value
    /// may stand where one of its implemented interfaces is expected.
    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        if self.types.can_implicitly_cast(from, to) {
            return true;
        }
        if self.types.kind(to) == TypeKind::Interface {
            return self.implements_interface(from, to);
        }
        false
    }

    pub fn implements_interface(&self, ty: TypeId, interface: TypeId) -> bool {
        let Some(scope) = self.types.get(ty).scope else {
            return false;
        };
        self.scopes.get(scope).children.iter().any(|&child| {
            let c = self.scopes.get(child);
            c.kind == ScopeKind::VTable && c.vtable.interface == Some(interface)
        })
    }

    /// Find a member of `ty` by origin name: own symbols first, then
    /// implementation methods living under the type's vtables, then the
    /// implemented interfaces' own declarations (dispatched through the
    /// vtable at run time).
    pub fn find_member(&self, ty: TypeId, name: &str) -> Option<SymbolId> {
        let scope = self.types.get(ty).scope?;
        if let Some(found) = self.symbols.lookup(scope, name, u32::MAX) {
            return Some(found);
        }
        for &child in &self.scopes.get(scope).children {
            let c = self.scopes.get(child);
            if c.kind != ScopeKind::VTable {
                continue;
            }
            if let Some(found) = self.symbols.lookup(child, name, u32::MAX) {
                return Some(found);
            }
            if let Some(iface) = c.vtable.interface
                && let Some(iface_scope) = self.types.get(iface).scope
                && let Some(found) = self.symbols.lookup(iface_scope, name, u32::MAX)
            {
                return Some(found);
            }
        }
        None
    }

    /// The vtable scope pairing `ty` with `interface`, if one was built
    pub fn vtable_for(&self, ty: TypeId, interface: TypeId) -> Option<ScopeId> {
        let scope = self.types.get(ty).scope?;
        self.scopes.get(scope).children.iter().copied().find(|&child| {
            let c = self.scopes.get(child);
            c.kind == ScopeKind::VTable && c.vtable.interface == Some(interface)
        })
    }
}
