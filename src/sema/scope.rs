// src/sema/scope.rs
//
// The semantic scope tree. Scopes live in an arena and reference each other
// by ScopeId, so cyclic shapes (interfaces extending interfaces that mention
// the original type) never create ownership cycles. Traversals are pure
// reads; tree structure only changes through the arena.

use std::rc::Rc;

use crate::frontend::{Block, ClassDecl, EnumDecl, FuncDecl, InterfaceDecl, NamespaceDecl, Span};
use crate::sema::ir::Instruction;
use crate::sema::symbols::SymbolId;
use crate::sema::type_registry::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Namespace,
    Class,
    Enum,
    Interface,
    Function,
    InitialRoutine,
    VTable,
}

impl ScopeKind {
    /// Scopes that own symbols. Every kind qualifies; vtables hold the
    /// symbols of their implementation methods.
    pub fn is_symbol_container(self) -> bool {
        true
    }

    /// Scopes that own executable code and compile to instructions
    pub fn is_code_container(self) -> bool {
        matches!(self, ScopeKind::Function | ScopeKind::InitialRoutine)
    }

    /// Scopes that describe a type
    pub fn is_type_scope(self) -> bool {
        matches!(self, ScopeKind::Class | ScopeKind::Enum | ScopeKind::Interface)
    }

    /// Contexts in which a first parameter named `this` makes a function an
    /// instance method
    pub fn allows_instance_methods(self) -> bool {
        matches!(
            self,
            ScopeKind::Class | ScopeKind::Enum | ScopeKind::Interface | ScopeKind::VTable
        )
    }
}

/// Tri-state memo for async inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsyncState {
    #[default]
    Unknown,
    No,
    Yes,
}

/// One resolved vtable slot. A default slot dispatches to the interface
/// method's own body.
#[derive(Debug, Clone, Copy)]
pub enum VTableSlot {
    UserImpl {
        interface_method: SymbolId,
        implementation: SymbolId,
    },
    InterfaceDefault {
        interface_method: SymbolId,
    },
}

impl VTableSlot {
    pub fn interface_method(self) -> SymbolId {
        match self {
            VTableSlot::UserImpl {
                interface_method, ..
            }
            | VTableSlot::InterfaceDefault { interface_method } => interface_method,
        }
    }
}

/// Vtable payload of a VTable scope: one implementing type paired with one
/// implemented interface.
#[derive(Debug, Clone, Default)]
pub struct VTableData {
    pub interface: Option<TypeId>,
    pub slots: Vec<VTableSlot>,
}

/// A node in the scope tree. Capabilities (symbol container, code
/// container, type scope) are keyed off `kind`; unrelated fields stay at
/// their defaults.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Imported namespace full names, in declaration order
    pub imports: Vec<String>,
    /// Highest pipeline pass that has processed this node; never decreases
    pub pass_index: u32,
    pub span: Span,

    /// Type scopes: the type this scope defines
    pub type_id: Option<TypeId>,
    /// Specialized containers: formal parameter name -> bound argument
    pub generic_bindings: Vec<(String, TypeId)>,
    /// Open generic containers: scopes of the specialized clones, traversed
    /// by DFS as if they were children
    pub specializations: Vec<ScopeId>,

    // Original syntax, kept for elaboration and specialization cloning
    pub class_syntax: Option<Rc<ClassDecl>>,
    pub enum_syntax: Option<Rc<EnumDecl>>,
    pub interface_syntax: Option<Rc<InterfaceDecl>>,
    pub func_syntax: Option<Rc<FuncDecl>>,
    /// Namespace declarations merged into this namespace, across files
    pub ns_syntax: Vec<Rc<NamespaceDecl>>,

    // Code container state
    /// Body to compile; the rewrite pass may replace it wholesale
    pub body: Option<Block>,
    pub instructions: Vec<Instruction>,
    pub return_type: Option<TypeId>,
    pub func_symbol: Option<SymbolId>,
    /// Class and namespace scopes: the constructor picked or synthesized
    /// for this container
    pub constructor: Option<SymbolId>,
    pub is_static: bool,
    pub is_native: bool,
    pub is_generator: bool,
    pub async_state: AsyncState,
    pub next_temp: u32,
    pub next_label: u32,

    /// VTable scopes only
    pub vtable: VTableData,
}

impl Scope {
    fn new(kind: ScopeKind, name: String, parent: Option<ScopeId>, span: Span) -> Self {
        Scope {
            kind,
            name,
            parent,
            children: Vec::new(),
            imports: Vec::new(),
            pass_index: 0,
            span,
            type_id: None,
            generic_bindings: Vec::new(),
            specializations: Vec::new(),
            class_syntax: None,
            enum_syntax: None,
            interface_syntax: None,
            func_syntax: None,
            ns_syntax: Vec::new(),
            body: None,
            instructions: Vec::new(),
            return_type: None,
            func_symbol: None,
            constructor: None,
            is_static: false,
            is_native: false,
            is_generator: false,
            async_state: AsyncState::Unknown,
            next_temp: 0,
            next_label: 0,
            vtable: VTableData::default(),
        }
    }

    pub fn generic_binding(&self, name: &str) -> Option<TypeId> {
        self.generic_bindings
            .iter()
            .find(|(formal, _)| formal == name)
            .map(|&(_, ty)| ty)
    }
}

#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Allocate a scope and link it under `parent`
    pub fn alloc(
        &mut self,
        kind: ScopeKind,
        name: impl Into<String>,
        parent: Option<ScopeId>,
        span: Span,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, name.into(), parent, span));
        if let Some(parent) = parent {
            self.get_mut(parent).children.push(id);
        }
        id
    }

    /// Allocate a specialized clone of a generic container. The clone hangs
    /// off the base's specialization list, not the parent's children, so
    /// ordinary child iteration sees each scope once and
    /// `iter_dfs` reaches the clones through the base.
    pub fn alloc_specialization(
        &mut self,
        base: ScopeId,
        name: impl Into<String>,
        span: Span,
    ) -> ScopeId {
        let parent = self.get(base).parent;
        let kind = self.get(base).kind;
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, name.into(), parent, span));
        self.get_mut(base).specializations.push(id);
        id
    }

    /// Dot-joined ancestor names, innermost last; unnamed scopes (the root)
    /// contribute nothing.
    pub fn full_name(&self, id: ScopeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let scope = self.get(current);
            if !scope.name.is_empty() {
                parts.push(scope.name.as_str());
            }
            cursor = scope.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    pub fn find_ancestor_including_self(
        &self,
        id: ScopeId,
        mut predicate: impl FnMut(&Scope) -> bool,
    ) -> Option<ScopeId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let scope = self.get(current);
            if predicate(scope) {
                return Some(current);
            }
            cursor = scope.parent;
        }
        None
    }

    /// Nearest enclosing type scope (Class/Enum/Interface), if any
    pub fn enclosing_type_scope(&self, id: ScopeId) -> Option<ScopeId> {
        self.find_ancestor_including_self(id, |s| s.kind.is_type_scope())
    }

    /// Depth-first search over `id` and its descendants, first match wins
    pub fn find_child_including_self(
        &self,
        id: ScopeId,
        mut predicate: impl FnMut(&Scope) -> bool,
    ) -> Option<ScopeId> {
        self.iter_dfs(id).find(|&s| predicate(self.get(s)))
    }

    /// Lazy depth-first walk of `id` and everything below it. Specialized
    /// generic clones are traversed as if they were children of their base,
    /// which is what lets later passes revisit them.
    pub fn iter_dfs(&self, id: ScopeId) -> DfsIter<'_> {
        DfsIter {
            arena: self,
            stack: vec![id],
        }
    }

    /// Own imports plus every ancestor's, deduplicated in declaration
    /// order; the implicit builtin namespace comes last unless suppressed.
    pub fn imported_namespaces(&self, id: ScopeId, include_builtin: bool) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let scope = self.get(current);
            for import in &scope.imports {
                if !out.contains(import) {
                    out.push(import.clone());
                }
            }
            cursor = scope.parent;
        }
        if include_builtin {
            let builtin = crate::sema::model::BUILTIN_NAMESPACE.to_string();
            if !out.contains(&builtin) {
                out.push(builtin);
            }
        }
        out
    }
}

pub struct DfsIter<'a> {
    arena: &'a ScopeArena,
    stack: Vec<ScopeId>,
}

impl Iterator for DfsIter<'_> {
    type Item = ScopeId;

    fn next(&mut self) -> Option<ScopeId> {
        let id = self.stack.pop()?;
        let scope = self.arena.get(id);
        // Reverse so iteration visits children in declaration order
        for &child in scope.children.iter().rev() {
            self.stack.push(child);
        }
        for &spec in scope.specializations.iter().rev() {
            self.stack.push(spec);
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with_tree() -> (ScopeArena, ScopeId, ScopeId, ScopeId) {
        let mut arena = ScopeArena::new();
        let root = arena.alloc(ScopeKind::Namespace, "", None, Span::synthesized());
        let ns = arena.alloc(ScopeKind::Namespace, "app", Some(root), Span::synthesized());
        let class = arena.alloc(ScopeKind::Class, "Widget", Some(ns), Span::synthesized());
        (arena, root, ns, class)
    }

    #[test]
    fn full_name_joins_ancestors() {
        let (arena, root, ns, class) = arena_with_tree();
        assert_eq!(arena.full_name(root), "");
        assert_eq!(arena.full_name(ns), "app");
        assert_eq!(arena.full_name(class), "app.Widget");
    }

    #[test]
    fn ancestor_search_walks_upward() {
        let (mut arena, _root, _ns, class) = arena_with_tree();
        let method = arena.alloc(ScopeKind::Function, "draw", Some(class), Span::synthesized());
        let found = arena.find_ancestor_including_self(method, |s| s.kind == ScopeKind::Namespace);
        assert_eq!(found.map(|s| arena.full_name(s)), Some("app".to_string()));
        assert_eq!(arena.enclosing_type_scope(method), Some(class));
    }

    #[test]
    fn child_search_is_depth_first() {
        let (mut arena, root, _ns, class) = arena_with_tree();
        let method = arena.alloc(ScopeKind::Function, "draw", Some(class), Span::synthesized());
        let found = arena.find_child_including_self(root, |s| s.kind == ScopeKind::Function);
        assert_eq!(found, Some(method));
        assert_eq!(
            arena.find_child_including_self(root, |s| s.name == "missing"),
            None
        );
    }

    #[test]
    fn dfs_visits_specializations() {
        let (mut arena, root, _ns, class) = arena_with_tree();
        let spec = arena.alloc_specialization(class, "Widget<i32>", Span::synthesized());
        let visited: Vec<ScopeId> = arena.iter_dfs(root).collect();
        assert!(visited.contains(&spec));
        // The clone is not an ordinary child of the namespace
        let ns = arena.get(class).parent.unwrap();
        assert!(!arena.get(ns).children.contains(&spec));
    }

    #[test]
    fn imports_are_inherited_and_deduplicated() {
        let (mut arena, _root, ns, class) = arena_with_tree();
        arena.get_mut(ns).imports.push("util".to_string());
        arena.get_mut(class).imports.push("util".to_string());
        arena.get_mut(class).imports.push("gfx".to_string());

        let imports = arena.imported_namespaces(class, false);
        assert_eq!(imports, vec!["util".to_string(), "gfx".to_string()]);

        let with_builtin = arena.imported_namespaces(class, true);
        assert_eq!(with_builtin.last().unwrap(), crate::sema::model::BUILTIN_NAMESPACE);
    }
}
