// src/sema/symbols.rs
//
// The global symbol table. Append-only for the life of a compilation:
// shadowed re-declarations get renamed (`x` -> `x_0`, `x_1`, ...) instead of
// replacing earlier entries, and `origin_name` keeps the source spelling.

use rustc_hash::FxHashMap;

use crate::errors::{CompileResult, SemanticError};
use crate::frontend::Span;
use crate::sema::scope::ScopeId;
use crate::sema::type_registry::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone)]
pub enum SymbolKind {
    Variable {
        is_param: bool,
        readonly: bool,
    },
    Function {
        params: Vec<SymbolId>,
        return_type: TypeId,
        /// The code container compiled for this function; absent for
        /// abstract interface methods
        code: Option<ScopeId>,
        is_static: bool,
        is_native: bool,
    },
    EnumMember {
        ordinal: i64,
    },
    TypeAlias {
        target: TypeId,
    },
}

impl SymbolKind {
    pub fn is_function(&self) -> bool {
        matches!(self, SymbolKind::Function { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, SymbolKind::Variable { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SymbolData {
    /// Post-rename name, unique within the owning scope
    pub name: String,
    /// Source spelling, before shadow renaming
    pub origin_name: String,
    /// Lexical block nesting counter used to resolve shadowing
    pub scope_depth: u32,
    pub parent: ScopeId,
    pub type_info: TypeId,
    pub kind: SymbolKind,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<SymbolData>,
    by_scope: FxHashMap<ScopeId, Vec<SymbolId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SymbolId) -> &SymbolData {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut SymbolData {
        &mut self.symbols[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &SymbolData)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    /// Symbols owned by one scope, in declaration order
    pub fn in_scope(&self, scope: ScopeId) -> &[SymbolId] {
        self.by_scope.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Declare a symbol into `scope`. A same-origin symbol at the same
    /// depth is a duplicate (fatal); at a different depth the new symbol is
    /// renamed and shadows the old one.
    pub fn declare(
        &mut self,
        scope: ScopeId,
        origin_name: &str,
        scope_depth: u32,
        type_info: TypeId,
        kind: SymbolKind,
        span: Span,
    ) -> CompileResult<SymbolId> {
        let mut same_origin = 0usize;
        for &id in self.in_scope(scope) {
            let existing = self.get(id);
            if existing.origin_name == origin_name {
                if existing.scope_depth == scope_depth {
                    return Err(SemanticError::DuplicateName {
                        name: origin_name.to_string(),
                        span: span.into(),
                    }
                    .into());
                }
                same_origin += 1;
            }
        }

        let name = if same_origin == 0 {
            origin_name.to_string()
        } else {
            format!("{}_{}", origin_name, same_origin - 1)
        };
        Ok(self.insert(scope, name, origin_name.to_string(), scope_depth, type_info, kind, span))
    }

    /// Declare a compiler-generated symbol with a name that is already
    /// unique; bypasses shadow accounting.
    pub fn declare_raw(
        &mut self,
        scope: ScopeId,
        name: String,
        type_info: TypeId,
        kind: SymbolKind,
        span: Span,
    ) -> SymbolId {
        let origin = name.clone();
        self.insert(scope, name, origin, 0, type_info, kind, span)
    }

    fn insert(
        &mut self,
        scope: ScopeId,
        name: String,
        origin_name: String,
        scope_depth: u32,
        type_info: TypeId,
        kind: SymbolKind,
        span: Span,
    ) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(SymbolData {
            name,
            origin_name,
            scope_depth,
            parent: scope,
            type_info,
            kind,
            span,
        });
        self.by_scope.entry(scope).or_default().push(id);
        id
    }

    /// Find the symbol named `origin_name` in `scope`, considering only
    /// declarations at or below `depth_ceiling`; the deepest declaration
    /// wins (innermost shadowing).
    pub fn lookup(&self, scope: ScopeId, origin_name: &str, depth_ceiling: u32) -> Option<SymbolId> {
        let mut best: Option<SymbolId> = None;
        for &id in self.in_scope(scope) {
            let data = self.get(id);
            if data.origin_name == origin_name && data.scope_depth <= depth_ceiling {
                match best {
                    Some(prev) if self.get(prev).scope_depth >= data.scope_depth => {}
                    _ => best = Some(id),
                }
            }
        }
        best
    }

    /// Find by post-rename name (exact), any depth
    pub fn lookup_exact(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.in_scope(scope)
            .iter()
            .copied()
            .find(|&id| self.get(id).name == name)
    }
}
