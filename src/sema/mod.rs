// src/sema/mod.rs

pub mod builtins;
pub mod ir;
pub mod model;
pub mod passes;
pub mod scope;
pub mod symbols;
pub mod type_registry;
pub mod types;

pub use ir::{InstKind, Instruction, Label};
pub use model::{CompileOptions, SemanticModel};
pub use scope::{Scope, ScopeArena, ScopeId, ScopeKind, VTableSlot};
pub use symbols::{SymbolData, SymbolId, SymbolKind, SymbolTable};
pub use type_registry::{TypeData, TypeId, TypeRegistry};
pub use types::TypeKind;
