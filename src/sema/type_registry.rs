// src/sema/type_registry.rs
//
// Interned type storage using TypeId handles.
//
// Two types are equal iff their full names are equal; the registry
// deduplicates on full name, so TypeId equality coincides with type
// equality. Builtin primitives occupy reserved indices interned at
// construction, which makes them process-wide singletons within one
// compilation session.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::errors::{CompileResult, SemanticError};
use crate::frontend::Span;
use crate::sema::scope::ScopeId;
use crate::sema::types::TypeKind;

/// Handle to an interned type. Copy, trivial Eq/Hash.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TypeId(u32);

impl TypeId {
    // Reserved TypeIds, guaranteed interned at these indices by
    // TypeRegistry::new().
    pub const VOID: TypeId = TypeId(0);
    pub const I8: TypeId = TypeId(1);
    pub const I16: TypeId = TypeId(2);
    pub const I32: TypeId = TypeId(3);
    pub const I64: TypeId = TypeId(4);
    pub const U8: TypeId = TypeId(5);
    pub const U16: TypeId = TypeId(6);
    pub const U32: TypeId = TypeId(7);
    pub const U64: TypeId = TypeId(8);
    pub const FLOAT: TypeId = TypeId(9);
    pub const DOUBLE: TypeId = TypeId(10);
    pub const STRING: TypeId = TypeId(11);
    pub const BOOL: TypeId = TypeId(12);
    pub const CHAR: TypeId = TypeId(13);

    /// First non-reserved index
    pub const FIRST_DYNAMIC: u32 = 14;

    pub fn index(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_DYNAMIC
    }

    #[inline]
    pub fn is_void(self) -> bool {
        self == Self::VOID
    }
}

/// SmallVec for generic arguments and function parameters; most lists are
/// short.
pub type TypeIdVec = SmallVec<[TypeId; 4]>;

const BUILTIN_KINDS: [TypeKind; TypeId::FIRST_DYNAMIC as usize] = [
    TypeKind::Void,
    TypeKind::I8,
    TypeKind::I16,
    TypeKind::I32,
    TypeKind::I64,
    TypeKind::U8,
    TypeKind::U16,
    TypeKind::U32,
    TypeKind::U64,
    TypeKind::Float,
    TypeKind::Double,
    TypeKind::String,
    TypeKind::Bool,
    TypeKind::Char,
];

/// One interned type. Identity is (name, namespace, kind, generic
/// definitions, generic arguments), all of which fold into `full_name`.
#[derive(Debug, Clone)]
pub struct TypeData {
    /// Simple name; for specialized generics this carries the `<...>` suffix
    pub name: String,
    /// Full name of the enclosing namespace ("" for builtins)
    pub namespace: String,
    pub kind: TypeKind,
    /// Formal generic parameter names (empty for non-generic types)
    pub generic_defs: Vec<String>,
    /// Bound generic arguments (empty while un-specialized)
    pub generic_args: TypeIdVec,
    /// For a specialized type, the open generic it was built from
    pub generic_base: Option<TypeId>,
    /// Cache of specializations made from this open generic
    pub generic_instances: Vec<TypeId>,
    /// The Class/Enum/Interface scope this type describes, once materialized
    pub scope: Option<ScopeId>,
    /// Function types only: parameter types and return type
    pub fn_params: TypeIdVec,
    pub fn_return: Option<TypeId>,
    pub fn_is_async: bool,
    /// Derived, namespace-qualified name; computed once at intern time
    pub full_name: String,
}

impl TypeData {
    fn builtin(kind: TypeKind) -> Self {
        TypeData {
            name: kind.name().to_string(),
            namespace: String::new(),
            kind,
            generic_defs: Vec::new(),
            generic_args: TypeIdVec::new(),
            generic_base: None,
            generic_instances: Vec::new(),
            scope: None,
            fn_params: TypeIdVec::new(),
            fn_return: None,
            fn_is_async: false,
            full_name: kind.name().to_string(),
        }
    }

    pub fn nominal(kind: TypeKind, name: &str, namespace: &str, generic_defs: Vec<String>) -> Self {
        TypeData {
            name: name.to_string(),
            namespace: namespace.to_string(),
            kind,
            generic_defs,
            generic_args: TypeIdVec::new(),
            generic_base: None,
            generic_instances: Vec::new(),
            scope: None,
            fn_params: TypeIdVec::new(),
            fn_return: None,
            fn_is_async: false,
            full_name: String::new(),
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_defs.is_empty()
    }

    pub fn is_specialized(&self) -> bool {
        !self.generic_args.is_empty()
    }

    /// Generic definition present but no arguments bound yet
    pub fn is_open_generic(&self) -> bool {
        self.is_generic() && !self.is_specialized()
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<TypeData>,
    by_full_name: HashMap<String, TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::with_capacity(TypeId::FIRST_DYNAMIC as usize),
            by_full_name: HashMap::new(),
        };
        for kind in BUILTIN_KINDS {
            let id = TypeId(registry.types.len() as u32);
            let data = TypeData::builtin(kind);
            registry.by_full_name.insert(data.full_name.clone(), id);
            registry.types.push(data);
        }
        registry
    }

    pub fn get(&self, id: TypeId) -> &TypeData {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeData {
        &mut self.types[id.0 as usize]
    }

    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.get(id).kind
    }

    pub fn full_name(&self, id: TypeId) -> &str {
        &self.get(id).full_name
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeData)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    pub fn builtin_by_name(&self, name: &str) -> Option<TypeId> {
        TypeKind::from_name(name).map(|kind| {
            let idx = BUILTIN_KINDS.iter().position(|&k| k == kind).unwrap();
            TypeId(idx as u32)
        })
    }

    pub fn by_full_name(&self, full_name: &str) -> Option<TypeId> {
        self.by_full_name.get(full_name).copied()
    }

    /// Intern a nominal type, deduplicating on full name. The full name is
    /// derived here: namespace-qualified, `<arg,...>` suffix when
    /// specialized, `<?>` when the generic is still open.
    pub fn intern(&mut self, mut data: TypeData) -> TypeId {
        data.full_name = self.derive_full_name(&data);
        if let Some(&existing) = self.by_full_name.get(&data.full_name) {
            return existing;
        }
        let id = TypeId(self.types.len() as u32);
        tracing::trace!(full_name = %data.full_name, ?id, "intern type");
        self.by_full_name.insert(data.full_name.clone(), id);
        self.types.push(data);
        id
    }

    fn derive_full_name(&self, data: &TypeData) -> String {
        let mut out = String::new();
        if !data.namespace.is_empty() {
            out.push_str(&data.namespace);
            out.push('.');
        }
        out.push_str(&data.name);
        if data.is_specialized() {
            out.push('<');
            for (i, arg) in data.generic_args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(self.full_name(*arg));
            }
            out.push('>');
        } else if data.is_generic() {
            out.push_str("<?>");
        }
        out
    }

    /// Intern a function type `fun<R, P...>` / `async_fun<R, P...>`.
    pub fn intern_function(
        &mut self,
        params: TypeIdVec,
        return_type: TypeId,
        is_async: bool,
    ) -> TypeId {
        let head = if is_async { "async_fun" } else { "fun" };
        let mut name = format!("{head}<{}", self.full_name(return_type));
        for p in &params {
            name.push(',');
            name.push_str(self.full_name(*p));
        }
        name.push('>');

        if let Some(&existing) = self.by_full_name.get(&name) {
            return existing;
        }
        let id = TypeId(self.types.len() as u32);
        let data = TypeData {
            name: name.clone(),
            namespace: String::new(),
            kind: TypeKind::Function,
            generic_defs: Vec::new(),
            generic_args: TypeIdVec::new(),
            generic_base: None,
            generic_instances: Vec::new(),
            scope: None,
            fn_params: params,
            fn_return: Some(return_type),
            fn_is_async: is_async,
            full_name: name.clone(),
        };
        self.by_full_name.insert(name, id);
        self.types.push(data);
        id
    }

    /// Bind `args` to the formal parameters of `base`. Returns the cached
    /// instance when these exact arguments were seen before; identity of the
    /// returned TypeId is an invariant downstream equality checks rely on.
    pub fn specialize(&mut self, base: TypeId, args: &[TypeId], span: Span) -> CompileResult<TypeId> {
        let base_data = self.get(base);
        if !base_data.is_generic() || base_data.is_specialized() {
            return Err(SemanticError::SpecializeNonGeneric {
                name: base_data.full_name.clone(),
                span: span.into(),
            }
            .into());
        }
        if base_data.generic_defs.len() != args.len() {
            return Err(SemanticError::GenericArityMismatch {
                name: base_data.full_name.clone(),
                expected: base_data.generic_defs.len(),
                found: args.len(),
                span: span.into(),
            }
            .into());
        }

        for &instance in &base_data.generic_instances {
            if self.get(instance).generic_args.as_slice() == args {
                return Ok(instance);
            }
        }

        let data = TypeData {
            name: base_data.name.clone(),
            namespace: base_data.namespace.clone(),
            kind: base_data.kind,
            generic_defs: base_data.generic_defs.clone(),
            generic_args: args.iter().copied().collect(),
            generic_base: Some(base),
            generic_instances: Vec::new(),
            scope: None,
            fn_params: TypeIdVec::new(),
            fn_return: None,
            fn_is_async: false,
            full_name: String::new(),
        };
        let id = self.intern(data);
        self.get_mut(base).generic_instances.push(id);
        tracing::debug!(base = %self.full_name(base), instance = %self.full_name(id), "specialized generic");
        Ok(id)
    }

    /// True when a value of `from` may be used where `to` is expected
    /// without an explicit cast: same full name, or a direct entry in the
    /// widening table. The table is consulted directly, never chained.
    pub fn can_implicitly_cast(&self, from: TypeId, to: TypeId) -> bool {
        if from == to {
            return true;
        }
        let from_data = self.get(from);
        let to_data = self.get(to);
        if from_data.full_name == to_data.full_name {
            return true;
        }
        crate::sema::types::widens_to(from_data.kind, to_data.kind)
    }
}
