// src/sema/types.rs
//
// Type kinds, literal classification, and the implicit widening lattice.

/// Kind of a PenguinLang type. Builtin kinds are interned once in the
/// `TypeRegistry` and never specialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Float,
    Double,
    String,
    Bool,
    Char,
    Function,
    Class,
    Enum,
    Interface,
}

impl TypeKind {
    pub fn name(self) -> &'static str {
        match self {
            TypeKind::Void => "void",
            TypeKind::I8 => "i8",
            TypeKind::I16 => "i16",
            TypeKind::I32 => "i32",
            TypeKind::I64 => "i64",
            TypeKind::U8 => "u8",
            TypeKind::U16 => "u16",
            TypeKind::U32 => "u32",
            TypeKind::U64 => "u64",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::String => "string",
            TypeKind::Bool => "bool",
            TypeKind::Char => "char",
            TypeKind::Function => "function",
            TypeKind::Class => "class",
            TypeKind::Enum => "enum",
            TypeKind::Interface => "interface",
        }
    }

    pub fn is_signed_int(self) -> bool {
        matches!(self, TypeKind::I8 | TypeKind::I16 | TypeKind::I32 | TypeKind::I64)
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(self, TypeKind::U8 | TypeKind::U16 | TypeKind::U32 | TypeKind::U64)
    }

    pub fn is_integer(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeKind::Float | TypeKind::Double)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Builtin kinds have exactly one interned type each
    pub fn is_builtin(self) -> bool {
        !matches!(
            self,
            TypeKind::Function | TypeKind::Class | TypeKind::Enum | TypeKind::Interface
        )
    }

    pub fn from_name(name: &str) -> Option<TypeKind> {
        Some(match name {
            "void" => TypeKind::Void,
            "i8" => TypeKind::I8,
            "i16" => TypeKind::I16,
            "i32" => TypeKind::I32,
            "i64" => TypeKind::I64,
            "u8" => TypeKind::U8,
            "u16" => TypeKind::U16,
            "u32" => TypeKind::U32,
            "u64" => TypeKind::U64,
            "float" => TypeKind::Float,
            "double" => TypeKind::Double,
            "string" => TypeKind::String,
            "bool" => TypeKind::Bool,
            "char" => TypeKind::Char,
            _ => return None,
        })
    }
}

/// The implicit widening table. Direct entries only: a cast is allowed iff
/// the pair appears here, no chaining.
///
/// The u8 -> i8 entry reinterprets the sign bit rather than widening; it is
/// kept on purpose for compatibility with the established language behavior
/// (see DESIGN.md).
pub fn widens_to(from: TypeKind, to: TypeKind) -> bool {
    use TypeKind::*;
    let targets: &[TypeKind] = match from {
        I8 => &[I16, I32, I64, Float, Double, String],
        I16 => &[I32, I64, Float, Double, String],
        I32 => &[I64, Float, Double, String],
        I64 => &[Float, Double, String],
        U8 => &[U16, U32, U64, I8, I16, I32, I64, Float, Double, String],
        U16 => &[U32, U64, I16, I32, I64, Float, Double, String],
        U32 => &[U64, I32, I64, Float, Double, String],
        U64 => &[I64, Float, Double, String],
        Float => &[Double, String],
        Double => &[String],
        Bool => &[String],
        _ => &[],
    };
    targets.contains(&to)
}

/// Classify a literal token. Integers take the smallest signed width that
/// fits, then u64; a trailing `f` marks a float, any other fractional or
/// exponent form is a double. Returns `None` when nothing matches, and the
/// caller decides whether that is fatal.
pub fn classify_literal(text: &str) -> Option<TypeKind> {
    if text.is_empty() {
        return None;
    }
    if text.starts_with('"') && text.ends_with('"') && text.len() >= 2 {
        return Some(TypeKind::String);
    }
    if text.starts_with('\'') && text.ends_with('\'') && text.len() >= 3 {
        return Some(TypeKind::Char);
    }
    if text == "true" || text == "false" {
        return Some(TypeKind::Bool);
    }

    if let Some(stripped) = text.strip_suffix('f') {
        if stripped.parse::<f32>().is_ok() {
            return Some(TypeKind::Float);
        }
        return None;
    }

    if text.contains('.') || text.contains('e') || text.contains('E') {
        if text.parse::<f64>().is_ok() {
            return Some(TypeKind::Double);
        }
        return None;
    }

    let negative = text.starts_with('-');
    if let Ok(value) = text.parse::<i64>() {
        let kind = if (i8::MIN as i64..=i8::MAX as i64).contains(&value) {
            TypeKind::I8
        } else if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
            TypeKind::I16
        } else if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
            TypeKind::I32
        } else {
            TypeKind::I64
        };
        return Some(kind);
    }
    if !negative && text.parse::<u64>().is_ok() {
        return Some(TypeKind::U64);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_table_spot_checks() {
        assert!(widens_to(TypeKind::U8, TypeKind::U16));
        assert!(widens_to(TypeKind::U8, TypeKind::String));
        assert!(widens_to(TypeKind::I32, TypeKind::I64));
        assert!(widens_to(TypeKind::I32, TypeKind::Double));
        assert!(widens_to(TypeKind::Bool, TypeKind::String));
        assert!(widens_to(TypeKind::Float, TypeKind::Double));

        assert!(!widens_to(TypeKind::I64, TypeKind::I32));
        assert!(!widens_to(TypeKind::U64, TypeKind::U8));
        assert!(!widens_to(TypeKind::String, TypeKind::Bool));
        assert!(!widens_to(TypeKind::Double, TypeKind::Float));
        assert!(!widens_to(TypeKind::Bool, TypeKind::I8));
        assert!(!widens_to(TypeKind::Char, TypeKind::String));
    }

    #[test]
    fn widening_u8_to_i8_is_present() {
        // Sign-reinterpreting entry carried deliberately; see DESIGN.md.
        assert!(widens_to(TypeKind::U8, TypeKind::I8));
        assert!(!widens_to(TypeKind::U16, TypeKind::I8));
    }

    #[test]
    fn widening_is_direct_not_transitive() {
        // i8 -> string is its own table entry, not derived via i16.
        assert!(widens_to(TypeKind::I8, TypeKind::String));
        // u8 -> i8 and i8 -> i16 both exist, but only pairs in the table
        // hold; a chain like char -> anything stays empty.
        assert!(!widens_to(TypeKind::Char, TypeKind::I32));
    }

    #[test]
    fn literal_strings_chars_bools() {
        assert_eq!(classify_literal("\"hi\""), Some(TypeKind::String));
        assert_eq!(classify_literal("'c'"), Some(TypeKind::Char));
        assert_eq!(classify_literal("true"), Some(TypeKind::Bool));
        assert_eq!(classify_literal("false"), Some(TypeKind::Bool));
    }

    #[test]
    fn literal_integers_pick_smallest_signed_width() {
        assert_eq!(classify_literal("0"), Some(TypeKind::I8));
        assert_eq!(classify_literal("127"), Some(TypeKind::I8));
        assert_eq!(classify_literal("128"), Some(TypeKind::I16));
        assert_eq!(classify_literal("-129"), Some(TypeKind::I16));
        assert_eq!(classify_literal("70000"), Some(TypeKind::I32));
        assert_eq!(classify_literal("5000000000"), Some(TypeKind::I64));
        // Above i64::MAX but within u64
        assert_eq!(classify_literal("18446744073709551615"), Some(TypeKind::U64));
        assert_eq!(classify_literal("99999999999999999999999"), None);
    }

    #[test]
    fn literal_floats_and_doubles() {
        assert_eq!(classify_literal("1.5"), Some(TypeKind::Double));
        assert_eq!(classify_literal("2e10"), Some(TypeKind::Double));
        assert_eq!(classify_literal("1.5f"), Some(TypeKind::Float));
        assert_eq!(classify_literal("abc"), None);
    }
}
