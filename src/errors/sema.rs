// src/errors/sema.rs
//! Semantic analysis errors (E2xxx).

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum SemanticError {
    #[error("duplicate name '{name}' in this scope")]
    #[diagnostic(code(E2001))]
    DuplicateName {
        name: String,
        #[label("already declared")]
        span: SourceSpan,
    },

    #[error("unknown type '{name}'")]
    #[diagnostic(code(E2002))]
    UnknownType {
        name: String,
        #[label("not found")]
        span: SourceSpan,
    },

    #[error("undefined symbol '{name}'")]
    #[diagnostic(code(E2003))]
    UnknownSymbol {
        name: String,
        #[label("not found in scope")]
        span: SourceSpan,
    },

    #[error("'{owner}' has no member '{member}'")]
    #[diagnostic(code(E2004))]
    UnknownMember {
        owner: String,
        member: String,
        #[label("unknown member")]
        span: SourceSpan,
    },

    #[error("expected {expected}, found {found}")]
    #[diagnostic(code(E2005))]
    TypeMismatch {
        expected: String,
        found: String,
        #[label("type mismatch")]
        span: SourceSpan,
    },

    #[error("expected {expected} arguments, found {found}")]
    #[diagnostic(code(E2006))]
    WrongArgumentCount {
        expected: usize,
        found: usize,
        #[label("wrong number of arguments")]
        span: SourceSpan,
    },

    #[error("'{found}' is not callable")]
    #[diagnostic(code(E2007))]
    NotCallable {
        found: String,
        #[label("cannot be called")]
        span: SourceSpan,
    },

    #[error("break outside of loop")]
    #[diagnostic(code(E2008))]
    BreakOutsideLoop {
        #[label("not inside a loop")]
        span: SourceSpan,
    },

    #[error("continue outside of loop")]
    #[diagnostic(code(E2009))]
    ContinueOutsideLoop {
        #[label("not inside a loop")]
        span: SourceSpan,
    },

    #[error("no common type for {left} and {right}")]
    #[diagnostic(code(E2010))]
    NoCommonType {
        left: String,
        right: String,
        #[label("operands are incompatible")]
        span: SourceSpan,
    },

    #[error("arithmetic on class type {found}")]
    #[diagnostic(code(E2011))]
    ArithmeticOnClass {
        found: String,
        #[label("class values do not support arithmetic")]
        span: SourceSpan,
    },

    #[error("logical operand must be bool, found {found}")]
    #[diagnostic(code(E2012))]
    LogicalOperandNotBool {
        found: String,
        #[label("expected bool")]
        span: SourceSpan,
    },

    #[error("shift operand must be an integer, found {found}")]
    #[diagnostic(code(E2013))]
    ShiftOperandNotInteger {
        found: String,
        #[label("expected an integer")]
        span: SourceSpan,
    },

    #[error("'{name}' is not generic and cannot take type arguments")]
    #[diagnostic(code(E2014))]
    SpecializeNonGeneric {
        name: String,
        #[label("not a generic type")]
        span: SourceSpan,
    },

    #[error("'{name}' expects {expected} type arguments, found {found}")]
    #[diagnostic(code(E2015))]
    GenericArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        #[label("wrong number of type arguments")]
        span: SourceSpan,
    },

    #[error("'{name}' is not an interface")]
    #[diagnostic(code(E2016))]
    NotAnInterface {
        name: String,
        #[label("expected an interface")]
        span: SourceSpan,
    },

    #[error("method '{method}' does not match the declaration in interface '{interface}'")]
    #[diagnostic(code(E2017))]
    InterfaceSignatureMismatch {
        interface: String,
        method: String,
        #[label("signature differs from the interface")]
        span: SourceSpan,
    },

    #[error("interface '{interface}' requires an implementation of '{method}'")]
    #[diagnostic(code(E2018))]
    InterfaceMethodMissing {
        interface: String,
        method: String,
        #[label("no implementation and no default body")]
        span: SourceSpan,
    },

    #[error("'{method}' is not a member of interface '{interface}'")]
    #[diagnostic(code(E2019))]
    MethodNotInInterface {
        interface: String,
        method: String,
        #[label("not declared by the interface")]
        span: SourceSpan,
    },

    #[error("symbol name '{name}' is reserved")]
    #[diagnostic(code(E2020), help("names starting with '__' are reserved for generated code"))]
    ReservedSymbolName {
        name: String,
        #[label("reserved name")]
        span: SourceSpan,
    },

    #[error("cannot assign to readonly '{name}'")]
    #[diagnostic(code(E2021))]
    AssignToReadonly {
        name: String,
        #[label("declared readonly")]
        span: SourceSpan,
    },

    #[error("cannot classify literal '{text}'")]
    #[diagnostic(code(E2022))]
    UnknownLiteral {
        text: String,
        #[label("no type matches this literal")]
        span: SourceSpan,
    },

    #[error("cannot use the value of a void expression")]
    #[diagnostic(code(E2023))]
    VoidValueUsed {
        #[label("produces no value")]
        span: SourceSpan,
    },

    #[error("constructor of '{class}' must take 'this' as its first parameter")]
    #[diagnostic(code(E2024))]
    BadConstructor {
        class: String,
        #[label("invalid constructor shape")]
        span: SourceSpan,
    },

    #[error("variable '{name}' needs a type annotation or an initializer")]
    #[diagnostic(code(E2025))]
    CannotInferType {
        name: String,
        #[label("type is unknown here")]
        span: SourceSpan,
    },

    #[error("assignment target is not assignable")]
    #[diagnostic(code(E2026))]
    InvalidAssignTarget {
        #[label("cannot assign here")]
        span: SourceSpan,
    },
}
