// src/errors/internal.rs
//! Internal-limitation faults (E9xxx).
//!
//! These mark constructs the compiler cannot express yet, as opposed to
//! errors in the program being compiled. Tooling filters on the code prefix.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum UnsupportedError {
    #[error("cast from {from} to {to} is not supported")]
    #[diagnostic(code(E9001))]
    UnsupportedCast {
        from: String,
        to: String,
        #[label("unsupported cast")]
        span: SourceSpan,
    },

    #[error("generic type '{name}' used here without type arguments")]
    #[diagnostic(code(E9002), help("spell the arguments out; inference is not implemented"))]
    OpenGenericUse {
        name: String,
        #[label("needs type arguments")]
        span: SourceSpan,
    },

    #[error("free generic functions are not supported")]
    #[diagnostic(code(E9003), help("move the function into a generic class"))]
    GenericFunctionCall {
        name: String,
        #[label("generic call")]
        span: SourceSpan,
    },

    #[error("a lambda is not supported in this position")]
    #[diagnostic(code(E9004), help("bind the lambda inside a function body first"))]
    LambdaPosition {
        #[label("unsupported lambda")]
        span: SourceSpan,
    },
}
