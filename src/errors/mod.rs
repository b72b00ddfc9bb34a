// src/errors/mod.rs
//! Structured error reporting for the PenguinLang semantic core.
//!
//! User-facing semantic errors carry E2xxx codes; internal "not yet
//! supported" limitations carry E9xxx codes so tooling can tell them apart.

pub mod internal;
pub mod report;
pub mod sema;

pub use internal::UnsupportedError;
pub use report::{DiagnosticEvent, DiagnosticLevel, Reporter};
pub use sema::SemanticError;

use miette::Diagnostic;
use thiserror::Error;

/// Any failure that aborts a compilation. The first one raised stops the
/// pipeline; the model is unusable afterwards.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CompileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Unsupported(#[from] UnsupportedError),
}

pub type CompileResult<T> = Result<T, CompileError>;
