// src/lib.rs
//
// penguinc: the semantic core of the PenguinLang compiler. Takes a parsed
// syntax tree, runs the multi-pass semantic pipeline over it, and produces a
// `SemanticModel` with flat instruction lists ready for the interpreter.

pub mod errors;
pub mod frontend;
pub mod sema;

pub use errors::{CompileError, CompileResult};
pub use sema::model::{CompileOptions, SemanticModel};

use frontend::{Interner, Program};

/// Compile a program. The implicit builtin namespace is prepended, then the
/// pass pipeline runs to completion; the first fatal diagnostic aborts and
/// leaves no usable model.
pub fn compile(
    program: Program,
    mut interner: Interner,
    options: CompileOptions,
) -> CompileResult<SemanticModel> {
    let mut files = vec![sema::builtins::builtin_file(&mut interner)];
    files.extend(program.files);
    let program = Program { files };

    let mut model = SemanticModel::new(interner, options);
    sema::passes::run(&mut model, &program)?;

    if model.options.dump_instructions {
        tracing::info!("instruction tables:\n{}", model.dump_instruction_tables());
    }
    Ok(model)
}
