// src/sema/builtins.rs
//
// The implicit `__builtin` namespace. Built as ordinary syntax and compiled
// through the same pipeline as user code; the runtime provides the native
// bodies.

use std::rc::Rc;

use crate::frontend::{
    Block, ClassDecl, FuncDecl, InterfaceDecl, Interner, Item, NamespaceDecl, Param, SourceFile,
    Span, Symbol, TypeExpr,
};
use crate::sema::model::{BUILTIN_NAMESPACE, ENQUEUE_JOB, RUN_SCHEDULER};

fn native_fn(
    name: Symbol,
    params: Vec<Param>,
    return_type: Option<TypeExpr>,
    has_body: bool,
) -> Rc<FuncDecl> {
    Rc::new(FuncDecl {
        name,
        params,
        return_type,
        body: has_body.then(|| Block::new(Vec::new())),
        is_async: false,
        is_native: true,
        span: Span::synthesized(),
    })
}

fn param(name: Symbol, ty: TypeExpr) -> Param {
    Param {
        name,
        ty,
        span: Span::synthesized(),
    }
}

/// Build the `__builtin` namespace as a synthetic source file. Prepended to
/// every compilation before the pipeline runs.
pub fn builtin_file(interner: &mut Interner) -> SourceFile {
    let ns_name = interner.intern(BUILTIN_NAMESPACE);
    let string_ty = TypeExpr::simple(interner.intern("string"));
    let this = interner.intern("this");
    let t_param = interner.intern("T");

    let print = native_fn(
        interner.intern("print"),
        vec![param(interner.intern("text"), string_ty.clone())],
        None,
        true,
    );
    let println = native_fn(
        interner.intern("println"),
        vec![param(interner.intern("text"), string_ty)],
        None,
        true,
    );

    // class Job<T> { fun do_wait(this) -> T }
    // The scheduler hands one out for every spawned async call.
    let job = Rc::new(ClassDecl {
        name: interner.intern("Job"),
        type_params: vec![t_param],
        fields: Vec::new(),
        methods: vec![native_fn(
            interner.intern("do_wait"),
            vec![param(this, TypeExpr::SelfType)],
            Some(TypeExpr::simple(t_param)),
            true,
        )],
        impls: Vec::new(),
        span: Span::synthesized(),
    });

    // interface Iterator<T> { fun next(this) -> T }
    // Lowered generator bodies implement it.
    let iterator = Rc::new(InterfaceDecl {
        name: interner.intern("Iterator"),
        type_params: vec![t_param],
        extends: Vec::new(),
        methods: vec![native_fn(
            interner.intern("next"),
            vec![param(this, TypeExpr::SelfType)],
            Some(TypeExpr::simple(t_param)),
            false,
        )],
        span: Span::synthesized(),
    });

    let enqueue = native_fn(
        interner.intern(ENQUEUE_JOB),
        vec![param(
            interner.intern("job"),
            TypeExpr::Fun {
                is_async: false,
                return_type: Box::new(TypeExpr::simple(interner.intern("void"))),
                params: Vec::new(),
            },
        )],
        None,
        true,
    );
    let run_scheduler = native_fn(interner.intern(RUN_SCHEDULER), Vec::new(), None, true);

    SourceFile {
        name: "<builtin>".to_string(),
        namespaces: vec![Rc::new(NamespaceDecl {
            name: ns_name,
            imports: Vec::new(),
            items: vec![
                Item::Function(print),
                Item::Function(println),
                Item::Class(job),
                Item::Interface(iterator),
                Item::Function(enqueue),
                Item::Function(run_scheduler),
            ],
            span: Span::synthesized(),
        })],
    }
}
