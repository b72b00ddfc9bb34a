// tests/semantic_pipeline.rs
//! End-to-end pipeline tests over hand-built syntax trees.

use std::rc::Rc;

use penguinc::errors::{CompileError, SemanticError};
use penguinc::frontend::{
    Block, ClassDecl, EnumDecl, EnumVariant, Expr, FieldDecl, FuncDecl, ImplBlock, InterfaceDecl,
    Interner, Item, LetDecl, NamespaceDecl, Param, Program, SourceFile, Span, Stmt, Symbol,
    TypeExpr,
};
use penguinc::sema::{InstKind, ScopeId, SymbolKind, TypeId, TypeKind, VTableSlot};
use penguinc::{CompileOptions, CompileResult, SemanticModel, compile};

// ============================================================================
// Builder harness
// ============================================================================

struct B {
    i: std::cell::RefCell<Interner>,
}

impl B {
    fn new() -> Self {
        // Opt-in pass tracing: RUST_LOG=debug cargo test -- --nocapture
        static TRACING: std::sync::Once = std::sync::Once::new();
        TRACING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
                )
                .try_init();
        });
        Self {
            i: std::cell::RefCell::new(Interner::new()),
        }
    }

    fn s(&self, name: &str) -> Symbol {
        self.i.borrow_mut().intern(name)
    }

    fn t(&self, name: &str) -> TypeExpr {
        TypeExpr::simple(self.s(name))
    }

    fn id(&self, name: &str) -> Expr {
        Expr::ident(self.s(name))
    }

    fn param(&self, name: &str, ty: TypeExpr) -> Param {
        Param {
            name: self.s(name),
            ty,
            span: Span::synthesized(),
        }
    }

    fn this(&self) -> Param {
        Param {
            name: self.s("this"),
            ty: TypeExpr::SelfType,
            span: Span::synthesized(),
        }
    }

    fn val(&self, name: &str, ty: Option<TypeExpr>, init: Option<Expr>) -> Stmt {
        Stmt::Let(Rc::new(LetDecl {
            name: self.s(name),
            ty,
            init,
            readonly: true,
            span: Span::synthesized(),
        }))
    }

    fn var(&self, name: &str, ty: Option<TypeExpr>, init: Option<Expr>) -> Stmt {
        Stmt::Let(Rc::new(LetDecl {
            name: self.s(name),
            ty,
            init,
            readonly: false,
            span: Span::synthesized(),
        }))
    }

    fn ns_val(&self, name: &str, ty: TypeExpr, init: Expr) -> Item {
        Item::Let(Rc::new(LetDecl {
            name: self.s(name),
            ty: Some(ty),
            init: Some(init),
            readonly: false,
            span: Span::synthesized(),
        }))
    }

    fn fun(
        &self,
        name: &str,
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        body: Vec<Stmt>,
    ) -> Rc<FuncDecl> {
        Rc::new(FuncDecl {
            name: self.s(name),
            params,
            return_type: ret,
            body: Some(Block::new(body)),
            is_async: false,
            is_native: false,
            span: Span::synthesized(),
        })
    }

    fn async_fun(
        &self,
        name: &str,
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        body: Vec<Stmt>,
    ) -> Rc<FuncDecl> {
        Rc::new(FuncDecl {
            name: self.s(name),
            params,
            return_type: ret,
            body: Some(Block::new(body)),
            is_async: true,
            is_native: false,
            span: Span::synthesized(),
        })
    }

    fn abstract_fun(
        &self,
        name: &str,
        params: Vec<Param>,
        ret: Option<TypeExpr>,
    ) -> Rc<FuncDecl> {
        Rc::new(FuncDecl {
            name: self.s(name),
            params,
            return_type: ret,
            body: None,
            is_async: false,
            is_native: false,
            span: Span::synthesized(),
        })
    }

    fn field(&self, name: &str, ty: TypeExpr, init: Option<Expr>) -> FieldDecl {
        FieldDecl {
            name: self.s(name),
            ty,
            init,
            readonly: false,
            span: Span::synthesized(),
        }
    }

    fn class(
        &self,
        name: &str,
        type_params: Vec<&str>,
        fields: Vec<FieldDecl>,
        methods: Vec<Rc<FuncDecl>>,
        impls: Vec<ImplBlock>,
    ) -> Item {
        let type_params = type_params.into_iter().map(|p| self.s(p)).collect();
        Item::Class(Rc::new(ClassDecl {
            name: self.s(name),
            type_params,
            fields,
            methods,
            impls,
            span: Span::synthesized(),
        }))
    }

    fn ns(&self, name: &str, imports: Vec<&str>, items: Vec<Item>) -> SourceFile {
        let imports = imports.into_iter().map(|i| vec![self.s(i)]).collect();
        SourceFile {
            name: format!("{name}.pg"),
            namespaces: vec![Rc::new(NamespaceDecl {
                name: self.s(name),
                imports,
                items,
                span: Span::synthesized(),
            })],
        }
    }

    fn compile(self, files: Vec<SourceFile>) -> CompileResult<SemanticModel> {
        compile(Program { files }, self.i.into_inner(), CompileOptions::default())
    }
}

fn ret(value: Expr) -> Stmt {
    Stmt::Return {
        value: Some(value),
        span: Span::synthesized(),
    }
}

fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::Assign {
        target,
        value,
        span: Span::synthesized(),
    }
}

fn code_scope(model: &SemanticModel, full_name: &str) -> ScopeId {
    let sym = model
        .symbol_by_full_name(full_name)
        .unwrap_or_else(|| panic!("no symbol {full_name}"));
    match &model.symbols.get(sym).kind {
        SymbolKind::Function { code: Some(code), .. } => *code,
        other => panic!("{full_name} is not a compiled function: {other:?}"),
    }
}

fn instructions(model: &SemanticModel, full_name: &str) -> Vec<penguinc::sema::Instruction> {
    model.scopes.get(code_scope(model, full_name)).instructions.clone()
}

// ============================================================================
// Symbols and types
// ============================================================================

#[test]
fn namespace_val_produces_qualified_symbol() {
    let b = B::new();
    let i32_ty = b.t("i32");
    let item = b.ns_val("x", i32_ty, Expr::literal("1"));
    let file = b.ns("app", vec![], vec![item]);
    let model = b.compile(vec![file]).unwrap();

    let sym = model.symbol_by_full_name("app.x").expect("app.x");
    let data = model.symbols.get(sym);
    assert_eq!(data.name, "x");
    assert_eq!(model.symbol_full_name(sym), "app.x");
    assert_eq!(data.type_info, TypeId::I32);

    // Exactly one variable named x in the namespace
    let ns = model.namespace("app").unwrap();
    let count = model
        .symbols
        .in_scope(ns)
        .iter()
        .filter(|&&s| model.symbols.get(s).origin_name == "x")
        .count();
    assert_eq!(count, 1);
}

#[test]
fn function_symbol_carries_signature() {
    let b = B::new();
    let string_ty = b.t("string");
    let f = b.fun("f", vec![], Some(string_ty), vec![]);
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let model = b.compile(vec![file]).unwrap();

    let sym = model.symbol_by_full_name("app.f").unwrap();
    match &model.symbols.get(sym).kind {
        SymbolKind::Function {
            return_type,
            params,
            is_static,
            ..
        } => {
            assert_eq!(*return_type, TypeId::STRING);
            assert_eq!(model.types.kind(*return_type), TypeKind::String);
            assert!(params.is_empty());
            assert!(*is_static);
        }
        other => panic!("expected function symbol, got {other:?}"),
    }
}

#[test]
fn class_without_new_gets_default_constructor() {
    let b = B::new();
    let class = b.class("Point", vec![], vec![], vec![], vec![]);
    let file = b.ns("app", vec![], vec![class]);
    let model = b.compile(vec![file]).unwrap();

    let scope = model.type_scope_by_full_name("app.Point").expect("Point");
    let class_ty = model.scopes.get(scope).type_id.unwrap();
    assert_eq!(model.types.full_name(class_ty), "app.Point");

    let ctor = model.scopes.get(scope).constructor.expect("constructor");
    let fn_type = model.types.get(model.symbols.get(ctor).type_info);
    assert_eq!(fn_type.fn_params.len(), 1);
    assert_eq!(fn_type.fn_params[0], class_ty);
    assert_eq!(
        model.types.full_name(fn_type.fn_params[0]),
        model.types.full_name(class_ty)
    );
}

#[test]
fn field_initializers_run_in_the_constructor() {
    let b = B::new();
    let i32_ty = b.t("i32");
    let field = b.field("count", i32_ty, Some(Expr::literal("0")));
    let class = b.class("Counter", vec![], vec![field], vec![], vec![]);
    let file = b.ns("app", vec![], vec![class]);
    let model = b.compile(vec![file]).unwrap();

    let scope = model.type_scope_by_full_name("app.Counter").unwrap();
    let ctor = model.scopes.get(scope).constructor.unwrap();
    let code = match &model.symbols.get(ctor).kind {
        SymbolKind::Function { code: Some(c), .. } => *c,
        _ => panic!("constructor without code"),
    };
    let insts = &model.scopes.get(code).instructions;
    assert!(
        insts
            .iter()
            .any(|i| matches!(i.kind, InstKind::WriteMember { .. })),
        "field initializer should write the member"
    );
    assert!(
        matches!(insts.first().map(|i| &i.kind), Some(InstKind::AssignLiteral { .. })),
        "initializer literal loads first"
    );
}

// ============================================================================
// Widening and operators
// ============================================================================

#[test]
fn u8_plus_string_widens_to_string() {
    let b = B::new();
    let u8_ty = b.t("u8");
    let a = b.id("a");
    let body = vec![
        b.val(
            "a",
            Some(u8_ty.clone()),
            Some(Expr::new(
                penguinc::frontend::ExprKind::Cast {
                    expr: Box::new(Expr::literal("1")),
                    ty: u8_ty,
                },
                Span::synthesized(),
            )),
        ),
        b.val(
            "r",
            None,
            Some(Expr::binary(
                penguinc::frontend::BinaryOp::Add,
                a,
                Expr::literal("\"s\""),
            )),
        ),
    ];
    let f = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let model = b.compile(vec![file]).unwrap();

    let insts = instructions(&model, "app.main");
    let binary_dst = insts
        .iter()
        .find_map(|i| match &i.kind {
            InstKind::Binary { dst, .. } => Some(*dst),
            _ => None,
        })
        .expect("binary instruction");
    assert_eq!(model.symbols.get(binary_dst).type_info, TypeId::STRING);
}

#[test]
fn u8_into_i8_compiles_with_a_warning() {
    let b = B::new();
    let u8_ty = b.t("u8");
    let i8_ty = b.t("i8");
    let body = vec![
        b.val(
            "a",
            Some(u8_ty.clone()),
            Some(Expr::new(
                penguinc::frontend::ExprKind::Cast {
                    expr: Box::new(Expr::literal("200")),
                    ty: u8_ty,
                },
                Span::synthesized(),
            )),
        ),
        b.val("b", Some(i8_ty), Some(b.id("a"))),
    ];
    let f = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let model = b.compile(vec![file]).unwrap();

    // The table allows the narrowing, and the sign reinterpretation is
    // surfaced as a warning rather than an error.
    assert_eq!(model.reporter.warnings().count(), 1);
    let insts = instructions(&model, "app.main");
    assert!(insts.iter().any(|i| matches!(
        &i.kind,
        InstKind::Cast { ty, .. } if *ty == TypeId::I8
    )));
}

#[test]
fn u8_plus_bool_has_no_common_type() {
    let b = B::new();
    let u8_ty = b.t("u8");
    let a = b.id("a");
    let body = vec![
        b.val(
            "a",
            Some(u8_ty.clone()),
            Some(Expr::new(
                penguinc::frontend::ExprKind::Cast {
                    expr: Box::new(Expr::literal("1")),
                    ty: u8_ty,
                },
                Span::synthesized(),
            )),
        ),
        b.val(
            "r",
            None,
            Some(Expr::binary(
                penguinc::frontend::BinaryOp::Add,
                a,
                Expr::literal("true"),
            )),
        ),
    ];
    let f = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let err = b.compile(vec![file]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::NoCommonType { .. })
    ));
}

// ============================================================================
// Control flow lowering
// ============================================================================

#[test]
fn while_break_lowers_to_goto_pairs() {
    let b = B::new();
    let body = vec![Stmt::While {
        cond: Expr::literal("true"),
        body: Block::new(vec![Stmt::Break {
            span: Span::synthesized(),
        }]),
        span: Span::synthesized(),
    }];
    let f = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let model = b.compile(vec![file]).unwrap();

    let insts = instructions(&model, "app.main");
    // cond literal (labelled begin), conditional exit, break goto, back
    // edge, landing pad for the end label, trailing return.
    let begin = insts[0].labels.first().copied().expect("begin label");
    match &insts[1].kind {
        InstKind::Goto {
            target,
            cond: Some(_),
            jump_on,
        } => {
            assert!(!jump_on);
            let end = *target;
            match &insts[2].kind {
                InstKind::Goto {
                    target,
                    cond: None,
                    ..
                } => assert_eq!(*target, end, "break jumps to the end label"),
                other => panic!("expected break goto, got {other:?}"),
            }
            match &insts[3].kind {
                InstKind::Goto {
                    target,
                    cond: None,
                    ..
                } => assert_eq!(*target, begin, "back edge to begin"),
                other => panic!("expected back edge, got {other:?}"),
            }
            let landing = insts[4..]
                .iter()
                .find(|i| i.labels.contains(&end))
                .expect("end label lands on an instruction");
            assert!(matches!(
                landing.kind,
                InstKind::Nop | InstKind::Return { .. }
            ));
        }
        other => panic!("expected conditional goto, got {other:?}"),
    }
    assert!(insts.last().unwrap().is_return());
}

#[test]
fn nested_loops_use_distinct_labels() {
    let b = B::new();
    let inner = Stmt::While {
        cond: Expr::literal("true"),
        body: Block::new(vec![Stmt::Break {
            span: Span::synthesized(),
        }]),
        span: Span::synthesized(),
    };
    let body = vec![Stmt::While {
        cond: Expr::literal("true"),
        body: Block::new(vec![inner]),
        span: Span::synthesized(),
    }];
    let f = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let model = b.compile(vec![file]).unwrap();

    let insts = instructions(&model, "app.main");
    let mut labels: Vec<u32> = Vec::new();
    for inst in &insts {
        for label in &inst.labels {
            labels.push(label.0);
        }
    }
    let mut deduped = labels.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(labels.len(), deduped.len(), "labels are unique per loop");
    assert!(deduped.len() >= 4, "two loops need four distinct labels");
}

#[test]
fn break_outside_loop_is_fatal() {
    let b = B::new();
    let f = b.fun(
        "main",
        vec![],
        None,
        vec![Stmt::Break {
            span: Span::synthesized(),
        }],
    );
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let err = b.compile(vec![file]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::BreakOutsideLoop { .. })
    ));
}

// ============================================================================
// Shadowing
// ============================================================================

#[test]
fn shadowed_locals_are_renamed_and_resolve_innermost() {
    let b = B::new();
    let i32_ty = b.t("i32");
    let string_ty = b.t("string");
    let body = vec![
        b.val("x", Some(i32_ty), Some(Expr::literal("1"))),
        Stmt::Block(Block::new(vec![
            b.val("x", Some(string_ty), Some(Expr::literal("\"s\""))),
        ])),
    ];
    let f = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let model = b.compile(vec![file]).unwrap();

    let code = code_scope(&model, "app.main");
    let xs: Vec<_> = model
        .symbols
        .in_scope(code)
        .iter()
        .copied()
        .filter(|&s| model.symbols.get(s).origin_name == "x")
        .collect();
    assert_eq!(xs.len(), 2);
    assert_eq!(model.symbols.get(xs[0]).name, "x");
    assert_eq!(model.symbols.get(xs[1]).name, "x_0");
    assert_eq!(model.symbols.get(xs[1]).origin_name, "x");

    // From inside the block (depth 2) the renamed symbol wins; outside it
    // the original does.
    assert_eq!(model.resolve_short_symbol("x", code, 2), Some(xs[1]));
    assert_eq!(model.resolve_short_symbol("x", code, 1), Some(xs[0]));
}

#[test]
fn local_shadows_import_shadows_builtin() {
    let b = B::new();
    let string_ty = b.t("string");
    let util_print = b.fun(
        "print",
        vec![Param {
            name: b.s("text"),
            ty: string_ty,
            span: Span::synthesized(),
        }],
        None,
        vec![],
    );
    let util = b.ns("util", vec![], vec![Item::Function(util_print)]);

    let i32_ty = b.t("i32");
    let with_local = b.fun(
        "with_local",
        vec![],
        None,
        vec![b.val("print", Some(i32_ty), Some(Expr::literal("3")))],
    );
    let without_local = b.fun("without_local", vec![], None, vec![]);
    let app = b.ns(
        "app",
        vec!["util"],
        vec![Item::Function(with_local), Item::Function(without_local)],
    );

    let plain_f = b.fun("f", vec![], None, vec![]);
    let plain = b.ns("plain", vec![], vec![Item::Function(plain_f)]);

    let model = b.compile(vec![util, app, plain]).unwrap();

    let local_scope = code_scope(&model, "app.with_local");
    let found = model
        .resolve_short_symbol("print", local_scope, u32::MAX)
        .unwrap();
    assert_eq!(model.symbols.get(found).parent, local_scope, "local wins");

    let other_scope = code_scope(&model, "app.without_local");
    let found = model
        .resolve_short_symbol("print", other_scope, u32::MAX)
        .unwrap();
    assert_eq!(
        model.symbols.get(found).parent,
        model.namespace("util").unwrap(),
        "import wins over builtin"
    );

    let plain_scope = code_scope(&model, "plain.f");
    let found = model
        .resolve_short_symbol("print", plain_scope, u32::MAX)
        .unwrap();
    assert_eq!(
        model.symbols.get(found).parent,
        model.namespace("__builtin").unwrap(),
        "builtin is the fallback"
    );
}

// ============================================================================
// Generics
// ============================================================================

fn box_program(b: &B) -> Vec<SourceFile> {
    let t_ty = b.t("T");
    let value_field = b.field("value", t_ty.clone(), None);
    let this = b.this();
    let get = b.fun(
        "get",
        vec![this],
        Some(t_ty),
        vec![ret(Expr::member(Expr::ident(b.s("this")), b.s("value")))],
    );
    let class = b.class("Box", vec!["T"], vec![value_field], vec![get], vec![]);

    let box_i32 = TypeExpr::generic(b.s("Box"), vec![b.t("i32")]);
    let ctor_call = Expr::new(
        penguinc::frontend::ExprKind::Call {
            callee: Box::new(b.id("Box")),
            args: vec![],
            type_args: vec![b.t("i32")],
        },
        Span::synthesized(),
    );
    let i32_ty = b.t("i32");
    let body = vec![
        b.var("bx", Some(box_i32), Some(ctor_call)),
        assign(
            Expr::member(b.id("bx"), b.s("value")),
            Expr::literal("5"),
        ),
        b.val(
            "v",
            Some(i32_ty),
            Some(Expr::call(Expr::member(b.id("bx"), b.s("get")), vec![])),
        ),
    ];
    let main = b.fun("main", vec![], None, body);
    vec![b.ns("app", vec![], vec![class, Item::Function(main)])]
}

#[test]
fn generic_class_specializes_and_members_resolve() {
    let b = B::new();
    let files = box_program(&b);
    let model = b.compile(files).unwrap();

    let specialized = model.types.by_full_name("app.Box<i32>").expect("Box<i32>");
    let scope = model.types.get(specialized).scope.expect("scope");
    assert_eq!(model.scopes.full_name(scope), "app.Box<i32>");

    // The bound member resolves to the concrete argument type
    let value = model.find_member(specialized, "value").unwrap();
    assert_eq!(model.symbols.get(value).type_info, TypeId::I32);
    let get = model.find_member(specialized, "get").unwrap();
    match &model.symbols.get(get).kind {
        SymbolKind::Function { return_type, .. } => assert_eq!(*return_type, TypeId::I32),
        _ => panic!("get is a function"),
    }

    // The open base never elaborates its members
    let base = model.types.by_full_name("app.Box<?>").unwrap();
    let base_scope = model.types.get(base).scope.unwrap();
    assert!(model.symbols.in_scope(base_scope).is_empty());
}

#[test]
fn specialization_identity_is_cached() {
    let b = B::new();
    let files = box_program(&b);
    let mut model = b.compile(files).unwrap();

    let base = model.types.by_full_name("app.Box<?>").unwrap();
    let first = model
        .resolve_or_create_specialized_type(base, &[TypeId::I32], Span::synthesized())
        .unwrap();
    let second = model
        .resolve_or_create_specialized_type(base, &[TypeId::I32], Span::synthesized())
        .unwrap();
    assert_eq!(first, second, "same arguments give the identical instance");

    let other = model
        .resolve_or_create_specialized_type(base, &[TypeId::STRING], Span::synthesized())
        .unwrap();
    assert_ne!(first, other);

    // Specializing an already-specialized type hands it back unchanged
    let again = model
        .resolve_or_create_specialized_type(first, &[TypeId::STRING], Span::synthesized())
        .unwrap();
    assert_eq!(again, first);
}

// ============================================================================
// Interfaces and vtables
// ============================================================================

fn shape_interface(b: &B) -> Item {
    let this = b.this();
    let i32_ty = b.t("i32");
    let area = b.abstract_fun("area", vec![this], Some(i32_ty));
    let this = b.this();
    let string_ty = b.t("string");
    let describe = b.fun(
        "describe",
        vec![this],
        Some(string_ty),
        vec![ret(Expr::literal("\"shape\""))],
    );
    Item::Interface(Rc::new(InterfaceDecl {
        name: b.s("Shape"),
        type_params: vec![],
        extends: vec![],
        methods: vec![area, describe],
        span: Span::synthesized(),
    }))
}

#[test]
fn vtable_has_user_and_default_slots() {
    let b = B::new();
    let shape = shape_interface(&b);
    let this = b.this();
    let i32_ty = b.t("i32");
    let area_impl = b.fun("area", vec![this], Some(i32_ty), vec![ret(Expr::literal("3"))]);
    let shape_ty = b.t("Shape");
    let circle = b.class(
        "Circle",
        vec![],
        vec![],
        vec![],
        vec![ImplBlock {
            interface: shape_ty,
            methods: vec![area_impl],
            span: Span::synthesized(),
        }],
    );
    let file = b.ns("app", vec![], vec![shape, circle]);
    let model = b.compile(vec![file]).unwrap();

    let circle_scope = model.type_scope_by_full_name("app.Circle").unwrap();
    let circle_ty = model.scopes.get(circle_scope).type_id.unwrap();
    let shape_ty = model.types.by_full_name("app.Shape").unwrap();
    assert!(model.implements_interface(circle_ty, shape_ty));

    let vtable = model.vtable_for(circle_ty, shape_ty).unwrap();
    let slots = &model.scopes.get(vtable).vtable.slots;
    assert_eq!(slots.len(), 2, "every interface method has a slot");

    let mut user = 0;
    let mut default = 0;
    for slot in slots {
        match slot {
            VTableSlot::UserImpl {
                interface_method,
                implementation,
            } => {
                user += 1;
                assert_eq!(model.symbols.get(*interface_method).origin_name, "area");
                assert_eq!(model.symbols.get(*implementation).origin_name, "area");
                assert_ne!(interface_method, implementation);
            }
            VTableSlot::InterfaceDefault { interface_method } => {
                default += 1;
                assert_eq!(model.symbols.get(*interface_method).origin_name, "describe");
            }
        }
    }
    assert_eq!((user, default), (1, 1));
}

#[test]
fn missing_interface_method_is_fatal() {
    let b = B::new();
    let shape = shape_interface(&b);
    let shape_ty = b.t("Shape");
    let blob = b.class(
        "Blob",
        vec![],
        vec![],
        vec![],
        vec![ImplBlock {
            interface: shape_ty,
            methods: vec![],
            span: Span::synthesized(),
        }],
    );
    let file = b.ns("app", vec![], vec![shape, blob]);
    let err = b.compile(vec![file]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::InterfaceMethodMissing { .. })
    ));
}

#[test]
fn interface_signature_mismatch_is_fatal() {
    let b = B::new();
    let shape = shape_interface(&b);
    let this = b.this();
    let string_ty = b.t("string");
    let bad_area = b.fun(
        "area",
        vec![this],
        Some(string_ty),
        vec![ret(Expr::literal("\"3\""))],
    );
    let shape_ty = b.t("Shape");
    let square = b.class(
        "Square",
        vec![],
        vec![],
        vec![],
        vec![ImplBlock {
            interface: shape_ty,
            methods: vec![bad_area],
            span: Span::synthesized(),
        }],
    );
    let file = b.ns("app", vec![], vec![shape, square]);
    let err = b.compile(vec![file]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::InterfaceSignatureMismatch { .. })
    ));
}

// ============================================================================
// Rewriting: lambdas, waits, generators
// ============================================================================

#[test]
fn lambda_extracts_into_capture_class() {
    let b = B::new();
    let i32_ty = b.t("i32");
    let x_param = b.param("x", i32_ty.clone());
    let lambda_body = Block::new(vec![ret(Expr::binary(
        penguinc::frontend::BinaryOp::Add,
        b.id("x"),
        b.id("offset"),
    ))]);
    let lambda = Expr::new(
        penguinc::frontend::ExprKind::Lambda {
            params: vec![x_param],
            return_type: Some(i32_ty.clone()),
            body: lambda_body,
        },
        Span::synthesized(),
    );
    let body = vec![
        b.val("offset", Some(i32_ty.clone()), Some(Expr::literal("10"))),
        b.val("adder", None, Some(lambda)),
        b.val(
            "r",
            Some(i32_ty),
            Some(Expr::call(b.id("adder"), vec![Expr::literal("5")])),
        ),
    ];
    let main = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![Item::Function(main)]);
    let model = b.compile(vec![file]).unwrap();

    let lambda_scope = model
        .type_scope_by_full_name("app.__lambda_0")
        .expect("extracted lambda class");
    let lambda_ty = model.scopes.get(lambda_scope).type_id.unwrap();

    // Captured local becomes a field and a constructor parameter
    let offset = model.find_member(lambda_ty, "offset").expect("capture field");
    assert_eq!(model.symbols.get(offset).type_info, TypeId::I32);
    let ctor = model.scopes.get(lambda_scope).constructor.unwrap();
    let ctor_type = model.types.get(model.symbols.get(ctor).type_info);
    assert_eq!(ctor_type.fn_params.len(), 2);
    assert_eq!(ctor_type.fn_params[1], TypeId::I32);

    // The body lives in the call method
    let call = model.find_member(lambda_ty, "call").expect("call method");
    match &model.symbols.get(call).kind {
        SymbolKind::Function { return_type, .. } => assert_eq!(*return_type, TypeId::I32),
        _ => panic!("call is a function"),
    }

    // The construction site passes the captured value
    let insts = instructions(&model, "app.main");
    assert!(insts
        .iter()
        .any(|i| matches!(i.kind, InstKind::NewInstance { .. })));
}

#[test]
fn wait_lowers_through_job_do_wait() {
    let b = B::new();
    let i32_ty = b.t("i32");
    let fetch = b.async_fun("fetch", vec![], Some(i32_ty.clone()), vec![ret(Expr::literal("42"))]);
    let body = vec![b.val(
        "x",
        Some(i32_ty),
        Some(Expr::wait(Expr::call(b.id("fetch"), vec![]))),
    )];
    let main = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![Item::Function(fetch), Item::Function(main)]);
    let model = b.compile(vec![file]).unwrap();

    let job = model
        .types
        .by_full_name("__builtin.Job<i32>")
        .expect("specialized job type");

    let insts = instructions(&model, "app.main");
    let mut spawn_dst = None;
    let mut wait_called = false;
    for inst in &insts {
        if let InstKind::Call { func, dst, .. } = &inst.kind {
            let name = model.symbols.get(*func).origin_name.clone();
            if name == "fetch" {
                spawn_dst = *dst;
            }
            if name == "do_wait" {
                wait_called = true;
            }
        }
    }
    let spawn_dst = spawn_dst.expect("spawn call");
    assert_eq!(model.symbols.get(spawn_dst).type_info, job);
    assert!(wait_called, "wait lowers to a do_wait call");
}

#[test]
fn async_call_without_wait_is_implicitly_waited() {
    let b = B::new();
    let i32_ty = b.t("i32");
    let fetch = b.async_fun("fetch", vec![], Some(i32_ty.clone()), vec![ret(Expr::literal("42"))]);
    let body = vec![b.val("x", Some(i32_ty), Some(Expr::call(b.id("fetch"), vec![])))];
    let main = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![Item::Function(fetch), Item::Function(main)]);
    let model = b.compile(vec![file]).unwrap();

    let insts = instructions(&model, "app.main");
    assert!(
        insts.iter().any(|i| matches!(
            &i.kind,
            InstKind::Call { func, .. }
                if model.symbols.get(*func).origin_name == "do_wait"
        )),
        "implicit wait wraps the bare async call"
    );
}

#[test]
fn transitively_async_functions_are_inferred() {
    let b = B::new();
    let i32_ty = b.t("i32");
    let fetch = b.async_fun("fetch", vec![], Some(i32_ty.clone()), vec![ret(Expr::literal("1"))]);
    // relay waits on fetch, so calling relay is itself an async operation
    let relay = b.fun(
        "relay",
        vec![],
        Some(i32_ty.clone()),
        vec![ret(Expr::wait(Expr::call(b.id("fetch"), vec![])))],
    );
    let body = vec![b.val("x", Some(i32_ty), Some(Expr::call(b.id("relay"), vec![])))];
    let main = b.fun("main", vec![], None, body);
    let file = b.ns(
        "app",
        vec![],
        vec![
            Item::Function(fetch),
            Item::Function(relay),
            Item::Function(main),
        ],
    );
    let model = b.compile(vec![file]).unwrap();

    let insts = instructions(&model, "app.main");
    let relay_spawn = insts.iter().find_map(|i| match &i.kind {
        InstKind::Call { func, dst, .. }
            if model.symbols.get(*func).origin_name == "relay" =>
        {
            *dst
        }
        _ => None,
    });
    let dst = relay_spawn.expect("relay call");
    let dst_ty = model.symbols.get(dst).type_info;
    assert_eq!(
        model.types.full_name(dst_ty),
        "__builtin.Job<i32>",
        "calling an inferred-async function spawns a job"
    );
}

#[test]
fn generator_lowers_to_iterator_class() {
    let b = B::new();
    let i32_ty = b.t("i32");
    let body = vec![
        Stmt::Yield {
            value: Expr::literal("1"),
            span: Span::synthesized(),
        },
        Stmt::Yield {
            value: Expr::literal("2"),
            span: Span::synthesized(),
        },
    ];
    let nums = b.fun("nums", vec![], Some(i32_ty.clone()), body);
    let main_body = vec![b.val("it", None, Some(Expr::call(b.id("nums"), vec![])))];
    let main = b.fun("main", vec![], None, main_body);
    let file = b.ns("app", vec![], vec![Item::Function(nums), Item::Function(main)]);
    let model = b.compile(vec![file]).unwrap();

    let gen_scope = model
        .type_scope_by_full_name("app.__generator_0")
        .expect("generator state class");
    let gen_ty = model.scopes.get(gen_scope).type_id.unwrap();
    let iter_ty = model
        .types
        .by_full_name("__builtin.Iterator<i32>")
        .expect("specialized iterator interface");
    assert!(model.implements_interface(gen_ty, iter_ty));

    // The function itself now returns the iterator view
    let nums_sym = model.symbol_by_full_name("app.nums").unwrap();
    match &model.symbols.get(nums_sym).kind {
        SymbolKind::Function { return_type, .. } => assert_eq!(*return_type, iter_ty),
        _ => panic!("nums is a function"),
    }

    // Yields became returns inside next
    let next = model.find_member(gen_ty, "next").expect("next method");
    let next_code = match &model.symbols.get(next).kind {
        SymbolKind::Function { code: Some(c), .. } => *c,
        _ => panic!("next has code"),
    };
    let returns = model
        .scopes
        .get(next_code)
        .instructions
        .iter()
        .filter(|i| i.is_return())
        .count();
    assert_eq!(returns, 2);
}

// ============================================================================
// Entry synthesis and return checking
// ============================================================================

#[test]
fn entry_point_runs_initializers_and_scheduler() {
    let b = B::new();
    let hello = Stmt::Expr(Expr::call(
        b.id("print"),
        vec![Expr::literal("\"hi\"")],
    ));
    let initial = Item::Initial(Rc::new(penguinc::frontend::InitialDecl {
        body: Block::new(vec![hello]),
        span: Span::synthesized(),
    }));
    let file = b.ns("app", vec![], vec![initial]);
    let model = b.compile(vec![file]).unwrap();

    let entry = model
        .symbols
        .lookup(model.root, "__penguin_main", u32::MAX)
        .expect("entry symbol");
    let code = match &model.symbols.get(entry).kind {
        SymbolKind::Function { code: Some(c), .. } => *c,
        _ => panic!("entry has code"),
    };
    let insts = &model.scopes.get(code).instructions;

    let call_names: Vec<String> = insts
        .iter()
        .filter_map(|i| match &i.kind {
            InstKind::Call { func, .. } => {
                Some(model.symbols.get(*func).origin_name.clone())
            }
            _ => None,
        })
        .collect();

    // Namespace initializers first, then job enqueues, then the run loop.
    assert!(call_names.iter().filter(|n| *n == "__ns_init").count() >= 2);
    assert_eq!(call_names.iter().filter(|n| *n == "__enqueue_job").count(), 1);
    assert_eq!(call_names.last().unwrap(), "__run_scheduler");
    assert!(insts.last().unwrap().is_return(), "entry ends in a return");

    let enqueue_pos = call_names.iter().position(|n| n == "__enqueue_job").unwrap();
    let last_init = call_names
        .iter()
        .rposition(|n| n == "__ns_init")
        .unwrap();
    assert!(last_init < enqueue_pos, "initializers run before jobs");
}

#[test]
fn user_symbol_on_entry_name_is_fatal() {
    let b = B::new();
    let squatter = b.fun("__penguin_main", vec![], None, vec![]);
    let file = b.ns("app", vec![], vec![Item::Function(squatter)]);
    let err = b.compile(vec![file]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::ReservedSymbolName { .. })
    ));
}

#[test]
fn void_functions_get_a_trailing_return() {
    let b = B::new();
    let f = b.fun(
        "noop",
        vec![],
        None,
        vec![Stmt::Expr(Expr::call(
            b.id("print"),
            vec![Expr::literal("\"x\"")],
        ))],
    );
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let model = b.compile(vec![file]).unwrap();

    let insts = instructions(&model, "app.noop");
    assert!(insts.last().unwrap().is_return());
    // Only one return was appended
    assert_eq!(insts.iter().filter(|i| i.is_return()).count(), 1);
}

// ============================================================================
// Pass discipline
// ============================================================================

#[test]
fn passes_are_monotonic_and_idempotent() {
    let b = B::new();
    let f = b.fun("main", vec![], None, vec![]);
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let mut model = b.compile(vec![file]).unwrap();

    let all: Vec<ScopeId> = model.scopes.iter_dfs(model.root).collect();
    for &scope in &all {
        assert_eq!(
            model.scopes.get(scope).pass_index,
            9,
            "every node finished the pipeline"
        );
    }

    // Re-processing a finished node changes nothing.
    let code = code_scope(&model, "app.main");
    let before = model.scopes.get(code).instructions.len();
    let symbols_before = model.symbols.len();
    for pass in 1..=9 {
        penguinc::sema::passes::process(&mut model, pass, code).unwrap();
    }
    assert_eq!(model.scopes.get(code).instructions.len(), before);
    assert_eq!(model.symbols.len(), symbols_before);
    assert_eq!(model.scopes.get(code).pass_index, 9);
}

// ============================================================================
// Enums
// ============================================================================

#[test]
fn enum_members_carry_ordinals_and_construct() {
    let b = B::new();
    let variants = vec![
        EnumVariant {
            name: b.s("Red"),
            payload: None,
            span: Span::synthesized(),
        },
        EnumVariant {
            name: b.s("Rgb"),
            payload: Some(b.t("i32")),
            span: Span::synthesized(),
        },
    ];
    let color = Item::Enum(Rc::new(EnumDecl {
        name: b.s("Color"),
        type_params: vec![],
        variants,
        methods: vec![],
        impls: vec![],
        span: Span::synthesized(),
    }));

    let color_ty = b.t("Color");
    let body = vec![
        b.val("c", Some(color_ty.clone()), Some(Expr::member(b.id("Color"), b.s("Red")))),
        b.val(
            "d",
            Some(color_ty),
            Some(Expr::call(
                Expr::member(b.id("Color"), b.s("Rgb")),
                vec![Expr::literal("7")],
            )),
        ),
    ];
    let main = b.fun("main", vec![], None, body);
    let file = b.ns("app", vec![], vec![color, Item::Function(main)]);
    let model = b.compile(vec![file]).unwrap();

    let scope = model.type_scope_by_full_name("app.Color").unwrap();
    let red = model.symbols.lookup(scope, "Red", u32::MAX).unwrap();
    match &model.symbols.get(red).kind {
        SymbolKind::EnumMember { ordinal } => assert_eq!(*ordinal, 0),
        _ => panic!("Red is an enum member"),
    }
    let rgb = model.symbols.lookup(scope, "Rgb", u32::MAX).unwrap();
    match &model.symbols.get(rgb).kind {
        SymbolKind::EnumMember { ordinal } => assert_eq!(*ordinal, 1),
        _ => panic!("Rgb is an enum member"),
    }

    let insts = instructions(&model, "app.main");
    let reads = insts
        .iter()
        .filter(|i| matches!(i.kind, InstKind::ReadEnum { .. }))
        .count();
    assert_eq!(reads, 2, "both uses load the enum constant");
    assert!(
        insts
            .iter()
            .any(|i| matches!(i.kind, InstKind::WriteEnum { .. })),
        "the payload variant stores its argument"
    );
}

// ============================================================================
// Structural errors
// ============================================================================

#[test]
fn duplicate_type_names_in_one_namespace_are_fatal() {
    let b = B::new();
    let first = b.class("Point", vec![], vec![], vec![], vec![]);
    let second = b.class("Point", vec![], vec![], vec![], vec![]);
    let file = b.ns("app", vec![], vec![first, second]);
    let err = b.compile(vec![file]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::DuplicateName { .. })
    ));
}

#[test]
fn constructor_argument_counts_are_checked() {
    let b = B::new();
    let i32_ty = b.t("i32");
    let v_field = b.field("v", i32_ty.clone(), None);
    let this = b.this();
    let v_param = b.param("v", i32_ty);
    let ctor = b.fun(
        "new",
        vec![this, v_param],
        None,
        vec![assign(
            Expr::member(Expr::ident(b.s("this")), b.s("v")),
            b.id("v"),
        )],
    );
    let class = b.class("C", vec![], vec![v_field], vec![ctor], vec![]);
    let bad_call = b.val(
        "c",
        None,
        Some(Expr::call(b.id("C"), vec![])),
    );
    let main = b.fun("main", vec![], None, vec![bad_call]);
    let file = b.ns("app", vec![], vec![class, Item::Function(main)]);
    let err = b.compile(vec![file]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::WrongArgumentCount { .. })
    ));
}

#[test]
fn unknown_type_reference_is_fatal() {
    let b = B::new();
    let missing = b.t("Missing");
    let f = b.fun("main", vec![], None, vec![b.val("x", Some(missing), None)]);
    let file = b.ns("app", vec![], vec![Item::Function(f)]);
    let err = b.compile(vec![file]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::UnknownType { .. })
    ));
}
