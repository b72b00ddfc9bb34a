// src/sema/passes/rewrite.rs
//
// Pass 6: lower syntax sugar before code generation.
//
//   - async inference: a function is async if declared so, if its body
//     waits, or if it (transitively) calls an async function; memoized
//     tri-state on the scope.
//   - lambda extraction: a lambda becomes a synthesized class with the
//     referenced outer locals captured by value as constructor parameters
//     and the lambda body as its `call` method.
//   - wait lowering: `wait e` becomes `(async e).do_wait()`; a call to an
//     async function outside any `wait` gets wrapped in one first.
//   - generator lowering: a yielding body moves into a synthesized class
//     implementing `Iterator<T>`, yields become returns, and the original
//     function returns an instance of it.
//
// Synthesized classes are caught up through every completed pass before the
// sweep continues.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::{CompileResult, SemanticError};
use crate::frontend::{
    Block, ClassDecl, Expr, ExprKind, FieldDecl, FuncDecl, ImplBlock, LetDecl, Param, Span, Stmt,
    Symbol, TypeExpr,
};
use crate::sema::model::SemanticModel;
use crate::sema::passes::{PASS_INTERFACES, catch_up, scoping};
use crate::sema::scope::{AsyncState, ScopeId, ScopeKind};
use crate::sema::symbols::SymbolKind;
use crate::sema::types::classify_literal;

pub fn process_scope(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let scope = model.scopes.get(id);
    if !scope.kind.is_code_container() || scope.is_native || scope.body.is_none() {
        return Ok(());
    }
    if super::symbol_elab::in_open_generic(model, id) {
        return Ok(());
    }

    if body_has_yield(model.scopes.get(id).body.as_ref().expect("body")) {
        lower_generator(model, id)?;
        return Ok(());
    }

    // Memoize before rewriting: the checks read the original body.
    infer_async(model, id, &mut Vec::new());

    let body = model.scopes.get(id).body.clone().expect("body");
    let mut rewriter = Rewriter::new(model, id);
    rewriter.seed_param_decls();
    let body = rewriter.rewrite_block(&body)?;
    model.scopes.get_mut(id).body = Some(body);
    Ok(())
}

// ============================================================================
// Async inference
// ============================================================================

/// Tri-state memoized async check. Cycles resolve to not-async.
pub fn infer_async(model: &mut SemanticModel, id: ScopeId, visiting: &mut Vec<ScopeId>) -> bool {
    match model.scopes.get(id).async_state {
        AsyncState::Yes => return true,
        AsyncState::No => return false,
        AsyncState::Unknown => {}
    }
    if visiting.contains(&id) {
        return false;
    }
    visiting.push(id);

    let result = match model.scopes.get(id).body.clone() {
        Some(body) => block_is_async(model, id, &body, visiting),
        None => false,
    };

    visiting.pop();
    model.scopes.get_mut(id).async_state = if result { AsyncState::Yes } else { AsyncState::No };
    if result {
        tracing::debug!(func = %model.scopes.full_name(id), "inferred async");
    }
    result
}

fn block_is_async(
    model: &mut SemanticModel,
    container: ScopeId,
    block: &Block,
    visiting: &mut Vec<ScopeId>,
) -> bool {
    block
        .stmts
        .iter()
        .any(|stmt| stmt_is_async(model, container, stmt, visiting))
}

fn stmt_is_async(
    model: &mut SemanticModel,
    container: ScopeId,
    stmt: &Stmt,
    visiting: &mut Vec<ScopeId>,
) -> bool {
    match stmt {
        Stmt::Let(decl) => decl
            .init
            .as_ref()
            .is_some_and(|e| expr_is_async(model, container, e, visiting)),
        Stmt::Assign { target, value, .. } => {
            expr_is_async(model, container, target, visiting)
                || expr_is_async(model, container, value, visiting)
        }
        Stmt::Expr(e) => expr_is_async(model, container, e, visiting),
        Stmt::If {
            cond,
            then_block,
            else_block,
            ..
        } => {
            expr_is_async(model, container, cond, visiting)
                || block_is_async(model, container, then_block, visiting)
                || else_block
                    .as_ref()
                    .is_some_and(|b| block_is_async(model, container, b, visiting))
        }
        Stmt::While { cond, body, .. } => {
            expr_is_async(model, container, cond, visiting)
                || block_is_async(model, container, body, visiting)
        }
        Stmt::Return { value, .. } => value
            .as_ref()
            .is_some_and(|e| expr_is_async(model, container, e, visiting)),
        // A yielding body becomes a generator class; the function itself
        // hands back the iterator synchronously.
        Stmt::Yield { value, .. } => expr_is_async(model, container, value, visiting),
        Stmt::Block(b) => block_is_async(model, container, b, visiting),
        Stmt::Break { .. } | Stmt::Continue { .. } => false,
    }
}

fn expr_is_async(
    model: &mut SemanticModel,
    container: ScopeId,
    expr: &Expr,
    visiting: &mut Vec<ScopeId>,
) -> bool {
    match &expr.kind {
        ExprKind::Wait(_) => true,
        ExprKind::Call { callee, args, .. } => {
            callee_is_async(model, container, callee, visiting)
                || args
                    .iter()
                    .any(|a| expr_is_async(model, container, a, visiting))
        }
        ExprKind::AsyncCall { .. } => true,
        ExprKind::Binary { lhs, rhs, .. } => {
            expr_is_async(model, container, lhs, visiting)
                || expr_is_async(model, container, rhs, visiting)
        }
        ExprKind::Unary { operand, .. } => expr_is_async(model, container, operand, visiting),
        ExprKind::Member { object, .. } => expr_is_async(model, container, object, visiting),
        ExprKind::Cast { expr, .. } => expr_is_async(model, container, expr, visiting),
        // A lambda body's waits belong to the lambda, not to this function
        ExprKind::Lambda { .. } => false,
        ExprKind::Literal(_) | ExprKind::Identifier(_) => false,
    }
}

/// Statically resolvable callees only: a bare identifier or a dotted chain
/// of identifiers. Instance-method calls through values resolve during
/// code generation, past this check.
fn callee_is_async(
    model: &mut SemanticModel,
    container: ScopeId,
    callee: &Expr,
    visiting: &mut Vec<ScopeId>,
) -> bool {
    let Some(path) = static_path(callee) else {
        return false;
    };
    let segments: Vec<String> = path
        .iter()
        .map(|s| model.name_of(*s).to_string())
        .collect();
    let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
    let Some(symbol) = model.resolve_symbol(&refs, container, u32::MAX) else {
        return false;
    };
    match &model.symbols.get(symbol).kind {
        SymbolKind::Function { code, .. } => {
            if model.types.get(model.symbols.get(symbol).type_info).fn_is_async {
                return true;
            }
            match code {
                Some(code) => {
                    let code = *code;
                    infer_async(model, code, visiting)
                }
                None => false,
            }
        }
        _ => false,
    }
}

fn static_path(expr: &Expr) -> Option<Vec<Symbol>> {
    match &expr.kind {
        ExprKind::Identifier(sym) => Some(vec![*sym]),
        ExprKind::Member { object, member } => {
            let mut path = static_path(object)?;
            path.push(*member);
            Some(path)
        }
        _ => None,
    }
}

// ============================================================================
// Body rewriting: lambdas and waits
// ============================================================================

struct Rewriter<'a> {
    model: &'a mut SemanticModel,
    container: ScopeId,
    /// Value declarations visible so far, for capture analysis:
    /// name -> declared (or literal-inferred) type syntax
    decls: Vec<(Symbol, Option<TypeExpr>)>,
}

impl<'a> Rewriter<'a> {
    fn new(model: &'a mut SemanticModel, container: ScopeId) -> Self {
        Self {
            model,
            container,
            decls: Vec::new(),
        }
    }

    fn seed_param_decls(&mut self) {
        let this = self.model.interner.intern("this");
        if let Some(decl) = self.model.scopes.get(self.container).func_syntax.clone() {
            for param in &decl.params {
                // `Self` would re-resolve inside a lambda class, so a
                // captured `this` needs the enclosing type spelled out.
                let ty = if param.name == this {
                    self.enclosing_type_syntax()
                } else {
                    Some(param.ty.clone())
                };
                self.decls.push((param.name, ty));
            }
        }
    }

    /// Path syntax naming the enclosing type, when it can be written as a
    /// plain dotted path (specialized generic names cannot).
    fn enclosing_type_syntax(&mut self) -> Option<TypeExpr> {
        let type_scope = self.model.scopes.enclosing_type_scope(self.container)?;
        let ty = self.model.scopes.get(type_scope).type_id?;
        if self.model.types.get(ty).is_generic() {
            return None;
        }
        let full = self.model.types.full_name(ty).to_string();
        let path = full
            .split('.')
            .map(|segment| self.model.interner.intern(segment))
            .collect();
        Some(TypeExpr::named(path))
    }

    fn rewrite_block(&mut self, block: &Block) -> CompileResult<Block> {
        let mark = self.decls.len();
        let mut stmts = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            stmts.push(self.rewrite_stmt(stmt)?);
        }
        self.decls.truncate(mark);
        Ok(Block {
            stmts,
            span: block.span,
        })
    }

    fn rewrite_stmt(&mut self, stmt: &Stmt) -> CompileResult<Stmt> {
        Ok(match stmt {
            Stmt::Let(decl) => {
                let init = decl
                    .init
                    .as_ref()
                    .map(|e| self.rewrite_expr(e, false))
                    .transpose()?;
                let ty = decl.ty.clone().or_else(|| {
                    init.as_ref().and_then(|e| literal_type_syntax(self.model, e))
                });
                self.decls.push((decl.name, ty));
                Stmt::Let(Rc::new(LetDecl {
                    name: decl.name,
                    ty: decl.ty.clone(),
                    init,
                    readonly: decl.readonly,
                    span: decl.span,
                }))
            }
            Stmt::Assign {
                target,
                value,
                span,
            } => Stmt::Assign {
                target: self.rewrite_expr(target, false)?,
                value: self.rewrite_expr(value, false)?,
                span: *span,
            },
            Stmt::Expr(e) => Stmt::Expr(self.rewrite_expr(e, false)?),
            Stmt::If {
                cond,
                then_block,
                else_block,
                span,
            } => Stmt::If {
                cond: self.rewrite_expr(cond, false)?,
                then_block: self.rewrite_block(then_block)?,
                else_block: else_block
                    .as_ref()
                    .map(|b| self.rewrite_block(b))
                    .transpose()?,
                span: *span,
            },
            Stmt::While { cond, body, span } => Stmt::While {
                cond: self.rewrite_expr(cond, false)?,
                body: self.rewrite_block(body)?,
                span: *span,
            },
            Stmt::Return { value, span } => Stmt::Return {
                value: value
                    .as_ref()
                    .map(|e| self.rewrite_expr(e, false))
                    .transpose()?,
                span: *span,
            },
            Stmt::Block(b) => Stmt::Block(self.rewrite_block(b)?),
            other => other.clone(),
        })
    }

    fn rewrite_expr(&mut self, expr: &Expr, under_wait: bool) -> CompileResult<Expr> {
        let span = expr.span;
        Ok(match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Identifier(_) => expr.clone(),
            ExprKind::Member { object, member } => Expr::new(
                ExprKind::Member {
                    object: Box::new(self.rewrite_expr(object, false)?),
                    member: *member,
                },
                span,
            ),
            ExprKind::Binary { op, lhs, rhs } => Expr::new(
                ExprKind::Binary {
                    op: *op,
                    lhs: Box::new(self.rewrite_expr(lhs, false)?),
                    rhs: Box::new(self.rewrite_expr(rhs, false)?),
                },
                span,
            ),
            ExprKind::Unary { op, operand } => Expr::new(
                ExprKind::Unary {
                    op: *op,
                    operand: Box::new(self.rewrite_expr(operand, false)?),
                },
                span,
            ),
            ExprKind::Cast { expr: inner, ty } => Expr::new(
                ExprKind::Cast {
                    expr: Box::new(self.rewrite_expr(inner, false)?),
                    ty: ty.clone(),
                },
                span,
            ),
            ExprKind::Call {
                callee,
                args,
                type_args,
            } => {
                let callee = self.rewrite_expr(callee, false)?;
                let args = args
                    .iter()
                    .map(|a| self.rewrite_expr(a, false))
                    .collect::<CompileResult<Vec<_>>>()?;
                if callee_is_async(self.model, self.container, &callee, &mut Vec::new()) {
                    let spawned = Expr::new(
                        ExprKind::AsyncCall {
                            callee: Box::new(callee),
                            args,
                        },
                        span,
                    );
                    if under_wait {
                        // The enclosing `wait` adds the do_wait call.
                        spawned
                    } else {
                        // Implicit wait: the call is used synchronously.
                        self.do_wait_call(spawned)
                    }
                } else {
                    Expr::new(
                        ExprKind::Call {
                            callee: Box::new(callee),
                            args,
                            type_args: type_args.clone(),
                        },
                        span,
                    )
                }
            }
            ExprKind::AsyncCall { callee, args } => Expr::new(
                ExprKind::AsyncCall {
                    callee: callee.clone(),
                    args: args.clone(),
                },
                span,
            ),
            ExprKind::Wait(inner) => {
                let inner = self.rewrite_expr(inner, true)?;
                self.do_wait_call(inner)
            }
            ExprKind::Lambda {
                params,
                return_type,
                body,
            } => self.extract_lambda(params, return_type.as_ref(), body, span)?,
        })
    }

    fn do_wait_call(&mut self, job: Expr) -> Expr {
        let do_wait = self.model.interner.intern("do_wait");
        Expr::call(Expr::member(job, do_wait), Vec::new())
    }

    /// Rewrite a lambda into a construction of a synthesized class whose
    /// `call` method holds the body and whose fields hold the captured
    /// outer locals.
    fn extract_lambda(
        &mut self,
        params: &[Param],
        return_type: Option<&TypeExpr>,
        body: &Block,
        span: Span,
    ) -> CompileResult<Expr> {
        // Free identifiers that name an enclosing local or parameter are
        // the captures, in declaration order.
        let mut bound: FxHashSet<Symbol> = params.iter().map(|p| p.name).collect();
        let mut free = FxHashSet::default();
        collect_free_idents(body, &mut bound.clone(), &mut free);

        let mut captures: Vec<(Symbol, TypeExpr)> = Vec::new();
        for (name, ty) in &self.decls {
            if !free.contains(name) || captures.iter().any(|(n, _)| n == name) {
                continue;
            }
            let Some(ty) = ty else {
                return Err(SemanticError::CannotInferType {
                    name: self.model.name_of(*name).to_string(),
                    span: span.into(),
                }
                .into());
            };
            captures.push((*name, ty.clone()));
        }

        let this = self.model.interner.intern("this");
        let self_field = self.model.interner.intern("__self");
        let call_name = self.model.interner.intern("call");
        let new_name = self.model.interner.intern("new");

        // `this` captured from a method body is stored as `__self`.
        let field_name = |cap: Symbol| if cap == this { self_field } else { cap };

        let fields: Vec<FieldDecl> = captures
            .iter()
            .map(|(name, ty)| FieldDecl {
                name: field_name(*name),
                ty: ty.clone(),
                init: None,
                readonly: false,
                span,
            })
            .collect();

        // new(this, c...) { this.c = c; ... }
        let mut ctor_params = vec![Param {
            name: this,
            ty: TypeExpr::SelfType,
            span,
        }];
        let mut ctor_stmts = Vec::new();
        for (name, ty) in &captures {
            ctor_params.push(Param {
                name: field_name(*name),
                ty: ty.clone(),
                span,
            });
            ctor_stmts.push(Stmt::Assign {
                target: Expr::member(Expr::ident(this), field_name(*name)),
                value: Expr::ident(field_name(*name)),
                span,
            });
        }
        let ctor = Rc::new(FuncDecl {
            name: new_name,
            params: ctor_params,
            return_type: None,
            body: Some(Block::new(ctor_stmts)),
            is_async: false,
            is_native: false,
            span,
        });

        // call(this, params...) { body with captures read off this }
        let mut substitutions: FxHashMap<Symbol, Expr> = FxHashMap::default();
        for (name, _) in &captures {
            substitutions.insert(*name, Expr::member(Expr::ident(this), field_name(*name)));
        }
        bound = params.iter().map(|p| p.name).collect();
        let call_body = substitute_block(body, &substitutions, &mut bound);

        let mut call_params = vec![Param {
            name: this,
            ty: TypeExpr::SelfType,
            span,
        }];
        call_params.extend(params.iter().cloned());
        let call = Rc::new(FuncDecl {
            name: call_name,
            params: call_params,
            return_type: return_type.cloned(),
            body: Some(call_body),
            is_async: false,
            is_native: false,
            span,
        });

        let class_name = self.model.synth_name("__lambda");
        let class_sym = self.model.interner.intern(&class_name);
        let class = Rc::new(ClassDecl {
            name: class_sym,
            type_params: Vec::new(),
            fields,
            methods: vec![ctor, call],
            impls: Vec::new(),
            span,
        });

        let namespace = self
            .model
            .scopes
            .find_ancestor_including_self(self.container, |s| s.kind == ScopeKind::Namespace)
            .expect("container outside any namespace");
        let scope = scoping::declare_class(self.model, namespace, class)?;
        catch_up(self.model, scope, PASS_INTERFACES)?;
        tracing::debug!(class = %self.model.scopes.full_name(scope), "lambda extracted");

        let ctor_args = captures.iter().map(|(name, _)| Expr::ident(*name)).collect();
        Ok(Expr::call(Expr::ident(class_sym), ctor_args))
    }
}

/// A `TypeExpr` for a literal initializer, so un-annotated locals can still
/// be captured by value.
fn literal_type_syntax(model: &mut SemanticModel, init: &Expr) -> Option<TypeExpr> {
    if let ExprKind::Literal(text) = &init.kind
        && let Some(kind) = classify_literal(text)
    {
        let sym = model.interner.intern(kind.name());
        return Some(TypeExpr::simple(sym));
    }
    None
}

// ============================================================================
// Generator lowering
// ============================================================================

fn body_has_yield(block: &Block) -> bool {
    block.stmts.iter().any(stmt_has_yield)
}

fn stmt_has_yield(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Yield { .. } => true,
        Stmt::If {
            then_block,
            else_block,
            ..
        } => {
            body_has_yield(then_block)
                || else_block.as_ref().is_some_and(body_has_yield)
        }
        Stmt::While { body, .. } => body_has_yield(body),
        Stmt::Block(b) => body_has_yield(b),
        _ => false,
    }
}

/// Move a yielding body into a synthesized class implementing
/// `Iterator<T>`; the original function constructs and returns it.
fn lower_generator(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let decl = model
        .scopes
        .get(id)
        .func_syntax
        .clone()
        .ok_or_else(|| SemanticError::CannotInferType {
            name: model.scopes.full_name(id),
            span: model.scopes.get(id).span.into(),
        })?;
    let span = decl.span;
    let elem_ty = decl
        .return_type
        .clone()
        .unwrap_or_else(|| TypeExpr::simple(model.interner.intern("void")));

    let this = model.interner.intern("this");
    let new_name = model.interner.intern("new");
    let next_name = model.interner.intern("next");
    let iterator_name = model.interner.intern("Iterator");

    // Parameters become fields on the state class.
    let state_params: Vec<&Param> = decl
        .params
        .iter()
        .filter(|p| p.name != this)
        .collect();
    let fields: Vec<FieldDecl> = state_params
        .iter()
        .map(|p| FieldDecl {
            name: p.name,
            ty: p.ty.clone(),
            init: None,
            readonly: false,
            span: p.span,
        })
        .collect();

    let mut ctor_params = vec![Param {
        name: this,
        ty: TypeExpr::SelfType,
        span,
    }];
    let mut ctor_stmts = Vec::new();
    for p in &state_params {
        ctor_params.push(Param {
            name: p.name,
            ty: p.ty.clone(),
            span: p.span,
        });
        ctor_stmts.push(Stmt::Assign {
            target: Expr::member(Expr::ident(this), p.name),
            value: Expr::ident(p.name),
            span,
        });
    }
    let ctor = Rc::new(FuncDecl {
        name: new_name,
        params: ctor_params,
        return_type: None,
        body: Some(Block::new(ctor_stmts)),
        is_async: false,
        is_native: false,
        span,
    });

    // next(this) -> T: the original body with yields rewritten to returns
    // and parameters read off `this`.
    let body = model.scopes.get(id).body.clone().expect("generator body");
    let mut substitutions: FxHashMap<Symbol, Expr> = FxHashMap::default();
    for p in &state_params {
        substitutions.insert(p.name, Expr::member(Expr::ident(this), p.name));
    }
    let mut bound = FxHashSet::default();
    let body = substitute_block(&body, &substitutions, &mut bound);
    let next_body = yields_to_returns(&body);

    let next = Rc::new(FuncDecl {
        name: next_name,
        params: vec![Param {
            name: this,
            ty: TypeExpr::SelfType,
            span,
        }],
        return_type: Some(elem_ty.clone()),
        body: Some(next_body),
        is_async: false,
        is_native: false,
        span,
    });

    let class_name = model.synth_name("__generator");
    let class_sym = model.interner.intern(&class_name);
    let class = Rc::new(ClassDecl {
        name: class_sym,
        type_params: Vec::new(),
        fields,
        methods: vec![ctor],
        impls: vec![ImplBlock {
            interface: TypeExpr::generic(iterator_name, vec![elem_ty.clone()]),
            methods: vec![next],
            span,
        }],
        span,
    });

    let namespace = model
        .scopes
        .find_ancestor_including_self(id, |s| s.kind == ScopeKind::Namespace)
        .expect("generator outside any namespace");
    let scope = scoping::declare_class(model, namespace, class)?;
    catch_up(model, scope, PASS_INTERFACES)?;
    tracing::debug!(class = %model.scopes.full_name(scope), "generator lowered");

    // The function itself now just builds the state object.
    let ctor_args = state_params.iter().map(|p| Expr::ident(p.name)).collect();
    let construct = Expr::call(Expr::ident(class_sym), ctor_args);
    model.scopes.get_mut(id).body = Some(Block::new(vec![Stmt::Return {
        value: Some(construct),
        span,
    }]));
    model.scopes.get_mut(id).is_generator = true;
    model.scopes.get_mut(id).async_state = AsyncState::No;

    // Retype the function: it returns the iterator view now.
    let iter_ty_syntax = TypeExpr::generic(iterator_name, vec![elem_ty]);
    let iter_ty = model.resolve_type_required(&iter_ty_syntax, id, span)?;
    super::drain_catchup(model)?;
    model.scopes.get_mut(id).return_type = Some(iter_ty);
    if let Some(symbol) = model.scopes.get(id).func_symbol {
        let param_types = model
            .types
            .get(model.symbols.get(symbol).type_info)
            .fn_params
            .clone();
        let fn_type = model.types.intern_function(param_types, iter_ty, false);
        let data = model.symbols.get_mut(symbol);
        data.type_info = fn_type;
        if let SymbolKind::Function { return_type, .. } = &mut data.kind {
            *return_type = iter_ty;
        }
    }
    Ok(())
}

fn yields_to_returns(block: &Block) -> Block {
    let stmts = block
        .stmts
        .iter()
        .map(|stmt| match stmt {
            Stmt::Yield { value, span } => Stmt::Return {
                value: Some(value.clone()),
                span: *span,
            },
            Stmt::If {
                cond,
                then_block,
                else_block,
                span,
            } => Stmt::If {
                cond: cond.clone(),
                then_block: yields_to_returns(then_block),
                else_block: else_block.as_ref().map(yields_to_returns),
                span: *span,
            },
            Stmt::While { cond, body, span } => Stmt::While {
                cond: cond.clone(),
                body: yields_to_returns(body),
                span: *span,
            },
            Stmt::Block(b) => Stmt::Block(yields_to_returns(b)),
            other => other.clone(),
        })
        .collect();
    Block {
        stmts,
        span: block.span,
    }
}

// ============================================================================
// Identifier utilities
// ============================================================================

/// Collect identifiers read in `block` that are not bound inside it
fn collect_free_idents(block: &Block, bound: &mut FxHashSet<Symbol>, free: &mut FxHashSet<Symbol>) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Let(decl) => {
                if let Some(init) = &decl.init {
                    collect_free_in_expr(init, bound, free);
                }
                bound.insert(decl.name);
            }
            Stmt::Assign { target, value, .. } => {
                collect_free_in_expr(target, bound, free);
                collect_free_in_expr(value, bound, free);
            }
            Stmt::Expr(e) => collect_free_in_expr(e, bound, free),
            Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                collect_free_in_expr(cond, bound, free);
                collect_free_idents(then_block, &mut bound.clone(), free);
                if let Some(b) = else_block {
                    collect_free_idents(b, &mut bound.clone(), free);
                }
            }
            Stmt::While { cond, body, .. } => {
                collect_free_in_expr(cond, bound, free);
                collect_free_idents(body, &mut bound.clone(), free);
            }
            Stmt::Return { value, .. } => {
                if let Some(v) = value {
                    collect_free_in_expr(v, bound, free);
                }
            }
            Stmt::Yield { value, .. } => collect_free_in_expr(value, bound, free),
            Stmt::Block(b) => collect_free_idents(b, &mut bound.clone(), free),
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
    }
}

fn collect_free_in_expr(expr: &Expr, bound: &FxHashSet<Symbol>, free: &mut FxHashSet<Symbol>) {
    match &expr.kind {
        ExprKind::Identifier(sym) => {
            if !bound.contains(sym) {
                free.insert(*sym);
            }
        }
        ExprKind::Member { object, .. } => collect_free_in_expr(object, bound, free),
        ExprKind::Call { callee, args, .. } | ExprKind::AsyncCall { callee, args } => {
            collect_free_in_expr(callee, bound, free);
            for a in args {
                collect_free_in_expr(a, bound, free);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_free_in_expr(lhs, bound, free);
            collect_free_in_expr(rhs, bound, free);
        }
        ExprKind::Unary { operand, .. } => collect_free_in_expr(operand, bound, free),
        ExprKind::Wait(inner) => collect_free_in_expr(inner, bound, free),
        ExprKind::Cast { expr, .. } => collect_free_in_expr(expr, bound, free),
        ExprKind::Lambda { params, body, .. } => {
            let mut inner_bound = bound.clone();
            for p in params {
                inner_bound.insert(p.name);
            }
            collect_free_idents(body, &mut inner_bound, free);
        }
        ExprKind::Literal(_) => {}
    }
}

/// Replace free identifier reads with replacement expressions, respecting
/// shadowing by parameters and lets.
fn substitute_block(
    block: &Block,
    substitutions: &FxHashMap<Symbol, Expr>,
    bound: &mut FxHashSet<Symbol>,
) -> Block {
    let stmts = block
        .stmts
        .iter()
        .map(|stmt| substitute_stmt(stmt, substitutions, bound))
        .collect();
    Block {
        stmts,
        span: block.span,
    }
}

fn substitute_stmt(
    stmt: &Stmt,
    subs: &FxHashMap<Symbol, Expr>,
    bound: &mut FxHashSet<Symbol>,
) -> Stmt {
    match stmt {
        Stmt::Let(decl) => {
            let init = decl.init.as_ref().map(|e| substitute_expr(e, subs, bound));
            bound.insert(decl.name);
            Stmt::Let(Rc::new(LetDecl {
                name: decl.name,
                ty: decl.ty.clone(),
                init,
                readonly: decl.readonly,
                span: decl.span,
            }))
        }
        Stmt::Assign {
            target,
            value,
            span,
        } => Stmt::Assign {
            target: substitute_expr(target, subs, bound),
            value: substitute_expr(value, subs, bound),
            span: *span,
        },
        Stmt::Expr(e) => Stmt::Expr(substitute_expr(e, subs, bound)),
        Stmt::If {
            cond,
            then_block,
            else_block,
            span,
        } => Stmt::If {
            cond: substitute_expr(cond, subs, bound),
            then_block: substitute_block(then_block, subs, &mut bound.clone()),
            else_block: else_block
                .as_ref()
                .map(|b| substitute_block(b, subs, &mut bound.clone())),
            span: *span,
        },
        Stmt::While { cond, body, span } => Stmt::While {
            cond: substitute_expr(cond, subs, bound),
            body: substitute_block(body, subs, &mut bound.clone()),
            span: *span,
        },
        Stmt::Return { value, span } => Stmt::Return {
            value: value.as_ref().map(|e| substitute_expr(e, subs, bound)),
            span: *span,
        },
        Stmt::Yield { value, span } => Stmt::Yield {
            value: substitute_expr(value, subs, bound),
            span: *span,
        },
        Stmt::Block(b) => Stmt::Block(substitute_block(b, subs, &mut bound.clone())),
        other => other.clone(),
    }
}

fn substitute_expr(expr: &Expr, subs: &FxHashMap<Symbol, Expr>, bound: &FxHashSet<Symbol>) -> Expr {
    let span = expr.span;
    match &expr.kind {
        ExprKind::Identifier(sym) => {
            if !bound.contains(sym)
                && let Some(replacement) = subs.get(sym)
            {
                return replacement.clone();
            }
            expr.clone()
        }
        ExprKind::Member { object, member } => Expr::new(
            ExprKind::Member {
                object: Box::new(substitute_expr(object, subs, bound)),
                member: *member,
            },
            span,
        ),
        ExprKind::Call {
            callee,
            args,
            type_args,
        } => Expr::new(
            ExprKind::Call {
                callee: Box::new(substitute_expr(callee, subs, bound)),
                args: args
                    .iter()
                    .map(|a| substitute_expr(a, subs, bound))
                    .collect(),
                type_args: type_args.clone(),
            },
            span,
        ),
        ExprKind::AsyncCall { callee, args } => Expr::new(
            ExprKind::AsyncCall {
                callee: Box::new(substitute_expr(callee, subs, bound)),
                args: args
                    .iter()
                    .map(|a| substitute_expr(a, subs, bound))
                    .collect(),
            },
            span,
        ),
        ExprKind::Binary { op, lhs, rhs } => Expr::new(
            ExprKind::Binary {
                op: *op,
                lhs: Box::new(substitute_expr(lhs, subs, bound)),
                rhs: Box::new(substitute_expr(rhs, subs, bound)),
            },
            span,
        ),
        ExprKind::Unary { op, operand } => Expr::new(
            ExprKind::Unary {
                op: *op,
                operand: Box::new(substitute_expr(operand, subs, bound)),
            },
            span,
        ),
        ExprKind::Wait(inner) => Expr::new(
            ExprKind::Wait(Box::new(substitute_expr(inner, subs, bound))),
            span,
        ),
        ExprKind::Cast { expr: inner, ty } => Expr::new(
            ExprKind::Cast {
                expr: Box::new(substitute_expr(inner, subs, bound)),
                ty: ty.clone(),
            },
            span,
        ),
        ExprKind::Lambda {
            params,
            return_type,
            body,
        } => {
            let mut inner_bound = bound.clone();
            for p in params {
                inner_bound.insert(p.name);
            }
            Expr::new(
                ExprKind::Lambda {
                    params: params.clone(),
                    return_type: return_type.clone(),
                    body: substitute_block(body, subs, &mut inner_bound),
                },
                span,
            )
        }
        ExprKind::Literal(_) => expr.clone(),
    }
}
