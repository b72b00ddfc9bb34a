// src/sema/passes/lower.rs
//
// Pass 7: lower every code container's (rewritten) body to flat
// instructions. Type checking is interleaved with lowering: operator result
// types come from per-category rules, call arguments check against the
// callee's signature with widening casts inserted where the table allows,
// and member chains resolve one hop at a time through fresh temporaries.

use crate::errors::{CompileResult, SemanticError, UnsupportedError};
use crate::frontend::{BinaryOp, Block, Expr, ExprKind, Span, Stmt, Symbol, TypeExpr, UnaryOp};
use crate::sema::ir::{InstKind, Instruction, Label};
use crate::sema::model::{BUILTIN_NAMESPACE, SemanticModel};
use crate::sema::scope::ScopeId;
use crate::sema::symbols::{SymbolId, SymbolKind};
use crate::sema::type_registry::TypeId;
use crate::sema::types::{TypeKind, classify_literal, widens_to};

pub fn process_scope(model: &mut SemanticModel, id: ScopeId) -> CompileResult<()> {
    let scope = model.scopes.get(id);
    if !scope.kind.is_code_container() || scope.is_native {
        return Ok(());
    }
    if super::symbol_elab::in_open_generic(model, id) {
        return Ok(());
    }
    let Some(body) = model.scopes.get(id).body.clone() else {
        return Ok(());
    };

    tracing::trace!(container = %model.scopes.full_name(id), "lowering body");
    let mut lowering = Lowering::new(model, id);
    for stmt in &body.stmts {
        lowering.stmt(stmt)?;
    }
    lowering.flush_labels();
    Ok(())
}

/// One value produced by an expression
type Value = (SymbolId, TypeId);

pub struct Lowering<'a> {
    model: &'a mut SemanticModel,
    container: ScopeId,
    depth: u32,
    loop_stack: Vec<(Label, Label)>,
    pending_labels: Vec<Label>,
}

impl<'a> Lowering<'a> {
    pub fn new(model: &'a mut SemanticModel, container: ScopeId) -> Self {
        Self {
            model,
            container,
            depth: 1,
            loop_stack: Vec::new(),
            pending_labels: Vec::new(),
        }
    }

    fn emit(&mut self, kind: InstKind) {
        let mut inst = Instruction::new(kind);
        inst.labels.extend(self.pending_labels.drain(..));
        self.model.scopes.get_mut(self.container).instructions.push(inst);
    }

    fn mark(&mut self, label: Label) {
        self.pending_labels.push(label);
    }

    /// Labels at the very end of a body need an instruction to land on
    pub fn flush_labels(&mut self) {
        if !self.pending_labels.is_empty() {
            self.emit(InstKind::Nop);
        }
    }

    fn temp(&mut self, ty: TypeId, span: Span) -> SymbolId {
        self.model.alloc_temp(self.container, ty, span)
    }

    fn resolve_type(&mut self, ty: &TypeExpr, span: Span) -> CompileResult<TypeId> {
        let id = self.model.resolve_type_required(ty, self.container, span)?;
        super::drain_catchup(self.model)?;
        Ok(id)
    }

    // ========================================================================
    // Entry points used by constructor synthesis
    // ========================================================================

    /// `this.field = <init>` at the top of a constructor body
    pub fn emit_member_init(
        &mut self,
        field: SymbolId,
        this: SymbolId,
        init: &Expr,
    ) -> CompileResult<()> {
        let field_ty = self.model.symbols.get(field).type_info;
        let (value, value_ty) = self.expr_value(init)?;
        let value = self.coerce(value, value_ty, field_ty, init.span)?;
        self.emit(InstKind::WriteMember {
            member: field,
            value,
            owner: this,
        });
        Ok(())
    }

    /// `<var> = <init>` inside a namespace initializer
    pub fn emit_symbol_init(&mut self, var: SymbolId, init: &Expr) -> CompileResult<()> {
        let var_ty = self.model.symbols.get(var).type_info;
        let (value, value_ty) = self.expr_value(init)?;
        self.store(value, value_ty, var, var_ty, init.span)?;
        Ok(())
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Let(decl) => self.let_stmt(decl),
            Stmt::Assign {
                target,
                value,
                span,
            } => self.assign(target, value, *span),
            Stmt::Expr(e) => {
                self.expr(e, None)?;
                Ok(())
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                span,
            } => self.if_stmt(cond, then_block, else_block.as_ref(), *span),
            Stmt::While { cond, body, span } => self.while_stmt(cond, body, *span),
            Stmt::Break { span } => {
                let Some(&(_, end)) = self.loop_stack.last() else {
                    return Err(SemanticError::BreakOutsideLoop {
                        span: (*span).into(),
                    }
                    .into());
                };
                self.emit(InstKind::Goto {
                    target: end,
                    cond: None,
                    jump_on: false,
                });
                Ok(())
            }
            Stmt::Continue { span } => {
                let Some(&(begin, _)) = self.loop_stack.last() else {
                    return Err(SemanticError::ContinueOutsideLoop {
                        span: (*span).into(),
                    }
                    .into());
                };
                self.emit(InstKind::Goto {
                    target: begin,
                    cond: None,
                    jump_on: false,
                });
                Ok(())
            }
            Stmt::Return { value, span } => self.return_stmt(value.as_ref(), *span),
            // Yields survive only inside lowered generator bodies, where
            // they mean "return the next element".
            Stmt::Yield { value, span } => self.return_stmt(Some(value), *span),
            Stmt::Block(block) => {
                self.depth += 1;
                for stmt in &block.stmts {
                    self.stmt(stmt)?;
                }
                self.depth -= 1;
                Ok(())
            }
        }
    }

    fn let_stmt(&mut self, decl: &crate::frontend::LetDecl) -> CompileResult<()> {
        let name = self.model.name_of(decl.name).to_string();
        let declared = decl
            .ty
            .as_ref()
            .map(|ty| self.resolve_type(ty, decl.span))
            .transpose()?;

        let init = decl
            .init
            .as_ref()
            .map(|e| self.expr_value(e))
            .transpose()?;

        let ty = match (declared, &init) {
            (Some(ty), _) => ty,
            (None, Some((_, init_ty))) => *init_ty,
            (None, None) => {
                return Err(SemanticError::CannotInferType {
                    name,
                    span: decl.span.into(),
                }
                .into());
            }
        };

        let symbol = self.model.declare_symbol(
            self.container,
            &name,
            self.depth,
            ty,
            SymbolKind::Variable {
                is_param: false,
                readonly: decl.readonly,
            },
            decl.span,
        )?;
        if let Some((value, value_ty)) = init {
            self.store(value, value_ty, symbol, ty, decl.span)?;
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, value: &Expr, span: Span) -> CompileResult<()> {
        match &target.kind {
            ExprKind::Identifier(sym) => {
                let name = self.model.name_of(*sym).to_string();
                let Some(symbol) =
                    self.model
                        .resolve_short_symbol(&name, self.container, self.depth)
                else {
                    return Err(SemanticError::UnknownSymbol {
                        name,
                        span: span.into(),
                    }
                    .into());
                };
                let data = self.model.symbols.get(symbol);
                let readonly = match &data.kind {
                    SymbolKind::Variable { readonly, .. } => *readonly,
                    _ => {
                        return Err(
                            SemanticError::InvalidAssignTarget { span: span.into() }.into()
                        );
                    }
                };
                if readonly && self.model.scopes.get(self.container).name != "new" {
                    return Err(SemanticError::AssignToReadonly {
                        name,
                        span: span.into(),
                    }
                    .into());
                }
                let target_ty = data.type_info;
                // An unqualified field write goes through `this`.
                if self.is_instance_field(symbol) {
                    let this = self.this_value(span)?;
                    let (v, vty) = self.expr_value(value)?;
                    let v = self.coerce(v, vty, target_ty, span)?;
                    self.emit(InstKind::WriteMember {
                        member: symbol,
                        value: v,
                        owner: this.0,
                    });
                    return Ok(());
                }
                let (v, vty) = self.expr_value(value)?;
                self.store(v, vty, symbol, target_ty, span)
            }
            ExprKind::Member { object, member } => {
                let member_name = self.model.name_of(*member).to_string();
                let (owner, owner_ty) = self.expr_value(object)?;
                let Some(field) = self.model.find_member(owner_ty, &member_name) else {
                    return Err(SemanticError::UnknownMember {
                        owner: self.model.types.full_name(owner_ty).to_string(),
                        member: member_name,
                        span: span.into(),
                    }
                    .into());
                };
                let data = self.model.symbols.get(field);
                let readonly = match &data.kind {
                    SymbolKind::Variable { readonly, .. } => *readonly,
                    _ => {
                        return Err(
                            SemanticError::InvalidAssignTarget { span: span.into() }.into()
                        );
                    }
                };
                // Readonly fields may only be written by a constructor.
                if readonly && self.model.scopes.get(self.container).name != "new" {
                    return Err(SemanticError::AssignToReadonly {
                        name: member_name,
                        span: span.into(),
                    }
                    .into());
                }
                let field_ty = data.type_info;
                let (v, vty) = self.expr_value(value)?;
                let v = self.coerce(v, vty, field_ty, span)?;
                self.emit(InstKind::WriteMember {
                    member: field,
                    value: v,
                    owner,
                });
                Ok(())
            }
            _ => Err(SemanticError::InvalidAssignTarget { span: span.into() }.into()),
        }
    }

    fn if_stmt(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
        span: Span,
    ) -> CompileResult<()> {
        let cond_val = self.bool_cond(cond, span)?;
        let after_then = self.model.alloc_label(self.container);
        self.emit(InstKind::Goto {
            target: after_then,
            cond: Some(cond_val),
            jump_on: false,
        });

        self.depth += 1;
        for stmt in &then_block.stmts {
            self.stmt(stmt)?;
        }
        self.depth -= 1;

        match else_block {
            Some(else_block) => {
                let end = self.model.alloc_label(self.container);
                self.emit(InstKind::Goto {
                    target: end,
                    cond: None,
                    jump_on: false,
                });
                self.mark(after_then);
                self.depth += 1;
                for stmt in &else_block.stmts {
                    self.stmt(stmt)?;
                }
                self.depth -= 1;
                self.mark(end);
            }
            None => self.mark(after_then),
        }
        // A marked label with no following instruction yet lands on the
        // next one emitted; flush_labels covers the end of the body.
        Ok(())
    }

    fn while_stmt(&mut self, cond: &Expr, body: &Block, span: Span) -> CompileResult<()> {
        let begin = self.model.alloc_label(self.container);
        let end = self.model.alloc_label(self.container);

        self.mark(begin);
        let cond_val = self.bool_cond(cond, span)?;
        self.emit(InstKind::Goto {
            target: end,
            cond: Some(cond_val),
            jump_on: false,
        });

        self.loop_stack.push((begin, end));
        self.depth += 1;
        for stmt in &body.stmts {
            self.stmt(stmt)?;
        }
        self.depth -= 1;
        self.loop_stack.pop();

        self.emit(InstKind::Goto {
            target: begin,
            cond: None,
            jump_on: false,
        });
        self.mark(end);
        Ok(())
    }

    fn bool_cond(&mut self, cond: &Expr, span: Span) -> CompileResult<SymbolId> {
        let (value, ty) = self.expr_value(cond)?;
        if ty != TypeId::BOOL {
            return Err(SemanticError::TypeMismatch {
                expected: "bool".to_string(),
                found: self.model.types.full_name(ty).to_string(),
                span: span.into(),
            }
            .into());
        }
        Ok(value)
    }

    fn return_stmt(&mut self, value: Option<&Expr>, span: Span) -> CompileResult<()> {
        let return_type = self
            .model
            .scopes
            .get(self.container)
            .return_type
            .unwrap_or(TypeId::VOID);
        match value {
            None => {
                if !return_type.is_void() {
                    return Err(SemanticError::TypeMismatch {
                        expected: self.model.types.full_name(return_type).to_string(),
                        found: "void".to_string(),
                        span: span.into(),
                    }
                    .into());
                }
                self.emit(InstKind::Return { value: None });
            }
            Some(expr) => {
                if return_type.is_void() {
                    return Err(SemanticError::TypeMismatch {
                        expected: "void".to_string(),
                        found: "a value".to_string(),
                        span: span.into(),
                    }
                    .into());
                }
                let (v, vty) = self.expr_value(expr)?;
                let v = self.coerce(v, vty, return_type, span)?;
                self.emit(InstKind::Return { value: Some(v) });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Lower an expression; `None` means it produced no value (void call)
    fn expr(&mut self, expr: &Expr, target: Option<SymbolId>) -> CompileResult<Option<Value>> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(text) => {
                let Some(kind) = classify_literal(text) else {
                    return Err(SemanticError::UnknownLiteral {
                        text: text.clone(),
                        span: span.into(),
                    }
                    .into());
                };
                let ty = self
                    .model
                    .types
                    .builtin_by_name(kind.name())
                    .expect("literal kinds are builtin");
                let dst = target.unwrap_or_else(|| self.temp(ty, span));
                self.emit(InstKind::AssignLiteral {
                    dst,
                    ty,
                    text: text.clone(),
                });
                Ok(Some((dst, ty)))
            }
            ExprKind::Identifier(sym) => {
                let name = self.model.name_of(*sym).to_string();
                let Some(symbol) =
                    self.model
                        .resolve_short_symbol(&name, self.container, self.depth)
                else {
                    return Err(SemanticError::UnknownSymbol {
                        name,
                        span: span.into(),
                    }
                    .into());
                };
                self.symbol_value(symbol, target, span)
            }
            ExprKind::Member { object, member } => {
                // A chain of plain identifiers may name a namespace member
                // or enum constant; locals shadow namespaces.
                if let Some(symbol) = self.resolve_static_chain(object, *member) {
                    return self.symbol_value(symbol, target, span);
                }
                let member_name = self.model.name_of(*member).to_string();
                let (owner, owner_ty) = self.expr_value(object)?;
                let Some(found) = self.model.find_member(owner_ty, &member_name) else {
                    return Err(SemanticError::UnknownMember {
                        owner: self.model.types.full_name(owner_ty).to_string(),
                        member: member_name,
                        span: span.into(),
                    }
                    .into());
                };
                let ty = self.model.symbols.get(found).type_info;
                if self.model.symbols.get(found).kind.is_variable() {
                    let dst = target.unwrap_or_else(|| self.temp(ty, span));
                    self.emit(InstKind::ReadMember {
                        member: found,
                        owner,
                        dst,
                    });
                    Ok(Some((dst, ty)))
                } else {
                    // A bound method read only makes sense in call
                    // position, which never reaches here.
                    Err(SemanticError::UnknownMember {
                        owner: self.model.types.full_name(owner_ty).to_string(),
                        member: member_name,
                        span: span.into(),
                    }
                    .into())
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, target, span),
            ExprKind::Unary { op, operand } => self.unary(*op, operand, target, span),
            ExprKind::Call {
                callee,
                args,
                type_args,
            } => self.call(callee, args, type_args, target, span, false),
            ExprKind::AsyncCall { callee, args } => {
                self.call(callee, args, &[], target, span, true)
            }
            // Waits are rewritten away; anything left just evaluates its
            // operand.
            ExprKind::Wait(inner) => self.expr(inner, target),
            ExprKind::Lambda { .. } => {
                Err(UnsupportedError::LambdaPosition { span: span.into() }.into())
            }
            ExprKind::Cast { expr: inner, ty } => {
                let (v, vty) = self.expr_value(inner)?;
                let to = self.resolve_type(ty, span)?;
                let from_kind = self.model.types.kind(vty);
                let to_kind = self.model.types.kind(to);
                let allowed = vty == to
                    || (from_kind.is_numeric() && to_kind.is_numeric())
                    || widens_to(from_kind, to_kind);
                if !allowed {
                    return Err(UnsupportedError::UnsupportedCast {
                        from: self.model.types.full_name(vty).to_string(),
                        to: self.model.types.full_name(to).to_string(),
                        span: span.into(),
                    }
                    .into());
                }
                let dst = target.unwrap_or_else(|| self.temp(to, span));
                self.emit(InstKind::Cast {
                    operand: v,
                    ty: to,
                    dst,
                });
                Ok(Some((dst, to)))
            }
        }
    }

    /// Lower an expression that must produce a value
    fn expr_value(&mut self, expr: &Expr) -> CompileResult<Value> {
        match self.expr(expr, None)? {
            Some(value) => Ok(value),
            None => Err(SemanticError::VoidValueUsed {
                span: expr.span.into(),
            }
            .into()),
        }
    }

    /// Materialize a resolved symbol as a value
    fn symbol_value(
        &mut self,
        symbol: SymbolId,
        target: Option<SymbolId>,
        span: Span,
    ) -> CompileResult<Option<Value>> {
        let ty = self.model.symbols.get(symbol).type_info;
        if matches!(
            self.model.symbols.get(symbol).kind,
            SymbolKind::EnumMember { .. }
        ) {
            let dst = target.unwrap_or_else(|| self.temp(ty, span));
            self.emit(InstKind::ReadEnum {
                member: symbol,
                dst,
            });
            return Ok(Some((dst, ty)));
        }
        if matches!(
            self.model.symbols.get(symbol).kind,
            SymbolKind::TypeAlias { .. }
        ) {
            return Err(SemanticError::UnknownSymbol {
                name: self.model.symbols.get(symbol).origin_name.clone(),
                span: span.into(),
            }
            .into());
        }
        // A field named without qualification reads through `this`.
        if self.is_instance_field(symbol) {
            let this = self.this_value(span)?;
            let dst = target.unwrap_or_else(|| self.temp(ty, span));
            self.emit(InstKind::ReadMember {
                member: symbol,
                owner: this.0,
                dst,
            });
            return Ok(Some((dst, ty)));
        }
        if let Some(dst) = target {
            if dst != symbol {
                self.emit(InstKind::Assign { src: symbol, dst });
            }
            Ok(Some((dst, ty)))
        } else {
            Ok(Some((symbol, ty)))
        }
    }

    /// Is this a member variable of a class/enum/interface (as opposed to a
    /// local, parameter, or namespace variable)?
    fn is_instance_field(&self, symbol: SymbolId) -> bool {
        let data = self.model.symbols.get(symbol);
        data.kind.is_variable()
            && self.model.scopes.get(data.parent).kind.is_type_scope()
    }

    fn this_value(&mut self, span: Span) -> CompileResult<Value> {
        let this = self
            .model
            .resolve_short_symbol("this", self.container, self.depth)
            .ok_or_else(|| SemanticError::UnknownSymbol {
                name: "this".to_string(),
                span: span.into(),
            })?;
        let ty = self.model.symbols.get(this).type_info;
        Ok((this, ty))
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        target: Option<SymbolId>,
        span: Span,
    ) -> CompileResult<Option<Value>> {
        let (l, lt) = self.expr_value(lhs)?;
        let (r, rt) = self.expr_value(rhs)?;

        let (l, r, result_ty) = if op.is_arithmetic() || op.is_comparison() {
            let common = self.common_operand_type(lt, rt, span)?;
            let l = self.coerce(l, lt, common, span)?;
            let r = self.coerce(r, rt, common, span)?;
            let result = if op.is_comparison() { TypeId::BOOL } else { common };
            (l, r, result)
        } else if op.is_logical() {
            for ty in [lt, rt] {
                if ty != TypeId::BOOL {
                    return Err(SemanticError::LogicalOperandNotBool {
                        found: self.model.types.full_name(ty).to_string(),
                        span: span.into(),
                    }
                    .into());
                }
            }
            (l, r, TypeId::BOOL)
        } else if op.is_shift() {
            for ty in [lt, rt] {
                if !self.model.types.kind(ty).is_integer() {
                    return Err(SemanticError::ShiftOperandNotInteger {
                        found: self.model.types.full_name(ty).to_string(),
                        span: span.into(),
                    }
                    .into());
                }
            }
            // The left operand's type carries through a shift.
            (l, r, lt)
        } else {
            // Identity comparison works on anything.
            (l, r, TypeId::BOOL)
        };

        let dst = target.unwrap_or_else(|| self.temp(result_ty, span));
        self.emit(InstKind::Binary { op, lhs: l, rhs: r, dst });
        Ok(Some((dst, result_ty)))
    }

    /// Most-widening-compatible common type for arithmetic and comparison
    /// operands; class-like operands are rejected outright.
    fn common_operand_type(&self, lt: TypeId, rt: TypeId, span: Span) -> CompileResult<TypeId> {
        for ty in [lt, rt] {
            if !self.model.types.kind(ty).is_builtin() {
                return Err(SemanticError::ArithmeticOnClass {
                    found: self.model.types.full_name(ty).to_string(),
                    span: span.into(),
                }
                .into());
            }
        }
        if lt == rt {
            return Ok(lt);
        }
        if self.model.types.can_implicitly_cast(lt, rt) {
            return Ok(rt);
        }
        if self.model.types.can_implicitly_cast(rt, lt) {
            return Ok(lt);
        }
        Err(SemanticError::NoCommonType {
            left: self.model.types.full_name(lt).to_string(),
            right: self.model.types.full_name(rt).to_string(),
            span: span.into(),
        }
        .into())
    }

    fn unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        target: Option<SymbolId>,
        span: Span,
    ) -> CompileResult<Option<Value>> {
        let (v, vt) = self.expr_value(operand)?;
        match op {
            UnaryOp::Neg => {
                if !self.model.types.kind(vt).is_numeric() {
                    return Err(SemanticError::TypeMismatch {
                        expected: "a numeric operand".to_string(),
                        found: self.model.types.full_name(vt).to_string(),
                        span: span.into(),
                    }
                    .into());
                }
            }
            UnaryOp::Not => {
                if vt != TypeId::BOOL {
                    return Err(SemanticError::TypeMismatch {
                        expected: "bool".to_string(),
                        found: self.model.types.full_name(vt).to_string(),
                        span: span.into(),
                    }
                    .into());
                }
            }
        }
        let dst = target.unwrap_or_else(|| self.temp(vt, span));
        self.emit(InstKind::Unary { op, operand: v, dst });
        Ok(Some((dst, vt)))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        type_args: &[TypeExpr],
        target: Option<SymbolId>,
        span: Span,
        spawn: bool,
    ) -> CompileResult<Option<Value>> {
        // Constructor call: the callee names a type.
        if let Some(class_ty) = self.try_resolve_constructor(callee, type_args, span)? {
            return self.construct(class_ty, args, target, span).map(Some);
        }

        let (func, owner) = self.resolve_callee(callee, span)?;

        if matches!(
            self.model.symbols.get(func).kind,
            SymbolKind::EnumMember { .. }
        ) {
            return self.construct_enum_value(func, args, target, span).map(Some);
        }

        let fn_type_id = self.model.symbols.get(func).type_info;
        if self.model.types.kind(fn_type_id) != TypeKind::Function {
            return Err(SemanticError::NotCallable {
                found: self.model.symbols.get(func).origin_name.clone(),
                span: span.into(),
            }
            .into());
        }
        let fn_type = self.model.types.get(fn_type_id);
        let expected: Vec<TypeId> = fn_type.fn_params.to_vec();
        let return_type = fn_type.fn_return.unwrap_or(TypeId::VOID);

        // Instance calls pass the receiver as the leading argument.
        let mut provided: Vec<SymbolId> = Vec::with_capacity(args.len() + 1);
        let mut provided_types: Vec<TypeId> = Vec::with_capacity(args.len() + 1);
        if let Some((owner_sym, owner_ty)) = owner {
            provided.push(owner_sym);
            provided_types.push(owner_ty);
        }
        for arg in args {
            let (v, vt) = self.expr_value(arg)?;
            provided.push(v);
            provided_types.push(vt);
        }

        if provided.len() != expected.len() {
            return Err(SemanticError::WrongArgumentCount {
                expected: expected.len(),
                found: provided.len(),
                span: span.into(),
            }
            .into());
        }
        for index in 0..provided.len() {
            provided[index] =
                self.coerce(provided[index], provided_types[index], expected[index], span)?;
        }

        if spawn {
            // The call produces a scheduler job; waiting on it happens
            // through Job::do_wait.
            let job_ty = self.job_type(return_type, span)?;
            let dst = target.unwrap_or_else(|| self.temp(job_ty, span));
            self.emit(InstKind::Call {
                func,
                args: provided,
                dst: Some(dst),
            });
            return Ok(Some((dst, job_ty)));
        }

        let dst = if return_type.is_void() {
            None
        } else {
            Some(target.unwrap_or_else(|| self.temp(return_type, span)))
        };
        self.emit(InstKind::Call {
            func,
            args: provided,
            dst,
        });
        Ok(dst.map(|d| (d, return_type)))
    }

    /// `Job<T>` for an async call returning `T`
    fn job_type(&mut self, return_type: TypeId, span: Span) -> CompileResult<TypeId> {
        let base = self
            .model
            .types
            .by_full_name(&format!("{BUILTIN_NAMESPACE}.Job<?>"))
            .expect("builtin Job class");
        let job = self
            .model
            .resolve_or_create_specialized_type(base, &[return_type], span)?;
        super::drain_catchup(self.model)?;
        Ok(job)
    }

    /// Does the callee name a class? Type arguments specialize it first.
    fn try_resolve_constructor(
        &mut self,
        callee: &Expr,
        type_args: &[TypeExpr],
        span: Span,
    ) -> CompileResult<Option<TypeId>> {
        let Some(path) = static_path(callee) else {
            return Ok(None);
        };
        // A local value wins over a type of the same name.
        let first = self.model.name_of(path[0]).to_string();
        if self
            .model
            .resolve_short_symbol(&first, self.container, self.depth)
            .is_some()
        {
            return Ok(None);
        }
        let ty_expr = TypeExpr::Named {
            path,
            args: type_args.to_vec(),
            open: false,
        };
        let resolved = self.model.resolve_type_expr(&ty_expr, self.container, span)?;
        super::drain_catchup(self.model)?;
        match resolved {
            Some(ty) if self.model.types.kind(ty) == TypeKind::Class => {
                if self.model.types.get(ty).is_open_generic() {
                    return Err(UnsupportedError::OpenGenericUse {
                        name: self.model.types.full_name(ty).to_string(),
                        span: span.into(),
                    }
                    .into());
                }
                Ok(Some(ty))
            }
            _ => Ok(None),
        }
    }

    /// NewInstance plus a constructor call
    fn construct(
        &mut self,
        class_ty: TypeId,
        args: &[Expr],
        target: Option<SymbolId>,
        span: Span,
    ) -> CompileResult<Value> {
        let scope = self
            .model
            .types
            .get(class_ty)
            .scope
            .expect("class type scope");
        let ctor = self
            .model
            .scopes
            .get(scope)
            .constructor
            .expect("constructor resolved before lowering");

        let dst = target.unwrap_or_else(|| self.temp(class_ty, span));
        self.emit(InstKind::NewInstance { dst });

        let expected: Vec<TypeId> = self
            .model
            .types
            .get(self.model.symbols.get(ctor).type_info)
            .fn_params
            .to_vec();
        let mut provided = vec![dst];
        let mut provided_types = vec![class_ty];
        for arg in args {
            let (v, vt) = self.expr_value(arg)?;
            provided.push(v);
            provided_types.push(vt);
        }
        if provided.len() != expected.len() {
            return Err(SemanticError::WrongArgumentCount {
                expected: expected.len().saturating_sub(1),
                found: provided.len() - 1,
                span: span.into(),
            }
            .into());
        }
        for index in 1..provided.len() {
            provided[index] =
                self.coerce(provided[index], provided_types[index], expected[index], span)?;
        }
        self.emit(InstKind::Call {
            func: ctor,
            args: provided,
            dst: None,
        });
        Ok((dst, class_ty))
    }

    /// Enum variant construction: load the constant, then store the payload
    fn construct_enum_value(
        &mut self,
        member: SymbolId,
        args: &[Expr],
        target: Option<SymbolId>,
        span: Span,
    ) -> CompileResult<Value> {
        let enum_ty = self.model.symbols.get(member).type_info;
        let parent = self.model.symbols.get(member).parent;
        let name = self.model.symbols.get(member).origin_name.clone();

        // The variant's constructor function carries the payload signature.
        let ctor = self
            .model
            .symbols
            .in_scope(parent)
            .iter()
            .copied()
            .find(|&s| {
                self.model.symbols.get(s).origin_name == name
                    && self.model.symbols.get(s).kind.is_function()
            })
            .expect("enum variant constructor");
        let expected: Vec<TypeId> = self
            .model
            .types
            .get(self.model.symbols.get(ctor).type_info)
            .fn_params
            .to_vec();
        if args.len() != expected.len() {
            return Err(SemanticError::WrongArgumentCount {
                expected: expected.len(),
                found: args.len(),
                span: span.into(),
            }
            .into());
        }

        let dst = target.unwrap_or_else(|| self.temp(enum_ty, span));
        self.emit(InstKind::ReadEnum { member, dst });
        if let Some(arg) = args.first() {
            let (v, vt) = self.expr_value(arg)?;
            let v = self.coerce(v, vt, expected[0], span)?;
            self.emit(InstKind::WriteEnum {
                value: v,
                target: dst,
            });
        }
        Ok((dst, enum_ty))
    }

    /// Resolve a call target to a function symbol, plus the receiver value
    /// for instance-method calls.
    fn resolve_callee(
        &mut self,
        callee: &Expr,
        span: Span,
    ) -> CompileResult<(SymbolId, Option<Value>)> {
        match &callee.kind {
            ExprKind::Identifier(sym) => {
                let name = self.model.name_of(*sym).to_string();
                let Some(symbol) =
                    self.model
                        .resolve_short_symbol(&name, self.container, self.depth)
                else {
                    return Err(SemanticError::UnknownSymbol {
                        name,
                        span: span.into(),
                    }
                    .into());
                };
                match &self.model.symbols.get(symbol).kind {
                    SymbolKind::Function { is_static, .. } => {
                        if *is_static {
                            Ok((symbol, None))
                        } else {
                            // Unqualified instance-method call: the
                            // receiver is the enclosing `this`.
                            let this = self
                                .model
                                .resolve_short_symbol("this", self.container, self.depth)
                                .ok_or_else(|| SemanticError::UnknownSymbol {
                                    name: "this".to_string(),
                                    span: span.into(),
                                })?;
                            let this_ty = self.model.symbols.get(this).type_info;
                            Ok((symbol, Some((this, this_ty))))
                        }
                    }
                    SymbolKind::EnumMember { .. } => Ok((symbol, None)),
                    SymbolKind::Variable { .. } => {
                        let ty = self.model.symbols.get(symbol).type_info;
                        match self.model.types.kind(ty) {
                            // A function-typed variable is called through
                            // its value.
                            TypeKind::Function => Ok((symbol, None)),
                            // A callable object dispatches to its `call`
                            // method; this is what lambdas compile to.
                            TypeKind::Class => {
                                let Some(call) = self.model.find_member(ty, "call") else {
                                    return Err(SemanticError::NotCallable {
                                        found: name,
                                        span: span.into(),
                                    }
                                    .into());
                                };
                                Ok((call, Some((symbol, ty))))
                            }
                            _ => Err(SemanticError::NotCallable {
                                found: name,
                                span: span.into(),
                            }
                            .into()),
                        }
                    }
                    SymbolKind::TypeAlias { .. } => Err(SemanticError::NotCallable {
                        found: name,
                        span: span.into(),
                    }
                    .into()),
                }
            }
            ExprKind::Member { object, member } => {
                if let Some(symbol) = self.resolve_static_chain(object, *member) {
                    return Ok((symbol, None));
                }
                let member_name = self.model.name_of(*member).to_string();
                let (owner, owner_ty) = self.expr_value(object)?;
                let Some(found) = self.model.find_member(owner_ty, &member_name) else {
                    return Err(SemanticError::UnknownMember {
                        owner: self.model.types.full_name(owner_ty).to_string(),
                        member: member_name,
                        span: span.into(),
                    }
                    .into());
                };
                match &self.model.symbols.get(found).kind {
                    SymbolKind::Function { is_static, .. } => {
                        if *is_static {
                            Ok((found, None))
                        } else {
                            Ok((found, Some((owner, owner_ty))))
                        }
                    }
                    _ => Err(SemanticError::NotCallable {
                        found: member_name,
                        span: span.into(),
                    }
                    .into()),
                }
            }
            _ => Err(SemanticError::NotCallable {
                found: "expression".to_string(),
                span: span.into(),
            }
            .into()),
        }
    }

    /// Try `object.member` as a namespace-qualified symbol (enum constant,
    /// namespace variable or function). Locals shadow namespaces.
    fn resolve_static_chain(&self, object: &Expr, member: Symbol) -> Option<SymbolId> {
        let mut path = static_path(object)?;
        path.push(member);
        let first = self.model.name_of(path[0]).to_string();
        if let Some(local) = self
            .model
            .resolve_short_symbol(&first, self.container, self.depth)
            && self.model.symbols.get(local).kind.is_variable()
        {
            return None;
        }
        let segments: Vec<String> = path
            .iter()
            .map(|s| self.model.name_of(*s).to_string())
            .collect();
        let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.model.resolve_symbol(&refs, self.container, self.depth)
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Make `value` usable where `to` is expected: identity, a widening
    /// cast through a fresh temp, or an interface upcast (free at the
    /// instruction level).
    fn coerce(
        &mut self,
        value: SymbolId,
        from: TypeId,
        to: TypeId,
        span: Span,
    ) -> CompileResult<SymbolId> {
        if from == to {
            return Ok(value);
        }
        if !self.model.is_assignable(from, to) {
            return Err(SemanticError::TypeMismatch {
                expected: self.model.types.full_name(to).to_string(),
                found: self.model.types.full_name(from).to_string(),
                span: span.into(),
            }
            .into());
        }
        if widens_to(self.model.types.kind(from), self.model.types.kind(to)) {
            self.warn_sign_reinterpret(from, to, span);
            let dst = self.temp(to, span);
            self.emit(InstKind::Cast {
                operand: value,
                ty: to,
                dst,
            });
            return Ok(dst);
        }
        Ok(value)
    }

    /// The widening table allows u8 -> i8, which flips the sign bit's
    /// meaning; surface that as a warning wherever it actually fires.
    fn warn_sign_reinterpret(&mut self, from: TypeId, to: TypeId, span: Span) {
        if from == TypeId::U8 && to == TypeId::I8 {
            self.model
                .reporter
                .warning("u8 value reinterpreted as i8; values above 127 change sign", span);
        }
    }

    /// Store a value into `dst`, widening on the way when needed
    fn store(
        &mut self,
        src: SymbolId,
        src_ty: TypeId,
        dst: SymbolId,
        dst_ty: TypeId,
        span: Span,
    ) -> CompileResult<()> {
        if !self.model.is_assignable(src_ty, dst_ty) {
            return Err(SemanticError::TypeMismatch {
                expected: self.model.types.full_name(dst_ty).to_string(),
                found: self.model.types.full_name(src_ty).to_string(),
                span: span.into(),
            }
            .into());
        }
        if src_ty != dst_ty && widens_to(self.model.types.kind(src_ty), self.model.types.kind(dst_ty))
        {
            self.warn_sign_reinterpret(src_ty, dst_ty, span);
            self.emit(InstKind::Cast {
                operand: src,
                ty: dst_ty,
                dst,
            });
        } else {
            self.emit(InstKind::Assign { src, dst });
        }
        Ok(())
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
