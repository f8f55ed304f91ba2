//! Lowers the AST into an LLVM module and serializes it to bitcode.
//!
//! This is done with the [`Codegen`] struct. The process for using it:
//! 1. Obtain a parsed [`Program`] and its function table.
//! 2. Use [`Codegen::compile`] on the program; this also verifies the module.
//! 3. Write the module out with [`Codegen::to_bc`].
//!
//! The emitter walks each function twice over its lexical structure: a stack
//! of type scopes (borrowed from the AST) answers "what is this name's
//! semantic type", and a parallel stack of register scopes answers "which
//! stack slot holds it". Both stacks push and pop in lockstep with the
//! lexical scopes the parser recorded.

use std::collections::HashMap;
use std::iter;
use std::path::Path;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicMetadataTypeEnum, BasicTypeEnum};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValueEnum, FunctionValue, IntValue, PointerValue,
};
use inkwell::{FloatPredicate, IntPredicate, OptimizationLevel};

use crate::ast::{
    ArithExpr, ArithOp, AssignStmt, CallExpr, CmpOp, Condition, Expr, ForStmt, FuncDecl,
    FuncTable, IfStmt, IndexExpr, Literal, Program, RetStmt, ScopeMap, Stmt, Ty, WhileStmt,
};
use crate::err::MinicErr;

/// Errors that occur during lowering to LLVM.
#[derive(Debug, PartialEq, Eq)]
pub enum CodegenErr {
    /// Variable was not declared.
    UndefinedVar(String),
    /// Function was not declared.
    UndefinedFun(String),
    /// A scalar slot was indexed.
    NotAnArray(String),
    /// The module failed LLVM verification.
    InvalidModule(String),
}

/// A [`Result`] type for operations in lowering to LLVM.
pub type CodegenResult<T> = Result<T, CodegenErr>;

impl MinicErr for CodegenErr {
    fn err_name(&self) -> &'static str {
        match self {
            CodegenErr::UndefinedVar(_) | CodegenErr::UndefinedFun(_) => "name error",
            CodegenErr::NotAnArray(_) => "type error",
            CodegenErr::InvalidModule(_) => "llvm error",
        }
    }
}

impl std::fmt::Display for CodegenErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodegenErr::UndefinedVar(name) => write!(f, "could not find variable '{name}'"),
            CodegenErr::UndefinedFun(name) => write!(f, "could not find function '{name}'"),
            CodegenErr::NotAnArray(name) => write!(f, "'{name}' is not an array"),
            CodegenErr::InvalidModule(msg) => write!(f, "{msg}"),
        }
    }
}
impl std::error::Error for CodegenErr {}

/// A named variable's stack slot: the alloca pointer and its pointee layout.
///
/// The layout travels with the pointer because loads and `getelementptr`
/// both need the pointee type spelled out under opaque pointers.
#[derive(Clone, Copy)]
struct Slot<'ctx> {
    ptr: PointerValue<'ctx>,
    layout: BasicTypeEnum<'ctx>,
}

/// This struct converts the AST to LLVM IR.
pub struct Codegen<'ctx, 'a> {
    ctx: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,

    funcs: &'a FuncTable,
    /// Semantic types per name, borrowed from the AST's scope maps.
    ty_scopes: Vec<&'a ScopeMap>,
    /// Stack slots per name, owned here.
    reg_scopes: Vec<HashMap<String, Slot<'ctx>>>,
    /// Per-function counter that keeps loop block labels unambiguous.
    loops: usize,
}

impl<'ctx, 'a> Codegen<'ctx, 'a> {
    /// Create a new code generator, using a [`Context`] from inkwell.
    pub fn new(ctx: &'ctx Context, module_name: &str, funcs: &'a FuncTable) -> Self {
        Self {
            ctx,
            module: ctx.create_module(module_name),
            builder: ctx.create_builder(),
            funcs,
            ty_scopes: vec![],
            reg_scopes: vec![],
            loops: 0,
        }
    }

    /// The module being built.
    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    /// Writes LLVM bitcode for the current module into the provided file path.
    pub fn to_bc(&self, p: impl AsRef<Path>) -> bool {
        self.module.write_bitcode_to_path(p.as_ref())
    }

    /// Executes a compiled function as main (via JIT), and returns the error
    /// code.
    ///
    /// # Safety
    /// This is unsafe as it is a call to LLVM (not Rust).
    pub unsafe fn jit_run(&self, name: &str) -> CodegenResult<i32> {
        let fun = self
            .module
            .get_function(name)
            .ok_or_else(|| CodegenErr::UndefinedFun(name.to_string()))?;
        let jit = self
            .module
            .create_jit_execution_engine(OptimizationLevel::None)
            .map_err(|e| CodegenErr::InvalidModule(e.to_string()))?;

        Ok(unsafe { jit.run_function_as_main(fun, &[]) })
    }

    /// Lower the whole program into the module, then verify the module.
    ///
    /// Both print built-ins are declared as externals up front, and every
    /// source function is declared before any body is emitted so that calls
    /// resolve regardless of definition order.
    pub fn compile(&mut self, program: &'a Program) -> CodegenResult<()> {
        let void = self.ctx.void_type();
        self.module.add_function(
            "printVarInt",
            void.fn_type(&[self.ctx.i32_type().into()], false),
            Some(Linkage::External),
        );
        self.module.add_function(
            "printVarFloat",
            void.fn_type(&[self.ctx.f32_type().into()], false),
            Some(Linkage::External),
        );

        for func in &program.funcs {
            self.declare_func(func);
        }
        for func in &program.funcs {
            self.compile_func(func)?;
        }

        self.module
            .verify()
            .map_err(|e| CodegenErr::InvalidModule(e.to_string()))
    }

    /// The LLVM layout of a scalar type.
    fn scalar_layout(&self, ty: Ty) -> BasicTypeEnum<'ctx> {
        match ty {
            Ty::Float => self.ctx.f32_type().into(),
            _ => self.ctx.i32_type().into(),
        }
    }

    fn declare_func(&mut self, func: &FuncDecl) -> FunctionValue<'ctx> {
        let param_tys: Vec<BasicMetadataTypeEnum> = func
            .params
            .iter()
            .map(|p| self.scalar_layout(p.ty).into())
            .collect();

        let fn_ty = match func.ret {
            Ty::Void => self.ctx.void_type().fn_type(&param_tys, false),
            Ty::Float => self.ctx.f32_type().fn_type(&param_tys, false),
            _ => self.ctx.i32_type().fn_type(&param_tys, false),
        };

        let fun = self.module.add_function(&func.name, fn_ty, None);
        for (param, arg) in iter::zip(&func.params, fun.get_param_iter()) {
            match arg {
                BasicValueEnum::IntValue(v) => v.set_name(&param.name),
                BasicValueEnum::FloatValue(v) => v.set_name(&param.name),
                _ => {}
            }
        }
        fun
    }

    /// Record a slot in the innermost register scope.
    fn record(&mut self, name: &str, slot: Slot<'ctx>) {
        self.reg_scopes
            .last_mut()
            .expect("inside a function scope")
            .insert(name.to_string(), slot);
    }

    /// Look a name's semantic type up through the live type scopes.
    fn var_ty(&self, name: &str) -> CodegenResult<Ty> {
        self.ty_scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name).copied())
            .ok_or_else(|| CodegenErr::UndefinedVar(name.to_string()))
    }

    /// Look a name's stack slot up through the live register scopes.
    fn slot(&self, name: &str) -> CodegenResult<Slot<'ctx>> {
        self.reg_scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name).copied())
            .ok_or_else(|| CodegenErr::UndefinedVar(name.to_string()))
    }

    /// Run `f` with a fresh scope pair pushed; both stacks pop on every exit
    /// path.
    fn in_scope<T>(
        &mut self,
        tys: &'a ScopeMap,
        f: impl FnOnce(&mut Self) -> CodegenResult<T>,
    ) -> CodegenResult<T> {
        self.ty_scopes.push(tys);
        self.reg_scopes.push(HashMap::new());
        let result = f(self);
        self.reg_scopes.pop();
        self.ty_scopes.pop();
        result
    }

    /// Whether the block currently being built already has a terminator.
    fn block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .and_then(|b| b.get_terminator())
            .is_some()
    }

    fn compile_func(&mut self, func: &'a FuncDecl) -> CodegenResult<()> {
        let fun = self
            .module
            .get_function(&func.name)
            .ok_or_else(|| CodegenErr::UndefinedFun(func.name.clone()))?;

        self.loops = 0;
        let entry = self.ctx.append_basic_block(fun, "entry");
        self.builder.position_at_end(entry);

        self.in_scope(&func.locals, |c| {
            // materialize arguments into stack slots
            for (param, arg) in iter::zip(&func.params, fun.get_param_iter()) {
                let layout = c.scalar_layout(param.ty);
                let ptr = c.builder.build_alloca(layout, &param.name);
                c.builder.build_store(ptr, arg);
                c.record(&param.name, Slot { ptr, layout });
            }

            c.compile_stmts(&func.body, fun, func.ret)?;

            // a body that falls off the end still needs a terminator
            if !c.block_terminated() {
                match func.ret {
                    Ty::Void => c.builder.build_return(None),
                    _ => c.builder.build_unreachable(),
                };
            }
            Ok(())
        })
    }

    /// Lower a statement list; emission stops once the current block gains a
    /// terminator (e.g. after a `return`).
    fn compile_stmts(
        &mut self,
        stmts: &'a [Stmt],
        fun: FunctionValue<'ctx>,
        ret: Ty,
    ) -> CodegenResult<()> {
        for stmt in stmts {
            self.compile_stmt(stmt, fun, ret)?;
            if self.block_terminated() {
                break;
            }
        }
        Ok(())
    }

    fn compile_stmt(
        &mut self,
        stmt: &'a Stmt,
        fun: FunctionValue<'ctx>,
        ret: Ty,
    ) -> CodegenResult<()> {
        match stmt {
            Stmt::Assign(a) => self.compile_assign(a),
            Stmt::Return(r) => self.compile_return(r, ret),
            Stmt::Call(c) => self.compile_call(&c.call).map(drop),
            Stmt::If(i) => self.compile_if(i, fun, ret),
            Stmt::For(l) => self.compile_for(l, fun, ret),
            Stmt::While(w) => self.compile_while(w, fun, ret),
        }
    }

    /// Lower an assignment. A name without a live slot is a declaration and
    /// allocates one; array declarations allocate `[N × T]` and store each
    /// initializer element through `getelementptr`.
    fn compile_assign(&mut self, assn: &'a AssignStmt) -> CodegenResult<()> {
        match &assn.target {
            Expr::Ident(name) => {
                if let Expr::Array(arr) = &assn.value {
                    let elem_ty = self.var_ty(name)?.element();
                    let arr_ty = match self.scalar_layout(elem_ty) {
                        BasicTypeEnum::IntType(t) => t.array_type(arr.len),
                        BasicTypeEnum::FloatType(t) => t.array_type(arr.len),
                        _ => unreachable!("array elements are scalar"),
                    };

                    let ptr = self.builder.build_alloca(arr_ty, name);
                    self.record(name, Slot { ptr, layout: arr_ty.into() });

                    let i32_ty = self.ctx.i32_type();
                    let zero = i32_ty.const_int(0, false);
                    for (i, elem) in arr.elems.iter().enumerate() {
                        let value = self.compile_expr(elem, elem_ty)?;
                        let idx = i32_ty.const_int(i as u64, false);
                        let gep = unsafe {
                            self.builder.build_gep(ptr, &[zero, idx], "")
                        };
                        self.builder.build_store(gep, value);
                    }
                    Ok(())
                } else {
                    let ty = self.var_ty(name)?;
                    let value = self.compile_expr(&assn.value, ty)?;
                    let slot = match self.slot(name) {
                        Ok(slot) => slot,
                        // first assignment of a declaration: allocate the slot
                        Err(_) => {
                            let layout = self.scalar_layout(ty);
                            let ptr = self.builder.build_alloca(layout, name);
                            let slot = Slot { ptr, layout };
                            self.record(name, slot);
                            slot
                        }
                    };
                    self.builder.build_store(slot.ptr, value);
                    Ok(())
                }
            }
            Expr::Index(idx) => {
                let elem_ty = self.var_ty(&idx.name)?.element();
                let gep = self.compile_index_ptr(idx)?;
                let value = self.compile_expr(&assn.value, elem_ty)?;
                self.builder.build_store(gep, value);
                Ok(())
            }
            _ => unreachable!("assignment target is an identifier or an index"),
        }
    }

    /// Emit the return expression at the function's declared return type,
    /// or a bare `ret` for `void`.
    fn compile_return(&mut self, stmt: &'a RetStmt, ret: Ty) -> CodegenResult<()> {
        match &stmt.value {
            Some(expr) => {
                let value = self.compile_expr(expr, ret)?;
                self.builder.build_return(Some(&value));
            }
            None => {
                self.builder.build_return(None);
            }
        }
        Ok(())
    }

    /// Three blocks: `then`, `else` (present even when the source has no else
    /// arm), and `merge`. Arms that already returned do not branch to merge.
    fn compile_if(
        &mut self,
        stmt: &'a IfStmt,
        fun: FunctionValue<'ctx>,
        ret: Ty,
    ) -> CodegenResult<()> {
        let cond = self.compile_cond(&stmt.cond)?;

        let then_bb = self.ctx.append_basic_block(fun, "then");
        let else_bb = self.ctx.append_basic_block(fun, "else");
        let merge_bb = self.ctx.append_basic_block(fun, "merge");
        self.builder.build_conditional_branch(cond, then_bb, else_bb);

        self.builder.position_at_end(then_bb);
        self.in_scope(&stmt.taken_scope, |c| c.compile_stmts(&stmt.taken, fun, ret))?;
        if !self.block_terminated() {
            self.builder.build_unconditional_branch(merge_bb);
        }

        self.builder.position_at_end(else_bb);
        self.in_scope(&stmt.not_taken_scope, |c| {
            c.compile_stmts(&stmt.not_taken, fun, ret)
        })?;
        if !self.block_terminated() {
            self.builder.build_unconditional_branch(merge_bb);
        }

        self.builder.position_at_end(merge_bb);
        Ok(())
    }

    /// `cond` / `body` / `step` / `after` blocks, suffixed by the
    /// per-function loop counter. The init assignment runs in the preceding
    /// block; the induction variable lives in the loop's own scope.
    fn compile_for(
        &mut self,
        stmt: &'a ForStmt,
        fun: FunctionValue<'ctx>,
        ret: Ty,
    ) -> CodegenResult<()> {
        let n = self.loops;
        self.loops += 1;

        let cond_bb = self.ctx.append_basic_block(fun, &format!("cond{n}"));
        let body_bb = self.ctx.append_basic_block(fun, &format!("body{n}"));
        let step_bb = self.ctx.append_basic_block(fun, &format!("step{n}"));
        let after_bb = self.ctx.append_basic_block(fun, &format!("after{n}"));

        self.in_scope(&stmt.scope, |c| {
            c.compile_assign(&stmt.init)?;
            c.builder.build_unconditional_branch(cond_bb);

            c.builder.position_at_end(cond_bb);
            let cond = c.compile_cond(&stmt.cond)?;
            c.builder.build_conditional_branch(cond, body_bb, after_bb);

            c.builder.position_at_end(body_bb);
            c.compile_stmts(&stmt.body, fun, ret)?;
            if !c.block_terminated() {
                c.builder.build_unconditional_branch(step_bb);
            }

            c.builder.position_at_end(step_bb);
            c.compile_assign(&stmt.step)?;
            c.builder.build_unconditional_branch(cond_bb);
            Ok(())
        })?;

        self.builder.position_at_end(after_bb);
        Ok(())
    }

    /// Same as `for` minus the init and step.
    fn compile_while(
        &mut self,
        stmt: &'a WhileStmt,
        fun: FunctionValue<'ctx>,
        ret: Ty,
    ) -> CodegenResult<()> {
        let n = self.loops;
        self.loops += 1;

        let cond_bb = self.ctx.append_basic_block(fun, &format!("cond{n}"));
        let body_bb = self.ctx.append_basic_block(fun, &format!("body{n}"));
        let after_bb = self.ctx.append_basic_block(fun, &format!("after{n}"));

        self.builder.build_unconditional_branch(cond_bb);

        self.in_scope(&stmt.scope, |c| {
            c.builder.position_at_end(cond_bb);
            let cond = c.compile_cond(&stmt.cond)?;
            c.builder.build_conditional_branch(cond, body_bb, after_bb);

            c.builder.position_at_end(body_bb);
            c.compile_stmts(&stmt.body, fun, ret)?;
            if !c.block_terminated() {
                c.builder.build_unconditional_branch(cond_bb);
            }
            Ok(())
        })?;

        self.builder.position_at_end(after_bb);
        Ok(())
    }

    /// Lower both operands at the condition's operand type and emit the
    /// typed predicate.
    fn compile_cond(&mut self, cond: &'a Condition) -> CodegenResult<IntValue<'ctx>> {
        let left = self.compile_expr(&cond.left, cond.ty)?;
        let right = self.compile_expr(&cond.right, cond.ty)?;

        let value = match cond.ty {
            Ty::Float => {
                let pred = match cond.op {
                    CmpOp::Lt => FloatPredicate::OLT,
                    CmpOp::Gt => FloatPredicate::OGT,
                    CmpOp::Le => FloatPredicate::OLE,
                    CmpOp::Ge => FloatPredicate::OGE,
                    CmpOp::Eq => FloatPredicate::OEQ,
                    CmpOp::Ne => FloatPredicate::ONE,
                };
                self.builder.build_float_compare(
                    pred,
                    left.into_float_value(),
                    right.into_float_value(),
                    "fcmp",
                )
            }
            _ => {
                let pred = match cond.op {
                    CmpOp::Lt => IntPredicate::SLT,
                    CmpOp::Gt => IntPredicate::SGT,
                    CmpOp::Le => IntPredicate::SLE,
                    CmpOp::Ge => IntPredicate::SGE,
                    CmpOp::Eq => IntPredicate::EQ,
                    CmpOp::Ne => IntPredicate::NE,
                };
                self.builder.build_int_compare(
                    pred,
                    left.into_int_value(),
                    right.into_int_value(),
                    "cmp",
                )
            }
        };
        Ok(value)
    }

    /// Lower an expression at the given scalar type.
    fn compile_expr(&mut self, expr: &'a Expr, ty: Ty) -> CodegenResult<BasicValueEnum<'ctx>> {
        match expr {
            Expr::Literal(Literal::Int(v)) => match ty {
                // integer literals coerce in float contexts
                Ty::Float => Ok(self.ctx.f32_type().const_float(*v as f64).into()),
                _ => Ok(self.ctx.i32_type().const_int(*v as u64, true).into()),
            },
            Expr::Literal(Literal::Float(v)) => {
                Ok(self.ctx.f32_type().const_float(*v as f64).into())
            }
            Expr::Ident(name) => {
                let slot = self.slot(name)?;
                Ok(self.builder.build_load(slot.ptr, name))
            }
            Expr::Arith(arith) => self.compile_arith(arith, ty),
            Expr::Index(idx) => {
                let elem_ty = self.var_ty(&idx.name)?.element();
                let gep = self.compile_index_ptr(idx)?;
                Ok(self.builder.build_load(gep, &idx.name))
            }
            Expr::Call(call) => {
                let value = self.compile_call(call)?;
                Ok(value.expect("non-void call in expression position"))
            }
            Expr::Array(_) => unreachable!("array literals only appear in declarations"),
        }
    }

    /// Lower operands, then emit the instruction dispatched on the static
    /// element type.
    fn compile_arith(
        &mut self,
        arith: &'a ArithExpr,
        ty: Ty,
    ) -> CodegenResult<BasicValueEnum<'ctx>> {
        let left = self.compile_expr(&arith.left, ty)?;
        let right = self.compile_expr(&arith.right, ty)?;

        let value = match ty {
            Ty::Float => {
                let (l, r) = (left.into_float_value(), right.into_float_value());
                match arith.op {
                    ArithOp::Add => self.builder.build_float_add(l, r, "fadd"),
                    ArithOp::Sub => self.builder.build_float_sub(l, r, "fsub"),
                    ArithOp::Mul => self.builder.build_float_mul(l, r, "fmul"),
                    ArithOp::Div => self.builder.build_float_div(l, r, "fdiv"),
                }
                .into()
            }
            _ => {
                let (l, r) = (left.into_int_value(), right.into_int_value());
                match arith.op {
                    ArithOp::Add => self.builder.build_int_add(l, r, "add"),
                    ArithOp::Sub => self.builder.build_int_sub(l, r, "sub"),
                    ArithOp::Mul => self.builder.build_int_mul(l, r, "mul"),
                    ArithOp::Div => self.builder.build_int_signed_div(l, r, "div"),
                }
                .into()
            }
        };
        Ok(value)
    }

    /// The address of `name[index]`: a `getelementptr` into the array slot.
    fn compile_index_ptr(&mut self, idx: &'a IndexExpr) -> CodegenResult<PointerValue<'ctx>> {
        let slot = self.slot(&idx.name)?;
        let BasicTypeEnum::ArrayType(arr_ty) = slot.layout else {
            return Err(CodegenErr::NotAnArray(idx.name.clone()));
        };

        let index = self.compile_expr(&idx.index, Ty::Int)?.into_int_value();
        let zero = self.ctx.i32_type().const_int(0, false);
        let gep = unsafe {
            self.builder
                .build_gep(slot.ptr, &[zero, index], &idx.name)
        };
        Ok(gep)
    }

    /// Lower each argument in declaration-typed order, then emit the call.
    /// Returns `None` for void calls.
    fn compile_call(&mut self, call: &'a CallExpr) -> CodegenResult<Option<BasicValueEnum<'ctx>>> {
        let sig = self
            .funcs
            .get(&call.name)
            .ok_or_else(|| CodegenErr::UndefinedFun(call.name.clone()))?;
        let fun = self
            .module
            .get_function(&call.name)
            .ok_or_else(|| CodegenErr::UndefinedFun(call.name.clone()))?;

        let mut args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(call.args.len());
        for (arg, &pty) in iter::zip(&call.args, &sig.params) {
            args.push(self.compile_expr(arg, pty)?.into());
        }

        let site = self.builder.build_call(fun, &args, "");
        Ok(site.try_as_basic_value().left())
    }
}
