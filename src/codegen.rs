use super::ast::{Expr, Function, Prototype};
use super::backend::{Backend, BinOp};
use super::error::{Error, ErrorKind};
use std::collections::HashMap;

/// Code generation state for one compilation session.
///
/// `named_values` is the single active scope: it is reset on entry to every
/// function body, and a `for` loop only shadows (then restores) the binding of
/// its own induction variable. `protos` remembers every prototype that has
/// been declared or successfully defined, so that calls can be resolved even
/// after the backend has dropped a declaration.
pub struct CodeGen<B: Backend> {
    backend: B,
    named_values: HashMap<String, B::Value>,
    protos: HashMap<String, Prototype>,
}

impl<B: Backend> CodeGen<B> {
    pub fn new(backend: B) -> CodeGen<B> {
        CodeGen {
            backend,
            named_values: HashMap::new(),
            protos: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn named_values(&self) -> &HashMap<String, B::Value> {
        &self.named_values
    }

    pub fn prototype(&self, name: &str) -> Option<&Prototype> {
        self.protos.get(name)
    }

    /// Looks `name` up in the backend first, then re-declares it from a known
    /// prototype.
    fn get_function(&mut self, name: &str) -> Result<Option<B::Function>, Error> {
        if let Some(f) = self.backend.get_function(name) {
            return Ok(Some(f));
        }
        match self.protos.get(name).cloned() {
            Some(proto) => self.codegen_proto(&proto).map(Some),
            None => Ok(None),
        }
    }

    fn call(
        &mut self,
        callee: B::Function,
        args: &[B::Value],
        name: &str,
    ) -> Result<B::Value, Error> {
        self.backend.build_call(callee, args, name)
    }

    pub fn codegen_expr(&mut self, e: &Expr) -> Result<B::Value, Error> {
        match e {
            Expr::Number(n) => self.backend.const_f64(*n),
            Expr::Variable(name) => match self.named_values.get(name) {
                Some(v) => Ok(*v),
                None => Err(Error::from(ErrorKind::UnknownVariable(name.clone()))),
            },
            Expr::Unary(op, operand) => {
                let operand_val = self.codegen_expr(operand)?;
                match self.get_function(&format!("unary{}", op))? {
                    Some(f) => self.call(f, &[operand_val], "unop"),
                    None => Err(Error::from(ErrorKind::InvalidUnaryOperator(*op))),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs_val = self.codegen_expr(lhs)?;
                let rhs_val = self.codegen_expr(rhs)?;
                match BinOp::from_char(*op) {
                    Some(BinOp::Add) => {
                        self.backend
                            .build_binary(BinOp::Add, lhs_val, rhs_val, "addtmp")
                    }
                    Some(BinOp::Sub) => {
                        self.backend
                            .build_binary(BinOp::Sub, lhs_val, rhs_val, "subtmp")
                    }
                    Some(BinOp::Mul) => {
                        self.backend
                            .build_binary(BinOp::Mul, lhs_val, rhs_val, "multmp")
                    }
                    Some(BinOp::Lt) => {
                        self.backend
                            .build_binary(BinOp::Lt, lhs_val, rhs_val, "booltmp")
                    }
                    None => match self.get_function(&format!("binary{}", op))? {
                        Some(f) => self.call(f, &[lhs_val, rhs_val], "binop"),
                        None => Err(Error::from(ErrorKind::InvalidBinaryOperator(*op))),
                    },
                }
            }
            Expr::Call(callee, args) => {
                let callee_func = match self.get_function(callee)? {
                    Some(f) => f,
                    None => return Err(Error::from(ErrorKind::UnknownFunction(callee.clone()))),
                };
                let expected = self.backend.param_count(callee_func);
                if expected != args.len() {
                    return Err(Error::from(ErrorKind::ArgumentCount {
                        callee: callee.clone(),
                        expected,
                        found: args.len(),
                    }));
                }

                let mut argv = Vec::with_capacity(args.len());
                for arg in args {
                    argv.push(self.codegen_expr(arg)?);
                }
                self.call(callee_func, &argv, "calltmp")
            }
            Expr::If(cond, then, otherwise) => self.codegen_if(cond, then, otherwise),
            Expr::For(var_name, start, end, step, body) => {
                self.codegen_for(var_name, start, end, step.as_ref().map(|s| &**s), body)
            }
        }
    }

    fn codegen_if(&mut self, cond: &Expr, then: &Expr, otherwise: &Expr) -> Result<B::Value, Error> {
        let cond_val = self.codegen_expr(cond)?;
        let cond_val = self.backend.build_truth(cond_val, "ifcond")?;

        let function = self.backend.current_function()?;
        let then_bb = self.backend.append_block(function, "then")?;
        let else_bb = self.backend.append_block(function, "else")?;
        let merge_bb = self.backend.append_block(function, "ifcont")?;
        self.backend.build_cond_br(cond_val, then_bb, else_bb)?;

        self.backend.position_at_end(then_bb);
        let then_val = self.codegen_expr(then)?;
        self.backend.build_br(merge_bb)?;
        // nested control flow may have moved the insertion block
        let then_end = self.backend.current_block()?;

        self.backend.position_at_end(else_bb);
        let else_val = self.codegen_expr(otherwise)?;
        self.backend.build_br(merge_bb)?;
        let else_end = self.backend.current_block()?;

        self.backend.position_at_end(merge_bb);
        let phi = self.backend.build_phi("iftmp")?;
        self.backend.add_incoming(phi, then_val, then_end)?;
        self.backend.add_incoming(phi, else_val, else_end)?;
        Ok(phi)
    }

    /// Emits
    ///
    /// ```text
    /// preheader:  start
    /// loop:       var = phi [start, preheader], [next, loop_end]
    ///             body; next = var + step
    ///             br end != 0, loop, afterloop
    /// afterloop:  0.0
    /// ```
    fn codegen_for(
        &mut self,
        var_name: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &Expr,
    ) -> Result<B::Value, Error> {
        let start_val = self.codegen_expr(start)?;

        let function = self.backend.current_function()?;
        let preheader_bb = self.backend.current_block()?;
        let loop_bb = self.backend.append_block(function, "loop")?;
        self.backend.build_br(loop_bb)?;

        self.backend.position_at_end(loop_bb);
        let variable = self.backend.build_phi(var_name)?;
        self.backend.add_incoming(variable, start_val, preheader_bb)?;

        let old_val = self.named_values.insert(var_name.to_owned(), variable);
        let result = self.codegen_loop_body(variable, end, step, body, loop_bb);
        match old_val {
            Some(v) => {
                self.named_values.insert(var_name.to_owned(), v);
            }
            None => {
                self.named_values.remove(var_name);
            }
        }
        result?;

        self.backend.const_f64(0.0)
    }

    fn codegen_loop_body(
        &mut self,
        variable: B::Value,
        end: &Expr,
        step: Option<&Expr>,
        body: &Expr,
        loop_bb: B::Block,
    ) -> Result<(), Error> {
        self.codegen_expr(body)?;

        let step_val = match step {
            Some(step) => self.codegen_expr(step)?,
            None => self.backend.const_f64(1.0)?,
        };
        let next_var = self
            .backend
            .build_binary(BinOp::Add, variable, step_val, "nextvar")?;

        let end_cond = self.codegen_expr(end)?;
        let end_cond = self.backend.build_truth(end_cond, "loopcond")?;

        let function = self.backend.current_function()?;
        let loop_end_bb = self.backend.current_block()?;
        let after_bb = self.backend.append_block(function, "afterloop")?;
        self.backend.build_cond_br(end_cond, loop_bb, after_bb)?;
        self.backend.position_at_end(after_bb);

        self.backend.add_incoming(variable, next_var, loop_end_bb)
    }

    /// Declares the signature only; nothing is recorded.
    pub fn codegen_proto(&mut self, p: &Prototype) -> Result<B::Function, Error> {
        log::debug!("declaring '{}' with {} params", p.name, p.params.len());
        self.backend.declare_function(&p.name, &p.params)
    }

    /// Handles `extern`: the newest prototype for a name always wins, and an
    /// existing bodiless declaration with a different arity is replaced.
    pub fn codegen_extern(&mut self, p: &Prototype) -> Result<B::Function, Error> {
        let function = match self.backend.get_function(&p.name) {
            Some(f) if self.backend.param_count(f) == p.params.len() => f,
            Some(f) if !self.backend.has_body(f) => {
                self.backend.erase(f);
                self.codegen_proto(p)?
            }
            Some(_) => {
                return Err(Error::from(ErrorKind::Codegen(format!(
                    "'{}' is already defined with a different number of parameters",
                    p.name
                ))))
            }
            None => self.codegen_proto(p)?,
        };
        self.protos.insert(p.name.clone(), p.clone());
        Ok(function)
    }

    /// Generates a complete function. A name may be declared any number of
    /// times but given a body only once; if the body fails to generate, the
    /// half-built function is erased again.
    pub fn codegen_func(&mut self, f: &Function) -> Result<B::Function, Error> {
        let proto = &f.proto;
        let function = match self.get_function(&proto.name)? {
            Some(function) => function,
            None => self.codegen_proto(proto)?,
        };

        if self.backend.has_body(function) {
            return Err(Error::from(ErrorKind::Redefinition(proto.name.clone())));
        }
        if self.backend.param_count(function) != proto.params.len() {
            return Err(Error::from(ErrorKind::Codegen(format!(
                "'{}' was declared with {} parameters but defined with {}",
                proto.name,
                self.backend.param_count(function),
                proto.params.len()
            ))));
        }

        match self.emit_body(function, f) {
            Ok(()) => {
                if !f.is_anonymous() {
                    self.protos.insert(proto.name.clone(), proto.clone());
                }
                log::debug!("defined '{}'", proto.name);
                Ok(function)
            }
            Err(e) => {
                self.backend.erase(function);
                Err(e)
            }
        }
    }

    fn emit_body(&mut self, function: B::Function, f: &Function) -> Result<(), Error> {
        let entry = self.backend.append_block(function, "entry")?;
        self.backend.position_at_end(entry);

        self.named_values.clear();
        for (i, name) in f.proto.params.iter().enumerate() {
            let param = self.backend.param(function, i)?;
            self.named_values.insert(name.clone(), param);
        }

        let ret = self.codegen_expr(&f.body)?;
        self.backend.build_ret(ret)?;
        self.backend.finalize(function)
    }

    /// Runs a freshly generated zero-argument function once, then throws it
    /// away so the same name can be generated again.
    pub fn run_and_discard(&mut self, function: B::Function) -> Result<f64, Error> {
        let result = self.backend.run(function);
        self.backend.erase(function);
        result
    }

    /// Generates and runs a top-level expression.
    pub fn evaluate(&mut self, f: &Function) -> Result<f64, Error> {
        let function = self.codegen_func(f)?;
        self.run_and_discard(function)
    }
}
