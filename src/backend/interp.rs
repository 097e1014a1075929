//! An in-process SSA backend: functions are lists of basic blocks holding
//! instructions over `f64` values, joined by phi nodes, and are executed by a
//! small interpreter that plays the part of the execution engine.

use super::{is_truthy, Backend, BinOp};
use crate::config::Options;
use crate::error::{Error, ErrorKind};
use crate::runtime::{builtins, NativeFn};
use std::collections::HashMap;

fn backend_error<T>(msg: String) -> Result<T, Error> {
    Err(Error::from(ErrorKind::Backend(msg)))
}

fn execution_error<T>(msg: String) -> Result<T, Error> {
    Err(Error::from(ErrorKind::Execution(msg)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncRef(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    func: usize,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRef {
    func: usize,
    index: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Inst {
    Param(usize),
    Const(f64),
    Binary(BinOp, usize, usize),
    Truth(usize),
    /// (value, predecessor block) pairs
    Phi(Vec<(usize, usize)>),
    /// Callees are linked by name when the call executes.
    Call(String, Vec<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Terminator {
    Br(usize),
    CondBr(usize, usize, usize),
    Ret(usize),
}

#[derive(Debug)]
struct Value {
    name: String,
    inst: Inst,
}

#[derive(Debug)]
struct Block {
    name: String,
    insts: Vec<usize>,
    terminator: Option<Terminator>,
}

#[derive(Debug)]
struct FunctionData {
    name: String,
    params: Vec<String>,
    values: Vec<Value>,
    blocks: Vec<Block>,
}

impl FunctionData {
    fn value_name(&self, index: usize) -> String {
        let value = &self.values[index];
        match value.inst {
            Inst::Const(c) => format!("{:?}", c),
            Inst::Param(_) => format!("%{}", value.name),
            _ => format!("%{}{}", value.name, index),
        }
    }

    fn block_name(&self, index: usize) -> String {
        if index == 0 {
            self.blocks[index].name.clone()
        } else {
            format!("{}{}", self.blocks[index].name, index)
        }
    }

    fn dump(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("double %{}", p))
            .collect::<Vec<_>>()
            .join(", ");
        if self.blocks.is_empty() {
            return format!("declare double @{}({})\n", self.name, params);
        }

        let mut out = format!("define double @{}({}) {{\n", self.name, params);
        for (b, block) in self.blocks.iter().enumerate() {
            out.push_str(&format!("{}:\n", self.block_name(b)));
            for &i in &block.insts {
                let rhs = match &self.values[i].inst {
                    Inst::Binary(op, l, r) => {
                        let mnemonic = match op {
                            BinOp::Add => "fadd",
                            BinOp::Sub => "fsub",
                            BinOp::Mul => "fmul",
                            BinOp::Lt => "fcmp ult",
                        };
                        format!(
                            "{} double {}, {}",
                            mnemonic,
                            self.value_name(*l),
                            self.value_name(*r)
                        )
                    }
                    Inst::Truth(v) => format!("fcmp one double {}, 0.0", self.value_name(*v)),
                    Inst::Phi(edges) => format!(
                        "phi double {}",
                        edges
                            .iter()
                            .map(|(v, b)| format!(
                                "[ {}, %{} ]",
                                self.value_name(*v),
                                self.block_name(*b)
                            ))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    Inst::Call(callee, args) => format!(
                        "call double @{}({})",
                        callee,
                        args.iter()
                            .map(|a| format!("double {}", self.value_name(*a)))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    Inst::Param(_) | Inst::Const(_) => continue,
                };
                out.push_str(&format!("  {} = {}\n", self.value_name(i), rhs));
            }
            match block.terminator {
                Some(Terminator::Br(dest)) => {
                    out.push_str(&format!("  br label %{}\n", self.block_name(dest)))
                }
                Some(Terminator::CondBr(c, t, e)) => out.push_str(&format!(
                    "  br i1 {}, label %{}, label %{}\n",
                    self.value_name(c),
                    self.block_name(t),
                    self.block_name(e)
                )),
                Some(Terminator::Ret(v)) => {
                    out.push_str(&format!("  ret double {}\n", self.value_name(v)))
                }
                None => {}
            }
        }
        out.push_str("}\n");
        out
    }
}

pub struct InterpBackend {
    functions: Vec<Option<FunctionData>>,
    names: HashMap<String, usize>,
    natives: HashMap<String, NativeFn>,
    cursor: Option<(usize, usize)>,
    options: Options,
}

impl InterpBackend {
    pub fn new(options: &Options) -> InterpBackend {
        let mut backend = InterpBackend {
            functions: Vec::new(),
            names: HashMap::new(),
            natives: HashMap::new(),
            cursor: None,
            options: options.clone(),
        };
        for (name, f) in builtins() {
            backend.register_native(name, *f);
        }
        backend
    }

    /// Makes a host function callable from compiled code once it has been
    /// declared with `extern`.
    pub fn register_native(&mut self, name: &str, f: NativeFn) {
        self.natives.insert(name.to_owned(), f);
    }

    fn function(&self, func: usize) -> Result<&FunctionData, Error> {
        match self.functions.get(func).and_then(Option::as_ref) {
            Some(fd) => Ok(fd),
            None => backend_error(format!("function #{} has been erased", func)),
        }
    }

    fn function_mut(&mut self, func: usize) -> Result<&mut FunctionData, Error> {
        match self.functions.get_mut(func).and_then(Option::as_mut) {
            Some(fd) => Ok(fd),
            None => backend_error(format!("function #{} has been erased", func)),
        }
    }

    fn insertion_point(&self) -> Result<(usize, usize), Error> {
        match self.cursor {
            Some(cursor) => Ok(cursor),
            None => backend_error("no insertion point".to_owned()),
        }
    }

    /// Checks that `value` belongs to the function being built.
    fn local(&self, value: ValueRef) -> Result<usize, Error> {
        let (func, _) = self.insertion_point()?;
        if value.func != func {
            return backend_error(format!(
                "value from function #{} used in function #{}",
                value.func, func
            ));
        }
        Ok(value.index)
    }

    fn constant(&self, value: ValueRef) -> Option<f64> {
        let fd = self.functions.get(value.func).and_then(Option::as_ref)?;
        match fd.values.get(value.index) {
            Some(Value {
                inst: Inst::Const(c),
                ..
            }) => Some(*c),
            _ => None,
        }
    }

    fn push_value(&mut self, name: &str, inst: Inst) -> Result<ValueRef, Error> {
        let (func, block) = self.insertion_point()?;
        let in_block = match inst {
            Inst::Const(_) | Inst::Param(_) => false,
            _ => true,
        };
        let fd = self.function_mut(func)?;
        if in_block && fd.blocks[block].terminator.is_some() {
            return backend_error(format!(
                "instruction '{}' after terminator in block '{}'",
                name, fd.blocks[block].name
            ));
        }
        let index = fd.values.len();
        fd.values.push(Value {
            name: name.to_owned(),
            inst,
        });
        if in_block {
            fd.blocks[block].insts.push(index);
        }
        Ok(ValueRef { func, index })
    }

    fn terminate(&mut self, terminator: Terminator) -> Result<(), Error> {
        let (func, block) = self.insertion_point()?;
        let fd = self.function_mut(func)?;
        let block = &mut fd.blocks[block];
        if block.terminator.is_some() {
            return backend_error(format!("block '{}' is already terminated", block.name));
        }
        block.terminator = Some(terminator);
        Ok(())
    }

    /// Calls a native directly, or hands back the compiled function that
    /// implements `name`.
    fn dispatch(&self, name: &str, args: &[f64]) -> Result<Callee<'_>, Error> {
        let defined = self
            .names
            .get(name)
            .and_then(|&i| self.functions.get(i))
            .and_then(Option::as_ref)
            .filter(|fd| !fd.blocks.is_empty());
        if let Some(fd) = defined {
            return Ok(Callee::Compiled(fd));
        }

        match self.natives.get(name) {
            Some(f) if args.len() == 1 => Ok(Callee::Native(f(args[0]))),
            Some(_) => execution_error(format!(
                "native '{}' takes 1 argument, {} given",
                name,
                args.len()
            )),
            None => execution_error(format!("unresolved external symbol '{}'", name)),
        }
    }

    /// Runs `name` to completion. Calls push frames on an explicit stack, so
    /// the nesting limit is `max_call_depth` regardless of the host stack.
    fn interpret(&self, name: &str, args: &[f64]) -> Result<f64, Error> {
        let entry = match self.dispatch(name, args)? {
            Callee::Native(value) => return Ok(value),
            Callee::Compiled(fd) => fd,
        };
        let mut stack = vec![Frame::new(entry, args)?];

        loop {
            let step = match stack.last_mut() {
                Some(frame) => self.step(frame)?,
                None => return execution_error("empty call stack".to_owned()),
            };
            match step {
                Step::Call(callee, args) => {
                    if stack.len() >= self.options.max_call_depth {
                        return execution_error(format!(
                            "maximum call depth {} exceeded calling '{}'",
                            self.options.max_call_depth, callee.name
                        ));
                    }
                    stack.push(Frame::new(callee, &args)?);
                }
                Step::Return(value) => {
                    stack.pop();
                    match stack.last_mut() {
                        Some(caller) => caller.resume(value)?,
                        None => return Ok(value),
                    }
                }
            }
        }
    }

    /// Executes `frame` until it returns or calls a compiled function.
    fn step<'a>(&'a self, frame: &mut Frame<'a>) -> Result<Step<'a>, Error> {
        let fd = frame.function;
        loop {
            let block = frame.block()?;
            while let Some(&i) = block.insts.get(frame.next) {
                frame.next += 1;
                frame.values[i] = match &fd.values[i].inst {
                    Inst::Binary(op, l, r) => op.apply(frame.values[*l], frame.values[*r]),
                    Inst::Truth(v) => {
                        if is_truthy(frame.values[*v]) {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    Inst::Call(callee, argv) => {
                        let argv: Vec<f64> = argv.iter().map(|a| frame.values[*a]).collect();
                        match self.dispatch(callee, &argv)? {
                            Callee::Native(value) => value,
                            Callee::Compiled(callee) => {
                                frame.pending = Some(i);
                                return Ok(Step::Call(callee, argv));
                            }
                        }
                    }
                    Inst::Phi(_) | Inst::Param(_) | Inst::Const(_) => continue,
                };
            }

            match block.terminator {
                Some(Terminator::Br(dest)) => frame.jump(dest)?,
                Some(Terminator::CondBr(c, t, e)) => {
                    let dest = if is_truthy(frame.values[c]) { t } else { e };
                    frame.jump(dest)?
                }
                Some(Terminator::Ret(v)) => return Ok(Step::Return(frame.values[v])),
                None => {
                    return execution_error(format!(
                        "block '{}' in '{}' has no terminator",
                        block.name, fd.name
                    ))
                }
            }
        }
    }
}

enum Callee<'a> {
    Native(f64),
    Compiled(&'a FunctionData),
}

enum Step<'a> {
    Call(&'a FunctionData, Vec<f64>),
    Return(f64),
}

/// One activation of a compiled function.
struct Frame<'a> {
    function: &'a FunctionData,
    values: Vec<f64>,
    block: usize,
    /// Position in the current block's instruction list.
    next: usize,
    /// Call instruction waiting for its callee to return.
    pending: Option<usize>,
}

impl<'a> Frame<'a> {
    fn new(function: &'a FunctionData, args: &[f64]) -> Result<Frame<'a>, Error> {
        if args.len() != function.params.len() {
            return execution_error(format!(
                "'{}' takes {} arguments, {} given",
                function.name,
                function.params.len(),
                args.len()
            ));
        }
        let values = function
            .values
            .iter()
            .map(|v| match v.inst {
                Inst::Param(i) => args[i],
                Inst::Const(c) => c,
                _ => f64::NAN,
            })
            .collect();
        Ok(Frame {
            function,
            values,
            block: 0,
            next: 0,
            pending: None,
        })
    }

    fn block(&self) -> Result<&'a Block, Error> {
        match self.function.blocks.get(self.block) {
            Some(block) => Ok(block),
            None => execution_error(format!("branch to missing block #{}", self.block)),
        }
    }

    /// Moves to `dest`, giving its phis the values that flow in from the
    /// block being left.
    fn jump(&mut self, dest: usize) -> Result<(), Error> {
        let from = self.block;
        self.block = dest;
        self.next = 0;
        let block = self.block()?;

        // Phis read their inputs before any of them is written.
        let mut incoming = Vec::new();
        for &i in &block.insts {
            if let Inst::Phi(edges) = &self.function.values[i].inst {
                match edges.iter().find(|(_, b)| *b == from) {
                    Some(&(v, _)) => incoming.push((i, self.values[v])),
                    None => {
                        return execution_error(format!(
                            "phi in '{}' has no value for its predecessor",
                            self.function.name
                        ))
                    }
                }
            }
        }
        for (i, v) in incoming {
            self.values[i] = v;
        }
        Ok(())
    }

    fn resume(&mut self, value: f64) -> Result<(), Error> {
        match self.pending.take() {
            Some(i) => {
                self.values[i] = value;
                Ok(())
            }
            None => execution_error(format!("'{}' was not waiting on a call", self.function.name)),
        }
    }
}

impl Default for InterpBackend {
    fn default() -> InterpBackend {
        InterpBackend::new(&Options::default())
    }
}

impl Backend for InterpBackend {
    type Value = ValueRef;
    type Function = FuncRef;
    type Block = BlockRef;

    fn const_f64(&mut self, value: f64) -> Result<ValueRef, Error> {
        self.push_value("const", Inst::Const(value))
    }

    fn get_function(&self, name: &str) -> Option<FuncRef> {
        self.names.get(name).map(|&i| FuncRef(i))
    }

    fn declare_function(&mut self, name: &str, params: &[String]) -> Result<FuncRef, Error> {
        if self.names.contains_key(name) {
            return backend_error(format!("function '{}' is already declared", name));
        }
        let values = params
            .iter()
            .enumerate()
            .map(|(i, p)| Value {
                name: p.clone(),
                inst: Inst::Param(i),
            })
            .collect();
        let index = self.functions.len();
        self.functions.push(Some(FunctionData {
            name: name.to_owned(),
            params: params.to_vec(),
            values,
            blocks: Vec::new(),
        }));
        self.names.insert(name.to_owned(), index);
        Ok(FuncRef(index))
    }

    fn param_count(&self, function: FuncRef) -> usize {
        self.function(function.0)
            .map(|fd| fd.params.len())
            .unwrap_or(0)
    }

    fn param(&self, function: FuncRef, index: usize) -> Result<ValueRef, Error> {
        let fd = self.function(function.0)?;
        if index >= fd.params.len() {
            return backend_error(format!(
                "'{}' has no parameter #{}",
                fd.name, index
            ));
        }
        Ok(ValueRef {
            func: function.0,
            index,
        })
    }

    fn has_body(&self, function: FuncRef) -> bool {
        self.function(function.0)
            .map(|fd| !fd.blocks.is_empty())
            .unwrap_or(false)
    }

    fn erase(&mut self, function: FuncRef) {
        let erased = self.functions.get_mut(function.0).and_then(Option::take);
        if let Some(fd) = erased {
            if self.names.get(&fd.name) == Some(&function.0) {
                self.names.remove(&fd.name);
            }
            log::debug!("erased '{}'", fd.name);
        }
        if let Some((func, _)) = self.cursor {
            if func == function.0 {
                self.cursor = None;
            }
        }
    }

    fn append_block(&mut self, function: FuncRef, name: &str) -> Result<BlockRef, Error> {
        let fd = self.function_mut(function.0)?;
        fd.blocks.push(Block {
            name: name.to_owned(),
            insts: Vec::new(),
            terminator: None,
        });
        Ok(BlockRef {
            func: function.0,
            index: fd.blocks.len() - 1,
        })
    }

    fn position_at_end(&mut self, block: BlockRef) {
        self.cursor = Some((block.func, block.index));
    }

    fn current_block(&self) -> Result<BlockRef, Error> {
        let (func, index) = self.insertion_point()?;
        Ok(BlockRef { func, index })
    }

    fn current_function(&self) -> Result<FuncRef, Error> {
        let (func, _) = self.insertion_point()?;
        Ok(FuncRef(func))
    }

    fn build_binary(
        &mut self,
        op: BinOp,
        lhs: ValueRef,
        rhs: ValueRef,
        name: &str,
    ) -> Result<ValueRef, Error> {
        let l = self.local(lhs)?;
        let r = self.local(rhs)?;
        if self.options.optimize {
            if let (Some(a), Some(b)) = (self.constant(lhs), self.constant(rhs)) {
                return self.push_value(name, Inst::Const(op.apply(a, b)));
            }
        }
        self.push_value(name, Inst::Binary(op, l, r))
    }

    fn build_truth(&mut self, value: ValueRef, name: &str) -> Result<ValueRef, Error> {
        let v = self.local(value)?;
        self.push_value(name, Inst::Truth(v))
    }

    fn build_br(&mut self, dest: BlockRef) -> Result<(), Error> {
        self.terminate(Terminator::Br(dest.index))
    }

    fn build_cond_br(
        &mut self,
        cond: ValueRef,
        then: BlockRef,
        otherwise: BlockRef,
    ) -> Result<(), Error> {
        let c = self.local(cond)?;
        self.terminate(Terminator::CondBr(c, then.index, otherwise.index))
    }

    fn build_phi(&mut self, name: &str) -> Result<ValueRef, Error> {
        self.push_value(name, Inst::Phi(Vec::new()))
    }

    fn add_incoming(
        &mut self,
        phi: ValueRef,
        value: ValueRef,
        block: BlockRef,
    ) -> Result<(), Error> {
        if value.func != phi.func || block.func != phi.func {
            return backend_error("phi incoming value from another function".to_owned());
        }
        let fd = self.function_mut(phi.func)?;
        match fd.values.get_mut(phi.index) {
            Some(Value {
                inst: Inst::Phi(edges),
                ..
            }) => {
                edges.push((value.index, block.index));
                Ok(())
            }
            _ => backend_error("add_incoming on a value that is not a phi".to_owned()),
        }
    }

    fn build_call(
        &mut self,
        callee: FuncRef,
        args: &[ValueRef],
        name: &str,
    ) -> Result<ValueRef, Error> {
        let (callee_name, arity) = {
            let fd = self.function(callee.0)?;
            (fd.name.clone(), fd.params.len())
        };
        if arity != args.len() {
            return Err(Error::from(ErrorKind::ArgumentCount {
                callee: callee_name,
                expected: arity,
                found: args.len(),
            }));
        }
        let args = args
            .iter()
            .map(|a| self.local(*a))
            .collect::<Result<Vec<_>, _>>()?;
        self.push_value(name, Inst::Call(callee_name, args))
    }

    fn build_ret(&mut self, value: ValueRef) -> Result<(), Error> {
        let v = self.local(value)?;
        self.terminate(Terminator::Ret(v))
    }

    fn finalize(&mut self, function: FuncRef) -> Result<(), Error> {
        let fd = self.function(function.0)?;
        for block in &fd.blocks {
            let targets = match block.terminator {
                Some(Terminator::Br(dest)) => vec![dest],
                Some(Terminator::CondBr(_, t, e)) => vec![t, e],
                Some(Terminator::Ret(_)) => vec![],
                None => {
                    return backend_error(format!(
                        "'{}' failed verification: block '{}' has no terminator",
                        fd.name, block.name
                    ))
                }
            };
            if targets.iter().any(|&t| t >= fd.blocks.len()) {
                return backend_error(format!(
                    "'{}' failed verification: branch out of function",
                    fd.name
                ));
            }
        }
        if self.cursor.map(|(func, _)| func) == Some(function.0) {
            self.cursor = None;
        }
        Ok(())
    }

    fn run(&mut self, function: FuncRef) -> Result<f64, Error> {
        let fd = self.function(function.0)?;
        if !fd.params.is_empty() {
            return execution_error(format!("'{}' takes arguments", fd.name));
        }
        self.interpret(&fd.name, &[])
    }

    fn dump(&self, function: FuncRef) -> String {
        self.function(function.0)
            .map(FunctionData::dump)
            .unwrap_or_default()
    }

    fn dump_module(&self) -> String {
        self.functions
            .iter()
            .filter_map(Option::as_ref)
            .map(FunctionData::dump)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn no_fold() -> InterpBackend {
        InterpBackend::new(&Options {
            optimize: false,
            ..Options::default()
        })
    }

    #[test]
    fn test_straight_line() {
        let mut b = no_fold();
        let f = b.declare_function("f", &[]).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.position_at_end(entry);
        let three = b.const_f64(3.0).unwrap();
        let four = b.const_f64(4.0).unwrap();
        let mul = b.build_binary(BinOp::Mul, three, four, "multmp").unwrap();
        b.build_ret(mul).unwrap();
        b.finalize(f).unwrap();

        assert_eq!(b.run(f).unwrap(), 12.0);
        assert!(b.dump(f).contains("%multmp"));
        assert!(b.dump(f).contains("fmul double 3.0, 4.0"));
    }

    #[test]
    fn test_constant_folding() {
        let mut b = InterpBackend::default();
        let f = b.declare_function("f", &[]).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.position_at_end(entry);
        let one = b.const_f64(1.0).unwrap();
        let two = b.const_f64(2.0).unwrap();
        let sum = b.build_binary(BinOp::Add, one, two, "addtmp").unwrap();
        b.build_ret(sum).unwrap();
        b.finalize(f).unwrap();

        assert!(b.dump(f).contains("ret double 3.0"));
        assert_eq!(b.run(f).unwrap(), 3.0);
    }

    #[test]
    fn test_branch_and_phi() {
        let mut b = no_fold();
        let f = b.declare_function("f", &[]).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        let then = b.append_block(f, "then").unwrap();
        let otherwise = b.append_block(f, "else").unwrap();
        let merge = b.append_block(f, "ifcont").unwrap();

        b.position_at_end(entry);
        let zero = b.const_f64(0.0).unwrap();
        let cond = b.build_truth(zero, "ifcond").unwrap();
        b.build_cond_br(cond, then, otherwise).unwrap();

        b.position_at_end(then);
        let one = b.const_f64(1.0).unwrap();
        b.build_br(merge).unwrap();

        b.position_at_end(otherwise);
        let two = b.const_f64(2.0).unwrap();
        b.build_br(merge).unwrap();

        b.position_at_end(merge);
        let phi = b.build_phi("iftmp").unwrap();
        b.add_incoming(phi, one, then).unwrap();
        b.add_incoming(phi, two, otherwise).unwrap();
        b.build_ret(phi).unwrap();
        b.finalize(f).unwrap();

        assert_eq!(b.run(f).unwrap(), 2.0);
    }

    #[test]
    fn test_unterminated_block_fails_verification() {
        let mut b = no_fold();
        let f = b.declare_function("f", &[]).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.position_at_end(entry);
        let e = b.finalize(f).unwrap_err();
        assert!(matches!(e.kind(), ErrorKind::Backend(_)));
    }

    #[test]
    fn test_instruction_after_terminator() {
        let mut b = no_fold();
        let f = b.declare_function("f", &[]).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.position_at_end(entry);
        let one = b.const_f64(1.0).unwrap();
        b.build_ret(one).unwrap();
        assert!(b.build_binary(BinOp::Add, one, one, "addtmp").is_err());
        assert!(b.build_ret(one).is_err());
    }

    #[test]
    fn test_declare_twice_and_erase() {
        let mut b = InterpBackend::default();
        let f = b
            .declare_function("f", &["x".to_owned(), "y".to_owned()])
            .unwrap();
        assert_eq!(b.param_count(f), 2);
        assert!(!b.has_body(f));
        assert!(b.param(f, 1).is_ok());
        assert!(b.param(f, 2).is_err());
        assert!(b.declare_function("f", &[]).is_err());
        assert!(b.dump(f).starts_with("declare double @f(double %x, double %y)"));

        b.erase(f);
        assert_eq!(b.get_function("f"), None);
        assert!(b.declare_function("f", &[]).is_ok());
    }

    #[test]
    fn test_call_native_and_unresolved() {
        extern "C" fn twice(x: f64) -> f64 {
            x * 2.0
        }

        let mut b = no_fold();
        b.register_native("twice", twice);
        let twice_decl = b.declare_function("twice", &["x".to_owned()]).unwrap();
        let missing = b.declare_function("missing", &[]).unwrap();

        let f = b.declare_function("f", &[]).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.position_at_end(entry);
        let arg = b.const_f64(21.0).unwrap();
        let call = b.build_call(twice_decl, &[arg], "calltmp").unwrap();
        b.build_ret(call).unwrap();
        b.finalize(f).unwrap();
        assert_eq!(b.run(f).unwrap(), 42.0);

        let g = b.declare_function("g", &[]).unwrap();
        let entry = b.append_block(g, "entry").unwrap();
        b.position_at_end(entry);
        let call = b.build_call(missing, &[], "calltmp").unwrap();
        b.build_ret(call).unwrap();
        b.finalize(g).unwrap();
        let e = b.run(g).unwrap_err();
        assert!(matches!(e.kind(), ErrorKind::Execution(_)));
    }

    #[test]
    fn test_call_arity_checked() {
        let mut b = no_fold();
        let callee = b.declare_function("h", &["a".to_owned()]).unwrap();
        let f = b.declare_function("f", &[]).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.position_at_end(entry);
        let e = b.build_call(callee, &[], "calltmp").unwrap_err();
        assert!(matches!(e.kind(), ErrorKind::ArgumentCount { .. }));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut b = InterpBackend::new(&Options {
            max_call_depth: 8,
            ..Options::default()
        });
        // loop() calls itself forever
        let f = b.declare_function("loop", &[]).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.position_at_end(entry);
        let call = b.build_call(f, &[], "calltmp").unwrap();
        b.build_ret(call).unwrap();
        b.finalize(f).unwrap();

        let e = b.run(f).unwrap_err();
        assert!(e.to_string().contains("maximum call depth"));
    }

    #[test]
    fn test_deep_calls_use_no_host_stack() {
        // count(n) = if n < 1 then 0 else 1 + count(n - 1)
        let mut b = InterpBackend::default();
        let f = b.declare_function("count", &["n".to_owned()]).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        let then = b.append_block(f, "then").unwrap();
        let otherwise = b.append_block(f, "else").unwrap();
        let merge = b.append_block(f, "ifcont").unwrap();

        b.position_at_end(entry);
        let n = b.param(f, 0).unwrap();
        let zero = b.const_f64(0.0).unwrap();
        let one = b.const_f64(1.0).unwrap();
        let lt = b.build_binary(BinOp::Lt, n, one, "booltmp").unwrap();
        let cond = b.build_truth(lt, "ifcond").unwrap();
        b.build_cond_br(cond, then, otherwise).unwrap();

        b.position_at_end(then);
        b.build_br(merge).unwrap();

        b.position_at_end(otherwise);
        let m = b.build_binary(BinOp::Sub, n, one, "subtmp").unwrap();
        let rec = b.build_call(f, &[m], "calltmp").unwrap();
        let sum = b.build_binary(BinOp::Add, one, rec, "addtmp").unwrap();
        b.build_br(merge).unwrap();

        b.position_at_end(merge);
        let phi = b.build_phi("iftmp").unwrap();
        b.add_incoming(phi, zero, then).unwrap();
        b.add_incoming(phi, sum, otherwise).unwrap();
        b.build_ret(phi).unwrap();
        b.finalize(f).unwrap();

        let main = b.declare_function("main", &[]).unwrap();
        let entry = b.append_block(main, "entry").unwrap();
        b.position_at_end(entry);
        let arg = b.const_f64(1000.0).unwrap();
        let call = b.build_call(f, &[arg], "calltmp").unwrap();
        b.build_ret(call).unwrap();
        b.finalize(main).unwrap();
        assert_eq!(b.run(main).unwrap(), 1000.0);

        let deep = b.declare_function("deep", &[]).unwrap();
        let entry = b.append_block(deep, "entry").unwrap();
        b.position_at_end(entry);
        let arg = b.const_f64(100_000.0).unwrap();
        let call = b.build_call(f, &[arg], "calltmp").unwrap();
        b.build_ret(call).unwrap();
        b.finalize(deep).unwrap();
        let e = b.run(deep).unwrap_err();
        assert!(matches!(e.kind(), ErrorKind::Execution(_)));
    }
}
