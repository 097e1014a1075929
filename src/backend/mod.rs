//! The code generation boundary.
//!
//! `codegen` only ever talks to a [`Backend`]: it asks for declarations,
//! blocks and instructions and never looks inside the values it gets back.

use super::error::Error;
use std::fmt::Debug;

pub mod interp;
#[cfg(feature = "llvm")]
pub mod llvm;

/// Arithmetic and comparison primitives that are inlined rather than called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Unordered less-than, producing 1.0 or 0.0.
    Lt,
}

impl BinOp {
    pub fn from_char(op: char) -> Option<BinOp> {
        match op {
            '+' => Some(BinOp::Add),
            '-' => Some(BinOp::Sub),
            '*' => Some(BinOp::Mul),
            '<' => Some(BinOp::Lt),
            _ => None,
        }
    }

    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::Lt => {
                if lhs.is_nan() || rhs.is_nan() || lhs < rhs {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Ordered not-equal against zero, the branch condition used by `if` and `for`.
pub fn is_truthy(value: f64) -> bool {
    !value.is_nan() && value != 0.0
}

pub trait Backend {
    type Value: Copy + Debug;
    type Function: Copy + Debug;
    type Block: Copy + Debug;

    fn const_f64(&mut self, value: f64) -> Result<Self::Value, Error>;

    fn get_function(&self, name: &str) -> Option<Self::Function>;
    /// Declares `double name(double, ...)` with named parameters. Fails when
    /// the name is already taken.
    fn declare_function(&mut self, name: &str, params: &[String])
        -> Result<Self::Function, Error>;
    fn param_count(&self, function: Self::Function) -> usize;
    fn param(&self, function: Self::Function, index: usize) -> Result<Self::Value, Error>;
    fn has_body(&self, function: Self::Function) -> bool;
    /// Removes the function, body and declaration alike.
    fn erase(&mut self, function: Self::Function);

    fn append_block(&mut self, function: Self::Function, name: &str)
        -> Result<Self::Block, Error>;
    fn position_at_end(&mut self, block: Self::Block);
    fn current_block(&self) -> Result<Self::Block, Error>;
    fn current_function(&self) -> Result<Self::Function, Error>;

    fn build_binary(
        &mut self,
        op: BinOp,
        lhs: Self::Value,
        rhs: Self::Value,
        name: &str,
    ) -> Result<Self::Value, Error>;
    fn build_truth(&mut self, value: Self::Value, name: &str) -> Result<Self::Value, Error>;
    fn build_br(&mut self, dest: Self::Block) -> Result<(), Error>;
    fn build_cond_br(
        &mut self,
        cond: Self::Value,
        then: Self::Block,
        otherwise: Self::Block,
    ) -> Result<(), Error>;
    fn build_phi(&mut self, name: &str) -> Result<Self::Value, Error>;
    fn add_incoming(
        &mut self,
        phi: Self::Value,
        value: Self::Value,
        block: Self::Block,
    ) -> Result<(), Error>;
    fn build_call(
        &mut self,
        callee: Self::Function,
        args: &[Self::Value],
        name: &str,
    ) -> Result<Self::Value, Error>;
    fn build_ret(&mut self, value: Self::Value) -> Result<(), Error>;

    /// Verifies and optimises a function whose body is complete.
    fn finalize(&mut self, function: Self::Function) -> Result<(), Error>;
    /// Runs a zero-argument function and returns its result.
    fn run(&mut self, function: Self::Function) -> Result<f64, Error>;

    fn dump(&self, function: Self::Function) -> String;
    fn dump_module(&self) -> String;
}
