//! Front end and driver for the Kaleidoscope toy language: a scanner, an
//! operator-precedence parser producing an AST, and a code generator that
//! lowers the AST through a pluggable [`backend::Backend`].

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod precedence;
pub mod runtime;
pub mod token;
pub mod toplevel;

pub use error::{Error, ErrorKind};
