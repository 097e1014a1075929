use super::backend::Backend;
use super::codegen::CodeGen;
use super::error::Error;
use super::parser::Parser;
use super::token::Token;
use std::io::{stderr, Write};

/// What a single top-level construct turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Definition { name: String, ir: String },
    Extern { name: String, ir: String },
    Evaluated { value: f64, ir: String },
}

/// The read-compile-execute loop: one parser and one code generator sharing a
/// session.
pub struct TopLevel<B: Backend> {
    parser: Parser,
    codegen: CodeGen<B>,
    dump_ir: bool,
}

impl<B: Backend> TopLevel<B> {
    pub fn new(parser: Parser, backend: B, dump_ir: bool) -> TopLevel<B> {
        TopLevel {
            parser,
            codegen: CodeGen::new(backend),
            dump_ir,
        }
    }

    pub fn codegen(&self) -> &CodeGen<B> {
        &self.codegen
    }

    /// Handles the next top-level construct, or returns `None` at end of
    /// input. A construct that fails to parse is skipped by advancing one
    /// token past the point of failure.
    pub fn step(&mut self) -> Option<Result<Outcome, Error>> {
        loop {
            match self.parser.current() {
                Token::Eof => return None,
                Token::Kwd(';') => {
                    self.parser.next_token();
                }
                Token::Def => return Some(self.handle_definition()),
                Token::Extern => return Some(self.handle_extern()),
                _ => return Some(self.handle_top_level_expression()),
            }
        }
    }

    fn resync<T>(&mut self, e: Error) -> Result<T, Error> {
        self.parser.next_token();
        Err(e)
    }

    fn handle_definition(&mut self) -> Result<Outcome, Error> {
        let function = match self.parser.parse_definition() {
            Ok(function) => function,
            Err(e) => return self.resync(e),
        };
        let value = self.codegen.codegen_func(&function)?;
        Ok(Outcome::Definition {
            name: function.proto.name,
            ir: self.codegen.backend().dump(value),
        })
    }

    fn handle_extern(&mut self) -> Result<Outcome, Error> {
        let proto = match self.parser.parse_extern() {
            Ok(proto) => proto,
            Err(e) => return self.resync(e),
        };
        let value = self.codegen.codegen_extern(&proto)?;
        Ok(Outcome::Extern {
            name: proto.name,
            ir: self.codegen.backend().dump(value),
        })
    }

    fn handle_top_level_expression(&mut self) -> Result<Outcome, Error> {
        let function = match self.parser.parse_top_level_expression() {
            Ok(function) => function,
            Err(e) => return self.resync(e),
        };
        let value = self.codegen.codegen_func(&function)?;
        let ir = self.codegen.backend().dump(value);
        let value = self.codegen.run_and_discard(value)?;
        Ok(Outcome::Evaluated { value, ir })
    }

    fn report(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Definition { ir, .. } => {
                if self.dump_ir {
                    eprint!("Read function definition:\n{}", ir);
                }
            }
            Outcome::Extern { ir, .. } => {
                if self.dump_ir {
                    eprint!("Read extern:\n{}", ir);
                }
            }
            Outcome::Evaluated { value, ir } => {
                if self.dump_ir {
                    eprint!("Read top-level expression:\n{}", ir);
                }
                eprintln!("Evaluated to {}", value);
            }
        }
    }

    pub fn main_loop(&mut self) {
        prompt();
        while let Some(result) = self.step() {
            match result {
                Ok(outcome) => self.report(&outcome),
                Err(e) => eprintln!("Error: {}", e),
            }
            prompt();
        }
        eprintln!();
        if self.dump_ir {
            eprint!("{}", self.codegen.backend().dump_module());
        }
    }
}

fn prompt() {
    eprint!("ready> ");
    let _ = stderr().flush();
}

#[cfg(test)]
mod test {
    use super::super::backend::interp::InterpBackend;
    use super::super::error::ErrorKind;
    use super::super::lexer::Lexer;
    use super::*;

    fn toplevel(src: &str) -> TopLevel<InterpBackend> {
        TopLevel::new(
            Parser::new(Lexer::with_text(src)),
            InterpBackend::default(),
            false,
        )
    }

    fn values(src: &str) -> Vec<Result<f64, ErrorKind>> {
        let mut t = toplevel(src);
        let mut out = Vec::new();
        while let Some(r) = t.step() {
            match r {
                Ok(Outcome::Evaluated { value, .. }) => out.push(Ok(value)),
                Ok(_) => {}
                Err(e) => out.push(Err(e.kind().clone())),
            }
        }
        out
    }

    #[test]
    fn test_step() {
        let mut t = toplevel("def f(x) x+1; extern g(y); f(1);");
        match t.step() {
            Some(Ok(Outcome::Definition { name, ir })) => {
                assert_eq!(name, "f");
                assert!(ir.starts_with("define double @f(double %x)"));
            }
            r => panic!("{:?}", r),
        }
        match t.step() {
            Some(Ok(Outcome::Extern { name, ir })) => {
                assert_eq!(name, "g");
                assert_eq!(ir, "declare double @g(double %y)\n");
            }
            r => panic!("{:?}", r),
        }
        match t.step() {
            Some(Ok(Outcome::Evaluated { value, .. })) => assert_eq!(value, 2.0),
            r => panic!("{:?}", r),
        }
        assert!(t.step().is_none());
    }

    #[test]
    fn test_resync_after_parse_error() {
        let results = values("def (x) 1; 2+3;");
        assert_eq!(results.last(), Some(&Ok(5.0)));
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ErrorKind::Parse(_)))));
    }

    #[test]
    fn test_codegen_error_is_not_fatal() {
        assert_eq!(
            values("nope(1); 4*2;"),
            vec![Err(ErrorKind::UnknownFunction("nope".to_owned())), Ok(8.0)]
        );
    }

    #[test]
    fn test_invalid_utf8_does_not_end_session() {
        let lexer = Lexer::new(std::io::Cursor::new(b"1+1;\n\xff 2;\n3;\n".to_vec()));
        let mut t = TopLevel::new(Parser::new(lexer), InterpBackend::default(), false);
        let mut out = Vec::new();
        while let Some(r) = t.step() {
            out.push(r.map_err(|e| e.kind().clone()));
        }
        let values: Vec<f64> = out
            .iter()
            .filter_map(|r| match r {
                Ok(Outcome::Evaluated { value, .. }) => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![2.0, 2.0, 3.0]);
        assert!(out.iter().any(|r| matches!(r, Err(ErrorKind::Parse(_)))));
    }

    #[test]
    fn test_redefinition_reported() {
        let mut t = toplevel("def f(x) x def f(x) x");
        assert!(matches!(t.step(), Some(Ok(Outcome::Definition { .. }))));
        match t.step() {
            Some(Err(e)) => assert_eq!(e.kind(), &ErrorKind::Redefinition("f".to_owned())),
            r => panic!("{:?}", r),
        }
        assert!(t.codegen().prototype("f").is_some());
    }
}
