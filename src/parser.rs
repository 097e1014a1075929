use super::ast::{Expr, Function, Prototype, DEFAULT_OPERATOR_PRECEDENCE};
use super::error::{Error, ErrorKind};
use super::lexer::Lexer;
use super::precedence::PrecedenceTable;
use super::token::Token;

fn error<T>(msg: &str) -> Result<T, Error> {
    Err(Error::from(ErrorKind::Parse(msg.to_owned())))
}

/// Recursive-descent parser over a single token of lookahead.
///
/// Every `parse_*` method expects the current token to sit on the first token
/// of its construct and, on success, leaves it on the first token after it.
/// On failure nothing is consumed past the offending token and no recovery is
/// attempted; the caller decides how to resynchronise.
pub struct Parser {
    lexer: Lexer,
    current: Token,
    binop_precedence: PrecedenceTable,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Parser {
        Parser::with_precedence(lexer, PrecedenceTable::default())
    }

    pub fn with_precedence(lexer: Lexer, binop_precedence: PrecedenceTable) -> Parser {
        let mut parser = Parser {
            lexer,
            current: Token::Eof,
            binop_precedence,
        };
        parser.next_token();
        parser
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn next_token(&mut self) -> &Token {
        self.current = self.lexer.next_token();
        &self.current
    }

    pub fn precedence(&self) -> &PrecedenceTable {
        &self.binop_precedence
    }

    fn token_precedence(&self) -> i32 {
        self.binop_precedence.precedence_of(&self.current)
    }

    fn expect(&mut self, expected: Token, msg: &str) -> Result<(), Error> {
        if self.current != expected {
            return error(msg);
        }
        self.next_token();
        Ok(())
    }

    fn parse_number(&mut self, n: f64) -> Result<Expr, Error> {
        self.next_token();
        Ok(Expr::Number(n))
    }

    fn parse_paren(&mut self) -> Result<Expr, Error> {
        self.next_token();
        let e = self.parse_expression()?;
        self.expect(Token::Kwd(')'), "expected ')'")?;
        Ok(e)
    }

    pub fn parse_identifier_or_call(&mut self) -> Result<Expr, Error> {
        let name = match &self.current {
            Token::Ident(id) => id.clone(),
            _ => return error("expected identifier"),
        };
        self.next_token();

        if self.current != Token::Kwd('(') {
            return Ok(Expr::Variable(name));
        }
        self.next_token();

        let mut args = Vec::new();
        if self.current != Token::Kwd(')') {
            loop {
                args.push(self.parse_expression()?);
                if self.current == Token::Kwd(')') {
                    break;
                }
                if self.current != Token::Kwd(',') {
                    return error("expected ')' or ',' in argument list");
                }
                self.next_token();
            }
        }
        self.next_token();

        Ok(Expr::Call(name, args))
    }

    pub fn parse_primary(&mut self) -> Result<Expr, Error> {
        match self.current {
            Token::Ident(_) => self.parse_identifier_or_call(),
            Token::Number(n) => self.parse_number(n),
            Token::Kwd('(') => self.parse_paren(),
            Token::If => self.parse_if(),
            Token::For => self.parse_for(),
            _ => error("unknown token when expecting an expression"),
        }
    }

    /// A prefix operator application, or a primary expression. Punctuation
    /// and non-ASCII characters are never prefix operators.
    pub fn parse_unary(&mut self) -> Result<Expr, Error> {
        match self.current {
            Token::Kwd(op) if op.is_ascii() && !"(),;".contains(op) => {
                self.next_token();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(op, Box::new(operand)))
            }
            _ => self.parse_primary(),
        }
    }

    pub fn parse_expression(&mut self) -> Result<Expr, Error> {
        let lhs = self.parse_unary()?;
        self.parse_binary_op_rhs(0, lhs)
    }

    /// Precedence climbing: folds `op rhs` pairs into `lhs` for as long as the
    /// operators bind at least as tightly as `min_prec`.
    pub fn parse_binary_op_rhs(&mut self, min_prec: i32, lhs: Expr) -> Result<Expr, Error> {
        let mut lhs = lhs;
        loop {
            let prec = self.token_precedence();
            let op = match self.current {
                Token::Kwd(op) if prec >= min_prec => op,
                _ => return Ok(lhs),
            };
            self.next_token();

            let mut rhs = self.parse_unary()?;

            let next_prec = self.token_precedence();
            if prec < next_prec {
                rhs = self.parse_binary_op_rhs(prec + 1, rhs)?;
            }

            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    pub fn parse_if(&mut self) -> Result<Expr, Error> {
        self.next_token();

        let cond = self.parse_expression()?;
        self.expect(Token::Then, "expected then")?;
        let then = self.parse_expression()?;
        self.expect(Token::Else, "expected else")?;
        let otherwise = self.parse_expression()?;

        Ok(Expr::If(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    pub fn parse_for(&mut self) -> Result<Expr, Error> {
        self.next_token();

        let id = match &self.current {
            Token::Ident(id) => id.clone(),
            _ => return error("expected identifier after for"),
        };
        self.next_token();

        self.expect(Token::Kwd('='), "expected '=' after for")?;
        let start = self.parse_expression()?;
        self.expect(Token::Kwd(','), "expected ',' after for start value")?;
        let end = self.parse_expression()?;

        let step = if self.current == Token::Kwd(',') {
            self.next_token();
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        self.expect(Token::In, "expected 'in' after for")?;
        let body = self.parse_expression()?;

        Ok(Expr::For(
            id,
            Box::new(start),
            Box::new(end),
            step,
            Box::new(body),
        ))
    }

    fn operator_char(&mut self, msg: &str) -> Result<char, Error> {
        match self.current {
            Token::Kwd(op) if op.is_ascii() => {
                self.next_token();
                Ok(op)
            }
            _ => error(msg),
        }
    }

    /// `name(params)`, `unary<op>(param)` or `binary<op> [prec] (lhs rhs)`.
    ///
    /// Declaring a binary operator registers its precedence immediately, so
    /// the body of its own definition can already use it.
    pub fn parse_prototype(&mut self) -> Result<Prototype, Error> {
        enum Kind {
            Identifier,
            Unary,
            Binary(char),
        }

        let mut precedence = DEFAULT_OPERATOR_PRECEDENCE;
        let (name, kind) = match self.current.clone() {
            Token::Ident(id) => {
                self.next_token();
                (id, Kind::Identifier)
            }
            Token::Unary => {
                self.next_token();
                let op = self.operator_char("expected unary operator")?;
                (format!("unary{}", op), Kind::Unary)
            }
            Token::Binary => {
                self.next_token();
                let op = self.operator_char("expected binary operator")?;
                if let Token::Number(n) = self.current {
                    if !(1.0..=100.0).contains(&n) {
                        return error("invalid precedence: must be 1..100");
                    }
                    precedence = n as usize;
                    self.next_token();
                }
                (format!("binary{}", op), Kind::Binary(op))
            }
            _ => return error("expected function name in prototype"),
        };

        if self.current != Token::Kwd('(') {
            return error("expected '(' in prototype");
        }

        let mut params: Vec<String> = Vec::new();
        while let Token::Ident(id) = self.next_token() {
            if params.contains(id) {
                return error("duplicate parameter name in prototype");
            }
            params.push(id.clone());
        }
        self.expect(Token::Kwd(')'), "expected ')' in prototype")?;

        match kind {
            Kind::Identifier => Ok(Prototype::new(&name, params)),
            Kind::Unary if params.len() != 1 => {
                error("invalid number of operands for operator")
            }
            Kind::Binary(_) if params.len() != 2 => {
                error("invalid number of operands for operator")
            }
            Kind::Unary => Ok(Prototype::operator(name, params, precedence)),
            Kind::Binary(op) => {
                self.binop_precedence.install(op, precedence as i32);
                Ok(Prototype::operator(name, params, precedence))
            }
        }
    }

    pub fn parse_definition(&mut self) -> Result<Function, Error> {
        self.next_token();
        let proto = self.parse_prototype()?;
        let body = self.parse_expression()?;
        log::debug!("parsed a function definition '{}'", proto.name);
        Ok(Function::new(proto, body))
    }

    pub fn parse_extern(&mut self) -> Result<Prototype, Error> {
        self.next_token();
        let proto = self.parse_prototype()?;
        log::debug!("parsed an extern '{}'", proto.name);
        Ok(proto)
    }

    pub fn parse_top_level_expression(&mut self) -> Result<Function, Error> {
        let body = self.parse_expression()?;
        log::debug!("parsed a top-level expression");
        Ok(Function::new(Prototype::anonymous(), body))
    }
}
