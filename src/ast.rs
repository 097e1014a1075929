#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Unary(char, Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `for var = start, end [, step] in body`
    For(String, Box<Expr>, Box<Expr>, Option<Box<Expr>>, Box<Expr>),
}

/// Name given to the function wrapping a bare top-level expression.
pub const ANONYMOUS_FUNCTION: &str = "__anon_expr";

/// Default precedence of a user-defined binary operator.
pub const DEFAULT_OPERATOR_PRECEDENCE: usize = 30;

/// A function signature. Operator prototypes are named `binary<op>` or
/// `unary<op>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
    pub is_operator: bool,
    pub precedence: usize,
}

impl Prototype {
    pub fn new(name: &str, params: Vec<String>) -> Prototype {
        Prototype {
            name: name.to_owned(),
            params,
            is_operator: false,
            precedence: 0,
        }
    }

    pub fn operator(name: String, params: Vec<String>, precedence: usize) -> Prototype {
        Prototype {
            name,
            params,
            is_operator: true,
            precedence,
        }
    }

    pub fn anonymous() -> Prototype {
        Prototype::new(ANONYMOUS_FUNCTION, vec![])
    }

    pub fn is_unary(&self) -> bool {
        self.is_operator && self.params.len() == 1
    }

    pub fn is_binary(&self) -> bool {
        self.is_operator && self.params.len() == 2
    }

    pub fn operator_name(&self) -> Option<char> {
        if self.is_unary() || self.is_binary() {
            self.name.chars().last()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub proto: Prototype,
    pub body: Expr,
}

impl Function {
    pub fn new(proto: Prototype, body: Expr) -> Function {
        Function { proto, body }
    }

    pub fn is_anonymous(&self) -> bool {
        self.proto.name == ANONYMOUS_FUNCTION
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_operator_arity() {
        let neg = Prototype::operator("unary-".to_owned(), vec!["v".to_owned()], 30);
        assert!(neg.is_unary());
        assert!(!neg.is_binary());
        assert_eq!(neg.operator_name(), Some('-'));

        let or = Prototype::operator(
            "binary|".to_owned(),
            vec!["a".to_owned(), "b".to_owned()],
            5,
        );
        assert!(or.is_binary());
        assert!(!or.is_unary());
        assert_eq!(or.operator_name(), Some('|'));

        let plain = Prototype::new("f", vec!["x".to_owned()]);
        assert!(!plain.is_unary());
        assert_eq!(plain.operator_name(), None);
    }

    #[test]
    fn test_anonymous() {
        let f = Function::new(Prototype::anonymous(), Expr::Number(1.0));
        assert!(f.is_anonymous());
        assert!(f.proto.params.is_empty());
    }
}
