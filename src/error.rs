use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};
use std::io;

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Debug, PartialEq, Fail)]
pub enum ErrorKind {
    #[fail(display = "{}", _0)]
    Parse(String),
    #[fail(display = "unknown variable name '{}'", _0)]
    UnknownVariable(String),
    #[fail(display = "unknown function referenced '{}'", _0)]
    UnknownFunction(String),
    #[fail(
        display = "incorrect # arguments passed to '{}': expected {}, found {}",
        callee, expected, found
    )]
    ArgumentCount {
        callee: String,
        expected: usize,
        found: usize,
    },
    #[fail(display = "invalid binary operator '{}'", _0)]
    InvalidBinaryOperator(char),
    #[fail(display = "unknown unary operator '{}'", _0)]
    InvalidUnaryOperator(char),
    #[fail(display = "function '{}' cannot be redefined", _0)]
    Redefinition(String),
    #[fail(display = "{}", _0)]
    Codegen(String),
    #[fail(display = "backend: {}", _0)]
    Backend(String),
    #[fail(display = "execution: {}", _0)]
    Execution(String),
    #[fail(display = "input error")]
    Io,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::from(e.context(ErrorKind::Io))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_kind() {
        let e = Error::from(ErrorKind::Redefinition("f".to_owned()));
        assert_eq!(e.kind(), &ErrorKind::Redefinition("f".to_owned()));
        assert_eq!(e.to_string(), "function 'f' cannot be redefined");
    }

    #[test]
    fn test_argument_count_display() {
        let e = Error::from(ErrorKind::ArgumentCount {
            callee: "f".to_owned(),
            expected: 2,
            found: 1,
        });
        assert_eq!(
            e.to_string(),
            "incorrect # arguments passed to 'f': expected 2, found 1"
        );
    }

    #[test]
    fn test_io_cause() {
        let e = Error::from(io::Error::new(io::ErrorKind::Other, "closed"));
        assert_eq!(e.kind(), &ErrorKind::Io);
        assert!(e.cause().is_some());
    }
}
