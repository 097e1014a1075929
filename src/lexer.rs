use super::token::Token;
use combine::error::ParseError;
use combine::parser::char::{digit, spaces};
use combine::parser::Parser;
use combine::stream::Stream;
use combine::{any, choice, eof, many, many1, parser, satisfy, skip_many, token};
use std::io::{BufRead, Cursor};

/// Reads the longest prefix of a digit/`.` run that forms a float, the way
/// `strtod` does: `1.2.3` is `1.2` and a lone `.` is `0.0`.
fn lax_float(digits: &str) -> f64 {
    (1..=digits.len())
        .rev()
        .find_map(|end| digits[..end].parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn number<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(choice((digit(), token('.')))).map(|ns: String| Token::Number(lax_float(&ns)))
}

fn ident<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        satisfy(|c: char| c.is_ascii_alphabetic()),
        many(satisfy(|c: char| c.is_ascii_alphanumeric())),
    )
        .map(|(first, rest): (char, String)| {
            let mut id = String::with_capacity(rest.len() + 1);
            id.push(first);
            id.push_str(&rest);
            Token::keyword(&id).unwrap_or(Token::Ident(id))
        })
}

fn comment<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        token('#'),
        skip_many(satisfy(|c: char| c != '\n' && c != '\r')),
    )
        .map(|_| ())
}

fn lex_<Input>() -> impl Parser<Input, Output = Option<Token>>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    spaces().with(choice((
        number().map(Some),
        ident().map(Some),
        comment().with(lex()),
        eof().map(|_| None),
        any().map(|c| Some(Token::Kwd(c))),
    )))
}

parser! {
    /// One token from a chunk of input, or `None` once the chunk holds
    /// nothing but whitespace and comments.
    pub(crate) fn lex[Input]()(Input) -> Option<Token>
        where [Input: Stream<Token=char>]
    {
        lex_()
    }
}

/// Pulls tokens on demand from a line-buffered character source.
///
/// Tokens never span a line break, so the scanner only needs to refill its
/// buffer when the current line has been used up. The scanner itself never
/// fails: any character it does not recognise becomes a `Token::Kwd`, and
/// bytes that are not UTF-8 are read as U+FFFD. Once `Token::Eof` has been
/// returned it is returned forever.
pub struct Lexer {
    source: Box<dyn BufRead>,
    line: String,
    pos: usize,
    exhausted: bool,
}

impl Lexer {
    pub fn new<R: BufRead + 'static>(source: R) -> Lexer {
        Lexer {
            source: Box::new(source),
            line: String::new(),
            pos: 0,
            exhausted: false,
        }
    }

    pub fn with_text(text: &str) -> Lexer {
        Lexer::new(Cursor::new(text.to_owned()))
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            let step = match lex().parse(&self.line[self.pos..]) {
                Ok((token, rest)) => Ok((token, self.line.len() - rest.len())),
                Err(e) => Err(e.to_string()),
            };
            match step {
                Ok((Some(token), pos)) => {
                    self.pos = pos;
                    log::trace!("token {:?}", token);
                    return token;
                }
                Ok((None, _)) => {
                    if !self.fill() {
                        log::trace!("token Eof");
                        return Token::Eof;
                    }
                }
                Err(e) => {
                    log::error!("scanner stuck on {:?}: {}", &self.line[self.pos..], e);
                    self.pos = self.line.len();
                }
            }
        }
    }

    fn fill(&mut self) -> bool {
        self.line.clear();
        self.pos = 0;
        if self.exhausted {
            return false;
        }

        let mut bytes = Vec::new();
        match self.source.read_until(b'\n', &mut bytes) {
            Ok(0) => {
                self.exhausted = true;
                false
            }
            Ok(_) => {
                self.line = match String::from_utf8(bytes) {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("invalid UTF-8 in input: {}", e);
                        String::from_utf8_lossy(e.as_bytes()).into_owned()
                    }
                };
                true
            }
            Err(e) => {
                log::error!("input closed: {}", e);
                self.exhausted = true;
                false
            }
        }
    }
}
