#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Def,
    Extern,
    If,
    Then,
    Else,
    For,
    In,
    Binary,
    Unary,
    Ident(String),
    Number(f64),
    Kwd(char),
    Eof,
}

impl Token {
    pub(crate) fn keyword(word: &str) -> Option<Token> {
        match word {
            "def" => Some(Token::Def),
            "extern" => Some(Token::Extern),
            "if" => Some(Token::If),
            "then" => Some(Token::Then),
            "else" => Some(Token::Else),
            "for" => Some(Token::For),
            "in" => Some(Token::In),
            "binary" => Some(Token::Binary),
            "unary" => Some(Token::Unary),
            _ => None,
        }
    }
}
