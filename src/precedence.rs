use super::token::Token;
use std::collections::HashMap;

/// Binding strength of infix operators; higher binds tighter.
///
/// The table is shared by the whole session: declaring `def binary| 5 (a b)`
/// makes `|` an infix operator everywhere from that point on.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecedenceTable {
    table: HashMap<char, i32>,
}

impl PrecedenceTable {
    pub fn empty() -> PrecedenceTable {
        PrecedenceTable {
            table: HashMap::new(),
        }
    }

    /// Precedence of `op`, or -1 when it is not a registered infix operator.
    pub fn get(&self, op: char) -> i32 {
        if !op.is_ascii() {
            return -1;
        }
        match self.table.get(&op) {
            Some(&prec) if prec > 0 => prec,
            _ => -1,
        }
    }

    pub fn precedence_of(&self, token: &Token) -> i32 {
        match token {
            Token::Kwd(op) => self.get(*op),
            _ => -1,
        }
    }

    pub fn install(&mut self, op: char, precedence: i32) {
        log::debug!("operator '{}' installed with precedence {}", op, precedence);
        self.table.insert(op, precedence);
    }
}

impl Default for PrecedenceTable {
    fn default() -> PrecedenceTable {
        let mut table = PrecedenceTable::empty();
        table.install('<', 10);
        table.install('+', 20);
        table.install('-', 20);
        table.install('*', 40);
        table
    }
}
