// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeMap;

use crate::bitset::BitSet;

pub const END_NAME: &str = "$end";
pub const START_NAME: &str = "$start";

/// A terminal symbol code. Code `0` is the end-of-input marker `$end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(u32);

impl Token {
    pub const END: Token = Token(0);

    pub fn new(code: u32) -> Self {
        Token(code)
    }

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A nonterminal symbol code. Code `num_terminals` is the synthetic start
/// nonterminal `$start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonTerminal(u32);

impl NonTerminal {
    pub fn new(code: u32) -> Self {
        NonTerminal(code)
    }

    pub fn code(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    Terminal(Token),
    NonTerminal(NonTerminal),
}

impl From<Token> for Symbol {
    fn from(token: Token) -> Self {
        Symbol::Terminal(token)
    }
}

impl From<NonTerminal> for Symbol {
    fn from(non_terminal: NonTerminal) -> Self {
        Symbol::NonTerminal(non_terminal)
    }
}

impl Symbol {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }

    pub fn is_non_terminal(&self) -> bool {
        matches!(self, Symbol::NonTerminal(_))
    }

    pub fn code(&self) -> u32 {
        match self {
            Symbol::Terminal(token) => token.code(),
            Symbol::NonTerminal(non_terminal) => non_terminal.code(),
        }
    }
}

/// Maps symbol names to dense codes: terminals occupy `[0, num_terminals)`
/// with `$end` at 0, nonterminals occupy `[num_terminals, num_symbols)` with
/// `$start` at `num_terminals`.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Vec<String>,
    num_terminals: usize,
    index: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    pub(crate) fn build(token_names: &[String], non_terminal_names: &[String]) -> Self {
        let mut names = vec![END_NAME.to_string()];
        names.extend(token_names.iter().cloned());
        let num_terminals = names.len();
        names.push(START_NAME.to_string());
        names.extend(non_terminal_names.iter().cloned());
        let mut index = BTreeMap::new();
        for (code, name) in names.iter().enumerate() {
            let symbol = if code < num_terminals {
                Symbol::Terminal(Token(code as u32))
            } else {
                Symbol::NonTerminal(NonTerminal(code as u32))
            };
            index.insert(name.clone(), symbol);
        }
        Self {
            names,
            num_terminals,
            index,
        }
    }

    pub fn num_terminals(&self) -> usize {
        self.num_terminals
    }

    pub fn num_non_terminals(&self) -> usize {
        self.names.len() - self.num_terminals
    }

    pub fn num_symbols(&self) -> usize {
        self.names.len()
    }

    pub fn start_non_terminal(&self) -> NonTerminal {
        NonTerminal(self.num_terminals as u32)
    }

    pub fn token(&self, name: &str) -> Option<Token> {
        match self.index.get(name) {
            Some(Symbol::Terminal(token)) => Some(*token),
            _ => None,
        }
    }

    pub fn non_terminal(&self, name: &str) -> Option<NonTerminal> {
        match self.index.get(name) {
            Some(Symbol::NonTerminal(non_terminal)) => Some(*non_terminal),
            _ => None,
        }
    }

    pub fn symbol(&self, name: &str) -> Option<Symbol> {
        self.index.get(name).copied()
    }

    pub fn name(&self, symbol: &Symbol) -> &str {
        &self.names[symbol.code() as usize]
    }

    pub fn token_name(&self, token: Token) -> &str {
        &self.names[token.index()]
    }

    pub fn non_terminal_name(&self, non_terminal: NonTerminal) -> &str {
        &self.names[non_terminal.code() as usize]
    }

    pub fn non_terminal_index(&self, non_terminal: NonTerminal) -> usize {
        non_terminal.code() as usize - self.num_terminals
    }

    pub fn non_terminal_at(&self, index: usize) -> NonTerminal {
        debug_assert!(index < self.num_non_terminals());
        NonTerminal((self.num_terminals + index) as u32)
    }

    pub fn tokens(&self) -> impl Iterator<Item = Token> {
        (0..self.num_terminals as u32).map(Token)
    }

    pub fn non_terminals(&self) -> impl Iterator<Item = NonTerminal> + '_ {
        (self.num_terminals as u32..self.names.len() as u32).map(NonTerminal)
    }

    pub fn format_token_set(&self, set: &BitSet) -> String {
        let mut string = "{".to_string();
        for (index, element) in set.iter().enumerate() {
            if index == 0 {
                string += self.token_name(Token(element as u32));
            } else {
                string += &format!(", {}", self.token_name(Token(element as u32)));
            }
        }
        string += "}";
        string
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_names() {
        let table = SymbolTable::build(
            &["a".to_string(), "b".to_string()],
            &["S".to_string(), "A".to_string()],
        );
        assert_eq!(table.num_terminals(), 3);
        assert_eq!(table.num_non_terminals(), 3);
        assert_eq!(table.num_symbols(), 6);
        assert_eq!(table.token(END_NAME), Some(Token::END));
        assert_eq!(table.token("a"), Some(Token::new(1)));
        assert_eq!(table.token("b"), Some(Token::new(2)));
        assert_eq!(table.non_terminal(START_NAME), Some(table.start_non_terminal()));
        assert_eq!(table.non_terminal("S"), Some(NonTerminal::new(4)));
        assert_eq!(table.non_terminal("A"), Some(NonTerminal::new(5)));
        assert_eq!(table.token("S"), None);
        assert_eq!(table.symbol("nothing"), None);
        assert_eq!(table.non_terminal_index(NonTerminal::new(4)), 1);
        assert_eq!(table.non_terminal_at(2), NonTerminal::new(5));
        assert_eq!(table.token_name(Token::new(1)), "a");
        assert_eq!(table.non_terminal_name(NonTerminal::new(4)), "S");
    }

    #[test]
    fn token_set_formatting() {
        let table = SymbolTable::build(&["a".to_string(), "b".to_string()], &["S".to_string()]);
        let mut set = BitSet::new(table.num_terminals());
        set.insert(Token::END.index());
        set.insert(2);
        assert_eq!(table.format_token_set(&set), "{$end, b}");
    }
}
