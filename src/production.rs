// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::symbol::{NonTerminal, Symbol, SymbolTable};

#[derive(Debug)]
pub struct ProductionData {
    ident: u32,
    left_hand_side: NonTerminal,
    right_hand_side: Vec<Symbol>,
}

/// A grammar production, ordered and equated by its dense ident. Production
/// `0` is the synthetic `$start` production.
#[derive(Debug, Clone)]
pub struct Production(Rc<ProductionData>);

impl Production {
    pub fn new(ident: u32, left_hand_side: NonTerminal, right_hand_side: Vec<Symbol>) -> Self {
        Self(Rc::new(ProductionData {
            ident,
            left_hand_side,
            right_hand_side,
        }))
    }

    pub fn ident(&self) -> u32 {
        self.0.ident
    }

    pub fn len(&self) -> usize {
        self.0.right_hand_side.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn left_hand_side(&self) -> NonTerminal {
        self.0.left_hand_side
    }

    pub fn right_hand_side(&self) -> &[Symbol] {
        &self.0.right_hand_side
    }

    pub fn right_hand_side_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.0.right_hand_side.iter()
    }

    pub fn as_string(&self, symbol_table: &SymbolTable) -> String {
        let mut string = format!("{}:", symbol_table.non_terminal_name(self.left_hand_side()));
        if self.is_empty() {
            string += " <empty>";
        } else {
            for symbol in self.right_hand_side_symbols() {
                string += &format!(" {}", symbol_table.name(symbol));
            }
        }
        string
    }
}

impl PartialEq for Production {
    fn eq(&self, other: &Self) -> bool {
        self.0.ident == other.0.ident
    }
}

impl Eq for Production {}

impl PartialOrd for Production {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Production {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.ident.cmp(&other.0.ident)
    }
}

/// An LR(0) item: a production with a dot position in `[0, len]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GrammarItemKey {
    production: Production,
    dot: usize,
}

impl From<&Production> for GrammarItemKey {
    fn from(production: &Production) -> Self {
        Self {
            production: production.clone(),
            dot: 0,
        }
    }
}

impl GrammarItemKey {
    pub fn production(&self) -> &Production {
        &self.production
    }

    pub fn dot(&self) -> usize {
        self.dot
    }

    pub fn shifted(&self) -> Self {
        debug_assert!(self.dot < self.production.len());
        Self {
            production: self.production.clone(),
            dot: self.dot + 1,
        }
    }

    pub fn is_reducible(&self) -> bool {
        self.dot >= self.production.len()
    }

    pub fn is_kernel_item(&self) -> bool {
        self.dot > 0 || self.production.ident() == 0
    }

    pub fn is_closable(&self) -> bool {
        match self.next_symbol() {
            Some(symbol) => symbol.is_non_terminal(),
            None => false,
        }
    }

    pub fn next_symbol(&self) -> Option<&Symbol> {
        self.production.right_hand_side().get(self.dot)
    }

    pub fn next_symbol_is(&self, symbol: &Symbol) -> bool {
        match self.next_symbol() {
            Some(next_symbol) => next_symbol == symbol,
            None => false,
        }
    }

    /// The symbols after the dot.
    pub fn tail(&self) -> &[Symbol] {
        &self.production.right_hand_side()[self.dot..]
    }

    pub fn as_string(&self, symbol_table: &SymbolTable) -> String {
        let mut string = format!(
            "{}:",
            symbol_table.non_terminal_name(self.production.left_hand_side())
        );
        if self.production.is_empty() {
            string += " . <empty>";
        } else {
            for (index, symbol) in self.production.right_hand_side_symbols().enumerate() {
                if index == self.dot {
                    string += &format!(" . {}", symbol_table.name(symbol));
                } else {
                    string += &format!(" {}", symbol_table.name(symbol));
                }
            }
            if self.dot >= self.production.len() {
                string += " .";
            }
        }
        string
    }
}

/// A set of items; two sets are equal iff they hold the same items.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GrammarItemSet(BTreeSet<GrammarItemKey>);

impl FromIterator<GrammarItemKey> for GrammarItemSet {
    fn from_iter<I: IntoIterator<Item = GrammarItemKey>>(iter: I) -> Self {
        Self(BTreeSet::from_iter(iter))
    }
}

impl GrammarItemSet {
    pub fn iter(&self) -> impl Iterator<Item = &GrammarItemKey> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: GrammarItemKey) -> bool {
        self.0.insert(key)
    }

    pub fn contains(&self, key: &GrammarItemKey) -> bool {
        self.0.contains(key)
    }

    /// The distinct symbols appearing after a dot, in item order.
    pub fn dot_symbols(&self) -> Vec<Symbol> {
        let mut already_seen = BTreeSet::new();
        let mut symbols = vec![];
        for key in self.0.iter() {
            if let Some(symbol) = key.next_symbol() {
                if already_seen.insert(*symbol) {
                    symbols.push(*symbol);
                }
            }
        }
        symbols
    }

    pub fn generate_goto_kernel(&self, symbol: &Symbol) -> GrammarItemSet {
        self.0
            .iter()
            .filter(|key| key.next_symbol_is(symbol))
            .map(|key| key.shifted())
            .collect()
    }

    pub fn reducible_keys(&self) -> Vec<GrammarItemKey> {
        self.0
            .iter()
            .filter(|key| key.is_reducible())
            .cloned()
            .collect()
    }
}
