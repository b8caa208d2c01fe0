// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::Cell;

use log::debug;

use crate::bitset::BitSet;
use crate::grammar::Specification;
use crate::production::{GrammarItemKey, GrammarItemSet};
use crate::symbol::{NonTerminal, Symbol, Token};

/// The stage at which a state's reduce actions became unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStage {
    Lr0,
    Slr1,
    Lalr1,
    Unresolved,
}

impl std::fmt::Display for ResolutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResolutionStage::Lr0 => write!(f, "LR(0)"),
            ResolutionStage::Slr1 => write!(f, "SLR(1)"),
            ResolutionStage::Lalr1 => write!(f, "LALR(1)"),
            ResolutionStage::Unresolved => write!(f, "unresolved"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Terminal {
        token: Token,
        dest: u32,
    },
    NonTerminal {
        symbol: NonTerminal,
        dest: u32,
        nt_index: usize,
    },
}

impl Transition {
    pub fn dest(&self) -> u32 {
        match self {
            Transition::Terminal { dest, .. } | Transition::NonTerminal { dest, .. } => *dest,
        }
    }

    pub fn symbol(&self) -> Symbol {
        match self {
            Transition::Terminal { token, .. } => Symbol::Terminal(*token),
            Transition::NonTerminal { symbol, .. } => Symbol::NonTerminal(*symbol),
        }
    }
}

/// An entry in the grammar-wide dense list of nonterminal transitions. The
/// lookahead relations are computed over these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonTerminalTransition {
    pub source: u32,
    pub symbol: NonTerminal,
    pub dest: u32,
}

#[derive(Debug)]
pub struct ParserState {
    pub ident: u32,
    items: GrammarItemSet,
    transitions: Vec<Transition>,
    predecessors: Vec<u32>,
    final_items: Vec<GrammarItemKey>,
    lookahead_index: Option<usize>,
    resolution: Cell<ResolutionStage>,
}

impl ParserState {
    pub fn new(ident: u32, items: GrammarItemSet) -> Self {
        Self {
            ident,
            items,
            transitions: vec![],
            predecessors: vec![],
            final_items: vec![],
            lookahead_index: None,
            resolution: Cell::new(ResolutionStage::Unresolved),
        }
    }

    pub fn items(&self) -> &GrammarItemSet {
        &self.items
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn predecessors(&self) -> &[u32] {
        &self.predecessors
    }

    pub fn final_items(&self) -> &[GrammarItemKey] {
        &self.final_items
    }

    pub fn is_conflict_bearing(&self) -> bool {
        self.lookahead_index.is_some()
    }

    pub fn lookahead_index(&self) -> Option<usize> {
        self.lookahead_index
    }

    pub fn resolution(&self) -> ResolutionStage {
        self.resolution.get()
    }

    pub(crate) fn set_resolution(&self, stage: ResolutionStage) {
        self.resolution.set(stage)
    }

    fn add_transition(&mut self, transition: Transition) {
        debug_assert!(self
            .transitions
            .iter()
            .all(|t| t.symbol() != transition.symbol()));
        self.transitions.push(transition);
    }

    fn add_predecessor(&mut self, source: u32) {
        if !self.predecessors.contains(&source) {
            self.predecessors.push(source);
        }
    }

    pub fn has_terminal_transitions(&self) -> bool {
        self.transitions
            .iter()
            .any(|t| matches!(t, Transition::Terminal { .. }))
    }

    /// The terminals this state shifts on, as a set over `[0, num_terminals)`.
    pub fn shift_token_set(&self, num_terminals: usize) -> BitSet {
        let mut set = BitSet::new(num_terminals);
        for transition in self.transitions.iter() {
            if let Transition::Terminal { token, .. } = transition {
                set.insert(token.index());
            }
        }
        set
    }

    pub fn shift_target(&self, token: Token) -> Option<u32> {
        self.transitions.iter().find_map(|t| match t {
            Transition::Terminal { token: label, dest } if *label == token => Some(*dest),
            _ => None,
        })
    }

    pub fn goto_target(&self, non_terminal: NonTerminal) -> Option<u32> {
        self.transitions.iter().find_map(|t| match t {
            Transition::NonTerminal { symbol, dest, .. } if *symbol == non_terminal => Some(*dest),
            _ => None,
        })
    }

    /// The dense index of this state's outgoing nonterminal transition
    /// labeled `non_terminal`, if any.
    pub fn nt_transition_index(&self, non_terminal: NonTerminal) -> Option<usize> {
        self.transitions.iter().find_map(|t| match t {
            Transition::NonTerminal {
                symbol, nt_index, ..
            } if *symbol == non_terminal => Some(*nt_index),
            _ => None,
        })
    }
}

/// Builds the LR(0) characteristic automaton: states in discovery order,
/// canonical merging of equal item sets, predecessor links and a dense
/// numbering of nonterminal transitions.
pub(crate) fn build_automaton(
    specification: &Specification,
) -> (Vec<ParserState>, Vec<NonTerminalTransition>) {
    let start_kernel: GrammarItemSet = [GrammarItemKey::from(specification.production(0))]
        .into_iter()
        .collect();
    let mut parser_states = vec![ParserState::new(0, specification.closure(start_kernel))];
    let mut nt_transitions: Vec<NonTerminalTransition> = vec![];

    let mut index = 0;
    while index < parser_states.len() {
        let source = index as u32;
        let goto_sets: Vec<(Symbol, GrammarItemSet)> = {
            let state = &parser_states[index];
            state
                .items()
                .dot_symbols()
                .into_iter()
                .map(|symbol| {
                    let kernel = state.items().generate_goto_kernel(&symbol);
                    (symbol, specification.closure(kernel))
                })
                .collect()
        };
        for (symbol, item_set) in goto_sets {
            let dest = match parser_states
                .iter()
                .find(|state| state.items() == &item_set)
            {
                Some(equivalent_state) => equivalent_state.ident,
                None => {
                    let ident = parser_states.len() as u32;
                    parser_states.push(ParserState::new(ident, item_set));
                    ident
                }
            };
            let transition = match symbol {
                Symbol::Terminal(token) => Transition::Terminal { token, dest },
                Symbol::NonTerminal(symbol) => {
                    let nt_index = nt_transitions.len();
                    nt_transitions.push(NonTerminalTransition {
                        source,
                        symbol,
                        dest,
                    });
                    Transition::NonTerminal {
                        symbol,
                        dest,
                        nt_index,
                    }
                }
            };
            parser_states[index].add_transition(transition);
            parser_states[dest as usize].add_predecessor(source);
        }
        index += 1;
    }
    debug!(
        "automaton: {} states, {} nonterminal transitions",
        parser_states.len(),
        nt_transitions.len()
    );
    (parser_states, nt_transitions)
}

/// Classifies every state as LR(0)-clean or conflict-bearing, records its
/// final items and allots lookahead store slots. Returns the number of
/// conflict-bearing states.
pub(crate) fn classify_states(parser_states: &mut [ParserState]) -> usize {
    let mut conflict_count = 0;
    for state in parser_states.iter_mut() {
        state.final_items = state.items.reducible_keys();
        let clean = match state.final_items.len() {
            0 => true,
            1 => !state.has_terminal_transitions(),
            _ => false,
        };
        if clean {
            state.resolution.set(ResolutionStage::Lr0);
        } else {
            state.lookahead_index = Some(conflict_count);
            conflict_count += 1;
        }
    }
    debug!(
        "{} of {} states are conflict bearing",
        conflict_count,
        parser_states.len()
    );
    conflict_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Specification;

    #[test]
    fn two_way_choice_automaton() {
        let specification = Specification::new("%token a b\nS: a | b;\n", "test");
        assert_eq!(specification.error_count, 0);
        let (mut parser_states, nt_transitions) = build_automaton(&specification);
        // 0: start closure; S, a and b successors; $end successor of the S state.
        assert_eq!(parser_states.len(), 5);
        assert_eq!(nt_transitions.len(), 1);
        assert_eq!(parser_states[0].transitions().len(), 3);
        let conflict_count = classify_states(&mut parser_states);
        assert_eq!(conflict_count, 0);
        for state in parser_states.iter() {
            assert_eq!(state.resolution(), ResolutionStage::Lr0);
            assert!(!state.is_conflict_bearing());
        }
        // Shift determinism: one terminal transition per token.
        for state in parser_states.iter() {
            let shift_count = state
                .transitions()
                .iter()
                .filter(|t| matches!(t, Transition::Terminal { .. }))
                .count();
            assert_eq!(state.shift_token_set(3).len(), shift_count);
        }
        // Every predecessor link is recorded.
        for state in parser_states.iter() {
            for transition in state.transitions() {
                let dest = &parser_states[transition.dest() as usize];
                assert!(dest.predecessors().contains(&state.ident));
            }
        }
    }

    #[test]
    fn reduce_reduce_state_is_conflict_bearing() {
        let specification = Specification::new("%token x\nS: A | B;\nA: x;\nB: x;\n", "test");
        let (mut parser_states, _) = build_automaton(&specification);
        let conflict_count = classify_states(&mut parser_states);
        assert_eq!(conflict_count, 1);
        let conflicted: Vec<&ParserState> = parser_states
            .iter()
            .filter(|state| state.is_conflict_bearing())
            .collect();
        assert_eq!(conflicted.len(), 1);
        assert_eq!(conflicted[0].final_items().len(), 2);
        assert_eq!(conflicted[0].lookahead_index(), Some(0));
    }

    #[test]
    fn shift_reduce_potential_is_conflict_bearing() {
        // After "d" the state holds "A: d ." and "S: d . c".
        let specification = Specification::new(
            "%token a b c d\nS: A a | b A c | d c | b d a;\nA: d;\n",
            "test",
        );
        let (mut parser_states, _) = build_automaton(&specification);
        let conflict_count = classify_states(&mut parser_states);
        assert_eq!(conflict_count, 2);
    }
}
