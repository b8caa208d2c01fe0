// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use crate::grammar::Specification;
use crate::lookahead::StateLookaheads;
use crate::state::{ParserState, Transition};
use crate::symbol::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Fail,
    Shift(u32),
    Reduce(u32),
}

/// The dense `state x terminal` dispatch table of the generated parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTable {
    num_terminals: usize,
    cells: Vec<Action>,
}

impl ActionTable {
    fn new(num_states: usize, num_terminals: usize) -> Self {
        Self {
            num_terminals,
            cells: vec![Action::Fail; num_states * num_terminals],
        }
    }

    pub fn num_states(&self) -> usize {
        self.cells.len() / self.num_terminals
    }

    pub fn num_terminals(&self) -> usize {
        self.num_terminals
    }

    pub fn action(&self, state: u32, token: Token) -> Action {
        self.cells[state as usize * self.num_terminals + token.index()]
    }

    fn set_action(&mut self, state: u32, token: Token, action: Action) {
        self.cells[state as usize * self.num_terminals + token.index()] = action;
    }
}

/// The dense `state x nonterminal` table giving the destination state after
/// a reduction, `-1` where no transition exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GotoTable {
    num_non_terminals: usize,
    cells: Vec<i32>,
}

impl GotoTable {
    fn new(num_states: usize, num_non_terminals: usize) -> Self {
        Self {
            num_non_terminals,
            cells: vec![-1; num_states * num_non_terminals],
        }
    }

    pub fn num_states(&self) -> usize {
        self.cells.len() / self.num_non_terminals
    }

    pub fn num_non_terminals(&self) -> usize {
        self.num_non_terminals
    }

    pub fn goto_state(&self, state: u32, nt_index: usize) -> Option<u32> {
        match self.cells[state as usize * self.num_non_terminals + nt_index] {
            -1 => None,
            dest => Some(dest as u32),
        }
    }

    fn set_goto(&mut self, state: u32, nt_index: usize, dest: u32) {
        self.cells[state as usize * self.num_non_terminals + nt_index] = dest as i32;
    }
}

/// Materializes the ACTION and GOTO tables: reduce cells are written first
/// and terminal transitions overwrite them with shifts, so that shift wins
/// wherever an unresolved shift/reduce overlap remains.
pub(crate) fn emit_tables(
    specification: &Specification,
    parser_states: &[ParserState],
    lookaheads: &[StateLookaheads],
) -> (ActionTable, GotoTable) {
    let symbol_table = specification.symbol_table();
    let num_terminals = symbol_table.num_terminals();
    let mut actions = ActionTable::new(parser_states.len(), num_terminals);
    let mut gotos = GotoTable::new(parser_states.len(), symbol_table.num_non_terminals());
    for state in parser_states.iter() {
        if let Some(lookahead_index) = state.lookahead_index() {
            for (item, set) in lookaheads[lookahead_index].pairs() {
                for element in set.iter() {
                    actions.set_action(
                        state.ident,
                        Token::new(element as u32),
                        Action::Reduce(item.production().ident()),
                    );
                }
            }
        } else if let Some(item) = state.final_items().first() {
            // an LR(0)-clean state's single final item reduces on every terminal
            for token in symbol_table.tokens() {
                actions.set_action(state.ident, token, Action::Reduce(item.production().ident()));
            }
        }
        for transition in state.transitions() {
            match transition {
                Transition::Terminal { token, dest } => {
                    actions.set_action(state.ident, *token, Action::Shift(*dest));
                }
                Transition::NonTerminal { symbol, dest, .. } => {
                    gotos.set_goto(state.ident, symbol_table.non_terminal_index(*symbol), *dest);
                }
            }
        }
    }
    (actions, gotos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Grammar, Specification};
    use crate::state::ResolutionStage;
    use std::convert::TryFrom;

    /// The table invariants that hold for every successfully processed
    /// grammar.
    fn check_table_invariants(grammar: &Grammar) {
        let specification = grammar.specification();
        let symbol_table = specification.symbol_table();
        let actions = grammar.actions();
        let gotos = grammar.gotos();
        assert_eq!(actions.num_states(), grammar.parser_states().len());
        assert_eq!(gotos.num_states(), grammar.parser_states().len());
        for state in grammar.parser_states() {
            for token in symbol_table.tokens() {
                match actions.action(state.ident, token) {
                    Action::Shift(dest) => {
                        assert_eq!(state.shift_target(token), Some(dest));
                        assert!((dest as usize) < grammar.parser_states().len());
                    }
                    Action::Reduce(code) => {
                        let item = state
                            .final_items()
                            .iter()
                            .find(|item| item.production().ident() == code)
                            .expect("reduce cell names a final item of its state");
                        if let Some(entry) = grammar.state_lookaheads(state.ident) {
                            let set = entry
                                .pairs()
                                .find(|(key, _)| *key == item)
                                .map(|(_, set)| set)
                                .unwrap();
                            assert!(set.contains(token.index()));
                        }
                    }
                    Action::Fail => (),
                }
            }
            for index in 0..symbol_table.num_non_terminals() {
                if let Some(dest) = gotos.goto_state(state.ident, index) {
                    let non_terminal = symbol_table.non_terminal_at(index);
                    assert_eq!(state.goto_target(non_terminal), Some(dest));
                }
            }
            // reduce/reduce freedom in resolved conflict states
            if state.is_conflict_bearing() && state.resolution() != ResolutionStage::Unresolved {
                let entry = grammar.state_lookaheads(state.ident).unwrap();
                let sets = entry.sets();
                for (index, set) in sets.iter().enumerate() {
                    for other in sets[index + 1..].iter() {
                        assert!(set.is_disjoint(other));
                    }
                }
            }
        }
    }

    #[test]
    fn two_way_choice_tables() {
        let specification = Specification::new("%token a b\nS: a | b;\n", "test");
        let grammar = Grammar::try_from(specification).expect("grammar is LR(0)");
        check_table_invariants(&grammar);
        assert!(grammar.diagnostics().is_empty());
        let symbol_table = grammar.specification().symbol_table();
        let a = symbol_table.token("a").unwrap();
        let b = symbol_table.token("b").unwrap();
        assert!(matches!(grammar.actions().action(0, a), Action::Shift(_)));
        assert!(matches!(grammar.actions().action(0, b), Action::Shift(_)));
        assert_eq!(grammar.actions().action(0, Token::END), Action::Fail);
        // the states reached on "a" and "b" reduce on every terminal
        for token in [a, b] {
            let dest = match grammar.actions().action(0, token) {
                Action::Shift(dest) => dest,
                _ => unreachable!(),
            };
            for lookahead in symbol_table.tokens() {
                assert!(matches!(
                    grammar.actions().action(dest, lookahead),
                    Action::Reduce(_)
                ));
            }
        }
        // the goto on S is recorded for the start state
        let s = symbol_table.non_terminal("S").unwrap();
        let s_index = symbol_table.non_terminal_index(s);
        assert_eq!(
            grammar.gotos().goto_state(0, s_index),
            grammar.parser_states()[0].goto_target(s)
        );
        assert!(grammar.recognize_text("a"));
        assert!(grammar.recognize_text("b"));
        assert!(!grammar.recognize_text("a b"));
        assert!(!grammar.recognize_text(""));
    }

    #[test]
    fn dangling_else_shifts_and_warns() {
        let specification = Specification::new(
            "%token if then else x\nS: if E then S | if E then S else S | x;\nE: x;\n",
            "test",
        );
        let grammar = Grammar::try_from(specification).expect("shift/reduce is recoverable");
        check_table_invariants(&grammar);
        assert_eq!(grammar.diagnostics().len(), 1);
        let diagnostic = &grammar.diagnostics()[0];
        assert_eq!(diagnostic.severity, crate::grammar::Severity::Warning);
        assert_eq!(diagnostic.kind, crate::grammar::DiagnosticKind::ShiftReduce);
        // the conflicted state shifts on "else"
        let symbol_table = grammar.specification().symbol_table();
        let else_token = symbol_table.token("else").unwrap();
        let state = &grammar.parser_states()[diagnostic.state as usize];
        assert_eq!(state.resolution(), ResolutionStage::Unresolved);
        assert!(matches!(
            grammar.actions().action(diagnostic.state, else_token),
            Action::Shift(_)
        ));
        assert_eq!(grammar.total_unresolved_conflicts(), 1);
        // the else binds to the innermost if
        assert!(grammar.recognize_text("if x then x"));
        assert!(grammar.recognize_text("if x then x else x"));
        assert!(grammar.recognize_text("if x then if x then x else x"));
        assert!(!grammar.recognize_text("if x else x"));
    }

    #[test]
    fn emitted_tables_are_deterministic() {
        let text = "%token a b c d\nS: A a | b A c | d c | b d a;\nA: d;\n";
        let first = Grammar::try_from(Specification::new(text, "test")).unwrap();
        let second = Grammar::try_from(Specification::new(text, "test")).unwrap();
        assert_eq!(first.actions(), second.actions());
        assert_eq!(first.gotos(), second.gotos());
        assert_eq!(first.resolution_profile(), second.resolution_profile());
    }
}
