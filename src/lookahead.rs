// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeSet;

use log::debug;

use crate::bitset::BitSet;
use crate::grammar::Specification;
use crate::production::GrammarItemKey;
use crate::state::{NonTerminalTransition, ParserState, ResolutionStage, Transition};
use crate::symbol::{NonTerminal, Symbol};

/// The lookahead store entry for one conflict-bearing state: its final items
/// index aligned with their lookahead sets.
#[derive(Debug)]
pub struct StateLookaheads {
    pub(crate) items: Vec<GrammarItemKey>,
    pub(crate) sets: Vec<BitSet>,
}

impl StateLookaheads {
    pub(crate) fn new(items: Vec<GrammarItemKey>) -> Self {
        Self {
            items,
            sets: vec![],
        }
    }

    pub fn items(&self) -> &[GrammarItemKey] {
        &self.items
    }

    pub fn sets(&self) -> &[BitSet] {
        &self.sets
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&GrammarItemKey, &BitSet)> {
        self.items.iter().zip(self.sets.iter())
    }
}

/// The transition-relation sets computed by the lookahead passes, kept for
/// inspection after the run. `read`, `follow` and `slr_follow` are only
/// present when the pass that computes them ran.
#[derive(Debug, Default)]
pub struct LookaheadAnalysis {
    pub direct_read: Vec<BitSet>,
    pub read: Option<Vec<BitSet>>,
    pub follow: Option<Vec<BitSet>>,
    pub slr_follow: Option<Vec<BitSet>>,
}

struct Traversal {
    depth: Vec<usize>,
    stack: Vec<usize>,
    sets: Vec<BitSet>,
}

/// Computes the least fixed point `F(x) = I(x) ∪ ⋃{F(y) : x → y}` for every
/// vertex of a digraph, Tarjan style: vertices of one strongly connected
/// component share one set. `initial` is invoked exactly once per vertex.
pub(crate) fn digraph<S, I>(
    num_vertices: usize,
    capacity: usize,
    successors: S,
    mut initial: I,
) -> Vec<BitSet>
where
    S: Fn(usize) -> Vec<usize>,
    I: FnMut(usize) -> BitSet,
{
    let mut traversal = Traversal {
        depth: vec![0; num_vertices],
        stack: Vec::with_capacity(num_vertices),
        sets: vec![BitSet::new(capacity); num_vertices],
    };
    for vertex in 0..num_vertices {
        if traversal.depth[vertex] == 0 {
            traverse(vertex, &successors, &mut initial, &mut traversal);
        }
    }
    traversal.sets
}

fn traverse<S, I>(vertex: usize, successors: &S, initial: &mut I, traversal: &mut Traversal)
where
    S: Fn(usize) -> Vec<usize>,
    I: FnMut(usize) -> BitSet,
{
    traversal.stack.push(vertex);
    let base_depth = traversal.stack.len();
    traversal.depth[vertex] = base_depth;
    traversal.sets[vertex] = initial(vertex);
    for successor in successors(vertex) {
        if traversal.depth[successor] == 0 {
            traverse(successor, successors, initial, traversal);
        }
        traversal.depth[vertex] = traversal.depth[vertex].min(traversal.depth[successor]);
        if successor != vertex {
            let successor_set = traversal.sets[successor].clone();
            traversal.sets[vertex] |= &successor_set;
        }
    }
    if traversal.depth[vertex] == base_depth {
        // vertex is the root of its strongly connected component
        while let Some(member) = traversal.stack.pop() {
            traversal.depth[member] = usize::MAX;
            if member == vertex {
                break;
            }
            traversal.sets[member] = traversal.sets[vertex].clone();
        }
    }
}

/// Walks `|rhs|` steps backward from `state` along predecessor edges and
/// returns the dense indices of the reached states' outgoing nonterminal
/// transitions labeled with the item's left hand side.
pub(crate) fn lookback(
    parser_states: &[ParserState],
    state: u32,
    item: &GrammarItemKey,
) -> Vec<usize> {
    let mut frontier: BTreeSet<u32> = BTreeSet::from([state]);
    for _ in 0..item.production().len() {
        frontier = expand_backwards(parser_states, &frontier);
    }
    let left_hand_side = item.production().left_hand_side();
    let mut transitions: Vec<usize> = frontier
        .iter()
        .filter_map(|s| parser_states[*s as usize].nt_transition_index(left_hand_side))
        .collect();
    transitions.sort_unstable();
    transitions.dedup();
    transitions
}

fn expand_backwards(parser_states: &[ParserState], frontier: &BTreeSet<u32>) -> BTreeSet<u32> {
    frontier
        .iter()
        .flat_map(|s| parser_states[*s as usize].predecessors().iter().copied())
        .collect()
}

pub(crate) struct LookaheadEngine<'a> {
    specification: &'a Specification,
    parser_states: &'a [ParserState],
    transitions: &'a [NonTerminalTransition],
    nullable: &'a BitSet,
    direct_read: Option<Vec<BitSet>>,
    read: Option<Vec<BitSet>>,
    follow: Option<Vec<BitSet>>,
    slr_follow: Option<Vec<BitSet>>,
}

impl<'a> LookaheadEngine<'a> {
    pub(crate) fn new(
        specification: &'a Specification,
        parser_states: &'a [ParserState],
        transitions: &'a [NonTerminalTransition],
        nullable: &'a BitSet,
    ) -> Self {
        Self {
            specification,
            parser_states,
            transitions,
            nullable,
            direct_read: None,
            read: None,
            follow: None,
            slr_follow: None,
        }
    }

    fn num_terminals(&self) -> usize {
        self.specification.symbol_table().num_terminals()
    }

    fn nullable_index(&self, non_terminal: NonTerminal) -> usize {
        self.specification
            .symbol_table()
            .non_terminal_index(non_terminal)
    }

    fn sequence_is_nullable(&self, symbols: &[Symbol]) -> bool {
        symbols.iter().all(|symbol| match symbol {
            Symbol::Terminal(_) => false,
            Symbol::NonTerminal(non_terminal) => {
                self.nullable.contains(self.nullable_index(*non_terminal))
            }
        })
    }

    /// DirectRead(t): the terminals shifted directly out of t's destination.
    pub(crate) fn direct_read_sets(&mut self) -> &[BitSet] {
        if self.direct_read.is_none() {
            let num_terminals = self.num_terminals();
            let sets = self
                .transitions
                .iter()
                .map(|t| self.parser_states[t.dest as usize].shift_token_set(num_terminals))
                .collect();
            self.direct_read = Some(sets);
        }
        self.direct_read.as_deref().expect("just computed")
    }

    fn reads_successors(&self, transition: usize) -> Vec<usize> {
        let dest = self.transitions[transition].dest;
        self.parser_states[dest as usize]
            .transitions()
            .iter()
            .filter_map(|t| match t {
                Transition::NonTerminal {
                    symbol, nt_index, ..
                } if self.nullable.contains(self.nullable_index(*symbol)) => Some(*nt_index),
                _ => None,
            })
            .collect()
    }

    /// Read = lfp(DirectRead, reads).
    pub(crate) fn read_sets(&mut self) -> &[BitSet] {
        if self.read.is_none() {
            let num_terminals = self.num_terminals();
            let initial = self.direct_read_sets().to_vec();
            let edges: Vec<Vec<usize>> = (0..self.transitions.len())
                .map(|t| self.reads_successors(t))
                .collect();
            let read = digraph(
                self.transitions.len(),
                num_terminals,
                |x| edges[x].clone(),
                |x| initial[x].clone(),
            );
            self.read = Some(read);
        }
        self.read.as_deref().expect("just computed")
    }

    /// The *includes* successors of a nonterminal transition `t = (p, X, q)`:
    /// for every kernel item `A: γ X . δ` of `q` with nullable `δ`, the
    /// backward walk of `|γ|` steps from `p` is expanded once per distance
    /// and the reached states' transitions labeled `A` are emitted.
    fn includes_successors(&self, transition: usize) -> Vec<usize> {
        let t = &self.transitions[transition];
        let mut walks: Vec<(usize, NonTerminal)> = vec![];
        for item in self.parser_states[t.dest as usize].items().iter() {
            if item.dot() == 0 || !self.sequence_is_nullable(item.tail()) {
                continue;
            }
            debug_assert_eq!(
                item.production().right_hand_side()[item.dot() - 1],
                Symbol::NonTerminal(t.symbol)
            );
            walks.push((item.dot() - 1, item.production().left_hand_side()));
        }
        walks.sort_unstable();
        walks.dedup();

        let mut successors = vec![];
        let mut frontier: BTreeSet<u32> = BTreeSet::from([t.source]);
        let mut distance = 0;
        for (walk_distance, left_hand_side) in walks {
            while distance < walk_distance {
                frontier = expand_backwards(self.parser_states, &frontier);
                distance += 1;
            }
            for state in frontier.iter() {
                if let Some(nt_index) =
                    self.parser_states[*state as usize].nt_transition_index(left_hand_side)
                {
                    successors.push(nt_index);
                }
            }
        }
        successors.sort_unstable();
        successors.dedup();
        successors
    }

    /// Follow = lfp(Read, includes).
    pub(crate) fn follow_sets(&mut self) -> &[BitSet] {
        if self.follow.is_none() {
            let num_terminals = self.num_terminals();
            let initial = self.read_sets().to_vec();
            let edges: Vec<Vec<usize>> = (0..self.transitions.len())
                .map(|t| self.includes_successors(t))
                .collect();
            let follow = digraph(
                self.transitions.len(),
                num_terminals,
                |x| edges[x].clone(),
                |x| initial[x].clone(),
            );
            self.follow = Some(follow);
        }
        self.follow.as_deref().expect("just computed")
    }

    /// `B slr-follows X` iff some production `X: α B β` has nullable `β`;
    /// checked at the rightmost occurrence of `B`.
    fn slr_follows_successors(&self, index: usize) -> Vec<usize> {
        let symbol_table = self.specification.symbol_table();
        let target = Symbol::NonTerminal(symbol_table.non_terminal_at(index));
        let mut successors = BTreeSet::new();
        for production in self.specification.productions() {
            let right_hand_side = production.right_hand_side();
            if let Some(position) = right_hand_side.iter().rposition(|symbol| *symbol == target) {
                if self.sequence_is_nullable(&right_hand_side[position + 1..]) {
                    successors.insert(symbol_table.non_terminal_index(production.left_hand_side()));
                }
            }
        }
        successors.into_iter().collect()
    }

    /// The grammar-wide SLR(1) Follow sets, one per nonterminal.
    pub(crate) fn slr_follow_sets(&mut self) -> &[BitSet] {
        if self.slr_follow.is_none() {
            let symbol_table = self.specification.symbol_table();
            let num_terminals = symbol_table.num_terminals();
            let num_non_terminals = symbol_table.num_non_terminals();
            let mut transitions_for: Vec<Vec<usize>> = vec![vec![]; num_non_terminals];
            for (index, t) in self.transitions.iter().enumerate() {
                transitions_for[symbol_table.non_terminal_index(t.symbol)].push(index);
            }
            let read = self.read_sets().to_vec();
            let edges: Vec<Vec<usize>> = (0..num_non_terminals)
                .map(|index| self.slr_follows_successors(index))
                .collect();
            let sets = digraph(
                num_non_terminals,
                num_terminals,
                |x| edges[x].clone(),
                |x| {
                    let mut set = BitSet::new(num_terminals);
                    for t in transitions_for[x].iter() {
                        set |= &read[*t];
                    }
                    set
                },
            );
            self.slr_follow = Some(sets);
        }
        self.slr_follow.as_deref().expect("just computed")
    }

    fn into_analysis(self) -> LookaheadAnalysis {
        LookaheadAnalysis {
            direct_read: self.direct_read.unwrap_or_default(),
            read: self.read,
            follow: self.follow,
            slr_follow: self.slr_follow,
        }
    }
}

fn sets_are_conflict_free(state: &ParserState, sets: &[BitSet], num_terminals: usize) -> bool {
    let shift_set = state.shift_token_set(num_terminals);
    for (index, set) in sets.iter().enumerate() {
        if !set.is_disjoint(&shift_set) {
            return false;
        }
        for other in sets[index + 1..].iter() {
            if !set.is_disjoint(other) {
                return false;
            }
        }
    }
    true
}

/// Assigns lookahead sets to the final items of every conflict-bearing
/// state: SLR(1) Follow first (unless forced straight to LALR(1)), then
/// LALR(1) Follow over the lookback relation for the states SLR(1) leaves
/// unresolved. States whose assigned sets are mutually disjoint and disjoint
/// from their shift terminals are marked resolved at the relevant stage.
pub(crate) fn resolve_lookaheads(
    specification: &Specification,
    parser_states: &[ParserState],
    transitions: &[NonTerminalTransition],
    nullable: &BitSet,
    force_lalr1: bool,
    lookaheads: &mut [StateLookaheads],
) -> LookaheadAnalysis {
    let symbol_table = specification.symbol_table();
    let num_terminals = symbol_table.num_terminals();
    let mut engine = LookaheadEngine::new(specification, parser_states, transitions, nullable);
    let conflict_states: Vec<&ParserState> = parser_states
        .iter()
        .filter(|state| state.is_conflict_bearing())
        .collect();

    if !force_lalr1 {
        let slr_follow = engine.slr_follow_sets().to_vec();
        let mut resolved = 0;
        for state in conflict_states.iter() {
            let entry = &mut lookaheads[state.lookahead_index().expect("conflict bearing")];
            entry.sets = entry
                .items
                .iter()
                .map(|item| {
                    slr_follow[symbol_table.non_terminal_index(item.production().left_hand_side())]
                        .clone()
                })
                .collect();
            if sets_are_conflict_free(state, &entry.sets, num_terminals) {
                state.set_resolution(ResolutionStage::Slr1);
                resolved += 1;
            }
        }
        debug!(
            "SLR(1) pass resolved {} of {} conflict states",
            resolved,
            conflict_states.len()
        );
    }

    let unresolved: Vec<&ParserState> = conflict_states
        .iter()
        .copied()
        .filter(|state| state.resolution() == ResolutionStage::Unresolved)
        .collect();
    if force_lalr1 || !unresolved.is_empty() {
        let follow = engine.follow_sets().to_vec();
        let mut resolved = 0;
        for state in unresolved.iter() {
            let entry = &mut lookaheads[state.lookahead_index().expect("conflict bearing")];
            entry.sets = entry
                .items
                .iter()
                .map(|item| {
                    let mut set = BitSet::new(num_terminals);
                    for t in lookback(parser_states, state.ident, item) {
                        set |= &follow[t];
                    }
                    set
                })
                .collect();
            if sets_are_conflict_free(state, &entry.sets, num_terminals) {
                state.set_resolution(ResolutionStage::Lalr1);
                resolved += 1;
            }
        }
        debug!(
            "LALR(1) pass resolved {} of {} remaining conflict states",
            resolved,
            unresolved.len()
        );
    }

    engine.into_analysis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Specification;
    use crate::state::{build_automaton, classify_states};
    use crate::symbol::Token;

    fn toy_set(capacity: usize, members: &[usize]) -> BitSet {
        let mut set = BitSet::new(capacity);
        for member in members {
            set.insert(*member);
        }
        set
    }

    #[test]
    fn digraph_propagates_along_edges() {
        // 0 -> 1 -> 2, initial F(x) = {x}
        let edges = vec![vec![1], vec![2], vec![]];
        let sets = digraph(3, 3, |x| edges[x].clone(), |x| toy_set(3, &[x]));
        assert_eq!(sets[2], toy_set(3, &[2]));
        assert_eq!(sets[1], toy_set(3, &[1, 2]));
        assert_eq!(sets[0], toy_set(3, &[0, 1, 2]));
    }

    #[test]
    fn digraph_merges_strongly_connected_components() {
        // 0 <-> 1, 1 -> 2, self loop on 2
        let edges = vec![vec![1], vec![0, 2], vec![2]];
        let sets = digraph(3, 3, |x| edges[x].clone(), |x| toy_set(3, &[x]));
        assert_eq!(sets[2], toy_set(3, &[2]));
        assert_eq!(sets[0], toy_set(3, &[0, 1, 2]));
        assert_eq!(sets[0], sets[1]);
    }

    #[test]
    fn digraph_is_deterministic() {
        let edges = vec![vec![1, 2], vec![0], vec![]];
        let first = digraph(3, 4, |x| edges[x].clone(), |x| toy_set(4, &[x]));
        let second = digraph(3, 4, |x| edges[x].clone(), |x| toy_set(4, &[x]));
        assert_eq!(first, second);
    }

    #[test]
    fn digraph_evaluates_initial_sets_once() {
        let edges = vec![vec![1], vec![0]];
        let mut calls = vec![0; 2];
        let _ = digraph(2, 2, |x| edges[x].clone(), |x| {
            calls[x] += 1;
            toy_set(2, &[x])
        });
        assert_eq!(calls, vec![1, 1]);
    }

    #[test]
    fn read_and_slr_follow_sets() {
        // $end = 0, plus = 1, x = 2; conflict state {E: T ., E: T . plus E}.
        let specification = Specification::new("%token plus x\nE: T | T plus E;\nT: x;\n", "test");
        let (mut parser_states, nt_transitions) = build_automaton(&specification);
        classify_states(&mut parser_states);
        let nullable = specification.compute_nullable();
        assert!(nullable.is_empty());
        let mut engine =
            LookaheadEngine::new(&specification, &parser_states, &nt_transitions, &nullable);
        let plus = specification.symbol_table().token("plus").unwrap();
        // Nothing is nullable so Read = DirectRead.
        assert_eq!(engine.direct_read_sets().to_vec(), engine.read_sets());
        // The transition (0, E, _) reads only the end marker.
        assert_eq!(engine.read_sets()[0], toy_set(3, &[Token::END.index()]));
        let symbol_table = specification.symbol_table();
        let slr = engine.slr_follow_sets();
        let e = symbol_table.non_terminal_index(symbol_table.non_terminal("E").unwrap());
        let t = symbol_table.non_terminal_index(symbol_table.non_terminal("T").unwrap());
        assert_eq!(slr[e], toy_set(3, &[Token::END.index()]));
        assert_eq!(slr[t], toy_set(3, &[Token::END.index(), plus.index()]));
    }

    #[test]
    fn lookback_reaches_the_accessing_transitions() {
        let specification = Specification::new(
            "%token a b c d\nS: A a | b A c | d c | b d a;\nA: d;\n",
            "test",
        );
        let (mut parser_states, nt_transitions) = build_automaton(&specification);
        classify_states(&mut parser_states);
        let a_non_terminal = specification.symbol_table().non_terminal("A").unwrap();
        for state in parser_states.iter().filter(|s| s.is_conflict_bearing()) {
            for item in state.final_items() {
                let lookback_transitions = lookback(&parser_states, state.ident, item);
                assert_eq!(lookback_transitions.len(), 1);
                let transition = nt_transitions[lookback_transitions[0]];
                assert_eq!(transition.symbol, a_non_terminal);
            }
        }
    }
}
