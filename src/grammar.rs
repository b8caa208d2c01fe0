// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::{BTreeSet, VecDeque};
use std::convert::TryFrom;
use std::fmt;
use std::io::{self, stderr, Write};
use std::path::Path;

use lazy_static::lazy_static;
use log::info;

use crate::bitset::BitSet;
use crate::lookahead::{self, LookaheadAnalysis, StateLookaheads};
use crate::production::{GrammarItemKey, GrammarItemSet, Production};
use crate::state::{self, NonTerminalTransition, ParserState, ResolutionStage, Transition};
use crate::symbol::{NonTerminal, Symbol, SymbolTable, Token};
use crate::table::{self, Action, ActionTable, GotoTable};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    label: String,
    line: usize,
}

impl Location {
    pub fn new(label: &str, line: usize) -> Self {
        Self {
            label: label.to_string(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.line)
    }
}

pub fn report_error(location: &Location, what: &str) {
    let _ = writeln!(stderr(), "{}: error: {}", location, what);
}

pub fn report_warning(location: &Location, what: &str) {
    let _ = writeln!(stderr(), "{}: warning: {}", location, what);
}

lazy_static! {
    static ref LEXEME_CRE: regex::Regex =
        regex::Regex::new(r"^(//.*|%token|%start|%empty|[a-zA-Z_][a-zA-Z_0-9]*|[:|;])").unwrap();
}

fn is_name(text: &str) -> bool {
    !text.starts_with('%') && !matches!(text, ":" | "|" | ";")
}

#[derive(Debug)]
struct Lexeme {
    text: String,
    location: Location,
}

#[derive(Debug, Default)]
struct RawAlternative {
    symbols: Vec<(String, Location)>,
    explicit_empty: bool,
}

#[derive(Debug)]
struct RawRule {
    left_hand_side: String,
    location: Location,
    alternatives: Vec<RawAlternative>,
}

#[derive(Debug, Default)]
struct SpecificationBuilder {
    token_declarations: Vec<(String, Location)>,
    start_override: Option<(String, Location)>,
    rules: Vec<RawRule>,
    error_count: u32,
}

impl SpecificationBuilder {
    fn error(&mut self, location: &Location, what: &str) {
        report_error(location, what);
        self.error_count += 1;
    }

    fn tokenize(&mut self, text: &str, label: &str) -> Vec<Lexeme> {
        let mut lexemes = vec![];
        for (line_index, line) in text.lines().enumerate() {
            let location = Location::new(label, line_index + 1);
            let mut rest = line.trim_start();
            while !rest.is_empty() {
                if let Some(matched) = LEXEME_CRE.find(rest) {
                    let lexeme = matched.as_str();
                    if !lexeme.starts_with("//") {
                        lexemes.push(Lexeme {
                            text: lexeme.to_string(),
                            location: location.clone(),
                        });
                    }
                    rest = rest[matched.end()..].trim_start();
                } else {
                    let unexpected = rest.chars().next().expect("rest is not empty");
                    self.error(&location, &format!("unexpected character '{}'", unexpected));
                    rest = rest[unexpected.len_utf8()..].trim_start();
                }
            }
        }
        lexemes
    }

    fn declare_token(&mut self, lexeme: &Lexeme) {
        if self
            .token_declarations
            .iter()
            .any(|(name, _)| name == &lexeme.text)
        {
            let what = format!("token \"{}\" already declared", lexeme.text);
            self.error(&lexeme.location, &what);
        } else {
            self.token_declarations
                .push((lexeme.text.clone(), lexeme.location.clone()));
        }
    }

    fn parse(&mut self, lexemes: &[Lexeme]) {
        let mut index = 0;
        while index < lexemes.len() {
            let lexeme = &lexemes[index];
            match lexeme.text.as_str() {
                "%token" => {
                    let line = lexeme.location.line;
                    index += 1;
                    let mut any_declared = false;
                    while index < lexemes.len()
                        && lexemes[index].location.line == line
                        && is_name(&lexemes[index].text)
                    {
                        self.declare_token(&lexemes[index]);
                        any_declared = true;
                        index += 1;
                    }
                    if !any_declared {
                        self.error(&lexeme.location, "%token expects at least one name");
                    }
                }
                "%start" => {
                    let line = lexeme.location.line;
                    index += 1;
                    if index < lexemes.len()
                        && lexemes[index].location.line == line
                        && is_name(&lexemes[index].text)
                    {
                        if self.start_override.is_some() {
                            self.error(&lexemes[index].location, "%start already specified");
                        } else {
                            self.start_override = Some((
                                lexemes[index].text.clone(),
                                lexemes[index].location.clone(),
                            ));
                        }
                        index += 1;
                    } else {
                        self.error(&lexeme.location, "%start expects a name");
                    }
                }
                text if is_name(text) => {
                    index = self.parse_rule(lexemes, index);
                }
                text => {
                    self.error(&lexeme.location, &format!("unexpected \"{}\"", text));
                    index += 1;
                }
            }
        }
    }

    // Parses "LHS: alternative | alternative ;" starting at the left hand
    // side name; returns the index just past the rule.
    fn parse_rule(&mut self, lexemes: &[Lexeme], mut index: usize) -> usize {
        let left_hand_side = &lexemes[index];
        index += 1;
        if index >= lexemes.len() || lexemes[index].text != ":" {
            let what = format!("expected \":\" after \"{}\"", left_hand_side.text);
            self.error(&left_hand_side.location, &what);
            while index < lexemes.len() && lexemes[index].text != ";" {
                index += 1;
            }
            return index + 1;
        }
        index += 1;
        let mut rule = RawRule {
            left_hand_side: left_hand_side.text.clone(),
            location: left_hand_side.location.clone(),
            alternatives: vec![],
        };
        let mut alternative = RawAlternative::default();
        loop {
            if index >= lexemes.len() {
                let what = format!(
                    "missing \";\" at end of rule for \"{}\"",
                    rule.left_hand_side
                );
                self.error(&rule.location, &what);
                self.finish_alternative(&mut rule, alternative);
                break;
            }
            let lexeme = &lexemes[index];
            index += 1;
            match lexeme.text.as_str() {
                ";" => {
                    self.finish_alternative(&mut rule, alternative);
                    break;
                }
                "|" => {
                    self.finish_alternative(&mut rule, alternative);
                    alternative = RawAlternative::default();
                }
                "%empty" => {
                    alternative.explicit_empty = true;
                }
                text if is_name(text) => {
                    alternative
                        .symbols
                        .push((text.to_string(), lexeme.location.clone()));
                }
                text => {
                    self.error(&lexeme.location, &format!("unexpected \"{}\" in rule body", text));
                }
            }
        }
        self.rules.push(rule);
        index
    }

    fn finish_alternative(&mut self, rule: &mut RawRule, alternative: RawAlternative) {
        if alternative.explicit_empty && !alternative.symbols.is_empty() {
            let location = &alternative.symbols[0].1;
            self.error(location, "%empty must stand alone in an alternative");
        }
        rule.alternatives.push(alternative);
    }

    fn build(mut self, label: &str) -> Specification {
        if self.rules.is_empty() {
            self.error(&Location::new(label, 0), "specification contains no rules");
        }
        let token_names: Vec<String> = self
            .token_declarations
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        let token_name_set: BTreeSet<&str> = token_names.iter().map(|name| name.as_str()).collect();

        // nonterminal codes by first appearance: rule left hand sides, then
        // used but undefined right hand side names
        let mut non_terminal_names: Vec<String> = vec![];
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut lhs_errors = vec![];
        for rule in self.rules.iter() {
            if token_name_set.contains(rule.left_hand_side.as_str()) {
                lhs_errors.push((
                    rule.location.clone(),
                    format!(
                        "\"{}\" is a token and may not be given productions",
                        rule.left_hand_side
                    ),
                ));
                continue;
            }
            if seen.insert(rule.left_hand_side.clone()) {
                non_terminal_names.push(rule.left_hand_side.clone());
            }
        }
        for rule in self.rules.iter() {
            for alternative in rule.alternatives.iter() {
                for (name, _) in alternative.symbols.iter() {
                    if !token_name_set.contains(name.as_str()) && seen.insert(name.clone()) {
                        non_terminal_names.push(name.clone());
                    }
                }
            }
        }
        for (location, what) in lhs_errors {
            self.error(&location, &what);
        }

        let start_name = match self.start_override.clone() {
            Some((name, location)) => {
                if seen.contains(&name) {
                    Some(name)
                } else {
                    self.error(&location, &format!("%start \"{}\" is not a nonterminal", name));
                    non_terminal_names.first().cloned()
                }
            }
            None => non_terminal_names.first().cloned(),
        };

        let symbol_table = SymbolTable::build(&token_names, &non_terminal_names);
        let num_terminals = symbol_table.num_terminals();
        let num_non_terminals = symbol_table.num_non_terminals();

        let mut token_defined_at = vec![Location::default(); num_terminals];
        let mut token_used = vec![false; num_terminals];
        token_used[Token::END.index()] = true;
        for (name, location) in self.token_declarations.iter() {
            token_defined_at[symbol_table.token(name).expect("declared").index()] =
                location.clone();
        }
        let mut non_terminal_defined_at: Vec<Option<Location>> = vec![None; num_non_terminals];
        non_terminal_defined_at[0] = Some(Location::new(label, 0)); // $start
        let mut non_terminal_used_at: Vec<Vec<Location>> = vec![vec![]; num_non_terminals];
        for rule in self.rules.iter() {
            if let Some(non_terminal) = symbol_table.non_terminal(&rule.left_hand_side) {
                let index = symbol_table.non_terminal_index(non_terminal);
                if non_terminal_defined_at[index].is_none() {
                    non_terminal_defined_at[index] = Some(rule.location.clone());
                }
            }
        }

        // productions grouped by nonterminal code so that the per-nonterminal
        // ranges are contiguous; the synthetic start production comes first
        let mut productions: Vec<Production> = vec![];
        let mut first_production_for: Vec<usize> = vec![];
        for index in 0..num_non_terminals {
            first_production_for.push(productions.len());
            let non_terminal = symbol_table.non_terminal_at(index);
            if non_terminal == symbol_table.start_non_terminal() {
                if let Some(name) = &start_name {
                    let user_start = symbol_table.non_terminal(name).expect("registered");
                    non_terminal_used_at[symbol_table.non_terminal_index(user_start)]
                        .push(Location::new(label, 0));
                    productions.push(Production::new(
                        0,
                        non_terminal,
                        vec![Symbol::NonTerminal(user_start), Symbol::Terminal(Token::END)],
                    ));
                }
                continue;
            }
            let lhs_name = symbol_table.non_terminal_name(non_terminal).to_string();
            for rule in self.rules.iter().filter(|r| r.left_hand_side == lhs_name) {
                for alternative in rule.alternatives.iter() {
                    let mut right_hand_side = vec![];
                    for (name, location) in alternative.symbols.iter() {
                        match symbol_table.symbol(name).expect("registered") {
                            Symbol::Terminal(token) => {
                                token_used[token.index()] = true;
                                right_hand_side.push(Symbol::Terminal(token));
                            }
                            Symbol::NonTerminal(rhs_non_terminal) => {
                                non_terminal_used_at
                                    [symbol_table.non_terminal_index(rhs_non_terminal)]
                                .push(location.clone());
                                right_hand_side.push(Symbol::NonTerminal(rhs_non_terminal));
                            }
                        }
                    }
                    productions.push(Production::new(
                        productions.len() as u32,
                        non_terminal,
                        right_hand_side,
                    ));
                }
            }
        }
        first_production_for.push(productions.len());

        Specification {
            symbol_table,
            productions,
            first_production_for,
            token_defined_at,
            token_used,
            non_terminal_defined_at,
            non_terminal_used_at,
            error_count: self.error_count,
            warning_count: 0,
        }
    }
}

/// A grammar definition: symbol table plus productions indexed so that
/// production `0` is the synthetic start production and the productions of
/// each nonterminal are contiguous.
#[derive(Debug)]
pub struct Specification {
    symbol_table: SymbolTable,
    productions: Vec<Production>,
    first_production_for: Vec<usize>,
    token_defined_at: Vec<Location>,
    token_used: Vec<bool>,
    non_terminal_defined_at: Vec<Option<Location>>,
    non_terminal_used_at: Vec<Vec<Location>>,
    pub error_count: u32,
    pub warning_count: u32,
}

impl Specification {
    pub fn new(text: &str, label: &str) -> Self {
        let mut builder = SpecificationBuilder::default();
        let lexemes = builder.tokenize(text, label);
        builder.parse(&lexemes);
        builder.build(label)
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }

    pub fn productions(&self) -> impl Iterator<Item = &Production> {
        self.productions.iter()
    }

    pub fn num_productions(&self) -> usize {
        self.productions.len()
    }

    pub fn production(&self, code: u32) -> &Production {
        &self.productions[code as usize]
    }

    /// The contiguous run of productions whose left hand side is
    /// `non_terminal`.
    pub fn productions_for(&self, non_terminal: NonTerminal) -> &[Production] {
        let index = self.symbol_table.non_terminal_index(non_terminal);
        &self.productions[self.first_production_for[index]..self.first_production_for[index + 1]]
    }

    /// Completes an item set with `(p, 0)` for every production of every
    /// dot-nonterminal. Idempotent.
    pub fn closure(&self, mut closure_set: GrammarItemSet) -> GrammarItemSet {
        let mut additions_made = true;
        while additions_made {
            additions_made = false;
            // closables extracted first to avoid mutating while iterating
            let closables: Vec<GrammarItemKey> = closure_set
                .iter()
                .filter(|key| key.is_closable())
                .cloned()
                .collect();
            for item_key in closables {
                if let Some(Symbol::NonTerminal(prospective_lhs)) = item_key.next_symbol() {
                    for production in self.productions_for(*prospective_lhs) {
                        let prospective_key = GrammarItemKey::from(production);
                        if !closure_set.contains(&prospective_key) {
                            closure_set.insert(prospective_key);
                            additions_made = true;
                        }
                    }
                }
            }
        }
        closure_set
    }

    /// The nullable nonterminals, as a set over `[0, num_non_terminals)`,
    /// computed as a worklist least fixed point.
    pub fn compute_nullable(&self) -> BitSet {
        let num_non_terminals = self.symbol_table.num_non_terminals();
        let mut nullable = BitSet::new(num_non_terminals);
        let mut counters: Vec<usize> = self.productions.iter().map(|p| p.len()).collect();
        let mut occurrences: Vec<Vec<usize>> = vec![vec![]; num_non_terminals];
        for (index, production) in self.productions.iter().enumerate() {
            for symbol in production.right_hand_side_symbols() {
                if let Symbol::NonTerminal(non_terminal) = symbol {
                    occurrences[self.symbol_table.non_terminal_index(*non_terminal)].push(index);
                }
            }
        }
        let mut queue: VecDeque<usize> = VecDeque::new();
        for (index, production) in self.productions.iter().enumerate() {
            if counters[index] == 0 {
                let lhs = self
                    .symbol_table
                    .non_terminal_index(production.left_hand_side());
                if nullable.insert(lhs) {
                    queue.push_back(lhs);
                }
            }
        }
        while let Some(newly_nullable) = queue.pop_front() {
            for production_index in occurrences[newly_nullable].iter() {
                counters[*production_index] -= 1;
                if counters[*production_index] == 0 {
                    let lhs = self
                        .symbol_table
                        .non_terminal_index(self.productions[*production_index].left_hand_side());
                    if nullable.insert(lhs) {
                        queue.push_back(lhs);
                    }
                }
            }
        }
        nullable
    }

    /// Maps a whitespace separated sequence of token names to codes with the
    /// end marker appended; `None` if any name is unknown.
    pub fn token_sequence(&self, text: &str) -> Option<Vec<Token>> {
        let mut tokens = vec![];
        for name in text.split_whitespace() {
            tokens.push(self.symbol_table.token(name)?);
        }
        tokens.push(Token::END);
        Some(tokens)
    }
}

/// Options recognized by the grammar processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessorOptions {
    /// Skip the SLR(1) pass and compute LALR(1) lookaheads for every
    /// conflict-bearing state.
    pub force_lalr1: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    ShiftReduce,
    ReduceReduce,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub state: u32,
    pub message: String,
    pub items: Vec<GrammarItemKey>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        };
        write!(f, "State<{}>: {}: {}", self.state, severity, self.message)
    }
}

#[derive(Debug)]
pub enum Error {
    TooManyErrors(u32),
    UndefinedSymbols(u32),
    ReduceReduceConflicts(Vec<Diagnostic>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::TooManyErrors(count) => {
                write!(f, "{} errors in the specification", count)
            }
            Error::UndefinedSymbols(count) => {
                write!(f, "{} undefined symbols in the specification", count)
            }
            Error::ReduceReduceConflicts(diagnostics) => {
                let count = diagnostics
                    .iter()
                    .filter(|d| d.kind == DiagnosticKind::ReduceReduce)
                    .count();
                write!(f, "grammar is not LALR(1): {} reduce/reduce conflicts", count)
            }
        }
    }
}

/// The processed grammar: the LR(0) automaton, the lookahead analysis and
/// the emitted parser tables, read-only after construction.
#[derive(Debug)]
pub struct Grammar {
    specification: Specification,
    parser_states: Vec<ParserState>,
    nt_transitions: Vec<NonTerminalTransition>,
    nullable: BitSet,
    lookaheads: Vec<StateLookaheads>,
    analysis: LookaheadAnalysis,
    actions: ActionTable,
    gotos: GotoTable,
    diagnostics: Vec<Diagnostic>,
}

impl TryFrom<Specification> for Grammar {
    type Error = Error;

    fn try_from(specification: Specification) -> Result<Self, Error> {
        Grammar::with_options(specification, ProcessorOptions::default())
    }
}

impl Grammar {
    pub fn with_options(
        mut specification: Specification,
        options: ProcessorOptions,
    ) -> Result<Self, Error> {
        let symbol_table = &specification.symbol_table;
        let mut warning_count = 0;
        for token in symbol_table.tokens() {
            if !specification.token_used[token.index()] {
                report_warning(
                    &specification.token_defined_at[token.index()],
                    &format!("Token \"{}\" is not used", symbol_table.token_name(token)),
                );
                warning_count += 1;
            }
        }
        for non_terminal in symbol_table.non_terminals() {
            let index = symbol_table.non_terminal_index(non_terminal);
            if index == 0 {
                continue; // the synthetic start is never used on a right hand side
            }
            if specification.non_terminal_defined_at[index].is_some()
                && specification.non_terminal_used_at[index].is_empty()
            {
                report_warning(
                    specification.non_terminal_defined_at[index]
                        .as_ref()
                        .expect("checked"),
                    &format!(
                        "Non terminal \"{}\" is not used",
                        symbol_table.non_terminal_name(non_terminal)
                    ),
                );
                warning_count += 1;
            }
        }
        let mut undefined_symbols = 0;
        for non_terminal in symbol_table.non_terminals() {
            let index = symbol_table.non_terminal_index(non_terminal);
            if specification.non_terminal_defined_at[index].is_none() {
                for location in specification.non_terminal_used_at[index].iter() {
                    report_error(
                        location,
                        &format!(
                            "Non terminal \"{}\" is not defined",
                            symbol_table.non_terminal_name(non_terminal)
                        ),
                    );
                }
                undefined_symbols += 1;
            }
        }
        specification.warning_count += warning_count;
        if undefined_symbols > 0 {
            return Err(Error::UndefinedSymbols(undefined_symbols));
        } else if specification.error_count > 0 {
            return Err(Error::TooManyErrors(specification.error_count));
        }

        let (mut parser_states, nt_transitions) = state::build_automaton(&specification);
        let conflict_count = state::classify_states(&mut parser_states);
        let mut lookaheads: Vec<StateLookaheads> = parser_states
            .iter()
            .filter(|state| state.is_conflict_bearing())
            .map(|state| StateLookaheads::new(state.final_items().to_vec()))
            .collect();
        let nullable = specification.compute_nullable();

        let mut analysis = LookaheadAnalysis::default();
        if conflict_count > 0 || options.force_lalr1 {
            analysis = lookahead::resolve_lookaheads(
                &specification,
                &parser_states,
                &nt_transitions,
                &nullable,
                options.force_lalr1,
                &mut lookaheads,
            );
        }

        let num_terminals = specification.symbol_table.num_terminals();
        let mut diagnostics = vec![];
        let mut fatal = false;
        for state in parser_states
            .iter()
            .filter(|state| state.resolution() == ResolutionStage::Unresolved)
        {
            let entry = &lookaheads[state.lookahead_index().expect("unresolved implies conflict")];
            let items = entry.items();
            let sets = entry.sets();
            for i in 0..items.len() {
                for j in i + 1..items.len() {
                    if !sets[i].is_disjoint(&sets[j]) {
                        let mut overlap = sets[i].clone();
                        overlap &= &sets[j];
                        let message = format!(
                            "reduce/reduce conflict between \"{}\" and \"{}\" on {}",
                            items[i].as_string(&specification.symbol_table),
                            items[j].as_string(&specification.symbol_table),
                            specification.symbol_table.format_token_set(&overlap)
                        );
                        diagnostics.push(Diagnostic {
                            severity: Severity::Error,
                            kind: DiagnosticKind::ReduceReduce,
                            state: state.ident,
                            message,
                            items: vec![items[i].clone(), items[j].clone()],
                        });
                        fatal = true;
                    }
                }
            }
            // one diagnostic per conflicting terminal, naming every reduce
            // item whose lookahead holds it
            let mut reduce_union = BitSet::new(num_terminals);
            for set in sets.iter() {
                reduce_union |= set;
            }
            reduce_union &= &state.shift_token_set(num_terminals);
            for element in reduce_union.iter() {
                let token = Token::new(element as u32);
                let involved: Vec<GrammarItemKey> = entry
                    .pairs()
                    .filter(|(_, set)| set.contains(element))
                    .map(|(item, _)| item.clone())
                    .collect();
                let losers = involved
                    .iter()
                    .map(|item| format!("\"{}\"", item.as_string(&specification.symbol_table)))
                    .collect::<Vec<String>>()
                    .join(" and ");
                let message = format!(
                    "shift/reduce conflict on \"{}\": shift takes precedence over {}",
                    specification.symbol_table.token_name(token),
                    losers
                );
                diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    kind: DiagnosticKind::ShiftReduce,
                    state: state.ident,
                    message,
                    items: involved,
                });
            }
        }
        if fatal {
            for diagnostic in diagnostics.iter() {
                report_error(&Location::default(), &diagnostic.to_string());
            }
            return Err(Error::ReduceReduceConflicts(diagnostics));
        }

        let (actions, gotos) = table::emit_tables(&specification, &parser_states, &lookaheads);
        info!(
            "{} states, {} conflict bearing, {} unresolved",
            parser_states.len(),
            conflict_count,
            parser_states
                .iter()
                .filter(|s| s.resolution() == ResolutionStage::Unresolved)
                .count()
        );
        Ok(Self {
            specification,
            parser_states,
            nt_transitions,
            nullable,
            lookaheads,
            analysis,
            actions,
            gotos,
            diagnostics,
        })
    }

    pub fn specification(&self) -> &Specification {
        &self.specification
    }

    pub fn parser_states(&self) -> &[ParserState] {
        &self.parser_states
    }

    pub fn nonterminal_transitions(&self) -> &[NonTerminalTransition] {
        &self.nt_transitions
    }

    pub fn nullable(&self) -> &BitSet {
        &self.nullable
    }

    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }

    pub fn gotos(&self) -> &GotoTable {
        &self.gotos
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn resolution_profile(&self) -> Vec<ResolutionStage> {
        self.parser_states
            .iter()
            .map(|state| state.resolution())
            .collect()
    }

    pub fn state_lookaheads(&self, state: u32) -> Option<&StateLookaheads> {
        let index = self.parser_states[state as usize].lookahead_index()?;
        Some(&self.lookaheads[index])
    }

    /// DirectRead per nonterminal transition; empty when the lookahead
    /// engine never ran.
    pub fn direct_read_sets(&self) -> &[BitSet] {
        &self.analysis.direct_read
    }

    pub fn read_sets(&self) -> Option<&[BitSet]> {
        self.analysis.read.as_deref()
    }

    pub fn follow_sets(&self) -> Option<&[BitSet]> {
        self.analysis.follow.as_deref()
    }

    pub fn slr_follow_sets(&self) -> Option<&[BitSet]> {
        self.analysis.slr_follow.as_deref()
    }

    /// The lookback relation: the nonterminal transitions a final item of a
    /// state draws its LALR(1) lookahead from.
    pub fn lookback_transitions(&self, state: u32, item: &GrammarItemKey) -> Vec<usize> {
        lookahead::lookback(&self.parser_states, state, item)
    }

    pub fn total_unresolved_conflicts(&self) -> usize {
        self.parser_states
            .iter()
            .filter(|state| state.resolution() == ResolutionStage::Unresolved)
            .count()
    }

    /// Drives the emitted tables over a token sequence (which must end with
    /// the end marker). Reducing the synthetic start production accepts.
    pub fn recognize(&self, tokens: &[Token]) -> bool {
        let mut stack: Vec<u32> = vec![0];
        let mut index = 0;
        loop {
            let state = *stack.last().expect("stack holds the start state");
            let token = tokens.get(index).copied().unwrap_or(Token::END);
            match self.actions.action(state, token) {
                Action::Shift(dest) => {
                    if index >= tokens.len() {
                        return false;
                    }
                    stack.push(dest);
                    index += 1;
                }
                Action::Reduce(code) => {
                    if code == 0 {
                        return true;
                    }
                    let production = self.specification.production(code);
                    debug_assert!(stack.len() > production.len());
                    stack.truncate(stack.len() - production.len());
                    let top = *stack.last().expect("reduce pops at most to the start state");
                    let nt_index = self
                        .specification
                        .symbol_table
                        .non_terminal_index(production.left_hand_side());
                    match self.gotos.goto_state(top, nt_index) {
                        Some(dest) => stack.push(dest),
                        None => return false,
                    }
                }
                Action::Fail => return false,
            }
        }
    }

    pub fn recognize_text(&self, text: &str) -> bool {
        match self.specification.token_sequence(text) {
            Some(tokens) => self.recognize(&tokens),
            None => false,
        }
    }

    fn describe_state(&self, state: &ParserState) -> String {
        let symbol_table = &self.specification.symbol_table;
        let mut string = format!("State<{}>:\n  Kernel Items:\n", state.ident);
        for item in state.items().iter().filter(|item| item.is_kernel_item()) {
            string += &format!("    {}\n", item.as_string(symbol_table));
        }
        let predicted: Vec<&GrammarItemKey> = state
            .items()
            .iter()
            .filter(|item| !item.is_kernel_item())
            .collect();
        if !predicted.is_empty() {
            string += "  Predicted Items:\n";
            for item in predicted {
                string += &format!("    {}\n", item.as_string(symbol_table));
            }
        }
        string += "  Shifts:\n";
        for transition in state.transitions() {
            if let Transition::Terminal { token, dest } = transition {
                string += &format!(
                    "    {} -> State<{}>\n",
                    symbol_table.token_name(*token),
                    dest
                );
            }
        }
        string += "  Gotos:\n";
        for transition in state.transitions() {
            if let Transition::NonTerminal { symbol, dest, .. } = transition {
                string += &format!(
                    "    {} -> State<{}>\n",
                    symbol_table.non_terminal_name(*symbol),
                    dest
                );
            }
        }
        string += "  Reductions:\n";
        if let Some(entry) = self.state_lookaheads(state.ident) {
            for (item, set) in entry.pairs() {
                string += &format!(
                    "    {} on {}\n",
                    item.as_string(symbol_table),
                    symbol_table.format_token_set(set)
                );
            }
        } else if let Some(item) = state.final_items().first() {
            string += &format!("    {} on all tokens\n", item.as_string(symbol_table));
        }
        string += &format!("  Resolution: {}\n", state.resolution());
        string
    }

    pub fn description(&self) -> String {
        let symbol_table = &self.specification.symbol_table;
        let mut string = "Symbols:\n  Tokens:".to_string();
        for token in symbol_table.tokens() {
            string += &format!(" {}", symbol_table.token_name(token));
        }
        string += "\n  Non terminals:";
        for non_terminal in symbol_table.non_terminals() {
            string += &format!(" {}", symbol_table.non_terminal_name(non_terminal));
        }
        string += "\nProductions:\n";
        for production in self.specification.productions() {
            string += &format!(
                "  {}: {}\n",
                production.ident(),
                production.as_string(symbol_table)
            );
        }
        for state in self.parser_states.iter() {
            string += &self.describe_state(state);
        }
        if !self.diagnostics.is_empty() {
            string += "Diagnostics:\n";
            for diagnostic in self.diagnostics.iter() {
                string += &format!("  {}\n", diagnostic);
            }
        }
        string
    }

    pub fn write_description(&self, file_path: &Path) -> io::Result<()> {
        let mut file = std::fs::File::create(file_path)?;
        file.write_all(self.description().as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_end_assigns_codes_and_ranges() {
        let specification = Specification::new("%token a b\nS: a | b;\n", "test");
        assert_eq!(specification.error_count, 0);
        let symbol_table = specification.symbol_table();
        assert_eq!(symbol_table.num_terminals(), 3);
        assert_eq!(symbol_table.num_non_terminals(), 2);
        assert_eq!(specification.num_productions(), 3);
        let start = symbol_table.start_non_terminal();
        let s = symbol_table.non_terminal("S").unwrap();
        assert_eq!(specification.production(0).left_hand_side(), start);
        assert_eq!(
            specification.production(0).right_hand_side(),
            &[Symbol::NonTerminal(s), Symbol::Terminal(Token::END)]
        );
        // the production ranges agree with the left hand sides
        for non_terminal in symbol_table.non_terminals() {
            for production in specification.productions_for(non_terminal) {
                assert_eq!(production.left_hand_side(), non_terminal);
            }
        }
        assert_eq!(specification.productions_for(s).len(), 2);
        assert_eq!(
            specification.token_sequence("a b"),
            Some(vec![
                symbol_table.token("a").unwrap(),
                symbol_table.token("b").unwrap(),
                Token::END
            ])
        );
        assert_eq!(specification.token_sequence("a nothing"), None);
    }

    #[test]
    fn front_end_reports_errors() {
        let duplicated = Specification::new("%token a a\nS: a;\n", "test");
        assert!(duplicated.error_count > 0);
        assert!(matches!(
            Grammar::try_from(duplicated),
            Err(Error::TooManyErrors(_))
        ));

        let undefined = Specification::new("%token a\nS: a B;\n", "test");
        assert_eq!(undefined.error_count, 0);
        assert!(matches!(
            Grammar::try_from(undefined),
            Err(Error::UndefinedSymbols(1))
        ));

        let no_rules = Specification::new("%token a\n", "test");
        assert!(no_rules.error_count > 0);

        let missing_colon = Specification::new("%token a\nS a;\nS: a;\n", "test");
        assert!(missing_colon.error_count > 0);
    }

    #[test]
    fn nullable_is_a_least_fixed_point() {
        let specification =
            Specification::new("%token c\nS: A B;\nA: %empty;\nB: %empty | c;\n", "test");
        assert_eq!(specification.error_count, 0);
        let nullable = specification.compute_nullable();
        let symbol_table = specification.symbol_table();
        for (name, expected) in [("S", true), ("A", true), ("B", true)] {
            let non_terminal = symbol_table.non_terminal(name).unwrap();
            assert_eq!(
                nullable.contains(symbol_table.non_terminal_index(non_terminal)),
                expected,
                "nullability of {}",
                name
            );
        }
        // $start derives the end marker and is never nullable
        assert!(!nullable.contains(0));
        // least: a nonterminal is nullable iff some production of its has an
        // all-nullable right hand side
        for non_terminal in symbol_table.non_terminals() {
            let expected = specification.productions_for(non_terminal).iter().any(|p| {
                p.right_hand_side_symbols().all(|symbol| match symbol {
                    Symbol::Terminal(_) => false,
                    Symbol::NonTerminal(nt) => {
                        nullable.contains(symbol_table.non_terminal_index(*nt))
                    }
                })
            });
            assert_eq!(
                nullable.contains(symbol_table.non_terminal_index(non_terminal)),
                expected
            );
        }
    }

    #[test]
    fn closure_is_idempotent() {
        let specification = Specification::new(
            "%token plus x\nE: T | T plus E;\nT: x;\n",
            "test",
        );
        let kernel: GrammarItemSet = [GrammarItemKey::from(specification.production(0))]
            .into_iter()
            .collect();
        let closed = specification.closure(kernel);
        assert_eq!(closed.len(), 4);
        let reclosed = specification.closure(closed.clone());
        assert_eq!(closed, reclosed);
    }

    #[test]
    fn slr_resolvable_grammar() {
        let specification = Specification::new("%token plus x\nE: T | T plus E;\nT: x;\n", "test");
        let grammar = Grammar::try_from(specification).expect("grammar is SLR(1)");
        assert!(grammar.diagnostics().is_empty());
        assert_eq!(grammar.total_unresolved_conflicts(), 0);
        let profile = grammar.resolution_profile();
        assert_eq!(
            profile
                .iter()
                .filter(|stage| **stage == ResolutionStage::Slr1)
                .count(),
            1
        );
        assert!(!profile.contains(&ResolutionStage::Lalr1));
        // the conflict state reduces on the end marker and shifts on plus
        let symbol_table = grammar.specification().symbol_table();
        let plus = symbol_table.token("plus").unwrap();
        let state = grammar
            .parser_states()
            .iter()
            .find(|state| state.resolution() == ResolutionStage::Slr1)
            .unwrap();
        assert!(matches!(
            grammar.actions().action(state.ident, plus),
            Action::Shift(_)
        ));
        assert!(matches!(
            grammar.actions().action(state.ident, Token::END),
            Action::Reduce(_)
        ));
        assert!(grammar.recognize_text("x"));
        assert!(grammar.recognize_text("x plus x plus x"));
        assert!(!grammar.recognize_text("x plus"));
        assert!(!grammar.recognize_text("plus x"));
    }

    #[test]
    fn lalr_but_not_slr_grammar() {
        let specification = Specification::new(
            "%token a b c d\nS: A a | b A c | d c | b d a;\nA: d;\n",
            "test",
        );
        let grammar = Grammar::try_from(specification).expect("grammar is LALR(1)");
        assert!(grammar.diagnostics().is_empty());
        assert_eq!(grammar.total_unresolved_conflicts(), 0);
        let profile = grammar.resolution_profile();
        // SLR Follow(A) = {a, c} collides with the shifts in both conflict
        // states, so both resolve only at the LALR(1) stage
        assert!(!profile.contains(&ResolutionStage::Slr1));
        assert_eq!(
            profile
                .iter()
                .filter(|stage| **stage == ResolutionStage::Lalr1)
                .count(),
            2
        );
        for sentence in ["d a", "d c", "b d c", "b d a"] {
            assert!(grammar.recognize_text(sentence), "accepts \"{}\"", sentence);
        }
        for sentence in ["d d", "b d", "a", "b a c"] {
            assert!(!grammar.recognize_text(sentence), "rejects \"{}\"", sentence);
        }
        // the inspection surface exposes the relation sets
        assert_eq!(
            grammar.direct_read_sets().len(),
            grammar.nonterminal_transitions().len()
        );
        assert!(grammar.read_sets().is_some());
        assert!(grammar.follow_sets().is_some());
        assert!(grammar.slr_follow_sets().is_some());
    }

    #[test]
    fn reduce_reduce_conflict_is_fatal() {
        let specification = Specification::new("%token x\nS: A | B;\nA: x;\nB: x;\n", "test");
        match Grammar::try_from(specification) {
            Err(Error::ReduceReduceConflicts(diagnostics)) => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].severity, Severity::Error);
                assert_eq!(diagnostics[0].kind, DiagnosticKind::ReduceReduce);
                assert_eq!(diagnostics[0].items.len(), 2);
            }
            other => panic!("expected a fatal reduce/reduce error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_productions_propagate_nullability() {
        let specification =
            Specification::new("%token c\nS: A B;\nA: %empty;\nB: %empty | c;\n", "test");
        let grammar = Grammar::try_from(specification).expect("grammar is SLR(1)");
        assert!(grammar.diagnostics().is_empty());
        // the start state reduces the empty A production on every terminal
        let c = grammar.specification().symbol_table().token("c").unwrap();
        let a_production = grammar
            .specification()
            .productions()
            .find(|p| p.is_empty())
            .unwrap()
            .ident();
        assert_eq!(
            grammar.actions().action(0, Token::END),
            Action::Reduce(a_production)
        );
        assert_eq!(grammar.actions().action(0, c), Action::Reduce(a_production));
        assert_eq!(
            grammar.parser_states()[0].resolution(),
            ResolutionStage::Lr0
        );
        assert!(grammar.recognize_text(""));
        assert!(grammar.recognize_text("c"));
        assert!(!grammar.recognize_text("c c"));
    }

    #[test]
    fn zero_conflict_grammars_never_enter_the_lookahead_engine() {
        let specification = Specification::new("%token a b\nS: a | b;\n", "test");
        let grammar = Grammar::try_from(specification).expect("grammar is LR(0)");
        assert!(grammar.direct_read_sets().is_empty());
        assert!(grammar.read_sets().is_none());
        assert!(grammar.follow_sets().is_none());
        assert!(grammar.slr_follow_sets().is_none());
    }

    #[test]
    fn forced_lalr1_exercises_the_lalr_path_without_changing_tables() {
        let text = "%token plus x\nE: T | T plus E;\nT: x;\n";
        let by_default = Grammar::try_from(Specification::new(text, "test")).unwrap();
        let forced = Grammar::with_options(
            Specification::new(text, "test"),
            ProcessorOptions { force_lalr1: true },
        )
        .unwrap();
        assert_eq!(by_default.actions(), forced.actions());
        assert_eq!(by_default.gotos(), forced.gotos());
        // the resolution stage records which pass did the work
        assert!(by_default
            .resolution_profile()
            .contains(&ResolutionStage::Slr1));
        assert!(forced.resolution_profile().contains(&ResolutionStage::Lalr1));
        assert!(!forced.resolution_profile().contains(&ResolutionStage::Slr1));
        // forcing on an LR(0) grammar runs the engine but leaves tables alone
        let lr0_text = "%token a b\nS: a | b;\n";
        let lr0_default = Grammar::try_from(Specification::new(lr0_text, "test")).unwrap();
        let lr0_forced = Grammar::with_options(
            Specification::new(lr0_text, "test"),
            ProcessorOptions { force_lalr1: true },
        )
        .unwrap();
        assert_eq!(lr0_default.actions(), lr0_forced.actions());
        assert_eq!(lr0_default.gotos(), lr0_forced.gotos());
        assert!(lr0_forced.follow_sets().is_some());
    }

    #[test]
    fn description_names_states_and_tokens() {
        let specification = Specification::new("%token a b\nS: a | b;\n", "test");
        let grammar = Grammar::try_from(specification).unwrap();
        let description = grammar.description();
        assert!(description.contains("State<0>"));
        // the start item is the kernel of state 0; its S alternatives are
        // predictions
        assert!(description.contains("Kernel Items:\n    $start: . S $end"));
        assert!(description.contains("Predicted Items:\n    S: . a"));
        assert!(description.contains("Resolution: LR(0)"));
    }
}
