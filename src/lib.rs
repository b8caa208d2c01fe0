// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

//! An LALR(1) parser table generator: processes a grammar specification into
//! ACTION/GOTO tables, resolving lookaheads hierarchically (LR(0), then
//! SLR(1), then LALR(1) via the DeRemer and Pennello digraph algorithm).

pub mod bitset;
pub mod grammar;
pub mod lookahead;
pub mod production;
pub mod state;
pub mod symbol;
pub mod table;

pub use crate::grammar::{
    Diagnostic, DiagnosticKind, Error, Grammar, Location, ProcessorOptions, Severity,
    Specification,
};
pub use crate::state::ResolutionStage;
pub use crate::table::Action;
