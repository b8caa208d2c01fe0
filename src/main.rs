// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>
use clap::crate_authors;
use structopt::StructOpt;

use std::{
    fs,
    io::prelude::*,
    path::{Path, PathBuf},
};

use lalr_gen::{Grammar, ProcessorOptions, Specification};

fn with_changed_extension(path: &Path, new_extension: &str) -> PathBuf {
    let mut new_path = PathBuf::new();
    if let Some(dir) = path.parent() {
        new_path.push(dir);
    };
    new_path.push(path.file_stem().unwrap());
    new_path.set_extension(new_extension);
    new_path
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "lalr_gen",
    about = "LALR(1) Parser Table Generator",
    author = crate_authors!(),
)]
struct CLOptions {
    /// Overwrite the output file (if it exists)
    #[structopt(short, long)]
    force: bool,
    /// Total number of unresolved shift/reduce conflicts that are expected.
    #[structopt(short, long)]
    expect: Option<usize>,
    /// Skip the SLR(1) pass and compute LALR(1) look aheads for every
    /// conflicted state.
    #[structopt(long)]
    force_lalr1: bool,
    /// The path of the file containing the grammar specification.
    #[structopt(parse(from_os_str))]
    specification: PathBuf,
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();
    let cl_options = CLOptions::from_args();
    let output_path = with_changed_extension(&cl_options.specification, "states");
    if output_path.exists() && !cl_options.force {
        writeln!(
            std::io::stderr(),
            "{}: output file already exists",
            output_path.to_string_lossy()
        )
        .unwrap();
        std::process::exit(1);
    }
    let mut file = match fs::File::open(&cl_options.specification) {
        Ok(file) => file,
        Err(error) => {
            writeln!(
                std::io::stderr(),
                "Error opening specification file: {:?}",
                error
            )
            .unwrap();
            std::process::exit(2);
        }
    };
    let mut specification_text = String::new();
    if let Err(error) = file.read_to_string(&mut specification_text) {
        writeln!(
            std::io::stderr(),
            "Error reading specification file: {:?}",
            error
        )
        .unwrap();
        std::process::exit(2);
    };

    let specification = Specification::new(
        &specification_text,
        &cl_options.specification.to_string_lossy(),
    );
    let options = ProcessorOptions {
        force_lalr1: cl_options.force_lalr1,
    };
    let grammar = match Grammar::with_options(specification, options) {
        Ok(grammar) => grammar,
        Err(error) => {
            writeln!(std::io::stderr(), "Grammar processing failed: {}.", error).unwrap();
            std::process::exit(4);
        }
    };

    for diagnostic in grammar.diagnostics() {
        writeln!(std::io::stderr(), "{}.", diagnostic).unwrap();
    }
    let expected_number_of_conflicts = cl_options.expect.unwrap_or(0);
    if grammar.total_unresolved_conflicts() != expected_number_of_conflicts {
        writeln!(
            std::io::stderr(),
            "Unexpected conflicts ({}) aborting",
            grammar.total_unresolved_conflicts()
        )
        .unwrap();
        std::process::exit(5);
    }
    if let Err(error) = grammar.write_description(&output_path) {
        writeln!(std::io::stderr(), "Error writing description: {:?}", error).unwrap();
        std::process::exit(2);
    }
}
