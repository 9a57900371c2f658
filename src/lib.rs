//! `cclint`: a static analyzer for C and C++ source.
//!
//! Pipeline: [`preprocessor`] → [`tokenizer`] (using [`token`] and
//! [`pattern`]) → [`simplifier`] → [`flow`] (variable-flow lowering,
//! statement reduction, leak verdicts) and [`checks`] (buffer-overrun,
//! class, style, unused-variable) → [`diagnostics`]. [`driver`] wires the
//! whole thing together per file; [`cli`] and [`config`] feed it its
//! inputs.

pub mod builtins;
pub mod checks;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod errors;
pub mod flow;
pub mod logging;
pub mod pattern;
pub mod preprocessor;
pub mod simplifier;
pub mod source;
pub mod token;
pub mod tokenizer;
