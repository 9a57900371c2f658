//! End-to-end coverage of the built `cclint` binary: the six concrete
//! scenarios from `spec.md` §8, plus the CLI-level invariants (`[CLI]`,
//! `[DRIVER]`) that unit tests inside `src/` can't reach.
//!
//! Grounded on `thag_rs`'s `tests/stdin.rs`, which drives the built binary
//! with `assert_cmd` and checks stdout with `predicates`.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn write_source(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".c").expect("create temp source file");
    write!(file, "{text}").expect("write temp source file");
    file
}

fn cclint() -> Command {
    Command::cargo_bin("cclint").expect("built cclint binary")
}

#[test]
fn leak_baseline_scenario_exits_one_and_reports_memleak() {
    let file = write_source("void f(){ char *p = malloc(10); }\n");
    cclint()
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("memleak"));
}

#[test]
fn mismatched_pair_scenario_reports_mismatch_alloc_dealloc() {
    let file = write_source("void f(){ int *p = new int; free(p); }\n");
    cclint()
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("mismatchAllocDealloc"));
}

#[test]
fn array_overflow_scenario_reports_buffer_overrun() {
    let file = write_source("void f(){ char s[3]; strcpy(s,\"abc\"); }\n");
    cclint()
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("bufferOverrun"));
}

#[test]
fn uninit_member_scenario_reports_uninit_member() {
    let file = write_source("class F{ int i; public: F(){} };\n");
    cclint()
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("uninitMember"));
}

#[test]
fn clean_source_exits_zero_with_empty_report() {
    let file = write_source("int main(void) { return 0; }\n");
    cclint().arg(file.path()).assert().code(0).stdout(predicate::str::is_empty());
}

#[test]
fn missing_source_file_exits_fatal() {
    cclint().arg("/nonexistent/does-not-exist.c").assert().code(2);
}

#[test]
fn xml_flag_selects_xml_report_format() {
    let file = write_source("void f(){ char *p = malloc(10); }\n");
    cclint()
        .arg("--xml")
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("<?xml"));
}

#[test]
fn disable_flag_suppresses_the_named_id() {
    let file = write_source("void f(){ char *p = malloc(10); }\n");
    cclint()
        .arg("--disable")
        .arg("memleak")
        .arg(file.path())
        .assert()
        .code(0)
        .stdout(predicate::str::is_empty());
}

#[test]
fn severity_filter_drops_style_only_findings() {
    // `c` as an index (`checks::style::check_char_as_index`) is PossibleStyle
    // only; filtering to `error` must hide it entirely.
    let file = write_source("void f(){ char c; int a[4]; int x = a[c]; }\n");
    cclint()
        .arg("--severity")
        .arg("error")
        .arg(file.path())
        .assert()
        .stdout(predicate::str::contains("charVariableAsIndex").not());
}

#[test]
fn define_flag_enables_a_conditional_branch() {
    let file = write_source("void f(void) {\n#ifdef DEBUG\nchar *p = malloc(10);\n#endif\n}\n");
    cclint()
        .arg("-D")
        .arg("DEBUG")
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("memleak"));
}

#[test]
fn multiple_files_are_each_analyzed_independently() {
    let clean = write_source("int main(void) { return 0; }\n");
    let leaky = write_source("void f(){ char *p = malloc(10); }\n");
    cclint()
        .arg(clean.path())
        .arg(leaky.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("memleak"));
}
