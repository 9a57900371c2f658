//! `[DRIVER]`: wires one source file through the whole pipeline — preprocess
//! → enumerate configurations → tokenize → simplify → {rule checks, leak
//! analysis per function} → merge into one sink — and, above that, the
//! multi-file entry point the CLI calls once per argument.
//!
//! Grounded on `thag_rs::builder`'s role as the top-level function that
//! calls the individual build passes in order; here the passes are the
//! analyzer's own stages instead of a Rust build.

use crate::checks;
use crate::config::Config;
use crate::diagnostics::DiagnosticSink;
use crate::flow::leak;
use crate::preprocessor;
use crate::simplifier;
use crate::source::SourceBuffer;
use crate::tokenizer::Tokenizer;

/// Analyzes one file's already-loaded text, merging diagnostics from every
/// reachable preprocessor configuration (`spec.md` §5: each configuration is
/// analyzed independently, capped at `config.max_configs`).
#[must_use]
pub fn analyze_file(text: &str, file_index: usize, config: &Config) -> DiagnosticSink {
    let mut sink = DiagnosticSink::new().with_disabled(config.disabled.iter().copied());
    if let Some(min) = config.severity {
        sink = sink.with_min_severity(min);
    }

    let predefined: Vec<String> = config.predefined.keys().cloned().collect();
    let source_with_defines = prepend_defines(text, &config.predefined);
    let configurations = preprocessor::preprocess(&source_with_defines, &predefined);

    for (_label, expanded) in configurations.into_iter().take(config.max_configs.max(1)) {
        analyze_configuration(&expanded, file_index, config, &mut sink);
    }
    sink
}

/// `#define NAME VALUE` lines prepended ahead of the real source, so the
/// preprocessor's own macro-expansion machinery handles `--define`/config
/// values without needing a second substitution path.
fn prepend_defines(source: &str, predefined: &std::collections::HashMap<String, String>) -> String {
    let mut out = String::new();
    for (name, value) in predefined {
        out.push_str(&format!("#define {name} {value}\n"));
    }
    out.push_str(source);
    out
}

fn analyze_configuration(text: &str, file_index: usize, config: &Config, sink: &mut DiagnosticSink) {
    let mut tz = match Tokenizer::new(text, file_index, config.pointer_size) {
        Ok(tz) => tz,
        Err(err) => {
            log::warn!("tokenizer error, configuration skipped: {err}");
            return;
        }
    };
    for (name, size) in &config.type_sizes {
        tz.set_size_of_type(name.clone(), *size);
    }

    simplifier::simplify(&mut tz);

    checks::run_all(&tz, sink);

    for (body_open, body_close) in tz.function_bodies() {
        leak::check_function(&tz, body_open, body_close, sink, config.show_all);
    }
}

/// The multi-file entry point the CLI calls: one independent analysis per
/// file, in argument order, each with its own [`SourceBuffer`] file index.
pub fn analyze_files(source: &SourceBuffer, config: &Config) -> Vec<DiagnosticSink> {
    (0..source.file_count())
        .map(|file_index| analyze_file(source.text(file_index), file_index, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_file_produces_no_diagnostics() {
        let config = Config::default();
        let sink = analyze_file("int main(void) { return 0; }\n", 0, &config);
        assert!(sink.is_empty());
    }

    #[test]
    fn leak_is_detected_through_the_full_pipeline() {
        let config = Config::default();
        let sink = analyze_file("void f(void) { char *p = malloc(10); }\n", 0, &config);
        assert!(sink
            .records()
            .iter()
            .any(|d| d.id == crate::diagnostics::DiagnosticId::MemLeak));
    }

    #[test]
    fn severity_filter_is_applied_by_the_driver() {
        let mut config = Config::default();
        config.severity = Some(crate::diagnostics::Severity::Error);
        let sink = analyze_file(
            "void f(void) { char c; int idx = c[0]; }\n",
            0,
            &config,
        );
        assert!(sink.records().iter().all(|d| d.severity <= crate::diagnostics::Severity::Error));
    }

    #[test]
    fn cli_define_reaches_conditional_compilation() {
        let mut config = Config::default();
        config.predefined.insert("DEBUG".to_string(), "1".to_string());
        let sink = analyze_file(
            "void f(void) {\n#ifdef DEBUG\nchar *p = malloc(10);\n#endif\n}\n",
            0,
            &config,
        );
        assert!(sink
            .records()
            .iter()
            .any(|d| d.id == crate::diagnostics::DiagnosticId::MemLeak));
    }

    #[test]
    fn multi_file_analysis_keeps_files_independent() {
        let mut source = SourceBuffer::new();
        source.add_file("a.c", "int main(void) { return 0; }\n");
        source.add_file("b.c", "void f(void) { char *p = malloc(10); }\n");
        let config = Config::default();
        let sinks = analyze_files(&source, &config);
        assert_eq!(sinks.len(), 2);
        assert!(sinks[0].is_empty());
        assert!(!sinks[1].is_empty());
    }
}
