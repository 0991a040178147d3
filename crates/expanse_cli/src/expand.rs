//! `expanse expand`: expands every `macro_rules!` call in a file through
//! the persistent cache.

use std::fs;

use expanse_cache::{CacheStats, IndexNode, MacroExpansionService};
use expanse_expand::{GetMacroExpansionError, MacroCallData, MacroDefinition};
use serde::Serialize;

use crate::settings;
use crate::source::{MacroCall, SourceFile};
use crate::{ExpandArgs, GlobalArgs};

/// The outcome of one call.
#[derive(Debug, Serialize)]
pub struct CallReport {
    /// Called macro.
    pub name: String,
    /// Byte offset of the call in the file.
    pub offset: usize,
    /// Cache key, when the call resolved and could be hashed.
    pub hash: Option<String>,
    /// Expansion text on success.
    pub expansion: Option<String>,
    /// User-facing message on failure.
    pub error: Option<String>,
    /// Items declared by the expansion, as `kind name` lines, when requested.
    pub items: Option<Vec<String>>,
}

/// Everything `expand --json` prints.
#[derive(Debug, Serialize)]
pub struct ExpandReport {
    /// The expanded file.
    pub file: String,
    /// One entry per call, in source order.
    pub calls: Vec<CallReport>,
    /// Cache activity during this run.
    pub stats: CacheStats,
}

/// Runs the `expand` command.
pub fn run(args: &ExpandArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(&args.file)
        .map_err(|e| format!("cannot read {}: {e}", args.file.display()))?;
    let source = SourceFile::scan(&text).map_err(|e| format!("{}: {e}", args.file.display()))?;

    let mut config = settings::load_engine_config(global)?;
    if args.no_cache {
        config.cache.enabled = false;
    }
    let cache_dir = settings::cache_dir(&config, global);
    tracing::debug!(dir = %cache_dir.display(), enabled = config.cache.enabled, "expansion cache");
    let service = MacroExpansionService::from_config(&config, cache_dir);

    let calls: Vec<CallReport> = source
        .calls
        .iter()
        .map(|call| expand_call(&service, &source, call, args.index))
        .collect();
    let stats = service.cache().stats();
    service.dispose();

    let failed = calls.iter().filter(|c| c.error.is_some()).count();
    let report = ExpandReport {
        file: args.file.display().to_string(),
        calls,
        stats,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report, global);
    }

    Ok(if failed > 0 { 1 } else { 0 })
}

fn expand_call(
    service: &MacroExpansionService,
    source: &SourceFile,
    call: &MacroCall,
    with_index: bool,
) -> CallReport {
    let mut report = CallReport {
        name: call.name.clone(),
        offset: call.offset,
        hash: None,
        expansion: None,
        error: None,
        items: None,
    };
    let Some(def) = source.resolve(&call.name) else {
        report.error = Some(GetMacroExpansionError::Unresolved(call.name.clone()).to_user_viewable_message());
        return report;
    };
    let def = MacroDefinition::Declarative(def.clone());
    let data = MacroCallData::function_like(call.body.clone());
    report.hash = service.hash(&def, &data).map(|h| h.to_string());

    match service.expand(&def, &data) {
        Ok(ok) => report.expansion = Some(ok.text),
        Err(err) => {
            tracing::debug!(name = %call.name, error = %err, "expansion failed");
            report.error = Some(err.to_user_viewable_message());
            return report;
        }
    }
    if with_index {
        report.items = Some(
            service
                .expand_with_index(&def, &data)
                .map(|found| outline(&found.index.items))
                .unwrap_or_default(),
        );
    }
    report
}

/// Flattens an index tree into `kind name` lines, children indented.
fn outline(items: &[IndexNode]) -> Vec<String> {
    fn walk(items: &[IndexNode], depth: usize, out: &mut Vec<String>) {
        for item in items {
            out.push(format!("{}{:?} {}", "  ".repeat(depth), item.kind, item.name));
            walk(&item.children, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    walk(items, 0, &mut out);
    out
}

fn print_text(report: &ExpandReport, global: &GlobalArgs) {
    for call in &report.calls {
        match (&call.expansion, &call.error) {
            (Some(text), _) => {
                println!("{}!@{} => {text}", call.name, call.offset);
                for line in call.items.iter().flatten() {
                    println!("    {line}");
                }
            }
            (None, Some(message)) => eprintln!("{}!@{}: error: {message}", call.name, call.offset),
            (None, None) => {}
        }
    }
    if !global.quiet {
        let stats = &report.stats;
        eprintln!(
            "{} call(s); cache: {} hit(s), {} miss(es), {} recomputed",
            report.calls.len(),
            stats.hits,
            stats.misses,
            stats.recomputed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expanse_cache::ItemKind;
    use expanse_config::EngineConfig;

    fn service(dir: &tempfile::TempDir) -> MacroExpansionService {
        MacroExpansionService::from_config(&EngineConfig::default(), dir.path())
    }

    fn call<'a>(source: &'a SourceFile, name: &str) -> &'a MacroCall {
        source.calls.iter().find(|c| c.name == name).unwrap()
    }

    #[test]
    fn expands_resolved_calls() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceFile::scan(
            "macro_rules! double { ($x:expr) => { $x * 2 } } fn f() { double!(3); }",
        )
        .unwrap();
        let report = expand_call(&service(&dir), &source, call(&source, "double"), false);
        assert_eq!(report.expansion.as_deref(), Some("3 * 2"));
        assert!(report.error.is_none());
        assert!(report.hash.is_some());
        assert!(report.items.is_none());
    }

    #[test]
    fn unresolved_calls_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceFile::scan("fn f() { vec![1]; }").unwrap();
        let report = expand_call(&service(&dir), &source, call(&source, "vec"), false);
        assert_eq!(report.error.as_deref(), Some("macro `vec` can't be resolved"));
        assert!(report.hash.is_none());
    }

    #[test]
    fn matching_failures_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceFile::scan("macro_rules! one { (1) => {} } one!(2);").unwrap();
        let report = expand_call(&service(&dir), &source, call(&source, "one"), false);
        assert!(report.error.unwrap().starts_with("can't expand the macro"));
    }

    #[test]
    fn index_outline() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceFile::scan(
            "macro_rules! make { ($n:ident) => { struct $n; impl $n { fn new() {} } } } make!(Foo);",
        )
        .unwrap();
        let report = expand_call(&service(&dir), &source, call(&source, "make"), true);
        assert_eq!(
            report.items.unwrap(),
            vec!["Struct Foo", "Impl Foo", "  Function new"]
        );
    }

    #[test]
    fn outline_indents_children() {
        let items = vec![IndexNode {
            kind: ItemKind::Module,
            name: "m".to_string(),
            offset: 0,
            children: vec![IndexNode {
                kind: ItemKind::Const,
                name: "C".to_string(),
                offset: 6,
                children: Vec::new(),
            }],
        }];
        assert_eq!(outline(&items), vec!["Module m", "  Const C"]);
    }
}
