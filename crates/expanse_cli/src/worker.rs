//! The `expanse proc-worker` helper process.
//!
//! Speaks the framed worker protocol on stdin/stdout and serves a handful of
//! built-in procedural macros. The CLI points the engine at it when no other
//! helper is configured.

use std::io::{self, BufReader, BufWriter};
use std::process;
use std::thread;
use std::time::Duration;

use expanse_cache::{IndexBuilder, ItemIndexBuilder, ItemKind};
use expanse_proc::{serve, ExpansionTask};

/// Subcommand name the engine passes to start this helper.
pub const PROC_WORKER_COMMAND: &str = "proc-worker";

/// Exit code of the `abort` macro.
pub const ABORT_EXIT_CODE: i32 = 101;

/// Serves requests until the engine closes stdin.
pub fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let input = BufReader::new(io::stdin().lock());
    let output = BufWriter::new(io::stdout().lock());
    serve(input, output, handle)?;
    Ok(0)
}

fn handle(payload: &[u8]) -> Result<Vec<u8>, String> {
    let task = ExpansionTask::decode(payload).map_err(|e| format!("malformed request: {e}"))?;
    tracing::debug!(name = %task.macro_name, kind = %task.kind, "proc-worker request");
    expand_builtin(&task).map(String::into_bytes)
}

/// Expands one call with the built-in macro named by the task.
///
/// - `upper`: the body in upper case.
/// - `derive_name`: an `impl` with a `NAME` constant for the annotated type.
/// - `doc`: the item with the attribute arguments as a doc attribute.
/// - `sleep`: waits the number of milliseconds in the body, then echoes it.
/// - `fail`: reports the body as the macro's error.
/// - `abort`: exits the helper.
pub fn expand_builtin(task: &ExpansionTask) -> Result<String, String> {
    match task.macro_name.as_str() {
        "upper" => Ok(task.body.to_uppercase()),
        "derive_name" => derive_name(&task.body),
        "doc" => Ok(format!(
            "#[doc = {:?}]\n{}",
            task.attributes.as_deref().unwrap_or_default(),
            task.body
        )),
        "sleep" => {
            thread::sleep(millis(&task.body)?);
            Ok(task.body.clone())
        }
        "fail" => Err(task.body.clone()),
        "abort" => process::exit(ABORT_EXIT_CODE),
        other => Err(format!(
            "no procedural macro named `{other}` in {}",
            task.library
        )),
    }
}

fn millis(body: &str) -> Result<Duration, String> {
    body.trim()
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| format!("expected a number of milliseconds, found `{}`", body.trim()))
}

fn derive_name(item: &str) -> Result<String, String> {
    let name = ItemIndexBuilder
        .build_index(item)
        .and_then(|tree| {
            tree.items
                .into_iter()
                .find(|node| matches!(node.kind, ItemKind::Struct | ItemKind::Enum | ItemKind::Union))
        })
        .map(|node| node.name)
        .ok_or_else(|| "`derive_name` can only be applied to a struct, enum, or union".to_string())?;
    Ok(format!(
        "impl {name} {{ pub const NAME: &'static str = \"{name}\"; }}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use expanse_proc::ProcMacroKind;

    fn task(name: &str, kind: ProcMacroKind, body: &str) -> ExpansionTask {
        ExpansionTask {
            library: "builtin".to_string(),
            macro_name: name.to_string(),
            kind,
            body: body.to_string(),
            attributes: None,
            env: Vec::new(),
        }
    }

    #[test]
    fn upper() {
        let out = expand_builtin(&task("upper", ProcMacroKind::FunctionLike, "fn f() {}"));
        assert_eq!(out.unwrap(), "FN F() {}");
    }

    #[test]
    fn derive_name_for_struct() {
        let out = expand_builtin(&task(
            "derive_name",
            ProcMacroKind::Derive,
            "#[derive(Debug)] pub struct Point { x: i32 }",
        ));
        assert_eq!(
            out.unwrap(),
            "impl Point { pub const NAME: &'static str = \"Point\"; }"
        );
    }

    #[test]
    fn derive_name_rejects_functions() {
        let out = expand_builtin(&task("derive_name", ProcMacroKind::Derive, "fn f() {}"));
        assert!(out.unwrap_err().contains("struct, enum, or union"));
    }

    #[test]
    fn doc_attribute() {
        let mut t = task("doc", ProcMacroKind::Attribute, "fn f() {}");
        t.attributes = Some("hello".to_string());
        assert_eq!(expand_builtin(&t).unwrap(), "#[doc = \"hello\"]\nfn f() {}");
    }

    #[test]
    fn fail_and_unknown() {
        let out = expand_builtin(&task("fail", ProcMacroKind::FunctionLike, "bad input"));
        assert_eq!(out.unwrap_err(), "bad input");
        let out = expand_builtin(&task("nope", ProcMacroKind::FunctionLike, ""));
        assert!(out.unwrap_err().contains("no procedural macro named `nope`"));
    }

    #[test]
    fn sleep_parses_milliseconds() {
        let out = expand_builtin(&task("sleep", ProcMacroKind::FunctionLike, " 1 "));
        assert_eq!(out.unwrap(), " 1 ");
        let out = expand_builtin(&task("sleep", ProcMacroKind::FunctionLike, "soon"));
        assert!(out.unwrap_err().contains("milliseconds"));
    }

    #[test]
    fn handler_rejects_garbage() {
        assert!(handle(&[0xff, 0xff, 0xff]).unwrap_err().starts_with("malformed request"));
    }

    #[test]
    fn handler_encodes_text() {
        let payload = task("upper", ProcMacroKind::FunctionLike, "x").encode().unwrap();
        assert_eq!(handle(&payload).unwrap(), b"X");
    }
}
