//! End-to-end runs of the `expanse` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const DEMO: &str = "\
macro_rules! square {
    ($x:expr) => { $x * $x };
}

macro_rules! getter {
    ($name:ident) => { fn $name() -> u32 { 0 } };
}

fn main() {
    let a = square!(4);
    getter!(value);
}
";

fn expanse(cache: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_expanse"))
        .arg("--cache-dir")
        .arg(cache)
        .args(args)
        .env_remove("EXPANSE_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn write_demo(dir: &Path) -> String {
    let file = dir.join("demo.rs");
    fs::write(&file, DEMO).unwrap();
    file.display().to_string()
}

#[test]
fn expand_prints_every_call() {
    let tmp = tempfile::tempdir().unwrap();
    let file = write_demo(tmp.path());
    let output = expanse(&tmp.path().join("cache"), &["expand", &file]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("square!@"));
    assert!(text.contains("=> 4 * 4"));
    assert!(text.contains("fn value() -> u32 { 0 }"));
}

#[test]
fn second_run_is_served_from_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let file = write_demo(tmp.path());
    let cache = tmp.path().join("cache");

    let first = json(&expanse(&cache, &["expand", &file, "--json"]));
    assert_eq!(first["stats"]["misses"], 2);
    assert_eq!(first["stats"]["hits"], 0);

    let second = json(&expanse(&cache, &["expand", &file, "--json"]));
    assert_eq!(second["stats"]["misses"], 0);
    assert_eq!(second["stats"]["hits"], 2);
    assert_eq!(first["calls"], second["calls"]);
}

#[test]
fn no_cache_leaves_no_files() {
    let tmp = tempfile::tempdir().unwrap();
    let file = write_demo(tmp.path());
    let cache = tmp.path().join("cache");
    let report = json(&expanse(&cache, &["expand", &file, "--json", "--no-cache"]));
    assert_eq!(report["calls"][0]["expansion"], "4 * 4");
    assert_eq!(report["stats"]["misses"], 0);
    assert!(!cache.exists());
}

#[test]
fn index_lists_declared_items() {
    let tmp = tempfile::tempdir().unwrap();
    let file = write_demo(tmp.path());
    let report = json(&expanse(
        &tmp.path().join("cache"),
        &["expand", &file, "--json", "--index"],
    ));
    assert_eq!(report["calls"][1]["items"][0], "Function value");
}

#[test]
fn unresolved_call_fails_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("bad.rs");
    fs::write(&file, "fn main() { missing!(1); }").unwrap();
    let output = expanse(
        &tmp.path().join("cache"),
        &["expand", &file.display().to_string()],
    );
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("macro `missing` can't be resolved"));
}

#[test]
fn missing_file_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let output = expanse(&tmp.path().join("cache"), &["expand", "/no/such/file.rs"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.starts_with("error: cannot read"));
}

#[test]
fn cache_stats_and_clear() {
    let tmp = tempfile::tempdir().unwrap();
    let file = write_demo(tmp.path());
    let cache = tmp.path().join("cache");
    assert!(expanse(&cache, &["expand", &file, "--index"]).status.success());

    let stats = json(&expanse(&cache, &["cache", "stats", "--json"]));
    assert_eq!(stats["expansions"], 2);
    assert_eq!(stats["indexes"], 2);

    let output = expanse(&cache, &["cache", "clear"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("removed 3 cache file(s)"));

    let stats = json(&expanse(&cache, &["cache", "stats", "--json"]));
    assert_eq!(stats["expansions"], 0);
}

#[test]
fn cache_flush_repairs_corrupted_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let file = write_demo(tmp.path());
    let cache = tmp.path().join("cache");
    assert!(expanse(&cache, &["expand", &file]).status.success());

    fs::write(cache.join("expansion-cache").join("store.json"), "{ not json").unwrap();
    assert!(expanse(&cache, &["cache", "flush"]).status.success());

    let stats = json(&expanse(&cache, &["cache", "stats", "--json"]));
    assert_eq!(stats["expansions"], 0);
}

#[test]
fn config_file_disables_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let file = write_demo(tmp.path());
    let config = tmp.path().join("expanse.toml");
    fs::write(&config, "[cache]\nenabled = false\n").unwrap();
    let cache = tmp.path().join("cache");
    let report = json(&expanse(
        &cache,
        &["--config", &config.display().to_string(), "expand", &file, "--json"],
    ));
    assert_eq!(report["calls"][1]["expansion"], "fn value() -> u32 { 0 }");
    assert!(!cache.exists());
}
