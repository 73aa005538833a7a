//! Shared helpers: fake runner scripts and handler construction.
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use comfyui_edit_worker::{Handler, HandlerConfig};

static SERIAL: Mutex<()> = Mutex::new(());

/// Serializes tests that write and then exec a script, so no concurrent fork
/// holds the script open for writing (ETXTBSY).
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shell prologue that records the arguments and staged inputs into `record`
/// and resolves the `--output` path into `$out`.
fn prologue(record: &Path) -> String {
    format!(
        r#"#!/bin/sh
rec="{rec}"
printf '%s\n' "$@" > "$rec/args.txt"
out=""
in1=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    --input1) in1="$2"; shift 2 ;;
    *) shift ;;
  esac
done
[ -n "$in1" ] && cp "$in1" "$rec/input1.copy"
"#,
        rec = record.display()
    )
}

/// Write an executable fake runner whose body runs after the prologue.
pub fn fake_runner(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake_runner.sh");
    std::fs::write(&path, format!("{}{}\n", prologue(dir), body)).expect("write fake runner");
    let mut perms = std::fs::metadata(&path).expect("stat fake runner").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod fake runner");
    path
}

pub fn handler_for(runner: PathBuf, timeout: Duration) -> Handler {
    Handler::new(HandlerConfig {
        runner_bin: runner,
        runner_timeout: timeout,
        default_workflow: "/workflows/default_API.json".to_string(),
    })
}

/// Arguments the fake runner was invoked with, one per line.
pub fn recorded_args(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("args.txt"))
        .map(|s| s.lines().map(String::from).collect())
        .unwrap_or_default()
}

pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}
