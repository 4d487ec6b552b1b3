use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

fn fontfill(args: &[&str], extra: &[&Path]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fontfill"))
        .args(args)
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .expect("run fontfill")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[cfg(unix)]
fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[test]
fn convert_json_fills_missing_formats() {
    let temp = tempdir().expect("tempdir");
    let fonts = temp.path().join("fonts");
    fs::create_dir_all(&fonts).unwrap();
    fs::write(fonts.join("Arial.ttf"), b"arial").unwrap();
    fs::write(fonts.join("CustomFont.woff2"), b"custom").unwrap();

    let compress = fake_tool(temp.path(), "compress", "cp \"$1\" \"${1%.*}.woff2\"");
    let decompress = fake_tool(temp.path(), "decompress", "cp \"$1\" \"${1%.*}.ttf\"");
    let static_dir = temp.path().join("static");
    let log_dir = temp.path().join("logs");

    let output = Command::new(env!("CARGO_BIN_EXE_fontfill"))
        .args(["convert", "--json", "--quiet"])
        .arg("--compress-tool")
        .arg(&compress)
        .arg("--decompress-tool")
        .arg(&decompress)
        .arg("--static-dir")
        .arg(&static_dir)
        .arg("--log-dir")
        .arg(&log_dir)
        .arg(&fonts)
        .output()
        .expect("run fontfill");
    assert_success(&output);

    let parsed: Value = serde_json::from_slice(&output.stdout).expect("json output");
    let items = parsed.as_array().expect("array");
    assert_eq!(items.len(), 2);

    let arial = items.iter().find(|v| v["name"] == "Arial").expect("Arial");
    assert!(arial["formats"][".woff2"].is_string());
    assert_eq!(arial["preview"], arial["formats"][".woff2"]);

    let custom = items.iter().find(|v| v["name"] == "CustomFont").expect("CustomFont");
    assert!(custom["formats"][".ttf"].is_string());

    assert!(static_dir.join("converted/Arial.woff2").is_file());
    assert!(static_dir.join("converted/CustomFont.ttf").is_file());
    let logs: Vec<_> = fs::read_dir(&log_dir).unwrap().collect();
    assert!(!logs.is_empty(), "expected a log file");
}

#[cfg(unix)]
#[test]
fn convert_prints_progress_on_stderr() {
    let temp = tempdir().expect("tempdir");
    let fonts = temp.path().join("fonts");
    fs::create_dir_all(&fonts).unwrap();
    fs::write(fonts.join("Solo.otf"), b"solo").unwrap();
    let compress = fake_tool(temp.path(), "compress", "cp \"$1\" \"${1%.*}.woff2\"");
    let static_dir = temp.path().join("static");
    let log_dir = temp.path().join("logs");

    let output = fontfill(
        &["convert", "--compress-tool"],
        &[&compress, Path::new("--static-dir"), &static_dir, Path::new("--log-dir"), &log_dir, &fonts],
    );
    assert_success(&output);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Starting font processing..."), "{stderr}");
    assert!(
        stderr.contains("WOFF2 conversion: 1/1 - Processing: Solo"),
        "{stderr}"
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Solo\n"), "{stdout}");
    assert!(stdout.contains(".woff2"), "{stdout}");
}

#[test]
fn convert_rejects_missing_directory() {
    let temp = tempdir().expect("tempdir");
    let missing = temp.path().join("missing");
    let static_dir = temp.path().join("static");
    let log_dir = temp.path().join("logs");

    let output = fontfill(
        &["convert"],
        &[Path::new("--static-dir"), &static_dir, Path::new("--log-dir"), &log_dir, &missing],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "{stderr}");
    assert!(stderr.contains("does not exist"), "{stderr}");
}

#[test]
fn clean_keeps_fresh_files() {
    let temp = tempdir().expect("tempdir");
    let static_dir = temp.path().join("static");
    let converted = static_dir.join("converted");
    fs::create_dir_all(&converted).unwrap();
    fs::write(converted.join("Fresh.woff2"), b"fresh").unwrap();
    let log_dir = temp.path().join("logs");

    let output = fontfill(
        &["clean"],
        &[Path::new("--static-dir"), &static_dir, Path::new("--log-dir"), &log_dir],
    );
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("removed 0 of 1 files"), "{stdout}");
    assert!(converted.join("Fresh.woff2").exists());
}

#[test]
fn clean_rejects_an_overflowing_ttl() {
    let temp = tempdir().expect("tempdir");
    let static_dir = temp.path().join("static");
    let log_dir = temp.path().join("logs");

    let output = fontfill(
        &["clean", "--ttl-hours", "18446744073709551615"],
        &[Path::new("--static-dir"), &static_dir, Path::new("--log-dir"), &log_dir],
    );
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("too large"), "{stderr}");
}
