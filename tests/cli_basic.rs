//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, each subcommand
//! responds to `--help`, and the offline `resolve` and `config` commands
//! produce the expected output.

#![allow(deprecated)] // cargo_bin deprecation, replacement not yet stable

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

/// Helper: get a Command for the `streamfall` binary.
fn streamfall() -> Command {
    Command::cargo_bin("streamfall").expect("binary 'streamfall' should be built")
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    streamfall()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: streamfall"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("probe"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn version_flag_shows_semver() {
    streamfall()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^streamfall \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_args_shows_error_and_usage() {
    streamfall()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: streamfall"));
}

#[test]
fn invalid_subcommand_fails() {
    streamfall()
        .arg("this-is-not-a-real-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─── Subcommand help ─────────────────────────────────────────────────────────

#[test]
fn resolve_help() {
    streamfall()
        .args(["resolve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Show which target a source resolves to"))
        .stdout(predicate::str::contains("<URL>"))
        .stdout(predicate::str::contains("--failed"));
}

#[test]
fn probe_help() {
    streamfall()
        .args(["probe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("run playback against the network"))
        .stdout(predicate::str::contains("--native-hls"))
        .stdout(predicate::str::contains("--block-autoplay"))
        .stdout(predicate::str::contains("--timeout"));
}

// ─── resolve ─────────────────────────────────────────────────────────────────

#[test]
fn resolve_progressive_derives_manifest() {
    streamfall()
        .args(["resolve", "https://cdn.example.com/courses/5/video-1.mp4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Target: manifest"))
        .stdout(predicate::str::contains(
            "Manifest: https://cdn.example.com/courses/5/hls/video-1/video-1.m3u8",
        ))
        .stdout(predicate::str::contains(
            "Fallback: https://cdn.example.com/courses/5/video-1.mp4",
        ));
}

#[test]
fn resolve_failed_source_is_progressive() {
    streamfall()
        .args([
            "resolve",
            "--failed",
            "https://cdn.example.com/courses/5/video-1.mp4",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Target: progressive"));
}

#[test]
fn resolve_manifest_json() {
    streamfall()
        .args(["resolve", "--json", "https://cdn.example.com/stream.m3u8"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "manifest""#))
        .stdout(predicate::str::contains(
            r#""url": "https://cdn.example.com/stream.m3u8""#,
        ))
        .stdout(predicate::str::contains("fallback").not());
}

// ─── config ──────────────────────────────────────────────────────────────────

#[test]
fn config_file_overrides_defaults() {
    let dir = std::env::temp_dir().join(format!("streamfall-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    fs::write(&path, "adaptive_subfolder = \"adaptive\"\nerror_budget = 2\n").unwrap();

    streamfall()
        .args(["--config", path.to_str().unwrap(), "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("error_budget = 2"))
        .stdout(predicate::str::contains("adaptive_subfolder = \"adaptive\""));

    streamfall()
        .args([
            "--config",
            path.to_str().unwrap(),
            "resolve",
            "https://cdn.example.com/v/intro.mp4",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "https://cdn.example.com/v/adaptive/intro/intro.m3u8",
        ));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_config_file_fails() {
    streamfall()
        .args(["--config", "/no/such/streamfall.toml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
