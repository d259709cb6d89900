//! Integration tests for CLI argument handling
//!
//! Runs the built binary against a temp-dir store. No test here needs the
//! network.

use std::process::Command;

use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_dictcache"))
        .args(args)
        .env_remove("DICTCACHE_GENERATION")
        .env_remove("DICTCACHE_APP_ROOT")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute dictcache")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dictcache"), "Help should mention dictcache");
    for command in ["install", "activate", "fetch", "sync", "generations", "watch"] {
        assert!(stdout.contains(command), "Help should mention {}", command);
    }
}

#[test]
fn test_generations_on_empty_store() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&["--cache-dir", dir, "generations"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No cache generations"), "unexpected output: {}", stdout);
}

#[test]
fn test_activate_before_install_fails() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&["--cache-dir", dir, "activate"]);
    assert!(!output.status.success(), "Expected activate without install to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not installed"), "unexpected stderr: {}", stderr);
}

#[test]
fn test_unknown_sync_tag_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&["--cache-dir", dir, "sync", "--tag", "something-else"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("not handled"), "unexpected output: {}", stdout);
}

#[test]
fn test_invalid_app_root_prints_error_and_exits() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&["--cache-dir", dir, "--app-root", "not-a-url", "generations"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid URL"), "unexpected stderr: {}", stderr);
}

#[test]
fn test_invalid_method_prints_error_and_exits() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&[
        "--cache-dir",
        dir,
        "fetch",
        "http://localhost:8080/",
        "--method",
        "NOT A METHOD",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid HTTP method"), "unexpected stderr: {}", stderr);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use dictcache::cli::{Cli, Commands, Settings};
    use dictcache::config::DEFAULT_APP_ROOT;

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["dictcache", "install", "-vv", "--cache-dir", "/tmp/c"]);
        assert!(matches!(cli.command, Commands::Install));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.cache_dir.as_deref(), Some(std::path::Path::new("/tmp/c")));
    }

    #[test]
    fn test_settings_store_uses_cache_dir() {
        let cli = Cli::parse_from(["dictcache", "--cache-dir", "/tmp/c", "generations"]);
        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.store().root(), std::path::Path::new("/tmp/c"));
        assert_eq!(settings.config.app_root.as_str(), DEFAULT_APP_ROOT);
    }

    #[test]
    fn test_fetch_output_flag() {
        let cli = Cli::parse_from([
            "dictcache",
            "fetch",
            "http://localhost:8080/index.html",
            "-o",
            "page.html",
        ]);
        let Commands::Fetch(args) = cli.command else {
            panic!("expected fetch command");
        };
        assert_eq!(args.output.as_deref(), Some(std::path::Path::new("page.html")));
        assert!(!args.navigate);
    }
}
