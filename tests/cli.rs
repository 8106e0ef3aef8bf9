use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn drivechat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("drivechat");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/drivechat.sqlite"

[storage]
index_dir = "{root}/indices"

[server]
bind = "127.0.0.1:7431"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("drivechat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = drivechat_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("DRIVE_ACCESS_TOKEN")
        .env_remove("DRIVE_REFRESH_TOKEN")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run drivechat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data").join("drivechat.sqlite").exists());
    assert!(tmp.path().join("indices").is_dir());

    // idempotent
    let (_, stderr, ok) = run(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_status_of_unknown_owner() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run(&config, &["status", "alice"]);
    assert!(ok, "status failed: {}", stderr);
    assert!(stdout.contains("indexed: no"));
}

#[test]
fn test_ask_without_index_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run(&config, &["ask", "alice", "hello?"]);
    assert!(!ok);
    assert!(stderr.contains("no index found"), "stderr: {}", stderr);
}

#[test]
fn test_remove_unknown_owner() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run(&config, &["remove", "alice"]);
    assert!(ok, "remove failed: {}", stderr);
    assert!(stdout.contains("no index for alice"));

    let (_, _, ok) = run(&config, &["remove", "../etc"]);
    assert!(!ok);
}

#[test]
fn test_index_malformed_url_writes_nothing() {
    let (tmp, config) = setup_test_env();
    let (_, stderr, ok) = run(
        &config,
        &[
            "index",
            "https://example.com/not-a-folder",
            "--owner",
            "alice",
            "--access-token",
            "token",
        ],
    );
    assert!(!ok);
    assert!(stderr.contains("malformed folder URL"), "stderr: {}", stderr);
    assert!(!tmp.path().join("indices").join("index-alice").exists());
}

#[test]
fn test_index_requires_access_token() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run(
        &config,
        &["index", "https://drive.google.com/drive/folders/abc", "--owner", "alice"],
    );
    assert!(!ok);
    assert!(stderr.contains("--access-token"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, ok) = run(Path::new("/nonexistent/drivechat.toml"), &["status", "alice"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
