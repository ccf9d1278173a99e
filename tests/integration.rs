use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn pidx_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pidx"))
}

fn setup_test_env(backend: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let pages_dir = root.join("pages");
    fs::create_dir_all(&pages_dir).unwrap();
    fs::write(
        pages_dir.join("cats.txt"),
        "The cat sat. The cat ran far away today in the sun.",
    )
    .unwrap();
    fs::write(pages_dir.join("dogs.txt"), "Dogs bark loudly at night.").unwrap();

    let store_file = if backend == "sqlite" {
        "pages.sqlite"
    } else {
        "pages.json"
    };
    let config_content = format!(
        r#"[store]
backend = "{}"
path = "{}/data/{}"

[embedding]
provider = "hash"

[retrieval]
top_k = 5
"#,
        backend,
        root.display(),
        store_file
    );

    let config_path = root.join("pidx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_pidx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pidx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pidx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn index_fixtures(config_path: &Path) {
    let pages = config_path.parent().unwrap().join("pages");
    for (url, title, file) in [
        ("https://cats.test/", "Cats", "cats.txt"),
        ("https://dogs.test/", "Dogs", "dogs.txt"),
    ] {
        let path = pages.join(file);
        let (stdout, stderr, success) = run_pidx(
            config_path,
            &["index", url, "--title", title, "--file", path.to_str().unwrap()],
        );
        assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
        assert!(stdout.contains("Indexed"));
    }
}

#[test]
fn test_index_and_search() {
    let (_tmp, config_path) = setup_test_env("json");
    index_fixtures(&config_path);

    let (stdout, stderr, success) = run_pidx(&config_path, &["search", "cat"]);
    assert!(success, "search failed: {}", stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. "), "unexpected output: {}", stdout);
    assert!(first.contains("Cats"));
}

#[test]
fn test_search_on_sqlite_backend() {
    let (_tmp, config_path) = setup_test_env("sqlite");
    index_fixtures(&config_path);

    let (stdout, _, success) = run_pidx(&config_path, &["search", "cat", "--limit", "1"]);
    assert!(success);
    assert!(stdout.contains("https://cats.test/"));
    assert!(!stdout.contains("https://dogs.test/"));
}

#[test]
fn test_index_from_stdin() {
    let (_tmp, config_path) = setup_test_env("json");
    let mut child = Command::new(pidx_binary())
        .arg("--config")
        .arg(&config_path)
        .args(["index", "https://stdin.test/", "--title", "Piped"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"Piped page text arrives on stdin.")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let (stdout, _, success) = run_pidx(&config_path, &["get", "https://stdin.test/"]);
    assert!(success);
    assert!(stdout.contains("Piped page text arrives on stdin."));
}

#[test]
fn test_empty_page_fails() {
    let (_tmp, config_path) = setup_test_env("json");
    let empty = config_path.parent().unwrap().join("empty.txt");
    fs::write(&empty, "   \n").unwrap();

    let (_, stderr, success) = run_pidx(
        &config_path,
        &["index", "https://empty.test/", "--file", empty.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("No meaningful content"));
}

#[test]
fn test_get_missing_document() {
    let (_tmp, config_path) = setup_test_env("json");
    let (_, stderr, success) = run_pidx(&config_path, &["get", "https://nowhere.test/"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_list_delete_clear() {
    let (_tmp, config_path) = setup_test_env("json");
    index_fixtures(&config_path);

    let (stdout, _, _) = run_pidx(&config_path, &["list"]);
    assert!(stdout.contains("https://cats.test/"));
    assert!(stdout.contains("https://dogs.test/"));

    let (stdout, _, success) = run_pidx(&config_path, &["delete", "https://cats.test/"]);
    assert!(success);
    assert!(stdout.contains("Deleted"));
    let (stdout, _, success) = run_pidx(&config_path, &["delete", "https://cats.test/"]);
    assert!(success, "deleting an unknown page must succeed");
    assert!(stdout.contains("Not indexed"));

    let (stdout, _, _) = run_pidx(&config_path, &["search", "cat"]);
    assert!(!stdout.contains("https://cats.test/"));

    run_pidx(&config_path, &["clear"]);
    let (stdout, _, _) = run_pidx(&config_path, &["list"]);
    assert!(stdout.contains("No documents indexed."));
    let (stdout, _, success) = run_pidx(&config_path, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_history() {
    let (_tmp, config_path) = setup_test_env("json");
    index_fixtures(&config_path);
    run_pidx(&config_path, &["search", "first query"]);
    run_pidx(&config_path, &["search", "second query"]);

    let (stdout, _, _) = run_pidx(&config_path, &["history"]);
    let lines: Vec<_> = stdout.lines().collect();
    assert!(lines[0].contains("second query"));
    assert!(lines[1].contains("first query"));

    run_pidx(&config_path, &["history", "--clear"]);
    let (stdout, _, _) = run_pidx(&config_path, &["history"]);
    assert!(stdout.contains("No search history yet."));
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env("json");
    fs::write(&config_path, "[embedding]\nprovider = \"magic\"\n").unwrap();
    let (_, stderr, success) = run_pidx(&config_path, &["list"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"));
}
