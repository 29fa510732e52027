//! CLI integration tests for graphwise
//!
//! Tests the graphwise CLI commands end-to-end using assert_cmd. Commands
//! that need a live LLM or Neo4j are exercised only up to their input
//! validation; the pipeline itself is covered by graphwise-core's tests.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a command with an isolated config/store directory
fn graphwise_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("graphwise").unwrap();
    cmd.env("GRAPHWISE_CONFIG_DIR", home.path());
    cmd.env_remove("GRAPHWISE_API_KEY");
    cmd.env_remove("OPENROUTER_API_KEY");
    cmd.env_remove("NEO4J_PASSWORD");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    graphwise_cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("register"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_ask_requires_user_and_app() {
    let home = TempDir::new().unwrap();
    graphwise_cmd(&home)
        .args(["ask", "What are the prices?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--user-id"));
}

#[test]
fn test_ask_without_api_key_fails() {
    let home = TempDir::new().unwrap();
    graphwise_cmd(&home)
        .args([
            "ask",
            "What are the prices?",
            "--user-id",
            "u1",
            "--app-id",
            "a1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key"));
}

#[test]
fn test_register_rejects_missing_file() {
    let home = TempDir::new().unwrap();
    graphwise_cmd(&home)
        .args(["register", "/nonexistent/tenant.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read registration file"));
}

#[test]
fn test_register_rejects_malformed_json() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("tenant.json");
    std::fs::write(&path, "{not json").unwrap();

    graphwise_cmd(&home)
        .args(["register", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse registration file"));
}

#[test]
fn test_register_then_show_roundtrip() {
    let home = TempDir::new().unwrap();
    let store_path = home.path().join("tenants.db");
    let tenant_path = home.path().join("tenant.json");
    std::fs::write(
        &tenant_path,
        r#"{
            "id": "demo-app",
            "app_name": "Demo",
            "description": "Product catalog demo",
            "entities_allowed": ["Pricing", "Product"],
            "relations_allowed": ["HAS_PRICING"],
            "relation_rules": {"HAS_PRICING": {"from": "Product", "to": "Pricing"}}
        }"#,
    )
    .unwrap();

    // Point the store at the temp dir first
    graphwise_cmd(&home)
        .args(["config", "set", "store.path", store_path.to_str().unwrap()])
        .assert()
        .success();

    graphwise_cmd(&home)
        .args(["register", tenant_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Inserted successfully"));

    graphwise_cmd(&home)
        .args(["show", "demo-app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HAS_PRICING"));

    graphwise_cmd(&home)
        .arg("tenants")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo-app"));
}

#[test]
fn test_ingest_rejects_empty_statement_list() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("ingest.json");
    std::fs::write(&path, "[]").unwrap();

    graphwise_cmd(&home)
        .args([
            "ingest",
            path.to_str().unwrap(),
            "--user-id",
            "u1",
            "--app-id",
            "a1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no statements"));
}

#[test]
fn test_ingest_without_neo4j_password_fails() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("ingest.json");
    std::fs::write(&path, r#"["MERGE (p:Product {name: 'basic'})"]"#).unwrap();

    graphwise_cmd(&home)
        .args([
            "ingest",
            path.to_str().unwrap(),
            "--user-id",
            "u1",
            "--app-id",
            "a1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NEO4J_PASSWORD"));
}

#[test]
fn test_config_list_and_get() {
    let home = TempDir::new().unwrap();
    graphwise_cmd(&home)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("llm.model"))
        .stdout(predicate::str::contains("graph.uri"));

    graphwise_cmd(&home)
        .args(["config", "get", "pipeline.stage_timeout_secs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("60"));
}

#[test]
fn test_config_rejects_api_key_storage() {
    let home = TempDir::new().unwrap();
    graphwise_cmd(&home)
        .args(["config", "set", "llm.api_key", "sk-secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("environment variable"));
}
