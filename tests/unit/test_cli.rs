//! Binary-level tests: arguments, stdout JSON and exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use quizforge::testing::mock_api::MockLlmServer;
use serde_json::{json, Value};
use std::path::Path;

/// A command isolated from any config file or environment on this machine.
#[allow(deprecated)]
fn quizforge(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("quizforge").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("RUST_LOG")
        .env_remove("QUIZFORGE_ENDPOINT")
        .env_remove("QUIZFORGE_MODEL")
        .env_remove("QUIZFORGE_API_KEY")
        .env_remove("QUIZFORGE_TIMEOUT")
        .env_remove("QUIZFORGE_MAX_RETRIES");
    cmd
}

fn write(dir: &Path, name: &str, value: &Value) -> String {
    let path = dir.join(name);
    std::fs::write(&path, value.to_string()).unwrap();
    path.to_string_lossy().to_string()
}

fn record(name: &str, key: &str, status: &str) -> Value {
    json!({"subTopicName": name, "normalizedSubTopicName": key, "status": status})
}

#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    quizforge(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"));
}

#[test]
fn test_normalize_command() {
    let dir = tempfile::tempdir().unwrap();
    quizforge(dir.path())
        .args(["normalize", "Cell Biology", "Álgebra Linear!"])
        .assert()
        .success()
        .stdout("cell_biology\nálgebra_linear\n");

    quizforge(dir.path())
        .args(["normalize", "--fold", "Álgebra Linear"])
        .assert()
        .success()
        .stdout("algebra_linear\n");
}

#[test]
fn test_parse_command_reads_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let output = quizforge(dir.path())
        .args(["parse", "--report"])
        .write_stdin("Here you go:\n```json\n{\"topics\": [\"a\"]}\n```\nAnything else?")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["value"]["topics"][0], "a");
    assert_eq!(report["method"], "FencedJson");
    assert_eq!(report["stage"], "Primary");
}

#[test]
fn test_parse_empty_input_exits_with_payload_code() {
    let dir = tempfile::tempdir().unwrap();
    quizforge(dir.path())
        .arg("parse")
        .write_stdin("   \n")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn test_dedupe_command() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "topics.json",
        &json!(["Cell Biology", "cell biology", "Genetics"]),
    );
    let output = quizforge(dir.path()).args(["dedupe", &input]).output().unwrap();
    assert!(output.status.success());

    let topics: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let keys: Vec<&str> = topics
        .iter()
        .map(|t| t["normalizedName"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["cell_biology", "genetics"]);
}

#[test]
fn test_plan_command_is_reproducible_with_seed() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "records.json",
        &json!([
            record("A", "a", "failed"),
            record("B", "b", "failed"),
            record("C", "c", "medium"),
            record("D", "d", "mastered"),
        ]),
    );

    let run = || {
        let output = quizforge(dir.path())
            .args(["plan", &input, "--total", "10", "--seed", "42"])
            .output()
            .unwrap();
        assert!(output.status.success());
        serde_json::from_slice::<Value>(&output.stdout).unwrap()
    };
    let first = run();
    assert_eq!(first, run());
    assert_eq!(first["totalQuestions"], 10);

    let sum: u64 = ["failed", "medium", "pending", "mastered"]
        .iter()
        .flat_map(|bucket| first[*bucket].as_array().cloned().unwrap_or_default())
        .map(|a| a["questionCount"].as_u64().unwrap())
        .sum();
    assert_eq!(sum, 10);
}

#[test]
fn test_plan_without_topics_exits_with_distribution_code() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "empty.json", &json!({}));
    quizforge(dir.path())
        .args(["plan", &input, "-n", "5"])
        .assert()
        .code(5);
}

#[test]
fn test_analyze_command_updates_topics() {
    let dir = tempfile::tempdir().unwrap();
    let question = |id: &str, topic: &str| {
        json!({
            "id": id,
            "questionText": "?",
            "options": ["x", "y"],
            "correctAnswer": "x",
            "subTopicName": topic,
            "difficulty": "easy"
        })
    };
    let questions = write(
        dir.path(),
        "quiz.json",
        &json!({"questions": [
            question("q1", "Optics"),
            question("q2", "Optics"),
            question("q3", "Waves"),
        ]}),
    );
    let answers = write(dir.path(), "answers.json", &json!({"q1": "x", "q2": "x", "q3": "y"}));
    let topics = write(
        dir.path(),
        "topics.json",
        &json!([record("Optics", "optics", "pending"), record("Waves", "waves", "mastered")]),
    );

    let output = quizforge(dir.path())
        .args(["analyze", &questions, &answers, "--topics", &topics])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    let overall = result["analysis"]["overallScore"].as_f64().unwrap();
    assert!((overall - 200.0 / 3.0).abs() < 1e-9);
    assert_eq!(result["changed"], 2);
    assert_eq!(result["topics"][0]["status"], "mastered");
    assert_eq!(result["topics"][1]["status"], "failed");
}

#[test]
fn test_analyze_ignores_hand_set_topic_keys() {
    let dir = tempfile::tempdir().unwrap();
    let questions = write(
        dir.path(),
        "quiz.json",
        &json!([
            {"id": "q1", "questionText": "?", "options": ["x", "y"], "correctAnswer": "x",
             "subTopicName": "Cell Biology", "normalizedSubTopicName": "stale_one"},
            {"id": "q2", "questionText": "?", "options": ["x", "y"], "correctAnswer": "x",
             "subTopicName": "cell biology", "normalizedSubTopicName": "stale_two"}
        ]),
    );
    let answers = write(dir.path(), "answers.json", &json!({"q1": "x", "q2": "y"}));

    let output = quizforge(dir.path())
        .args(["analyze", &questions, &answers])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    let by_topic = result["analysis"]["performanceBySubTopic"].as_object().unwrap();
    assert_eq!(by_topic.len(), 1);
    assert_eq!(by_topic["cell_biology"]["questionCount"], 2);
    assert_eq!(by_topic["cell_biology"]["correctCount"], 1);
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[dedup]\nsimilarity_threshold = 3.0\n").unwrap();
    quizforge(dir.path())
        .args(["--config", config.to_str().unwrap(), "normalize", "x"])
        .assert()
        .code(2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_generate_against_mock_provider() {
    let quiz = json!([{
        "questionText": "What bends light?",
        "options": ["Lens", "Wire"],
        "correctAnswer": "Lens",
        "subTopic": "Optics"
    }]);
    let server = MockLlmServer::builder()
        .with_error(503, "warming up")
        .with_response(format!("```json\n{}\n```", quiz))
        .build()
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("quizforge.toml"),
        "[retry]\nmin_delay_ms = 1\nmax_delay_ms = 5\n",
    )
    .unwrap();
    let input = write(dir.path(), "topics.json", &json!([record("Optics", "optics", "failed")]));

    let mut cmd = quizforge(dir.path());
    cmd.env("QUIZFORGE_ENDPOINT", server.url())
        .args(["generate", &input, "--total", "1"]);
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let composed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(composed["questions"][0]["id"], "q1");
    assert_eq!(composed["questions"][0]["normalizedSubTopicName"], "optics");
    assert_eq!(composed["plan"]["failed"][0]["questionCount"], 1);
    assert_eq!(server.request_bodies().await.len(), 2);
    server.stop().await;
}
