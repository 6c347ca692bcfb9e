//! Remote runner against a mock Judge0 service

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use judgebox::config::{Config, LanguageId, RemoteConfig};
use judgebox::judge::Judge;
use judgebox::sandbox::{RemoteRunner, Runner, SandboxError};
use judgebox::types::{
    ErrorKind, ExecutionRequest, KilledReason, Phase, ResourceLimits, TestCase, Verdict,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "d85cd024-1548-4165-96c7-7bc88673f194";

fn b64(s: &str) -> String {
    BASE64.encode(s)
}

fn fast_config(url: &str) -> RemoteConfig {
    let mut config = RemoteConfig::new(url);
    config.poll_base_ms = 5;
    config.poll_cap_ms = 10;
    config
}

fn request(code: &str, stdin: &str) -> ExecutionRequest {
    let config = Config::default();
    let profile = config.profile(LanguageId::Python).unwrap();
    let limits = ResourceLimits::new()
        .with_time_limit(2.0)
        .with_memory_limit(64);
    ExecutionRequest::new(code, profile, stdin, &limits).unwrap()
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/submissions"))
        .and(query_param("base64_encoded", "true"))
        .and(query_param("wait", "false"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": TOKEN })))
        .mount(server)
        .await;
}

async fn mount_result(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/submissions/{TOKEN}")))
        .and(query_param("base64_encoded", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn status(id: u32, description: &str) -> Value {
    json!({ "id": id, "description": description })
}

#[tokio::test]
async fn test_accepted_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submissions"))
        .and(body_partial_json(json!({
            "language_id": 71,
            "source_code": b64("print(sum(map(int, input().split())))"),
            "stdin": b64("1 2\n"),
            "memory_limit": 65536,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": TOKEN })))
        .expect(1)
        .mount(&server)
        .await;
    mount_result(
        &server,
        json!({ "status": status(3, "Accepted"), "stdout": b64("3\n") }),
    )
    .await;

    let runner = RemoteRunner::new(fast_config(&server.uri())).unwrap();
    let outcome = runner
        .execute(&request("print(sum(map(int, input().split())))", "1 2\n"))
        .await
        .unwrap();

    assert_eq!(outcome.stdout, "3\n");
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.killed_reason, KilledReason::None);
}

#[tokio::test]
async fn test_polls_until_finished() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    // Mocks are matched in mount order; the pending ones expire first
    Mock::given(method("GET"))
        .and(path(format!("/submissions/{TOKEN}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": status(1, "In Queue") })),
        )
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_result(
        &server,
        json!({ "status": status(3, "Accepted"), "stdout": b64("ok") }),
    )
    .await;

    let runner = RemoteRunner::new(fast_config(&server.uri())).unwrap();
    let outcome = runner.execute(&request("print('ok')", "")).await.unwrap();
    assert_eq!(outcome.stdout, "ok");
}

#[tokio::test]
async fn test_gives_up_after_max_polls() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_result(&server, json!({ "status": status(2, "Processing") })).await;

    let mut config = fast_config(&server.uri());
    config.max_polls = 3;
    let runner = RemoteRunner::new(config).unwrap();

    let err = runner.execute(&request("x", "")).await.unwrap_err();
    assert!(matches!(err, SandboxError::RemoteTimeout(3)));
    assert_eq!(err.to_string(), "submission timeout after 3 polls");
}

#[tokio::test]
async fn test_http_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submissions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("queue is full"))
        .mount(&server)
        .await;

    let runner = RemoteRunner::new(fast_config(&server.uri())).unwrap();
    let err = runner.execute(&request("x", "")).await.unwrap_err();
    match err {
        SandboxError::Remote(message) => {
            assert_eq!(message, "failed to create submission: 500 - queue is full");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_status_translation() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_result(
        &server,
        json!({
            "status": status(5, "Time Limit Exceeded"),
            "stdout": b64("partial"),
        }),
    )
    .await;

    let runner = RemoteRunner::new(fast_config(&server.uri())).unwrap();
    let outcome = runner.execute(&request("x", "")).await.unwrap();
    assert_eq!(outcome.killed_reason, KilledReason::Timeout);
    assert_eq!(outcome.exit_code, 124);
    assert_eq!(outcome.stdout, "partial");
}

#[tokio::test]
async fn test_compile_error_through_judge() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_result(
        &server,
        json!({
            "status": status(6, "Compilation Error"),
            "compile_output": b64("main.c:3:5: error: expected ';' before 'return'\n"),
        }),
    )
    .await;

    let runner = RemoteRunner::new(fast_config(&server.uri())).unwrap();
    let judge = Judge::new(runner, &Config::default());
    let cases = vec![TestCase::new("", "1"), TestCase::new("", "2")];
    let result = judge
        .judge("int main() { return 0 }", LanguageId::C, &cases, None)
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::CompileError);
    assert_eq!(result.test_results.len(), 1);
    let error = result.test_results[0].error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::CompileError);
    assert_eq!(error.line, Some(3));
}

#[tokio::test]
async fn test_runtime_error_through_judge() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    let traceback = "Traceback (most recent call last):\n  \
                     File \"/box/script.py\", line 2, in <module>\n    \
                     print(1 / 0)\n\
                     ZeroDivisionError: division by zero\n";
    mount_result(
        &server,
        json!({
            "status": status(11, "Runtime Error (NZEC)"),
            "stderr": b64(traceback),
            "exit_code": 1,
        }),
    )
    .await;

    let runner = RemoteRunner::new(fast_config(&server.uri())).unwrap();
    let judge = Judge::new(runner, &Config::default());
    let single = judge
        .run_one("x = 1\nprint(1 / 0)\n", LanguageId::Python, &TestCase::new("", ""), None)
        .await
        .unwrap();

    assert_eq!(single.verdict, Verdict::RuntimeError);
    let error = single.result.error.unwrap();
    assert_eq!(error.line, Some(2));
    assert!(error.message.contains("ZeroDivisionError"));
}

#[tokio::test]
async fn test_bearer_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submissions"))
        .and(header("authorization", "Bearer secret-key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": TOKEN })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/submissions/{TOKEN}")))
        .and(header("authorization", "Bearer secret-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": status(3, "Accepted") })),
        )
        .mount(&server)
        .await;

    let config = fast_config(&server.uri()).with_api_key("secret-key");
    let runner = RemoteRunner::new(config).unwrap();
    let outcome = runner.execute(&request("pass", "")).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.phase, Phase::Run);
}

#[tokio::test]
async fn test_unmapped_language() {
    let mut config = RemoteConfig::new("http://127.0.0.1:9");
    config.language_ids.clear();
    let runner = RemoteRunner::new(config).unwrap();

    let err = runner.execute(&request("x", "")).await.unwrap_err();
    assert!(matches!(err, SandboxError::RemoteLanguage(LanguageId::Python)));
}
