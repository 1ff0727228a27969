//! End-to-end pipeline tests
//!
//! The model, tracker and source host all live on one wiremock server; the
//! coordinator runs against the real HTTP adapters.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docket::config::DescriptionFormat;
use docket::extract::HierarchyExtractor;
use docket::llm::OpenAIClient;
use docket::pipeline::{
    AbortReason, EntryStatus, FailureReason, PipelineCoordinator, PipelineOutcome, PipelineSettings, RunState,
};
use docket::planning::OperationKind;
use docket::prompts::PromptLoader;
use docket::provision::TicketPolicy;
use docket::scm::GitHubClient;
use docket::tracker::JiraClient;

const TIMEOUT: Duration = Duration::from_secs(5);
const DOCUMENT: &str = "Project notes\r\n\r\nWe need a login flow with a form and a reports page.\r\n";

fn settings() -> PipelineSettings {
    PipelineSettings {
        ticket_policy: TicketPolicy {
            project_key: "PROJ".to_string(),
            issue_types: vec!["Epic".to_string(), "Task".to_string()],
            fallback_issue_type: "Task".to_string(),
            root_description: "Created by docket from project documentation".to_string(),
        },
        base_branch: "main".to_string(),
        branch_concurrency: 2,
    }
}

async fn mount_model_reply(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 100, "completion_tokens": 20 }
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_issue_types(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issuetype"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "Epic" },
            { "name": "Task" }
        ])))
        .mount(server)
        .await;
}

async fn mount_created_issue(server: &MockServer, fields: serde_json::Value, key: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue"))
        .and(body_partial_json(json!({ "fields": fields })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "key": key })))
        .expect(times)
        .mount(server)
        .await;
}

fn coordinator(server: &MockServer) -> PipelineCoordinator {
    let llm = OpenAIClient::new(server.uri(), "llama-3.3-70b-versatile", "test-key", 1024, TIMEOUT).unwrap();
    let extractor = HierarchyExtractor::new(Arc::new(llm), PromptLoader::embedded_only(), 1024, 0.3);
    let tracker = JiraClient::new(server.uri(), "me@example.com", "tok", DescriptionFormat::Adf, TIMEOUT).unwrap();

    PipelineCoordinator::new(extractor, settings()).with_tracker(Arc::new(tracker))
}

#[tokio::test]
async fn test_full_run_creates_linked_tickets_and_branches() {
    let server = MockServer::start().await;
    mount_model_reply(
        &server,
        "Sure! Here is the plan:\n```json\n{\"Login Flow\": [\"Add Form\", \"Wire API\"]}\n```",
    )
    .await;
    mount_issue_types(&server).await;
    mount_created_issue(
        &server,
        json!({ "summary": "Login Flow", "issuetype": { "name": "Epic" } }),
        "PROJ-1",
        1,
    )
    .await;
    mount_created_issue(
        &server,
        json!({ "summary": "Add Form", "issuetype": { "name": "Task" }, "parent": { "key": "PROJ-1" } }),
        "PROJ-2",
        1,
    )
    .await;
    mount_created_issue(
        &server,
        json!({ "summary": "Wire API", "parent": { "key": "PROJ-1" } }),
        "PROJ-3",
        1,
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/branches/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "commit": { "sha": "abc123" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/git/refs"))
        .and(body_partial_json(json!({ "sha": "abc123" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(3)
        .mount(&server)
        .await;

    let host = GitHubClient::new(server.uri(), "acme/widgets", "gh-token", TIMEOUT).unwrap();
    let coordinator = coordinator(&server).with_source_host(Arc::new(host));

    let report = match coordinator.run(DOCUMENT).await {
        PipelineOutcome::Completed(report) => report,
        PipelineOutcome::Aborted(report) => panic!("run aborted: {}", report.reason),
    };

    let summary = report.ledger.summary();
    assert_eq!(summary.created, 6);
    assert_eq!(summary.failed, 0);
    assert!(report.ledger.warnings().is_empty());

    let root = report.tree.roots()[0];
    assert_eq!(report.tree.node(root).unwrap().external_ref(), Some("PROJ-1"));
    let branch = report.ledger.get(root, OperationKind::Branch).unwrap();
    assert_eq!(branch.external_ref.as_deref(), Some("refs/heads/login-flow"));
}

#[tokio::test]
async fn test_forbidden_root_skips_children() {
    let server = MockServer::start().await;
    mount_model_reply(&server, "{\"Main Task 1\": [\"Sub A\", \"Sub B\"]}").await;
    mount_issue_types(&server).await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue"))
        .and(body_partial_json(json!({ "fields": { "summary": "Main Task 1" } })))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .expect(1)
        .mount(&server)
        .await;
    mount_created_issue(&server, json!({ "summary": "Sub A" }), "PROJ-2", 0).await;
    mount_created_issue(&server, json!({ "summary": "Sub B" }), "PROJ-3", 0).await;

    let report = match coordinator(&server).run(DOCUMENT).await {
        PipelineOutcome::Completed(report) => report,
        PipelineOutcome::Aborted(report) => panic!("run aborted: {}", report.reason),
    };

    let root = report.tree.roots()[0];
    assert_eq!(report.ledger.status(root, OperationKind::Ticket), Some(EntryStatus::Failed));
    let skipped: Vec<_> = report
        .ledger
        .entries_of(OperationKind::Ticket)
        .filter(|e| e.node != root)
        .collect();
    assert_eq!(skipped.len(), 2);
    for entry in skipped {
        assert_eq!(entry.failure, Some(FailureReason::ParentFailed { parent: root }));
    }
    // No branch operations without a source host
    assert_eq!(report.ledger.entries_of(OperationKind::Branch).count(), 0);
}

#[tokio::test]
async fn test_unparseable_reply_aborts_before_tracker() {
    let server = MockServer::start().await;
    mount_model_reply(&server, "I'm sorry, I cannot help with that.").await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issuetype"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let report = match coordinator(&server).run(DOCUMENT).await {
        PipelineOutcome::Aborted(report) => report,
        PipelineOutcome::Completed(_) => panic!("run completed"),
    };

    assert!(matches!(report.reason, AbortReason::Parse(_)));
    assert_eq!(report.last_state, RunState::Parsing);
    assert_eq!(report.raw_response.as_deref(), Some("I'm sorry, I cannot help with that."));
    assert!(report.ledger.is_empty());
}
