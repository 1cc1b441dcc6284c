#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use std::fs;
use std::sync::Arc;

use indicatif::ProgressBar;
use serde_json::{Value, json};
use table_rag::config::{ApiFlavor, Config};
use table_rag::llm::OpenAiClient;
use table_rag::session::{ChatSession, KnowledgeBase, SubmitOutcome, load_knowledge_base};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const EMBEDDINGS: &str = "/openai/deployments/text-embedding-3-small/embeddings";
const COMPLETIONS: &str = "/openai/deployments/RPA-Test-Nano/chat/completions";
const KEYWORDS: [&str; 4] = ["grill", "fry", "alice", "bob"];

/// Embeds the request's `input` as keyword counts plus a bias dimension
struct KeywordEmbeddings;

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("embedding request is JSON");
        let input = body["input"]
            .as_str()
            .expect("input is a string")
            .to_lowercase();

        let mut embedding: Vec<f32> = KEYWORDS
            .iter()
            .map(|keyword| input.matches(keyword).count() as f32)
            .collect();
        embedding.push(0.1);

        ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{ "object": "embedding", "index": 0, "embedding": embedding }]
        }))
    }
}

/// Replies with the first record of the context block
struct FirstRecordChat;

impl Respond for FirstRecordChat {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("chat request is JSON");
        assert_eq!(body["temperature"], json!(0.0));
        assert_eq!(body["messages"][0]["role"], "system");

        let user = body["messages"][1]["content"]
            .as_str()
            .expect("user content is a string");
        let first_record = user.lines().nth(1).unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": format!("According to the data, {}", first_record) },
                "finish_reason": "stop"
            }]
        }))
    }
}

fn kitchen_config(dir: &TempDir, endpoint: &str) -> Config {
    let dataset = dir.path().join("process info ai.csv");
    fs::write(&dataset, "Step,Owner\nGrill,Alice\nFry,Bob\n").expect("write dataset");

    let mut config = Config::default();
    config.service.flavor = ApiFlavor::Azure;
    config.service.endpoint = endpoint.to_string();
    config.service.api_version = "2024-06-01".to_string();
    config.dataset.path = dataset;
    config.retrieval.top_k = 1;
    config
}

fn client_for(config: &Config) -> OpenAiClient {
    OpenAiClient::new(config)
        .expect("client builds")
        .with_api_key(Some("test-key".to_string()))
}

#[tokio::test(flavor = "multi_thread")]
async fn grill_question_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS))
        .and(query_param("api-version", "2024-06-01"))
        .and(header("api-key", "test-key"))
        .respond_with(KeywordEmbeddings)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(FirstRecordChat)
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let config = kitchen_config(&dir, &server.uri());

    let (outcome, history_len) = tokio::task::spawn_blocking(move || {
        let client = client_for(&config);
        let knowledge = KnowledgeBase::new();
        let state =
            knowledge.get_or_load(|| load_knowledge_base(&config, &client, ProgressBar::hidden()));
        assert!(state.is_loaded());
        assert_eq!(state.records(), 2);

        let mut session = ChatSession::new(state, &client, &client, config.retrieval.top_k);
        let outcome = session.submit("Who owns Grill?");
        (outcome, session.history().len())
    })
    .await
    .expect("task finishes");

    assert_eq!(
        outcome,
        SubmitOutcome::Answered("According to the data, Step: Grill | Owner: Alice".to_string())
    );
    assert_eq!(history_len, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_indexing_reports_not_loaded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "internal failure" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(FirstRecordChat)
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let config = kitchen_config(&dir, &server.uri());

    let (first, second, failure) = tokio::task::spawn_blocking(move || {
        let client = client_for(&config);
        let knowledge = KnowledgeBase::new();
        let state =
            knowledge.get_or_load(|| load_knowledge_base(&config, &client, ProgressBar::hidden()));
        let again = knowledge.get_or_load(|| panic!("knowledge base is memoized"));
        assert!(Arc::ptr_eq(&state, &again));

        let failure = state.failure().map(str::to_string);
        let mut session = ChatSession::new(state, &client, &client, 1);
        (
            session.submit("Who owns Grill?"),
            session.submit("Who fries?"),
            failure,
        )
    })
    .await
    .expect("task finishes");

    assert!(matches!(first, SubmitOutcome::NotLoaded(_)));
    assert!(matches!(second, SubmitOutcome::NotLoaded(_)));
    assert!(failure.is_some_and(|reason| reason.contains("internal failure")));
}

#[tokio::test(flavor = "multi_thread")]
async fn query_failure_apologises_without_generation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS))
        .respond_with(KeywordEmbeddings)
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit exceeded" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(FirstRecordChat)
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let config = kitchen_config(&dir, &server.uri());

    let (outcome, history) = tokio::task::spawn_blocking(move || {
        let client = client_for(&config);
        let state = Arc::new(load_knowledge_base(&config, &client, ProgressBar::hidden()));
        assert!(state.is_loaded());

        let mut session = ChatSession::new(state, &client, &client, 1);
        let outcome = session.submit("Who owns Grill?");
        let history: Vec<String> = session
            .history()
            .iter()
            .map(|turn| turn.message.clone())
            .collect();
        (outcome, history)
    })
    .await
    .expect("task finishes");

    let SubmitOutcome::Failed(apology) = outcome else {
        panic!("expected an apology, got {:?}", outcome);
    };
    assert!(apology.starts_with("I apologize, but I encountered an error:"));
    assert!(apology.contains("Rate limit exceeded"));
    assert_eq!(history, vec!["Who owns Grill?".to_string(), apology]);
}
