mod common;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use workflow_worker::config::RuntimeConfig;
use workflow_worker::inference::InferenceClient;
use workflow_worker::schedule::processors::{
    DescribeProcessor, EmbeddingProcessor, PromptProcessor, SummarizeProcessor,
};
use workflow_worker::schedule::types::{Task, TaskResult};
use workflow_worker::schedule::TaskProcessor;
use workflow_worker::utils::data_uri;

#[derive(Clone)]
struct MockOllama {
    reply: Arc<String>,
    status: StatusCode,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn generate(State(mock): State<MockOllama>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let model = body["model"].clone();
    mock.requests.lock().unwrap().push(body);
    (mock.status, Json(json!({"model": model, "response": mock.reply.as_str()})))
}

async fn embeddings(State(mock): State<MockOllama>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let dimensions = body["options"]["dimensions"].as_u64().unwrap_or(8) as usize;
    mock.requests.lock().unwrap().push(body);
    (mock.status, Json(json!({"embedding": vec![0.5f32; dimensions]})))
}

async fn mock_ollama(reply: &str, status: StatusCode) -> (Arc<RuntimeConfig>, InferenceClient, MockOllama) {
    let mock = MockOllama {
        reply: Arc::new(reply.to_string()),
        status,
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/api/generate", post(generate))
        .route("/api/embeddings", post(embeddings))
        .with_state(mock.clone());
    let base = common::serve(app).await;

    let config = RuntimeConfig {
        ollama_base_url: base.clone(),
        ..RuntimeConfig::default()
    };
    (Arc::new(config), InferenceClient::new(base).unwrap(), mock)
}

#[tokio::test]
async fn test_prompt_processor() {
    let (config, inference, mock) = mock_ollama("  Olá, tudo bem?  ", StatusCode::OK).await;
    let processor = PromptProcessor::new(config.clone(), inference);

    let result = processor.process(&Task::new("t1", "prompt", "oi")).await.unwrap();
    let TaskResult::Prompt(prompt) = result else {
        panic!("expected a prompt result");
    };
    assert_eq!(prompt.response, "Olá, tudo bem?");
    assert_eq!(prompt.model, config.conversation_model);
    assert_eq!(prompt.confidence, 0.8);

    let request = &mock.requests.lock().unwrap()[0];
    assert_eq!(request["prompt"], "oi");
    assert_eq!(request["stream"], false);
    assert_eq!(request["options"]["temperature"], 0.7);
    assert!(request.get("images").is_none());
}

#[tokio::test]
async fn test_embedding_processor_dimensions_by_action() {
    let (config, inference, mock) = mock_ollama("", StatusCode::OK).await;
    let processor = EmbeddingProcessor::new(config.clone(), inference);

    let knowledge = processor
        .process(&Task::new("k1", "knowledge", "um dois três"))
        .await
        .unwrap();
    let TaskResult::Embedding(knowledge) = knowledge else {
        panic!("expected an embedding result");
    };
    assert_eq!(knowledge.dimensions, 768);
    assert_eq!(knowledge.embedding.len(), 768);
    assert_eq!(knowledge.model, config.embedding_model);
    assert_eq!(knowledge.tokens, 3);

    let TaskResult::Embedding(plain) = processor
        .process(&Task::new("e1", "embedding", "texto"))
        .await
        .unwrap()
    else {
        panic!("expected an embedding result");
    };
    assert_eq!(plain.dimensions, 1536);

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests[0]["model"], config.embedding_model.as_str());
    assert_eq!(requests[0]["options"]["dimensions"], 768);
    assert_eq!(requests[1]["options"]["dimensions"], 1536);
}

#[tokio::test]
async fn test_describe_processor_sends_image() {
    let reply = "Uma foto de um gato preto sobre uma mesa azul.\nTexto visível: PARE";
    let (config, inference, mock) = mock_ollama(reply, StatusCode::OK).await;
    let processor = DescribeProcessor::new(config.clone(), inference);

    let encoded = data_uri::encode(b"\x89PNG fake image bytes");
    let task = Task::new("d1", "describe", format!("data:image/png;base64,{}", encoded));
    let TaskResult::Describe(description) = processor.process(&task).await.unwrap() else {
        panic!("expected a describe result");
    };

    assert!(description.colors.contains(&"preto".to_string()));
    assert!(description.colors.contains(&"azul".to_string()));
    assert!(description.objects.contains(&"gato".to_string()));
    assert_eq!(description.text.as_deref(), Some("pare"));

    let request = &mock.requests.lock().unwrap()[0];
    assert_eq!(request["model"], config.vision_model.as_str());
    assert_eq!(request["images"], json!([encoded]));
}

#[tokio::test]
async fn test_summarize_processor_parses_structure() {
    let reply = "RESUMO: Ata da reunião de planejamento.\nPONTOS-CHAVE:\n- Orçamento aprovado\n- Prazo em março\nTIPO: ata";
    let (config, inference, mock) = mock_ollama(reply, StatusCode::OK).await;
    let processor = SummarizeProcessor::new(config.clone(), inference);

    let document = format!("data:text/plain;base64,{}", data_uri::encode("Reunião às 10h".as_bytes()));
    let TaskResult::Summarize(summary) = processor
        .process(&Task::new("s1", "summarize", document))
        .await
        .unwrap()
    else {
        panic!("expected a summarize result");
    };

    assert_eq!(summary.summary, "Ata da reunião de planejamento.");
    assert_eq!(summary.key_points, vec!["Orçamento aprovado", "Prazo em março"]);
    assert_eq!(summary.document_type, "ata");

    let request = &mock.requests.lock().unwrap()[0];
    assert_eq!(request["model"], config.summary_model.as_str());
    assert!(request["prompt"].as_str().unwrap().contains("Reunião às 10h"));
}

#[tokio::test]
async fn test_inference_failure_is_processing_error() {
    let (config, inference, _mock) = mock_ollama("overloaded", StatusCode::SERVICE_UNAVAILABLE).await;
    let processor = PromptProcessor::new(config, inference);

    let err = processor.process(&Task::new("t1", "prompt", "oi")).await.unwrap_err();
    assert!(err.to_string().contains("HTTP 503"), "{}", err);
}
