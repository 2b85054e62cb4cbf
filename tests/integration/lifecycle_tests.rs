//! Integration tests for the agent session lifecycle.
//!
//! Drives a served agent through `initialize`, `recipes/list`, `shutdown`, and
//! `exit`, checking the exact results and the final exit code.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cody_agent::agent::{serve_connection, AgentServices, CompletionsFactory, LifecycleState};
use cody_agent::chat::completions::CompletionsClient;
use cody_agent::recipes::RecipeRegistry;
use cody_agent::rpc::message::{codes, Response};
use cody_agent::rpc::{ConnectionEnd, Message, RequestId};
use cody_agent::{AgentConfig, AppError, Result};

use super::test_helpers::{
    services, start_agent, start_agent_with, test_config, FakeCompletions, RawClient,
};

/// Read `count` responses, keyed by id, in whatever order they arrive.
async fn responses(client: &mut RawClient, count: usize) -> HashMap<RequestId, Response> {
    let mut seen = HashMap::new();
    while seen.len() < count {
        match client.recv().await {
            Message::Response(response) => {
                seen.insert(response.id, response);
            }
            other => panic!("expected a response, got {other:?}"),
        }
    }
    seen
}

#[tokio::test]
async fn full_session_exits_cleanly() {
    let mut agent = start_agent("unused");
    let mut client = agent.raw_client();

    assert_eq!(client.handshake().await, json!({"name": "cody-agent"}));

    let listed = client.call("recipes/list", Value::Null).await;
    let expected = serde_json::to_value(RecipeRegistry::builtin().list()).expect("serialise");
    assert_eq!(listed.outcome, Ok(expected));

    client.shutdown_and_exit().await;
    client.expect_closed().await;

    let outcome = agent.outcome().await;
    assert_eq!(outcome.end, ConnectionEnd::Cancelled);
    assert_eq!(outcome.state, LifecycleState::Exited { clean: true });
    assert_eq!(outcome.exit_code, 0);
}

#[tokio::test]
async fn server_name_comes_from_configuration() {
    let config = AgentConfig {
        access_token: "t".into(),
        server_name: "my-agent".into(),
        ..AgentConfig::default()
    };
    let mut agent = start_agent_with(config, services(FakeCompletions::answering(&["x"])));
    let mut client = agent.raw_client();

    assert_eq!(client.handshake().await, json!({"name": "my-agent"}));
}

#[tokio::test]
async fn recipes_list_before_initialize_is_rejected() {
    let mut agent = start_agent("unused");
    let mut client = agent.raw_client();

    let response = client.call("recipes/list", Value::Null).await;

    let err = response.outcome.expect_err("must fail");
    assert_eq!(err.code, Some(codes::SERVER_NOT_INITIALIZED));
}

#[tokio::test]
async fn second_initialize_is_rejected() {
    let mut agent = start_agent("unused");
    let mut client = agent.raw_client();
    client.handshake().await;

    let response = client.call("initialize", json!({"name": "again"})).await;

    let err = response.outcome.expect_err("must fail");
    assert_eq!(err.code, Some(codes::INVALID_REQUEST));
}

#[tokio::test]
async fn requests_after_shutdown_are_rejected() {
    let mut agent = start_agent("unused");
    let mut client = agent.raw_client();
    client.handshake().await;

    let response = client.call("shutdown", Value::Null).await;
    assert_eq!(response.outcome, Ok(Value::Null));

    let response = client.call("recipes/list", Value::Null).await;
    assert_eq!(
        response.outcome.expect_err("must fail").code,
        Some(codes::INVALID_REQUEST)
    );
}

#[tokio::test]
async fn exit_without_shutdown_reports_failure() {
    let mut agent = start_agent("unused");
    let mut client = agent.raw_client();
    client.handshake().await;

    client.notify("exit", Value::Null).await;
    client.expect_closed().await;

    let outcome = agent.outcome().await;
    assert_eq!(outcome.state, LifecycleState::Exited { clean: false });
    assert_eq!(outcome.exit_code, 1);
}

#[tokio::test]
async fn client_hangup_ends_session_uncleanly() {
    let mut agent = start_agent("unused");
    let mut client = agent.raw_client();
    client.handshake().await;
    drop(client);

    let outcome = agent.outcome().await;
    assert_eq!(outcome.end, ConnectionEnd::Closed);
    assert_eq!(outcome.state, LifecycleState::Initialized);
    assert_eq!(outcome.exit_code, 1);
}

#[tokio::test]
async fn unknown_recipe_is_not_found() {
    let mut agent = start_agent("unused");
    let mut client = agent.raw_client();
    client.handshake().await;

    let response = client
        .call(
            "recipes/execute",
            json!({"id": "does-not-exist", "humanChatInput": "hi"}),
        )
        .await;

    let err = response.outcome.expect_err("must fail");
    assert_eq!(err.code, Some(codes::SERVER_ERROR));
    assert!(err.message.contains("does-not-exist"));
}

#[tokio::test]
async fn cancelled_session_stops_serving() {
    let mut agent = start_agent("unused");
    let mut client = agent.raw_client();
    client.handshake().await;

    agent.session.cancel();
    client.expect_closed().await;

    let outcome = agent.outcome().await;
    assert_eq!(outcome.end, ConnectionEnd::Cancelled);
    assert_eq!(outcome.exit_code, 1);
}

// ── Pipelined clients ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn request_sent_right_after_initialize_is_served() {
    for _ in 0..25 {
        let mut agent = start_agent("unused");
        let mut client = agent.raw_client();

        let init = client
            .send_request("initialize", json!({"name": "eager-client"}))
            .await;
        let list = client.send_request("recipes/list", Value::Null).await;
        let mut answers = responses(&mut client, 2).await;

        let init = answers.remove(&init).expect("initialize answered");
        assert_eq!(init.outcome, Ok(json!({"name": "cody-agent"})));
        let list = answers.remove(&list).expect("recipes/list answered");
        assert!(list.outcome.is_ok(), "recipes/list rejected: {:?}", list.outcome);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exit_sent_right_after_shutdown_exits_cleanly() {
    for _ in 0..25 {
        let mut agent = start_agent("unused");
        let mut client = agent.raw_client();
        client.handshake().await;

        let shutdown = client.send_request("shutdown", Value::Null).await;
        client.notify("exit", Value::Null).await;

        assert_eq!(client.recv_response(shutdown).await.outcome, Ok(Value::Null));
        client.expect_closed().await;

        let outcome = agent.outcome().await;
        assert_eq!(outcome.state, LifecycleState::Exited { clean: true });
        assert_eq!(outcome.exit_code, 0);
    }
}

// ── Startup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn broken_completions_backend_fails_before_serving() {
    let factory: CompletionsFactory =
        Arc::new(|_config: &AgentConfig| -> Result<Arc<dyn CompletionsClient>> {
            Err(AppError::Config("invalid custom header".into()))
        });
    let services = AgentServices {
        recipes: RecipeRegistry::builtin(),
        completions: factory,
    };
    let (_client_end, agent_end) = tokio::io::duplex(1024);
    let (reader, writer) = tokio::io::split(agent_end);

    let err = serve_connection(test_config(), services, reader, writer, CancellationToken::new())
        .await
        .expect_err("must fail at startup");

    assert_eq!(err, AppError::Config("invalid custom header".into()));
}
