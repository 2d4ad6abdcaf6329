// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch through the registry to the built-in tools.

use parley_config::model::SearchConfig;
use parley_skill::{ToolRegistry, register_builtins};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn registry_with_search(server: &MockServer) -> ToolRegistry {
    let search = SearchConfig {
        api_key: Some("bing-key".into()),
        endpoint: server.uri(),
        ..SearchConfig::default()
    };
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, &search).unwrap();
    registry
}

#[tokio::test]
async fn web_search_through_registry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webPages": {"value": [{"name": "A", "url": "https://a.test/", "snippet": "a"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = registry_with_search(&server).await;
    let output = registry
        .execute("web_search", json!({"query": "a"}))
        .await;
    assert_eq!(output["results"][0]["url"], "https://a.test/");
}

#[tokio::test]
async fn invalid_freshness_never_reaches_the_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let registry = registry_with_search(&server).await;
    let output = registry
        .execute("web_search", json!({"query": "a", "freshness": "Century"}))
        .await;
    assert!(
        output["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid arguments for web_search:")
    );
}

#[tokio::test]
async fn definitions_cover_builtins() {
    let server = MockServer::start().await;
    let registry = registry_with_search(&server).await;
    let names: Vec<String> = registry
        .definitions()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["open_url", "web_search"]);
}
