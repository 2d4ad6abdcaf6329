// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handler tests against a mock Bot API server.
//!
//! The teloxide client is pointed at wiremock, so every `sendMessage` the
//! handlers make can be inspected.

use std::sync::Arc;
use std::time::Duration;

use parley_agent::{
    ChatService, CompletionService, FallbackPolicy, Lifecycle, MessageQueue, RateLimitTracker,
    RateLimiter, SearchService, ToolLoop,
};
use parley_config::model::{
    ProviderConfig, QueueConfig, RateLimitConfig, SearchConfig, UpgradeConfig,
};
use parley_context::{ContextEngine, ContextTruncator, SystemPrompt};
use parley_core::{StorageAdapter, TokenEstimator};
use parley_skill::ToolRegistry;
use parley_telegram::dispatch::{BotIdentity, BotServices, handle_message, process};
use parley_telegram::{AccessFilter, Command, Route, Upgrader};
use parley_test_utils::{MockProvider, memory_storage};
use serde_json::{Value, json};
use teloxide::Bot;
use teloxide::types::Message;
use wiremock::matchers::{body_partial_json, method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUDO: u64 = 1;
const USER: u64 = 7;

fn sent_message() -> Value {
    json!({
        "ok": true,
        "result": {
            "message_id": 100,
            "date": 1700000000i64,
            "chat": {"id": 7i64, "type": "private", "first_name": "Test"},
            "from": {"id": 4242u64, "is_bot": true, "first_name": "Parley", "username": "parley_bot"},
            "text": "ok",
        }
    })
}

async fn telegram() -> (MockServer, Bot) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"(?i)/bot[^/]+/sendchataction$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
        .mount(&server)
        .await;
    let url: reqwest::Url = server.uri().parse().unwrap();
    let bot = Bot::new("4242:TEST").set_api_url(url);
    (server, bot)
}

async fn accept_messages(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"(?i)/bot[^/]+/sendmessage$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sent_message()))
        .mount(server)
        .await;
}

/// Bodies of every sendMessage call so far.
async fn sent_texts(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path().to_lowercase().ends_with("/sendmessage"))
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

fn private_message(user_id: u64, text: &str) -> Message {
    serde_json::from_value(json!({
        "message_id": 1,
        "date": 1700000000i64,
        "chat": {"id": user_id as i64, "type": "private", "first_name": "Test"},
        "from": {"id": user_id, "is_bot": false, "first_name": "Test", "language_code": "en"},
        "text": text,
    }))
    .unwrap()
}

struct Setup {
    services: Arc<BotServices>,
    storage: Arc<dyn StorageAdapter>,
}

async fn setup(provider: Arc<MockProvider>, rate_limit: RateLimitConfig) -> Setup {
    let storage: Arc<dyn StorageAdapter> = memory_storage().await.unwrap();
    let truncator = ContextTruncator::new(Arc::new(TokenEstimator::new()), 4000);
    let tracker = Arc::new(RateLimitTracker::new());
    let provider_config = ProviderConfig::default();

    let tool_loop = ToolLoop::new(
        provider.clone(),
        Arc::new(ToolRegistry::new()),
        Arc::new(truncator.clone()),
        8,
    );
    let completion = CompletionService::new(
        tool_loop,
        tracker.clone(),
        FallbackPolicy::from_config(&provider_config),
    );
    let context =
        ContextEngine::from_parts(SystemPrompt::new("You are a test bot."), truncator, 30);
    let chat = ChatService::new(storage.clone(), context, completion, Some(4242));
    let search = SearchService::new(
        provider,
        tracker,
        None,
        SystemPrompt::new("You are a test bot."),
        SearchConfig::default(),
        &provider_config,
    );

    let services = BotServices {
        chat: Arc::new(chat),
        search: Arc::new(search),
        queue: Arc::new(MessageQueue::new(QueueConfig::default())),
        limiter: Arc::new(RateLimiter::new(&rate_limit, [SUDO as i64])),
        storage: storage.clone(),
        access: AccessFilter::new([SUDO as i64], storage.clone()),
        upgrader: Upgrader::new(UpgradeConfig::default()),
        lifecycle: Lifecycle::default(),
    };
    Setup {
        services: Arc::new(services),
        storage,
    }
}

fn identity() -> Arc<BotIdentity> {
    Arc::new(BotIdentity {
        id: 4242,
        username: "parley_bot".into(),
    })
}

/// Waits until `count` messages were sent or a second passes.
async fn wait_for_messages(server: &MockServer, count: usize) -> Vec<Value> {
    for _ in 0..100 {
        let sent = sent_texts(server).await;
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sent_texts(server).await
}

#[tokio::test]
async fn chat_turn_replies_with_html() {
    let (server, bot) = telegram().await;
    accept_messages(&server).await;
    let provider = Arc::new(MockProvider::with_replies(["**Hi** there"]));
    let s = setup(provider, RateLimitConfig::default()).await;

    let route = Route::Chat {
        text: "hello".into(),
        clear_history: false,
    };
    process(bot, private_message(USER, "hello"), route, s.services)
        .await
        .unwrap();

    let sent = sent_texts(&server).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["text"], "[✨ gpt-4.1] <b>Hi</b> there");
    assert_eq!(sent[0]["parse_mode"], "HTML");
    assert_eq!(sent[0]["chat_id"], 7);

    let history = s.storage.conversation_history(7, 7, 10).await.unwrap();
    assert_eq!(history[0].bot_response, "**Hi** there");
}

#[tokio::test]
async fn rejected_html_falls_back_to_plain_text() {
    let (server, bot) = telegram().await;
    Mock::given(method("POST"))
        .and(path_regex(r"(?i)/bot[^/]+/sendmessage$"))
        .and(body_partial_json(json!({"parse_mode": "HTML"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: can't parse entities",
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    accept_messages(&server).await;
    let provider = Arc::new(MockProvider::with_replies(["plain <words>"]));
    let s = setup(provider, RateLimitConfig::default()).await;

    let route = Route::Chat {
        text: "hello".into(),
        clear_history: false,
    };
    process(bot, private_message(USER, "hello"), route, s.services)
        .await
        .unwrap();

    let sent = sent_texts(&server).await;
    assert_eq!(sent.len(), 2);
    assert!(sent[1].get("parse_mode").is_none());
    assert_eq!(sent[1]["text"], "[✨ gpt-4.1] plain <words>");
}

#[tokio::test]
async fn privileged_commands_need_sudo() {
    let (server, bot) = telegram().await;
    accept_messages(&server).await;
    let s = setup(Arc::new(MockProvider::new()), RateLimitConfig::default()).await;

    process(
        bot.clone(),
        private_message(USER, "/allow 55"),
        Route::Command(Command::Allow("55".into())),
        s.services.clone(),
    )
    .await
    .unwrap();
    assert!(sent_texts(&server).await.is_empty());
    assert!(s.storage.get_whitelisted(55).await.unwrap().is_none());

    process(
        bot,
        private_message(SUDO, "/allow 55"),
        Route::Command(Command::Allow("55".into())),
        s.services,
    )
    .await
    .unwrap();
    let sent = sent_texts(&server).await;
    assert_eq!(sent[0]["text"], "Chat ID 55 has been allowed to use the bot.");
    assert!(s.storage.get_whitelisted(55).await.unwrap().is_some());
}

#[tokio::test]
async fn reset_clears_only_this_chat() {
    let (server, bot) = telegram().await;
    accept_messages(&server).await;
    let s = setup(Arc::new(MockProvider::new()), RateLimitConfig::default()).await;
    s.storage.save_conversation(7, 7, "q", "a").await.unwrap();
    s.storage.save_conversation(7, -100, "q", "a").await.unwrap();

    process(
        bot,
        private_message(USER, "/reset"),
        Route::Command(Command::Reset),
        s.services,
    )
    .await
    .unwrap();

    assert_eq!(sent_texts(&server).await[0]["text"], "History cleared.");
    assert!(s.storage.conversation_history(7, 7, 10).await.unwrap().is_empty());
    assert_eq!(s.storage.conversation_history(7, -100, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn search_without_backend_reports_error() {
    let (server, bot) = telegram().await;
    accept_messages(&server).await;
    let s = setup(Arc::new(MockProvider::new()), RateLimitConfig::default()).await;

    process(
        bot,
        private_message(USER, "/search rust"),
        Route::Command(Command::Search("rust".into())),
        s.services,
    )
    .await
    .unwrap();

    let sent = sent_texts(&server).await;
    assert_eq!(sent[0]["text"], "Search error: web search is not configured");
}

#[tokio::test]
async fn non_whitelisted_users_are_ignored() {
    let (server, bot) = telegram().await;
    accept_messages(&server).await;
    let provider = Arc::new(MockProvider::new());
    let s = setup(provider.clone(), RateLimitConfig::default()).await;

    handle_message(bot, private_message(USER, "hello"), s.services, identity())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sent_texts(&server).await.is_empty());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn queued_turn_is_answered() {
    let (server, bot) = telegram().await;
    accept_messages(&server).await;
    let provider = Arc::new(MockProvider::with_replies(["queued answer"]));
    let s = setup(provider, RateLimitConfig::default()).await;
    s.storage.add_whitelisted(USER as i64).await.unwrap();

    handle_message(bot, private_message(USER, "hello"), s.services.clone(), identity())
        .await
        .unwrap();

    let sent = wait_for_messages(&server, 1).await;
    assert_eq!(sent[0]["text"], "[✨ gpt-4.1] queued answer");
    s.services.queue.shutdown().await;
}

#[tokio::test]
async fn private_chat_gets_rate_limit_notice() {
    let (server, bot) = telegram().await;
    accept_messages(&server).await;
    let provider = Arc::new(MockProvider::with_replies(["first"]));
    let rate_limit = RateLimitConfig {
        user_limit: 1,
        ..RateLimitConfig::default()
    };
    let s = setup(provider.clone(), rate_limit).await;
    s.storage.add_whitelisted(USER as i64).await.unwrap();

    for _ in 0..2 {
        handle_message(
            bot.clone(),
            private_message(USER, "hello"),
            s.services.clone(),
            identity(),
        )
        .await
        .unwrap();
    }

    let sent = wait_for_messages(&server, 2).await;
    let texts: Vec<_> = sent.iter().map(|b| b["text"].as_str().unwrap()).collect();
    assert!(
        texts
            .iter()
            .any(|t| t.starts_with("⚠️ You are sending commands too quickly!")),
        "no notice in {texts:?}"
    );
    assert_eq!(provider.call_count(), 1);
    s.services.queue.shutdown().await;
}
