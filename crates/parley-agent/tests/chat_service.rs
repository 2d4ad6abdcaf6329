// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the chat turn pipeline.
//!
//! Each test wires a ChatService over a private in-memory store and a
//! scripted provider. Tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use parley_agent::{
    ChatService, ChatTurn, CompletionService, FallbackPolicy, RateLimitTracker, ToolLoop,
};
use parley_context::{ContextEngine, ContextTruncator, ReplyTarget, SystemPrompt};
use parley_core::{ImageRef, Message, StorageAdapter, TokenEstimator};
use parley_skill::ToolRegistry;
use parley_test_utils::{MockProvider, memory_storage, rate_limited};

struct Fixture {
    service: ChatService,
    provider: Arc<MockProvider>,
    storage: Arc<dyn StorageAdapter>,
}

async fn fixture(history_limit: usize) -> Fixture {
    let provider = Arc::new(MockProvider::new());
    let storage: Arc<dyn StorageAdapter> = memory_storage().await.unwrap();
    let truncator = ContextTruncator::new(Arc::new(TokenEstimator::new()), 16_000);
    let context = ContextEngine::from_parts(
        SystemPrompt::new("You are a test bot."),
        truncator.clone(),
        history_limit,
    );
    let tool_loop = ToolLoop::new(
        provider.clone(),
        Arc::new(ToolRegistry::new()),
        Arc::new(truncator),
        8,
    );
    let completion = CompletionService::new(
        tool_loop,
        Arc::new(RateLimitTracker::new()),
        FallbackPolicy {
            default_model: "gpt-4.1".into(),
            fallback_model: "gpt-4.1-mini".into(),
            default_rate_limit: Duration::from_secs(3600),
        },
    );
    Fixture {
        service: ChatService::new(storage.clone(), context, completion, Some(1000)),
        provider,
        storage,
    }
}

fn turn(text: &str) -> ChatTurn {
    ChatTurn {
        user_id: 7,
        chat_id: 70,
        text: text.to_string(),
        ..ChatTurn::default()
    }
}

// ---- Basic pipeline ----

#[tokio::test]
async fn reply_is_prefixed_and_recorded() {
    let fx = fixture(30).await;
    fx.provider.push_reply("Hello there!");

    let reply = fx.service.respond(turn("Hi")).await.unwrap();
    assert_eq!(reply.text, "[✨ gpt-4.1] Hello there!");
    assert_eq!(reply.model.as_deref(), Some("gpt-4.1"));

    let history = fx.storage.conversation_history(7, 70, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_message, "Hi");
    assert_eq!(history[0].bot_response, "Hello there!");
}

#[tokio::test]
async fn history_is_sent_on_the_next_turn() {
    let fx = fixture(30).await;
    fx.provider.push_reply("first").push_reply("second");

    fx.service.respond(turn("one")).await.unwrap();
    fx.service.respond(turn("two")).await.unwrap();

    let request = &fx.provider.requests()[1];
    let roles: Vec<_> = request.messages.iter().map(Message::role).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    assert_eq!(request.messages[1].text(), "one");
    assert_eq!(request.messages[2].text(), "first");
    assert_eq!(request.messages[3].text(), "two");
}

#[tokio::test]
async fn empty_turn_is_ignored() {
    let fx = fixture(30).await;
    assert!(fx.service.respond(turn("   ")).await.is_none());
    assert!(fx.service.respond(turn("use: mini")).await.is_none());
    assert_eq!(fx.provider.call_count(), 0);
}

// ---- Model selection ----

#[tokio::test]
async fn directive_selects_model_and_output_is_cleaned() {
    let fx = fixture(30).await;
    fx.provider
        .push_reply_for("DeepSeek-R1", "<think>\nhmm\n</think>\nForty-two.");

    let reply = fx
        .service
        .respond(turn("use: r1 what is the answer?"))
        .await
        .unwrap();
    assert_eq!(reply.text, "[✨ DeepSeek-R1] Forty-two.");

    let history = fx.storage.conversation_history(7, 70, 10).await.unwrap();
    assert_eq!(history[0].user_message, "what is the answer?");
    assert_eq!(history[0].bot_response, "Forty-two.");
}

#[tokio::test]
async fn image_turn_swaps_to_vision_model() {
    let fx = fixture(30).await;
    fx.provider.push_reply("A cat.");

    let mut request = turn("use: r1 what is this?");
    request.image = Some(ImageRef::from_base64("image/jpeg", "AAAA"));
    let reply = fx.service.respond(request).await.unwrap();

    assert_eq!(reply.model.as_deref(), Some("gpt-4.1"));
    let sent = &fx.provider.requests()[0];
    match sent.messages.last() {
        Some(Message::User { content }) => assert!(content.has_image()),
        other => panic!("expected user turn with image, got {other:?}"),
    }
}

#[tokio::test]
async fn reply_context_reaches_the_model_but_not_history() {
    let fx = fixture(30).await;
    fx.provider.push_reply("Sure.");

    let mut request = turn("can you expand?");
    request.reply = Some(ReplyTarget {
        content: "Rust has ownership.".into(),
        sender_id: 1000,
        sender_name: "Parley".into(),
    });
    fx.service.respond(request).await.unwrap();

    let sent = fx.provider.requests()[0].messages.last().unwrap().text();
    assert!(sent.contains("Rust has ownership."));
    assert!(sent.contains("can you expand?"));

    let history = fx.storage.conversation_history(7, 70, 10).await.unwrap();
    assert_eq!(history[0].user_message, "can you expand?");
}

// ---- History management ----

#[tokio::test]
async fn history_is_pruned_to_limit() {
    let fx = fixture(30).await;
    for i in 0..35 {
        fx.provider.push_reply(format!("answer {i}"));
        fx.service.respond(turn(&format!("question {i}"))).await.unwrap();
    }

    let history = fx.storage.conversation_history(7, 70, 100).await.unwrap();
    assert_eq!(history.len(), 30);
    assert_eq!(history[0].user_message, "question 5");
    assert_eq!(history[29].user_message, "question 34");
}

#[tokio::test]
async fn clear_flag_starts_fresh() {
    let fx = fixture(30).await;
    fx.provider.push_reply("old").push_reply("new");
    fx.service.respond(turn("before")).await.unwrap();

    let mut request = turn("after");
    request.clear_history = true;
    fx.service.respond(request).await.unwrap();

    let roles: Vec<_> = fx.provider.requests()[1]
        .messages
        .iter()
        .map(Message::role)
        .collect();
    assert_eq!(roles, vec!["system", "user"]);
    let history = fx.storage.conversation_history(7, 70, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_message, "after");
}

#[tokio::test]
async fn chats_do_not_share_history() {
    let fx = fixture(30).await;
    fx.provider.push_reply("a").push_reply("b");
    fx.service.respond(turn("in chat 70")).await.unwrap();

    let mut other = turn("in chat 71");
    other.chat_id = 71;
    fx.service.respond(other).await.unwrap();

    assert_eq!(fx.provider.requests()[1].messages.len(), 2);
}

// ---- Failures and fallback ----

#[tokio::test]
async fn rate_limited_default_falls_back_and_is_remembered() {
    let fx = fixture(30).await;
    fx.provider
        .push_error_for("gpt-4.1", rate_limited("gpt-4.1", Some(120)))
        .push_reply_for("gpt-4.1-mini", "from fallback")
        .push_reply_for("gpt-4.1-mini", "still fallback");

    let reply = fx.service.respond(turn("first")).await.unwrap();
    assert_eq!(reply.text, "[✨ gpt-4.1-mini] from fallback");
    assert!(fx.service.completion().tracker().is_limited("gpt-4.1"));

    let reply = fx.service.respond(turn("second")).await.unwrap();
    assert_eq!(reply.text, "[✨ gpt-4.1-mini] still fallback");
    assert_eq!(
        fx.provider.models_called(),
        vec!["gpt-4.1", "gpt-4.1-mini", "gpt-4.1-mini"]
    );
}

#[tokio::test]
async fn rate_limit_window_uses_parsed_wait() {
    let fx = fixture(30).await;
    fx.provider
        .push_error_for("gpt-4.1", rate_limited("gpt-4.1", Some(120)))
        .push_reply_for("gpt-4.1-mini", "from fallback");
    fx.service.respond(turn("first")).await.unwrap();

    tokio::time::pause();
    let tracker = fx.service.completion().tracker();
    let remaining = tracker.remaining("gpt-4.1").unwrap();
    assert!(remaining <= Duration::from_secs(120));
    assert!(remaining > Duration::from_secs(119));

    tokio::time::advance(Duration::from_secs(119)).await;
    assert!(tracker.is_limited("gpt-4.1"));
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(!tracker.is_limited("gpt-4.1"));
}

#[tokio::test]
async fn marked_errors_are_shown_short_and_not_recorded() {
    let fx = fixture(30).await;
    fx.provider
        .push_error_for("gpt-4.1-mini", rate_limited("gpt-4.1-mini", Some(30)));

    let reply = fx.service.respond(turn("use: mini hi")).await.unwrap();
    assert!(reply.model.is_none());
    assert!(reply.text.starts_with("Rate limit of 10 per 60s exceeded."));
    assert!(!reply.text.contains("(RateLimitReached)"));

    let history = fx.storage.conversation_history(7, 70, 10).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn reasoning_only_output_is_not_sent_or_recorded() {
    let fx = fixture(30).await;
    fx.provider.push_reply("<think>just thinking</think>");

    let reply = fx.service.respond(turn("hello")).await.unwrap();
    assert_eq!(reply.text, "Could not generate a response.");
    assert!(reply.model.is_none());

    let history = fx.storage.conversation_history(7, 70, 10).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn empty_model_output_is_generic_error() {
    let fx = fixture(30).await;
    fx.provider.push_empty();

    let reply = fx.service.respond(turn("hello")).await.unwrap();
    assert_eq!(reply.text, "Could not generate a response.");
}
