//! Store operations against a loopback gateway.

use std::time::Duration;

use serde_json::{Value, json};

use clawdeck_gateway::{EVENT_BUFFER, ReconnectConfig};
use clawdeck_mock_gateway::{MockConfig, MockGateway, Reply};
use clawdeck_protocol::ChatRole;
use clawdeck_protocol::messages::SkillPatch;
use clawdeck_protocol::types::{ChatAttachment, CronSchedule, RunStatus};
use clawdeck_state::{
    ConnectionStatus, DashboardState, DiagnosticKind, GatewayStore, Settings, SettingsPatch,
    ToolStatus,
};

const WAIT: Duration = Duration::from_secs(5);

fn store_for(gateway: &MockGateway) -> GatewayStore {
    let settings = Settings {
        gateway_url: gateway.url(),
        token: "secret".into(),
        ..Settings::default()
    };
    GatewayStore::new(settings)
        .with_connect_debounce(Duration::from_millis(50))
        .with_reconnect(ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            backoff_factor: 1.7,
        })
}

async fn wait_until(store: &GatewayStore, pred: impl Fn(&DashboardState) -> bool) {
    let mut changes = store.subscribe();
    let reached = tokio::time::timeout(WAIT, async {
        loop {
            if store.read(&pred).await {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for state");
    assert!(store.read(&pred).await, "store dropped before state was reached");
}

async fn connected_store(gateway: &MockGateway) -> GatewayStore {
    let store = store_for(gateway);
    store.connect().await;
    wait_until(&store, DashboardState::is_connected).await;
    store
}

fn gateway_responder(method: &str, params: &Value) -> Reply {
    match method {
        "cron.status" => Reply::Ok(json!({"enabled": true, "jobs": 1, "nextWakeAtMs": 1700000000000i64})),
        "cron.list" => Reply::Ok(json!({"jobs": [{
            "id": "j1",
            "name": "Morning brief",
            "enabled": true,
            "createdAtMs": 1,
            "updatedAtMs": 2,
            "schedule": {"kind": "every", "everyMs": 3600000},
            "sessionTarget": "main",
            "wakeMode": "now",
            "payload": {"kind": "systemEvent", "text": "wake up"}
        }]})),
        "cron.runs" => Reply::Ok(json!({"entries": [
            {"ts": 10, "jobId": params["id"], "status": "ok", "durationMs": 1200}
        ]})),
        "config.get" => Reply::Ok(json!({"path": "/etc/gw.json", "exists": true, "valid": true})),
        "agents.list" => Reply::Ok(json!({
            "defaultId": "main", "mainKey": "main", "scope": "per-sender",
            "agents": [{"id": "main", "identity": {"name": "Claw", "emoji": "🦀"}}]
        })),
        "channels.status" => Reply::Ok(json!({
            "ts": 5, "channelOrder": ["telegram"], "channelLabels": {"telegram": "Telegram"},
            "channels": {}, "channelAccounts": {"telegram": [{"accountId": "bot", "connected": true}]}
        })),
        "sessions.list" => Reply::Ok(json!({
            "ts": 5, "path": "/s", "count": 1,
            "sessions": [{"key": "agent:main:main", "kind": "direct"}]
        })),
        "skills.status" => Reply::Ok(json!({
            "workspaceDir": "/w", "managedSkillsDir": "/m",
            "skills": [{"name": "weather", "skillKey": "weather", "eligible": true}]
        })),
        "chat.history" => Reply::Ok(json!({"messages": [
            {"role": "user", "content": "hi", "timestamp": 100},
            {"role": "assistant", "content": [{"type": "text", "text": "hello"}]}
        ]})),
        _ => Reply::Ok(json!({"ok": true})),
    }
}

#[tokio::test]
async fn connect_defaults_session_from_hello() {
    let mut config = MockConfig::default();
    config.hello["snapshot"]["sessionDefaults"]["mainSessionKey"] = json!("agent:ops:main");
    let gateway = MockGateway::start(config).await.unwrap();

    let store = connected_store(&gateway).await;
    let state = store.snapshot().await;
    assert_eq!(state.status, ConnectionStatus::Connected);
    assert!(state.error.is_none());
    assert_eq!(state.hello.as_ref().unwrap().protocol, 3);
    assert_eq!(state.session_key(), "agent:ops:main");

    let connect = gateway.requests_for("connect").await;
    assert_eq!(connect[0].frame.params["auth"]["token"], "secret");
}

#[tokio::test]
async fn loads_replace_snapshots() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    gateway.set_responder(gateway_responder).await;
    let store = connected_store(&gateway).await;

    store.load_cron_status().await.unwrap();
    store.load_cron_jobs().await.unwrap();
    store.load_cron_runs("j1").await.unwrap();
    store.load_config().await.unwrap();
    store.load_agents().await.unwrap();
    store.load_channels().await.unwrap();
    store.load_sessions().await.unwrap();
    store.load_skills().await.unwrap();

    let state = store.snapshot().await;
    assert_eq!(state.cron_status.as_ref().unwrap().jobs, 1);
    assert_eq!(state.cron_jobs.len(), 1);
    assert!(matches!(
        state.cron_jobs[0].schedule,
        CronSchedule::Every { every_ms: 3600000, .. }
    ));
    assert_eq!(state.cron_runs.len(), 1);
    assert_eq!(state.cron_runs[0].status, RunStatus::Ok);
    assert_eq!(state.cron_runs_job_id.as_deref(), Some("j1"));
    assert_eq!(state.config.as_ref().unwrap().valid, Some(true));
    assert!(!state.config_loading);
    assert_eq!(state.agents.as_ref().unwrap().agents[0].display_name(), "Claw");
    assert_eq!(state.channels.as_ref().unwrap().label("telegram"), "Telegram");
    assert_eq!(state.sessions.as_ref().unwrap().count, 1);
    assert_eq!(state.skills.as_ref().unwrap().skills[0].skill_key, "weather");
    assert!(state.diagnostics.is_empty());

    let runs = gateway.requests_for("cron.runs").await;
    assert_eq!(runs[0].frame.params, json!({"id": "j1", "limit": 50}));
}

#[tokio::test]
async fn cron_list_without_jobs_is_empty() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&gateway).await;
    store.load_cron_jobs().await.unwrap();
    assert!(store.read(|s| s.cron_jobs.is_empty()).await);
}

#[tokio::test]
async fn mutations_send_params_and_refresh() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    gateway.set_responder(gateway_responder).await;
    let store = connected_store(&gateway).await;

    store.toggle_cron_job("j1", false).await.unwrap();
    store.remove_cron_job("j1").await.unwrap();
    store.run_cron_job("j1").await.unwrap();
    store
        .install_skill("weather", "brew-0")
        .await
        .unwrap();
    store
        .update_skill(
            "weather",
            SkillPatch {
                enabled: Some(false),
                ..SkillPatch::default()
            },
        )
        .await
        .unwrap();
    store.apply_config(json!({"agents": {}})).await.unwrap();
    store
        .update_agent("main", json!({"name": "Crab"}))
        .await
        .unwrap();

    let update = gateway.requests_for("cron.update").await;
    assert_eq!(update[0].frame.params, json!({"id": "j1", "patch": {"enabled": false}}));
    let remove = gateway.requests_for("cron.remove").await;
    assert_eq!(remove[0].frame.params, json!({"id": "j1"}));
    let run = gateway.requests_for("cron.run").await;
    assert_eq!(run[0].frame.params, json!({"id": "j1", "mode": "force"}));
    let install = gateway.requests_for("skills.install").await;
    assert_eq!(install[0].frame.params, json!({"name": "weather", "installId": "brew-0"}));
    let skill = gateway.requests_for("skills.update").await;
    assert_eq!(skill[0].frame.params, json!({"skillKey": "weather", "enabled": false}));
    let apply = gateway.requests_for("config.apply").await;
    assert_eq!(apply[0].frame.params, json!({"config": {"agents": {}}}));

    // toggle + remove refresh the job list; run does not.
    assert_eq!(gateway.requests_for("cron.list").await.len(), 2);
    assert_eq!(gateway.requests_for("skills.status").await.len(), 2);
    assert_eq!(gateway.requests_for("config.get").await.len(), 1);
    assert_eq!(gateway.requests_for("agents.list").await.len(), 1);
    assert_eq!(store.read(|s| s.cron_jobs.len()).await, 1);
}

#[tokio::test]
async fn failed_load_keeps_snapshot_and_records_diagnostic() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    gateway.set_responder(gateway_responder).await;
    let store = connected_store(&gateway).await;
    store.load_cron_jobs().await.unwrap();

    gateway
        .set_responder(|_method: &str, _params: &Value| Reply::err("UNAVAILABLE", "cron disabled"))
        .await;
    let err = store.load_cron_jobs().await.unwrap_err();
    assert_eq!(err.to_string(), "cron disabled");

    let state = store.snapshot().await;
    assert_eq!(state.cron_jobs.len(), 1);
    let last = state.diagnostics.last().unwrap();
    assert_eq!(last.kind, DiagnosticKind::Request);
    assert_eq!(last.context, "cron.list");
    assert_eq!(last.message, "cron disabled");
}

#[tokio::test]
async fn failed_mutation_skips_refresh() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    gateway
        .set_responder(|method: &str, _params: &Value| match method {
            "cron.add" => Reply::err("INVALID", "bad schedule"),
            _ => Reply::Ok(json!({})),
        })
        .await;
    let store = connected_store(&gateway).await;

    assert!(store.add_cron_job(&json!({"name": "x"})).await.is_err());
    assert!(gateway.requests_for("cron.list").await.is_empty());
}

#[tokio::test]
async fn failed_config_load_clears_loading_flag() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    gateway
        .set_responder(|_method: &str, _params: &Value| Reply::err("X", "nope"))
        .await;
    let store = connected_store(&gateway).await;

    assert!(store.load_config().await.is_err());
    let state = store.snapshot().await;
    assert!(!state.config_loading);
    assert!(state.config.is_none());
}

#[tokio::test]
async fn send_chat_message_is_optimistic() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&gateway).await;

    store
        .add_chat_attachment(ChatAttachment {
            id: "a1".into(),
            data_url: "data:image/png;base64,iVBORw0KGgo".into(),
            mime_type: "image/png".into(),
            name: Some("shot.png".into()),
        })
        .await;
    store.send_chat_message("look at this", None).await.unwrap();

    let state = store.snapshot().await;
    assert_eq!(state.chat.messages.len(), 1);
    assert_eq!(state.chat.messages[0].role, ChatRole::User);
    assert_eq!(state.chat.messages[0].attachments.len(), 1);
    assert!(state.chat.attachments.is_empty());
    assert!(state.chat.loading);

    let sent = gateway.requests_for("chat.send").await;
    let params = &sent[0].frame.params;
    assert_eq!(params["sessionKey"], "agent:main:main");
    assert_eq!(params["message"], "look at this");
    assert_eq!(params["deliver"], false);
    let key = params["idempotencyKey"].as_str().unwrap();
    let (ms, random) = key.split_once('-').unwrap();
    assert!(ms.parse::<i64>().is_ok());
    assert!(!random.is_empty());
    assert_eq!(
        params["attachments"],
        json!([{"name": "shot.png", "type": "image/png", "buffer": "iVBORw0KGgo"}])
    );
}

#[tokio::test]
async fn send_chat_without_attachments_omits_field() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&gateway).await;
    store.send_chat_message("hi", None).await.unwrap();
    let sent = gateway.requests_for("chat.send").await;
    assert!(sent[0].frame.params.get("attachments").is_none());
}

#[tokio::test]
async fn failed_send_stops_loading() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    gateway
        .set_responder(|_method: &str, _params: &Value| Reply::err("BUSY", "agent busy"))
        .await;
    let store = connected_store(&gateway).await;

    assert!(store.send_chat_message("hi", None).await.is_err());
    let state = store.snapshot().await;
    assert!(!state.chat.loading);
    assert_eq!(state.chat.messages.len(), 1);
    assert_eq!(state.diagnostics.last().unwrap().context, "chat.send");
}

#[tokio::test]
async fn streamed_reply_updates_transcript() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&gateway).await;
    store.send_chat_message("what is 6*7?", None).await.unwrap();

    gateway
        .push_event("thinking", json!({"text": "multiply", "state": "delta"}))
        .await;
    gateway
        .push_event(
            "tool",
            json!({"toolCallId": "t1", "toolName": "calc", "args": {"expr": "6*7"}, "state": "start"}),
        )
        .await;
    gateway
        .push_event("tool", json!({"toolCallId": "t1", "output": "42", "state": "done"}))
        .await;
    gateway
        .push_event("tool", json!({"toolCallId": "t2", "output": "?", "state": "done"}))
        .await;
    for (text, state) in [("It is", "delta"), (" 42", "delta")] {
        gateway
            .push_event(
                "chat",
                json!({"runId": "r1", "state": state, "message": {"role": "assistant", "content": [{"type": "text", "text": text}]}}),
            )
            .await;
    }
    wait_until(&store, |s| {
        s.chat.messages.last().is_some_and(|m| m.content == "It is 42")
    })
    .await;

    let state = store.snapshot().await;
    assert_eq!(state.chat.thinking, "multiply");
    assert_eq!(state.chat.tools.len(), 1);
    assert_eq!(state.chat.tools[0].status, ToolStatus::Done);
    assert_eq!(state.chat.tools[0].args.as_deref(), Some(r#"{"expr":"6*7"}"#));
    assert!(state.chat.loading);

    gateway
        .push_event(
            "chat",
            json!({"runId": "r1", "state": "final", "message": {"role": "assistant", "content": "It is 42."}}),
        )
        .await;
    gateway.push_event("presence", json!({"clients": 2})).await;
    wait_until(&store, |s| s.other_events.contains_key("presence")).await;

    let state = store.snapshot().await;
    assert_eq!(state.chat.messages.len(), 2);
    assert_eq!(state.chat.messages[1].content, "It is 42.");
    assert_eq!(state.chat.messages[1].role, ChatRole::Assistant);
    assert!(!state.chat.loading);
    assert!(state.chat.thinking.is_empty());
}

#[tokio::test]
async fn event_burst_is_reduced_without_loss() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&gateway).await;
    store.send_chat_message("count to many", None).await.unwrap();

    let total = EVENT_BUFFER * 8;
    for n in 0..total {
        gateway
            .push_event(
                "chat",
                json!({"runId": "r1", "state": "delta", "message": {"role": "assistant", "content": "x"}}),
            )
            .await;
        if n % 100 == 0 {
            gateway.push_event("tick", json!({"n": n})).await;
        }
    }
    wait_until(&store, |s| {
        s.chat.messages.last().is_some_and(|m| m.content.len() == total)
    })
    .await;

    let state = store.snapshot().await;
    assert!(state.is_connected());
    assert!(state.hello.is_some());
    assert!(state.chat.loading);
    assert_eq!(state.chat.messages.len(), 2);
    assert!(state.chat.messages[1].content.chars().all(|c| c == 'x'));
    assert_eq!(state.other_events["tick"], total.div_ceil(100) as u64);

    gateway
        .push_event(
            "chat",
            json!({"runId": "r1", "state": "final", "message": {"role": "assistant", "content": "done"}}),
        )
        .await;
    wait_until(&store, |s| !s.chat.loading).await;
    let state = store.snapshot().await;
    assert_eq!(state.chat.messages.len(), 2);
    assert_eq!(state.chat.messages[1].content, "done");
}

#[tokio::test]
async fn unhandled_events_reach_subscribers() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&gateway).await;
    let mut other = store.subscribe_events();

    gateway.push_event("presence", json!({"clients": 1})).await;
    gateway.push_event("presence", json!({"clients": 3})).await;

    for clients in [1, 3] {
        let frame = tokio::time::timeout(WAIT, other.recv()).await.unwrap().unwrap();
        assert_eq!(frame.event, "presence");
        assert_eq!(frame.payload, Some(json!({"clients": clients})));
    }
    let state = store.snapshot().await;
    assert_eq!(state.other_events["presence"], 2);
    assert_eq!(state.last_events["presence"].payload, Some(json!({"clients": 3})));
}

#[tokio::test]
async fn history_with_odd_entries_still_loads() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    gateway
        .set_responder(|_method: &str, _params: &Value| {
            Reply::Ok(json!({"messages": [
                {"role": null, "content": "from nobody", "timestamp": 1.5e12},
                {"role": "user", "content": "hi", "timestamp": "200"},
                42,
                {"role": "assistant", "content": "hello", "timestamp": "soon"}
            ]}))
        })
        .await;
    let store = connected_store(&gateway).await;

    store.set_chat_session("agent:main:main").await.unwrap();
    let state = store.snapshot().await;
    assert!(!state.chat.loading);
    assert_eq!(state.chat.messages.len(), 3);
    assert_eq!(state.chat.messages[0].role, ChatRole::Assistant);
    assert_eq!(state.chat.messages[0].timestamp_ms, 1_500_000_000_000);
    assert_eq!(state.chat.messages[1].role, ChatRole::User);
    assert_eq!(state.chat.messages[1].timestamp_ms, 200);
    assert_eq!(state.chat.messages[2].content, "hello");
    assert!(state.chat.messages[2].timestamp_ms > 0);
    assert!(state.diagnostics.is_empty());
}

#[tokio::test]
async fn set_chat_session_loads_history() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    gateway.set_responder(gateway_responder).await;
    let store = connected_store(&gateway).await;

    store.set_chat_session("agent:main:side").await.unwrap();
    let state = store.snapshot().await;
    assert_eq!(state.session_key(), "agent:main:side");
    assert!(!state.chat.loading);
    assert_eq!(state.chat.messages.len(), 2);
    assert_eq!(state.chat.messages[0].timestamp_ms, 100);
    assert_eq!(state.chat.messages[1].content, "hello");

    let history = gateway.requests_for("chat.history").await;
    assert_eq!(
        history[0].frame.params,
        json!({"sessionKey": "agent:main:side", "limit": 50})
    );
}

#[tokio::test]
async fn failed_history_clears_transcript() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&gateway).await;
    store.send_chat_message("hi", None).await.unwrap();

    gateway
        .set_responder(|_method: &str, _params: &Value| Reply::err("NOT_FOUND", "no such session"))
        .await;
    assert!(store.set_chat_session("missing").await.is_err());
    let state = store.snapshot().await;
    assert!(state.chat.messages.is_empty());
    assert!(!state.chat.loading);
}

#[tokio::test]
async fn dropped_socket_reconnects() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&gateway).await;

    assert!(gateway.drop_connection().await);
    assert!(gateway.wait_for_requests("connect", 2, WAIT).await);
    // The close is applied before the second hello.
    wait_until(&store, |s| {
        s.is_connected() && s.diagnostics.iter().any(|d| d.kind == DiagnosticKind::Closed)
    })
    .await;
    assert!(gateway.connection_count() >= 2);
}

#[tokio::test]
async fn unreachable_gateway_reports_error() {
    let store = GatewayStore::new(Settings {
        gateway_url: "ws://127.0.0.1:1/ws".into(),
        ..Settings::default()
    })
    .with_reconnect(ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        backoff_factor: 1.7,
    });
    store.connect().await;
    wait_until(&store, |s| s.status == ConnectionStatus::Error).await;
    let state = store.snapshot().await;
    assert!(state.error.is_some());
    assert_eq!(state.diagnostics.last().unwrap().kind, DiagnosticKind::Transport);
    store.disconnect().await;
}

#[tokio::test]
async fn disconnect_forgets_hello_and_stops_requests() {
    let gateway = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&gateway).await;

    store.disconnect().await;
    let state = store.snapshot().await;
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert!(state.hello.is_none());

    store.load_agents().await.unwrap();
    assert!(gateway.requests_for("agents.list").await.is_empty());
}

#[tokio::test]
async fn reconnect_with_new_settings() {
    let first = MockGateway::start(MockConfig::default()).await.unwrap();
    let second = MockGateway::start(MockConfig::default()).await.unwrap();
    let store = connected_store(&first).await;

    store
        .set_settings(SettingsPatch {
            gateway_url: Some(second.url()),
            ..SettingsPatch::default()
        })
        .await;
    store.connect().await;
    wait_until(&store, DashboardState::is_connected).await;

    assert!(second.wait_for_connections(1, WAIT).await);
    assert_eq!(first.connection_count(), 1);
}
