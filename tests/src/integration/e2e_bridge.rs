//! # End-to-End Bridge Flows
//!
//! A real `Bridge` connects to a local WebSocket server that plays the
//! OneBot implementation: it answers actions by echo token and pushes group
//! events.
//!
//! ```text
//! Bridge ──ws──▶ local server
//!   get_group_member_list ◀─ member list
//!   get_stranger_info     ◀─ nickname
//!   send_group_msg (code) ◀─ message_id
//!                         ─▶ group message "<code>"
//!   delete_msg            ◀─ ok
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bridge_runtime::adapters::{InMemoryBindingStore, InMemoryDirectory};
    use bridge_runtime::testing::RecordingNotifier;
    use bridge_runtime::{BindingStore, Bridge, BridgeConfig, BridgePorts, Notice, TimerConfig};
    use futures_util::{SinkExt, StreamExt};
    use qs_04_verification::IssueOutcome;
    use serde_json::{json, Value};
    use shared_types::{GroupId, PrincipalId, RemoteId, SessionTag};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::WebSocketStream;

    const STEP: Duration = Duration::from_secs(5);
    const GROUP: u64 = 100;

    type Server = WebSocketStream<TcpStream>;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    struct Fixture {
        bridge: Bridge,
        directory: Arc<InMemoryDirectory>,
        store: Arc<InMemoryBindingStore>,
        notifier: Arc<RecordingNotifier>,
        listener: TcpListener,
    }

    async fn fixture() -> Fixture {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = BridgeConfig {
            groups: vec![GroupId(GROUP)],
            timers: TimerConfig {
                admission_ms: 20,
                send_queue_ms: 20,
                retraction_ms: 20,
                side_effects_ms: 20,
                cleanup_ms: 100,
            },
            ..BridgeConfig::default()
        };
        config.transport.url = format!("ws://127.0.0.1:{port}");
        config.validate().unwrap();

        let directory = Arc::new(InMemoryDirectory::new());
        let store = Arc::new(InMemoryBindingStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let ports = BridgePorts {
            store: store.clone(),
            directory: directory.clone(),
            notifier: notifier.clone(),
        };

        Fixture {
            bridge: Bridge::new(config, ports),
            directory,
            store,
            notifier,
            listener,
        }
    }

    async fn accept(listener: &TcpListener) -> Server {
        let (stream, _) = timeout(STEP, listener.accept()).await.unwrap().unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    /// Next action frame named `action`. Heartbeats and other actions are
    /// skipped.
    async fn next_action(server: &mut Server, action: &str) -> Value {
        timeout(STEP, async {
            loop {
                let message = server.next().await.unwrap().unwrap();
                let Message::Text(text) = message else {
                    continue;
                };
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                if frame["action"] == action {
                    return frame;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {action} frame"))
    }

    async fn reply(server: &mut Server, request: &Value, data: Value) {
        let body = json!({ "status": "ok", "retcode": 0, "data": data, "echo": request["echo"] });
        server
            .send(Message::Text(body.to_string().into()))
            .await
            .unwrap();
    }

    async fn push(server: &mut Server, event: Value) {
        server
            .send(Message::Text(event.to_string().into()))
            .await
            .unwrap();
    }

    /// The six digits after `"for <name>: "` in a code message.
    fn code_in(frame: &Value, name: &str) -> String {
        let text = frame["params"]["message"].to_string();
        let marker = format!("for {name}: ");
        let start = text.find(&marker).unwrap() + marker.len();
        text[start..start + 6].to_string()
    }

    async fn wait_for<F>(mut condition: F)
    where
        F: FnMut() -> bool,
    {
        timeout(STEP, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    // =========================================================================
    // FLOWS
    // =========================================================================

    #[tokio::test]
    async fn test_bind_through_group_redemption() {
        let mut fx = fixture().await;
        fx.bridge.start().await.unwrap();
        let mut server = accept(&fx.listener).await;

        let list = next_action(&mut server, "get_group_member_list").await;
        assert_eq!(list["params"]["group_id"], json!(GROUP));
        reply(
            &mut server,
            &list,
            json!([{ "user_id": 10001, "nickname": "Creeper", "card": "" }]),
        )
        .await;

        let steve = PrincipalId::new("Steve");
        fx.directory.join(steve.clone(), SessionTag::new("xuid-steve"));
        fx.bridge.request_binding(&steve).unwrap();

        let submit = {
            let service = fx.bridge.service();
            let steve = steve.clone();
            tokio::spawn(async move { service.submit_remote_id(&steve, "10001").await })
        };
        let lookup = next_action(&mut server, "get_stranger_info").await;
        reply(
            &mut server,
            &lookup,
            json!({ "user_id": 10001, "nickname": "Creeper" }),
        )
        .await;
        assert_eq!(submit.await.unwrap().unwrap(), RemoteId(10001));
        assert_eq!(
            fx.notifier.last_for(&steve),
            Some(Notice::ConfirmRemote {
                remote: RemoteId(10001),
                display_name: "Creeper".to_string(),
            })
        );

        let outcome = fx.bridge.confirm(&steve).await.unwrap();
        assert!(matches!(outcome, IssueOutcome::Issued(_)));

        let delivery = next_action(&mut server, "send_group_msg").await;
        assert_eq!(delivery["params"]["group_id"], json!(GROUP));
        let code = code_in(&delivery, "Steve");
        reply(&mut server, &delivery, json!({ "message_id": 4242 })).await;

        push(
            &mut server,
            json!({
                "post_type": "message",
                "message_type": "group",
                "group_id": GROUP,
                "user_id": 10001,
                "raw_message": code,
                "sender": { "nickname": "Creeper" }
            }),
        )
        .await;

        let delete = next_action(&mut server, "delete_msg").await;
        assert_eq!(delete["params"]["message_id"], json!(4242));
        reply(&mut server, &delete, Value::Null).await;

        let card = next_action(&mut server, "set_group_card").await;
        assert_eq!(card["params"]["card"], json!("Steve"));

        let store = fx.store.clone();
        wait_for(|| store.len() == 1).await;
        assert_eq!(store.get(&steve).await.unwrap(), Some(RemoteId(10001)));

        fx.bridge.stop().await;
    }

    #[tokio::test]
    async fn test_member_lists_refreshed_after_reconnect() {
        let mut fx = fixture().await;
        fx.bridge.start().await.unwrap();

        let mut server = accept(&fx.listener).await;
        next_action(&mut server, "get_group_member_list").await;
        server.close(None).await.unwrap();
        drop(server);

        let mut server = accept(&fx.listener).await;
        let list = next_action(&mut server, "get_group_member_list").await;
        assert_eq!(list["params"]["group_id"], json!(GROUP));

        fx.bridge.stop().await;
    }

    #[tokio::test]
    async fn test_chat_relayed_into_game() {
        let mut fx = fixture().await;
        fx.bridge.start().await.unwrap();
        let mut server = accept(&fx.listener).await;
        next_action(&mut server, "get_group_member_list").await;

        push(
            &mut server,
            json!({
                "post_type": "message",
                "message_type": "group",
                "group_id": GROUP,
                "user_id": 20002,
                "raw_message": "anyone online?",
                "sender": { "nickname": "Zombie", "card": "Zed" }
            }),
        )
        .await;

        let notifier = fx.notifier.clone();
        wait_for(|| !notifier.relayed().is_empty()).await;
        let relayed = fx.notifier.relayed();
        let line = &relayed[0];
        assert_eq!(line.group, GroupId(GROUP));
        assert_eq!(line.sender, "Zed");
        assert_eq!(line.text, "anyone online?");

        fx.bridge.stop().await;
    }
}
