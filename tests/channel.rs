//! Command channel tests against an in-process WebSocket server.
//!
//! The server mimics the CogServer JSON shell: one reply frame per command,
//! suffixed with the `json> ` prompt.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use atomspace_bridge::adapter::sample_data;
use atomspace_bridge::atom::Atom;
use atomspace_bridge::channel::{ChannelState, CommandChannel, GET_ALL_ATOMS};
use atomspace_bridge::config::BridgeConfig;
use atomspace_bridge::error::ChannelError;
use atomspace_bridge::fetch::{Fetcher, SourceKind};

const PROMPT: &str = "\njson> ";

enum Reply {
    Now(String),
    After(u64, String),
    Silent,
    Close,
}

fn prompt(body: &str) -> Reply {
    Reply::Now(format!("{body}{PROMPT}"))
}

/// Start a shell-like server; returns its `ws://` URL.
async fn spawn_server<F>(respond: F) -> String
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let respond = Arc::clone(&respond);
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
                    return;
                };
                let (mut tx, mut rx) = ws.split();
                while let Some(Ok(msg)) = rx.next().await {
                    let Message::Text(command) = msg else {
                        continue;
                    };
                    let text = match respond(command.as_str()) {
                        Reply::Now(text) => text,
                        Reply::After(ms, text) => {
                            tokio::time::sleep(Duration::from_millis(ms)).await;
                            text
                        }
                        Reply::Silent => continue,
                        Reply::Close => {
                            let _ = tx.send(Message::Close(None)).await;
                            break;
                        }
                    };
                    if tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    format!("ws://{addr}/json")
}

fn channel(timeout_ms: u64) -> CommandChannel {
    CommandChannel::new(Duration::from_millis(timeout_ms))
}

#[tokio::test]
async fn connect_and_fetch_atoms() {
    let url = spawn_server(|command| {
        if command == GET_ALL_ATOMS {
            prompt(&serde_json::to_string(&sample_data()).unwrap())
        } else {
            prompt("false")
        }
    })
    .await;

    let channel = channel(2_000);
    assert_eq!(channel.state(), ChannelState::Disconnected);
    channel.connect(&url).await.unwrap();
    assert_eq!(channel.state(), ChannelState::Connected);

    let atoms = channel.get_all_atoms().await.unwrap();
    assert_eq!(atoms, sample_data());
}

#[tokio::test]
async fn derived_operations_send_verbatim_commands() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let log = Arc::clone(&seen);
    let url = spawn_server(move |command| {
        log.lock().unwrap().push(command.to_string());
        if command.starts_with("AtomSpace.version") {
            prompt("\"1.0.1\"")
        } else if command.starts_with("AtomSpace.getTV") {
            prompt(r#"[{"type":"SimpleTruthValue","value":[1.0,0.9]}]"#)
        } else if command.starts_with("AtomSpace.getValues") {
            prompt(
                r#"[{"key":{"type":"PredicateNode","name":"color"},"value":{"type":"StringValue","value":["red"]}}]"#,
            )
        } else if command.starts_with("AtomSpace.getIncoming") {
            prompt(r#"[{"type":"ListLink","outgoing":[{"type":"ConceptNode","name":"cat"}]}]"#)
        } else {
            prompt("true")
        }
    })
    .await;

    let channel = channel(2_000);
    channel.connect(&url).await.unwrap();
    let cat = Atom::node("ConceptNode", "cat");

    assert_eq!(channel.make_atom(cat.clone()).await.unwrap(), cat);
    assert!(channel.have_atom(&cat).await.unwrap());

    let incoming = channel.get_incoming(&cat).await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].children()[0], cat);

    let values = channel.get_values(&cat).await.unwrap();
    assert_eq!(values[0].key.name.as_deref(), Some("color"));
    assert_eq!(values[0].value.value_type, "StringValue");

    let tv = channel.get_truth_value(&cat).await.unwrap();
    assert_eq!(tv[0].value_type, "SimpleTruthValue");

    assert_eq!(channel.get_version().await.unwrap(), "1.0.1");

    let cat_json = r#"{"type":"ConceptNode","name":"cat"}"#;
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            format!("AtomSpace.makeAtom({cat_json})"),
            format!("AtomSpace.haveAtom({cat_json})"),
            format!("AtomSpace.getIncoming({cat_json})"),
            format!("AtomSpace.getValues({cat_json})"),
            format!("AtomSpace.getTV({cat_json})"),
            "AtomSpace.version()".to_string(),
        ]
    );
}

#[tokio::test]
async fn read_queries_absorb_shape_mismatches() {
    let url = spawn_server(|_| prompt(r#"{"unexpected":"object"}"#)).await;
    let channel = channel(2_000);
    channel.connect(&url).await.unwrap();
    let cat = Atom::node("ConceptNode", "cat");

    assert!(channel.get_all_atoms().await.unwrap().is_empty());
    assert!(channel.get_incoming(&cat).await.unwrap().is_empty());
    assert!(channel.get_values(&cat).await.unwrap().is_empty());
    assert!(channel.get_truth_value(&cat).await.unwrap().is_empty());
    assert!(!channel.have_atom(&cat).await.unwrap());
    assert_eq!(
        channel.send_raw("(cog-atomspace)").await.unwrap(),
        r#"{"unexpected":"object"}"#
    );
}

#[tokio::test]
async fn rejected_insertion_is_an_error() {
    let url = spawn_server(|_| prompt("false")).await;
    let channel = channel(2_000);
    channel.connect(&url).await.unwrap();

    let err = channel
        .make_atom(Atom::node("ConceptNode", "dog"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Rejected { .. }));
    assert!(channel.is_connected());
}

#[tokio::test]
async fn timeout_leaves_channel_connected() {
    let url = spawn_server(|command| {
        if command == "AtomSpace.version()" {
            prompt("\"1.0.1\"")
        } else {
            Reply::Silent
        }
    })
    .await;

    let channel = channel(150);
    channel.connect(&url).await.unwrap();

    let err = channel.send_raw("(sleep 10)").await.unwrap_err();
    assert!(matches!(err, ChannelError::Timeout { timeout_ms: 150, .. }));
    assert_eq!(channel.state(), ChannelState::Connected);

    assert_eq!(channel.get_version().await.unwrap(), "1.0.1");
}

#[tokio::test]
async fn late_reply_is_not_delivered_to_next_command() {
    let url = spawn_server(|command| {
        if command == "slow" {
            Reply::After(300, format!("\"late\"{PROMPT}"))
        } else {
            prompt("\"fresh\"")
        }
    })
    .await;

    let channel = channel(100);
    channel.connect(&url).await.unwrap();

    assert!(matches!(
        channel.send_raw("slow").await,
        Err(ChannelError::Timeout { .. })
    ));
    // Let the late reply land while nothing is waiting.
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(channel.send_raw("next").await.unwrap(), "fresh");
}

#[tokio::test]
async fn concurrent_commands_are_serialized() {
    let url = spawn_server(|command| Reply::After(30, format!("\"echo:{command}\"{PROMPT}"))).await;

    let channel = Arc::new(channel(2_000));
    channel.connect(&url).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { (i, channel.send_raw(&format!("cmd{i}")).await) })
        })
        .collect();

    for task in tasks {
        let (i, reply) = task.await.unwrap();
        assert_eq!(reply.unwrap(), format!("echo:cmd{i}"));
    }
}

#[tokio::test]
async fn malformed_reply_is_reported() {
    let url = spawn_server(|_| Reply::Now("definitely not json".into())).await;
    let channel = channel(2_000);
    channel.connect(&url).await.unwrap();

    let err = channel.send_raw("anything").await.unwrap_err();
    assert!(matches!(err, ChannelError::MalformedFrame { .. }));
    assert!(channel.is_connected());
}

#[tokio::test]
async fn server_close_fails_pending_command() {
    let url = spawn_server(|_| Reply::Close).await;
    let channel = channel(2_000);
    channel.connect(&url).await.unwrap();

    let err = channel.send_raw("bye").await.unwrap_err();
    assert!(matches!(err, ChannelError::ConnectionClosed));
    assert_eq!(channel.state(), ChannelState::Disconnected);

    assert!(matches!(
        channel.send_raw("again").await,
        Err(ChannelError::NotConnected)
    ));
}

#[tokio::test]
async fn disconnect_fails_pending_command() {
    let url = spawn_server(|_| Reply::Silent).await;
    let channel = Arc::new(channel(10_000));
    channel.connect(&url).await.unwrap();

    let waiting = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.send_raw("(sleep 60)").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    channel.disconnect().await;
    let err = tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .expect("pending command resolves before its timeout")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ChannelError::ConnectionClosed), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let url = spawn_server(|_| prompt("true")).await;
    let channel = channel(2_000);

    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Disconnected);

    channel.connect(&url).await.unwrap();
    channel.disconnect().await;
    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Disconnected);

    assert!(matches!(
        channel.send_raw("x").await,
        Err(ChannelError::NotConnected)
    ));

    // Reconnecting after a disconnect works.
    channel.connect(&url).await.unwrap();
    assert_eq!(channel.send_raw("x").await.unwrap(), "true");
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let channel = channel(2_000);
    let err = channel.connect(&format!("ws://{addr}/json")).await.unwrap_err();
    assert!(matches!(err, ChannelError::Transport { .. }));
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn fetcher_converts_live_atoms_to_flat() {
    let url = spawn_server(|command| {
        if command == GET_ALL_ATOMS {
            prompt(&serde_json::to_string(&sample_data()).unwrap())
        } else {
            prompt("false")
        }
    })
    .await;

    let fetcher = Fetcher::new(BridgeConfig {
        timeout_ms: 2_000,
        ..Default::default()
    });
    let outcome = fetcher.fetch(&url).await.unwrap();
    assert_eq!(outcome.source, SourceKind::Live);
    assert_eq!(outcome.conversion.atom_count, 5);
    assert_eq!(outcome.conversion.response.atoms()[4].outgoing, vec![1, 2]);

    // The channel stays open for follow-up commands.
    assert!(fetcher.channel().is_connected());
    fetcher.channel().disconnect().await;
}
