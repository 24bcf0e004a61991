//! End-to-end tests: relay bytes in, graph state and events out.
//!
//! The first group drives `ProtocolSession` and `GraphWorker` directly, the
//! way the two contexts hand work to each other at runtime.  The last test
//! puts a fake relay on a loopback socket and runs the real connection task
//! against it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_client::application::protocol::ProtocolSession;
use relay_client::application::worker::{GraphWorker, Inbound};
use relay_client::infrastructure::network::{CommandSender, RelayConnection, RelayConnectionConfig};
use relay_core::{
    encode_frame, encode_message, Compression, EntityGraph, GraphEvent, HData, HDataItem, Object,
    Pointer, RelayMessage,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

// ── Message builders ──────────────────────────────────────────────────────────

fn s(v: &str) -> Object {
    Object::String(Some(v.to_string()))
}

/// One hdata message; keys are taken from the first item.
fn hdata(id: &str, path: &[&str], items: Vec<(Vec<u64>, Vec<(&str, Object)>)>) -> RelayMessage {
    let items: Vec<HDataItem> = items
        .into_iter()
        .map(|(pointers, fields)| HDataItem {
            pointers: pointers.into_iter().map(Pointer).collect(),
            objects: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
        })
        .collect();
    let keys = items
        .first()
        .map(|item| {
            item.objects
                .iter()
                .map(|(k, v)| (k.clone(), v.object_type()))
                .collect()
        })
        .unwrap_or_default();
    RelayMessage {
        id: id.to_string(),
        objects: vec![Object::HData(HData {
            path: path.iter().map(|p| p.to_string()).collect(),
            keys,
            items,
        })],
    }
}

fn frame(msg: &RelayMessage, compression: Compression) -> Vec<u8> {
    encode_frame(&encode_message(msg).unwrap(), compression).unwrap()
}

fn buffer_list() -> RelayMessage {
    hdata(
        "buffer_init",
        &["buffer"],
        vec![
            (vec![0x10], vec![("name", s("core.weechat")), ("number", Object::Int(1))]),
            (vec![0x20], vec![("name", s("irc.libera.#rust")), ("number", Object::Int(2))]),
        ],
    )
}

fn first_lines() -> RelayMessage {
    hdata(
        "first_lines",
        &["buffer", "line_data"],
        vec![
            (vec![0x10, 0x101], vec![("message", s("welcome")), ("prefix", s(""))]),
            (vec![0x20, 0x201], vec![("message", s("hello rust")), ("prefix", s("ferris"))]),
        ],
    )
}

fn hotlist() -> RelayMessage {
    hdata(
        "hotlist_init",
        &["hotlist"],
        vec![(
            vec![0x900],
            vec![
                ("buffer", Object::Pointer(Pointer(0x20))),
                ("priority", Object::Int(2)),
            ],
        )],
    )
}

fn nicklist() -> RelayMessage {
    hdata(
        "nicklist_init",
        &["buffer", "nicklist_item"],
        vec![
            (
                vec![0x20, 0x300],
                vec![("group", Object::Char(0)), ("name", s("ferris"))],
            ),
            (
                vec![0x20, 0x301],
                vec![("group", Object::Char(0)), ("name", s("crab"))],
            ),
        ],
    )
}

fn live_line(buffer: u64, line: u64, message: &str) -> RelayMessage {
    hdata(
        "_buffer_line_added",
        &["line_data"],
        vec![(
            vec![line],
            vec![
                ("buffer", Object::Pointer(Pointer(buffer))),
                ("message", s(message)),
            ],
        )],
    )
}

fn closing(buffer: u64) -> RelayMessage {
    hdata(
        "_buffer_closing",
        &["buffer"],
        vec![(vec![buffer], vec![("name", s("closing"))])],
    )
}

fn handshake_stream() -> Vec<u8> {
    let mut stream = Vec::new();
    for msg in [buffer_list(), first_lines(), hotlist(), nicklist()] {
        stream.extend(frame(&msg, Compression::Zlib));
    }
    stream
}

// ── Protocol and graph contexts wired by hand ─────────────────────────────────

struct Pipeline {
    protocol: ProtocolSession,
    worker: GraphWorker,
    events: Vec<GraphEvent>,
}

impl Pipeline {
    fn connect(epoch: u64) -> Self {
        let (tx, _rx) = mpsc::channel(1);
        let mut worker = GraphWorker::new(EntityGraph::default(), tx);
        let events = worker.process(Inbound::Connected { epoch });
        Self {
            protocol: ProtocolSession::new(epoch),
            worker,
            events,
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        for envelope in self.protocol.ingest(chunk) {
            let events = self.worker.process(Inbound::Record(envelope));
            self.events.extend(events);
        }
    }

    fn graph(&self) -> &EntityGraph {
        self.worker.graph()
    }
}

#[test]
fn test_handshake_replay_builds_complete_graph() {
    // Arrange
    let mut pipeline = Pipeline::connect(1);

    // Act
    pipeline.feed(&handshake_stream());

    // Assert
    let graph = pipeline.graph();
    assert!(pipeline.protocol.is_handshake_complete());
    assert_eq!(graph.buffer_count(), 2);
    assert_eq!(graph.line_count(), 2);
    assert_eq!(graph.hotlist_count(), 1);
    assert_eq!(graph.buffer(Pointer(0x20)).unwrap().nick_count(), 2);
    assert_eq!(graph.selected_index(), Some(0));
}

#[test]
fn test_chunking_never_changes_resulting_graph() {
    // Arrange
    let stream = handshake_stream();
    let mut whole = Pipeline::connect(1);
    let mut bytewise = Pipeline::connect(1);

    // Act
    whole.feed(&stream);
    for byte in &stream {
        bytewise.feed(std::slice::from_ref(byte));
    }

    // Assert
    assert_eq!(whole.events, bytewise.events);
    let names = |p: &Pipeline| p.graph().buffers().map(|b| b.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&whole), names(&bytewise));
}

#[test]
fn test_live_line_is_newest_and_duplicate_is_ignored() {
    // Arrange
    let mut pipeline = Pipeline::connect(1);
    pipeline.feed(&handshake_stream());

    // Act
    pipeline.feed(&frame(&live_line(0x20, 0x202, "newest"), Compression::Off));
    pipeline.feed(&frame(&live_line(0x20, 0x202, "again"), Compression::Off));

    // Assert
    let messages: Vec<&str> = pipeline
        .graph()
        .lines_of(Pointer(0x20))
        .map(|l| l.message.as_str())
        .collect();
    assert_eq!(messages, vec!["newest", "hello rust"]);
}

#[test]
fn test_line_for_unknown_buffer_is_dropped_and_stream_continues() {
    // Arrange
    let mut pipeline = Pipeline::connect(1);
    pipeline.feed(&handshake_stream());
    let mut stream = frame(&live_line(0xdead, 0x1, "orphan"), Compression::Off);
    stream.extend(frame(&live_line(0x10, 0x102, "still here"), Compression::Off));

    // Act
    pipeline.feed(&stream);

    // Assert
    assert_eq!(pipeline.graph().line_count(), 3);
    assert!(pipeline.graph().line(Pointer(0x10), Pointer(0x102)).is_some());
}

#[test]
fn test_closing_buffer_removes_it_with_its_lines() {
    // Arrange
    let mut pipeline = Pipeline::connect(1);
    pipeline.feed(&handshake_stream());
    assert_eq!(pipeline.graph().selected_index(), Some(0));

    // Act
    pipeline.feed(&frame(&closing(0x10), Compression::Off));

    // Assert
    let graph = pipeline.graph();
    assert_eq!(graph.buffer_count(), 1);
    assert_eq!(graph.line_count(), 1);
    // Still in range, so the index is kept and now names the remaining buffer.
    assert_eq!(graph.selected_index(), Some(0));
    assert!(pipeline
        .events
        .contains(&GraphEvent::BufferRemoved { buffer: Pointer(0x10) }));
}

#[test]
fn test_filter_narrows_buffers_case_insensitively() {
    let mut pipeline = Pipeline::connect(1);
    pipeline.feed(&handshake_stream());

    pipeline.worker.process(Inbound::SetFilter("RUST".to_string()));

    let filtered: Vec<Pointer> = pipeline.graph().filtered_buffers().map(|b| b.pointer).collect();
    assert_eq!(filtered, vec![Pointer(0x20)]);
}

#[test]
fn test_reconnect_drops_records_from_previous_connection() {
    // Arrange: envelopes decoded under epoch 1 are still queued when epoch 2 starts.
    let mut old = ProtocolSession::new(1);
    let queued = old.ingest(&handshake_stream());
    let (tx, _rx) = mpsc::channel(1);
    let mut worker = GraphWorker::new(EntityGraph::default(), tx);
    worker.process(Inbound::Connected { epoch: 1 });
    worker.process(Inbound::Connected { epoch: 2 });

    // Act
    for envelope in queued {
        worker.process(Inbound::Record(envelope));
    }

    // Assert
    assert!(worker.graph().is_empty());
}

// ── Fake relay over loopback TCP ──────────────────────────────────────────────

#[tokio::test]
async fn test_connection_task_against_fake_relay() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let relay = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut received = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            let done = line == "sync";
            received.push(line);
            if done {
                break;
            }
        }
        write_half.write_all(&handshake_stream()).await.unwrap();
        write_half.flush().await.unwrap();
        // Keep the socket open until the client sends its next command.
        let next = lines.next_line().await.unwrap();
        received.extend(next);
        received
    });

    let config = RelayConnectionConfig {
        addr: addr.to_string(),
        password: "secret".to_string(),
        compression: true,
        reconnect_interval: Duration::from_millis(50),
        hotlist_poll_interval: Duration::from_secs(60),
        ping_interval: Duration::from_secs(60),
        idle_timeout: Duration::ZERO,
    };
    let running = Arc::new(AtomicBool::new(true));
    let (commands, command_rx) = CommandSender::new(50);
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let worker = tokio::spawn(GraphWorker::new(EntityGraph::default(), event_tx).run(inbound_rx));
    let network = RelayConnection::new(config).start(Arc::clone(&running), inbound_tx, command_rx);

    // Act: wait until the nicklist (last handshake reply) has been applied.
    let wait = async {
        while let Some(event) = event_rx.recv().await {
            if event == (GraphEvent::NicklistChanged { buffer: Pointer(0x20) }) {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap();
    running.store(false, Ordering::Relaxed);
    assert!(commands.send_input(Pointer(0x20), "bye"));

    let received = tokio::time::timeout(Duration::from_secs(5), relay)
        .await
        .unwrap()
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), network)
        .await
        .unwrap()
        .unwrap();
    let graph = tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .unwrap()
        .unwrap();

    // Assert
    assert_eq!(received[0], "init password=secret,compression=zlib");
    assert_eq!(received[5], "sync");
    assert_eq!(received.last().map(String::as_str), Some("input 0x20 bye"));
    assert_eq!(graph.buffer_count(), 2);
    assert_eq!(graph.line_count(), 2);
}
