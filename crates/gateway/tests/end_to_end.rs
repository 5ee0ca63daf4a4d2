//! End-to-end tests: JSON-RPC clients → gateway → a small AMP calculator.
#![allow(clippy::unwrap_used)]

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    ampgate_amp::{AmpBox, AmpCodec, UNHANDLED_ERROR_CODE, ValueKind, keys},
    ampgate_config::{CommandSignature, GatewayConfig},
    ampgate_gateway::{GatewayServer, NetstringCodec, netstring},
    bytes::Bytes,
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::{
        net::{
            TcpListener, TcpStream,
            tcp::{OwnedReadHalf, OwnedWriteHalf},
        },
        sync::watch,
    },
    tokio_tungstenite::tungstenite::Message,
    tokio_util::codec::{FramedRead, FramedWrite},
};

const WAIT: Duration = Duration::from_secs(5);

// ── AMP calculator ───────────────────────────────────────────────────────────

/// Counts every command box the calculator receives.
#[derive(Clone, Default)]
struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

fn operand(request: &AmpBox, key: &str) -> i64 {
    request.get_str(key).unwrap().parse().unwrap()
}

type Outcome = Result<Vec<(&'static str, String)>, (String, String)>;

fn calculate(command: &str, request: &AmpBox) -> Outcome {
    match command {
        "Add" => Ok(vec![("sum", (operand(request, "a") + operand(request, "b")).to_string())]),
        "Multiply" => Ok(vec![(
            "product",
            (operand(request, "a") * operand(request, "b")).to_string(),
        )]),
        "Divide" => {
            let divisor = operand(request, "b");
            if divisor == 0 {
                return Err(("ZERO_DIVISION".into(), "Divide by zero".into()));
            }
            let quotient = operand(request, "a") as f64 / divisor as f64;
            Ok(vec![("quotient", format!("{quotient:?}"))])
        },
        other => Err((
            UNHANDLED_ERROR_CODE.into(),
            format!("Unhandled Command: {other:?}"),
        )),
    }
}

async fn serve_calculator(stream: TcpStream, counter: Counter) {
    let (read_half, write_half) = stream.into_split();
    let mut requests = FramedRead::new(read_half, AmpCodec);
    let mut answers = FramedWrite::new(write_half, AmpCodec);

    while let Some(Ok(request)) = requests.next().await {
        counter.0.fetch_add(1, Ordering::SeqCst);
        let command = request.get_str(keys::COMMAND).unwrap_or_default().to_owned();
        let Some(tag) = request.get(keys::ASK).cloned() else {
            continue;
        };
        let reply: AmpBox = match calculate(&command, &request) {
            Ok(fields) => std::iter::once((keys::ANSWER.to_owned(), tag))
                .chain(fields.into_iter().map(|(k, v)| (k.to_owned(), Bytes::from(v))))
                .collect(),
            Err((code, description)) => [
                (keys::ERROR, tag),
                (keys::ERROR_CODE, Bytes::from(code)),
                (keys::ERROR_DESCRIPTION, Bytes::from(description)),
            ]
            .into_iter()
            .collect(),
        };
        if answers.send(reply).await.is_err() {
            break;
        }
    }
}

async fn start_calculator() -> (SocketAddr, Counter) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let counter = Counter::default();
    let accepted = counter.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_calculator(stream, accepted.clone()));
        }
    });
    (addr, counter)
}

// ── Gateway ──────────────────────────────────────────────────────────────────

struct Gateway {
    netstring: SocketAddr,
    websocket: SocketAddr,
    _shutdown: watch::Sender<bool>,
}

async fn start_gateway(backend: SocketAddr) -> Gateway {
    let mut config = GatewayConfig::default();
    config.gateway.backend = Some(backend.to_string().parse().unwrap());
    config.timeouts.connect_ms = 2_000;
    config.commands.insert("Add".into(), CommandSignature {
        arguments: vec!["a".into(), "b".into()],
        response: BTreeMap::from([("sum".to_owned(), ValueKind::Integer)]),
    });
    let server = GatewayServer::from_config(&config).unwrap();
    let (shutdown, shutdown_rx) = watch::channel(false);

    let netstring_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let websocket_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway = Gateway {
        netstring: netstring_listener.local_addr().unwrap(),
        websocket: websocket_listener.local_addr().unwrap(),
        _shutdown: shutdown,
    };

    tokio::spawn({
        let server = server.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move { server.serve_netstring(netstring_listener, shutdown_rx).await }
    });
    tokio::spawn(async move { server.serve_websocket(websocket_listener, shutdown_rx).await });
    gateway
}

// ── Netstring client ─────────────────────────────────────────────────────────

struct Client {
    replies: FramedRead<OwnedReadHalf, NetstringCodec>,
    requests: FramedWrite<OwnedWriteHalf, NetstringCodec>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let (read_half, write_half) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            replies: FramedRead::new(read_half, NetstringCodec::new(1 << 20)),
            requests: FramedWrite::new(write_half, NetstringCodec::new(1 << 20)),
        }
    }

    async fn send_raw(&mut self, payload: &str) {
        self.requests
            .send(Bytes::copy_from_slice(payload.as_bytes()))
            .await
            .unwrap();
    }

    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn reply(&mut self) -> Value {
        let payload = tokio::time::timeout(WAIT, self.replies.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        serde_json::from_slice(&payload).unwrap()
    }
}

fn call(id: Option<i64>, method: &str, params: Value) -> Value {
    let mut message = json!({"jsonrpc": "2.0", "method": method, "params": [params]});
    if let Some(id) = id {
        message["id"] = json!(id);
    }
    message
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_over_netstring() {
    let (backend, _) = start_calculator().await;
    let gateway = start_gateway(backend).await;
    let mut client = Client::connect(gateway.netstring).await;

    client
        .send_raw(r#"{"jsonrpc":"2.0","method":"Add","id":1,"params":[{"a":2,"b":2}]}"#)
        .await;
    assert_eq!(
        client.reply().await,
        json!({"jsonrpc": "2.0", "id": 1, "result": {"sum": 4}})
    );
}

#[tokio::test]
async fn notification_is_dispatched_but_not_answered() {
    let (backend, counter) = start_calculator().await;
    let gateway = start_gateway(backend).await;
    let mut client = Client::connect(gateway.netstring).await;

    client.send(call(None, "Add", json!({"a": 1, "b": 1}))).await;
    client.send(call(Some(2), "Multiply", json!({"a": 3, "b": 4}))).await;

    assert_eq!(
        client.reply().await,
        json!({"jsonrpc": "2.0", "id": 2, "result": {"product": 12}})
    );
    tokio::time::timeout(WAIT, async {
        while counter.get() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn malformed_json_is_skipped() {
    let (backend, _) = start_calculator().await;
    let gateway = start_gateway(backend).await;
    let mut client = Client::connect(gateway.netstring).await;

    client.send_raw("{").await;
    client.send(call(Some(7), "Add", json!({"a": 1, "b": 2}))).await;

    let reply = client.reply().await;
    assert_eq!(reply["id"], json!(7));
    assert_eq!(reply["result"], json!({"sum": 3}));
}

#[tokio::test]
async fn request_errors_are_answered() {
    let (backend, counter) = start_calculator().await;
    let gateway = start_gateway(backend).await;
    let mut client = Client::connect(gateway.netstring).await;

    client
        .send(json!({"jsonrpc": "2.0", "method": "Add", "id": 3, "params": [{}, {}]}))
        .await;
    let reply = client.reply().await;
    assert_eq!(reply["id"], json!(3));
    assert_eq!(reply["error"]["code"], json!(-32_000));

    client.send(call(Some(4), "Add", json!({"a": 1}))).await;
    assert_eq!(client.reply().await["error"]["code"], json!(-32_000));

    client.send(call(Some(5), "Nope", json!({}))).await;
    let reply = client.reply().await;
    assert_eq!(reply["error"]["code"], json!(-32_601));
    assert_eq!(
        reply["error"]["message"],
        json!("Method not found: Unhandled Command: \"Nope\"")
    );

    client.send(call(Some(6), "Divide", json!({"a": 1, "b": 0}))).await;
    assert_eq!(
        client.reply().await,
        json!({"jsonrpc": "2.0", "id": 6, "error": {"code": -32_001, "message": "Divide by zero"}})
    );

    client.send(call(Some(7), "Divide", json!({"a": 1, "b": 4}))).await;
    assert_eq!(client.reply().await["result"], json!({"quotient": 0.25}));

    // The signature mismatch never reached the calculator.
    assert_eq!(counter.get(), 3);
}

#[tokio::test]
async fn unreachable_backend_closes_client() {
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = unused.local_addr().unwrap();
    drop(unused);

    let gateway = start_gateway(backend).await;
    let mut client = Client::connect(gateway.netstring).await;

    let next = tokio::time::timeout(WAIT, client.replies.next()).await.unwrap();
    assert!(next.is_none() || next.is_some_and(|r| r.is_err()));
}

#[tokio::test]
async fn each_client_gets_its_own_backend_connection() {
    let (backend, counter) = start_calculator().await;
    let gateway = start_gateway(backend).await;

    let mut first = Client::connect(gateway.netstring).await;
    let mut second = Client::connect(gateway.netstring).await;
    first.send(call(Some(1), "Add", json!({"a": 1, "b": 1}))).await;
    second.send(call(Some(1), "Add", json!({"a": 2, "b": 2}))).await;

    assert_eq!(first.reply().await["result"], json!({"sum": 2}));
    assert_eq!(second.reply().await["result"], json!({"sum": 4}));
    assert_eq!(counter.get(), 2);
}

#[tokio::test]
async fn add_over_websocket() {
    let (backend, _) = start_calculator().await;
    let gateway = start_gateway(backend).await;

    let url = format!("ws://{}", gateway.websocket);
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    // One netstring split across two messages.
    let request = call(Some(9), "Add", json!({"a": 20, "b": 22})).to_string();
    let framed = netstring::frame(request.as_bytes());
    let (head, tail) = framed.split_at(5);
    ws.send(Message::binary(Bytes::copy_from_slice(head))).await.unwrap();
    ws.send(Message::text(String::from_utf8(tail.to_vec()).unwrap()))
        .await
        .unwrap();

    let message = tokio::time::timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
    let Message::Text(text) = message else {
        panic!("expected a text message, got {message:?}");
    };
    let mut codec = NetstringCodec::new(1 << 20);
    let mut buf = bytes::BytesMut::from(text.as_bytes());
    let payload = tokio_util::codec::Decoder::decode(&mut codec, &mut buf)
        .unwrap()
        .unwrap();
    let reply: Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 9, "result": {"sum": 42}}));
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let (backend, _) = start_calculator().await;
    let config = {
        let mut config = GatewayConfig::default();
        config.gateway.backend = Some(backend.to_string().parse().unwrap());
        config
    };
    let server = GatewayServer::from_config(&config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { server.serve_netstring(listener, shutdown_rx).await });

    shutdown.send(true).unwrap();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}
