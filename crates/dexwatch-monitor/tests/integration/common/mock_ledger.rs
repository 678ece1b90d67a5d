//! Mock ledger WebSocket endpoint for integration tests.
//!
//! Accepts connections, acknowledges subscribe commands with a success
//! response, records received messages, and can inject transaction
//! notifications or drop every connection to exercise reconnects.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct MockLedgerServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    inject_tx: broadcast::Sender<String>,
    kick_tx: broadcast::Sender<()>,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockLedgerServer {
    /// Start the server on an ephemeral port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (inject_tx, _) = broadcast::channel::<String>(32);
        let (kick_tx, _) = broadcast::channel::<()>(4);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let inject_clone = inject_tx.clone();
        let kick_clone = kick_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            messages_clone.clone(),
                            connections_clone.clone(),
                            inject_clone.subscribe(),
                            kick_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            inject_tx,
            kick_tx,
            messages,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.iter().cloned().collect()
    }

    /// Push a raw message to every connected client.
    pub fn inject(&self, text: String) {
        let _ = self.inject_tx.send(text);
    }

    /// Close every live connection (clients should reconnect).
    pub fn drop_connections(&self) {
        let _ = self.kick_tx.send(());
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
    mut inject_rx: broadcast::Receiver<String>,
    mut kick_rx: broadcast::Receiver<()>,
) {
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("mock ledger handshake failed: {e}");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        messages.lock().await.push_back(text.clone());

                        // Acknowledge subscribe commands
                        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) {
                            if parsed.get("command") == Some(&json!("subscribe")) {
                                let response = json!({
                                    "id": parsed.get("id").cloned().unwrap_or(json!(0)),
                                    "status": "success",
                                    "type": "response",
                                    "result": { "bids": [], "asks": [] }
                                });
                                let _ = write.send(Message::Text(response.to_string())).await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            inj = inject_rx.recv() => {
                if let Ok(text) = inj {
                    let _ = write.send(Message::Text(text)).await;
                }
            }
            _ = kick_rx.recv() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        }
    }
}
