//! Scripted RESP server for exercising the remote tier.
//!
//! Answers the handful of commands the remote client sends and lets a test
//! inject error replies, stalls and dropped connections.

use crate::protocol::{RespParser, RespValue};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Script {
    data: Mutex<HashMap<String, Bytes>>,
    commands: Mutex<Vec<Vec<String>>>,
    fail: AtomicBool,
    stall: AtomicBool,
    get_delay_ms: AtomicU64,
    live: AtomicUsize,
}

impl Script {
    fn delay_for(&self, command: &RespValue) -> Duration {
        let is_get = match command {
            RespValue::Array(items) => items
                .first()
                .and_then(RespValue::as_str)
                .is_some_and(|name| name.eq_ignore_ascii_case("GET")),
            _ => false,
        };
        if is_get {
            Duration::from_millis(self.get_delay_ms.load(Ordering::SeqCst))
        } else {
            Duration::ZERO
        }
    }
}

pub(crate) struct FakeRemote {
    pub addr: SocketAddr,
    script: Arc<Script>,
    kill_tx: watch::Sender<u64>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl FakeRemote {
    pub async fn start() -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap()).await
    }

    pub async fn start_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script = Arc::new(Script::default());
        let (kill_tx, _) = watch::channel(0u64);

        let accept_script = Arc::clone(&script);
        let accept_kill = kill_tx.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_script.live.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(
                    socket,
                    Arc::clone(&accept_script),
                    accept_kill.subscribe(),
                ));
            }
        });

        Self {
            addr,
            script,
            kill_tx,
            accept_task: Mutex::new(Some(accept_task)),
        }
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    /// Reply `-ERR` to every data command.
    pub fn fail_commands(&self, on: bool) {
        self.script.fail.store(on, Ordering::SeqCst);
    }

    /// Never reply to data commands.
    pub fn stall_commands(&self, on: bool) {
        self.script.stall.store(on, Ordering::SeqCst);
    }

    /// Holds every `GET` reply back for `delay`. Replies stay in order.
    pub fn delay_gets(&self, delay: Duration) {
        self.script
            .get_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn insert_raw(&self, key: &str, payload: &str) {
        self.script
            .data
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::copy_from_slice(payload.as_bytes()));
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.script
            .data
            .lock()
            .unwrap()
            .get(key)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.script.commands.lock().unwrap().clone()
    }

    /// Closes every open connection and waits until they are gone.
    pub async fn drop_connections(&self) {
        self.kill_tx.send_modify(|generation| *generation += 1);
        while self.script.live.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Stops listening and closes every open connection.
    pub async fn shutdown(&self) {
        let task = self.accept_task.lock().unwrap().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        self.drop_connections().await;
    }
}

async fn serve_connection(mut socket: TcpStream, script: Arc<Script>, mut kill: watch::Receiver<u64>) {
    let mut buffer = BytesMut::with_capacity(1024);
    let mut parser = RespParser::new();

    'conn: loop {
        while let Ok(Some((command, consumed))) = parser.parse(&buffer) {
            let _ = buffer.split_to(consumed);
            let delay = script.delay_for(&command);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let Some(reply) = respond(&script, command) else {
                continue;
            };
            if socket.write_all(&reply.serialize()).await.is_err() {
                break 'conn;
            }
        }

        tokio::select! {
            read = socket.read_buf(&mut buffer) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            },
            _ = kill.changed() => break,
        }
    }

    drop(socket);
    script.live.fetch_sub(1, Ordering::SeqCst);
}

fn respond(script: &Script, command: RespValue) -> Option<RespValue> {
    let RespValue::Array(items) = command else {
        return Some(RespValue::error("ERR expected array"));
    };
    let args: Vec<String> = items
        .iter()
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .collect();
    script.commands.lock().unwrap().push(args.clone());

    let name = args.first().map(|s| s.to_uppercase()).unwrap_or_default();
    match name.as_str() {
        "AUTH" | "SELECT" | "QUIT" | "CLIENT" => return Some(RespValue::ok()),
        "PING" => return Some(RespValue::pong()),
        _ => {}
    }

    if script.stall.load(Ordering::SeqCst) {
        return None;
    }
    if script.fail.load(Ordering::SeqCst) {
        return Some(RespValue::error("ERR injected failure"));
    }

    let mut data = script.data.lock().unwrap();
    Some(match (name.as_str(), args.get(1)) {
        ("GET", Some(key)) => match data.get(key) {
            Some(payload) => RespValue::BulkString(payload.clone()),
            None => RespValue::null(),
        },
        ("SET", Some(key)) => {
            let payload = items.get(2).and_then(|v| v.as_bytes()).unwrap_or_default();
            data.insert(key.clone(), Bytes::copy_from_slice(payload));
            RespValue::ok()
        }
        ("DEL", Some(key)) => RespValue::integer(i64::from(data.remove(key).is_some())),
        ("DBSIZE", _) => RespValue::integer(data.len() as i64),
        ("FLUSHDB", _) => {
            data.clear();
            RespValue::ok()
        }
        _ => RespValue::error(format!("ERR unknown command '{}'", name)),
    })
}
