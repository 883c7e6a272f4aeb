//! The concurrent query server: one accept loop feeding a bounded ring of
//! connections drained by a fixed pool of worker threads.
//!
//! The store is frozen before the listener starts; workers share it as
//! `Arc<Store>` and never touch a mutable API, so no locking happens on
//! the query path. Shutdown enqueues one sentinel message per worker; a
//! worker that dequeues the sentinel exits.

use crate::command::{tokenize, Interpreter, OutputKind, ResultStyle, StoreAccess};
use crate::error::{CommandError, ProtocolError, SnapshotError, StoreError};
use crate::store::Store;
use crossbeam_channel::{Receiver, Sender};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const SERVER_NAME: &str = "MemoryTripleStore";
const RFC1123: &[FormatItem<'_>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Server tuning knobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Fixed worker pool size.
    pub workers: usize,
    /// Capacity of the connection ring between accept and the workers.
    pub ring_capacity: usize,
    /// Fixed per-request body buffer; larger bodies are rejected.
    pub body_buffer_size: usize,
    /// Frame requests as HTTP. When off, a connection carries one raw
    /// command body terminated by EOF.
    pub http: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            ring_capacity: 64,
            body_buffer_size: 4096,
            http: true,
        }
    }
}

enum WorkerMessage {
    Connection(TcpStream),
    /// The shutdown sentinel; one is enqueued per worker.
    Shutdown,
}

/// A running server: the accept thread plus its worker pool.
pub struct ServerHandle {
    local_addr: SocketAddr,
    sender: Sender<WorkerMessage>,
    accept: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl ServerHandle {
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Blocks until the accept loop exits (it only exits on shutdown).
    pub fn join(self) -> io::Result<()> {
        self.accept
            .join()
            .map_err(|_| io::Error::other("accept thread panicked"))?;
        for worker in self.workers {
            let _ = worker.join();
        }
        Ok(())
    }

    /// Stops accepting, then drains the workers with one sentinel each.
    ///
    /// Workers finish their in-flight connection before they observe the
    /// sentinel, so the store outlives every handler.
    pub fn shutdown(self) -> io::Result<()> {
        self.stopping.store(true, Ordering::Release);
        // poke the accept loop awake so it can observe the flag
        let _ = TcpStream::connect(self.local_addr);
        self.accept
            .join()
            .map_err(|_| io::Error::other("accept thread panicked"))?;
        for _ in &self.workers {
            let _ = self.sender.send(WorkerMessage::Shutdown);
        }
        for worker in self.workers {
            let _ = worker.join();
        }
        Ok(())
    }
}

/// Binds the listener and starts the worker pool over a frozen store.
pub fn spawn(
    store: Arc<Store>,
    addr: impl ToSocketAddrs,
    config: ServerConfig,
) -> io::Result<ServerHandle> {
    let listener = TcpListener::bind(addr)?;
    let local_addr = listener.local_addr()?;
    let (sender, receiver) = crossbeam_channel::bounded(config.ring_capacity.max(1));
    let stopping = Arc::new(AtomicBool::new(false));

    let mut workers = Vec::with_capacity(config.workers);
    for i in 0..config.workers.max(1) {
        let receiver: Receiver<WorkerMessage> = receiver.clone();
        let store = Arc::clone(&store);
        let config = config.clone();
        workers.push(
            std::thread::Builder::new()
                .name(format!("tristore-worker-{i}"))
                .spawn(move || worker_loop(&receiver, &store, &config))?,
        );
    }

    let accept_sender = sender.clone();
    let accept_stopping = Arc::clone(&stopping);
    let accept = std::thread::Builder::new()
        .name("tristore-accept".to_owned())
        .spawn(move || {
            accept_loop(&listener, &accept_sender, &accept_stopping);
        })?;
    info!(%local_addr, workers = config.workers.max(1), "listening");
    Ok(ServerHandle {
        local_addr,
        sender,
        accept,
        workers,
        stopping,
    })
}

fn accept_loop(
    listener: &TcpListener,
    sender: &Sender<WorkerMessage>,
    stopping: &AtomicBool,
) {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if stopping.load(Ordering::Acquire) {
                    return;
                }
                debug!(%peer, "accepted connection");
                // blocks with backoff while the ring is full
                if sender.send(WorkerMessage::Connection(stream)).is_err() {
                    return;
                }
            }
            Err(e) => {
                if stopping.load(Ordering::Acquire) {
                    return;
                }
                warn!(error = %e, "accept failed");
            }
        }
    }
}

fn worker_loop(receiver: &Receiver<WorkerMessage>, store: &Store, config: &ServerConfig) {
    while let Ok(message) = receiver.recv() {
        match message {
            WorkerMessage::Shutdown => return,
            WorkerMessage::Connection(stream) => {
                if let Err(e) = handle_connection(store, stream, config) {
                    debug!(error = %e, "connection aborted");
                }
            }
        }
    }
}

/// Runs one connection to completion: frame the request, interpret the
/// body, write exactly one response.
fn handle_connection(
    store: &Store,
    stream: TcpStream,
    config: &ServerConfig,
) -> Result<(), ProtocolError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    match read_request(&mut reader, config) {
        Ok(body) => {
            let (status, content_type, payload) = run_request(store, &body);
            if config.http {
                write_response(&mut writer, status, content_type, &payload)?;
            } else {
                writer.write_all(&payload)?;
            }
        }
        Err(e) => {
            if config.http {
                let message = e.to_string();
                write_response(
                    &mut writer,
                    (400, "Bad Request"),
                    "text/plain",
                    message.as_bytes(),
                )?;
            }
            writer.flush()?;
            return Err(e);
        }
    }
    writer.flush()?;
    Ok(())
}

/// Reads the request body: HTTP framing (headers, then exactly
/// `Content-Length` bytes) or raw-to-EOF framing.
fn read_request(
    reader: &mut impl BufRead,
    config: &ServerConfig,
) -> Result<String, ProtocolError> {
    let mut body = Vec::new();
    if config.http {
        let length = read_header_length(reader)?;
        if length > config.body_buffer_size {
            return Err(ProtocolError::BodyTooLarge {
                got: length,
                max: config.body_buffer_size,
            });
        }
        body.resize(length, 0);
        reader.read_exact(&mut body)?;
    } else {
        reader
            .by_ref()
            .take(config.body_buffer_size as u64 + 1)
            .read_to_end(&mut body)?;
        if body.len() > config.body_buffer_size {
            return Err(ProtocolError::BodyTooLarge {
                got: body.len(),
                max: config.body_buffer_size,
            });
        }
    }
    if body.contains(&0) {
        return Err(ProtocolError::NulInBody);
    }
    String::from_utf8(body).map_err(|_| ProtocolError::BadEncoding)
}

/// Consumes the request line and headers up to the blank line, returning
/// the `Content-Length` value. The header name matches case-insensitively.
fn read_header_length(reader: &mut impl BufRead) -> Result<usize, ProtocolError> {
    let mut length = None;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(ProtocolError::BadContentLength);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                length = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ProtocolError::BadContentLength)?,
                );
            }
        }
    }
    length.ok_or(ProtocolError::BadContentLength)
}

/// Interprets the command body and renders the response payload.
///
/// The body is processed line by line until the first completed command;
/// query construction spans as many lines as it needs. The first error
/// aborts the request and its message becomes the `400` body. Result sets
/// come back as TSV; listings are plain text.
fn run_request(
    store: &Store,
    body: &str,
) -> ((u16, &'static str), &'static str, Vec<u8>) {
    let mut interpreter = Interpreter::new(StoreAccess::ReadOnly(store), ResultStyle::Tsv);
    let mut payload = Vec::new();
    let mut output = None;
    for line in body.lines() {
        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }
        if interpreter.starts_output(&tokens) && output.is_none() {
            output = Some(Interpreter::output_kind(&tokens));
        }
        if let Err(e) = interpreter.run(&tokens, &mut payload) {
            let status = match &e {
                CommandError::Store(StoreError::Resource(_))
                | CommandError::Snapshot(SnapshotError::Resource(_)) => {
                    (500, "Internal Server Error")
                }
                _ => (400, "Bad Request"),
            };
            let mut message = e.to_string();
            message.push_str("\r\n");
            return (status, "text/plain", message.into_bytes());
        }
        if !interpreter.constructing() {
            break;
        }
    }
    let Some(output) = output else {
        return (
            (400, "Bad Request"),
            "text/plain",
            b"Bad Request\r\n".to_vec(),
        );
    };
    let content_type = match output {
        OutputKind::Results => "text/tab-separated-values; charset=utf-8",
        OutputKind::Listing => "text/plain",
    };
    ((200, "OK"), content_type, payload)
}

fn write_response(
    writer: &mut impl Write,
    (code, reason): (u16, &'static str),
    content_type: &str,
    payload: &[u8],
) -> io::Result<()> {
    let date = OffsetDateTime::now_utc()
        .format(RFC1123)
        .unwrap_or_default();
    write!(
        writer,
        "HTTP/1.1 {code} {reason}\r\n\
         Content-Type: {content_type}\r\n\
         Date: {date}\r\n\
         Server: {SERVER_NAME}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        payload.len()
    )?;
    writer.write_all(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;
    use crate::store::StoreBuilder;

    fn test_store() -> Arc<Store> {
        let mut builder = StoreBuilder::new();
        let a = builder.intern(Term::iri("http://example.com/a")).unwrap();
        let p = builder.intern(Term::iri("http://example.com/p")).unwrap();
        let b = builder.intern(Term::iri("http://example.com/b")).unwrap();
        builder.add_triple(a, p, b, 0).unwrap();
        Arc::new(builder.freeze())
    }

    fn request(addr: SocketAddr, body: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(
            stream,
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    fn small_config() -> ServerConfig {
        ServerConfig {
            workers: 2,
            ring_capacity: 4,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn serves_tsv_results() {
        let handle = spawn(test_store(), "127.0.0.1:0", small_config()).unwrap();
        let response = request(handle.local_addr(), "bgp ?s ?p ?o");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Server: MemoryTripleStore\r\n"));
        assert!(response.contains("Content-Type: text/tab-separated-values; charset=utf-8"));
        assert!(response.ends_with(
            "?s\t?p\t?o\n<http://example.com/a>\t<http://example.com/p>\t<http://example.com/b>\n"
        ));
        handle.shutdown().unwrap();
    }

    #[test]
    fn multi_line_construction_bodies() {
        let handle = spawn(test_store(), "127.0.0.1:0", small_config()).unwrap();
        let response = request(
            handle.local_addr(),
            "begin ?s ?p ?o\nfilter isiri ?o\ncount",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("?count\n1\n"));
        handle.shutdown().unwrap();
    }

    #[test]
    fn listings_are_plain_text() {
        let handle = spawn(test_store(), "127.0.0.1:0", small_config()).unwrap();
        let response = request(handle.local_addr(), "size");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: text/plain\r\n"));
        assert!(response.ends_with("1 triples\n"));
        let response = request(handle.local_addr(), "nodes");
        assert!(response.contains("Content-Type: text/plain\r\n"));
        assert!(response.contains("# 3 nodes\n"));
        handle.shutdown().unwrap();
    }

    #[test]
    fn command_errors_are_bad_requests() {
        let handle = spawn(test_store(), "127.0.0.1:0", small_config()).unwrap();
        let response = request(handle.local_addr(), "frobnicate");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("unrecognized operation"));
        handle.shutdown().unwrap();
    }

    #[test]
    fn mutating_commands_are_rejected_read_only() {
        let handle = spawn(test_store(), "127.0.0.1:0", small_config()).unwrap();
        let response = request(handle.local_addr(), "import /tmp/none.nt");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("read-only"));
        handle.shutdown().unwrap();
    }

    #[test]
    fn missing_content_length_is_rejected() {
        let handle = spawn(test_store(), "127.0.0.1:0", small_config()).unwrap();
        let mut stream = TcpStream::connect(handle.local_addr()).unwrap();
        stream
            .write_all(b"POST / HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        handle.shutdown().unwrap();
    }

    #[test]
    fn oversized_bodies_are_rejected() {
        let config = ServerConfig {
            body_buffer_size: 16,
            ..small_config()
        };
        let handle = spawn(test_store(), "127.0.0.1:0", config).unwrap();
        let response = request(handle.local_addr(), "bgp ?s ?p ?o # padded past limit");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        handle.shutdown().unwrap();
    }

    #[test]
    fn concurrent_requests_share_the_frozen_store() {
        let handle = spawn(test_store(), "127.0.0.1:0", small_config()).unwrap();
        let addr = handle.local_addr();
        let threads: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(move || request(addr, "bgp ?s ?p ?o")))
            .collect();
        for thread in threads {
            assert!(thread.join().unwrap().starts_with("HTTP/1.1 200 OK\r\n"));
        }
        handle.shutdown().unwrap();
    }

    #[test]
    fn shutdown_joins_every_worker() {
        let handle = spawn(test_store(), "127.0.0.1:0", small_config()).unwrap();
        handle.shutdown().unwrap();
    }
}
