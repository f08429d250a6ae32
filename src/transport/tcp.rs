//! TCP transport implementation.
//!
//! Locations have the form `tcp:host:port`. The protocol is a blocking
//! request/response exchange: the client sends an 8-byte little-endian
//! length followed by the receiver reference, and the server replies with a
//! length-prefixed encoded envelope. A zero length in either direction means
//! "nothing": the server sends it when the post office shuts down before a
//! message is available for a pending request.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::{ClientKind, Envelope, ServerKind, TransportClient, TransportServer};
use crate::error::{Error, Result};
use crate::post_office::PostOffice;

const SCHEME: &str = "tcp:";

// Reads one length-prefixed frame. Returns None on a clean end of stream
// at a frame boundary.
fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut length_buf = [0u8; 8];
    match stream.read_exact(&mut length_buf) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let length = u64::from_le_bytes(length_buf) as usize;
    let mut data = vec![0u8; length];
    stream.read_exact(&mut data)?;
    Ok(Some(data))
}

// Writes one length-prefixed frame.
fn write_frame(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(data.len() as u64).to_le_bytes())?;
    stream.write_all(data)
}

// ============================================================================
// Client Side
// ============================================================================

/// Client kind for the TCP transport.
pub struct TcpClientKind;

impl ClientKind for TcpClientKind {
    fn can_connect_to(&self, location: &str) -> bool {
        location.starts_with(SCHEME)
    }

    fn connect(&self, instance_id: &str, location: &str) -> Result<Box<dyn TransportClient>> {
        let addr = location
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::Codec(format!("not a tcp location: {}", location)))?;
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        debug!(instance_id, location, "Connected to peer");
        Ok(Box::new(TcpClient {
            stream: Mutex::new(stream),
        }))
    }
}

struct TcpClient {
    // One request/response in flight per connection; concurrent receives
    // through the same client serialize here.
    stream: Mutex<TcpStream>,
}

impl TransportClient for TcpClient {
    fn receive(&self, receiver: &str) -> Result<Envelope> {
        let mut stream = self.stream.lock().expect("tcp client lock poisoned");
        write_frame(&mut stream, receiver.as_bytes())?;
        let reply = read_frame(&mut stream)?
            .ok_or_else(|| Error::PeerGone(receiver.to_string()))?;
        if reply.is_empty() {
            return Err(Error::PeerGone(receiver.to_string()));
        }
        Envelope::decode(&reply)
    }

    fn close(&self) -> Result<()> {
        let stream = self.stream.lock().expect("tcp client lock poisoned");
        match stream.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != ErrorKind::NotConnected => Err(err.into()),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Server Side
// ============================================================================

/// Server kind for the TCP transport.
pub struct TcpServerKind {
    bind: String,
}

impl TcpServerKind {
    /// Creates a server kind that binds to the given address.
    ///
    /// Use port 0 to let the operating system pick a free port; the
    /// advertised location carries the actual one.
    pub fn new(bind: impl Into<String>) -> Self {
        Self { bind: bind.into() }
    }
}

impl ServerKind for TcpServerKind {
    fn start(
        &self,
        instance_id: &str,
        post_office: Arc<PostOffice>,
    ) -> Result<Box<dyn TransportServer>> {
        let listener = TcpListener::bind(&self.bind)?;
        let addr = listener.local_addr()?;
        info!(instance_id, %addr, "TCP server listening");

        let running = Arc::new(AtomicBool::new(true));
        let handlers: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let accept_running = running.clone();
        let accept_handlers = handlers.clone();
        let accept_post_office = post_office.clone();
        let accept_thread = thread::spawn(move || {
            for connection in listener.incoming() {
                if !accept_running.load(Ordering::SeqCst) {
                    break;
                }
                match connection {
                    Ok(stream) => {
                        let post_office = accept_post_office.clone();
                        let handle = thread::spawn(move || serve_connection(stream, post_office));
                        accept_handlers
                            .lock()
                            .expect("tcp server lock poisoned")
                            .push(handle);
                    }
                    Err(err) => {
                        warn!(%err, "Failed to accept connection");
                    }
                }
            }
        });

        Ok(Box::new(TcpServer {
            addr,
            running,
            accept_thread: Some(accept_thread),
            handlers,
            post_office,
        }))
    }
}

// Answers receive requests on one accepted connection until the peer hangs
// up or the post office shuts down.
fn serve_connection(mut stream: TcpStream, post_office: Arc<PostOffice>) {
    loop {
        let request = match read_frame(&mut stream) {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(err) => {
                debug!(%err, "Connection dropped");
                break;
            }
        };
        let receiver = match String::from_utf8(request) {
            Ok(receiver) => receiver,
            Err(err) => {
                warn!(%err, "Request with invalid receiver reference");
                break;
            }
        };
        match post_office.retrieve(&receiver) {
            Some(envelope) => {
                if let Err(err) = write_frame(&mut stream, &envelope.encode()) {
                    debug!(%err, %receiver, "Failed to send envelope");
                    break;
                }
            }
            None => {
                // shut down with the request unfulfilled
                let _ = write_frame(&mut stream, &[]);
                break;
            }
        }
    }
}

struct TcpServer {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    handlers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    post_office: Arc<PostOffice>,
}

impl TransportServer for TcpServer {
    fn location(&self) -> String {
        format!("{}{}", SCHEME, self.addr)
    }

    fn close(&mut self) {
        // wake blocked handlers so in-flight requests drain
        self.post_office.shutdown();
        self.running.store(false, Ordering::SeqCst);
        // unblock the accept loop
        let _ = TcpStream::connect(self.addr);
        if let Some(thread) = self.accept_thread.take() {
            let _ = thread.join();
        }
        let handlers: Vec<_> = self
            .handlers
            .lock()
            .expect("tcp server lock poisoned")
            .drain(..)
            .collect();
        for handle in handlers {
            let _ = handle.join();
        }
    }
}
