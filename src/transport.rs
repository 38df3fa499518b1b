//! Unix socket plumbing shared by the capture services.
//!
//! Streaming calls are plain `UnixStream`s carrying framed protobuf messages (see
//! [`crate::framing`]). A [`ServerContext`] lets a service abort a call from
//! another thread by shutting the socket down, which unblocks any pending read or
//! write on it. Contexts are tracked in a [`ServerContextRegistry`] through a
//! guard that removes them again however the call ends.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use log::{debug, error, info};
use prost::Message;

use crate::error::FramingError;
use crate::framing::{read_message, write_message};

/// Cancellation handle of one streaming call.
pub struct ServerContext {
    stream: UnixStream,
    cancelled: AtomicBool,
}

impl ServerContext {
    pub fn new(stream: &UnixStream) -> io::Result<Self> {
        Ok(Self {
            stream: stream.try_clone()?,
            cancelled: AtomicBool::new(false),
        })
    }

    /// Shuts the call's socket down in both directions. Idempotent.
    pub fn try_cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("Shutting down cancelled stream failed: {}", e);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Set of live server contexts.
#[derive(Default)]
pub struct ServerContextRegistry {
    contexts: Mutex<HashMap<u64, Arc<ServerContext>>>,
    next_id: AtomicU64,
}

impl ServerContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `context` until the returned guard is dropped.
    pub fn register(&self, context: Arc<ServerContext>) -> ServerContextGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.contexts
            .lock()
            .expect("Failed to acquire server contexts lock")
            .insert(id, context);
        ServerContextGuard { registry: self, id }
    }

    pub fn cancel_all(&self) {
        let contexts = self
            .contexts
            .lock()
            .expect("Failed to acquire server contexts lock");
        for context in contexts.values() {
            context.try_cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.contexts
            .lock()
            .expect("Failed to acquire server contexts lock")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ServerContextGuard<'a> {
    registry: &'a ServerContextRegistry,
    id: u64,
}

impl Drop for ServerContextGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .contexts
            .lock()
            .expect("Failed to acquire server contexts lock")
            .remove(&self.id);
    }
}

/// Reading half of a framed stream.
pub struct MessageReader {
    reader: BufReader<UnixStream>,
}

impl MessageReader {
    pub fn new(stream: UnixStream) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    /// `Ok(None)` once the peer closed its sending half.
    pub fn read<M: Message + Default>(&mut self) -> Result<Option<M>, FramingError> {
        read_message(&mut self.reader)
    }
}

/// Writing half of a framed stream. Every message is flushed immediately.
pub struct MessageWriter {
    writer: BufWriter<UnixStream>,
}

impl MessageWriter {
    pub fn new(stream: UnixStream) -> Self {
        Self {
            writer: BufWriter::new(stream),
        }
    }

    pub fn write<M: Message>(&mut self, message: &M) -> Result<(), FramingError> {
        write_message(&mut self.writer, message)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Closes the sending half; the peer reads end-of-stream.
    pub fn close(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().shutdown(Shutdown::Write)
    }
}

/// Splits a connected stream into framed reader and writer halves.
pub fn split(stream: UnixStream) -> io::Result<(MessageReader, MessageWriter)> {
    let write_half = stream.try_clone()?;
    Ok((MessageReader::new(stream), MessageWriter::new(write_half)))
}

/// Accept loop on a Unix socket, one thread per connection.
///
/// Connection handlers must return once their server contexts are cancelled,
/// `shutdown` joins them.
pub struct SocketServer {
    path: PathBuf,
    shutdown_requested: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    connection_threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SocketServer {
    pub fn bind<F>(path: &Path, name: &str, handler: F) -> Result<Self>
    where
        F: Fn(UnixStream) + Send + Sync + 'static,
    {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        }
        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind {}", path.display()))?;
        info!("{} listening on {}", name, path.display());

        let shutdown_requested = Arc::new(AtomicBool::new(false));
        let connection_threads = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let accept_thread = {
            let shutdown_requested = shutdown_requested.clone();
            let connection_threads = connection_threads.clone();
            let name = name.to_string();
            thread::Builder::new()
                .name(format!("{name}-accept"))
                .spawn(move || {
                    for stream in listener.incoming() {
                        if shutdown_requested.load(Ordering::SeqCst) {
                            break;
                        }
                        let stream = match stream {
                            Ok(stream) => stream,
                            Err(e) => {
                                error!("{}: accept failed: {}", name, e);
                                continue;
                            }
                        };
                        let handler = handler.clone();
                        let spawned = thread::Builder::new()
                            .name(format!("{name}-conn"))
                            .spawn(move || handler(stream));
                        match spawned {
                            Ok(handle) => connection_threads
                                .lock()
                                .expect("Failed to acquire connection threads lock")
                                .push(handle),
                            Err(e) => error!("{}: failed to spawn connection thread: {}", name, e),
                        }
                    }
                })
                .context("Failed to spawn accept thread")?
        };

        Ok(Self {
            path: path.to_path_buf(),
            shutdown_requested,
            accept_thread: Some(accept_thread),
            connection_threads,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stops accepting, waits for connection handlers and removes the socket file.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(accept_thread) = self.accept_thread.take() else {
            return;
        };
        self.shutdown_requested.store(true, Ordering::SeqCst);
        // Wake the blocking accept.
        let _ = UnixStream::connect(&self.path);
        if accept_thread.join().is_err() {
            error!("Accept thread for {} panicked", self.path.display());
        }

        let handles = std::mem::take(
            &mut *self
                .connection_threads
                .lock()
                .expect("Failed to acquire connection threads lock"),
        );
        for handle in handles {
            if handle.join().is_err() {
                error!("Connection handler on {} panicked", self.path.display());
            }
        }
        let _ = fs::remove_file(&self.path);
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        self.stop();
    }
}
