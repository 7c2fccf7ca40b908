//! Listening socket lifecycle and accept loop

use crate::smtp::config::ListenerConfig;
use crate::smtp::email::Email;
use crate::smtp::error::ListenerError;
use crate::smtp::handler::SessionHandler;
use crate::smtp::store::EmailStore;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// An SMTP receiver that keeps the last message it was sent
///
/// Each accepted connection is served on its own thread. Stopping the
/// listener closes the listening socket before returning and shuts down the
/// sockets of sessions still in flight, so the port can be bound again
/// straight away.
#[derive(Debug)]
pub struct SmtpListener {
    config: ListenerConfig,
    hostname: Arc<str>,
    store: Arc<EmailStore>,
    running: Mutex<Option<Running>>,
}

#[derive(Debug)]
struct Running {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_thread: JoinHandle<()>,
    sessions: Arc<SessionRegistry>,
}

impl SmtpListener {
    /// Create a listener for the given port with default settings
    pub fn new(port: u16) -> Self {
        Self::with_config(ListenerConfig::new(port))
    }

    pub fn with_config(config: ListenerConfig) -> Self {
        Self {
            hostname: Arc::from(config.hostname.as_str()),
            config,
            store: Arc::new(EmailStore::new()),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Bind the configured port and start accepting connections
    pub fn start_listening(&self) -> Result<(), ListenerError> {
        let mut running = self.running.lock();
        if let Some(running) = running.as_ref() {
            return Err(ListenerError::AlreadyListening(running.local_addr));
        }

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr).map_err(|source| ListenerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        // Accept without blocking so the loop can observe the stop flag.
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let sessions = Arc::new(SessionRegistry::default());
        let accept_loop = AcceptLoop {
            listener,
            shutdown: Arc::clone(&shutdown),
            sessions: Arc::clone(&sessions),
            hostname: Arc::clone(&self.hostname),
            store: Arc::clone(&self.store),
            poll_interval: self.config.accept_poll_interval,
        };
        let accept_thread = thread::Builder::new()
            .name("smtp-accept".to_owned())
            .spawn(move || accept_loop.run())?;

        info!(%local_addr, "SMTP listener started");
        *running = Some(Running {
            local_addr,
            shutdown,
            accept_thread,
            sessions,
        });
        Ok(())
    }

    /// Close the listening socket and terminate in-flight sessions
    pub fn stop_listening(&self) -> Result<(), ListenerError> {
        let running = self
            .running
            .lock()
            .take()
            .ok_or(ListenerError::NotListening)?;

        running.shutdown.store(true, Ordering::Release);
        // The accept loop owns the socket; it is closed once the thread ends.
        if running.accept_thread.join().is_err() {
            warn!("accept loop panicked");
        }
        running.sessions.shutdown_all();

        info!(local_addr = %running.local_addr, "SMTP listener stopped");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.running.lock().is_some()
    }

    /// The bound address while listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.local_addr)
    }

    /// The most recently received email, if any has arrived yet
    pub fn last_email_received(&self) -> Option<Email> {
        self.store.get()
    }
}

impl Default for SmtpListener {
    fn default() -> Self {
        Self::with_config(ListenerConfig::default())
    }
}

impl Drop for SmtpListener {
    fn drop(&mut self) {
        if self.is_listening() {
            let _ = self.stop_listening();
        }
    }
}

/// Sockets of live sessions, kept so they can be shut down on stop
#[derive(Debug, Default)]
struct SessionRegistry {
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, TcpStream>>,
}

impl SessionRegistry {
    fn register(&self, stream: &TcpStream) -> io::Result<u64> {
        let stream = stream.try_clone()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams.lock().insert(id, stream);
        Ok(id)
    }

    fn remove(&self, id: u64) {
        self.streams.lock().remove(&id);
    }

    fn shutdown_all(&self) {
        let streams: Vec<_> = self.streams.lock().drain().map(|(_, s)| s).collect();
        for stream in streams {
            // Already closed by the peer is fine.
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

struct AcceptLoop {
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    sessions: Arc<SessionRegistry>,
    hostname: Arc<str>,
    store: Arc<EmailStore>,
    poll_interval: Duration,
}

impl AcceptLoop {
    fn run(self) {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.poll_interval);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "error accepting connection");
                    thread::sleep(self.poll_interval);
                }
            }
        }
        debug!("accept loop finished");
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        debug!(%peer, "accepted connection");

        // Some platforms hand out sockets inheriting the listener's mode.
        if let Err(e) = stream.set_nonblocking(false) {
            warn!(%peer, error = %e, "could not configure connection");
            return;
        }
        let id = match self.sessions.register(&stream) {
            Ok(id) => id,
            Err(e) => {
                warn!(%peer, error = %e, "could not track connection");
                return;
            }
        };

        let handler = SessionHandler::new(Arc::clone(&self.hostname), Arc::clone(&self.store));
        let sessions = Arc::clone(&self.sessions);
        let spawned = thread::Builder::new()
            .name(format!("smtp-session-{id}"))
            .spawn(move || {
                if let Err(e) = handler.handle(stream) {
                    debug!(%peer, error = %e, "session closed");
                }
                sessions.remove(id);
            });

        if let Err(e) = spawned {
            warn!(%peer, error = %e, "could not start session");
            self.sessions.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read};

    fn ephemeral_listener() -> SmtpListener {
        SmtpListener::with_config(ListenerConfig::new(0))
    }

    #[test]
    fn test_stop_before_start_fails() {
        let listener = ephemeral_listener();
        assert!(matches!(
            listener.stop_listening(),
            Err(ListenerError::NotListening)
        ));
        assert!(!listener.is_listening());
    }

    #[test]
    fn test_stop_twice_fails() {
        let listener = ephemeral_listener();
        listener.start_listening().unwrap();
        listener.stop_listening().unwrap();

        assert!(matches!(
            listener.stop_listening(),
            Err(ListenerError::NotListening)
        ));
    }

    #[test]
    fn test_start_twice_fails() {
        let listener = ephemeral_listener();
        listener.start_listening().unwrap();
        let addr = listener.local_addr().unwrap();

        assert!(matches!(
            listener.start_listening(),
            Err(ListenerError::AlreadyListening(a)) if a == addr
        ));
        listener.stop_listening().unwrap();
    }

    #[test]
    fn test_bind_error_leaves_listener_stopped() {
        let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();
        let listener = SmtpListener::new(port);

        assert!(matches!(
            listener.start_listening(),
            Err(ListenerError::Bind { .. })
        ));
        assert!(!listener.is_listening());
        assert!(listener.local_addr().is_none());
    }

    #[test]
    fn test_restart_on_same_port() {
        let listener = ephemeral_listener();
        listener.start_listening().unwrap();
        let port = listener.local_addr().unwrap().port();
        listener.stop_listening().unwrap();

        let again = SmtpListener::new(port);
        again.start_listening().unwrap();
        assert_eq!(again.local_addr().unwrap().port(), port);
        again.stop_listening().unwrap();
    }

    #[test]
    fn test_stop_closes_open_sessions() {
        let listener = ephemeral_listener();
        listener.start_listening().unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut greeting = String::new();
        reader.read_line(&mut greeting).unwrap();
        assert!(greeting.starts_with("220"));

        listener.stop_listening().unwrap();

        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut rest = Vec::new();
        // Either a clean EOF or a reset, but never a hang.
        let closed = match reader.read_to_end(&mut rest) {
            Ok(_) => true,
            Err(e) => e.kind() != io::ErrorKind::WouldBlock && e.kind() != io::ErrorKind::TimedOut,
        };
        assert!(closed);
    }

    #[test]
    fn test_last_email_empty_while_stopped() {
        let listener = ephemeral_listener();
        assert_eq!(listener.last_email_received(), None);
    }

    #[test]
    fn test_drop_releases_port() {
        let listener = ephemeral_listener();
        listener.start_listening().unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        TcpListener::bind(("127.0.0.1", port)).unwrap();
    }
}
