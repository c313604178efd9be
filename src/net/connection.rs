use super::framing;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

pub type ConnectionId = u64;

/// What the writer task is asked to do next.
#[derive(Debug)]
pub enum Outbound {
    Data(String),
    Close,
}

/// One stream endpoint. Owns the growable receive buffer and the error
/// state; the socket halves live in the reader and writer tasks.
///
/// The buffer has its own lock, separate from the world lock: the reader
/// task appends under it while the session layer drains under it. The
/// outbound side is a channel, so `send` never blocks and a write failure
/// surfaces later as a failed receive, not here.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    outbound: UnboundedSender<Outbound>,
    buffer: Mutex<String>,
    error: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(id: ConnectionId, peer: SocketAddr, outbound: UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            peer,
            outbound,
            buffer: Mutex::new(String::new()),
            error: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues an asynchronous write. Returns false without side effect
    /// when the connection is already closed.
    pub fn send(&self, text: impl Into<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.outbound.send(Outbound::Data(text.into())).is_ok()
    }

    /// Like `send`, but closes the connection once the write has gone out
    /// (or failed). For one-shot responses.
    pub fn send_and_close(&self, text: impl Into<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        let accepted = self.outbound.send(Outbound::Data(text.into())).is_ok();
        self.close();
        accepted
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.outbound.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn append_received(&self, text: &str) {
        self.buffer.lock().unwrap().push_str(text);
    }

    /// Takes the next complete framed line off the buffer, if any.
    pub fn next_line(&self) -> Option<String> {
        framing::next_line(&mut self.buffer.lock().unwrap())
    }

    pub fn set_error(&self, message: impl Into<String>) {
        *self.error.lock().unwrap() = Some(message.into());
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_connection() -> (Connection, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = "127.0.0.1:0".parse().unwrap();
        (Connection::new(9, peer, tx), rx)
    }

    #[test]
    fn send_enqueues_until_closed() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send("hello\n"));
        conn.close();
        assert!(!conn.send("late\n"));

        match rx.try_recv().unwrap() {
            Outbound::Data(text) => assert_eq!(text, "hello\n"),
            other => panic!("unexpected outbound {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Close));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_and_close_emits_data_then_close() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send_and_close("bye\n"));
        assert!(conn.is_closed());
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Data(_)));
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Close));
    }

    #[test]
    fn buffer_appends_and_drains_lines() {
        let (conn, _rx) = make_connection();
        conn.append_received("Ann\npar");
        assert_eq!(conn.next_line().as_deref(), Some("Ann"));
        assert_eq!(conn.next_line(), None);
        conn.append_received("tial\n");
        assert_eq!(conn.next_line().as_deref(), Some("partial"));
    }

    #[test]
    fn errors_mark_the_connection_closed() {
        let (conn, _rx) = make_connection();
        assert!(conn.error().is_none());
        conn.set_error("connection closed by peer");
        assert!(conn.is_closed());
        assert_eq!(conn.error().as_deref(), Some("connection closed by peer"));
        assert!(!conn.send("nope\n"));
    }
}
