//! Blocking TCP transport.
//!
//! One [`Connection`] serves exactly one request/response cycle. The
//! connection is closed on every exit path by ownership: dropping the
//! [`Connection`] closes the stream whether the exchange succeeded, failed,
//! or panicked.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::wire::WireError;

/// A single open connection to the companion process.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    timeout: Duration,
}

impl Connection {
    /// Open a connection to `(host, port)` with the given read/write timeout.
    ///
    /// The host is resolved via the standard resolver; each resolved address
    /// is tried in order with `timeout` as the connect deadline.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Connect`] if the host does not resolve or no
    /// address accepts the connection.
    pub fn open(host: &str, port: u16, timeout: Duration) -> Result<Self, WireError> {
        let connect_err = |source| WireError::Connect {
            host: host.to_string(),
            port,
            source,
        };

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(connect_err)?
            .collect();

        let mut last_err = std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "no addresses resolved",
        );
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout)).map_err(connect_err)?;
                    stream
                        .set_write_timeout(Some(timeout))
                        .map_err(connect_err)?;
                    return Ok(Self { stream, timeout });
                }
                Err(e) => last_err = e,
            }
        }
        Err(connect_err(last_err))
    }

    /// Send the request text and half-close the write side so the peer
    /// observes end-of-request.
    ///
    /// A trailing newline is appended if the request does not end with one.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Io`] if the write or shutdown fails.
    pub fn send(&mut self, request: &str) -> Result<(), WireError> {
        self.stream.write_all(request.as_bytes())?;
        if !request.ends_with('\n') {
            self.stream.write_all(b"\n")?;
        }
        self.stream.flush()?;
        self.stream.shutdown(Shutdown::Write)?;
        Ok(())
    }

    /// Read the full reply, blocking until the peer closes its write side
    /// or the timeout elapses.
    ///
    /// Returns the reply split into lines, without trailing newlines. An
    /// empty reply yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Timeout`] if no data arrives within the timeout,
    /// or [`WireError::Io`] for other read failures.
    pub fn read_reply(mut self) -> Result<Vec<String>, WireError> {
        let mut reply = String::new();
        if let Err(e) = self.stream.read_to_string(&mut reply) {
            return match e.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                    #[allow(clippy::cast_possible_truncation)]
                    let timeout_ms = self.timeout.as_millis() as u64;
                    Err(WireError::Timeout(timeout_ms))
                }
                _ => Err(WireError::Io(e)),
            };
        }
        Ok(reply.lines().map(String::from).collect())
    }
}

/// Perform one full request/response exchange over a fresh connection.
///
/// This is the only entry point the upper layers use: open, send,
/// read-to-close. The connection never outlives the call.
///
/// # Errors
///
/// Propagates connect, I/O, and timeout errors from the exchange.
pub fn round_trip(
    host: &str,
    port: u16,
    timeout: Duration,
    request: &str,
) -> Result<Vec<String>, WireError> {
    tracing::trace!(host, port, len = request.len(), "Wire round-trip");
    let mut conn = Connection::open(host, port, timeout)?;
    conn.send(request)?;
    conn.read_reply()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn open_fails_for_unbound_port() {
        // Bind and immediately drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Connection::open("127.0.0.1", port, Duration::from_millis(200));
        assert!(matches!(result, Err(WireError::Connect { .. })));
    }

    #[test]
    fn round_trip_echoes_peer_output() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut request = String::new();
            conn.read_to_string(&mut request).unwrap();
            conn.write_all(b"hello\nworld\n").unwrap();
            request
        });

        let reply = round_trip("127.0.0.1", port, Duration::from_secs(5), "print(1)").unwrap();
        assert_eq!(reply, vec!["hello".to_string(), "world".to_string()]);

        let request = server.join().unwrap();
        assert_eq!(request, "print(1)\n");
    }

    #[test]
    fn read_reply_times_out_when_peer_stays_silent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            // Hold the connection open without replying.
            std::thread::sleep(Duration::from_millis(500));
            drop(conn);
        });

        let result = round_trip("127.0.0.1", port, Duration::from_millis(100), "x = 1");
        assert!(matches!(result, Err(WireError::Timeout(100))));
        server.join().unwrap();
    }

    #[test]
    fn empty_reply_yields_empty_vec() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut request = String::new();
            conn.read_to_string(&mut request).unwrap();
        });

        let reply = round_trip("127.0.0.1", port, Duration::from_secs(5), "x = 1").unwrap();
        assert!(reply.is_empty());
        server.join().unwrap();
    }
}
