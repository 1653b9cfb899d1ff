//! Byte-stream transport beneath the protocol client.
//!
//! The [`Transport`] trait is the seam between the protocol state machine and
//! the network: it exposes connect, line-oriented reads, raw writes and close.
//! [`TcpTransport`] is the production implementation; tests substitute
//! scripted or mocked transports.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use faktory_config::{ServerEndpoint, default_timeout};

use crate::error::TransportError;

/// Duplex, line-oriented channel to the server.
pub trait Transport {
    /// Opens the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Resolve`] or [`TransportError::Connect`] when
    /// the server is unreachable.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Reads one line, including its `\r\n` terminator.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the peer closed the stream and
    /// [`TransportError::Read`] on I/O failures or timeouts.
    fn read_line(&mut self) -> Result<String, TransportError>;

    /// Writes the given bytes and flushes them.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Write`] when the stream rejects the bytes.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Closes the connection. Closing an unconnected transport is a no-op.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        (**self).read_line()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn close(&mut self) {
        (**self).close();
    }
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

/// TCP transport with connect, read and write timeouts.
pub struct TcpTransport {
    endpoint: ServerEndpoint,
    timeout: Duration,
    connection: Option<Connection>,
}

impl TcpTransport {
    /// Creates an unconnected transport for the endpoint.
    #[must_use]
    pub fn new(endpoint: ServerEndpoint) -> Self {
        Self {
            endpoint,
            timeout: default_timeout(),
            connection: None,
        }
    }

    /// Overrides the timeout applied to connect, read and write calls.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint this transport connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    fn open(&self) -> Result<Connection, TransportError> {
        let endpoint_display = self.endpoint.to_string();
        let address = resolve_tcp_address(self.endpoint.host(), self.endpoint.port()).map_err(
            |source| TransportError::Resolve {
                endpoint: endpoint_display.clone(),
                source: Arc::new(source),
            },
        )?;

        let connect_error = |source: io::Error| TransportError::Connect {
            endpoint: endpoint_display.clone(),
            source: Arc::new(source),
        };
        let stream = TcpStream::connect_timeout(&address, self.timeout).map_err(connect_error)?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(connect_error)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(connect_error)?;
        stream.set_nodelay(true).map_err(connect_error)?;
        let writer = stream.try_clone().map_err(connect_error)?;

        Ok(Connection {
            reader: BufReader::new(stream),
            writer,
        })
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.connection.is_none() {
            self.connection = Some(self.open()?);
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        let mut line = String::new();
        let bytes_read = connection
            .reader
            .read_line(&mut line)
            .map_err(TransportError::read)?;
        if bytes_read == 0 {
            return Err(TransportError::Closed);
        }
        Ok(line)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        connection
            .writer
            .write_all(bytes)
            .map_err(TransportError::write)?;
        connection.writer.flush().map_err(TransportError::write)
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            // The peer may already have gone away; shutdown errors carry no
            // information the caller could act on.
            drop(connection.writer.shutdown(Shutdown::Both));
        }
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}
