use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error};

use crate::config::ReplicaConfig;
use crate::protocol::{
    capabilities, compute_auth_response, is_eof_packet, is_err_packet, is_ok_packet,
    read_lenenc_int, ErrPacket, HandshakeResponse, InitialHandshake, Packet, PacketCodec,
    ResultSet, ResultSetError,
};

/// A single client connection to a MySQL server
pub struct BackendConnection {
    framed: Framed<TcpStream, PacketCodec>,
    /// Set once a send or receive fails
    closed: bool,
    /// Negotiated capability flags
    capabilities: u32,
    server_version: String,
}

impl BackendConnection {
    /// Connect and authenticate against the configured server
    pub async fn connect(config: &ReplicaConfig) -> Result<Self, ConnectionError> {
        let addr = config.addr();
        debug!(addr = %addr, "Connecting to replica");

        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "Failed to connect to replica");
            ConnectionError::Connect(e.to_string())
        })?;
        stream.set_nodelay(true).ok();

        let mut framed = Framed::new(stream, PacketCodec);

        let handshake_packet = framed
            .next()
            .await
            .ok_or(ConnectionError::Disconnected)?
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if is_err_packet(&handshake_packet.payload) {
            // Server refused before handshake (e.g. too many connections, host blocked)
            let err = ErrPacket::parse(&handshake_packet.payload, 0)
                .unwrap_or_else(|| ErrPacket::new(1040, "HY000", "Connection refused"));
            return Err(ConnectionError::Connect(err.error_message));
        }

        let server_handshake = InitialHandshake::parse(&handshake_packet.payload)
            .ok_or_else(|| ConnectionError::Protocol("Invalid server handshake".into()))?;

        debug!(
            server_version = %server_handshake.server_version,
            auth_plugin = %server_handshake.auth_plugin_name,
            "Received server handshake"
        );

        let auth_data = server_handshake.auth_plugin_data();
        let auth_response = compute_auth_response(&config.password, &auth_data);

        let caps = capabilities::DEFAULT_CAPABILITIES & server_handshake.capability_flags;

        let response = HandshakeResponse {
            capability_flags: caps,
            max_packet_size: 16 * 1024 * 1024,
            character_set: 0x21, // utf8_general_ci
            username: config.user.clone(),
            auth_response,
            database: None,
            auth_plugin_name: server_handshake.auth_plugin_name.clone(),
        };

        framed
            .send(response.encode(handshake_packet.sequence_id.wrapping_add(1)))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let reply = framed
            .next()
            .await
            .ok_or(ConnectionError::Disconnected)?
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if is_err_packet(&reply.payload) {
            let err = ErrPacket::parse(&reply.payload, caps)
                .unwrap_or_else(|| ErrPacket::new(1045, "28000", "Access denied"));
            error!(
                addr = %addr,
                error_code = err.error_code,
                error_message = %err.error_message,
                "Replica authentication failed"
            );
            return Err(ConnectionError::Auth(err.error_message));
        }

        if !is_ok_packet(&reply.payload) {
            // Most commonly an auth switch request to caching_sha2_password
            return Err(ConnectionError::Protocol(format!(
                "Expected OK packet after handshake (server plugin {})",
                server_handshake.auth_plugin_name
            )));
        }

        debug!(addr = %addr, "Replica authentication successful");

        Ok(Self {
            framed,
            closed: false,
            capabilities: caps,
            server_version: server_handshake.server_version,
        })
    }

    /// Run a text protocol query and collect its full result set.
    ///
    /// Statements that return no result set (OK packet) yield an empty set.
    pub async fn query(&mut self, sql: &str) -> Result<ResultSet, ConnectionError> {
        self.send(Packet::query(sql)).await?;

        let first = self.recv().await?;
        if is_err_packet(&first.payload) {
            return Err(self.query_error(&first));
        }
        if is_ok_packet(&first.payload) {
            return Ok(ResultSet::default());
        }

        let (column_count, _) = match read_lenenc_int(&first.payload) {
            Ok(v) => v,
            Err(e) => return Err(self.protocol_failure(e)),
        };
        let column_count = column_count as usize;

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let def = self.recv().await?;
            match ResultSet::parse_column_name(&def.payload) {
                Ok(name) => columns.push(name),
                Err(e) => return Err(self.protocol_failure(e)),
            }
        }

        // EOF after column definitions
        let eof = self.recv().await?;
        if !is_eof_packet(&eof.payload, self.capabilities) {
            self.closed = true;
            return Err(ConnectionError::Protocol(
                "Expected EOF after column definitions".into(),
            ));
        }

        let mut rows = Vec::new();
        loop {
            let packet = self.recv().await?;
            if is_eof_packet(&packet.payload, self.capabilities) {
                break;
            }
            if is_err_packet(&packet.payload) {
                return Err(self.query_error(&packet));
            }
            match ResultSet::parse_row(&packet.payload, column_count) {
                Ok(row) => rows.push(row),
                Err(e) => return Err(self.protocol_failure(e)),
            }
        }

        Ok(ResultSet { columns, rows })
    }

    /// The rest of the result set is still in flight, so the stream is unusable
    fn protocol_failure(&mut self, e: ResultSetError) -> ConnectionError {
        self.closed = true;
        ConnectionError::Protocol(e.to_string())
    }

    fn query_error(&self, packet: &Packet) -> ConnectionError {
        let err = ErrPacket::parse(&packet.payload, self.capabilities)
            .unwrap_or_else(|| ErrPacket::new(1105, "HY000", "Unknown error"));
        ConnectionError::Query(err.to_string())
    }

    /// Send a packet to the server
    pub async fn send(&mut self, packet: Packet) -> Result<(), ConnectionError> {
        match self.framed.send(packet).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.closed = true;
                Err(ConnectionError::Io(e.to_string()))
            }
        }
    }

    /// Receive a packet from the server
    pub async fn recv(&mut self) -> Result<Packet, ConnectionError> {
        match self.framed.next().await {
            Some(Ok(packet)) => Ok(packet),
            Some(Err(e)) => {
                self.closed = true;
                Err(ConnectionError::Io(e.to_string()))
            }
            None => {
                self.closed = true;
                Err(ConnectionError::Disconnected)
            }
        }
    }

    /// Check if connection is usable
    pub fn is_usable(&self) -> bool {
        !self.closed
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }
}

/// Connection errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Connection disconnected")]
    Disconnected,
}

impl ConnectionError {
    /// Whether the connection that produced this error can still be used
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConnectionError::Query(_))
    }
}
