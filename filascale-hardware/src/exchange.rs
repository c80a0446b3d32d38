//! Exchange engine
//!
//! One request, one reply, with a bounded number of attempts at reading a
//! clean frame. Quiet or garbled lines are retried; a vanished device ends
//! the exchange at once and leaves the connection Disconnected.

use filascale_core::{
    FilaScaleError, MessageType, Result, StatusRecord, CRC_LEN, HEADER_LEN, SYNC_BYTE,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::{decode, parse_header, Frame};
use crate::connection::ConnectionManager;
use crate::session::SerialSession;

/// Request/reply driver over a `ConnectionManager`
pub struct ExchangeEngine {
    connection: ConnectionManager,
}

impl ExchangeEngine {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.connection
    }

    pub fn connect(&mut self) -> Result<String> {
        self.connection.connect()
    }

    pub fn disconnect(&mut self) {
        self.connection.disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub async fn reset_device(&mut self) -> Result<()> {
        self.connection.reset_device().await
    }

    /// Send one request frame and wait for one clean reply frame.
    ///
    /// Requires an open session. Transient read failures consume an attempt;
    /// `ConnectionLost` disconnects and returns immediately. After the
    /// configured number of attempts the result is `RetriesExhausted`.
    pub async fn exchange(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
    ) -> Result<(MessageType, Vec<u8>)> {
        let attempts = self.connection.timing().retries;
        let session = self.connection.session_mut()?;

        let request = Frame::new(message_type, payload)?;
        debug!(
            "Sending {} request ({} byte payload) on {}",
            message_type,
            payload.len(),
            session.port()
        );

        session.drain().await;
        let written = session.write(&request.to_bytes()).await;
        if let Err(e) = written {
            return Err(self.on_failure(e));
        }

        for attempt in 1..=attempts {
            let session = self.connection.session_mut()?;
            let received = receive_frame(session).await;
            match received {
                Ok((reply_type, reply)) => {
                    debug!(
                        "Received {} reply ({} bytes) on attempt {}/{}",
                        reply_type,
                        reply.len(),
                        attempt,
                        attempts
                    );
                    return Ok((reply_type, reply));
                }
                Err(FilaScaleError::NoData) => {
                    debug!("No reply yet (attempt {}/{})", attempt, attempts);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Discarding garbled frame (attempt {}/{}): {}",
                        attempt, attempts, e
                    );
                }
                Err(e) => return Err(self.on_failure(e)),
            }
        }

        warn!("No clean {} reply after {} attempts", message_type, attempts);
        Err(FilaScaleError::RetriesExhausted { attempts })
    }

    /// Ask for a status record.
    pub async fn request_status(&mut self) -> Result<StatusRecord> {
        let (reply_type, payload) = self.exchange(MessageType::Status, &[]).await?;
        if reply_type != MessageType::Status {
            return Err(FilaScaleError::UnexpectedReply {
                expected: MessageType::Status,
                received: reply_type,
            });
        }
        StatusRecord::from_payload(&payload)
    }

    /// Send a JSON configuration document, e.g. scale calibration.
    pub async fn send_config(
        &mut self,
        config: &serde_json::Value,
    ) -> Result<(MessageType, Vec<u8>)> {
        let payload = serde_json::to_vec(config)?;
        // Reject oversize documents here rather than in the encoder
        let frame = Frame::new(MessageType::Config, payload)?;
        info!("Sending configuration: {}", config);
        self.exchange(frame.message_type(), frame.payload()).await
    }

    /// Start measuring
    pub async fn start(&mut self) -> Result<(MessageType, Vec<u8>)> {
        self.exchange(MessageType::Start, &[]).await
    }

    /// Stop measuring
    pub async fn stop(&mut self) -> Result<(MessageType, Vec<u8>)> {
        self.exchange(MessageType::Stop, &[]).await
    }

    fn on_failure(&mut self, err: FilaScaleError) -> FilaScaleError {
        if matches!(err, FilaScaleError::ConnectionLost(_)) {
            warn!("Lost FilaScale mid-exchange: {}", err);
            self.connection.disconnect();
        }
        err
    }
}

/// Read one frame: sync search, header, payload, CRC, then validate.
async fn receive_frame(session: &mut SerialSession) -> Result<(MessageType, Vec<u8>)> {
    let deadline = Instant::now() + session.timing().read_timeout;
    let mut skipped = 0usize;
    loop {
        let byte = session.read_exact(1).await?;
        if byte[0] == SYNC_BYTE {
            break;
        }
        skipped += 1;
        if Instant::now() >= deadline {
            debug!("No sync byte in {} bytes", skipped);
            return Err(FilaScaleError::NoData);
        }
    }
    if skipped > 0 {
        debug!("Skipped {} bytes before sync", skipped);
    }

    let header = read_part(session, HEADER_LEN).await?;
    let (_, length) = parse_header(&header)?;
    let body = read_part(session, length).await?;
    let crc = read_part(session, CRC_LEN).await?;

    let mut frame = Vec::with_capacity(1 + HEADER_LEN + length + CRC_LEN);
    frame.push(SYNC_BYTE);
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&crc);
    decode(&frame)
}

/// Read a frame section that must arrive in full once a sync byte was seen.
async fn read_part(session: &mut SerialSession, n: usize) -> Result<Vec<u8>> {
    let bytes = match session.read_exact(n).await {
        Ok(bytes) => bytes,
        Err(FilaScaleError::NoData) => Vec::new(),
        Err(e) => return Err(e),
    };
    if bytes.len() < n {
        return Err(FilaScaleError::ShortMsg {
            expected: n,
            received: bytes.len(),
        });
    }
    Ok(bytes)
}
