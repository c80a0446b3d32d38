//! Serial session for low-level device I/O
//!
//! Owns one open serial handle (8N1, no flow control) and provides bounded
//! reads, writes, the reset pulse and input draining.

use async_trait::async_trait;
use filascale_core::{FilaScaleError, LinkTiming, Result};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};

use crate::codec::bytes_to_hex;

/// Byte-level access to a serial device
///
/// This trait enables testing of sessions, connections and exchanges
/// without real hardware by allowing scripted implementations.
#[async_trait]
pub trait SerialLink: Send {
    /// Read whatever is available into `buf`; `Ok(0)` means the device hung up
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Hand some bytes to the driver
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Wait until written bytes left the driver
    async fn flush(&mut self) -> io::Result<()>;

    /// Drive the reset control line (RTS); `false` holds the device in reset
    fn set_reset_line(&mut self, level: bool) -> io::Result<()>;

    /// Bytes waiting in the input buffer
    fn bytes_pending(&self) -> io::Result<u32>;

    /// Throw away buffered input
    fn discard_input(&mut self) -> io::Result<()>;
}

/// Opens serial links by path
pub trait PortOpener: Send + Sync {
    fn open(&self, path: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>>;
}

/// `SerialLink` over a real `tokio_serial` stream
pub struct NativeLink {
    stream: SerialStream,
}

#[async_trait]
impl SerialLink for NativeLink {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AsyncReadExt::read(&mut self.stream, buf).await
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        AsyncWriteExt::write(&mut self.stream, buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(&mut self.stream).await
    }

    fn set_reset_line(&mut self, level: bool) -> io::Result<()> {
        SerialPort::write_request_to_send(&mut self.stream, level).map_err(io::Error::from)
    }

    fn bytes_pending(&self) -> io::Result<u32> {
        SerialPort::bytes_to_read(&self.stream).map_err(io::Error::from)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        SerialPort::clear(&self.stream, tokio_serial::ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Opens real serial ports with the FilaScale line settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOpener;

impl PortOpener for NativeOpener {
    fn open(&self, path: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        debug!("Opening serial port: {} @ {}", path, baud_rate);

        let stream = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| classify_open_error(path, &e))?;

        Ok(Box::new(NativeLink { stream }))
    }
}

/// Map an open failure to "try the next port" or a hard error.
pub fn classify_open_error(port: &str, err: &tokio_serial::Error) -> FilaScaleError {
    use tokio_serial::ErrorKind;

    let unavailable = match err.kind() {
        ErrorKind::NoDevice => true,
        ErrorKind::Io(kind) => matches!(
            kind,
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
        ),
        _ => false,
    } || err.description.to_lowercase().contains("busy");

    if unavailable {
        FilaScaleError::PortUnavailable {
            port: port.to_string(),
            reason: err.description.clone(),
        }
    } else {
        error!("Failed to open serial port {}: {}", port, err);
        FilaScaleError::Serial(format!("Failed to open serial port {}: {}", port, err))
    }
}

/// Read errors that are retried in place rather than ending the session
fn is_retryable(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
}

/// One open serial device
pub struct SerialSession {
    link: Box<dyn SerialLink>,
    port: String,
    timing: LinkTiming,
}

impl std::fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSession")
            .field("port", &self.port)
            .field("timing", &self.timing)
            .finish()
    }
}

impl SerialSession {
    /// Open `path` through `opener`.
    ///
    /// Fails with `PortUnavailable` if the node is missing or claimed,
    /// `Serial` for anything else.
    pub fn open(
        opener: &dyn PortOpener,
        path: &str,
        baud_rate: u32,
        timing: LinkTiming,
    ) -> Result<Self> {
        let link = opener.open(path, baud_rate)?;
        debug!("Serial port {} opened successfully", path);
        Ok(Self::from_link(link, path, timing))
    }

    /// Wrap an already open link.
    pub fn from_link(link: Box<dyn SerialLink>, path: &str, timing: LinkTiming) -> Self {
        Self {
            link,
            port: path.to_string(),
            timing,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn timing(&self) -> &LinkTiming {
        &self.timing
    }

    /// Accumulate up to `n` bytes.
    ///
    /// Stops early once a read timeout passes without new bytes. Zero bytes
    /// in total is `NoData`; a short buffer is returned as-is for the caller
    /// to judge. Any driver error other than an interrupted/would-block read
    /// is `ConnectionLost`.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            match timeout(self.timing.read_timeout, self.link.read(&mut buf[filled..])).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    warn!(
                        "Serial port {} returned EOF - device may have been disconnected",
                        self.port
                    );
                    return Err(FilaScaleError::ConnectionLost(format!(
                        "{} returned EOF",
                        self.port
                    )));
                }
                Ok(Ok(count)) => filled += count,
                Ok(Err(e)) if is_retryable(e.kind()) => continue,
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => break,
                Ok(Err(e)) => {
                    warn!("Read error on {}: {}", self.port, e);
                    return Err(FilaScaleError::ConnectionLost(format!(
                        "Read error on {}: {}",
                        self.port, e
                    )));
                }
            }
        }

        if filled == 0 && n > 0 {
            return Err(FilaScaleError::NoData);
        }

        buf.truncate(filled);
        if self.timing.debug_uart {
            debug!("RX: {}", bytes_to_hex(&buf));
        }
        Ok(buf)
    }

    /// Write all of `bytes`, bounded by the write timeout.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.timing.debug_uart {
            debug!("TX: {}", bytes_to_hex(bytes));
        }

        let link = &mut self.link;
        let result = timeout(self.timing.write_timeout, async {
            let mut written = 0;
            while written < bytes.len() {
                match link.write(&bytes[written..]).await {
                    Ok(0) => {
                        return Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "driver accepted no bytes",
                        ))
                    }
                    Ok(count) => written += count,
                    Err(e) if is_retryable(e.kind()) => continue,
                    Err(e) => return Err(e),
                }
            }
            link.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("Write failed on {}: {}", self.port, e);
                Err(FilaScaleError::ConnectionLost(format!(
                    "Write failed on {}: {}",
                    self.port, e
                )))
            }
            Err(_) => {
                warn!("Write timeout on {}", self.port);
                Err(FilaScaleError::ConnectionLost(format!(
                    "Write to {} timed out",
                    self.port
                )))
            }
        }
    }

    /// Hold the reset line low, release it, then wait for the device to boot.
    pub async fn pulse_reset(&mut self) -> Result<()> {
        info!(
            "Resetting device on {} (hold {:?}, settle {:?})",
            self.port, self.timing.reset_hold, self.timing.reset_settle
        );

        self.link.set_reset_line(false).map_err(|e| {
            FilaScaleError::ConnectionLost(format!("Failed to assert reset: {}", e))
        })?;
        sleep(self.timing.reset_hold).await;

        self.link.set_reset_line(true).map_err(|e| {
            FilaScaleError::ConnectionLost(format!("Failed to release reset: {}", e))
        })?;
        sleep(self.timing.reset_settle).await;

        Ok(())
    }

    /// Best-effort discard of stale input so an old reply is never taken
    /// for the answer to a new request.
    pub async fn drain(&mut self) {
        let pending = match self.link.bytes_pending() {
            Ok(pending) => pending as usize,
            Err(e) => {
                debug!("Could not query pending input on {}: {}", self.port, e);
                return;
            }
        };
        if pending == 0 {
            return;
        }

        let mut residue = vec![0u8; pending];
        if let Ok(Ok(count)) = timeout(self.timing.read_timeout, self.link.read(&mut residue)).await
        {
            residue.truncate(count);
            warn!(
                "FilaScale on {} is drooling ({} stale bytes). Flushing input.",
                self.port, count
            );
            debug!("Residue: {}", bytes_to_hex(&residue));
        }

        if let Err(e) = self.link.discard_input() {
            debug!("Failed to clear input buffer on {}: {}", self.port, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_timing, ScriptedLink};
    use std::time::Duration;

    fn session(link: &ScriptedLink) -> SerialSession {
        SerialSession::from_link(Box::new(link.clone()), "/dev/ttyUSB0", test_timing())
    }

    #[tokio::test]
    async fn test_read_exact_accumulates_chunks() {
        let link = ScriptedLink::new();
        link.queue_bytes(&[1, 2]);
        link.queue_bytes(&[3]);
        link.queue_bytes(&[4, 5]);

        let mut session = session(&link);
        assert_eq!(session.read_exact(5).await.unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_read_exact_no_data() {
        let link = ScriptedLink::new();
        let mut session = session(&link);

        let err = session.read_exact(3).await.unwrap_err();
        assert!(matches!(err, FilaScaleError::NoData));
    }

    #[tokio::test]
    async fn test_read_exact_short_is_not_an_error() {
        let link = ScriptedLink::new();
        link.queue_bytes(&[9, 8]);

        let mut session = session(&link);
        assert_eq!(session.read_exact(4).await.unwrap(), vec![9, 8]);
    }

    #[tokio::test]
    async fn test_read_exact_leaves_extra_bytes_queued() {
        let link = ScriptedLink::new();
        link.queue_bytes(&[1, 2, 3, 4]);

        let mut session = session(&link);
        assert_eq!(session.read_exact(1).await.unwrap(), vec![1]);
        assert_eq!(session.read_exact(3).await.unwrap(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_read_exact_retries_interrupted() {
        let link = ScriptedLink::new();
        link.queue_error(io::ErrorKind::Interrupted);
        link.queue_error(io::ErrorKind::WouldBlock);
        link.queue_bytes(&[7]);

        let mut session = session(&link);
        assert_eq!(session.read_exact(1).await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_read_exact_driver_error_is_connection_lost() {
        let link = ScriptedLink::new();
        link.queue_error(io::ErrorKind::BrokenPipe);

        let mut session = session(&link);
        let err = session.read_exact(1).await.unwrap_err();
        assert!(matches!(err, FilaScaleError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn test_read_exact_eof_is_connection_lost() {
        let link = ScriptedLink::new();
        link.queue_eof();

        let mut session = session(&link);
        let err = session.read_exact(1).await.unwrap_err();
        assert!(matches!(err, FilaScaleError::ConnectionLost(msg) if msg.contains("EOF")));
    }

    #[tokio::test]
    async fn test_read_exact_timed_out_error_ends_read() {
        let link = ScriptedLink::new();
        link.queue_bytes(&[1]);
        link.queue_error(io::ErrorKind::TimedOut);
        link.queue_bytes(&[2]);

        let mut session = session(&link);
        assert_eq!(session.read_exact(2).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_write_records_bytes() {
        let link = ScriptedLink::new();
        let mut session = session(&link);

        session.write(&[0x55, 0x00, 0x00, 0x00]).await.unwrap();
        assert_eq!(link.written(), vec![vec![0x55, 0x00, 0x00, 0x00]]);
    }

    #[tokio::test]
    async fn test_write_failure_is_connection_lost() {
        let link = ScriptedLink::new();
        link.fail_writes(io::ErrorKind::BrokenPipe);

        let mut session = session(&link);
        let err = session.write(&[0x55]).await.unwrap_err();
        assert!(matches!(err, FilaScaleError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn test_stalled_write_times_out_as_connection_lost() {
        let link = ScriptedLink::new();
        link.stall_writes();

        let mut session = session(&link);
        let started = tokio::time::Instant::now();
        let err = session.write(&[0x55, 0x00, 0x00, 0x00]).await.unwrap_err();

        assert!(matches!(err, FilaScaleError::ConnectionLost(msg) if msg.contains("timed out")));
        assert!(started.elapsed() >= test_timing().write_timeout);
        assert!(link.written().is_empty());
    }

    #[tokio::test]
    async fn test_pulse_reset_toggles_line() {
        let link = ScriptedLink::new();
        let mut session = session(&link);

        session.pulse_reset().await.unwrap();
        assert_eq!(link.reset_levels(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_drain_discards_pending_input() {
        let link = ScriptedLink::new();
        link.queue_bytes(&[0xDE, 0xAD]);

        let mut session = session(&link);
        session.drain().await;

        assert_eq!(link.pending(), 0);
        let err = session.read_exact(1).await.unwrap_err();
        assert!(matches!(err, FilaScaleError::NoData));
    }

    #[tokio::test]
    async fn test_drain_with_nothing_pending() {
        let link = ScriptedLink::new();
        let mut session = session(&link);

        session.drain().await;
        assert_eq!(link.read_calls(), 0);
    }

    #[test]
    fn test_classify_open_error_no_device() {
        let err = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "No such device");
        assert!(matches!(
            classify_open_error("/dev/ttyUSB3", &err),
            FilaScaleError::PortUnavailable { port, .. } if port == "/dev/ttyUSB3"
        ));
    }

    #[test]
    fn test_classify_open_error_not_found() {
        let err = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(io::ErrorKind::NotFound),
            "No such file or directory",
        );
        assert!(matches!(
            classify_open_error("/dev/ttyUSB0", &err),
            FilaScaleError::PortUnavailable { .. }
        ));
    }

    #[test]
    fn test_classify_open_error_busy() {
        let err = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(io::ErrorKind::Other),
            "Device or resource busy",
        );
        assert!(matches!(
            classify_open_error("/dev/ttyUSB0", &err),
            FilaScaleError::PortUnavailable { .. }
        ));
    }

    #[test]
    fn test_classify_open_error_other_is_serial() {
        let err = tokio_serial::Error::new(
            tokio_serial::ErrorKind::InvalidInput,
            "Unsupported baud rate",
        );
        assert!(matches!(
            classify_open_error("/dev/ttyUSB0", &err),
            FilaScaleError::Serial(_)
        ));
    }

    #[test]
    fn test_test_timing_is_fast() {
        assert!(test_timing().read_timeout <= Duration::from_millis(50));
    }
}
