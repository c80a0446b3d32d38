//! Connection manager
//!
//! Composes port resolution and serial sessions into a two-state machine.
//! At most one session is open; connecting again closes the old one first.

use filascale_core::{ConnectionConfig, FilaScaleError, LinkTiming, Result};
use tracing::{debug, info, warn};

use crate::ports::{resolve_candidates, PortEnumerator, SystemPorts};
use crate::session::{NativeOpener, PortOpener, SerialSession};

/// Invoked with the port path after every successful connect
pub type ConnectedCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Connection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A session is open
    Connected,
    /// No session
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

/// Owns the (single) serial session to the device
pub struct ConnectionManager {
    config: ConnectionConfig,
    timing: LinkTiming,
    enumerator: Box<dyn PortEnumerator>,
    opener: Box<dyn PortOpener>,
    session: Option<SerialSession>,
    on_connected: Option<ConnectedCallback>,
}

impl ConnectionManager {
    /// Manager over the host's real serial ports
    pub fn new(config: ConnectionConfig, timing: LinkTiming) -> Self {
        Self::with_io(
            config,
            timing,
            Box::new(SystemPorts),
            Box::new(NativeOpener),
        )
    }

    /// Manager over custom port discovery and opening
    pub fn with_io(
        config: ConnectionConfig,
        timing: LinkTiming,
        enumerator: Box<dyn PortEnumerator>,
        opener: Box<dyn PortOpener>,
    ) -> Self {
        Self {
            config,
            timing,
            enumerator,
            opener,
            session: None,
            on_connected: None,
        }
    }

    /// Subscribe to "device connected on path P"
    pub fn set_connected_callback(&mut self, callback: ConnectedCallback) {
        self.on_connected = Some(callback);
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn timing(&self) -> &LinkTiming {
        &self.timing
    }

    /// Ports a connect would try, in order
    pub fn candidates(&self) -> Vec<String> {
        resolve_candidates(
            self.enumerator.as_ref(),
            self.config.preferred_port.as_deref(),
            self.config.excluded_port.as_deref(),
        )
    }

    /// One pass over the candidate list.
    ///
    /// Every candidate is tried until one opens. If none does, fails with
    /// the first hard open error, or `NoConnection` when every port was
    /// merely unavailable.
    pub fn connect(&mut self) -> Result<String> {
        if self.session.is_some() {
            self.disconnect();
        }

        let candidates = self.candidates();
        if candidates.is_empty() {
            debug!("No candidate ports for FilaScale");
            return Err(FilaScaleError::NoConnection);
        }

        let mut first_error = None;
        for port in candidates {
            match SerialSession::open(
                self.opener.as_ref(),
                &port,
                self.config.baud_rate,
                self.timing,
            ) {
                Ok(session) => {
                    info!("Connected to FilaScale on {}", port);
                    self.session = Some(session);
                    if let Some(callback) = &self.on_connected {
                        callback(&port);
                    }
                    return Ok(port);
                }
                Err(FilaScaleError::PortUnavailable { port, reason }) => {
                    debug!("Port {} unavailable: {}", port, reason);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", port, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or(FilaScaleError::NoConnection))
    }

    /// Close the session if one is open
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Disconnected from FilaScale on {}", session.port());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Port of the open session
    pub fn port(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.port())
    }

    /// The open session, or `NoConnection`
    pub fn session_mut(&mut self) -> Result<&mut SerialSession> {
        self.session.as_mut().ok_or(FilaScaleError::NoConnection)
    }

    /// Pulse the device's reset line. Does nothing while disconnected.
    ///
    /// A failing control line means the device is gone and the session is
    /// torn down.
    pub async fn reset_device(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            debug!("Reset skipped: not connected");
            return Ok(());
        };

        let result = session.pulse_reset().await;
        if let Err(e) = &result {
            warn!("Reset failed: {}", e);
            self.disconnect();
        }
        result
    }
}
