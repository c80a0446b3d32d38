//! Candidate port discovery
//!
//! Produces the ordered list of serial ports a connection attempt walks
//! through. The printer's own port is never part of it.

use filascale_core::{FilaScaleError, Result};
use tracing::{debug, warn};

/// Source of OS-visible serial device paths
pub trait PortEnumerator: Send + Sync {
    /// All USB-serial device paths currently present
    fn enumerate(&self) -> Result<Vec<String>>;
}

/// Enumerates the host's serial ports through `tokio_serial`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn enumerate(&self) -> Result<Vec<String>> {
        let ports = tokio_serial::available_ports().map_err(|e| {
            FilaScaleError::Serial(format!("Failed to enumerate serial ports: {}", e))
        })?;

        let mut names: Vec<String> = ports
            .into_iter()
            .filter(|port| {
                is_usb_serial_name(&port.port_name)
                    || matches!(port.port_type, tokio_serial::SerialPortType::UsbPort(_))
            })
            .map(|port| port.port_name)
            .collect();
        names.sort();
        names.dedup();

        debug!("Enumerated USB serial ports: {:?}", names);
        Ok(names)
    }
}

/// Whether a device path follows the platform's USB-serial naming.
pub fn is_usb_serial_name(path: &str) -> bool {
    path.starts_with("/dev/ttyUSB") || path.starts_with("/dev/ttyACM")
}

/// Apply preferred/excluded policy to an enumeration.
///
/// The excluded path is removed. The preferred path, if enumerated, moves to
/// the front; everything else keeps enumeration order. An excluded path
/// wins over the same path given as preferred.
pub fn order_candidates(
    enumerated: Vec<String>,
    preferred: Option<&str>,
    excluded: Option<&str>,
) -> Vec<String> {
    let mut remaining: Vec<String> = enumerated
        .into_iter()
        .filter(|port| Some(port.as_str()) != excluded)
        .collect();

    if let Some(preferred) = preferred {
        if let Some(pos) = remaining.iter().position(|port| port == preferred) {
            let port = remaining.remove(pos);
            remaining.insert(0, port);
        }
    }

    remaining
}

/// Ordered candidate ports for one connection attempt.
///
/// An enumeration failure yields no candidates; the caller treats that the
/// same as an empty bus.
pub fn resolve_candidates(
    enumerator: &dyn PortEnumerator,
    preferred: Option<&str>,
    excluded: Option<&str>,
) -> Vec<String> {
    let enumerated = match enumerator.enumerate() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Port enumeration failed: {}", e);
            return Vec::new();
        }
    };

    if let Some(excluded) = excluded {
        if enumerated.iter().any(|port| port == excluded) {
            debug!("Excluding printer port {}", excluded);
        }
    }

    let candidates = order_candidates(enumerated, preferred, excluded);
    debug!("Candidate ports: {:?}", candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticPorts;

    fn ports(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_excluded_removed() {
        let result = order_candidates(
            ports(&["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2"]),
            None,
            Some("/dev/ttyUSB0"),
        );
        assert_eq!(result, ports(&["/dev/ttyUSB1", "/dev/ttyUSB2"]));
    }

    #[test]
    fn test_preferred_moved_first() {
        let result = order_candidates(
            ports(&["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2"]),
            Some("/dev/ttyUSB2"),
            None,
        );
        assert_eq!(
            result,
            ports(&["/dev/ttyUSB2", "/dev/ttyUSB0", "/dev/ttyUSB1"])
        );
    }

    #[test]
    fn test_preferred_and_excluded() {
        let result = order_candidates(
            ports(&["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyACM0"]),
            Some("/dev/ttyUSB1"),
            Some("/dev/ttyUSB0"),
        );
        assert_eq!(result, ports(&["/dev/ttyUSB1", "/dev/ttyACM0"]));
    }

    #[test]
    fn test_preferred_not_enumerated_is_ignored() {
        let result = order_candidates(
            ports(&["/dev/ttyUSB0", "/dev/ttyUSB1"]),
            Some("/dev/ttyUSB7"),
            None,
        );
        assert_eq!(result, ports(&["/dev/ttyUSB0", "/dev/ttyUSB1"]));
    }

    #[test]
    fn test_exclusion_beats_preference() {
        let result = order_candidates(
            ports(&["/dev/ttyUSB0", "/dev/ttyUSB1"]),
            Some("/dev/ttyUSB0"),
            Some("/dev/ttyUSB0"),
        );
        assert_eq!(result, ports(&["/dev/ttyUSB1"]));
    }

    #[test]
    fn test_only_excluded_port_yields_empty() {
        let result = order_candidates(ports(&["/dev/ttyUSB0"]), None, Some("/dev/ttyUSB0"));
        assert!(result.is_empty());
    }

    #[test]
    fn test_policy_invariants_over_permutations() {
        let all = ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2", "/dev/ttyACM0"];
        for preferred in all {
            for excluded in all {
                let result = order_candidates(ports(&all), Some(preferred), Some(excluded));

                assert!(!result.iter().any(|p| p == excluded));
                if preferred != excluded {
                    assert_eq!(result[0], preferred);
                }
                assert_eq!(result.len(), all.len() - 1);
            }
        }
    }

    #[test]
    fn test_resolve_candidates_uses_enumerator() {
        let enumerator = StaticPorts::new(&["/dev/ttyUSB0", "/dev/ttyUSB1"]);
        let result = resolve_candidates(&enumerator, Some("/dev/ttyUSB1"), Some("/dev/ttyUSB0"));
        assert_eq!(result, ports(&["/dev/ttyUSB1"]));
    }

    #[test]
    fn test_resolve_candidates_enumeration_failure_is_empty() {
        let enumerator = StaticPorts::failing();
        assert!(resolve_candidates(&enumerator, None, None).is_empty());
    }

    #[test]
    fn test_usb_serial_names() {
        assert!(is_usb_serial_name("/dev/ttyUSB0"));
        assert!(is_usb_serial_name("/dev/ttyACM3"));
        assert!(!is_usb_serial_name("/dev/ttyS0"));
        assert!(!is_usb_serial_name("COM3"));
    }

    #[test]
    fn test_system_ports_does_not_panic() {
        // Only checks the function runs; there may be no hardware attached
        let _ = SystemPorts.enumerate();
    }
}
