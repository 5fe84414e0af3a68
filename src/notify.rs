//! Decodes parsed notification frames into structured printer events.
//!
//! Decoding is a pure mapping over the command id; presentation of the events
//! is the caller's job. Unknown command ids decode to [`PrinterEvent::Unknown`]
//! rather than an error so a chatty firmware never kills a session.

use std::fmt;

use crate::error::Error;
use crate::protocol::{self, Frame};

/// Printer activity reported by an ok status frame (0xA1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterState {
    Standby,
    Printing,
    FeedingPaper,
    EjectingPaper,
    Unknown(u8),
}

impl PrinterState {
    fn from_code(code: u8) -> Self {
        match code {
            0x0 => PrinterState::Standby,
            0x1 => PrinterState::Printing,
            0x2 => PrinterState::FeedingPaper,
            0x3 => PrinterState::EjectingPaper,
            other => PrinterState::Unknown(other),
        }
    }
}

impl fmt::Display for PrinterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterState::Standby => write!(f, "Standby"),
            PrinterState::Printing => write!(f, "Printing"),
            PrinterState::FeedingPaper => write!(f, "Feeding paper"),
            PrinterState::EjectingPaper => write!(f, "Ejecting paper"),
            PrinterState::Unknown(code) => write!(f, "Unknown (0x{code:02X})"),
        }
    }
}

/// Fault reported by a not-ok status frame.
///
/// The firmware uses two distinct raw codes (0x1 and 0x9) for the no-paper
/// condition; their exact difference is unverified, so both collapse here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterFault {
    NoPaper,
    Overheated,
    LowBattery,
    Unknown(u8),
}

impl PrinterFault {
    fn from_code(code: u8) -> Self {
        match code {
            0x1 | 0x9 => PrinterFault::NoPaper,
            0x4 => PrinterFault::Overheated,
            0x8 => PrinterFault::LowBattery,
            other => PrinterFault::Unknown(other),
        }
    }
}

impl fmt::Display for PrinterFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterFault::NoPaper => write!(f, "No paper"),
            PrinterFault::Overheated => write!(f, "Overheated"),
            PrinterFault::LowBattery => write!(f, "Low battery"),
            PrinterFault::Unknown(code) => write!(f, "Unknown (0x{code:02X})"),
        }
    }
}

/// Full status report from a 0xA1 notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterStatus {
    pub ok: bool,
    pub state: PrinterState,
    pub fault: Option<PrinterFault>,
    pub battery_percent: u8,
    pub temperature: u8,
}

impl PrinterStatus {
    /// Human-readable state or fault line, matching what the printer's
    /// condition actually is.
    pub fn message(&self) -> String {
        match self.fault {
            Some(fault) => fault.to_string(),
            None => self.state.to_string(),
        }
    }
}

/// Physical print-head capability reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintType {
    HighPressure,
    LowPressure,
    Unknown,
}

impl fmt::Display for PrintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintType::HighPressure => write!(f, "High pressure"),
            PrintType::LowPressure => write!(f, "Low pressure"),
            PrintType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One decoded notification. Constructed per received frame and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterEvent {
    Status(PrinterStatus),
    EjectStarted,
    RetractStarted,
    QueryCount([u8; 6]),
    PrintAck { ok: bool },
    PrintComplete,
    Battery(u8),
    PrintTypeReport(PrintType),
    Version { firmware: String, print_type: PrintType },
    Unknown(u8),
}

impl fmt::Display for PrinterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterEvent::Status(s) => write!(
                f,
                "Status: {} ({}), Battery: {}, Temp: {}",
                s.ok,
                s.message(),
                s.battery_percent,
                s.temperature
            ),
            PrinterEvent::EjectStarted => write!(f, "Ejecting paper..."),
            PrinterEvent::RetractStarted => write!(f, "Retracting paper..."),
            PrinterEvent::QueryCount(raw) => {
                write!(f, "Query count:")?;
                for b in raw {
                    write!(f, " {b:02X}")?;
                }
                Ok(())
            }
            PrinterEvent::PrintAck { ok } => {
                write!(f, "Print status: {}", if *ok { "Ok" } else { "Failure" })
            }
            PrinterEvent::PrintComplete => write!(f, "Printing finished."),
            PrinterEvent::Battery(level) => write!(f, "Battery level: {level}"),
            PrinterEvent::PrintTypeReport(t) => write!(f, "Print type: {t}"),
            PrinterEvent::Version { firmware, print_type } => {
                write!(f, "Version: {firmware}, Print type: {print_type}")
            }
            PrinterEvent::Unknown(id) => {
                write!(f, "Received notification for unknown command: 0x{id:02X}")
            }
        }
    }
}

// Status field offsets, relative to the start of the payload region
// (frame offset minus 6).
const STATUS_CODE: usize = 0;
const STATUS_BATTERY: usize = 3;
const STATUS_TEMPERATURE: usize = 4;
const STATUS_OK_FLAG: usize = 6;
const STATUS_ERROR_CODE: usize = 7;

/// Maps a validated frame to its event.
///
/// Returns an error only when a known notification is too short for its
/// fixed-offset fields; callers log that and drop the frame.
pub fn decode_event(frame: &Frame<'_>) -> Result<PrinterEvent, Error> {
    let payload = frame.payload;
    match frame.command_id {
        protocol::CMD_GET_STATUS => {
            if payload.len() <= STATUS_ERROR_CODE {
                return Err(Error::MalformedFrame("status frame too short"));
            }
            let ok = payload[STATUS_OK_FLAG] == 0;
            Ok(PrinterEvent::Status(PrinterStatus {
                ok,
                state: PrinterState::from_code(payload[STATUS_CODE]),
                fault: (!ok).then(|| PrinterFault::from_code(payload[STATUS_ERROR_CODE])),
                battery_percent: payload[STATUS_BATTERY],
                temperature: payload[STATUS_TEMPERATURE],
            }))
        }
        protocol::CMD_EJECT_PAPER => Ok(PrinterEvent::EjectStarted),
        protocol::CMD_RETRACT_PAPER => Ok(PrinterEvent::RetractStarted),
        protocol::CMD_QUERY_COUNT => {
            let raw: [u8; 6] = payload
                .get(..6)
                .and_then(|s| s.try_into().ok())
                .ok_or(Error::MalformedFrame("count frame too short"))?;
            Ok(PrinterEvent::QueryCount(raw))
        }
        protocol::CMD_PRINT => {
            let first = *payload
                .first()
                .ok_or(Error::MalformedFrame("print ack frame too short"))?;
            Ok(PrinterEvent::PrintAck { ok: first == 0 })
        }
        protocol::CMD_PRINT_COMPLETE => Ok(PrinterEvent::PrintComplete),
        protocol::CMD_GET_BATTERY => {
            let level = *payload
                .first()
                .ok_or(Error::MalformedFrame("battery frame too short"))?;
            Ok(PrinterEvent::Battery(level))
        }
        protocol::CMD_GET_PRINT_TYPE => {
            let kind = match payload.first() {
                Some(0x01) => PrintType::HighPressure,
                Some(0xFF) | None => PrintType::Unknown,
                Some(_) => PrintType::LowPressure,
            };
            Ok(PrinterEvent::PrintTypeReport(kind))
        }
        protocol::CMD_GET_VERSION => {
            let len = frame.declared_len;
            // 6-byte header + version string + 8 trailing bytes.
            if 6 + payload.len() < 14 + len {
                return Err(Error::MalformedFrame("version frame too short"));
            }
            let firmware = String::from_utf8_lossy(&payload[..len]).into_owned();
            // 0x32 vs 0x31 is asymmetric with the 0xB0 reply; preserved as the
            // firmware reports it.
            let print_type = match payload.get(len + 8) {
                Some(0x32) => PrintType::HighPressure,
                Some(0x31) => PrintType::LowPressure,
                _ => PrintType::Unknown,
            };
            Ok(PrinterEvent::Version { firmware, print_type })
        }
        other => Ok(PrinterEvent::Unknown(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_notification;
    use pretty_assertions::assert_eq;

    fn decode(raw: &[u8]) -> Result<PrinterEvent, Error> {
        decode_event(&parse_notification(raw).unwrap())
    }

    fn status_frame(code: u8, battery: u8, temp: u8, ok_flag: u8, err: u8) -> Vec<u8> {
        let mut raw = vec![0x22, 0x21, 0xA1, 0x00, 0x08, 0x00];
        raw.extend_from_slice(&[code, 0, 0, battery, temp, 0, ok_flag, err]);
        raw.extend_from_slice(&[0x00, 0xFF]);
        raw
    }

    #[test]
    fn status_ok_printing() {
        let event = decode(&status_frame(0x01, 0x3C, 28, 0x00, 0x00)).unwrap();
        let PrinterEvent::Status(status) = event else {
            panic!("expected status event, got {event:?}");
        };
        assert!(status.ok);
        assert_eq!(status.state, PrinterState::Printing);
        assert_eq!(status.fault, None);
        assert_eq!(status.battery_percent, 60);
        assert_eq!(status.temperature, 28);
        assert_eq!(status.message(), "Printing");
    }

    #[test]
    fn status_fault_no_paper_both_codes() {
        for err in [0x1, 0x9] {
            let event = decode(&status_frame(0x00, 80, 25, 0x01, err)).unwrap();
            let PrinterEvent::Status(status) = event else {
                panic!("expected status event");
            };
            assert!(!status.ok);
            assert_eq!(status.fault, Some(PrinterFault::NoPaper));
            assert_eq!(status.message(), "No paper");
        }
    }

    #[test]
    fn status_fault_codes() {
        let overheat = decode(&status_frame(0x00, 80, 70, 0x01, 0x4)).unwrap();
        assert!(matches!(
            overheat,
            PrinterEvent::Status(PrinterStatus { fault: Some(PrinterFault::Overheated), .. })
        ));
        let low = decode(&status_frame(0x00, 5, 25, 0x01, 0x8)).unwrap();
        assert!(matches!(
            low,
            PrinterEvent::Status(PrinterStatus { fault: Some(PrinterFault::LowBattery), .. })
        ));
        // Unmatched codes still decode instead of failing the parse.
        let odd = decode(&status_frame(0x00, 80, 25, 0x01, 0x7F)).unwrap();
        assert!(matches!(
            odd,
            PrinterEvent::Status(PrinterStatus { fault: Some(PrinterFault::Unknown(0x7F)), .. })
        ));
    }

    #[test]
    fn battery_level() {
        let raw = [0x22, 0x21, 0xAB, 0x00, 0x01, 0x00, 0x4B, 0x00, 0xFF];
        assert_eq!(decode(&raw).unwrap(), PrinterEvent::Battery(75));
    }

    #[test]
    fn print_ack_and_complete() {
        let ok = [0x22, 0x21, 0xA9, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF];
        assert_eq!(decode(&ok).unwrap(), PrinterEvent::PrintAck { ok: true });
        let fail = [0x22, 0x21, 0xA9, 0x00, 0x01, 0x00, 0x01, 0x07, 0xFF];
        assert_eq!(decode(&fail).unwrap(), PrinterEvent::PrintAck { ok: false });
        let done = [0x22, 0x21, 0xAA, 0x00, 0x00, 0x00, 0x00, 0xFF];
        assert_eq!(decode(&done).unwrap(), PrinterEvent::PrintComplete);
    }

    #[test]
    fn feed_acks() {
        let eject = [0x22, 0x21, 0xA3, 0x00, 0x00, 0x00, 0x00, 0xFF];
        assert_eq!(decode(&eject).unwrap(), PrinterEvent::EjectStarted);
        let retract = [0x22, 0x21, 0xA4, 0x00, 0x00, 0x00, 0x00, 0xFF];
        assert_eq!(decode(&retract).unwrap(), PrinterEvent::RetractStarted);
    }

    #[test]
    fn query_count_bytes() {
        let mut raw = vec![0x22, 0x21, 0xA7, 0x00, 0x06, 0x00];
        raw.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        raw.extend_from_slice(&[0x00, 0xFF]);
        assert_eq!(
            decode(&raw).unwrap(),
            PrinterEvent::QueryCount([1, 2, 3, 4, 5, 6])
        );
    }

    #[test]
    fn print_type_report() {
        let mk = |b: u8| [0x22, 0x21, 0xB0, 0x00, 0x01, 0x00, b, 0x00, 0xFF];
        assert_eq!(
            decode(&mk(0x01)).unwrap(),
            PrinterEvent::PrintTypeReport(PrintType::HighPressure)
        );
        assert_eq!(
            decode(&mk(0xFF)).unwrap(),
            PrinterEvent::PrintTypeReport(PrintType::Unknown)
        );
        assert_eq!(
            decode(&mk(0x00)).unwrap(),
            PrinterEvent::PrintTypeReport(PrintType::LowPressure)
        );
    }

    #[test]
    fn version_with_print_type() {
        // "V2.0" (4 bytes) + 8 trailing bytes, print type at payload[len + 8].
        let mut raw = vec![0x22, 0x21, 0xB1, 0x00, 0x04, 0x00];
        raw.extend_from_slice(b"V2.0");
        raw.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
        raw.push(0x32);
        let event = decode(&raw).unwrap();
        assert_eq!(
            event,
            PrinterEvent::Version {
                firmware: "V2.0".to_string(),
                print_type: PrintType::HighPressure,
            }
        );
    }

    #[test]
    fn version_too_short_is_malformed() {
        let mut raw = vec![0x22, 0x21, 0xB1, 0x00, 0x04, 0x00];
        raw.extend_from_slice(b"V2.0");
        // Frame ends before the mandatory trailing region.
        assert!(decode(&raw).is_err());
    }

    #[test]
    fn unknown_command_is_not_an_error() {
        let raw = [0x22, 0x21, 0x5E, 0x00, 0x00, 0x00, 0x00, 0xFF];
        assert_eq!(decode(&raw).unwrap(), PrinterEvent::Unknown(0x5E));
    }
}
