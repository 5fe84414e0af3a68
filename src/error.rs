//! Crate-wide error type.

use thiserror::Error;

/// Errors surfaced by the mxw01 library and CLI.
#[derive(Debug, Error)]
pub enum Error {
    /// A notification frame failed structural validation. Sessions log these
    /// and keep going; they are never fatal on their own.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// Bad configuration detected before any I/O (unknown dither or mode
    /// name, invalid argument combination).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Querying and printing in one invocation trips a firmware bug that
    /// corrupts printer state, so the combination is refused outright.
    #[error(
        "refusing to print and query at the same time due to a firmware bug; \
         run print and query commands separately"
    )]
    QueryPrintConflict,

    /// No usable Bluetooth adapter on this host.
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    /// No advertising printer matched the target name or address within the
    /// scan window.
    #[error("printer not found")]
    PrinterNotFound,

    /// The connected device is missing one of the required GATT
    /// characteristics.
    #[error("missing required {0} characteristic")]
    MissingCharacteristic(&'static str),

    /// A pixel-data chunk write failed mid-stream.
    #[error("line {line} chunk write failed: {source}")]
    DataWrite {
        line: usize,
        #[source]
        source: Box<Error>,
    },

    /// A session step failed; carries the step that was in flight.
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attaches the session step that was in flight when this error occurred.
    pub fn at(self, step: &'static str) -> Self {
        Error::Step {
            step,
            source: Box::new(self),
        }
    }
}
