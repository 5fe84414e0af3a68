//! Print and query session sequencing.
//!
//! A session drives one operation: either a print job (intensity, print
//! start, paced data streaming, flush) or a batch of queries. The printer
//! answers queries asynchronously on the notify characteristic, so the
//! orchestrator never waits for a reply before its next write; ordering comes
//! from issuing writes sequentially, each acknowledged at the link layer.

use std::time::Duration;

use async_trait::async_trait;

use crate::encode::PixelBuffer;
use crate::error::Error;
use crate::protocol::{self, build_command};

/// BLE writes to the data characteristic are kept at the unnegotiated ATT
/// payload size; the firmware consumes them in real time.
pub const CHUNK_SIZE: usize = 20;
/// Pause between data chunks so the write queue never outruns the head.
pub const CHUNK_DELAY: Duration = Duration::from_millis(6);
/// How long a query session lingers for notifications before finishing.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Constant third byte of the print-start payload. Meaning unknown; the
/// stock firmware requires it.
const PRINT_START_MAGIC: u8 = 0x30;

/// Rejects invocations that combine a print job with queries. The firmware
/// corrupts its state when the two interleave in one connection, so the
/// combination is refused before anything is written.
pub fn validate_session(has_image: bool, wants_query: bool) -> Result<(), Error> {
    if has_image && wants_query {
        return Err(Error::QueryPrintConflict);
    }
    Ok(())
}

/// Write access to the two outbound printer channels. Implemented by the BLE
/// transport and by mocks in tests.
#[async_trait]
pub trait Transport {
    /// Write a framed command to the command characteristic.
    async fn write_command(&self, frame: &[u8]) -> Result<(), Error>;
    /// Write a raw (unframed) pixel-data chunk to the data characteristic.
    async fn write_data(&self, chunk: &[u8]) -> Result<(), Error>;
}

/// One of the printer's informational queries. Replies arrive as
/// notifications, not as return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Status,
    Battery,
    Version,
    PrintType,
    Count,
}

impl Query {
    fn command_id(self) -> u8 {
        match self {
            Query::Status => protocol::CMD_GET_STATUS,
            Query::Battery => protocol::CMD_GET_BATTERY,
            Query::Version => protocol::CMD_GET_VERSION,
            Query::PrintType => protocol::CMD_GET_PRINT_TYPE,
            Query::Count => protocol::CMD_QUERY_COUNT,
        }
    }
}

/// Paper feed direction for the line-feed commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Eject,
    Retract,
}

impl Feed {
    fn command_id(self) -> u8 {
        match self {
            Feed::Eject => protocol::CMD_EJECT_PAPER,
            Feed::Retract => protocol::CMD_RETRACT_PAPER,
        }
    }
}

/// Session orchestrator over a connected transport.
pub struct Printer<T: Transport> {
    transport: T,
    chunk_size: usize,
    pacing: Duration,
}

impl<T: Transport> Printer<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            chunk_size: CHUNK_SIZE,
            pacing: CHUNK_DELAY,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Streams a packed image to the printer.
    ///
    /// Sequence: intensity set, print start, per-line data chunks with
    /// pacing, flush. A failed write aborts with the failing step attached;
    /// data already sent is left for the firmware to discard.
    pub async fn print(&self, buffer: &PixelBuffer, intensity: u8) -> Result<(), Error> {
        let intensity = intensity.min(100);
        log::info!(
            "sending image: {}x{} lines, intensity {}",
            crate::encode::LINE_PIXELS,
            buffer.height,
            intensity
        );

        self.transport
            .write_command(&build_command(protocol::CMD_SET_INTENSITY, &[intensity]))
            .await
            .map_err(|e| e.at("intensity set failed"))?;

        let mut start = Vec::with_capacity(4);
        start.extend_from_slice(&buffer.height.to_le_bytes());
        start.push(PRINT_START_MAGIC);
        start.push(buffer.mode.selector());
        self.transport
            .write_command(&build_command(protocol::CMD_PRINT, &start))
            .await
            .map_err(|e| e.at("print command failed"))?;

        let bytes_per_line = buffer.mode.bytes_per_line();
        for (line, slice) in buffer.data.chunks(bytes_per_line).enumerate() {
            for chunk in slice.chunks(self.chunk_size) {
                self.transport
                    .write_data(chunk)
                    .await
                    .map_err(|source| Error::DataWrite {
                        line,
                        source: Box::new(source),
                    })?;
                tokio::time::sleep(self.pacing).await;
            }
        }

        self.transport
            .write_command(&build_command(protocol::CMD_FLUSH, &[0x00]))
            .await
            .map_err(|e| e.at("flush failed"))
    }

    /// Issues a single query command. The reply, if any, arrives as a
    /// notification; call [`Printer::settle`] after the last query of a
    /// batch.
    pub async fn query(&self, query: Query) -> Result<(), Error> {
        self.transport
            .write_command(&build_command(query.command_id(), &[0x00]))
            .await
            .map_err(|e| e.at("query write failed"))
    }

    /// Feeds or retracts paper by `lines`.
    pub async fn feed(&self, direction: Feed, lines: u16) -> Result<(), Error> {
        self.transport
            .write_command(&build_command(direction.command_id(), &lines.to_le_bytes()))
            .await
            .map_err(|e| e.at("feed write failed"))
    }

    /// Waits out the fixed settling interval so asynchronous query replies
    /// can arrive before the session ends.
    pub async fn settle(&self) {
        tokio::time::sleep(SETTLE_DELAY).await;
    }
}
