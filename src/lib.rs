//! mxw01: print images to MXW01 cat printers over Bluetooth Low Energy.
//!
//! Main modules:
//! - ble: BLE transport (scan, connect, notifications)
//! - dithering: dither algorithms for the pixel encoder
//! - encode: image to packed 1bpp/4bpp line buffers
//! - notify: notification frame decoding into printer events
//! - printer: print/query session orchestration
//! - protocol: command framing and CRC-8

pub mod ble;
pub mod dithering;
pub mod encode;
pub mod error;
pub mod notify;
pub mod printer;
pub mod protocol;

pub use ble::{BleTransport, find_printer};
pub use dithering::Dither;
pub use encode::{PixelBuffer, PrintMode};
pub use error::Error;
pub use notify::{PrinterEvent, decode_event};
pub use printer::{Feed, Printer, Query, Transport, validate_session};
pub use protocol::{build_command, crc8, parse_notification};
