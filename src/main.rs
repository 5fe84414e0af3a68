//! Command-line utility for the MXW01 cat printer.
//!
//! Prints an image (with optional dithering, 1bpp or 4bpp), queries printer
//! state, or renders a PNG preview of what would be printed. Querying and
//! printing cannot be combined in one invocation; the firmware corrupts its
//! state when the two interleave.

use std::io::{self, Cursor, Read, Write};

use clap::Parser;
use image::{DynamicImage, ImageFormat};

use mxw01::ble::{self, BleTransport};
use mxw01::dithering::Dither;
use mxw01::encode::{self, PixelBuffer, PrintMode};
use mxw01::error::Error;
use mxw01::notify::decode_event;
use mxw01::printer::{self, Feed, Printer, Query};
use mxw01::protocol::parse_notification;

/// MXW01 cat printer utility
#[derive(Parser, Debug)]
#[command(name = "mxw01", disable_version_flag = true)]
struct Cli {
    /// Print intensity (0-100)
    #[arg(short, long, default_value_t = 80)]
    intensity: u8,

    /// Print mode: 1bpp or 4bpp
    #[arg(short, long, default_value = "1bpp")]
    mode: String,

    /// Dither method: none, floyd, bayer2x2, bayer4x4, bayer8x8, bayer16x16,
    /// atkinson, jjn
    #[arg(short, long, default_value = "none")]
    dither: String,

    /// Query printer status
    #[arg(short, long)]
    status: bool,

    /// Query battery level
    #[arg(short, long)]
    battery: bool,

    /// Query printer firmware version
    #[arg(short = 'v', long)]
    version: bool,

    /// Query print type
    #[arg(short = 'p', long = "printtype")]
    print_type: bool,

    /// Query internal counter
    #[arg(short = 'q', long = "querycount")]
    query_count: bool,

    /// Eject paper by N lines
    #[arg(short = 'E', long, value_name = "LINES")]
    eject: Option<u16>,

    /// Retract paper by N lines
    #[arg(short = 'R', long, value_name = "LINES")]
    retract: Option<u16>,

    /// Output a PNG preview instead of printing ("-" writes to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// Connect to printer by MAC address instead of scanning by name
    #[arg(short, long)]
    address: Option<String>,

    /// Path to the image to print, or "-" for stdin
    image: Option<String>,
}

impl Cli {
    fn wants_query(&self) -> bool {
        self.status
            || self.battery
            || self.version
            || self.print_type
            || self.query_count
            || self.eject.is_some()
            || self.retract.is_some()
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    // Configuration errors surface before any I/O.
    let mode = PrintMode::from_name(&cli.mode)?;
    let dither = Dither::from_name(&cli.dither)?;

    let buffer = match cli.image.as_deref() {
        Some(path) => Some(load_and_encode(path, mode, dither)?),
        None => None,
    };

    if let Some(target) = cli.output.as_deref() {
        let buffer = buffer.ok_or_else(|| {
            Error::Config("preview output requested but no image was given".into())
        })?;
        return write_preview(&buffer, target);
    }

    printer::validate_session(buffer.is_some(), cli.wants_query())?;
    if buffer.is_none() && !cli.wants_query() {
        println!("Nothing to do. Use -h for help.");
        return Ok(());
    }

    let peripheral = ble::find_printer(cli.address.as_deref()).await?;
    let transport = BleTransport::connect(peripheral).await?;
    let printer = Printer::new(transport);

    let result = tokio::select! {
        r = drive_session(&printer, &cli, buffer.as_ref()) => r,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("interrupted, tearing down connection");
            Err(Error::Io(io::Error::new(io::ErrorKind::Interrupted, "interrupted")))
        }
    };
    printer.transport().disconnect().await;
    result?;

    println!("Done!");
    Ok(())
}

/// Runs either the query batch or the print job on a connected printer.
async fn drive_session(
    printer: &Printer<BleTransport>,
    cli: &Cli,
    buffer: Option<&PixelBuffer>,
) -> Result<(), Error> {
    if let Some(buffer) = buffer {
        return printer.print(buffer, cli.intensity).await;
    }

    // Query path: replies arrive asynchronously, so subscribe first and
    // print events as they come in.
    let mut notifications = printer.transport().subscribe().await?;
    tokio::spawn(async move {
        while let Some(raw) = notifications.recv().await {
            match parse_notification(&raw).and_then(|frame| decode_event(&frame)) {
                Ok(event) => println!("{event}"),
                Err(e) => log::warn!("dropping notification ({e}), raw: {raw:02X?}"),
            }
        }
    });

    if cli.status {
        printer.query(Query::Status).await?;
    }
    if cli.battery {
        printer.query(Query::Battery).await?;
    }
    if cli.version {
        printer.query(Query::Version).await?;
    }
    if cli.print_type {
        printer.query(Query::PrintType).await?;
    }
    if cli.query_count {
        printer.query(Query::Count).await?;
    }
    if let Some(lines) = cli.eject {
        printer.feed(Feed::Eject, lines).await?;
    }
    if let Some(lines) = cli.retract {
        printer.feed(Feed::Retract, lines).await?;
    }

    log::info!("waiting for notifications...");
    printer.settle().await;
    Ok(())
}

/// Decodes the source image (file path or stdin), scales it to the printer
/// width and packs it for the chosen mode.
fn load_and_encode(path: &str, mode: PrintMode, dither: Dither) -> Result<PixelBuffer, Error> {
    let img = load_image(path)?;
    let gray = encode::prepare_raster(&img);
    encode::encode(&gray, mode, dither)
}

fn load_image(path: &str) -> Result<DynamicImage, Error> {
    if path == "-" {
        let mut bytes = Vec::new();
        io::stdin().read_to_end(&mut bytes)?;
        Ok(image::load_from_memory(&bytes)?)
    } else {
        Ok(image::open(path)?)
    }
}

/// Renders the packed buffer back to a PNG, to a file or stdout.
fn write_preview(buffer: &PixelBuffer, target: &str) -> Result<(), Error> {
    let width = encode::LINE_PIXELS;
    let height = u32::from(buffer.height);
    let preview = match buffer.mode {
        PrintMode::OneBit => encode::render_preview_1bpp(&buffer.data, width, height),
        PrintMode::FourBit => encode::render_preview_4bpp(&buffer.data, width, height),
    };

    if target == "-" {
        let mut png = Vec::new();
        preview.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        io::stdout().write_all(&png)?;
    } else {
        preview.save_with_format(target, ImageFormat::Png)?;
        println!("Preview PNG written to {target}");
    }
    Ok(())
}
