//! Converts grayscale rasters into the MXW01's packed line format.
//!
//! The printer head is 384 pixels wide. 1bpp mode packs 8 pixels per byte
//! (LSB-first), 4bpp packs two inverted 16-level pixels per byte. Buffers
//! shorter than 86 lines are silently ignored by the firmware, so short
//! rasters are padded with white rows before packing.

use image::{DynamicImage, GrayImage, Luma, imageops};

use crate::dithering::{self, Dither};
use crate::error::Error;

/// Printer head width in pixels.
pub const LINE_PIXELS: u32 = 384;
/// Shortest buffer the firmware will actually print.
pub const MIN_LINES: u32 = 86;

/// Contrast boost applied on the undithered 1bpp path, where plain
/// thresholding would otherwise flatten midtone detail.
const NO_DITHER_CONTRAST: f32 = 10.0;

/// Bayer intensity for the 4bpp path; a 16-level palette needs much less
/// contrast push than a 2-level one.
const BAYER_STRENGTH_4BPP: f32 = 0.2;

/// Pixel packing selected for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMode {
    OneBit,
    FourBit,
}

impl PrintMode {
    /// Parses the CLI mode name.
    pub fn from_name(name: &str) -> Result<Self, crate::error::Error> {
        match name {
            "1bpp" => Ok(PrintMode::OneBit),
            "4bpp" => Ok(PrintMode::FourBit),
            other => Err(crate::error::Error::Config(format!(
                "invalid mode {other:?}: use \"1bpp\" or \"4bpp\""
            ))),
        }
    }

    /// Mode selector byte in the print-start command payload.
    pub fn selector(self) -> u8 {
        match self {
            PrintMode::OneBit => 0x00,
            PrintMode::FourBit => 0x02,
        }
    }

    /// Packed bytes per printer line.
    pub fn bytes_per_line(self) -> usize {
        match self {
            PrintMode::OneBit => (LINE_PIXELS / 8) as usize,
            PrintMode::FourBit => (LINE_PIXELS / 2) as usize,
        }
    }
}

/// A packed, ready-to-stream image. Built once by the encoder and read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub data: Vec<u8>,
    pub height: u16,
    pub mode: PrintMode,
}

/// Scales a decoded image to the printer width (preserving aspect ratio) and
/// converts it to grayscale.
pub fn prepare_raster(img: &DynamicImage) -> GrayImage {
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    let target_h = ((h as f32) * (LINE_PIXELS as f32) / (w as f32)).round().max(1.0) as u32;
    imageops::resize(&gray, LINE_PIXELS, target_h, imageops::FilterType::Lanczos3)
}

/// Pads a raster shorter than [`MIN_LINES`] with white rows at the bottom,
/// keeping the content anchored at the top.
pub fn pad_to_min_lines(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    if h >= MIN_LINES {
        return img.clone();
    }
    let mut padded = GrayImage::from_pixel(w, MIN_LINES, Luma([255]));
    imageops::replace(&mut padded, img, 0, 0);
    padded
}

/// Dithers (or contrast-boosts) and packs a prepared raster for the given
/// mode. The input must already be at the printer width.
///
/// Rasters too tall for the print-start command's `u16` height field are
/// rejected rather than truncated.
pub fn encode(gray: &GrayImage, mode: PrintMode, dither: Dither) -> Result<PixelBuffer, Error> {
    let mut img = pad_to_min_lines(gray);
    let height = u16::try_from(img.height()).map_err(|_| {
        Error::Config(format!(
            "image is too tall to print: {} lines (max {})",
            img.height(),
            u16::MAX
        ))
    })?;
    let data = match mode {
        PrintMode::OneBit => {
            if dither == Dither::None {
                imageops::colorops::contrast_in_place(&mut img, NO_DITHER_CONTRAST);
            } else {
                dithering::apply(&mut img, dither, 2, 1.0);
            }
            pack_1bpp(&img)
        }
        PrintMode::FourBit => {
            dithering::apply(&mut img, dither, 16, BAYER_STRENGTH_4BPP);
            pack_4bpp(&img)
        }
    };
    Ok(PixelBuffer { data, height, mode })
}

/// Packs 8 pixels per byte, LSB-first, dark pixels (< 128) set their bit.
///
/// The printer's line format assumes the 384-pixel head width, a multiple
/// of 8; other widths pack without padding, so rows share bytes.
pub fn pack_1bpp(img: &GrayImage) -> Vec<u8> {
    let (width, height) = img.dimensions();
    let mut out = vec![0u8; ((width * height) as usize).div_ceil(8)];
    for (i, px) in img.pixels().enumerate() {
        if px[0] < 128 {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// Packs two pixels per byte as inverted 4-bit levels (0 = white, 15 =
/// darkest), even-x pixel in the high nibble.
pub fn pack_4bpp(img: &GrayImage) -> Vec<u8> {
    let (width, height) = img.dimensions();
    let mut out = vec![0u8; ((width * height) as usize).div_ceil(2)];
    for (i, px) in img.pixels().enumerate() {
        let level = (255 - px[0]) >> 4;
        let shift = ((i & 1) ^ 1) << 2;
        out[i / 2] |= level << shift;
    }
    out
}

/// Reconstructs a grayscale preview from a packed 1bpp buffer.
pub fn render_preview_1bpp(data: &[u8], width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let i = (y * width + x) as usize;
        let bit = (data[i / 8] >> (i % 8)) & 1;
        Luma([if bit != 0 { 0 } else { 255 }])
    })
}

/// Reconstructs a grayscale preview from a packed 4bpp buffer.
pub fn render_preview_4bpp(data: &[u8], width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let i = (y * width + x) as usize;
        let shift = ((i & 1) ^ 1) << 2;
        let level = (data[i / 2] >> shift) & 0x0F;
        Luma([255 - level * 17])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn flat(height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(LINE_PIXELS, height, Luma([value]))
    }

    #[test]
    fn one_bit_white_packs_to_zeroes() {
        let buf = encode(&flat(100, 255), PrintMode::OneBit, Dither::None).unwrap();
        assert_eq!(buf.data.len(), 48 * 100);
        assert!(buf.data.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn one_bit_black_packs_to_ones() {
        let buf = encode(&flat(100, 0), PrintMode::OneBit, Dither::None).unwrap();
        assert!(buf.data.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn four_bit_white_packs_to_zeroes() {
        let buf = encode(&flat(100, 255), PrintMode::FourBit, Dither::None).unwrap();
        assert_eq!(buf.data.len(), 192 * 100);
        assert!(buf.data.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn four_bit_black_fills_both_nibbles() {
        let buf = encode(&flat(100, 0), PrintMode::FourBit, Dither::None).unwrap();
        assert!(buf.data.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn four_bit_nibble_order() {
        // First pixel dark, second white: level 15 lands in the high nibble.
        let mut img = flat(MIN_LINES, 255);
        img.put_pixel(0, 0, Luma([0]));
        let data = pack_4bpp(&img);
        assert_eq!(data[0], 0xF0);

        // Second pixel dark instead: low nibble.
        let mut img = flat(MIN_LINES, 255);
        img.put_pixel(1, 0, Luma([0]));
        let data = pack_4bpp(&img);
        assert_eq!(data[0], 0x0F);
    }

    #[test]
    fn one_bit_lsb_first_within_byte() {
        let mut img = flat(MIN_LINES, 255);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(3, 0, Luma([0]));
        let data = pack_1bpp(&img);
        assert_eq!(data[0], 0b0000_1001);
    }

    #[test]
    fn short_raster_is_padded_to_minimum_with_white() {
        let buf = encode(&flat(10, 0), PrintMode::OneBit, Dither::None).unwrap();
        assert_eq!(u32::from(buf.height), MIN_LINES);
        assert_eq!(buf.data.len(), 48 * MIN_LINES as usize);
        // Original 10 black lines, then white padding.
        let content = 48 * 10;
        assert!(buf.data[..content].iter().all(|&b| b == 0xFF));
        assert!(buf.data[content..].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn tall_raster_is_not_padded() {
        let buf = encode(&flat(200, 255), PrintMode::OneBit, Dither::None).unwrap();
        assert_eq!(buf.height, 200);
    }

    #[test]
    fn raster_taller_than_height_field_is_rejected() {
        // 65536 lines cannot be represented in the print-start payload.
        let img = flat(u32::from(u16::MAX) + 1, 255);
        let err = encode(&img, PrintMode::OneBit, Dither::None).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");

        let img = flat(u32::from(u16::MAX), 255);
        let buf = encode(&img, PrintMode::OneBit, Dither::None).unwrap();
        assert_eq!(buf.height, u16::MAX);
    }

    #[test]
    fn packing_tolerates_widths_off_the_byte_grid() {
        // Not the printer's geometry, but the packers must not index past
        // their buffer for it.
        let img = GrayImage::from_pixel(20, 3, Luma([0]));
        let data = pack_1bpp(&img);
        assert_eq!(data.len(), (20usize * 3).div_ceil(8));
        assert_eq!(*data.last().unwrap(), 0x0F);

        let img = GrayImage::from_pixel(3, 3, Luma([0]));
        let data = pack_4bpp(&img);
        assert_eq!(data.len(), 5);
        // Nine pixels: the final byte holds only the even-index pixel.
        assert_eq!(*data.last().unwrap(), 0xF0);
    }

    #[test]
    fn preview_round_trips_1bpp() {
        let mut img = flat(MIN_LINES, 255);
        img.put_pixel(5, 2, Luma([0]));
        img.put_pixel(380, 85, Luma([0]));
        let data = pack_1bpp(&img);
        let preview = render_preview_1bpp(&data, LINE_PIXELS, MIN_LINES);
        assert_eq!(preview.get_pixel(5, 2)[0], 0);
        assert_eq!(preview.get_pixel(380, 85)[0], 0);
        assert_eq!(preview.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn preview_round_trips_4bpp_levels() {
        // Level = (255 - v) >> 4; preview renders 255 - level * 17.
        let mut img = flat(MIN_LINES, 255);
        img.put_pixel(0, 0, Luma([100]));
        let data = pack_4bpp(&img);
        let preview = render_preview_4bpp(&data, LINE_PIXELS, MIN_LINES);
        let level = (255 - 100u8) >> 4;
        assert_eq!(preview.get_pixel(0, 0)[0], 255 - level * 17);
    }

    #[test]
    fn prepare_raster_hits_printer_width() {
        let src = DynamicImage::new_luma8(768, 200);
        let gray = prepare_raster(&src);
        assert_eq!(gray.width(), LINE_PIXELS);
        assert_eq!(gray.height(), 100);
    }

    #[test]
    fn mode_names() {
        assert_eq!(PrintMode::from_name("1bpp").unwrap(), PrintMode::OneBit);
        assert_eq!(PrintMode::from_name("4bpp").unwrap(), PrintMode::FourBit);
        assert!(PrintMode::from_name("2bpp").is_err());
    }

    #[test]
    fn mode_geometry() {
        assert_eq!(PrintMode::OneBit.bytes_per_line(), 48);
        assert_eq!(PrintMode::FourBit.bytes_per_line(), 192);
        assert_eq!(PrintMode::OneBit.selector(), 0x00);
        assert_eq!(PrintMode::FourBit.selector(), 0x02);
    }
}
