// src/pgm.rs

//! Grayscale PGM (netpbm) reading and writing on top of the `image` crate's PNM codec.
//!
//! Both the plain `P2` encoding (whitespace-delimited decimal intensities) and the
//! binary `P5` encoding with one byte per pixel are supported. The sample data is
//! checked against the header before it is decoded, so a header that promises more
//! pixels than the file holds is rejected without allocating for it.

use crate::error::{Result, SvdPgmError};
use crate::image::{pixel_count, GrayImage};
use ::image::codecs::pnm::{PnmDecoder, PnmEncoder, PnmSubtype, SampleEncoding};
use ::image::{ExtendedColorType, ImageDecoder, ImageEncoder, ImageError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Largest intensity written to, and accepted from, a raster header.
pub const MAX_INTENSITY: u8 = 255;

/// On-disk pixel encoding.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RasterEncoding {
    /// `P2`: ASCII decimal values.
    #[default]
    Plain,
    /// `P5`: raw bytes.
    Binary,
}

impl RasterEncoding {
    fn subtype(self) -> PnmSubtype {
        match self {
            RasterEncoding::Plain => PnmSubtype::Graymap(SampleEncoding::Ascii),
            RasterEncoding::Binary => PnmSubtype::Graymap(SampleEncoding::Binary),
        }
    }
}

fn malformed(e: ImageError) -> SvdPgmError {
    SvdPgmError::MalformedRaster(e.to_string())
}

// plain samples: exactly `expected` decimal tokens, none above `max_value`
fn check_plain_samples(raster: &[u8], expected: usize, max_value: u32) -> Result<()> {
    let mut count = 0usize;
    for token in raster
        .split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty())
    {
        if count == expected {
            return Err(SvdPgmError::MalformedRaster(format!(
                "more than the declared {} pixels",
                expected
            )));
        }
        let value = std::str::from_utf8(token)
            .ok()
            .and_then(|t| t.parse::<u32>().ok())
            .ok_or_else(|| {
                SvdPgmError::MalformedRaster(format!(
                    "invalid pixel value {:?}",
                    String::from_utf8_lossy(token)
                ))
            })?;
        if value > max_value {
            return Err(SvdPgmError::MalformedRaster(format!(
                "pixel {} = {} exceeds maximum value {}",
                count, value, max_value
            )));
        }
        count += 1;
    }
    if count != expected {
        return Err(SvdPgmError::MalformedRaster(format!(
            "expected {} pixels, found {}",
            expected, count
        )));
    }
    Ok(())
}

fn check_binary_samples(raster: &[u8], expected: usize, max_value: u32) -> Result<()> {
    if raster.len() != expected {
        return Err(SvdPgmError::MalformedRaster(format!(
            "expected {} pixels, found {} bytes of data",
            expected,
            raster.len()
        )));
    }
    if let Some((idx, &value)) = raster
        .iter()
        .enumerate()
        .find(|(_, v)| u32::from(**v) > max_value)
    {
        return Err(SvdPgmError::MalformedRaster(format!(
            "pixel {} = {} exceeds maximum value {}",
            idx, value, max_value
        )));
    }
    Ok(())
}

/// Decodes a complete PGM byte stream.
///
/// Samples of a header with a maximum value below 255 are stretched onto `0..=255`
/// by the decoder.
///
/// # Errors
/// Returns `MalformedRaster` for anything other than `P2`/`P5`, zero dimensions, a
/// maximum value outside `1..=255`, a pixel above the declared maximum, or a pixel
/// count different from `width * height`.
pub fn decode_pgm(data: &[u8]) -> Result<GrayImage> {
    // The header reader stops right after the single whitespace byte following maxval.
    let (raster, header) = PnmDecoder::new(data).map_err(malformed)?.into_inner();
    let encoding = match header.subtype() {
        PnmSubtype::Graymap(SampleEncoding::Ascii) => RasterEncoding::Plain,
        PnmSubtype::Graymap(SampleEncoding::Binary) => RasterEncoding::Binary,
        other => {
            return Err(SvdPgmError::MalformedRaster(format!(
                "unsupported netpbm subtype {:?}, expected P2 or P5",
                other
            )))
        }
    };

    let (width, height) = (header.width() as usize, header.height() as usize);
    if width == 0 || height == 0 {
        return Err(SvdPgmError::MalformedRaster(format!(
            "dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }
    let max_value = header.maximal_sample();
    if max_value == 0 || max_value > u32::from(MAX_INTENSITY) {
        return Err(SvdPgmError::MalformedRaster(format!(
            "maximum value must be between 1 and {}, got {}",
            MAX_INTENSITY, max_value
        )));
    }

    let expected = pixel_count(width, height)?;
    match encoding {
        RasterEncoding::Plain => check_plain_samples(raster, expected, max_value)?,
        RasterEncoding::Binary => check_binary_samples(raster, expected, max_value)?,
    }

    // Sample count now matches the input, so the buffer is bounded by `data.len()`.
    let decoder = PnmDecoder::new(data).map_err(malformed)?;
    let mut pixels = vec![0u8; expected];
    decoder.read_image(&mut pixels).map_err(malformed)?;
    GrayImage::from_shape_vec(width, height, pixels)
}

/// Writes `image` with maximum value 255.
pub fn encode_pgm<W: Write>(writer: W, image: &GrayImage, encoding: RasterEncoding) -> Result<()> {
    let dimension = |n: usize| {
        u32::try_from(n).map_err(|_| {
            SvdPgmError::MalformedRaster(format!("dimension {} does not fit a PGM header", n))
        })
    };
    let (width, height) = (dimension(image.width())?, dimension(image.height())?);
    let samples: Vec<u8> = image.pixels().iter().copied().collect();
    PnmEncoder::new(writer)
        .with_subtype(encoding.subtype())
        .write_image(&samples, width, height, ExtendedColorType::L8)?;
    Ok(())
}

/// Reads a PGM file from disk.
pub fn read_pgm<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|e| SvdPgmError::io(path, e))?;
    let image = decode_pgm(&data)?;
    debug!("Read {}x{} raster from {:?}", image.width(), image.height(), path);
    Ok(image)
}

/// Writes a PGM file to disk, replacing any existing file.
pub fn write_pgm<P: AsRef<Path>>(path: P, image: &GrayImage, encoding: RasterEncoding) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SvdPgmError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    encode_pgm(&mut writer, image, encoding).map_err(|e| match e {
        SvdPgmError::Codec(ImageError::IoError(source)) => SvdPgmError::io(path, source),
        other => other,
    })?;
    writer.flush().map_err(|e| SvdPgmError::io(path, e))
}
