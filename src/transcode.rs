//! Re-encodes one embedded raster image at a resolution cap and quality.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};

use crate::error::TranscodeError;
use crate::ladder::jpeg_quality;

/// How the image bytes handed to the transcoder are encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEncoding {
    /// A complete JPEG file (`DCTDecode`)
    Jpeg,
    /// 8-bit samples, already inflated
    Raw { width: u32, height: u32, channels: u8 },
    /// Left alone; the reason ends up in the log
    Unsupported(String),
}

#[derive(Debug, Clone)]
pub struct ImageSource {
    pub encoding: SourceEncoding,
    pub data: Vec<u8>,
    /// Size of the image as stored in the document, compared against the
    /// re-encoded size.
    pub encoded_len: usize,
}

impl ImageSource {
    pub fn jpeg(data: Vec<u8>) -> Self {
        Self {
            encoding: SourceEncoding::Jpeg,
            encoded_len: data.len(),
            data,
        }
    }

    pub fn raw(
        samples: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        encoded_len: usize,
    ) -> Self {
        Self {
            encoding: SourceEncoding::Raw {
                width,
                height,
                channels,
            },
            data: samples,
            encoded_len,
        }
    }

    pub fn unsupported(reason: impl Into<String>, encoded_len: usize) -> Self {
        Self {
            encoding: SourceEncoding::Unsupported(reason.into()),
            data: Vec::new(),
            encoded_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscodedImage {
    /// Baseline JPEG bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub gray: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transcoded {
    Replaced(TranscodedImage),
    /// Re-encoding did not beat the stored size
    SkippedLarger { original: usize, reencoded: usize },
    Unsupported(String),
}

pub fn transcode(
    source: &ImageSource,
    max_dimension: u32,
    quality: f32,
) -> Result<Transcoded, TranscodeError> {
    let mut actions = Vec::new();

    let img = match &source.encoding {
        SourceEncoding::Unsupported(reason) => return Ok(Transcoded::Unsupported(reason.clone())),
        SourceEncoding::Jpeg => {
            actions.push("was JPEG".to_string());
            image::load_from_memory_with_format(&source.data, ImageFormat::Jpeg)
                .map_err(|e| TranscodeError::Decode(e.to_string()))?
        }
        SourceEncoding::Raw { width, height, channels } => {
            decode_samples(&source.data, *width, *height, *channels, &mut actions)?
        }
    };

    let gray = matches!(
        img.color(),
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16
    );

    // Never upscale
    let img = if img.width() > max_dimension || img.height() > max_dimension {
        let resized = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
        actions.push(format!(
            "resize {}x{} -> {}x{}",
            img.width(),
            img.height(),
            resized.width(),
            resized.height()
        ));
        resized
    } else {
        actions.push(format!("keep dims {}x{}", img.width(), img.height()));
        img
    };

    let (w, h) = img.dimensions();
    let q = jpeg_quality(quality);
    let mut buffer = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, q);
        let encoded = if gray {
            encoder.encode(img.to_luma8().as_raw(), w, h, ColorType::L8.into())
        } else {
            encoder.encode(img.to_rgb8().as_raw(), w, h, ColorType::Rgb8.into())
        };
        encoded.map_err(|e| TranscodeError::Encode(e.to_string()))?;
    }
    actions.push(format!("re-encode: JPEG(q={})", q));

    log::debug!("{}", actions.join(", "));

    if buffer.len() >= source.encoded_len {
        return Ok(Transcoded::SkippedLarger {
            original: source.encoded_len,
            reencoded: buffer.len(),
        });
    }

    Ok(Transcoded::Replaced(TranscodedImage {
        data: buffer,
        width: w,
        height: h,
        gray,
    }))
}

fn decode_samples(
    samples: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    actions: &mut Vec<String>,
) -> Result<DynamicImage, TranscodeError> {
    let short = TranscodeError::SampleLength {
        width,
        height,
        channels,
        actual: samples.len(),
    };
    let expected = match (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels as usize))
    {
        Some(n) if n > 0 && samples.len() >= n => n,
        _ => return Err(short),
    };
    // Trailing padding after the last row is tolerated
    let samples = samples[..expected].to_vec();

    let img = match channels {
        1 => image::GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
        3 => image::RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        4 => {
            actions.push("CMYK->RGB".to_string());
            image::RgbImage::from_raw(width, height, cmyk_to_rgb(&samples))
                .map(DynamicImage::ImageRgb8)
        }
        _ => None,
    };
    img.ok_or(TranscodeError::SampleLength {
        width,
        height,
        channels,
        actual: expected,
    })
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let c = cmyk[0] as f32 / 255.0;
            let m = cmyk[1] as f32 / 255.0;
            let y = cmyk[2] as f32 / 255.0;
            let k = cmyk[3] as f32 / 255.0;

            let r = (1.0 - c) * (1.0 - k);
            let g = (1.0 - m) * (1.0 - k);
            let b = (1.0 - y) * (1.0 - k);

            [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
        })
        .collect()
}
