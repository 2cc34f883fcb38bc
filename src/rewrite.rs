//! Walks a document's pages, re-encodes every distinct embedded image once
//! and serializes the result.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;

use anyhow::{anyhow, Context};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use rayon::prelude::*;

use crate::error::{Error, Result, TranscodeError};
use crate::ladder::CompressionStep;
use crate::progress::{cancelled, CancellationToken, Progress, ProgressEvent};
use crate::search::RungRunner;
use crate::transcode::{transcode, ImageSource, Transcoded, TranscodedImage};

/// Deepest page-tree or form nesting we follow.
const MAX_DEPTH: usize = 32;

/// Keys carried over from the original image dictionary to its replacement.
/// Soft masks and explicit masks are mapped onto the unit square, so they
/// stay valid at any resolution.
const KEPT_IMAGE_KEYS: [&[u8]; 5] = [b"SMask", b"Mask", b"Interpolate", b"Intent", b"OC"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub processed: usize,
    pub replaced: usize,
    pub skipped_larger: usize,
    pub unsupported: usize,
    pub failed: usize,
}

impl fmt::Display for RewriteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} images processed, {} replaced, {} skipped (larger), {} unsupported, {} failed",
            self.processed, self.replaced, self.skipped_larger, self.unsupported, self.failed
        )
    }
}

/// Parse input bytes, decrypting with the empty password when needed.
pub fn load_document(input: &[u8]) -> Result<Document> {
    let mut doc = Document::load_mem(input)?;
    if doc.is_encrypted() {
        doc.decrypt("")
            .map_err(|e| Error::Parse(format!("encrypted document: {}", e)))?;
    }
    Ok(doc)
}

/// Serialize with object streams and cross-reference streams.
pub fn save_document(doc: &mut Document) -> Result<Vec<u8>> {
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_modern(&mut buffer)
        .map_err(|e| Error::Save(e.to_string()))?;
    Ok(buffer)
}

#[derive(Debug, Clone)]
pub struct ImageRewriter {
    parallel: bool,
    cancel: Option<CancellationToken>,
}

impl Default for ImageRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageRewriter {
    pub fn new() -> Self {
        Self {
            parallel: true,
            cancel: None,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Rewrite a copy of `doc`; the caller's document is left untouched.
    pub fn rewrite_document(
        &self,
        doc: &Document,
        step: &CompressionStep,
        progress: &mut Progress<'_>,
    ) -> Result<(Vec<u8>, RewriteStats)> {
        let mut doc = doc.clone();
        let stats = self.apply(&mut doc, step, progress)?;
        Ok((save_document(&mut doc)?, stats))
    }

    /// Substitute re-encoded images into `doc` in place.
    pub fn apply(
        &self,
        doc: &mut Document,
        step: &CompressionStep,
        progress: &mut Progress<'_>,
    ) -> Result<RewriteStats> {
        let ids = collect_images(doc);
        let mut stats = RewriteStats {
            processed: ids.len(),
            ..Default::default()
        };

        let mut sources = Vec::with_capacity(ids.len());
        for id in &ids {
            if cancelled(self.cancel.as_ref()) {
                return Err(Error::Cancelled);
            }
            let source = match doc.get_object(*id) {
                Ok(Object::Stream(stream)) => image_source(doc, stream),
                _ => ImageSource::unsupported("not a stream", 0),
            };
            sources.push(source);
        }

        type Outcome = std::result::Result<Transcoded, TranscodeError>;
        let run = |source: &ImageSource| -> Option<Outcome> {
            if cancelled(self.cancel.as_ref()) {
                return None;
            }
            Some(transcode(source, step.max_dimension, step.quality))
        };
        let outcomes: Vec<_> = if self.parallel {
            sources.par_iter().map(run).collect()
        } else {
            sources.iter().map(run).collect()
        };

        let mut replacements = HashMap::new();
        for ((id, source), outcome) in ids.iter().zip(&sources).zip(outcomes) {
            match outcome {
                None => return Err(Error::Cancelled),
                Some(Ok(Transcoded::Replaced(img))) => {
                    let dict = match doc.get_object(*id) {
                        Ok(Object::Stream(stream)) => stream.dict.clone(),
                        _ => Dictionary::new(),
                    };
                    log::debug!(
                        "Image {} {}: {} -> {} bytes",
                        id.0,
                        id.1,
                        source.encoded_len,
                        img.data.len()
                    );
                    let new_id = doc.add_object(jpeg_stream(&dict, img));
                    replacements.insert(*id, new_id);
                    stats.replaced += 1;
                }
                Some(Ok(Transcoded::SkippedLarger { original, reencoded })) => {
                    log::debug!(
                        "Image {}: kept, re-encoded {} >= {} bytes",
                        id.0,
                        reencoded,
                        original
                    );
                    stats.skipped_larger += 1;
                }
                Some(Ok(Transcoded::Unsupported(reason))) => {
                    let message = format!("  Image {} kept: unsupported ({})", id.0, reason);
                    progress.emit(ProgressEvent::new(message).with_step(step.name));
                    stats.unsupported += 1;
                }
                Some(Err(e)) => {
                    let message = format!("  Image {} skipped: {}", id.0, e);
                    progress.failure(ProgressEvent::new(message).with_step(step.name));
                    stats.failed += 1;
                }
            }
        }

        if !replacements.is_empty() {
            repoint_references(doc, &replacements);
            for old in replacements.keys() {
                doc.objects.remove(old);
            }
        }

        progress.emit(ProgressEvent::new(format!("  Images: {}", stats)).with_step(step.name));
        Ok(stats)
    }
}

impl RungRunner<CompressionStep> for ImageRewriter {
    fn validate(&self, input: &[u8]) -> Result<()> {
        load_document(input).map(|_| ())
    }

    fn run(
        &self,
        input: &[u8],
        step: &CompressionStep,
        progress: &mut Progress<'_>,
    ) -> Result<Vec<u8>> {
        // Fresh parse per rung: rungs never see each other's substitutions
        let mut doc = load_document(input)?;
        self.apply(&mut doc, step, progress)?;
        save_document(&mut doc)
    }
}

/// Distinct image XObjects reachable from the pages, in discovery order.
pub fn collect_images(doc: &Document) -> Vec<ObjectId> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();
    for page_id in doc.get_pages().into_values() {
        if let Some(resources) = page_resources(doc, page_id) {
            collect_from_resources(doc, resources, &mut images, &mut seen, 0);
        }
    }
    images
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Page resources, inherited through the page tree when absent.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_DEPTH {
        if let Ok(resources) = current.get(b"Resources") {
            return resolve(doc, resources).and_then(|o| o.as_dict().ok());
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn collect_from_resources(
    doc: &Document,
    resources: &Dictionary,
    images: &mut Vec<ObjectId>,
    seen: &mut HashSet<ObjectId>,
    depth: usize,
) {
    if depth > MAX_DEPTH {
        return;
    }
    let xobjects = match resources.get(b"XObject").ok().and_then(|o| resolve(doc, o)) {
        Some(Object::Dictionary(d)) => d,
        _ => return,
    };
    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let Ok(Object::Stream(stream)) = doc.get_object(id) else {
            continue;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => images.push(id),
            Ok(b"Form") => {
                if let Some(Object::Dictionary(inner)) =
                    stream.dict.get(b"Resources").ok().and_then(|o| resolve(doc, o))
                {
                    collect_from_resources(doc, inner, images, seen, depth + 1);
                }
            }
            _ => {}
        }
    }
}

/// Point every reference to a replaced image at its replacement.
fn repoint_references(doc: &mut Document, map: &HashMap<ObjectId, ObjectId>) {
    for object in doc.objects.values_mut() {
        repoint(object, map);
    }
}

fn repoint(object: &mut Object, map: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(new_id) = map.get(id) {
                *id = *new_id;
            }
        }
        Object::Array(items) => items.iter_mut().for_each(|o| repoint(o, map)),
        Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, o)| repoint(o, map)),
        Object::Stream(stream) => stream.dict.iter_mut().for_each(|(_, o)| repoint(o, map)),
        _ => {}
    }
}

fn jpeg_stream(original: &Dictionary, img: TranscodedImage) -> Stream {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => img.width as i64,
        "Height" => img.height as i64,
        "ColorSpace" => if img.gray { "DeviceGray" } else { "DeviceRGB" },
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    for key in KEPT_IMAGE_KEYS {
        match original.get(key) {
            // A colour-key mask array refers to the old sample values
            Ok(Object::Array(_)) if key == b"Mask" => {}
            Ok(value) => dict.set(key.to_vec(), value.clone()),
            Err(_) => {}
        }
    }
    Stream::new(dict, img.data).with_compression(false)
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter").ok().and_then(|o| resolve(doc, o)) {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| resolve(doc, o))
            .filter_map(|o| o.as_name().ok())
            .map(<[u8]>::to_vec)
            .collect(),
        _ => Vec::new(),
    }
}

fn color_channels(doc: &Document, dict: &Dictionary) -> Option<u8> {
    let cs = resolve(doc, dict.get(b"ColorSpace").ok()?)?;
    match cs {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Some(1),
            b"DeviceRGB" | b"CalRGB" => Some(3),
            b"DeviceCMYK" => Some(4),
            _ => None,
        },
        Object::Array(arr) => {
            let family = arr.first()?.as_name().ok()?;
            match family {
                b"ICCBased" => {
                    let Some(Object::Stream(icc)) = resolve(doc, arr.get(1)?) else {
                        return None;
                    };
                    let n = icc.dict.get(b"N").and_then(Object::as_i64).ok()?;
                    u8::try_from(n).ok().filter(|n| matches!(*n, 1 | 3 | 4))
                }
                b"CalGray" => Some(1),
                b"CalRGB" => Some(3),
                _ => None,
            }
        }
        _ => None,
    }
}

fn decompress_stream(stream: &Stream) -> anyhow::Result<Vec<u8>> {
    match stream.decompressed_content() {
        Ok(c) => Ok(c),
        Err(e) => {
            let filter = stream.dict.get(b"Filter").ok().and_then(|o| o.as_name().ok());
            if filter == Some(b"FlateDecode".as_slice()) {
                let mut decoder = flate2::read::ZlibDecoder::new(&stream.content[..]);
                let mut buffer = Vec::new();
                decoder
                    .read_to_end(&mut buffer)
                    .context("Manual zlib failed")?;
                Ok(buffer)
            } else {
                Err(anyhow!("Decompression failed: {}", e))
            }
        }
    }
}

/// Classify an image stream and pull out the bytes the transcoder needs.
pub fn image_source(doc: &Document, stream: &Stream) -> ImageSource {
    let dict = &stream.dict;
    let encoded_len = stream.content.len();

    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return ImageSource::unsupported("stencil mask", encoded_len);
    }
    if dict.has(b"Decode") {
        return ImageSource::unsupported("custom Decode array", encoded_len);
    }

    let filters = filter_names(doc, dict);
    match filters.as_slice() {
        [dct] if dct == b"DCTDecode" => return ImageSource::jpeg(stream.content.clone()),
        [] => {}
        [flate] if flate == b"FlateDecode" => {}
        other => {
            let names: Vec<_> = other
                .iter()
                .map(|n| String::from_utf8_lossy(n).into_owned())
                .collect();
            return ImageSource::unsupported(names.join("+"), encoded_len);
        }
    }

    let bpc = dict.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8);
    if bpc != 8 {
        return ImageSource::unsupported(format!("{} bits per component", bpc), encoded_len);
    }
    let dimension = |key: &[u8]| {
        dict.get(key)
            .and_then(Object::as_i64)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
    };
    let (Some(width), Some(height)) = (dimension(&b"Width"[..]), dimension(&b"Height"[..])) else {
        return ImageSource::unsupported("invalid dimensions", encoded_len);
    };

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        match decompress_stream(stream) {
            Ok(samples) => samples,
            Err(e) => return ImageSource::unsupported(e.to_string(), encoded_len),
        }
    };

    let channels = if dict.has(b"ColorSpace") {
        match color_channels(doc, dict) {
            Some(c) => c,
            None => return ImageSource::unsupported("colour space", encoded_len),
        }
    } else {
        // No colour space: guess from the sample count
        let pixels = (width as usize).checked_mul(height as usize);
        let len = Some(samples.len());
        if len == pixels {
            1
        } else if len == pixels.and_then(|p| p.checked_mul(4)) {
            4
        } else {
            3
        }
    };

    ImageSource::raw(samples, width, height, channels, encoded_len)
}
