//! Rasterize fallback: every page becomes one full-page JPEG.
//!
//! This throws away selectable text and vector content, so it only runs when
//! the caller asks for it.

#[cfg(feature = "pdfium")]
pub mod pdfium;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::ladder::{jpeg_quality, RasterStep};
use crate::progress::{cancelled, CancellationToken, Progress, ProgressEvent};
use crate::rewrite::{load_document, save_document};
use crate::search::RungRunner;

/// One rendered page together with the size it had in the source, in points.
pub struct RenderedPage {
    pub width_pt: f32,
    pub height_pt: f32,
    pub image: DynamicImage,
}

/// Renders whole pages to bitmaps.
pub trait PageRenderer {
    /// Checked once before the first rung.
    fn validate(&self, input: &[u8]) -> Result<()> {
        load_document(input).map(|_| ())
    }

    /// Render every page at `scale` (1.0 = 72 dpi), in page order.
    fn render(
        &self,
        input: &[u8],
        scale: f32,
        sink: &mut dyn FnMut(RenderedPage) -> Result<()>,
    ) -> Result<()>;
}

/// The renderer compiled into this build, if any.
pub fn default_renderer() -> Result<Box<dyn PageRenderer>> {
    #[cfg(feature = "pdfium")]
    {
        Ok(Box::new(pdfium::PdfiumRenderer::new()?))
    }
    #[cfg(not(feature = "pdfium"))]
    {
        Err(Error::Backend(
            "no page renderer in this build (enable the `pdfium` feature)".to_string(),
        ))
    }
}

pub struct Rasterizer<'r> {
    renderer: &'r dyn PageRenderer,
    cancel: Option<CancellationToken>,
}

impl<'r> Rasterizer<'r> {
    pub fn new(renderer: &'r dyn PageRenderer) -> Self {
        Self {
            renderer,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }
}

impl RungRunner<RasterStep> for Rasterizer<'_> {
    fn validate(&self, input: &[u8]) -> Result<()> {
        self.renderer.validate(input)
    }

    fn run(&self, input: &[u8], step: &RasterStep, progress: &mut Progress<'_>) -> Result<Vec<u8>> {
        let mut assembler = PageAssembler::new();
        let quality = jpeg_quality(step.quality);
        self.renderer.render(input, step.scale, &mut |page| {
            if cancelled(self.cancel.as_ref()) {
                return Err(Error::Cancelled);
            }
            assembler.add_page(page, quality)
        })?;
        progress.emit(
            ProgressEvent::new(format!("  Pages: {} rasterized", assembler.page_count()))
                .with_step(step.name),
        );
        assembler.finish()
    }
}

/// Builds a fresh document with one image per page.
pub struct PageAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for PageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAssembler {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub fn add_page(&mut self, page: RenderedPage, quality: u8) -> Result<()> {
        let rgb = flatten_onto_white(&page.image);
        let (w, h) = rgb.dimensions();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode(rgb.as_raw(), w, h, ColorType::Rgb8.into())
            .map_err(|e| Error::Render(format!("Failed to encode page: {}", e)))?;

        let image_id = self.doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => w as i64,
                    "Height" => h as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                jpeg,
            )
            .with_compression(false),
        );

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        page.width_pt.into(),
                        0.into(),
                        0.into(),
                        page.height_pt.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| Error::Render(format!("Failed to encode page content: {}", e)))?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), page.width_pt.into(), page.height_pt.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    pub fn finish(mut self) -> Result<Vec<u8>> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        save_document(&mut self.doc)
    }
}

/// JPEG has no alpha; transparent areas become white paper.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let a = p[3] as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a)) / 255) as u8;
        Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}
