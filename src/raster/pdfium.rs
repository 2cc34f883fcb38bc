//! Page rendering through PDFium (dynamically linked).

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;

use super::{PageRenderer, RenderedPage};
use crate::error::{Error, Result};

pub struct PdfiumRenderer {
    pdfium: Pdfium,
}

impl PdfiumRenderer {
    /// Looks for libpdfium next to the executable first, then system paths.
    pub fn new() -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Error::Backend(format!("Failed to load PDFium library: {:?}", e)))?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn validate(&self, input: &[u8]) -> Result<()> {
        self.pdfium
            .load_pdf_from_byte_slice(input, None)
            .map(|_| ())
            .map_err(|e| Error::Parse(format!("{:?}", e)))
    }

    fn render(
        &self,
        input: &[u8],
        scale: f32,
        sink: &mut dyn FnMut(RenderedPage) -> Result<()>,
    ) -> Result<()> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(input, None)
            .map_err(|e| Error::Parse(format!("{:?}", e)))?;
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);

        for (index, page) in document.pages().iter().enumerate() {
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| Error::Render(format!("page {}: {:?}", index + 1, e)))?;
            let (w, h) = (bitmap.width() as u32, bitmap.height() as u32);
            let rgba = RgbaImage::from_raw(w, h, bitmap.as_rgba_bytes())
                .ok_or_else(|| Error::Render(format!("page {}: bitmap size mismatch", index + 1)))?;
            sink(RenderedPage {
                width_pt: page.width().value,
                height_pt: page.height().value,
                image: DynamicImage::ImageRgba8(rgba),
            })?;
        }
        Ok(())
    }
}
