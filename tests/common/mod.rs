//! Builds small PDFs in memory.
#![allow(dead_code)]

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Deterministic high-entropy picture; compresses badly, like a photo scan.
pub fn noisy_rgb(width: u32, height: u32) -> RgbImage {
    let mut state: u32 = 0x9E37_79B9;
    RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        Rgb([next(), next(), next()])
    })
}

pub fn jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8.into())
        .unwrap();
    out
}

pub struct TestPdf {
    pub doc: Document,
    pub pages_id: ObjectId,
    kids: Vec<Object>,
}

impl TestPdf {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn add_jpeg(&mut self, data: Vec<u8>, width: u32, height: u32) -> ObjectId {
        self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            data,
        ))
    }

    /// A page drawing `image` full-width, with a line of text above it.
    pub fn add_page(&mut self, image: Option<ObjectId>) -> ObjectId {
        let font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 740.into()]),
            Operation::new("Tj", vec![Object::string_literal("Scanned page")]),
            Operation::new("ET", vec![]),
        ];
        let mut resources = dictionary! { "Font" => dictionary! { "F1" => font_id } };
        if let Some(image_id) = image {
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![468.into(), 0.into(), 0.into(), 351.into(), 72.into(), 300.into()],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ]);
            resources.set("XObject", dictionary! { "Im0" => image_id });
        }
        let content = Content { operations };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.kids.push(page_id.into());
        page_id
    }

    /// Classic uncompressed serialization, the way many scanners write.
    pub fn finish(mut self) -> Vec<u8> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        self.doc.save_to(&mut out).unwrap();
        out
    }
}

/// One page showing a noisy 800x600 photo stored at high quality.
pub fn photo_pdf() -> Vec<u8> {
    let mut pdf = TestPdf::new();
    let image = pdf.add_jpeg(jpeg(&noisy_rgb(800, 600), 95), 800, 600);
    pdf.add_page(Some(image));
    pdf.finish()
}

pub fn text_only_pdf(pages: usize) -> Vec<u8> {
    let mut pdf = TestPdf::new();
    for _ in 0..pages {
        pdf.add_page(None);
    }
    pdf.finish()
}

pub fn mb(bytes: f64) -> f64 {
    bytes / 1_048_576.0
}
