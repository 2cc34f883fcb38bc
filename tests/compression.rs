mod common;

use common::{jpeg, mb, noisy_rgb, photo_pdf, text_only_pdf, TestPdf};
use lopdf::{dictionary, Document, Object};
use pdf_shrink::ladder::COMPRESSION_LADDER;
use pdf_shrink::rewrite::{collect_images, ImageRewriter};
use pdf_shrink::search::target_bytes;
use pdf_shrink::{
    compress, compress_rasterized, spawn_compress, BackendChoice, CancellationToken, PageRenderer,
    Progress, ProgressEvent, RenderedPage, Settings,
};

fn collect(input: &[u8], target_mb: f64) -> (pdf_shrink::CompressionResult, Vec<ProgressEvent>) {
    let mut events = Vec::new();
    let result = compress(input, target_mb, &mut |e| events.push(e));
    (result, events)
}

#[test]
fn small_file_is_returned_untouched() {
    let input = photo_pdf();
    let (result, events) = collect(&input, 30.0);

    assert!(result.success);
    assert!(result.target_reached);
    assert_eq!(result.step_used, "none (already under target)");
    assert_eq!(result.output.as_deref(), Some(&input[..]));
    assert_eq!(result.final_size_bytes, input.len() as u64);
    assert!(events.iter().all(|e| !e.message.starts_with("Trying step")));
}

#[test]
fn photo_reaches_a_reachable_target() {
    let input = photo_pdf();
    let target_mb = mb(input.len() as f64 * 0.6);
    let (result, events) = collect(&input, target_mb);

    assert!(result.success, "{:?}", result.error_message);
    assert!(result.target_reached);
    assert!(result.final_size_bytes <= target_bytes(target_mb).unwrap());
    // ratio 1.67 starts at the second rung
    assert!(COMPRESSION_LADDER[1..].iter().any(|s| s.name == result.step_used));
    assert!(events[0].message.starts_with("Original size"));
    assert!(events
        .iter()
        .any(|e| e.message.contains("starting at step 'moderate'")));
    assert_eq!(events.last().map(|e| e.message.as_str()), Some("Target reached!"));

    // Text survives: the page still has its font and content stream
    let doc = Document::load_mem(result.output.as_deref().unwrap()).unwrap();
    let page_id = doc.get_pages()[&1];
    let content = doc.get_page_content(page_id).unwrap();
    assert!(String::from_utf8_lossy(&content).contains("(Scanned page) Tj"));
    let fonts = doc
        .get_dictionary(page_id)
        .and_then(|p| p.get(b"Resources"))
        .and_then(Object::as_dict)
        .and_then(|r| r.get(b"Font"))
        .and_then(Object::as_dict)
        .unwrap();
    assert!(fonts.has(b"F1"));
}

#[test]
fn no_step_runs_after_the_first_success() {
    let input = photo_pdf();
    let (result, events) = collect(&input, mb(input.len() as f64 * 0.9));
    let tried: Vec<_> = events
        .iter()
        .filter(|e| e.message.starts_with("Trying step"))
        .filter_map(|e| e.step.clone())
        .collect();
    assert!(result.target_reached);
    assert_eq!(tried.last(), Some(&result.step_used));
    let first = COMPRESSION_LADDER.iter().position(|s| s.name == tried[0]).unwrap();
    let names: Vec<_> = COMPRESSION_LADDER[first..first + tried.len()]
        .iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(tried, names);
}

#[test]
fn zero_image_document_is_never_made_larger() {
    let input = text_only_pdf(2);
    let (result, events) = collect(&input, 0.0001);

    assert!(result.success);
    assert!(!result.target_reached);
    assert!(result.final_size_bytes <= result.original_size_bytes);
    // tiny target starts and ends at the last rung
    assert!(result.step_used == "none" || result.step_used == "extreme");
    if result.step_used == "none" {
        assert_eq!(result.output.as_deref(), Some(&input[..]));
    }
    assert!(events
        .iter()
        .any(|e| e.message.contains("0 images processed")));
    assert!(events.iter().any(|e| e.message.starts_with("Target not reached")));
}

#[test]
fn image_that_would_grow_is_kept() {
    let mut pdf = TestPdf::new();
    let data = jpeg(&noisy_rgb(200, 150), 10);
    let image_id = pdf.add_jpeg(data.clone(), 200, 150);
    pdf.add_page(Some(image_id));
    let input = pdf.finish();
    let doc = Document::load_mem(&input).unwrap();

    let mut sink = |_: ProgressEvent| {};
    let mut progress = Progress::new(&mut sink);
    let (bytes, stats) = ImageRewriter::new()
        .rewrite_document(&doc, &COMPRESSION_LADDER[0], &mut progress)
        .unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped_larger, 1);
    assert_eq!(stats.replaced, 0);
    let out = Document::load_mem(&bytes).unwrap();
    let images = collect_images(&out);
    assert_eq!(images.len(), 1);
    let stream = out.get_object(images[0]).unwrap().as_stream().unwrap();
    assert_eq!(stream.content, data);
}

#[test]
fn shared_image_is_reencoded_once_for_all_pages() {
    let mut pdf = TestPdf::new();
    let image_id = pdf.add_jpeg(jpeg(&noisy_rgb(800, 600), 95), 800, 600);
    for _ in 0..4 {
        pdf.add_page(Some(image_id));
    }
    let input = pdf.finish();
    let (result, events) = collect(&input, mb(input.len() as f64 * 0.5));
    assert!(result.success);

    let doc = Document::load_mem(result.output.as_deref().unwrap()).unwrap();
    let images = collect_images(&doc);
    assert_eq!(images.len(), 1);
    for page_id in doc.get_pages().values() {
        let page = doc.get_dictionary(*page_id).unwrap();
        let xobjects = page
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|r| r.get(b"XObject"))
            .and_then(Object::as_dict)
            .unwrap();
        assert_eq!(xobjects.get(b"Im0").and_then(Object::as_reference).unwrap(), images[0]);
    }
    assert!(events.iter().any(|e| e.message.contains("1 images processed, 1 replaced")));
}

#[test]
fn garbage_input_is_a_total_failure() {
    let input = vec![0x42u8; 100_000];
    let (result, _) = collect(&input, 0.01);
    assert!(!result.success);
    assert!(result.output.is_none());
    assert!(result.error_message.is_some());
    assert_eq!(result.step_used, "none");
}

#[test]
fn bad_target_is_rejected() {
    let input = photo_pdf();
    for target in [0.0, -1.0, f64::NAN] {
        let (result, _) = collect(&input, target);
        assert!(!result.success);
        assert!(result.output.is_none());
    }
}

/// Paints each page a flat colour at the requested scale.
struct PaperRenderer;

impl PageRenderer for PaperRenderer {
    fn render(
        &self,
        _input: &[u8],
        scale: f32,
        sink: &mut dyn FnMut(RenderedPage) -> pdf_shrink::Result<()>,
    ) -> pdf_shrink::Result<()> {
        for _ in 0..2 {
            let (w, h) = ((612.0 * scale) as u32, (792.0 * scale) as u32);
            let paper = image::RgbImage::from_pixel(w, h, image::Rgb([250, 250, 245]));
            sink(RenderedPage {
                width_pt: 612.0,
                height_pt: 792.0,
                image: image::DynamicImage::ImageRgb8(paper),
            })?;
        }
        Ok(())
    }
}

#[test]
fn rasterized_output_has_one_image_per_page() {
    let input = photo_pdf();
    let mut events = Vec::new();
    let result = compress_rasterized(&input, 0.05, &PaperRenderer, &mut |e| events.push(e));

    assert!(result.success);
    assert!(result.target_reached);
    assert_eq!(result.step_used, "minimum");
    let doc = Document::load_mem(result.output.as_deref().unwrap()).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
    assert_eq!(collect_images(&doc).len(), 2);
    let page = doc.get_dictionary(doc.get_pages()[&1]).unwrap();
    let media_box: Vec<f32> = page
        .get(b"MediaBox")
        .and_then(Object::as_array)
        .unwrap()
        .iter()
        .map(|v| v.as_float().unwrap())
        .collect();
    assert_eq!(media_box, vec![0.0, 0.0, 612.0, 792.0]);
    assert!(events.iter().any(|e| e.message.contains("2 rasterized")));
}

#[test]
fn job_streams_events_then_result() {
    let input = photo_pdf();
    let target_mb = mb(input.len() as f64 * 0.6);
    let settings = Settings::default()
        .with_backend(BackendChoice::InProcess)
        .with_target_mb(target_mb);

    let mut job = spawn_compress(input, settings);
    let events: Vec<ProgressEvent> = job.by_ref().collect();
    let result = job.finish();

    assert!(result.success);
    assert!(events[0].message.starts_with("Original size"));
    assert_eq!(events[1].message, format!("Target: {} MB", target_mb));
    assert!(events.iter().any(|e| e.message.starts_with("Trying step")));
    assert_eq!(events.last().map(|e| e.message.as_str()), Some("Target reached!"));
}

#[test]
fn cancelled_job_reports_cancellation() {
    let token = CancellationToken::new();
    token.cancel();
    let input = photo_pdf();
    let settings = Settings::default()
        .with_backend(BackendChoice::InProcess)
        .with_target_mb(mb(input.len() as f64 * 0.5))
        .with_cancellation(token);

    let job = spawn_compress(input, settings);
    assert!(job.cancellation_token().is_cancelled());
    let result = job.finish();
    assert!(!result.success);
    assert_eq!(result.error_message.as_deref(), Some("cancelled"));
    assert!(result.output.is_none());
}

#[test]
fn finishing_early_keeps_pending_events() {
    let input = photo_pdf();
    let settings = Settings::default()
        .with_backend(BackendChoice::InProcess)
        .with_target_mb(mb(input.len() as f64 * 0.6));

    let (result, events) = spawn_compress(input, settings).finish_with_events();
    assert!(result.success);
    assert!(events[0].message.starts_with("Original size"));
    assert_eq!(events.last().map(|e| e.message.as_str()), Some("Target reached!"));
}

#[test]
fn image_with_negative_dimensions_is_skipped() {
    let mut pdf = TestPdf::new();
    let image_id = pdf.doc.add_object(lopdf::Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => -1,
            "Height" => -1,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        noisy_rgb(100, 67).into_raw(),
    ));
    pdf.add_page(Some(image_id));
    let input = pdf.finish();

    let (result, events) = collect(&input, 0.001);
    assert!(result.success);
    assert!(!result.target_reached);
    assert!(events
        .iter()
        .any(|e| e.message.contains("unsupported (invalid dimensions)")));
    assert!(events.iter().any(|e| e.message.contains("1 unsupported")));
}
