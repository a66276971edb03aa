//! End-to-end renders of request paths through the public API.
//!
//! Source images are generated in memory; every case parses a full path,
//! renders it with the default engine and checks the decoded output size.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use pathimg::config::ProcessorConfig;
use pathimg::imaging::OutputFormat;
use pathimg::loader::MemoryLoader;
use pathimg::path::parse_request_path;
use pathimg::pipeline::{self, CancelToken, ProcessError, Rendered};
use std::io::Cursor;

fn png(image: RgbaImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn loader() -> MemoryLoader {
    let gopher = RgbaImage::from_fn(320, 240, |x, y| {
        Rgba([(x * 255 / 320) as u8, (y * 255 / 240) as u8, 90, 255])
    });
    let find_trim = RgbaImage::from_fn(300, 200, |x, y| {
        let inside = (30..270).contains(&x) && (30..170).contains(&y);
        Rgba(if inside {
            [20, 60, 200, 255]
        } else {
            [255, 255, 255, 255]
        })
    });
    let front = RgbaImage::from_pixel(48, 32, Rgba([0, 160, 0, 180]));

    MemoryLoader::new()
        .with("gopher.png", png(gopher))
        .with("find_trim.png", png(find_trim))
        .with("gopher-front.png", png(front))
}

fn render(path: &str) -> Result<Rendered, ProcessError> {
    let plan = parse_request_path(path)?;
    let config = ProcessorConfig::default();
    pipeline::process(&plan, &loader(), &config, &CancelToken::new())
}

fn decoded(rendered: &Rendered) -> (u32, u32) {
    let image = image::load_from_memory(&rendered.bytes).unwrap();
    (image.width(), image.height())
}

fn assert_renders(path: &str, expected: (u32, u32)) {
    let rendered = render(path).unwrap_or_else(|e| panic!("{path}: {e}"));
    assert_eq!(decoded(&rendered), expected, "{path}");
    assert_eq!((rendered.width, rendered.height), expected, "{path}");
}

#[test]
fn cover_and_alignment_paths() {
    let cases = [
        ("unsafe/100x100/gopher.png", (100, 100)),
        ("unsafe/100x100/smart/gopher.png", (100, 100)),
        ("unsafe/200x100/top/gopher.png", (200, 100)),
        ("unsafe/200x100/right/top/gopher.png", (200, 100)),
        ("unsafe/200x100/bottom/gopher.png", (200, 100)),
        ("unsafe/200x100/left/bottom/gopher.png", (200, 100)),
        ("unsafe/100x200/left/gopher.png", (100, 200)),
        ("unsafe/100x200/left/bottom/gopher.png", (100, 200)),
        ("unsafe/100x200/right/gopher.png", (100, 200)),
        ("unsafe/100x200/right/top/gopher.png", (100, 200)),
        ("unsafe/stretch/100x100/gopher.png", (100, 100)),
    ];
    for (path, expected) in cases {
        assert_renders(path, expected);
    }
}

#[test]
fn fit_in_with_fill_embeds_into_the_box() {
    assert_renders(
        "unsafe/fit-in/-200x210/filters:hue(290):saturation(100):fill(FF0)/gopher.png",
        (200, 210),
    );
    assert_renders(
        "unsafe/fit-in/200x210/filters:fill(yellow):round_corner(40,60)/gopher.png",
        (200, 210),
    );
}

#[test]
fn fill_with_letter_o_is_a_bad_argument() {
    let err = render("unsafe/fit-in/-200x210/filters:fill(FFO)/gopher.png").unwrap_err();
    assert!(matches!(err, ProcessError::FilterArg(_)), "{err}");
}

#[test]
fn flipped_cover_to_jpeg() {
    let rendered = render(
        "unsafe/200x-210/top/filters:blur(5):background_color(ffff00):format(jpeg):quality(70)/gopher.png",
    )
    .unwrap();
    assert_eq!(rendered.format, OutputFormat::Jpeg);
    assert_eq!(rendered.content_type, "image/jpeg");
    assert_eq!(
        image::guess_format(&rendered.bytes).unwrap(),
        ImageFormat::Jpeg
    );
    assert_eq!(decoded(&rendered), (200, 210));
}

#[test]
fn crop_then_stretch() {
    assert_renders(
        "unsafe/10x20:300x500/stretch/100x200/filters:brightness(-20):contrast(50):rgb(10,-50,30):fill(black)/gopher.png",
        (100, 200),
    );
}

#[test]
fn padding_then_rotate_swaps_axes() {
    assert_renders(
        "/unsafe/fit-in/-200x-210/30x30/filters:rotate(90):fill(blur):grayscale()/gopher.png",
        (270, 260),
    );
}

#[test]
fn trim_paths() {
    assert_renders(
        "unsafe/trim:bottom-right/500x500/filters:strip_exif():upscale()/find_trim.png",
        (500, 500),
    );
    assert_renders(
        "unsafe/trim/fit-in/1000x1000/filters:upscale()/find_trim.png",
        (1000, 583),
    );
    // `stretch()` is not a filter and is dropped under the default policy.
    assert_renders(
        "unsafe/trim:50/500x500/filters:stretch()/find_trim.png",
        (500, 500),
    );
}

#[test]
fn trim_filter_runs_after_fill() {
    let rendered = render("unsafe/fit-in/100x100/filters:fill(auto):trim(50)/find_trim.png").unwrap();
    let (w, h) = decoded(&rendered);
    assert!(w < 100 && h < 100, "got {w}x{h}");
}

#[test]
fn stacked_watermarks_keep_the_base_size() {
    assert_renders(
        "unsafe/filters:fill(white):watermark(gopher.png,10p,repeat,30,20,20):watermark(gopher.png,repeat,bottom,30,30,30):watermark(gopher-front.png,center,-10p)/gopher.png",
        (320, 240),
    );
}

#[test]
fn missing_watermark_image_is_not_found() {
    let err = render("unsafe/filters:watermark(nope.png,0,0)/gopher.png").unwrap_err();
    assert!(matches!(err, ProcessError::NotFound(ref id) if id == "nope.png"), "{err}");
}

#[test]
fn rendering_is_deterministic() {
    let path = "unsafe/fit-in/150x150/smart/filters:blur(1):format(png)/gopher.png";
    assert_eq!(render(path).unwrap().bytes, render(path).unwrap().bytes);
}

#[test]
fn filter_order_changes_the_result() {
    let a = render("unsafe/filters:brightness(50):contrast(50)/gopher.png").unwrap();
    let b = render("unsafe/filters:contrast(50):brightness(50)/gopher.png").unwrap();
    assert_ne!(a.bytes, b.bytes);
}

#[test]
fn meta_reports_the_output_geometry() {
    let rendered = render("unsafe/meta/fit-in/100x100/gopher.png").unwrap();
    assert_eq!(rendered.content_type, "application/json");

    let json: serde_json::Value = serde_json::from_slice(&rendered.bytes).unwrap();
    assert_eq!(json["width"], 100);
    assert_eq!(json["height"], 75);
    assert_eq!(json["content_type"], "image/png");
}

#[test]
fn unknown_image_is_not_found() {
    let err = render("unsafe/100x100/missing.png").unwrap_err();
    assert!(matches!(err, ProcessError::NotFound(_)), "{err}");
}
