use image::GenericImageView;
use resizekit::transform::params::{OutputFormat, ResizeOptions};
use resizekit::transform::{decode_image, encode_image, resize_image, ImageTransformer, RasterTransformer};

fn options(width: u32, height: u32, quality: u8, format: &str) -> ResizeOptions {
    ResizeOptions { width, height, quality, format: format.into() }
}

#[test]
fn resize_and_encode_jpeg() {
    // Create a small RGB image in memory
    let img = image::DynamicImage::new_rgb8(800, 600);
    let resized = resize_image(&img, 400, 300);
    let out = encode_image(&resized, OutputFormat::Jpeg, 80).unwrap();
    assert_eq!(&out[..2], &[0xFF, 0xD8]);
}

#[test]
fn decode_then_webp() {
    // Generate a simple PNG in memory to test decode path
    let img = image::DynamicImage::new_rgba8(64, 64);
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png).unwrap();
    let decoded = decode_image(&png).unwrap();
    let out = encode_image(&decoded, OutputFormat::Webp, 75).unwrap();
    assert_eq!(&out[..4], b"RIFF");
    assert_eq!(&out[8..12], b"WEBP");
}

#[test]
fn landscape_source_into_portrait_box_is_cropped_not_stretched() {
    let mut img = image::RgbImage::new(300, 100);
    // Red left third, green centre, blue right third.
    for (x, _, px) in img.enumerate_pixels_mut() {
        *px = match x {
            0..=99 => image::Rgb([255, 0, 0]),
            100..=199 => image::Rgb([0, 255, 0]),
            _ => image::Rgb([0, 0, 255]),
        };
    }
    let resized = resize_image(&image::DynamicImage::ImageRgb8(img), 50, 50);

    assert_eq!(resized.dimensions(), (50, 50));
    let centre = resized.get_pixel(25, 25);
    assert!(centre[1] > 200 && centre[0] < 50 && centre[2] < 50);
}

#[test]
fn quality_changes_jpeg_size() {
    let mut img = image::RgbImage::new(128, 128);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = image::Rgb([(x * 2) as u8, (y * 2) as u8, ((x ^ y) * 2) as u8]);
    }
    let png = {
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    };

    let low = RasterTransformer.transform(&png, &options(128, 128, 10, "jpeg")).unwrap();
    let high = RasterTransformer.transform(&png, &options(128, 128, 95, "jpeg")).unwrap();
    assert!(low.len() < high.len());
}

#[test]
fn jpg_alias_encodes_jpeg() {
    let img = image::DynamicImage::new_rgb8(16, 16);
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png).unwrap();

    let out = RasterTransformer.transform(&png, &options(8, 8, 80, "jpg")).unwrap();
    assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Jpeg);
    assert_eq!(image::load_from_memory(&out).unwrap().dimensions(), (8, 8));
}
