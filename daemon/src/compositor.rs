//! Builds one bitmap spanning every monitor.
//!
//! Each monitor gets its own image scaled to cover the monitor (aspect ratio
//! kept, excess cropped evenly on both sides). The tiles are placed at the
//! monitor's offset from the top-left corner of the virtual desktop, so the
//! result can be shown tiled without any further scaling by the desktop.

use anyhow::{Context, Result};
use common::MonitorRect;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::fs;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use crate::config::CompositorSettings;

/// Bounding box of all monitors in virtual-desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Smallest rectangle containing every monitor, `None` without monitors
pub fn virtual_bounds(monitors: &[MonitorRect]) -> Option<Bounds> {
    let min_x = monitors.iter().map(|m| m.x).min()?;
    let min_y = monitors.iter().map(|m| m.y).min()?;
    let max_right = monitors.iter().map(|m| m.right()).max()?;
    let max_bottom = monitors.iter().map(|m| m.bottom()).max()?;

    Some(Bounds {
        x: min_x,
        y: min_y,
        width: (max_right - min_x as i64).max(0) as u32,
        height: (max_bottom - min_y as i64).max(0) as u32,
    })
}

/// Size an image must be scaled to so it covers `target` without distortion.
///
/// Height is fitted first; if the width then falls short, width is fitted
/// instead. Both results are at least the target size.
pub fn cover_size(src_width: u32, src_height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (target_width, target_height);
    }

    let ratio = src_height as f64 / src_width as f64;

    let mut out_height = target_height as f64;
    let mut out_width = out_height / ratio;

    if out_width < target_width as f64 {
        out_width = target_width as f64;
        out_height = out_width * ratio;
    }

    (
        (out_width.round() as u32).max(target_width),
        (out_height.round() as u32).max(target_height),
    )
}

/// Centered source region `(left, top, width, height)` with the target's
/// aspect ratio. Resizing just this region to the target gives the same
/// pixels as scaling to [`cover_size`] and cropping, without the oversized
/// intermediate buffer.
pub fn cover_crop(src_width: u32, src_height: u32, target_width: u32, target_height: u32) -> (f64, f64, f64, f64) {
    let (scaled_width, scaled_height) = cover_size(src_width, src_height, target_width, target_height);

    let crop_width = src_width as f64 * target_width as f64 / scaled_width as f64;
    let crop_height = src_height as f64 * target_height as f64 / scaled_height as f64;

    (
        (src_width as f64 - crop_width) / 2.0,
        (src_height as f64 - crop_height) / 2.0,
        crop_width,
        crop_height,
    )
}

/// Encoding of the composed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Bmp,
    Jpeg,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "bmp" => Ok(Self::Bmp),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            _ => anyhow::bail!("Unknown output format: {}", name),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Bmp => "bmp",
            Self::Jpeg => "jpg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Bmp => ImageFormat::Bmp,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Renders and writes virtual-desktop wallpapers
pub struct Compositor {
    filter: String,
    format: OutputFormat,
    output_dir: PathBuf,
    keep_files: usize,
    applied: VecDeque<PathBuf>,
}

impl Compositor {
    pub fn new(settings: &CompositorSettings, output_dir: PathBuf) -> Result<Self> {
        Ok(Self {
            filter: settings.filter.clone(),
            format: OutputFormat::from_name(&settings.format)?,
            output_dir,
            keep_files: settings.keep_files.max(1),
            applied: VecDeque::new(),
        })
    }

    /// Compose one canvas for `monitors`, image `i` going to monitor `i`.
    ///
    /// A monitor whose image cannot be loaded (or that has no image) stays
    /// transparent; the rest of the canvas is still produced.
    pub fn compose(&self, images: &[PathBuf], monitors: &[MonitorRect]) -> Result<RgbaImage> {
        let bounds = virtual_bounds(monitors).context("No monitors to compose for")?;
        let start = std::time::Instant::now();

        let tiles: Vec<Option<RgbaImage>> = monitors
            .par_iter()
            .enumerate()
            .map(|(index, monitor)| {
                let path = images.get(index)?;
                match self.render_tile(path, monitor.width, monitor.height) {
                    Ok(tile) => Some(tile),
                    Err(e) => {
                        log::warn!(
                            "Leaving monitor {} blank, {}: {:#}",
                            monitor.name,
                            path.display(),
                            e
                        );
                        None
                    }
                }
            })
            .collect();

        let mut canvas = RgbaImage::new(bounds.width, bounds.height);
        for (monitor, tile) in monitors.iter().zip(tiles) {
            if let Some(tile) = tile {
                let x = monitor.x as i64 - bounds.x as i64;
                let y = monitor.y as i64 - bounds.y as i64;
                image::imageops::replace(&mut canvas, &tile, x, y);
            }
        }

        log::info!(
            "Composed {}x{} wallpaper for {} monitor(s) in {:.2}ms",
            bounds.width,
            bounds.height,
            monitors.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(canvas)
    }

    /// Load `path` and cover a `width` x `height` area with it
    fn render_tile(&self, path: &Path, width: u32, height: u32) -> Result<RgbaImage> {
        let image = image::ImageReader::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("Failed to decode {}", path.display()))?;

        self.cover(&image, width, height)
    }

    /// Cover the target: resize the centered region with its aspect ratio
    pub fn cover(&self, image: &DynamicImage, width: u32, height: u32) -> Result<RgbaImage> {
        if image.width() == 0 || image.height() == 0 {
            anyhow::bail!("Image has no pixels");
        }
        if width == 0 || height == 0 {
            return Ok(RgbaImage::new(width, height));
        }

        let crop = cover_crop(image.width(), image.height(), width, height);
        self.resize(image, crop, width, height)
    }

    fn resize_alg(&self) -> fast_image_resize::ResizeAlg {
        use fast_image_resize as fr;

        match self.filter.as_str() {
            "nearest" => fr::ResizeAlg::Nearest,
            "bilinear" => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
            "catmull-rom" => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
            _ => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
        }
    }

    /// Fast image resizing using fast_image_resize, reading only the `crop`
    /// region of the source
    fn resize(
        &self,
        image: &DynamicImage,
        crop: (f64, f64, f64, f64),
        target_width: u32,
        target_height: u32,
    ) -> Result<RgbaImage> {
        use fast_image_resize as fr;

        let src_image = image.to_rgba8();
        let (src_width, src_height) = src_image.dimensions();

        if (src_width, src_height) == (target_width, target_height) {
            return Ok(src_image);
        }

        let src = fr::images::Image::from_vec_u8(
            TryInto::try_into(src_width)?,
            TryInto::try_into(src_height)?,
            src_image.into_raw(),
            fr::PixelType::U8x4,
        )
        .context("Failed to create source image")?;

        let mut dst = fr::images::Image::new(
            TryInto::try_into(target_width)?,
            TryInto::try_into(target_height)?,
            fr::PixelType::U8x4,
        );

        let mut resizer = fr::Resizer::new();
        resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(self.resize_alg())
                    .crop(crop.0, crop.1, crop.2, crop.3),
            )
            .context("Failed to resize image")?;

        RgbaImage::from_raw(target_width, target_height, dst.into_vec())
            .context("Failed to create output image buffer")
    }

    /// Write `canvas` to a new, uniquely named file in the output directory
    pub fn write(&self, canvas: RgbaImage) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        let (file, path) = tempfile::Builder::new()
            .prefix("paperswitcher-")
            .suffix(&format!(".{}", self.format.extension()))
            .tempfile_in(&self.output_dir)
            .context("Failed to create wallpaper file")?
            .keep()
            .context("Failed to keep wallpaper file")?;

        let image = match self.format {
            // JPEG has no alpha channel
            OutputFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8()),
            _ => DynamicImage::ImageRgba8(canvas),
        };

        if let Err(e) = encode(&image, self.format.image_format(), file) {
            let _ = fs::remove_file(&path);
            return Err(e.context(format!("Failed to encode {}", path.display())));
        }

        log::debug!("Wrote composed wallpaper to {}", path.display());
        Ok(path)
    }

    /// Record `path` as the wallpaper on screen and delete older files
    /// beyond `keep_files`
    pub fn mark_applied(&mut self, path: PathBuf) {
        self.applied.push_back(path);

        while self.applied.len() > self.keep_files {
            if let Some(old) = self.applied.pop_front() {
                match fs::remove_file(&old) {
                    Ok(()) => log::debug!("Removed old wallpaper {}", old.display()),
                    Err(e) => log::warn!("Failed to remove {}: {}", old.display(), e),
                }
            }
        }
    }

    /// Delete a file that never made it onto the screen
    pub fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Encode `image` into `out`, flushing so a short write is an error
fn encode<W: Write + Seek>(image: &DynamicImage, format: ImageFormat, out: W) -> Result<()> {
    let mut writer = BufWriter::new(out);
    image.write_to(&mut writer, format)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Nearest-neighbour keeps solid test colors exact
    fn compositor(dir: &Path) -> Compositor {
        let settings = CompositorSettings {
            filter: "nearest".to_string(),
            ..Default::default()
        };
        Compositor::new(&settings, dir.to_path_buf()).unwrap()
    }

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn test_virtual_bounds_side_by_side() {
        let monitors = vec![
            MonitorRect::new("left", 0, 0, 1920, 1080),
            MonitorRect::new("right", 1920, 0, 1920, 1080),
        ];
        assert_eq!(
            virtual_bounds(&monitors),
            Some(Bounds {
                x: 0,
                y: 0,
                width: 3840,
                height: 1080
            })
        );
    }

    #[test]
    fn test_virtual_bounds_offset_and_mixed_sizes() {
        let monitors = vec![
            MonitorRect::new("primary", 0, 0, 2560, 1440),
            MonitorRect::new("left", -1080, -200, 1080, 1920),
            MonitorRect::new("top", 0, -1080, 1920, 1080),
        ];
        assert_eq!(
            virtual_bounds(&monitors),
            Some(Bounds {
                x: -1080,
                y: -1080,
                width: 3640,
                height: 2520
            })
        );
        assert_eq!(virtual_bounds(&[]), None);
    }

    #[test]
    fn test_cover_size_never_smaller_than_target() {
        let sources = [(1920, 1080), (1080, 1920), (4000, 3000), (640, 480), (1, 1000), (1000, 1)];
        let targets = [(1920, 1080), (1080, 1920), (2560, 1440), (800, 600), (3440, 1440)];

        for &(sw, sh) in &sources {
            for &(tw, th) in &targets {
                let (w, h) = cover_size(sw, sh, tw, th);
                assert!(w >= tw && h >= th, "{}x{} -> {}x{} gave {}x{}", sw, sh, tw, th, w, h);
                assert!(w == tw || h == th, "one axis should match exactly");
            }
        }
    }

    #[test]
    fn test_cover_size_keeps_aspect_ratio() {
        // 4:3 onto 16:9 fits width, height overflows
        assert_eq!(cover_size(800, 600, 1920, 1080), (1920, 1440));
        // 16:9 onto 4:3 fits height, width overflows
        assert_eq!(cover_size(1920, 1080, 800, 600), (1067, 600));
        // Same ratio is an exact fit
        assert_eq!(cover_size(3840, 2160, 1920, 1080), (1920, 1080));
    }

    #[test]
    fn test_cover_crop_regions() {
        assert_eq!(cover_crop(30, 10, 10, 10), (10.0, 0.0, 10.0, 10.0));
        assert_eq!(cover_crop(1920, 1080, 1920, 1080), (0.0, 0.0, 1920.0, 1080.0));

        // A narrow strip keeps its full width and a sliver of height
        let (left, top, width, height) = cover_crop(1, 1000, 3440, 1440);
        assert_eq!((left, width), (0.0, 1.0));
        assert!(height > 0.0 && height < 1.0);
        assert!((top + height / 2.0 - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_cover_extreme_aspect_ratios_stay_monitor_sized() {
        let dir = tempfile::tempdir().unwrap();
        let compositor = compositor(dir.path());

        let strip = DynamicImage::ImageRgba8(solid(1, 1000, [200, 100, 50, 255]));
        let tile = compositor.cover(&strip, 344, 144).unwrap();
        assert_eq!(tile.dimensions(), (344, 144));
        assert_eq!(tile.get_pixel(172, 72), &Rgba([200, 100, 50, 255]));

        let banner = DynamicImage::ImageRgba8(solid(20000, 100, [5, 6, 7, 255]));
        let tile = compositor.cover(&banner, 108, 192).unwrap();
        assert_eq!(tile.dimensions(), (108, 192));
        assert_eq!(tile.get_pixel(54, 96), &Rgba([5, 6, 7, 255]));
    }

    /// Accepts nothing, as on a full disk
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FullDisk {
        fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_encode_reports_buffered_write_failure() {
        // Small enough to sit in the BufWriter until the final flush
        let image = DynamicImage::ImageRgba8(solid(2, 2, [1, 2, 3, 255]));
        assert!(encode(&image, ImageFormat::Png, FullDisk).is_err());
    }

    #[test]
    fn test_cover_crops_centered_region() {
        let dir = tempfile::tempdir().unwrap();
        let compositor = compositor(dir.path());

        // Red | green | red columns; covering a square keeps only the green middle
        let mut source = solid(30, 10, [255, 0, 0, 255]);
        for x in 10..20 {
            for y in 0..10 {
                source.put_pixel(x, y, Rgba([0, 255, 0, 255]));
            }
        }

        let tile = compositor
            .cover(&DynamicImage::ImageRgba8(source), 10, 10)
            .unwrap();
        assert_eq!(tile.dimensions(), (10, 10));
        assert_eq!(tile.get_pixel(5, 5), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_compose_partitioned_desktop_has_exact_size() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        solid(64, 36, [255, 0, 0, 255]).save(&a).unwrap();
        solid(36, 64, [0, 0, 255, 255]).save(&b).unwrap();

        let monitors = vec![
            MonitorRect::new("left", 0, 0, 192, 108),
            MonitorRect::new("right", 192, 0, 192, 108),
        ];

        let canvas = compositor(dir.path()).compose(&[a, b], &monitors).unwrap();
        assert_eq!(canvas.dimensions(), (384, 108));
        assert_eq!(canvas.get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(300, 50), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_compose_leaves_failed_monitor_blank() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let broken = dir.path().join("broken.jpg");
        solid(16, 9, [10, 200, 30, 255]).save(&good).unwrap();
        fs::write(&broken, b"definitely not a jpeg").unwrap();

        let monitors = vec![
            MonitorRect::new("left", 0, 0, 160, 90),
            MonitorRect::new("right", 160, 0, 160, 90),
        ];

        let canvas = compositor(dir.path())
            .compose(&[good, broken], &monitors)
            .unwrap();
        assert_eq!(canvas.dimensions(), (320, 90));
        assert_eq!(canvas.get_pixel(80, 45), &Rgba([10, 200, 30, 255]));
        assert_eq!(canvas.get_pixel(240, 45), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_compose_places_tiles_relative_to_origin() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        solid(20, 20, [255, 255, 0, 255]).save(&a).unwrap();
        solid(20, 20, [0, 255, 255, 255]).save(&b).unwrap();

        // Second monitor sits left of and below the first, with a gap
        let monitors = vec![
            MonitorRect::new("main", 0, 0, 40, 40),
            MonitorRect::new("side", -60, 50, 40, 40),
        ];

        let canvas = compositor(dir.path()).compose(&[a, b], &monitors).unwrap();
        assert_eq!(canvas.dimensions(), (100, 90));
        assert_eq!(canvas.get_pixel(70, 10), &Rgba([255, 255, 0, 255]));
        assert_eq!(canvas.get_pixel(10, 60), &Rgba([0, 255, 255, 255]));
        // Gap between monitors is untouched
        assert_eq!(canvas.get_pixel(50, 45), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_write_uses_unique_names_and_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let mut compositor = compositor(dir.path());

        let first = compositor.write(solid(4, 4, [1, 2, 3, 255])).unwrap();
        let second = compositor.write(solid(4, 4, [1, 2, 3, 255])).unwrap();
        let third = compositor.write(solid(4, 4, [1, 2, 3, 255])).unwrap();
        assert_ne!(first, second);
        assert_eq!(first.extension().unwrap(), "png");
        assert!(image::open(&first).is_ok());

        compositor.mark_applied(first.clone());
        compositor.mark_applied(second.clone());
        compositor.mark_applied(third.clone());

        // keep_files defaults to two
        assert!(!first.exists());
        assert!(second.exists());
        assert!(third.exists());
    }

    #[test]
    fn test_write_jpeg_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CompositorSettings {
            format: "jpeg".to_string(),
            ..Default::default()
        };
        let compositor = Compositor::new(&settings, dir.path().to_path_buf()).unwrap();

        let path = compositor.write(solid(8, 8, [0, 0, 0, 0])).unwrap();
        assert_eq!(path.extension().unwrap(), "jpg");
        assert!(!image::open(&path).unwrap().color().has_alpha());
    }

    #[test]
    fn test_output_format_names() {
        assert_eq!(OutputFormat::from_name("BMP").unwrap(), OutputFormat::Bmp);
        assert_eq!(OutputFormat::from_name("jpg").unwrap(), OutputFormat::Jpeg);
        assert!(OutputFormat::from_name("tiff").is_err());
    }
}
