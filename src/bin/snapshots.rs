use std::fs;
use std::path::Path;
use std::sync::Arc;

use image::ImageReader;
use quadbatch::backend::software::SoftwareDevice;
use quadbatch::backend::wgpu_backend::WgpuDevice;
use quadbatch::{
    Bitmap, BlendMode, Color, GpuContext, GpuDevice, Graphics, GraphicsConfig, ImageFlags, Quad,
    Transform,
};

const WIDTH: u32 = 256;
const HEIGHT: u32 = 192;

fn checkerboard(size: u32, cell: u32) -> Bitmap {
    Bitmap::from_fn(size, size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Color::rgb(230, 200, 40).to_image_rgba()
        } else {
            Color::rgb(30, 60, 120).to_image_rgba()
        }
    })
}

fn draw_scene<C: GpuContext>(g: &mut Graphics<C>) -> quadbatch::Result<()> {
    let checker = g.factory().create_image_from(&checkerboard(64, 8), ImageFlags::RETRO)?;
    let badge = g.record(32, 32, |g| {
        g.draw_quad(&Quad::from_rect(0.0, 0.0, 32.0, 32.0, Color::rgb(200, 30, 30)), 0.0, BlendMode::Default);
        g.draw_quad(&Quad::from_rect(8.0, 8.0, 16.0, 16.0, Color::WHITE), 1.0, BlendMode::Default);
        Ok(())
    })?;

    g.frame(|g| {
        g.draw_rect(checker.as_ref(), 16.0, 16.0, 0.0, Color::WHITE, BlendMode::Default)?;
        g.draw_quad(
            &Quad::from_rect(48.0, 48.0, 64.0, 64.0, Color::rgba(40, 200, 80, 128)),
            1.0,
            BlendMode::Default,
        );
        g.draw_quad(
            &Quad::from_rect(96.0, 16.0, 64.0, 64.0, Color::rgba(255, 64, 0, 255)),
            2.0,
            BlendMode::Add,
        );
        g.clip_to(160.0, 96.0, 48.0, 48.0, |g| {
            g.draw_quad(&Quad::from_rect(128.0, 64.0, 128.0, 128.0, Color::BLUE), 3.0, BlendMode::Default);
            Ok(())
        })?;
        g.transform(Transform::translate(176.0, 16.0), |g| {
            g.draw_rect(&badge, 0.0, 0.0, 4.0, Color::WHITE, BlendMode::Default)?;
            g.draw_drawable(
                &badge,
                &Quad::from_rect(0.0, 40.0, 64.0, 32.0, Color::WHITE),
                4.0,
                BlendMode::Default,
            )
        })
    })
}

fn render_wgpu() -> anyhow::Result<Bitmap> {
    let device = WgpuDevice::headless()?;
    let context = device.create_context(WIDTH, HEIGHT);
    let mut g = Graphics::new(context, Arc::new(device.clone()), GraphicsConfig::default());
    draw_scene(&mut g)?;
    Ok(g.context_mut().read_pixels()?)
}

fn render_software() -> anyhow::Result<Bitmap> {
    let device = SoftwareDevice::default();
    let context = device.create_context(WIDTH, HEIGHT);
    let device: Arc<dyn GpuDevice> = Arc::new(device);
    let mut g = Graphics::new(context, device, GraphicsConfig::default());
    draw_scene(&mut g)?;
    Ok(g.into_context().into_target())
}

/// Returns the number of pixels differing by more than `tolerance` in any channel, or
/// `None` when the sizes differ.
fn count_mismatches(a: &Bitmap, b: &Bitmap, tolerance: u8) -> Option<usize> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    Some(
        a.pixels()
            .zip(b.pixels())
            .filter(|(pa, pb)| (0..4).any(|i| pa.0[i].abs_diff(pb.0[i]) > tolerance))
            .count(),
    )
}

fn compare_with_golden(name: &str, actual: &Bitmap) -> anyhow::Result<()> {
    let out_actual = Path::new("snapshots/actual").join(name);
    let out_golden = Path::new("snapshots/golden").join(name);
    actual.save(&out_actual)?;

    if !out_golden.exists() {
        fs::copy(&out_actual, &out_golden)?;
        println!("golden created at {}", out_golden.display());
        return Ok(());
    }

    let golden = ImageReader::open(&out_golden)?.decode()?.to_rgba8();
    match count_mismatches(actual, &golden, 3) {
        Some(0) => println!("snapshot OK for {name}"),
        Some(n) => println!("snapshot mismatch for {name}: {n} pixels"),
        None => println!("snapshot size mismatch for {name}"),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    fs::create_dir_all("snapshots/actual")?;
    fs::create_dir_all("snapshots/golden")?;

    let software = render_software()?;
    compare_with_golden("scene_software.png", &software)?;

    match render_wgpu() {
        Ok(gpu) => {
            compare_with_golden("scene_wgpu.png", &gpu)?;
            match count_mismatches(&gpu, &software, 3) {
                Some(0) => println!("wgpu and software backends agree"),
                Some(n) => println!("wgpu and software backends differ in {n} pixels"),
                None => println!("backend outputs differ in size"),
            }
        }
        Err(e) => log::warn!("skipping wgpu snapshot: {e}"),
    }
    Ok(())
}
