#![cfg(feature = "backend-wgpu")]

mod common;

use std::sync::Arc;

use common::init_logging;
use quadbatch::backend::wgpu_backend::WgpuDevice;
use quadbatch::{Bitmap, BlendMode, Color, Graphics, GraphicsConfig, ImageFlags};

fn headless() -> Option<WgpuDevice> {
    init_logging();
    match WgpuDevice::headless() {
        Ok(device) => Some(device),
        Err(e) => {
            log::warn!("no wgpu adapter, skipping: {e}");
            None
        }
    }
}

#[test]
fn image_dropped_after_frame_still_shows_in_read_back() {
    let Some(device) = headless() else {
        return;
    };
    let context = device.create_context(8, 8);
    let mut g = Graphics::new(context, Arc::new(device.clone()), GraphicsConfig::default());

    let red = Bitmap::from_pixel(8, 8, Color::RED.to_image_rgba());
    let image = g.factory().create_image_from(&red, ImageFlags::RETRO).unwrap();
    g.frame(|g| g.draw_rect(image.as_ref(), 0.0, 0.0, 0.0, Color::WHITE, BlendMode::Default))
        .unwrap();
    drop(image);

    let pixels = g.context_mut().read_pixels().unwrap();
    assert_eq!(pixels.get_pixel(4, 4), &Color::RED.to_image_rgba());
}

#[test]
fn upload_after_frame_leaves_drawn_pixels_alone() {
    let Some(device) = headless() else {
        return;
    };
    let context = device.create_context(8, 8);
    let mut g = Graphics::new(context, Arc::new(device.clone()), GraphicsConfig::default());

    let red = Bitmap::from_pixel(8, 8, Color::RED.to_image_rgba());
    let image = g.factory().create_image_from(&red, ImageFlags::RETRO).unwrap();
    g.frame(|g| g.draw_rect(image.as_ref(), 0.0, 0.0, 0.0, Color::WHITE, BlendMode::Default))
        .unwrap();
    let blue = Bitmap::from_pixel(8, 8, Color::BLUE.to_image_rgba());
    image.insert(&blue, 0, 0).unwrap();

    let pixels = g.context_mut().read_pixels().unwrap();
    assert_eq!(pixels.get_pixel(4, 4), &Color::RED.to_image_rgba());
}
