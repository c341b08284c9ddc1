#![allow(dead_code)]

use std::sync::Arc;

use quadbatch::backend::software::SoftwareDevice;
use quadbatch::{Bitmap, GraphicsConfig, ImageFactory};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// xorshift64* stream; deterministic per seed.
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: splitmix64(seed).max(1),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(2685821657736338717)
    }

    /// Uniform in `lo..=hi`.
    pub fn range(&mut self, lo: u32, hi: u32) -> u32 {
        lo + (self.next_u64() % (hi - lo + 1) as u64) as u32
    }

    pub fn bitmap(&mut self, width: u32, height: u32) -> Bitmap {
        Bitmap::from_fn(width, height, |_, _| {
            let v = self.next_u64().to_le_bytes();
            image::Rgba([v[0], v[1], v[2], v[3]])
        })
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Opaque gradient whose every pixel differs from its neighbours.
pub fn gradient(width: u32, height: u32) -> Bitmap {
    Bitmap::from_fn(width, height, |x, y| {
        image::Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

pub fn factory(max_texture_size: u32) -> (SoftwareDevice, ImageFactory) {
    init_logging();
    let device = SoftwareDevice::default();
    let factory = ImageFactory::new(
        Arc::new(device.clone()),
        GraphicsConfig::default().with_max_texture_size(max_texture_size),
    );
    (device, factory)
}
