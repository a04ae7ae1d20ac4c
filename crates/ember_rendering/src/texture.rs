//! Sprite texture.
//!
//! A missing or unreadable image is not fatal: a radial falloff sprite is
//! generated instead and a warning is logged.

use std::path::Path;

/// Edge length of the generated fallback sprite.
pub const FALLBACK_SIZE: u32 = 64;

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major RGBA8.
    pub rgba: Vec<u8>,
}

impl SpriteImage {
    /// Decodes an image file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self, image::ImageError> {
        let image = image::open(path)?.to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            rgba: image.into_raw(),
        })
    }

    /// White disc whose alpha falls off quadratically from the center.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn radial(size: u32) -> Self {
        let size = size.max(1);
        let center = (size as f32 - 1.0) * 0.5;
        let radius = (size as f32 * 0.5).max(f32::EPSILON);

        let mut rgba = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let dx = (x as f32 - center) / radius;
                let dy = (y as f32 - center) / radius;
                let falloff = (1.0 - (dx * dx + dy * dy)).clamp(0.0, 1.0);
                let alpha = (falloff * falloff * 255.0).round() as u8;
                rgba.extend_from_slice(&[255, 255, 255, alpha]);
            }
        }
        Self {
            width: size,
            height: size,
            rgba,
        }
    }

    /// The image at `path`, or the radial sprite if there is none.
    #[must_use]
    pub fn load_or_fallback(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::radial(FALLBACK_SIZE);
        };
        match Self::load(path) {
            Ok(image) => {
                tracing::info!(path = %path.display(), width = image.width, height = image.height, "sprite texture loaded");
                image
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "sprite texture unavailable, using generated sprite");
                Self::radial(FALLBACK_SIZE)
            }
        }
    }
}

/// Sprite image uploaded to the device, with the sampler the shading
/// program uses.
pub struct SpriteTexture {
    /// View bound at binding 1.
    pub view: wgpu::TextureView,
    /// Sampler bound at binding 2.
    pub sampler: wgpu::Sampler,
    _texture: wgpu::Texture,
}

impl SpriteTexture {
    /// Uploads `image`.
    #[must_use]
    pub fn upload(device: &wgpu::Device, queue: &wgpu::Queue, image: &SpriteImage) -> Self {
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("ember.sprite"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&sampler_descriptor());

        Self {
            view,
            sampler,
            _texture: texture,
        }
    }
}

/// Linear minification, nearest magnification, repeating in both axes.
#[must_use]
pub fn sampler_descriptor() -> wgpu::SamplerDescriptor<'static> {
    wgpu::SamplerDescriptor {
        label: Some("ember.sprite.sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radial_sprite_shape() {
        let sprite = SpriteImage::radial(32);
        assert_eq!(sprite.rgba.len(), 32 * 32 * 4);
        let alpha = |x: u32, y: u32| sprite.rgba[((y * 32 + x) * 4 + 3) as usize];
        assert!(alpha(16, 16) > 240);
        assert_eq!(alpha(0, 0), 0);
        assert!(alpha(16, 16) > alpha(16, 24));
    }

    #[test]
    fn test_missing_texture_falls_back() {
        let sprite = SpriteImage::load_or_fallback(Some(Path::new("no/such/sprite.png")));
        assert_eq!(sprite, SpriteImage::radial(FALLBACK_SIZE));
        assert_eq!(SpriteImage::load_or_fallback(None).width, FALLBACK_SIZE);
    }

    #[test]
    fn test_sampler_filters() {
        let desc = sampler_descriptor();
        assert_eq!(desc.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.mag_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::Repeat);
    }
}
