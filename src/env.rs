//! Environment map binding: derived sampling constants, the GPU-side source handle,
//! and a CPU equirectangular map with a box-filtered mip pyramid.

use std::f32::consts::PI;

use bevy::{
    asset::{Handle, RenderAssetUsages},
    image::{Image, ImageAddressMode, ImageFilterMode, ImageSampler, ImageSamplerDescriptor},
    render::render_resource::{Extent3d, TextureDimension, TextureFormat},
};
use half::f16;
use ndarray::Array3;
use tracing::{debug, warn};

use crate::{
    error::{Result, VolumeMarcherError},
    types::{Rgb, Value, Vector},
};

/// Constants derived from the bound environment map's resolution.
///
/// They become shader defines, so they must always describe the currently bound map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvMapConstants {
    /// Mip level used for fully rough reflections and diffuse irradiance.
    pub max_mip: Value,
    /// Horizontal inset applied to lookups, in UV units.
    pub texel_width: Value,
    /// Size of one texel row, in UV units. `0` for a zero-height map.
    pub texel_height: Value,
}

impl EnvMapConstants {
    /// Raw bit patterns `[max_mip, texel_width, texel_height]`, as stored in shader defs.
    pub fn to_bits(self) -> [u32; 3] {
        [
            self.max_mip.to_bits(),
            self.texel_width.to_bits(),
            self.texel_height.to_bits(),
        ]
    }
}

/// Derives the sampling constants for an environment map of the given pixel height.
///
/// ```text
/// max_mip      = log2(height / 32 + 1) + 3
/// texel_width  = 1 / (3 * max(2^max_mip, 7 * 16))
/// texel_height = 1 / height        (0 when height == 0)
/// ```
pub fn derive_env_constants(height: u32) -> EnvMapConstants {
    let h = height as Value;
    let max_mip = (h / 32.0 + 1.0).log2() + 3.0;
    let texel_width = 1.0 / (3.0 * max_mip.exp2().max(7.0 * 16.0));
    let texel_height = if height == 0 {
        warn!("environment map has zero height; lookups will not be inset");
        0.0
    } else {
        1.0 / h
    };
    EnvMapConstants {
        max_mip,
        texel_width,
        texel_height,
    }
}

/// An environment map as bound to the GPU material: the image plus its height.
///
/// The height is measured from the [`Image`] itself and is the only input of the
/// derived constants. The plugin re-measures it whenever the image asset changes.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvMapSource {
    image: Handle<Image>,
    height: u32,
}

impl EnvMapSource {
    pub fn new(image: Handle<Image>, source: &Image) -> Self {
        Self {
            image,
            height: source.texture_descriptor.size.height,
        }
    }

    pub fn image(&self) -> &Handle<Image> {
        &self.image
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn constants(&self) -> EnvMapConstants {
        derive_env_constants(self.height)
    }
}

/// Blank equirectangular image of the given height (twice as wide), for binding tests.
#[cfg(test)]
pub(crate) fn blank_env_image(height: u32) -> Image {
    Image::new_fill(
        Extent3d {
            width: height * 2,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[0; 8],
        TextureFormat::Rgba16Float,
        RenderAssetUsages::default(),
    )
}

/// Converts a unit direction into equirectangular UV coordinates.
///
/// `u` follows the azimuth around +Y, `v` runs from `0` at +Y to `1` at -Y.
pub fn direction_to_uv(dir: Vector) -> (Value, Value) {
    let phi = dir.z.atan2(dir.x);
    let theta = dir.y.clamp(-1.0, 1.0).acos();
    ((phi + PI) / (2.0 * PI), theta / PI)
}

/// Inverse of [`direction_to_uv`].
pub fn uv_to_direction(u: Value, v: Value) -> Vector {
    let phi = u * 2.0 * PI - PI;
    let theta = v * PI;
    Vector::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin())
}

/// CPU equirectangular radiance map with a mip pyramid, used by the reference tracer.
///
/// Each level is stored as `[row, column, channel]` with 3 linear RGB channels.
#[derive(Clone, Debug)]
pub struct EnvironmentMap {
    pub width: usize,
    pub height: usize,
    levels: Vec<Array3<Value>>,
}

impl EnvironmentMap {
    /// Evaluates `radiance` at every texel-center direction and builds the mip pyramid.
    pub fn from_fn<F>(width: usize, height: usize, radiance: F) -> Result<Self>
    where
        F: Fn(Vector) -> Rgb,
    {
        if width == 0 || height == 0 {
            return Err(VolumeMarcherError::InvalidDimensions);
        }
        let mut base = Array3::zeros((height, width, 3));
        for row in 0..height {
            for col in 0..width {
                let dir = uv_to_direction(
                    (col as Value + 0.5) / width as Value,
                    (row as Value + 0.5) / height as Value,
                );
                let c = radiance(dir);
                for ch in 0..3 {
                    base[[row, col, ch]] = c[ch];
                }
            }
        }
        Ok(Self::from_base_level(base))
    }

    /// A map with the same radiance in every direction.
    pub fn uniform(width: usize, height: usize, color: Rgb) -> Result<Self> {
        Self::from_fn(width, height, |_| color)
    }

    /// Reads level 0 from a 2D `Rgba16Float` or `Rgba32Float` Bevy [`Image`].
    pub fn from_image(image: &Image) -> Result<Self> {
        let descriptor = &image.texture_descriptor;
        if descriptor.dimension != TextureDimension::D2 {
            return Err(VolumeMarcherError::UnsupportedImage);
        }
        let data = image
            .data
            .as_ref()
            .ok_or(VolumeMarcherError::MissingImageData)?;
        let (width, height) = (descriptor.size.width as usize, descriptor.size.height as usize);
        if width == 0 || height == 0 {
            return Err(VolumeMarcherError::InvalidDimensions);
        }
        let texels: Vec<Value> = match descriptor.format {
            TextureFormat::Rgba16Float => data
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            TextureFormat::Rgba32Float => data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            _ => return Err(VolumeMarcherError::UnsupportedImage),
        };
        let expected = width * height * 4;
        if texels.len() < expected {
            return Err(VolumeMarcherError::DataLengthMismatch {
                expected,
                actual: texels.len(),
            });
        }
        let mut base = Array3::zeros((height, width, 3));
        for ((row, col, ch), value) in base.indexed_iter_mut() {
            *value = texels[(row * width + col) * 4 + ch];
        }
        Ok(Self::from_base_level(base))
    }

    fn from_base_level(base: Array3<Value>) -> Self {
        let (height, width, _) = base.dim();
        let mut levels = vec![base];
        loop {
            let Some(next) = downsample(&levels[levels.len() - 1]) else {
                break;
            };
            levels.push(next);
        }
        debug!(
            "built {width}x{height} environment map with {} mip levels",
            levels.len()
        );
        Self {
            width,
            height,
            levels,
        }
    }

    pub fn mip_count(&self) -> usize {
        self.levels.len()
    }

    pub fn constants(&self) -> EnvMapConstants {
        derive_env_constants(self.height as u32)
    }

    /// Samples the map at `(u, v)` with trilinear filtering between mip levels.
    ///
    /// `u` wraps around, `v` clamps to the poles, `lod` clamps to the available levels.
    pub fn sample_uv(&self, u: Value, v: Value, lod: Value) -> Rgb {
        let lod = lod.clamp(0.0, (self.levels.len() - 1) as Value);
        let lower = lod.floor() as usize;
        let upper = (lower + 1).min(self.levels.len() - 1);
        let a = sample_level(&self.levels[lower], u, v);
        let b = sample_level(&self.levels[upper], u, v);
        a + (b - a) * (lod - lower as Value)
    }

    /// Samples the radiance arriving from direction `dir`.
    pub fn sample(&self, dir: Vector, lod: Value) -> Rgb {
        let (u, v) = direction_to_uv(dir);
        self.sample_uv(u, v, lod)
    }

    /// Converts the map into a 2D `Rgba16Float` Bevy [`Image`] carrying the full mip chain.
    pub fn to_image(&self) -> Image {
        let mut data = Vec::new();
        for level in &self.levels {
            let (rows, cols, _) = level.dim();
            for row in 0..rows {
                for col in 0..cols {
                    for ch in 0..4 {
                        let v = if ch < 3 { level[[row, col, ch]] } else { 1.0 };
                        data.extend_from_slice(&f16::from_f32(v).to_le_bytes());
                    }
                }
            }
        }
        let base_len = self.width * self.height * 4 * 2;

        let mut image = Image::new(
            Extent3d {
                width: self.width as u32,
                height: self.height as u32,
                depth_or_array_layers: 1,
            },
            TextureDimension::D2,
            data[..base_len].to_vec(),
            TextureFormat::Rgba16Float,
            RenderAssetUsages::default(),
        );
        image.data = Some(data);
        image.texture_descriptor.mip_level_count = self.levels.len() as u32;
        image.sampler = ImageSampler::Descriptor(ImageSamplerDescriptor {
            address_mode_u: ImageAddressMode::Repeat,
            address_mode_v: ImageAddressMode::ClampToEdge,
            mag_filter: ImageFilterMode::Linear,
            min_filter: ImageFilterMode::Linear,
            mipmap_filter: ImageFilterMode::Linear,
            ..Default::default()
        });
        image
    }
}

/// 2x2 box filter. Returns `None` once the level is a single texel.
fn downsample(level: &Array3<Value>) -> Option<Array3<Value>> {
    let (rows, cols, _) = level.dim();
    if rows == 1 && cols == 1 {
        return None;
    }
    let (next_rows, next_cols) = ((rows / 2).max(1), (cols / 2).max(1));
    let mut next = Array3::zeros((next_rows, next_cols, 3));
    for ((row, col, ch), value) in next.indexed_iter_mut() {
        let r0 = (row * 2).min(rows - 1);
        let r1 = (row * 2 + 1).min(rows - 1);
        let c0 = (col * 2).min(cols - 1);
        let c1 = (col * 2 + 1).min(cols - 1);
        *value = 0.25
            * (level[[r0, c0, ch]] + level[[r0, c1, ch]] + level[[r1, c0, ch]] + level[[r1, c1, ch]]);
    }
    Some(next)
}

/// Bilinear lookup in one level, wrapping `u` and clamping `v`.
fn sample_level(level: &Array3<Value>, u: Value, v: Value) -> Rgb {
    let (rows, cols, _) = level.dim();
    let x = u.rem_euclid(1.0) * cols as Value - 0.5;
    let y = v.clamp(0.0, 1.0) * rows as Value - 0.5;
    let (x0, y0) = (x.floor(), y.floor());
    let (tx, ty) = (x - x0, y - y0);
    let col = |c: Value| (c as i64).rem_euclid(cols as i64) as usize;
    let row = |r: Value| r.clamp(0.0, (rows - 1) as Value) as usize;
    let (c0, c1) = (col(x0), col(x0 + 1.0));
    let (r0, r1) = (row(y0), row(y0 + 1.0));
    let texel = |r: usize, c: usize| Rgb::new(level[[r, c, 0]], level[[r, c, 1]], level[[r, c, 2]]);
    let top = texel(r0, c0).lerp(&texel(r0, c1), tx);
    let bottom = texel(r1, c0).lerp(&texel(r1, c1), tx);
    top.lerp(&bottom, ty)
}
