use std::sync::Arc;

use bevy::{
    asset::RenderAssetUsages,
    image::{Image, ImageAddressMode, ImageFilterMode, ImageSampler, ImageSamplerDescriptor},
    render::render_resource::{Extent3d, TextureDimension, TextureFormat},
};
use ndarray::Array3;

use crate::{
    error::{Result, VolumeMarcherError},
    interp::trilinear,
    types::{CompiledFunction, Point, Value, Vector},
};

/// A 3D scalar density field sampled in normalized `[0, 1]^3` coordinates.
///
/// The grid has `size_x × size_y × size_z` voxels. Voxel `(x, y, z)` is centered at
/// `((x + 0.5) / size_x, (y + 0.5) / size_y, (z + 0.5) / size_z)`, matching how a GPU
/// samples a 3D texture, so the CPU tracer and the shader agree on where the surface is.
///
/// Values are stored as `values[[z, y, x]]` and are expected to be normalized to `[0, 1]`.
///
/// Values live behind an [`Arc`] so frame tracing can share one field across worker
/// threads without copying it. The voxel dimensions are those of the stored array.
#[derive(Clone, Debug)]
pub struct VolumeField {
    values: Arc<Array3<Value>>,
}

impl Default for VolumeField {
    fn default() -> Self {
        Self {
            values: Arc::new(Array3::zeros((0, 0, 0))),
        }
    }
}

impl VolumeField {
    /// Creates a new field with the given voxel dimensions. All values start at `0.0`.
    pub fn new(size_x: usize, size_y: usize, size_z: usize) -> Self {
        Self {
            values: Arc::new(Array3::zeros((size_z, size_y, size_x))),
        }
    }

    /// Builds a field from a flat `x`-fastest buffer of `size_x * size_y * size_z` values.
    pub fn from_vec(size_x: usize, size_y: usize, size_z: usize, data: Vec<Value>) -> Result<Self> {
        if size_x == 0 || size_y == 0 || size_z == 0 {
            return Err(VolumeMarcherError::InvalidDimensions);
        }
        let expected = size_x * size_y * size_z;
        let actual = data.len();
        let values = Array3::from_shape_vec((size_z, size_y, size_x), data)
            .map_err(|_| VolumeMarcherError::DataLengthMismatch { expected, actual })?;
        Ok(Self {
            values: Arc::new(values),
        })
    }

    /// Wraps an existing `[z, y, x]` array, possibly shared with other fields.
    pub fn from_shared(values: Arc<Array3<Value>>) -> Result<Self> {
        if values.is_empty() {
            return Err(VolumeMarcherError::InvalidDimensions);
        }
        Ok(Self { values })
    }

    /// Number of voxels along X.
    pub fn size_x(&self) -> usize {
        self.values.dim().2
    }

    /// Number of voxels along Y.
    pub fn size_y(&self) -> usize {
        self.values.dim().1
    }

    /// Number of voxels along Z.
    pub fn size_z(&self) -> usize {
        self.values.dim().0
    }

    /// Density values, indexed `[z, y, x]`.
    pub fn values(&self) -> &Arc<Array3<Value>> {
        &self.values
    }

    /// Fills the field by evaluating `function` at every voxel center.
    ///
    /// Coordinates passed to `function` are normalized to `[0, 1]^3`.
    pub fn fill(mut self, function: &CompiledFunction) -> Self {
        let (size_z, size_y, size_x) = self.values.dim();
        let values = self.values_mut();
        for ((z, y, x), value) in values.indexed_iter_mut() {
            *value = function(Point::new(
                (x as Value + 0.5) / size_x as Value,
                (y as Value + 0.5) / size_y as Value,
                (z as Value + 0.5) / size_z as Value,
            ));
        }
        self
    }

    /// Returns a mutable reference to the inner values.
    ///
    /// If the Arc is shared this will clone the data first (copy-on-write).
    fn values_mut(&mut self) -> &mut Array3<Value> {
        Arc::make_mut(&mut self.values)
    }

    /// Returns the value of voxel `(x, y, z)`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Value {
        self.values[[z, y, x]]
    }

    /// Sets the value of voxel `(x, y, z)`.
    pub fn set(&mut self, x: usize, y: usize, z: usize, v: Value) {
        self.values_mut()[[z, y, x]] = v
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Size of one voxel in normalized coordinates.
    pub fn texel_size(&self) -> Vector {
        Vector::new(
            1.0 / self.size_x().max(1) as Value,
            1.0 / self.size_y().max(1) as Value,
            1.0 / self.size_z().max(1) as Value,
        )
    }

    /// Trilinearly samples the field at normalized coordinates `uvw`.
    ///
    /// Addressing is clamp-to-edge: coordinates outside `[0, 1]^3` read the border voxels.
    /// An empty field samples as `0.0`.
    pub fn sample(&self, uvw: Point) -> Value {
        if self.is_empty() {
            return 0.0;
        }
        let (size_z, size_y, size_x) = self.values.dim();
        let (x0, x1, tx) = axis_taps(uvw.x, size_x);
        let (y0, y1, ty) = axis_taps(uvw.y, size_y);
        let (z0, z1, tz) = axis_taps(uvw.z, size_z);
        let v = &self.values;
        trilinear(
            [
                v[[z0, y0, x0]],
                v[[z0, y0, x1]],
                v[[z0, y1, x0]],
                v[[z0, y1, x1]],
                v[[z1, y0, x0]],
                v[[z1, y0, x1]],
                v[[z1, y1, x0]],
                v[[z1, y1, x1]],
            ],
            Vector::new(tx, ty, tz),
        )
    }

    /// Converts the field into a 3D `R8Unorm` Bevy [`Image`] with a linear, clamp-to-edge sampler.
    ///
    /// Values are clamped to `[0, 1]` and quantized to 8 bits.
    pub fn to_image(&self) -> Result<Image> {
        if self.is_empty() {
            return Err(VolumeMarcherError::InvalidDimensions);
        }
        // Standard layout iteration is z-major then y then x, which is the texel order wgpu expects.
        let data: Vec<u8> = self
            .values
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();

        let mut image = Image::new(
            Extent3d {
                width: self.size_x() as u32,
                height: self.size_y() as u32,
                depth_or_array_layers: self.size_z() as u32,
            },
            TextureDimension::D3,
            data,
            TextureFormat::R8Unorm,
            RenderAssetUsages::default(),
        );
        image.sampler = ImageSampler::Descriptor(ImageSamplerDescriptor {
            address_mode_u: ImageAddressMode::ClampToEdge,
            address_mode_v: ImageAddressMode::ClampToEdge,
            address_mode_w: ImageAddressMode::ClampToEdge,
            mag_filter: ImageFilterMode::Linear,
            min_filter: ImageFilterMode::Linear,
            ..Default::default()
        });
        Ok(image)
    }

    /// Reads a field back from a 3D `R8Unorm` or `R32Float` Bevy [`Image`].
    pub fn from_image(image: &Image) -> Result<Self> {
        let descriptor = &image.texture_descriptor;
        if descriptor.dimension != TextureDimension::D3 {
            return Err(VolumeMarcherError::UnsupportedImage);
        }
        let data = image
            .data
            .as_ref()
            .ok_or(VolumeMarcherError::MissingImageData)?;
        let values: Vec<Value> = match descriptor.format {
            TextureFormat::R8Unorm => data.iter().map(|&b| b as Value / 255.0).collect(),
            TextureFormat::R32Float => data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            _ => return Err(VolumeMarcherError::UnsupportedImage),
        };
        Self::from_vec(
            descriptor.size.width as usize,
            descriptor.size.height as usize,
            descriptor.size.depth_or_array_layers as usize,
            values,
        )
    }
}

/// Returns the two clamped voxel indices bracketing normalized coordinate `u` and the blend factor.
#[inline]
fn axis_taps(u: Value, size: usize) -> (usize, usize, Value) {
    let x = u * size as Value - 0.5;
    let base = x.floor();
    let t = x - base;
    let last = (size - 1) as Value;
    let i0 = base.clamp(0.0, last) as usize;
    let i1 = (base + 1.0).clamp(0.0, last) as usize;
    (i0, i1, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_exact_at_voxel_centers() {
        let mut field = VolumeField::new(4, 4, 4);
        field.set(1, 2, 3, 0.75);
        let center = Point::new(1.5 / 4.0, 2.5 / 4.0, 3.5 / 4.0);
        assert!((field.sample(center) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn sample_interpolates_between_voxels() {
        let field = VolumeField::new(2, 1, 1).fill(&|p: Point| if p.x > 0.5 { 1.0 } else { 0.0 });
        assert!((field.sample(Point::new(0.5, 0.5, 0.5)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sample_clamps_out_of_range_coordinates() {
        let field = VolumeField::new(2, 2, 2).fill(&|p: Point| p.x);
        assert_eq!(field.sample(Point::new(-3.0, 0.5, 0.5)), field.get(0, 0, 0));
        assert_eq!(field.sample(Point::new(7.0, 0.5, 0.5)), field.get(1, 0, 0));
    }

    #[test]
    fn empty_field_samples_zero() {
        assert_eq!(VolumeField::default().sample(Point::new(0.5, 0.5, 0.5)), 0.0);
    }

    #[test]
    fn from_vec_rejects_bad_input() {
        assert!(matches!(
            VolumeField::from_vec(0, 1, 1, vec![]),
            Err(VolumeMarcherError::InvalidDimensions)
        ));
        assert!(matches!(
            VolumeField::from_vec(2, 2, 2, vec![0.0; 7]),
            Err(VolumeMarcherError::DataLengthMismatch { expected: 8, actual: 7 })
        ));
    }

    #[test]
    fn image_conversion_preserves_layout() {
        let mut field = VolumeField::new(3, 2, 2);
        field.set(2, 1, 0, 1.0);
        field.set(0, 0, 1, 0.5);
        let image = field.to_image().unwrap();
        assert_eq!(image.texture_descriptor.dimension, TextureDimension::D3);
        assert_eq!(image.texture_descriptor.format, TextureFormat::R8Unorm);

        let back = VolumeField::from_image(&image).unwrap();
        assert_eq!((back.size_x(), back.size_y(), back.size_z()), (3, 2, 2));
        assert_eq!(back.get(2, 1, 0), 1.0);
        assert!((back.get(0, 0, 1) - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(back.get(1, 1, 1), 0.0);
    }

    #[test]
    fn dimensions_come_from_the_stored_values() {
        let shared = Arc::new(Array3::from_elem((1, 1, 1), 0.8));
        let field = VolumeField::from_shared(Arc::clone(&shared)).unwrap();
        assert_eq!((field.size_x(), field.size_y(), field.size_z()), (1, 1, 1));
        assert!(Arc::ptr_eq(field.values(), &shared));
        // Far corner of a single voxel clamps onto it instead of indexing past the grid.
        assert!((field.sample(Point::new(0.9, 0.9, 0.9)) - 0.8).abs() < 1e-6);

        let wide = VolumeField::new(4, 2, 3);
        assert_eq!((wide.size_x(), wide.size_y(), wide.size_z()), (4, 2, 3));
        assert_eq!(wide.values().dim(), (3, 2, 4));

        assert!(matches!(
            VolumeField::from_shared(Arc::new(Array3::zeros((0, 2, 2)))),
            Err(VolumeMarcherError::InvalidDimensions)
        ));
    }

    #[test]
    fn shared_values_are_copied_on_write() {
        let field = VolumeField::new(2, 2, 2);
        let mut copy = field.clone();
        copy.set(0, 0, 0, 1.0);
        assert_eq!(field.get(0, 0, 0), 0.0);
        assert_eq!(copy.get(0, 0, 0), 1.0);
    }
}
