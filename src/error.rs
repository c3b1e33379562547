use derive_more::Display;

pub type Result<T> = core::result::Result<T, VolumeMarcherError>;

#[derive(Debug, Display)]
#[display("{self:?}")]
pub enum VolumeMarcherError {
    /// A volume or environment map with a zero-sized axis.
    InvalidDimensions,
    /// Raw voxel/texel data does not match the declared dimensions.
    DataLengthMismatch { expected: usize, actual: usize },
    /// A Bevy `Image` whose dimension or texture format cannot back this resource.
    UnsupportedImage,
    /// A Bevy `Image` without CPU-side data (already uploaded, `RENDER_WORLD` only).
    MissingImageData,
}

impl std::error::Error for VolumeMarcherError {}
