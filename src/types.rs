use nalgebra::{Point3, Vector3};

/// Scalar field value at a point in space.
pub type Value = f32;

/// A 3D point with [`Value`] components.
pub type Point = Point3<Value>;

/// A 3D vector with [`Value`] components.
pub type Vector = Vector3<Value>;

/// Linear RGB color.
pub type Rgb = Vector3<Value>;

/// A scalar field function: maps a normalized `[0, 1]^3` [`Point`] to a density [`Value`].
///
/// Return values **at or above** the marcher's threshold are considered "inside" the surface.
pub type CompiledFunction = dyn Fn(Point) -> Value + Sync;
