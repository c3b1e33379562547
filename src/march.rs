//! Ray setup and fixed-step traversal through the unit cube.
//!
//! The cube spans `[-0.5, 0.5]^3` in local space; volume coordinates are the local
//! position shifted by `0.5`. Everything here mirrors the fragment shader in
//! `shaders/volume_marcher.wgsl`.

use nalgebra::Matrix4;

use crate::{
    types::{Point, Value, Vector},
    volume::VolumeField,
};

/// Fixed number of traversal steps per ray.
///
/// Shells thinner than one step (`sqrt(3) / STEPS` in local units) can be missed.
pub const STEPS: u32 = 512;

/// Length of the unit cube's diagonal.
pub const CUBE_DIAGONAL: Value = 1.732_050_8;

/// Distance advanced per step. `STEPS * STEP_SIZE` covers the whole diagonal.
pub const STEP_SIZE: Value = CUBE_DIAGONAL / STEPS as Value;

/// Per-march parameters. Read-only for the duration of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarchParams {
    /// Density level of the implicit surface. A sample crosses when `density >= threshold`.
    pub threshold: Value,
    /// Spatial frequency of the sine displacement, in radians per local unit.
    pub displacement_frequency: Value,
    /// Amplitude of the sine displacement, in local units.
    pub displacement_scale: Value,
}

impl Default for MarchParams {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            displacement_frequency: 0.0,
            displacement_scale: 0.0,
        }
    }
}

impl MarchParams {
    pub fn displacement_enabled(&self) -> bool {
        self.displacement_frequency > 0.0 && self.displacement_scale > 0.0
    }

    /// Applies the displacement to a local-space sampling position.
    ///
    /// `p + scale * sin(frequency * p.zxy)`, component-wise. Identity when disabled.
    #[inline]
    pub fn displace(&self, p: Point) -> Point {
        if !self.displacement_enabled() {
            return p;
        }
        let f = self.displacement_frequency;
        let offset = Vector::new((f * p.z).sin(), (f * p.x).sin(), (f * p.y).sin());
        p + offset * self.displacement_scale
    }

    /// Samples the volume at a local-space position, displacement included.
    #[inline]
    pub fn density(&self, volume: &VolumeField, local: Point) -> Value {
        let p = self.displace(local);
        volume.sample(Point::new(p.x + 0.5, p.y + 0.5, p.z + 0.5))
    }
}

/// A ray in the cube's local space. `direction` is unit length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Point,
    pub direction: Vector,
}

impl Ray {
    /// Creates a ray, normalizing `direction`. Returns `None` for a zero direction.
    pub fn new(origin: Point, direction: Vector) -> Option<Self> {
        let direction = direction.try_normalize(Value::EPSILON)?;
        Some(Self { origin, direction })
    }

    /// Builds the local-space ray from the camera through a fragment on the cube's surface.
    ///
    /// Both positions are in world space; `world_from_local` is the cube's model matrix.
    /// Returns `None` when the transform is not invertible or the two points coincide.
    pub fn from_world(
        camera: Point,
        fragment: Point,
        world_from_local: &Matrix4<Value>,
    ) -> Option<Self> {
        let local_from_world = world_from_local.try_inverse()?;
        let origin = local_from_world.transform_point(&camera);
        let target = local_from_world.transform_point(&fragment);
        Self::new(origin, target - origin)
    }

    /// Point along the ray at parameter `t`.
    #[inline]
    pub fn at(&self, t: Value) -> Point {
        self.origin + self.direction * t
    }
}

/// Slab intersection against the unit cube.
///
/// Returns `(t_near, t_far)` with `t_near` clipped to `0` when the origin is inside the
/// cube, or `None` if the ray misses it or the cube lies entirely behind the origin.
pub fn intersect_unit_cube(ray: &Ray) -> Option<(Value, Value)> {
    let mut t_near = Value::NEG_INFINITY;
    let mut t_far = Value::INFINITY;
    for axis in 0..3 {
        let o = ray.origin[axis];
        let d = ray.direction[axis];
        if d.abs() < Value::EPSILON {
            if !(-0.5..=0.5).contains(&o) {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let t0 = (-0.5 - o) * inv;
        let t1 = (0.5 - o) * inv;
        t_near = t_near.max(t0.min(t1));
        t_far = t_far.min(t0.max(t1));
    }
    let t_near = t_near.max(0.0);
    if t_far < t_near {
        return None;
    }
    Some((t_near, t_far))
}

/// The first sample along a ray whose density reached the threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Crossing {
    /// Local-space position of the crossing sample.
    pub position: Point,
    /// Ray parameter of the crossing.
    pub t: Value,
    /// Ray parameter where the ray entered (or started inside) the cube.
    pub t_entry: Value,
    /// Index of the crossing step, `0..STEPS`.
    pub step: u32,
    /// Sampled density at the crossing.
    pub density: Value,
}

/// Marches `ray` through `volume` and returns the first threshold crossing.
///
/// At most [`STEPS`] samples are taken, [`STEP_SIZE`] apart, starting at the cube entry.
/// `None` means the ray left the cube (or ran out of steps) without crossing, and the
/// invocation should be discarded.
pub fn march(ray: &Ray, params: &MarchParams, volume: &VolumeField) -> Option<Crossing> {
    let (t_entry, t_far) = intersect_unit_cube(ray)?;
    let mut t = t_entry;
    for step in 0..STEPS {
        if t > t_far {
            break;
        }
        let position = ray.at(t);
        let density = params.density(volume, position);
        if density >= params.threshold {
            return Some(Crossing {
                position,
                t,
                t_entry,
                step,
                density,
            });
        }
        t += STEP_SIZE;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere_volume() -> VolumeField {
        VolumeField::new(32, 32, 32).fill(&|p: Point| {
            let d = (p - Point::new(0.5, 0.5, 0.5)).norm();
            if d < 0.3 { 1.0 } else { 0.0 }
        })
    }

    #[test]
    fn steps_cover_the_diagonal() {
        assert!(STEPS as Value * STEP_SIZE >= 3.0_f32.sqrt() - 1e-5);
    }

    #[test]
    fn cube_intersection_from_outside_and_inside() {
        let outside = Ray::new(Point::new(0.0, 0.0, -2.0), Vector::z()).unwrap();
        let (near, far) = intersect_unit_cube(&outside).unwrap();
        assert!((near - 1.5).abs() < 1e-6);
        assert!((far - 2.5).abs() < 1e-6);

        let inside = Ray::new(Point::origin(), Vector::x()).unwrap();
        let (near, far) = intersect_unit_cube(&inside).unwrap();
        assert_eq!(near, 0.0);
        assert!((far - 0.5).abs() < 1e-6);

        let miss = Ray::new(Point::new(2.0, 0.0, -2.0), Vector::z()).unwrap();
        assert!(intersect_unit_cube(&miss).is_none());

        let behind = Ray::new(Point::new(0.0, 0.0, 2.0), Vector::z()).unwrap();
        assert!(intersect_unit_cube(&behind).is_none());
    }

    #[test]
    fn dense_volume_crosses_at_entry() {
        let volume = VolumeField::new(4, 4, 4).fill(&|_| 1.0);
        let directions = [
            Vector::new(0.0, 0.0, 1.0),
            Vector::new(0.3, -0.2, 1.0),
            Vector::new(-1.0, 0.4, 0.1),
        ];
        for threshold in [0.0, 0.25, 0.5, 1.0] {
            let params = MarchParams {
                threshold,
                ..Default::default()
            };
            for d in directions {
                let ray = Ray::new(Point::origin() - d.normalize() * 3.0, d).unwrap();
                let crossing = march(&ray, &params, &volume).expect("dense volume must cross");
                assert_eq!(crossing.step, 0);
                assert_eq!(crossing.t, crossing.t_entry);
                assert!(crossing.density >= threshold);
            }
        }
    }

    #[test]
    fn empty_volume_never_crosses() {
        let volume = VolumeField::new(4, 4, 4).fill(&|_| 0.2);
        for threshold in [0.3, 0.5, 1.0] {
            let params = MarchParams {
                threshold,
                ..Default::default()
            };
            let ray = Ray::new(Point::new(0.1, 0.2, -3.0), Vector::new(0.0, 0.0, 1.0)).unwrap();
            assert!(march(&ray, &params, &volume).is_none());
        }
    }

    #[test]
    fn sphere_crossing_through_center() {
        let volume = sphere_volume();
        let ray = Ray::new(Point::new(0.0, 0.0, -2.0), Vector::z()).unwrap();
        let crossing = march(&ray, &MarchParams::default(), &volume).unwrap();
        // Entry at z = -0.5, surface at z = -0.3.
        assert!((crossing.t - crossing.t_entry - 0.2).abs() < 0.03);
        assert!(crossing.density >= 0.5 && crossing.step > 0);
        assert!(((crossing.position - Point::origin()).norm() - 0.3).abs() < 0.03);
    }

    #[test]
    fn corner_grazing_ray_misses_sphere() {
        let volume = sphere_volume();
        let ray = Ray::new(Point::new(0.45, 0.45, -2.0), Vector::z()).unwrap();
        assert!(intersect_unit_cube(&ray).is_some());
        assert!(march(&ray, &MarchParams::default(), &volume).is_none());
    }

    #[test]
    fn camera_inside_volume_starts_at_origin() {
        let volume = sphere_volume();
        let ray = Ray::new(Point::origin(), Vector::y()).unwrap();
        let crossing = march(&ray, &MarchParams::default(), &volume).unwrap();
        assert_eq!(crossing.t_entry, 0.0);
        assert_eq!(crossing.step, 0);
    }

    #[test]
    fn displacement_moves_the_crossing() {
        let volume = sphere_volume();
        let ray = Ray::new(Point::new(0.1, 0.05, -2.0), Vector::z()).unwrap();
        let flat = march(&ray, &MarchParams::default(), &volume).unwrap();
        let params = MarchParams {
            displacement_frequency: 10.0,
            displacement_scale: 0.08,
            ..Default::default()
        };
        let rippled = march(&ray, &params, &volume).unwrap();
        assert!((flat.t - rippled.t).abs() > STEP_SIZE);
    }

    #[test]
    fn displacement_disabled_when_either_factor_is_zero() {
        let p = Point::new(0.1, 0.2, 0.3);
        let only_frequency = MarchParams {
            displacement_frequency: 4.0,
            ..Default::default()
        };
        let only_scale = MarchParams {
            displacement_scale: 0.1,
            ..Default::default()
        };
        assert_eq!(only_frequency.displace(p), p);
        assert_eq!(only_scale.displace(p), p);
    }

    #[test]
    fn world_rays_are_brought_into_local_space() {
        let world_from_local =
            Matrix4::new_translation(&Vector::new(5.0, 0.0, 0.0)) * Matrix4::new_scaling(2.0);
        let ray = Ray::from_world(
            Point::new(5.0, 0.0, -4.0),
            Point::new(5.0, 0.0, -1.0),
            &world_from_local,
        )
        .unwrap();
        assert!((ray.origin - Point::new(0.0, 0.0, -2.0)).norm() < 1e-5);
        assert!((ray.direction - Vector::z()).norm() < 1e-5);

        assert!(Ray::from_world(Point::origin(), Point::new(1.0, 0.0, 0.0), &Matrix4::zeros()).is_none());
    }
}
