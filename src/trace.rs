use ndarray::{Array2, Axis};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

use crate::{
    env::EnvironmentMap,
    march::{MarchParams, Ray, march},
    shading::{MaterialParams, estimate_normal, shade},
    types::{Point, Rgb, Value, Vector},
    volume::VolumeField,
};

/// A shaded surface point. All positions and directions are in the cube's local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub position: Point,
    pub normal: Vector,
    /// Linear, opaque color.
    pub color: Rgb,
}

/// Traces a single ray: traversal, then normal estimation and shading on a crossing.
///
/// Pure and free of shared state, so it can be evaluated for any number of rays in
/// parallel. `None` means the invocation is discarded and the background shows through.
///
/// ```text
/// 1. intersect_unit_cube   →  entry/exit parameters
/// 2. march (≤ STEPS)       →  first sample with density >= threshold
/// 3. estimate_normal       →  -∇density, central differences
/// 4. shade                 →  image-based metallic-roughness color
/// ```
pub fn trace(
    ray: &Ray,
    march_params: &MarchParams,
    material: &MaterialParams,
    volume: &VolumeField,
    env: Option<&EnvironmentMap>,
) -> Option<Hit> {
    let crossing = march(ray, march_params, volume)?;
    let normal = estimate_normal(crossing.position, ray.direction, march_params, volume);
    let color = shade(normal, ray.direction, material, env);
    Some(Hit {
        position: crossing.position,
        normal,
        color,
    })
}

/// Pinhole camera expressed in the cube's local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameCamera {
    pub origin: Point,
    pub target: Point,
    pub up: Vector,
    /// Vertical field of view, in radians.
    pub vertical_fov: Value,
    pub width: u32,
    pub height: u32,
}

impl Default for FrameCamera {
    fn default() -> Self {
        Self {
            origin: Point::new(0.0, 0.0, -2.0),
            target: Point::origin(),
            up: Vector::y(),
            vertical_fov: 45.0_f32.to_radians(),
            width: 64,
            height: 64,
        }
    }
}

impl FrameCamera {
    /// Ray through the center of pixel `(x, y)`, with `y` growing downwards.
    ///
    /// Returns `None` for a degenerate camera (origin on target, or `up` parallel to the view).
    pub fn ray_for_pixel(&self, x: u32, y: u32) -> Option<Ray> {
        let forward = (self.target - self.origin).try_normalize(Value::EPSILON)?;
        let right = forward.cross(&self.up).try_normalize(Value::EPSILON)?;
        let up = right.cross(&forward);

        let half_height = (self.vertical_fov * 0.5).tan();
        let half_width = half_height * self.width as Value / self.height.max(1) as Value;
        let ndc_x = 2.0 * (x as Value + 0.5) / self.width.max(1) as Value - 1.0;
        let ndc_y = 1.0 - 2.0 * (y as Value + 0.5) / self.height.max(1) as Value;

        Ray::new(
            self.origin,
            forward + right * (ndc_x * half_width) + up * (ndc_y * half_height),
        )
    }
}

/// Result of tracing a whole frame, indexed `[row, column]`.
#[derive(Clone, Debug)]
pub struct Frame {
    pub hits: Array2<Option<Hit>>,
}

impl Frame {
    /// Number of pixels that produced a fragment.
    pub fn coverage(&self) -> usize {
        self.hits.iter().filter(|h| h.is_some()).count()
    }

    /// Row-major RGBA pixels. Discarded pixels are fully transparent.
    pub fn rgba(&self) -> Vec<[Value; 4]> {
        self.hits
            .iter()
            .map(|hit| match hit {
                Some(hit) => [hit.color.x, hit.color.y, hit.color.z, 1.0],
                None => [0.0; 4],
            })
            .collect()
    }
}

/// Traces every pixel of `camera`'s frame.
///
/// Work is parallelised over rows using Rayon, each worker writing its own row of the
/// frame in place; each pixel is an independent [`trace`].
pub fn trace_frame(
    camera: &FrameCamera,
    march_params: &MarchParams,
    material: &MaterialParams,
    volume: &VolumeField,
    env: Option<&EnvironmentMap>,
) -> Frame {
    let shape = (camera.height as usize, camera.width as usize);
    let mut hits = Array2::from_elem(shape, None);
    hits.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(y, mut row)| {
            for (x, hit) in row.iter_mut().enumerate() {
                *hit = camera
                    .ray_for_pixel(x as u32, y as u32)
                    .and_then(|ray| trace(&ray, march_params, material, volume, env));
            }
        });
    Frame { hits }
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
    fn trace_reports_position_normal_and_color() {
        let env = EnvironmentMap::uniform(16, 8, Rgb::repeat(1.0)).unwrap();
        let ray = Ray::new(Point::new(0.0, 0.0, -2.0), Vector::z()).unwrap();
        let hit = trace(
            &ray,
            &MarchParams::default(),
            &MaterialParams::default(),
            &sphere_volume(),
            Some(&env),
        )
        .unwrap();
        assert!(hit.position.z < -0.25 && hit.position.z > -0.35);
        assert!(hit.normal.z < -0.9);
        assert!(hit.color.x > 0.9);
    }

    #[test]
    fn missed_rays_are_discarded() {
        let ray = Ray::new(Point::new(0.45, 0.45, -2.0), Vector::z()).unwrap();
        let hit = trace(
            &ray,
            &MarchParams::default(),
            &MaterialParams::default(),
            &sphere_volume(),
            None,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn frame_covers_the_sphere_silhouette() {
        let camera = FrameCamera {
            width: 32,
            height: 32,
            ..Default::default()
        };
        let frame = trace_frame(
            &camera,
            &MarchParams::default(),
            &MaterialParams::default(),
            &sphere_volume(),
            None,
        );
        assert_eq!(frame.hits.dim(), (32, 32));
        assert!(frame.hits[[16, 16]].is_some());
        assert!(frame.hits[[0, 0]].is_none());
        let coverage = frame.coverage();
        assert!(coverage > 0 && coverage < 32 * 32);
        assert_eq!(frame.rgba()[0], [0.0; 4]);
    }

    #[test]
    fn dense_volume_covers_every_pixel_that_sees_the_cube() {
        let volume = VolumeField::new(4, 4, 4).fill(&|_| 1.0);
        let camera = FrameCamera {
            origin: Point::new(0.0, 0.0, -0.9),
            width: 8,
            height: 8,
            ..Default::default()
        };
        let frame = trace_frame(
            &camera,
            &MarchParams::default(),
            &MaterialParams::default(),
            &volume,
            None,
        );
        assert_eq!(frame.coverage(), 64);
    }

    #[test]
    fn frame_rows_run_top_to_bottom() {
        let upper_half = VolumeField::new(8, 8, 8).fill(&|p: Point| if p.y > 0.5 { 1.0 } else { 0.0 });
        let camera = FrameCamera {
            width: 8,
            height: 8,
            ..Default::default()
        };
        let frame = trace_frame(
            &camera,
            &MarchParams::default(),
            &MaterialParams::default(),
            &upper_half,
            None,
        );
        assert!(frame.hits[[1, 4]].is_some());
        assert!(frame.hits[[6, 4]].is_none());

        let wide = FrameCamera {
            width: 6,
            height: 3,
            ..Default::default()
        };
        let frame = trace_frame(
            &wide,
            &MarchParams::default(),
            &MaterialParams::default(),
            &upper_half,
            None,
        );
        assert_eq!(frame.hits.dim(), (3, 6));
        assert_eq!(frame.rgba().len(), 18);
    }

    #[test]
    fn degenerate_camera_traces_nothing() {
        let camera = FrameCamera {
            origin: Point::origin(),
            target: Point::origin(),
            width: 4,
            height: 4,
            ..Default::default()
        };
        let volume = VolumeField::new(2, 2, 2).fill(&|_| 1.0);
        let frame = trace_frame(
            &camera,
            &MarchParams::default(),
            &MaterialParams::default(),
            &volume,
            None,
        );
        assert_eq!(frame.coverage(), 0);
    }
}
