//! Surface normal estimation and image-based metallic-roughness shading.

use crate::{
    env::{EnvMapConstants, EnvironmentMap, direction_to_uv},
    interp::{mix, saturate},
    march::MarchParams,
    types::{Point, Rgb, Value, Vector},
    volume::VolumeField,
};

/// Specular reflectance at normal incidence for dielectrics.
pub const DIELECTRIC_F0: Value = 0.04;

/// Surface albedo. The volume carries density only, so the base color is fixed.
pub const ALBEDO: Rgb = Rgb::new(1.0, 1.0, 1.0);

/// Material parameters. Read-only for the duration of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialParams {
    pub metalness: Value,
    pub roughness: Value,
    pub env_map_intensity: Value,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            metalness: 0.0,
            roughness: 0.0,
            env_map_intensity: 1.0,
        }
    }
}

/// Estimates the outward surface normal at a local-space `position`.
///
/// Central differences, one voxel apart on each axis, over the same displaced sampling
/// used by traversal. Density grows inward, so the normal is the negated gradient.
/// A vanishing gradient falls back to `-ray_dir`.
pub fn estimate_normal(
    position: Point,
    ray_dir: Vector,
    params: &MarchParams,
    volume: &VolumeField,
) -> Vector {
    let e = volume.texel_size();
    let density = |offset: Vector| params.density(volume, position + offset);
    let gradient = Vector::new(
        (density(Vector::x() * e.x) - density(-Vector::x() * e.x)) / (2.0 * e.x),
        (density(Vector::y() * e.y) - density(-Vector::y() * e.y)) / (2.0 * e.y),
        (density(Vector::z() * e.z) - density(-Vector::z() * e.z)) / (2.0 * e.z),
    );
    (-gradient).try_normalize(1e-6).unwrap_or(-ray_dir)
}

/// Analytic approximation of the split-sum environment BRDF.
///
/// Returns the `(scale, bias)` applied to the specular color.
pub fn dfg_approx(n_dot_v: Value, roughness: Value) -> (Value, Value) {
    let c0 = [-1.0, -0.0275, -0.572, 0.022];
    let c1 = [1.0, 0.0425, 1.04, -0.04];
    let r: [Value; 4] = std::array::from_fn(|i| roughness * c0[i] + c1[i]);
    let a004 = (r[0] * r[0]).min((-9.28 * n_dot_v).exp2()) * r[0] + r[1];
    (-1.04 * a004 + r[2], 1.04 * a004 + r[3])
}

/// Reflects `d` about the unit normal `n`.
#[inline]
pub fn reflect(d: Vector, n: Vector) -> Vector {
    d - n * (2.0 * d.dot(&n))
}

/// Environment lookup with the texel inset the shader applies.
pub fn sample_environment(
    env: &EnvironmentMap,
    constants: &EnvMapConstants,
    dir: Vector,
    lod: Value,
) -> Rgb {
    let (u, v) = direction_to_uv(dir);
    let half_w = 0.5 * constants.texel_width;
    let half_h = 0.5 * constants.texel_height;
    env.sample_uv(u.clamp(half_w, 1.0 - half_w), v.clamp(half_h, 1.0 - half_h), lod)
}

/// Diffuse and specular contributions, kept apart for inspection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadingTerms {
    pub diffuse: Rgb,
    pub specular: Rgb,
}

impl ShadingTerms {
    pub fn total(&self) -> Rgb {
        self.diffuse + self.specular
    }
}

/// Evaluates image-based lighting for a surface point.
///
/// `ray_dir` is the unit direction the view ray travelled. Without an environment map
/// both terms are zero: there is no environment contribution and no other light source.
pub fn evaluate(
    normal: Vector,
    ray_dir: Vector,
    material: &MaterialParams,
    env: Option<&EnvironmentMap>,
) -> ShadingTerms {
    let Some(env) = env else {
        return ShadingTerms {
            diffuse: Rgb::zeros(),
            specular: Rgb::zeros(),
        };
    };
    let constants = env.constants();
    let metalness = saturate(material.metalness);
    let roughness = saturate(material.roughness);

    let n_dot_v = saturate(normal.dot(&-ray_dir));
    let specular_color = mix(Rgb::repeat(DIELECTRIC_F0), ALBEDO, metalness);
    let diffuse_color = ALBEDO * (1.0 - metalness);
    let (scale, bias) = dfg_approx(n_dot_v, roughness);

    let reflected = reflect(ray_dir, normal);
    let radiance = sample_environment(env, &constants, reflected, roughness * constants.max_mip)
        * material.env_map_intensity;
    let irradiance = sample_environment(env, &constants, normal, constants.max_mip)
        * material.env_map_intensity;

    ShadingTerms {
        diffuse: irradiance.component_mul(&diffuse_color),
        specular: radiance.component_mul(&(specular_color * scale + Rgb::repeat(bias))),
    }
}

/// Final linear color of a surface point. See [`evaluate`].
pub fn shade(
    normal: Vector,
    ray_dir: Vector,
    material: &MaterialParams,
    env: Option<&EnvironmentMap>,
) -> Rgb {
    evaluate(normal, ray_dir, material, env).total()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::march::{Ray, march};

    fn sphere_volume() -> VolumeField {
        VolumeField::new(32, 32, 32).fill(&|p: Point| {
            let d = (p - Point::new(0.5, 0.5, 0.5)).norm();
            if d < 0.3 { 1.0 } else { 0.0 }
        })
    }

    #[test]
    fn sphere_normals_point_outward() {
        let volume = sphere_volume();
        let params = MarchParams::default();
        for d in [Vector::z(), Vector::new(0.4, 0.3, 1.0), Vector::new(-1.0, 0.2, -0.3)] {
            let ray = Ray::new(Point::origin() - d.normalize() * 2.0, d).unwrap();
            let crossing = march(&ray, &params, &volume).unwrap();
            let normal = estimate_normal(crossing.position, ray.direction, &params, &volume);
            let outward = (crossing.position - Point::origin()).normalize();
            assert!((normal.norm() - 1.0).abs() < 1e-5);
            assert!(normal.dot(&outward) > 0.7, "normal {normal:?} vs {outward:?}");
        }
    }

    #[test]
    fn flat_field_falls_back_to_view_direction() {
        let volume = VolumeField::new(4, 4, 4).fill(&|_| 1.0);
        let dir = Vector::new(0.0, 0.6, 0.8);
        let normal = estimate_normal(Point::origin(), dir, &MarchParams::default(), &volume);
        assert_eq!(normal, -dir);
        assert!(normal.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn no_environment_means_no_contribution() {
        let terms = evaluate(-Vector::z(), Vector::z(), &MaterialParams::default(), None);
        assert_eq!(terms.total(), Rgb::zeros());
    }

    #[test]
    fn metals_have_no_diffuse_term() {
        let env = EnvironmentMap::uniform(16, 8, Rgb::repeat(1.0)).unwrap();
        let material = MaterialParams {
            metalness: 1.0,
            roughness: 0.5,
            ..Default::default()
        };
        let terms = evaluate(-Vector::z(), Vector::z(), &material, Some(&env));
        assert_eq!(terms.diffuse, Rgb::zeros());
        assert!(terms.specular.x > 0.0);
    }

    #[test]
    fn dielectrics_are_mostly_diffuse_under_uniform_light() {
        let env = EnvironmentMap::uniform(16, 8, Rgb::repeat(1.0)).unwrap();
        let terms = evaluate(-Vector::z(), Vector::z(), &MaterialParams::default(), Some(&env));
        assert!((terms.diffuse.x - 1.0).abs() < 1e-5);
        assert!(terms.specular.x > 0.0 && terms.specular.x < 0.1);
    }

    #[test]
    fn intensity_scales_linearly() {
        let env = EnvironmentMap::uniform(16, 8, Rgb::repeat(0.5)).unwrap();
        let base = MaterialParams::default();
        let bright = MaterialParams {
            env_map_intensity: 2.0,
            ..base
        };
        let a = shade(-Vector::z(), Vector::z(), &base, Some(&env));
        let b = shade(-Vector::z(), Vector::z(), &bright, Some(&env));
        assert!((b - a * 2.0).norm() < 1e-5);
    }

    #[test]
    fn dfg_stays_in_unit_range() {
        for n_dot_v in [0.0, 0.3, 1.0] {
            for roughness in [0.0, 0.5, 1.0] {
                let (a, b) = dfg_approx(n_dot_v, roughness);
                assert!(a + b > -1e-4 && a + b < 1.0 + 1e-4, "{n_dot_v} {roughness} -> {a} {b}");
            }
        }
    }
}
