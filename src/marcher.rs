use bevy::prelude::*;
use tracing::debug;

use crate::{
    env::EnvMapSource,
    march::MarchParams,
    material::{MarcherDefines, VolumeMarcherMaterial, VolumeMarcherUniform},
    mesh::unit_box_mesh,
    shading::MaterialParams,
};

/// Construction-time configuration of a [`VolumeMarcher`].
///
/// Everything but the volume has a default:
///
/// ```rust,ignore
/// let marcher = VolumeMarcher::new(VolumeMarcherOptions {
///     roughness: 0.3,
///     env_map: Some(EnvMapSource::new(env_handle, &env_image)),
///     ..VolumeMarcherOptions::new(volume_handle)
/// });
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeMarcherOptions {
    pub displacement_frequency: f32,
    pub displacement_scale: f32,
    pub env_map: Option<EnvMapSource>,
    pub env_map_intensity: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub threshold: f32,
    /// 3D density texture, see [`VolumeField::to_image`](crate::volume::VolumeField::to_image).
    pub volume: Handle<Image>,
}

impl VolumeMarcherOptions {
    pub fn new(volume: Handle<Image>) -> Self {
        let defaults = VolumeMarcherUniform::default();
        Self {
            displacement_frequency: defaults.displacement_frequency,
            displacement_scale: defaults.displacement_scale,
            env_map: None,
            env_map_intensity: defaults.env_map_intensity,
            metalness: defaults.metalness,
            roughness: defaults.roughness,
            threshold: defaults.threshold,
            volume,
        }
    }
}

/// Host-side parameter binding of one ray-marched volume.
///
/// Every parameter is a plain get/set pair writing into uniform storage, which the
/// plugin pushes to the owned [`VolumeMarcherMaterial`] whenever the component changes.
/// The environment map is the exception: its setter also maintains the shader defines
/// and reports whether they changed, since that forces a pipeline recompile.
///
/// ```text
/// set_threshold(..)      →  uniform write                →  bind group refresh
/// set_env_map(..)        →  uniform write + defines      →  pipeline re-specialization
/// ```
///
/// After [`dispose`](VolumeMarcher::dispose) only `dispose` itself may be called again;
/// any other use is a precondition violation and is not checked.
#[derive(Component, Debug)]
pub struct VolumeMarcher {
    uniform: VolumeMarcherUniform,
    volume: Handle<Image>,
    env_map: Option<EnvMapSource>,
    defines: MarcherDefines,
    needs_update: bool,
    mesh: Option<Handle<Mesh>>,
    material: Option<Handle<VolumeMarcherMaterial>>,
}

impl VolumeMarcher {
    pub fn new(options: VolumeMarcherOptions) -> Self {
        let mut marcher = Self {
            uniform: VolumeMarcherUniform {
                threshold: options.threshold,
                displacement_frequency: options.displacement_frequency,
                displacement_scale: options.displacement_scale,
                env_map_intensity: options.env_map_intensity,
                metalness: options.metalness,
                roughness: options.roughness,
            },
            volume: options.volume,
            env_map: None,
            defines: MarcherDefines::default(),
            needs_update: false,
            mesh: None,
            material: None,
        };
        if options.env_map.is_some() {
            marcher.set_env_map(options.env_map);
        }
        // No material exists yet; the first build compiles with the current defines.
        marcher.needs_update = false;
        marcher
    }

    pub fn threshold(&self) -> f32 {
        self.uniform.threshold
    }

    pub fn set_threshold(&mut self, value: f32) {
        self.uniform.threshold = value;
    }

    pub fn displacement_frequency(&self) -> f32 {
        self.uniform.displacement_frequency
    }

    pub fn set_displacement_frequency(&mut self, value: f32) {
        self.uniform.displacement_frequency = value;
    }

    pub fn displacement_scale(&self) -> f32 {
        self.uniform.displacement_scale
    }

    pub fn set_displacement_scale(&mut self, value: f32) {
        self.uniform.displacement_scale = value;
    }

    pub fn env_map_intensity(&self) -> f32 {
        self.uniform.env_map_intensity
    }

    pub fn set_env_map_intensity(&mut self, value: f32) {
        self.uniform.env_map_intensity = value;
    }

    pub fn metalness(&self) -> f32 {
        self.uniform.metalness
    }

    pub fn set_metalness(&mut self, value: f32) {
        self.uniform.metalness = value;
    }

    pub fn roughness(&self) -> f32 {
        self.uniform.roughness
    }

    pub fn set_roughness(&mut self, value: f32) {
        self.uniform.roughness = value;
    }

    pub fn volume(&self) -> &Handle<Image> {
        &self.volume
    }

    pub fn set_volume(&mut self, volume: Handle<Image>) {
        self.volume = volume;
    }

    pub fn env_map(&self) -> Option<&EnvMapSource> {
        self.env_map.as_ref()
    }

    /// Binds (or clears) the environment map and refreshes the derived defines.
    ///
    /// Returns `true` when any define changed, which also raises
    /// [`needs_update`](VolumeMarcher::needs_update). Binding a map with the same
    /// resolution as the current one returns `false`.
    pub fn set_env_map(&mut self, env_map: Option<EnvMapSource>) -> bool {
        let mut changed = false;

        let present = env_map.is_some();
        if self.defines.envmap_type_cube_uv != present {
            self.defines.envmap_type_cube_uv = present;
            changed = true;
        }

        let constants = env_map.as_ref().map(EnvMapSource::constants);
        if self.defines.cubeuv != constants {
            self.defines.cubeuv = constants;
            changed = true;
        }

        self.env_map = env_map;
        if changed {
            debug!(defines = ?self.defines, "environment map defines changed");
            self.needs_update = true;
        }
        changed
    }

    /// Re-measures the bound environment map after its image asset changed.
    ///
    /// Returns whether the derived defines changed, like [`set_env_map`](Self::set_env_map).
    /// Images other than the bound one are ignored.
    pub fn refresh_env_map(&mut self, id: AssetId<Image>, image: &Image) -> bool {
        let Some(current) = self.env_map.as_ref().filter(|env| env.image().id() == id) else {
            return false;
        };
        let refreshed = EnvMapSource::new(current.image().clone(), image);
        if refreshed == *current {
            return false;
        }
        self.set_env_map(Some(refreshed))
    }

    pub fn defines(&self) -> &MarcherDefines {
        &self.defines
    }

    /// Whether a define changed since the flag was last taken.
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Returns and clears the recompile flag.
    pub fn take_needs_update(&mut self) -> bool {
        std::mem::take(&mut self.needs_update)
    }

    /// Snapshot of the traversal parameters, for the CPU tracer.
    pub fn march_params(&self) -> MarchParams {
        MarchParams {
            threshold: self.uniform.threshold,
            displacement_frequency: self.uniform.displacement_frequency,
            displacement_scale: self.uniform.displacement_scale,
        }
    }

    /// Snapshot of the shading parameters, for the CPU tracer.
    pub fn material_params(&self) -> MaterialParams {
        MaterialParams {
            metalness: self.uniform.metalness,
            roughness: self.uniform.roughness,
            env_map_intensity: self.uniform.env_map_intensity,
        }
    }

    /// Copies every parameter from `source` by reapplying each setter.
    ///
    /// Mesh and material handles are not copied: the two marchers never share
    /// uniform storage.
    pub fn copy_from(&mut self, source: &VolumeMarcher) -> &mut Self {
        self.set_displacement_frequency(source.displacement_frequency());
        self.set_displacement_scale(source.displacement_scale());
        self.set_env_map(source.env_map.clone());
        self.set_env_map_intensity(source.env_map_intensity());
        self.set_metalness(source.metalness());
        self.set_roughness(source.roughness());
        self.set_threshold(source.threshold());
        self.set_volume(source.volume.clone());
        self
    }

    /// A material reflecting the current uniforms, textures and defines.
    pub fn to_material(&self) -> VolumeMarcherMaterial {
        VolumeMarcherMaterial {
            params: self.uniform,
            volume: self.volume.clone(),
            env_map: self.env_map.as_ref().map(|env| env.image().clone()),
            defines: self.defines,
        }
    }

    /// Pushes the current state into an existing material.
    pub fn write_material(&self, material: &mut VolumeMarcherMaterial) {
        material.params = self.uniform;
        material.defines = self.defines;
        if material.volume != self.volume {
            material.volume = self.volume.clone();
        }
        let env_image = self.env_map.as_ref().map(EnvMapSource::image);
        if material.env_map.as_ref() != env_image {
            material.env_map = env_image.cloned();
        }
    }

    pub fn mesh_handle(&self) -> Option<&Handle<Mesh>> {
        self.mesh.as_ref()
    }

    pub fn material_handle(&self) -> Option<&Handle<VolumeMarcherMaterial>> {
        self.material.as_ref()
    }

    /// Creates the owned box mesh and material and returns the components to render them.
    ///
    /// Any previously built resources are released first.
    ///
    /// ```rust,ignore
    /// let mut marcher = VolumeMarcher::new(VolumeMarcherOptions::new(volume));
    /// let render = marcher.build(&mut meshes, &mut materials);
    /// commands.spawn((marcher, render, Transform::from_scale(Vec3::splat(4.0))));
    /// ```
    pub fn build(
        &mut self,
        meshes: &mut Assets<Mesh>,
        materials: &mut Assets<VolumeMarcherMaterial>,
    ) -> (Mesh3d, MeshMaterial3d<VolumeMarcherMaterial>) {
        self.dispose(meshes, materials);
        let mesh = meshes.add(unit_box_mesh());
        let material = materials.add(self.to_material());
        self.mesh = Some(mesh.clone());
        self.material = Some(material.clone());
        self.needs_update = false;
        (Mesh3d(mesh), MeshMaterial3d(material))
    }

    /// Releases the owned mesh and material.
    ///
    /// Returns whether anything was released. Calling it again is a no-op.
    pub fn dispose(
        &mut self,
        meshes: &mut Assets<Mesh>,
        materials: &mut Assets<VolumeMarcherMaterial>,
    ) -> bool {
        let mut released = false;
        if let Some(mesh) = self.mesh.take() {
            meshes.remove(&mesh);
            released = true;
        }
        if let Some(material) = self.material.take() {
            materials.remove(&material);
            released = true;
        }
        if released {
            debug!("released volume marcher mesh and material");
        }
        released
    }
}
