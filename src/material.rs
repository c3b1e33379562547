use bevy::{
    mesh::MeshVertexBufferLayoutRef,
    pbr::{MaterialPipeline, MaterialPipelineKey},
    prelude::*,
    render::render_resource::{
        AsBindGroup, Face, RenderPipelineDescriptor, ShaderType, SpecializedMeshPipelineError,
    },
    shader::{ShaderDefVal, ShaderRef},
};
use bytemuck::{Pod, Zeroable};

use crate::{env::EnvMapConstants, march::STEPS};

/// Asset path of the embedded ray marching shader (vertex and fragment stages).
pub const SHADER_PATH: &str = "embedded://bevy_volume_marcher/shaders/volume_marcher.wgsl";

/// Uniform block of the marcher. Layout must match `VolumeMarcherUniform` in the shader.
#[derive(Clone, Copy, Debug, PartialEq, ShaderType)]
pub struct VolumeMarcherUniform {
    pub threshold: f32,
    pub displacement_frequency: f32,
    pub displacement_scale: f32,
    pub env_map_intensity: f32,
    pub metalness: f32,
    pub roughness: f32,
}

impl Default for VolumeMarcherUniform {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            displacement_frequency: 0.0,
            displacement_scale: 0.0,
            env_map_intensity: 1.0,
            metalness: 0.0,
            roughness: 0.0,
        }
    }
}

/// Compile-time constants of the marcher shader.
///
/// Unlike uniforms, any change here selects a different pipeline, i.e. a recompile.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MarcherDefines {
    /// `ENVMAP_TYPE_CUBE_UV`: an environment map is bound.
    pub envmap_type_cube_uv: bool,
    /// `CUBEUV_MAX_MIP`, `CUBEUV_TEXEL_WIDTH`, `CUBEUV_TEXEL_HEIGHT` of the bound map.
    pub cubeuv: Option<EnvMapConstants>,
}

/// Specialization key carrying [`MarcherDefines`] into the render world.
///
/// Float defines travel as raw bit patterns; the shader `bitcast`s them back.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct VolumeMarcherKey {
    pub envmap_type_cube_uv: u32,
    pub cubeuv_max_mip: u32,
    pub cubeuv_texel_width: u32,
    pub cubeuv_texel_height: u32,
}

impl From<&MarcherDefines> for VolumeMarcherKey {
    fn from(defines: &MarcherDefines) -> Self {
        let [cubeuv_max_mip, cubeuv_texel_width, cubeuv_texel_height] =
            defines.cubeuv.map(EnvMapConstants::to_bits).unwrap_or_default();
        Self {
            envmap_type_cube_uv: defines.envmap_type_cube_uv as u32,
            cubeuv_max_mip,
            cubeuv_texel_width,
            cubeuv_texel_height,
        }
    }
}

impl From<&VolumeMarcherMaterial> for VolumeMarcherKey {
    fn from(material: &VolumeMarcherMaterial) -> Self {
        Self::from(&material.defines)
    }
}

impl VolumeMarcherKey {
    /// Shader defs of the marcher module. `STEPS` is always present.
    pub fn shader_defs(&self) -> Vec<ShaderDefVal> {
        let mut defs = vec![ShaderDefVal::UInt("STEPS".into(), STEPS)];
        if self.envmap_type_cube_uv != 0 {
            defs.push("ENVMAP_TYPE_CUBE_UV".into());
            defs.push(ShaderDefVal::UInt("CUBEUV_MAX_MIP".into(), self.cubeuv_max_mip));
            defs.push(ShaderDefVal::UInt(
                "CUBEUV_TEXEL_WIDTH".into(),
                self.cubeuv_texel_width,
            ));
            defs.push(ShaderDefVal::UInt(
                "CUBEUV_TEXEL_HEIGHT".into(),
                self.cubeuv_texel_height,
            ));
        }
        defs
    }
}

/// GPU material that ray marches a 3D density texture inside the unit box it is drawn on.
///
/// Usually owned and kept in sync by a [`VolumeMarcher`](crate::marcher::VolumeMarcher)
/// rather than edited directly.
#[derive(Asset, TypePath, AsBindGroup, Clone, Debug)]
#[bind_group_data(VolumeMarcherKey)]
pub struct VolumeMarcherMaterial {
    #[uniform(0)]
    pub params: VolumeMarcherUniform,
    #[texture(1, dimension = "3d")]
    #[sampler(2)]
    pub volume: Handle<Image>,
    #[texture(3)]
    #[sampler(4)]
    pub env_map: Option<Handle<Image>>,
    pub defines: MarcherDefines,
}

impl Material for VolumeMarcherMaterial {
    fn vertex_shader() -> ShaderRef {
        SHADER_PATH.into()
    }

    fn fragment_shader() -> ShaderRef {
        SHADER_PATH.into()
    }

    // The box only bounds the volume; its faces must not occlude or shadow anything.
    fn enable_prepass() -> bool {
        false
    }

    fn enable_shadows() -> bool {
        false
    }

    fn specialize(
        _pipeline: &MaterialPipeline,
        descriptor: &mut RenderPipelineDescriptor,
        layout: &MeshVertexBufferLayoutRef,
        key: MaterialPipelineKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError> {
        let vertex_layout = layout
            .0
            .get_layout(&[Mesh::ATTRIBUTE_POSITION.at_shader_location(0)])?;
        descriptor.vertex.buffers = vec![vertex_layout];
        // Draw the inside faces so the camera may enter the volume.
        descriptor.primitive.cull_mode = Some(Face::Front);
        // Both stages live in one module, so both need every define.
        let defs = key.bind_group_data.shader_defs();
        descriptor.vertex.shader_defs.extend(defs.iter().cloned());
        if let Some(fragment) = descriptor.fragment.as_mut() {
            fragment.shader_defs.extend(defs);
        }
        Ok(())
    }
}
