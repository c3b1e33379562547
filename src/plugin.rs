use bevy::{asset::embedded_asset, prelude::*};
use tracing::{debug, trace, warn};

use crate::{marcher::VolumeMarcher, material::VolumeMarcherMaterial};

/// System sets for the volume marcher.
///
/// Use these to order your own systems, e.g. parameter animation, before the push to the GPU:
///
/// ```rust,ignore
/// app.add_systems(Update, animate_threshold.before(VolumeMarcherSet::Sync));
/// ```
///
/// ```text
/// VolumeMarcherSet::Build  →  VolumeMarcherSet::Sync
/// ```
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum VolumeMarcherSet {
    /// Creates the box mesh and material of every [`VolumeMarcher`] that has none yet.
    Build,
    /// Re-measures bound environment images that changed, then writes changed
    /// [`VolumeMarcher`] parameters into their [`VolumeMarcherMaterial`].
    Sync,
}

/// Runtime configuration of the volume marcher.
///
/// Inserted as a resource by [`VolumeMarcherPlugin`]:
///
/// ```rust,ignore
/// fn freeze(mut config: ResMut<VolumeMarcherConfig>) {
///     config.sync_materials = false; // keep drawing the last pushed parameters
/// }
/// ```
#[derive(Resource, Debug)]
pub struct VolumeMarcherConfig {
    /// Push component changes into material assets every frame. Default: `true`.
    pub sync_materials: bool,
}

impl Default for VolumeMarcherConfig {
    fn default() -> Self {
        Self {
            sync_materials: true,
        }
    }
}

/// Bevy plugin that renders [`VolumeMarcher`] components.
///
/// Embeds the marcher shader and registers [`VolumeMarcherMaterial`]. With the
/// `auto_sync` feature, spawning a marcher is enough:
///
/// ```text
/// VolumeMarcher added
///   → Mesh3d + MeshMaterial3d inserted      (VolumeMarcherSet::Build)
///   → [your systems call the setters]
///   → material asset rewritten on change    (VolumeMarcherSet::Sync)
///   → pipeline re-specialized if defines changed
/// ```
pub struct VolumeMarcherPlugin {
    /// Initial value for [`VolumeMarcherConfig::sync_materials`].
    pub sync_materials: bool,
}

impl Default for VolumeMarcherPlugin {
    fn default() -> Self {
        Self {
            sync_materials: VolumeMarcherConfig::default().sync_materials,
        }
    }
}

impl Plugin for VolumeMarcherPlugin {
    fn build(&self, app: &mut App) {
        embedded_asset!(app, "shaders/volume_marcher.wgsl");

        app.add_plugins(MaterialPlugin::<VolumeMarcherMaterial>::default())
            .insert_resource(VolumeMarcherConfig {
                sync_materials: self.sync_materials,
            });

        #[cfg(feature = "auto_sync")]
        app.configure_sets(
            Update,
            (VolumeMarcherSet::Build, VolumeMarcherSet::Sync).chain(),
        )
        .add_systems(
            Update,
            (
                build_pending_marchers.in_set(VolumeMarcherSet::Build),
                (refresh_env_maps, sync_marcher_materials)
                    .chain()
                    .in_set(VolumeMarcherSet::Sync),
            ),
        );
    }
}

/// Builds render resources for marchers spawned without them.
fn build_pending_marchers(
    mut commands: Commands,
    mut query: Query<
        (Entity, &mut VolumeMarcher),
        Without<MeshMaterial3d<VolumeMarcherMaterial>>,
    >,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<VolumeMarcherMaterial>>,
) {
    for (entity, mut marcher) in query.iter_mut() {
        if marcher.material_handle().is_some() {
            continue;
        }
        let render = marcher.build(&mut meshes, &mut materials);
        commands.entity(entity).insert(render);
        debug!(?entity, "built volume marcher");
    }
}

/// Re-derives environment map constants when a bound image is added, modified or replaced.
fn refresh_env_maps(
    mut events: MessageReader<AssetEvent<Image>>,
    images: Res<Assets<Image>>,
    mut query: Query<(Entity, &mut VolumeMarcher)>,
) {
    for event in events.read() {
        let (AssetEvent::Added { id } | AssetEvent::Modified { id }) = event else {
            continue;
        };
        let Some(image) = images.get(*id) else {
            continue;
        };
        for (entity, mut marcher) in query.iter_mut() {
            if marcher.bypass_change_detection().refresh_env_map(*id, image) {
                marcher.set_changed();
                debug!(
                    ?entity,
                    height = image.texture_descriptor.size.height,
                    "environment map resized"
                );
            }
        }
    }
}

/// Pushes changed marcher state into the owned materials.
///
/// Clearing the recompile flag bypasses change detection so the marcher is not
/// re-synced next frame.
fn sync_marcher_materials(
    config: Res<VolumeMarcherConfig>,
    mut query: Query<(Entity, &mut VolumeMarcher), Changed<VolumeMarcher>>,
    mut materials: ResMut<Assets<VolumeMarcherMaterial>>,
) {
    if !config.sync_materials {
        return;
    }

    for (entity, mut marcher) in query.iter_mut() {
        let Some(handle) = marcher.material_handle().cloned() else {
            continue;
        };
        match materials.get_mut(&handle) {
            Some(mut material) => {
                marcher.write_material(&mut material);
                trace!(?entity, "synced volume marcher uniforms");
            }
            None => {
                warn!(?entity, "volume marcher material asset is missing");
                continue;
            }
        }
        if marcher.bypass_change_detection().take_needs_update() {
            debug!(?entity, defines = ?marcher.defines(), "volume marcher shader defines changed");
        }
    }
}
