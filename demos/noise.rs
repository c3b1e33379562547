use bevy::prelude::*;
use bevy_infinite_grid::{InfiniteGridBundle, InfiniteGridPlugin, InfiniteGridSettings};
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};
use bevy_volume_marcher::{
    VolumeMarcher, VolumeMarcherOptions, VolumeMarcherPlugin,
    env::{EnvMapSource, EnvironmentMap},
    interp::{remap, saturate},
    plugin::VolumeMarcherSet,
    types::{Point, Rgb},
    volume::VolumeField,
};
use noiz::prelude::*;

type TerrainNoise = Noise<
    LayeredNoise<
        Normed<f32>,
        Persistence,
        Octave<MixCellGradients<OrthoGrid, Smoothstep, QuickGradients>>,
    >,
>;

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            VolumeMarcherPlugin::default(),
            PanOrbitCameraPlugin,
            InfiniteGridPlugin,
        ))
        .add_systems(Startup, setup)
        .add_systems(Update, animate.before(VolumeMarcherSet::Sync))
        .run();
}

fn setup(mut commands: Commands, mut images: ResMut<Assets<Image>>) -> Result {
    const RESOLUTION: usize = 96;

    commands.spawn(InfiniteGridBundle {
        settings: InfiniteGridSettings {
            fadeout_distance: 100.0,
            ..Default::default()
        },
        ..Default::default()
    });

    commands.spawn((
        Camera3d::default(),
        PanOrbitCamera {
            button_orbit: MouseButton::Right,
            button_pan: MouseButton::Middle,
            ..default()
        },
        Transform::from_xyz(8.0, 6.0, 8.0).looking_at(Vec3::Y * 2.0, Vec3::Y),
    ));

    let mut noise = TerrainNoise::default();
    noise.set_frequency(4.0);

    // Noise in [-1, 1], faded out towards the box walls so the blob stays closed.
    let volume = VolumeField::new(RESOLUTION, RESOLUTION, RESOLUTION).fill(&move |p: Point| {
        let n: f32 = noise.sample_for(Vec3::new(p.x, p.y, p.z));
        let edge = (p - Point::new(0.5, 0.5, 0.5)).abs().max() * 2.0;
        saturate(remap(n, [-1.0, 1.0], [0.0, 1.0]) * (1.0 - edge * edge) * 1.6)
    });

    let env_map = EnvironmentMap::from_fn(256, 128, |dir| {
        Rgb::new(0.6, 0.7, 0.9) * (0.5 + 0.5 * dir.y) + Rgb::repeat(0.1)
    })?
    .to_image();
    let env_map = EnvMapSource::new(images.add(env_map.clone()), &env_map);

    commands.spawn((
        VolumeMarcher::new(VolumeMarcherOptions {
            env_map: Some(env_map),
            env_map_intensity: 1.5,
            metalness: 0.9,
            roughness: 0.25,
            ..VolumeMarcherOptions::new(images.add(volume.to_image()?))
        }),
        Transform::from_xyz(0.0, 2.5, 0.0).with_scale(Vec3::splat(5.0)),
    ));
    Ok(())
}

/// Sweeps the threshold and ripples the surface. Only uniforms change: no recompiles.
fn animate(time: Res<Time>, mut query: Query<&mut VolumeMarcher>) {
    let t = time.elapsed_secs();
    for mut marcher in query.iter_mut() {
        marcher.set_threshold(0.45 + 0.1 * (t * 0.5).sin());
        marcher.set_displacement_frequency(12.0);
        marcher.set_displacement_scale(0.01 + 0.01 * (t * 1.3).sin().abs());
    }
}
