use bevy::prelude::*;
use bevy_infinite_grid::{InfiniteGridBundle, InfiniteGridPlugin, InfiniteGridSettings};
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};
use bevy_volume_marcher::{
    VolumeMarcher, VolumeMarcherOptions, VolumeMarcherPlugin,
    env::{EnvMapSource, EnvironmentMap},
    types::{Point, Rgb, Vector},
    volume::VolumeField,
};

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            VolumeMarcherPlugin::default(),
            PanOrbitCameraPlugin,
            InfiniteGridPlugin,
        ))
        .add_systems(Startup, setup)
        .add_systems(Update, toggle_env_map)
        .run();
}

/// Environment image, kept so it can be rebound after being cleared.
#[derive(Resource)]
struct Sky(EnvMapSource);

/// Bright sky above, dark ground below, and a small sun.
fn sky(dir: Vector) -> Rgb {
    let sun = Vector::new(0.4, 0.7, 0.3).normalize();
    let horizon = Rgb::new(0.9, 0.85, 0.8);
    let zenith = Rgb::new(0.2, 0.4, 0.9);
    let ground = Rgb::new(0.15, 0.12, 0.1);
    let base = if dir.y >= 0.0 {
        horizon.lerp(&zenith, dir.y)
    } else {
        horizon.lerp(&ground, (-dir.y).min(1.0).sqrt())
    };
    base + Rgb::repeat(8.0 * dir.dot(&sun).max(0.0).powi(256))
}

fn setup(mut commands: Commands, mut images: ResMut<Assets<Image>>) -> Result {
    const RESOLUTION: usize = 64;

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
        Transform::from_xyz(-6.0, 5.0, -6.0).looking_at(Vec3::Y * 2.0, Vec3::Y),
    ));

    let center = Point::new(0.5, 0.5, 0.5);
    let volume = VolumeField::new(RESOLUTION, RESOLUTION, RESOLUTION)
        .fill(&move |p: Point| (1.0 - (p - center).norm() / 0.5).clamp(0.0, 1.0));
    let volume = images.add(volume.to_image()?);

    let env_map = EnvironmentMap::from_fn(512, 256, sky)?.to_image();
    let env_map = EnvMapSource::new(images.add(env_map.clone()), &env_map);
    commands.insert_resource(Sky(env_map.clone()));

    commands.spawn((
        VolumeMarcher::new(VolumeMarcherOptions {
            env_map: Some(env_map),
            metalness: 0.2,
            roughness: 0.3,
            threshold: 0.4,
            ..VolumeMarcherOptions::new(volume)
        }),
        Transform::from_xyz(0.0, 2.0, 0.0).with_scale(Vec3::splat(4.0)),
    ));
    Ok(())
}

/// `E` toggles the environment map, which swaps shader variants.
fn toggle_env_map(
    keyboard: Res<ButtonInput<KeyCode>>,
    sky: Res<Sky>,
    mut query: Query<&mut VolumeMarcher>,
) {
    if !keyboard.just_pressed(KeyCode::KeyE) {
        return;
    }
    for mut marcher in query.iter_mut() {
        let next = match marcher.env_map() {
            Some(_) => None,
            None => Some(sky.0.clone()),
        };
        if marcher.set_env_map(next) {
            info!("environment map toggled, recompiling");
        }
    }
}
