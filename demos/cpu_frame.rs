//! Traces a frame on the CPU and prints it as ASCII art. No window, no GPU.

use bevy_volume_marcher::{
    env::EnvironmentMap,
    march::MarchParams,
    shading::MaterialParams,
    trace::{FrameCamera, trace_frame},
    types::{Point, Rgb, Vector},
    volume::VolumeField,
};

const RAMP: &[u8] = b" .:-=+*#%@";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let center = Point::new(0.5, 0.5, 0.5);
    let volume = VolumeField::new(48, 48, 48).fill(&move |p: Point| {
        // Torus around Y.
        let q = p - center;
        let ring = (q.x.hypot(q.z) - 0.25).hypot(q.y);
        if ring < 0.1 { 1.0 } else { 0.0 }
    });
    let env = EnvironmentMap::from_fn(128, 64, |dir: Vector| Rgb::repeat(dir.y.max(0.0)))?;

    let camera = FrameCamera {
        origin: Point::new(0.0, 1.2, -1.6),
        width: 72,
        height: 36,
        ..Default::default()
    };
    let frame = trace_frame(
        &camera,
        &MarchParams::default(),
        &MaterialParams {
            roughness: 0.5,
            ..Default::default()
        },
        &volume,
        Some(&env),
    );

    for row in frame.hits.rows() {
        let line: String = row
            .iter()
            .map(|hit| match hit {
                Some(hit) => {
                    let luma = hit.color.dot(&Rgb::new(0.2126, 0.7152, 0.0722)).clamp(0.0, 1.0);
                    RAMP[1 + (luma * (RAMP.len() - 2) as f32).round() as usize] as char
                }
                None => ' ',
            })
            .collect();
        println!("{line}");
    }
    println!("coverage: {} / {}", frame.coverage(), frame.hits.len());
    Ok(())
}
