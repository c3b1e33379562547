pub mod env;
pub mod error;
pub mod interp;
pub mod march;
pub mod marcher;
pub mod material;
pub mod mesh;
pub mod plugin;
pub mod shading;
pub mod trace;
pub mod types;
pub mod volume;

pub use marcher::{VolumeMarcher, VolumeMarcherOptions};
pub use material::VolumeMarcherMaterial;
pub use plugin::VolumeMarcherPlugin;
