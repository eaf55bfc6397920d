pub mod engine;
pub mod model;

pub use engine::PlanEngine;
pub use model::{BuildConfig, LaunchPlan, MountConfig, MountSource, ServiceConfig, VolumeConfig};
