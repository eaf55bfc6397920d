pub mod child;
pub mod docker;
pub mod local;
pub mod traits;

pub use child::ChildProcess;
pub use docker::DockerServiceProvider;
pub use local::LocalServiceProvider;
pub use traits::{ServiceProcess, ServiceProvider};
