pub mod config;
pub mod spec;
pub mod stage;

pub use config::{DatabaseConfig, DatabaseFile, DockerfileRef, ImagesFile, NetworkConfig, NetworksFile};
pub use spec::{
    CommandSpec, CommitSpec, ContainerSpec, CopySpec, Environment, NetworkInterface, PortBinding,
    VolumeBinding,
};
pub use stage::{ParseLevelError, RunCheckpoint, StageLevel};
