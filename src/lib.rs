//! Real-time image-source propagation core.
//!
//! An [`AcousticWorld`] holds point sources, diffuse fields, reflecting
//! polygons, obstacles, masks and receivers. Each call to
//! [`AcousticWorld::process`] renders one block: image sources are mirrored
//! across the reflectors, every audible path is delayed, attenuated and
//! diffracted, and the result is accumulated into the receivers.

pub mod acoustic_model;
pub mod config;
pub mod control;
pub mod dsp;
pub mod error;
pub mod geometry;
pub mod math;
pub mod mirror;
pub mod receiver;
pub mod scene;
pub mod world;

pub use acoustic_model::{AcousticModel, DiffuseAcousticModel, PathKey};
pub use config::AcousticWorldDesc;
pub use control::{CommandSender, SceneCommand};
pub use dsp::FoaBuffer;
pub use error::{AcousticsError, Result};
pub use geometry::{Polygon, Shoebox};
pub use math::{EulerAccumulation, ZyxEuler};
pub use mirror::{ImageSource, MirrorModel, SurfaceChain};
pub use receiver::{Receiver, ReceiverModule};
pub use scene::{
    AcousticMaterial, BoundingBox, DiffuseSource, Mask, Obstacle, PointSource, Reflector,
};
pub use world::{
    AcousticWorld, DiffuseSourceId, MaskId, ObstacleId, ReceiverId, ReflectorId, SourceId,
};
