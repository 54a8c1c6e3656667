//! Control plane: scene updates queued from any thread.
//!
//! Commands go through a bounded channel and are applied by
//! [`AcousticWorld::process`](crate::AcousticWorld::process) at the start of the
//! next block, so the audio thread never waits on a lock and geometry never
//! changes halfway through a block.

use crate::error::{AcousticsError, Result};
use crate::math::{DVec3, ZyxEuler};
use crate::world::{DiffuseSourceId, MaskId, ObstacleId, ReceiverId, ReflectorId, SourceId};
use crossbeam_channel::{Sender, TrySendError};

/// Scene update applied at a block boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneCommand {
    /// Move a primary source
    SetSourcePosition(SourceId, DVec3),
    /// Replace the orientation of a primary source
    SetSourceOrientation(SourceId, ZyxEuler),
    /// Turn a primary source by a delta, accumulated as configured in the world
    RotateSource(SourceId, ZyxEuler),
    SetSourceActive(SourceId, bool),
    SetDiffuseSourceActive(DiffuseSourceId, bool),
    /// Move and turn a receiver
    SetReceiverPose(ReceiverId, DVec3, ZyxEuler),
    /// Turn a receiver by a delta
    RotateReceiver(ReceiverId, ZyxEuler),
    /// Target gain of a receiver, reached through its gain ramp
    SetReceiverGain(ReceiverId, f64),
    SetReceiverActive(ReceiverId, bool),
    SetReflectorActive(ReflectorId, bool),
    SetReflectorCoefficients {
        id: ReflectorId,
        reflectivity: f32,
        damping: f32,
    },
    SetObstacleActive(ObstacleId, bool),
    SetObstacleTransmission(ObstacleId, f32),
    SetMaskActive(MaskId, bool),
    /// Change the maximum reflection order; clamped to the supported maximum
    SetMirrorOrder(u32),
}

/// Cloneable handle for queueing [`SceneCommand`]s.
#[derive(Debug, Clone)]
pub struct CommandSender {
    sender: Sender<SceneCommand>,
}

impl CommandSender {
    pub(crate) fn new(sender: Sender<SceneCommand>) -> Self {
        Self { sender }
    }

    /// Queues a command without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::CommandChannel`] if the queue is full or the
    /// world has been dropped.
    pub fn send(&self, command: SceneCommand) -> Result<()> {
        match self.sender.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                log::warn!("Command queue full, dropping {:?}", command);
                Err(AcousticsError::CommandChannel(
                    "command queue is full".to_string(),
                ))
            }
            Err(TrySendError::Disconnected(_)) => Err(AcousticsError::CommandChannel(
                "acoustic world has been dropped".to_string(),
            )),
        }
    }

    pub fn set_source_position(&self, id: SourceId, position: DVec3) -> Result<()> {
        self.send(SceneCommand::SetSourcePosition(id, position))
    }

    pub fn rotate_source(&self, id: SourceId, delta: ZyxEuler) -> Result<()> {
        self.send(SceneCommand::RotateSource(id, delta))
    }

    pub fn set_receiver_pose(
        &self,
        id: ReceiverId,
        position: DVec3,
        orientation: ZyxEuler,
    ) -> Result<()> {
        self.send(SceneCommand::SetReceiverPose(id, position, orientation))
    }

    pub fn set_receiver_gain(&self, id: ReceiverId, gain: f64) -> Result<()> {
        self.send(SceneCommand::SetReceiverGain(id, gain))
    }

    /// Number of commands waiting for the next block.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}
