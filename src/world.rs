//! The acoustic world: owns the scene and renders it block by block.

use crate::acoustic_model::{
    AcousticModel, DiffuseAcousticModel, DiffusePathKey, PathInput, PathKey, PathSource,
    PropagationConstants, delay_samples,
};
use crate::config::AcousticWorldDesc;
use crate::control::{CommandSender, SceneCommand};
use crate::dsp::FoaBuffer;
use crate::error::{AcousticsError, Result};
use crate::mirror::{MAX_MIRROR_ORDER, MirrorModel, SurfaceChain};
use crate::receiver::Receiver;
use crate::scene::{DiffuseSource, Mask, Obstacle, PointSource, Reflector};
use crossbeam_channel::Sender;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u64);

        impl $name {
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Handle of a primary point source.
    SourceId
);
define_id!(
    /// Handle of a diffuse sound field.
    DiffuseSourceId
);
define_id!(
    /// Handle of a reflector.
    ReflectorId
);
define_id!(
    /// Handle of an obstacle.
    ObstacleId
);
define_id!(
    /// Handle of a global mask.
    MaskId
);
define_id!(
    /// Handle of a receiver.
    ReceiverId
);

fn find<I: Ord + Copy, T>(items: &[(I, T)], id: I) -> Option<usize> {
    items.binary_search_by(|(k, _)| k.cmp(&id)).ok()
}

fn find_mut<I: Ord + Copy, T>(items: &mut [(I, T)], id: I) -> Option<&mut T> {
    let index = find(items, id)?;
    Some(&mut items[index].1)
}

fn not_found(id: impl std::fmt::Display) -> AcousticsError {
    AcousticsError::NotFound(format!("{} is not part of this world", id))
}

/// Models kept for reuse after their path is gone, unless raised with
/// [`AcousticWorld::reserve_paths`].
const MODEL_POOL_LIMIT: usize = 64;

/// Scene container and block renderer.
///
/// Every object gets a handle from one increasing counter, and each list is
/// kept in handle order. Rendering order, and therefore the floating point
/// accumulation order into each receiver, only depends on registration order.
///
/// Objects are added and removed between blocks through `&mut self`; scalar
/// updates from other threads go through a [`CommandSender`].
///
/// A path that stops qualifying is rendered for one more block while its gain
/// ramps to zero, then its model goes back to a pool so that a path starting
/// later can reuse the delay line.
pub struct AcousticWorld {
    desc: AcousticWorldDesc,
    constants: PropagationConstants,
    next_id: u64,
    sources: Vec<(SourceId, PointSource)>,
    diffuse_sources: Vec<(DiffuseSourceId, DiffuseSource)>,
    reflectors: Vec<(ReflectorId, Reflector)>,
    obstacles: Vec<(ObstacleId, Obstacle)>,
    masks: Vec<(MaskId, Mask)>,
    receivers: Vec<(ReceiverId, Receiver)>,
    mirror: MirrorModel,
    models: Vec<AcousticModel>,
    diffuse_models: Vec<DiffuseAcousticModel>,
    pool: Vec<AcousticModel>,
    diffuse_pool: Vec<DiffuseAcousticModel>,
    pool_limit: usize,
    wanted: Vec<(PathKey, PathSource, usize)>,
    wanted_diffuse: Vec<(DiffusePathKey, usize, usize)>,
    command_sender: Sender<SceneCommand>,
    command_receiver: crossbeam_channel::Receiver<SceneCommand>,
    active_point_sources: usize,
    total_point_sources: usize,
    active_diffuse_sources: usize,
    total_diffuse_sources: usize,
}

/// What reconciliation does with an existing model.
enum Fate {
    Keep(usize),
    Release(usize),
    Drop,
}

impl AcousticWorld {
    /// Creates an empty world.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] if `desc` does not validate.
    pub fn new(desc: AcousticWorldDesc) -> Result<Self> {
        desc.validate()?;
        let (command_sender, command_receiver) = crossbeam_channel::bounded(desc.command_capacity);
        log::info!(
            "Created acoustic world: {} Hz, {} frames per block, c = {} m/s, mirror order {}",
            desc.sample_rate,
            desc.block_size,
            desc.speed_of_sound,
            desc.mirror_order
        );
        Ok(Self {
            constants: PropagationConstants::new(desc.speed_of_sound, desc.sample_rate as f64),
            mirror: MirrorModel::new(
                desc.mirror_order,
                desc.max_images,
                desc.block_size,
                desc.legacy_cut_point,
            ),
            desc,
            next_id: 1,
            sources: Vec::new(),
            diffuse_sources: Vec::new(),
            reflectors: Vec::new(),
            obstacles: Vec::new(),
            masks: Vec::new(),
            receivers: Vec::new(),
            models: Vec::new(),
            diffuse_models: Vec::new(),
            pool: Vec::new(),
            diffuse_pool: Vec::new(),
            pool_limit: MODEL_POOL_LIMIT,
            wanted: Vec::new(),
            wanted_diffuse: Vec::new(),
            command_sender,
            command_receiver,
            active_point_sources: 0,
            total_point_sources: 0,
            active_diffuse_sources: 0,
            total_diffuse_sources: 0,
        })
    }

    pub fn desc(&self) -> &AcousticWorldDesc {
        &self.desc
    }

    pub fn block_size(&self) -> usize {
        self.desc.block_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.desc.sample_rate
    }

    /// Handle for queueing scene updates from other threads.
    pub fn command_sender(&self) -> CommandSender {
        CommandSender::new(self.command_sender.clone())
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Adds a primary point source.
    ///
    /// The source's audio block is sized to the world's block size and
    /// starts silent.
    ///
    /// # Arguments
    ///
    /// * `source` - The source to add
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] if `max_distance` is not a
    /// positive finite number.
    pub fn add_source(&mut self, mut source: PointSource) -> Result<SourceId> {
        if !(source.max_distance.is_finite() && source.max_distance > 0.0) {
            return Err(AcousticsError::Configuration(format!(
                "max_distance must be positive, got {}",
                source.max_distance
            )));
        }
        source.audio = vec![0.0; self.desc.block_size];
        source.preprocess();
        let id = SourceId(self.next_id());
        log::debug!("Added point source {} at {:?}", id, source.position);
        self.sources.push((id, source));
        Ok(id)
    }

    /// Removes a point source. Its paths fade out during the next block.
    ///
    /// # Arguments
    ///
    /// * `id` - The SourceId of the source to remove
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::NotFound`] if `id` is not part of this world.
    pub fn remove_source(&mut self, id: SourceId) -> Result<PointSource> {
        let index = find(&self.sources, id).ok_or_else(|| not_found(id))?;
        log::debug!("Removed point source {}", id);
        Ok(self.sources.remove(index).1)
    }

    /// Adds a diffuse sound field.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] for a negative falloff.
    pub fn add_diffuse_source(&mut self, mut source: DiffuseSource) -> Result<DiffuseSourceId> {
        if source.falloff < 0.0 {
            return Err(AcousticsError::Configuration(format!(
                "diffuse source falloff must not be negative, got {}",
                source.falloff
            )));
        }
        source.audio = FoaBuffer::new(self.desc.block_size);
        let id = DiffuseSourceId(self.next_id());
        log::debug!("Added diffuse source {}", id);
        self.diffuse_sources.push((id, source));
        Ok(id)
    }

    /// Removes a diffuse source. Its paths are dropped at the next block.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::NotFound`] if `id` is not part of this world.
    pub fn remove_diffuse_source(&mut self, id: DiffuseSourceId) -> Result<DiffuseSource> {
        let index = find(&self.diffuse_sources, id).ok_or_else(|| not_found(id))?;
        log::debug!("Removed diffuse source {}", id);
        Ok(self.diffuse_sources.remove(index).1)
    }

    /// Adds a reflecting polygon.
    ///
    /// # Arguments
    ///
    /// * `reflector` - The reflector; its face is used as placed
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] if reflectivity is outside
    /// `[0, 1]` or damping outside `[0, 1)`.
    pub fn add_reflector(&mut self, reflector: Reflector) -> Result<ReflectorId> {
        if !(0.0..=1.0).contains(&reflector.reflectivity) || !(0.0..1.0).contains(&reflector.damping) {
            return Err(AcousticsError::Configuration(format!(
                "invalid reflector coefficients: reflectivity {}, damping {}",
                reflector.reflectivity, reflector.damping
            )));
        }
        let id = ReflectorId(self.next_id());
        log::debug!("Added reflector {}: {}", id, reflector.face);
        self.reflectors.push((id, reflector));
        Ok(id)
    }

    /// Removes a reflector. Image sources through it disappear at the next
    /// block.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::NotFound`] if `id` is not part of this world.
    pub fn remove_reflector(&mut self, id: ReflectorId) -> Result<Reflector> {
        let index = find(&self.reflectors, id).ok_or_else(|| not_found(id))?;
        log::debug!("Removed reflector {}", id);
        Ok(self.reflectors.remove(index).1)
    }

    /// Adds an obstacle and gives every path model a fresh diffraction state
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] if transmission is outside
    /// `[0, 1]`.
    pub fn add_obstacle(&mut self, obstacle: Obstacle) -> Result<ObstacleId> {
        if !(0.0..=1.0).contains(&obstacle.transmission) {
            return Err(AcousticsError::Configuration(format!(
                "obstacle transmission must be between 0.0 and 1.0, got {}",
                obstacle.transmission
            )));
        }
        let id = ObstacleId(self.next_id());
        self.obstacles.push((id, obstacle));
        let index = self.obstacles.len() - 1;
        for model in &mut self.models {
            model.insert_obstacle(index);
        }
        log::debug!("Added obstacle {}", id);
        Ok(id)
    }

    /// Removes an obstacle together with its diffraction states.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::NotFound`] if `id` is not part of this world.
    pub fn remove_obstacle(&mut self, id: ObstacleId) -> Result<Obstacle> {
        let index = find(&self.obstacles, id).ok_or_else(|| not_found(id))?;
        for model in &mut self.models {
            model.remove_obstacle(index);
        }
        log::debug!("Removed obstacle {}", id);
        Ok(self.obstacles.remove(index).1)
    }

    /// Adds a global mask. Receivers with `use_global_mask` are scaled by
    /// the gain of every active mask.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] for a negative falloff.
    pub fn add_mask(&mut self, mask: Mask) -> Result<MaskId> {
        if mask.falloff < 0.0 {
            return Err(AcousticsError::Configuration(format!(
                "mask falloff must not be negative, got {}",
                mask.falloff
            )));
        }
        let id = MaskId(self.next_id());
        log::debug!("Added mask {}", id);
        self.masks.push((id, mask));
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns [`AcousticsError::NotFound`] if `id` is not part of this world.
    pub fn remove_mask(&mut self, id: MaskId) -> Result<Mask> {
        let index = find(&self.masks, id).ok_or_else(|| not_found(id))?;
        log::debug!("Removed mask {}", id);
        Ok(self.masks.remove(index).1)
    }

    /// Adds a receiver and sizes its buffers for this world.
    ///
    /// The gain ramp starts settled at `receiver.gain`, so the first block
    /// already plays at that level.
    ///
    /// # Arguments
    ///
    /// * `receiver` - The receiver, with its rendering module
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] if `ism_min > ism_max`.
    pub fn add_receiver(&mut self, mut receiver: Receiver) -> Result<ReceiverId> {
        if receiver.ism_min > receiver.ism_max {
            return Err(AcousticsError::Configuration(format!(
                "ism_min {} is larger than ism_max {}",
                receiver.ism_min, receiver.ism_max
            )));
        }
        let ramp_len = self.desc.gain_ramp_blocks as usize * self.desc.block_size;
        receiver.prepare(self.desc.block_size, ramp_len);
        let id = ReceiverId(self.next_id());
        log::debug!("Added receiver {} ({})", id, receiver.module_name());
        self.receivers.push((id, receiver));
        Ok(id)
    }

    /// Removes a receiver. Its paths are dropped at the next block.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::NotFound`] if `id` is not part of this world.
    pub fn remove_receiver(&mut self, id: ReceiverId) -> Result<Receiver> {
        let index = find(&self.receivers, id).ok_or_else(|| not_found(id))?;
        log::debug!("Removed receiver {}", id);
        Ok(self.receivers.remove(index).1)
    }

    /// Retrieves a point source by its SourceId.
    ///
    /// # Arguments
    ///
    /// * `id` - The SourceId of the source
    ///
    /// # Returns
    ///
    /// `Some(&PointSource)` if found, `None` otherwise
    pub fn source(&self, id: SourceId) -> Option<&PointSource> {
        find(&self.sources, id).map(|k| &self.sources[k].1)
    }

    /// Mutable access to a point source. Changes take effect at the next
    /// block; a `max_distance` above the world's `max_path_distance` is
    /// clamped to it.
    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut PointSource> {
        find_mut(&mut self.sources, id)
    }

    /// Audio block of a primary source, to be filled before [`process`](Self::process).
    pub fn source_audio_mut(&mut self, id: SourceId) -> Option<&mut [f32]> {
        find_mut(&mut self.sources, id).map(|s| s.audio.as_mut_slice())
    }

    pub fn diffuse_source(&self, id: DiffuseSourceId) -> Option<&DiffuseSource> {
        find(&self.diffuse_sources, id).map(|k| &self.diffuse_sources[k].1)
    }

    pub fn diffuse_source_mut(&mut self, id: DiffuseSourceId) -> Option<&mut DiffuseSource> {
        find_mut(&mut self.diffuse_sources, id)
    }

    /// Ambisonic block of a diffuse source, to be filled before [`process`](Self::process).
    pub fn diffuse_audio_mut(&mut self, id: DiffuseSourceId) -> Option<&mut FoaBuffer> {
        find_mut(&mut self.diffuse_sources, id).map(|s| &mut s.audio)
    }

    pub fn reflector(&self, id: ReflectorId) -> Option<&Reflector> {
        find(&self.reflectors, id).map(|k| &self.reflectors[k].1)
    }

    pub fn reflector_mut(&mut self, id: ReflectorId) -> Option<&mut Reflector> {
        find_mut(&mut self.reflectors, id)
    }

    pub fn obstacle(&self, id: ObstacleId) -> Option<&Obstacle> {
        find(&self.obstacles, id).map(|k| &self.obstacles[k].1)
    }

    pub fn obstacle_mut(&mut self, id: ObstacleId) -> Option<&mut Obstacle> {
        find_mut(&mut self.obstacles, id)
    }

    pub fn mask(&self, id: MaskId) -> Option<&Mask> {
        find(&self.masks, id).map(|k| &self.masks[k].1)
    }

    pub fn mask_mut(&mut self, id: MaskId) -> Option<&mut Mask> {
        find_mut(&mut self.masks, id)
    }

    /// Retrieves a receiver by its ReceiverId.
    ///
    /// # Arguments
    ///
    /// * `id` - The ReceiverId of the receiver
    ///
    /// # Returns
    ///
    /// `Some(&Receiver)` if found, `None` otherwise
    pub fn receiver(&self, id: ReceiverId) -> Option<&Receiver> {
        find(&self.receivers, id).map(|k| &self.receivers[k].1)
    }

    pub fn receiver_mut(&mut self, id: ReceiverId) -> Option<&mut Receiver> {
        find_mut(&mut self.receivers, id)
    }

    /// Output channels of a receiver after the last block.
    pub fn receiver_output(&self, id: ReceiverId) -> Option<&[Vec<f32>]> {
        self.receiver(id).map(Receiver::outputs)
    }

    pub fn mirror_model(&self) -> &MirrorModel {
        &self.mirror
    }

    /// Point path models, ordered by [`PathKey`]. Includes models rendering
    /// their release block.
    pub fn acoustic_models(&self) -> &[AcousticModel] {
        &self.models
    }

    pub fn diffuse_acoustic_models(&self) -> &[DiffuseAcousticModel] {
        &self.diffuse_models
    }

    /// Point paths that were audible in the last block.
    pub fn active_point_sources(&self) -> usize {
        self.active_point_sources
    }

    /// Point paths rendered in the last block, not counting paths that were
    /// fading out.
    pub fn total_point_sources(&self) -> usize {
        self.total_point_sources
    }

    pub fn active_diffuse_sources(&self) -> usize {
        self.active_diffuse_sources
    }

    pub fn total_diffuse_sources(&self) -> usize {
        self.total_diffuse_sources
    }

    /// Valid image sources in the last block.
    pub fn image_sources(&self) -> usize {
        self.mirror.valid_images()
    }

    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] above [`MAX_MIRROR_ORDER`].
    pub fn set_mirror_order(&mut self, order: u32) -> Result<()> {
        if order as usize > MAX_MIRROR_ORDER {
            return Err(AcousticsError::Configuration(format!(
                "mirror_order {} exceeds the supported maximum of {}",
                order, MAX_MIRROR_ORDER
            )));
        }
        self.desc.mirror_order = order;
        self.mirror.set_order(order);
        Ok(())
    }

    /// Allocates path models ahead of time so that paths appearing later
    /// (for example when a reflector becomes visible) start without
    /// allocating on the audio thread.
    ///
    /// # Arguments
    ///
    /// * `count` - Number of models to add to the pool
    /// * `max_distance` - Longest path the models must hold, clamped to `max_path_distance`
    /// * `sinc_order` - Interpolation order the models will be used with
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] for an invalid `max_distance`.
    pub fn reserve_paths(&mut self, count: usize, max_distance: f64, sinc_order: usize) -> Result<()> {
        let max_distance = max_distance.min(self.desc.max_path_distance);
        let key = PathKey {
            receiver: ReceiverId(0),
            primary: SourceId(0),
            chain: SurfaceChain::EMPTY,
        };
        self.pool_limit = self.pool_limit.max(self.pool.len() + count);
        self.pool.reserve(count);
        for _ in 0..count {
            self.pool.push(AcousticModel::new(
                key,
                PathSource::Primary(0),
                0,
                &self.constants,
                self.desc.block_size,
                max_distance,
                sinc_order,
                self.obstacles.len(),
            )?);
        }
        self.models.reserve(count);
        log::debug!("Reserved {} path models, {} pooled", count, self.pool.len());
        Ok(())
    }

    /// Applies one scene command. Unknown handles are ignored.
    pub fn apply_command(&mut self, command: SceneCommand) {
        let mode = self.desc.euler_accumulation;
        let applied = match command {
            SceneCommand::SetSourcePosition(id, p) => {
                find_mut(&mut self.sources, id).map(|s| s.position = p)
            }
            SceneCommand::SetSourceOrientation(id, o) => {
                find_mut(&mut self.sources, id).map(|s| s.orientation = o)
            }
            SceneCommand::RotateSource(id, delta) => find_mut(&mut self.sources, id)
                .map(|s| s.orientation = s.orientation.compose(&delta, mode)),
            SceneCommand::SetSourceActive(id, active) => {
                find_mut(&mut self.sources, id).map(|s| s.active = active)
            }
            SceneCommand::SetDiffuseSourceActive(id, active) => {
                find_mut(&mut self.diffuse_sources, id).map(|s| s.active = active)
            }
            SceneCommand::SetReceiverPose(id, p, o) => find_mut(&mut self.receivers, id).map(|r| {
                r.position = p;
                r.orientation = o;
            }),
            SceneCommand::RotateReceiver(id, delta) => find_mut(&mut self.receivers, id)
                .map(|r| r.orientation = r.orientation.compose(&delta, mode)),
            SceneCommand::SetReceiverGain(id, gain) => {
                find_mut(&mut self.receivers, id).map(|r| r.gain = gain)
            }
            SceneCommand::SetReceiverActive(id, active) => {
                find_mut(&mut self.receivers, id).map(|r| r.active = active)
            }
            SceneCommand::SetReflectorActive(id, active) => {
                find_mut(&mut self.reflectors, id).map(|r| r.active = active)
            }
            SceneCommand::SetReflectorCoefficients {
                id,
                reflectivity,
                damping,
            } => find_mut(&mut self.reflectors, id).map(|r| {
                r.reflectivity = reflectivity.clamp(0.0, 1.0);
                r.damping = damping.clamp(0.0, 0.999);
            }),
            SceneCommand::SetObstacleActive(id, active) => {
                find_mut(&mut self.obstacles, id).map(|o| o.active = active)
            }
            SceneCommand::SetObstacleTransmission(id, t) => {
                find_mut(&mut self.obstacles, id).map(|o| o.transmission = t.clamp(0.0, 1.0))
            }
            SceneCommand::SetMaskActive(id, active) => {
                find_mut(&mut self.masks, id).map(|m| m.active = active)
            }
            SceneCommand::SetMirrorOrder(order) => {
                let order = order.min(MAX_MIRROR_ORDER as u32);
                self.desc.mirror_order = order;
                self.mirror.set_order(order);
                Some(())
            }
        };
        if applied.is_none() {
            log::debug!("Ignoring command for an unknown handle");
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.command_receiver.try_recv() {
            self.apply_command(command);
        }
    }

    /// Brings the set of models in line with the current scene.
    ///
    /// Surviving models keep their delay lines and filter states. A model
    /// whose path stops qualifying renders one release block and is then
    /// moved to the pool; new paths take a pooled model when one fits.
    fn reconcile(&mut self) {
        self.wanted.clear();
        for (ri, (rid, receiver)) in self.receivers.iter().enumerate() {
            if receiver.accepts_order(0) {
                for (si, (sid, source)) in self.sources.iter().enumerate() {
                    if source.active && source.direct {
                        let key = PathKey {
                            receiver: *rid,
                            primary: *sid,
                            chain: SurfaceChain::EMPTY,
                        };
                        self.wanted.push((key, PathSource::Primary(si), ri));
                    }
                }
            }
            for (ii, image) in self.mirror.images().iter().enumerate() {
                if image.is_valid() && receiver.accepts_order(image.order()) {
                    let key = PathKey {
                        receiver: *rid,
                        primary: image.key().primary,
                        chain: image.key().chain,
                    };
                    self.wanted.push((key, PathSource::Image(ii), ri));
                }
            }
        }
        self.wanted.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let (mut released, mut removed) = (0, 0);
        let mut i = 0;
        while i < self.models.len() {
            let model = &self.models[i];
            let fate = match self.wanted.binary_search_by(|(key, _, _)| key.cmp(model.key())) {
                Ok(k) => Fate::Keep(k),
                Err(_) if model.releasing => Fate::Drop,
                Err(_) => match find(&self.receivers, model.key().receiver) {
                    Some(ri) => Fate::Release(ri),
                    None => Fate::Drop,
                },
            };
            match fate {
                Fate::Keep(k) => {
                    let model = &mut self.models[i];
                    model.source = self.wanted[k].1;
                    model.receiver = self.wanted[k].2;
                    model.releasing = false;
                    i += 1;
                }
                Fate::Release(ri) => {
                    let model = &mut self.models[i];
                    model.receiver = ri;
                    model.releasing = true;
                    released += 1;
                    i += 1;
                }
                Fate::Drop => {
                    let model = self.models.remove(i);
                    if self.pool.len() < self.pool_limit {
                        self.pool.push(model);
                    }
                    removed += 1;
                }
            }
        }

        let existing = self.models.len();
        let mut reused = 0;
        for (key, source, receiver) in &self.wanted {
            let known = self.models[..existing]
                .binary_search_by(|m| m.key().cmp(key))
                .is_ok();
            if known {
                continue;
            }
            let primary = match source {
                PathSource::Primary(k) => &self.sources[*k].1,
                PathSource::Image(k) => &self.sources[self.mirror.images()[*k].primary_index()].1,
            };
            let max_distance = primary.max_distance.min(self.desc.max_path_distance);
            let pooled = delay_samples(max_distance, &self.constants)
                .ok()
                .and_then(|d| self.pool.iter().position(|m| m.fits(d, primary.sinc_order)));
            if let Some(k) = pooled {
                let mut model = self.pool.swap_remove(k);
                model.reset(*key, *source, *receiver, self.obstacles.len());
                self.models.push(model);
                reused += 1;
                continue;
            }
            match AcousticModel::new(
                *key,
                *source,
                *receiver,
                &self.constants,
                self.desc.block_size,
                max_distance,
                primary.sinc_order,
                self.obstacles.len(),
            ) {
                Ok(model) => self.models.push(model),
                Err(e) => log::warn!("Skipping path {:?}: {}", key, e),
            }
        }
        let added = self.models.len() - existing;
        if added > 0 {
            self.models.sort_unstable_by(|a, b| a.key().cmp(b.key()));
        }
        if added > 0 || released > 0 || removed > 0 {
            log::debug!(
                "Acoustic models: {} started ({} from pool), {} releasing, {} removed, {} total",
                added,
                reused,
                released,
                removed,
                self.models.len()
            );
        }

        self.wanted_diffuse.clear();
        for (ri, (rid, receiver)) in self.receivers.iter().enumerate() {
            if !(receiver.active && receiver.render_diffuse) {
                continue;
            }
            for (si, (sid, source)) in self.diffuse_sources.iter().enumerate() {
                if source.active {
                    let key = DiffusePathKey {
                        receiver: *rid,
                        source: *sid,
                    };
                    self.wanted_diffuse.push((key, si, ri));
                }
            }
        }
        self.wanted_diffuse.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let (mut released, mut removed) = (0, 0);
        let mut i = 0;
        while i < self.diffuse_models.len() {
            let model = &mut self.diffuse_models[i];
            let key = *model.key();
            if let Ok(k) = self.wanted_diffuse.binary_search_by(|(w, _, _)| w.cmp(&key)) {
                model.source = self.wanted_diffuse[k].1;
                model.receiver = self.wanted_diffuse[k].2;
                model.releasing = false;
                i += 1;
                continue;
            }
            // The field is still read while fading, so both ends must exist.
            let ends = find(&self.diffuse_sources, key.source).zip(find(&self.receivers, key.receiver));
            match ends {
                Some((si, ri)) if !model.releasing => {
                    model.source = si;
                    model.receiver = ri;
                    model.releasing = true;
                    released += 1;
                    i += 1;
                }
                _ => {
                    let model = self.diffuse_models.remove(i);
                    if self.diffuse_pool.len() < self.pool_limit {
                        self.diffuse_pool.push(model);
                    }
                    removed += 1;
                }
            }
        }
        let existing = self.diffuse_models.len();
        for (key, source, receiver) in &self.wanted_diffuse {
            let known = self.diffuse_models[..existing]
                .binary_search_by(|m| m.key().cmp(key))
                .is_ok();
            if known {
                continue;
            }
            let model = match self.diffuse_pool.pop() {
                Some(mut model) => {
                    model.reset(*key, *source, *receiver);
                    model
                }
                None => DiffuseAcousticModel::new(*key, *source, *receiver, self.desc.block_size),
            };
            self.diffuse_models.push(model);
        }
        let added = self.diffuse_models.len() - existing;
        if added > 0 {
            self.diffuse_models.sort_unstable_by(|a, b| a.key().cmp(b.key()));
        }
        if added > 0 || released > 0 || removed > 0 {
            log::debug!(
                "Diffuse models: {} started, {} releasing, {} removed, {} total",
                added,
                released,
                removed,
                self.diffuse_models.len()
            );
        }
    }

    /// Renders one block.
    ///
    /// Applies queued commands, updates the image sources, reconciles the
    /// path models, then renders every point path followed by every diffuse
    /// path into its receiver and finishes each receiver (decoding, then the
    /// gain ramp).
    pub fn process(&mut self) {
        self.drain_commands();
        for (_, source) in &mut self.sources {
            source.preprocess();
        }
        for (_, source) in &mut self.diffuse_sources {
            source.preprocess();
        }
        self.mirror.process(&self.sources, &self.reflectors);
        self.reconcile();

        for (_, receiver) in &mut self.receivers {
            let mut gain = receiver.gain;
            if receiver.use_global_mask {
                for (_, mask) in self.masks.iter().filter(|(_, m)| m.active) {
                    gain *= mask.gain(receiver.position);
                }
            }
            receiver.set_next_gain(gain);
            receiver.clear_output();
        }

        let legacy = self.mirror.legacy_cut_point();
        let max_path_distance = self.desc.max_path_distance;
        let (mut active, mut total) = (0, 0);
        for model in &mut self.models {
            let receiver = &mut self.receivers[model.receiver].1;
            if model.releasing {
                model.release(&self.constants, receiver, &self.obstacles);
                continue;
            }
            total += 1;
            let input = match model.source {
                PathSource::Primary(k) => {
                    let source = &self.sources[k].1;
                    let (effective, source_gain) = source.effective_position(receiver.position);
                    PathInput {
                        effective,
                        source_gain,
                        physical: source.physical_position(),
                        max_distance: source.max_distance.min(max_path_distance),
                        audio: source.audio(),
                    }
                }
                PathSource::Image(k) => {
                    let images = self.mirror.images();
                    let image = &images[k];
                    let reflector = &self.reflectors[image.reflector_index()].1;
                    let primary = &self.sources[image.primary_index()].1;
                    let (effective, source_gain) =
                        image.effective_position(reflector, receiver.position, legacy);
                    PathInput {
                        effective,
                        source_gain,
                        physical: primary.physical_position(),
                        max_distance: primary.max_distance.min(max_path_distance),
                        audio: image.audio(),
                    }
                }
            };
            if model.process(&input, &self.constants, receiver, &self.obstacles) {
                active += 1;
            }
        }
        self.active_point_sources = active;
        self.total_point_sources = total;

        let (mut active, mut total) = (0, 0);
        for model in &mut self.diffuse_models {
            let receiver = &mut self.receivers[model.receiver].1;
            let source = &self.diffuse_sources[model.source].1;
            if !model.releasing {
                total += 1;
            }
            if model.process(source, receiver) {
                active += 1;
            }
        }
        self.active_diffuse_sources = active;
        self.total_diffuse_sources = total;

        for (_, receiver) in &mut self.receivers {
            receiver.post_proc();
            receiver.apply_gain();
        }
    }
}
