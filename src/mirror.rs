//! Image source model.
//!
//! Image sources are kept in an arena enumerated breadth first: all first
//! order images (every primary source mirrored at every reflector), then every
//! first order image mirrored at every reflector except its own, and so on up
//! to the configured order. A parent therefore always precedes its children,
//! and each slot keeps the same path identity until the topology (source ids,
//! reflector ids, order) changes.
//!
//! Geometry and validity are refreshed every block; the arena itself is only
//! rebuilt on topology changes. On rebuild the damping filter state of each
//! surviving path is carried over by [`ImageKey`].

use crate::math::{Cartesian, DVec3, make_friendly};
use crate::scene::{PointSource, Reflector, raised_cosine};
use crate::world::{ReflectorId, SourceId};
use std::collections::HashMap;
use std::fmt;

/// Highest reflection order an arena can hold.
pub const MAX_MIRROR_ORDER: usize = 8;

/// Ordered list of the reflectors a path bounced off, first bounce first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceChain {
    ids: [ReflectorId; MAX_MIRROR_ORDER],
    len: u8,
}

impl SurfaceChain {
    /// The chain of a direct path.
    pub const EMPTY: Self = Self {
        ids: [ReflectorId(0); MAX_MIRROR_ORDER],
        len: 0,
    };

    /// Chain extended by one more bounce. Returns `None` when full.
    pub fn push(&self, id: ReflectorId) -> Option<Self> {
        if self.len as usize >= MAX_MIRROR_ORDER {
            return None;
        }
        let mut next = *self;
        next.ids[self.len as usize] = id;
        next.len += 1;
        Some(next)
    }

    pub fn order(&self) -> u32 {
        self.len as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn last(&self) -> Option<ReflectorId> {
        self.as_slice().last().copied()
    }

    pub fn as_slice(&self) -> &[ReflectorId] {
        &self.ids[..self.len as usize]
    }

    pub fn contains(&self, id: ReflectorId) -> bool {
        self.as_slice().contains(&id)
    }
}

impl fmt::Debug for SurfaceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl Default for SurfaceChain {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Stable identity of an image source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey {
    pub primary: SourceId,
    pub chain: SurfaceChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageParent {
    /// Index into the primary source list
    Primary(usize),
    /// Index into the arena
    Image(usize),
}

/// A mirrored source.
#[derive(Debug, Clone)]
pub struct ImageSource {
    key: ImageKey,
    parent: ImageParent,
    primary: usize,
    reflector: usize,
    position: DVec3,
    cut_point: DVec3,
    valid: bool,
    lp_state: f32,
    audio: Vec<f32>,
}

impl ImageSource {
    pub fn key(&self) -> &ImageKey {
        &self.key
    }

    pub fn order(&self) -> u32 {
        self.key.chain.order()
    }

    /// Mirrored position.
    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// Foot of the parent on the reflector plane.
    pub fn cut_point(&self) -> DVec3 {
        self.cut_point
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn audio(&self) -> &[f32] {
        &self.audio
    }

    /// Index of the primary source in the list passed to
    /// [`MirrorModel::process`].
    pub fn primary_index(&self) -> usize {
        self.primary
    }

    /// Index of the generating reflector in the list passed to
    /// [`MirrorModel::process`].
    pub fn reflector_index(&self) -> usize {
        self.reflector
    }

    /// Position a receiver at `p_rec` hears this image from, and its gain.
    ///
    /// The reflection is only heard in front of the reflector. If the path
    /// misses the bounded face it is either dropped or, with edge reflection
    /// enabled, moved onto the nearest edge and faded out over the face
    /// aperture. `legacy_cut_point` validates the receiver independent foot
    /// point instead of the receiver's own cut point.
    pub fn effective_position(
        &self,
        reflector: &Reflector,
        p_rec: DVec3,
        legacy_cut_point: bool,
    ) -> (DVec3, f64) {
        let face = &reflector.face;
        if !face.is_infront(p_rec) {
            return (self.position, 0.0);
        }
        let cut = if legacy_cut_point {
            self.cut_point
        } else {
            match face.intersection(self.position, p_rec) {
                Some((p, _)) => p,
                None => return (self.position, 0.0),
            }
        };
        if face.contains_projection(cut) {
            return (self.position, 1.0);
        }
        if !reflector.edge_reflection {
            return (self.position, 0.0);
        }
        let near = face.nearest(cut).point;
        let outside = (cut - near).length();
        let position = near + (near - p_rec).normal() * (self.position - near).length();
        (position, raised_cosine(outside, face.aperture()))
    }
}

/// Generates and updates the image sources of a scene.
#[derive(Debug)]
pub struct MirrorModel {
    images: Vec<ImageSource>,
    source_ids: Vec<SourceId>,
    reflector_ids: Vec<ReflectorId>,
    order: u32,
    max_images: usize,
    block_size: usize,
    legacy_cut_point: bool,
    built: bool,
}

impl MirrorModel {
    pub fn new(order: u32, max_images: usize, block_size: usize, legacy_cut_point: bool) -> Self {
        Self {
            images: Vec::new(),
            source_ids: Vec::new(),
            reflector_ids: Vec::new(),
            order: order.min(MAX_MIRROR_ORDER as u32),
            max_images,
            block_size,
            legacy_cut_point,
            built: false,
        }
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn set_order(&mut self, order: u32) {
        let order = order.min(MAX_MIRROR_ORDER as u32);
        if order != self.order {
            self.order = order;
            self.built = false;
        }
    }

    pub fn legacy_cut_point(&self) -> bool {
        self.legacy_cut_point
    }

    pub fn images(&self) -> &[ImageSource] {
        &self.images
    }

    pub fn image(&self, index: usize) -> Option<&ImageSource> {
        self.images.get(index)
    }

    pub fn valid_images(&self) -> usize {
        self.images.iter().filter(|img| img.valid).count()
    }

    fn topology_changed(
        &self,
        sources: &[(SourceId, PointSource)],
        reflectors: &[(ReflectorId, Reflector)],
    ) -> bool {
        !self.built
            || !self.source_ids.iter().copied().eq(sources.iter().map(|(id, _)| *id))
            || !self
                .reflector_ids
                .iter()
                .copied()
                .eq(reflectors.iter().map(|(id, _)| *id))
    }

    fn rebuild(
        &mut self,
        sources: &[(SourceId, PointSource)],
        reflectors: &[(ReflectorId, Reflector)],
    ) {
        let carry: HashMap<ImageKey, f32> = self
            .images
            .drain(..)
            .map(|img| (img.key, img.lp_state))
            .collect();
        self.source_ids = sources.iter().map(|(id, _)| *id).collect();
        self.reflector_ids = reflectors.iter().map(|(id, _)| *id).collect();
        self.built = true;

        let mut truncated = false;
        'levels: for level in 1..=self.order {
            let parents: Vec<(ImageParent, usize, ImageKey)> = if level == 1 {
                sources
                    .iter()
                    .enumerate()
                    .map(|(k, (id, _))| {
                        let key = ImageKey {
                            primary: *id,
                            chain: SurfaceChain::EMPTY,
                        };
                        (ImageParent::Primary(k), k, key)
                    })
                    .collect()
            } else {
                self.images
                    .iter()
                    .enumerate()
                    .filter(|(_, img)| img.order() == level - 1)
                    .map(|(k, img)| (ImageParent::Image(k), img.primary, img.key))
                    .collect()
            };
            for (parent, primary, parent_key) in parents {
                for (r, (rid, _)) in reflectors.iter().enumerate() {
                    if parent_key.chain.last() == Some(*rid) {
                        continue;
                    }
                    let Some(chain) = parent_key.chain.push(*rid) else {
                        continue;
                    };
                    if self.images.len() >= self.max_images {
                        truncated = true;
                        break 'levels;
                    }
                    let key = ImageKey {
                        primary: parent_key.primary,
                        chain,
                    };
                    self.images.push(ImageSource {
                        key,
                        parent,
                        primary,
                        reflector: r,
                        position: DVec3::ZERO,
                        cut_point: DVec3::ZERO,
                        valid: false,
                        lp_state: carry.get(&key).copied().unwrap_or(0.0),
                        audio: vec![0.0; self.block_size],
                    });
                }
            }
        }
        if truncated {
            log::warn!(
                "Image source budget of {} reached, higher order reflections dropped",
                self.max_images
            );
        }
        log::debug!(
            "Rebuilt mirror model: {} sources, {} reflectors, order {}, {} images",
            sources.len(),
            reflectors.len(),
            self.order,
            self.images.len()
        );
    }

    /// Refreshes positions, validity and audio of all images.
    ///
    /// Primary audio must already hold the current block.
    pub fn process(
        &mut self,
        sources: &[(SourceId, PointSource)],
        reflectors: &[(ReflectorId, Reflector)],
    ) {
        if self.topology_changed(sources, reflectors) {
            self.rebuild(sources, reflectors);
        }
        let legacy_cut_point = self.legacy_cut_point;
        for i in 0..self.images.len() {
            let (head, tail) = self.images.split_at_mut(i);
            let img = &mut tail[0];
            let (parent_pos, parent_valid, parent_audio): (DVec3, bool, &[f32]) = match img.parent {
                ImageParent::Primary(k) => {
                    let src = &sources[k].1;
                    (src.position, src.active, src.audio.as_slice())
                }
                ImageParent::Image(k) => {
                    let p = &head[k];
                    (p.position, p.valid, p.audio.as_slice())
                }
            };
            let reflector = &reflectors[img.reflector].1;
            let face = &reflector.face;
            img.position = face.mirror(parent_pos);
            img.cut_point = face.nearest_on_plane(parent_pos);
            img.valid = reflector.active && parent_valid && face.is_infront(parent_pos);
            if img.valid
                && legacy_cut_point
                && !reflector.edge_reflection
                && !face.contains_projection(parent_pos)
            {
                img.valid = false;
            }
            if !img.valid {
                continue;
            }
            let damping = reflector.damping;
            let gain = reflector.reflectivity * (1.0 - damping);
            let mut y = img.lp_state;
            for (out, x) in img.audio.iter_mut().zip(parent_audio) {
                y = make_friendly(damping * y + gain * *x);
                *out = y;
            }
            img.lp_state = y;
        }
    }
}
