//! Tiled-image reconciliation.
//!
//! Images and label masks are drawn by an external tiled-image viewer whose
//! objects are created asynchronously. Each bound instance moves through a
//! small state machine:
//!
//! ```text
//!            add_tiled_image             complete_creation(Ok)
//!   (new) ──────────────────► Pending ─────────────────────────► Created
//!                               │                                  │
//!                       unbound │                          unbound │ remove
//!                               ▼                                  ▼
//!                            Removing ──complete_creation──► remove, dropped
//! ```
//!
//! Index and property changes that arrive while an instance is `Pending`
//! are deferred and applied by [`TiledImageReconciler::complete_creation`].

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use lamina_core::geometry::Matrix3;
use lamina_core::layer::Layer;
use lamina_core::object::{ImageObject, LabelsObject, OverlayObject};
use lamina_core::transform::data_to_world;
use lamina_io::{AbortSignal, DataStore, TileSource};

use crate::diagnostics::{Diagnostics, Warning};
use crate::refs::{collect_refs, load_refs, RefKey, RenderRef};
use crate::sync::SyncError;

/// Identifies one asynchronous creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TiledImageKind {
    Image,
    Labels { outline: bool },
}

/// Properties the viewer can change on a live tiled image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageProperties {
    pub opacity: f64,
    pub flip: bool,
}

/// Everything the viewer needs to create one tiled image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TiledImageRequest {
    pub kind: TiledImageKind,
    pub tile_source: TileSource,
    /// Draw order among all tiled images.
    pub index: usize,
    pub properties: ImageProperties,
    /// Data→world transform, without the flip.
    pub transform: Matrix3,
}

pub trait TiledImageViewer {
    type Handle: Clone + fmt::Debug;

    /// Starts creating a tiled image. The caller reports the outcome through
    /// [`TiledImageReconciler::complete_creation`] with the same ticket.
    fn add_tiled_image(&mut self, ticket: Ticket, request: TiledImageRequest);

    fn remove(&mut self, handle: &Self::Handle);

    fn set_item_index(&mut self, handle: &Self::Handle, index: usize);

    fn set_opacity(&mut self, handle: &Self::Handle, opacity: f64);

    fn set_flip(&mut self, handle: &Self::Handle, flip: bool);

    fn set_transform(&mut self, handle: &Self::Handle, transform: &Matrix3);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceKey {
    labels: bool,
    render: RefKey,
}

/// What was last sent to the viewer for a created image.
#[derive(Debug, Clone, PartialEq)]
struct Applied {
    index: usize,
    properties: ImageProperties,
    transform: Matrix3,
}

#[derive(Debug)]
enum InstanceState<H> {
    Pending {
        ticket: Ticket,
        requested: Applied,
        deferred_index: Option<usize>,
        deferred_update: Option<ImageProperties>,
        /// Latest desired transform, applied on completion.
        transform: Matrix3,
    },
    Created {
        handle: H,
        applied: Applied,
    },
    Removing {
        ticket: Ticket,
    },
}

#[derive(Debug)]
struct Instance<H> {
    key: InstanceKey,
    kind: TiledImageKind,
    tile_source: TileSource,
    state: InstanceState<H>,
}

impl<H> Instance<H> {
    fn is_live(&self) -> bool {
        !matches!(self.state, InstanceState::Removing { .. })
    }
}

/// One desired instance of this pass.
struct Desired {
    key: InstanceKey,
    kind: TiledImageKind,
    tile_source: TileSource,
    properties: ImageProperties,
    transform: Matrix3,
}

/// Counters of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TiledStats {
    pub created: usize,
    pub removed: usize,
    pub updated: usize,
    pub deferred: usize,
}

#[derive(Debug, Default)]
pub struct TiledReport {
    pub stats: TiledStats,
    pub warnings: Vec<Warning>,
}

pub struct TiledImageReconciler<V: TiledImageViewer> {
    viewer: V,
    instances: Vec<Instance<V::Handle>>,
    next_ticket: u64,
}

impl<V: TiledImageViewer> TiledImageReconciler<V> {
    pub fn new(viewer: V) -> Self {
        Self {
            viewer,
            instances: Vec::new(),
            next_ticket: 0,
        }
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut V {
        &mut self.viewer
    }

    /// Bound instances, created or pending.
    pub fn instance_count(&self) -> usize {
        self.instances.iter().filter(|i| i.is_live()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|i| matches!(i.state, InstanceState::Pending { .. }))
            .count()
    }

    pub async fn synchronize(
        &mut self,
        layers: &[Layer],
        images: &[ImageObject],
        labels: &[LabelsObject],
        store: &DataStore,
        signal: &AbortSignal,
    ) -> Result<TiledReport, SyncError> {
        let mut diagnostics = Diagnostics::new();
        let desired = desired_instances(layers, images, labels, store, signal, &mut diagnostics)
            .await?;
        let stats = self.reconcile(desired);
        debug!(
            "tiled images: {} created, {} removed, {} updated, {} deferred",
            stats.created, stats.removed, stats.updated, stats.deferred
        );
        Ok(TiledReport {
            stats,
            warnings: diagnostics.flush(),
        })
    }

    fn reconcile(&mut self, desired: Vec<Desired>) -> TiledStats {
        let mut stats = TiledStats::default();

        // Clean pass.
        let mut kept = Vec::with_capacity(self.instances.len());
        for instance in std::mem::take(&mut self.instances) {
            let wanted = instance.is_live()
                && desired.iter().any(|d| {
                    d.key == instance.key
                        && d.kind == instance.kind
                        && d.tile_source == instance.tile_source
                });
            if wanted {
                kept.push(instance);
                continue;
            }
            match instance.state {
                InstanceState::Created { handle, .. } => {
                    self.viewer.remove(&handle);
                    stats.removed += 1;
                }
                InstanceState::Pending { ticket, .. } => {
                    kept.push(Instance {
                        state: InstanceState::Removing { ticket },
                        ..instance
                    });
                    stats.removed += 1;
                }
                InstanceState::Removing { .. } => kept.push(instance),
            }
        }
        self.instances = kept;

        // Create/update pass.
        for (index, want) in desired.into_iter().enumerate() {
            let existing = self
                .instances
                .iter_mut()
                .find(|i| i.is_live() && i.key == want.key);
            let Some(instance) = existing else {
                let ticket = Ticket(self.next_ticket);
                self.next_ticket += 1;
                self.viewer.add_tiled_image(
                    ticket,
                    TiledImageRequest {
                        kind: want.kind,
                        tile_source: want.tile_source.clone(),
                        index,
                        properties: want.properties,
                        transform: want.transform,
                    },
                );
                self.instances.push(Instance {
                    key: want.key,
                    kind: want.kind,
                    tile_source: want.tile_source,
                    state: InstanceState::Pending {
                        ticket,
                        requested: Applied {
                            index,
                            properties: want.properties,
                            transform: want.transform,
                        },
                        deferred_index: None,
                        deferred_update: None,
                        transform: want.transform,
                    },
                });
                stats.created += 1;
                continue;
            };

            match &mut instance.state {
                InstanceState::Created { handle, applied } => {
                    let mut changed = false;
                    if applied.index != index {
                        self.viewer.set_item_index(handle, index);
                        applied.index = index;
                        changed = true;
                    }
                    if applied.properties.opacity != want.properties.opacity {
                        self.viewer.set_opacity(handle, want.properties.opacity);
                        changed = true;
                    }
                    if applied.properties.flip != want.properties.flip {
                        self.viewer.set_flip(handle, want.properties.flip);
                        changed = true;
                    }
                    applied.properties = want.properties;
                    if applied.transform != want.transform {
                        self.viewer.set_transform(handle, &want.transform);
                        applied.transform = want.transform;
                        changed = true;
                    }
                    if changed {
                        stats.updated += 1;
                    }
                }
                InstanceState::Pending {
                    requested,
                    deferred_index,
                    deferred_update,
                    transform,
                    ..
                } => {
                    let target_index = deferred_index.unwrap_or(requested.index);
                    let target_properties = deferred_update.unwrap_or(requested.properties);
                    let mut deferred = false;
                    if target_index != index {
                        *deferred_index = Some(index);
                        deferred = true;
                    }
                    if target_properties != want.properties {
                        *deferred_update = Some(want.properties);
                        deferred = true;
                    }
                    if *transform != want.transform {
                        *transform = want.transform;
                        deferred = true;
                    }
                    if deferred {
                        stats.deferred += 1;
                    }
                }
                InstanceState::Removing { .. } => {}
            }
        }
        stats
    }

    /// Completion callback of an asynchronous creation. Applies deferred
    /// operations, or removes the image right away if its binding went away
    /// in the meantime. A failed creation drops the instance so the next pass
    /// requests it again.
    pub fn complete_creation(&mut self, ticket: Ticket, result: Result<V::Handle, String>) {
        let position = self.instances.iter().position(|i| match i.state {
            InstanceState::Pending { ticket: t, .. } | InstanceState::Removing { ticket: t } => {
                t == ticket
            }
            InstanceState::Created { .. } => false,
        });
        let Some(position) = position else {
            debug!("tiled image {ticket} completed after it was forgotten");
            if let Ok(handle) = result {
                self.viewer.remove(&handle);
            }
            return;
        };
        let handle = match result {
            Ok(handle) => handle,
            Err(message) => {
                let instance = self.instances.remove(position);
                warn!(
                    "failed to create tiled image for '{}': {message}",
                    instance.key.render.object_id
                );
                return;
            }
        };

        if matches!(self.instances[position].state, InstanceState::Removing { .. }) {
            self.viewer.remove(&handle);
            self.instances.remove(position);
            return;
        }
        let instance = &mut self.instances[position];
        let InstanceState::Pending {
            requested,
            deferred_index,
            deferred_update,
            transform,
            ..
        } = &instance.state
        else {
            return;
        };

        let mut applied = requested.clone();
        if let Some(index) = *deferred_index {
            self.viewer.set_item_index(&handle, index);
            applied.index = index;
        }
        if let Some(properties) = *deferred_update {
            self.viewer.set_opacity(&handle, properties.opacity);
            self.viewer.set_flip(&handle, properties.flip);
            applied.properties = properties;
        }
        self.viewer.set_transform(&handle, transform);
        applied.transform = *transform;
        instance.state = InstanceState::Created { handle, applied };
    }

    /// Removes every live image; pending creations are removed when they
    /// complete.
    pub fn destroy(&mut self) {
        for instance in std::mem::take(&mut self.instances) {
            match instance.state {
                InstanceState::Created { handle, .. } => self.viewer.remove(&handle),
                InstanceState::Pending { ticket, .. } => self.instances.push(Instance {
                    state: InstanceState::Removing { ticket },
                    ..instance
                }),
                InstanceState::Removing { .. } => self.instances.push(instance),
            }
        }
    }
}

impl<V: TiledImageViewer + fmt::Debug> fmt::Debug for TiledImageReconciler<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiledImageReconciler")
            .field("viewer", &self.viewer)
            .field("instances", &self.instances.len())
            .finish()
    }
}

/// Opacity a tiled image is drawn with. Hidden images stay in the viewer at
/// zero opacity.
pub fn effective_opacity(layer: &Layer, object: &dyn OverlayObject) -> f64 {
    if layer.visibility && object.visibility() {
        layer.opacity * object.opacity()
    } else {
        0.0
    }
}

fn desired_for<O: OverlayObject>(
    render: &RenderRef<'_, O>,
    labels: bool,
    kind: TiledImageKind,
    tile_source: &TileSource,
) -> Desired {
    let center = Some(tile_source.center());
    Desired {
        key: InstanceKey {
            labels,
            render: render.key(),
        },
        kind,
        tile_source: tile_source.clone(),
        properties: ImageProperties {
            opacity: effective_opacity(render.layer, render.object),
            flip: render.config.flip,
        },
        transform: data_to_world(
            false,
            &render.config.transform,
            &render.layer.transform,
            center,
        ),
    }
}

/// Desired instances in draw order: layer by layer, images below labels.
async fn desired_instances(
    layers: &[Layer],
    images: &[ImageObject],
    labels: &[LabelsObject],
    store: &DataStore,
    signal: &AbortSignal,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Desired>, SyncError> {
    signal.check().map_err(|_| SyncError::Aborted)?;
    let layer_position = |layer: &Layer| {
        layers
            .iter()
            .position(|l| std::ptr::eq(l, layer))
            .unwrap_or(layers.len())
    };
    let mut desired = Vec::new();

    let refs = load_refs(collect_refs(layers, images), "image", diagnostics, |object| {
        store.load_image(object, signal)
    })
    .await?;
    for r in &refs {
        let want = desired_for(&r.render, false, TiledImageKind::Image, r.data.data.tile_source());
        desired.push((layer_position(r.render.layer), want));
    }
    let refs = load_refs(collect_refs(layers, labels), "labels", diagnostics, |object| {
        store.load_labels(object, signal)
    })
    .await?;
    for r in &refs {
        let kind = TiledImageKind::Labels {
            outline: r.render.object.outline,
        };
        let want = desired_for(&r.render, true, kind, r.data.data.tile_source());
        desired.push((layer_position(r.render.layer), want));
    }

    desired.sort_by_key(|(position, _)| *position);
    Ok(desired.into_iter().map(|(_, want)| want).collect())
}
