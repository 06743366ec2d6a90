//! Point-cloud buffer synchronizer.
//!
//! All bound points objects share one set of per-vertex buffers (`x`, `y`,
//! `marker`, `size`, `color`, `object`). Each rendered instance owns a
//! contiguous slot, padded to [`SLOT_ALIGNMENT`] elements, in render-binding
//! order, and one entry of the points transform table.

use log::{debug, error};

use lamina_core::color::{self, Color};
use lamina_core::marker::Marker;
use lamina_core::object::{PointsObject, SizeUnit};
use lamina_core::transform::data_to_world;
use lamina_io::{ItemsData, PointsData};

use crate::diagnostics::Diagnostics;
use crate::dirty::{
    color_dirty, coordinates_dirty, marker_dirty, size_dirty, transform_dirty, AttributeDeps,
    MembershipDeps, PaintDeps, PointsDeps, SizeDeps,
};
use crate::gpu::{BufferId, GpuDevice, TransformTable};
use crate::refs::{collect_refs, load_refs, truncate_refs, LoadedRef, RefKey, RenderRef};
use crate::render_data::PointsDrawCall;
use crate::resolve::{padded_len, ResolveOptions, Resolver};
use crate::sync::{
    padded, resolve_paint, SlotError, SyncContext, SyncError, SyncStats, Uploader,
};
use crate::{MAX_OBJECTS, SLOT_ALIGNMENT};

type PointsRef<'a> = LoadedRef<'a, PointsObject, dyn PointsData>;

#[derive(Debug, Clone)]
struct PointsSlice {
    key: RefKey,
    offset: usize,
    len: usize,
    /// `None` when the slot failed and must be fully re-uploaded.
    deps: Option<PointsDeps>,
}

#[derive(Debug)]
pub struct PointsSynchronizer {
    capacity: usize,
    allocated: Option<usize>,
    slices: Vec<PointsSlice>,
}

impl Default for PointsSynchronizer {
    fn default() -> Self {
        Self::new(MAX_OBJECTS)
    }
}

impl PointsSynchronizer {
    /// `capacity` is clamped to [`MAX_OBJECTS`].
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(MAX_OBJECTS),
            allocated: None,
            slices: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_count(&self) -> usize {
        self.slices.len()
    }

    /// Element count of the per-vertex buffers.
    pub fn item_count(&self) -> usize {
        self.allocated.unwrap_or(0)
    }

    pub fn draw_call(&self) -> Option<PointsDrawCall> {
        match self.allocated {
            Some(count) if count > 0 => Some(PointsDrawCall { count }),
            _ => None,
        }
    }

    /// Forgets all buffer state; the next pass resizes and uploads everything.
    pub fn invalidate(&mut self) {
        self.allocated = None;
        self.slices.clear();
    }

    pub async fn synchronize<D: GpuDevice>(
        &mut self,
        device: &mut D,
        objects: &[PointsObject],
        ctx: &SyncContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<SyncStats, SyncError> {
        ctx.checkpoint()?;
        let refs = collect_refs(ctx.layers, objects);
        let mut refs = load_refs(refs, "points", diagnostics, |object| {
            ctx.store.load_points(object, ctx.signal)
        })
        .await?;
        truncate_refs(&mut refs, self.capacity, "points", diagnostics);

        let mut layout = Vec::with_capacity(refs.len());
        let mut total = 0;
        for r in &refs {
            let len = padded_len(r.data.data.len(), SLOT_ALIGNMENT);
            layout.push((total, len));
            total += len;
        }

        let mut up = Uploader::new(device);
        let resized = self.allocated != Some(total);
        if resized {
            self.invalidate();
            up.resize(&BufferId::POINTS, total)?;
            self.allocated = Some(total);
        }

        let previous = std::mem::take(&mut self.slices);
        let resolver = Resolver::new(ctx.store, ctx.signal);
        for (slot, (r, &(offset, len))) in refs.iter().zip(&layout).enumerate() {
            let key = r.render.key();
            let old = previous
                .get(slot)
                .filter(|s| s.key == key && s.offset == offset && s.len == len)
                .and_then(|s| s.deps.as_ref());
            let deps = points_deps(r, ctx);

            let result = upload_slot(
                &mut up, &resolver, slot, r, offset, len, old, &deps, ctx, diagnostics,
            )
            .await;
            match result {
                Ok(()) => self.slices.push(PointsSlice {
                    key,
                    offset,
                    len,
                    deps: Some(deps),
                }),
                Err(SlotError::Aborted) => return Err(SyncError::Aborted),
                Err(SlotError::Gpu(err)) => {
                    self.invalidate();
                    return Err(err.into());
                }
                Err(SlotError::Resolve(err)) => {
                    error!("points object '{}' cannot be drawn: {err}", key.object_id);
                    if let Err(err) = up.write(BufferId::PointColor, offset, &vec![0u32; len]) {
                        self.invalidate();
                        return Err(err.into());
                    }
                    self.slices.push(PointsSlice {
                        key,
                        offset,
                        len,
                        deps: None,
                    });
                }
            }
        }

        let stats = SyncStats {
            slots: refs.len(),
            items: total,
            resized,
            writes: up.writes,
            bytes: up.bytes,
        };
        debug!(
            "points: {} slots, {} items, {} writes ({} bytes){}",
            stats.slots,
            stats.items,
            stats.writes,
            stats.bytes,
            if resized { ", resized" } else { "" }
        );
        Ok(stats)
    }
}

fn points_deps(r: &PointsRef<'_>, ctx: &SyncContext<'_>) -> PointsDeps {
    let RenderRef {
        object,
        layer,
        config,
        ..
    } = r.render;
    let items = r.data.generation;
    let center = r.data.data.bounds().map(|b| b.center());
    let transform = data_to_world(config.flip, &config.transform, &layer.transform, center);
    let unit_scale = match object.size_unit {
        SizeUnit::Data => transform.scale_factor(),
        SizeUnit::Layer => layer.transform.scale,
        SizeUnit::World => 1.0,
    };
    let membership = config
        .layer_column()
        .map(|column| MembershipDeps::new(items, column, &layer.id, ctx.store));

    PointsDeps {
        items,
        marker: AttributeDeps::new(items, &object.point_marker, &ctx.maps.markers, ctx.store),
        size: SizeDeps {
            size: AttributeDeps::new(items, &object.point_size, &ctx.maps.sizes, ctx.store),
            scale: object.size_factor * layer.point_size_factor * unit_scale,
        },
        color: PaintDeps::new(
            items,
            &object.point_color,
            &object.point_visibility,
            &object.point_opacity,
            ctx.maps,
            ctx.store,
        )
        .in_instance(
            object.visibility && layer.visibility,
            object.opacity * layer.opacity,
            membership,
        ),
        transform,
    }
}

/// Uploads the streams of one slot whose dependencies changed. `old` is
/// `None` when every stream must be written.
#[allow(clippy::too_many_arguments)]
async fn upload_slot<D: GpuDevice>(
    up: &mut Uploader<'_, D>,
    resolver: &Resolver<'_>,
    slot: usize,
    r: &PointsRef<'_>,
    offset: usize,
    len: usize,
    old: Option<&PointsDeps>,
    deps: &PointsDeps,
    ctx: &SyncContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<(), SlotError> {
    let dirty = |predicate: fn(&PointsDeps, &PointsDeps) -> bool| {
        old.map_or(true, |old| predicate(old, deps))
    };
    let data = &r.data.data;
    let ids = data.index();
    let options = ResolveOptions::padded(SLOT_ALIGNMENT);

    if dirty(coordinates_dirty) {
        for (dimension, buffer) in [("x", BufferId::PointX), ("y", BufferId::PointY)] {
            ctx.checkpoint().map_err(|_| SlotError::Aborted)?;
            let values = data.load_coordinates(dimension, ctx.signal).await?;
            up.write(buffer, offset, &padded(&values, len, 0.0))?;
        }
    }
    if old.is_none() {
        up.write(BufferId::PointObject, offset, &vec![slot as u8; len])?;
    }
    if dirty(marker_dirty) {
        let markers = resolver
            .resolve(
                ids,
                &deps.marker.binding,
                &ctx.maps.markers,
                &Marker::Disc,
                &options,
                diagnostics,
            )
            .await?;
        let codes: Vec<u8> = markers.iter().map(|m| m.code()).collect();
        up.write(BufferId::PointMarker, offset, &padded(&codes, len, 0))?;
    }
    if dirty(size_dirty) {
        let scale = deps.size.scale;
        let sizes = resolver
            .resolve(
                ids,
                &deps.size.size.binding,
                &ctx.maps.sizes,
                &scale,
                &options.with_scale(scale),
                diagnostics,
            )
            .await?;
        let sizes: Vec<f32> = sizes.iter().map(|&s| s as f32).collect();
        up.write(BufferId::PointSize, offset, &padded(&sizes, len, 0.0))?;
    }
    if dirty(color_dirty) {
        let default_color: Color = color::default_palette()[0];
        let packed =
            resolve_paint(resolver, ids, &deps.color, ctx.maps, default_color, diagnostics)
                .await?;
        up.write(BufferId::PointColor, offset, &padded(&packed, len, 0))?;
    }
    if old.map_or(true, |old| transform_dirty(&old.transform, &deps.transform)) {
        up.transform(TransformTable::Points, slot, &deps.transform)?;
    }
    Ok(())
}
