//! Shapes buffer synchronizer.
//!
//! Shapes are drawn as ring edges. Two buffer families are shared by every
//! bound shapes object: per-edge streams (`edges`, `edgeItem`, `edgeObject`)
//! and per-item streams (`fillColor`, `strokeColor`). A slot owns one padded
//! range in each family.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, error};

use lamina_core::color::Color;
use lamina_core::object::{ObjectId, ShapesObject};
use lamina_core::transform::data_to_world;
use lamina_io::{AbortSignal, DataError, ItemsData, ShapesData};

use crate::diagnostics::Diagnostics;
use crate::dirty::{
    edge_item_dirty, edges_dirty, fill_dirty, stroke_dirty, transform_dirty, MembershipDeps,
    PaintDeps, ShapesDeps,
};
use crate::gpu::{BufferId, GpuDevice, TransformTable};
use crate::refs::{
    collect_refs, load_refs, report_load_failure, truncate_refs, LoadedRef, RefKey, RenderRef,
};
use crate::render_data::ShapesDrawCall;
use crate::resolve::{padded_len, Resolver};
use crate::sync::{
    padded, resolve_paint, SlotError, SyncContext, SyncError, SyncStats, Uploader,
};
use crate::{MAX_OBJECTS, SLOT_ALIGNMENT};

type ShapesRef<'a> = LoadedRef<'a, ShapesObject, dyn ShapesData>;

/// Ring edges of one shapes data set, with the item each edge belongs to.
#[derive(Debug, Default)]
struct EdgeList {
    edges: Vec<[f32; 4]>,
    items: Vec<u32>,
}

impl EdgeList {
    async fn load(data: &dyn ShapesData, signal: &AbortSignal) -> Result<Self, DataError> {
        let shapes = data.load_multi_polygons(signal).await?;
        let mut list = EdgeList::default();
        for (item, shape) in shapes.iter().enumerate() {
            let edges = shape.edges();
            list.items.extend(std::iter::repeat(item as u32).take(edges.len()));
            list.edges.extend(edges);
        }
        Ok(list)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ranges {
    item_offset: usize,
    item_len: usize,
    edge_offset: usize,
    edge_len: usize,
}

#[derive(Debug, Clone)]
struct ShapesSlice {
    key: RefKey,
    ranges: Ranges,
    stroke_width: f64,
    deps: Option<ShapesDeps>,
}

#[derive(Debug)]
pub struct ShapesSynchronizer {
    capacity: usize,
    allocated_items: Option<usize>,
    allocated_edges: Option<usize>,
    slices: Vec<ShapesSlice>,
    edge_cache: HashMap<ObjectId, (u64, Arc<EdgeList>)>,
}

impl Default for ShapesSynchronizer {
    fn default() -> Self {
        Self::new(MAX_OBJECTS)
    }
}

impl ShapesSynchronizer {
    /// `capacity` is clamped to [`MAX_OBJECTS`].
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(MAX_OBJECTS),
            allocated_items: None,
            allocated_edges: None,
            slices: Vec::new(),
            edge_cache: HashMap::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slices.len()
    }

    pub fn item_count(&self) -> usize {
        self.allocated_items.unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.allocated_edges.unwrap_or(0)
    }

    pub fn draw_calls(&self) -> Vec<ShapesDrawCall> {
        self.slices
            .iter()
            .enumerate()
            .filter(|(_, s)| s.ranges.edge_len > 0)
            .map(|(slot, s)| ShapesDrawCall {
                slot,
                edge_offset: s.ranges.edge_offset,
                edge_count: s.ranges.edge_len,
                item_offset: s.ranges.item_offset,
                item_count: s.ranges.item_len,
                stroke_width: s.stroke_width as f32,
            })
            .collect()
    }

    pub fn invalidate(&mut self) {
        self.allocated_items = None;
        self.allocated_edges = None;
        self.slices.clear();
    }

    pub async fn synchronize<D: GpuDevice>(
        &mut self,
        device: &mut D,
        objects: &[ShapesObject],
        ctx: &SyncContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<SyncStats, SyncError> {
        ctx.checkpoint()?;
        let refs = collect_refs(ctx.layers, objects);
        let loaded = load_refs(refs, "shapes", diagnostics, |object| {
            ctx.store.load_shapes(object, ctx.signal)
        })
        .await?;
        let mut refs = self.load_edges(loaded, ctx, diagnostics).await?;
        truncate_refs(&mut refs, self.capacity, "shapes", diagnostics);

        let mut layout = Vec::with_capacity(refs.len());
        let (mut items, mut edges) = (0, 0);
        for (r, list) in &refs {
            let ranges = Ranges {
                item_offset: items,
                item_len: padded_len(r.data.data.len(), SLOT_ALIGNMENT),
                edge_offset: edges,
                edge_len: padded_len(list.edges.len(), SLOT_ALIGNMENT),
            };
            items += ranges.item_len;
            edges += ranges.edge_len;
            layout.push(ranges);
        }

        let mut up = Uploader::new(device);
        let items_resized = self.allocated_items != Some(items);
        let edges_resized = self.allocated_edges != Some(edges);
        if items_resized || edges_resized {
            self.slices.clear();
        }
        if items_resized {
            self.allocated_items = None;
            up.resize(&BufferId::SHAPE_ITEMS, items)?;
            self.allocated_items = Some(items);
        }
        if edges_resized {
            self.allocated_edges = None;
            up.resize(&BufferId::SHAPE_EDGES, edges)?;
            self.allocated_edges = Some(edges);
        }

        let previous = std::mem::take(&mut self.slices);
        let resolver = Resolver::new(ctx.store, ctx.signal);
        for (slot, ((r, list), &ranges)) in refs.iter().zip(&layout).enumerate() {
            let key = r.render.key();
            let old = previous
                .get(slot)
                .filter(|s| s.key == key && s.ranges == ranges)
                .and_then(|s| s.deps.as_ref());
            let deps = shapes_deps(r, ctx);
            let stroke_width = r.render.object.stroke_width;

            let result = upload_slot(
                &mut up, &resolver, slot, r, list, ranges, old, &deps, ctx, diagnostics,
            )
            .await;
            let deps = match result {
                Ok(()) => Some(deps),
                Err(SlotError::Aborted) => return Err(SyncError::Aborted),
                Err(SlotError::Gpu(err)) => {
                    self.invalidate();
                    return Err(err.into());
                }
                Err(SlotError::Resolve(err)) => {
                    error!("shapes object '{}' cannot be drawn: {err}", key.object_id);
                    let hidden = vec![0u32; ranges.item_len];
                    let zeroed = up
                        .write(BufferId::ShapeFill, ranges.item_offset, &hidden)
                        .and_then(|()| up.write(BufferId::ShapeStroke, ranges.item_offset, &hidden));
                    if let Err(err) = zeroed {
                        self.invalidate();
                        return Err(err.into());
                    }
                    None
                }
            };
            self.slices.push(ShapesSlice {
                key,
                ranges,
                stroke_width,
                deps,
            });
        }

        let stats = SyncStats {
            slots: refs.len(),
            items,
            resized: items_resized || edges_resized,
            writes: up.writes,
            bytes: up.bytes,
        };
        debug!(
            "shapes: {} slots, {} items, {} edges, {} writes ({} bytes)",
            stats.slots, items, edges, stats.writes, stats.bytes
        );
        Ok(stats)
    }

    /// Pairs every ref with its ring edges, reusing edges of data sets that
    /// were already seen in the same generation.
    async fn load_edges<'a>(
        &mut self,
        refs: Vec<ShapesRef<'a>>,
        ctx: &SyncContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<(ShapesRef<'a>, Arc<EdgeList>)>, SyncError> {
        let mut out = Vec::with_capacity(refs.len());
        let mut failed: Vec<ObjectId> = Vec::new();
        for r in refs {
            let id = r.render.object.id.clone();
            if failed.contains(&id) {
                continue;
            }
            let cached = self
                .edge_cache
                .get(&id)
                .filter(|(generation, _)| *generation == r.data.generation)
                .map(|(_, list)| Arc::clone(list));
            let list = match cached {
                Some(list) => list,
                None => match EdgeList::load(&*r.data.data, ctx.signal).await {
                    Ok(list) => {
                        let list = Arc::new(list);
                        self.edge_cache
                            .insert(id, (r.data.generation, Arc::clone(&list)));
                        list
                    }
                    Err(err) => {
                        report_load_failure("shapes", &id, err, diagnostics)?;
                        failed.push(id);
                        continue;
                    }
                },
            };
            out.push((r, list));
        }
        let live: HashSet<&ObjectId> = out.iter().map(|(r, _)| &r.render.object.id).collect();
        self.edge_cache.retain(|id, _| live.contains(id));
        Ok(out)
    }
}

fn shapes_deps(r: &ShapesRef<'_>, ctx: &SyncContext<'_>) -> ShapesDeps {
    let RenderRef {
        object,
        layer,
        config,
        ..
    } = r.render;
    let items = r.data.generation;
    let center = r.data.data.bounds().map(|b| b.center());
    let membership = config
        .layer_column()
        .map(|column| MembershipDeps::new(items, column, &layer.id, ctx.store));
    let visible = object.visibility && layer.visibility;
    let opacity = object.opacity * layer.opacity;

    ShapesDeps {
        items,
        fill: PaintDeps::new(
            items,
            &object.fill_color,
            &object.fill_visibility,
            &object.fill_opacity,
            ctx.maps,
            ctx.store,
        )
        .in_instance(visible, opacity, membership.clone()),
        stroke: PaintDeps::new(
            items,
            &object.stroke_color,
            &object.stroke_visibility,
            &object.stroke_opacity,
            ctx.maps,
            ctx.store,
        )
        .in_instance(visible, opacity, membership),
        transform: data_to_world(config.flip, &config.transform, &layer.transform, center),
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_slot<D: GpuDevice>(
    up: &mut Uploader<'_, D>,
    resolver: &Resolver<'_>,
    slot: usize,
    r: &ShapesRef<'_>,
    list: &EdgeList,
    ranges: Ranges,
    old: Option<&ShapesDeps>,
    deps: &ShapesDeps,
    ctx: &SyncContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<(), SlotError> {
    let dirty = |predicate: fn(&ShapesDeps, &ShapesDeps) -> bool| {
        old.map_or(true, |old| predicate(old, deps))
    };
    let ids = r.data.data.index();
    let Ranges {
        item_offset,
        item_len,
        edge_offset,
        edge_len,
    } = ranges;

    if dirty(edges_dirty) {
        up.write(
            BufferId::EdgeVertices,
            edge_offset,
            &padded(&list.edges, edge_len, [0.0; 4]),
        )?;
    }
    if dirty(edge_item_dirty) {
        let absolute: Vec<u32> = list
            .items
            .iter()
            .map(|&item| item_offset as u32 + item)
            .collect();
        up.write(
            BufferId::EdgeItem,
            edge_offset,
            &padded(&absolute, edge_len, item_offset as u32),
        )?;
    }
    if old.is_none() {
        up.write(BufferId::EdgeObject, edge_offset, &vec![slot as u8; edge_len])?;
    }
    if dirty(fill_dirty) {
        let packed =
            resolve_paint(resolver, ids, &deps.fill, ctx.maps, Color::GRAY, diagnostics).await?;
        up.write(BufferId::ShapeFill, item_offset, &padded(&packed, item_len, 0))?;
    }
    if dirty(stroke_dirty) {
        let packed =
            resolve_paint(resolver, ids, &deps.stroke, ctx.maps, Color::BLACK, diagnostics)
                .await?;
        up.write(BufferId::ShapeStroke, item_offset, &padded(&packed, item_len, 0))?;
    }
    if old.map_or(true, |old| transform_dirty(&old.transform, &deps.transform)) {
        up.transform(TransformTable::Shapes, slot, &deps.transform)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Warning;
    use crate::gpu::{HostDevice, Upload};
    use lamina_core::binding::{Binding, BindingMaps};
    use lamina_core::layer::Layer;
    use crate::testing::{tripwire_registry, Tripwire};
    use lamina_core::object::{DataSource, LayerConfig, Table};
    use lamina_io::{AbortController, DataStore, ProjectRoot};
    use serde_json::json;

    const TRIANGLE: [[f64; 2]; 3] = [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]];

    fn shapes(id: &str, count: usize) -> ShapesObject {
        let polygons: Vec<_> = (0..count).map(|_| json!([[TRIANGLE]])).collect();
        let source: DataSource =
            serde_json::from_value(json!({"type": "inline", "polygons": polygons})).unwrap();
        ShapesObject::new(id, source).in_layer(LayerConfig::new("l"))
    }

    struct Fixture {
        layers: Vec<Layer>,
        maps: BindingMaps,
        store: DataStore,
        device: HostDevice,
        sync: ShapesSynchronizer,
    }

    impl Fixture {
        fn new() -> Self {
            let _ = env_logger::builder().is_test(true).try_init();
            Self {
                layers: vec![Layer::new("l", "Layer")],
                maps: BindingMaps::default(),
                store: DataStore::in_memory(),
                device: HostDevice::default(),
                sync: ShapesSynchronizer::default(),
            }
        }

        fn run_with(
            &mut self,
            objects: &[ShapesObject],
            signal: &AbortSignal,
        ) -> (Result<SyncStats, SyncError>, Vec<Warning>) {
            let ctx = SyncContext {
                layers: &self.layers,
                maps: &self.maps,
                store: &self.store,
                signal,
            };
            let mut diagnostics = Diagnostics::new();
            let result = pollster::block_on(self.sync.synchronize(
                &mut self.device,
                objects,
                &ctx,
                &mut diagnostics,
            ));
            (result, diagnostics.flush())
        }

        fn run_full(&mut self, objects: &[ShapesObject]) -> (SyncStats, Vec<Warning>) {
            let (result, warnings) = self.run_with(objects, &AbortSignal::never());
            (result.unwrap(), warnings)
        }

        fn run(&mut self, objects: &[ShapesObject]) -> SyncStats {
            self.run_full(objects).0
        }
    }

    #[test]
    fn test_edge_and_item_layout() {
        let mut fx = Fixture::new();
        let stats = fx.run(&[shapes("a", 2), shapes("b", 1)]);
        assert_eq!(stats.items, 8);
        // Two triangles: 6 edges padded to 8; one triangle: 3 padded to 4.
        assert_eq!(fx.sync.edge_count(), 12);
        assert_eq!(
            fx.device.read::<u32>(BufferId::EdgeItem),
            vec![0, 0, 0, 1, 1, 1, 0, 0, 4, 4, 4, 4]
        );
        assert_eq!(
            fx.device.read::<u8>(BufferId::EdgeObject),
            vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1]
        );
        let edges = fx.device.read::<[f32; 4]>(BufferId::EdgeVertices);
        assert_eq!(edges[2], [4.0, 4.0, 0.0, 0.0]);
        assert_eq!(edges[6], [0.0; 4]);

        let calls = fx.sync.draw_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].edge_offset, 8);
        assert_eq!(calls[1].item_offset, 4);
    }

    #[test]
    fn test_fill_and_stroke_defaults() {
        let mut fx = Fixture::new();
        fx.run(&[shapes("a", 1)]);
        assert_eq!(
            fx.device.read::<u32>(BufferId::ShapeFill)[0],
            Color::GRAY.pack(true, 255)
        );
        assert_eq!(
            fx.device.read::<u32>(BufferId::ShapeStroke)[0],
            Color::BLACK.pack(true, 255)
        );
        assert_eq!(fx.device.read::<u32>(BufferId::ShapeStroke)[1], 0);
    }

    #[test]
    fn test_stroke_change_only_touches_stroke() {
        let mut fx = Fixture::new();
        let mut objects = [shapes("a", 2)];
        fx.run(&objects);
        fx.device.take_uploads();

        objects[0].stroke_color = Binding::Value(Color::WHITE);
        objects[0].stroke_width = 3.0;
        let stats = fx.run(&objects);
        assert!(!stats.resized);
        assert_eq!(
            fx.device.take_uploads(),
            vec![Upload::Write {
                buffer: BufferId::ShapeStroke,
                offset: 0,
                len: 4
            }]
        );
        assert_eq!(fx.sync.draw_calls()[0].stroke_width, 3.0);
    }

    #[test]
    fn test_hidden_object_keeps_geometry() {
        let mut fx = Fixture::new();
        let mut objects = [shapes("a", 1)];
        fx.run(&objects);
        fx.device.take_uploads();

        objects[0].visibility = false;
        fx.run(&objects);
        assert!(fx.device.writes_to(BufferId::EdgeVertices).is_empty());
        assert_eq!(fx.device.read::<u32>(BufferId::ShapeFill)[0] & 0xff, 0);
        assert_eq!(fx.device.read::<u32>(BufferId::ShapeStroke)[0] & 0xff, 0);
    }

    #[test]
    fn test_layer_transform_only_rewrites_transform() {
        let mut fx = Fixture::new();
        let objects = [shapes("a", 1)];
        fx.run(&objects);
        fx.device.take_uploads();

        fx.layers[0].transform.scale = 2.0;
        fx.run(&objects);
        assert_eq!(
            fx.device.take_uploads(),
            vec![Upload::Transform {
                table: TransformTable::Shapes,
                slot: 0
            }]
        );
        let columns = fx.device.transform(TransformTable::Shapes, 0).unwrap();
        assert_eq!(columns[0], 2.0);
    }

    #[test]
    fn test_removing_first_object_shifts_and_reuploads() {
        let mut fx = Fixture::new();
        fx.run(&[shapes("a", 1), shapes("b", 1)]);
        fx.device.take_uploads();
        let stats = fx.run(&[shapes("b", 1)]);
        assert!(stats.resized);
        assert_eq!(fx.device.read::<u8>(BufferId::EdgeObject), vec![0; 4]);
        assert_eq!(fx.sync.slot_count(), 1);
    }

    #[test]
    fn test_broken_polygons_drop_the_object() {
        let mut fx = Fixture::new();
        let broken = ShapesObject::new(
            "broken",
            serde_json::from_value(json!({"type": "inline", "polygons": [1]})).unwrap(),
        )
        .in_layer(LayerConfig::new("l"));
        let (stats, warnings) = fx.run_full(&[broken, shapes("ok", 1)]);
        assert_eq!(stats.slots, 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_edge_cache_forgets_unbound_objects() {
        let mut fx = Fixture::new();
        fx.run(&[shapes("a", 1), shapes("b", 2)]);
        assert_eq!(fx.sync.edge_cache.len(), 2);
        fx.run(&[shapes("b", 2)]);
        assert_eq!(
            fx.sync.edge_cache.keys().collect::<Vec<_>>(),
            vec![&ObjectId("b".to_string())]
        );
    }

    #[test]
    fn test_abort_between_slots_keeps_finished_slots() {
        let mut fx = Fixture::new();
        let controller = AbortController::new();
        let wire = Tripwire::on_load(&controller, 2);
        fx.store = DataStore::new(tripwire_registry(&wire), ProjectRoot::none());
        fx.store.set_tables(&[Table {
            id: "marks".to_string(),
            name: "Marks".to_string(),
            data_source: DataSource::new("tripwire"),
        }]);
        let mut objects = [shapes("a", 1), shapes("b", 1)];
        for object in &mut objects {
            object.stroke_color = Binding::column("marks", "stroke");
        }

        // The signal fires while slot 1 resolves its stroke colors.
        let (result, warnings) = fx.run_with(&objects, &controller.signal());
        assert!(result.unwrap_err().is_aborted());
        assert!(warnings.is_empty());
        assert_eq!(fx.sync.slot_count(), 1);
        assert_eq!(fx.device.writes_to(BufferId::ShapeStroke), vec![(0, 4)]);
        assert!(!fx.device.uploads().contains(&Upload::Transform {
            table: TransformTable::Shapes,
            slot: 1
        }));

        // The next pass rewrites all of slot 1 and none of slot 0.
        fx.device.take_uploads();
        let (result, warnings) = fx.run_with(&objects, &AbortSignal::never());
        assert!(!result.unwrap().resized);
        assert!(warnings.is_empty());
        for buffer in BufferId::SHAPE_EDGES.into_iter().chain(BufferId::SHAPE_ITEMS) {
            assert_eq!(fx.device.writes_to(buffer), vec![(4, 4)], "{buffer:?}");
        }
        assert!(!fx.device.uploads().contains(&Upload::Transform {
            table: TransformTable::Shapes,
            slot: 0
        }));
        assert!(fx.device.uploads().contains(&Upload::Transform {
            table: TransformTable::Shapes,
            slot: 1
        }));
        assert_eq!(
            fx.device.read::<u32>(BufferId::ShapeStroke)[4],
            Color::rgb(255, 0, 0).pack(true, 255)
        );
        assert_eq!(wire.loads(), 3);
    }
}
