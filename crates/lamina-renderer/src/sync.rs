//! Pieces shared by the points and shapes synchronizers.

use bytemuck::NoUninit;
use serde::Serialize;
use thiserror::Error;

use lamina_core::binding::BindingMaps;
use lamina_core::color::Color;
use lamina_core::geometry::Matrix3;
use lamina_core::layer::Layer;
use lamina_io::{AbortSignal, DataError, DataStore, ItemId};

use crate::diagnostics::Diagnostics;
use crate::dirty::PaintDeps;
use crate::gpu::{BufferId, GpuDevice, GpuError, TransformTable};
use crate::resolve::{pack_colors, ResolveError, ResolveOptions, Resolver};
use crate::SLOT_ALIGNMENT;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("synchronization aborted")]
    Aborted,

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

impl SyncError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, SyncError::Aborted)
    }
}

/// Inputs shared by every synchronizer in one pass.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub layers: &'a [Layer],
    pub maps: &'a BindingMaps,
    pub store: &'a DataStore,
    pub signal: &'a AbortSignal,
}

impl SyncContext<'_> {
    pub fn checkpoint(&self) -> Result<(), SyncError> {
        self.signal.check().map_err(|_| SyncError::Aborted)
    }
}

/// Counters of one synchronizer pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub slots: usize,
    pub items: usize,
    pub resized: bool,
    pub writes: usize,
    pub bytes: usize,
}

/// Why one slot could not be uploaded.
pub(crate) enum SlotError {
    Aborted,
    Gpu(GpuError),
    Resolve(ResolveError),
}

impl From<GpuError> for SlotError {
    fn from(err: GpuError) -> Self {
        SlotError::Gpu(err)
    }
}

impl From<ResolveError> for SlotError {
    fn from(err: ResolveError) -> Self {
        if err.is_aborted() {
            SlotError::Aborted
        } else {
            SlotError::Resolve(err)
        }
    }
}

impl From<DataError> for SlotError {
    fn from(err: DataError) -> Self {
        ResolveError::from(err).into()
    }
}

/// Device wrapper that counts what it uploads.
pub(crate) struct Uploader<'d, D> {
    device: &'d mut D,
    pub writes: usize,
    pub bytes: usize,
}

impl<'d, D: GpuDevice> Uploader<'d, D> {
    pub fn new(device: &'d mut D) -> Self {
        Self {
            device,
            writes: 0,
            bytes: 0,
        }
    }

    pub fn resize(&mut self, buffers: &[BufferId], elements: usize) -> Result<(), GpuError> {
        for &buffer in buffers {
            self.device.resize_buffer(buffer, elements)?;
        }
        Ok(())
    }

    pub fn write<T: NoUninit>(
        &mut self,
        buffer: BufferId,
        offset: usize,
        values: &[T],
    ) -> Result<(), GpuError> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        self.device.write_buffer(buffer, offset, bytes)?;
        self.writes += 1;
        self.bytes += bytes.len();
        Ok(())
    }

    pub fn transform(
        &mut self,
        table: TransformTable,
        slot: usize,
        matrix: &Matrix3,
    ) -> Result<(), GpuError> {
        let columns = matrix.to_padded_columns();
        self.device.write_transform(table, slot, &columns)?;
        self.writes += 1;
        self.bytes += std::mem::size_of_val(&columns);
        Ok(())
    }
}

pub(crate) fn padded<T: Clone>(values: &[T], len: usize, fill: T) -> Vec<T> {
    let mut out = values.to_vec();
    out.resize(len, fill);
    out
}

/// Resolves and packs one color stream: color, visibility and opacity
/// bindings combined with the instance's own visibility, opacity and layer
/// membership.
pub(crate) async fn resolve_paint(
    resolver: &Resolver<'_>,
    ids: &[ItemId],
    deps: &PaintDeps,
    maps: &BindingMaps,
    default_color: Color,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<u32>, ResolveError> {
    let options = ResolveOptions::padded(SLOT_ALIGNMENT);
    let colors = resolver
        .resolve_colors(
            ids,
            &deps.color.binding,
            &maps.colors,
            default_color,
            &options,
            diagnostics,
        )
        .await?;
    let visible = resolver
        .resolve(
            ids,
            &deps.visibility.binding,
            &maps.visibilities,
            &true,
            &options,
            diagnostics,
        )
        .await?;
    let opacity = resolver
        .resolve(
            ids,
            &deps.opacity.binding,
            &maps.opacities,
            &1.0,
            &options,
            diagnostics,
        )
        .await?;
    let membership = match &deps.membership {
        Some(m) => Some(
            resolver
                .resolve_layer_membership(ids, &m.column, &m.layer_id, &options, diagnostics)
                .await?,
        ),
        None => None,
    };

    let visible: Vec<bool> = visible
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            v && deps.instance_visible && membership.as_ref().map_or(true, |m| m[i])
        })
        .collect();
    let opacity: Vec<f64> = opacity.iter().map(|o| o * deps.instance_opacity).collect();
    Ok(pack_colors(&colors, &visible, &opacity))
}
