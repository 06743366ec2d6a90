//! The GPU seam.
//!
//! Synchronizers talk to the graphics backend only through [`GpuDevice`]:
//! whole-buffer resizes, element-offset sub-range writes, single-slot writes
//! into the per-object transform tables, and draws. [`HostDevice`] keeps CPU
//! mirrors of every buffer and logs each upload; it backs headless use and
//! the tests.

use std::collections::BTreeMap;

use bytemuck::{AnyBitPattern, NoUninit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render_data::DrawFrame;

/// Per-vertex attribute buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BufferId {
    PointX,
    PointY,
    PointMarker,
    PointSize,
    PointColor,
    PointObject,
    EdgeVertices,
    EdgeItem,
    EdgeObject,
    ShapeFill,
    ShapeStroke,
}

impl BufferId {
    pub const POINTS: [BufferId; 6] = [
        BufferId::PointX,
        BufferId::PointY,
        BufferId::PointMarker,
        BufferId::PointSize,
        BufferId::PointColor,
        BufferId::PointObject,
    ];
    pub const SHAPE_EDGES: [BufferId; 3] =
        [BufferId::EdgeVertices, BufferId::EdgeItem, BufferId::EdgeObject];
    pub const SHAPE_ITEMS: [BufferId; 2] = [BufferId::ShapeFill, BufferId::ShapeStroke];

    /// Bytes per element.
    pub const fn element_size(self) -> usize {
        match self {
            BufferId::PointMarker | BufferId::PointObject | BufferId::EdgeObject => 1,
            BufferId::EdgeVertices => 16,
            _ => 4,
        }
    }
}

/// Per-object transform tables, one slot per rendered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformTable {
    Points,
    Shapes,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    #[error("write of {len} elements at {offset} overflows {buffer:?} ({capacity} elements)")]
    OutOfBounds {
        buffer: BufferId,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("{bytes} bytes is not a whole number of {buffer:?} elements")]
    Misaligned { buffer: BufferId, bytes: usize },

    #[error("transform slot {slot} is outside the {capacity}-slot table")]
    SlotOutOfRange { slot: usize, capacity: usize },

    #[error("graphics context lost")]
    ContextLost,
}

pub trait GpuDevice {
    /// Reallocates `buffer` to exactly `elements` elements. Contents are
    /// undefined afterwards.
    fn resize_buffer(&mut self, buffer: BufferId, elements: usize) -> Result<(), GpuError>;

    /// Writes `bytes` starting at element `offset`.
    fn write_buffer(&mut self, buffer: BufferId, offset: usize, bytes: &[u8])
        -> Result<(), GpuError>;

    /// Writes one slot of a transform table (three std140-padded columns).
    fn write_transform(
        &mut self,
        table: TransformTable,
        slot: usize,
        columns: &[f32; 12],
    ) -> Result<(), GpuError>;

    fn draw(&mut self, frame: &DrawFrame) -> Result<(), GpuError>;

    /// Releases every resource.
    fn destroy(&mut self);
}

/// One recorded device call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Upload {
    Resize {
        buffer: BufferId,
        elements: usize,
    },
    Write {
        buffer: BufferId,
        offset: usize,
        len: usize,
    },
    Transform {
        table: TransformTable,
        slot: usize,
    },
}

/// A [`GpuDevice`] that mirrors every buffer in host memory.
#[derive(Debug)]
pub struct HostDevice {
    transform_slots: usize,
    buffers: BTreeMap<BufferId, Vec<u8>>,
    transforms: BTreeMap<TransformTable, Vec<[f32; 12]>>,
    uploads: Vec<Upload>,
    frames: Vec<DrawFrame>,
    lost: bool,
}

impl HostDevice {
    pub fn new(transform_slots: usize) -> Self {
        Self {
            transform_slots,
            buffers: BTreeMap::new(),
            transforms: BTreeMap::new(),
            uploads: Vec::new(),
            frames: Vec::new(),
            lost: false,
        }
    }

    pub fn buffer_bytes(&self, buffer: BufferId) -> &[u8] {
        self.buffers
            .get(&buffer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Buffer contents reinterpreted as `T`.
    pub fn read<T: AnyBitPattern + NoUninit>(&self, buffer: BufferId) -> Vec<T> {
        bytemuck::pod_collect_to_vec(self.buffer_bytes(buffer))
    }

    pub fn capacity(&self, buffer: BufferId) -> usize {
        self.buffer_bytes(buffer).len() / buffer.element_size()
    }

    pub fn transform(&self, table: TransformTable, slot: usize) -> Option<&[f32; 12]> {
        self.transforms.get(&table).and_then(|t| t.get(slot))
    }

    pub fn uploads(&self) -> &[Upload] {
        &self.uploads
    }

    pub fn take_uploads(&mut self) -> Vec<Upload> {
        std::mem::take(&mut self.uploads)
    }

    /// Element ranges written to `buffer`, in upload order.
    pub fn writes_to(&self, buffer: BufferId) -> Vec<(usize, usize)> {
        self.uploads
            .iter()
            .filter_map(|upload| match upload {
                Upload::Write {
                    buffer: b,
                    offset,
                    len,
                } if *b == buffer => Some((*offset, *len)),
                _ => None,
            })
            .collect()
    }

    pub fn frames(&self) -> &[DrawFrame] {
        &self.frames
    }

    /// Simulates context loss: every mirror is dropped and further calls fail
    /// until [`restore_context`](Self::restore_context).
    pub fn lose_context(&mut self) {
        self.lost = true;
        self.buffers.clear();
        self.transforms.clear();
    }

    pub fn restore_context(&mut self) {
        self.lost = false;
    }

    fn check_context(&self) -> Result<(), GpuError> {
        if self.lost {
            Err(GpuError::ContextLost)
        } else {
            Ok(())
        }
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new(crate::MAX_OBJECTS)
    }
}

impl GpuDevice for HostDevice {
    fn resize_buffer(&mut self, buffer: BufferId, elements: usize) -> Result<(), GpuError> {
        self.check_context()?;
        self.buffers
            .insert(buffer, vec![0; elements * buffer.element_size()]);
        self.uploads.push(Upload::Resize { buffer, elements });
        Ok(())
    }

    fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), GpuError> {
        self.check_context()?;
        let size = buffer.element_size();
        if bytes.len() % size != 0 {
            return Err(GpuError::Misaligned {
                buffer,
                bytes: bytes.len(),
            });
        }
        let len = bytes.len() / size;
        let data = self.buffers.entry(buffer).or_default();
        let capacity = data.len() / size;
        if offset + len > capacity {
            return Err(GpuError::OutOfBounds {
                buffer,
                offset,
                len,
                capacity,
            });
        }
        data[offset * size..(offset + len) * size].copy_from_slice(bytes);
        self.uploads.push(Upload::Write {
            buffer,
            offset,
            len,
        });
        Ok(())
    }

    fn write_transform(
        &mut self,
        table: TransformTable,
        slot: usize,
        columns: &[f32; 12],
    ) -> Result<(), GpuError> {
        self.check_context()?;
        if slot >= self.transform_slots {
            return Err(GpuError::SlotOutOfRange {
                slot,
                capacity: self.transform_slots,
            });
        }
        let capacity = self.transform_slots;
        let slots = self
            .transforms
            .entry(table)
            .or_insert_with(|| vec![[0.0; 12]; capacity]);
        slots[slot] = *columns;
        self.uploads.push(Upload::Transform { table, slot });
        Ok(())
    }

    fn draw(&mut self, frame: &DrawFrame) -> Result<(), GpuError> {
        self.check_context()?;
        self.frames.push(frame.clone());
        Ok(())
    }

    fn destroy(&mut self) {
        self.buffers.clear();
        self.transforms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_range_write() {
        let mut device = HostDevice::new(4);
        device.resize_buffer(BufferId::PointSize, 4).unwrap();
        let values = [1.5f32, 2.5];
        device
            .write_buffer(BufferId::PointSize, 2, bytemuck::cast_slice(&values))
            .unwrap();
        assert_eq!(device.read::<f32>(BufferId::PointSize), vec![0.0, 0.0, 1.5, 2.5]);
        assert_eq!(device.writes_to(BufferId::PointSize), vec![(2, 2)]);
    }

    #[test]
    fn test_write_bounds_are_checked() {
        let mut device = HostDevice::new(4);
        device.resize_buffer(BufferId::PointObject, 4).unwrap();
        let err = device
            .write_buffer(BufferId::PointObject, 2, &[1, 1, 1, 1])
            .unwrap_err();
        assert!(matches!(err, GpuError::OutOfBounds { capacity: 4, .. }));
        let err = device
            .write_buffer(BufferId::PointColor, 0, &[1, 2, 3])
            .unwrap_err();
        assert!(matches!(err, GpuError::Misaligned { bytes: 3, .. }));
    }

    #[test]
    fn test_transform_slots() {
        let mut device = HostDevice::new(2);
        device
            .write_transform(TransformTable::Points, 1, &[1.0; 12])
            .unwrap();
        assert_eq!(device.transform(TransformTable::Points, 1), Some(&[1.0; 12]));
        assert!(device
            .write_transform(TransformTable::Points, 2, &[1.0; 12])
            .is_err());
    }

    #[test]
    fn test_lost_context_rejects_calls() {
        let mut device = HostDevice::new(2);
        device.resize_buffer(BufferId::PointX, 4).unwrap();
        device.lose_context();
        assert_eq!(device.capacity(BufferId::PointX), 0);
        assert_eq!(
            device.resize_buffer(BufferId::PointX, 4),
            Err(GpuError::ContextLost)
        );
        device.restore_context();
        assert!(device.resize_buffer(BufferId::PointX, 4).is_ok());
    }
}
