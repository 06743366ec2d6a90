use serde::{Deserialize, Serialize};

/// Draw call for every point of every slot. Points are drawn as one
/// instanced range; each point looks up its slot through the object stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsDrawCall {
    pub count: usize,
}

/// Draw call for one shapes slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapesDrawCall {
    pub slot: usize,
    pub edge_offset: usize,
    pub edge_count: usize,
    pub item_offset: usize,
    pub item_count: usize,
    /// Stroke width in screen pixels.
    pub stroke_width: f32,
}

/// Complete description of one frame, handed to [`GpuDevice::draw`].
///
/// [`GpuDevice::draw`]: crate::gpu::GpuDevice::draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawFrame {
    /// World→clip matrix as three padded columns.
    pub world_to_clip: [f32; 12],
    pub pixels_per_unit: f32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub points: Option<PointsDrawCall>,
    pub shapes: Vec<ShapesDrawCall>,
}

impl DrawFrame {
    pub fn is_empty(&self) -> bool {
        self.points.is_none() && self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_serializes_camel_case() {
        let frame = DrawFrame {
            world_to_clip: [0.0; 12],
            pixels_per_unit: 2.0,
            canvas_width: 800,
            canvas_height: 600,
            points: Some(PointsDrawCall { count: 12 }),
            shapes: vec![ShapesDrawCall {
                slot: 0,
                edge_offset: 0,
                edge_count: 8,
                item_offset: 0,
                item_count: 4,
                stroke_width: 1.5,
            }],
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"pixelsPerUnit\":2.0"));
        assert!(json.contains("\"edgeCount\":8"));
        assert!(!frame.is_empty());
    }
}
