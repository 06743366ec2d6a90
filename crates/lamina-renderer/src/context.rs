//! Canvas and graphics-context lifecycle.

use log::{debug, info, warn};
use serde::Serialize;

use lamina_core::geometry::BBox;
use lamina_core::scene::Scene;
use lamina_io::{AbortSignal, DataStore};

use crate::diagnostics::{Diagnostics, Warning};
use crate::gpu::{GpuDevice, GpuError};
use crate::points::PointsSynchronizer;
use crate::render_data::DrawFrame;
use crate::shapes::ShapesSynchronizer;
use crate::sync::{SyncContext, SyncError, SyncStats};
use crate::viewport::{CanvasSize, Viewport};
use crate::MAX_OBJECTS;

/// Outcome of one [`OverlayRenderer::synchronize`] pass.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub points: SyncStats,
    pub shapes: SyncStats,
    #[serde(skip)]
    pub warnings: Vec<Warning>,
}

/// Owns the GPU device and keeps it in step with a scene.
///
/// Callers must cancel the signal of a running pass before starting the
/// next one.
#[derive(Debug)]
pub struct OverlayRenderer<D: GpuDevice> {
    device: D,
    viewport: Viewport,
    points: PointsSynchronizer,
    shapes: ShapesSynchronizer,
    context_lost: bool,
}

impl<D: GpuDevice> OverlayRenderer<D> {
    pub fn new(device: D, canvas: CanvasSize) -> Self {
        Self::with_capacity(device, canvas, MAX_OBJECTS)
    }

    /// Renderer drawing at most `capacity` points and `capacity` shapes
    /// objects (clamped to [`MAX_OBJECTS`]).
    pub fn with_capacity(device: D, canvas: CanvasSize, capacity: usize) -> Self {
        Self {
            device,
            viewport: Viewport::new(canvas),
            points: PointsSynchronizer::new(capacity),
            shapes: ShapesSynchronizer::new(capacity),
            context_lost: false,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    /// Brings the GPU buffers in line with `scene`, uploading only streams
    /// whose inputs changed. Warnings of a cancelled pass are discarded.
    pub async fn synchronize(
        &mut self,
        scene: &Scene,
        store: &DataStore,
        signal: &AbortSignal,
    ) -> Result<SyncReport, SyncError> {
        if self.context_lost {
            debug!("graphics context lost, skipping synchronization");
            return Ok(SyncReport::default());
        }
        let ctx = SyncContext {
            layers: &scene.layers,
            maps: &scene.maps,
            store,
            signal,
        };
        let mut diagnostics = Diagnostics::new();
        let result = self.synchronize_all(&ctx, scene, &mut diagnostics).await;
        match result {
            Ok((points, shapes)) => Ok(SyncReport {
                points,
                shapes,
                warnings: diagnostics.flush(),
            }),
            Err(SyncError::Gpu(GpuError::ContextLost)) => {
                self.context_lost();
                Err(SyncError::Gpu(GpuError::ContextLost))
            }
            Err(err) => Err(err),
        }
    }

    async fn synchronize_all(
        &mut self,
        ctx: &SyncContext<'_>,
        scene: &Scene,
        diagnostics: &mut Diagnostics,
    ) -> Result<(SyncStats, SyncStats), SyncError> {
        let points = self
            .points
            .synchronize(&mut self.device, &scene.points, ctx, diagnostics)
            .await?;
        let shapes = self
            .shapes
            .synchronize(&mut self.device, &scene.shapes, ctx, diagnostics)
            .await?;
        Ok((points, shapes))
    }

    /// The frame that [`draw`](Self::draw) submits.
    pub fn frame(&self) -> DrawFrame {
        DrawFrame {
            world_to_clip: self.viewport.world_to_clip().to_padded_columns(),
            pixels_per_unit: self.viewport.pixels_per_unit() as f32,
            canvas_width: self.viewport.canvas.width,
            canvas_height: self.viewport.canvas.height,
            points: self.points.draw_call(),
            shapes: self.shapes.draw_calls(),
        }
    }

    pub fn draw(&mut self) {
        if self.context_lost || self.viewport.canvas.is_empty() {
            return;
        }
        let frame = self.frame();
        if let Err(err) = self.device.draw(&frame) {
            warn!("draw failed: {err}");
            if err == GpuError::ContextLost {
                self.context_lost();
            }
        }
    }

    /// Returns whether the visible rectangle changed.
    pub fn set_viewport(&mut self, rect: BBox) -> bool {
        self.viewport.set_rect(rect)
    }

    /// Returns whether the canvas size changed.
    pub fn resize_canvas(&mut self, size: CanvasSize) -> bool {
        self.viewport.set_canvas(size)
    }

    pub fn fit(&mut self, bbox: &BBox) -> bool {
        self.viewport.fit_bbox(bbox)
    }

    /// Every GPU resource is gone; draws and passes are skipped until
    /// [`context_restored`](Self::context_restored).
    pub fn context_lost(&mut self) {
        if !self.context_lost {
            warn!("graphics context lost");
        }
        self.context_lost = true;
        self.points.invalidate();
        self.shapes.invalidate();
    }

    /// The next [`synchronize`](Self::synchronize) rebuilds every buffer.
    pub fn context_restored(&mut self) {
        info!("graphics context restored");
        self.context_lost = false;
        self.points.invalidate();
        self.shapes.invalidate();
    }

    pub fn destroy(&mut self) {
        self.points.invalidate();
        self.shapes.invalidate();
        self.device.destroy();
    }
}
