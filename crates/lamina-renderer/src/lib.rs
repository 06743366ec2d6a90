//! # Lamina Renderer
//!
//! Turns declarative overlay bindings into GPU render state.
//!
//! The [`resolve`] module maps value/column/group/random bindings onto dense,
//! index-aligned attribute arrays. The points and shapes synchronizers pack
//! those arrays into shared per-vertex buffers, one padded slot per rendered
//! instance, and re-upload only the streams whose inputs changed since the
//! previous pass. The [`tiled`] reconciler keeps an external tiled-image
//! viewer in step with image and label bindings whose creation is
//! asynchronous.
//!
//! The graphics backend is reached only through [`GpuDevice`]; the frontend
//! receives a serialisable [`DrawFrame`] per draw.

pub mod context;
pub mod diagnostics;
pub mod dirty;
pub mod gpu;
pub mod points;
pub mod refs;
pub mod render_data;
pub mod resolve;
pub mod shapes;
pub mod sync;
#[cfg(test)]
mod testing;
pub mod tiled;
pub mod viewport;

/// Size of the per-object transform tables, and so the maximum number of
/// simultaneously rendered points (or shapes) instances.
pub const MAX_OBJECTS: usize = 256;

/// Every slot is padded to a multiple of this many elements.
pub const SLOT_ALIGNMENT: usize = 4;

pub use context::{OverlayRenderer, SyncReport};
pub use diagnostics::{Diagnostics, Warning};
pub use gpu::{BufferId, GpuDevice, GpuError, HostDevice, TransformTable, Upload};
pub use points::PointsSynchronizer;
pub use render_data::{DrawFrame, PointsDrawCall, ShapesDrawCall};
pub use resolve::{pack_colors, ResolveError, ResolveOptions, Resolver};
pub use shapes::ShapesSynchronizer;
pub use sync::{SyncContext, SyncError, SyncStats};
pub use tiled::{
    ImageProperties, Ticket, TiledImageKind, TiledImageReconciler, TiledImageRequest,
    TiledImageViewer, TiledReport, TiledStats,
};
pub use viewport::{CanvasSize, Viewport};
