//! GPU-backed drawing of flamecharts.
//!
//! Geometry is uploaded once per layout and orientation as a rect batch;
//! each frame only emits the batch under a new transform plus a handful of
//! overlay commands.

pub mod backend;
pub mod cache;
pub mod canvas;
pub mod flamechart_renderer;

pub use backend::{BatchHandle, BatchRect, GpuBackend, HeadlessBackend, RectBatch, RenderError};
pub use cache::{LayoutCache, LayoutKey, RendererCache, RendererKey, ViewSlot};
pub use canvas::{CanvasContext, CanvasId};
pub use flamechart_renderer::{FlamechartRenderer, Orientation, RenderProps, trim_text_mid};
