use flamescope_protocol::{DrawPass, Fill, Rect, Vec2};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Handle to a rect batch resident on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchRect {
    pub rect: Rect,
    pub fill: Fill,
}

/// Rectangles uploaded once, in config space, and drawn any number of
/// times through a transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RectBatch {
    pub rects: Vec<BatchRect>,
}

impl RectBatch {
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("failed to allocate a batch of {rects} rects: {reason}")]
    Allocation { rects: usize, reason: String },
    #[error("unknown batch {0:?}")]
    UnknownBatch(BatchHandle),
    #[error("submission failed: {0}")]
    Submit(String),
}

/// The GPU-facing side of the renderer.
///
/// Implementations own the device resources. Everything above this trait
/// only deals in handles and draw passes.
pub trait GpuBackend {
    fn create_batch(&mut self, batch: RectBatch) -> Result<BatchHandle, RenderError>;

    fn release_batch(&mut self, handle: BatchHandle);

    /// Adapt existing surfaces to a new size in place.
    fn reconfigure(&mut self, physical_size: Vec2, device_pixel_ratio: f64);

    /// Draw one frame. Passes arrive in submission order.
    fn submit(&mut self, passes: &[DrawPass]) -> Result<(), RenderError>;
}

/// In-memory backend: keeps batches in a map and records every submission.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_handle: u64,
    batches: FxHashMap<BatchHandle, RectBatch>,
    submissions: Vec<Vec<DrawPass>>,
    reconfigurations: Vec<(Vec2, f64)>,
    created: usize,
    /// When set, `create_batch` fails.
    pub fail_allocations: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch(&self, handle: BatchHandle) -> Option<&RectBatch> {
        self.batches.get(&handle)
    }

    /// Batches currently alive.
    pub fn live_batches(&self) -> usize {
        self.batches.len()
    }

    /// Batches ever created.
    pub fn created_batches(&self) -> usize {
        self.created
    }

    pub fn submissions(&self) -> &[Vec<DrawPass>] {
        &self.submissions
    }

    pub fn reconfigurations(&self) -> &[(Vec2, f64)] {
        &self.reconfigurations
    }
}

impl GpuBackend for HeadlessBackend {
    fn create_batch(&mut self, batch: RectBatch) -> Result<BatchHandle, RenderError> {
        if self.fail_allocations {
            return Err(RenderError::Allocation {
                rects: batch.len(),
                reason: "allocation disabled".into(),
            });
        }
        self.next_handle += 1;
        let handle = BatchHandle(self.next_handle);
        self.batches.insert(handle, batch);
        self.created += 1;
        Ok(handle)
    }

    fn release_batch(&mut self, handle: BatchHandle) {
        self.batches.remove(&handle);
    }

    fn reconfigure(&mut self, physical_size: Vec2, device_pixel_ratio: f64) {
        self.reconfigurations.push((physical_size, device_pixel_ratio));
    }

    fn submit(&mut self, passes: &[DrawPass]) -> Result<(), RenderError> {
        self.submissions.push(passes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_tracks_batch_lifetimes() {
        let mut backend = HeadlessBackend::new();
        let a = backend.create_batch(RectBatch::default()).unwrap();
        let b = backend.create_batch(RectBatch::default()).unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.live_batches(), 2);
        backend.release_batch(a);
        assert_eq!(backend.live_batches(), 1);
        assert!(backend.batch(a).is_none());
        assert_eq!(backend.created_batches(), 2);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut backend = HeadlessBackend {
            fail_allocations: true,
            ..HeadlessBackend::default()
        };
        assert!(matches!(
            backend.create_batch(RectBatch::default()),
            Err(RenderError::Allocation { rects: 0, .. })
        ));
        assert_eq!(backend.live_batches(), 0);
    }
}
