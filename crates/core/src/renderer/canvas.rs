use flamescope_protocol::{DrawPass, Vec2};

use super::backend::{GpuBackend, RenderError};

/// Identity of one canvas context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanvasId(pub u32);

/// The shared drawing surface behind every visible pane.
///
/// Drawing is damage driven: nothing reaches the backend unless
/// [`CanvasContext::request_frame`] was called since the last submission,
/// and each animation frame produces at most one submission.
#[derive(Debug)]
pub struct CanvasContext<B: GpuBackend> {
    id: CanvasId,
    backend: B,
    logical_size: Vec2,
    device_pixel_ratio: f64,
    dirty: bool,
    submitted_frames: u64,
}

impl<B: GpuBackend> CanvasContext<B> {
    pub fn new(id: CanvasId, backend: B) -> Self {
        Self {
            id,
            backend,
            logical_size: Vec2::ZERO,
            device_pixel_ratio: 1.0,
            dirty: true,
            submitted_frames: 0,
        }
    }

    pub fn id(&self) -> CanvasId {
        self.id
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn logical_size(&self) -> Vec2 {
        self.logical_size
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    pub fn physical_size(&self) -> Vec2 {
        self.logical_size.times(self.device_pixel_ratio)
    }

    pub fn request_frame(&mut self) {
        self.dirty = true;
    }

    pub fn needs_frame(&self) -> bool {
        self.dirty
    }

    pub fn submitted_frames(&self) -> u64 {
        self.submitted_frames
    }

    /// Follow a container resize. Existing backend resources are
    /// reconfigured in place; nothing is reallocated.
    pub fn resize(&mut self, logical_size: Vec2, device_pixel_ratio: f64) {
        if logical_size == self.logical_size && device_pixel_ratio == self.device_pixel_ratio {
            return;
        }
        self.logical_size = logical_size;
        self.device_pixel_ratio = device_pixel_ratio;
        self.backend
            .reconfigure(self.physical_size(), device_pixel_ratio);
        self.request_frame();
    }

    /// Run `draw` and submit its passes, minimap first, then main views,
    /// then overlays. Does nothing unless a frame was requested. A failed
    /// frame is dropped, not retried.
    pub fn on_animation_frame<F>(&mut self, draw: F) -> Result<bool, RenderError>
    where
        F: FnOnce(&mut B, &mut Vec<DrawPass>) -> Result<(), RenderError>,
    {
        if !self.dirty {
            return Ok(false);
        }
        self.dirty = false;

        let mut passes = Vec::new();
        draw(&mut self.backend, &mut passes)?;
        passes.sort_by_key(|pass| pass.layer);
        self.backend.submit(&passes)?;
        self.submitted_frames += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::HeadlessBackend;
    use flamescope_protocol::{PassLayer, Rect};

    fn pass(layer: PassLayer, tag: f64) -> DrawPass {
        DrawPass::new(layer, Rect::from_xywh(tag, 0.0, 1.0, 1.0))
    }

    #[test]
    fn submits_once_per_requested_frame() {
        let mut canvas = CanvasContext::new(CanvasId(1), HeadlessBackend::new());
        assert_eq!(canvas.on_animation_frame(|_, _| Ok(())), Ok(true));
        assert_eq!(canvas.on_animation_frame(|_, _| Ok(())), Ok(false));
        assert_eq!(canvas.on_animation_frame(|_, _| Ok(())), Ok(false));

        canvas.request_frame();
        canvas.request_frame();
        assert_eq!(canvas.on_animation_frame(|_, _| Ok(())), Ok(true));
        assert_eq!(canvas.backend().submissions().len(), 2);
        assert_eq!(canvas.submitted_frames(), 2);
    }

    #[test]
    fn passes_are_ordered_by_layer_stably() {
        let mut canvas = CanvasContext::new(CanvasId(1), HeadlessBackend::new());
        canvas
            .on_animation_frame(|_, passes| {
                passes.push(pass(PassLayer::Overlay, 0.0));
                passes.push(pass(PassLayer::Main, 1.0));
                passes.push(pass(PassLayer::Minimap, 2.0));
                passes.push(pass(PassLayer::Main, 3.0));
                Ok(())
            })
            .unwrap();
        let submitted: Vec<(PassLayer, f64)> = canvas.backend().submissions()[0]
            .iter()
            .map(|p| (p.layer, p.viewport.left()))
            .collect();
        assert_eq!(
            submitted,
            vec![
                (PassLayer::Minimap, 2.0),
                (PassLayer::Main, 1.0),
                (PassLayer::Main, 3.0),
                (PassLayer::Overlay, 0.0),
            ]
        );
    }

    #[test]
    fn failed_frame_is_not_retried() {
        let mut canvas = CanvasContext::new(CanvasId(1), HeadlessBackend::new());
        let failed = canvas.on_animation_frame(|_, _| Err(RenderError::Submit("lost".into())));
        assert!(failed.is_err());
        assert_eq!(canvas.on_animation_frame(|_, _| Ok(())), Ok(false));
        assert!(canvas.backend().submissions().is_empty());
    }

    #[test]
    fn resize_reconfigures_in_place() {
        let mut canvas = CanvasContext::new(CanvasId(1), HeadlessBackend::new());
        canvas.on_animation_frame(|_, _| Ok(())).unwrap();

        canvas.resize(Vec2::new(400.0, 300.0), 2.0);
        canvas.resize(Vec2::new(400.0, 300.0), 2.0);
        assert_eq!(
            canvas.backend().reconfigurations(),
            &[(Vec2::new(800.0, 600.0), 2.0)]
        );
        assert!(canvas.needs_frame());
        assert_eq!(canvas.backend().created_batches(), 0);
    }
}
