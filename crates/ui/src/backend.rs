use egui::{Align2, CornerRadius, FontId, Pos2, Stroke, StrokeKind};
use flamescope_core::renderer::{BatchHandle, GpuBackend, RectBatch, RenderError};
use flamescope_protocol::{DrawPass, Fill, Rect, RenderCommand, TextAlign, Vec2};
use rustc_hash::FxHashMap;

use crate::theme::{self, ThemeMode};

/// Rects narrower than this many points are not painted.
const MIN_PAINT_WIDTH: f32 = 0.3;

/// [`GpuBackend`] on top of egui's painter.
///
/// Batches are kept in memory and the last submitted frame is replayed into
/// the painter every egui frame, so the core only produces a new submission
/// when something actually changed.
#[derive(Debug)]
pub struct EguiBackend {
    next_handle: u64,
    batches: FxHashMap<BatchHandle, RectBatch>,
    frame: Vec<DrawPass>,
    physical_size: Vec2,
    pixels_per_point: f32,
}

impl EguiBackend {
    pub fn new() -> Self {
        Self {
            next_handle: 0,
            batches: FxHashMap::default(),
            frame: Vec::new(),
            physical_size: Vec2::ZERO,
            pixels_per_point: 1.0,
        }
    }

    pub fn live_batches(&self) -> usize {
        self.batches.len()
    }

    /// Paint the last submitted frame with its canvas origin at `origin`.
    pub fn paint(&self, painter: &egui::Painter, origin: Pos2, mode: ThemeMode) {
        let canvas = egui::Rect::from_min_size(
            origin,
            egui::vec2(
                self.physical_size.x as f32 / self.pixels_per_point,
                self.physical_size.y as f32 / self.pixels_per_point,
            ),
        );
        let base = painter.with_clip_rect(painter.clip_rect().intersect(canvas));
        let mut replay = Replay {
            painter: base.clone(),
            base,
            origin,
            ppp: self.pixels_per_point,
            mode,
        };
        for pass in &self.frame {
            for command in &pass.commands {
                replay.command(command, &self.batches);
            }
            replay.painter = replay.base.clone();
        }
    }
}

impl Default for EguiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for EguiBackend {
    fn create_batch(&mut self, batch: RectBatch) -> Result<BatchHandle, RenderError> {
        self.next_handle += 1;
        let handle = BatchHandle(self.next_handle);
        log::debug!("uploading batch {handle:?} with {} rects", batch.len());
        self.batches.insert(handle, batch);
        Ok(handle)
    }

    fn release_batch(&mut self, handle: BatchHandle) {
        self.batches.remove(&handle);
    }

    fn reconfigure(&mut self, physical_size: Vec2, device_pixel_ratio: f64) {
        self.physical_size = physical_size;
        self.pixels_per_point = device_pixel_ratio as f32;
    }

    fn submit(&mut self, passes: &[DrawPass]) -> Result<(), RenderError> {
        for pass in passes {
            for command in &pass.commands {
                if let RenderCommand::DrawBatch { batch, .. } = command
                    && !self.batches.contains_key(&BatchHandle(*batch))
                {
                    return Err(RenderError::UnknownBatch(BatchHandle(*batch)));
                }
            }
        }
        self.frame = passes.to_vec();
        Ok(())
    }
}

/// Painter state while replaying one frame.
struct Replay {
    base: egui::Painter,
    painter: egui::Painter,
    origin: Pos2,
    ppp: f32,
    mode: ThemeMode,
}

impl Replay {
    /// Physical canvas pixels to egui screen points.
    fn rect(&self, r: &Rect) -> egui::Rect {
        let min = self.pos(r.origin);
        egui::Rect::from_min_size(
            min,
            egui::vec2(r.width() as f32 / self.ppp, r.height() as f32 / self.ppp),
        )
    }

    fn pos(&self, p: Vec2) -> Pos2 {
        Pos2::new(
            self.origin.x + p.x as f32 / self.ppp,
            self.origin.y + p.y as f32 / self.ppp,
        )
    }

    fn fill(&self, fill: Fill) -> egui::Color32 {
        match fill {
            Fill::Token(token) => theme::resolve(token, self.mode),
            Fill::Bucket(bucket) => theme::bucket_color(bucket, self.mode),
        }
    }

    fn command(&mut self, command: &RenderCommand, batches: &FxHashMap<BatchHandle, RectBatch>) {
        match command {
            RenderCommand::DrawBatch { batch, transform } => {
                let Some(batch) = batches.get(&BatchHandle(*batch)) else {
                    return;
                };
                let clip = self.painter.clip_rect();
                for item in &batch.rects {
                    let rect = self.rect(&transform.transform_rect(&item.rect));
                    if rect.width() < MIN_PAINT_WIDTH || !clip.intersects(rect) {
                        continue;
                    }
                    // Leave a hairline gap between neighbours.
                    let rect = rect.shrink2(egui::vec2(0.0, 0.5));
                    self.painter
                        .rect_filled(rect, CornerRadius::ZERO, self.fill(item.fill));
                }
            }

            RenderCommand::DrawRect { rect, fill } => {
                let rect = self.rect(rect);
                self.painter
                    .rect_filled(rect, CornerRadius::ZERO, self.fill(*fill));
            }

            RenderCommand::StrokeRect { rect, color, width } => {
                let rect = self.rect(rect);
                self.painter.rect_stroke(
                    rect,
                    CornerRadius::ZERO,
                    Stroke::new(*width as f32 / self.ppp, theme::resolve(*color, self.mode)),
                    StrokeKind::Inside,
                );
            }

            RenderCommand::DrawText {
                position,
                text,
                color,
                font_size,
                align,
                max_width,
            } => {
                let size = *font_size as f32 / self.ppp;
                if size < 1.0 {
                    return;
                }
                let color = theme::resolve(*color, self.mode);
                let galley =
                    self.painter
                        .layout_no_wrap(text.clone(), FontId::proportional(size), color);
                if let Some(max) = max_width
                    && galley.size().x > *max as f32 / self.ppp
                {
                    return;
                }
                let anchor = match align {
                    TextAlign::Left => Align2::LEFT_CENTER,
                    TextAlign::Center => Align2::CENTER_CENTER,
                    TextAlign::Right => Align2::RIGHT_CENTER,
                };
                let rect = anchor.anchor_size(self.pos(*position), galley.size());
                self.painter.galley(rect.min, galley, color);
            }

            RenderCommand::SetClip { rect } => {
                let clip = self.base.clip_rect().intersect(self.rect(rect));
                self.painter = self.base.with_clip_rect(clip);
            }

            RenderCommand::ClearClip => {
                self.painter = self.base.clone();
            }
        }
    }
}
