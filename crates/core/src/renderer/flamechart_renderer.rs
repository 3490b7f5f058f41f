use std::sync::Arc;

use flamescope_protocol::{
    AffineTransform, DrawPass, Fill, PassLayer, Rect, RenderCommand, TextAlign, ThemeToken, Vec2,
    clamp_f64,
};

use super::backend::{BatchHandle, BatchRect, GpuBackend, RectBatch, RenderError};
use crate::flamechart::{Flamechart, FlamechartFrame};
use crate::model::NodeId;
use crate::search::SearchIndex;
use crate::viewport::FlamechartViewport;

/// Fraction of a layer left empty between a frame and its children.
const ROW_GAP: f64 = 0.05;
/// Labels are skipped on frames narrower than this, in physical pixels.
const MIN_LABEL_WIDTH: f64 = 16.0;
const LABEL_PADDING: f64 = 3.0;
/// Rough glyph advance relative to the font size, used to pre-trim labels.
const GLYPH_ASPECT: f64 = 0.6;

/// Direction layer 0 is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    TopDown,
    BottomUp,
}

/// Per-frame state the view layer hands to the renderer.
pub struct RenderProps<'a> {
    pub viewport: &'a FlamechartViewport,
    /// Top-left of the pane on the canvas, in physical pixels.
    pub origin: Vec2,
    pub search: &'a SearchIndex,
    pub hovered: Option<NodeId>,
    pub selected: Option<NodeId>,
}

/// Cached GPU state for drawing one flamechart onto one canvas.
///
/// The frame rectangles are uploaded once per orientation and redrawn
/// through the viewport transform; only overlays are rebuilt per frame.
#[derive(Debug)]
pub struct FlamechartRenderer {
    chart: Arc<Flamechart>,
    top_down: Option<BatchHandle>,
    bottom_up: Option<BatchHandle>,
}

impl FlamechartRenderer {
    pub fn new(chart: Arc<Flamechart>) -> Self {
        Self {
            chart,
            top_down: None,
            bottom_up: None,
        }
    }

    pub fn chart(&self) -> &Arc<Flamechart> {
        &self.chart
    }

    /// Handles currently held, top-down first.
    pub fn batches(&self) -> Vec<BatchHandle> {
        self.top_down.into_iter().chain(self.bottom_up).collect()
    }

    fn build_batch(&self, orientation: Orientation) -> RectBatch {
        let y_offset = match orientation {
            Orientation::TopDown => 0.0,
            Orientation::BottomUp => ROW_GAP,
        };
        let rects = self
            .chart
            .layers()
            .iter()
            .flatten()
            .map(|frame| BatchRect {
                rect: Rect::from_xywh(
                    frame.start,
                    frame.depth as f64 + y_offset,
                    frame.width(),
                    1.0 - ROW_GAP,
                ),
                fill: Fill::Bucket(frame.color_bucket),
            })
            .collect();
        RectBatch { rects }
    }

    fn batch<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        orientation: Orientation,
    ) -> Result<BatchHandle, RenderError> {
        let cached = match orientation {
            Orientation::TopDown => self.top_down,
            Orientation::BottomUp => self.bottom_up,
        };
        if let Some(handle) = cached {
            return Ok(handle);
        }
        let handle = backend.create_batch(self.build_batch(orientation))?;
        log::debug!("uploaded {orientation:?} batch {handle:?}");
        match orientation {
            Orientation::TopDown => self.top_down = Some(handle),
            Orientation::BottomUp => self.bottom_up = Some(handle),
        }
        Ok(handle)
    }

    /// Frames intersecting the viewport, shallowest layer first.
    fn visible_frames(&self, config: &Rect) -> impl Iterator<Item = &FlamechartFrame> {
        let first = config.top().floor().max(0.0) as usize;
        let last = (config.bottom().ceil().max(0.0) as usize).min(self.chart.height());
        (first..last.max(first))
            .flat_map(move |depth| self.chart.frames_in_range(depth, config.left(), config.right()))
    }

    /// Emit the main pass (fills, search overlay, labels) and the overlay
    /// pass (hover and selection outlines) for one pane.
    pub fn render<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        props: &RenderProps<'_>,
        passes: &mut Vec<DrawPass>,
    ) -> Result<(), RenderError> {
        let viewport = props.viewport;
        let orientation = if viewport.is_inverted() {
            Orientation::BottomUp
        } else {
            Orientation::TopDown
        };
        let batch = self.batch(backend, orientation)?;

        let pane = Rect::new(props.origin, viewport.physical_size());
        let to_physical =
            AffineTransform::from_translation(props.origin).times(&viewport.config_to_physical());
        let dpr = viewport.device_pixel_ratio();
        let font_size = viewport.sizes().font_size * dpr;
        let config = viewport.config_rect();

        let mut main = DrawPass::new(PassLayer::Main, pane);
        main.push(RenderCommand::SetClip { rect: pane });
        main.push(RenderCommand::DrawRect {
            rect: pane,
            fill: Fill::Token(ThemeToken::Background),
        });
        main.push(RenderCommand::DrawBatch {
            batch: batch.0,
            transform: to_physical,
        });

        let mut overlay = DrawPass::new(PassLayer::Overlay, pane);
        overlay.push(RenderCommand::SetClip { rect: pane });

        let search_active = props.search.is_active();
        for frame in self.visible_frames(&config) {
            let rect = to_physical.transform_rect(&Rect::from_xywh(
                frame.start,
                frame.depth as f64,
                frame.width(),
                1.0,
            ));
            if search_active {
                let token = if props.search.matches_node(frame.node) {
                    ThemeToken::SearchHighlight
                } else {
                    ThemeToken::SearchDim
                };
                main.push(RenderCommand::DrawRect {
                    rect,
                    fill: Fill::Token(token),
                });
            }

            let label_width = rect.width() - 2.0 * LABEL_PADDING * dpr;
            if rect.width() >= MIN_LABEL_WIDTH * dpr && label_width > 0.0 {
                let max_chars = (label_width / (font_size * GLYPH_ASPECT)).floor() as usize;
                let name = &self.chart.frame(frame.frame).name;
                let text = trim_text_mid(name, max_chars);
                if !text.is_empty() {
                    main.push(RenderCommand::DrawText {
                        position: Vec2::new(
                            rect.left().max(pane.left()) + LABEL_PADDING * dpr,
                            rect.center().y,
                        ),
                        text,
                        color: ThemeToken::FrameLabel,
                        font_size,
                        align: TextAlign::Left,
                        max_width: Some(label_width),
                    });
                }
            }

            if Some(frame.node) == props.hovered {
                overlay.push(RenderCommand::StrokeRect {
                    rect,
                    color: ThemeToken::HoverOutline,
                    width: dpr,
                });
            }
            if Some(frame.node) == props.selected {
                overlay.push(RenderCommand::StrokeRect {
                    rect,
                    color: ThemeToken::SelectionOutline,
                    width: 2.0 * dpr,
                });
            }
        }

        main.push(RenderCommand::ClearClip);
        overlay.push(RenderCommand::ClearClip);
        passes.push(main);
        passes.push(overlay);
        Ok(())
    }

    /// Whole-chart overview with the main viewport marked. Reuses the
    /// top-down batch.
    pub fn render_minimap<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        area: Rect,
        viewport: &FlamechartViewport,
        passes: &mut Vec<DrawPass>,
    ) -> Result<(), RenderError> {
        let mut pass = DrawPass::new(PassLayer::Minimap, area);
        pass.push(RenderCommand::SetClip { rect: area });
        pass.push(RenderCommand::DrawRect {
            rect: area,
            fill: Fill::Token(ThemeToken::MinimapBackground),
        });

        let whole = Rect::from_xywh(
            0.0,
            0.0,
            self.chart.total_weight(),
            self.chart.height() as f64,
        );
        if !whole.is_empty() && !area.is_empty() {
            let batch = self.batch(backend, Orientation::TopDown)?;
            let transform = AffineTransform::between_rects(&whole, &area);
            pass.push(RenderCommand::DrawBatch {
                batch: batch.0,
                transform,
            });

            let config = viewport.config_rect();
            let left = transform.transform_position(Vec2::new(config.left(), 0.0)).x;
            let right = transform.transform_position(Vec2::new(config.right(), 0.0)).x;
            let left = clamp_f64(left, area.left(), area.right());
            let right = clamp_f64(right, left, area.right());
            let shades = [
                Rect::from_xywh(area.left(), area.top(), left - area.left(), area.height()),
                Rect::from_xywh(right, area.top(), area.right() - right, area.height()),
            ];
            for rect in shades.into_iter().filter(|r| r.width() > 0.0) {
                pass.push(RenderCommand::DrawRect {
                    rect,
                    fill: Fill::Token(ThemeToken::MinimapShade),
                });
            }
            pass.push(RenderCommand::StrokeRect {
                rect: Rect::from_xywh(left, area.top(), right - left, area.height()),
                color: ThemeToken::MinimapViewport,
                width: viewport.device_pixel_ratio(),
            });
        }
        pass.push(RenderCommand::ClearClip);
        passes.push(pass);
        Ok(())
    }

    /// Free the batches. The renderer stays usable and re-uploads lazily.
    pub fn release<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        for handle in self.top_down.take().into_iter().chain(self.bottom_up.take()) {
            backend.release_batch(handle);
        }
    }
}

/// Shorten `text` to at most `max_chars` characters by cutting out the
/// middle, keeping both ends readable.
pub fn trim_text_mid(text: &str, max_chars: usize) -> String {
    let len = text.chars().count();
    if len <= max_chars {
        return text.to_string();
    }
    if max_chars <= 1 {
        return String::new();
    }
    let keep = max_chars - 1;
    let head = keep.div_ceil(2);
    let tail = keep - head;
    let mut out: String = text.chars().take(head).collect();
    out.push('…');
    out.extend(text.chars().skip(len - tail));
    out
}
