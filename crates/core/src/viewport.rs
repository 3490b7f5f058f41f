use flamescope_protocol::{AffineTransform, Rect, Vec2, clamp_f64};
use serde::{Deserialize, Serialize};

use crate::flamechart::Flamechart;

/// Fixed pixel sizes of the flamechart panes, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSizes {
    /// Height of one stack layer.
    pub frame_height: f64,
    /// Height of the detail panel docked under the main view.
    pub detail_view_height: f64,
    pub minimap_height: f64,
    pub font_size: f64,
}

impl Default for ViewSizes {
    fn default() -> Self {
        Self {
            frame_height: 20.0,
            detail_view_height: 150.0,
            minimap_height: 80.0,
            font_size: 12.0,
        }
    }
}

impl ViewSizes {
    /// Extra layers of vertical slack reserved for the detail panel, plus
    /// one layer of padding.
    pub fn detail_offset(&self) -> f64 {
        if self.frame_height > 0.0 {
            self.detail_view_height / self.frame_height + 1.0
        } else {
            1.0
        }
    }
}

/// Clamp a requested config-space viewport into the chart.
///
/// Width goes through [`Flamechart::clamped_viewport_width`] and height is
/// left as requested. The origin is kept within
/// `x ∈ [0, width - w]` and `y ∈ [-1, max(0, layers - h + detail_offset)]`.
pub fn clamp_config_space_viewport_rect(
    chart: &Flamechart,
    requested: &Rect,
    sizes: &ViewSizes,
) -> Rect {
    let width = chart.clamped_viewport_width(requested.width());
    let height = requested.height();
    let max_x = (chart.total_weight() - width).max(0.0);
    let x = clamp_f64(requested.left(), 0.0, max_x);
    let max_y = (chart.height() as f64 - height + sizes.detail_offset()).max(0.0);
    let y = clamp_f64(requested.top(), -1.0, max_y);
    Rect::from_xywh(x, y, width, height)
}

/// Pan/zoom state of one flamechart pane.
///
/// The view layer owns this and feeds it gestures; the renderer reads the
/// transforms it derives.
#[derive(Debug, Clone, PartialEq)]
pub struct FlamechartViewport {
    config_rect: Rect,
    logical_size: Vec2,
    device_pixel_ratio: f64,
    sizes: ViewSizes,
    inverted: bool,
}

impl FlamechartViewport {
    pub fn new(sizes: ViewSizes) -> Self {
        Self {
            config_rect: Rect::EMPTY,
            logical_size: Vec2::ZERO,
            device_pixel_ratio: 1.0,
            sizes,
            inverted: false,
        }
    }

    pub fn config_rect(&self) -> Rect {
        self.config_rect
    }

    pub fn logical_size(&self) -> Vec2 {
        self.logical_size
    }

    pub fn physical_size(&self) -> Vec2 {
        self.logical_size.times(self.device_pixel_ratio)
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    pub fn sizes(&self) -> &ViewSizes {
        &self.sizes
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Draw layer 0 at the bottom instead of the top.
    pub fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    /// Show the whole width of `chart`, top layer first.
    pub fn reset(&mut self, chart: &Flamechart) {
        let rect = Rect::from_xywh(
            0.0,
            -1.0,
            chart.total_weight(),
            self.visible_layers(),
        );
        self.set_config_space_viewport_rect(chart, &rect);
    }

    /// Clamp and store `requested`. Returns whether the stored rect changed.
    pub fn set_config_space_viewport_rect(&mut self, chart: &Flamechart, requested: &Rect) -> bool {
        let clamped = clamp_config_space_viewport_rect(chart, requested, &self.sizes);
        if clamped == self.config_rect {
            return false;
        }
        self.config_rect = clamped;
        true
    }

    /// Resize the pane. The visible height always shows one layer per
    /// `frame_height` logical pixels; the visible width is preserved.
    pub fn set_logical_space_viewport_size(
        &mut self,
        chart: &Flamechart,
        size: Vec2,
        device_pixel_ratio: f64,
    ) -> bool {
        let resized = size != self.logical_size || device_pixel_ratio != self.device_pixel_ratio;
        self.logical_size = size;
        self.device_pixel_ratio = if device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        let width = if self.config_rect.width() > 0.0 {
            self.config_rect.width()
        } else {
            chart.total_weight()
        };
        let rect = self
            .config_rect
            .with_size(Vec2::new(width, self.visible_layers()));
        self.set_config_space_viewport_rect(chart, &rect) || resized
    }

    /// Apply `transform` to the config rect, then clamp.
    pub fn transform_viewport(&mut self, chart: &Flamechart, transform: &AffineTransform) -> bool {
        let rect = transform.transform_rect(&self.config_rect);
        self.set_config_space_viewport_rect(chart, &rect)
    }

    /// Pan by a logical-pixel delta.
    pub fn pan_by_logical(&mut self, chart: &Flamechart, delta: Vec2) -> bool {
        let delta = self.config_to_logical().inverted().map_or(Vec2::ZERO, |t| {
            let d = t.transform_vector(delta);
            if self.inverted { d.with_y(-d.y) } else { d }
        });
        let rect = self.config_rect.with_origin(self.config_rect.origin + delta);
        self.set_config_space_viewport_rect(chart, &rect)
    }

    /// Zoom horizontally by `multiplier` keeping the config point under
    /// `logical_point` fixed. `multiplier < 1` zooms in.
    pub fn zoom_around_logical(
        &mut self,
        chart: &Flamechart,
        logical_point: Vec2,
        multiplier: f64,
    ) -> bool {
        let Some(anchor) = self.logical_to_config_position(logical_point) else {
            return false;
        };
        let transform = AffineTransform::from_translation(anchor)
            .times(&AffineTransform::from_scale(Vec2::new(multiplier, 1.0)))
            .times(&AffineTransform::from_translation(-anchor));
        self.transform_viewport(chart, &transform)
    }

    pub fn config_to_logical(&self) -> AffineTransform {
        let logical = Rect::new(Vec2::ZERO, self.logical_size);
        AffineTransform::between_rects(&self.config_rect, &logical)
    }

    pub fn logical_to_physical(&self) -> AffineTransform {
        AffineTransform::from_scale(Vec2::new(self.device_pixel_ratio, self.device_pixel_ratio))
    }

    /// Config space to device pixels, flipped vertically when inverted.
    pub fn config_to_physical(&self) -> AffineTransform {
        let transform = self.logical_to_physical().times(&self.config_to_logical());
        if self.inverted {
            AffineTransform::flip_y_within(self.physical_size().y).times(&transform)
        } else {
            transform
        }
    }

    pub fn logical_to_config_position(&self, logical: Vec2) -> Option<Vec2> {
        let logical = if self.inverted {
            logical.with_y(self.logical_size.y - logical.y)
        } else {
            logical
        };
        self.config_to_logical().inverse_transform_position(logical)
    }

    fn visible_layers(&self) -> f64 {
        if self.sizes.frame_height > 0.0 {
            self.logical_size.y / self.sizes.frame_height
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flamechart::LayoutMode;
    use crate::model::{FrameInfo, FrameId, Profile, StackListBuilder, ValueUnit};

    fn chart() -> Flamechart {
        let mut b = StackListBuilder::new();
        let ids: Vec<FrameId> = ["a", "b", "c"]
            .iter()
            .map(|n| b.frame_id(&FrameInfo::named(*n)))
            .collect();
        b.append_sample(&ids, 60.0);
        b.append_sample(&ids[..1], 39.0);
        b.append_sample(&ids[..2], 1.0);
        let p: Profile = b.build("p", ValueUnit::None);
        Flamechart::layout(&p, LayoutMode::Chronological)
    }

    #[test]
    fn clamp_holds_for_hostile_requests() {
        let chart = chart();
        let sizes = ViewSizes::default();
        let values = [
            f64::NAN,
            f64::NEG_INFINITY,
            -1e12,
            -5.0,
            -1.0,
            0.0,
            0.5,
            3.0,
            50.0,
            99.0,
            1e12,
            f64::INFINITY,
        ];
        for &x in &values {
            for &y in &values {
                for &w in &values {
                    let r = clamp_config_space_viewport_rect(
                        &chart,
                        &Rect::from_xywh(x, y, w, 10.0),
                        &sizes,
                    );
                    assert!(r.left() >= 0.0, "{r:?}");
                    assert!(r.left() <= chart.total_weight() - r.width(), "{r:?}");
                    assert!(r.top() >= -1.0, "{r:?}");
                    assert!(r.width() > 0.0 && r.width() <= chart.total_weight());
                    assert_eq!(r.height(), 10.0);
                }
            }
        }
    }

    #[test]
    fn vertical_slack_reserves_detail_panel() {
        let chart = chart();
        let sizes = ViewSizes::default();
        // 3 layers, 2 visible, 150 / 20 + 1 layers of slack.
        let r = clamp_config_space_viewport_rect(
            &chart,
            &Rect::from_xywh(0.0, 100.0, 100.0, 2.0),
            &sizes,
        );
        assert_eq!(r.top(), 3.0 - 2.0 + 8.5);
        let r = clamp_config_space_viewport_rect(
            &chart,
            &Rect::from_xywh(0.0, 100.0, 100.0, 50.0),
            &sizes,
        );
        assert_eq!(r.top(), 0.0);
    }

    #[test]
    fn resize_and_reset_fit_whole_chart() {
        let chart = chart();
        let mut vp = FlamechartViewport::new(ViewSizes::default());
        vp.set_logical_space_viewport_size(&chart, Vec2::new(1000.0, 400.0), 2.0);
        vp.reset(&chart);
        assert_eq!(vp.config_rect(), Rect::from_xywh(0.0, -1.0, 100.0, 20.0));
        assert_eq!(vp.physical_size(), Vec2::new(2000.0, 800.0));

        let t = vp.config_to_physical();
        let root = t.transform_rect(&Rect::from_xywh(0.0, 0.0, 100.0, 1.0));
        assert_eq!(root, Rect::from_xywh(0.0, 40.0, 2000.0, 40.0));
    }

    #[test]
    fn zoom_keeps_anchor_fixed_and_pan_moves_by_pixels() {
        let chart = chart();
        let mut vp = FlamechartViewport::new(ViewSizes::default());
        vp.set_logical_space_viewport_size(&chart, Vec2::new(1000.0, 400.0), 1.0);
        vp.reset(&chart);

        assert!(vp.zoom_around_logical(&chart, Vec2::new(500.0, 0.0), 0.5));
        assert_eq!(vp.config_rect().left(), 25.0);
        assert_eq!(vp.config_rect().width(), 50.0);

        assert!(vp.pan_by_logical(&chart, Vec2::new(100.0, 0.0)));
        assert_eq!(vp.config_rect().left(), 30.0);

        vp.pan_by_logical(&chart, Vec2::new(-1e9, -1e9));
        assert_eq!(vp.config_rect().left(), 0.0);
        assert_eq!(vp.config_rect().top(), -1.0);
    }

    #[test]
    fn inverted_view_flips_vertically() {
        let chart = chart();
        let mut vp = FlamechartViewport::new(ViewSizes::default());
        vp.set_logical_space_viewport_size(&chart, Vec2::new(100.0, 200.0), 1.0);
        vp.reset(&chart);
        vp.set_inverted(true);

        let root = vp
            .config_to_physical()
            .transform_rect(&Rect::from_xywh(0.0, 0.0, 100.0, 1.0));
        assert_eq!(root, Rect::from_xywh(0.0, 160.0, 100.0, 20.0));

        let config = vp.logical_to_config_position(Vec2::new(50.0, 170.0)).unwrap();
        assert_eq!(config.y, 0.5);
    }
}
