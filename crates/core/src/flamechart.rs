//! Layout of a profile into depth-ordered rectangles in config space.
//!
//! Config space has one unit of x per unit of weight and one unit of y per
//! stack layer. A [`Flamechart`] is a pure function of its inputs, so it can
//! be cached on the semantic key of those inputs.

use std::sync::Arc;

use flamescope_protocol::clamp_f64;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::color::color_bucket_for_key;
use crate::model::{CallTree, CallVisitor, Frame, FrameId, FrameTable, NodeId, Profile, ValueUnit};

/// Traversal used to place frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutMode {
    /// Time order: each call where it happened.
    Chronological,
    /// Same-frame siblings merged, heaviest first.
    LeftHeavy,
}

/// Which total defines the chart width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightSource {
    /// Whole timeline, idle time included.
    Total,
    /// Only weight attributed to frames.
    NonIdle,
}

impl LayoutMode {
    pub fn default_weight_source(self) -> WeightSource {
        match self {
            LayoutMode::Chronological => WeightSource::Total,
            LayoutMode::LeftHeavy => WeightSource::NonIdle,
        }
    }
}

/// What a pane shows: a whole-profile layout or one side of the sandwich
/// view around a focal frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Chronological,
    LeftHeavy,
    /// Inverted tree of everything that called the frame.
    Callers(FrameId),
    /// Everything the frame called.
    Callees(FrameId),
}

impl ViewKind {
    pub fn focal_frame(self) -> Option<FrameId> {
        match self {
            ViewKind::Callers(f) | ViewKind::Callees(f) => Some(f),
            ViewKind::Chronological | ViewKind::LeftHeavy => None,
        }
    }

    /// Callers are drawn bottom-up so the focal frame sits next to the
    /// callees view.
    pub fn is_inverted(self) -> bool {
        matches!(self, ViewKind::Callers(_))
    }
}

/// One placed rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct FlamechartFrame {
    /// Node in the tree the layout walked (chronological or grouped).
    pub node: NodeId,
    pub frame: FrameId,
    pub start: f64,
    pub end: f64,
    pub self_weight: f64,
    pub color_bucket: u8,
    pub depth: usize,
}

impl FlamechartFrame {
    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
pub struct Flamechart {
    frames: Arc<FrameTable>,
    unit: ValueUnit,
    layers: Vec<Vec<FlamechartFrame>>,
    total_weight: f64,
    min_frame_width: f64,
}

struct LayoutBuilder<'a, F: Fn(&Frame) -> u8> {
    tree: &'a CallTree,
    frames: &'a FrameTable,
    bucket_fn: F,
    buckets: FxHashMap<FrameId, u8>,
    stack: Vec<f64>,
    layers: Vec<Vec<FlamechartFrame>>,
    min_frame_width: f64,
}

impl<F: Fn(&Frame) -> u8> CallVisitor for LayoutBuilder<'_, F> {
    fn open(&mut self, _node: NodeId, value: f64) {
        self.stack.push(value);
    }

    fn close(&mut self, node: NodeId, value: f64) {
        let Some(start) = self.stack.pop() else {
            return;
        };
        let width = value - start;
        if width <= 0.0 {
            return;
        }
        let depth = self.stack.len();
        let call = self.tree.node(node);
        let bucket = match self.buckets.get(&call.frame) {
            Some(&b) => b,
            None => {
                let b = (self.bucket_fn)(self.frames.frame(call.frame));
                self.buckets.insert(call.frame, b);
                b
            }
        };
        if self.layers.len() <= depth {
            self.layers.resize_with(depth + 1, Vec::new);
        }
        self.layers[depth].push(FlamechartFrame {
            node,
            frame: call.frame,
            start,
            end: value,
            self_weight: call.self_weight,
            color_bucket: bucket,
            depth,
        });
        self.min_frame_width = self.min_frame_width.min(width);
    }
}

impl Flamechart {
    /// Lay out `profile` with the mode's default width and key-hash colors.
    pub fn layout(profile: &Profile, mode: LayoutMode) -> Flamechart {
        Self::layout_with(profile, mode, mode.default_weight_source(), |frame| {
            color_bucket_for_key(&frame.key)
        })
    }

    pub fn layout_with(
        profile: &Profile,
        mode: LayoutMode,
        weight_source: WeightSource,
        bucket_fn: impl Fn(&Frame) -> u8,
    ) -> Flamechart {
        let tree = match mode {
            LayoutMode::Chronological => profile.tree(),
            LayoutMode::LeftHeavy => profile.grouped_tree(),
        };
        let mut builder = LayoutBuilder {
            tree,
            frames: profile.frames(),
            bucket_fn,
            buckets: FxHashMap::default(),
            stack: Vec::new(),
            layers: Vec::new(),
            min_frame_width: f64::INFINITY,
        };
        match mode {
            LayoutMode::Chronological => profile.for_each_call(&mut builder),
            LayoutMode::LeftHeavy => profile.for_each_call_grouped(&mut builder),
        }

        let total_weight = match weight_source {
            WeightSource::Total => profile.total_weight(),
            WeightSource::NonIdle => profile.total_non_idle_weight(),
        };
        let min_frame_width = if builder.min_frame_width.is_finite() {
            builder.min_frame_width
        } else {
            1.0
        };
        log::debug!(
            "laid out {:?} as {mode:?}: {} layers, width {total_weight}",
            profile.id(),
            builder.layers.len()
        );
        Flamechart {
            frames: profile.shared_frames(),
            unit: profile.unit(),
            layers: builder.layers,
            total_weight,
            min_frame_width,
        }
    }

    /// Derive the profile `view` needs, then lay it out.
    ///
    /// Sandwich views are derived from the unflattened profile and flattened
    /// afterwards, so a recursive frame's direct callers and callees survive.
    pub fn for_view(profile: &Profile, view: ViewKind, flatten_recursion: bool) -> Flamechart {
        let flatten = |p: Profile| {
            if flatten_recursion {
                p.with_recursion_flattened()
            } else {
                p
            }
        };
        match view {
            ViewKind::Chronological | ViewKind::LeftHeavy => {
                let mode = if view == ViewKind::LeftHeavy {
                    LayoutMode::LeftHeavy
                } else {
                    LayoutMode::Chronological
                };
                if flatten_recursion {
                    Self::layout(&profile.with_recursion_flattened(), mode)
                } else {
                    Self::layout(profile, mode)
                }
            }
            ViewKind::Callers(frame) => Self::layout(
                &flatten(profile.inverted_for_callers_of(frame)),
                LayoutMode::LeftHeavy,
            ),
            ViewKind::Callees(frame) => {
                Self::layout(&flatten(profile.callees_of(frame)), LayoutMode::LeftHeavy)
            }
        }
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn frame(&self, id: FrameId) -> &Frame {
        self.frames.frame(id)
    }

    pub fn layers(&self) -> &[Vec<FlamechartFrame>] {
        &self.layers
    }

    /// Config-space width.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Number of layers.
    pub fn height(&self) -> usize {
        self.layers.len()
    }

    pub fn min_frame_width(&self) -> f64 {
        self.min_frame_width
    }

    pub fn unit(&self) -> ValueUnit {
        self.unit
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Clamp a requested viewport width so zooming stops at a few of the
    /// narrowest frames and never zooms out past the whole chart.
    pub fn clamped_viewport_width(&self, width: f64) -> f64 {
        let max = self.total_weight.max(self.min_frame_width);
        let min = clamp_f64(3.0 * self.min_frame_width, max / 2f64.powi(40), max);
        clamp_f64(width, min, max)
    }

    /// The frame covering config-space `x` at layer `depth`.
    pub fn frame_at(&self, x: f64, depth: usize) -> Option<&FlamechartFrame> {
        let layer = self.layers.get(depth)?;
        let i = layer.partition_point(|f| f.end <= x);
        layer.get(i).filter(|f| f.start <= x)
    }

    /// Frames at layer `depth` overlapping `[start, end)`.
    pub fn frames_in_range(&self, depth: usize, start: f64, end: f64) -> &[FlamechartFrame] {
        let Some(layer) = self.layers.get(depth) else {
            return &[];
        };
        let lo = layer.partition_point(|f| f.end <= start);
        let hi = layer.partition_point(|f| f.start < end).max(lo);
        &layer[lo..hi]
    }

    pub fn format_value(&self, value: f64) -> String {
        self.unit.format(value)
    }

    /// `"<value> (<percent>)"` for a frame's width.
    pub fn tooltip_label(&self, frame: &FlamechartFrame) -> String {
        let percent = if self.total_weight > 0.0 {
            100.0 * frame.width() / self.total_weight
        } else {
            0.0
        };
        format!(
            "{} ({})",
            self.format_value(frame.width()),
            format_percent(percent)
        )
    }
}

pub fn format_percent(percent: f64) -> String {
    if percent == 100.0 {
        "100%".to_string()
    } else if percent > 99.0 {
        ">99%".to_string()
    } else if percent < 0.01 {
        "<0.01%".to_string()
    } else if percent < 1.0 {
        format!("{percent:.2}%")
    } else if percent < 10.0 {
        format!("{percent:.1}%")
    } else {
        format!("{percent:.0}%")
    }
}
