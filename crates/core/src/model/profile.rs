use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::builder::{EventedBuilder, StackListBuilder};
use super::call_tree::{CallTree, CallVisitor, NodeId, Sample};
use super::frame::{FrameId, FrameTable};
use super::symbols::{SymbolRemapper, demangle_name};

static NEXT_PROFILE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one profile instance. Every construction and every shallow
/// clone gets a fresh id, which is what layout caches key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileId(pub u64);

impl ProfileId {
    fn fresh() -> Self {
        Self(NEXT_PROFILE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Unit of a profile's weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueUnit {
    #[default]
    None,
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Bytes,
}

impl ValueUnit {
    /// Human-readable rendering of `value` in this unit.
    pub fn format(self, value: f64) -> String {
        match self {
            ValueUnit::None => format_count(value),
            ValueUnit::Nanoseconds => format_nanos(value),
            ValueUnit::Microseconds => format_nanos(value * 1e3),
            ValueUnit::Milliseconds => format_nanos(value * 1e6),
            ValueUnit::Seconds => format_nanos(value * 1e9),
            ValueUnit::Bytes => format_bytes(value),
        }
    }
}

fn format_count(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn format_nanos(ns: f64) -> String {
    let abs = ns.abs();
    if abs >= 3.6e12 {
        format!("{:.2}h", ns / 3.6e12)
    } else if abs >= 6e10 {
        format!("{:.2}min", ns / 6e10)
    } else if abs >= 1e9 {
        format!("{:.2}s", ns / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}ms", ns / 1e6)
    } else if abs >= 1e3 {
        format!("{:.2}µs", ns / 1e3)
    } else {
        format!("{ns:.0}ns")
    }
}

fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    let abs = bytes.abs();
    if abs >= KB * KB * KB {
        format!("{:.2} GB", bytes / (KB * KB * KB))
    } else if abs >= KB * KB {
        format!("{:.2} MB", bytes / (KB * KB))
    } else if abs >= KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{bytes:.0} B")
    }
}

/// Aggregate numbers for one frame across a whole profile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Self weight summed over every occurrence.
    pub self_weight: f64,
    /// Total weight summed over outermost occurrences, so recursion is not
    /// counted twice.
    pub total_weight: f64,
    pub occurrences: usize,
}

/// An immutable weighted call forest plus its chronological sample
/// timeline.
///
/// The tree, timeline and lazily derived grouped tree are shared between
/// shallow clones. Only the frame table may diverge, copy-on-write, when a
/// clone renames its frames.
#[derive(Debug)]
pub struct Profile {
    id: ProfileId,
    name: String,
    unit: ValueUnit,
    frames: Arc<FrameTable>,
    tree: Arc<CallTree>,
    samples: Arc<[Sample]>,
    total_weight: f64,
    grouped: Arc<OnceLock<CallTree>>,
}

impl Profile {
    pub(crate) fn from_parts(
        name: String,
        unit: ValueUnit,
        frames: Arc<FrameTable>,
        tree: CallTree,
        samples: Vec<Sample>,
    ) -> Self {
        let total_weight = samples.iter().map(|s| s.weight).sum();
        Self {
            id: ProfileId::fresh(),
            name,
            unit,
            frames,
            tree: Arc::new(tree),
            samples: samples.into(),
            total_weight,
            grouped: Arc::new(OnceLock::new()),
        }
    }

    pub fn id(&self) -> ProfileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn unit(&self) -> ValueUnit {
        self.unit
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn shared_frames(&self) -> Arc<FrameTable> {
        Arc::clone(&self.frames)
    }

    /// Chronological (append-order) call tree.
    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    /// Call tree with same-frame siblings merged. Built on first use.
    pub fn grouped_tree(&self) -> &CallTree {
        self.grouped.get_or_init(|| {
            log::debug!("building grouped tree for {:?}", self.id);
            self.tree.grouped().0
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Weight of the whole timeline, idle time included.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Weight attributed to some frame.
    pub fn total_non_idle_weight(&self) -> f64 {
        self.tree.roots_total()
    }

    pub fn max_depth(&self) -> usize {
        self.tree.max_depth()
    }

    /// Replay the timeline, opening and closing each call of the
    /// chronological tree at cumulative weight values.
    pub fn for_each_call<V: CallVisitor + ?Sized>(&self, visitor: &mut V) {
        let mut stack: Vec<NodeId> = Vec::new();
        let mut path: Vec<NodeId> = Vec::new();
        let mut value = 0.0;

        for sample in self.samples.iter() {
            path.clear();
            if let Some(node) = sample.node {
                path.extend(self.tree.ancestors(node));
                path.reverse();
            }
            let common = stack
                .iter()
                .zip(&path)
                .take_while(|(a, b)| a == b)
                .count();
            while stack.len() > common {
                if let Some(node) = stack.pop() {
                    visitor.close(node, value);
                }
            }
            for &node in &path[common..] {
                visitor.open(node, value);
                stack.push(node);
            }
            value += sample.weight;
        }
        while let Some(node) = stack.pop() {
            visitor.close(node, value);
        }
    }

    /// Depth-first walk of the grouped tree. Children are visited heaviest
    /// first, ties keeping first-occurrence order, and each starts where its
    /// previous sibling ended. Node ids refer to [`Profile::grouped_tree`].
    pub fn for_each_call_grouped<V: CallVisitor + ?Sized>(&self, visitor: &mut V) {
        enum Step {
            Enter(NodeId, f64),
            Exit(NodeId, f64),
        }

        fn schedule(work: &mut Vec<Step>, tree: &CallTree, ids: &[NodeId], start: f64) {
            let mut ordered = ids.to_vec();
            ordered.sort_by(|a, b| {
                tree.node(*b)
                    .total_weight
                    .total_cmp(&tree.node(*a).total_weight)
            });
            let mut placed = Vec::with_capacity(ordered.len());
            let mut offset = start;
            for id in ordered {
                placed.push((id, offset));
                offset += tree.node(id).total_weight;
            }
            work.extend(placed.into_iter().rev().map(|(id, s)| Step::Enter(id, s)));
        }

        let tree = self.grouped_tree();
        let mut work = Vec::new();
        schedule(&mut work, tree, tree.roots(), 0.0);
        while let Some(step) = work.pop() {
            match step {
                Step::Enter(id, start) => {
                    visitor.open(id, start);
                    let node = tree.node(id);
                    work.push(Step::Exit(id, start + node.total_weight));
                    schedule(&mut work, tree, &node.children, start);
                }
                Step::Exit(id, end) => visitor.close(id, end),
            }
        }
    }

    /// Occurrences of `frame` with no ancestor of the same frame, in
    /// depth-first order.
    pub fn outermost_occurrences(&self, frame: FrameId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut work: Vec<NodeId> = self.tree.roots().iter().rev().copied().collect();
        while let Some(id) = work.pop() {
            let node = self.tree.node(id);
            if node.frame == frame {
                found.push(id);
            } else {
                work.extend(node.children.iter().rev().copied());
            }
        }
        found
    }

    /// Callers view of `frame`: one sample `[frame, parent, grandparent, ..]`
    /// per outermost occurrence, weighted by that occurrence's total.
    pub fn inverted_for_callers_of(&self, frame: FrameId) -> Profile {
        let mut builder = StackListBuilder::with_frames(self.shared_frames());
        let mut stack = Vec::new();
        for occurrence in self.outermost_occurrences(frame) {
            stack.clear();
            stack.extend(
                self.tree
                    .ancestors(occurrence)
                    .map(|n| self.tree.node(n).frame),
            );
            builder.append_sample(&stack, self.tree.node(occurrence).total_weight);
        }
        builder.build(self.name.clone(), self.unit)
    }

    /// Callees view of `frame`: the subtrees below every outermost
    /// occurrence, replayed as one tree rooted at `frame`.
    pub fn callees_of(&self, frame: FrameId) -> Profile {
        let mut builder = StackListBuilder::with_frames(self.shared_frames());
        for occurrence in self.outermost_occurrences(frame) {
            let mut stack: Vec<FrameId> = Vec::new();
            // (node, depth below the occurrence)
            let mut work = vec![(occurrence, 0usize)];
            while let Some((id, depth)) = work.pop() {
                let node = self.tree.node(id);
                stack.truncate(depth);
                stack.push(node.frame);
                builder.append_sample(&stack, node.self_weight);
                work.extend(node.children.iter().rev().map(|&c| (c, depth + 1)));
            }
        }
        builder.build(self.name.clone(), self.unit)
    }

    /// Collapse recursion: a call to a frame that is already on the stack is
    /// folded into the outer call. Total weight is unchanged and depth can
    /// only shrink.
    pub fn with_recursion_flattened(&self) -> Profile {
        struct Flattener<'a> {
            tree: &'a CallTree,
            builder: EventedBuilder,
            on_stack: Vec<u32>,
            entered: Vec<bool>,
        }

        impl CallVisitor for Flattener<'_> {
            fn open(&mut self, node: NodeId, value: f64) {
                let frame = self.tree.node(node).frame;
                let depth = &mut self.on_stack[frame.index()];
                self.entered.push(*depth == 0);
                if *depth == 0 {
                    self.builder.push(frame, value);
                }
                *depth += 1;
            }

            fn close(&mut self, node: NodeId, value: f64) {
                let frame = self.tree.node(node).frame;
                let depth = &mut self.on_stack[frame.index()];
                *depth = depth.saturating_sub(1);
                if self.entered.pop() == Some(true) {
                    self.builder.pop(value);
                }
            }
        }

        let mut flattener = Flattener {
            tree: &self.tree,
            builder: EventedBuilder::with_frames(self.shared_frames(), 0.0),
            on_stack: vec![0; self.frames.len()],
            entered: Vec::new(),
        };
        self.for_each_call(&mut flattener);
        flattener
            .builder
            .finish(self.name.clone(), self.unit, self.total_weight)
    }

    /// A new profile sharing this one's tree, timeline and frames, with its
    /// own identity.
    pub fn shallow_clone(&self) -> Profile {
        Profile {
            id: ProfileId::fresh(),
            name: self.name.clone(),
            unit: self.unit,
            frames: Arc::clone(&self.frames),
            tree: Arc::clone(&self.tree),
            samples: Arc::clone(&self.samples),
            total_weight: self.total_weight,
            grouped: Arc::clone(&self.grouped),
        }
    }

    /// Rename every frame the remapper knows. Keys, tree and weights are
    /// untouched. Returns the number of renamed frames.
    pub fn remap_symbols(&mut self, remapper: &dyn SymbolRemapper) -> usize {
        let renames: Vec<(FrameId, String)> = self
            .frames
            .iter()
            .filter_map(|(id, frame)| remapper.remap(frame).map(|name| (id, name)))
            .filter(|(id, name)| self.frames.frame(*id).name != *name)
            .collect();
        self.apply_renames(renames)
    }

    /// Demangle the frames whose indices fall in `range`. Returns the number
    /// of renamed frames.
    pub fn demangle_frames(&mut self, range: Range<usize>) -> usize {
        let renames = demangle_renames(&self.frames, range);
        self.apply_renames(renames)
    }

    fn apply_renames(&mut self, renames: Vec<(FrameId, String)>) -> usize {
        if renames.is_empty() {
            return 0;
        }
        let count = renames.len();
        let frames = Arc::make_mut(&mut self.frames);
        for (id, name) in renames {
            frames.rename(id, name);
        }
        count
    }

    pub fn frame_stats(&self, frame: FrameId) -> FrameStats {
        let mut stats = FrameStats::default();
        for (_, node) in self.tree.nodes().filter(|(_, n)| n.frame == frame) {
            stats.self_weight += node.self_weight;
            stats.occurrences += 1;
        }
        stats.total_weight = self
            .outermost_occurrences(frame)
            .iter()
            .map(|&id| self.tree.node(id).total_weight)
            .sum();
        stats
    }
}

fn demangle_renames(frames: &FrameTable, range: Range<usize>) -> Vec<(FrameId, String)> {
    let end = range.end.min(frames.len());
    let start = range.start.min(end);
    (start..end)
        .map(|i| FrameId(i as u32))
        .filter_map(|id| demangle_name(&frames.frame(id).name).map(|name| (id, name)))
        .collect()
}

/// Profiles loaded together from one file.
#[derive(Debug)]
pub struct ProfileGroup {
    pub name: String,
    /// Profile shown first.
    pub index_to_view: usize,
    pub profiles: Vec<Profile>,
}

impl ProfileGroup {
    pub fn new(name: impl Into<String>, profiles: Vec<Profile>) -> Self {
        Self {
            name: name.into(),
            index_to_view: 0,
            profiles,
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Profile> {
        self.profiles.get(index)
    }

    /// Index of the first profile using each distinct frame table.
    pub fn frame_table_owners(&self) -> Vec<usize> {
        (0..self.profiles.len())
            .filter(|&i| {
                let frames = &self.profiles[i].frames;
                !self.profiles[..i]
                    .iter()
                    .any(|p| Arc::ptr_eq(&p.frames, frames))
            })
            .collect()
    }

    /// Demangle `range` of the frame table used by profile `owner`. Every
    /// profile that shared the table still shares it afterwards.
    pub fn demangle_frames(&mut self, owner: usize, range: Range<usize>) -> usize {
        let Some(mut table) = self.profiles.get(owner).map(Profile::shared_frames) else {
            return 0;
        };
        let renames = demangle_renames(&table, range);
        if renames.is_empty() {
            return 0;
        }
        let users: Vec<usize> = (0..self.profiles.len())
            .filter(|&i| Arc::ptr_eq(&self.profiles[i].frames, &table))
            .collect();
        let detached = Arc::new(FrameTable::new());
        for &i in &users {
            self.profiles[i].frames = Arc::clone(&detached);
        }
        let count = renames.len();
        let frames = Arc::make_mut(&mut table);
        for (id, name) in renames {
            frames.rename(id, name);
        }
        for &i in &users {
            self.profiles[i].frames = Arc::clone(&table);
        }
        count
    }

    /// The same group with every profile shallow-cloned.
    pub fn shallow_clone(&self) -> ProfileGroup {
        ProfileGroup {
            name: self.name.clone(),
            index_to_view: self.index_to_view,
            profiles: self.profiles.iter().map(Profile::shallow_clone).collect(),
        }
    }
}
