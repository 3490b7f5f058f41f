use std::sync::Arc;

use thiserror::Error;

use super::call_tree::{CallTree, NodeId, Sample};
use super::frame::{FrameId, FrameInfo, FrameTable};
use super::profile::{Profile, ValueUnit};

#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("event at {at} precedes the previous event at {previous}")]
    NonMonotonic { previous: f64, at: f64 },
    #[error("leave of frame {found:?} does not match the open frame {expected:?}")]
    MismatchedLeave {
        expected: Option<FrameId>,
        found: FrameId,
    },
    #[error("{0} frames still open at the end of the profile")]
    UnclosedFrames(usize),
}

/// Tree plus timeline under construction, shared by both builders.
#[derive(Default)]
struct Recorder {
    tree: CallTree,
    samples: Vec<Sample>,
}

impl Recorder {
    /// Append a sample, merging it into the previous one when both have the
    /// same stack top.
    fn record(&mut self, node: Option<NodeId>, weight: f64) {
        if let Some(n) = node {
            self.tree.add_self_weight(n, weight);
        }
        match self.samples.last_mut() {
            Some(last) if last.node == node => last.weight += weight,
            _ => self.samples.push(Sample { node, weight }),
        }
    }

    fn finish(mut self, frames: Arc<FrameTable>, name: String, unit: ValueUnit) -> Profile {
        self.tree.recompute_totals();
        Profile::from_parts(name, unit, frames, self.tree, self.samples)
    }
}

/// Builds a profile from a list of sampled stacks.
///
/// Consecutive samples sharing a stack prefix extend the same calls, so the
/// resulting tree is chronological: each node covers one contiguous interval
/// of the timeline.
pub struct StackListBuilder {
    frames: Arc<FrameTable>,
    recorder: Recorder,
    open: Vec<NodeId>,
}

impl Default for StackListBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StackListBuilder {
    pub fn new() -> Self {
        Self::with_frames(Arc::new(FrameTable::new()))
    }

    pub(crate) fn with_frames(frames: Arc<FrameTable>) -> Self {
        Self {
            frames,
            recorder: Recorder::default(),
            open: Vec::new(),
        }
    }

    pub fn frame_id(&mut self, info: &FrameInfo) -> FrameId {
        Arc::make_mut(&mut self.frames).get_or_insert(info)
    }

    /// Append one sample. `stack` is root first. An empty stack records idle
    /// time. Negative or non-finite weights are ignored.
    pub fn append_sample(&mut self, stack: &[FrameId], weight: f64) {
        if !weight.is_finite() || weight < 0.0 {
            return;
        }
        if stack.is_empty() {
            self.open.clear();
            if weight > 0.0 {
                self.recorder.record(None, weight);
            }
            return;
        }

        let tree = &self.recorder.tree;
        let common = self
            .open
            .iter()
            .zip(stack)
            .take_while(|(node, frame)| tree.node(**node).frame == **frame)
            .count();
        self.open.truncate(common);
        for &frame in &stack[common..] {
            let parent = self.open.last().copied();
            let node = self.recorder.tree.push_node(frame, parent);
            self.open.push(node);
        }
        let top = self.open.last().copied();
        self.recorder.record(top, weight);
    }

    pub fn build(self, name: impl Into<String>, unit: ValueUnit) -> Profile {
        self.recorder.finish(self.frames, name.into(), unit)
    }
}

struct OpenCall {
    node: NodeId,
    /// Whether any sample (own or a descendant's) has covered this call.
    sampled: bool,
}

/// Builds a profile from enter/leave events at increasing values.
///
/// Elapsed value between two events goes to the frame on top of the stack,
/// or becomes idle time when the stack is empty.
pub struct EventedBuilder {
    frames: Arc<FrameTable>,
    recorder: Recorder,
    stack: Vec<OpenCall>,
    last_value: f64,
}

impl EventedBuilder {
    pub fn new(start_value: f64) -> Self {
        Self::with_frames(Arc::new(FrameTable::new()), start_value)
    }

    pub(crate) fn with_frames(frames: Arc<FrameTable>, start_value: f64) -> Self {
        Self {
            frames,
            recorder: Recorder::default(),
            stack: Vec::new(),
            last_value: start_value,
        }
    }

    pub fn frame_id(&mut self, info: &FrameInfo) -> FrameId {
        Arc::make_mut(&mut self.frames).get_or_insert(info)
    }

    pub fn enter_frame(&mut self, frame: FrameId, at: f64) -> Result<(), BuildError> {
        self.check_monotonic(at)?;
        self.push(frame, at);
        Ok(())
    }

    pub fn leave_frame(&mut self, frame: FrameId, at: f64) -> Result<(), BuildError> {
        self.check_monotonic(at)?;
        let expected = self
            .stack
            .last()
            .map(|call| self.recorder.tree.node(call.node).frame);
        if expected != Some(frame) {
            return Err(BuildError::MismatchedLeave {
                expected,
                found: frame,
            });
        }
        self.pop(at);
        Ok(())
    }

    pub fn build(
        self,
        name: impl Into<String>,
        unit: ValueUnit,
        end_value: f64,
    ) -> Result<Profile, BuildError> {
        if !self.stack.is_empty() {
            return Err(BuildError::UnclosedFrames(self.stack.len()));
        }
        Ok(self.finish(name.into(), unit, end_value))
    }

    pub(crate) fn push(&mut self, frame: FrameId, at: f64) {
        self.advance(at);
        let parent = self.stack.last().map(|call| call.node);
        let node = self.recorder.tree.push_node(frame, parent);
        self.stack.push(OpenCall {
            node,
            sampled: false,
        });
    }

    pub(crate) fn pop(&mut self, at: f64) {
        self.advance(at);
        let Some(call) = self.stack.pop() else {
            return;
        };
        if !call.sampled {
            self.recorder.record(Some(call.node), 0.0);
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.sampled = true;
        }
    }

    /// Close anything still open at `end_value` and produce the profile.
    pub(crate) fn finish(mut self, name: String, unit: ValueUnit, end_value: f64) -> Profile {
        while !self.stack.is_empty() {
            self.pop(end_value);
        }
        self.advance(end_value);
        self.recorder.finish(self.frames, name, unit)
    }

    fn check_monotonic(&self, at: f64) -> Result<(), BuildError> {
        if at.is_finite() && at >= self.last_value {
            Ok(())
        } else {
            Err(BuildError::NonMonotonic {
                previous: self.last_value,
                at,
            })
        }
    }

    fn advance(&mut self, at: f64) {
        let at = if at.is_finite() {
            at.max(self.last_value)
        } else {
            self.last_value
        };
        let delta = at - self.last_value;
        if delta > 0.0 {
            match self.stack.last_mut() {
                Some(top) => {
                    top.sampled = true;
                    let node = top.node;
                    self.recorder.record(Some(node), delta);
                }
                None => self.recorder.record(None, delta),
            }
        }
        self.last_value = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::call_tree::CallLog;

    fn names(profile: &Profile, nodes: &[NodeId]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| profile.frames().frame(profile.tree().node(*n).frame).name.clone())
            .collect()
    }

    #[test]
    fn stack_list_reuses_open_prefix() {
        let mut b = StackListBuilder::new();
        let main = b.frame_id(&FrameInfo::named("main"));
        let a = b.frame_id(&FrameInfo::named("a"));
        let c = b.frame_id(&FrameInfo::named("c"));
        b.append_sample(&[main, a], 1.0);
        b.append_sample(&[main, a], 2.0);
        b.append_sample(&[main, c], 4.0);
        b.append_sample(&[main, a], 8.0);
        let p = b.build("p", ValueUnit::None);

        let tree = p.tree();
        assert_eq!(tree.roots().len(), 1);
        let root = tree.node(tree.roots()[0]);
        assert_eq!(names(&p, &root.children), vec!["a", "c", "a"]);
        assert_eq!(tree.node(root.children[0]).self_weight, 3.0);
        assert_eq!(root.total_weight, 15.0);
        assert_eq!(p.samples().len(), 3);
    }

    #[test]
    fn empty_stack_is_idle_and_breaks_the_open_call() {
        let mut b = StackListBuilder::new();
        let main = b.frame_id(&FrameInfo::named("main"));
        b.append_sample(&[main], 1.0);
        b.append_sample(&[], 2.0);
        b.append_sample(&[main], 1.0);
        let p = b.build("p", ValueUnit::None);
        assert_eq!(p.tree().roots().len(), 2);
        assert_eq!(p.total_weight(), 4.0);
        assert_eq!(p.total_non_idle_weight(), 2.0);
    }

    #[test]
    fn evented_attributes_elapsed_value_to_stack_top() {
        let mut b = EventedBuilder::new(0.0);
        let main = b.frame_id(&FrameInfo::named("main"));
        let work = b.frame_id(&FrameInfo::named("work"));
        b.enter_frame(main, 0.0).unwrap();
        b.enter_frame(work, 2.0).unwrap();
        b.leave_frame(work, 7.0).unwrap();
        b.leave_frame(main, 10.0).unwrap();
        let p = b.build("p", ValueUnit::Milliseconds, 12.0).unwrap();

        let tree = p.tree();
        let root = tree.node(tree.roots()[0]);
        assert_eq!(root.self_weight, 5.0);
        assert_eq!(root.total_weight, 10.0);
        assert_eq!(tree.node(root.children[0]).self_weight, 5.0);
        assert_eq!(p.total_weight(), 12.0);
        assert_eq!(p.total_non_idle_weight(), 10.0);
    }

    #[test]
    fn evented_leading_gap_is_idle() {
        let mut b = EventedBuilder::new(0.0);
        let main = b.frame_id(&FrameInfo::named("main"));
        b.enter_frame(main, 3.0).unwrap();
        b.leave_frame(main, 4.0).unwrap();
        let p = b.build("p", ValueUnit::None, 4.0).unwrap();
        assert_eq!(p.samples()[0], Sample { node: None, weight: 3.0 });
        assert_eq!(p.total_weight(), 4.0);
    }

    #[test]
    fn zero_length_calls_survive() {
        let mut b = EventedBuilder::new(0.0);
        let main = b.frame_id(&FrameInfo::named("main"));
        let instant = b.frame_id(&FrameInfo::named("instant"));
        b.enter_frame(main, 0.0).unwrap();
        b.enter_frame(instant, 1.0).unwrap();
        b.leave_frame(instant, 1.0).unwrap();
        b.leave_frame(main, 2.0).unwrap();
        let p = b.build("p", ValueUnit::None, 2.0).unwrap();

        let mut log = CallLog::default();
        p.for_each_call(&mut log);
        let opened: Vec<f64> = log
            .events
            .iter()
            .filter(|(open, _, _)| *open)
            .map(|(_, _, at)| *at)
            .collect();
        assert_eq!(opened, vec![0.0, 1.0]);
    }

    #[test]
    fn evented_rejects_bad_event_streams() {
        let mut b = EventedBuilder::new(0.0);
        let a = b.frame_id(&FrameInfo::named("a"));
        let other = b.frame_id(&FrameInfo::named("b"));
        b.enter_frame(a, 5.0).unwrap();
        assert_eq!(
            b.enter_frame(a, 4.0),
            Err(BuildError::NonMonotonic {
                previous: 5.0,
                at: 4.0
            })
        );
        assert_eq!(
            b.leave_frame(other, 6.0),
            Err(BuildError::MismatchedLeave {
                expected: Some(a),
                found: other
            })
        );
        assert_eq!(
            b.build("p", ValueUnit::None, 10.0).err(),
            Some(BuildError::UnclosedFrames(1))
        );
    }
}
