use rustc_hash::FxHashSet;

use crate::flamechart::Flamechart;
use crate::model::{FrameId, NodeId};

/// Case-insensitive substring search over the frames of one flamechart.
///
/// An empty query is inactive and matches everything. Call
/// [`SearchIndex::clear`] when the flamechart changes, since a narrowing
/// query only re-checks frames that matched the previous one.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    query: String,
    frames: FxHashSet<FrameId>,
    nodes: FxHashSet<NodeId>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.query.is_empty()
    }

    /// The active query, lower-cased.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.frames.clear();
        self.nodes.clear();
    }

    /// Run `query` against `chart`. Returns whether the query changed.
    pub fn update(&mut self, chart: &Flamechart, query: &str) -> bool {
        let query = query.to_lowercase();
        if query == self.query {
            return false;
        }
        if query.is_empty() {
            self.clear();
            return true;
        }

        let table = chart.frames();
        let narrowing = self.is_active() && query.contains(self.query.as_str());
        self.frames = if narrowing {
            self.frames
                .iter()
                .copied()
                .filter(|&id| table.lowercase_name(id).contains(query.as_str()))
                .collect()
        } else {
            table
                .iter()
                .map(|(id, _)| id)
                .filter(|&id| table.lowercase_name(id).contains(query.as_str()))
                .collect()
        };
        self.nodes = chart
            .layers()
            .iter()
            .flatten()
            .filter(|f| self.frames.contains(&f.frame))
            .map(|f| f.node)
            .collect();
        log::debug!(
            "search {query:?}: {} frames, {} nodes{}",
            self.frames.len(),
            self.nodes.len(),
            if narrowing { " (narrowed)" } else { "" }
        );
        self.query = query;
        true
    }

    pub fn matches_frame(&self, frame: FrameId) -> bool {
        !self.is_active() || self.frames.contains(&frame)
    }

    pub fn matches_node(&self, node: NodeId) -> bool {
        !self.is_active() || self.nodes.contains(&node)
    }

    /// Number of matching nodes, zero when inactive.
    pub fn match_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flamechart::LayoutMode;
    use crate::model::{FrameInfo, StackListBuilder, ValueUnit};

    fn chart() -> Flamechart {
        let mut b = StackListBuilder::new();
        let main = b.frame_id(&FrameInfo::named("main"));
        let foo = b.frame_id(&FrameInfo::named("foo"));
        let bar = b.frame_id(&FrameInfo::named("bar"));
        let foobar = b.frame_id(&FrameInfo::named("FooBar"));
        b.append_sample(&[main, foo], 1.0);
        b.append_sample(&[main, bar], 1.0);
        b.append_sample(&[main, foobar], 1.0);
        b.append_sample(&[main, bar, foo], 1.0);
        let p = b.build("p", ValueUnit::None);
        Flamechart::layout(&p, LayoutMode::Chronological)
    }

    fn matched_names(chart: &Flamechart, index: &SearchIndex) -> Vec<String> {
        let mut names: Vec<String> = chart
            .layers()
            .iter()
            .flatten()
            .filter(|f| index.matches_node(f.node))
            .map(|f| chart.frame(f.frame).name.clone())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn empty_query_matches_everything() {
        let chart = chart();
        let mut index = SearchIndex::new();
        assert!(!index.update(&chart, ""));
        assert!(!index.is_active());
        assert_eq!(matched_names(&chart, &index).len(), 6);
        assert_eq!(index.match_count(), 0);
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let chart = chart();
        let mut index = SearchIndex::new();
        assert!(index.update(&chart, "foo"));
        assert_eq!(matched_names(&chart, &index), vec!["FooBar", "foo", "foo"]);
        assert_eq!(index.match_count(), 3);

        assert!(index.update(&chart, "BAR"));
        assert_eq!(matched_names(&chart, &index), vec!["FooBar", "bar", "bar"]);
    }

    #[test]
    fn narrowing_and_widening_give_fresh_results() {
        let chart = chart();
        let mut index = SearchIndex::new();
        index.update(&chart, "o");
        assert_eq!(matched_names(&chart, &index).len(), 3);
        index.update(&chart, "oob");
        assert_eq!(matched_names(&chart, &index), vec!["FooBar"]);
        index.update(&chart, "a");
        assert_eq!(matched_names(&chart, &index).len(), 4);
        index.update(&chart, "");
        assert!(!index.is_active());
    }

    #[test]
    fn surrounding_whitespace_is_part_of_the_query() {
        let chart = chart();
        let mut index = SearchIndex::new();
        assert!(index.update(&chart, "foo"));
        assert!(index.update(&chart, "foo "));
        assert_eq!(index.query(), "foo ");
        assert!(index.is_active());
        assert!(matched_names(&chart, &index).is_empty());
        assert_eq!(index.match_count(), 0);

        assert!(index.update(&chart, " "));
        assert!(index.is_active());
        assert!(matched_names(&chart, &index).is_empty());
    }
}
