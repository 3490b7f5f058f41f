use std::sync::Arc;
use std::task::Poll;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::frame::FrameId;
use super::call_tree::NodeId;
use super::profile::{Profile, ProfileGroup, ProfileId};
use super::symbols::{SymbolMap, parse_emscripten_symbol_map};
use crate::flamechart::{Flamechart, FlamechartFrame, ViewKind};
use crate::input::Command;
use crate::renderer::{LayoutCache, LayoutKey, ViewSlot};
use crate::search::SearchIndex;
use crate::task::{CancellationToken, ImportOutcome, ImportTask};

/// Which layout the main area shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    Chronological,
    LeftHeavy,
    /// Callers and callees of one focal frame.
    Sandwich,
}

/// A draw or query was asked for state the session does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WiringError {
    #[error("no profile is loaded")]
    NoActiveProfile,
    #[error("the sandwich view needs a selected frame")]
    NoFocalFrame,
    #[error("no canvas is attached")]
    MissingCanvas,
}

/// A clicked rectangle, remembered together with the view it was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub view: ViewKind,
    pub node: NodeId,
    pub frame: FrameId,
}

/// Application state: the loaded group, view settings, selection, search,
/// cached layouts and the in-flight import.
///
/// The UI owns exactly one session and drives it once per frame.
#[derive(Default)]
pub struct Session {
    group: Option<ProfileGroup>,
    active: usize,
    view_mode: ViewMode,
    flatten_recursion: bool,
    focal_frame: Option<FrameId>,
    selected: Option<Selection>,
    hovered: Option<Selection>,
    search_query: String,
    searches: FxHashMap<LayoutKey, SearchIndex>,
    layouts: LayoutCache,
    import: Option<ImportTask>,
    title: Option<String>,
    message: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // --- loaded data ---

    pub fn group(&self) -> Option<&ProfileGroup> {
        self.group.as_ref()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_profile(&self) -> Result<&Profile, WiringError> {
        self.group
            .as_ref()
            .and_then(|g| g.get(self.active))
            .ok_or(WiringError::NoActiveProfile)
    }

    /// Replace the loaded group. Selection, focal frame and layouts of
    /// profiles that are gone are dropped.
    pub fn load_group(&mut self, group: ProfileGroup) {
        log::info!(
            "loaded {:?} with {} profile(s)",
            group.name,
            group.len()
        );
        self.active = group.index_to_view.min(group.len().saturating_sub(1));
        self.group = Some(group);
        self.focal_frame = None;
        self.clear_pointer_state();
        self.prune_caches();
    }

    /// Rename frames of every loaded profile through `map`. Profiles are
    /// shallow-cloned first so layouts cached for the old names are not
    /// reused. Returns the number of renamed frames.
    pub fn apply_symbol_map(&mut self, map: &SymbolMap) -> usize {
        let Some(group) = &self.group else {
            return 0;
        };
        let mut remapped = group.shallow_clone();
        let renamed: usize = remapped
            .profiles
            .iter_mut()
            .map(|p| p.remap_symbols(map))
            .sum();
        self.group = Some(remapped);
        self.clear_pointer_state();
        self.prune_caches();
        renamed
    }

    fn prune_caches(&mut self) {
        let live: Vec<ProfileId> = self
            .group
            .iter()
            .flat_map(|g| g.profiles.iter().map(Profile::id))
            .collect();
        self.layouts.retain_profiles(&live);
        self.searches.retain(|key, _| live.contains(&key.profile));
    }

    fn clear_pointer_state(&mut self) {
        self.selected = None;
        self.hovered = None;
    }

    // --- import ---

    /// Start importing `bytes`. Any import still in flight is cancelled;
    /// the last one started is the only one that can commit.
    pub fn start_import(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) {
        if let Some(previous) = self.import.take() {
            log::info!("cancelling import of {}", previous.file_name());
            previous.token().cancel();
        }
        let task = ImportTask::new(file_name, bytes, CancellationToken::new());
        log::info!("importing {}", task.file_name());
        self.import = Some(task);
        self.message = None;
    }

    pub fn is_loading(&self) -> bool {
        self.import.is_some()
    }

    /// Advance the in-flight import by one step. Returns whether the
    /// session changed.
    pub fn poll_import(&mut self) -> bool {
        let Some(task) = self.import.as_mut() else {
            return false;
        };
        let Poll::Ready(outcome) = task.step() else {
            return false;
        };
        self.import = None;
        match outcome {
            ImportOutcome::Loaded(group) => self.load_group(group),
            ImportOutcome::Unrecognized { file_name, bytes } => {
                self.handle_unrecognized(&file_name, &bytes);
            }
            ImportOutcome::Empty => {
                log::warn!("import produced no profiles");
                self.message = Some("The file contains no profiles.".into());
            }
            ImportOutcome::Failed(err) => {
                log::warn!("import failed: {err}");
                self.message = Some(format!("Failed to import: {err}"));
            }
            ImportOutcome::Cancelled => {}
        }
        true
    }

    fn handle_unrecognized(&mut self, file_name: &str, bytes: &[u8]) {
        let map = if self.group.is_some() {
            std::str::from_utf8(bytes)
                .ok()
                .and_then(parse_emscripten_symbol_map)
        } else {
            None
        };
        match map {
            Some(map) => {
                let renamed = self.apply_symbol_map(&map);
                log::info!("applied symbol map {file_name}: {renamed} frame(s) renamed");
                self.message = Some(format!(
                    "Applied symbols from {file_name} ({renamed} renamed)."
                ));
            }
            None => {
                log::warn!("{file_name}: unrecognized format");
                self.message = Some(format!("Unrecognized format: {file_name}"));
            }
        }
    }

    // --- view settings ---

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        if mode != self.view_mode {
            self.view_mode = mode;
            self.clear_pointer_state();
        }
    }

    pub fn flatten_recursion(&self) -> bool {
        self.flatten_recursion
    }

    pub fn toggle_flatten_recursion(&mut self) {
        self.flatten_recursion = !self.flatten_recursion;
        self.clear_pointer_state();
    }

    /// Switch to the profile at `index` of the group. Out-of-range indices
    /// are ignored.
    pub fn set_active_index(&mut self, index: usize) -> bool {
        let len = self.group.as_ref().map_or(0, ProfileGroup::len);
        if index >= len || index == self.active {
            return false;
        }
        self.active = index;
        self.focal_frame = None;
        self.clear_pointer_state();
        true
    }

    pub fn next_profile(&mut self) -> bool {
        self.set_active_index(self.active + 1)
    }

    pub fn previous_profile(&mut self) -> bool {
        match self.active.checked_sub(1) {
            Some(index) => self.set_active_index(index),
            None => false,
        }
    }

    /// Apply a key command. Returns `false` for commands the UI handles
    /// itself (file dialogs, focus).
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::SetView(mode) => self.set_view_mode(mode),
            Command::ToggleFlattenRecursion => self.toggle_flatten_recursion(),
            Command::NextProfile => {
                self.next_profile();
            }
            Command::PreviousProfile => {
                self.previous_profile();
            }
            Command::Save | Command::Open | Command::FocusSearch => return false,
        }
        true
    }

    // --- selection ---

    pub fn focal_frame(&self) -> Option<FrameId> {
        self.focal_frame
    }

    pub fn set_focal_frame(&mut self, frame: Option<FrameId>) {
        self.focal_frame = frame;
    }

    /// Select a rectangle of `view`. Its frame becomes the sandwich focus.
    pub fn select(&mut self, view: ViewKind, frame: Option<&FlamechartFrame>) {
        self.selected = frame.map(|f| Selection {
            view,
            node: f.node,
            frame: f.frame,
        });
        if let Some(selection) = self.selected {
            self.focal_frame = Some(selection.frame);
        }
    }

    pub fn hover(&mut self, view: ViewKind, frame: Option<&FlamechartFrame>) {
        self.hovered = frame.map(|f| Selection {
            view,
            node: f.node,
            frame: f.frame,
        });
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selected
    }

    pub fn selected_node(&self, view: ViewKind) -> Option<NodeId> {
        self.selected.filter(|s| s.view == view).map(|s| s.node)
    }

    pub fn hovered_node(&self, view: ViewKind) -> Option<NodeId> {
        self.hovered.filter(|s| s.view == view).map(|s| s.node)
    }

    pub fn hovered(&self) -> Option<Selection> {
        self.hovered
    }

    // --- layouts ---

    /// The panes the current view mode shows.
    pub fn views(&self) -> Result<Vec<(ViewSlot, ViewKind)>, WiringError> {
        self.active_profile()?;
        Ok(match self.view_mode {
            ViewMode::Chronological => vec![(ViewSlot::Main, ViewKind::Chronological)],
            ViewMode::LeftHeavy => vec![(ViewSlot::Main, ViewKind::LeftHeavy)],
            ViewMode::Sandwich => {
                let frame = self.focal_frame.ok_or(WiringError::NoFocalFrame)?;
                vec![
                    (ViewSlot::Callers, ViewKind::Callers(frame)),
                    (ViewSlot::Callees, ViewKind::Callees(frame)),
                ]
            }
        })
    }

    pub fn layout_key(&self, view: ViewKind) -> Result<LayoutKey, WiringError> {
        let profile = self.active_profile()?;
        if view.focal_frame().is_some_and(|f| profile.frames().get(f).is_none()) {
            return Err(WiringError::NoFocalFrame);
        }
        Ok(LayoutKey {
            profile: profile.id(),
            view,
            flatten_recursion: self.flatten_recursion,
        })
    }

    /// The layout of `view` for the active profile, computed on first use.
    pub fn flamechart_for(&mut self, view: ViewKind) -> Result<Arc<Flamechart>, WiringError> {
        let key = self.layout_key(view)?;
        let profile = self
            .group
            .as_ref()
            .and_then(|g| g.get(self.active))
            .ok_or(WiringError::NoActiveProfile)?;
        let flatten = self.flatten_recursion;
        Ok(self
            .layouts
            .get_or_insert_with(key, || Flamechart::for_view(profile, view, flatten)))
    }

    pub fn cached_layouts(&self) -> usize {
        self.layouts.len()
    }

    // --- search ---

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    /// Search results of the current query over the layout of `view`.
    pub fn search_for(&mut self, view: ViewKind) -> Result<&SearchIndex, WiringError> {
        let chart = self.flamechart_for(view)?;
        let key = self.layout_key(view)?;
        let index = self.searches.entry(key).or_default();
        index.update(&chart, &self.search_query);
        Ok(index)
    }

    // --- status ---

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title;
    }

    /// Last user-visible status message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn dismiss_message(&mut self) {
        self.message = None;
    }
}
