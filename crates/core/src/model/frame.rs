use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Index of a frame inside its [`FrameTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u32);

impl FrameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a call site as reported by an importer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameInfo {
    pub name: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub col: Option<u32>,
    /// Explicit identity key. Derived from the other fields when absent.
    #[serde(default)]
    pub key: Option<String>,
}

impl FrameInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!(
                "{}:{}:{}:{}",
                self.name,
                self.file.as_deref().unwrap_or(""),
                self.line.map(|l| l.to_string()).unwrap_or_default(),
                self.col.map(|c| c.to_string()).unwrap_or_default(),
            ),
        }
    }
}

/// A deduplicated call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Stable identity, used for equality and coloring. Never changes after
    /// import, even when the display name is remapped.
    pub key: String,
    /// Display name.
    pub name: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub col: Option<u32>,
}

impl Frame {
    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            name: self.name.clone(),
            file: self.file.clone(),
            line: self.line,
            col: self.col,
            key: None,
        }
    }
}

/// Deduplicating frame storage.
///
/// Also keeps a lower-cased copy of every display name, which is what the
/// search index scans.
#[derive(Debug, Clone, Default)]
pub struct FrameTable {
    frames: Vec<Frame>,
    lower_names: Vec<String>,
    by_key: FxHashMap<String, FrameId>,
}

impl FrameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of the frame with `info`'s key, inserting it first if
    /// it is not known yet.
    pub fn get_or_insert(&mut self, info: &FrameInfo) -> FrameId {
        let key = info.key();
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }
        let id = FrameId(self.frames.len() as u32);
        self.lower_names.push(info.name.to_lowercase());
        self.frames.push(Frame {
            key: key.clone(),
            name: info.name.clone(),
            file: info.file.clone(),
            line: info.line,
            col: info.col,
        });
        self.by_key.insert(key, id);
        id
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.index())
    }

    /// Frame by id. Ids are only ever handed out by this table, so an
    /// unknown id is a wiring bug and panics on the index.
    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.index()]
    }

    pub fn lookup_key(&self, key: &str) -> Option<FrameId> {
        self.by_key.get(key).copied()
    }

    pub fn lowercase_name(&self, id: FrameId) -> &str {
        &self.lower_names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameId, &Frame)> {
        self.frames
            .iter()
            .enumerate()
            .map(|(i, f)| (FrameId(i as u32), f))
    }

    /// Change a frame's display name. The key is left untouched.
    pub fn rename(&mut self, id: FrameId, name: String) {
        if let Some(frame) = self.frames.get_mut(id.index()) {
            self.lower_names[id.index()] = name.to_lowercase();
            frame.name = name;
        }
    }
}
