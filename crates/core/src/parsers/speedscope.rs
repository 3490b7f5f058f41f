use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    BuildError, CallTree, CallVisitor, EventedBuilder, FrameId, FrameInfo, FrameTable, NodeId,
    Profile, ProfileGroup, StackListBuilder, ValueUnit,
};

pub const SCHEMA_URL: &str = "https://www.speedscope.app/file-format-spec.json";

#[derive(Debug, Error)]
pub enum SpeedscopeParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("profile {profile}: frame index {index} is out of range")]
    FrameIndex { profile: usize, index: usize },
    #[error("profile {profile}: {samples} samples but {weights} weights")]
    WeightCount {
        profile: usize,
        samples: usize,
        weights: usize,
    },
    #[error("profile {profile}: {source}")]
    Events {
        profile: usize,
        #[source]
        source: BuildError,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Speedscope file format, evented and sampled profiles.
/// Schema: https://www.speedscope.app/file-format-spec.json
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeedscopeFile {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(default)]
    shared: SharedData,
    #[serde(default)]
    profiles: Vec<SpeedscopeProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_profile_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exporter: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SharedData {
    #[serde(default)]
    frames: Vec<SpeedscopeFrame>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SpeedscopeFrame {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    col: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SpeedscopeProfile {
    Evented(EventedProfile),
    Sampled(SampledProfile),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventedProfile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    unit: ValueUnit,
    start_value: f64,
    end_value: f64,
    events: Vec<SpeedscopeEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampledProfile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    unit: ValueUnit,
    #[serde(default)]
    start_value: f64,
    #[serde(default)]
    end_value: f64,
    samples: Vec<Vec<usize>>,
    weights: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum EventType {
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "C")]
    Close,
}

#[derive(Debug, Serialize, Deserialize)]
struct SpeedscopeEvent {
    #[serde(rename = "type")]
    event_type: EventType,
    frame: usize,
    at: f64,
}

/// Whether a parsed JSON document looks like a speedscope file: it has a
/// `$schema` mentioning speedscope, or both `shared` and `profiles`.
pub fn is_speedscope(value: &serde_json::Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj
        .get("$schema")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|s| s.contains("speedscope"))
    {
        return true;
    }
    obj.contains_key("shared") && obj.contains_key("profiles")
}

/// Parse a speedscope document. Unnamed profiles are named `fallback_name`.
pub fn parse_speedscope(
    value: serde_json::Value,
    fallback_name: &str,
) -> Result<ProfileGroup, SpeedscopeParseError> {
    let file: SpeedscopeFile = serde_json::from_value(value)?;

    // Every profile of the file shares one frame table.
    let mut table = FrameTable::new();
    let ids: Vec<FrameId> = file
        .shared
        .frames
        .iter()
        .map(|f| {
            table.get_or_insert(&FrameInfo {
                name: f.name.clone(),
                file: f.file.clone(),
                line: f.line,
                col: f.col,
                key: None,
            })
        })
        .collect();
    let table = Arc::new(table);

    let mut profiles = Vec::with_capacity(file.profiles.len());
    for (index, profile) in file.profiles.into_iter().enumerate() {
        let lookup = |frame: usize| {
            ids.get(frame)
                .copied()
                .ok_or(SpeedscopeParseError::FrameIndex {
                    profile: index,
                    index: frame,
                })
        };
        let parsed = match profile {
            SpeedscopeProfile::Evented(p) => {
                let mut builder = EventedBuilder::with_frames(Arc::clone(&table), p.start_value);
                for event in &p.events {
                    let frame = lookup(event.frame)?;
                    let result = match event.event_type {
                        EventType::Open => builder.enter_frame(frame, event.at),
                        EventType::Close => builder.leave_frame(frame, event.at),
                    };
                    result.map_err(|source| SpeedscopeParseError::Events {
                        profile: index,
                        source,
                    })?;
                }
                let name = profile_name(p.name, fallback_name);
                builder
                    .build(name, p.unit, p.end_value)
                    .map_err(|source| SpeedscopeParseError::Events {
                        profile: index,
                        source,
                    })?
            }
            SpeedscopeProfile::Sampled(p) => {
                if p.samples.len() != p.weights.len() {
                    return Err(SpeedscopeParseError::WeightCount {
                        profile: index,
                        samples: p.samples.len(),
                        weights: p.weights.len(),
                    });
                }
                let mut builder = StackListBuilder::with_frames(Arc::clone(&table));
                let mut stack = Vec::new();
                for (sample, &weight) in p.samples.iter().zip(&p.weights) {
                    stack.clear();
                    for &frame in sample {
                        stack.push(lookup(frame)?);
                    }
                    builder.append_sample(&stack, weight);
                }
                builder.build(profile_name(p.name, fallback_name), p.unit)
            }
        };
        profiles.push(parsed);
    }

    let group_name = file
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| fallback_name.to_owned());
    let mut group = ProfileGroup::new(group_name, profiles);
    group.index_to_view = file
        .active_profile_index
        .filter(|&i| i < group.len())
        .unwrap_or(0);
    Ok(group)
}

fn profile_name(name: Option<String>, fallback: &str) -> String {
    name.filter(|n| !n.is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}

/// Collects open/close events of a chronological replay.
struct EventWriter<'a> {
    tree: &'a CallTree,
    frame_index: &'a [usize],
    events: Vec<SpeedscopeEvent>,
}

impl EventWriter<'_> {
    fn push(&mut self, event_type: EventType, node: NodeId, at: f64) {
        let frame = self.tree.node(node).frame;
        self.events.push(SpeedscopeEvent {
            event_type,
            frame: self.frame_index[frame.index()],
            at,
        });
    }
}

impl CallVisitor for EventWriter<'_> {
    fn open(&mut self, node: NodeId, value: f64) {
        self.push(EventType::Open, node, value);
    }

    fn close(&mut self, node: NodeId, value: f64) {
        self.push(EventType::Close, node, value);
    }
}

/// Serialize a group as a speedscope document with one evented profile per
/// profile. Frames with equal keys are written once.
pub fn export_speedscope(group: &ProfileGroup) -> Result<String, ExportError> {
    let mut shared = Vec::new();
    let mut by_key: FxHashMap<&str, usize> = FxHashMap::default();
    let mut profiles = Vec::with_capacity(group.len());

    for profile in &group.profiles {
        let table = profile.frames();
        let frame_index: Vec<usize> = table
            .iter()
            .map(|(_, frame)| {
                *by_key.entry(frame.key.as_str()).or_insert_with(|| {
                    shared.push(SpeedscopeFrame {
                        name: frame.name.clone(),
                        file: frame.file.clone(),
                        line: frame.line,
                        col: frame.col,
                    });
                    shared.len() - 1
                })
            })
            .collect();

        let mut writer = EventWriter {
            tree: profile.tree(),
            frame_index: &frame_index,
            events: Vec::new(),
        };
        profile.for_each_call(&mut writer);
        profiles.push(SpeedscopeProfile::Evented(EventedProfile {
            name: Some(profile.name().to_owned()),
            unit: profile.unit(),
            start_value: 0.0,
            end_value: profile.total_weight(),
            events: writer.events,
        }));
    }

    let file = SpeedscopeFile {
        schema: Some(SCHEMA_URL.to_owned()),
        shared: SharedData { frames: shared },
        profiles,
        name: Some(group.name.clone()),
        active_profile_index: Some(group.index_to_view),
        exporter: Some(format!("flamescope@{}", env!("CARGO_PKG_VERSION"))),
    };
    Ok(serde_json::to_string(&file)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ProfileGroup, SpeedscopeParseError> {
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert!(is_speedscope(&value));
        parse_speedscope(value, "file.json")
    }

    fn names(profile: &Profile) -> Vec<String> {
        profile
            .tree()
            .nodes()
            .map(|(_, n)| profile.frames().frame(n.frame).name.clone())
            .collect()
    }

    #[test]
    fn parse_evented_profile() {
        let json = r#"{
            "$schema": "https://www.speedscope.app/file-format-spec.json",
            "shared": {
                "frames": [
                    {"name": "main"},
                    {"name": "foo", "file": "foo.js", "line": 3},
                    {"name": "bar"}
                ]
            },
            "profiles": [{
                "type": "evented",
                "name": "thread 0",
                "unit": "microseconds",
                "startValue": 0,
                "endValue": 100,
                "events": [
                    {"type": "O", "frame": 0, "at": 0},
                    {"type": "O", "frame": 1, "at": 10},
                    {"type": "C", "frame": 1, "at": 50},
                    {"type": "O", "frame": 2, "at": 60},
                    {"type": "C", "frame": 2, "at": 80},
                    {"type": "C", "frame": 0, "at": 100}
                ]
            }],
            "name": "test profile"
        }"#;

        let group = parse(json).unwrap();
        assert_eq!(group.name, "test profile");
        let profile = &group.profiles[0];
        assert_eq!(profile.name(), "thread 0");
        assert_eq!(profile.unit(), ValueUnit::Microseconds);
        assert_eq!(names(profile), vec!["main", "foo", "bar"]);
        assert_eq!(profile.total_weight(), 100.0);

        let main = profile.tree().node(profile.tree().roots()[0]);
        assert_eq!(main.total_weight, 100.0);
        assert_eq!(main.self_weight, 40.0);
        let foo = profile.frames().frame(FrameId(1));
        assert_eq!(foo.file.as_deref(), Some("foo.js"));
        assert_eq!(foo.line, Some(3));
    }

    #[test]
    fn parse_sampled_profile() {
        let json = r#"{
            "shared": {"frames": [{"name": "main"}, {"name": "work"}]},
            "profiles": [{
                "type": "sampled",
                "unit": "milliseconds",
                "startValue": 0,
                "endValue": 30,
                "samples": [[0, 1], [0, 1], [0]],
                "weights": [10, 10, 10]
            }],
            "activeProfileIndex": 0
        }"#;

        let group = parse(json).unwrap();
        assert_eq!(group.name, "file.json");
        let profile = &group.profiles[0];
        assert_eq!(profile.name(), "file.json");
        // Consecutive samples sharing a prefix extend the same call.
        assert_eq!(names(profile), vec!["main", "work"]);
        assert_eq!(profile.total_weight(), 30.0);
    }

    #[test]
    fn bad_frame_index_and_weight_count_are_errors() {
        let json = r#"{
            "shared": {"frames": [{"name": "main"}]},
            "profiles": [{"type": "sampled", "unit": "none",
                "samples": [[0, 4]], "weights": [1]}]
        }"#;
        assert!(matches!(
            parse(json),
            Err(SpeedscopeParseError::FrameIndex { profile: 0, index: 4 })
        ));

        let json = r#"{
            "shared": {"frames": [{"name": "main"}]},
            "profiles": [{"type": "sampled", "unit": "none",
                "samples": [[0]], "weights": []}]
        }"#;
        assert!(matches!(
            parse(json),
            Err(SpeedscopeParseError::WeightCount { samples: 1, weights: 0, .. })
        ));
    }

    #[test]
    fn mismatched_close_is_an_error() {
        let json = r#"{
            "shared": {"frames": [{"name": "a"}, {"name": "b"}]},
            "profiles": [{"type": "evented", "unit": "none",
                "startValue": 0, "endValue": 2,
                "events": [
                    {"type": "O", "frame": 0, "at": 0},
                    {"type": "C", "frame": 1, "at": 1}
                ]}]
        }"#;
        assert!(matches!(
            parse(json),
            Err(SpeedscopeParseError::Events { profile: 0, .. })
        ));
    }

    #[test]
    fn export_deduplicates_frames_across_profiles() {
        let json = r#"{
            "shared": {"frames": [{"name": "main"}, {"name": "work"}]},
            "profiles": [
                {"type": "sampled", "name": "one", "unit": "none",
                 "samples": [[0, 1]], "weights": [2]},
                {"type": "sampled", "name": "two", "unit": "none",
                 "samples": [[0], [0, 1]], "weights": [1, 3]}
            ]
        }"#;
        let group = parse(json).unwrap();
        let out = export_speedscope(&group).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["$schema"], SCHEMA_URL);
        assert_eq!(value["shared"]["frames"].as_array().unwrap().len(), 2);
        assert_eq!(value["profiles"][1]["type"], "evented");
        assert_eq!(value["profiles"][1]["endValue"], 4.0);
        assert_eq!(
            value["profiles"][1]["events"].as_array().unwrap().len(),
            4
        );
    }
}
