use percent_encoding::percent_decode_str;

use crate::model::ViewMode;

/// An application action bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetView(ViewMode),
    ToggleFlattenRecursion,
    NextProfile,
    PreviousProfile,
    Save,
    Open,
    FocusSearch,
}

/// Map a key press to a command. `key` is the produced character or key
/// name; `ctrl_or_meta` is Ctrl on Linux/Windows and Cmd on macOS.
pub fn command_for_key(key: &str, ctrl_or_meta: bool) -> Option<Command> {
    if ctrl_or_meta {
        return match key {
            "s" | "S" => Some(Command::Save),
            "o" | "O" => Some(Command::Open),
            "f" | "F" => Some(Command::FocusSearch),
            _ => None,
        };
    }
    match key {
        "1" => Some(Command::SetView(ViewMode::Chronological)),
        "2" => Some(Command::SetView(ViewMode::LeftHeavy)),
        "3" => Some(Command::SetView(ViewMode::Sandwich)),
        "r" => Some(Command::ToggleFlattenRecursion),
        "n" => Some(Command::NextProfile),
        "p" => Some(Command::PreviousProfile),
        _ => None,
    }
}

/// A request from the embedding page to fetch and open a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImportRequest {
    pub url: String,
    pub title: Option<String>,
}

/// Parse an inbound `url|frameId` message. An empty URL is ignored.
pub fn parse_import_message(message: &str) -> Option<RemoteImportRequest> {
    let (url, frame_id) = match message.split_once('|') {
        Some((url, frame_id)) => (url.trim(), Some(frame_id.trim())),
        None => (message.trim(), None),
    };
    if url.is_empty() {
        return None;
    }
    Some(RemoteImportRequest {
        url: url.to_owned(),
        title: frame_id
            .filter(|id| !id.is_empty())
            .map(|id| format!("Thread Time-Line(Frame:{id})")),
    })
}

/// Startup parameters carried in the page URL fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashParams {
    pub profile_url: Option<String>,
    pub title: Option<String>,
    pub local_profile_path: Option<String>,
}

impl HashParams {
    /// Parse `#key=value&key=value`. Unknown keys are ignored and values
    /// are percent-decoded.
    pub fn parse(fragment: &str) -> Self {
        let mut params = Self::default();
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        for pair in fragment.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = percent_decode_str(value).decode_utf8_lossy().into_owned();
            match key {
                "profileURL" => params.profile_url = Some(value),
                "title" => params.title = Some(value),
                "localProfilePath" => params.local_profile_path = Some(value),
                _ => {}
            }
        }
        params
    }
}
