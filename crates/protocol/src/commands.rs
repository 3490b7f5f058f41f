use serde::{Deserialize, Serialize};

use crate::theme::ThemeToken;
use crate::types::{AffineTransform, Rect, Vec2};

/// How a rectangle is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fill {
    /// A semantic theme color.
    Token(ThemeToken),
    /// A frame color bucket, looked up in the theme's flame palette.
    Bucket(u8),
}

/// A single, stateless render instruction.
///
/// The core emits lists of these inside [`DrawPass`]es; backends consume
/// them sequentially. Positions are in physical (device) pixels relative to
/// the canvas origin, except for the rects stored inside a cached batch,
/// which live in config space and are placed by `DrawBatch::transform`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderCommand {
    /// Draw a previously uploaded rect batch through `transform`.
    DrawBatch {
        batch: u64,
        transform: AffineTransform,
    },

    /// Draw a filled rectangle.
    DrawRect { rect: Rect, fill: Fill },

    /// Outline a rectangle.
    StrokeRect {
        rect: Rect,
        color: ThemeToken,
        width: f64,
    },

    /// Draw a text string anchored at a position. Backends skip the text
    /// when it would exceed `max_width`.
    DrawText {
        position: Vec2,
        text: String,
        color: ThemeToken,
        font_size: f64,
        align: TextAlign,
        max_width: Option<f64>,
    },

    /// Restrict subsequent drawing to a rectangular region.
    SetClip { rect: Rect },

    /// Remove the active clip region.
    ClearClip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// Ordering class of a draw pass within one frame submission. Passes are
/// submitted minimap first, then main views, then overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PassLayer {
    Minimap,
    Main,
    Overlay,
}

/// A batch of commands drawn into one region of the shared canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawPass {
    pub layer: PassLayer,
    /// Physical-pixel region the pass draws into.
    pub viewport: Rect,
    pub commands: Vec<RenderCommand>,
}

impl DrawPass {
    pub fn new(layer: PassLayer, viewport: Rect) -> Self {
        Self {
            layer,
            viewport,
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }
}
