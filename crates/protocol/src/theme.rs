use serde::{Deserialize, Serialize};

/// Semantic color tokens resolved by the renderer's active theme.
///
/// Frame fills are not tokens: they come from color buckets (see
/// [`crate::commands::Fill::Bucket`]) and are mapped through the theme's
/// flame palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThemeToken {
    Background,
    Surface,
    Border,

    TextPrimary,
    TextSecondary,
    TextMuted,

    /// Label text drawn on top of a frame fill.
    FrameLabel,

    SelectionOutline,
    HoverOutline,

    /// Overlay drawn over frames that match the active search.
    SearchHighlight,
    /// Overlay drawn over frames that do not match the active search.
    SearchDim,

    MinimapBackground,
    /// Shade covering the parts of the minimap outside the viewport.
    MinimapShade,
    MinimapViewport,
}
