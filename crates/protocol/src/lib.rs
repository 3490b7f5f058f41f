pub mod commands;
pub mod theme;
pub mod types;

pub use commands::{DrawPass, Fill, PassLayer, RenderCommand, TextAlign};
pub use theme::ThemeToken;
pub use types::{AffineTransform, Rect, Vec2, clamp_f64};
