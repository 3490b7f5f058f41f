use egui::ecolor::Hsva;
use flamescope_core::color::bucket_fraction;
use flamescope_protocol::ThemeToken;

/// Resolved RGBA color for egui rendering.
#[derive(Debug, Clone, Copy)]
struct ResolvedColor {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl ResolvedColor {
    const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    fn to_color32(self) -> egui::Color32 {
        egui::Color32::from_rgba_unmultiplied(self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }

    pub fn visuals(self) -> egui::Visuals {
        match self {
            ThemeMode::Dark => dark_visuals(),
            ThemeMode::Light => light_visuals(),
        }
    }
}

pub fn resolve(token: ThemeToken, mode: ThemeMode) -> egui::Color32 {
    match mode {
        ThemeMode::Dark => resolve_dark(token),
        ThemeMode::Light => resolve_light(token),
    }
    .to_color32()
}

fn resolve_dark(token: ThemeToken) -> ResolvedColor {
    // Catppuccin Mocha
    use ThemeToken::*;
    match token {
        Background => ResolvedColor::rgb(0x1e, 0x1e, 0x2e), // Base
        Surface => ResolvedColor::rgb(0x18, 0x18, 0x25),    // Mantle
        Border => ResolvedColor::rgb(0x31, 0x32, 0x44),     // Surface0

        TextPrimary => ResolvedColor::rgb(0xcd, 0xd6, 0xf4),
        TextSecondary => ResolvedColor::rgb(0xba, 0xc2, 0xde),
        TextMuted => ResolvedColor::rgb(0xa6, 0xad, 0xc8),
        FrameLabel => ResolvedColor::rgb(0x11, 0x11, 0x1b), // Crust

        SelectionOutline => ResolvedColor::rgb(0x89, 0xb4, 0xfa),
        HoverOutline => ResolvedColor::rgba(0xcd, 0xd6, 0xf4, 200),

        SearchHighlight => ResolvedColor::rgba(0xf9, 0xe2, 0xaf, 70),
        SearchDim => ResolvedColor::rgba(0x1e, 0x1e, 0x2e, 190),

        MinimapBackground => ResolvedColor::rgb(0x11, 0x11, 0x1b),
        MinimapShade => ResolvedColor::rgba(0x11, 0x11, 0x1b, 150),
        MinimapViewport => ResolvedColor::rgb(0xcd, 0xd6, 0xf4),
    }
}

fn resolve_light(token: ThemeToken) -> ResolvedColor {
    use ThemeToken::*;
    match token {
        Background => ResolvedColor::rgb(255, 255, 255),
        Surface => ResolvedColor::rgb(245, 245, 248),
        Border => ResolvedColor::rgb(210, 210, 215),

        TextPrimary => ResolvedColor::rgb(30, 30, 40),
        TextSecondary => ResolvedColor::rgb(60, 60, 70),
        TextMuted => ResolvedColor::rgb(120, 120, 130),
        FrameLabel => ResolvedColor::rgb(20, 20, 25),

        SelectionOutline => ResolvedColor::rgb(50, 110, 220),
        HoverOutline => ResolvedColor::rgba(30, 30, 40, 180),

        SearchHighlight => ResolvedColor::rgba(230, 170, 0, 60),
        SearchDim => ResolvedColor::rgba(255, 255, 255, 190),

        MinimapBackground => ResolvedColor::rgb(240, 240, 243),
        MinimapShade => ResolvedColor::rgba(200, 200, 208, 150),
        MinimapViewport => ResolvedColor::rgb(50, 110, 220),
    }
}

/// Fill color of a frame with the given color bucket.
///
/// Buckets walk the hue circle; the dark theme uses softer, lighter fills
/// so the dark label text stays readable on both.
pub fn bucket_color(bucket: u8, mode: ThemeMode) -> egui::Color32 {
    let hue = bucket_fraction(bucket);
    let (saturation, value) = match mode {
        ThemeMode::Dark => (0.45, 0.92),
        ThemeMode::Light => (0.55, 0.95),
    };
    Hsva::new(hue, saturation, value, 1.0).into()
}

// ── Typography scale ───────────────────────────────────────────────────────

pub const FONT_TITLE: f32 = 16.0;
pub const FONT_BODY: f32 = 12.0;
pub const FONT_CAPTION: f32 = 11.0;

// ── egui visual presets ────────────────────────────────────────────────────

fn rounded(mut v: egui::Visuals) -> egui::Visuals {
    let radius = egui::CornerRadius::same(5);
    v.window_corner_radius = egui::CornerRadius::same(6);
    v.menu_corner_radius = egui::CornerRadius::same(6);
    for widget in [
        &mut v.widgets.noninteractive,
        &mut v.widgets.inactive,
        &mut v.widgets.hovered,
        &mut v.widgets.active,
        &mut v.widgets.open,
    ] {
        widget.corner_radius = radius;
    }
    v
}

fn dark_visuals() -> egui::Visuals {
    let mut v = egui::Visuals::dark();
    v.panel_fill = resolve(ThemeToken::Surface, ThemeMode::Dark);
    v.window_fill = resolve(ThemeToken::Background, ThemeMode::Dark);
    v.extreme_bg_color = resolve(ThemeToken::MinimapBackground, ThemeMode::Dark);
    v.widgets.noninteractive.bg_stroke =
        egui::Stroke::new(1.0, resolve(ThemeToken::Border, ThemeMode::Dark));
    v.widgets.noninteractive.fg_stroke =
        egui::Stroke::new(1.0, resolve(ThemeToken::TextSecondary, ThemeMode::Dark));
    v.selection.bg_fill = egui::Color32::from_rgba_unmultiplied(0x89, 0xb4, 0xfa, 60);
    v.selection.stroke =
        egui::Stroke::new(1.0, resolve(ThemeToken::SelectionOutline, ThemeMode::Dark));
    v.warn_fg_color = egui::Color32::from_rgb(0xf9, 0xe2, 0xaf);
    v.error_fg_color = egui::Color32::from_rgb(0xf3, 0x8b, 0xa8);
    rounded(v)
}

fn light_visuals() -> egui::Visuals {
    let mut v = egui::Visuals::light();
    v.panel_fill = resolve(ThemeToken::Surface, ThemeMode::Light);
    v.window_fill = resolve(ThemeToken::Background, ThemeMode::Light);
    v.widgets.noninteractive.bg_stroke =
        egui::Stroke::new(1.0, resolve(ThemeToken::Border, ThemeMode::Light));
    v.selection.bg_fill = egui::Color32::from_rgba_unmultiplied(50, 110, 220, 50);
    v.selection.stroke =
        egui::Stroke::new(1.0, resolve(ThemeToken::SelectionOutline, ThemeMode::Light));
    v.warn_fg_color = egui::Color32::from_rgb(230, 170, 0);
    v.error_fg_color = egui::Color32::from_rgb(211, 47, 47);
    rounded(v)
}

/// Apply the typography scale to egui styles.
pub fn apply_typography(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    style
        .text_styles
        .insert(egui::TextStyle::Heading, egui::FontId::proportional(FONT_TITLE));
    style
        .text_styles
        .insert(egui::TextStyle::Body, egui::FontId::proportional(FONT_BODY));
    style
        .text_styles
        .insert(egui::TextStyle::Button, egui::FontId::proportional(FONT_BODY));
    style
        .text_styles
        .insert(egui::TextStyle::Small, egui::FontId::proportional(FONT_CAPTION));
    style
        .text_styles
        .insert(egui::TextStyle::Monospace, egui::FontId::monospace(FONT_CAPTION));
    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.button_padding = egui::vec2(8.0, 4.0);
    ctx.set_style(style);
}
