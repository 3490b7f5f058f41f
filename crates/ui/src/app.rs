use std::sync::{Arc, Mutex, PoisonError};

use eframe::egui;
use flamescope_core::flamechart::{Flamechart, FlamechartFrame, ViewKind, format_percent};
use flamescope_core::input::{Command, HashParams, command_for_key};
use flamescope_core::model::{Session, ViewMode, WiringError};
use flamescope_core::parsers::export_profile_group;
use flamescope_core::renderer::{
    CanvasContext, CanvasId, LayoutKey, RenderProps, RendererCache, RendererKey, ViewSlot,
};
use flamescope_core::viewport::{FlamechartViewport, ViewSizes};
use flamescope_protocol::{Rect, ThemeToken, Vec2};
use rustc_hash::FxHashMap;

use crate::backend::EguiBackend;
use crate::theme::{self, ThemeMode};

const CANVAS: CanvasId = CanvasId(0);
const ALL_SLOTS: [ViewSlot; 3] = [ViewSlot::Main, ViewSlot::Callers, ViewSlot::Callees];

/// A profile fetched or read off the UI thread, waiting to be imported.
pub(crate) struct Incoming {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub title: Option<String>,
}

pub(crate) type PendingFile = Arc<Mutex<Option<Incoming>>>;

/// Pan/zoom state of one view slot. Reset whenever the slot shows a new
/// layout.
struct Pane {
    key: LayoutKey,
    viewport: FlamechartViewport,
    fresh: bool,
}

impl Pane {
    fn new(key: LayoutKey, view: ViewKind, sizes: ViewSizes) -> Self {
        let mut viewport = FlamechartViewport::new(sizes);
        viewport.set_inverted(view.is_inverted());
        Self {
            key,
            viewport,
            fresh: true,
        }
    }
}

/// Where each visible pane sits this frame, in logical canvas pixels.
struct PaneLayout {
    slot: ViewSlot,
    view: ViewKind,
    key: LayoutKey,
    chart: Arc<Flamechart>,
    rect: Rect,
}

struct FrameLayout {
    panes: Vec<PaneLayout>,
    minimap: Option<Rect>,
}

impl FrameLayout {
    fn pane_at(&self, local: Vec2) -> Option<&PaneLayout> {
        self.panes.iter().find(|pane| pane.rect.contains(local))
    }
}

/// Main application state.
pub struct FlameApp {
    session: Session,
    canvas: CanvasContext<EguiBackend>,
    renderers: RendererCache,
    panes: FxHashMap<ViewSlot, Pane>,
    sizes: ViewSizes,
    theme_mode: ThemeMode,
    pending: PendingFile,
    focus_search: bool,
    window_title: String,
    last_wiring_error: Option<WiringError>,
}

impl FlameApp {
    pub fn new(cc: &eframe::CreationContext<'_>, params: HashParams) -> Self {
        let theme_mode = ThemeMode::default();
        cc.egui_ctx.set_visuals(theme_mode.visuals());
        theme::apply_typography(&cc.egui_ctx);

        let mut app = Self {
            session: Session::new(),
            canvas: CanvasContext::new(CANVAS, EguiBackend::new()),
            renderers: RendererCache::new(),
            panes: FxHashMap::default(),
            sizes: ViewSizes::default(),
            theme_mode,
            pending: Arc::new(Mutex::new(None)),
            focus_search: false,
            window_title: String::new(),
            last_wiring_error: None,
        };
        app.session.set_title(params.title.clone());
        app.open_from_params(&cc.egui_ctx, &params);
        app
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn open_from_params(&mut self, _ctx: &egui::Context, params: &HashParams) {
        if let Some(path) = &params.local_profile_path {
            self.read_local(std::path::Path::new(path));
        }
        if let Some(url) = &params.profile_url {
            log::warn!("ignoring profile URL {url}: remote profiles are only fetched in the browser");
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn open_from_params(&mut self, ctx: &egui::Context, params: &HashParams) {
        let url = params
            .profile_url
            .as_ref()
            .or(params.local_profile_path.as_ref());
        if let Some(url) = url {
            crate::web::fetch_into(
                self.pending.clone(),
                ctx.clone(),
                url.clone(),
                params.title.clone(),
            );
        }
        if let Err(e) = crate::web::listen_for_messages(self.pending.clone(), ctx.clone()) {
            log::error!("cannot listen for import messages: {e:?}");
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn read_local(&mut self, path: &std::path::Path) {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match std::fs::read(path) {
            Ok(bytes) => {
                log::info!("read {} bytes from {}", bytes.len(), path.display());
                self.import(Incoming {
                    file_name,
                    bytes,
                    title: None,
                });
            }
            Err(e) => {
                log::warn!("cannot read {}: {e}", path.display());
                self.session
                    .set_message(format!("Failed to read {file_name}: {e}"));
            }
        }
    }

    fn open_file_dialog(&mut self, ctx: &egui::Context) {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = ctx;
            if let Some(path) = rfd::FileDialog::new()
                .add_filter("Profile", &["json", "speedscope", "txt", "collapsed", "folded"])
                .add_filter("All files", &["*"])
                .pick_file()
            {
                self.read_local(&path);
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let pending = self.pending.clone();
            let ctx = ctx.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let Some(handle) = rfd::AsyncFileDialog::new().pick_file().await else {
                    return;
                };
                let incoming = Incoming {
                    file_name: handle.file_name(),
                    bytes: handle.read().await,
                    title: None,
                };
                *pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(incoming);
                ctx.request_repaint();
            });
        }
    }

    fn save(&mut self) {
        let exported = self.session.group().map(|group| {
            (
                format!("{}.speedscope.json", group.name),
                export_profile_group(group),
            )
        });
        let (file_name, json) = match exported {
            None => {
                self.session.set_message("Nothing to save.");
                return;
            }
            Some((_, Err(e))) => {
                log::error!("export failed: {e}");
                self.session.set_message(format!("Failed to export: {e}"));
                return;
            }
            Some((file_name, Ok(json))) => (file_name, json),
        };

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(path) = rfd::FileDialog::new().set_file_name(&file_name).save_file() {
            match std::fs::write(&path, json) {
                Ok(()) => log::info!("saved {}", path.display()),
                Err(e) => {
                    log::warn!("cannot write {}: {e}", path.display());
                    self.session.set_message(format!("Failed to save: {e}"));
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        if let Err(e) = crate::web::download(&file_name, &json) {
            log::error!("download failed: {e:?}");
            self.session.set_message("Failed to save the profile.");
        }
    }

    fn take_pending(&mut self) {
        let incoming = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(incoming) = incoming {
            self.import(incoming);
        }
    }

    fn import(&mut self, incoming: Incoming) {
        if incoming.title.is_some() {
            self.session.set_title(incoming.title);
        }
        self.session.start_import(incoming.file_name, incoming.bytes);
    }

    fn take_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input_mut(|i| std::mem::take(&mut i.raw.dropped_files));
        let Some(file) = dropped.into_iter().next() else {
            return;
        };
        if let Some(bytes) = file.bytes {
            self.import(Incoming {
                file_name: file.name,
                bytes: bytes.to_vec(),
                title: None,
            });
            return;
        }
        #[cfg(not(target_arch = "wasm32"))]
        if let Some(path) = file.path {
            self.read_local(&path);
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        let typing = ctx.wants_keyboard_input();
        let events = ctx.input(|i| i.events.clone());
        for event in &events {
            let command = match event {
                egui::Event::Key {
                    key,
                    pressed: true,
                    modifiers,
                    ..
                } if modifiers.command => command_for_key(key.name(), true),
                egui::Event::Text(text) if !typing => command_for_key(text, false),
                egui::Event::Paste(text) if !typing => {
                    self.import(Incoming {
                        file_name: "From Clipboard".to_owned(),
                        bytes: text.clone().into_bytes(),
                        title: None,
                    });
                    None
                }
                _ => None,
            };
            match command {
                Some(Command::Open) => self.open_file_dialog(ctx),
                Some(Command::Save) => self.save(),
                Some(Command::FocusSearch) => self.focus_search = true,
                Some(command) => {
                    if self.session.apply(command) {
                        self.canvas.request_frame();
                    }
                }
                None => {}
            }
        }
    }

    fn sync_window_title(&mut self, ctx: &egui::Context) {
        let title = match (self.session.title(), self.session.active_profile()) {
            (Some(title), _) => format!("{title} - flamescope"),
            (None, Ok(profile)) => format!("{} - flamescope", profile.name()),
            (None, Err(_)) => "flamescope".to_owned(),
        };
        if title != self.window_title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.window_title = title;
        }
    }

    // --- panels ---

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("flamescope");
            ui.separator();

            if ui.button("Open").clicked() {
                self.open_file_dialog(ui.ctx());
            }
            let loaded = self.session.group().is_some();
            if ui.add_enabled(loaded, egui::Button::new("Save")).clicked() {
                self.save();
            }
            ui.separator();

            let mut mode = self.session.view_mode();
            ui.selectable_value(&mut mode, ViewMode::Chronological, "Time Order");
            ui.selectable_value(&mut mode, ViewMode::LeftHeavy, "Left Heavy");
            ui.selectable_value(&mut mode, ViewMode::Sandwich, "Sandwich");
            if mode != self.session.view_mode() {
                self.session.set_view_mode(mode);
                self.canvas.request_frame();
            }

            let mut flatten = self.session.flatten_recursion();
            if ui.checkbox(&mut flatten, "Flatten recursion").changed() {
                self.session.toggle_flatten_recursion();
                self.canvas.request_frame();
            }
            ui.separator();

            self.profile_picker(ui);

            let mut query = self.session.search_query().to_owned();
            let search = ui.add(
                egui::TextEdit::singleline(&mut query)
                    .hint_text("Search")
                    .desired_width(180.0),
            );
            if std::mem::take(&mut self.focus_search) {
                search.request_focus();
            }
            if search.changed() {
                self.session.set_search_query(query);
                self.canvas.request_frame();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let label = match self.theme_mode {
                    ThemeMode::Dark => "Light",
                    ThemeMode::Light => "Dark",
                };
                if ui.button(label).clicked() {
                    self.theme_mode = self.theme_mode.toggled();
                    ui.ctx().set_visuals(self.theme_mode.visuals());
                    self.canvas.request_frame();
                }
            });
        });
    }

    fn profile_picker(&mut self, ui: &mut egui::Ui) {
        let Some(group) = self.session.group() else {
            return;
        };
        if group.len() < 2 {
            return;
        }
        let names: Vec<String> = group
            .profiles
            .iter()
            .map(|profile| profile.name().to_owned())
            .collect();
        let active = self.session.active_index();
        let mut chosen = active;
        egui::ComboBox::from_id_salt("profile")
            .selected_text(format!(
                "{} ({}/{})",
                names.get(active).map_or("", String::as_str),
                active + 1,
                names.len()
            ))
            .show_ui(ui, |ui| {
                for (i, name) in names.iter().enumerate() {
                    ui.selectable_value(&mut chosen, i, name.as_str());
                }
            });
        if chosen != active && self.session.set_active_index(chosen) {
            self.canvas.request_frame();
        }
        ui.separator();
    }

    fn status_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if self.session.is_loading() {
                ui.spinner();
                ui.label("Importing…");
                ui.separator();
            }
            if let Some(message) = self.session.message().map(str::to_owned) {
                ui.label(message);
                if ui.small_button("✕").clicked() {
                    self.session.dismiss_message();
                }
            } else if let Ok(profile) = self.session.active_profile() {
                let count = self.session.group().map_or(0, |g| g.profiles.len());
                ui.label(format!(
                    "{} | Total: {} | Profile {}/{}",
                    profile.name(),
                    profile.unit().format(profile.total_weight()),
                    self.session.active_index() + 1,
                    count,
                ));
            } else {
                ui.label("No profile loaded. Click Open or drop a file here.");
            }
        });
    }

    fn detail_panel(&self, ctx: &egui::Context) {
        let Some(selection) = self.session.selection() else {
            return;
        };
        let Ok(profile) = self.session.active_profile() else {
            return;
        };
        let Some(frame) = profile.frames().get(selection.frame) else {
            return;
        };
        let stats = profile.frame_stats(selection.frame);
        let unit = profile.unit();
        let total = profile.total_weight();
        let describe = |value: f64| {
            let percent = if total > 0.0 { 100.0 * value / total } else { 0.0 };
            format!("{} ({})", unit.format(value), format_percent(percent))
        };
        let location = match (&frame.file, frame.line, frame.col) {
            (Some(file), Some(line), Some(col)) => Some(format!("{file}:{line}:{col}")),
            (Some(file), Some(line), None) => Some(format!("{file}:{line}")),
            (Some(file), None, _) => Some(file.clone()),
            (None, ..) => None,
        };

        egui::TopBottomPanel::bottom("detail")
            .exact_height(self.sizes.detail_view_height as f32)
            .show(ctx, |ui| {
                ui.add_space(4.0);
                ui.strong(frame.name.as_str());
                if let Some(location) = location {
                    ui.weak(location);
                }
                ui.add_space(4.0);
                egui::Grid::new("frame_stats").num_columns(2).show(ui, |ui| {
                    ui.label("Self");
                    ui.label(describe(stats.self_weight));
                    ui.end_row();
                    ui.label("Total");
                    ui.label(describe(stats.total_weight));
                    ui.end_row();
                    ui.label("Occurrences");
                    ui.label(stats.occurrences.to_string());
                    ui.end_row();
                });
            });
    }

    // --- chart area ---

    fn chart_area(&mut self, ui: &mut egui::Ui) {
        let area = ui.available_rect_before_wrap();
        let response = ui.allocate_rect(area, egui::Sense::click_and_drag());
        let ppp = ui.ctx().pixels_per_point();
        self.canvas.resize(
            Vec2::new(f64::from(area.width()), f64::from(area.height())),
            f64::from(ppp),
        );

        let layout = match self.layout_panes() {
            Ok(layout) => {
                self.last_wiring_error = None;
                layout
            }
            Err(e) => {
                if self.last_wiring_error != Some(e) {
                    match e {
                        WiringError::NoActiveProfile => log::debug!("not drawing: {e}"),
                        _ => log::error!("not drawing: {e}"),
                    }
                    self.last_wiring_error = Some(e);
                }
                self.placeholder(ui, area, e);
                return;
            }
        };

        let hovered = self.handle_pointer(ui, &response, area, &layout);
        self.draw(&layout);
        self.canvas
            .backend()
            .paint(&ui.painter_at(area), area.min, self.theme_mode);

        if let Some((chart, frame)) = hovered {
            response.on_hover_ui_at_pointer(|ui| {
                ui.strong(chart.frame(frame.frame).name.as_str());
                ui.label(chart.tooltip_label(&frame));
            });
        }
    }

    fn placeholder(&self, ui: &egui::Ui, area: egui::Rect, error: WiringError) {
        let text = match error {
            WiringError::NoActiveProfile if self.session.is_loading() => "Importing…",
            WiringError::NoActiveProfile => "Drop a profile here or click Open",
            WiringError::NoFocalFrame => {
                "Select a frame in Time Order or Left Heavy to see its callers and callees"
            }
            WiringError::MissingCanvas => "No canvas",
        };
        let painter = ui.painter_at(area);
        painter.rect_filled(
            area,
            egui::CornerRadius::ZERO,
            theme::resolve(ThemeToken::Background, self.theme_mode),
        );
        painter.text(
            area.center(),
            egui::Align2::CENTER_CENTER,
            text,
            egui::FontId::proportional(theme::FONT_TITLE),
            theme::resolve(ThemeToken::TextMuted, self.theme_mode),
        );
    }

    /// Split the canvas between the panes of the current view mode and
    /// bring each pane's viewport up to date.
    fn layout_panes(&mut self) -> Result<FrameLayout, WiringError> {
        let views = self.session.views()?;
        let size = self.canvas.logical_size();
        let dpr = self.canvas.device_pixel_ratio();
        let minimap_height = if self.session.view_mode() == ViewMode::Sandwich {
            0.0
        } else {
            self.sizes.minimap_height.min(size.y / 3.0)
        };
        let pane_height = ((size.y - minimap_height) / views.len() as f64).max(0.0);

        for slot in ALL_SLOTS {
            if views.iter().all(|(s, _)| *s != slot) {
                self.panes.remove(&slot);
                self.renderers.evict(self.canvas.backend_mut(), slot);
            }
        }

        let sizes = self.sizes;
        let mut panes = Vec::with_capacity(views.len());
        for (i, (slot, view)) in views.into_iter().enumerate() {
            let chart = self.session.flamechart_for(view)?;
            let key = self.session.layout_key(view)?;
            let rect = Rect::from_xywh(
                0.0,
                minimap_height + i as f64 * pane_height,
                size.x,
                pane_height,
            );
            let pane = self
                .panes
                .entry(slot)
                .or_insert_with(|| Pane::new(key, view, sizes));
            if pane.key != key {
                *pane = Pane::new(key, view, sizes);
            }
            let mut changed = pane
                .viewport
                .set_logical_space_viewport_size(&chart, rect.size, dpr);
            if std::mem::take(&mut pane.fresh) {
                pane.viewport.reset(&chart);
                changed = true;
            }
            if changed {
                self.canvas.request_frame();
            }
            panes.push(PaneLayout {
                slot,
                view,
                key,
                chart,
                rect,
            });
        }

        Ok(FrameLayout {
            panes,
            minimap: (minimap_height > 0.0)
                .then(|| Rect::from_xywh(0.0, 0.0, size.x, minimap_height)),
        })
    }

    fn frame_under(&self, pane: &PaneLayout, local: Vec2) -> Option<FlamechartFrame> {
        let viewport = &self.panes.get(&pane.slot)?.viewport;
        let config = viewport.logical_to_config_position(local - pane.rect.origin)?;
        if config.y < 0.0 {
            return None;
        }
        pane.chart.frame_at(config.x, config.y.floor() as usize).cloned()
    }

    /// Pan, zoom, hover and click. Returns the hovered frame for the tooltip.
    fn handle_pointer(
        &mut self,
        ui: &egui::Ui,
        response: &egui::Response,
        area: egui::Rect,
        layout: &FrameLayout,
    ) -> Option<(Arc<Flamechart>, FlamechartFrame)> {
        let to_local = |p: egui::Pos2| {
            Vec2::new(f64::from(p.x - area.left()), f64::from(p.y - area.top()))
        };
        let pointer = response.hover_pos().map(to_local);
        let mut changed = false;

        // Minimap: click or drag to center the main view.
        if let (Some(minimap), Some(press)) = (
            layout.minimap,
            response.interact_pointer_pos().map(to_local),
        ) && minimap.contains(press)
            && (response.dragged() || response.clicked())
            && let Some(main) = layout.panes.first()
            && let Some(pane) = self.panes.get_mut(&main.slot)
        {
            let config = pane.viewport.config_rect();
            let x = press.x / minimap.width() * main.chart.total_weight() - config.width() / 2.0;
            changed |= pane
                .viewport
                .set_config_space_viewport_rect(&main.chart, &config.with_origin(config.origin.with_x(x)));
            if changed {
                self.canvas.request_frame();
            }
            return None;
        }

        let target = pointer.and_then(|local| layout.pane_at(local).map(|pane| (pane, local)));
        let keyboard_pane = target.map(|(pane, _)| pane).or(layout.panes.first());

        if let Some((pane, local)) = target
            && let Some(state) = self.panes.get_mut(&pane.slot)
        {
            let chart = &pane.chart;
            let local_in_pane = local - pane.rect.origin;

            if response.dragged() {
                let drag = response.drag_delta();
                changed |= state.viewport.pan_by_logical(
                    chart,
                    Vec2::new(-f64::from(drag.x), -f64::from(drag.y)),
                );
            }

            let scroll = ui.input(|i| i.smooth_scroll_delta);
            if scroll.y.abs() > 0.1 {
                let multiplier = 2f64.powf(-f64::from(scroll.y) * 0.01);
                changed |= state
                    .viewport
                    .zoom_around_logical(chart, local_in_pane, multiplier);
            }
            if scroll.x.abs() > 0.1 {
                changed |= state
                    .viewport
                    .pan_by_logical(chart, Vec2::new(-f64::from(scroll.x), 0.0));
            }
            let zoom = ui.input(|i| i.zoom_delta());
            if (zoom - 1.0).abs() > 0.001 {
                changed |= state.viewport.zoom_around_logical(
                    chart,
                    local_in_pane,
                    1.0 / f64::from(zoom),
                );
            }
        }

        if let Some(pane) = keyboard_pane
            && !ui.ctx().wants_keyboard_input()
        {
            changed |= self.handle_navigation_keys(ui, pane);
        }

        let hovered = target.and_then(|(pane, local)| {
            self.frame_under(pane, local)
                .map(|frame| (pane, frame))
        });
        let before = self.session.hovered();
        match &hovered {
            Some((pane, frame)) => self.session.hover(pane.view, Some(frame)),
            None => self.session.hover(ViewKind::Chronological, None),
        }
        changed |= before != self.session.hovered();

        if response.double_clicked()
            && let Some((pane, frame)) = &hovered
            && let Some(state) = self.panes.get_mut(&pane.slot)
        {
            let config = state.viewport.config_rect();
            let target = Rect::from_xywh(frame.start, config.top(), frame.width(), config.height());
            changed |= state
                .viewport
                .set_config_space_viewport_rect(&pane.chart, &target);
        } else if response.clicked() {
            match &hovered {
                Some((pane, frame)) => self.session.select(pane.view, Some(frame)),
                None => {
                    if let Some((pane, _)) = target {
                        self.session.select(pane.view, None);
                    }
                }
            }
            changed = true;
        }

        if changed {
            self.canvas.request_frame();
        }
        hovered.map(|(pane, frame)| (pane.chart.clone(), frame))
    }

    /// Arrow keys pan, `+`/`-` zoom around the center and `0` resets.
    fn handle_navigation_keys(&mut self, ui: &egui::Ui, pane: &PaneLayout) -> bool {
        let Some(state) = self.panes.get_mut(&pane.slot) else {
            return false;
        };
        let chart = &pane.chart;
        let size = state.viewport.logical_size();
        let step = size.x * 0.1;
        let frame_height = state.viewport.sizes().frame_height;
        let center = Vec2::new(size.x / 2.0, size.y / 2.0);
        let mut changed = false;
        ui.input(|i| {
            if i.key_pressed(egui::Key::ArrowLeft) {
                changed |= state.viewport.pan_by_logical(chart, Vec2::new(-step, 0.0));
            }
            if i.key_pressed(egui::Key::ArrowRight) {
                changed |= state.viewport.pan_by_logical(chart, Vec2::new(step, 0.0));
            }
            if i.key_pressed(egui::Key::ArrowUp) {
                changed |= state
                    .viewport
                    .pan_by_logical(chart, Vec2::new(0.0, -frame_height));
            }
            if i.key_pressed(egui::Key::ArrowDown) {
                changed |= state
                    .viewport
                    .pan_by_logical(chart, Vec2::new(0.0, frame_height));
            }
            if i.key_pressed(egui::Key::Plus) || i.key_pressed(egui::Key::Equals) {
                changed |= state.viewport.zoom_around_logical(chart, center, 0.5);
            }
            if i.key_pressed(egui::Key::Minus) {
                changed |= state.viewport.zoom_around_logical(chart, center, 2.0);
            }
            if i.key_pressed(egui::Key::Num0) {
                let before = state.viewport.config_rect();
                state.viewport.reset(chart);
                changed |= before != state.viewport.config_rect();
            }
        });
        changed
    }

    /// Submit a new frame to the backend if anything asked for one.
    fn draw(&mut self, layout: &FrameLayout) {
        if !self.canvas.needs_frame() {
            return;
        }
        let mut prepared = Vec::with_capacity(layout.panes.len());
        for pane in &layout.panes {
            let search = match self.session.search_for(pane.view) {
                Ok(search) => search.clone(),
                Err(e) => {
                    log::error!("not drawing: {e}");
                    return;
                }
            };
            let hovered = self.session.hovered_node(pane.view);
            let selected = self.session.selected_node(pane.view);
            prepared.push((pane, search, hovered, selected));
        }

        let dpr = self.canvas.device_pixel_ratio();
        let renderers = &mut self.renderers;
        let panes = &self.panes;
        let result = self.canvas.on_animation_frame(|backend, passes| {
            for (pane, search, hovered, selected) in &prepared {
                let Some(state) = panes.get(&pane.slot) else {
                    continue;
                };
                let key = RendererKey {
                    canvas: CANVAS,
                    layout: pane.key,
                };
                let renderer =
                    renderers.get_or_create(backend, pane.slot, key, || pane.chart.clone());
                let props = RenderProps {
                    viewport: &state.viewport,
                    origin: pane.rect.origin * dpr,
                    search,
                    hovered: *hovered,
                    selected: *selected,
                };
                renderer.render(backend, &props, passes)?;
                if pane.slot == ViewSlot::Main
                    && let Some(minimap) = layout.minimap
                {
                    let area = Rect::new(minimap.origin * dpr, minimap.size * dpr);
                    renderer.render_minimap(backend, area, &state.viewport, passes)?;
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            log::error!("dropped frame: {e}");
        }
    }
}

impl eframe::App for FlameApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.take_pending();
        self.take_dropped_files(ctx);
        self.handle_keys(ctx);

        if self.session.is_loading() {
            if self.session.poll_import() {
                self.canvas.request_frame();
            }
            ctx.request_repaint();
        }
        self.sync_window_title(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| self.status_bar(ui));
        self.detail_panel(ctx);
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| self.chart_area(ui));
    }
}
