#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    use flamescope_core::input::HashParams;
    use flamescope_ui::FlameApp;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let params = HashParams {
        local_profile_path: std::env::args().nth(1),
        ..HashParams::default()
    };
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("flamescope")
            .with_inner_size([1280.0, 800.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };
    eframe::run_native(
        "flamescope",
        options,
        Box::new(|cc| Ok(Box::new(FlameApp::new(cc, params)))),
    )
    .map_err(|e| anyhow::anyhow!("failed to run the native app: {e}"))
}

// The web build starts from `flamescope_ui::start`.
#[cfg(target_arch = "wasm32")]
fn main() {}
