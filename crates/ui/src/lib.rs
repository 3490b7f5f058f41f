mod app;
mod backend;
mod theme;
#[cfg(target_arch = "wasm32")]
mod web;

pub use app::FlameApp;
pub use backend::EguiBackend;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsCast;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Id of the `<canvas>` element the web build draws into.
#[cfg(target_arch = "wasm32")]
const CANVAS_ELEMENT_ID: &str = "flamescope_canvas";

// WASM entry point
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    eframe::WebLogger::init(log::LevelFilter::Info)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let params = flamescope_core::input::HashParams::parse(&window.location().hash()?);
    let canvas = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?
        .get_element_by_id(CANVAS_ELEMENT_ID)
        .ok_or_else(|| JsValue::from_str("no canvas element"))?
        .dyn_into::<web_sys::HtmlCanvasElement>()?;

    let web_options = eframe::WebOptions::default();
    wasm_bindgen_futures::spawn_local(async move {
        let start_result = eframe::WebRunner::new()
            .start(
                canvas,
                web_options,
                Box::new(move |cc| Ok(Box::new(FlameApp::new(cc, params)))),
            )
            .await;
        if let Err(e) = start_result {
            log::error!("failed to start eframe: {e:?}");
        }
    });
    Ok(())
}
