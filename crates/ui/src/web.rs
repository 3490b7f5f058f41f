//! Browser plumbing: fetching profiles, the inbound message channel and
//! downloads.

use std::sync::PoisonError;

use flamescope_core::input::parse_import_message;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::app::{Incoming, PendingFile};

/// Last path segment of `url`, without query or fragment.
fn file_name_of(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => url,
    }
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, String> {
    let window = web_sys::window().ok_or("no window")?;
    let resp_value = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|e| format!("{e:?}"))?;
    let resp: web_sys::Response = resp_value.dyn_into().map_err(|_| "not a Response")?;
    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }
    let buf = JsFuture::from(resp.array_buffer().map_err(|e| format!("{e:?}"))?)
        .await
        .map_err(|e| format!("{e:?}"))?;
    Ok(js_sys::Uint8Array::new(&buf).to_vec())
}

/// Fetch `url` in the background and queue it for import.
pub(crate) fn fetch_into(
    pending: PendingFile,
    ctx: egui::Context,
    url: String,
    title: Option<String>,
) {
    wasm_bindgen_futures::spawn_local(async move {
        log::info!("fetching {url}");
        match fetch_bytes(&url).await {
            Ok(bytes) => {
                let incoming = Incoming {
                    file_name: file_name_of(&url).to_owned(),
                    bytes,
                    title,
                };
                *pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(incoming);
                ctx.request_repaint();
            }
            Err(e) => log::warn!("cannot fetch {url}: {e}"),
        }
    });
}

/// Accept `url|frameId` messages posted by the embedding page.
pub(crate) fn listen_for_messages(pending: PendingFile, ctx: egui::Context) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let on_message = Closure::<dyn FnMut(web_sys::MessageEvent)>::new(
        move |event: web_sys::MessageEvent| {
            let Some(text) = event.data().as_string() else {
                return;
            };
            match parse_import_message(&text) {
                Some(request) => {
                    fetch_into(pending.clone(), ctx.clone(), request.url, request.title);
                }
                None => log::debug!("ignoring message {text:?}"),
            }
        },
    );
    window.add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())?;
    // The listener lives as long as the page.
    on_message.forget();
    Ok(())
}

/// Offer `contents` to the user as a file download.
pub(crate) fn download(file_name: &str, contents: &str) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let parts = js_sys::Array::of1(&JsValue::from_str(contents));
    let blob = web_sys::Blob::new_with_str_sequence(&parts)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob)?;
    let anchor: web_sys::HtmlAnchorElement = document.create_element("a")?.dyn_into()?;
    anchor.set_href(&url);
    anchor.set_download(file_name);
    anchor.click();
    web_sys::Url::revoke_object_url(&url)
}
