//! Browser document via `web-sys`.
//!
//! The browser runs scripts on one thread, so the process-wide loader lives
//! in a thread-local owned by this module.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_events::EventListener;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlScriptElement;

use crate::element::ScriptElement;
use crate::error::LoadError;
use crate::handle::{CompletionSignal, LoadHandle};
use crate::host::ScriptHost;
use crate::loader::ScriptLoader;

thread_local! {
    static LOADER: ScriptLoader<WebDocument> = ScriptLoader::new(WebDocument);
}

/// The page's `document`. Elements are appended to `document.head`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebDocument;

type SignalSlot = Rc<RefCell<Option<CompletionSignal>>>;

impl ScriptHost for WebDocument {
    fn attach(&self, element: ScriptElement, signal: CompletionSignal) {
        let slot: SignalSlot = Rc::new(RefCell::new(Some(signal)));

        if let Err(err) = insert(&element, &slot) {
            let signal = slot.borrow_mut().take();
            if let Some(signal) = signal {
                signal.error_with(describe(&err));
            }
        }
    }
}

fn insert(element: &ScriptElement, slot: &SignalSlot) -> Result<(), JsValue> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let head = document
        .head()
        .ok_or_else(|| JsValue::from_str("document has no head"))?;

    let script = document
        .create_element("script")?
        .dyn_into::<HtmlScriptElement>()
        .map_err(JsValue::from)?;

    script.set_src(&element.src);
    if element.module {
        script.set_type("module");
    }
    script.set_defer(element.defer);
    script.set_async(element.async_load);
    if let Some(integrity) = &element.integrity {
        script.set_integrity(integrity);
    }
    script.set_cross_origin(element.crossorigin.as_deref());

    // Whichever event fires first consumes the signal.
    let on_load = Rc::clone(slot);
    EventListener::once(&script, "load", move |_| {
        let signal = on_load.borrow_mut().take();
        if let Some(signal) = signal {
            signal.load();
        }
    })
    .forget();

    let on_error = Rc::clone(slot);
    EventListener::once(&script, "error", move |_| {
        let signal = on_error.borrow_mut().take();
        if let Some(signal) = signal {
            signal.error();
        }
    })
    .forget();

    head.append_child(&script)?;
    Ok(())
}

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

/// The page-wide loader.
pub fn loader() -> ScriptLoader<WebDocument> {
    LOADER.with(Clone::clone)
}

/// Load `url` into the page once, sharing the load with every other caller.
pub fn load_script(url: &str) -> LoadHandle {
    LOADER.with(|loader| loader.ensure_loaded(url))
}

/// Errors from [`init_wasm_bindgen`].
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("No global wasm_bindgen entry point after loading {0}")]
    MissingEntryPoint(String),

    #[error("wasm_bindgen initialization failed: {0}")]
    Js(String),
}

/// Load a `--target no-modules` glue script and instantiate `wasm_url`
/// through its global `wasm_bindgen` function.
pub async fn init_wasm_bindgen(glue_url: &str, wasm_url: &str) -> Result<(), InitError> {
    load_script(glue_url).await?;

    let entry = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("wasm_bindgen"))
        .ok()
        .and_then(|value| value.dyn_into::<js_sys::Function>().ok())
        .ok_or_else(|| InitError::MissingEntryPoint(glue_url.to_string()))?;

    tracing::debug!("Instantiating {} via {}", wasm_url, glue_url);
    let result = entry
        .call1(&JsValue::NULL, &JsValue::from_str(wasm_url))
        .map_err(|e| InitError::Js(describe(&e)))?;

    if let Ok(promise) = result.dyn_into::<js_sys::Promise>() {
        JsFuture::from(promise)
            .await
            .map_err(|e| InitError::Js(describe(&e)))?;
    }

    Ok(())
}
