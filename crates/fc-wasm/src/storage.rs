//! Browser adapters: `window.localStorage` and `window.location`.

use fc_core::persist::{KeyValueStore, PersistError};
use wasm_bindgen::JsValue;

/// [`KeyValueStore`] over `window.localStorage`.
///
/// The storage handle is looked up on every call; private browsing modes
/// can revoke it at any time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    fn storage() -> Result<web_sys::Storage, PersistError> {
        web_sys::window()
            .ok_or_else(|| PersistError::Storage("no window".into()))?
            .local_storage()
            .map_err(js_error)?
            .ok_or_else(|| PersistError::Storage("localStorage is unavailable".into()))
    }
}

impl KeyValueStore for LocalStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Self::storage()?.get_item(key).map_err(js_error)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        Self::storage()?.set_item(key, value).map_err(js_error)
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        Self::storage()?.remove_item(key).map_err(js_error)
    }
}

fn js_error(e: JsValue) -> PersistError {
    PersistError::Storage(e.as_string().unwrap_or_else(|| format!("{e:?}")))
}

/// `(origin, pathname, hash)` of the current page.
pub fn page_location() -> Option<(String, String, String)> {
    let location = web_sys::window()?.location();
    Some((
        location.origin().ok()?,
        location.pathname().ok()?,
        location.hash().unwrap_or_default(),
    ))
}
