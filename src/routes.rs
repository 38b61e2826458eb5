//! app pages, addressed by the same paths the browser build uses.

use bevy::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Route {
    #[default]
    Home,
    /// chat through the `llm` client binding.
    Chat,
    /// chat through the raw http transport.
    ChatFetch,
    Graph,
    About,
    Debug,
}

impl Route {
    pub const ALL: [Route; 6] = [
        Route::Home,
        Route::Chat,
        Route::ChatFetch,
        Route::Graph,
        Route::About,
        Route::Debug,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Chat => "/chat",
            Route::ChatFetch => "/chat-fetch",
            Route::Graph => "/graph",
            Route::About => "/about",
            Route::Debug => "/debug",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Route::Home => "Home",
            Route::Chat => "Chat",
            Route::ChatFetch => "Chat (fetch)",
            Route::Graph => "Knowledge Graph",
            Route::About => "About",
            Route::Debug => "Debug",
        }
    }

    /// unknown paths fall back to home. query strings and a trailing slash are ignored.
    pub fn from_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let path = path.trim_end_matches('/');
        Self::ALL
            .into_iter()
            .find(|r| r.path().trim_end_matches('/') == path)
            .unwrap_or_default()
    }

    /// initial page: the browser location on wasm, home elsewhere.
    pub fn initial() -> Self {
        #[cfg(target_arch = "wasm32")]
        {
            if let Some(path) = web_sys::window().and_then(|w| w.location().pathname().ok()) {
                return Self::from_path(&path);
            }
        }
        Self::default()
    }

    /// mirror the page into the address bar on wasm. no-op elsewhere.
    pub fn push_location(self) {
        #[cfg(target_arch = "wasm32")]
        {
            let Some(history) = web_sys::window().and_then(|w| w.history().ok()) else {
                return;
            };
            if let Err(e) =
                history.push_state_with_url(&wasm_bindgen::JsValue::NULL, "", Some(self.path()))
            {
                warn!(target: "deepbot", "history.pushState({}) failed: {:?}", self.path(), e);
            }
        }
    }
}

/// the page currently shown.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CurrentRoute(pub Route);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_round_trip() {
        for r in Route::ALL {
            assert_eq!(Route::from_path(r.path()), r);
        }
    }

    #[test]
    fn lenient_parsing() {
        assert_eq!(Route::from_path("/chat/"), Route::Chat);
        assert_eq!(Route::from_path("/graph?q=ai"), Route::Graph);
        assert_eq!(Route::from_path(""), Route::Home);
        assert_eq!(Route::from_path("/nowhere"), Route::Home);
        assert_eq!(Route::from_path("/chat-fetch#bottom"), Route::ChatFetch);
    }
}
