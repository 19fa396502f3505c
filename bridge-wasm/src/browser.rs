//! Browser-side pieces of the redirect login flow.
//!
//! The authorization page is opened in a new browsing context. After the
//! identity provider redirects that context back to the application, a small
//! callback page (`assets/oauth2_callback.html`) posts the response query on a
//! [`BroadcastRedirectChannel`] and the original page picks it up.

use async_trait::async_trait;
use bridge_traits::{
    browser::{PageLocation, RedirectChannel, UrlLauncher},
    error::{BridgeError, Result as BridgeResult},
};
use futures::channel::mpsc;
use futures::lock::Mutex;
use futures::StreamExt;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::{BroadcastChannel, MessageEvent};

use crate::error::{js_error, window};

/// Opens URLs in a new tab or popup window.
#[derive(Debug, Clone)]
pub struct PopupLauncher {
    target: String,
}

impl PopupLauncher {
    /// Launcher using the given `window.open` target name.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Default for PopupLauncher {
    fn default() -> Self {
        Self::new("_blank")
    }
}

#[async_trait(?Send)]
impl UrlLauncher for PopupLauncher {
    async fn open_url(&self, url: &str) -> BridgeResult<()> {
        let opened = window()?
            .open_with_url_and_target(url, &self.target)
            .map_err(|err| js_error("window.open", err))?;
        match opened {
            Some(_) => Ok(()),
            None => Err(BridgeError::NotAvailable(
                "window.open was blocked".to_string(),
            )),
        }
    }
}

/// `BroadcastChannel` listener yielding posted redirect URLs.
///
/// The underlying channel is opened lazily by [`RedirectChannel::next_redirect`]
/// and released by [`RedirectChannel::close`], so one instance serves any
/// number of login attempts.
pub struct BroadcastRedirectChannel {
    name: String,
    subscription: RefCell<Option<Subscription>>,
}

struct Subscription {
    channel: BroadcastChannel,
    receiver: Rc<Mutex<mpsc::UnboundedReceiver<String>>>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
}

impl BroadcastRedirectChannel {
    /// Channel name the bundled callback page posts to.
    pub const DEFAULT_NAME: &'static str = "oauth2-redirect";

    /// Listener for the named channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscription: RefCell::new(None),
        }
    }

    fn subscribe(&self) -> BridgeResult<Rc<Mutex<mpsc::UnboundedReceiver<String>>>> {
        if let Some(existing) = self.subscription.borrow().as_ref() {
            return Ok(existing.receiver.clone());
        }

        let channel =
            BroadcastChannel::new(&self.name).map_err(|err| js_error("BroadcastChannel", err))?;
        let (sender, receiver) = mpsc::unbounded();
        let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            if let Some(url) = event.data().as_string() {
                let _ = sender.unbounded_send(url);
            }
        });
        channel.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        let receiver = Rc::new(Mutex::new(receiver));
        *self.subscription.borrow_mut() = Some(Subscription {
            channel,
            receiver: receiver.clone(),
            _on_message: on_message,
        });
        Ok(receiver)
    }
}

impl Default for BroadcastRedirectChannel {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

#[async_trait(?Send)]
impl RedirectChannel for BroadcastRedirectChannel {
    async fn next_redirect(&self) -> BridgeResult<String> {
        let receiver = self.subscribe()?;
        let mut receiver = receiver.lock().await;
        receiver
            .next()
            .await
            .ok_or_else(|| BridgeError::OperationFailed("redirect channel closed".to_string()))
    }

    fn close(&self) {
        if let Some(subscription) = self.subscription.borrow_mut().take() {
            subscription.channel.set_onmessage(None);
            subscription.channel.close();
        }
    }
}

impl Drop for BroadcastRedirectChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// `window.location` of the running page.
#[derive(Debug, Clone, Default)]
pub struct WindowLocation;

impl PageLocation for WindowLocation {
    fn current_url(&self) -> BridgeResult<String> {
        window()?
            .location()
            .href()
            .map_err(|err| js_error("location.href", err))
    }

    fn replace(&self, url: &str) -> BridgeResult<()> {
        window()?
            .location()
            .replace(url)
            .map_err(|err| js_error("location.replace", err))
    }
}
