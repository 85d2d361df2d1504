//! Request and response hooks.

use std::sync::Arc;

use http::HeaderMap;
use parking_lot::Mutex;

use crate::envelope::RequestEnvelope;

/// Observes and adjusts calls made by a [`ServerProxy`][super::ServerProxy].
///
/// Hooks run in registration order. `prepare_request` runs after the envelope is
/// built and before it is serialized; `handle_response` runs once a 200 response
/// head has arrived, before the body is read.
pub trait RequestHooks: Send + std::fmt::Debug {
    /// Adjust an outgoing request.
    fn prepare_request(&mut self, envelope: &mut RequestEnvelope, headers: &mut HeaderMap) {
        let _ = (envelope, headers);
    }

    /// Inspect an incoming response head.
    fn handle_response(&mut self, response: &http::response::Parts) {
        let _ = response;
    }
}

impl<H: RequestHooks + ?Sized> RequestHooks for Box<H> {
    fn prepare_request(&mut self, envelope: &mut RequestEnvelope, headers: &mut HeaderMap) {
        (**self).prepare_request(envelope, headers)
    }

    fn handle_response(&mut self, response: &http::response::Parts) {
        (**self).handle_response(response)
    }
}

/// Shares a hook with the caller, who can keep inspecting it between calls.
impl<H: RequestHooks> RequestHooks for Arc<Mutex<H>> {
    fn prepare_request(&mut self, envelope: &mut RequestEnvelope, headers: &mut HeaderMap) {
        self.lock().prepare_request(envelope, headers)
    }

    fn handle_response(&mut self, response: &http::response::Parts) {
        self.lock().handle_response(response)
    }
}
