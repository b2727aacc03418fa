/*
    mod.rs - JSON API surface

    A request is a single JSON object: {"method": "...", "params": {...}}.
    Replies are JSON objects; failures always carry "error_code" and
    "error_desc". See codes.rs for the full error taxonomy.
*/

mod codes;
mod dispatcher;
mod wire;

pub use codes::ApiErrorCode;
pub use dispatcher::Dispatcher;
pub use wire::{error_reply, ok_reply, Request};
