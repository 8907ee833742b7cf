//! # HTTP Request Engine
//!
//! One reqwest client per request, pinned to the bound network when there is
//! one. Method dispatch:
//!
//! | Method       | Body sent                      | `filePath` means |
//! |--------------|--------------------------------|------------------|
//! | GET          | none                           | download target  |
//! | POST / PUT   | file, else bytes, else empty   | upload source    |
//! | DELETE, MOVE | empty                          | ignored          |
//!
//! Downloads and uploads report `d-p` / `u-p` progress on the event bus.

mod engine;
mod method;
mod request;
mod response;
mod upload;

pub use engine::HttpEngine;
pub use method::HttpMethod;
pub use request::{HttpRequestSpec, HttpRequestSpecBuilder};
pub use response::{HttpResult, ResponseHeaders};
pub use upload::{StallWatch, UPLOAD_CHUNK_SIZE};
