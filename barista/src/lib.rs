//! A drinks menu served over HTTP
//!
//! Anyone may read the short menu. Reading full recipes and changing the
//! menu require a bearer token granting the matching permission:
//!
//! | Route | Permission |
//! |---|---|
//! | `GET /drinks` | none |
//! | `GET /drinks-detail` | `get:drinks-detail` |
//! | `POST /drinks` | `post:drinks` |
//! | `PATCH /drinks/:id` | `patch:drinks` |
//! | `DELETE /drinks/:id` | `delete:drinks` |

#![warn(unused_import_braces, unused_imports)]
#![deny(missing_debug_implementations, unused_must_use)]
#![forbid(unsafe_code)]

mod app;
pub mod config;
pub mod drink;
mod error;
pub mod permission;
pub mod routes;
pub mod store;

pub use app::{router, AppState};
pub use config::Config;
pub use error::ApiError;
