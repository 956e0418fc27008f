//! cross-serve - HTTP API over the Crosspost publish orchestrator
//!
//! Routes:
//!
//! | Method   | Path                          | Purpose                         |
//! |----------|-------------------------------|---------------------------------|
//! | `POST`   | `/publish`                    | publish to several platforms    |
//! | `GET`    | `/auth/{platform}/start`      | begin an OAuth connection       |
//! | `GET`    | `/auth/{platform}/callback`   | finish an OAuth connection      |
//! | `GET`    | `/auth/{platform}/status`     | connection and handle status    |
//! | `DELETE` | `/auth/{platform}`            | disconnect                      |
//! | `GET`    | `/posts?limit=`               | caller's recent publishes       |
//! | `GET`    | `/posts/{id}`                 | recorded publish history        |
//! | `GET`    | `/health`                     | liveness                        |
//!
//! Callers identify the user with the `x-user-id` header (and optionally
//! `x-user-email`).

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
