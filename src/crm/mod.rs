//! The AFPI CRM back-end.
//!
//! | Module    | Contents                                                    |
//! |-----------|-------------------------------------------------------------|
//! | `models`  | Records, write inputs, partial patches and their validation |
//! | `db`      | SQLite schema and queries, `DbHandle` for async callers     |
//! | `auth`    | Argon2 password hashing and HS256 access tokens             |
//! | `seed`    | Idempotent reference data and the first administrator       |
//! | `api`     | axum handlers, authorization and the JSON error envelope    |
//! | `server`  | Router assembly with CORS and tracing, listener lifecycle   |

pub mod api;
pub mod auth;
pub mod db;
pub mod models;
pub mod seed;
pub mod server;
