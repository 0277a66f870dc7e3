//! CLI command implementations.
//!
//! | Module   | Commands handled   |
//! |----------|--------------------|
//! | `serve`  | `Serve`            |
//! | `db`     | `Seed`, `InitDb`   |
//! | `config` | `Config`           |

pub mod config;
pub mod db;
pub mod serve;

pub use config::cmd_config;
pub use db::{cmd_init_db, cmd_seed};
pub use serve::cmd_serve;
