//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `plan`   | `Plan`           |
//! | `config` | `Config`         |

pub mod config;
pub mod plan;

pub use config::cmd_config;
pub use plan::cmd_plan;
