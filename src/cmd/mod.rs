//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `init`   | `Init`           |
//! | `run`    | `Run`            |
//! | `status` | `Status`, `Reset`|

pub mod init;
pub mod run;
pub mod status;

pub use init::cmd_init;
pub use run::cmd_run;
pub use status::{cmd_reset, cmd_status};
