//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                                  |
//! |----------|---------------------------------------------------|
//! | `run`    | `Plan`, `Build`, `Test`, `Review`, `Document`, `Run` |
//! | `status` | `Status`                                          |

pub mod run;
pub mod status;

pub use run::{cmd_build, cmd_document, cmd_plan, cmd_review, cmd_run, cmd_test};
pub use status::cmd_status;
