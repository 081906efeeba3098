//! CLI command handlers. Each command is in its own file.

mod cancel;
mod checksum;
mod export;
mod output;
mod result;
mod run;
mod status;
mod submit;
mod sweep;

pub use cancel::run_cancel;
pub use checksum::run_checksum;
pub use export::run_export;
pub use result::run_result;
pub use run::{run_serve, run_workers};
pub use status::{run_list, run_status};
pub use submit::{run_submit, SubmitArgs};
pub use sweep::run_sweep;

#[cfg(test)]
pub(crate) use submit::items_from_text;
