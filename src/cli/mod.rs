mod command;
mod runner;
mod util;

pub use crate::runner::OutputMode;
pub use command::Command;
pub use runner::{run, run_with_format};
pub use util::{parse_projection, parse_sort};
