//! Command-line argument definitions and exit-code mapping.

mod args;

pub use args::{CheckpointAction, ExitCode, FreightlinerArgs, FreightlinerSubcommand};
