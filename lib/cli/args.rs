use std::path::PathBuf;

use clap::{Parser, Subcommand};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// freightliner replicates container images between OCI-compliant registries
#[derive(Debug, Parser)]
#[command(name = "freightliner", author, version)]
pub struct FreightlinerArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: FreightlinerSubcommand,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Path to the registries config file (defaults to
    /// `~/.freightliner/registries.yaml`, overridden by `FREIGHTLINER_CONFIG`)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum FreightlinerSubcommand {
    /// Copy a single repository tag from one registry to another
    #[command(name = "replicate")]
    Replicate {
        /// Source, as `registry/repository`
        source: String,

        /// Destination, as `registry/repository`
        destination: String,

        /// Tags to copy; glob patterns, comma-separated (default: all tags)
        #[arg(long, value_delimiter = ',')]
        include_tag: Vec<String>,

        /// Tags to skip; glob patterns, comma-separated
        #[arg(long, value_delimiter = ',')]
        exclude_tag: Vec<String>,

        /// Re-copy even when the destination digest already matches
        #[arg(long)]
        force: bool,

        /// Plan the copy without performing writes
        #[arg(long)]
        dry_run: bool,
    },

    /// Replicate every repository under a source prefix to a destination prefix
    #[command(name = "replicate-tree")]
    ReplicateTree {
        /// Source prefix, as `registry/prefix`
        source: String,

        /// Destination prefix, as `registry/prefix`
        destination: String,

        /// Number of concurrent per-repository workers (0 = auto-detect)
        #[arg(long, default_value_t = 0)]
        workers: usize,

        /// Repositories to skip; glob patterns, comma-separated
        #[arg(long, value_delimiter = ',')]
        exclude_repo: Vec<String>,

        /// Tags to copy; glob patterns, comma-separated
        #[arg(long, value_delimiter = ',')]
        include_tag: Vec<String>,

        /// Tags to skip; glob patterns, comma-separated
        #[arg(long, value_delimiter = ',')]
        exclude_tag: Vec<String>,

        /// Plan the copy without performing writes
        #[arg(long)]
        dry_run: bool,

        /// Re-copy even when the destination digest already matches
        #[arg(long)]
        force: bool,

        /// Persist progress to a checkpoint file
        #[arg(long, default_value_t = true)]
        checkpoint: bool,

        /// Directory checkpoints are written under
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Resume a previously checkpointed job
        #[arg(long)]
        resume: Option<uuid::Uuid>,

        /// Skip repositories already marked completed in the checkpoint (implied by --resume)
        #[arg(long)]
        skip_completed: bool,

        /// Also retry repositories marked failed in the checkpoint
        #[arg(long)]
        retry_failed: bool,
    },

    /// Run the HTTP server
    #[command(name = "serve")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Host to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },

    /// Inspect or manage checkpoint files
    #[command(name = "checkpoint")]
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

/// Actions for the `checkpoint` subcommand.
#[derive(Debug, Subcommand)]
pub enum CheckpointAction {
    /// List checkpointed jobs
    List {
        /// Directory checkpoints are read from
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },
    /// Print one checkpoint's contents
    Show {
        /// The job id to show
        job_id: uuid::Uuid,

        /// Directory checkpoints are read from
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },
    /// Delete a checkpoint file
    Delete {
        /// The job id to delete
        job_id: uuid::Uuid,

        /// Directory checkpoints are read from
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

/// Process exit codes, per the CLI's documented contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// The operation completed successfully.
    Success = 0,
    /// An unclassified error occurred.
    GenericError = 1,
    /// The command-line arguments were invalid.
    UsageError = 2,
    /// Configuration failed validation.
    ValidationError = 3,
    /// An upstream registry returned an error.
    UpstreamError = 4,
    /// The operation was canceled (SIGINT or explicit cancellation).
    Canceled = 130,
}

impl From<&crate::error::FreightlinerError> for ExitCode {
    fn from(err: &crate::error::FreightlinerError) -> Self {
        use crate::error::{FreightlinerError, RegistryErrorKind};
        match err {
            FreightlinerError::ConfigInvalid(_) | FreightlinerError::ConfigInvalidMany(_) => ExitCode::ValidationError,
            FreightlinerError::Registry(e) if e.is(RegistryErrorKind::Canceled) => ExitCode::Canceled,
            FreightlinerError::Registry(e)
                if matches!(
                    e.kind,
                    RegistryErrorKind::Unauthorized
                        | RegistryErrorKind::Forbidden
                        | RegistryErrorKind::Unavailable
                        | RegistryErrorKind::NotFound
                        | RegistryErrorKind::AlreadyExists
                ) =>
            {
                ExitCode::UpstreamError
            }
            FreightlinerError::Registry(e) if e.is(RegistryErrorKind::InvalidInput) => ExitCode::UsageError,
            _ => ExitCode::GenericError,
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FreightlinerError;

    #[test]
    fn canceled_registry_error_maps_to_130() {
        let err = FreightlinerError::canceled("stopped");
        assert_eq!(ExitCode::from(&err), ExitCode::Canceled);
    }

    #[test]
    fn invalid_input_maps_to_usage_error() {
        let err = FreightlinerError::invalid_input("bad flag");
        assert_eq!(ExitCode::from(&err), ExitCode::UsageError);
    }

    #[test]
    fn config_invalid_maps_to_validation_error() {
        let err = FreightlinerError::ConfigInvalid("missing region".into());
        assert_eq!(ExitCode::from(&err), ExitCode::ValidationError);
    }

    #[test]
    fn parses_replicate_subcommand() {
        let args = FreightlinerArgs::parse_from([
            "freightliner",
            "replicate",
            "src/app",
            "dst/app",
            "--force",
        ]);
        match args.subcommand {
            FreightlinerSubcommand::Replicate { source, destination, force, .. } => {
                assert_eq!(source, "src/app");
                assert_eq!(destination, "dst/app");
                assert!(force);
            }
            other => panic!("expected Replicate, got {other:?}"),
        }
    }
}
