#[path = "handlers.rs"]
mod handlers;

use std::process::ExitCode as ProcessExitCode;

use clap::Parser;
use freightliner::cli::{ExitCode, FreightlinerArgs, FreightlinerSubcommand};
use freightliner::FreightlinerResult;
use tracing_subscriber::EnvFilter;

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ProcessExitCode {
    let args = FreightlinerArgs::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(args).await {
        Ok(()) => ProcessExitCode::from(ExitCode::Success as u8),
        Err(err) => {
            eprintln!("error: {}", err.render_chain());
            ProcessExitCode::from(ExitCode::from(&err) as u8)
        }
    }
}

async fn run(args: FreightlinerArgs) -> FreightlinerResult<()> {
    match args.subcommand {
        FreightlinerSubcommand::Replicate {
            source,
            destination,
            include_tag,
            exclude_tag,
            force,
            dry_run,
        } => {
            handlers::replicate_subcommand(args.config, source, destination, include_tag, exclude_tag, force, dry_run)
                .await
        }
        FreightlinerSubcommand::ReplicateTree {
            source,
            destination,
            workers,
            exclude_repo,
            include_tag,
            exclude_tag,
            dry_run,
            force,
            checkpoint,
            checkpoint_dir,
            resume,
            skip_completed: _,
            retry_failed,
        } => {
            handlers::replicate_tree_subcommand(
                args.config,
                source,
                destination,
                workers,
                exclude_repo,
                include_tag,
                exclude_tag,
                dry_run,
                force,
                checkpoint,
                checkpoint_dir,
                resume,
                retry_failed,
            )
            .await
        }
        FreightlinerSubcommand::Serve { port, host } => handlers::serve_subcommand(args.config, host, port).await,
        FreightlinerSubcommand::Checkpoint { action } => handlers::checkpoint_subcommand(action).await,
    }
}
