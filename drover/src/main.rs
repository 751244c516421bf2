mod logging;
mod tasks;

use clap::Parser;
use drover_tasks::backend::{MemoryDataStore, MemoryQueue};
use drover_tasks::{Consumer, Settings, TaskQueue};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "drover", about = "Runs a task queue consumer process", version)]
struct Args {
    /// Number of worker loops pulling from the queue.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Disable the periodic task loop.
    #[arg(long)]
    no_periodic: bool,

    /// Compare task deadlines in UTC instead of local wall time.
    #[arg(long)]
    utc: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn bootstrap(args: Args) -> Result<(), BoxError> {
    let workers = NonZeroUsize::new(args.workers).unwrap_or(NonZeroUsize::MIN);
    let settings = Settings::builder()
        .workers(workers)
        .periodic(!args.no_periodic)
        .utc(args.utc)
        .build();

    let queue = TaskQueue::builder(Arc::new(MemoryQueue::new()), settings, ())
        .result_store(Arc::new(MemoryDataStore::new()))
        .schedule_store(Arc::new(MemoryDataStore::new()))
        .build()
        .register_task::<tasks::Heartbeat>();

    let consumer = Consumer::new(queue);
    consumer.start().await?;

    tokio::signal::ctrl_c().await?;
    consumer.shutdown().await;
    Ok(())
}

fn start(args: Args) -> Result<(), BoxError> {
    let _guard = logging::init(&args)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(bootstrap(args))
}

fn main() {
    let args = Args::parse();
    if let Err(error) = start(args) {
        eprintln!("{error}");
        std::process::exit(1);
    }
}
