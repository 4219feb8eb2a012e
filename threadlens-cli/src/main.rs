use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use threadlens_core::{
    ThreadRef, ThreadRoots, ThreadlensError, list_threads, load_stream, load_thread,
    read_thread_raw, render_stream_markdown, render_thread_list_markdown, render_thread_markdown,
    resolve_thread, stream_to_thread, thread_groups_to_raw_json, thread_list_view_to_raw_json,
    thread_to_raw_json,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(
    name = "threadlens",
    version,
    about = "Read agent thread snapshots as markdown"
)]
struct Cli {
    /// Thread id, thread://<thread_id>, or a path to a thread.json snapshot
    thread: Option<String>,

    /// Output the raw snapshot JSON instead of markdown
    #[arg(long, conflicts_with = "groups")]
    raw: bool,

    /// Output the message groups as JSON
    #[arg(long)]
    groups: bool,

    /// Strip citations instead of listing sources
    #[arg(long, conflicts_with_all = ["raw", "groups"])]
    clean: bool,

    /// List threads under the threads root
    #[arg(long, conflicts_with_all = ["groups", "clean", "stream"])]
    list: bool,

    /// Replay a JSON-lines stream capture instead of reading a snapshot
    #[arg(long, value_name = "FILE")]
    stream: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> threadlens_core::Result<()> {
    if cli.list {
        if cli.thread.is_some() {
            return Err(ThreadlensError::InvalidMode(
                "--list cannot be used with a thread reference".to_string(),
            ));
        }

        let view = list_threads(&ThreadRoots::from_env_or_home()?)?;
        if cli.raw {
            let raw_json = thread_list_view_to_raw_json(&view)?;
            print!("{raw_json}");
        } else {
            let markdown = render_thread_list_markdown(&view);
            print!("{markdown}");
        }
        return Ok(());
    }

    if let Some(path) = cli.stream.as_deref() {
        if cli.thread.is_some() {
            return Err(ThreadlensError::InvalidMode(
                "--stream cannot be used with a thread reference".to_string(),
            ));
        }

        if cli.raw || cli.groups {
            let thread = stream_to_thread(&load_stream(path)?);
            let raw_json = if cli.groups {
                thread_groups_to_raw_json(&thread)?
            } else {
                thread_to_raw_json(&thread)?
            };
            print!("{raw_json}");
        } else {
            let roots = ThreadRoots::backend_from_env();
            let markdown = render_stream_markdown(path, &roots, cli.clean)?;
            print!("{markdown}");
        }
        return Ok(());
    }

    let Some(input) = cli.thread.as_deref() else {
        return Err(ThreadlensError::InvalidMode(
            "a thread reference is required unless --list or --stream is given".to_string(),
        ));
    };
    let thread = ThreadRef::parse(input)?;
    // Only id references need the threads root.
    let roots = match thread {
        ThreadRef::Id(_) => ThreadRoots::from_env_or_home()?,
        ThreadRef::Path(_) => ThreadRoots::backend_from_env(),
    };
    let resolved = resolve_thread(&thread, &roots)?;
    tracing::debug!(%thread, path = %resolved.path.display(), "reading thread");

    if cli.raw {
        let content = read_thread_raw(&resolved.path)?;
        print!("{content}");
    } else if cli.groups {
        let raw_json = thread_groups_to_raw_json(&load_thread(&resolved)?)?;
        print!("{raw_json}");
    } else {
        let markdown = render_thread_markdown(&resolved, &roots, cli.clean)?;
        print!("{markdown}");
    }

    Ok(())
}
