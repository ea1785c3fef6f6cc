//! RenameSleuth — script-driven batch renamer.
//!
//! Thin binary entry point. All logic lives in the `renamesleuth-core`
//! and `renamesleuth-cli` crates.

use anyhow::{bail, Context, Result};
use clap::Parser;
use renamesleuth_cli::render;
use renamesleuth_cli::{ScriptSource, Session};
use renamesleuth_core::config::Settings;
use renamesleuth_core::engine::{RunRequest, Workspace};
use renamesleuth_core::model::TreeSide;
use renamesleuth_core::script::{RhaiEvaluator, ScriptEvaluator};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// How often the progress line is refreshed while a job runs.
const TICK: Duration = Duration::from_millis(100);

/// Preview and apply script-driven renames of a directory tree
#[derive(Parser, Debug)]
#[command(name = "RenameSleuth", version, about, long_about = None)]
struct Cli {
    /// Directory whose contents are renamed
    directory: Option<PathBuf>,

    /// Read the renaming script from a file
    #[arg(short, long, value_name = "FILE", conflicts_with = "inline")]
    script: Option<PathBuf>,

    /// Renaming script given directly on the command line
    #[arg(short = 'e', long, value_name = "SCRIPT")]
    inline: Option<String>,

    /// Only rename entries directly inside the directory
    #[arg(short = 'n', long)]
    no_recursive: bool,

    /// Write the preview to disk after generating it
    #[arg(short, long)]
    apply: bool,

    /// Settings file (JSON); defaults are used when missing
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print a machine-readable report instead of trees
    #[arg(long)]
    json: bool,

    /// Only validate the script
    #[arg(long)]
    check: bool,

    /// Print the example script and exit
    #[arg(long)]
    print_example: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialise structured logging. Logs go to stderr, results to stdout.
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if cli.print_example {
        print!("{}", renamesleuth_cli::script_source::EXAMPLE_SCRIPT);
        return Ok(ExitCode::SUCCESS);
    }

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let source = ScriptSource::from_args(cli.inline.clone(), cli.script.clone());

    if cli.check {
        let script = source.resolve()?;
        return match RhaiEvaluator::new().check_syntax(&script) {
            Ok(()) => {
                println!("The script is valid.");
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                println!("The script is not valid.\n{err}");
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let Some(directory) = cli.directory.clone() else {
        bail!("no directory given");
    };
    let recursive = settings.include_subdirectories && !cli.no_recursive;
    tracing::info!("RenameSleuth starting on {}", directory.display());

    let mut session = Session::new(settings);
    start(&mut session, |s| s.generate_preview(&source, &directory, recursive))?;
    wait(&mut session, cli.json);

    if cli.json {
        if let Some(event) = &session.last_event {
            println!(
                "{}",
                render::report_json(event, session.engine.workspace(), &session.faults)?
            );
        }
    } else {
        print_trees(&session);
        print_summary(&session);
    }

    if cli.apply {
        let pending = session
            .engine
            .workspace()
            .is_some_and(Workspace::has_pending_changes);
        if !pending || session.was_aborted {
            bail!("nothing to apply");
        }
        start(&mut session, |s| s.apply_changings())?;
        wait(&mut session, cli.json);
        if cli.json {
            if let Some(event) = &session.last_event {
                println!("{}", render::report_json(event, None, &session.faults)?);
            }
        } else {
            print_summary(&session);
        }
    }

    Ok(if session.errors_occurred > 0 || session.was_aborted {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn start(
    session: &mut Session,
    run: impl FnOnce(&mut Session) -> Result<RunRequest, renamesleuth_cli::SessionError>,
) -> Result<()> {
    match run(session) {
        Ok(RunRequest::Started) => Ok(()),
        Ok(RunRequest::Ignored) => bail!("a job is already running"),
        Err(_) => bail!(
            "{}",
            session
                .notification
                .as_ref()
                .map(|n| n.text.clone())
                .unwrap_or_default()
        ),
    }
}

fn wait(session: &mut Session, quiet: bool) {
    let mut stderr = std::io::stderr();
    session.wait_for_completion(TICK, |s| {
        if quiet || !s.is_busy() {
            return;
        }
        let line = render::progress_text(s.items_processed, s.errors_occurred).replace('\n', ", ");
        let _ = write!(stderr, "\r{line}");
        let _ = stderr.flush();
    });
    if !quiet {
        let _ = writeln!(stderr);
    }
}

fn print_trees(session: &Session) {
    let trees = [
        (TreeSide::Current, session.engine.current_tree(), &session.current_view),
        (TreeSide::Preview, session.engine.preview_tree(), &session.preview_view),
    ];
    for (side, tree, view) in trees {
        if let Some(tree) = tree {
            println!("── {} ──", render::side_label(side));
            print!("{}", render::tree_text(tree, view));
        }
    }
    if let Some(workspace) = session.engine.workspace() {
        let changes = render::changes(workspace);
        if !changes.is_empty() {
            println!("── Changes ──");
            print!("{}", render::changes_text(&changes));
        }
    }
}

fn print_summary(session: &Session) {
    if let Some(notification) = &session.notification {
        println!("{}", notification.text);
    }
    if !session.faults.is_empty() {
        eprint!("{}", render::faults_text(&session.faults));
    }
}
