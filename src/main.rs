mod cli;
mod output;
mod tui;
mod watch;

use std::fs::OpenOptions;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rusqlite::Connection;

use cli::{Cli, Command, MoveTarget};
use tasknest::config::Config;
use tasknest::model::{Placement, TaskId};
use tasknest::service::{ListOwnerGate, Mutation, Request, TaskService};
use tasknest::{db, paths, reconcile};

fn ensure_db_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn open_db(db_path: &str, requester: &str) -> Result<Connection> {
    let conn = db::open(db_path).with_context(|| format!("failed to open {db_path}"))?;
    db::init(&conn, requester).context("failed to initialize schema")?;
    Ok(conn)
}

/// CLI commands log to stderr; the TUI owns the terminal, so it logs to
/// the file named by `TNEST_LOG`, or not at all.
fn setup_logging(tui: bool) -> Result<()> {
    if !tui {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
        return Ok(());
    }
    let Ok(log_path) = std::env::var("TNEST_LOG") else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {log_path}"))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_secs()
        .init();
    Ok(())
}

fn move_target(target: &MoveTarget) -> (Option<TaskId>, Placement) {
    match (target.before, target.after) {
        (Some(reference), _) => (Some(reference), Placement::Before),
        (_, Some(reference)) => (Some(reference), Placement::After),
        (None, None) if target.first => (None, Placement::Before),
        (None, None) => (None, Placement::After),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(matches!(cli.command, Command::Tree { .. }))?;

    let config = Config::load()?;
    let db_path = cli.db.unwrap_or_else(paths::db_path);
    let requester = cli.requester.unwrap_or_else(paths::default_requester);
    ensure_db_dir(&db_path)?;
    let conn = open_db(&db_path, &requester)?;
    let service = TaskService::new(&conn, ListOwnerGate).with_max_depth(config.max_depth());

    // Resolve a list argument and apply one mutation to it.
    let mutate = |list: &str, mutation: Mutation| -> Result<tasknest::model::Snapshot> {
        let list = service.resolve_list(list)?;
        let snapshot = service
            .apply(&Request::new(requester.as_str(), list.id), mutation)
            .with_context(|| format!("list '{}'", list.name))?;
        Ok(snapshot)
    };

    match cli.command {
        Command::Init => {
            eprintln!("Initialized {db_path}");
        }

        Command::ListNew { name } => {
            let list = service.create_list(&name, &requester)?;
            println!("{}", list.id);
            eprintln!("Created list '{}' owned by '{}'", list.name, list.owner);
        }

        Command::Lists { json } => {
            let lists = service.lists()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&lists)?);
            } else {
                print!("{}", output::format_lists(&lists));
            }
        }

        Command::Add {
            list,
            content,
            parent,
        } => {
            let mutation = match parent {
                Some(parent) => Mutation::CreateChild { parent, content },
                None => Mutation::CreateRoot { content },
            };
            let snapshot = mutate(&list, mutation)?;
            if let Some(id) = snapshot.created {
                println!("{id}");
            }
        }

        Command::Move { list, task, target } => {
            let (reference, placement) = move_target(&target);
            mutate(
                &list,
                Mutation::MoveAsSibling {
                    task,
                    reference,
                    placement,
                },
            )?;
            eprintln!("Moved task {task}");
        }

        Command::Nest { list, task, parent } => {
            mutate(&list, Mutation::MoveAsChild { task, parent })?;
            eprintln!("Nested task {task} under {parent}");
        }

        Command::Unnest { list, task } => {
            mutate(&list, Mutation::DetachToRoot { task })?;
            eprintln!("Moved task {task} to root level");
        }

        Command::Rm { list, task } => {
            mutate(&list, Mutation::DeleteSubtree { task })?;
            eprintln!("Removed task {task}");
        }

        Command::Done { list, task } => {
            mutate(&list, Mutation::SetDone { task, done: true })?;
            eprintln!("Marked task {task} as done");
        }

        Command::Undone { list, task } => {
            mutate(&list, Mutation::SetDone { task, done: false })?;
            eprintln!("Marked task {task} as not done");
        }

        Command::Edit {
            list,
            task,
            content,
        } => {
            mutate(&list, Mutation::Edit { task, content })?;
            eprintln!("Updated task {task}");
        }

        Command::Show { list, tree, json } => {
            let list = service.resolve_list(&list)?;
            let req = Request::new(requester.as_str(), list.id);
            if json {
                let tasks = service.tasks(&req)?;
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                let snapshot = service.snapshot(&req)?;
                if tree {
                    print!("{}", output::format_tree(&snapshot.rows));
                } else {
                    print!("{}", output::format_rows(&snapshot.rows));
                }
            }
        }

        Command::Check { list } => {
            let list = service.resolve_list(&list)?;
            let tasks = service.tasks(&Request::new(requester.as_str(), list.id))?;
            let violations = reconcile::verify(&tasks, config.max_depth());
            if !violations.is_empty() {
                eprint!("{}", output::format_violations(&violations));
                bail!(
                    "list '{}' has {} invariant violation(s)",
                    list.name,
                    violations.len()
                );
            }
            eprintln!("List '{}' is consistent ({} tasks)", list.name, tasks.len());
        }

        Command::Tree {
            list,
            poll_interval,
        } => {
            let list = service.resolve_list(&list)?;
            let request = Request::new(requester.as_str(), list.id);
            tui::run(
                &db_path,
                &service,
                &request,
                list.name,
                config.classifier(),
                poll_interval,
            )?;
        }
    }

    Ok(())
}
