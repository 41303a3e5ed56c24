use clap::{Args, Parser, Subcommand};

use tasknest::model::TaskId;

#[derive(Parser)]
#[command(name = "tnest", about = "Two-tier task lists")]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.tasknest/tasknest.db]
    #[arg(long, env = "TNEST_DB", global = true)]
    pub db: Option<String>,

    /// Who is making the request [default: $USER]
    #[arg(long = "as", env = "TNEST_USER", global = true)]
    pub requester: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create database and tables (idempotent)
    Init,

    /// Create a list owned by the requester
    ListNew {
        /// List name (unique)
        name: String,
    },

    /// Show all lists
    Lists {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a task as the last root, or as the last child of --parent
    Add {
        /// List name or id
        list: String,
        /// Task content
        content: String,
        /// Parent task id
        #[arg(short, long)]
        parent: Option<TaskId>,
    },

    /// Move a task next to a sibling, or to the first/last root
    Move {
        /// List name or id
        list: String,
        /// Task to move
        task: TaskId,
        #[command(flatten)]
        target: MoveTarget,
    },

    /// Make a task the last child of another
    Nest {
        /// List name or id
        list: String,
        /// Task to move
        task: TaskId,
        /// New parent
        parent: TaskId,
    },

    /// Turn a child back into the last root
    Unnest {
        /// List name or id
        list: String,
        task: TaskId,
    },

    /// Remove a task and everything below it
    Rm {
        /// List name or id
        list: String,
        task: TaskId,
    },

    /// Mark a task as done
    Done {
        /// List name or id
        list: String,
        task: TaskId,
    },

    /// Mark a task as not done
    Undone {
        /// List name or id
        list: String,
        task: TaskId,
    },

    /// Replace a task's content
    Edit {
        /// List name or id
        list: String,
        task: TaskId,
        /// New content
        content: String,
    },

    /// Print a list in display order
    Show {
        /// List name or id
        list: String,
        /// Display as tree
        #[arg(long)]
        tree: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify the tree invariants of a list
    Check {
        /// List name or id
        list: String,
    },

    /// Launch interactive TUI
    Tree {
        /// List name or id
        list: String,
        /// Poll interval in milliseconds
        #[arg(long, default_value = "250")]
        poll_interval: u64,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct MoveTarget {
    /// Place before this sibling
    #[arg(long)]
    pub before: Option<TaskId>,
    /// Place after this sibling
    #[arg(long)]
    pub after: Option<TaskId>,
    /// Make it the first root
    #[arg(long)]
    pub first: bool,
    /// Make it the last root
    #[arg(long)]
    pub last: bool,
}
