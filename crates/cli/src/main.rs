//! ctx - local code-and-docs retrieval for developer workflows

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io;
use std::path::PathBuf;

mod app;
mod commands;
mod logging;
mod output;

use commands::{
  cmd_ask, cmd_check, cmd_config_get, cmd_config_list, cmd_config_reset, cmd_config_set, cmd_eval_export, cmd_eval_run,
  cmd_index, cmd_list, cmd_remove, cmd_search, cmd_status,
};

#[derive(Parser)]
#[command(name = "ctx")]
#[command(about = "Index source trees and answer questions about them")]
#[command(after_help = "\
QUICK START:
  ctx index ~/code/my-project     # Chunk, embed, and store a project
  ctx search \"jwt middleware\"     # Hybrid retrieval across projects
  ctx ask \"how does login work?\"  # Retrieval + context block for the agent
  ctx eval run --project my-project  # Score retrieval against a golden set

STATE:
  Everything lives under ~/.ctx (override with CTX_DIR).")]
struct Cli {
  /// Show debug detail on errors
  #[arg(long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `ctx eval`
#[derive(Subcommand)]
pub enum EvalCommand {
  /// Run the golden dataset through retrieval and store the metrics
  Run {
    /// Project to evaluate
    #[arg(short, long)]
    project: String,
    /// Dataset path (default: <ctx dir>/eval/<project>.json)
    #[arg(long)]
    dataset: Option<PathBuf>,
    /// topK per query (default: from config)
    #[arg(short = 'k', long)]
    k: Option<usize>,
    /// Only run entries carrying any of these tags
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Export the most recent run's per-query results
  Export {
    /// Project whose runs to export
    #[arg(short, long)]
    project: String,
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

/// Subcommands for `ctx config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Print one value by dotted key, e.g. search.top_k
  Get { key: String },
  /// Set one value by dotted key
  Set { key: String, value: String },
  /// Show the full effective configuration
  List {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Reset the configuration file to defaults
  Reset,
}

#[derive(Subcommand)]
enum Commands {
  /// Index a source tree into the store
  #[command(after_help = "\
EXAMPLES:
  ctx index .                         # Index the current directory
  ctx index ~/code/api --name api     # Explicit project name
  ctx index . --tags backend,auth     # Tag for query routing
  ctx index . --force                 # Replace an existing index")]
  Index {
    /// Directory to index
    path: PathBuf,
    /// Project name (default: directory name)
    #[arg(long)]
    name: Option<String>,
    /// Comma-separated tags used by query routing
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
    /// Project description
    #[arg(long)]
    description: Option<String>,
    /// Extra ignore patterns (gitignore syntax, `!` re-includes)
    #[arg(long = "ignore")]
    ignore: Vec<String>,
    /// Replace an existing index for this project
    #[arg(long)]
    force: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// List indexed projects
  #[command(alias = "ls")]
  List {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Remove a project and all of its data
  Remove {
    /// Project name
    name: String,
    /// Skip the confirmation prompt
    #[arg(long)]
    force: bool,
  },
  /// Hybrid retrieval without the LLM step
  #[command(after_help = "\
EXAMPLES:
  ctx search \"jwt middleware\"
  ctx search \"retry logic\" --project api
  ctx search \"token refresh\" --type code --language typescript
  ctx search \"error budget\" --json")]
  Search {
    /// Natural-language query
    query: String,
    /// Restrict to one project
    #[arg(short, long)]
    project: Option<String>,
    /// Filter by file type (code|docs|config|style|data)
    #[arg(long = "type")]
    file_type: Option<String>,
    /// Filter by language
    #[arg(long)]
    language: Option<String>,
    /// Results to return (default: from config)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,
    /// Drop results scoring below this (0..=1)
    #[arg(long)]
    min_score: Option<f32>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Retrieve and assemble a cited context block for a question
  Ask {
    /// The question
    question: String,
    /// Focused project for routing
    #[arg(short, long)]
    project: Option<String>,
    /// Results to retrieve (1-20, default 5)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Health-check a project's index
  Check {
    /// Project name
    name: String,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Run or export retrieval evals
  Eval {
    #[command(subcommand)]
    command: EvalCommand,
  },
  /// Storage statistics
  Status {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Manage configuration
  #[command(after_help = "\
KEYS:
  default_provider, default_model,
  embedding.provider, embedding.model, embedding.batch_size,
  search.top_k, search.rerank,
  eval.golden_path, eval.default_k,
  observability.enabled, observability.sample_rate")]
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
  /// Generate shell completions
  Completions {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
  },
}

impl Commands {
  /// Whether the invocation asked for JSON output; drives error rendering.
  fn json_mode(&self) -> bool {
    match self {
      Commands::Index { json, .. }
      | Commands::List { json }
      | Commands::Search { json, .. }
      | Commands::Ask { json, .. }
      | Commands::Check { json, .. }
      | Commands::Status { json } => *json,
      Commands::Eval {
        command: EvalCommand::Run { json, .. },
      } => *json,
      Commands::Config {
        command: ConfigCommand::List { json },
      } => *json,
      _ => false,
    }
  }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
  let cli = Cli::parse();
  logging::init_cli_logging(cli.verbose);

  let json_mode = cli.command.json_mode();
  let result = dispatch(cli.command).await;

  match result {
    Ok(()) => std::process::ExitCode::SUCCESS,
    Err(error) => {
      let code = output::report_error(&error, json_mode, cli.verbose);
      std::process::ExitCode::from(code.clamp(0, u8::MAX as i32) as u8)
    }
  }
}

async fn dispatch(command: Commands) -> ctx_core::Result<()> {
  match command {
    Commands::Index {
      path,
      name,
      tags,
      description,
      ignore,
      force,
      json,
    } => cmd_index(path, name, tags, description, ignore, force, json).await,
    Commands::List { json } => cmd_list(json),
    Commands::Remove { name, force } => cmd_remove(&name, force),
    Commands::Search {
      query,
      project,
      file_type,
      language,
      top_k,
      min_score,
      json,
    } => {
      cmd_search(
        &query,
        project.as_deref(),
        file_type.as_deref(),
        language.as_deref(),
        top_k,
        min_score,
        json,
      )
      .await
    }
    Commands::Ask {
      question,
      project,
      top_k,
      json,
    } => cmd_ask(&question, project.as_deref(), top_k, json).await,
    Commands::Check { name, json } => cmd_check(&name, json),
    Commands::Eval { command } => match command {
      EvalCommand::Run {
        project,
        dataset,
        k,
        tags,
        json,
      } => cmd_eval_run(&project, dataset, k, tags, json).await,
      EvalCommand::Export { project, output } => cmd_eval_export(&project, output),
    },
    Commands::Status { json } => cmd_status(json),
    Commands::Config { command } => match command {
      ConfigCommand::Get { key } => cmd_config_get(&key),
      ConfigCommand::Set { key, value } => cmd_config_set(&key, &value),
      ConfigCommand::List { json } => cmd_config_list(json),
      ConfigCommand::Reset => cmd_config_reset(),
    },
    Commands::Completions { shell } => {
      clap_complete::generate(shell, &mut Cli::command(), "ctx", &mut io::stdout());
      Ok(())
    }
  }
}
