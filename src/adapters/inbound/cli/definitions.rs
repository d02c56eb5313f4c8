use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Evalbench CLI definition.
#[derive(Debug, Parser)]
#[command(name = "evalbench")]
#[command(
    about = "Send one prompt to several LLMs, rate each answer and keep the scores",
    version
)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        help = "Verbose logging with timestamps and targets"
    )]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub log_json: bool,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = LogJsonFormat::Compact,
        help = "Layout of JSON logs (pretty, compact)"
    )]
    pub log_json_format: LogJsonFormat,

    #[arg(
        long,
        global = true,
        help = "Also write debug JSON logs to the data directory"
    )]
    pub log_file: bool,

    #[arg(long, global = true, help = "Path to a YAML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "API key for the completions endpoint (can also come from OPENROUTER_API_KEY)"
    )]
    pub api_key: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Database connection string (can also come from DB_CONNECTION_STRING)"
    )]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ask the selected models one prompt, rate each answer and save the ratings.
    Evaluate(EvaluateArgs),
    /// List saved evaluations, newest first.
    Review(ReviewArgs),
    /// List the models a round may query.
    Models(ModelsArgs),
    /// Expose evaluation rounds and the review listing over HTTP.
    Serve(ServeArgs),
}

#[derive(Debug, Args, Clone)]
pub struct EvaluateArgs {
    #[arg(long, help = "Question sent to every selected model")]
    pub prompt: String,

    #[arg(
        long = "model",
        help = "Model to query; repeat for several (defaults to the whole catalog)"
    )]
    pub models: Vec<String>,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Ratings in response order, e.g. 5,1 (skips the interactive prompt)"
    )]
    pub ratings: Option<Vec<i64>>,

    #[arg(long, help = "Print the saved round as JSON")]
    pub json: bool,
}

#[derive(Debug, Args, Clone, Default)]
pub struct ReviewArgs {
    #[arg(long, help = "Emit JSON instead of a table")]
    pub json: bool,

    #[arg(long, help = "Show at most this many rows")]
    pub limit: Option<usize>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct ModelsArgs {
    #[arg(long, help = "Emit JSON instead of a list")]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1", help = "Address to bind")]
    pub bind: String,

    #[arg(long, default_value_t = 8080, help = "Port to listen on")]
    pub port: u16,

    #[arg(
        long,
        help = "Cap rows returned by GET /evaluations when no limit is given (default: all rows)"
    )]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogJsonFormat {
    Pretty,
    Compact,
}
