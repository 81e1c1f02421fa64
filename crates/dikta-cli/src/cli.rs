use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dikta", version, about = "Voice dictation with local speech models")]
pub struct Cli {
    /// Print diagnostic output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start an interactive dictation session
    Run(RunArgs),
    /// Manage downloaded models
    Models {
        #[command(subcommand)]
        command: ModelsCommand,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Recognition model id (overrides the configured one)
    #[arg(long)]
    pub model: Option<String>,

    /// Recognition language (ISO 639-1, or "auto")
    #[arg(long)]
    pub language: Option<String>,

    /// Enable the LLM correction pass for this session
    #[arg(long)]
    pub correct: bool,

    /// Correction model id (implies --correct)
    #[arg(long)]
    pub correction_model: Option<String>,

    /// Input device name (default: system default microphone)
    #[arg(long)]
    pub device: Option<String>,
}

#[derive(Subcommand)]
pub enum ModelsCommand {
    /// List known models and whether they are downloaded
    List,
    /// Download a model by id
    Download { model_id: String },
    /// Delete a downloaded model
    Delete { model_id: String },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the current configuration
    Show,
    /// Change configuration values
    Set(ConfigSetArgs),
}

#[derive(Args)]
pub struct ConfigSetArgs {
    /// Recognition language (ISO 639-1, or "auto")
    #[arg(long)]
    pub language: Option<String>,

    /// Recognition model id
    #[arg(long)]
    pub model: Option<String>,

    /// Enable or disable the correction pass
    #[arg(long)]
    pub correction: Option<bool>,

    /// Correction model id
    #[arg(long)]
    pub correction_model: Option<String>,

    /// Hotkey, e.g. "ctrl+shift+space"
    #[arg(long)]
    pub hotkey: Option<String>,

    /// Enable or disable desktop notifications
    #[arg(long)]
    pub notifications: Option<bool>,
}
