use crate::client::{ClientConfig, resolve_token};
use crate::i18n::Lang;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Parser, Debug)]
#[command(name = "bookdeck", version, about = "Turn a book title into a slide deck", long_about = None)]
pub struct Cli {
    /// Backend address.
    #[arg(long, env = "BOOKDECK_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// Interface language (zh or en).
    #[arg(long, env = "BOOKDECK_LANG", default_value_t = Lang::Zh, global = true)]
    pub lang: Lang,

    /// Bearer token. Falls back to ~/.bookdeck/token.
    #[arg(long, env = "BOOKDECK_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Where generated presentations and transcripts are written.
    #[arg(long, env = "BOOKDECK_OUT_DIR", default_value = ".", global = true)]
    pub out_dir: PathBuf,

    /// Log directory for the interactive chat.
    #[arg(long, default_value = "logs", global = true)]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate one presentation and exit.
    #[command(arg_required_else_help = true)]
    Generate {
        /// Book title.
        topic: Vec<String>,
    },
    /// Interactive chat (default).
    Chat,
    /// Browse generated presentations.
    Gallery(GalleryArgs),
    /// Talk to the reading advisor.
    Recommend(RecommendArgs),
    /// Show the signed-in user.
    Whoami,
    /// Search the book catalog.
    #[command(arg_required_else_help = true)]
    Books { query: Vec<String> },
}

#[derive(Args, Debug, Clone)]
pub struct GalleryArgs {
    #[arg(short = 'n', long, default_value_t = 12)]
    pub limit: u32,

    #[arg(short = 'p', long, default_value_t = 1)]
    pub page: u32,

    #[arg(short = 'c', long)]
    pub category: Option<String>,

    #[arg(short = 's', long)]
    pub search: Option<String>,

    /// Recent picks with at most one per category.
    #[arg(long, default_value_t = false)]
    pub showcase: bool,

    /// Fetch slide previews for each card.
    #[arg(long, default_value_t = false)]
    pub previews: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RecommendArgs {
    /// Guest mode, no sign-in required.
    #[arg(long, default_value_t = false)]
    pub standalone: bool,

    /// Ask the backend to seed demo reading data first.
    #[arg(long, default_value_t = false)]
    pub seed_mock_data: bool,

    /// Save the conversation into this directory on exit.
    #[arg(long)]
    pub transcript: Option<PathBuf>,
}

impl Cli {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            token: resolve_token(self.token.clone()),
        }
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }
}
