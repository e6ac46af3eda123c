use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use factfeed::config::{Backend, Config};
use factfeed::feed::{Dispatch, EngineSettings, FeedEngine, FeedEvent, Notice, NoticeLevel};
use factfeed::filter::FilterState;
use factfeed::gateway::{Gateway, RestGateway};
use factfeed::model::{CategoryFilter, Fact, FactDraft, FactId, ImageFile, VoteCounter};
use factfeed::storage::{Database, DatabaseError};
use factfeed::theme::{ThemePreference, ThemeSetting, THEME_KEY};
use factfeed::util::{display_width, strip_control_chars, truncate_to_width};

/// Display width of fact text in listings.
const TEXT_COLUMNS: usize = 72;

/// Get the config directory path (~/.config/factfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("factfeed");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "factfeed", about = "Crowd-sourced fact feed")]
struct Args {
    /// Config file (default: ~/.config/factfeed/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List facts, most interesting first
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Submit a new fact
    Submit {
        #[arg(long)]
        text: String,
        /// Source URL (http or https)
        #[arg(long)]
        source: String,
        #[arg(long)]
        category: String,
        /// Image to attach
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,
    },
    /// Add one vote to a fact in the filtered feed
    Vote {
        id: FactId,
        /// interesting, mindblowing or false
        counter: VoteCounter,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show or toggle the color theme
    Theme {
        #[arg(value_enum, default_value_t = ThemeAction::Show)]
        action: ThemeAction,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct FilterArgs {
    /// Category name, or "all"
    #[arg(long, default_value = "all")]
    category: CategoryFilter,
    /// Case-insensitive text to search for
    #[arg(long, default_value = "")]
    search: String,
}

impl From<FilterArgs> for FilterState {
    fn from(args: FilterArgs) -> Self {
        FilterState::new(args.category, args.search)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ThemeAction {
    Show,
    Toggle,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(config = ?config, "Effective configuration");

    // Preferences always live in the local database, whatever the backend
    let db_path = config
        .database_path
        .clone()
        .unwrap_or_else(|| config_dir.join("factfeed.db"));
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db.with_public_url_base(&config.public_url_base),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    if let Command::Theme { action } = args.command {
        let result = run_theme(db.clone(), action).await;
        db.close().await;
        return result;
    }

    let gateway: Arc<dyn Gateway> = match config.backend {
        Backend::Sqlite => Arc::new(db.clone()),
        Backend::Rest => Arc::new(
            RestGateway::new(
                config.store_url()?,
                config.api_key(),
                &config.table,
                config.request_timeout(),
            )
            .context("Failed to set up the remote store")?,
        ),
    };

    let settings = EngineSettings {
        image_container: config.image_container.clone(),
        upload: config.upload_options(),
    };
    let (event_tx, mut event_rx) = mpsc::channel::<FeedEvent>(64);
    let mut engine = FeedEngine::new(gateway, event_tx, settings);

    match args.command {
        Command::List { filter } => {
            engine.sync(filter.into());
            report(settle(&mut engine, &mut event_rx).await)?;
            print_facts(engine.facts());
        }
        Command::Submit {
            text,
            source,
            category,
            image,
        } => {
            let image = match image {
                Some(path) => Some(
                    ImageFile::from_path(&path)
                        .await
                        .with_context(|| format!("Failed to read image {}", path.display()))?,
                ),
                None => None,
            };
            let draft = FactDraft {
                text,
                source,
                category,
                image,
            };
            engine.submit(draft).context("Fact rejected")?;
            report(settle(&mut engine, &mut event_rx).await)?;
            print_facts(&engine.facts()[..engine.facts().len().min(1)]);
        }
        Command::Vote {
            id,
            counter,
            filter,
        } => {
            engine.sync(filter.into());
            report(settle(&mut engine, &mut event_rx).await)?;
            match engine.vote(id, counter) {
                Dispatch::UnknownFact => {
                    anyhow::bail!("Fact {} is not in the selected feed", id)
                }
                Dispatch::Busy => anyhow::bail!("A vote on fact {} is already pending", id),
                Dispatch::Started | Dispatch::Unchanged => {}
            }
            report(settle(&mut engine, &mut event_rx).await)?;
            if let Some(fact) = engine.state().get(id) {
                print_facts(std::slice::from_ref(fact));
            }
        }
        Command::Theme { .. } => {}
    }

    db.close().await;
    Ok(())
}

async fn run_theme(db: Database, action: ThemeAction) -> Result<()> {
    let mut theme = ThemeSetting::load(db, ThemePreference::default())
        .await
        .context("Failed to load theme preference")?;
    if action == ThemeAction::Toggle {
        theme
            .toggle()
            .await
            .context("Failed to save theme preference")?;
    }
    let saved = theme.store().preference_updated_at(THEME_KEY).await?;
    match saved {
        Some(at) => println!(
            "Theme: {} (saved {})",
            theme.current().name(),
            at.format("%Y-%m-%d %H:%M UTC")
        ),
        None => println!("Theme: {}", theme.current().name()),
    }
    Ok(())
}

/// Apply events until no task is in flight.
async fn settle(engine: &mut FeedEngine, rx: &mut mpsc::Receiver<FeedEvent>) -> Vec<Notice> {
    let mut notices = Vec::new();
    let mut last_progress = None;
    while engine.is_busy() {
        let Some(event) = rx.recv().await else {
            break;
        };
        if let Some(notice) = engine.handle_event(event) {
            notices.push(notice);
        }
        let progress = engine.upload_progress();
        if progress.is_some() && progress != last_progress {
            if let Some(percent) = progress {
                eprintln!("Uploading image... {percent}%");
            }
            last_progress = progress;
        }
    }
    notices
}

/// Print notices; the first error becomes the command's error.
fn report(notices: Vec<Notice>) -> Result<()> {
    let mut failure = None;
    for notice in notices {
        match notice.level {
            NoticeLevel::Error if failure.is_none() => failure = Some(notice.message),
            NoticeLevel::Error | NoticeLevel::Warning => eprintln!("{notice}"),
            NoticeLevel::Info => println!("{notice}"),
        }
    }
    match failure {
        Some(message) => Err(anyhow::anyhow!(message)),
        None => Ok(()),
    }
}

fn print_facts(facts: &[Fact]) {
    if facts.is_empty() {
        println!("No facts found.");
        return;
    }
    for fact in facts {
        let text = strip_control_chars(&fact.text).replace('\n', " ");
        let text = truncate_to_width(&text, TEXT_COLUMNS);
        let pad = TEXT_COLUMNS.saturating_sub(display_width(&text));
        println!(
            "{:>6}  {:<13} {}{}  +{} !{} x{}{}{}",
            fact.id,
            fact.category.name(),
            text,
            " ".repeat(pad),
            fact.votes_interesting,
            fact.votes_mindblowing,
            fact.votes_false,
            if fact.has_image() { "  [image]" } else { "" },
            if fact.is_disputed() { "  [disputed]" } else { "" },
        );
    }
}
