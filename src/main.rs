use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tweet_sync::actions::Confirm;
use tweet_sync::config::{self, Config};
use tweet_sync::document::{Document, MediaGallery};
use tweet_sync::notify::{Notification, Notifier};
use tweet_sync::page::{Page, Services};
use tweet_sync::refresh::PollerState;
use tweet_sync::theme::{FileThemeStore, MemoryThemeStore, ThemeCoordinator, ThemeStore};
use tweet_sync::transport::HttpTransport;

/// Keeps a tweet page in sync with the server and drives its actions.
#[derive(Parser, Debug)]
#[command(name = "tweet-sync", version, about)]
struct Cli {
    /// Path to the config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server base URL (overrides the config file).
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Session cookie as `name=value`; repeatable.
    #[arg(long = "cookie", global = true)]
    cookies: Vec<String>,

    /// Answer yes to every confirmation.
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a page and keep it refreshed until interrupted.
    Watch {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Toggle the like on a tweet.
    Like { tweet_id: u64 },
    /// Pin a tweet to your profile.
    Pin { tweet_id: u64 },
    /// Unpin a tweet from your profile.
    Unpin { tweet_id: u64 },
    /// Comment on a tweet.
    Comment { tweet_id: u64, text: String },
    DeleteComment {
        comment_id: u64,
        #[arg(long)]
        tweet: u64,
    },
    DeleteTweet { tweet_id: u64 },
    /// List your media, or the tweets using one media item.
    Media {
        #[arg(long)]
        tweets_for: Option<u64>,
    },
    DeleteMedia { media_id: u64 },
    Draft {
        #[command(subcommand)]
        action: DraftCommand,
    },
    Theme {
        #[command(subcommand)]
        action: ThemeCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DraftCommand {
    Save { text: String },
    Show,
    Clear,
}

#[derive(Subcommand, Debug)]
enum ThemeCommand {
    Show,
    Toggle,
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        eprintln!("[{}] {}", notification.level.as_str(), notification.message);
    }
}

struct StdinConfirm {
    assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{prompt} [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}

fn theme_store(config: &Config) -> Box<dyn ThemeStore> {
    match config.theme.store_path() {
        Some(path) => Box::new(FileThemeStore::new(path)),
        None => Box::new(MemoryThemeStore::default()),
    }
}

async fn open(config: &Config, assume_yes: bool, path: &str) -> Result<Page> {
    let transport = HttpTransport::new(&config.server)?;
    let services = Services {
        transport: Arc::new(transport),
        notifier: Arc::new(ConsoleNotifier),
        confirm: Arc::new(StdinConfirm { assume_yes }),
        theme_store: theme_store(config),
    };
    Page::load(config, services, path)
        .await
        .with_context(|| format!("failed to open {path}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = config::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.server.base_url = base_url;
    }
    config.server.cookies.extend(cli.cookies);

    match cli.command {
        Command::Watch { path } => watch(&config, cli.yes, &path).await,
        Command::Like { tweet_id } => {
            let mut page = open(&config, cli.yes, &format!("/tweet/{tweet_id}/")).await?;
            let like = page.actions().toggle_like(tweet_id).await?;
            println!("liked={} count={}", like.liked, like.count);
            page.unload();
            Ok(())
        }
        Command::Pin { tweet_id } => {
            let mut page = open(&config, cli.yes, &format!("/tweet/{tweet_id}/")).await?;
            page.actions().pin(tweet_id).await?;
            page.unload();
            Ok(())
        }
        Command::Unpin { tweet_id } => {
            let mut page = open(&config, cli.yes, &format!("/tweet/{tweet_id}/")).await?;
            page.actions().unpin(tweet_id).await?;
            page.unload();
            Ok(())
        }
        Command::Comment { tweet_id, text } => {
            let mut page = open(&config, cli.yes, &format!("/tweet/{tweet_id}/")).await?;
            let comment = page.actions().add_comment(tweet_id, &text).await?;
            println!(
                "[{}] {} ({}): {}",
                comment.avatar_initial().unwrap_or('?'),
                comment.username,
                comment.time_ago,
                comment.text
            );
            if let Some(detail) = page.document().lock().await.detail.as_ref() {
                println!("{}", detail.comments_header());
            }
            page.unload();
            Ok(())
        }
        Command::DeleteComment { comment_id, tweet } => {
            let mut page = open(&config, cli.yes, &format!("/tweet/{tweet}/")).await?;
            page.actions().delete_comment(comment_id, tweet).await?;
            page.unload();
            Ok(())
        }
        Command::DeleteTweet { tweet_id } => {
            let mut page = open(&config, cli.yes, "/").await?;
            page.actions().delete_tweet(tweet_id).await?;
            page.unload();
            Ok(())
        }
        Command::Media { tweets_for } => {
            let mut page = open(&config, cli.yes, "/create/").await?;
            match tweets_for {
                Some(media_id) => {
                    for tweet in page.actions().media_tweets(media_id).await? {
                        println!("{}\t@{}\t{}", tweet.id, tweet.username, tweet.text);
                    }
                }
                None => {
                    page.actions().load_media_gallery().await?;
                    print_gallery(page.document().lock().await.media.as_ref());
                }
            }
            page.unload();
            Ok(())
        }
        Command::DeleteMedia { media_id } => {
            let mut page = open(&config, cli.yes, "/create/").await?;
            page.actions().delete_media(media_id).await?;
            page.unload();
            Ok(())
        }
        Command::Draft { action } => draft(&config, cli.yes, action).await,
        Command::Theme { action } => theme(&config, action),
    }
}

async fn watch(config: &Config, assume_yes: bool, path: &str) -> Result<()> {
    let mut page = open(config, assume_yes, path).await?;
    if page.refresh_state() != PollerState::Running {
        eprintln!("{path} has no auto-refresh; nothing to watch");
        page.unload();
        return Ok(());
    }
    info!(path, interval = ?config.refresh.interval(), "watching");
    if let Some(draft) = page.pending_draft() {
        eprintln!("a saved draft is available ({} chars)", draft.content.len());
    }

    tokio::signal::ctrl_c().await?;
    page.unload();
    Ok(())
}

async fn draft(config: &Config, assume_yes: bool, action: DraftCommand) -> Result<()> {
    let mut page = open(config, assume_yes, "/create/").await?;
    let drafts = page
        .drafts()
        .context("the compose page has no tweet form")?;

    match action {
        DraftCommand::Save { text } => {
            drafts.on_input(&text).await;
            drafts.save_now().await?;
        }
        DraftCommand::Show => match drafts.fetch().await? {
            Some(saved) => {
                if let Some(at) = saved.updated_at {
                    println!("# saved {}", at.to_rfc3339());
                }
                println!("{}", saved.content);
                for media in &saved.media {
                    println!("# media {}", media.id);
                }
            }
            None => println!("no saved draft"),
        },
        DraftCommand::Clear => drafts.clear().await?,
    }

    page.unload();
    Ok(())
}

fn theme(config: &Config, action: ThemeCommand) -> Result<()> {
    let mut coordinator = ThemeCoordinator::new(theme_store(config), Arc::new(ConsoleNotifier));
    let mut document = Document::default();
    coordinator.init(&mut document);
    if let ThemeCommand::Toggle = action {
        coordinator.toggle(&mut document);
    }
    let theme = coordinator.current();
    println!("{theme} ({})", theme.toggle_control().title);
    Ok(())
}

fn print_gallery(gallery: Option<&MediaGallery>) {
    match gallery {
        Some(MediaGallery::Items(items)) => {
            for item in items {
                println!("{}\t{}", item.id, item.thumbnail_url.as_deref().unwrap_or("-"));
            }
        }
        Some(MediaGallery::Empty) => println!("No media uploaded yet"),
        _ => println!("Error loading media gallery"),
    }
}
