//! Command surface: one clap subcommand per operation, dispatched by [`run`].

use clap::Subcommand;
use std::io::Write;
use thiserror::Error;
use url::Url;

use crate::aggregator::{scrape_next_feed, Scheduler};
use crate::config::ConfigError;
use crate::feed::build_client;
use crate::session::{Session, SessionError};
use crate::storage::{DatabaseError, User};
use crate::util::parse_interval;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },

    /// Log in as an existing user
    Login { name: String },

    /// Delete every user, along with their feeds, follows and posts
    Reset,

    /// List registered users
    Users,

    /// Collect feeds forever, one feed per interval (e.g. 30s, 1m, 2h30m)
    Agg { time_between_reqs: String },

    /// Add a feed and follow it
    Addfeed { name: String, url: String },

    /// List every feed and who added it
    Feeds,

    /// Follow an existing feed by URL
    Follow { url: String },

    /// List the feeds you follow
    Following,

    /// Stop following a feed by URL
    Unfollow { url: String },

    /// Show the newest posts from the feeds you follow
    Browse {
        #[arg(default_value_t = 2, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
    },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("User {0:?} already exists")]
    UserExists(String),

    #[error("No user named {0:?}")]
    UnknownUser(String),

    #[error("A feed with URL {0} already exists")]
    FeedExists(String),

    #[error("No feed with URL {0}")]
    UnknownFeed(String),

    #[error("You are not following {0}")]
    NotFollowing(String),

    #[error("Invalid feed URL {url:?}: {reason}")]
    InvalidFeedUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Execute `command` against `session`, writing user-facing output to `out`.
///
/// `agg` only returns on a startup error; otherwise it runs until the process
/// is terminated.
pub async fn run<W: Write>(
    session: &mut Session,
    command: Command,
    out: &mut W,
) -> Result<(), CommandError> {
    match command {
        Command::Register { name } => register(session, &name, out).await,
        Command::Login { name } => login(session, &name, out).await,
        Command::Reset => {
            let removed = session.db.reset_users().await?;
            writeln!(out, "Reset complete: removed {} user(s)", removed)?;
            Ok(())
        }
        Command::Users => users(session, out).await,
        Command::Agg { time_between_reqs } => aggregate(session, &time_between_reqs, out).await,
        Command::Addfeed { name, url } => {
            let user = session.current_user().await?;
            add_feed(session, &user, &name, &url, out).await
        }
        Command::Feeds => feeds(session, out).await,
        Command::Follow { url } => {
            let user = session.current_user().await?;
            follow(session, &user, &url, out).await
        }
        Command::Following => {
            let user = session.current_user().await?;
            following(session, &user, out).await
        }
        Command::Unfollow { url } => {
            let user = session.current_user().await?;
            unfollow(session, &user, &url, out).await
        }
        Command::Browse { limit } => {
            let user = session.current_user().await?;
            browse(session, &user, limit, out).await
        }
    }
}

async fn register<W: Write>(
    session: &mut Session,
    name: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    let user = match session.db.create_user(name).await {
        Ok(user) => user,
        Err(e) if e.is_unique_violation() => return Err(CommandError::UserExists(name.into())),
        Err(e) => return Err(e.into()),
    };
    session.set_current_user(&user.name)?;
    tracing::debug!(user_id = user.id, name = %user.name, "Registered user");
    writeln!(out, "User {} registered and logged in", user.name)?;
    Ok(())
}

async fn login<W: Write>(
    session: &mut Session,
    name: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    let user = session
        .db
        .get_user_by_name(name)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(name.into()))?;
    session.set_current_user(&user.name)?;
    writeln!(out, "Logged in as {}", user.name)?;
    Ok(())
}

async fn users<W: Write>(session: &Session, out: &mut W) -> Result<(), CommandError> {
    let current = session.config.current_user_name.as_deref();
    for user in session.db.get_users().await? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

async fn aggregate<W: Write>(
    session: &Session,
    time_between_reqs: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    let interval = parse_interval(time_between_reqs)?;
    let scheduler = Scheduler::new(interval)?;
    let client = build_client(&session.config.user_agent, session.config.fetch_timeout())
        .map_err(CommandError::HttpClient)?;

    writeln!(out, "Collecting feeds every {:?}", scheduler.interval())?;
    out.flush()?;

    scheduler
        .run(|| scrape_next_feed(&session.db, &client))
        .await;
    Ok(())
}

fn validate_feed_url(raw: &str) -> Result<Url, CommandError> {
    let invalid = |reason: String| CommandError::InvalidFeedUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(invalid(format!("unsupported scheme {scheme:?}, use http or https"))),
    }
}

async fn add_feed<W: Write>(
    session: &Session,
    user: &User,
    name: &str,
    url: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    validate_feed_url(url)?;

    let feed = match session.db.create_feed(name, url, user.id).await {
        Ok(feed) => feed,
        Err(e) if e.is_unique_violation() => return Err(CommandError::FeedExists(url.into())),
        Err(e) => return Err(e.into()),
    };
    session.db.follow_feed(user.id, feed.id).await?;

    writeln!(out, "Added feed {:?} ({})", feed.name, feed.url)?;
    writeln!(out, "{} is now following {:?}", user.name, feed.name)?;
    Ok(())
}

async fn feeds<W: Write>(session: &Session, out: &mut W) -> Result<(), CommandError> {
    for feed in session.db.get_feeds_with_owner().await? {
        writeln!(out, "* Name:\t{}", feed.name)?;
        writeln!(out, "* URL:\t{}", feed.url)?;
        writeln!(out, "* User:\t{}", feed.owner_name)?;
    }
    Ok(())
}

async fn follow<W: Write>(
    session: &Session,
    user: &User,
    url: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    let feed = session
        .db
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| CommandError::UnknownFeed(url.into()))?;
    session.db.follow_feed(user.id, feed.id).await?;
    writeln!(out, "{} is now following {:?}", user.name, feed.name)?;
    Ok(())
}

async fn following<W: Write>(
    session: &Session,
    user: &User,
    out: &mut W,
) -> Result<(), CommandError> {
    let names = session.db.get_followed_feed_names(user.id).await?;
    if names.is_empty() {
        writeln!(out, "You are not following any feeds")?;
        return Ok(());
    }
    writeln!(out, "You are following:")?;
    for name in names {
        writeln!(out, "  * {:?}", name)?;
    }
    Ok(())
}

async fn unfollow<W: Write>(
    session: &Session,
    user: &User,
    url: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    let feed = session
        .db
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| CommandError::UnknownFeed(url.into()))?;
    if !session.db.unfollow_feed(user.id, feed.id).await? {
        return Err(CommandError::NotFollowing(url.into()));
    }
    writeln!(out, "Unfollowed {:?}", feed.name)?;
    Ok(())
}

async fn browse<W: Write>(
    session: &Session,
    user: &User,
    limit: i64,
    out: &mut W,
) -> Result<(), CommandError> {
    let posts = session.db.get_posts_for_user(user.id, limit).await?;
    if posts.is_empty() {
        writeln!(out, "No posts yet. Run `gather agg <interval>` to collect some.")?;
        return Ok(());
    }
    for post in posts {
        let date = post
            .published_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        writeln!(
            out,
            "{:?} posted on {}",
            post.title.as_deref().unwrap_or("(untitled)"),
            date
        )?;
        writeln!(out, "Read at: {}", post.url)?;
        writeln!(out)?;
    }
    Ok(())
}
