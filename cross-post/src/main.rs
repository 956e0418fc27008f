//! cross-post - Publish a post to connected social platforms

use clap::Parser;
use libcrosspost::config::Config;
use libcrosspost::db::Database;
use libcrosspost::logging::LoggingConfig;
use libcrosspost::poster::{build_http_client, create_adapters, create_oauth_clients};
use libcrosspost::types::{
    Identity, MediaRef, PlatformId, PostContent, PublishRequest, PublishResult,
};
use libcrosspost::{CrosspostError, MultiPlatformPoster, Result};
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cross-post")]
#[command(version)]
#[command(about = "Publish a post to connected social platforms")]
#[command(long_about = "\
cross-post - Publish a post to connected social platforms

DESCRIPTION:
    cross-post publishes one post to several platforms at once using the
    accounts a user connected through cross-serve. Every platform is
    attempted independently and reported separately.

USAGE:
    # Post to every configured platform (text-only posts skip
    # platforms that need media, such as Instagram and YouTube)
    cross-post --user alice \"Hello world\"

    # Read content from stdin
    echo \"Hello world\" | cross-post --user alice

    # Pick platforms and attach media
    cross-post --user alice -p twitter,linkedin --media ./photo.jpg \"Launch day\"

    # Machine-readable output
    cross-post --user alice --format json \"Hello\"

OUTPUT:
    text: one `platform:url` line per published platform on stdout,
          failures on stderr
    json: the full publish result on stdout

EXIT CODES:
    0 - Published everywhere
    1 - At least one platform failed
    2 - Nothing published: accounts not connected or tokens expired
    3 - Invalid input
")]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// User whose connected accounts are used
    #[arg(short, long, env = "CROSSPOST_USER")]
    user: String,

    /// Email to fall back on when looking up connections
    #[arg(long)]
    email: Option<String>,

    /// Target platform(s), comma-separated (default: all configured)
    #[arg(short, long, value_delimiter = ',')]
    platform: Vec<String>,

    /// Media file path or http(s) URL
    #[arg(short, long)]
    media: Option<String>,

    /// Hashtag to append (repeatable, `#` optional)
    #[arg(short = 't', long = "hashtag")]
    hashtags: Vec<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Per-platform timeout, e.g. "90s" or "2m" (overrides config)
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Configuration file (overrides CROSSPOST_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CrosspostError::Validation(format!(
                "invalid format '{}', expected text or json",
                other
            ))),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Quiet unless asked: stdout is for results
    LoggingConfig::from_env("error").verbose(cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let format = OutputFormat::parse(&cli.format)?;

    let text = match cli.content {
        Some(content) => content,
        None => read_stdin()?,
    };
    let media = cli.media.as_deref().map(load_media).transpose()?;
    let content = PostContent {
        captions: vec![text],
        hashtags: cli.hashtags,
        media,
    };
    if content.render(None).is_empty() && content.media.is_none() {
        return Err(CrosspostError::Validation(
            "content cannot be empty".to_string(),
        ));
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let poster = build_poster(&config, cli.timeout).await?;

    let targets = if cli.platform.is_empty() {
        default_targets(&poster, content.media.is_some())?
    } else {
        cli.platform
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .map(|p| match p.parse::<PlatformId>() {
                Ok(id) => id.as_str().to_string(),
                Err(_) => p,
            })
            .collect()
    };

    let mut identity = Identity::user(cli.user);
    if let Some(email) = cli.email {
        identity = identity.with_email(email);
    }

    let result = poster
        .publish(PublishRequest::unified(identity, targets, content))
        .await?;

    print_result(&result, format)?;
    Ok(exit_code(&result))
}

/// Every configured platform, minus media-only ones when nothing is attached
fn default_targets(poster: &MultiPlatformPoster, has_media: bool) -> Result<Vec<String>> {
    let targets: Vec<String> = poster
        .platforms()
        .into_iter()
        .filter(|name| {
            has_media
                || !poster
                    .adapter(name)
                    .is_some_and(|adapter| adapter.requires_media())
        })
        .map(str::to_string)
        .collect();

    if targets.is_empty() {
        return Err(CrosspostError::Validation(
            "no configured platform accepts text-only posts; attach --media".to_string(),
        ));
    }
    Ok(targets)
}

async fn build_poster(config: &Config, timeout: Option<Duration>) -> Result<MultiPlatformPoster> {
    let db = Database::new(&config.database.path).await?;
    let http = build_http_client(config)?;
    let oauth = create_oauth_clients(config, &http);
    let adapters = create_adapters(config, Arc::new(db.clone()), &http, &oauth);

    Ok(MultiPlatformPoster::new(adapters)
        .with_timeout(timeout.unwrap_or_else(|| config.publish.adapter_timeout()))
        .with_history(db))
}

fn read_stdin() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(CrosspostError::Validation(
            "no content given and stdin is a terminal".to_string(),
        ));
    }

    let mut buffer = String::new();
    stdin
        .read_to_string(&mut buffer)
        .map_err(|e| CrosspostError::Validation(format!("failed to read stdin: {}", e)))?;
    Ok(buffer)
}

fn load_media(arg: &str) -> Result<MediaRef> {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(MediaRef::url(arg));
    }

    let path = Path::new(arg);
    let data = std::fs::read(path).map_err(|e| {
        CrosspostError::Validation(format!("cannot read media file {}: {}", path.display(), e))
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string());
    Ok(MediaRef::bytes(data, filename))
}

fn print_result(result: &PublishResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(result).map_err(|e| {
                CrosspostError::Validation(format!("failed to serialize result: {}", e))
            })?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for outcome in &result.outcomes {
                if outcome.success {
                    println!(
                        "{}:{}",
                        outcome.platform,
                        outcome.url.as_deref().unwrap_or_default()
                    );
                } else {
                    eprintln!(
                        "{}: {}",
                        outcome.platform,
                        outcome.error_message.as_deref().unwrap_or("failed")
                    );
                }
            }
        }
    }
    Ok(())
}

/// 0 when everything published, 2 when nothing did because of missing or
/// expired connections, 1 otherwise
fn exit_code(result: &PublishResult) -> i32 {
    if result.all_succeeded() {
        return 0;
    }

    let auth_only = result.outcomes.iter().all(|o| {
        matches!(
            o.error_kind.as_deref(),
            Some("not_connected") | Some("token_expired")
        )
    });
    if !result.any_succeeded() && auth_only {
        2
    } else {
        1
    }
}
