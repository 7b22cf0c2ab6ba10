mod commands;
mod state;

use std::sync::Arc;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tracing::{error, info, warn, Level};

use kepler::bookmarks::BookmarkStore;
use kepler::cache::backend::{CacheBackend, MemoryBackend, StorageBackend};
use kepler::cache::{CacheManager, PersistentCache};
use kepler::catalog::CatalogHandle;
use kepler::clock::{Clock, SystemClock};
use kepler::config::Settings;
use kepler::http::ReqwestClient;
use kepler::proposals::{Endpoints, ProposalSource, Track};
use kepler::rate_limit::RateLimitMonitor;
use kepler::transport::RateLimitedTransport;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();

    tracing_subscriber::fmt()
        .with_max_level(settings.log_level.parse::<Level>().unwrap_or(Level::INFO))
        .init();

    let token = dotenv::var("DISCORD_TOKEN").expect("DISCORD_TOKEN required");
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Init storage
    let backend: Arc<dyn CacheBackend> = match StorageBackend::open(&settings.data_dir).await {
        Ok(storage) => {
            info!("Cache store initialized at {:?}", settings.data_dir);
            Arc::new(storage)
        }
        Err(e) => {
            warn!("Cache store unavailable, falling back to memory: {}", e);
            Arc::new(MemoryBackend::new())
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = CacheManager::new(PersistentCache::new(backend.clone(), clock.clone()));

    // Init upstream access
    let client = ReqwestClient::new(settings.github_token.clone())
        .context("failed to build HTTP client")?;
    if settings.github_token.is_none() {
        info!("No GITHUB_TOKEN set, using the anonymous rate limit");
    }
    let monitor = RateLimitMonitor::new();
    let transport = Arc::new(RateLimitedTransport::new(
        Arc::new(client),
        monitor.clone(),
        clock.clone(),
        &settings.fetch,
    ));
    let endpoints = Endpoints::from_settings(&settings);
    let catalog = |track: Track| {
        CatalogHandle::new(ProposalSource::new(
            track,
            transport.clone(),
            cache.clone(),
            endpoints.clone(),
            settings.fetch.clone(),
        ))
    };

    let app_state = AppState {
        enhancements: catalog(Track::Enhancements),
        gateway: catalog(Track::Gateway),
        bookmarks: Arc::new(BookmarkStore::new(backend)),
        cache: cache.clone(),
        monitor,
        clock,
        settings: settings.clone(),
    };

    // Warm both collections so the first command is fast.
    for handle in [app_state.enhancements.clone(), app_state.gateway.clone()] {
        tokio::spawn(async move {
            let state = handle.load().await;
            info!(track = %handle.track(), loading = state.is_loading(), "warm-up finished");
        });
    }

    let intents = serenity::GatewayIntents::GUILDS;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::kepler()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(ctx, &framework.options().commands, gid)
                        .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting Kepler Discord bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
