use std::sync::Arc;

use kepler::bookmarks::BookmarkStore;
use kepler::cache::CacheManager;
use kepler::catalog::CatalogHandle;
use kepler::clock::Clock;
use kepler::config::Settings;
use kepler::proposals::Track;
use kepler::rate_limit::RateLimitMonitor;

pub struct AppState {
    pub settings: Settings,
    pub enhancements: CatalogHandle,
    pub gateway: CatalogHandle,
    pub bookmarks: Arc<BookmarkStore>,
    pub cache: CacheManager,
    pub monitor: RateLimitMonitor,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn catalog(&self, track: Track) -> &CatalogHandle {
        match track {
            Track::Enhancements => &self.enhancements,
            Track::Gateway => &self.gateway,
        }
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
