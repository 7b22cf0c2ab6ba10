pub mod activity;
pub mod collect;
pub mod tree;
pub mod types;

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::CacheManager;
use crate::config::{FetchConfig, Settings};
use crate::transport::RateLimitedTransport;

static ENHANCEMENT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^keps/(sig-[^/]+)/(\d+)-([^/]+)/kep\.yaml$").expect("valid KEP path regex")
});
static GATEWAY_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^geps/gep-(\d+)/metadata\.yaml$").expect("valid GEP path regex")
});

/// The two proposal collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// Kubernetes Enhancement Proposals.
    Enhancements,
    /// Gateway API Enhancement Proposals.
    Gateway,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Enhancements, Track::Gateway];

    /// Stable name used in cache keys.
    pub fn key(self) -> &'static str {
        match self {
            Track::Enhancements => "enhancements",
            Track::Gateway => "gateway",
        }
    }

    /// Short label, e.g. `KEP`.
    pub fn label(self) -> &'static str {
        match self {
            Track::Enhancements => "KEP",
            Track::Gateway => "GEP",
        }
    }

    /// Web-app route for the track's pages.
    pub fn route(self) -> &'static str {
        match self {
            Track::Enhancements => "kep",
            Track::Gateway => "gep",
        }
    }

    pub fn owner(self) -> &'static str {
        match self {
            Track::Enhancements => "kubernetes",
            Track::Gateway => "kubernetes-sigs",
        }
    }

    pub fn repo(self) -> &'static str {
        match self {
            Track::Enhancements => "enhancements",
            Track::Gateway => "gateway-api",
        }
    }

    pub fn git_ref(self) -> &'static str {
        match self {
            Track::Enhancements => "master",
            Track::Gateway => "main",
        }
    }

    /// Directory holding every document of the track.
    pub fn root(self) -> &'static str {
        match self {
            Track::Enhancements => "keps",
            Track::Gateway => "geps",
        }
    }

    fn metadata_file(self) -> &'static str {
        match self {
            Track::Enhancements => "kep.yaml",
            Track::Gateway => "metadata.yaml",
        }
    }

    fn narrative_file(self) -> &'static str {
        match self {
            Track::Enhancements => "README.md",
            Track::Gateway => "index.md",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Track::Enhancements => &*ENHANCEMENT_PATH,
            Track::Gateway => &*GATEWAY_PATH,
        }
    }

    /// Identity fields of a metadata path, or `None` if the path is not a
    /// document of this track.
    pub fn parse_path(self, path: &str) -> Option<PathInfo> {
        let caps = self.pattern().captures(path)?;
        match self {
            Track::Enhancements => Some(PathInfo {
                number: caps[2].to_string(),
                group: Some(caps[1].to_string()),
                slug: Some(caps[3].to_string()),
            }),
            Track::Gateway => Some(PathInfo {
                number: caps[1].to_string(),
                group: None,
                slug: None,
            }),
        }
    }

    /// Metadata path for a number, when the layout allows building it.
    pub fn canonical_path(self, number: &str) -> Option<String> {
        match self {
            Track::Enhancements => None,
            Track::Gateway => Some(format!("geps/gep-{}/{}", number, self.metadata_file())),
        }
    }

    /// Narrative file next to a metadata file.
    pub fn narrative_path(self, metadata_path: &str) -> String {
        format!("{}/{}", document_dir(metadata_path), self.narrative_file())
    }

    pub fn web_url(self, metadata_path: &str) -> String {
        format!(
            "https://github.com/{}/{}/tree/{}/{}",
            self.owner(),
            self.repo(),
            self.git_ref(),
            document_dir(metadata_path)
        )
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn document_dir(metadata_path: &str) -> &str {
    metadata_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or(metadata_path)
}

/// Identity derived from a document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    pub number: String,
    pub group: Option<String>,
    pub slug: Option<String>,
}

/// Remote endpoints of one track.
#[derive(Debug, Clone)]
pub struct Endpoints {
    api_base: String,
    raw_base: String,
}

impl Endpoints {
    pub fn new(api_base: impl Into<String>, raw_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            raw_base: raw_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.api_base, &settings.raw_base)
    }

    pub fn tree(&self, track: Track) -> String {
        format!(
            "{}/repos/{}/{}/git/trees/HEAD?recursive=1",
            self.api_base,
            track.owner(),
            track.repo()
        )
    }

    pub fn raw(&self, track: Track, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base,
            track.owner(),
            track.repo(),
            track.git_ref(),
            path
        )
    }

    pub fn commits(&self, track: Track, per_page: usize) -> String {
        format!(
            "{}/repos/{}/{}/commits?path={}&per_page={}",
            self.api_base,
            track.owner(),
            track.repo(),
            track.root(),
            per_page
        )
    }

    pub fn commit(&self, track: Track, sha: &str) -> String {
        format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_base,
            track.owner(),
            track.repo(),
            sha
        )
    }
}

/// Everything needed to pull one track from upstream. The tree listing,
/// bulk collection, single lookups and commit mining hang off this type.
#[derive(Clone)]
pub struct ProposalSource {
    track: Track,
    transport: Arc<RateLimitedTransport>,
    cache: CacheManager,
    endpoints: Endpoints,
    config: FetchConfig,
}

impl ProposalSource {
    pub fn new(
        track: Track,
        transport: Arc<RateLimitedTransport>,
        cache: CacheManager,
        endpoints: Endpoints,
        config: FetchConfig,
    ) -> Self {
        Self {
            track,
            transport,
            cache,
            endpoints,
            config,
        }
    }

    pub fn track(&self) -> Track {
        self.track
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }
}
