use serde::Deserialize;
use tracing::{debug, info};

use super::ProposalSource;
use crate::cache::Slot;
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct TreeListing {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl ProposalSource {
    /// Metadata paths of every document in the repository. A failed listing
    /// call is a hard error.
    pub async fn resolve_paths(&self) -> Result<Vec<String>> {
        if let Some(paths) = self.cache.load::<Vec<String>>(self.track, Slot::Tree).await {
            debug!(track = %self.track, count = paths.len(), "tree listing from cache");
            return Ok(paths);
        }

        let url = self.endpoints.tree(self.track);
        let listing: TreeListing = self
            .transport
            .request(&url)
            .await?
            .error_for_status(&url)?
            .json("tree listing")?;

        if listing.truncated {
            tracing::warn!(track = %self.track, "tree listing truncated upstream");
        }

        let paths: Vec<String> = listing
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob" && self.track.parse_path(&entry.path).is_some())
            .map(|entry| entry.path)
            .collect();

        info!(track = %self.track, count = paths.len(), "tree listing resolved");
        self.cache.store(self.track, Slot::Tree, &paths).await;
        Ok(paths)
    }
}
