//! Fan-out of one request across all configured services
//!
//! One service failing must never stop the others or escape to the caller,
//! so every adapter error is caught at this boundary, logged, and reflected
//! as an absent key in the result map.

use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::request::{PostRequest, ReplyRef};
use crate::services::bluesky::BlueskyService;
use crate::services::mastodon::MastodonService;
use crate::services::twitter::TwitterService;
use crate::services::Service;

pub struct Orchestrator {
    services: Vec<Box<dyn Service>>,
}

impl Orchestrator {
    pub fn new(services: Vec<Box<dyn Service>>) -> Self {
        Self { services }
    }

    /// Construct and authenticate every enabled service from the config.
    ///
    /// A service that fails to authenticate is logged and left out; the
    /// remaining services still run. Dev mode (`live == false`) skips
    /// nothing here, so credential problems surface before a real run.
    pub async fn from_config(config: &Config, live: bool) -> Self {
        let mut candidates: Vec<Box<dyn Service>> = Vec::new();

        if let Some(mastodon) = &config.mastodon {
            if mastodon.enabled {
                candidates.push(Box::new(MastodonService::new(mastodon, live)));
            }
        }
        if let Some(bluesky) = &config.bluesky {
            if bluesky.enabled {
                candidates.push(Box::new(BlueskyService::new(bluesky, live)));
            }
        }
        if let Some(twitter) = &config.twitter {
            if twitter.enabled {
                candidates.push(Box::new(TwitterService::new(twitter, live)));
            }
        }

        let mut services = Vec::with_capacity(candidates.len());
        for mut service in candidates {
            match service.authenticate().await {
                Ok(()) => services.push(service),
                Err(e) => {
                    error!(service = service.name(), "excluding service: {}", e);
                }
            }
        }

        Self { services }
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn service_names(&self) -> Vec<&'static str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    /// Publish one request to every service, in configuration order.
    ///
    /// The request is validated once before any service runs. The returned
    /// map has one entry per service that completed: the final reply handle,
    /// or `None` when the service is not live. Services that failed are
    /// absent from the map; their errors are logged here and never returned.
    pub async fn post(&self, request: &PostRequest) -> Result<HashMap<String, Option<ReplyRef>>> {
        request.validate()?;

        let mut results = HashMap::new();
        for service in &self.services {
            match service.post(request).await {
                Ok(handle) => {
                    info!(service = service.name(), "posted");
                    results.insert(service.name().to_string(), handle);
                }
                Err(e) => {
                    warn!(service = service.name(), "posting failed: {}", e);
                }
            }
        }
        Ok(results)
    }
}
