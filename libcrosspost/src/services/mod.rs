//! Service abstraction and per-network implementations
//!
//! Each service owns its credentials, its limits ([`ServiceProfile`]) and a
//! thin network client. The [`Service`] trait carries the shared posting
//! logic as provided methods: image clipping and resizing, alternative
//! selection, thread wrapping and reply chaining are identical across
//! services, while `submit` is the single network-specific operation.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::image::Image;
use crate::request::{GeoPoint, PostRequest, PostText, ReplyRef};

pub mod bluesky;
pub mod mastodon;
pub mod twitter;

// Mock service is available for all builds (not just tests) to support
// integration tests
pub mod mock;

/// Per-service posting limits
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceProfile {
    /// Maximum post length in characters
    pub max_text_len: usize,
    /// Maximum post length when images are attached
    pub max_text_len_with_image: usize,
    /// Characters held back per segment for the continuation ellipsis
    pub ellipsis_reserve: usize,
    /// Byte budget per uploaded image
    pub max_image_bytes: usize,
    /// Pixel budget per uploaded image, if the service enforces one
    pub max_image_pixels: Option<u64>,
    /// Maximum number of images per post
    pub max_image_count: usize,
}

impl ServiceProfile {
    /// The applicable character limit for a post with or without images
    pub fn text_limit(&self, has_images: bool) -> usize {
        if has_images {
            self.max_text_len_with_image
        } else {
            self.max_text_len
        }
    }
}

/// A social network the orchestrator can post to
#[async_trait]
pub trait Service: Send + Sync {
    /// Lowercase service identifier (e.g. "mastodon", "bluesky", "twitter")
    fn name(&self) -> &'static str;

    /// The service's current posting limits
    fn profile(&self) -> &ServiceProfile;

    /// Whether submissions actually reach the network. When false, posts go
    /// through selection, wrapping and image preparation but are never sent.
    fn live(&self) -> bool;

    /// Establish a session with the service
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authentication` when credentials are missing
    /// or rejected.
    async fn authenticate(&mut self) -> Result<()>;

    /// Send one already-validated, already-sized post to the network
    ///
    /// Implementations translate failures into the uniform `ServiceError`
    /// variants, preserving the underlying message.
    async fn submit(
        &self,
        text: &str,
        images: &[Image],
        geo: Option<GeoPoint>,
        reply_to: Option<&ReplyRef>,
    ) -> Result<ReplyRef>;

    /// Clip the image list to the service's count limit and size each image
    /// to its byte and pixel budgets
    fn prepare_images(&self, images: &[Image]) -> Result<Vec<Image>> {
        let profile = self.profile();
        let mut images = images;
        if images.len() > profile.max_image_count {
            warn!(
                service = self.name(),
                kept = profile.max_image_count,
                dropped = images.len() - profile.max_image_count,
                "dropping images beyond the service limit"
            );
            images = &images[..profile.max_image_count];
        }

        images
            .iter()
            .map(|img| {
                img.resize_to_target(profile.max_image_bytes, profile.max_image_pixels)
                    .map_err(Into::into)
            })
            .collect()
    }

    /// Publish one request to this service, returning a handle to the final
    /// published post, or `None` when the service is not live
    async fn post(&self, request: &PostRequest) -> Result<Option<ReplyRef>> {
        let images = self.prepare_images(&request.images)?;
        let reply_to = request.reply_targets.get(self.name());

        if request.wrap {
            let text = match &request.text {
                PostText::Single(s) => s.as_str(),
                // Rejected by PostRequest::validate before any service runs
                PostText::Alternatives(alts) => alts.first().map(String::as_str).unwrap_or(""),
            };
            return self.post_wrapped(text, &images, request.geo, reply_to).await;
        }

        let limit = self.profile().text_limit(!images.is_empty());
        let text = match &request.text {
            PostText::Single(s) => s.as_str(),
            PostText::Alternatives(alts) => select_variant(alts, limit),
        };

        if !self.live() {
            debug!(service = self.name(), "dev mode, skipping submission");
            return Ok(None);
        }

        let published = self.submit(text, &images, request.geo, reply_to).await?;
        Ok(Some(chain(reply_to.cloned(), published)))
    }

    /// Publish text as a reply thread when it exceeds the service's limit
    ///
    /// Text that fits goes out as a single post. Otherwise it is segmented
    /// at word boundaries, with a continuation ellipsis appended to the
    /// first segment and prepended to every later one. Images ride on the
    /// first segment only. Each segment replies to the previous one; the
    /// returned handle points at the final segment.
    async fn post_wrapped(
        &self,
        text: &str,
        images: &[Image],
        geo: Option<GeoPoint>,
        reply_to: Option<&ReplyRef>,
    ) -> Result<Option<ReplyRef>> {
        let profile = self.profile();
        let limit = profile.text_limit(!images.is_empty());

        let segments: Vec<String> = if text.chars().count() <= limit {
            vec![text.to_string()]
        } else {
            // A probed profile could report a limit at or below the reserve;
            // the wrap width must stay at least one character
            let width = limit.saturating_sub(profile.ellipsis_reserve).max(1);
            wrap_text(text, width)
                .into_iter()
                .enumerate()
                .map(|(i, s)| {
                    if i == 0 {
                        format!("{}…", s)
                    } else {
                        format!("…{}", s)
                    }
                })
                .collect()
        };

        if !self.live() {
            debug!(
                service = self.name(),
                segments = segments.len(),
                "dev mode, skipping submission"
            );
            return Ok(None);
        }

        let mut anchor = reply_to.cloned();
        for (i, segment) in segments.iter().enumerate() {
            let segment_images: &[Image] = if i == 0 { images } else { &[] };
            let published = self
                .submit(segment, segment_images, geo, anchor.as_ref())
                .await?;
            anchor = Some(chain(anchor, published));
        }

        Ok(anchor)
    }
}

/// Pick the longest alternative that fits strictly under `limit`, falling
/// back to the first alternative when none fits.
pub(crate) fn select_variant(alternatives: &[String], limit: usize) -> &str {
    let mut best: Option<(&str, usize)> = None;
    for alt in alternatives {
        let len = alt.chars().count();
        if len < limit && best.map(|(_, b)| len > b).unwrap_or(true) {
            best = Some((alt, len));
        }
    }
    match best {
        Some((s, _)) => s,
        None => alternatives.first().map(String::as_str).unwrap_or(""),
    }
}

/// Greedy word-boundary wrap. Words are never split; a word longer than
/// `width` becomes its own over-long segment.
pub(crate) fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            segments.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    if segments.is_empty() {
        segments.push(String::new());
    }
    segments
}

/// Fold a newly published post into the running reply anchor.
///
/// For record-ref threads the root of the existing anchor is kept and only
/// the parent advances; everything else just takes the latest handle.
pub(crate) fn chain(previous: Option<ReplyRef>, latest: ReplyRef) -> ReplyRef {
    match (previous, latest) {
        (Some(ReplyRef::Thread { root, .. }), ReplyRef::Thread { parent, .. }) => {
            ReplyRef::Thread { root, parent }
        }
        (_, latest) => latest,
    }
}
