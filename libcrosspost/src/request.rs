//! Post requests and reply references

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CrosspostError, Result};
use crate::image::Image;

/// The text of a post: either a single string or a list of alternative
/// phrasings for services with different length limits.
#[derive(Debug, Clone)]
pub enum PostText {
    Single(String),
    Alternatives(Vec<String>),
}

impl From<String> for PostText {
    fn from(s: String) -> Self {
        PostText::Single(s)
    }
}

impl From<&str> for PostText {
    fn from(s: &str) -> Self {
        PostText::Single(s.to_string())
    }
}

impl From<Vec<String>> for PostText {
    fn from(v: Vec<String>) -> Self {
        PostText::Alternatives(v)
    }
}

/// Geographic coordinates attached to a post (honored only by services that
/// accept them)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A content-addressed record reference (uri plus cid)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub uri: String,
    pub cid: String,
}

/// A service-specific handle to a published post, usable as a reply target
/// in a later request.
///
/// Flat-id services chain replies through a single status id. Record-ref
/// services need both the thread root and the immediate parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ReplyRef {
    Status(String),
    Thread { root: RecordRef, parent: RecordRef },
}

/// One logical post to fan out across services
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub text: PostText,
    pub images: Vec<Image>,
    pub geo: Option<GeoPoint>,
    /// Per-service reply targets, keyed by service name
    pub reply_targets: HashMap<String, ReplyRef>,
    /// Split over-long text into a reply thread instead of selecting a variant
    pub wrap: bool,
}

impl PostRequest {
    pub fn new(text: impl Into<PostText>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
            geo: None,
            reply_targets: HashMap::new(),
            wrap: false,
        }
    }

    pub fn with_images(mut self, images: Vec<Image>) -> Self {
        self.images = images;
        self
    }

    pub fn with_geo(mut self, geo: GeoPoint) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn with_reply_target(mut self, service: impl Into<String>, reply: ReplyRef) -> Self {
        self.reply_targets.insert(service.into(), reply);
        self
    }

    pub fn with_wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    /// Check the request for caller errors before any service runs
    pub fn validate(&self) -> Result<()> {
        match &self.text {
            PostText::Alternatives(_) if self.wrap => Err(CrosspostError::InvalidRequest(
                "Cannot wrap a post given as alternatives".to_string(),
            )),
            PostText::Alternatives(alts) if alts.is_empty() => Err(CrosspostError::InvalidRequest(
                "Alternatives list cannot be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
