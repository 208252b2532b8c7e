//! Crosspost - publish one post to several social networks
//!
//! The library fans a single logical post out across Mastodon, Bluesky and
//! Twitter, adapting it to each service's limits along the way: images are
//! downscaled to fit upload budgets, alternative phrasings are selected
//! against each character limit, and over-long text can be wrapped into a
//! reply thread.
//!
//! # Examples
//!
//! ```no_run
//! use libcrosspost::config::Config;
//! use libcrosspost::orchestrator::Orchestrator;
//! use libcrosspost::request::PostRequest;
//!
//! # async fn example() -> libcrosspost::error::Result<()> {
//! let config = Config::load()?;
//! let orchestrator = Orchestrator::from_config(&config, true).await;
//!
//! let request = PostRequest::new("Hello from everywhere at once");
//! let results = orchestrator.post(&request).await?;
//! for (service, handle) in &results {
//!     println!("{}: {:?}", service, handle);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod orchestrator;
pub mod request;
pub mod services;

pub use error::{CrosspostError, Result};
pub use image::{Image, ImageMime};
pub use orchestrator::Orchestrator;
pub use request::{GeoPoint, PostRequest, PostText, RecordRef, ReplyRef};
pub use services::{Service, ServiceProfile};
