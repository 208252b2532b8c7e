//! cross-post - Publish one post to several social networks

use std::io::Read;

use clap::Parser;
use tracing::warn;

use libcrosspost::config::Config;
use libcrosspost::logging::{self, LogFormat};
use libcrosspost::orchestrator::Orchestrator;
use libcrosspost::request::{GeoPoint, PostRequest, ReplyRef};
use libcrosspost::{CrosspostError, Image, Result};

#[derive(Parser, Debug)]
#[command(name = "cross-post")]
#[command(about = "Publish one post to several social networks", long_about = None)]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// Actually publish. Without this flag everything runs except the
    /// network submission
    #[arg(long)]
    live: bool,

    /// Split over-long content into a reply thread
    #[arg(short, long)]
    wrap: bool,

    /// Attach an image file (repeatable)
    #[arg(short, long)]
    image: Vec<String>,

    /// Alt text for the image at the same position (repeatable)
    #[arg(long)]
    alt: Vec<String>,

    /// Latitude to attach, for services that accept coordinates
    #[arg(long, requires = "lon")]
    lat: Option<f64>,

    /// Longitude to attach
    #[arg(long, requires = "lat")]
    lon: Option<f64>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        logging::init(LogFormat::Text, "debug");
    } else {
        logging::init_default();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let content = match cli.content {
        Some(content) => content,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| CrosspostError::InvalidRequest(format!("Failed to read stdin: {}", e)))?;
            buffer.trim_end().to_string()
        }
    };
    if content.trim().is_empty() {
        return Err(CrosspostError::InvalidRequest(
            "Content cannot be empty".to_string(),
        ));
    }

    let mut images = Vec::with_capacity(cli.image.len());
    for (i, path) in cli.image.iter().enumerate() {
        let mut image = Image::from_path(path)?;
        if let Some(alt) = cli.alt.get(i) {
            image = image.with_description(alt);
        }
        images.push(image);
    }

    if !cli.live {
        warn!("dev mode: nothing will be published (pass --live to post)");
    }

    let config = Config::load()?;
    let orchestrator = Orchestrator::from_config(&config, cli.live).await;
    if orchestrator.is_empty() {
        warn!("no services are enabled and authenticated");
    }

    let mut request = PostRequest::new(content)
        .with_images(images)
        .with_wrap(cli.wrap);
    if let (Some(lat), Some(lon)) = (cli.lat, cli.lon) {
        request = request.with_geo(GeoPoint {
            latitude: lat,
            longitude: lon,
        });
    }

    let results = orchestrator.post(&request).await?;

    match cli.format.as_str() {
        "json" => {
            let rendered = serde_json::to_string_pretty(&results).map_err(|e| {
                CrosspostError::InvalidRequest(format!("Failed to render results: {}", e))
            })?;
            println!("{}", rendered);
        }
        _ => {
            for (service, handle) in &results {
                match handle {
                    Some(ReplyRef::Status(id)) => println!("{}: posted {}", service, id),
                    Some(ReplyRef::Thread { parent, .. }) => {
                        println!("{}: posted {}", service, parent.uri)
                    }
                    None => println!("{}: dev mode, not posted", service),
                }
            }
        }
    }

    Ok(())
}
