mod config;
mod logging;

use comic_backend::ComicBackend;
use comic_core::{ComicError, types::LIST_COVER_SIZE};
use tracing::{error, info};

use crate::config::{DescriptionSmoke, SmokeConfig};

#[tokio::main]
async fn main() {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!("Invalid configuration: {err}");
            eprintln!(
                "Required: COMICS_APPWRITE_PROJECT_ID, COMICS_APPWRITE_DATABASE_ID, COMICS_APPWRITE_COLLECTION_ID"
            );
            std::process::exit(2);
        }
    };

    if let Err(err) = run(config).await {
        eprintln!("Smoke run failed [{}]: {err}", err.code());
        std::process::exit(1);
    }
}

async fn run(config: SmokeConfig) -> Result<(), ComicError> {
    info!(
        endpoint = %config.backend.endpoint,
        collection_id = %config.backend.collection_id,
        "starting comic backend smoke run"
    );
    let backend = ComicBackend::from_config(config.backend)?;

    let comics = backend.list_comics().await?;
    println!("Listed {} comic(s).", comics.len());
    let (width, height) = LIST_COVER_SIZE;
    for comic in &comics {
        let cover = backend.cover_url(comic.cover_image.as_deref(), width, height);
        println!(
            "- {} [{}] rating {} cover {}",
            comic.title,
            comic.status,
            comic.rating,
            cover.as_str()
        );
    }

    if let Some(DescriptionSmoke {
        title,
        status,
        rating,
    }) = config.description
    {
        let description = backend
            .generate_description(&title, &status, rating)
            .await?;
        println!("Generated description for '{title}': {description}");
    } else {
        println!("Set COMICS_SMOKE_TITLE to also exercise description generation.");
    }
    Ok(())
}
