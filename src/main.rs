use std::sync::Arc;
use tokio::net::TcpListener;

use whamserver::config::{Config, StorageBackend};
use whamserver::middleware::rate_limit::RateLimiter;
use whamserver::relay::Relay;
use whamserver::sprite::codec::FfmpegCodec;
use whamserver::sprite::SpriteBuilder;
use whamserver::state::AppState;
use whamserver::storage::gcs::GcsBlobStore;
use whamserver::storage::local::LocalBlobStore;
use whamserver::storage::BlobStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whamserver=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let db = whamserver::db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    let blobs: Arc<dyn BlobStore> = match (&config.storage_backend, &config.gcs) {
        (StorageBackend::Gcs, Some(gcs)) => {
            Arc::new(GcsBlobStore::new(&gcs.bucket, &gcs.access_token))
        }
        _ => {
            let local = LocalBlobStore::new(&config.storage_path, &config.public_url);
            if let Err(e) = local.ensure_dirs().await {
                tracing::error!("failed to create storage directories: {e}");
            }
            Arc::new(local)
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(&config.sprite.staging_path).await {
        tracing::error!(
            "failed to create staging directory {:?}: {e}",
            config.sprite.staging_path
        );
    }

    let codec = Arc::new(FfmpegCodec::new(&config.sprite.ffmpeg));
    let sprites = Arc::new(SpriteBuilder::new(
        config.sprite.clone(),
        codec,
        Arc::clone(&blobs),
    ));

    let state = AppState {
        db,
        blobs,
        sprites,
        relay: Arc::new(Relay::new()),
        rate_limiter: Arc::new(RateLimiter::default()),
        storage_path: config.storage_path.clone(),
        test_mode: config.test_mode,
    };

    let limiter = Arc::clone(&state.rate_limiter);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(limiter.window_secs()));
        loop {
            interval.tick().await;
            let pruned = limiter.prune(tokio::time::Instant::now());
            if pruned > 0 {
                tracing::debug!("pruned {pruned} idle rate limit bucket(s)");
            }
        }
    });

    let app = whamserver::routes::router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind");

    let actual_port = listener
        .local_addr()
        .expect("failed to get local address")
        .port();
    eprintln!("  \x1b[32m→ listening on 0.0.0.0:{actual_port}\x1b[0m");
    eprintln!();

    axum::serve(listener, app).await.expect("server error");
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let storage = match (&config.storage_backend, &config.gcs) {
        (StorageBackend::Gcs, Some(gcs)) => format!("gcs ({})", gcs.bucket),
        _ => format!("local ({})", config.storage_path.display()),
    };
    let formats: Vec<String> = config.sprite.formats.iter().map(|f| f.to_string()).collect();

    eprintln!();
    eprintln!("  \x1b[1;36mwham\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!("  \x1b[2mdatabase\x1b[0m     {}", config.database_url);
    eprintln!("  \x1b[2mstorage\x1b[0m      {storage}");
    eprintln!(
        "  \x1b[2msprites\x1b[0m      {} (gap {} ms, {} encoder(s))",
        formats.join(", "),
        config.sprite.gap_ms,
        config.sprite.encode_workers
    );

    if config.test_mode {
        eprintln!();
        eprintln!("  \x1b[33m! test mode enabled\x1b[0m");
    }

    eprintln!();
}
