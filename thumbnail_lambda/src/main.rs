use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use lambda_runtime::{run, service_fn, tracing, Error};
mod config;
mod error;
mod event_handler;
mod keys;
mod storage;
mod thumbnail;
use config::Config;
use event_handler::{function_handler, ThumbnailContext};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::subscriber::fmt().json().init();
    let config = Config::from_env()?;
    tracing::info!(
        upload_bucket = config.upload_bucket.as_deref().unwrap_or("<from event>"),
        thumbnail_bucket = %config.thumbnail_bucket,
        max_dimension = config.max_dimension,
        max_concurrency = config.max_concurrency,
        "Loaded thumbnail configuration"
    );
    let shared_config = aws_config::load_defaults(BehaviorVersion::v2025_01_17()).await;
    let ctx = ThumbnailContext {
        storage: S3Client::new(&shared_config),
        config,
    };
    run(service_fn(|event| function_handler(event, &ctx))).await
}
