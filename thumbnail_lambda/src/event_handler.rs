use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use image::ImageFormat;
use lambda_runtime::{tracing, Context, Error, LambdaEvent};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::ThumbnailError;
use crate::keys;
use crate::storage::ObjectStore;
use crate::thumbnail;

/// Time left for logging and the response after the last record is cut off.
const DEADLINE_MARGIN: Duration = Duration::from_millis(250);

const UNSUPPORTED_TYPE: &str = "unsupported type";

/// Storage handle and resolved configuration, built once per process and
/// shared by every invocation it serves.
pub(crate) struct ThumbnailContext<S> {
    pub storage: S,
    pub config: Config,
}

/// Output of a successful record, ready to be written.
#[derive(Debug)]
pub(crate) struct ThumbnailResult {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub original_size: u64,
}

#[derive(Debug)]
pub(crate) enum ProcessingOutcome {
    Success {
        key: String,
        thumbnail_key: String,
        original_size: u64,
    },
    Rejected {
        key: String,
        reason: &'static str,
    },
    Failed {
        key: String,
        error: ThumbnailError,
    },
}

/// Aggregate status returned to the invoker.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InvocationResponse {
    pub status_code: u16,
    pub message: String,
    pub succeeded: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl InvocationResponse {
    fn from_outcomes(outcomes: &[ProcessingOutcome]) -> Self {
        let mut response = InvocationResponse {
            status_code: 200,
            message: "Thumbnail creation completed".to_string(),
            succeeded: 0,
            rejected: 0,
            failed: 0,
        };
        for outcome in outcomes {
            match outcome {
                ProcessingOutcome::Success { .. } => response.succeeded += 1,
                ProcessingOutcome::Rejected { .. } => response.rejected += 1,
                ProcessingOutcome::Failed { .. } => response.failed += 1,
            }
        }
        if response.failed > 0 {
            response.status_code = 207;
            response.message = format!(
                "Thumbnail creation completed with {} failed record(s)",
                response.failed
            );
        }
        response
    }
}

/// Best-effort key for log lines about a record that never produced an outcome.
fn display_key(record: &S3EventRecord) -> String {
    let raw = record.s3.object.key.as_deref().unwrap_or_default();
    keys::decode_object_key(raw).unwrap_or_else(|_| raw.to_string())
}

fn source_bucket<'a>(record: &'a S3EventRecord, config: &'a Config) -> Option<&'a str> {
    record
        .s3
        .bucket
        .name
        .as_deref()
        .or(config.upload_bucket.as_deref())
}

/// Retrieval through write for a key that passed validation.
async fn create_thumbnail<S: ObjectStore>(
    ctx: &ThumbnailContext<S>,
    bucket: &str,
    key: &str,
) -> Result<ThumbnailResult, ThumbnailError> {
    let object = ctx
        .storage
        .get(bucket, key)
        .await
        .map_err(ThumbnailError::from_retrieval)?;
    let original_size = object.byte_length;

    let hint = keys::extension(key).and_then(ImageFormat::from_extension);
    let max_dimension = ctx.config.max_dimension;
    let bytes = object.bytes;
    let thumb = tokio::task::spawn_blocking(move || thumbnail::render(&bytes, hint, max_dimension))
        .await
        .map_err(|e| ThumbnailError::Worker(e.to_string()))??;
    tracing::debug!(
        key,
        original_size,
        source_width = thumb.source_width,
        source_height = thumb.source_height,
        width = thumb.width,
        height = thumb.height,
        "Resized image"
    );

    // The source's declared type wins; the decoded format is not cross-checked against it.
    let content_type = object
        .content_type
        .unwrap_or_else(|| thumb.mime_type().to_string());
    let result = ThumbnailResult {
        bucket: ctx.config.thumbnail_bucket.clone(),
        key: keys::thumbnail_key(key, ctx.config.key_split),
        body: Bytes::from(thumb.bytes),
        content_type,
        original_size,
    };

    ctx.storage
        .put(&result.bucket, &result.key, result.body.clone(), &result.content_type)
        .await
        .map_err(ThumbnailError::Write)?;
    Ok(result)
}

async fn process_record<S: ObjectStore>(
    ctx: &ThumbnailContext<S>,
    record: &S3EventRecord,
) -> ProcessingOutcome {
    let Some(raw_key) = record.s3.object.key.as_deref() else {
        return ProcessingOutcome::Failed {
            key: String::new(),
            error: ThumbnailError::MalformedRecord("missing object key"),
        };
    };
    let key = match keys::decode_object_key(raw_key) {
        Ok(key) => key,
        Err(error) => {
            return ProcessingOutcome::Failed {
                key: raw_key.to_string(),
                error,
            }
        }
    };

    if !keys::has_allowed_extension(&key, &ctx.config.allowed_extensions) {
        return ProcessingOutcome::Rejected {
            key,
            reason: UNSUPPORTED_TYPE,
        };
    }

    let Some(bucket) = source_bucket(record, &ctx.config) else {
        return ProcessingOutcome::Failed {
            key,
            error: ThumbnailError::MalformedRecord("missing bucket name"),
        };
    };

    match create_thumbnail(ctx, bucket, &key).await {
        Ok(result) => ProcessingOutcome::Success {
            key,
            thumbnail_key: result.key,
            original_size: result.original_size,
        },
        Err(error) => ProcessingOutcome::Failed { key, error },
    }
}

fn log_outcome(outcome: &ProcessingOutcome) {
    match outcome {
        ProcessingOutcome::Success {
            key,
            thumbnail_key,
            original_size,
        } => tracing::info!(
            key = %key,
            original_size,
            thumbnail_key = %thumbnail_key,
            "Created thumbnail"
        ),
        ProcessingOutcome::Rejected { key, reason } => {
            tracing::warn!(key = %key, reason, "Skipping object with unsupported type")
        }
        ProcessingOutcome::Failed { key, error } => {
            tracing::error!(
                key = %key,
                stage = %error.stage(),
                error = %error,
                "Failed to create thumbnail"
            )
        }
    }
}

/// Milliseconds-since-epoch deadline from the runtime, turned into a local
/// instant with a margin. A zero deadline means none was supplied.
fn invocation_deadline(context: &Context) -> Option<Instant> {
    if context.deadline == 0 {
        return None;
    }
    let deadline = UNIX_EPOCH + Duration::from_millis(context.deadline);
    let remaining = deadline
        .duration_since(SystemTime::now())
        .unwrap_or_default()
        .saturating_sub(DEADLINE_MARGIN);
    Some(Instant::now() + remaining)
}

async fn process_with_deadline<S: ObjectStore>(
    ctx: &ThumbnailContext<S>,
    record: &S3EventRecord,
    deadline: Option<Instant>,
    started: Instant,
) -> ProcessingOutcome {
    let outcome = match deadline {
        Some(deadline) => {
            match tokio::time::timeout_at(deadline, process_record(ctx, record)).await {
                Ok(outcome) => outcome,
                Err(_) => ProcessingOutcome::Failed {
                    key: display_key(record),
                    error: ThumbnailError::Timeout(deadline.saturating_duration_since(started)),
                },
            }
        }
        None => process_record(ctx, record).await,
    };
    log_outcome(&outcome);
    outcome
}

pub(crate) async fn process_s3_records<S: ObjectStore>(
    ctx: &ThumbnailContext<S>,
    records: &[S3EventRecord],
    deadline: Option<Instant>,
) -> Vec<ProcessingOutcome> {
    let started = Instant::now();
    stream::iter(records)
        .map(|record| process_with_deadline(ctx, record, deadline, started))
        .buffered(ctx.config.max_concurrency)
        .collect()
        .await
}

pub(crate) async fn function_handler<S: ObjectStore>(
    event: LambdaEvent<S3Event>,
    ctx: &ThumbnailContext<S>,
) -> Result<InvocationResponse, Error> {
    let payload = event.payload;
    if payload.records.is_empty() {
        tracing::warn!("No records found in S3 event");
        return Ok(InvocationResponse::from_outcomes(&[]));
    }
    let deadline = invocation_deadline(&event.context);
    let outcomes = process_s3_records(ctx, &payload.records, deadline).await;
    let response = InvocationResponse::from_outcomes(&outcomes);
    tracing::info!(
        records = outcomes.len(),
        succeeded = response.succeeded,
        rejected = response.rejected,
        failed = response.failed,
        "Finished processing S3 event"
    );
    Ok(response)
}
