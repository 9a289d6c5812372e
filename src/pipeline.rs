use sqlx::PgPool;
use tracing::{info, warn};

use crate::models::{PlatformStats, Subject};
use crate::{db, drift, features, forecast, platforms, week};

/// Ingestion phase: purge expired rows, then fetch current counts for every
/// registered subject and bucket them onto weeks. A failed fetch skips that
/// subject and the run continues.
pub async fn run_fetch(pool: &PgPool, client: &reqwest::Client) -> anyhow::Result<()> {
    let today = week::today_utc();
    let cutoff = week::retention_cutoff(today);
    let (snapshots, feature_rows) = db::purge_older_than(pool, cutoff).await?;
    info!(
        %cutoff,
        snapshots, features = feature_rows,
        "purged rows past the retention window"
    );

    let subjects = db::list_subjects(pool).await?;
    if subjects.is_empty() {
        info!("no subjects registered; nothing to fetch");
        return Ok(());
    }

    for subject in subjects {
        let stats = match platforms::fetch_stats(client, &subject.platform, &subject.handle).await
        {
            Ok(stats) => stats,
            Err(err) => {
                warn!(
                    handle = %subject.handle,
                    platform = %subject.platform,
                    error = %err,
                    "fetch failed; skipping subject for this run"
                );
                continue;
            }
        };
        if stats.is_empty() {
            warn!(
                handle = %subject.handle,
                platform = %subject.platform,
                "platform reported no usable counts; skipping"
            );
            continue;
        }

        // A per-subject write failure skips that subject like a failed
        // fetch; it must not abort the remaining subjects or the run.
        match record_snapshot(pool, &subject, &stats, today).await {
            Ok(week_number) => {
                info!(handle = %subject.handle, week = week_number, "snapshot recorded");
            }
            Err(err) => {
                warn!(
                    handle = %subject.handle,
                    platform = %subject.platform,
                    error = %err,
                    "snapshot write failed; skipping subject for this run"
                );
            }
        }
    }

    Ok(())
}

/// Week-assign and persist one subject's fetched counts. Surfaces store
/// errors as a value so the fetch loop can log and move on.
async fn record_snapshot(
    pool: &PgPool,
    subject: &Subject,
    stats: &PlatformStats,
    today: chrono::NaiveDate,
) -> anyhow::Result<i32> {
    let (week_number, week_start) = db::assign_week_for(pool, subject.id, today).await?;
    db::upsert_snapshot(
        pool,
        subject.id,
        week_number,
        week_start,
        today,
        platforms::to_counts(stats),
    )
    .await?;
    Ok(week_number)
}

/// Feature phase: recompute the full feature table from the current
/// snapshot history and swap it in atomically. With no raw snapshots the
/// prior table is left untouched.
pub async fn run_engineer(pool: &PgPool) -> anyhow::Result<()> {
    let snapshots = db::list_snapshots(pool).await?;
    if snapshots.is_empty() {
        info!("no raw snapshots found; feature table left as-is");
        return Ok(());
    }

    let mut rows = features::engineer(&snapshots);
    drift::annotate(&mut rows);
    let drifting = rows.iter().filter(|r| r.drift_flag).count();
    db::replace_features(pool, &rows).await?;
    info!(rows = rows.len(), drifting, "feature table rebuilt");

    Ok(())
}

/// Training phase: fit the growth model over the feature table and persist
/// the artifact. A missing feature table is a logged no-op.
pub async fn run_train(pool: &PgPool) -> anyhow::Result<()> {
    let rows = db::fetch_features(pool, None).await?;
    if rows.is_empty() {
        info!("no feature rows found; skipping training");
        return Ok(());
    }

    let model = forecast::train(&rows)?;
    let path = forecast::default_model_path();
    forecast::save_model(&model, &path)?;
    info!(samples = model.n_samples, path = %path.display(), "growth model saved");

    Ok(())
}

/// Full pipeline: fetch -> engineer -> train, sequentially. Each phase is
/// logged on its own; a phase that fails stops the run.
pub async fn run_full_pipeline(pool: &PgPool, client: &reqwest::Client) -> anyhow::Result<()> {
    info!("pipeline: fetching platform stats");
    run_fetch(pool, client).await?;
    info!("pipeline: engineering features");
    run_engineer(pool).await?;
    info!("pipeline: training growth model");
    run_train(pool).await?;
    info!("pipeline: done");
    Ok(())
}
