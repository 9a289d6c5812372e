use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{FeatureRow, SnapshotRow, Subject};
use crate::week;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn upsert_subject(
    pool: &PgPool,
    handle: &str,
    platform: &str,
    display_name: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO dsa_drift.subjects (id, handle, platform, display_name)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (platform, handle) DO UPDATE
        SET display_name = EXCLUDED.display_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(handle)
    .bind(platform)
    .bind(display_name)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn list_subjects(pool: &PgPool) -> anyhow::Result<Vec<Subject>> {
    let rows = sqlx::query(
        "SELECT id, handle, platform, display_name \
         FROM dsa_drift.subjects ORDER BY platform, handle",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Subject {
            id: row.get("id"),
            handle: row.get("handle"),
            platform: row.get("platform"),
            display_name: row.get("display_name"),
        })
        .collect())
}

/// Most recent week bucket for a subject, if any snapshot exists.
pub async fn latest_week(
    pool: &PgPool,
    subject_id: Uuid,
) -> anyhow::Result<Option<(i32, NaiveDate)>> {
    let row = sqlx::query(
        "SELECT week_number, week_start_date \
         FROM dsa_drift.snapshots \
         WHERE subject_id = $1 \
         ORDER BY calendar_date DESC \
         LIMIT 1",
    )
    .bind(subject_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| (r.get("week_number"), r.get("week_start_date"))))
}

/// Insert a snapshot, or update it in place when the same calendar day was
/// already fetched (idempotent same-day re-fetch).
pub async fn upsert_snapshot(
    pool: &PgPool,
    subject_id: Uuid,
    week_number: i32,
    week_start_date: NaiveDate,
    calendar_date: NaiveDate,
    counts: (i32, i32, i32, i32),
) -> anyhow::Result<()> {
    let (easy, medium, hard, total) = counts;
    sqlx::query(
        r#"
        INSERT INTO dsa_drift.snapshots
        (subject_id, week_number, week_start_date, calendar_date,
         easy_solved, medium_solved, hard_solved, total_solved)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (subject_id, calendar_date) DO UPDATE
        SET week_number = EXCLUDED.week_number,
            week_start_date = EXCLUDED.week_start_date,
            easy_solved = EXCLUDED.easy_solved,
            medium_solved = EXCLUDED.medium_solved,
            hard_solved = EXCLUDED.hard_solved,
            total_solved = EXCLUDED.total_solved
        "#,
    )
    .bind(subject_id)
    .bind(week_number)
    .bind(week_start_date)
    .bind(calendar_date)
    .bind(easy)
    .bind(medium)
    .bind(hard)
    .bind(total)
    .execute(pool)
    .await?;

    Ok(())
}

/// Drop snapshot and feature rows older than the retention cutoff.
pub async fn purge_older_than(
    pool: &PgPool,
    cutoff: NaiveDate,
) -> anyhow::Result<(u64, u64)> {
    let snapshots = sqlx::query("DELETE FROM dsa_drift.snapshots WHERE calendar_date < $1")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    let features = sqlx::query("DELETE FROM dsa_drift.features WHERE calendar_date < $1")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    Ok((snapshots, features))
}

/// Complete snapshot history ordered by (subject, date) — the ordering the
/// feature engine's partition logic depends on.
pub async fn list_snapshots(pool: &PgPool) -> anyhow::Result<Vec<SnapshotRow>> {
    let rows = sqlx::query(
        "SELECT s.subject_id, sub.handle, s.week_number, s.week_start_date, \
         s.calendar_date, s.easy_solved, s.medium_solved, s.hard_solved, s.total_solved \
         FROM dsa_drift.snapshots s \
         JOIN dsa_drift.subjects sub ON sub.id = s.subject_id \
         ORDER BY s.subject_id, s.calendar_date",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SnapshotRow {
            subject_id: row.get("subject_id"),
            handle: row.get("handle"),
            week_number: row.get("week_number"),
            week_start_date: row.get("week_start_date"),
            calendar_date: row.get("calendar_date"),
            easy_solved: row.get("easy_solved"),
            medium_solved: row.get("medium_solved"),
            hard_solved: row.get("hard_solved"),
            total_solved: row.get("total_solved"),
        })
        .collect())
}

/// Swap in a freshly computed feature table. Delete and inserts run in one
/// transaction so a reader sees either the old table or the new one, and a
/// failure partway leaves the old table in place.
pub async fn replace_features(pool: &PgPool, rows: &[FeatureRow]) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM dsa_drift.features")
        .execute(&mut *tx)
        .await?;

    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO dsa_drift.features
            (subject_id, week_number, week_start_date, calendar_date,
             easy_solved, medium_solved, hard_solved, total_solved,
             prev_total, prev_easy, prev_medium, prev_hard,
             weekly_growth, weekly_easy_growth, weekly_medium_growth, weekly_hard_growth,
             easy_ratio, medium_ratio, hard_ratio, balance_score,
             consistency_score, hard_problem_density, rolling_growth_3week,
             prev_weekly_growth, inactive_weeks, sudden_drop, declining_trend,
             drift_flag, drift_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26,
                    $27, $28, $29)
            "#,
        )
        .bind(row.subject_id)
        .bind(row.week_number)
        .bind(row.week_start_date)
        .bind(row.calendar_date)
        .bind(row.easy_solved)
        .bind(row.medium_solved)
        .bind(row.hard_solved)
        .bind(row.total_solved)
        .bind(row.prev_total)
        .bind(row.prev_easy)
        .bind(row.prev_medium)
        .bind(row.prev_hard)
        .bind(row.weekly_growth)
        .bind(row.weekly_easy_growth)
        .bind(row.weekly_medium_growth)
        .bind(row.weekly_hard_growth)
        .bind(row.easy_ratio)
        .bind(row.medium_ratio)
        .bind(row.hard_ratio)
        .bind(row.balance_score)
        .bind(row.consistency_score)
        .bind(row.hard_problem_density)
        .bind(row.rolling_growth_3week)
        .bind(row.prev_weekly_growth)
        .bind(row.inactive_weeks)
        .bind(row.sudden_drop)
        .bind(row.declining_trend)
        .bind(row.drift_flag)
        .bind(row.drift_reason.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn fetch_features(
    pool: &PgPool,
    handle: Option<&str>,
) -> anyhow::Result<Vec<FeatureRow>> {
    let mut query = String::from(
        "SELECT f.subject_id, sub.handle, f.week_number, f.week_start_date, \
         f.calendar_date, f.easy_solved, f.medium_solved, f.hard_solved, f.total_solved, \
         f.prev_total, f.prev_easy, f.prev_medium, f.prev_hard, \
         f.weekly_growth, f.weekly_easy_growth, f.weekly_medium_growth, f.weekly_hard_growth, \
         f.easy_ratio, f.medium_ratio, f.hard_ratio, f.balance_score, \
         f.consistency_score, f.hard_problem_density, f.rolling_growth_3week, \
         f.prev_weekly_growth, f.inactive_weeks, f.sudden_drop, f.declining_trend, \
         f.drift_flag, f.drift_reason \
         FROM dsa_drift.features f \
         JOIN dsa_drift.subjects sub ON sub.id = f.subject_id",
    );

    if handle.is_some() {
        query.push_str(" WHERE sub.handle = $1");
    }
    query.push_str(" ORDER BY f.subject_id, f.week_number, f.calendar_date");

    let mut rows = sqlx::query(&query);
    if let Some(value) = handle {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut features = Vec::with_capacity(records.len());

    for row in records {
        features.push(FeatureRow {
            subject_id: row.get("subject_id"),
            handle: row.get("handle"),
            week_number: row.get("week_number"),
            week_start_date: row.get("week_start_date"),
            calendar_date: row.get("calendar_date"),
            easy_solved: row.get("easy_solved"),
            medium_solved: row.get("medium_solved"),
            hard_solved: row.get("hard_solved"),
            total_solved: row.get("total_solved"),
            prev_total: row.get("prev_total"),
            prev_easy: row.get("prev_easy"),
            prev_medium: row.get("prev_medium"),
            prev_hard: row.get("prev_hard"),
            weekly_growth: row.get("weekly_growth"),
            weekly_easy_growth: row.get("weekly_easy_growth"),
            weekly_medium_growth: row.get("weekly_medium_growth"),
            weekly_hard_growth: row.get("weekly_hard_growth"),
            easy_ratio: row.get("easy_ratio"),
            medium_ratio: row.get("medium_ratio"),
            hard_ratio: row.get("hard_ratio"),
            balance_score: row.get("balance_score"),
            consistency_score: row.get("consistency_score"),
            hard_problem_density: row.get("hard_problem_density"),
            rolling_growth_3week: row.get("rolling_growth_3week"),
            prev_weekly_growth: row.get("prev_weekly_growth"),
            inactive_weeks: row.get("inactive_weeks"),
            sudden_drop: row.get("sudden_drop"),
            declining_trend: row.get("declining_trend"),
            drift_flag: row.get("drift_flag"),
            drift_reason: row.get("drift_reason"),
        });
    }

    Ok(features)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let subjects = vec![
        ("avery-lee", "leetcode", "Avery Lee"),
        ("jules-moreno", "leetcode", "Jules Moreno"),
        ("kiara-patel", "leetcode", "Kiara Patel"),
    ];

    let mut ids = Vec::new();
    for (handle, platform, display_name) in subjects {
        ids.push(upsert_subject(pool, handle, platform, display_name).await?);
    }

    // Three contrasting histories: a steady grower, a stall, and a drop.
    let histories: [&[(i64, i32, i32, i32)]; 3] = [
        &[(21, 20, 8, 2), (14, 26, 11, 3), (7, 31, 15, 4), (0, 38, 18, 5)],
        &[(21, 40, 22, 6), (14, 40, 22, 6), (7, 40, 22, 6), (0, 40, 22, 6)],
        &[(21, 10, 4, 1), (14, 18, 8, 2), (7, 27, 12, 3), (0, 28, 12, 3)],
    ];

    let today = week::today_utc();
    for (subject_id, history) in ids.into_iter().zip(histories) {
        for &(days_ago, easy, medium, hard) in history {
            let day = today - chrono::Duration::days(days_ago);
            let slot = assign_week_for(pool, subject_id, day).await?;
            upsert_snapshot(
                pool,
                subject_id,
                slot.0,
                slot.1,
                day,
                (easy, medium, hard, easy + medium + hard),
            )
            .await?;
        }
    }

    Ok(())
}

/// Week assignment against the stored history for one observation date.
pub async fn assign_week_for(
    pool: &PgPool,
    subject_id: Uuid,
    observed: NaiveDate,
) -> anyhow::Result<(i32, NaiveDate)> {
    let last = latest_week(pool, subject_id).await?;
    Ok(week::assign_week(last, observed))
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        handle: String,
        platform: String,
        display_name: String,
        calendar_date: NaiveDate,
        easy_solved: Option<i32>,
        medium_solved: Option<i32>,
        hard_solved: Option<i32>,
        total_solved: Option<i32>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        rows.push(result?);
    }
    // Ingestion order must match the week assigner's expectations.
    rows.sort_by(|a, b| {
        (&a.platform, &a.handle, a.calendar_date).cmp(&(&b.platform, &b.handle, b.calendar_date))
    });

    let mut inserted = 0usize;
    for row in rows {
        let subject_id =
            upsert_subject(pool, &row.handle, &row.platform, &row.display_name).await?;

        let easy = row.easy_solved.unwrap_or(0);
        let medium = row.medium_solved.unwrap_or(0);
        let hard = row.hard_solved.unwrap_or(0);
        let total = row.total_solved.unwrap_or(easy + medium + hard);

        let (week_number, week_start) =
            assign_week_for(pool, subject_id, row.calendar_date).await?;
        upsert_snapshot(
            pool,
            subject_id,
            week_number,
            week_start,
            row.calendar_date,
            (easy, medium, hard, total),
        )
        .await?;
        inserted += 1;
    }

    Ok(inserted)
}
