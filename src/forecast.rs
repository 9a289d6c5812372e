use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::models::FeatureRow;

pub const MODEL_PATH: &str = "model/growth_model.json";

/// Overrides the artifact location so train and predict agree on one model
/// regardless of the directory each command was launched from.
pub const MODEL_PATH_ENV: &str = "DSA_DRIFT_MODEL_PATH";

/// Regressor column order is fixed; the persisted weights are only valid
/// against this exact layout.
pub const FEATURE_COUNT: usize = 16;

/// Linear growth model fit by ordinary least squares over the feature
/// table, target = weekly_growth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub n_samples: usize,
}

fn regressors(row: &FeatureRow) -> [f64; FEATURE_COUNT] {
    [
        f64::from(row.total_solved),
        f64::from(row.easy_solved),
        f64::from(row.medium_solved),
        f64::from(row.hard_solved),
        f64::from(row.prev_total),
        f64::from(row.weekly_growth),
        f64::from(row.weekly_easy_growth),
        f64::from(row.weekly_medium_growth),
        f64::from(row.weekly_hard_growth),
        row.easy_ratio,
        row.medium_ratio,
        row.hard_ratio,
        row.balance_score,
        row.consistency_score,
        row.hard_problem_density,
        row.rolling_growth_3week,
    ]
}

/// Fit weights via the normal equations with a small ridge term for
/// numerical stability, solved by Gaussian elimination.
pub fn train(rows: &[FeatureRow]) -> anyhow::Result<GrowthModel> {
    if rows.is_empty() {
        bail!("no feature rows to train on");
    }

    // Augment with a bias column; dimension = FEATURE_COUNT + 1.
    let dim = FEATURE_COUNT + 1;
    let mut xtx = vec![vec![0.0f64; dim]; dim];
    let mut xty = vec![0.0f64; dim];

    for row in rows {
        let x = regressors(row);
        let y = f64::from(row.weekly_growth);
        for i in 0..dim {
            let xi = if i < FEATURE_COUNT { x[i] } else { 1.0 };
            xty[i] += xi * y;
            for j in 0..dim {
                let xj = if j < FEATURE_COUNT { x[j] } else { 1.0 };
                xtx[i][j] += xi * xj;
            }
        }
    }

    let ridge = 1e-4;
    for i in 0..FEATURE_COUNT {
        xtx[i][i] += ridge;
    }

    let solution = solve_linear_system(&mut xtx, &mut xty)
        .context("normal equations are singular; not enough variation in the features")?;

    let bias = solution[FEATURE_COUNT];
    let weights = solution[..FEATURE_COUNT].to_vec();

    Ok(GrowthModel {
        weights,
        bias,
        trained_at: chrono::Utc::now(),
        n_samples: rows.len(),
    })
}

/// Gaussian elimination with partial pivoting over the augmented system
/// `a * x = b`. Consumes its inputs as scratch space.
fn solve_linear_system(a: &mut [Vec<f64>], b: &mut [f64]) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0f64; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in (col + 1)..n {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Some(x)
}

impl GrowthModel {
    pub fn predict(&self, row: &FeatureRow) -> f64 {
        let x = regressors(row);
        self.weights
            .iter()
            .zip(x.iter())
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.bias
    }
}

pub fn save_model(model: &GrowthModel, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(model)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write model to {}", path.display()))?;
    Ok(())
}

pub fn load_model(path: &Path) -> anyhow::Result<GrowthModel> {
    if !path.exists() {
        bail!("model unavailable: run the pipeline to train it first");
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read model from {}", path.display()))?;
    let model = serde_json::from_str(&json).context("model artifact is corrupt")?;
    Ok(model)
}

pub fn default_model_path() -> PathBuf {
    std::env::var_os(MODEL_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(MODEL_PATH))
}

/// Predict next-period growth from a subject's most recent feature row.
pub fn predict_latest(model: &GrowthModel, rows: &[FeatureRow]) -> anyhow::Result<f64> {
    let last = rows
        .last()
        .ok_or_else(|| anyhow::anyhow!("no feature rows for this subject"))?;
    Ok(model.predict(last))
}
