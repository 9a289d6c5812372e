use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;

use crate::models::PlatformStats;

const LEETCODE_BASE: &str = "https://leetcode-stats-api.herokuapp.com";
const CODEFORCES_BASE: &str = "https://codeforces.com/api";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// Unified per-platform stats fetch. Only LeetCode supplies the per-tier
/// breakdown; the others report aggregate totals at best.
pub async fn fetch_stats(
    client: &reqwest::Client,
    platform: &str,
    handle: &str,
) -> anyhow::Result<PlatformStats> {
    match platform.to_ascii_lowercase().as_str() {
        "leetcode" => fetch_leetcode(client, handle).await,
        "codeforces" => fetch_codeforces(client, handle).await,
        "gfg" => fetch_gfg(client, handle).await,
        "hackerrank" => bail!("hackerrank has no public stats endpoint"),
        other => bail!("unsupported platform: {other}"),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeetCodeResponse {
    status: Option<String>,
    #[serde(default)]
    easy_solved: i32,
    #[serde(default)]
    medium_solved: i32,
    #[serde(default)]
    hard_solved: i32,
    #[serde(default)]
    total_solved: i32,
}

async fn fetch_leetcode(client: &reqwest::Client, handle: &str) -> anyhow::Result<PlatformStats> {
    let url = format!("{LEETCODE_BASE}/{handle}");
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        bail!("leetcode stats request failed with {}", response.status());
    }

    let body: LeetCodeResponse = response.json().await?;
    if body.status.as_deref() == Some("error") {
        bail!("leetcode reported an error for handle {handle}");
    }

    Ok(PlatformStats {
        easy_solved: Some(body.easy_solved),
        medium_solved: Some(body.medium_solved),
        hard_solved: Some(body.hard_solved),
        total_solved: Some(body.total_solved),
    })
}

#[derive(Deserialize)]
struct CodeforcesResponse {
    status: String,
    #[serde(default)]
    result: Vec<CodeforcesSubmission>,
}

#[derive(Deserialize)]
struct CodeforcesSubmission {
    verdict: Option<String>,
    problem: CodeforcesProblem,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeforcesProblem {
    contest_id: Option<i64>,
    index: String,
}

/// Codeforces has no easy/medium/hard tiers; count distinct accepted
/// problems for the aggregate total only.
async fn fetch_codeforces(
    client: &reqwest::Client,
    handle: &str,
) -> anyhow::Result<PlatformStats> {
    let url = format!("{CODEFORCES_BASE}/user.status?handle={handle}");
    let body: CodeforcesResponse = client.get(&url).send().await?.json().await?;

    if body.status != "OK" {
        bail!("codeforces returned status {} for {handle}", body.status);
    }

    let solved: HashSet<(Option<i64>, String)> = body
        .result
        .into_iter()
        .filter(|s| s.verdict.as_deref() == Some("OK"))
        .map(|s| (s.problem.contest_id, s.problem.index))
        .collect();

    Ok(PlatformStats {
        total_solved: Some(solved.len() as i32),
        ..PlatformStats::default()
    })
}

/// GeeksforGeeks exposes no stable public API; the profile page total is
/// all that can be read, and parse failures surface as fetch errors.
async fn fetch_gfg(client: &reqwest::Client, handle: &str) -> anyhow::Result<PlatformStats> {
    let url = format!("https://auth.geeksforgeeks.org/user/{handle}/practice/");
    let response = client
        .get(&url)
        .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
        .send()
        .await?;
    if !response.status().is_success() {
        bail!("gfg profile request failed with {}", response.status());
    }

    let page = response.text().await?;
    let total = parse_gfg_total(&page)
        .ok_or_else(|| anyhow!("could not find solved count on gfg profile for {handle}"))?;

    Ok(PlatformStats {
        total_solved: Some(total),
        ..PlatformStats::default()
    })
}

fn parse_gfg_total(page: &str) -> Option<i32> {
    let marker = "score_card_value";
    let at = page.find(marker)?;
    let rest = &page[at..];
    let open = rest.find('>')?;
    let close = rest[open..].find('<')? + open;
    rest[open + 1..close].trim().parse().ok()
}

/// Fill unreported fields with zeros before arithmetic. A platform that
/// reported nothing at all should have been rejected earlier.
pub fn to_counts(stats: &PlatformStats) -> (i32, i32, i32, i32) {
    let easy = stats.easy_solved.unwrap_or(0);
    let medium = stats.medium_solved.unwrap_or(0);
    let hard = stats.hard_solved.unwrap_or(0);
    let total = stats
        .total_solved
        .unwrap_or_else(|| easy + medium + hard);
    (easy, medium, hard, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gfg_total_parses_from_score_card_markup() {
        let page = r#"<div class="score_card_value">  342 </div>"#;
        assert_eq!(parse_gfg_total(page), Some(342));
    }

    #[test]
    fn gfg_parse_fails_without_marker() {
        assert_eq!(parse_gfg_total("<html></html>"), None);
    }

    #[test]
    fn counts_default_missing_tiers_to_zero() {
        let stats = PlatformStats {
            total_solved: Some(120),
            ..PlatformStats::default()
        };
        assert_eq!(to_counts(&stats), (0, 0, 0, 120));
    }

    #[test]
    fn counts_derive_total_from_tiers_when_absent() {
        let stats = PlatformStats {
            easy_solved: Some(5),
            medium_solved: Some(3),
            hard_solved: Some(1),
            total_solved: None,
        };
        assert_eq!(to_counts(&stats), (5, 3, 1, 9));
    }
}
