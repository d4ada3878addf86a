use async_trait::async_trait;
use reqwest::Client;
use std::env;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::models::{Cell, Frame};

const NFLVERSE_RELEASES: &str = "https://github.com/nflverse/nflverse-data/releases/download";
const SCHEDULE_CSV: &str = "https://raw.githubusercontent.com/nflverse/nfldata/master/data/games.csv";
const TEAMS_CSV: &str = "https://github.com/nflverse/nflfastR-data/raw/master/teams_colors_logos.csv";

/// Where raw NFL record sets come from.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Weekly player stat rows of one season.
    async fn weekly_stats(&self, season: i32) -> Result<Frame>;

    /// Schedule and results of one season.
    async fn schedules(&self, season: i32) -> Result<Frame>;

    /// Team descriptions, every franchise abbreviation ever used.
    async fn teams(&self) -> Result<Frame>;

    async fn rosters(&self, season: i32) -> Result<Frame>;

    /// Per-game snap counts of one season.
    async fn snap_counts(&self, season: i32) -> Result<Frame>;
}

// ── nflverse ────────────────────────────────────────────────────────────────

/// Reads the public nflverse CSV releases.
pub struct NflverseFetcher {
    client: Client,
    releases_url: String,
    schedule_url: String,
    teams_url: String,
}

impl NflverseFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SyncError::acquisition("client", e.to_string()))?;

        Ok(Self {
            client,
            releases_url: env::var("NFLVERSE_BASE_URL").unwrap_or_else(|_| NFLVERSE_RELEASES.to_string()),
            schedule_url: env::var("NFL_SCHEDULE_URL").unwrap_or_else(|_| SCHEDULE_CSV.to_string()),
            teams_url: env::var("NFL_TEAMS_URL").unwrap_or_else(|_| TEAMS_CSV.to_string()),
        })
    }

    pub fn release_url(&self, tag: &str, file: &str) -> String {
        format!("{}/{}/{}", self.releases_url.trim_end_matches('/'), tag, file)
    }

    async fn fetch_csv(&self, feed: &str, url: &str) -> Result<Frame> {
        tracing::info!("Downloading {} from {}…", feed, url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::acquisition(feed, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::acquisition(feed, format!("API error {}: {}", status, body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::acquisition(feed, e.to_string()))?;
        let frame = Frame::from_csv_reader(bytes.as_ref())
            .map_err(|e| SyncError::acquisition(feed, format!("unreadable CSV: {}", e)))?;

        if frame.is_empty() {
            return Err(SyncError::acquisition(feed, "no rows"));
        }
        tracing::info!("Downloaded {} {} rows", frame.len(), feed);
        Ok(frame)
    }
}

/// Raw nflverse roster headers and the names the rest of the crate uses.
pub const ROSTER_RENAMES: &[(&str, &str)] = &[("full_name", "player_name"), ("gsis_id", "player_id")];

/// Gives a raw seasonal roster the `player_name` / `player_id` columns.
/// Frames that already carry them are returned as they are.
pub fn standardize_rosters(mut rosters: Frame) -> Frame {
    for (from, to) in ROSTER_RENAMES {
        rosters.rename_column(from, to);
    }
    rosters
}

/// Rows of `frame` whose `season` column equals `season`.
pub fn filter_season(frame: &Frame, season: i32) -> Frame {
    let season = i64::from(season);
    frame.filter(|row| row.get("season").and_then(Cell::as_i64) == Some(season))
}

#[async_trait]
impl StatsSource for NflverseFetcher {
    async fn weekly_stats(&self, season: i32) -> Result<Frame> {
        let url = self.release_url("player_stats", &format!("player_stats_{}.csv", season));
        self.fetch_csv("weekly stats", &url).await
    }

    async fn schedules(&self, season: i32) -> Result<Frame> {
        let all = self.fetch_csv("schedule", &self.schedule_url).await?;
        let games = filter_season(&all, season);
        if games.is_empty() {
            return Err(SyncError::acquisition("schedule", format!("no games for season {}", season)));
        }
        Ok(games)
    }

    async fn teams(&self) -> Result<Frame> {
        self.fetch_csv("teams", &self.teams_url).await
    }

    async fn rosters(&self, season: i32) -> Result<Frame> {
        let url = self.release_url("rosters", &format!("roster_{}.csv", season));
        self.fetch_csv("rosters", &url).await.map(standardize_rosters)
    }

    async fn snap_counts(&self, season: i32) -> Result<Frame> {
        let url = self.release_url("snap_counts", &format!("snap_counts_{}.csv", season));
        self.fetch_csv("snap counts", &url).await
    }
}

/// Runs one acquisition and turns failure into absence. An empty or
/// unreachable feed is logged here and the caller sees `None`.
pub async fn acquire<F>(feed: &str, fetch: F) -> Option<Frame>
where
    F: std::future::Future<Output = Result<Frame>>,
{
    match fetch.await {
        Ok(frame) if frame.is_empty() => {
            tracing::warn!("No {} data available", feed);
            None
        }
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!("Error downloading {}: {}", feed, e);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Serves fixed frames. A `None` feed fails like an unreachable URL.
    #[derive(Default, Clone)]
    pub struct FixedSource {
        pub weekly: Option<Frame>,
        pub schedule: Option<Frame>,
        pub teams: Option<Frame>,
        pub rosters: Option<Frame>,
        pub snaps: Option<Frame>,
    }

    fn serve(feed: &str, frame: &Option<Frame>) -> Result<Frame> {
        frame
            .clone()
            .ok_or_else(|| SyncError::acquisition(feed, "unreachable"))
    }

    #[async_trait]
    impl StatsSource for FixedSource {
        async fn weekly_stats(&self, _season: i32) -> Result<Frame> {
            serve("weekly stats", &self.weekly)
        }

        async fn schedules(&self, _season: i32) -> Result<Frame> {
            serve("schedule", &self.schedule)
        }

        async fn teams(&self) -> Result<Frame> {
            serve("teams", &self.teams)
        }

        async fn rosters(&self, _season: i32) -> Result<Frame> {
            serve("rosters", &self.rosters)
        }

        async fn snap_counts(&self, _season: i32) -> Result<Frame> {
            serve("snap counts", &self.snaps)
        }
    }

    pub fn csv(text: &str) -> Frame {
        Frame::from_csv_reader(text.as_bytes()).unwrap()
    }
}
