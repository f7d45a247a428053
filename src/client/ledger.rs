//! # Daily Ledger
//!
//! Folds a meal's macros into the signed-in user's running totals for today.
//!
//! ## Update Sequence
//!
//! [`LedgerAggregator::add_to_daily_ledger`] runs three steps:
//!
//! 1. Require an identity; without one, fail before any network call
//! 2. `GET /daily-activity/{user_id}/today` for the current totals
//! 3. `PUT` the same path with the new absolute totals
//!
//! Each field is increased by the ceiling of its delta, so repeated small
//! additions are never under-counted. Totals saturate at `u32::MAX`.
//!
//! ## Consistency
//!
//! The sequence is a plain read-modify-write with no version stamp. Two
//! overlapping updates for the same user can both read the same totals, and
//! the later PUT then replaces the earlier one's contribution. The stored
//! value is always one of the two candidate totals, never a mix.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::predict::Nutrition;
use crate::client::{body_excerpt, endpoint};
use crate::config::SnapConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::identity::SessionIdentity;

/// Today's consumed totals for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DailyActivity {
    pub calories_consumed: u32,
    pub protein_consumed: u32,
    pub activity_date: Option<NaiveDate>,
}

impl DailyActivity {
    pub fn new(calories_consumed: u32, protein_consumed: u32) -> Self {
        Self {
            calories_consumed,
            protein_consumed,
            activity_date: None,
        }
    }

    /// Totals after folding in `delta`, each field rounded up independently.
    pub fn plus(self, delta: MacroDelta) -> Self {
        Self {
            calories_consumed: self.calories_consumed.saturating_add(ceil_units(delta.calories)),
            protein_consumed: self.protein_consumed.saturating_add(ceil_units(delta.protein)),
            activity_date: self.activity_date,
        }
    }
}

// `as` saturates for out-of-range floats
fn ceil_units(value: f64) -> u32 {
    value.ceil() as u32
}

/// Increment to fold into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MacroDelta {
    pub calories: f64,
    pub protein: f64,
}

impl MacroDelta {
    pub fn new(calories: f64, protein: f64) -> Self {
        Self { calories, protein }
    }

    /// Both fields must be finite and non-negative.
    pub fn validate(&self) -> PipelineResult<()> {
        for (field, value) in [("calories", self.calories), ("protein", self.protein)] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::validation(
                    field,
                    format!("must be a non-negative number, got {value}"),
                ));
            }
        }
        Ok(())
    }
}

impl From<&Nutrition> for MacroDelta {
    fn from(nutrition: &Nutrition) -> Self {
        Self::new(nutrition.calories_kcal, nutrition.protein_g)
    }
}

#[derive(Debug, Deserialize)]
struct ActivityEnvelope {
    activity: ActivityBody,
}

#[derive(Debug, Deserialize)]
struct ActivityBody {
    #[serde(default)]
    calories_consumed: Option<u32>,
    #[serde(default)]
    protein_consumed: Option<u32>,
    #[serde(default)]
    activity_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct ActivityUpdate {
    calories_consumed: u32,
    protein_consumed: u32,
}

/// Parse a `GET .../today` body. A `null` total reads as zero.
pub fn parse_activity(body: &[u8]) -> PipelineResult<DailyActivity> {
    let envelope: ActivityEnvelope = serde_json::from_slice(body)
        .map_err(|e| PipelineError::fetch(None, format!("malformed activity body: {e}")))?;
    Ok(DailyActivity {
        calories_consumed: envelope.activity.calories_consumed.unwrap_or(0),
        protein_consumed: envelope.activity.protein_consumed.unwrap_or(0),
        activity_date: envelope.activity.activity_date,
    })
}

/// The remote ledger contract.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Current totals for today. Failures are [`PipelineError::Fetch`].
    async fn fetch_today(&self, user_id: &str) -> PipelineResult<DailyActivity>;

    /// Overwrite today's totals. Failures are [`PipelineError::Update`].
    async fn put_today(&self, user_id: &str, totals: DailyActivity) -> PipelineResult<()>;
}

/// reqwest-backed ledger.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpLedger {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn from_config(config: &SnapConfig) -> PipelineResult<Self> {
        Ok(Self::new(config.http_client()?, config.base_url()?))
    }

    fn today_url(&self, user_id: &str) -> Url {
        endpoint(&self.base_url, &["daily-activity", user_id, "today"])
    }
}

#[async_trait]
impl LedgerBackend for HttpLedger {
    async fn fetch_today(&self, user_id: &str) -> PipelineResult<DailyActivity> {
        let response = self
            .http
            .get(self.today_url(user_id))
            .send()
            .await
            .map_err(|e| PipelineError::fetch(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::fetch(Some(status.as_u16()), e.to_string()))?;
        if !status.is_success() {
            let excerpt = body_excerpt(&String::from_utf8_lossy(&body));
            return Err(PipelineError::fetch(
                Some(status.as_u16()),
                format!("ledger returned {status}: {excerpt}"),
            ));
        }

        parse_activity(&body).map_err(|e| match e {
            PipelineError::Fetch { reason, .. } => PipelineError::fetch(Some(status.as_u16()), reason),
            other => other,
        })
    }

    async fn put_today(&self, user_id: &str, totals: DailyActivity) -> PipelineResult<()> {
        let body = ActivityUpdate {
            calories_consumed: totals.calories_consumed,
            protein_consumed: totals.protein_consumed,
        };
        let response = self
            .http
            .put(self.today_url(user_id))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::update(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::update(
                Some(status.as_u16()),
                format!("ledger returned {status}: {}", body_excerpt(&text)),
            ));
        }
        Ok(())
    }
}

/// Identity-checked ledger operations.
#[derive(Clone)]
pub struct LedgerAggregator {
    backend: Arc<dyn LedgerBackend>,
}

impl LedgerAggregator {
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Self {
        Self { backend }
    }

    pub fn from_config(config: &SnapConfig) -> PipelineResult<Self> {
        Ok(Self::new(Arc::new(HttpLedger::from_config(config)?)))
    }

    /// Add `delta` to today's totals and return the totals as written.
    ///
    /// # Errors
    /// - [`PipelineError::Identity`] without an identity, before any request
    /// - [`PipelineError::Validation`] for a negative or non-finite delta
    /// - [`PipelineError::Fetch`] / [`PipelineError::Update`] from the backend
    pub async fn add_to_daily_ledger(
        &self,
        identity: Option<&SessionIdentity>,
        delta: MacroDelta,
    ) -> PipelineResult<DailyActivity> {
        let user_id = require_user(identity)?;
        delta.validate()?;

        let current = self.backend.fetch_today(user_id).await.inspect_err(|e| {
            warn!(user_id, error = %e, "ledger read failed");
        })?;
        let next = current.plus(delta);
        debug!(
            user_id,
            from_calories = current.calories_consumed,
            from_protein = current.protein_consumed,
            to_calories = next.calories_consumed,
            to_protein = next.protein_consumed,
            "writing ledger totals"
        );

        self.backend.put_today(user_id, next).await.inspect_err(|e| {
            warn!(user_id, error = %e, "ledger write failed");
        })?;
        info!(
            user_id,
            calories = next.calories_consumed,
            protein = next.protein_consumed,
            "daily ledger updated"
        );
        Ok(next)
    }

    /// Today's totals without changing them.
    pub async fn today(&self, identity: Option<&SessionIdentity>) -> PipelineResult<DailyActivity> {
        let user_id = require_user(identity)?;
        self.backend.fetch_today(user_id).await
    }
}

fn require_user(identity: Option<&SessionIdentity>) -> PipelineResult<&str> {
    match identity {
        Some(identity) if !identity.user_id.trim().is_empty() => Ok(identity.user_id.as_str()),
        _ => Err(PipelineError::identity("User not logged in")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_per_field() {
        let next = DailyActivity::new(100, 50).plus(MacroDelta::new(10.2, 5.4));
        assert_eq!((next.calories_consumed, next.protein_consumed), (111, 56));

        let whole = DailyActivity::new(0, 0).plus(MacroDelta::new(100.0, 10.0));
        assert_eq!((whole.calories_consumed, whole.protein_consumed), (100, 10));
    }

    #[test]
    fn test_totals_saturate() {
        let next = DailyActivity::new(u32::MAX - 1, 0).plus(MacroDelta::new(5.0, 1e12));
        assert_eq!(next.calories_consumed, u32::MAX);
        assert_eq!(next.protein_consumed, u32::MAX);
    }

    #[test]
    fn test_delta_validation() {
        assert!(MacroDelta::new(0.0, 0.0).validate().is_ok());
        assert!(MacroDelta::new(-1.0, 0.0).validate().is_err());
        assert!(MacroDelta::new(1.0, f64::NAN).validate().is_err());
        assert!(MacroDelta::new(f64::INFINITY, 1.0).validate().is_err());
    }

    #[test]
    fn test_parse_activity_null_is_zero() {
        let body = br#"{"status": "success", "activity": {"id": "9", "activity_date": "2026-10-19",
            "calories_consumed": null, "protein_consumed": 12, "completed": false}}"#;
        let activity = parse_activity(body).unwrap();
        assert_eq!(activity.calories_consumed, 0);
        assert_eq!(activity.protein_consumed, 12);
        assert_eq!(activity.activity_date, NaiveDate::from_ymd_opt(2026, 10, 19));
    }

    #[test]
    fn test_parse_activity_rejects_negative_and_missing_envelope() {
        assert!(parse_activity(br#"{"activity": {"calories_consumed": -4, "protein_consumed": 0}}"#).is_err());
        let err = parse_activity(br#"{"status": "success"}"#).unwrap_err();
        assert_eq!(err.category(), "fetch");
    }

    #[test]
    fn test_require_user() {
        assert!(require_user(None).is_err());
        let identity = SessionIdentity::new("5").unwrap();
        assert_eq!(require_user(Some(&identity)).unwrap(), "5");
    }
}
