//! # Backend Clients
//!
//! HTTP clients for the two backend surfaces the pipeline talks to:
//!
//! - [`predict`]: `POST /predict`, the food classifier and nutrition lookup
//! - [`ledger`]: `GET`/`PUT /daily-activity/{user_id}/today`, the daily intake ledger
//!
//! Both sit behind traits so the capture session and the ledger aggregator
//! can run against fakes.

pub mod ledger;
pub mod predict;

pub use ledger::{DailyActivity, HttpLedger, LedgerAggregator, LedgerBackend, MacroDelta};
pub use predict::{NutrientAmount, Nutrition, PredictionClient, PredictionResult, Predictor};

use reqwest::Url;

/// Append path segments to `base`, keeping any path prefix it already has.
///
/// Segments are percent-encoded, so a user id can never escape its slot.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// First part of a response body, for logs and error messages.
pub(crate) fn body_excerpt(body: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_prefix_and_encodes() {
        let base = Url::parse("https://api.example.com/v1/").unwrap();
        assert_eq!(
            endpoint(&base, &["daily-activity", "a/b", "today"]).as_str(),
            "https://api.example.com/v1/daily-activity/a%2Fb/today"
        );

        let bare = Url::parse("http://localhost:8000").unwrap();
        assert_eq!(endpoint(&bare, &["predict"]).as_str(), "http://localhost:8000/predict");
    }

    #[test]
    fn test_body_excerpt_truncates() {
        assert_eq!(body_excerpt("  short  "), "short");
        let long = "x".repeat(500);
        assert_eq!(body_excerpt(&long).len(), 203);
    }
}
