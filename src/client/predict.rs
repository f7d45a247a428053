//! # Prediction Client
//!
//! Uploads a cropped food photo to `POST /predict` and validates the answer
//! into a [`PredictionResult`].
//!
//! The wire body is loosely typed; everything the pipeline relies on is
//! checked here so the rest of the crate never sees a half-filled result:
//!
//! - `food` must be a non-empty label
//! - `confidence` must be a finite percentage in `[0, 100]`
//! - the four macros must be present and numeric
//! - `vitamins` / `minerals` may be absent or `null` and then read as empty;
//!   `null` amounts inside them are dropped
//!
//! Anything else, as well as a non-2xx status or a transport failure, is an
//! [`PipelineError::Upload`]. There is no retry; a new attempt is a new
//! shutter press.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{body_excerpt, endpoint};
use crate::config::SnapConfig;
use crate::error::{PipelineError, PipelineResult};

pub const UPLOAD_FIELD: &str = "file";
pub const UPLOAD_FILE_NAME: &str = "food.jpg";
pub const UPLOAD_CONTENT_TYPE: &str = "image/jpeg";

/// A vitamin or mineral amount. The backend sends either a bare number or a
/// string with units, e.g. `"12mg"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NutrientAmount {
    Number(f64),
    Text(String),
}

impl fmt::Display for NutrientAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Nutrition {
    pub calories_kcal: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub vitamins: BTreeMap<String, NutrientAmount>,
    pub minerals: BTreeMap<String, NutrientAmount>,
}

/// Validated answer of one prediction round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub food_label: String,
    pub confidence_percent: f64,
    pub nutrition: Nutrition,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    food: Option<String>,
    confidence: Option<f64>,
    nutrition: Option<NutritionBody>,
}

#[derive(Debug, Deserialize)]
struct NutritionBody {
    calories_kcal: Option<f64>,
    protein_g: Option<f64>,
    carbs_g: Option<f64>,
    fat_g: Option<f64>,
    #[serde(default)]
    vitamins: Option<BTreeMap<String, Option<NutrientAmount>>>,
    #[serde(default)]
    minerals: Option<BTreeMap<String, Option<NutrientAmount>>>,
}

fn known_amounts(
    map: Option<BTreeMap<String, Option<NutrientAmount>>>,
) -> BTreeMap<String, NutrientAmount> {
    map.unwrap_or_default()
        .into_iter()
        .filter_map(|(name, amount)| Some((name, amount?)))
        .collect()
}

impl PredictResponse {
    fn validate(self) -> Result<PredictionResult, String> {
        let food_label = self
            .food
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .ok_or("missing food label")?;

        let confidence_percent = self.confidence.ok_or("missing confidence")?;
        if !confidence_percent.is_finite() || !(0.0..=100.0).contains(&confidence_percent) {
            return Err(format!("confidence {confidence_percent} outside 0-100"));
        }

        let body = self.nutrition.ok_or("missing nutrition")?;
        let nutrition = Nutrition {
            calories_kcal: macro_field("calories_kcal", body.calories_kcal)?,
            protein_g: macro_field("protein_g", body.protein_g)?,
            carbs_g: macro_field("carbs_g", body.carbs_g)?,
            fat_g: macro_field("fat_g", body.fat_g)?,
            vitamins: known_amounts(body.vitamins),
            minerals: known_amounts(body.minerals),
        };

        Ok(PredictionResult {
            food_label,
            confidence_percent,
            nutrition,
        })
    }
}

fn macro_field(name: &str, value: Option<f64>) -> Result<f64, String> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(format!("nutrition.{name} is not finite: {v}")),
        None => Err(format!("missing nutrition.{name}")),
    }
}

/// Parse a `/predict` body. Exposed for embedders that fetch it themselves.
pub fn parse_prediction(body: &[u8]) -> PipelineResult<PredictionResult> {
    let raw: PredictResponse = serde_json::from_slice(body)
        .map_err(|e| PipelineError::upload(None, format!("malformed prediction body: {e}")))?;
    raw.validate()
        .map_err(|reason| PipelineError::upload(None, reason))
}

/// Abstract prediction interface.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Classify the image at `image_uri`.
    ///
    /// # Errors
    /// [`PipelineError::Upload`] for every failure mode.
    async fn predict(&self, image_uri: &Path) -> PipelineResult<PredictionResult>;
}

/// reqwest-backed `/predict` client.
#[derive(Debug, Clone)]
pub struct PredictionClient {
    http: reqwest::Client,
    url: Url,
}

impl PredictionClient {
    pub fn new(http: reqwest::Client, base_url: &Url) -> Self {
        Self {
            http,
            url: endpoint(base_url, &["predict"]),
        }
    }

    pub fn from_config(config: &SnapConfig) -> PipelineResult<Self> {
        Ok(Self::new(config.http_client()?, &config.base_url()?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Predictor for PredictionClient {
    async fn predict(&self, image_uri: &Path) -> PipelineResult<PredictionResult> {
        let bytes = tokio::fs::read(image_uri).await.map_err(|e| {
            PipelineError::upload(None, format!("cannot read {}: {e}", image_uri.display()))
        })?;
        let byte_len = bytes.len();

        let part = Part::bytes(bytes)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(UPLOAD_CONTENT_TYPE)
            .map_err(|e| PipelineError::upload(None, e.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        debug!(url = %self.url, bytes = byte_len, "uploading photo");
        let response = self
            .http
            .post(self.url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "prediction request failed");
                PipelineError::upload(e.status().map(|s| s.as_u16()), e.to_string())
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::upload(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            let excerpt = body_excerpt(&String::from_utf8_lossy(&body));
            warn!(status = status.as_u16(), body = %excerpt, "prediction rejected");
            return Err(PipelineError::upload(
                Some(status.as_u16()),
                format!("prediction service returned {status}: {excerpt}"),
            ));
        }

        let result = parse_prediction(&body).map_err(|e| match e {
            PipelineError::Upload { reason, .. } => {
                PipelineError::upload(Some(status.as_u16()), reason)
            }
            other => other,
        })?;
        debug!(
            food = %result.food_label,
            confidence = result.confidence_percent,
            "prediction received"
        );
        Ok(result)
    }
}
