//! Common test utilities and helpers for the food_snap tests
//!
//! Fakes for the capture capabilities and the ledger backend, plus fixture
//! photos and canned backend bodies.

#![allow(dead_code)]

pub mod fixtures {
    use std::path::{Path, PathBuf};

    use serde_json::{Value, json};

    /// Photo size matching a 390pt-wide preview at 3x.
    pub const PHONE_PHOTO: (u32, u32) = (1170, 1560);

    /// Write a solid-color photo to `dir` and return its path.
    pub fn write_photo(dir: &Path, name: &str, (w, h): (u32, u32)) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_pixel(w, h, image::Rgb([180, 90, 30]))
            .save(&path)
            .expect("write fixture photo");
        path
    }

    /// A `/predict` body the way the backend sends it.
    pub fn prediction_body(food: &str, calories: f64, protein: f64) -> Value {
        json!({
            "food": food,
            "confidence": 91.25,
            "nutrition": {
                "name": food,
                "calories_kcal": calories,
                "protein_g": protein,
                "carbs_g": 30.0,
                "fat_g": 9.5,
                "vitamins": {"B12": "0.3mcg", "C": 2.0},
                "minerals": {"iron": "1.1mg"}
            }
        })
    }

    /// A `GET /daily-activity/{id}/today` body.
    pub fn activity_body(user_id: &str, calories: u32, protein: u32) -> Value {
        json!({
            "status": "success",
            "activity": {
                "id": "31",
                "user_id": user_id,
                "activity_date": "2026-10-19",
                "calories_consumed": calories,
                "protein_consumed": protein,
                "completed": false,
                "created_at": "2026-10-19T07:12:00"
            }
        })
    }
}

pub mod fakes {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use food_snap::capture::{Camera, CroppedImage, ImageCropper, Photo};
    use food_snap::client::{DailyActivity, LedgerBackend, Nutrition, PredictionResult, Predictor};
    use food_snap::error::{PipelineError, PipelineResult};
    use food_snap::{CropRegion, PixelRect};
    use tokio::sync::{Barrier, Notify};

    pub fn sample_prediction(food: &str) -> PredictionResult {
        PredictionResult {
            food_label: food.to_string(),
            confidence_percent: 88.0,
            nutrition: Nutrition {
                calories_kcal: 250.0,
                protein_g: 12.0,
                carbs_g: 30.0,
                fat_g: 9.0,
                vitamins: BTreeMap::new(),
                minerals: BTreeMap::new(),
            },
        }
    }

    /// Camera that always returns the same photo.
    pub struct FixedCamera {
        pub photo: Photo,
    }

    impl FixedCamera {
        pub fn new(uri: impl Into<PathBuf>, (w, h): (u32, u32)) -> Self {
            Self {
                photo: Photo::new(uri, w, h),
            }
        }
    }

    #[async_trait]
    impl Camera for FixedCamera {
        async fn take_picture(&self) -> PipelineResult<Photo> {
            Ok(self.photo.clone())
        }
    }

    /// Camera that takes `delay` before the photo is ready.
    pub struct SlowCamera {
        pub photo: Photo,
        pub delay: Duration,
    }

    #[async_trait]
    impl Camera for SlowCamera {
        async fn take_picture(&self) -> PipelineResult<Photo> {
            tokio::time::sleep(self.delay).await;
            Ok(self.photo.clone())
        }
    }

    /// Camera with broken hardware.
    pub struct BrokenCamera;

    #[async_trait]
    impl Camera for BrokenCamera {
        async fn take_picture(&self) -> PipelineResult<Photo> {
            Err(PipelineError::capture("sensor unavailable"))
        }
    }

    /// Cropper that skips pixel work and points at an existing file.
    pub struct StubCropper {
        pub uri: PathBuf,
    }

    #[async_trait]
    impl ImageCropper for StubCropper {
        async fn crop(&self, _photo: &Photo, region: CropRegion) -> PipelineResult<CroppedImage> {
            let side = region.size.round() as u32;
            let rect = PixelRect {
                x: region.origin_x.max(0.0) as u32,
                y: region.origin_y.max(0.0) as u32,
                width: side,
                height: side,
            };
            Ok(CroppedImage::at(&self.uri, region, rect, 0))
        }
    }

    /// Decrements the in-flight counter even when the call is dropped.
    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Predictor that takes a while and records overlap.
    #[derive(Default)]
    pub struct SlowPredictor {
        pub delay: Duration,
        pub calls: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl SlowPredictor {
        pub fn new(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Predictor for SlowPredictor {
        async fn predict(&self, _image_uri: &Path) -> PipelineResult<PredictionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(&self.in_flight);
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(sample_prediction("ramen"))
        }
    }

    /// Predictor that waits until the test opens the gate. `entered` fires
    /// once per call as soon as the call starts.
    #[derive(Default)]
    pub struct GatedPredictor {
        pub gate: Notify,
        pub entered: Notify,
        pub calls: AtomicUsize,
        pub completed: AtomicUsize,
    }

    #[async_trait]
    impl Predictor for GatedPredictor {
        async fn predict(&self, _image_uri: &Path) -> PipelineResult<PredictionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.gate.notified().await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(sample_prediction("salad"))
        }
    }

    /// In-memory ledger. With a barrier, every read waits for its peers so
    /// overlapping updates are guaranteed to see the same totals.
    pub struct MemoryLedger {
        pub totals: Mutex<DailyActivity>,
        pub gets: AtomicUsize,
        pub puts: AtomicUsize,
        pub read_barrier: Option<Arc<Barrier>>,
    }

    impl MemoryLedger {
        pub fn new(calories: u32, protein: u32) -> Self {
            Self {
                totals: Mutex::new(DailyActivity::new(calories, protein)),
                gets: AtomicUsize::new(0),
                puts: AtomicUsize::new(0),
                read_barrier: None,
            }
        }

        pub fn with_read_barrier(mut self, parties: usize) -> Self {
            self.read_barrier = Some(Arc::new(Barrier::new(parties)));
            self
        }

        pub fn current(&self) -> DailyActivity {
            *self.totals.lock().unwrap()
        }
    }

    #[async_trait]
    impl LedgerBackend for MemoryLedger {
        async fn fetch_today(&self, _user_id: &str) -> PipelineResult<DailyActivity> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let snapshot = self.current();
            if let Some(barrier) = &self.read_barrier {
                barrier.wait().await;
            }
            Ok(snapshot)
        }

        async fn put_today(&self, _user_id: &str, totals: DailyActivity) -> PipelineResult<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            *self.totals.lock().unwrap() = totals;
            Ok(())
        }
    }
}
