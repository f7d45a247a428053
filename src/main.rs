use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use food_snap::capture::{FileCamera, JpegCropper};
use food_snap::client::{LedgerAggregator, MacroDelta, PredictionClient};
use food_snap::config::SnapConfig;
use food_snap::identity::{SessionIdentity, SessionStore};
use food_snap::session::{CaptureSession, Displayed, ShutterOutcome};
use tracing_subscriber::EnvFilter;

/// Snap a food photo, see what the backend thinks it is, and keep a daily
/// calorie/protein ledger.
#[derive(Parser, Debug)]
#[command(name = "snap")]
#[command(about = "🍽  Food photo to nutrition to daily ledger")]
#[command(long_about = "Crop a food photo to the guide frame, classify it with the prediction backend \
and optionally add its calories and protein to today's ledger.
Settings come from SNAP_* environment variables (a .env file is honored); flags override them.")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Overrides {
    /// Backend base URL
    #[arg(long, global = true, help = "Backend base URL, e.g. http://localhost:8000")]
    api_url: Option<String>,

    /// Session file
    #[arg(long, global = true, help = "Where the signed-in identity is stored")]
    session_file: Option<PathBuf>,

    /// Screen width in logical points
    #[arg(long, global = true, help = "Logical width of the preview the guide frame was drawn on")]
    screen_width: Option<f64>,

    /// Guide frame side in logical points
    #[arg(long, global = true, help = "Side of the square guide frame (default 280)")]
    frame_size: Option<f64>,

    /// JPEG quality
    #[arg(short, long, global = true,
          help = "Upload quality: 1-100 or a preset: low, medium (default), high, max")]
    quality: Option<String>,

    /// Request timeout
    #[arg(long, global = true, help = "Per-request timeout in seconds (default: none)")]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one capture cycle on an image file
    Scan {
        /// Photo to analyze
        photo: PathBuf,

        /// Add the prediction's calories and protein to today's ledger
        #[arg(long)]
        save: bool,
    },
    /// Store the signed-in identity
    Login {
        user_id: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Clear all stored session data
    Logout,
    /// Show the stored identity
    Whoami,
    /// Show today's ledger totals
    Today,
    /// Add calories and protein to today's ledger by hand
    Add {
        #[arg(long, default_value_t = 0.0)]
        calories: f64,
        #[arg(long, default_value_t = 0.0)]
        protein: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("food_snap=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.overrides)?;
    let store = SessionStore::at_path(&config.session_file);

    match cli.command {
        Command::Scan { photo, save } => scan(&config, &store, photo, save).await,
        Command::Login {
            user_id,
            username,
            email,
        } => {
            let mut identity = SessionIdentity::new(user_id)?;
            identity.username = username;
            identity.email = email;
            store
                .set_identity(&identity)
                .await
                .context("Failed to store identity")?;
            println!("Signed in as {}", display_name(&identity));
            Ok(())
        }
        Command::Logout => {
            store.clear_identity().await.context("Failed to clear session")?;
            println!("Signed out");
            Ok(())
        }
        Command::Whoami => {
            match store.get_identity().await.context("Failed to read session")? {
                Some(identity) => {
                    println!("User ID:  {}", identity.user_id);
                    if let Some(username) = &identity.username {
                        println!("Username: {username}");
                    }
                    if let Some(email) = &identity.email {
                        println!("Email:    {email}");
                    }
                }
                None => println!("Not signed in"),
            }
            Ok(())
        }
        Command::Today => {
            let identity = store.get_identity().await.context("Failed to read session")?;
            let ledger = LedgerAggregator::from_config(&config)?;
            let today = ledger
                .today(identity.as_ref())
                .await
                .context("Failed to fetch today's activity")?;
            print_totals("Today", today);
            Ok(())
        }
        Command::Add { calories, protein } => {
            let identity = store.get_identity().await.context("Failed to read session")?;
            let ledger = LedgerAggregator::from_config(&config)?;
            let totals = ledger
                .add_to_daily_ledger(identity.as_ref(), MacroDelta::new(calories, protein))
                .await
                .context("Could not save to daily intake")?;
            print_totals("Updated", totals);
            Ok(())
        }
    }
}

async fn scan(config: &SnapConfig, store: &SessionStore, photo: PathBuf, save: bool) -> Result<()> {
    let session = CaptureSession::builder()
        .with_camera(Arc::new(FileCamera::new(&photo)))
        .with_cropper(Arc::new(JpegCropper::new(config.jpeg_quality)))
        .with_predictor(Arc::new(PredictionClient::from_config(config)?))
        .with_guide_frame(config.guide_frame())
        .build()?;

    println!("Analyzing {}...", photo.display());
    let prediction = match session.shutter().await {
        ShutterOutcome::Displayed(Displayed::Result { image, prediction }) => {
            let rect = image.rect();
            println!(
                "  Crop: {}x{} at ({}, {}), {} bytes",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                image.byte_len()
            );
            prediction
        }
        ShutterOutcome::Displayed(Displayed::Error(notice)) => {
            anyhow::bail!("{notice}");
        }
        ShutterOutcome::Ignored | ShutterOutcome::Discarded => {
            anyhow::bail!("Capture cycle did not complete");
        }
    };

    let n = &prediction.nutrition;
    println!("{} ({:.1}% confidence)", prediction.food_label, prediction.confidence_percent);
    println!("  Calories: {} kcal", n.calories_kcal);
    println!("  Protein:  {} g", n.protein_g);
    println!("  Carbs:    {} g", n.carbs_g);
    println!("  Fat:      {} g", n.fat_g);
    for (label, amounts) in [("Vitamins", &n.vitamins), ("Minerals", &n.minerals)] {
        if !amounts.is_empty() {
            let list: Vec<String> = amounts.iter().map(|(k, v)| format!("{k} {v}")).collect();
            println!("  {label}: {}", list.join(", "));
        }
    }

    if save {
        let identity = store.get_identity().await.context("Failed to read session")?;
        let ledger = LedgerAggregator::from_config(config)?;
        let totals = ledger
            .add_to_daily_ledger(identity.as_ref(), MacroDelta::from(n))
            .await
            .context("Could not save to daily intake")?;
        print_totals("Added to daily intake", totals);
    }
    session.dismiss();
    Ok(())
}

fn load_config(overrides: &Overrides) -> Result<SnapConfig> {
    let mut config = SnapConfig::from_env().context("Invalid SNAP_* environment")?;

    if let Some(url) = &overrides.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(path) = &overrides.session_file {
        config.session_file = path.clone();
    }
    if let Some(width) = overrides.screen_width {
        config.screen_width = width;
    }
    if let Some(side) = overrides.frame_size {
        config.frame_size = side;
    }
    if let Some(quality) = &overrides.quality {
        config.jpeg_quality = parse_quality(quality)?;
    }
    if let Some(secs) = overrides.timeout {
        config.request_timeout = Some(Duration::from_secs(secs));
    }

    config.validate()?;
    Ok(config)
}

/// Parse a quality preset or a plain 1-100 number into a JPEG quality
fn parse_quality(quality: &str) -> Result<u8> {
    if let Ok(value) = quality.parse::<u8>() {
        return Ok(value);
    }
    match quality.to_lowercase().as_str() {
        "low" => Ok(60),     // Smallest uploads
        "medium" => Ok(80),  // Default
        "high" => Ok(90),
        "max" => Ok(100),
        _ => Err(anyhow::anyhow!("Invalid quality: {}. Use 1-100 or: low, medium, high, max", quality)),
    }
}

fn display_name(identity: &SessionIdentity) -> &str {
    identity.username.as_deref().unwrap_or(&identity.user_id)
}

fn print_totals(heading: &str, totals: food_snap::DailyActivity) {
    match totals.activity_date {
        Some(date) => println!("{heading} ({date}):"),
        None => println!("{heading}:"),
    }
    println!("  Calories: {} kcal", totals.calories_consumed);
    println!("  Protein:  {} g", totals.protein_consumed);
}
