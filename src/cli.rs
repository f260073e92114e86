//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_job_store::InMemoryJobStore;
use crate::adapters::model_storage::ModelStorage;
use crate::adapters::report::{ForecastResponseBody, point_bodies};
use crate::domain::config::{DEFAULT_LOG_FILTER, ServiceConfig};
use crate::domain::error::ForecastError;
use crate::domain::forecaster::{ForecastContext, ModelType, TrainingParameters};
use crate::domain::orchestrator::{ForecastOrchestrator, ForecastRequest};
use crate::domain::pricing::optimize_price;
use crate::domain::series::{DataPoint, Frequency, parse_date};
use crate::domain::training::{JobStatus, TrainingCoordinator, TrainingRequest};
use crate::ports::series_port::SeriesPort;

#[derive(Parser, Debug)]
#[command(
    name = "nexus-forecast",
    about = "Property demand forecasting and price recommendation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP service
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Train a model on a property's CSV history and save the artifact
    Train {
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        property: String,
        /// seasonal-trend | sequence-window (aliases: prophet, lstm)
        #[arg(short, long)]
        model: String,
        /// Hyperparameter overrides as a JSON object
        #[arg(long)]
        params: Option<String>,
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
    /// Forecast a date range, fitting on CSV history when given
    Forecast {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, requires = "property")]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        property: Option<String>,
        /// demand | occupancy | revenue
        #[arg(long, default_value = "occupancy")]
        metric: String,
        /// INI file supplying [seasonal_trend] defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Forecast from a saved model artifact
    Predict {
        #[arg(short, long)]
        model: String,
        #[arg(short, long)]
        artifact: PathBuf,
        #[arg(short, long, default_value_t = 7)]
        periods: usize,
        /// D (daily) or W (weekly)
        #[arg(long, default_value = "D")]
        frequency: String,
    },
    /// Recommend a nightly price from current occupancy
    OptimizePrice {
        #[arg(long)]
        base_price: Option<f64>,
        #[arg(long)]
        occupancy: Option<f64>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::Train {
            data_dir,
            property,
            model,
            params,
            models_dir,
        } => run_train(&data_dir, &property, &model, params.as_deref(), models_dir),
        Command::Forecast {
            start,
            end,
            data_dir,
            property,
            metric,
            config,
        } => run_forecast(
            &start,
            &end,
            data_dir.as_deref(),
            property.as_deref(),
            &metric,
            config.as_deref(),
        ),
        Command::Predict {
            model,
            artifact,
            periods,
            frequency,
        } => run_predict(&model, &artifact, periods, &frequency),
        Command::OptimizePrice {
            base_price,
            occupancy,
        } => {
            init_tracing(DEFAULT_LOG_FILTER);
            print_json(&optimize_price(base_price, occupancy)).map(|_| ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_filter`.
/// Output goes to stderr so command results on stdout stay parseable.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<ServiceConfig, ForecastError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    Ok(ServiceConfig::from_port(&adapter)?.with_env_overrides())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ForecastError> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{json}");
    Ok(())
}

fn run_serve(config_path: &Path) -> Result<ExitCode, ForecastError> {
    let config = load_config(config_path)?;
    init_tracing(&config.log_filter);
    tracing::info!(config = %config_path.display(), "configuration loaded");

    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, serve};

        let storage = ModelStorage::new(&config.models_dir);
        storage.ensure_dir()?;
        tracing::info!(models_dir = %storage.dir().display(), "model storage ready");

        let state = AppState {
            orchestrator: ForecastOrchestrator::new(config.seasonal_trend_parameters()),
            training: TrainingCoordinator::new(Arc::new(InMemoryJobStore::new()), storage.dir()),
        };

        tokio::runtime::Runtime::new()?.block_on(serve(config.listen, state))?;
        Ok(ExitCode::SUCCESS)
    }

    #[cfg(not(feature = "web"))]
    {
        Err(ForecastError::validation("web feature is required for serve"))
    }
}

fn run_train(
    data_dir: &Path,
    property: &str,
    model: &str,
    params: Option<&str>,
    models_dir: Option<PathBuf>,
) -> Result<ExitCode, ForecastError> {
    init_tracing(DEFAULT_LOG_FILTER);
    let model_type: ModelType = model.parse()?;
    let parameters = match params {
        Some(raw) => serde_json::from_str::<TrainingParameters>(raw)
            .map_err(|e| ForecastError::validation(format!("--params must be a JSON object: {e}")))?,
        None => TrainingParameters::new(),
    };
    let models_dir =
        models_dir.unwrap_or_else(|| ServiceConfig::default().with_env_overrides().models_dir);

    let series = CsvAdapter::new(data_dir.to_path_buf()).fetch_series(property)?;
    let request = TrainingRequest {
        model_type,
        property_id: Some(property.to_string()),
        training_data: series.observations().iter().map(DataPoint::from).collect(),
        parameters,
    };

    let coordinator = TrainingCoordinator::new(Arc::new(InMemoryJobStore::new()), models_dir);
    let job = coordinator.run(request)?;
    print_json(&job)?;

    Ok(match job.status {
        JobStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::from(5),
    })
}

fn run_forecast(
    start: &str,
    end: &str,
    data_dir: Option<&Path>,
    property: Option<&str>,
    metric: &str,
    config_path: Option<&Path>,
) -> Result<ExitCode, ForecastError> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    init_tracing(&config.log_filter);

    let history = match (data_dir, property) {
        (Some(dir), Some(id)) => Some(CsvAdapter::new(dir.to_path_buf()).fetch_series(id)?),
        _ => None,
    };
    let request = ForecastRequest {
        property_id: property.unwrap_or("global").to_string(),
        start: parse_date(start)?,
        end: parse_date(end)?,
        metric: metric.parse()?,
        history,
    };

    let outcome = ForecastOrchestrator::new(config.seasonal_trend_parameters()).forecast(&request)?;
    print_json(&ForecastResponseBody::from(&outcome))?;
    Ok(ExitCode::SUCCESS)
}

fn run_predict(
    model: &str,
    artifact: &Path,
    periods: usize,
    frequency: &str,
) -> Result<ExitCode, ForecastError> {
    init_tracing(DEFAULT_LOG_FILTER);
    let model_type: ModelType = model.parse()?;
    let context = ForecastContext {
        frequency: Frequency::parse(frequency)?,
        ..ForecastContext::future_only()
    };

    let storage = ModelStorage::new(artifact.parent().unwrap_or(Path::new(".")));
    let forecaster = storage.load(model_type, artifact)?;
    print_json(&point_bodies(&forecaster.forecast(periods, &context)?))?;
    Ok(ExitCode::SUCCESS)
}
