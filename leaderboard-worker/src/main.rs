use std::time::Duration;

use envconfig::Envconfig;
use futures::future::{select, Either};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use leaderboard_common::metrics::{serve, setup_metrics_recorder};
use leaderboard_worker::config::Config;
use leaderboard_worker::error::PipelineError;
use leaderboard_worker::handlers;
use leaderboard_worker::pipeline::Pipeline;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn run_loop(pipeline: Pipeline, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // A run can outlast the interval; start the next one a full interval after it ends.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if pipeline.run().await.is_err() {
            warn!("next attempt in {}s", interval_secs);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env().map_err(|e| {
        error!("failed to load configuration from env: {}", e);
        PipelineError::from(e)
    })?;

    let pipeline = Pipeline::from_config(&config)?;

    if config.run_once {
        pipeline.run().await?;
        return Ok(());
    }

    let recorder_handle = setup_metrics_recorder();
    let app = handlers::app(recorder_handle);
    let bind = config.bind();
    let http_server = Box::pin(async move { serve(app, &bind).await });
    let run_loop = Box::pin(run_loop(pipeline, config.run_interval_secs));

    match select(http_server, run_loop).await {
        Either::Left((listen_result, _)) => match listen_result {
            Ok(_) => {}
            Err(e) => error!("failed to start leaderboard-worker http server, {}", e),
        },
        Either::Right((_, _)) => {
            error!("leaderboard-worker run loop exited")
        }
    };

    Ok(())
}
