use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;

use leaderboard_common::metrics::setup_metrics_routes;

pub fn app(recorder_handle: PrometheusHandle) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(index));

    setup_metrics_routes(router, recorder_handle)
}

pub async fn index() -> &'static str {
    "leaderboard worker"
}
