use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}

/// Add the prometheus endpoint to a router.
pub fn setup_metrics_routes(router: Router, recorder_handle: PrometheusHandle) -> Router {
    router.route(
        "/metrics",
        get(move || std::future::ready(recorder_handle.render())),
    )
}

/// Install the global prometheus recorder.
///
/// Panics if a recorder is already installed, which only happens on a startup bug.
pub fn setup_metrics_recorder() -> PrometheusHandle {
    // A full-history run takes minutes, so buckets go up to an hour.
    const RUN_SECONDS: &[f64] = &[
        0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(RUN_SECONDS)
        .expect("histogram buckets are not empty")
        .install_recorder()
        .expect("failed to install metrics recorder")
}
