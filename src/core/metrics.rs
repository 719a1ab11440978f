use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;
use crate::db::types::PartialType;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_submission(partial_type: PartialType) {
    metrics::counter!("final_exam_partial_submissions_total", "type" => partial_type.as_str())
        .increment(1);
}

pub(crate) fn record_partials_provisioned(count: u64) {
    if count > 0 {
        metrics::counter!("final_exam_partials_provisioned_total").increment(count);
    }
}

pub(crate) fn record_recalculation() {
    metrics::counter!("final_exam_recalculations_total").increment(1);
}
