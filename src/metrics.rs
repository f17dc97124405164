use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Register metric descriptions once per process.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

fn describe_all() {
    describe_counter!("pulse_cycles_total", "Curation cycles run, by outcome.");
    describe_counter!(
        "pulse_cards_inserted_total",
        "Cards persisted by curation cycles."
    );
    describe_counter!(
        "pulse_dedup_total",
        "Items dropped as duplicates within the dedup window."
    );
    describe_counter!(
        "pulse_filtered_total",
        "Items dropped by category or weight preferences."
    );
    describe_counter!(
        "pulse_source_errors_total",
        "Source fetch/parse failures."
    );
    describe_counter!(
        "pulse_cleanup_deleted_total",
        "Cards removed by retention cleanup."
    );
    describe_counter!(
        "pulse_ticks_skipped_total",
        "Scheduler ticks skipped because a cycle was in flight."
    );
    describe_counter!("pulse_feed_items_total", "Items parsed from feeds.");
    describe_histogram!("pulse_feed_parse_ms", "Feed parse time in milliseconds.");
    describe_histogram!("pulse_cycle_ms", "Curation cycle duration in milliseconds.");
    describe_gauge!(
        "pulse_cycle_last_run_ts",
        "Unix ts when the last curation cycle finished."
    );
}

/// Prometheus recorder handle. The recorder is process-global, so repeated
/// `init` calls share the first handle.
#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn init() -> Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")
            })?
            .clone();
        // Descriptions sent before the recorder existed went nowhere.
        describe_all();
        Ok(Self { handle })
    }

    /// Prometheus exposition text, for whatever HTTP layer serves `/metrics`.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
