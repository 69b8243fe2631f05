use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, OnceLock,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EndpointMetricKey {
    endpoint: String,
    method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OutcomeMetricKey {
    event: String,
    status: String,
}

pub struct RelayMetrics {
    request_duration_count: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_duration_sum_ms: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_errors_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_rate_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    ws_events_total: Mutex<HashMap<String, u64>>,
    ws_errors_total: Mutex<HashMap<String, u64>>,
    reconcile_outcomes_total: Mutex<HashMap<OutcomeMetricKey, u64>>,
    reconcile_duration_ms_sum: AtomicU64,
    reconcile_duration_ms_count: AtomicU64,
    ws_connections_active: AtomicI64,
    ws_connections_total: AtomicU64,
    indexer_failures_total: AtomicU64,
}

const KNOWN_EVENT_KINDS: [&str; 4] = ["initial_scan", "added", "modified", "deleted"];
static GLOBAL_METRICS: OnceLock<Arc<RelayMetrics>> = OnceLock::new();

impl Default for RelayMetrics {
    fn default() -> Self {
        Self {
            request_duration_count: Mutex::new(HashMap::new()),
            request_duration_sum_ms: Mutex::new(HashMap::new()),
            request_errors_total: Mutex::new(HashMap::new()),
            request_rate_total: Mutex::new(HashMap::new()),
            ws_events_total: Mutex::new(HashMap::new()),
            ws_errors_total: Mutex::new(HashMap::new()),
            reconcile_outcomes_total: Mutex::new(HashMap::new()),
            reconcile_duration_ms_sum: AtomicU64::new(0),
            reconcile_duration_ms_count: AtomicU64::new(0),
            ws_connections_active: AtomicI64::new(0),
            ws_connections_total: AtomicU64::new(0),
            indexer_failures_total: AtomicU64::new(0),
        }
    }
}

pub fn set_global_metrics(metrics: Arc<RelayMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

fn global_metrics() -> Option<&'static Arc<RelayMetrics>> {
    GLOBAL_METRICS.get()
}

pub fn record_http_request(method: &str, path: &str, status_code: u16, latency_ms: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.record_http_request(method, path, status_code, latency_ms);
    }
}

pub fn record_ws_event(event: &str, is_error: bool) {
    if let Some(metrics) = global_metrics() {
        metrics.record_ws_event(event, is_error);
    }
}

pub fn record_reconcile_outcome(event_kind: &str, status: &str, latency_ms: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.record_reconcile_outcome(event_kind, status, latency_ms);
    }
}

pub fn connection_opened() {
    if let Some(metrics) = global_metrics() {
        metrics.connection_opened();
    }
}

pub fn connection_closed() {
    if let Some(metrics) = global_metrics() {
        metrics.connection_closed();
    }
}

pub fn increment_indexer_failures() {
    if let Some(metrics) = global_metrics() {
        metrics.increment_indexer_failures();
    }
}

impl RelayMetrics {
    pub fn record_http_request(&self, method: &str, path: &str, status_code: u16, latency_ms: u64) {
        let key = EndpointMetricKey {
            endpoint: normalize_endpoint(path),
            method: method.to_ascii_uppercase(),
        };

        increment_counter(&self.request_rate_total, &key, 1);
        increment_counter(&self.request_duration_sum_ms, &key, latency_ms);
        increment_counter(&self.request_duration_count, &key, 1);
        if status_code >= 400 {
            increment_counter(&self.request_errors_total, &key, 1);
        }
    }

    pub fn record_ws_event(&self, event: &str, is_error: bool) {
        let normalized = normalize_label(event);
        increment_counter(&self.ws_events_total, &normalized, 1);
        if is_error {
            increment_counter(&self.ws_errors_total, &normalized, 1);
        }
    }

    pub fn record_reconcile_outcome(&self, event_kind: &str, status: &str, latency_ms: u64) {
        let key = OutcomeMetricKey {
            event: normalize_event_kind(event_kind),
            status: normalize_label(status),
        };
        increment_counter(&self.reconcile_outcomes_total, &key, 1);
        self.reconcile_duration_ms_sum.fetch_add(latency_ms, Ordering::SeqCst);
        self.reconcile_duration_ms_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connection_opened(&self) {
        self.ws_connections_total.fetch_add(1, Ordering::SeqCst);
        self.ws_connections_active.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connection_closed(&self) {
        self.ws_connections_active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn increment_indexer_failures(&self) {
        self.indexer_failures_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP relay_request_rate_total Total HTTP requests by endpoint.\n");
        output.push_str("# TYPE relay_request_rate_total counter\n");
        append_endpoint_lines(&mut output, "relay_request_rate_total", &self.request_rate_total);

        output.push_str(
            "# HELP relay_request_errors_total Total HTTP error responses by endpoint.\n",
        );
        output.push_str("# TYPE relay_request_errors_total counter\n");
        append_endpoint_lines(&mut output, "relay_request_errors_total", &self.request_errors_total);

        output.push_str("# HELP relay_request_duration_ms_sum Sum of HTTP request latency in milliseconds by endpoint.\n");
        output.push_str("# TYPE relay_request_duration_ms_sum counter\n");
        append_endpoint_lines(
            &mut output,
            "relay_request_duration_ms_sum",
            &self.request_duration_sum_ms,
        );

        output.push_str("# HELP relay_request_duration_ms_count Count of HTTP request latency samples by endpoint.\n");
        output.push_str("# TYPE relay_request_duration_ms_count counter\n");
        append_endpoint_lines(
            &mut output,
            "relay_request_duration_ms_count",
            &self.request_duration_count,
        );

        output.push_str("# HELP relay_ws_events_total Total inbound socket events by name.\n");
        output.push_str("# TYPE relay_ws_events_total counter\n");
        append_event_lines(&mut output, "relay_ws_events_total", &self.ws_events_total);

        output.push_str("# HELP relay_ws_errors_total Inbound socket events answered with an error.\n");
        output.push_str("# TYPE relay_ws_errors_total counter\n");
        append_event_lines(&mut output, "relay_ws_errors_total", &self.ws_errors_total);

        output.push_str("# HELP relay_ws_connections_active Currently open socket connections.\n");
        output.push_str("# TYPE relay_ws_connections_active gauge\n");
        output.push_str(&format!(
            "relay_ws_connections_active {}\n",
            self.ws_connections_active.load(Ordering::SeqCst).max(0)
        ));

        output.push_str("# HELP relay_ws_connections_total Socket connections accepted.\n");
        output.push_str("# TYPE relay_ws_connections_total counter\n");
        output.push_str(&format!(
            "relay_ws_connections_total {}\n",
            self.ws_connections_total.load(Ordering::SeqCst)
        ));

        output.push_str(
            "# HELP reconcile_outcomes_total Reconciliation outcomes by event kind and status.\n",
        );
        output.push_str("# TYPE reconcile_outcomes_total counter\n");
        append_outcome_lines(&mut output, &self.reconcile_outcomes_total);

        output.push_str("# HELP reconcile_duration_ms_sum Sum of reconciliation latency in milliseconds.\n");
        output.push_str("# TYPE reconcile_duration_ms_sum counter\n");
        output.push_str(&format!(
            "reconcile_duration_ms_sum {}\n",
            self.reconcile_duration_ms_sum.load(Ordering::SeqCst)
        ));
        output.push_str("# HELP reconcile_duration_ms_count Count of reconciliation latency samples.\n");
        output.push_str("# TYPE reconcile_duration_ms_count counter\n");
        output.push_str(&format!(
            "reconcile_duration_ms_count {}\n",
            self.reconcile_duration_ms_count.load(Ordering::SeqCst)
        ));

        output.push_str("# HELP indexer_failures_total Content indexing submissions that failed.\n");
        output.push_str("# TYPE indexer_failures_total counter\n");
        output.push_str(&format!(
            "indexer_failures_total {}\n",
            self.indexer_failures_total.load(Ordering::SeqCst)
        ));

        output
    }
}

fn lock<T>(map: &Mutex<T>) -> MutexGuard<'_, T> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn normalize_endpoint(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments = Vec::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if uuid::Uuid::parse_str(segment).is_ok() {
            normalized_segments.push("{uuid}".to_string());
            continue;
        }

        if segment.chars().all(|character| character.is_ascii_digit()) {
            normalized_segments.push("{number}".to_string());
            continue;
        }

        normalized_segments.push(segment.to_string());
    }

    if normalized_segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", normalized_segments.join("/"))
    }
}

/// Client-supplied event kinds are unbounded; collapse unknown ones.
fn normalize_event_kind(event_kind: &str) -> String {
    let normalized = event_kind.trim().to_ascii_lowercase();
    if KNOWN_EVENT_KINDS.contains(&normalized.as_str()) {
        normalized
    } else {
        "unknown".to_string()
    }
}

fn normalize_label(label: &str) -> String {
    let normalized = label.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        "unknown".to_string()
    } else {
        normalized
    }
}

fn increment_counter<K>(map: &Mutex<HashMap<K, u64>>, key: &K, delta: u64)
where
    K: Clone + Eq + std::hash::Hash,
{
    let mut guard = lock(map);
    let value = guard.entry(key.clone()).or_insert(0);
    *value = value.saturating_add(delta);
}

fn append_endpoint_lines(
    output: &mut String,
    metric_name: &str,
    map: &Mutex<HashMap<EndpointMetricKey, u64>>,
) {
    let guard = lock(map);
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left_key, _), (right_key, _)| {
        left_key
            .method
            .cmp(&right_key.method)
            .then_with(|| left_key.endpoint.cmp(&right_key.endpoint))
    });

    for (key, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{method=\"{}\",endpoint=\"{}\"}} {value}\n",
            escape_label_value(&key.method),
            escape_label_value(&key.endpoint),
        ));
    }
}

fn append_event_lines(output: &mut String, metric_name: &str, map: &Mutex<HashMap<String, u64>>) {
    let guard = lock(map);
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    for (event, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{event=\"{}\"}} {value}\n",
            escape_label_value(event),
        ));
    }
}

fn append_outcome_lines(output: &mut String, map: &Mutex<HashMap<OutcomeMetricKey, u64>>) {
    let guard = lock(map);
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left, _), (right, _)| {
        left.event.cmp(&right.event).then_with(|| left.status.cmp(&right.status))
    });

    for (key, value) in entries {
        output.push_str(&format!(
            "reconcile_outcomes_total{{event=\"{}\",status=\"{}\"}} {value}\n",
            escape_label_value(&key.event),
            escape_label_value(&key.status),
        ));
    }
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}
