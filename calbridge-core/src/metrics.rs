// ABOUTME: Counter helpers for webhook, availability, presence, subscription, and command activity
// ABOUTME: Recorded through the `metrics` facade; the server installs the Prometheus exporter

pub fn record_webhook_request(outcome: &'static str) {
    metrics::counter!("calbridge_webhook_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_availability_run(outcome: &'static str) {
    metrics::counter!("calbridge_availability_runs_total", "outcome" => outcome).increment(1);
}

pub fn record_presence_change(status: &str) {
    metrics::counter!("calbridge_presence_changes_total", "status" => status.to_string())
        .increment(1);
}

pub fn record_subscription_attempt(outcome: &'static str) {
    metrics::counter!("calbridge_subscription_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_command(command: &'static str) {
    metrics::counter!("calbridge_commands_total", "command" => command).increment(1);
}
