//! Observability metrics
//!
//! Recording helpers only; installing an exporter is up to the binary that
//! embeds the agent.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Register the metric families at zero so they show up before first use
pub fn register_default_metrics() {
    gauge!("skyvoice_sessions_active").set(0.0);
    counter!("skyvoice_interruptions_total").absolute(0);
    counter!("skyvoice_hold_escapes_total").absolute(0);
    for outcome in ["ok", "timeout", "error"] {
        counter!("skyvoice_tool_calls_total", "outcome" => outcome).absolute(0);
    }
}

pub fn record_active_sessions(count: usize) {
    gauge!("skyvoice_sessions_active").set(count as f64);
}

pub fn record_interruption() {
    counter!("skyvoice_interruptions_total").increment(1);
}

pub fn record_hold_escape() {
    counter!("skyvoice_hold_escapes_total").increment(1);
}

pub fn record_language_switch(to: &str) {
    counter!("skyvoice_language_switches_total", "to" => to.to_string()).increment(1);
}

/// Record a finished tool call; `outcome` is `ok`, `timeout` or `error`
pub fn record_tool_call(outcome: &'static str, elapsed: Duration) {
    counter!("skyvoice_tool_calls_total", "outcome" => outcome).increment(1);
    histogram!("skyvoice_tool_latency_seconds").record(elapsed.as_secs_f64());
}
