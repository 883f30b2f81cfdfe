//! Minimal metrics registry for the engine.
//!
//! Counters and gauges with dynamic labels backed by `DashMap`. Labels are
//! flattened into sorted key vectors to keep deterministic ordering.
//! Rendered in Prometheus text exposition format.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut key: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn render_labels(key: &[(String, String)]) -> String {
    if key.is_empty() {
        return String::new();
    }
    let inner = key
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{inner}}}")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 when never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        let mut rows: Vec<(String, u64)> = self
            .map
            .iter()
            .map(|r| (render_labels(r.key()), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (labels, val) in rows {
            let _ = writeln!(out, "{}{} {}", name, labels, val);
        }
    }
}

#[derive(Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} gauge", name);
        let _ = writeln!(out, "{} {}", name, self.get());
    }
}

#[derive(Default)]
pub struct EngineMetrics {
    pub upgrades: CounterVec,
    pub connections_active: Gauge,
    /// Labels: `kind` (connect/disconnect/join/leave), `outcome`.
    pub handshakes: CounterVec,
    pub broadcast_dropped: CounterVec,
    pub decode_errors: CounterVec,
    /// Labels: `code`.
    pub handler_errors: CounterVec,
}

impl EngineMetrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.upgrades.render("wsmux_upgrades_total", &mut out);
        self.connections_active.render("wsmux_connections_active", &mut out);
        self.handshakes.render("wsmux_handshakes_total", &mut out);
        self.broadcast_dropped.render("wsmux_broadcast_dropped_total", &mut out);
        self.decode_errors.render("wsmux_decode_errors_total", &mut out);
        self.handler_errors.render("wsmux_handler_errors_total", &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn labels_are_order_independent() {
        let m = EngineMetrics::default();
        m.handshakes.inc(&[("kind", "connect"), ("outcome", "ok")]);
        m.handshakes.inc(&[("outcome", "ok"), ("kind", "connect")]);
        assert_eq!(m.handshakes.get(&[("kind", "connect"), ("outcome", "ok")]), 2);

        let text = m.render();
        assert!(text.contains("wsmux_handshakes_total{kind=\"connect\",outcome=\"ok\"} 2"));
        assert!(text.contains("# TYPE wsmux_connections_active gauge"));
    }
}
