//! Metrics definitions for the dispatch service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const INVOCATIONS: MetricDef = MetricDef {
    name: "invocations",
    metric_type: MetricType::Counter,
    description: "Trigger invocations. Tagged with handler, status.",
};

pub const INVOCATION_DURATION: MetricDef = MetricDef {
    name: "invocation.duration",
    metric_type: MetricType::Histogram,
    description: "Invocation duration in seconds. Tagged with handler.",
};

pub const INVOCATION_TIMEOUTS: MetricDef = MetricDef {
    name: "invocation.timeouts",
    metric_type: MetricType::Counter,
    description: "Invocations aborted after exceeding the runtime timeout. Tagged with handler.",
};

pub const FANOUT_PUBLISHED: MetricDef = MetricDef {
    name: "fanout.published",
    metric_type: MetricType::Counter,
    description: "Fan-out job messages acknowledged by the queue",
};

pub const FANOUT_FAILED: MetricDef = MetricDef {
    name: "fanout.failed",
    metric_type: MetricType::Counter,
    description: "Fan-out runs aborted by a failed publish",
};

pub const ALL_METRICS: &[MetricDef] = &[
    INVOCATIONS,
    INVOCATION_DURATION,
    INVOCATION_TIMEOUTS,
    FANOUT_PUBLISHED,
    FANOUT_FAILED,
];
