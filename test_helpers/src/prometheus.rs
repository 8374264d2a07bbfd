//! Prometheus registry inspection.
//!
//! This module provides a [`gather()`] function that renders a
//! [`prometheus::Registry`] in the text exposition format and parses it back
//! into a [`MetricSet`] for inspection, as an exporter endpoint would.
//!
#![allow(missing_copy_implementations)]

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use prometheus::{Encoder, Registry, TextEncoder};
use thiserror::Error;

/// Metric gather errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The registry could not be rendered as text.
    #[error("metrics encode: {0}")]
    Encode(prometheus::Error),

    /// The rendered text was not UTF-8.
    #[error("metrics are not valid UTF-8: {0}")]
    Utf8(std::string::FromUtf8Error),

    /// The text is not in the exposition format.
    #[error("metrics parse: {0}")]
    Parse(std::io::Error),
}

/// A set of metrics parsed from Prometheus text output.
///
/// # Usage
///
/// ```rust
/// # use test_helpers::prometheus::*;
/// #
/// # let metric_set = parse(r#"bananas{path="/write",status="ok"} 42"#).unwrap();
/// #
/// let count = metric_set.metric("bananas").labels([
///     ("path", "/write"),
///     ("status", "ok"),
/// ]).unwrap_counter();
///
/// println!("{:?}", count);
/// ```
#[derive(Debug, Default, PartialOrd, Ord, PartialEq, Eq)]
pub struct MetricSet(BTreeMap<String, LabelSet>);

impl MetricSet {
    /// Extract the metric named `metric`, or panic.
    ///
    /// # Panics
    ///
    /// Panics if `metric` does not appear in the [`MetricSet`].
    pub fn metric(&self, metric: impl AsRef<str>) -> &LabelSet {
        self.0.get(metric.as_ref()).unwrap_or_else(|| {
            panic!(
                "metric {} does not appear in scrape, have: {:#?}",
                metric.as_ref(),
                self
            )
        })
    }
}

/// A [`LabelSet`] contains all sets of key=value labels and their mapped
/// values.
#[derive(Debug, Default, PartialOrd, Ord, PartialEq, Eq)]
pub struct LabelSet(BTreeMap<BTreeMap<String, String>, Value>);

impl LabelSet {
    /// Extract the value for the given label set, or panic.
    ///
    /// # Panics
    ///
    /// Panics if the metric does not have an value for the provided label set.
    pub fn labels<T, K, V>(&self, labels: T) -> &Value
    where
        T: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let labels = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<BTreeMap<String, String>>();

        self.0.get(&labels).unwrap_or_else(|| {
            panic!(
                "metric exists, but no entry for label set {:?}, have: {:#?}",
                labels, self
            )
        })
    }

    /// Returns the number of label sets in the parent metric.
    pub fn label_count(&self) -> usize {
        self.0.len()
    }
}

/// A typed value associated with a labelled metric.
#[derive(Debug, PartialOrd, Ord, PartialEq, Eq)]
pub enum Value {
    /// Sample of a `counter` family.
    Counter(OrderedFloat<f64>),
    /// Sample of a `gauge` family.
    Gauge(OrderedFloat<f64>),
    /// Sample without a `# TYPE` line.
    Untyped(OrderedFloat<f64>),
}

impl Value {
    /// Extract a counter typed value.
    ///
    /// # Panics
    ///
    /// Panics if the value is not a counter.
    pub fn unwrap_counter(&self) -> f64 {
        match self {
            Self::Counter(v) | Self::Untyped(v) => **v,
            _ => panic!("{:?} is not a counter", self),
        }
    }

    /// Extract a gauge typed value.
    ///
    /// # Panics
    ///
    /// Panics if the value is not a gauge.
    pub fn unwrap_gauge(&self) -> f64 {
        match self {
            Self::Gauge(v) => **v,
            _ => panic!("{:?} is not a gauge", self),
        }
    }
}

impl From<prometheus_parse::Value> for Value {
    fn from(value: prometheus_parse::Value) -> Self {
        match value {
            prometheus_parse::Value::Counter(v) => Self::Counter(OrderedFloat(v)),
            prometheus_parse::Value::Gauge(v) => Self::Gauge(OrderedFloat(v)),
            prometheus_parse::Value::Untyped(v) => Self::Untyped(OrderedFloat(v)),
            prometheus_parse::Value::Histogram(_) | prometheus_parse::Value::Summary(_) => {
                unimplemented!("only scalar metric types are inspected")
            }
        }
    }
}

/// Render every metric family in `registry` and parse the result into a
/// [`MetricSet`].
///
/// # Panics
///
/// Panics if a duplicate value is observed for the same `(name, labels)` tuple.
pub fn gather(registry: &Registry) -> Result<MetricSet, Error> {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buf)
        .map_err(Error::Encode)?;

    let body = String::from_utf8(buf).map_err(Error::Utf8)?;

    parse(&body)
}

/// Parse a Prometheus text exposition body.
///
/// # Panics
///
/// Panics if a duplicate value is observed for the same `(name, labels)` tuple.
pub fn parse(s: &str) -> Result<MetricSet, Error> {
    // Map it into the form the parser wants.
    let body = s.lines().map(|v| Ok(v.to_owned()));

    // Let it parse the metrics text.
    let metrics = prometheus_parse::Scrape::parse(body).map_err(Error::Parse)?;

    // And convert it into an indexed, point-in-time structure.
    let mut set = BTreeMap::<String, LabelSet>::default();

    for v in metrics.samples {
        // Extract the key=value labels for this observation.
        let scrape_labels = v
            .labels
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect::<BTreeMap<_, _>>();

        let old = set
            .entry(v.metric)
            .or_default()
            .0
            .insert(scrape_labels, Value::from(v.value));

        // There should never be multiple entries for a given (metric,
        // labels) tuple.
        assert!(old.is_none(), "duplicate name + label tuple in metrics");
    }

    Ok(MetricSet(set))
}

#[cfg(test)]
mod tests {
    use prometheus::{IntCounterVec, Opts};

    use super::*;

    #[test]
    fn test_parse() {
        let s = r#"
# HELP cache_requests_total Requests.
# TYPE cache_requests_total counter
cache_requests_total{item_type="postings"} 7
cache_requests_total{item_type="series"} 42
# HELP cache_entries Entries.
# TYPE cache_entries gauge
cache_entries 3
"#;
        let metrics = parse(s.trim()).expect("must parse example scrape");

        let got = metrics
            .metric("cache_requests_total")
            .labels([("item_type", "postings")])
            .unwrap_counter();
        assert_eq!(got, 7.0);

        let got = metrics
            .metric("cache_requests_total")
            .labels([("item_type", "series")])
            .unwrap_counter();
        assert_eq!(got, 42.0);
        assert_eq!(metrics.metric("cache_requests_total").label_count(), 2);

        let got = metrics
            .metric("cache_entries")
            .labels(std::iter::empty::<(&str, &str)>())
            .unwrap_gauge();
        assert_eq!(got, 3.0);
    }

    #[test]
    fn test_gather() {
        let registry = Registry::new();
        let counter =
            IntCounterVec::new(Opts::new("bananas_total", "Bananas."), &["colour"]).unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.with_label_values(&["yellow"]).inc_by(3);

        let metrics = gather(&registry).unwrap();
        let got = metrics
            .metric("bananas_total")
            .labels([("colour", "yellow")])
            .unwrap_counter();
        assert_eq!(got, 3.0);
    }
}
