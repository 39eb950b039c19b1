//! Metric Snapshots
//!
//! A snapshot is the complete set of gauge families produced by one
//! reconciliation pass. It is built in full, then published; nothing
//! mutates it afterwards.

use serde::Serialize;
use std::fmt::Write;

/// One labelled value in a family
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Label values, in the order of the family's label names
    pub labels: Vec<String>,
    pub value: f64,
}

/// Kind reported in the `# TYPE` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// A named group of samples sharing a label schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFamily {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    pub fn gauge(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
            labels,
            samples: Vec::new(),
        }
    }

    pub fn counter(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            kind: MetricKind::Counter,
            ..Self::gauge(name, help, labels)
        }
    }

    /// Add a sample; `labels` must match the family's label names
    pub fn push<I, S>(&mut self, labels: I, value: f64)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        debug_assert_eq!(
            labels.len(),
            self.labels.len(),
            "label arity mismatch for {}",
            self.name
        );
        self.samples.push(Sample { labels, value });
    }

    /// Value of the sample whose labels equal `labels`
    #[cfg(test)]
    pub fn value_of(&self, labels: &[&str]) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.labels.iter().map(String::as_str).eq(labels.iter().copied()))
            .map(|s| s.value)
    }

    /// Append this family in Prometheus text exposition format 0.0.4.
    ///
    /// `# HELP` and `# TYPE` are written even when there are no samples.
    pub fn write_prometheus(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, escape_help(self.help));
        let _ = writeln!(out, "# TYPE {} {}", self.name, self.kind.as_str());

        for sample in &self.samples {
            out.push_str(self.name);
            if !self.labels.is_empty() {
                out.push('{');
                for (i, (name, value)) in self.labels.iter().zip(&sample.labels).enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{}=\"{}\"", name, escape_label_value(value));
                }
                out.push('}');
            }
            let _ = writeln!(out, " {}", format_value(sample.value));
        }
    }
}

/// The families of one pass, in a fixed order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub families: Vec<MetricFamily>,
}

impl MetricSnapshot {
    /// Snapshot with no families
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(families: Vec<MetricFamily>) -> Self {
        Self { families }
    }

    #[cfg(test)]
    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.families.iter().map(|f| f.samples.len()).sum()
    }

    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        for family in &self.families {
            family.write_prometheus(&mut out);
        }
        out
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS: &[&str] = &["enode", "name"];

    #[test]
    fn test_push_and_lookup() {
        let mut family = MetricFamily::gauge("test_peers", "Test peers", LABELS);
        family.push(["abc", "Acme"], 1.0);
        family.push(["def", "Globex"], 0.0);

        assert_eq!(family.value_of(&["abc", "Acme"]), Some(1.0));
        assert_eq!(family.value_of(&["def", "Globex"]), Some(0.0));
        assert_eq!(family.value_of(&["abc", "Globex"]), None);
    }

    #[test]
    fn test_prometheus_format() {
        let mut family = MetricFamily::gauge("test_peers", "Test peers", LABELS);
        family.push(["abc", "Acme"], 1.0);
        family.push(["def", "Big"], 12345678.0);

        let mut out = String::new();
        family.write_prometheus(&mut out);

        assert!(out.starts_with("# HELP test_peers Test peers\n# TYPE test_peers gauge\n"));
        assert!(out.contains("test_peers{enode=\"abc\",name=\"Acme\"} 1\n"));
        assert!(out.contains("test_peers{enode=\"def\",name=\"Big\"} 12345678\n"));
    }

    #[test]
    fn test_empty_family_keeps_header() {
        let snapshot = MetricSnapshot::new(vec![MetricFamily::gauge(
            "test_head_block",
            "Head block",
            LABELS,
        )]);

        let out = snapshot.to_prometheus();
        assert_eq!(
            out,
            "# HELP test_head_block Head block\n# TYPE test_head_block gauge\n"
        );
    }

    #[test]
    fn test_label_escaping() {
        let mut family = MetricFamily::gauge("test_peers", "Test peers", LABELS);
        family.push(["a\\b", "Quote \"Co\"\nLtd"], 1.0);

        let out = MetricSnapshot::new(vec![family]).to_prometheus();
        assert!(out.contains(r#"test_peers{enode="a\\b",name="Quote \"Co\"\nLtd"} 1"#));
    }

    #[test]
    fn test_counter_type_line() {
        let family = MetricFamily::counter("test_total", "Total", &[]);
        let mut out = String::new();
        family.write_prometheus(&mut out);

        assert!(out.contains("# TYPE test_total counter"));
    }

    #[test]
    fn test_unlabelled_sample() {
        let mut family = MetricFamily::gauge("test_up", "Up", &[]);
        family.push(Vec::<String>::new(), 1.0);

        let out = MetricSnapshot::new(vec![family]).to_prometheus();
        assert!(out.contains("\ntest_up 1\n"));
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = MetricSnapshot::empty();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.sample_count(), 0);
        assert_eq!(snapshot.to_prometheus(), "");
    }
}
