//! Prometheus text exposition format.
//!
//! Turns a store snapshot into the page served on the metrics path.

use crate::family::Gauge;
use crate::store::SeriesKey;

/// Render every gauge family of a store snapshot.
///
/// Families without series still get their HELP and TYPE lines.
pub fn render_prometheus(series: &[(SeriesKey, f64)]) -> String {
    let mut out = String::new();
    for gauge in Gauge::ALL {
        let samples = series
            .iter()
            .filter(|(key, _)| key.gauge == gauge)
            .map(|(key, value)| (key.labels.as_slice(), *value));
        render_gauge(&mut out, gauge.name(), gauge.help(), gauge.labels(), samples);
    }
    out
}

/// Append one gauge family. Label values pair up with `label_names` by position.
pub fn render_gauge<'a, I>(
    out: &mut String,
    name: &str,
    help: &str,
    label_names: &[&str],
    samples: I,
) where
    I: IntoIterator<Item = (&'a [String], f64)>,
{
    out.push_str(&format!("# HELP {name} {}\n", escape_help(help)));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    for (labels, value) in samples {
        out.push_str(name);
        push_labels(out, label_names, labels);
        out.push_str(&format!(" {}\n", format_value(value)));
    }
}

/// Append a single unlabelled counter.
pub fn render_counter(out: &mut String, name: &str, help: &str, value: f64) {
    out.push_str(&format!("# HELP {name} {}\n", escape_help(help)));
    out.push_str(&format!("# TYPE {name} counter\n"));
    out.push_str(&format!("{name} {}\n", format_value(value)));
}

fn push_labels(out: &mut String, names: &[&str], values: &[String]) {
    if names.is_empty() {
        return;
    }
    out.push('{');
    for (i, (name, value)) in names.iter().zip(values).enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{name}=\"{}\"", escape_label(value)));
    }
    out.push('}');
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{value}")
    }
}

fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}
