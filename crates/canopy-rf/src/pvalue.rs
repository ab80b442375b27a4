//! P-value capability used to drop uninformative features at a tree's root.

use std::io::{ErrorKind, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::record::Record;
use crate::split::UsedFeatures;

/// P-value returned when the helper cannot produce one. Always above the
/// informative cutoff, so the feature is dropped.
pub const NEUTRAL_P_VALUE: f64 = 2.0;

/// Features with a p-value above this cutoff (or NaN) are excluded.
pub const INFORMATIVE_CUTOFF: f64 = 0.2;

/// Fixed helper script; the samples arrive on stdin so argv stays small.
const ANOVA_SCRIPT: &str = "import sys
from scipy import stats
lines = sys.stdin.read().splitlines()
a, b = ([float(x) for x in line.split(',') if x] for line in lines[:2])
f, p = stats.f_oneway(a, b)
print(p)
";

/// Source of a two-sample p-value.
///
/// Implemented for any `Fn(&[f64], &[f64]) -> f64 + Send + Sync`, so tests
/// can inject a deterministic stub instead of spawning a process.
pub trait PValueSource: Send + Sync {
    /// Return the p-value for the hypothesis that `a` and `b` share a mean.
    fn p_value(&self, a: &[f64], b: &[f64]) -> f64;
}

impl<F> PValueSource for F
where
    F: Fn(&[f64], &[f64]) -> f64 + Send + Sync,
{
    fn p_value(&self, a: &[f64], b: &[f64]) -> f64 {
        self(a, b)
    }
}

/// One-way ANOVA p-value computed by an external Python/SciPy helper.
///
/// Each call spawns one child process with a fixed script, writes both
/// samples to its stdin, and waits at most `timeout` for it; a child still
/// running at the deadline is killed.
///
/// | Outcome                                  | Result                  |
/// |------------------------------------------|-------------------------|
/// | spawn failure, non-zero exit, or timeout | [`NEUTRAL_P_VALUE`]     |
/// | output `NaN`                             | 1.0                     |
/// | any other unparsable output              | 0.0                     |
#[derive(Debug, Clone)]
pub struct ProcessPValue {
    program: String,
    timeout: Duration,
}

impl ProcessPValue {
    /// Create a helper running `program -c <script>` with the samples on stdin.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the per-call deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, samples: String) -> Result<String, String> {
        let mut child = Command::new(&self.program)
            .arg("-c")
            .arg(ANOVA_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {e}", self.program))?;

        // Fed from a thread so a child that never drains stdin still hits the deadline.
        let feeder = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(samples.as_bytes()) {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("timed out after {:?}", self.timeout));
                }
                Ok(None) => thread::sleep(Duration::from_millis(5)),
                Err(e) => return Err(format!("wait failed: {e}")),
            }
        };

        if let Some(feeder) = feeder {
            match feeder.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(format!("failed to write samples: {e}")),
                Err(_) => return Err("sample writer panicked".to_string()),
            }
        }

        if !status.success() {
            return Err(format!("exited with {status}"));
        }

        let mut out = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout
                .read_to_string(&mut out)
                .map_err(|e| format!("unreadable output: {e}"))?;
        }
        Ok(out)
    }
}

impl Default for ProcessPValue {
    fn default() -> Self {
        Self::new("python")
    }
}

impl PValueSource for ProcessPValue {
    fn p_value(&self, a: &[f64], b: &[f64]) -> f64 {
        match self.run(encode_samples(a, b)) {
            Ok(out) => parse_p_value(&out),
            Err(reason) => {
                warn!(program = %self.program, %reason, "p-value helper failed");
                NEUTRAL_P_VALUE
            }
        }
    }
}

/// Parse helper output; `nan` reads as 1.0, other garbage as 0.0.
fn parse_p_value(out: &str) -> f64 {
    let trimmed = out.trim();
    match trimmed.parse::<f64>() {
        Ok(p) if p.is_nan() => 1.0,
        Ok(p) => p,
        Err(_) => 0.0,
    }
}

/// Two lines of comma-separated samples, `a` then `b`, as the helper reads them.
fn encode_samples(a: &[f64], b: &[f64]) -> String {
    let line = |values: &[f64]| {
        let items: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
        items.join(",")
    };
    format!("{}\n{}\n", line(a), line(b))
}

/// Return the feature slots to exclude: p-value above [`INFORMATIVE_CUTOFF`] or NaN.
///
/// Each slot compares the coerced values of class-1 records against those of
/// every other class. A group that is empty yields no p-value and the slot is
/// treated as uninformative.
pub(crate) fn informative_feature_filter(
    records: &[&Record],
    n_features: usize,
    source: &dyn PValueSource,
) -> UsedFeatures {
    let (normal, other): (Vec<&Record>, Vec<&Record>) =
        records.iter().copied().partition(|r| r.class_label == 1);
    let mut excluded = UsedFeatures::new();
    for feature in 0..n_features {
        let p = if normal.is_empty() || other.is_empty() {
            NEUTRAL_P_VALUE
        } else {
            let a: Vec<f64> = normal.iter().map(|r| r.features[feature].as_f64()).collect();
            let b: Vec<f64> = other.iter().map(|r| r.features[feature].as_f64()).collect();
            source.p_value(&a, &b)
        };
        if p.is_nan() || p > INFORMATIVE_CUTOFF {
            excluded.insert(feature);
        }
    }
    debug!(n_excluded = excluded.len(), n_features, "p-value filter applied");
    excluded
}
