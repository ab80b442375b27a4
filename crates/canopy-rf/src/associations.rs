//! Lift-based association rules over the boolean feature band.
//!
//! A rule is a set of feature slots. Applying rules appends one derived
//! feature per rule to every record: the sum of the coerced values at the
//! rule's slots.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::error::RfError;
use crate::record::{FeatureValue, Record};
use crate::tree::DEFAULT_BOOLEAN_BAND;

/// File name appended to the output base for persisted rules.
pub const RULES_FILE_SUFFIX: &str = "associationRules.txt";

/// Which rules survive when more than `max_rules` are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleSelection {
    /// Keep the rules with the lowest lift.
    #[default]
    LowestLift,
    /// Keep the rules with the highest lift.
    HighestLift,
}

/// Configuration for the association-rule search.
///
/// # Defaults
///
/// | Parameter            | Default       |
/// |----------------------|---------------|
/// | `band`               | `8..27`       |
/// | `max_rules`          | 30            |
/// | `presence_threshold` | 0.9           |
/// | `selection`          | `LowestLift`  |
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationConfig {
    band: Range<usize>,
    max_rules: usize,
    presence_threshold: f64,
    selection: RuleSelection,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            band: DEFAULT_BOOLEAN_BAND,
            max_rules: 30,
            presence_threshold: 0.9,
            selection: RuleSelection::LowestLift,
        }
    }
}

impl AssociationConfig {
    /// Create a config with the defaults above.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the feature slots considered for combination.
    #[must_use]
    pub fn with_band(mut self, band: Range<usize>) -> Self {
        self.band = band;
        self
    }

    /// Set the maximum number of rules kept.
    #[must_use]
    pub fn with_max_rules(mut self, max_rules: usize) -> Self {
        self.max_rules = max_rules;
        self
    }

    /// Set the mean value above which a combination counts as present.
    #[must_use]
    pub fn with_presence_threshold(mut self, presence_threshold: f64) -> Self {
        self.presence_threshold = presence_threshold;
        self
    }

    /// Set which rules survive truncation to `max_rules`.
    #[must_use]
    pub fn with_selection(mut self, selection: RuleSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Return the feature band.
    #[must_use]
    pub fn band(&self) -> Range<usize> {
        self.band.clone()
    }

    /// Return the maximum number of rules kept.
    #[must_use]
    pub fn max_rules(&self) -> usize {
        self.max_rules
    }

    /// Search the band for positively associated combinations.
    ///
    /// Slots are visited in ascending order. A slot whose singleton is not
    /// associated with any class is skipped entirely. Otherwise every rule
    /// kept so far, and every earlier associated singleton, is extended by
    /// the slot and kept when the extension is itself associated. Singletons
    /// seed the growth but are never emitted as rules.
    ///
    /// The band is clipped to the shortest record, so records without the
    /// band simply produce no rules. Deterministic.
    #[instrument(skip_all, fields(n_records = records.len(), band = ?self.band))]
    pub fn find(&self, records: &[Record]) -> AssociationRules {
        let n_features = records.iter().map(Record::n_features).min().unwrap_or(0);
        let band = self.band.start..self.band.end.min(n_features);
        let n_classes = records.iter().map(|r| r.class_label).max().unwrap_or(0);

        let mut found: Vec<(Vec<usize>, f64)> = Vec::new();
        let mut singles: Vec<Vec<usize>> = Vec::new();

        for slot in band {
            if self.lift(records, &[slot], n_classes).is_none() {
                continue;
            }
            let kept = found.len();
            for i in 0..kept {
                let candidate = extended(&found[i].0, slot);
                if let Some(lift) = self.lift(records, &candidate, n_classes) {
                    found.push((candidate, lift));
                }
            }
            for single in &singles {
                let candidate = extended(single, slot);
                if let Some(lift) = self.lift(records, &candidate, n_classes) {
                    found.push((candidate, lift));
                }
            }
            singles.push(vec![slot]);
        }

        let n_found = found.len();
        let rules = select(found, self.max_rules, self.selection);
        info!(n_found, n_kept = rules.len(), "association rules found");
        AssociationRules { rules }
    }

    /// Lift of the first class whose lift exceeds 1.0, if any.
    ///
    /// Lift for class `c` is `P(present | c) / P(present)`.
    fn lift(&self, records: &[Record], set: &[usize], n_classes: usize) -> Option<f64> {
        let mut class_counts = vec![0usize; n_classes + 1];
        let mut present_counts = vec![0usize; n_classes + 1];
        for record in records {
            let sum: f64 = set.iter().map(|&i| record.features[i].as_f64()).sum();
            let present = sum / set.len() as f64 > self.presence_threshold;
            class_counts[record.class_label] += 1;
            if present {
                present_counts[record.class_label] += 1;
            }
        }

        let n_present: usize = present_counts.iter().sum();
        if n_present == 0 {
            return None;
        }
        let p_present = n_present as f64 / records.len() as f64;

        (1..=n_classes)
            .filter(|&c| class_counts[c] > 0)
            .map(|c| (present_counts[c] as f64 / class_counts[c] as f64) / p_present)
            .find(|&lift| lift > 1.0)
    }
}

fn extended(set: &[usize], slot: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(set.len() + 1);
    out.extend_from_slice(set);
    out.push(slot);
    out
}

/// Keep at most `max_rules` rules, preserving discovery order among survivors.
fn select(found: Vec<(Vec<usize>, f64)>, max_rules: usize, selection: RuleSelection) -> Vec<Vec<usize>> {
    if found.len() <= max_rules {
        return found.into_iter().map(|(rule, _)| rule).collect();
    }

    let mut order: Vec<usize> = (0..found.len()).collect();
    match selection {
        RuleSelection::LowestLift => {
            order.sort_by(|&a, &b| found[a].1.total_cmp(&found[b].1).then(a.cmp(&b)));
        }
        RuleSelection::HighestLift => {
            order.sort_by(|&a, &b| found[b].1.total_cmp(&found[a].1).then(a.cmp(&b)));
        }
    }
    order.truncate(max_rules);
    order.sort_unstable();

    let mut found: Vec<Option<Vec<usize>>> = found.into_iter().map(|(rule, _)| Some(rule)).collect();
    order.into_iter().filter_map(|i| found[i].take()).collect()
}

/// An ordered list of association rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociationRules {
    rules: Vec<Vec<usize>>,
}

impl AssociationRules {
    /// Wrap explicit rules.
    #[must_use]
    pub fn new(rules: Vec<Vec<usize>>) -> Self {
        Self { rules }
    }

    /// Return the rules in order.
    #[must_use]
    pub fn rules(&self) -> &[Vec<usize>] {
        &self.rules
    }

    /// Return the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Return `true` if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Append one `Float` feature per rule to every record.
    ///
    /// All records are checked before any is modified.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::RuleIndexOutOfRange`] if a rule names a slot some
    /// record does not have.
    pub fn apply(&self, records: &mut [Record]) -> Result<(), RfError> {
        for (record_index, record) in records.iter().enumerate() {
            let n_features = record.n_features();
            if let Some(&feature_index) = self
                .rules
                .iter()
                .flatten()
                .find(|&&i| i >= n_features)
            {
                return Err(RfError::RuleIndexOutOfRange {
                    feature_index,
                    record_index,
                    n_features,
                });
            }
        }

        for record in records.iter_mut() {
            let derived: Vec<FeatureValue> = self
                .rules
                .iter()
                .map(|rule| {
                    let sum = rule.iter().map(|&i| record.features[i].as_f64()).sum();
                    FeatureValue::Float(sum)
                })
                .collect();
            record.features.extend(derived);
        }
        debug!(n_rules = self.rules.len(), n_records = records.len(), "rules applied");
        Ok(())
    }

    /// Write one `i,j,...` line per rule.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the writer fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for rule in &self.rules {
            let line: Vec<String> = rule.iter().map(ToString::to_string).collect();
            writeln!(writer, "{}", line.join(","))?;
        }
        writer.flush()
    }

    /// Save to `<out_base>associationRules.txt`.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::WriteRules`] if the file cannot be created or written.
    #[instrument(skip_all, fields(out_base = %out_base.as_ref().display()))]
    pub fn save(&self, out_base: impl AsRef<Path>) -> Result<(), RfError> {
        let path = rules_path(out_base);
        let write_err = |source| RfError::WriteRules {
            path: path.clone(),
            source,
        };
        let file = File::create(&path).map_err(write_err)?;
        self.write_to(BufWriter::new(file)).map_err(write_err)?;
        debug!(n_rules = self.rules.len(), "association rules saved");
        Ok(())
    }

    /// Load from `<out_base>associationRules.txt`.
    ///
    /// Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// | Variant                        | When                                  |
    /// |--------------------------------|---------------------------------------|
    /// | [`RfError::ReadRules`]         | the file is missing or unreadable     |
    /// | [`RfError::MalformedRuleLine`] | a line is not comma-separated indices |
    #[instrument(skip_all, fields(out_base = %out_base.as_ref().display()))]
    pub fn load(out_base: impl AsRef<Path>) -> Result<Self, RfError> {
        let path = rules_path(out_base);
        let read_err = |source| RfError::ReadRules {
            path: path.clone(),
            source,
        };
        let file = File::open(&path).map_err(read_err)?;

        let mut rules = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(read_err)?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let rule = trimmed
                .split(',')
                .map(|field| field.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| RfError::MalformedRuleLine {
                    path: path.clone(),
                    line: i + 1,
                    raw: line.clone(),
                })?;
            rules.push(rule);
        }

        debug!(n_rules = rules.len(), "association rules loaded");
        Ok(Self { rules })
    }
}

/// Path of the rule file under `out_base`.
#[must_use]
pub fn rules_path(out_base: impl AsRef<Path>) -> PathBuf {
    let mut name = out_base.as_ref().as_os_str().to_owned();
    name.push(RULES_FILE_SUFFIX);
    PathBuf::from(name)
}
