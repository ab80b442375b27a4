use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use canopy_io::{Dataset, LabelMode, PredictionWriter, RecordReader};
use canopy_rf::{
    AssociationConfig, AssociationRules, BinaryConfusion, ClassMetrics, DEFAULT_PURITY_THRESHOLD,
    Evaluation, FeatureDrop, ProcessPValue, RandomForest, RandomForestConfig, Record,
    SemiSupervised,
};

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Random forest training, persistence and semi-supervised labeling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility (defaults to a time-derived value)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Shared forest parameters.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// Number of trees in the forest
    #[arg(long, default_value_t = 100)]
    n_trees: usize,

    /// Number of classes; labels run from 1 to this value
    #[arg(long, default_value_t = 2)]
    n_classes: usize,

    /// Class share at which a node becomes a leaf
    #[arg(long, default_value_t = DEFAULT_PURITY_THRESHOLD)]
    purity: f64,

    /// Maximum tree depth (unlimited if not set)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Root feature exclusion: "random", "pvalue", or "none"
    #[arg(long, default_value = "random")]
    feature_drop: String,

    /// Interpreter used for p-value computation with --feature-drop pvalue
    #[arg(long, default_value = "python")]
    python: String,

    /// Seconds to wait for each p-value computation
    #[arg(long, default_value_t = 30)]
    pvalue_timeout: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Train a forest and report its out-of-bag error
    Train {
        /// Path to the labeled CSV file
        #[arg(long)]
        data: PathBuf,

        /// Prefix for tree and association-rule files
        #[arg(long)]
        out_base: PathBuf,

        /// Association rules: "find" (and save), "load", or "skip"
        #[arg(long, default_value = "skip")]
        rules: String,

        /// Write each tree to <out-base><i>.txt
        #[arg(long, default_value_t = false)]
        write_trees: bool,

        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Load a saved forest and evaluate it on a labeled dataset
    Evaluate {
        /// Path to the labeled CSV file
        #[arg(long)]
        data: PathBuf,

        /// Prefix the trees were written under
        #[arg(long)]
        out_base: PathBuf,

        /// Number of tree files to load
        #[arg(long)]
        n_trees: usize,

        /// Number of classes; labels run from 1 to this value
        #[arg(long, default_value_t = 2)]
        n_classes: usize,

        /// Association rules: "load" or "skip"
        #[arg(long, default_value = "skip")]
        rules: String,
    },

    /// Label unlabeled records by forest vote and retrain on the union
    Label {
        /// Path to the labeled CSV file
        #[arg(long)]
        labeled: PathBuf,

        /// Path to the unlabeled CSV file
        #[arg(long)]
        unlabeled: PathBuf,

        /// Prefix for tree files
        #[arg(long)]
        out_base: PathBuf,

        /// Generation number; above 0, earlier generations' trees are loaded
        #[arg(long, default_value_t = 0)]
        generation: usize,

        /// Association rules: "find" (and save), "load", or "skip"; applied to both datasets
        #[arg(long, default_value = "skip")]
        rules: String,

        /// Write the newly labeled records to this CSV file
        #[arg(long)]
        predictions: Option<PathBuf>,

        /// Write the final forest's trees under <out-base>
        #[arg(long, default_value_t = false)]
        write_trees: bool,

        #[command(flatten)]
        forest: ForestArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct TrainOutput {
    n_records: usize,
    n_features: usize,
    n_trees: usize,
    n_rules: usize,
    seed: u64,
    elapsed_secs: f64,
    oob: EvaluationOutput,
}

#[derive(Serialize)]
struct EvaluateOutput {
    n_records: usize,
    n_trees: usize,
    evaluation: EvaluationOutput,
}

#[derive(Serialize)]
struct LabelOutput {
    generation: usize,
    n_records: usize,
    n_newly_labeled: usize,
    n_rules: usize,
    label_counts: Vec<usize>,
    seed: u64,
    oob: EvaluationOutput,
}

#[derive(Serialize)]
struct EvaluationOutput {
    total: usize,
    misclassified: usize,
    misclassification_rate: f64,
    accuracy: f64,
    confusion_matrix: Vec<Vec<usize>>,
    class_metrics: Vec<ClassMetrics>,
    binary: BinaryOutput,
}

#[derive(Serialize)]
struct BinaryOutput {
    #[serde(flatten)]
    counts: BinaryConfusion,
    detection_rate: f64,
    false_positive_rate: f64,
}

impl From<&Evaluation> for EvaluationOutput {
    fn from(evaluation: &Evaluation) -> Self {
        let binary = evaluation.binary();
        Self {
            total: evaluation.total,
            misclassified: evaluation.misclassified,
            misclassification_rate: evaluation.misclassification_rate(),
            accuracy: evaluation.accuracy(),
            confusion_matrix: evaluation.confusion.as_rows().to_vec(),
            class_metrics: evaluation.confusion.class_metrics(),
            binary: BinaryOutput {
                counts: binary,
                detection_rate: binary.detection_rate(),
                false_positive_rate: binary.false_positive_rate(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RulesMode {
    Find,
    Load,
    Skip,
}

fn parse_rules_mode(s: &str) -> Result<RulesMode> {
    match s {
        "find" => Ok(RulesMode::Find),
        "load" => Ok(RulesMode::Load),
        "skip" => Ok(RulesMode::Skip),
        other => anyhow::bail!("unknown rules mode: {other} (expected find, load, or skip)"),
    }
}

fn parse_feature_drop(args: &ForestArgs) -> Result<FeatureDrop> {
    match args.feature_drop.as_str() {
        "random" => Ok(FeatureDrop::Random),
        "none" => Ok(FeatureDrop::None),
        "pvalue" => {
            let source = ProcessPValue::new(args.python.clone())
                .with_timeout(Duration::from_secs(args.pvalue_timeout));
            Ok(FeatureDrop::PValue(Arc::new(source)))
        }
        other => anyhow::bail!("unknown feature drop: {other} (expected random, pvalue, or none)"),
    }
}

fn build_config(args: &ForestArgs, seed: u64) -> Result<RandomForestConfig> {
    let config = RandomForestConfig::new(args.n_trees, args.n_classes)?
        .with_purity_threshold(args.purity)
        .with_max_depth(args.max_depth)
        .with_feature_drop(parse_feature_drop(args)?)
        .with_seed(seed);
    Ok(config)
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

fn read_dataset(path: &Path, mode: LabelMode) -> Result<Dataset> {
    RecordReader::new(path)
        .read(mode)
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Synthesize association features on every pool according to `mode`.
///
/// Rules are found on the first pool only; all pools receive the same
/// derived slots, so trees trained on one pool can score the others.
fn apply_rules(
    mode: RulesMode,
    out_base: &Path,
    pools: &mut [&mut [Record]],
) -> Result<AssociationRules> {
    let rules = match mode {
        RulesMode::Skip => return Ok(AssociationRules::default()),
        RulesMode::Find => {
            let first: &[Record] = pools.first().map_or(&[][..], |pool| &**pool);
            let rules = AssociationConfig::new().find(first);
            rules
                .save(out_base)
                .context("failed to write association rules")?;
            rules
        }
        RulesMode::Load => {
            AssociationRules::load(out_base).context("failed to read association rules")?
        }
    };
    for pool in pools.iter_mut() {
        rules
            .apply(pool)
            .context("association rules do not fit the dataset")?;
    }
    info!(n_rules = rules.len(), "association features synthesized");
    Ok(rules)
}

/// Column names for the slots appended by `rules`, e.g. `assoc_8_9`.
fn derived_feature_names(rules: &AssociationRules) -> Vec<String> {
    rules
        .rules()
        .iter()
        .map(|rule| {
            let slots: Vec<String> = rule.iter().map(ToString::to_string).collect();
            format!("assoc_{}", slots.join("_"))
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    let seed = cli.seed.unwrap_or_else(time_seed);

    match cli.command {
        Command::Train {
            data,
            out_base,
            rules,
            write_trees,
            forest,
        } => {
            let rules_mode = parse_rules_mode(&rules)?;
            let mut records = read_dataset(&data, LabelMode::Labeled)?.into_records();
            let n_rules = apply_rules(rules_mode, &out_base, &mut [records.as_mut_slice()])?.len();

            let config = build_config(&forest, seed)?;
            info!(seed, "training");
            let result = config.fit(&records).context("training failed")?;

            if write_trees {
                result
                    .forest()
                    .save_trees(&out_base)
                    .context("failed to write trees")?;
            }

            let metadata = result.metadata();
            let output = TrainOutput {
                n_records: metadata.n_records,
                n_features: metadata.n_features,
                n_trees: metadata.n_trees,
                n_rules,
                seed,
                elapsed_secs: metadata.elapsed_secs,
                oob: result.oob_evaluation().into(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Evaluate {
            data,
            out_base,
            n_trees,
            n_classes,
            rules,
        } => {
            let rules_mode = parse_rules_mode(&rules)?;
            if rules_mode == RulesMode::Find {
                anyhow::bail!("evaluate can only load or skip association rules");
            }
            let mut records = read_dataset(&data, LabelMode::Labeled)?.into_records();
            apply_rules(rules_mode, &out_base, &mut [records.as_mut_slice()])?;

            let forest = RandomForest::load_trees(&out_base, n_trees, n_classes)
                .context("failed to load forest")?;
            let evaluation = forest.evaluate(&records);
            debug!("confusion matrix\n{}", evaluation.confusion);

            let output = EvaluateOutput {
                n_records: records.len(),
                n_trees: forest.n_trees(),
                evaluation: (&evaluation).into(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Label {
            labeled,
            unlabeled,
            out_base,
            generation,
            rules,
            predictions,
            write_trees,
            forest,
        } => {
            let rules_mode = parse_rules_mode(&rules)?;
            let mut labeled = read_dataset(&labeled, LabelMode::Labeled)?.into_records();
            let unlabeled = read_dataset(&unlabeled, LabelMode::Unlabeled)?;
            let mut feature_names = unlabeled.feature_names.clone();
            let mut unlabeled = unlabeled.into_records();
            let n_labeled = labeled.len();

            let rules = apply_rules(
                rules_mode,
                &out_base,
                &mut [labeled.as_mut_slice(), unlabeled.as_mut_slice()],
            )?;
            feature_names.extend(derived_feature_names(&rules));

            let config = build_config(&forest, seed)?;
            let outcome = SemiSupervised::new(config)
                .with_generation(generation)
                .with_out_base(&out_base)
                .with_write_trees(write_trees)
                .run(labeled, unlabeled)
                .context("semi-supervised pass failed")?;

            let newly_labeled = &outcome.records[n_labeled..];
            if let Some(path) = predictions {
                let labels: Vec<usize> = newly_labeled.iter().map(|r| r.class_label).collect();
                PredictionWriter::new(&path)?
                    .write(&feature_names, newly_labeled, &labels)
                    .context("failed to write predictions")?;
            }

            let mut label_counts = vec![0usize; forest.n_classes];
            for record in newly_labeled {
                if let Some(count) = label_counts.get_mut(record.class_label.wrapping_sub(1)) {
                    *count += 1;
                }
            }

            let output = LabelOutput {
                generation,
                n_records: outcome.records.len(),
                n_newly_labeled: outcome.n_newly_labeled,
                n_rules: rules.len(),
                label_counts,
                seed,
                oob: (&outcome.oob_evaluation).into(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
