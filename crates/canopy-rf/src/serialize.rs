//! Flat text persistence for single decision trees.
//!
//! One node per line, `isLeaf,splitIndex,splitValue,classLabel`, in pre-order
//! with the left subtree written before the right one. Leaves write `0` for
//! both split fields; splits write `0` for the class.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::error::RfError;
use crate::node::{FeatureIndex, Node, NodeIndex};
use crate::tree::DecisionTree;

/// How short lines in a tree file are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeReadMode {
    /// Skip lines with fewer than four fields and log them.
    #[default]
    Lenient,
    /// Reject lines with fewer than four fields.
    Strict,
}

/// Path of the tree file with index `tree_index` under `out_base`.
///
/// The base is used as a plain string prefix: `("out/forest_", 3)` gives
/// `out/forest_3.txt`.
#[must_use]
pub fn tree_path(out_base: impl AsRef<Path>, tree_index: usize) -> PathBuf {
    let mut name = out_base.as_ref().as_os_str().to_owned();
    name.push(format!("{tree_index}.txt"));
    PathBuf::from(name)
}

impl DecisionTree {
    /// Write the tree in the flat text format.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the writer fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let mut stack = vec![NodeIndex::new(0)];
        while let Some(idx) = stack.pop() {
            let Some(node) = self.nodes.get(idx.index()) else {
                continue;
            };
            match node {
                Node::Leaf { class_label } => writeln!(writer, "true,0,0,{class_label}")?,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    writeln!(writer, "false,{feature},{threshold},0")?;
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        writer.flush()
    }

    /// Save the tree to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::WriteTree`] if the file cannot be created or written.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RfError> {
        let path = path.as_ref();
        let write_err = |source| RfError::WriteTree {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(write_err)?;
        self.write_to(BufWriter::new(file)).map_err(write_err)?;
        debug!(n_nodes = self.nodes.len(), "tree saved");
        Ok(())
    }

    /// Decode a tree from the flat text format.
    ///
    /// # Errors
    ///
    /// | Variant                        | When                                             |
    /// |--------------------------------|--------------------------------------------------|
    /// | [`RfError::ReadTree`]          | the reader fails                                 |
    /// | [`RfError::MalformedTreeLine`] | a field does not parse, or a short line in `Strict` mode |
    /// | [`RfError::TruncatedTree`]     | input ends before every child was read           |
    pub fn read_from<R: BufRead>(reader: R, mode: TreeReadMode) -> Result<Self, RfError> {
        decode(reader, Path::new(""), mode, None)
    }

    /// Load a tree from `path` in [`TreeReadMode::Lenient`] mode.
    ///
    /// # Errors
    ///
    /// Same as [`DecisionTree::read_from`]; a missing or unreadable file is
    /// [`RfError::ReadTree`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RfError> {
        Self::load_with_mode(path, TreeReadMode::Lenient)
    }

    /// Load a tree from `path` with an explicit [`TreeReadMode`].
    ///
    /// # Errors
    ///
    /// Same as [`DecisionTree::load`].
    pub fn load_with_mode(path: impl AsRef<Path>, mode: TreeReadMode) -> Result<Self, RfError> {
        load_file(path.as_ref(), mode, None)
    }

    /// Load a tree from `path`, also rejecting leaves above `n_classes`.
    ///
    /// # Errors
    ///
    /// Same as [`DecisionTree::load`]; a leaf label outside `[1, n_classes]`
    /// is [`RfError::MalformedTreeLine`].
    pub fn load_with_classes(
        path: impl AsRef<Path>,
        mode: TreeReadMode,
        n_classes: usize,
    ) -> Result<Self, RfError> {
        load_file(path.as_ref(), mode, Some(n_classes))
    }
}

#[instrument(skip_all, fields(path = %path.display()))]
fn load_file(
    path: &Path,
    mode: TreeReadMode,
    n_classes: Option<usize>,
) -> Result<DecisionTree, RfError> {
    let file = File::open(path).map_err(|source| RfError::ReadTree {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = decode(BufReader::new(file), path, mode, n_classes)?;
    debug!(n_nodes = tree.nodes.len(), "tree loaded");
    Ok(tree)
}

fn decode<R: BufRead>(
    reader: R,
    path: &Path,
    mode: TreeReadMode,
    n_classes: Option<usize>,
) -> Result<DecisionTree, RfError> {
    let mut nodes = vec![Node::Leaf { class_label: 0 }];
    let mut pending = vec![NodeIndex::new(0)];
    let mut skipped = 0usize;

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|source| RfError::ReadTree {
            path: path.to_path_buf(),
            source,
        })?;

        let fields: Vec<&str> = line.trim_end().split(',').collect();
        if fields.len() < 4 {
            match mode {
                TreeReadMode::Lenient => {
                    skipped += 1;
                    warn!(line = line_no, raw = %line, "skipping short tree line");
                    continue;
                }
                TreeReadMode::Strict => {
                    return Err(malformed(path, line_no, "expected four fields"));
                }
            }
        }

        let Some(slot) = pending.pop() else {
            break;
        };
        nodes[slot.index()] = match parse_node(&fields, path, line_no, n_classes)? {
            ParsedNode::Leaf { class_label } => Node::Leaf { class_label },
            ParsedNode::Split { feature, threshold } => {
                let left = NodeIndex::new(nodes.len());
                nodes.push(Node::Leaf { class_label: 0 });
                let right = NodeIndex::new(nodes.len());
                nodes.push(Node::Leaf { class_label: 0 });
                pending.push(right);
                pending.push(left);
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }
            }
        };

        if pending.is_empty() {
            break;
        }
    }

    if !pending.is_empty() {
        return Err(RfError::TruncatedTree {
            path: path.to_path_buf(),
            pending: pending.len(),
        });
    }
    if skipped > 0 {
        debug!(skipped, "short tree lines ignored");
    }

    Ok(DecisionTree { nodes })
}

enum ParsedNode {
    Leaf { class_label: usize },
    Split { feature: FeatureIndex, threshold: f64 },
}

fn parse_node(
    fields: &[&str],
    path: &Path,
    line: usize,
    n_classes: Option<usize>,
) -> Result<ParsedNode, RfError> {
    let is_leaf: bool = fields[0]
        .trim()
        .parse()
        .map_err(|_| malformed(path, line, "isLeaf is not true/false"))?;
    if is_leaf {
        let class_label: usize = fields[3]
            .trim()
            .parse()
            .map_err(|_| malformed(path, line, "class label is not an integer"))?;
        if class_label == 0 {
            return Err(malformed(path, line, "class label must be at least 1"));
        }
        if let Some(n_classes) = n_classes
            && class_label > n_classes
        {
            return Err(malformed(path, line, "class label exceeds the class count"));
        }
        return Ok(ParsedNode::Leaf { class_label });
    }
    let feature = fields[1]
        .trim()
        .parse()
        .map_err(|_| malformed(path, line, "split index is not an integer"))?;
    let threshold = fields[2]
        .trim()
        .parse()
        .map_err(|_| malformed(path, line, "split value is not a number"))?;
    Ok(ParsedNode::Split {
        feature: FeatureIndex::new(feature),
        threshold,
    })
}

fn malformed(path: &Path, line: usize, reason: &str) -> RfError {
    RfError::MalformedTreeLine {
        path: path.to_path_buf(),
        line,
        reason: reason.to_string(),
    }
}
