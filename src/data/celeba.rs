//! CelebA-layout dataset: an attribute list file plus an image directory.
//!
//! `list_attr_celeba.txt` holds the sample count on its first line, the
//! attribute names on the second, then one `file v1 v2 ...` row per image with
//! values in {-1, 1}. Splits come from `list_eval_partition.txt` (`file 0|1|2`)
//! when configured, otherwise from file order: 80% train, 10% validate, 10% test.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::attributes::attribute_name;
use crate::config::RunConfig;
use crate::error::{FaceAttrError, Result};
use super::{Batch, Batches, DataSource, ImageTransform, Split};

#[derive(Debug, Clone)]
struct Entry {
    file: String,
    labels: Vec<f32>,
}

#[derive(Debug, Clone)]
struct CelebAIndex {
    entries: Vec<Entry>,
    splits: HashMap<Split, Vec<usize>>,
}

impl CelebAIndex {
    fn load(attr_path: &Path, partition_path: Option<&Path>, selected_attrs: &[String]) -> Result<Self> {
        let text = fs::read_to_string(attr_path)
            .map_err(|e| FaceAttrError::Dataset(format!("cannot read {}: {}", attr_path.display(), e)))?;
        let entries = parse_attribute_file(&text, selected_attrs)?;

        let splits = match partition_path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| FaceAttrError::Dataset(format!("cannot read {}: {}", path.display(), e)))?;
                split_by_partition(&entries, &parse_partition_file(&text)?)
            }
            None => split_by_order(entries.len()),
        };

        Ok(CelebAIndex { entries, splits })
    }

    fn indices(&self, split: Split) -> &[usize] {
        let split = if split == Split::Predict { Split::Test } else { split };
        self.splits.get(&split).map(Vec::as_slice).unwrap_or(&[])
    }
}

enum IndexState {
    Unloaded,
    Loaded(CelebAIndex),
}

/// Reads CelebA images from disk, one batch at a time.
pub struct CelebADataSource {
    image_dir: PathBuf,
    attr_path: PathBuf,
    partition_path: Option<PathBuf>,
    selected_attrs: Vec<String>,
    image_size: [u32; 2],
    rng: StdRng,
    index: IndexState,
}

impl CelebADataSource {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(image_dir: P, attr_path: Q, selected_attrs: Vec<String>) -> Self {
        CelebADataSource {
            image_dir: image_dir.into(),
            attr_path: attr_path.into(),
            partition_path: None,
            selected_attrs: selected_attrs.iter().map(|name| attribute_name(name).to_string()).collect(),
            image_size: [64, 64],
            rng: StdRng::from_entropy(),
            index: IndexState::Unloaded,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        let mut source = Self::new(config.image_dir.clone(), config.attr_path.clone(), config.selected_attrs.clone())
            .with_image_size(config.image_size);
        if let Some(partition) = &config.partition_path {
            source = source.with_partition_file(partition.clone());
        }
        if let Some(seed) = config.seed {
            source = source.with_seed(seed);
        }
        source
    }

    pub fn with_partition_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.partition_path = Some(path.into());
        self
    }

    pub fn with_image_size(mut self, image_size: [u32; 2]) -> Self {
        self.image_size = image_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.index, IndexState::Loaded(_))
    }

    /// Parse the attribute (and partition) files on first use.
    fn ensure_loaded(&mut self) -> Result<()> {
        if let IndexState::Unloaded = self.index {
            let index = CelebAIndex::load(&self.attr_path, self.partition_path.as_deref(), &self.selected_attrs)?;
            info!(
                samples = index.entries.len(),
                train = index.indices(Split::Train).len(),
                validate = index.indices(Split::Validate).len(),
                test = index.indices(Split::Test).len(),
                "loaded attribute index from {}",
                self.attr_path.display()
            );
            self.index = IndexState::Loaded(index);
        }
        Ok(())
    }

    fn index(&self) -> Result<&CelebAIndex> {
        match &self.index {
            IndexState::Loaded(index) => Ok(index),
            IndexState::Unloaded => Err(FaceAttrError::Dataset("attribute index is not loaded".to_string())),
        }
    }
}

impl DataSource for CelebADataSource {
    fn len(&mut self, split: Split) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.index()?.indices(split).len())
    }

    fn batches(&mut self, split: Split, batch_size: usize) -> Result<Batches<'_>> {
        if batch_size == 0 {
            return Err(FaceAttrError::config("batch_size", "must be at least 1"));
        }
        self.ensure_loaded()?;

        let CelebADataSource { index, rng, image_dir, image_size, .. } = self;
        let index = match index {
            IndexState::Loaded(index) => &*index,
            IndexState::Unloaded => return Err(FaceAttrError::Dataset("attribute index is not loaded".to_string())),
        };

        let mut order = index.indices(split).to_vec();
        if split == Split::Train {
            order.shuffle(rng);
        }
        debug!(split = %split, samples = order.len(), "iterating split");

        let transform = ImageTransform::for_split(split, *image_size);
        let image_dir: &Path = image_dir;
        let chunks: Vec<Vec<usize>> = order.chunks(batch_size).map(<[usize]>::to_vec).collect();
        let iter = chunks.into_iter().map(move |chunk| {
            let num_attrs = index.entries.first().map_or(0, |e| e.labels.len());
            let mut images = Array2::zeros((chunk.len(), transform.output_dim()));
            let mut labels = Array2::zeros((chunk.len(), num_attrs));
            for (row, &i) in chunk.iter().enumerate() {
                let entry = &index.entries[i];
                let path = image_dir.join(&entry.file);
                let image = image::open(&path)
                    .map_err(|e| FaceAttrError::ImageError(format!("{}: {}", path.display(), e)))?;
                images.row_mut(row).assign(&transform.apply(&image, rng));
                for (j, &value) in entry.labels.iter().enumerate() {
                    labels[[row, j]] = value;
                }
            }
            Batch::new(images, labels)
        });
        Ok(Box::new(iter))
    }
}

/// Parse `list_attr_celeba.txt`, keeping the selected columns in the given order.
fn parse_attribute_file(text: &str, selected_attrs: &[String]) -> Result<Vec<Entry>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let declared: usize = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(|| FaceAttrError::Dataset("attribute file must start with the sample count".to_string()))?;
    let header: Vec<&str> = lines
        .next()
        .map(|l| l.split_whitespace().collect())
        .ok_or_else(|| FaceAttrError::Dataset("attribute file has no header line".to_string()))?;

    let columns = selected_attrs
        .iter()
        .map(|name| {
            header
                .iter()
                .position(|h| *h == name.as_str())
                .ok_or_else(|| FaceAttrError::Dataset(format!("attribute '{}' not found in attribute file header", name)))
        })
        .collect::<Result<Vec<usize>>>()?;

    let mut entries = Vec::with_capacity(declared);
    for (line_no, line) in lines.enumerate() {
        let mut tokens = line.split_whitespace();
        let file = match tokens.next() {
            Some(file) => file.to_string(),
            None => continue,
        };
        let values: Vec<&str> = tokens.collect();
        if values.len() != header.len() {
            return Err(FaceAttrError::Dataset(format!(
                "row {} ({}): expected {} values, got {}",
                line_no + 3,
                file,
                header.len(),
                values.len()
            )));
        }
        let labels = columns
            .iter()
            .map(|&c| match values[c] {
                "1" => Ok(1.0),
                "-1" | "0" => Ok(0.0),
                other => Err(FaceAttrError::Dataset(format!("row {} ({}): invalid label '{}'", line_no + 3, file, other))),
            })
            .collect::<Result<Vec<f32>>>()?;
        entries.push(Entry { file, labels });
    }

    if entries.len() != declared {
        warn!(declared, found = entries.len(), "attribute file sample count does not match its rows");
    }
    Ok(entries)
}

fn parse_partition_file(text: &str) -> Result<HashMap<String, Split>> {
    let mut partition = HashMap::new();
    for (line_no, line) in text.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        let (file, part) = match (tokens.next(), tokens.next()) {
            (Some(file), Some(part)) => (file, part),
            (None, _) => continue,
            (Some(_), None) => {
                return Err(FaceAttrError::Dataset(format!("partition row {}: missing partition id", line_no + 1)))
            }
        };
        let split = match part {
            "0" => Split::Train,
            "1" => Split::Validate,
            "2" => Split::Test,
            other => {
                return Err(FaceAttrError::Dataset(format!("partition row {}: unknown partition '{}'", line_no + 1, other)))
            }
        };
        partition.insert(file.to_string(), split);
    }
    Ok(partition)
}

fn split_by_partition(entries: &[Entry], partition: &HashMap<String, Split>) -> HashMap<Split, Vec<usize>> {
    let mut splits: HashMap<Split, Vec<usize>> = HashMap::new();
    let mut unassigned = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        match partition.get(&entry.file) {
            Some(split) => splits.entry(*split).or_default().push(i),
            None => unassigned += 1,
        }
    }
    if unassigned > 0 {
        warn!(unassigned, "samples missing from the partition file are ignored");
    }
    splits
}

fn split_by_order(n: usize) -> HashMap<Split, Vec<usize>> {
    let train_end = n * 8 / 10;
    let validate_end = train_end + n / 10;
    let mut splits = HashMap::new();
    splits.insert(Split::Train, (0..train_end).collect());
    splits.insert(Split::Validate, (train_end..validate_end).collect());
    splits.insert(Split::Test, (validate_end..n).collect());
    splits
}
