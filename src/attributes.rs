//! Ordered attribute sets and index-keyed per-attribute maps.
//!
//! Predictions, labels, thresholds and loss weights are all indexed by the
//! position of the attribute in the [`AttributeSet`]. Names are only used for
//! lookup and for reporting.

use std::collections::HashMap;
use serde::{Serialize, Deserialize};

use crate::config::RunConfig;
use crate::error::{FaceAttrError, Result};

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_LOSS_WEIGHT: f32 = 1.0;

/// Canonical form of a configured attribute name.
pub fn attribute_name(raw: &str) -> &str {
    raw.trim()
}

/// A fixed-order mapping keyed by attribute index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrMap<T> {
    values: Vec<T>,
}

impl<T> AttrMap<T> {
    pub fn from_vec(values: Vec<T>) -> Self {
        AttrMap { values }
    }

    pub fn from_fn<F: FnMut(usize) -> T>(len: usize, f: F) -> Self {
        AttrMap { values: (0..len).map(f).collect() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.values.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.values.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> AttrMap<U> {
        AttrMap { values: self.values.iter().map(f).collect() }
    }
}

impl<T> std::ops::Index<usize> for AttrMap<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.values[index]
    }
}

/// One binary attribute with its decision boundary and loss weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub threshold: f32,
    pub loss_weight: f32,
}

/// The ordered attributes of one run.
#[derive(Debug, Clone)]
pub struct AttributeSet {
    attributes: Vec<Attribute>,
    by_name: HashMap<String, usize>,
}

impl AttributeSet {
    /// Build a set with default thresholds and weights.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        Self::with_parameters(names, &[], &[])
    }

    /// Build a set; empty `thresholds`/`weights` fall back to the defaults,
    /// otherwise both must hold exactly one value per attribute.
    pub fn with_parameters<S: AsRef<str>>(
        names: &[S],
        thresholds: &[f32],
        weights: &[f32],
    ) -> Result<Self> {
        if names.is_empty() {
            return Err(FaceAttrError::config("selected_attrs", "at least one attribute is required"));
        }
        check_per_attribute("attr_threshold", thresholds, names.len())?;
        check_per_attribute("attr_loss_weight", weights, names.len())?;

        let mut attributes = Vec::with_capacity(names.len());
        let mut by_name = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let name = attribute_name(name.as_ref());
            if name.is_empty() {
                return Err(FaceAttrError::config("selected_attrs", format!("attribute {} has an empty name", i)));
            }
            if by_name.insert(name.to_string(), i).is_some() {
                return Err(FaceAttrError::config("selected_attrs", format!("duplicate attribute '{}'", name)));
            }
            let threshold = thresholds.get(i).copied().unwrap_or(DEFAULT_THRESHOLD);
            let loss_weight = weights.get(i).copied().unwrap_or(DEFAULT_LOSS_WEIGHT);
            if !threshold.is_finite() {
                return Err(FaceAttrError::config("attr_threshold", format!("threshold for '{}' is not finite", name)));
            }
            if !loss_weight.is_finite() || loss_weight < 0.0 {
                return Err(FaceAttrError::config("attr_loss_weight", format!("weight for '{}' must be finite and non-negative", name)));
            }
            attributes.push(Attribute { name: name.to_string(), threshold, loss_weight });
        }

        Ok(AttributeSet { attributes, by_name })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Self::with_parameters(&config.selected_attrs, &config.attr_threshold, &config.attr_loss_weight)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index)
    }

    pub fn name(&self, index: usize) -> &str {
        &self.attributes[index].name
    }

    pub fn names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }

    pub fn thresholds(&self) -> AttrMap<f32> {
        AttrMap::from_vec(self.attributes.iter().map(|a| a.threshold).collect())
    }

    pub fn loss_weights(&self) -> AttrMap<f32> {
        AttrMap::from_vec(self.attributes.iter().map(|a| a.loss_weight).collect())
    }

    /// Pair every value of `map` with its attribute name.
    pub fn named<'a, T>(&'a self, map: &'a AttrMap<T>) -> impl Iterator<Item = (&'a str, &'a T)> + 'a {
        self.attributes.iter().map(|a| a.name.as_str()).zip(map.iter())
    }
}

fn check_per_attribute(field: &str, values: &[f32], expected: usize) -> Result<()> {
    if !values.is_empty() && values.len() != expected {
        return Err(FaceAttrError::config(
            field,
            format!("expected {} values (one per attribute), got {}", expected, values.len()),
        ));
    }
    Ok(())
}
