//! Content templates
//!
//! The content collaborator owns which stitches exist and where they start.
//! The scheduler only asks it for a default layout per (learner, tube) at
//! initialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{LogicalPosition, StitchId, TubeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEntry {
    pub position: LogicalPosition,
    pub stitch_id: StitchId,
}

/// Initial placement of stitches in one tube
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultLayout {
    pub entries: Vec<LayoutEntry>,
}

impl DefaultLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the given stitches at logical positions 1, 2, 3, ...
    pub fn sequential<I, S>(stitches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StitchId>,
    {
        let entries = stitches
            .into_iter()
            .zip(1..)
            .map(|(stitch, position)| LayoutEntry {
                position,
                stitch_id: stitch.into(),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayoutEntry> {
        self.entries.iter()
    }
}

impl<S: Into<StitchId>> FromIterator<(LogicalPosition, S)> for DefaultLayout {
    fn from_iter<T: IntoIterator<Item = (LogicalPosition, S)>>(iter: T) -> Self {
        let entries = iter
            .into_iter()
            .map(|(position, stitch)| LayoutEntry {
                position,
                stitch_id: stitch.into(),
            })
            .collect();
        Self { entries }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("no default layout for {tube}")]
    MissingTube { tube: TubeId },
    #[error("template source unavailable: {0}")]
    Unavailable(String),
}

pub trait TemplateProvider: Send + Sync {
    fn default_layout(&self, learner_id: &str, tube: TubeId) -> Result<DefaultLayout, TemplateError>;
}

/// Fixed per-tube layouts shared by every learner
#[derive(Debug, Clone, Default)]
pub struct StaticTemplateProvider {
    layouts: HashMap<TubeId, DefaultLayout>,
}

impl StaticTemplateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tube(mut self, tube: TubeId, layout: DefaultLayout) -> Self {
        self.layouts.insert(tube, layout);
        self
    }
}

impl TemplateProvider for StaticTemplateProvider {
    fn default_layout(&self, _learner_id: &str, tube: TubeId) -> Result<DefaultLayout, TemplateError> {
        self.layouts
            .get(&tube)
            .cloned()
            .ok_or(TemplateError::MissingTube { tube })
    }
}

/// Generates `units_per_tube` stitches per tube named `t{tube}-0001-{n:04}`
#[derive(Debug, Clone, Copy)]
pub struct SequentialTemplateProvider {
    units_per_tube: usize,
}

impl SequentialTemplateProvider {
    pub fn new(units_per_tube: usize) -> Self {
        Self { units_per_tube }
    }

    pub fn stitch_id(tube: TubeId, ordinal: usize) -> StitchId {
        StitchId::new(format!("t{}-0001-{:04}", tube.index() + 1, ordinal))
    }
}

impl TemplateProvider for SequentialTemplateProvider {
    fn default_layout(&self, _learner_id: &str, tube: TubeId) -> Result<DefaultLayout, TemplateError> {
        Ok(DefaultLayout::sequential(
            (1..=self.units_per_tube).map(|n| Self::stitch_id(tube, n)),
        ))
    }
}
