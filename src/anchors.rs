use crate::{Errors, BOX_SIZE};
use anyhow::Result;
use log::debug;
use once_cell::sync::Lazy;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

/// Number of anchors of the SSD MobileNet v2 (COCO) model
pub const SSD_MOBILENET_V2_DETECTION_MAX: usize = 1917;

static SSD_MOBILENET_V2_ANCHORS: Lazy<Arc<AnchorTable>> =
    Lazy::new(|| Arc::new(SsdAnchorGenerator::default().generate()));

/// The generated SSD MobileNet v2 anchor table, shared between all the users
///
pub fn ssd_mobilenet_v2_anchors() -> Arc<AnchorTable> {
    SSD_MOBILENET_V2_ANCHORS.clone()
}

/// Box prior (anchor) in the normalized center form
///
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct AnchorPrior {
    /// center y
    pub y: f32,
    /// center x
    pub x: f32,
    /// height scale
    pub h: f32,
    /// width scale
    pub w: f32,
}

impl AnchorPrior {
    pub fn new(y: f32, x: f32, h: f32, w: f32) -> Self {
        Self { y, x, h, w }
    }
}

/// The fixed table of anchors the model was exported with
///
#[derive(Clone, Default, Debug, PartialEq)]
pub struct AnchorTable {
    priors: Vec<AnchorPrior>,
}

impl From<Vec<AnchorPrior>> for AnchorTable {
    fn from(priors: Vec<AnchorPrior>) -> Self {
        Self { priors }
    }
}

impl AnchorTable {
    /// Loads the box-prior text file
    ///
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let table = Self::from_reader(File::open(path)?)?;
        debug!("Loaded {} box priors from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parses the box-prior text format
    ///
    /// The data consists of `BOX_SIZE` lines: center-y, center-x, height and width. Every line
    /// holds one whitespace-separated value per anchor. Lines after the fourth are ignored.
    ///
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(BOX_SIZE);
        for (row, line) in BufReader::new(reader).lines().take(BOX_SIZE).enumerate() {
            let values = line?
                .split_whitespace()
                .map(|token| {
                    token.parse::<f32>().map_err(|e| {
                        Errors::AnchorFormat(format!(
                            "row {}: unable to parse `{}`: {}",
                            row, token, e
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            if values.is_empty() {
                return Err(Errors::AnchorFormat(format!("row {} is empty", row)).into());
            }
            rows.push(values);
        }

        if rows.len() != BOX_SIZE {
            return Err(Errors::AnchorFormat(format!(
                "{} rows found while {} are expected",
                rows.len(),
                BOX_SIZE
            ))
            .into());
        }

        let columns = rows[0].len();
        if let Some((row, values)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns) {
            return Err(Errors::AnchorFormat(format!(
                "row {} has {} values while row 0 has {}",
                row,
                values.len(),
                columns
            ))
            .into());
        }

        let priors = (0..columns)
            .map(|d| AnchorPrior::new(rows[0][d], rows[1][d], rows[2][d], rows[3][d]))
            .collect();

        Ok(Self { priors })
    }

    pub fn len(&self) -> usize {
        self.priors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AnchorPrior> {
        self.priors.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnchorPrior> {
        self.priors.iter()
    }

    pub fn priors(&self) -> &[AnchorPrior] {
        &self.priors
    }
}

/// Multiple-grid anchor generator of the SSD family
///
/// The defaults produce the 1917 priors of SSD MobileNet v2 with 300x300 input.
///
#[derive(Clone, Debug)]
pub struct SsdAnchorGenerator {
    feature_maps: Vec<usize>,
    min_scale: f32,
    max_scale: f32,
    aspect_ratios: Vec<f32>,
    interpolated_scale_aspect_ratio: Option<f32>,
    reduce_boxes_in_lowest_layer: bool,
}

impl Default for SsdAnchorGenerator {
    fn default() -> Self {
        Self {
            feature_maps: vec![19, 10, 5, 3, 2, 1],
            min_scale: 0.2,
            max_scale: 0.95,
            aspect_ratios: vec![1.0, 2.0, 0.5, 3.0, 0.3333],
            interpolated_scale_aspect_ratio: Some(1.0),
            reduce_boxes_in_lowest_layer: true,
        }
    }
}

impl SsdAnchorGenerator {
    /// Square feature map sizes, one per layer
    ///
    pub fn feature_maps(mut self, sizes: Vec<usize>) -> Self {
        assert!(
            !sizes.is_empty() && sizes.iter().all(|s| *s > 0),
            "Feature map sizes must be positive numbers"
        );
        self.feature_maps = sizes;
        self
    }

    /// Scales of the lowest and the highest layers; the other layers are interpolated linearly
    ///
    pub fn scales(mut self, min_scale: f32, max_scale: f32) -> Self {
        assert!(min_scale > 0.0 && min_scale <= max_scale);
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    pub fn aspect_ratios(mut self, ratios: Vec<f32>) -> Self {
        assert!(ratios.iter().all(|r| *r > 0.0));
        self.aspect_ratios = ratios;
        self
    }

    /// Adds one more box per location with the scale `sqrt(s_i * s_(i+1))`
    ///
    pub fn interpolated_scale_aspect_ratio(mut self, ratio: Option<f32>) -> Self {
        self.interpolated_scale_aspect_ratio = ratio;
        self
    }

    /// Uses only three boxes in the lowest layer: `(0.1, 1.0)`, `(s0, 2.0)` and `(s0, 0.5)`
    ///
    pub fn reduce_boxes_in_lowest_layer(mut self, reduce: bool) -> Self {
        self.reduce_boxes_in_lowest_layer = reduce;
        self
    }

    fn layer_scales(&self) -> Vec<f32> {
        let layers = self.feature_maps.len();
        let mut scales = (0..layers)
            .map(|i| {
                if layers == 1 {
                    self.min_scale
                } else {
                    self.min_scale
                        + (self.max_scale - self.min_scale) * i as f32 / (layers - 1) as f32
                }
            })
            .collect::<Vec<_>>();
        scales.push(1.0);
        scales
    }

    fn layer_box_specs(&self, layer: usize, scale: f32, scale_next: f32) -> Vec<(f32, f32)> {
        if layer == 0 && self.reduce_boxes_in_lowest_layer {
            return vec![(0.1, 1.0), (scale, 2.0), (scale, 0.5)];
        }

        let mut specs = self
            .aspect_ratios
            .iter()
            .map(|ar| (scale, *ar))
            .collect::<Vec<_>>();

        if let Some(ar) = self.interpolated_scale_aspect_ratio {
            specs.push(((scale * scale_next).sqrt(), ar));
        }
        specs
    }

    pub fn generate(&self) -> AnchorTable {
        let scales = self.layer_scales();
        let mut priors = Vec::default();

        for (layer, fmap) in self.feature_maps.iter().enumerate() {
            let specs = self.layer_box_specs(layer, scales[layer], scales[layer + 1]);
            let stride = 1.0 / *fmap as f32;
            for row in 0..*fmap {
                let y = (row as f32 + 0.5) * stride;
                for col in 0..*fmap {
                    let x = (col as f32 + 0.5) * stride;
                    for (scale, ar) in &specs {
                        let ratio_sqrt = ar.sqrt();
                        priors.push(AnchorPrior::new(
                            y,
                            x,
                            scale / ratio_sqrt,
                            scale * ratio_sqrt,
                        ));
                    }
                }
            }
        }

        AnchorTable::from(priors)
    }
}
