use crate::VisionError;
use image::GrayImage;
use ow_capture::RegionSpec;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Reference image for one region, pre-processed for correlation
#[derive(Debug, Clone)]
pub struct Template {
    gray: GrayImage,
    /// Binarized mask, same size as `gray`
    mask: Option<Vec<bool>>,
    /// Template pixels minus their (masked) mean; zero outside the mask
    centered: Vec<f64>,
    /// Sum of squares of `centered`
    energy: f64,
    /// Number of pixels the mask keeps
    active: usize,
}

impl Template {
    /// Pre-compute the zero-mean template. A template with no contrast under its
    /// mask can never correlate with anything and is rejected.
    pub fn new(name: &str, gray: GrayImage, mask: Option<&GrayImage>) -> Result<Self, VisionError> {
        let malformed = |reason: String| VisionError::MalformedTemplate {
            name: name.to_string(),
            reason,
        };

        if gray.width() == 0 || gray.height() == 0 {
            return Err(malformed("empty image".to_string()));
        }

        let mask = match mask {
            Some(m) => {
                if m.dimensions() != gray.dimensions() {
                    return Err(malformed(format!(
                        "mask is {:?} but template is {:?}",
                        m.dimensions(),
                        gray.dimensions()
                    )));
                }
                Some(m.pixels().map(|p| p[0] > 0).collect::<Vec<_>>())
            }
            None => None,
        };

        let keep = |i: usize| mask.as_ref().map_or(true, |m| m[i]);

        let (sum, active) = gray
            .pixels()
            .enumerate()
            .filter(|(i, _)| keep(*i))
            .fold((0.0, 0usize), |(s, n), (_, p)| (s + p[0] as f64, n + 1));
        if active == 0 {
            return Err(malformed("mask excludes every pixel".to_string()));
        }
        let mean = sum / active as f64;

        let centered: Vec<f64> = gray
            .pixels()
            .enumerate()
            .map(|(i, p)| if keep(i) { p[0] as f64 - mean } else { 0.0 })
            .collect();
        let energy: f64 = centered.iter().map(|c| c * c).sum();
        if energy < 1e-10 {
            return Err(malformed("no contrast".to_string()));
        }

        Ok(Self {
            gray,
            mask,
            centered,
            energy,
            active,
        })
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    pub(crate) fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    pub(crate) fn centered(&self) -> &[f64] {
        &self.centered
    }

    pub(crate) fn energy(&self) -> f64 {
        self.energy
    }

    pub(crate) fn active(&self) -> usize {
        self.active
    }
}

/// Every reference image the matcher needs, keyed by region name
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<String, Template>,
}

impl TemplateStore {
    /// Load `t_<name>.png` (and `m_<name>.png` for masked regions) for every spec.
    ///
    /// Any missing or unreadable image is an error: the tracker cannot run
    /// with holes in its template set.
    pub fn load(data_dir: &Path, specs: &[RegionSpec]) -> Result<Self, VisionError> {
        let mut store = Self::default();

        for spec in specs {
            let gray = load_gray(data_dir, &format!("t_{}.png", spec.name), spec.name)?;
            let mask = if spec.masked {
                Some(load_gray(data_dir, &format!("m_{}.png", spec.name), spec.name)?)
            } else {
                None
            };
            let template = Template::new(spec.name, gray, mask.as_ref())?;
            debug!(
                "Loaded template {} ({}x{}{})",
                spec.name,
                template.width(),
                template.height(),
                if template.is_masked() { ", masked" } else { "" }
            );
            store.templates.insert(spec.name.to_string(), template);
        }

        info!(
            "TemplateStore loaded {} templates from {}",
            store.templates.len(),
            data_dir.display()
        );
        Ok(store)
    }

    pub fn insert(&mut self, name: &str, template: Template) {
        self.templates.insert(name.to_string(), template);
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

fn load_gray(data_dir: &Path, file: &str, name: &str) -> Result<GrayImage, VisionError> {
    let path = data_dir.join(file);
    if !path.exists() {
        return Err(VisionError::MissingTemplate {
            name: name.to_string(),
            path,
        });
    }
    image::open(&path)
        .map(|img| img.to_luma8())
        .map_err(|e| VisionError::MalformedTemplate {
            name: name.to_string(),
            reason: e.to_string(),
        })
}
