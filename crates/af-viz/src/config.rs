use serde::{Deserialize, Serialize};

/// Rendering options (YAML `plot:` section or programmatic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Figure width in points.
    pub width: f64,
    /// Figure height in points.
    pub height: f64,
    pub label_size: f64,
    pub tick_size: f64,
    /// Stack palette name (`cms_petroff10`, `cms_petroff6`, `tableau10`).
    pub palette: String,
    /// Draw a data/MC ratio panel when data is present.
    pub ratio: bool,
    pub experiment: ExperimentConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 432.0,
            height: 432.0,
            label_size: 11.0,
            tick_size: 8.5,
            palette: "cms_petroff10".into(),
            ratio: true,
            experiment: ExperimentConfig::default(),
        }
    }
}

/// Header label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub name: String,
    pub status: String,
    pub lumi_fb_inv: f64,
    pub sqrt_s_tev: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self { name: "CMS".into(), status: "Preliminary".into(), lumi_fb_inv: 26.7, sqrt_s_tev: 13.6 }
    }
}
