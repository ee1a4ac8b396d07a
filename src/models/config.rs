//! Configuration model loaded from external sources.
//!
//! Every field has a built-in default so the tools run without any config
//! file. Values are layered: defaults, then an optional YAML file, then
//! `PROVENANCE_*` environment variables (`__` separates sections, e.g.
//! `PROVENANCE_FETCH__WAIT_TIME_SECS=2`).

use std::env;
use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::domain::image::REPRODUCTION_URL_COLUMN;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_PATH_VAR: &str = "PROVENANCE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "provenance.yaml";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
/// Configuration of all four tools.
pub struct AppConfig {
    pub harvest: HarvestConfig,
    pub fetch: FetchConfig,
    pub matching: MatchConfig,
    pub split: SplitConfig,
}

impl AppConfig {
    /// Loads the configuration from the file named by [`CONFIG_PATH_VAR`]
    /// (falling back to `provenance.yaml`) and the environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Loads the configuration from an explicit YAML path. A missing file is
    /// not an error.
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(File::new(path, FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix("PROVENANCE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
/// Settings of the archival metadata harvester.
pub struct HarvestConfig {
    pub base_url: String,
    pub database: String,
    pub limit: usize,
    pub start_from: usize,
    pub output_file: PathBuf,
    pub page_delay_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rce-bhg.adlibhosting.com/api.wo2/wwwopac.ashx".to_string(),
            database: "HerkomstNK".to_string(),
            limit: 50,
            start_from: 1,
            output_file: PathBuf::from("../HerkomstNK.xml"),
            page_delay_ms: 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
/// Settings of the CSV-driven image downloader.
pub struct FetchConfig {
    pub csv_file: PathBuf,
    pub download_folder: PathBuf,
    pub url_column: String,
    pub wait_time_secs: u64,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            csv_file: PathBuf::from("images_NK_rest20260129.csv"),
            download_folder: PathBuf::from("images_rest20260129"),
            url_column: REPRODUCTION_URL_COLUMN.to_string(),
            wait_time_secs: 1,
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
/// Settings of the embedding matcher.
pub struct MatchConfig {
    /// Model code of a fastembed image model.
    pub model: String,
    pub query_csv: PathBuf,
    pub candidate_dir: PathBuf,
    pub results_per_item: usize,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub template: PathBuf,
    pub index_template: PathBuf,
    pub asset_dir: PathBuf,
    pub source_url_prefix: String,
    /// Candidate link, `{base}` is replaced by the candidate base identifier.
    pub candidate_url_template: String,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            model: "nomic-ai/nomic-embed-vision-v1.5".to_string(),
            query_csv: PathBuf::from("NK_collectie/images_to_match.csv"),
            candidate_dir: PathBuf::from("DHM/DHM_images_split_yolo_detect"),
            results_per_item: 100,
            cache_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            template: PathBuf::from("templates/template.html"),
            index_template: PathBuf::from("templates/index_template.html"),
            asset_dir: PathBuf::from("templates"),
            source_url_prefix: "https://wo2.collectienederland.nl/doc/nk/".to_string(),
            candidate_url_template:
                "https://www.dhm.de/datenbank/ccp/dhm_ccp_add.php?seite=6&fld_1={base}&suchen=Suchen"
                    .to_string(),
        }
    }
}

impl MatchConfig {
    /// `{model_shortname}_{candidate_shortname}`, the key of the embedding cache.
    pub fn config_name(&self) -> String {
        let model_short = self.model.rsplit('/').next().unwrap_or(&self.model);
        let candidate_short = self
            .candidate_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{model_short}_{candidate_short}")
    }

    /// `{config_name}_{csv_shortname}`, the base name of every report file.
    pub fn html_name(&self) -> String {
        let csv_short = self
            .query_csv
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let csv_short = csv_short.split('.').next().unwrap_or_default();
        format!("{}_{csv_short}", self.config_name())
    }

    pub fn index_cache_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.usearch", self.config_name()))
    }

    pub fn mapping_cache_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.json", self.config_name()))
    }

    pub fn report_dir(&self) -> PathBuf {
        self.output_dir.join(self.html_name())
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    Train,
    #[default]
    Predict,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
/// Settings of the contact-sheet splitter.
pub struct SplitConfig {
    pub mode: SplitMode,
    /// ONNX export of the trained detector.
    pub model_path: PathBuf,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub training_yaml: PathBuf,
    pub base_model: String,
    pub epochs: u32,
    pub image_size: u32,
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
    pub trainer_command: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            mode: SplitMode::Predict,
            model_path: PathBuf::from("runs/detect/train3/weights/best.onnx"),
            input_folder: PathBuf::from("DHM/DHM_images"),
            output_folder: PathBuf::from("DHM/DHM_images_split_yolo"),
            training_yaml: PathBuf::from("DHM/test/input/training_yolo/data.yaml"),
            base_model: "yolov8n.pt".to_string(),
            epochs: 50,
            image_size: 640,
            confidence: 0.5,
            iou: 0.7,
            max_detections: 300,
            trainer_command: "yolo".to_string(),
        }
    }
}
