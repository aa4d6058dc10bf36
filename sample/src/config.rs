use crate::common::*;

pub use checkpoint::*;
pub use dataset::*;
pub use output::*;
pub use sampling::*;

pub static CONFIG_VERSION: Lazy<VersionReq> = Lazy::new(|| VersionReq::parse("0.1.0").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_version")]
    pub version: Version,
    pub checkpoint: CheckpointConfig,
    pub dataset: DatasetConfig,
    pub sampling: SamplingConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

mod checkpoint {
    use super::*;

    /// Trained model options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CheckpointConfig {
        /// TorchScript module exported from the training run.
        pub module_file: PathBuf,
        /// Category/predicate vocabulary of the checkpoint.
        pub vocab_file: PathBuf,
        /// Optional clustered appearance features; enables per-object
        /// feature sampling when set.
        pub features_file: Option<PathBuf>,
        /// The device where the model runs on.
        #[serde(with = "tch_serde::serde_device")]
        pub device: Device,
    }
}

mod dataset {
    use super::*;

    /// Dataset options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// Directory of pre-collated batch files.
        pub batch_dir: PathBuf,
        /// Optional cap on the number of evaluated images.
        pub num_samples: Option<usize>,
    }
}

mod sampling {
    use super::*;

    /// Ground-truth substitution toggles for the model call.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SamplingConfig {
        /// Condition the model on ground-truth boxes instead of
        /// letting it predict the layout.
        #[serde(default)]
        pub use_gt_boxes: bool,
        /// Feed ground-truth segmentation masks to the model.
        #[serde(default)]
        pub use_gt_masks: bool,
        /// Keep real attribute vectors; otherwise they are zeroed to
        /// ablate attribute conditioning.
        #[serde(default)]
        pub use_gt_attributes: bool,
        /// Ground-truth texture mode of the model.
        #[serde(default)]
        pub use_gt_textures: bool,
    }
}

mod output {
    use super::*;

    /// Artifact selection and destination.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OutputConfig {
        pub output_dir: PathBuf,
        #[serde(default)]
        pub save_gt_images: bool,
        #[serde(default)]
        pub save_graphs: bool,
        #[serde(default)]
        pub save_layouts: bool,
    }
}

pub fn deserialize_version<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    let version = Version::parse(&text).map_err(|err| {
        D::Error::custom(format!(
            "failed to parse version number '{}': {:?}",
            text, err
        ))
    })?;

    if !CONFIG_VERSION.matches(&version) {
        return Err(D::Error::custom(format!(
            "incompatible version: get '{}', but it is incompatible with requirement '{}'",
            version, &*CONFIG_VERSION,
        )));
    }

    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_json5() {
        let text = r#"
        {
            version: "0.1.0",
            checkpoint: {
                module_file: "checkpoint/model.pt",
                vocab_file: "checkpoint/vocab.json",
                device: "cpu",
            },
            dataset: {
                batch_dir: "batches",
                num_samples: 10000,
            },
            sampling: {
                use_gt_boxes: true,
            },
            output: {
                output_dir: "output",
                save_layouts: true,
            },
        }
        "#;
        let config: Config = json5::from_str(text).unwrap();
        assert_eq!(config.checkpoint.device, Device::Cpu);
        assert!(config.sampling.use_gt_boxes);
        assert!(!config.sampling.use_gt_masks);
        assert!(config.output.save_layouts);
        assert!(config.checkpoint.features_file.is_none());
    }

    #[test]
    fn config_rejects_incompatible_version() {
        let text = r#"{ version: "2.0.0" }"#;
        assert!(json5::from_str::<Config>(text).is_err());
    }
}
