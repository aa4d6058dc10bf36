//! Batched scene-graph sampling and evaluation.
//!
//! Runs a pretrained scene-to-image model over a dataset of flattened
//! scene-graph batches, compares predicted layouts against ground
//! truth, and persists per-image artifacts.

pub mod adapter;
pub mod artifacts;
pub mod colorize;
mod common;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod vis;
pub mod vocab;

use crate::{
    adapter::{InvocationOptions, ModelAdapter},
    artifacts::{ArtifactDirs, ArtifactWriter, ImageArtifacts, ImageSink, TchImageSink},
    colorize::{imagenet_deprocess_batch, layout_to_rgb},
    common::*,
    config::{Config, OutputConfig},
    dataset::{BatchSource, DirectoryBatchSource, SceneBatch},
    features::FeatureBank,
    metrics::{jaccard, IouAccumulator, IouSummary},
    model::{SceneModel, TorchScriptModel},
    vis::draw_scene_graph,
    vocab::Vocab,
};

pub fn start(config: Arc<Config>) -> Result<IouSummary> {
    let Config {
        checkpoint,
        dataset,
        sampling,
        output,
        ..
    } = &*config;

    let vocab = Vocab::open(&checkpoint.vocab_file)
        .with_context(|| format!("failed to load vocab '{}'", checkpoint.vocab_file.display()))?;
    info!(
        "loaded vocabulary with {} object categories",
        vocab.num_object_categories()
    );

    let model = TorchScriptModel::load(&checkpoint.module_file, checkpoint.device)?;
    info!("loaded model from '{}'", checkpoint.module_file.display());

    // a configuration error; surfaced before any batch is fetched
    let features = checkpoint
        .features_file
        .as_ref()
        .map(FeatureBank::load)
        .transpose()?;
    let adapter = ModelAdapter::new(model, InvocationOptions::from(sampling), features);

    let mut source =
        DirectoryBatchSource::new(&dataset.batch_dir, dataset.num_samples, checkpoint.device)?;
    let dirs = ArtifactDirs::prepare(output)?;
    let mut writer = ArtifactWriter::new(dirs, TchImageSink);
    let mut rng = StdRng::from_entropy();

    let summary = tch::no_grad(|| {
        run_pipeline(&adapter, &mut source, &mut writer, &vocab, output, &mut rng)
    })?;
    info!("evaluated {} images", writer.images_written());
    Ok(summary)
}

/// The strict batch-sequential dataset pass: invoke the model, update
/// the running metrics, split predicted and ground-truth tensors back
/// into per-image slices, and write artifacts. Any failure aborts the
/// whole pass.
pub fn run_pipeline<M, S, K, R>(
    adapter: &ModelAdapter<M>,
    source: &mut S,
    writer: &mut ArtifactWriter<K>,
    vocab: &Vocab,
    output: &OutputConfig,
    rng: &mut R,
) -> Result<IouSummary>
where
    M: SceneModel,
    S: BatchSource,
    K: ImageSink,
    R: Rng,
{
    let num_categories = vocab.num_object_categories() as i64;
    let palette = Tensor::randint(256, &[num_categories, 3], FLOAT_CPU);
    let mut accumulator = IouAccumulator::new();

    while let Some(batch) = source.next_batch()? {
        let SceneBatch { images, graphs } = batch;

        let model_out = adapter.run_batch(&images, &graphs, rng)?;
        accumulator.update(jaccard(&model_out.boxes, &graphs.boxes)?);

        let images_gt = imagenet_deprocess_batch(&images)?.to_device(Device::Cpu);
        let images_pred = imagenet_deprocess_batch(&model_out.images)?.to_device(Device::Cpu);

        let mut pred_group = vec![
            graphs.objs.shallow_clone(),
            model_out.boxes.shallow_clone(),
        ];
        if let Some(masks) = &model_out.masks {
            pred_group.push(masks.shallow_clone());
        }
        let pred_split = split_graph_batch(
            &graphs.triples,
            &pred_group,
            &graphs.obj_to_img,
            &graphs.triple_to_img,
        )?;

        // ground-truth tensors split independently; mask presence may
        // differ from the predicted group
        let mut gt_group = vec![graphs.boxes.shallow_clone()];
        if let Some(masks) = &graphs.masks {
            gt_group.push(masks.shallow_clone());
        }
        let gt_split = split_graph_batch(
            &graphs.triples,
            &gt_group,
            &graphs.obj_to_img,
            &graphs.triple_to_img,
        )?;
        debug!(
            "split {} predicted and {} ground-truth sub-graphs",
            pred_split.num_images(),
            gt_split.num_images()
        );

        let layouts = if output.save_layouts {
            Some(layout_to_rgb(&model_out.layout, &palette, num_categories)?.to_device(Device::Cpu))
        } else {
            None
        };

        for (&image_id, objs, triples) in izip!(
            &pred_split.image_ids,
            &pred_split.obj_data[0],
            &pred_split.triples
        ) {
            debug!(
                "image {}: objects {:?}",
                writer.images_written(),
                vocab.object_names(objs)?
            );

            let graph = if output.save_graphs {
                Some(draw_scene_graph(objs, triples, vocab, &palette)?)
            } else {
                None
            };
            let gt_image = if output.save_gt_images {
                Some(images_gt.i(image_id))
            } else {
                None
            };
            let layout = layouts
                .as_ref()
                .map(|layouts| layouts.i(image_id).to_kind(Kind::Uint8));
            let image = images_pred.i(image_id);

            writer.write(&ImageArtifacts {
                image: &image,
                gt_image: gt_image.as_ref(),
                graph: graph.as_ref(),
                layout: layout.as_ref(),
            })?;
        }

        info!("saved {} images", writer.images_written());
    }

    let summary = accumulator.summarize()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::SampleError,
        model::{ModelInput, ModelOutput},
    };
    use approx::abs_diff_eq;
    use std::sync::Mutex;

    /// Predicts exactly the ground-truth boxes it is conditioned on.
    struct EchoModel;

    impl SceneModel for EchoModel {
        fn generate(&self, input: &ModelInput) -> Result<ModelOutput, SampleError> {
            let boxes = input
                .boxes_gt
                .as_ref()
                .expect("the adapter always supplies gt boxes")
                .shallow_clone();
            let (batch_size, _, height, width) = input.images.size4()?;
            Ok(ModelOutput {
                images: Tensor::zeros(&[batch_size, 3, height, width], FLOAT_CPU),
                boxes,
                masks: None,
                layout: Tensor::ones(&[batch_size, 4, height, width], FLOAT_CPU),
            })
        }
    }

    struct VecSource {
        batches: std::vec::IntoIter<SceneBatch>,
    }

    impl BatchSource for VecSource {
        fn next_batch(&mut self) -> Result<Option<SceneBatch>> {
            Ok(self.batches.next())
        }
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        paths: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl ImageSink for RecordingSink {
        fn save(&self, _image: &Tensor, path: &Path) -> Result<()> {
            self.paths.lock().unwrap().push(path.to_owned());
            Ok(())
        }
    }

    fn vocab() -> Vocab {
        Vocab {
            object_idx_to_name: vec!["cat".into(), "table".into(), "dog".into()],
            pred_idx_to_name: vec!["left of".into(), "above".into()],
        }
    }

    fn scenario_batches() -> Vec<SceneBatch> {
        // image 0: [cat, table], image 1: [dog]
        let first = SceneBatch {
            images: Tensor::zeros(&[2, 3, 8, 8], FLOAT_CPU),
            graphs: FlatGraphBatch::new(
                Tensor::of_slice(&[0i64, 1, 2]),
                Tensor::of_slice(&[
                    0.0f32, 0.0, 10.0, 10.0, //
                    5.0, 5.0, 15.0, 15.0, //
                    2.0, 2.0, 8.0, 8.0, //
                ])
                .view([3, 4]),
                None,
                Tensor::of_slice(&[0i64, 0, 1]).view([1, 3]),
                Tensor::of_slice(&[0i64, 0, 1]),
                Tensor::of_slice(&[0i64]),
                None,
            )
            .unwrap(),
        };
        let second = SceneBatch {
            images: Tensor::zeros(&[1, 3, 8, 8], FLOAT_CPU),
            graphs: FlatGraphBatch::new(
                Tensor::of_slice(&[2i64]),
                Tensor::of_slice(&[1.0f32, 1.0, 4.0, 4.0]).view([1, 4]),
                None,
                Tensor::of_slice::<i64>(&[]).view([0, 3]),
                Tensor::of_slice(&[0i64]),
                Tensor::of_slice::<i64>(&[]),
                None,
            )
            .unwrap(),
        };
        vec![first, second]
    }

    fn output_config(save_all: bool) -> OutputConfig {
        OutputConfig {
            output_dir: PathBuf::from("out"),
            save_gt_images: save_all,
            save_graphs: save_all,
            save_layouts: save_all,
        }
    }

    fn recording_writer(save_all: bool) -> (ArtifactWriter<RecordingSink>, Arc<Mutex<Vec<PathBuf>>>) {
        let paths = Arc::new(Mutex::new(vec![]));
        let sink = RecordingSink {
            paths: paths.clone(),
        };
        let dirs = ArtifactDirs {
            images: PathBuf::from("out/images"),
            gt_images: save_all.then(|| PathBuf::from("out/images_gt")),
            graphs: save_all.then(|| PathBuf::from("out/graphs")),
            layouts: save_all.then(|| PathBuf::from("out/layouts")),
        };
        (ArtifactWriter::new(dirs, sink), paths)
    }

    #[test]
    fn perfect_prediction_yields_unit_metrics() {
        let adapter = ModelAdapter::new(EchoModel, InvocationOptions::default(), None);
        let mut source = VecSource {
            batches: scenario_batches().into_iter(),
        };
        let (mut writer, _paths) = recording_writer(false);
        let mut rng = StdRng::seed_from_u64(0);

        let summary = run_pipeline(
            &adapter,
            &mut source,
            &mut writer,
            &vocab(),
            &output_config(false),
            &mut rng,
        )
        .unwrap();

        assert!(abs_diff_eq!(summary.mean_iou, 1.0, epsilon = 1e-6));
        assert!(abs_diff_eq!(summary.recall_at_05, 1.0, epsilon = 1e-6));
        assert!(abs_diff_eq!(summary.recall_at_03, 1.0, epsilon = 1e-6));
        assert_eq!(writer.images_written(), 3);
    }

    #[test]
    fn all_artifacts_written_per_image() {
        let adapter = ModelAdapter::new(EchoModel, InvocationOptions::default(), None);
        let mut source = VecSource {
            batches: scenario_batches().into_iter(),
        };
        let (mut writer, paths) = recording_writer(true);
        let mut rng = StdRng::seed_from_u64(0);

        run_pipeline(
            &adapter,
            &mut source,
            &mut writer,
            &vocab(),
            &output_config(true),
            &mut rng,
        )
        .unwrap();

        let paths = paths.lock().unwrap();
        // 3 images, 4 artifact kinds each
        assert_eq!(paths.len(), 12);
        assert!(paths.contains(&PathBuf::from("out/images/0002.png")));
        assert!(paths.contains(&PathBuf::from("out/layouts/0000.png")));
        assert!(paths.contains(&PathBuf::from("out/graphs/0001.png")));
        assert!(paths.contains(&PathBuf::from("out/images_gt/0002.png")));
        // numbering does not reset at the batch boundary
        assert!(!paths.contains(&PathBuf::from("out/images/0003.png")));
    }

    #[test]
    fn empty_source_aborts_without_summary() {
        let adapter = ModelAdapter::new(EchoModel, InvocationOptions::default(), None);
        let mut source = VecSource {
            batches: vec![].into_iter(),
        };
        let (mut writer, _paths) = recording_writer(false);
        let mut rng = StdRng::seed_from_u64(0);

        let err = run_pipeline(
            &adapter,
            &mut source,
            &mut writer,
            &vocab(),
            &output_config(false),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SampleError>(),
            Some(SampleError::EmptyEvaluation)
        ));
    }
}
