use crate::{
    common::*,
    config::SamplingConfig,
    features::FeatureBank,
    model::{ModelInput, ModelOutput, SceneModel},
};

/// Ground-truth substitution and conditioning toggles, fixed per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvocationOptions {
    pub use_gt_boxes: bool,
    pub use_gt_masks: bool,
    pub use_gt_attributes: bool,
    pub use_gt_textures: bool,
}

impl From<&SamplingConfig> for InvocationOptions {
    fn from(config: &SamplingConfig) -> Self {
        let SamplingConfig {
            use_gt_boxes,
            use_gt_masks,
            use_gt_attributes,
            use_gt_textures,
        } = *config;
        Self {
            use_gt_boxes,
            use_gt_masks,
            use_gt_attributes,
            use_gt_textures,
        }
    }
}

/// Assembles the model's exact input contract and issues one call per
/// batch. Keeps no state across batches.
#[derive(Debug)]
pub struct ModelAdapter<M> {
    model: M,
    options: InvocationOptions,
    features: Option<FeatureBank>,
}

impl<M> ModelAdapter<M>
where
    M: SceneModel,
{
    pub fn new(model: M, options: InvocationOptions, features: Option<FeatureBank>) -> Self {
        Self {
            model,
            options,
            features,
        }
    }

    pub fn run_batch<R>(
        &self,
        images: &Tensor,
        graphs: &FlatGraphBatch,
        rng: &mut R,
    ) -> Result<ModelOutput>
    where
        R: Rng,
    {
        let masks_gt = if self.options.use_gt_masks {
            let masks = graphs
                .masks
                .as_ref()
                .ok_or_else(|| format_err!("gt masks requested but the batch has none"))?;
            Some(masks.shallow_clone())
        } else {
            None
        };

        // zeroed attributes keep the tensor shape while ablating the
        // conditioning signal
        let attributes = graphs.attributes.as_ref().map(|attributes| {
            if self.options.use_gt_attributes {
                attributes.shallow_clone()
            } else {
                attributes.zeros_like()
            }
        });

        let features = match &self.features {
            Some(bank) => Some(bank.sample(&graphs.objs, rng)?),
            None => None,
        };

        let input = ModelInput {
            images: images.shallow_clone(),
            objs: graphs.objs.shallow_clone(),
            triples: graphs.triples.shallow_clone(),
            obj_to_img: graphs.obj_to_img.shallow_clone(),
            boxes_gt: Some(graphs.boxes.shallow_clone()),
            masks_gt,
            attributes,
            gt_train: self.options.use_gt_textures,
            test_mode: true,
            use_gt_boxes: self.options.use_gt_boxes,
            features,
        };

        let output = self.model.generate(&input)?;
        ensure!(
            output.boxes.size()[0] == graphs.num_objects(),
            "model returned {} boxes for {} objects",
            output.boxes.size()[0],
            graphs.num_objects()
        );
        Ok(output)
    }
}
