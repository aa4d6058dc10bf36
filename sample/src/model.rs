use crate::{common::*, error::SampleError};

/// One generative call's inputs, in the model's fixed argument order.
///
/// Order and presence of the optional arguments are part of the model
/// contract; the adapter always supplies every slot.
#[derive(Debug)]
pub struct ModelInput {
    pub images: Tensor,
    pub objs: Tensor,
    pub triples: Tensor,
    pub obj_to_img: Tensor,
    pub boxes_gt: Option<Tensor>,
    pub masks_gt: Option<Tensor>,
    pub attributes: Option<Tensor>,
    pub gt_train: bool,
    pub test_mode: bool,
    pub use_gt_boxes: bool,
    pub features: Option<Tensor>,
}

/// The model outputs consumed by the pipeline. The original 6-tuple
/// carries two auxiliary tensors that are dropped at this boundary.
#[derive(Debug)]
pub struct ModelOutput {
    /// Generated images in shape `[batch, 3, height, width]`.
    pub images: Tensor,
    /// Predicted boxes aligned with the input object ordering.
    pub boxes: Tensor,
    /// Predicted masks aligned with the input object ordering.
    pub masks: Option<Tensor>,
    /// Per-image soft category layout `[batch, categories + 1, height, width]`.
    pub layout: Tensor,
}

/// The generative model as a black-box capability.
pub trait SceneModel {
    fn generate(&self, input: &ModelInput) -> Result<ModelOutput, SampleError>;
}

/// A trained scene-to-image model exported as a TorchScript module.
#[derive(Debug)]
pub struct TorchScriptModel {
    module: tch::CModule,
}

impl TorchScriptModel {
    pub fn load<P>(path: P, device: Device) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let module = tch::CModule::load_on_device(path, device)
            .with_context(|| format!("failed to load model module '{}'", path.display()))?;
        Ok(Self { module })
    }
}

impl SceneModel for TorchScriptModel {
    fn generate(&self, input: &ModelInput) -> Result<ModelOutput, SampleError> {
        let arguments = input_ivalues(input);
        let output = self.module.method_is("generate", &arguments)?;
        parse_output(output)
    }
}

fn input_ivalues(input: &ModelInput) -> Vec<IValue> {
    let ModelInput {
        images,
        objs,
        triples,
        obj_to_img,
        boxes_gt,
        masks_gt,
        attributes,
        gt_train,
        test_mode,
        use_gt_boxes,
        features,
    } = input;

    vec![
        IValue::Tensor(images.shallow_clone()),
        IValue::Tensor(objs.shallow_clone()),
        IValue::Tensor(triples.shallow_clone()),
        IValue::Tensor(obj_to_img.shallow_clone()),
        optional_tensor(boxes_gt),
        optional_tensor(masks_gt),
        optional_tensor(attributes),
        IValue::Bool(*gt_train),
        IValue::Bool(*test_mode),
        IValue::Bool(*use_gt_boxes),
        optional_tensor(features),
    ]
}

fn optional_tensor(tensor: &Option<Tensor>) -> IValue {
    match tensor {
        Some(tensor) => IValue::Tensor(tensor.shallow_clone()),
        None => IValue::None,
    }
}

fn parse_output(output: IValue) -> Result<ModelOutput, SampleError> {
    let values = match output {
        IValue::Tuple(values) => values,
        other => {
            return Err(SampleError::UnexpectedModelOutput(format!(
                "expected a tuple, got {:?}",
                other
            )))
        }
    };
    if values.len() != 6 {
        return Err(SampleError::UnexpectedModelOutput(format!(
            "expected a 6-tuple, got {} values",
            values.len()
        )));
    }

    let mut values = values.into_iter();
    let images = expect_tensor(values.next(), "images")?;
    let boxes = expect_tensor(values.next(), "boxes")?;
    let masks = match values.next() {
        Some(IValue::Tensor(tensor)) => Some(tensor),
        Some(IValue::None) => None,
        other => {
            return Err(SampleError::UnexpectedModelOutput(format!(
                "masks slot holds {:?}",
                other
            )))
        }
    };
    let _aux = values.next();
    let layout = expect_tensor(values.next(), "layout")?;

    Ok(ModelOutput {
        images,
        boxes,
        masks,
        layout,
    })
}

fn expect_tensor(value: Option<IValue>, name: &str) -> Result<Tensor, SampleError> {
    match value {
        Some(IValue::Tensor(tensor)) => Ok(tensor),
        other => Err(SampleError::UnexpectedModelOutput(format!(
            "{} slot holds {:?}",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor_value() -> IValue {
        IValue::Tensor(Tensor::of_slice(&[1f32]))
    }

    #[test]
    fn output_tuple_parsed() {
        let output = IValue::Tuple(vec![
            tensor_value(),
            tensor_value(),
            IValue::None,
            IValue::None,
            tensor_value(),
            IValue::None,
        ]);
        let parsed = parse_output(output).unwrap();
        assert!(parsed.masks.is_none());
    }

    #[test]
    fn short_tuple_rejected() {
        let output = IValue::Tuple(vec![tensor_value()]);
        assert!(matches!(
            parse_output(output),
            Err(SampleError::UnexpectedModelOutput(_))
        ));
    }
}
