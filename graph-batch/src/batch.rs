use crate::{common::*, MalformedBatch};

/// Many per-image scene graphs packed into shared parallel tensors.
///
/// Objects of the same image occupy a contiguous run of positions, and
/// `obj_to_img` maps each position back to its owning image. Triple
/// subject/object entries index positions in `objs`. The constructor
/// checks tensor alignment; the ordering and index-range invariants are
/// enforced by [`split_graph_batch`](crate::split_graph_batch), which
/// every consumer goes through.
#[derive(Debug)]
pub struct FlatGraphBatch {
    /// Object category ids in shape `[num_objs]`.
    pub objs: Tensor,
    /// Bounding boxes `(x0, y0, x1, y1)` in shape `[num_objs, 4]`.
    pub boxes: Tensor,
    /// Optional segmentation masks in shape `[num_objs, mask, mask]`.
    pub masks: Option<Tensor>,
    /// Relations `(subject, predicate, object)` in shape `[num_triples, 3]`.
    pub triples: Tensor,
    /// Owning image index per object in shape `[num_objs]`, non-decreasing.
    pub obj_to_img: Tensor,
    /// Owning image index per triple in shape `[num_triples]`.
    pub triple_to_img: Tensor,
    /// Optional attribute vectors in shape `[num_objs, num_attributes]`.
    pub attributes: Option<Tensor>,
}

impl FlatGraphBatch {
    pub fn new(
        objs: Tensor,
        boxes: Tensor,
        masks: Option<Tensor>,
        triples: Tensor,
        obj_to_img: Tensor,
        triple_to_img: Tensor,
        attributes: Option<Tensor>,
    ) -> Result<Self, MalformedBatch> {
        let num_objs = leading_len("objs", &objs)?;
        let num_triples = leading_len("triples", &triples)?;

        check_leading_len("boxes", &boxes, num_objs)?;
        check_leading_len("obj_to_img", &obj_to_img, num_objs)?;
        check_leading_len("triple_to_img", &triple_to_img, num_triples)?;
        if let Some(masks) = &masks {
            check_leading_len("masks", masks, num_objs)?;
        }
        if let Some(attributes) = &attributes {
            check_leading_len("attributes", attributes, num_objs)?;
        }

        match boxes.size().as_slice() {
            &[_, 4] => (),
            shape => {
                return Err(MalformedBatch::BadShape {
                    name: "boxes",
                    shape: shape.to_vec(),
                })
            }
        }
        match triples.size().as_slice() {
            &[_, 3] => (),
            shape => {
                return Err(MalformedBatch::BadShape {
                    name: "triples",
                    shape: shape.to_vec(),
                })
            }
        }

        Ok(Self {
            objs,
            boxes,
            masks,
            triples,
            obj_to_img,
            triple_to_img,
            attributes,
        })
    }

    pub fn num_objects(&self) -> i64 {
        self.objs.size()[0]
    }

    pub fn num_triples(&self) -> i64 {
        self.triples.size()[0]
    }

    pub fn to_device(&self, device: Device) -> Self {
        Self {
            objs: self.objs.to_device(device),
            boxes: self.boxes.to_device(device),
            masks: self.masks.as_ref().map(|t| t.to_device(device)),
            triples: self.triples.to_device(device),
            obj_to_img: self.obj_to_img.to_device(device),
            triple_to_img: self.triple_to_img.to_device(device),
            attributes: self.attributes.as_ref().map(|t| t.to_device(device)),
        }
    }
}

fn leading_len(name: &'static str, tensor: &Tensor) -> Result<i64, MalformedBatch> {
    match tensor.size().first() {
        Some(&len) => Ok(len),
        None => Err(MalformedBatch::BadShape {
            name,
            shape: vec![],
        }),
    }
}

fn check_leading_len(
    name: &'static str,
    tensor: &Tensor,
    expected: i64,
) -> Result<(), MalformedBatch> {
    let found = leading_len(name, tensor)?;
    if found != expected {
        return Err(MalformedBatch::LengthMismatch {
            name,
            found,
            expected,
        });
    }
    Ok(())
}
