use crate::{common::*, MalformedBatch};

/// The per-image view recovered from a flattened batch.
///
/// Slices appear in ascending order of first appearance of their image
/// id. Triple subject/object indices are local to the image's object
/// slice; [`merge`](SplitGraphBatch::merge) re-adds the offsets and is
/// the exact inverse of [`split_graph_batch`].
#[derive(Debug)]
pub struct SplitGraphBatch {
    /// Original image id per slice.
    pub image_ids: Vec<i64>,
    /// Start offset of each image's object slice in the flat batch.
    pub offsets: Vec<i64>,
    /// Rebased triples per image, each in shape `[t_i, 3]`.
    pub triples: Vec<Tensor>,
    /// `obj_data[k][i]` is the slice of input tensor `k` owned by image `i`.
    pub obj_data: Vec<Vec<Tensor>>,
}

struct Run {
    image: i64,
    start: i64,
    len: i64,
}

/// Recovers per-image sub-graphs from a flattened batch.
///
/// `obj_data` holds one or more tensors aligned with the object axis
/// (category ids, boxes, masks, ...). Each comes back sliced per image;
/// `triples` comes back sliced per image with subject/object indices
/// rebased to be zero-based within the image.
pub fn split_graph_batch(
    triples: &Tensor,
    obj_data: &[Tensor],
    obj_to_img: &Tensor,
    triple_to_img: &Tensor,
) -> Result<SplitGraphBatch, MalformedBatch> {
    let obj_owners = to_i64_vec(obj_to_img);
    let triple_owners = to_i64_vec(triple_to_img);
    let num_objs = obj_owners.len() as i64;

    check_len("triple_to_img", triple_owners.len(), triples.size()[0])?;
    for tensor in obj_data {
        check_len("obj_data", tensor.size()[0] as usize, num_objs)?;
    }

    let runs = object_runs(&obj_owners)?;
    let run_by_image: HashMap<i64, usize> = runs
        .iter()
        .enumerate()
        .map(|(index, run)| (run.image, index))
        .collect();

    // gather and rebase triples by ownership scan
    let triple_values = to_i64_vec(&triples.reshape(&[-1]));
    let mut local_triples: Vec<Vec<i64>> = runs.iter().map(|_| vec![]).collect();
    for (index, &image) in triple_owners.iter().enumerate() {
        let run_index = match run_by_image.get(&image) {
            Some(&run_index) => run_index,
            None => {
                return Err(MalformedBatch::TripleWithoutImage {
                    triple: index,
                    image,
                })
            }
        };
        let run = &runs[run_index];
        let subject = triple_values[index * 3];
        let predicate = triple_values[index * 3 + 1];
        let object = triple_values[index * 3 + 2];

        for endpoint in [subject, object] {
            if endpoint < run.start || endpoint >= run.start + run.len {
                return Err(MalformedBatch::TripleOutOfRange {
                    triple: index,
                    object: endpoint,
                    image,
                });
            }
        }

        let slot = &mut local_triples[run_index];
        slot.push(subject - run.start);
        slot.push(predicate);
        slot.push(object - run.start);
    }

    let device = triples.device();
    let split_triples: Vec<_> = local_triples
        .into_iter()
        .map(|values| {
            Tensor::of_slice(values.as_slice())
                .view([-1, 3])
                .to_device(device)
        })
        .collect();

    let split_obj_data: Vec<Vec<_>> = obj_data
        .iter()
        .map(|tensor| {
            runs.iter()
                .map(|run| tensor.narrow(0, run.start, run.len))
                .collect()
        })
        .collect();

    let (image_ids, offsets) = runs.iter().map(|run| (run.image, run.start)).unzip();

    Ok(SplitGraphBatch {
        image_ids,
        offsets,
        triples: split_triples,
        obj_data: split_obj_data,
    })
}

impl SplitGraphBatch {
    pub fn num_images(&self) -> usize {
        self.image_ids.len()
    }

    /// Re-flattens the per-image slices, re-adding the object offsets
    /// to the local triple indices. Exact inverse of
    /// [`split_graph_batch`] for well-formed batches whose triples are
    /// grouped by image.
    pub fn merge(&self) -> Result<MergedGraphBatch> {
        ensure!(self.num_images() > 0, "cannot merge an empty split batch");

        let triples: Vec<_> = izip!(&self.triples, &self.offsets)
            .map(|(triples, &offset)| {
                let shift =
                    Tensor::of_slice(&[offset, 0, offset]).to_device(triples.device());
                triples + shift
            })
            .collect();
        let triples = Tensor::cat(&triples, 0);

        let obj_data: Vec<_> = self
            .obj_data
            .iter()
            .map(|slices| Tensor::cat(slices, 0))
            .collect();

        let mut obj_owners = vec![];
        let mut triple_owners = vec![];
        for (index, &image) in self.image_ids.iter().enumerate() {
            let num_objs = self.obj_data[0][index].size()[0];
            obj_owners.extend(std::iter::repeat(image).take(num_objs as usize));
            let num_triples = self.triples[index].size()[0];
            triple_owners.extend(std::iter::repeat(image).take(num_triples as usize));
        }

        let device = triples.device();
        Ok(MergedGraphBatch {
            triples,
            obj_data,
            obj_to_img: Tensor::of_slice(obj_owners.as_slice()).to_device(device),
            triple_to_img: Tensor::of_slice(triple_owners.as_slice()).to_device(device),
        })
    }
}

/// The flat tensors reconstructed by [`SplitGraphBatch::merge`].
#[derive(Debug)]
pub struct MergedGraphBatch {
    pub triples: Tensor,
    pub obj_data: Vec<Tensor>,
    pub obj_to_img: Tensor,
    pub triple_to_img: Tensor,
}

fn object_runs(owners: &[i64]) -> Result<Vec<Run>, MalformedBatch> {
    let mut runs: Vec<Run> = vec![];
    for (index, &image) in owners.iter().enumerate() {
        if let Some(run) = runs.last_mut() {
            if run.image == image {
                run.len += 1;
                continue;
            }
            if run.image > image {
                return Err(MalformedBatch::NonMonotoneObjToImg {
                    index,
                    prev: run.image,
                    next: image,
                });
            }
        }
        runs.push(Run {
            image,
            start: index as i64,
            len: 1,
        });
    }
    Ok(runs)
}

fn to_i64_vec(tensor: &Tensor) -> Vec<i64> {
    Vec::<i64>::from(&tensor.to_device(Device::Cpu))
}

fn check_len(name: &'static str, found: usize, expected: i64) -> Result<(), MalformedBatch> {
    if found as i64 != expected {
        return Err(MalformedBatch::LengthMismatch {
            name,
            found: found as i64,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_flat() -> (Tensor, Vec<Tensor>, Tensor, Tensor) {
        // image 0 owns objects 0..3, image 1 owns objects 3..5
        let triples = Tensor::of_slice(&[
            0i64, 2, 1, //
            1, 0, 2, //
            3, 1, 4, //
        ])
        .view([3, 3]);
        let objs = Tensor::of_slice(&[7i64, 8, 9, 10, 11]);
        let boxes = Tensor::arange(20, (Kind::Float, Device::Cpu)).view([5, 4]);
        let obj_to_img = Tensor::of_slice(&[0i64, 0, 0, 1, 1]);
        let triple_to_img = Tensor::of_slice(&[0i64, 0, 1]);
        (triples, vec![objs, boxes], obj_to_img, triple_to_img)
    }

    #[test]
    fn split_round_trip() {
        let (triples, obj_data, obj_to_img, triple_to_img) = sample_flat();
        let split =
            split_graph_batch(&triples, &obj_data, &obj_to_img, &triple_to_img).unwrap();
        let merged = split.merge().unwrap();

        assert!(bool::from(merged.triples.eq_tensor(&triples).all()));
        assert!(bool::from(merged.obj_to_img.eq_tensor(&obj_to_img).all()));
        assert!(bool::from(
            merged.triple_to_img.eq_tensor(&triple_to_img).all()
        ));
        for (merged, original) in izip!(&merged.obj_data, &obj_data) {
            assert!(bool::from(merged.eq_tensor(original).all()));
        }
    }

    #[test]
    fn split_partitions_objects() {
        let (triples, obj_data, obj_to_img, triple_to_img) = sample_flat();
        let split =
            split_graph_batch(&triples, &obj_data, &obj_to_img, &triple_to_img).unwrap();

        assert_eq!(split.num_images(), 2);
        assert_eq!(split.image_ids, vec![0, 1]);
        assert_eq!(split.offsets, vec![0, 3]);

        let total: i64 = split.obj_data[0]
            .iter()
            .map(|slice| slice.size()[0])
            .sum();
        assert_eq!(total, 5);
        assert_eq!(
            Vec::<i64>::from(&split.obj_data[0][0]),
            vec![7, 8, 9]
        );
        assert_eq!(Vec::<i64>::from(&split.obj_data[0][1]), vec![10, 11]);
    }

    #[test]
    fn split_rebases_triple_indices() {
        let (triples, obj_data, obj_to_img, triple_to_img) = sample_flat();
        let split =
            split_graph_batch(&triples, &obj_data, &obj_to_img, &triple_to_img).unwrap();

        assert_eq!(
            Vec::<i64>::from(&split.triples[0]),
            vec![0, 2, 1, 1, 0, 2]
        );
        // global (3, 1, 4) rebased by the image-1 offset of 3
        assert_eq!(Vec::<i64>::from(&split.triples[1]), vec![0, 1, 1]);

        for (triples, objs) in izip!(&split.triples, &split.obj_data[0]) {
            let num_objs = objs.size()[0];
            for index in Vec::<i64>::from(&triples.i((.., 0))) {
                assert!((0..num_objs).contains(&index));
            }
            for index in Vec::<i64>::from(&triples.i((.., 2))) {
                assert!((0..num_objs).contains(&index));
            }
        }
    }

    #[test]
    fn split_rejects_non_monotone_ownership() {
        let (triples, obj_data, _, triple_to_img) = sample_flat();
        let obj_to_img = Tensor::of_slice(&[0i64, 1, 0, 1, 1]);
        let err = split_graph_batch(&triples, &obj_data, &obj_to_img, &triple_to_img)
            .unwrap_err();
        assert!(matches!(err, MalformedBatch::NonMonotoneObjToImg { .. }));
    }

    #[test]
    fn split_rejects_out_of_range_triple() {
        let (_, obj_data, obj_to_img, triple_to_img) = sample_flat();
        // the image-1 triple points at an image-0 object
        let triples = Tensor::of_slice(&[
            0i64, 2, 1, //
            1, 0, 2, //
            2, 1, 4, //
        ])
        .view([3, 3]);
        let err = split_graph_batch(&triples, &obj_data, &obj_to_img, &triple_to_img)
            .unwrap_err();
        assert!(matches!(err, MalformedBatch::TripleOutOfRange { .. }));
    }

    #[test]
    fn split_rejects_triple_without_objects() {
        let (triples, obj_data, obj_to_img, _) = sample_flat();
        let triple_to_img = Tensor::of_slice(&[0i64, 0, 5]);
        let err = split_graph_batch(&triples, &obj_data, &obj_to_img, &triple_to_img)
            .unwrap_err();
        assert!(matches!(err, MalformedBatch::TripleWithoutImage { .. }));
    }
}
