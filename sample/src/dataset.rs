use crate::common::*;

/// One loader iteration: the preprocessed images and their flattened
/// scene graphs.
#[derive(Debug)]
pub struct SceneBatch {
    /// ImageNet-normalized images in shape `[batch, 3, height, width]`.
    pub images: Tensor,
    pub graphs: FlatGraphBatch,
}

impl SceneBatch {
    pub fn num_images(&self) -> Result<i64> {
        let (batch_size, _, _, _) = self.images.size4()?;
        Ok(batch_size)
    }
}

/// Yields flattened batches in whatever order the underlying storage
/// provides; shuffling is a loader concern, not the pipeline's.
pub trait BatchSource {
    fn next_batch(&mut self) -> Result<Option<SceneBatch>>;
}

/// Reads pre-collated batches from a directory of torch tensor files.
///
/// Each `*.pt` file holds the named tensors `imgs`, `objs`, `boxes`,
/// `triples`, `obj_to_img`, `triple_to_img` and optionally `masks` and
/// `attributes`. Files are visited in sorted order.
#[derive(Debug)]
pub struct DirectoryBatchSource {
    files: std::vec::IntoIter<PathBuf>,
    device: Device,
    remaining: Option<usize>,
}

impl DirectoryBatchSource {
    pub fn new(batch_dir: &Path, num_samples: Option<usize>, device: Device) -> Result<Self> {
        let pattern = batch_dir.join("*.pt");
        let pattern = pattern
            .to_str()
            .ok_or_else(|| format_err!("batch dir '{}' is not valid UTF-8", batch_dir.display()))?;
        let mut files: Vec<PathBuf> = glob::glob(pattern)?.collect::<Result<_, _>>()?;
        files.sort();
        ensure!(
            !files.is_empty(),
            "no batch files found under '{}'",
            batch_dir.display()
        );
        info!("found {} batch files", files.len());

        Ok(Self {
            files: files.into_iter(),
            device,
            remaining: num_samples,
        })
    }

    fn load_batch(&self, path: &Path) -> Result<SceneBatch> {
        let mut named: HashMap<String, Tensor> = Tensor::load_multi(path)
            .with_context(|| format!("failed to read batch file '{}'", path.display()))?
            .into_iter()
            .collect();
        let mut take = |name: &str| {
            named
                .remove(name)
                .ok_or_else(|| format_err!("batch file '{}' lacks tensor '{}'", path.display(), name))
        };

        let images = take("imgs")?;
        let objs = take("objs")?;
        let boxes = take("boxes")?;
        let triples = take("triples")?;
        let obj_to_img = take("obj_to_img")?;
        let triple_to_img = take("triple_to_img")?;
        drop(take);
        let masks = named.remove("masks");
        let attributes = named.remove("attributes");

        let graphs = FlatGraphBatch::new(
            objs,
            boxes,
            masks,
            triples,
            obj_to_img,
            triple_to_img,
            attributes,
        )
        .with_context(|| format!("batch file '{}' is malformed", path.display()))?;

        Ok(SceneBatch {
            images: images.to_device(self.device),
            graphs: graphs.to_device(self.device),
        })
    }
}

impl BatchSource for DirectoryBatchSource {
    fn next_batch(&mut self) -> Result<Option<SceneBatch>> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        let path = match self.files.next() {
            Some(path) => path,
            None => return Ok(None),
        };

        let batch = self.load_batch(&path)?;
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(batch.num_images()? as usize);
        }
        Ok(Some(batch))
    }
}
