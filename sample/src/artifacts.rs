use crate::{common::*, config::OutputConfig};

/// Destination for encoded images. The orchestrator performs no
/// encoding itself.
pub trait ImageSink {
    fn save(&self, image: &Tensor, path: &Path) -> Result<()>;
}

/// Production sink backed by `tch::vision::image`.
#[derive(Debug)]
pub struct TchImageSink;

impl ImageSink for TchImageSink {
    fn save(&self, image: &Tensor, path: &Path) -> Result<()> {
        vision::image::save(image, path)
            .with_context(|| format!("failed to save image '{}'", path.display()))?;
        Ok(())
    }
}

/// Output directories, created once before the dataset pass. Optional
/// artifact kinds only get a directory when their flag is set.
#[derive(Debug)]
pub struct ArtifactDirs {
    pub images: PathBuf,
    pub gt_images: Option<PathBuf>,
    pub graphs: Option<PathBuf>,
    pub layouts: Option<PathBuf>,
}

impl ArtifactDirs {
    pub fn prepare(config: &OutputConfig) -> Result<Self> {
        let base = &config.output_dir;
        let images = base.join("images");
        fs::create_dir_all(&images)
            .with_context(|| format!("failed to create output directory '{}'", images.display()))?;
        Ok(Self {
            images,
            gt_images: make_dir(base, "images_gt", config.save_gt_images)?,
            graphs: make_dir(base, "graphs", config.save_graphs)?,
            layouts: make_dir(base, "layouts", config.save_layouts)?,
        })
    }
}

fn make_dir(base: &Path, name: &str, flag: bool) -> Result<Option<PathBuf>> {
    if !flag {
        return Ok(None);
    }
    let dir = base.join(name);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;
    Ok(Some(dir))
}

/// The per-image tensors the writer may persist. The predicted image is
/// unconditional; the rest ride on their configuration flags.
#[derive(Debug)]
pub struct ImageArtifacts<'a> {
    pub image: &'a Tensor,
    pub gt_image: Option<&'a Tensor>,
    pub graph: Option<&'a Tensor>,
    pub layout: Option<&'a Tensor>,
}

/// Writes one image's artifacts under a shared sequence number.
///
/// The counter increases monotonically across the entire dataset pass;
/// it never resets at batch boundaries, so all artifact kinds of the
/// same image share one `%04d.png` name.
#[derive(Debug)]
pub struct ArtifactWriter<K> {
    dirs: ArtifactDirs,
    sink: K,
    next_index: usize,
}

impl<K> ArtifactWriter<K>
where
    K: ImageSink,
{
    pub fn new(dirs: ArtifactDirs, sink: K) -> Self {
        Self {
            dirs,
            sink,
            next_index: 0,
        }
    }

    pub fn images_written(&self) -> usize {
        self.next_index
    }

    pub fn write(&mut self, artifacts: &ImageArtifacts<'_>) -> Result<()> {
        let filename = format!("{:04}.png", self.next_index);

        self.sink
            .save(artifacts.image, &self.dirs.images.join(&filename))?;
        if let (Some(dir), Some(image)) = (&self.dirs.gt_images, artifacts.gt_image) {
            self.sink.save(image, &dir.join(&filename))?;
        }
        if let (Some(dir), Some(graph)) = (&self.dirs.graphs, artifacts.graph) {
            self.sink.save(graph, &dir.join(&filename))?;
        }
        if let (Some(dir), Some(layout)) = (&self.dirs.layouts, artifacts.layout) {
            self.sink.save(layout, &dir.join(&filename))?;
        }

        debug!("wrote artifacts for image {}", filename);
        self.next_index += 1;
        Ok(())
    }
}
