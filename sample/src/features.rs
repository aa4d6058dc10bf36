use crate::{common::*, error::SampleError};

/// Clustered appearance features, keyed by object category id.
///
/// Loaded once per run from a torch multi-tensor file whose entry names
/// are decimal category ids and whose values are `[candidates, dim]`
/// banks. Sampling picks one candidate uniformly at random (with
/// replacement) per object.
#[derive(Debug)]
pub struct FeatureBank {
    banks: HashMap<i64, Tensor>,
}

impl FeatureBank {
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SampleError::MissingFeatureFile {
                path: path.to_owned(),
            }
            .into());
        }

        let banks = Tensor::load_multi(path)
            .with_context(|| format!("failed to read feature file '{}'", path.display()))?
            .into_iter()
            .map(|(name, tensor)| {
                let id: i64 = name
                    .parse()
                    .with_context(|| format!("feature entry '{}' is not a category id", name))?;
                let (candidates, _dim) = tensor.size2()?;
                ensure!(
                    candidates >= 1,
                    "feature bank for category {} is empty",
                    id
                );
                Ok((id, tensor))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        ensure!(!banks.is_empty(), "feature file '{}' holds no banks", path.display());

        Ok(Self { banks })
    }

    /// Assembles `[num_objs, dim]` feature vectors aligned with `objs`.
    pub fn sample<R>(&self, objs: &Tensor, rng: &mut R) -> Result<Tensor>
    where
        R: Rng,
    {
        let ids = Vec::<i64>::from(&objs.to_device(Device::Cpu));
        let rows = ids
            .iter()
            .map(|&id| {
                let bank = self
                    .banks
                    .get(&id)
                    .ok_or_else(|| format_err!("no feature bank for category {}", id))?;
                let (candidates, _dim) = bank.size2()?;
                let index = rng.gen_range(0..candidates);
                Ok(bank.get(index))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::stack(&rows, 0).to_device(objs.device()))
    }
}
