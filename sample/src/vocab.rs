use crate::common::*;

/// Category-id ↔ name mapping shipped alongside the checkpoint.
///
/// The id space doubles as the channel layout of the model's dense
/// layout output: channel `i` belongs to object category `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocab {
    pub object_idx_to_name: Vec<String>,
    pub pred_idx_to_name: Vec<String>,
}

impl Vocab {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let vocab = serde_json::from_str(&text)?;
        Ok(vocab)
    }

    pub fn num_object_categories(&self) -> usize {
        self.object_idx_to_name.len()
    }

    pub fn num_predicates(&self) -> usize {
        self.pred_idx_to_name.len()
    }

    pub fn object_name(&self, id: i64) -> Result<&str> {
        self.object_idx_to_name
            .get(usize::try_from(id)?)
            .map(String::as_str)
            .ok_or_else(|| format_err!("unknown object category {}", id))
    }

    pub fn object_names(&self, objs: &Tensor) -> Result<Vec<&str>> {
        Vec::<i64>::from(&objs.to_device(Device::Cpu))
            .into_iter()
            .map(|id| self.object_name(id))
            .collect()
    }
}
