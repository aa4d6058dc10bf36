//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use graph_batch::{
    split_graph_batch, FlatGraphBatch, MalformedBatch, MergedGraphBatch, SplitGraphBatch,
};
pub use itertools::{izip, Itertools};
pub use log::{debug, info, warn};
pub use once_cell::sync::Lazy;
pub use rand::{prelude::*, rngs::StdRng};
pub use semver::{Version, VersionReq};
pub use serde::{de::Error as DeserializeError, Deserialize, Deserializer, Serialize};
pub use std::{
    collections::HashMap,
    convert::{TryFrom, TryInto},
    fmt::{self, Display, Formatter},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
pub use tch::{kind::FLOAT_CPU, vision, Device, IndexOp, IValue, Kind, Tensor};
