pub use anyhow::{bail, ensure, Context, Error, Result};
pub use itertools::{izip, Itertools};
pub use std::{
    collections::HashMap,
    convert::{TryFrom, TryInto},
};
pub use tch::{Device, IndexOp, Kind, Tensor};
