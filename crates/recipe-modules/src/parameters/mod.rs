mod bag;
mod contract;
mod value;

pub use bag::{ParameterBag, ParameterKey};
pub use contract::{ArityBounds, ExpectedType, ParameterContract};
pub use value::{Value, ValueKind};
