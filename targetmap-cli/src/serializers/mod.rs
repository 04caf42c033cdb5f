//! Output serialization for `targetmap format`.
//!
//! - **JSON**: one object mapping each target label to its emitted attributes
//! - **Policy**: which resolved values are emitted, by source
//!
//! Values are resolved by `targetmap_graph::AttributeValueResolver`; this
//! module decides what survives and owns the document.

pub mod json;
pub mod policy;

pub use json::{
    CloseOutcome, EmittedValue, FormatError, JsonStreamWriter, OutputCallback, ResultDocument,
    TargetEntry, WriterState,
};
pub use policy::EmitPolicy;
