pub mod registry;

pub use registry::{kind_for_record, Registration, RunEntry, RunRegistry};
