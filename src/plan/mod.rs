pub mod architecture;
pub mod field_type;
pub mod schema;

pub use architecture::Architecture;
pub use field_type::{AnalyzerSpec, FieldType, PostingVariant, PrimitiveId};
pub use schema::Schema;
