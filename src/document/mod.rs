pub mod core;
pub mod extract;
pub mod shape;
pub mod types;

pub use self::core::Document;
pub use extract::{BsonFieldResolver, FieldResolver};
pub use shape::Shape;
pub use types::Metadata;
