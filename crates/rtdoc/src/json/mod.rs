//! Hand-written JSON engine used for document contents
//!
//! The value model keeps integers and doubles apart, the parser follows a
//! small recursive-descent grammar, and the serializer emits compact text.

pub mod parser;
pub mod serializer;
pub mod value;

pub use parser::parse;
pub use serializer::stringify;
pub use value::JsonValue;
