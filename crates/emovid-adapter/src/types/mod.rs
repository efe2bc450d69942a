/*
[INPUT]:  Processing service schema and client-side payload rules
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions for service communication
[UPDATE]: When service schema changes or new types added
*/

pub mod enums;
pub mod payload;
pub mod responses;

pub use enums::*;
pub use payload::*;
pub use responses::*;
