//! Codecs that need no schema: empty/null markers, text, fixed-width
//! unsigned integers and the raw binary fallback.

mod binary;
mod empty;
mod text;
mod uint;

pub use binary::BinarySerde;
pub use empty::{NoneSerde, NullSerde};
pub use text::{TextSerde, Utf8Serde};
pub use uint::UintSerde;
