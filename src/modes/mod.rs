// Mode S message classification and decoding

pub mod message;
pub mod typecode;

// Re-export main types
pub use message::{classify, extract_identity, normalize_identity, AllCallReply, MessageClass};
pub use typecode::{categorize, TypeCodeCategory};
