//! PackStream: the binary value encoding used in message fields.
//!
//! Every value starts with a marker byte. Small integers and the sizes of
//! short strings, lists, maps and structs are folded into the marker; larger
//! sizes follow it as big-endian integers. Structs carry a one-byte signature
//! that identifies the graph, spatial or temporal type they encode.

pub mod marker;
mod pack;
pub mod structs;
mod unpack;

pub use pack::{pack, Packer};
pub use unpack::{unpack, Unpacker, MAX_DEPTH};
