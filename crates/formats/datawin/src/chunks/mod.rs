//! Typed codecs for the chunks the object graph is built from.

pub mod code;
pub mod func;
pub mod gen8;
pub mod vari;
