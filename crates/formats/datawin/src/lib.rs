//! Reader/writer for GameMaker's compiled data.win format.
//!
//! Three-layer architecture:
//! - **Layer 1** (`reader`/`writer`/`cursor`): Raw chunk I/O: FORM envelope and chunk index
//! - **Layer 2** (`chunks`, `string_table`, `bytecode`): Typed codecs for individual
//!   chunk formats, resolving pointers through the pass's `address` space
//! - **Layer 3** (`datawin`): The resolved object graph, with reference chains
//!   (`refchain`) turned into direct ids

pub mod address;
pub mod bytecode;
pub mod chunks;
pub mod context;
pub mod cursor;
pub mod datawin;
pub mod error;
pub mod options;
pub mod reader;
pub mod refchain;
pub mod string_table;
pub mod version;
pub mod writer;

pub use address::{AddressSpace, ObjectId, TypeTag};
pub use chunks::code::{Code, CodeEntry, InstrRef};
pub use chunks::func::{CodeLocals, Func, Function, FunctionClassification, FunctionId, LocalVar};
pub use chunks::gen8::Gen8;
pub use chunks::vari::{Vari, Variable, VariableId};
pub use context::{ReadCtx, Resource, WriteCtx};
pub use datawin::{DataWin, RawChunk, Section};
pub use error::{Error, Result};
pub use options::{Options, ReadOptions, WriteOptions};
pub use reader::ChunkIndex;
pub use refchain::ChainTarget;
pub use string_table::{StringRef, StringResolver, StringTable};
pub use version::{BytecodeVersion, FormatVersion};
