pub mod builder;
pub mod call_tree;
pub mod frame;
pub mod profile;
pub mod session;
pub mod symbols;

pub use builder::{BuildError, EventedBuilder, StackListBuilder};
pub use call_tree::{CallTree, CallTreeNode, CallVisitor, NodeId, Sample};
pub use frame::{Frame, FrameId, FrameInfo, FrameTable};
pub use profile::{FrameStats, Profile, ProfileGroup, ProfileId, ValueUnit};
pub use session::{Selection, Session, ViewMode, WiringError};
pub use symbols::{SymbolMap, SymbolRemapper, demangle_name, parse_emscripten_symbol_map};
