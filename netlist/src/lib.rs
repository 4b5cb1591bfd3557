//! The host netlist container: modules of cells and wires, 4-valued
//! constants, bit-granular signals, and a flip-flop emission helper.

mod logic;
mod ident;
mod param;
mod sig;
mod cell;
mod module;
mod ff;

pub use logic::{Const, State};
pub use ident::IdString;
pub use param::ParamValue;
pub use sig::{SigBit, SigSpec};
pub use cell::Cell;
pub use module::{CellId, MemoryDecl, Module, Wire, WireId};
pub use ff::{FfInitVals, FlipFlop};
