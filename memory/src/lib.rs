//! Memory inference core: an in-memory view of RAM/ROM arrays in a netlist,
//! with transformations that reshape them for mapping to target primitives.
//!
//! A [`Mem`] aggregates one memory array together with its read ports, write
//! ports, and initializers, regardless of how the memory is encoded in the
//! host module.  Two encodings exist:
//!
//! - the *unpacked* form: a named memory declaration plus one `$memrd`,
//!   `$memwr`, or `$meminit` satellite cell per port or initializer;
//! - the *packed* form: a single `$mem` cell carrying all ports as
//!   concatenated parameter and port vectors.
//!
//! [`get_all_memories`] lifts every memory of a module into [`Mem`] values;
//! the caller mutates them (directly, or through the transformation methods)
//! and writes each back with [`Mem::emit`].  Between lift and emit the `Mem`
//! is the authoritative representation; the satellite cells it references may
//! be stale.  Ports are deleted by setting their `removed` flag, and are
//! compacted away (together with their rows and columns in the transparency
//! and priority matrices) on the next emit, so that port indices stay valid
//! across a transformation batch.

use std::collections::BTreeMap;

use spinel_netlist::{CellId, Const, IdString, Module, ParamValue, SigBit, SigSpec, State};

mod emit;
mod extract;
mod lift;

pub use lift::{get_all_memories, get_selected_memories};

pub(crate) fn ceil_log2(value: usize) -> usize {
    assert!(value >= 1);
    (usize::BITS - (value - 1).leading_zeros()) as usize
}

/// One memory array, in either encoding.
///
/// `wr_ports` order is semantically significant: priority edges always point
/// from a higher-index port to a lower-index one.
#[derive(Debug, Clone)]
pub struct Mem {
    pub memid: IdString,
    /// Selects the encoding written by the next [`Mem::emit`].
    pub packed: bool,
    pub width: usize,
    pub start_offset: i32,
    pub size: usize,
    pub attributes: BTreeMap<IdString, ParamValue>,
    /// The packed `$mem` cell backing this memory, if any.
    pub cell: Option<CellId>,
    pub rd_ports: Vec<MemRd>,
    pub wr_ports: Vec<MemWr>,
    /// Ordered by ascending priority: on overlap, later initializers win.
    pub inits: Vec<MemInit>,
}

/// A read port.
#[derive(Debug, Clone)]
pub struct MemRd {
    pub removed: bool,
    pub cell: Option<CellId>,
    pub attributes: BTreeMap<IdString, ParamValue>,

    pub clk_enable: bool,
    pub clk_polarity: bool,
    pub ce_over_srst: bool,
    pub arst_value: Const,
    pub srst_value: Const,
    pub init_value: Const,
    pub clk: SigSpec,
    pub en: SigSpec,
    pub arst: SigSpec,
    pub srst: SigSpec,
    pub addr: SigSpec,
    pub data: SigSpec,
    /// The port reads `2 ** wide_log2` consecutive words; the low `wide_log2`
    /// address bits are constant zero.
    pub wide_log2: usize,
    /// `transparency_mask[j]` means a same-cycle write through port `j` to the
    /// address being read is reflected on `data` in the same cycle.
    pub transparency_mask: Vec<bool>,
}

/// A write port.
#[derive(Debug, Clone)]
pub struct MemWr {
    pub removed: bool,
    pub cell: Option<CellId>,
    pub attributes: BTreeMap<IdString, ParamValue>,

    pub clk_enable: bool,
    pub clk_polarity: bool,
    pub clk: SigSpec,
    /// Per-bit write enable, same width as `data`.
    pub en: SigSpec,
    pub addr: SigSpec,
    pub data: SigSpec,
    pub wide_log2: usize,
    /// `priority_mask[j]` means this port wins over port `j` when both write
    /// the same address in the same cycle; only bits below this port's own
    /// index may be set.
    pub priority_mask: Vec<bool>,
}

/// One initializer: `data` is written to consecutive words starting at `addr`.
#[derive(Debug, Clone)]
pub struct MemInit {
    pub cell: Option<CellId>,
    pub attributes: BTreeMap<IdString, ParamValue>,
    pub addr: Const,
    pub data: Const,
}

impl MemRd {
    pub fn asynchronous(addr: SigSpec, data: SigSpec) -> MemRd {
        let width = data.len();
        MemRd {
            removed: false,
            cell: None,
            attributes: BTreeMap::new(),
            clk_enable: false,
            clk_polarity: true,
            ce_over_srst: false,
            arst_value: Const::undef(width),
            srst_value: Const::undef(width),
            init_value: Const::undef(width),
            clk: State::Zero.into(),
            en: State::One.into(),
            arst: State::Zero.into(),
            srst: State::Zero.into(),
            addr,
            data,
            wide_log2: 0,
            transparency_mask: vec![],
        }
    }

    pub fn clocked(clk: SigSpec, addr: SigSpec, data: SigSpec) -> MemRd {
        MemRd { clk_enable: true, clk, ..MemRd::asynchronous(addr, data) }
    }
}

impl MemWr {
    pub fn new(clk: SigSpec, addr: SigSpec, data: SigSpec, en: SigSpec) -> MemWr {
        MemWr {
            removed: false,
            cell: None,
            attributes: BTreeMap::new(),
            clk_enable: true,
            clk_polarity: true,
            clk,
            en,
            addr,
            data,
            wide_log2: 0,
            priority_mask: vec![],
        }
    }
}

impl Mem {
    /// An empty unpacked memory, not yet backed by anything in the module.
    pub fn new(memid: IdString, width: usize, start_offset: i32, size: usize) -> Mem {
        Mem {
            memid,
            packed: false,
            width,
            start_offset,
            size,
            attributes: BTreeMap::new(),
            cell: None,
            rd_ports: vec![],
            wr_ports: vec![],
            inits: vec![],
        }
    }

    /// Verifies the structural invariants.  Any violation is a programming
    /// fault, either here or in the pass that produced the memory.
    pub fn check(&self) {
        let mut max_wide_log2 = 0;
        for port in &self.rd_ports {
            if port.removed {
                continue;
            }
            assert_eq!(port.clk.len(), 1);
            assert_eq!(port.en.len(), 1);
            assert_eq!(port.arst.len(), 1);
            assert_eq!(port.srst.len(), 1);
            assert_eq!(port.data.len(), self.width << port.wide_log2);
            assert_eq!(port.init_value.len(), self.width << port.wide_log2);
            assert_eq!(port.arst_value.len(), self.width << port.wide_log2);
            assert_eq!(port.srst_value.len(), self.width << port.wide_log2);
            assert_eq!(port.transparency_mask.len(), self.wr_ports.len());
            if !port.clk_enable {
                assert_eq!(port.en, SigSpec::from(State::One));
                assert_eq!(port.arst, SigSpec::from(State::Zero));
                assert_eq!(port.srst, SigSpec::from(State::Zero));
            }
            for index in 0..port.wide_log2 {
                assert_eq!(port.addr[index], SigBit::Const(State::Zero));
            }
            for (index, wport) in self.wr_ports.iter().enumerate() {
                if port.transparency_mask[index] && !wport.removed {
                    assert!(port.clk_enable);
                    assert!(wport.clk_enable);
                    assert_eq!(port.clk, wport.clk);
                    assert_eq!(port.clk_polarity, wport.clk_polarity);
                }
            }
            max_wide_log2 = max_wide_log2.max(port.wide_log2);
        }
        for (index, port) in self.wr_ports.iter().enumerate() {
            if port.removed {
                continue;
            }
            assert_eq!(port.clk.len(), 1);
            assert_eq!(port.en.len(), self.width << port.wide_log2);
            assert_eq!(port.data.len(), self.width << port.wide_log2);
            for bit in 0..port.wide_log2 {
                assert_eq!(port.addr[bit], SigBit::Const(State::Zero));
            }
            max_wide_log2 = max_wide_log2.max(port.wide_log2);
            assert_eq!(port.priority_mask.len(), self.wr_ports.len());
            for (other_index, other) in self.wr_ports.iter().enumerate() {
                if port.priority_mask[other_index] && !other.removed {
                    assert!(other_index < index);
                    assert_eq!(port.clk_enable, other.clk_enable);
                    if port.clk_enable {
                        assert_eq!(port.clk, other.clk);
                        assert_eq!(port.clk_polarity, other.clk_polarity);
                    }
                }
            }
        }
        let mask = (1usize << max_wide_log2) - 1;
        assert_eq!(self.start_offset & mask as i32, 0);
        assert_eq!(self.size & mask, 0);
    }

    /// Deletes every host object backing this memory and detaches the
    /// aggregate from the module.
    pub fn remove(&mut self, module: &mut Module) {
        if let Some(cell) = self.cell.take() {
            module.remove(cell);
        }
        module.memories.shift_remove(&self.memid);
        for port in &mut self.rd_ports {
            if let Some(cell) = port.cell.take() {
                module.remove(cell);
            }
        }
        for port in &mut self.wr_ports {
            if let Some(cell) = port.cell.take() {
                module.remove(cell);
            }
        }
        for init in &mut self.inits {
            if let Some(cell) = init.cell.take() {
                module.remove(cell);
            }
        }
    }

    /// Deletes all initializers, and their satellite cells if any.
    pub fn clear_inits(&mut self, module: &mut Module) {
        for init in &mut self.inits {
            if let Some(cell) = init.cell.take() {
                module.remove(cell);
            }
        }
        self.inits.clear();
    }

    /// Flattens the initializers into one `width * size`-bit constant, with
    /// later initializers overriding earlier ones.  Out-of-range initializer
    /// bits are silently clipped.
    pub fn get_init_data(&self) -> Const {
        let mut init_data = Const::undef(self.width * self.size);
        for init in &self.inits {
            let addr = init.addr.as_uint().expect("initializer address has undefined bits") as i64;
            let offset = (addr - self.start_offset as i64) * self.width as i64;
            for index in 0..init.data.len() {
                let pos = offset + index as i64;
                if pos >= 0 && (pos as usize) < init_data.len() {
                    init_data[pos as usize] = init.data[index];
                }
            }
        }
        init_data
    }

    /// Splits every wide port into `2 ** wide_log2` narrow ports, expanding
    /// the transparency and priority matrices to match.
    pub fn narrow(&mut self) {
        let width = self.width;
        let mut new_rd_map = vec![];
        for (index, port) in self.rd_ports.iter().enumerate() {
            for sub in 0..1usize << port.wide_log2 {
                new_rd_map.push((index, sub));
            }
        }
        let mut new_wr_map = vec![];
        for (index, port) in self.wr_ports.iter().enumerate() {
            for sub in 0..1usize << port.wide_log2 {
                new_wr_map.push((index, sub));
            }
        }
        let mut new_rd_ports = vec![];
        for &(index, sub) in &new_rd_map {
            let orig = &self.rd_ports[index];
            let mut port = orig.clone();
            if sub != 0 {
                port.cell = None;
            }
            if port.wide_log2 != 0 {
                port.data = port.data.extract(sub * width, width);
                port.init_value = port.init_value.slice(sub * width..(sub + 1) * width);
                port.arst_value = port.arst_value.slice(sub * width..(sub + 1) * width);
                port.srst_value = port.srst_value.slice(sub * width..(sub + 1) * width);
                for bit in 0..port.wide_log2 {
                    port.addr[bit] = SigBit::from(sub >> bit & 1 != 0);
                }
                port.wide_log2 = 0;
            }
            port.transparency_mask = new_wr_map.iter().map(|&(windex, _)| orig.transparency_mask[windex]).collect();
            new_rd_ports.push(port);
        }
        let mut new_wr_ports = vec![];
        for &(index, sub) in &new_wr_map {
            let orig = &self.wr_ports[index];
            let mut port = orig.clone();
            if sub != 0 {
                port.cell = None;
            }
            if port.wide_log2 != 0 {
                port.data = port.data.extract(sub * width, width);
                port.en = port.en.extract(sub * width, width);
                for bit in 0..port.wide_log2 {
                    port.addr[bit] = SigBit::from(sub >> bit & 1 != 0);
                }
                port.wide_log2 = 0;
            }
            port.priority_mask = new_wr_map.iter().map(|&(windex, _)| orig.priority_mask[windex]).collect();
            new_wr_ports.push(port);
        }
        self.rd_ports = new_rd_ports;
        self.wr_ports = new_wr_ports;
    }

    /// Rounds `start_offset` down and `size` up so that both are aligned to
    /// `2 ** wide_log2` words.
    pub fn widen_prep(&mut self, wide_log2: usize) {
        let mask = (1usize << wide_log2) - 1;
        let delta = self.start_offset & mask as i32;
        self.start_offset -= delta;
        self.size += delta as usize;
        if self.size & mask != 0 {
            self.size |= mask;
            self.size += 1;
        }
    }

    /// Grows write port `index` to span `2 ** wide_log2` words.  The low
    /// address bits must already be constant; their value selects the lane
    /// that the original data and enable occupy in the widened port.
    pub fn widen_wr_port(&mut self, index: usize, wide_log2: usize) {
        self.widen_prep(wide_log2);
        let width = self.width;
        let port = &mut self.wr_ports[index];
        assert!(port.wide_log2 <= wide_log2);
        if port.wide_log2 < wide_log2 {
            let sub_c = port.addr.extract(0, wide_log2);
            assert!(sub_c.is_fully_const(), "cannot widen write port with non-constant low address bits");
            let sub = sub_c.as_uint().expect("write port address has undefined bits") as usize;
            port.addr.replace(port.wide_log2, &SigSpec::from(Const::zero(wide_log2 - port.wide_log2)));
            let mut new_data = SigSpec::from(Const::undef(width << wide_log2));
            let mut new_en = SigSpec::from(Const::zero(width << wide_log2));
            new_data.replace(width * sub, &port.data);
            new_en.replace(width * sub, &port.en);
            port.data = new_data;
            port.en = new_en;
            port.wide_log2 = wide_log2;
        }
    }

    /// Establishes the preconditions for merging write ports `index1` and
    /// `index2` (`index1 < index2`) into one port at `index1`: transparency
    /// must agree between the two ports for every read port, and no priority
    /// relation may be lost by the merge.
    pub fn prepare_wr_merge(&mut self, module: &mut Module, index1: usize, index2: usize) {
        assert!(index1 < index2);
        for index in 0..self.rd_ports.len() {
            let rport = &self.rd_ports[index];
            if rport.removed {
                continue;
            }
            // Transparent with both write ports: nothing to do.
            if rport.transparency_mask[index1] && rport.transparency_mask[index2] {
                continue;
            }
            if rport.transparency_mask[index1] {
                self.emulate_transparency(module, index1, index);
            }
            if self.rd_ports[index].transparency_mask[index2] {
                self.emulate_transparency(module, index2, index);
            }
        }
        // If port 2 beat a port below port 1, make port 1 beat it too.
        for index in 0..index1 {
            if self.wr_ports[index2].priority_mask[index] {
                self.wr_ports[index1].priority_mask[index] = true;
            }
        }
        // If port 2 beat a port between the two, emulate that relation.
        for index in index1 + 1..index2 {
            if self.wr_ports[index2].priority_mask[index] {
                self.emulate_priority(module, index, index2);
            }
        }
        // If a later port beat port 2, it beats the merged port too.
        for index in index2 + 1..self.wr_ports.len() {
            if self.wr_ports[index].priority_mask[index2] {
                self.wr_ports[index].priority_mask[index1] = true;
            }
        }
    }
}
