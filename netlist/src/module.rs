use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use crate::{id, Cell, IdString, ParamValue, SigSpec};

/// Index of a wire within its module.  Wires are never deallocated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct WireId(u32);

impl WireId {
    pub fn from_index(index: usize) -> WireId {
        WireId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a cell within its module.  Stable across removals of other cells.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CellId(u32);

impl CellId {
    pub fn from_index(index: usize) -> CellId {
        CellId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named bit vector owned by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    pub name: IdString,
    pub width: usize,
    pub attributes: BTreeMap<IdString, ParamValue>,
}

/// A named memory declaration, referenced by `$memrd`/`$memwr`/`$meminit`
/// satellite cells through their `MEMID` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDecl {
    pub name: IdString,
    pub width: usize,
    pub start_offset: i32,
    pub size: usize,
    pub attributes: BTreeMap<IdString, ParamValue>,
}

#[derive(Debug, Clone, Default)]
struct Selection {
    cells: BTreeSet<CellId>,
    memories: BTreeSet<IdString>,
}

/// A module: arenas of wires and cells, plus named memory declarations.
///
/// Cells are removed by tombstoning; cell ids stay valid for the lifetime of
/// the module.  An optional selection restricts which cells and memories the
/// batch entry points visit; without one, everything is selected.
#[derive(Debug)]
pub struct Module {
    pub name: IdString,
    wires: Vec<Wire>,
    cells: Vec<Option<Cell>>,
    pub memories: IndexMap<IdString, MemoryDecl>,
    pub attributes: BTreeMap<IdString, ParamValue>,
    selection: Option<Selection>,
    next_generated: u32,
}

impl Module {
    pub fn new(name: IdString) -> Module {
        Module {
            name,
            wires: vec![],
            cells: vec![],
            memories: IndexMap::new(),
            attributes: BTreeMap::new(),
            selection: None,
            next_generated: 0,
        }
    }

    /// Returns a fresh identifier of the form `$<kind>$<n>`, unique within
    /// this module.
    pub fn generated_name(&mut self, kind: &str) -> IdString {
        let index = self.next_generated;
        self.next_generated += 1;
        IdString::intern(&format!("${}${}", kind, index))
    }

    pub fn add_wire(&mut self, name: IdString, width: usize) -> SigSpec {
        let id = WireId::from_index(self.wires.len());
        self.wires.push(Wire { name, width, attributes: BTreeMap::new() });
        SigSpec::wire(id, width)
    }

    pub fn wire(&self, id: WireId) -> &Wire {
        &self.wires[id.index()]
    }

    pub fn wire_mut(&mut self, id: WireId) -> &mut Wire {
        &mut self.wires[id.index()]
    }

    pub fn wires(&self) -> impl Iterator<Item = (WireId, &Wire)> {
        self.wires.iter().enumerate().map(|(index, wire)| (WireId::from_index(index), wire))
    }

    pub fn add_cell(&mut self, name: IdString, ty: IdString) -> CellId {
        let id = CellId::from_index(self.cells.len());
        self.cells.push(Some(Cell::new(name, ty)));
        id
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        self.cells[id.index()].as_ref().expect("cell has been removed")
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        self.cells[id.index()].as_mut().expect("cell has been removed")
    }

    pub fn remove(&mut self, id: CellId) {
        assert!(self.cells[id.index()].take().is_some(), "cell removed twice");
        if let Some(selection) = &mut self.selection {
            selection.cells.remove(&id);
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(index, cell)| cell.as_ref().map(|cell| (CellId::from_index(index), cell)))
    }

    pub fn select_cell(&mut self, id: CellId) {
        self.selection.get_or_insert_with(Selection::default).cells.insert(id);
    }

    pub fn select_memory(&mut self, name: IdString) {
        self.selection.get_or_insert_with(Selection::default).memories.insert(name);
    }

    /// Drops the selection; all cells and memories become selected again.
    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn is_selected_cell(&self, id: CellId) -> bool {
        match &self.selection {
            Some(selection) => selection.cells.contains(&id),
            None => true,
        }
    }

    pub fn is_selected_memory(&self, name: IdString) -> bool {
        match &self.selection {
            Some(selection) => selection.memories.contains(&name),
            None => true,
        }
    }

    pub fn selected_cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells().filter(|(id, _)| self.is_selected_cell(*id))
    }

    fn add_gate_output(&mut self, name: IdString, width: usize) -> SigSpec {
        self.add_wire(IdString::intern(&format!("{}$y", name)), width)
    }

    /// `y = (a == b)`, one bit.
    pub fn add_eq(&mut self, name: Option<IdString>, a: &SigSpec, b: &SigSpec) -> SigSpec {
        assert_eq!(a.len(), b.len());
        let name = name.unwrap_or_else(|| self.generated_name("eq"));
        let y = self.add_gate_output(name, 1);
        let cell = self.add_cell(name, id!("$eq"));
        let cell = self.cell_mut(cell);
        cell.set_param(id!("WIDTH"), a.len());
        cell.set_port(id!("A"), a.clone());
        cell.set_port(id!("B"), b.clone());
        cell.set_port(id!("Y"), y.clone());
        y
    }

    /// `y = a & b`, bitwise.
    pub fn add_and(&mut self, name: Option<IdString>, a: &SigSpec, b: &SigSpec) -> SigSpec {
        assert_eq!(a.len(), b.len());
        let name = name.unwrap_or_else(|| self.generated_name("and"));
        let y = self.add_gate_output(name, a.len());
        let cell = self.add_cell(name, id!("$and"));
        let cell = self.cell_mut(cell);
        cell.set_param(id!("WIDTH"), a.len());
        cell.set_port(id!("A"), a.clone());
        cell.set_port(id!("B"), b.clone());
        cell.set_port(id!("Y"), y.clone());
        y
    }

    /// `y = !a`, bitwise.
    pub fn add_not(&mut self, name: Option<IdString>, a: &SigSpec) -> SigSpec {
        let name = name.unwrap_or_else(|| self.generated_name("not"));
        let y = self.add_gate_output(name, a.len());
        let cell = self.add_cell(name, id!("$not"));
        let cell = self.cell_mut(cell);
        cell.set_param(id!("WIDTH"), a.len());
        cell.set_port(id!("A"), a.clone());
        cell.set_port(id!("Y"), y.clone());
        y
    }

    /// `y = s ? b : a`, driving a fresh wire.
    pub fn add_mux(&mut self, name: Option<IdString>, a: &SigSpec, b: &SigSpec, s: &SigSpec) -> SigSpec {
        let name = name.unwrap_or_else(|| self.generated_name("mux"));
        let y = self.add_gate_output(name, a.len());
        self.add_mux_into(Some(name), a, b, s, &y);
        y
    }

    /// `y = s ? b : a`, driving an existing signal.
    pub fn add_mux_into(&mut self, name: Option<IdString>, a: &SigSpec, b: &SigSpec, s: &SigSpec, y: &SigSpec) {
        assert_eq!(a.len(), b.len());
        assert_eq!(a.len(), y.len());
        assert_eq!(s.len(), 1);
        let name = name.unwrap_or_else(|| self.generated_name("mux"));
        let cell = self.add_cell(name, id!("$mux"));
        let cell = self.cell_mut(cell);
        cell.set_param(id!("WIDTH"), a.len());
        cell.set_port(id!("A"), a.clone());
        cell.set_port(id!("B"), b.clone());
        cell.set_port(id!("S"), s.clone());
        cell.set_port(id!("Y"), y.clone());
    }

    /// A plain D flip-flop without enable or resets.
    pub fn add_dff(&mut self, name: Option<IdString>, clk: &SigSpec, d: &SigSpec, q: &SigSpec, clk_polarity: bool) -> CellId {
        assert_eq!(clk.len(), 1);
        assert_eq!(d.len(), q.len());
        let name = name.unwrap_or_else(|| self.generated_name("dff"));
        let cell = self.add_cell(name, id!("$dff"));
        let cell_mut = self.cell_mut(cell);
        cell_mut.set_param(id!("WIDTH"), d.len());
        cell_mut.set_param(id!("CLK_POLARITY"), clk_polarity);
        cell_mut.set_port(id!("CLK"), clk.clone());
        cell_mut.set_port(id!("D"), d.clone());
        cell_mut.set_port(id!("Q"), q.clone());
        cell
    }
}
