use std::collections::{BTreeMap, HashMap};

use spinel_netlist::{id, CellId, Const, IdString, MemoryDecl, Module, SigBit, State};

use crate::{ceil_log2, Mem, MemInit, MemRd, MemWr};

/// Satellite cells of every unpacked memory, grouped by memory id.
struct MemIndex {
    rd_ports: HashMap<IdString, Vec<CellId>>,
    wr_ports: HashMap<IdString, Vec<CellId>>,
    inits: HashMap<IdString, Vec<CellId>>,
}

impl MemIndex {
    fn new(module: &Module) -> MemIndex {
        let mut index =
            MemIndex { rd_ports: HashMap::new(), wr_ports: HashMap::new(), inits: HashMap::new() };
        for (cell_id, cell) in module.cells() {
            let ports = if cell.ty == id!("$memrd") {
                &mut index.rd_ports
            } else if cell.ty == id!("$memwr") {
                &mut index.wr_ports
            } else if cell.ty == id!("$meminit") {
                &mut index.inits
            } else {
                continue;
            };
            ports.entry(IdString::intern(cell.param_str(id!("MEMID")))).or_default().push(cell_id);
        }
        index
    }
}

fn mem_from_decl(module: &Module, decl: &MemoryDecl, index: &MemIndex) -> Mem {
    let mut mem = Mem::new(decl.name, decl.width, decl.start_offset, decl.size);
    mem.attributes = decl.attributes.clone();
    if let Some(cells) = index.rd_ports.get(&decl.name) {
        for &cell_id in cells {
            let cell = module.cell(cell_id);
            let data = cell.port(id!("DATA")).clone();
            mem.rd_ports.push(MemRd {
                removed: false,
                cell: Some(cell_id),
                attributes: cell.attributes.clone(),
                clk_enable: cell.param_bool(id!("CLK_ENABLE")),
                clk_polarity: cell.param_bool(id!("CLK_POLARITY")),
                ce_over_srst: cell.param_bool(id!("CE_OVER_SRST")),
                arst_value: cell.param_const(id!("ARST_VALUE")).clone(),
                srst_value: cell.param_const(id!("SRST_VALUE")).clone(),
                init_value: cell.param_const(id!("INIT_VALUE")).clone(),
                clk: cell.port(id!("CLK")).clone(),
                en: cell.port(id!("EN")).clone(),
                arst: cell.port(id!("ARST")).clone(),
                srst: cell.port(id!("SRST")).clone(),
                addr: cell.port(id!("ADDR")).clone(),
                wide_log2: ceil_log2(data.len() / decl.width),
                data,
                transparency_mask: vec![],
            });
        }
    }
    // The write port index within the aggregate is the `PORTID` order, which
    // the priority masks are keyed by.
    let mut portids = vec![];
    if let Some(cells) = index.wr_ports.get(&decl.name) {
        let mut ports = vec![];
        for &cell_id in cells {
            let cell = module.cell(cell_id);
            let data = cell.port(id!("DATA")).clone();
            let port = MemWr {
                removed: false,
                cell: Some(cell_id),
                attributes: cell.attributes.clone(),
                clk_enable: cell.param_bool(id!("CLK_ENABLE")),
                clk_polarity: cell.param_bool(id!("CLK_POLARITY")),
                clk: cell.port(id!("CLK")).clone(),
                en: cell.port(id!("EN")).clone(),
                addr: cell.port(id!("ADDR")).clone(),
                wide_log2: ceil_log2(data.len() / decl.width),
                data,
                priority_mask: vec![],
            };
            ports.push((cell.param_int(id!("PORTID")), port));
        }
        ports.sort_by_key(|&(portid, _)| portid);
        for (portid, port) in ports {
            portids.push(portid);
            mem.wr_ports.push(port);
        }
    }
    for port_index in 0..mem.wr_ports.len() {
        let cell = module.cell(mem.wr_ports[port_index].cell.unwrap());
        let orig_mask = cell.param_const(id!("PRIORITY_MASK"));
        mem.wr_ports[port_index].priority_mask = portids
            .iter()
            .map(|&portid| (portid as usize) < orig_mask.len() && orig_mask[portid as usize] == State::One)
            .collect();
    }
    for port in &mut mem.rd_ports {
        let cell = module.cell(port.cell.unwrap());
        let orig_mask = cell.param_const(id!("TRANSPARENCY_MASK"));
        port.transparency_mask = portids
            .iter()
            .map(|&portid| (portid as usize) < orig_mask.len() && orig_mask[portid as usize] == State::One)
            .collect();
    }
    if let Some(cells) = index.inits.get(&decl.name) {
        let mut inits = vec![];
        for &cell_id in cells {
            let cell = module.cell(cell_id);
            let addr = cell.port(id!("ADDR"));
            let data = cell.port(id!("DATA"));
            if !addr.is_fully_const() {
                panic!("non-constant address {} in memory initialization {}", addr, cell.name);
            }
            if !data.is_fully_const() {
                panic!("non-constant data {} in memory initialization {}", data, cell.name);
            }
            let init = MemInit {
                cell: Some(cell_id),
                attributes: cell.attributes.clone(),
                addr: addr.as_const().unwrap(),
                data: data.as_const().unwrap(),
            };
            inits.push((cell.param_int(id!("PRIORITY")), init));
        }
        inits.sort_by_key(|&(priority, _)| priority);
        for (_, init) in inits {
            mem.inits.push(init);
        }
    }
    tracing::debug!("lifted unpacked memory {}.{}", module.name, mem.memid);
    mem.check();
    mem
}

fn mem_from_cell(module: &Module, cell_id: CellId) -> Mem {
    let cell = module.cell(cell_id);
    assert_eq!(cell.ty, id!("$mem"));
    let width = cell.param_int(id!("WIDTH")) as usize;
    let mut mem = Mem::new(
        IdString::intern(cell.param_str(id!("MEMID"))),
        width,
        cell.param_int(id!("OFFSET")) as i32,
        cell.param_int(id!("SIZE")) as usize,
    );
    let abits = cell.param_int(id!("ABITS")) as usize;
    mem.packed = true;
    mem.cell = Some(cell_id);
    mem.attributes = cell.attributes.clone();
    let init = cell.param_const(id!("INIT"));
    if !init.is_undef() {
        // Each maximal run of not-fully-undefined words becomes one
        // initializer; fully-undefined words are skipped.
        let mut pos = 0;
        while pos < mem.size {
            let word = init.extract((pos * width) as isize, width, State::Undef);
            if word.is_undef() {
                pos += 1;
                continue;
            }
            let mut epos = pos;
            while epos < mem.size {
                let eword = init.extract((epos * width) as isize, width, State::Undef);
                if eword.is_undef() {
                    break;
                }
                epos += 1;
            }
            mem.inits.push(MemInit {
                cell: None,
                attributes: BTreeMap::new(),
                addr: Const::from_uint((mem.start_offset as i64 + pos as i64) as u64, 32),
                data: init.extract((pos * width) as isize, (epos - pos) * width, State::Undef),
            });
            pos = epos;
        }
    }
    let n_rd_ports = cell.param_int(id!("RD_PORTS")) as usize;
    let n_wr_ports = cell.param_int(id!("WR_PORTS")) as usize;
    let rd_wide_continuation = cell.param_const(id!("RD_WIDE_CONTINUATION"));
    let wr_wide_continuation = cell.param_const(id!("WR_WIDE_CONTINUATION"));
    let mut pos = 0;
    while pos < n_rd_ports {
        let mut npos = pos + 1;
        while npos < n_rd_ports && rd_wide_continuation[npos] == State::One {
            npos += 1;
        }
        let wide_log2 = ceil_log2(npos - pos);
        assert_eq!(npos - pos, 1 << wide_log2, "wide port runs must have power-of-two length");
        let transparency = cell
            .param_const(id!("RD_TRANSPARENCY_MASK"))
            .extract((pos * n_wr_ports) as isize, n_wr_ports, State::Zero);
        let transparency_mask = (0..n_wr_ports)
            .filter(|&index| wr_wide_continuation[index] != State::One)
            .map(|index| transparency[index] == State::One)
            .collect();
        let addr = cell.port(id!("RD_ADDR")).extract(pos * abits, abits);
        for bit in 0..wide_log2 {
            assert_eq!(addr[bit], SigBit::Const(State::Zero));
        }
        mem.rd_ports.push(MemRd {
            removed: false,
            cell: None,
            attributes: BTreeMap::new(),
            clk_enable: cell.param_const(id!("RD_CLK_ENABLE"))[pos] == State::One,
            clk_polarity: cell.param_const(id!("RD_CLK_POLARITY"))[pos] == State::One,
            ce_over_srst: cell.param_const(id!("RD_CE_OVER_SRST"))[pos] == State::One,
            arst_value: cell.param_const(id!("RD_ARST_VALUE")).slice(pos * width..npos * width),
            srst_value: cell.param_const(id!("RD_SRST_VALUE")).slice(pos * width..npos * width),
            init_value: cell.param_const(id!("RD_INIT_VALUE")).slice(pos * width..npos * width),
            clk: cell.port(id!("RD_CLK")).extract(pos, 1),
            en: cell.port(id!("RD_EN")).extract(pos, 1),
            arst: cell.port(id!("RD_ARST")).extract(pos, 1),
            srst: cell.port(id!("RD_SRST")).extract(pos, 1),
            addr,
            data: cell.port(id!("RD_DATA")).extract(pos * width, (npos - pos) * width),
            wide_log2,
            transparency_mask,
        });
        pos = npos;
    }
    let mut pos = 0;
    while pos < n_wr_ports {
        let mut npos = pos + 1;
        while npos < n_wr_ports && wr_wide_continuation[npos] == State::One {
            npos += 1;
        }
        let wide_log2 = ceil_log2(npos - pos);
        assert_eq!(npos - pos, 1 << wide_log2, "wide port runs must have power-of-two length");
        let priority = cell
            .param_const(id!("WR_PRIORITY_MASK"))
            .extract((pos * n_wr_ports) as isize, n_wr_ports, State::Zero);
        let priority_mask = (0..n_wr_ports)
            .filter(|&index| wr_wide_continuation[index] != State::One)
            .map(|index| priority[index] == State::One)
            .collect();
        let addr = cell.port(id!("WR_ADDR")).extract(pos * abits, abits);
        for bit in 0..wide_log2 {
            assert_eq!(addr[bit], SigBit::Const(State::Zero));
        }
        mem.wr_ports.push(MemWr {
            removed: false,
            cell: None,
            attributes: BTreeMap::new(),
            clk_enable: cell.param_const(id!("WR_CLK_ENABLE"))[pos] == State::One,
            clk_polarity: cell.param_const(id!("WR_CLK_POLARITY"))[pos] == State::One,
            clk: cell.port(id!("WR_CLK")).extract(pos, 1),
            en: cell.port(id!("WR_EN")).extract(pos * width, (npos - pos) * width),
            addr,
            data: cell.port(id!("WR_DATA")).extract(pos * width, (npos - pos) * width),
            wide_log2,
            priority_mask,
        });
        pos = npos;
    }
    tracing::debug!("lifted packed memory {}.{}", module.name, mem.memid);
    mem.check();
    mem
}

/// Lifts every memory of the module, in both encodings.
pub fn get_all_memories(module: &Module) -> Vec<Mem> {
    let mut res = vec![];
    let index = MemIndex::new(module);
    for decl in module.memories.values() {
        res.push(mem_from_decl(module, decl, &index));
    }
    for (cell_id, cell) in module.cells() {
        if cell.ty == id!("$mem") {
            res.push(mem_from_cell(module, cell_id));
        }
    }
    res
}

/// As [`get_all_memories`], restricted to the module's current selection.
pub fn get_selected_memories(module: &Module) -> Vec<Mem> {
    let mut res = vec![];
    let index = MemIndex::new(module);
    for decl in module.memories.values() {
        if module.is_selected_memory(decl.name) {
            res.push(mem_from_decl(module, decl, &index));
        }
    }
    for (cell_id, cell) in module.selected_cells() {
        if cell.ty == id!("$mem") {
            res.push(mem_from_cell(module, cell_id));
        }
    }
    res
}
