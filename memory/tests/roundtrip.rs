use std::collections::BTreeMap;

use spinel_memory::{get_all_memories, Mem, MemInit, MemRd, MemWr};
use spinel_netlist::{id, Const, IdString, Module, SigBit, SigSpec, State};

fn numbered(prefix: &str, index: usize) -> IdString {
    IdString::intern(&format!("{}{}", prefix, index))
}

#[test]
fn test_empty_packed() {
    let mut module = Module::new(id!("top"));
    let mut mem = Mem::new(id!("ram"), 8, 0, 16);
    mem.packed = true;
    mem.emit(&mut module);

    let cell = module.cell(mem.cell.unwrap());
    assert_eq!(cell.ty, id!("$mem"));
    assert_eq!(cell.param_str(id!("MEMID")), "ram");
    assert_eq!(cell.param_int(id!("WIDTH")), 8);
    assert_eq!(cell.param_int(id!("OFFSET")), 0);
    assert_eq!(cell.param_int(id!("SIZE")), 16);
    assert_eq!(cell.param_int(id!("ABITS")), 0);
    assert_eq!(cell.param_int(id!("RD_PORTS")), 0);
    assert_eq!(cell.param_int(id!("WR_PORTS")), 0);
    assert_eq!(*cell.param_const(id!("INIT")), Const::undef(128));
    assert_eq!(*cell.param_const(id!("RD_WIDE_CONTINUATION")), Const::zero(1));
    assert_eq!(*cell.param_const(id!("WR_PRIORITY_MASK")), Const::zero(1));
    assert!(cell.port(id!("RD_ADDR")).is_empty());

    let lifted = get_all_memories(&module);
    assert_eq!(lifted.len(), 1);
    let lifted = &lifted[0];
    assert!(lifted.packed);
    assert_eq!(lifted.memid, id!("ram"));
    assert_eq!(lifted.width, 8);
    assert_eq!(lifted.start_offset, 0);
    assert_eq!(lifted.size, 16);
    assert!(lifted.rd_ports.is_empty());
    assert!(lifted.wr_ports.is_empty());
    assert!(lifted.inits.is_empty());
}

#[test]
fn test_init_merging() {
    let mut mem = Mem::new(id!("rom"), 8, 0, 8);
    mem.inits.push(MemInit {
        cell: None,
        attributes: BTreeMap::new(),
        addr: Const::from_uint(2, 32),
        data: Const::lit("00010010"),
    });
    mem.inits.push(MemInit {
        cell: None,
        attributes: BTreeMap::new(),
        addr: Const::from_uint(5, 32),
        data: Const::lit("00110100").concat(Const::lit("01010110")),
    });
    let init_data = mem.get_init_data();
    assert_eq!(init_data.len(), 64);
    let word = |index: usize| init_data.slice(index * 8..(index + 1) * 8);
    assert_eq!(word(0), Const::undef(8));
    assert_eq!(word(1), Const::undef(8));
    assert_eq!(word(2), Const::lit("00010010"));
    assert_eq!(word(3), Const::undef(8));
    assert_eq!(word(4), Const::undef(8));
    assert_eq!(word(5), Const::lit("00110100"));
    assert_eq!(word(6), Const::lit("01010110"));
    assert_eq!(word(7), Const::undef(8));
}

#[test]
fn test_init_override_and_clipping() {
    let mut mem = Mem::new(id!("rom"), 4, 4, 4);
    // Starts below the array; only its last word lands, at word 0.
    mem.inits.push(MemInit {
        cell: None,
        attributes: BTreeMap::new(),
        addr: Const::from_uint(2, 32),
        data: Const::lit("0001").concat(Const::lit("0010")).concat(Const::lit("0011")),
    });
    // Overlaps the previous initializer; later wins.
    mem.inits.push(MemInit {
        cell: None,
        attributes: BTreeMap::new(),
        addr: Const::from_uint(4, 32),
        data: Const::lit("1111"),
    });
    // Runs off the far end; only its first word lands, at word 3.
    mem.inits.push(MemInit {
        cell: None,
        attributes: BTreeMap::new(),
        addr: Const::from_uint(7, 32),
        data: Const::lit("0110").concat(Const::lit("1010")),
    });
    let init_data = mem.get_init_data();
    let word = |index: usize| init_data.slice(index * 4..(index + 1) * 4);
    assert_eq!(word(0), Const::lit("1111"));
    assert_eq!(word(1), Const::undef(4));
    assert_eq!(word(2), Const::undef(4));
    assert_eq!(word(3), Const::lit("0110"));
}

fn two_port_mem(module: &mut Module) -> Mem {
    let clk = module.add_wire(id!("clk"), 1);
    let raddr = module.add_wire(id!("raddr"), 4);
    let rdata = module.add_wire(id!("rdata"), 4);
    let waddr0 = module.add_wire(id!("waddr0"), 4);
    let wdata0 = module.add_wire(id!("wdata0"), 4);
    let wen0 = module.add_wire(id!("wen0"), 4);
    let waddr1 = module.add_wire(id!("waddr1"), 4);
    let wdata1 = module.add_wire(id!("wdata1"), 4);
    let wen1 = module.add_wire(id!("wen1"), 4);

    let mut mem = Mem::new(id!("ram"), 4, 0, 16);
    let mut rd = MemRd::clocked(clk.clone(), raddr, rdata);
    rd.transparency_mask = vec![true, false];
    mem.rd_ports.push(rd);
    mem.wr_ports.push(MemWr::new(clk.clone(), waddr0, wdata0, wen0));
    let mut wr1 = MemWr::new(clk, waddr1, wdata1, wen1);
    wr1.priority_mask = vec![true, false];
    mem.wr_ports.push(wr1);
    mem.wr_ports[0].priority_mask = vec![false, false];
    mem.inits.push(MemInit {
        cell: None,
        attributes: BTreeMap::new(),
        addr: Const::from_uint(3, 32),
        data: Const::lit("1001"),
    });
    mem
}

#[test]
fn test_unpacked_roundtrip() {
    let mut module = Module::new(id!("top"));
    let mut mem = two_port_mem(&mut module);
    mem.emit(&mut module);

    assert!(module.memories.contains_key(&id!("ram")));
    let decl = &module.memories[&id!("ram")];
    assert_eq!(decl.width, 4);
    assert_eq!(decl.size, 16);
    let portids: Vec<i64> = module
        .cells()
        .filter(|(_, cell)| cell.ty == id!("$memwr"))
        .map(|(_, cell)| cell.param_int(id!("PORTID")))
        .collect();
    assert_eq!(portids, vec![0, 1]);

    let lifted = get_all_memories(&module);
    assert_eq!(lifted.len(), 1);
    let lifted = &lifted[0];
    assert!(!lifted.packed);
    assert_eq!(lifted.width, mem.width);
    assert_eq!(lifted.start_offset, mem.start_offset);
    assert_eq!(lifted.size, mem.size);
    assert_eq!(lifted.rd_ports.len(), 1);
    assert_eq!(lifted.wr_ports.len(), 2);
    assert_eq!(lifted.inits.len(), 1);
    assert_eq!(lifted.rd_ports[0].transparency_mask, vec![true, false]);
    assert_eq!(lifted.rd_ports[0].addr, mem.rd_ports[0].addr);
    assert_eq!(lifted.rd_ports[0].data, mem.rd_ports[0].data);
    assert!(lifted.rd_ports[0].clk_enable);
    assert_eq!(lifted.wr_ports[1].priority_mask, vec![true, false]);
    assert_eq!(lifted.wr_ports[0].en, mem.wr_ports[0].en);
    assert_eq!(lifted.inits[0].addr, Const::from_uint(3, 32));
    assert_eq!(lifted.inits[0].data, Const::lit("1001"));

    // Emitting the lifted copy reuses the satellite cells.
    let cells_before: Vec<_> = module.cells().map(|(id, _)| id).collect();
    let mut lifted = lifted.clone();
    lifted.emit(&mut module);
    let cells_after: Vec<_> = module.cells().map(|(id, _)| id).collect();
    assert_eq!(cells_before, cells_after);
}

#[test]
fn test_packed_roundtrip() {
    let mut module = Module::new(id!("top"));
    let mut mem = two_port_mem(&mut module);
    mem.packed = true;
    mem.emit(&mut module);

    assert!(!module.memories.contains_key(&id!("ram")));
    let lifted = get_all_memories(&module);
    assert_eq!(lifted.len(), 1);
    let lifted = &lifted[0];
    assert!(lifted.packed);
    assert_eq!(lifted.rd_ports.len(), 1);
    assert_eq!(lifted.wr_ports.len(), 2);
    assert_eq!(lifted.rd_ports[0].transparency_mask, vec![true, false]);
    assert_eq!(lifted.wr_ports[1].priority_mask, vec![true, false]);
    assert_eq!(lifted.rd_ports[0].data, mem.rd_ports[0].data);
    assert_eq!(lifted.wr_ports[0].data, mem.wr_ports[0].data);
    // The initializer list collapses into the INIT parameter.
    assert_eq!(lifted.inits.len(), 1);
    assert_eq!(lifted.inits[0].addr.as_uint(), Some(3));
    assert_eq!(lifted.inits[0].data, Const::lit("1001"));
}

#[test]
fn test_wide_read_narrow_writes_packed() {
    let mut module = Module::new(id!("top"));
    let clk = module.add_wire(id!("clk"), 1);
    let mut raddr = module.add_wire(id!("raddr"), 4);
    raddr.replace(0, &SigSpec::from(State::Zero));
    let rdata = module.add_wire(id!("rdata"), 8);
    let waddr0 = module.add_wire(id!("waddr0"), 4);
    let wdata0 = module.add_wire(id!("wdata0"), 4);
    let wen0 = module.add_wire(id!("wen0"), 4);
    let waddr1 = module.add_wire(id!("waddr1"), 4);
    let wdata1 = module.add_wire(id!("wdata1"), 4);
    let wen1 = module.add_wire(id!("wen1"), 4);

    let mut mem = Mem::new(id!("ram"), 4, 0, 16);
    mem.packed = true;
    let mut rd = MemRd::clocked(clk.clone(), raddr, rdata);
    rd.wide_log2 = 1;
    rd.transparency_mask = vec![true, true];
    mem.rd_ports.push(rd);
    let mut wr0 = MemWr::new(clk.clone(), waddr0, wdata0, wen0);
    wr0.priority_mask = vec![false, false];
    mem.wr_ports.push(wr0);
    let mut wr1 = MemWr::new(clk, waddr1, wdata1, wen1);
    wr1.priority_mask = vec![false, false];
    mem.wr_ports.push(wr1);
    mem.emit(&mut module);

    let cell = module.cell(mem.cell.unwrap());
    assert_eq!(cell.param_int(id!("RD_PORTS")), 2);
    assert_eq!(cell.param_int(id!("WR_PORTS")), 2);
    let continuation = cell.param_const(id!("RD_WIDE_CONTINUATION"));
    assert_eq!(continuation[0], State::Zero);
    assert_eq!(continuation[1], State::One);
    // Two sub-ports, each with one raw mask bit per write sub-port.
    assert_eq!(*cell.param_const(id!("RD_TRANSPARENCY_MASK")), Const::ones(4));
    assert_eq!(cell.port(id!("RD_ADDR")).len(), 8);
    // The wide sub-ports differ only in the low address bit.
    let sub0 = cell.port(id!("RD_ADDR")).extract(0, 4);
    let sub1 = cell.port(id!("RD_ADDR")).extract(4, 4);
    assert_eq!(sub0[0], SigBit::Const(State::Zero));
    assert_eq!(sub1[0], SigBit::Const(State::One));
    assert_eq!(sub0.extract(1, 3), sub1.extract(1, 3));

    let lifted = get_all_memories(&module);
    let lifted = &lifted[0];
    assert_eq!(lifted.rd_ports.len(), 1);
    assert_eq!(lifted.rd_ports[0].wide_log2, 1);
    assert_eq!(lifted.rd_ports[0].transparency_mask, vec![true, true]);
    assert_eq!(lifted.rd_ports[0].data, mem.rd_ports[0].data);
    assert_eq!(lifted.rd_ports[0].addr, mem.rd_ports[0].addr);
    assert_eq!(lifted.wr_ports.len(), 2);
    assert_eq!(lifted.wr_ports[0].wide_log2, 0);
}

#[test]
fn test_removed_port_compaction() {
    let mut module = Module::new(id!("top"));
    let clk = module.add_wire(id!("clk"), 1);
    let mut mem = Mem::new(id!("ram"), 4, 0, 16);
    let raddr = module.add_wire(id!("raddr"), 4);
    let rdata = module.add_wire(id!("rdata"), 4);
    let mut rd = MemRd::clocked(clk.clone(), raddr, rdata);
    rd.transparency_mask = vec![true, true, true];
    mem.rd_ports.push(rd);
    for index in 0..3 {
        let waddr = module.add_wire(numbered("waddr", index), 4);
        let wdata = module.add_wire(numbered("wdata", index), 4);
        let wen = module.add_wire(numbered("wen", index), 4);
        let mut wr = MemWr::new(clk.clone(), waddr, wdata, wen);
        wr.priority_mask = vec![false; 3];
        mem.wr_ports.push(wr);
    }
    mem.wr_ports[2].priority_mask = vec![true, true, false];
    mem.emit(&mut module);

    let mut mem = get_all_memories(&module).remove(0);
    mem.wr_ports[1].removed = true;
    mem.emit(&mut module);

    assert_eq!(mem.wr_ports.len(), 2);
    assert_eq!(mem.rd_ports[0].transparency_mask, vec![true, true]);
    assert_eq!(mem.wr_ports[1].priority_mask, vec![true, false]);
    let portids: Vec<i64> = module
        .cells()
        .filter(|(_, cell)| cell.ty == id!("$memwr"))
        .map(|(_, cell)| cell.param_int(id!("PORTID")))
        .collect();
    assert_eq!(portids, vec![0, 1]);
}
