use spinel_memory::{Mem, MemRd, MemWr};
use spinel_netlist::{id, Cell, Const, FfInitVals, Module, SigBit, SigSpec, State};

fn find_cells<'a>(module: &'a Module, ty: &str) -> Vec<&'a Cell> {
    module.cells().filter(|(_, cell)| cell.ty == id!(ty)).map(|(_, cell)| cell).collect()
}

#[test]
fn test_async_port_untouched() {
    let mut module = Module::new(id!("top"));
    let raddr = module.add_wire(id!("raddr"), 4);
    let rdata = module.add_wire(id!("rdata"), 4);
    let mut mem = Mem::new(id!("ram"), 4, 0, 16);
    mem.rd_ports.push(MemRd::asynchronous(raddr, rdata));
    mem.check();
    let mut initvals = FfInitVals::new();
    assert_eq!(mem.extract_rdff(&mut module, &mut initvals, 0), None);
    assert_eq!(module.cells().count(), 0);
}

#[test]
fn test_address_style() {
    let mut module = Module::new(id!("top"));
    let clk = module.add_wire(id!("clk"), 1);
    let raddr_wires = module.add_wire(id!("raddr"), 4);
    let mut raddr = raddr_wires.clone();
    raddr.append(SigSpec::from(Const::zero(2)));
    let rdata = module.add_wire(id!("rdata"), 4);
    let waddr = module.add_wire(id!("waddr"), 6);
    let wdata = module.add_wire(id!("wdata"), 4);
    let wen = module.add_wire(id!("wen"), 4);

    let mut mem = Mem::new(id!("ram"), 4, 0, 64);
    let mut rd = MemRd::clocked(clk.clone(), raddr, rdata.clone());
    rd.transparency_mask = vec![true];
    mem.rd_ports.push(rd);
    let mut wr = MemWr::new(clk, waddr, wdata, wen);
    wr.priority_mask = vec![false];
    mem.wr_ports.push(wr);
    mem.check();

    let mut initvals = FfInitVals::new();
    let cell = mem.extract_rdff(&mut module, &mut initvals, 0);
    let cell = module.cell(cell.unwrap());
    assert_eq!(cell.ty, id!("$dff"));
    // Only the four signal bits of the address are registered.
    assert_eq!(cell.param_int(id!("WIDTH")), 4);
    assert_eq!(*cell.port(id!("D")), raddr_wires);

    let port = &mem.rd_ports[0];
    assert!(!port.clk_enable);
    assert_eq!(port.en, SigSpec::from(State::One));
    assert_eq!(port.transparency_mask, vec![false]);
    // The data output is untouched; the address now comes out of the register,
    // with the constant bits passed straight through.
    assert_eq!(port.data, rdata);
    assert_eq!(port.addr.extract(0, 4), *cell.port(id!("Q")));
    assert_eq!(port.addr[4], SigBit::Const(State::Zero));
    assert_eq!(port.addr[5], SigBit::Const(State::Zero));
    mem.check();
}

#[test]
fn test_data_style() {
    let mut module = Module::new(id!("top"));
    let clk = module.add_wire(id!("clk"), 1);
    let raddr = module.add_wire(id!("raddr"), 4);
    let rdata = module.add_wire(id!("rdata"), 4);
    let srst = module.add_wire(id!("srst"), 1);
    let waddr = module.add_wire(id!("waddr"), 4);
    let wdata = module.add_wire(id!("wdata"), 4);
    let wen_bit = module.add_wire(id!("wen"), 1);

    let mut mem = Mem::new(id!("ram"), 4, 0, 16);
    let mut rd = MemRd::clocked(clk.clone(), raddr, rdata.clone());
    rd.srst = srst.clone();
    rd.srst_value = Const::zero(4);
    rd.transparency_mask = vec![true];
    mem.rd_ports.push(rd);
    let mut wr = MemWr::new(clk, waddr, wdata.clone(), SigSpec::repeat(wen_bit[0], 4));
    wr.priority_mask = vec![false];
    mem.wr_ports.push(wr);
    mem.check();

    let mut initvals = FfInitVals::new();
    let cell = mem.extract_rdff(&mut module, &mut initvals, 0);
    let cell = module.cell(cell.unwrap());
    assert_eq!(cell.ty, id!("$dff"));
    assert_eq!(cell.param_int(id!("WIDTH")), 4);
    assert_eq!(*cell.param_const(id!("SRST_VALUE")), Const::zero(4));
    assert!(!cell.param_bool(id!("CE_OVER_SRST")));
    assert_eq!(*cell.port(id!("SRST")), srst);
    assert_eq!(*cell.port(id!("EN")), SigSpec::from(State::One));
    // The register output drives the old data signal; the port itself now
    // produces the asynchronous read value.
    assert_eq!(*cell.port(id!("Q")), rdata);
    assert_ne!(mem.rd_ports[0].data, rdata);

    // One bypass: the whole word shares one write-enable bit.
    assert_eq!(find_cells(&module, "$eq").len(), 1);
    assert_eq!(find_cells(&module, "$and").len(), 1);
    let muxes = find_cells(&module, "$mux");
    assert_eq!(muxes.len(), 1);
    assert_eq!(*muxes[0].port(id!("B")), wdata);

    let port = &mem.rd_ports[0];
    assert!(!port.clk_enable);
    assert_eq!(port.srst, SigSpec::from(State::Zero));
    assert!(port.init_value.is_undef());
    assert_eq!(port.transparency_mask, vec![false]);
    mem.check();
}

#[test]
fn test_data_style_wide_write() {
    let mut module = Module::new(id!("top"));
    let clk = module.add_wire(id!("clk"), 1);
    let raddr = module.add_wire(id!("raddr"), 4);
    let rdata = module.add_wire(id!("rdata"), 4);
    let srst = module.add_wire(id!("srst"), 1);
    let mut waddr = module.add_wire(id!("waddr"), 4);
    waddr.replace(0, &SigSpec::from(State::Zero));
    let wdata = module.add_wire(id!("wdata"), 8);
    let wen_bit = module.add_wire(id!("wen"), 1);

    let mut mem = Mem::new(id!("ram"), 4, 0, 16);
    let mut rd = MemRd::clocked(clk.clone(), raddr, rdata.clone());
    rd.srst = srst;
    rd.srst_value = Const::zero(4);
    rd.transparency_mask = vec![true];
    mem.rd_ports.push(rd);
    let mut wr = MemWr::new(clk, waddr, wdata, SigSpec::repeat(wen_bit[0], 8));
    wr.wide_log2 = 1;
    wr.priority_mask = vec![false];
    mem.wr_ports.push(wr);
    mem.check();

    let mut initvals = FfInitVals::new();
    mem.extract_rdff(&mut module, &mut initvals, 0).unwrap();
    // One bypass per write lane: the read address is compared against each
    // wide sub-position of the write port.
    assert_eq!(find_cells(&module, "$eq").len(), 2);
    assert_eq!(find_cells(&module, "$and").len(), 2);
    assert_eq!(find_cells(&module, "$mux").len(), 2);
    assert_eq!(find_cells(&module, "$dff").len(), 1);
    mem.check();
}

#[test]
fn test_data_style_init_value() {
    let mut module = Module::new(id!("top"));
    let clk = module.add_wire(id!("clk"), 1);
    let raddr = module.add_wire(id!("raddr"), 4);
    let rdata = module.add_wire(id!("rdata"), 4);

    let mut mem = Mem::new(id!("ram"), 4, 0, 16);
    let mut rd = MemRd::clocked(clk, raddr, rdata.clone());
    rd.init_value = Const::lit("1010");
    mem.rd_ports.push(rd);
    mem.check();

    let mut initvals = FfInitVals::new();
    mem.extract_rdff(&mut module, &mut initvals, 0).unwrap();
    // No write ports, so the register lands on the data side and carries the
    // port's initial value.
    assert_eq!(initvals.get_init(&rdata), Const::lit("1010"));
    assert!(mem.rd_ports[0].init_value.is_undef());
    mem.check();
}
