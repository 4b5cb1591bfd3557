use spinel_netlist::{id, Const, MemoryDecl, Module, SigBit, SigSpec, State};

use crate::Mem;

impl Mem {
    /// Writes the aggregate back into the module, in the encoding selected by
    /// `packed`.  Removed ports are compacted away first, together with their
    /// rows and columns in the transparency and priority matrices.
    pub fn emit(&mut self, module: &mut Module) {
        self.check();
        let mut rd_left = vec![];
        for (index, port) in self.rd_ports.iter_mut().enumerate() {
            if port.removed {
                if let Some(cell) = port.cell.take() {
                    module.remove(cell);
                }
            } else {
                rd_left.push(index);
            }
        }
        let mut wr_left = vec![];
        for (index, port) in self.wr_ports.iter_mut().enumerate() {
            if port.removed {
                if let Some(cell) = port.cell.take() {
                    module.remove(cell);
                }
            } else {
                wr_left.push(index);
            }
        }
        for (new_index, &old_index) in rd_left.iter().enumerate() {
            if new_index != old_index {
                self.rd_ports.swap(new_index, old_index);
            }
        }
        self.rd_ports.truncate(rd_left.len());
        for (new_index, &old_index) in wr_left.iter().enumerate() {
            if new_index != old_index {
                self.wr_ports.swap(new_index, old_index);
            }
        }
        self.wr_ports.truncate(wr_left.len());

        for port in &mut self.rd_ports {
            let mask = wr_left.iter().map(|&old_index| port.transparency_mask[old_index]).collect();
            port.transparency_mask = mask;
        }
        for port in &mut self.wr_ports {
            let mask = wr_left.iter().map(|&old_index| port.priority_mask[old_index]).collect();
            port.priority_mask = mask;
        }

        if self.packed {
            self.emit_packed(module);
        } else {
            self.emit_unpacked(module);
        }
    }

    fn emit_packed(&mut self, module: &mut Module) {
        module.memories.shift_remove(&self.memid);
        if self.cell.is_none() {
            if self.memid.is_empty() {
                self.memid = module.generated_name("mem");
            }
            self.cell = Some(module.add_cell(self.memid, id!("$mem")));
        }
        let cell_id = self.cell.unwrap();

        let mut abits = 0;
        for port in &self.rd_ports {
            abits = abits.max(port.addr.len());
        }
        for port in &self.wr_ports {
            abits = abits.max(port.addr.len());
        }

        // One entry per wide sub-port, mapping back to the owning port index.
        let mut wr_port_xlat = vec![];
        for (index, port) in self.wr_ports.iter().enumerate() {
            for _ in 0..1usize << port.wide_log2 {
                wr_port_xlat.push(index);
            }
        }
        let wr_count = self.wr_ports.len();

        let mut rd_wide_continuation = Const::new();
        let mut rd_clk_enable = Const::new();
        let mut rd_clk_polarity = Const::new();
        let mut rd_transparency_mask = Const::new();
        let mut rd_ce_over_srst = Const::new();
        let mut rd_arst_value = Const::new();
        let mut rd_srst_value = Const::new();
        let mut rd_init_value = Const::new();
        let mut rd_clk = SigSpec::new();
        let mut rd_en = SigSpec::new();
        let mut rd_arst = SigSpec::new();
        let mut rd_srst = SigSpec::new();
        let mut rd_addr = SigSpec::new();
        let mut rd_data = SigSpec::new();
        for port in &mut self.rd_ports {
            if let Some(cell) = port.cell.take() {
                module.remove(cell);
            }
            for sub in 0..1usize << port.wide_log2 {
                rd_wide_continuation.push(State::from(sub != 0));
                rd_clk_enable.push(State::from(port.clk_enable));
                rd_clk_polarity.push(State::from(port.clk_polarity));
                assert_eq!(port.transparency_mask.len(), wr_count);
                for &xlat in &wr_port_xlat {
                    rd_transparency_mask.push(State::from(port.transparency_mask[xlat]));
                }
                rd_ce_over_srst.push(State::from(port.ce_over_srst));
                rd_clk.append(port.clk.clone());
                rd_arst.append(port.arst.clone());
                rd_srst.append(port.srst.clone());
                rd_en.append(port.en.clone());
                let mut addr = port.addr.clone();
                addr.extend_u0(abits, false);
                for bit in 0..port.wide_log2 {
                    addr[bit] = SigBit::from(sub >> bit & 1 != 0);
                }
                assert_eq!(addr.len(), abits);
                rd_addr.append(addr);
            }
            rd_arst_value.extend(port.arst_value.iter());
            rd_srst_value.extend(port.srst_value.iter());
            rd_init_value.extend(port.init_value.iter());
            rd_data.append(port.data.clone());
        }
        if self.rd_ports.is_empty() {
            rd_wide_continuation = State::Zero.into();
            rd_clk_enable = State::Zero.into();
            rd_clk_polarity = State::Zero.into();
            rd_transparency_mask = State::Zero.into();
            rd_ce_over_srst = State::Zero.into();
            rd_arst_value = State::Zero.into();
            rd_srst_value = State::Zero.into();
            rd_init_value = State::Zero.into();
        }
        if self.wr_ports.is_empty() {
            rd_transparency_mask = State::Zero.into();
        }

        let mut wr_wide_continuation = Const::new();
        let mut wr_clk_enable = Const::new();
        let mut wr_clk_polarity = Const::new();
        let mut wr_priority_mask = Const::new();
        let mut wr_clk = SigSpec::new();
        let mut wr_en = SigSpec::new();
        let mut wr_addr = SigSpec::new();
        let mut wr_data = SigSpec::new();
        for port in &mut self.wr_ports {
            if let Some(cell) = port.cell.take() {
                module.remove(cell);
            }
            for sub in 0..1usize << port.wide_log2 {
                wr_wide_continuation.push(State::from(sub != 0));
                wr_clk_enable.push(State::from(port.clk_enable));
                wr_clk_polarity.push(State::from(port.clk_polarity));
                for &xlat in &wr_port_xlat {
                    wr_priority_mask.push(State::from(port.priority_mask[xlat]));
                }
                wr_clk.append(port.clk.clone());
                let mut addr = port.addr.clone();
                addr.extend_u0(abits, false);
                for bit in 0..port.wide_log2 {
                    addr[bit] = SigBit::from(sub >> bit & 1 != 0);
                }
                assert_eq!(addr.len(), abits);
                wr_addr.append(addr);
            }
            wr_en.append(port.en.clone());
            wr_data.append(port.data.clone());
        }
        if self.wr_ports.is_empty() {
            wr_wide_continuation = State::Zero.into();
            wr_clk_enable = State::Zero.into();
            wr_clk_polarity = State::Zero.into();
            wr_priority_mask = State::Zero.into();
        }

        for init in &mut self.inits {
            if let Some(cell) = init.cell.take() {
                module.remove(cell);
            }
        }
        let init_data = self.get_init_data();

        let n_rd_ports = rd_clk.len();
        let n_wr_ports = wr_clk.len();
        let cell = module.cell_mut(cell_id);
        cell.attributes = self.attributes.clone();
        cell.set_param(id!("MEMID"), self.memid.as_str());
        cell.set_param(id!("WIDTH"), self.width);
        cell.set_param(id!("OFFSET"), self.start_offset as i64);
        cell.set_param(id!("SIZE"), self.size);
        cell.set_param(id!("ABITS"), abits);
        cell.set_param(id!("INIT"), init_data);
        cell.set_param(id!("RD_PORTS"), n_rd_ports);
        cell.set_param(id!("RD_WIDE_CONTINUATION"), rd_wide_continuation);
        cell.set_param(id!("RD_CLK_ENABLE"), rd_clk_enable);
        cell.set_param(id!("RD_CLK_POLARITY"), rd_clk_polarity);
        cell.set_param(id!("RD_TRANSPARENCY_MASK"), rd_transparency_mask);
        cell.set_param(id!("RD_CE_OVER_SRST"), rd_ce_over_srst);
        cell.set_param(id!("RD_ARST_VALUE"), rd_arst_value);
        cell.set_param(id!("RD_SRST_VALUE"), rd_srst_value);
        cell.set_param(id!("RD_INIT_VALUE"), rd_init_value);
        cell.set_port(id!("RD_CLK"), rd_clk);
        cell.set_port(id!("RD_EN"), rd_en);
        cell.set_port(id!("RD_ARST"), rd_arst);
        cell.set_port(id!("RD_SRST"), rd_srst);
        cell.set_port(id!("RD_ADDR"), rd_addr);
        cell.set_port(id!("RD_DATA"), rd_data);
        cell.set_param(id!("WR_PORTS"), n_wr_ports);
        cell.set_param(id!("WR_WIDE_CONTINUATION"), wr_wide_continuation);
        cell.set_param(id!("WR_CLK_ENABLE"), wr_clk_enable);
        cell.set_param(id!("WR_CLK_POLARITY"), wr_clk_polarity);
        cell.set_param(id!("WR_PRIORITY_MASK"), wr_priority_mask);
        cell.set_port(id!("WR_CLK"), wr_clk);
        cell.set_port(id!("WR_EN"), wr_en);
        cell.set_port(id!("WR_ADDR"), wr_addr);
        cell.set_port(id!("WR_DATA"), wr_data);
    }

    fn emit_unpacked(&mut self, module: &mut Module) {
        if let Some(cell) = self.cell.take() {
            module.remove(cell);
        }
        if self.memid.is_empty() {
            self.memid = module.generated_name("mem");
        }
        let decl = module.memories.entry(self.memid).or_insert_with(|| MemoryDecl {
            name: self.memid,
            width: self.width,
            start_offset: self.start_offset,
            size: self.size,
            attributes: self.attributes.clone(),
        });
        decl.width = self.width;
        decl.start_offset = self.start_offset;
        decl.size = self.size;
        decl.attributes = self.attributes.clone();
        let width = self.width;
        let memid = self.memid;
        for port in &mut self.rd_ports {
            let cell_id = match port.cell {
                Some(cell) => cell,
                None => {
                    let name = module.generated_name("memrd");
                    let cell = module.add_cell(name, id!("$memrd"));
                    port.cell = Some(cell);
                    cell
                }
            };
            let cell = module.cell_mut(cell_id);
            cell.attributes = port.attributes.clone();
            cell.set_param(id!("MEMID"), memid.as_str());
            cell.set_param(id!("ABITS"), port.addr.len());
            cell.set_param(id!("WIDTH"), width << port.wide_log2);
            cell.set_param(id!("CLK_ENABLE"), port.clk_enable);
            cell.set_param(id!("CLK_POLARITY"), port.clk_polarity);
            cell.set_param(
                id!("TRANSPARENCY_MASK"),
                Const::from_iter(port.transparency_mask.iter().map(|&bit| State::from(bit))),
            );
            cell.set_param(id!("CE_OVER_SRST"), port.ce_over_srst);
            cell.set_param(id!("ARST_VALUE"), &port.arst_value);
            cell.set_param(id!("SRST_VALUE"), &port.srst_value);
            cell.set_param(id!("INIT_VALUE"), &port.init_value);
            cell.set_port(id!("CLK"), port.clk.clone());
            cell.set_port(id!("EN"), port.en.clone());
            cell.set_port(id!("ARST"), port.arst.clone());
            cell.set_port(id!("SRST"), port.srst.clone());
            cell.set_port(id!("ADDR"), port.addr.clone());
            cell.set_port(id!("DATA"), port.data.clone());
        }
        for (index, port) in self.wr_ports.iter_mut().enumerate() {
            let cell_id = match port.cell {
                Some(cell) => cell,
                None => {
                    let name = module.generated_name("memwr");
                    let cell = module.add_cell(name, id!("$memwr"));
                    port.cell = Some(cell);
                    cell
                }
            };
            let cell = module.cell_mut(cell_id);
            cell.attributes = port.attributes.clone();
            cell.set_param(id!("MEMID"), memid.as_str());
            cell.set_param(id!("ABITS"), port.addr.len());
            cell.set_param(id!("WIDTH"), width << port.wide_log2);
            cell.set_param(id!("CLK_ENABLE"), port.clk_enable);
            cell.set_param(id!("CLK_POLARITY"), port.clk_polarity);
            cell.set_param(id!("PORTID"), index);
            cell.set_param(
                id!("PRIORITY_MASK"),
                Const::from_iter(port.priority_mask.iter().map(|&bit| State::from(bit))),
            );
            cell.set_port(id!("CLK"), port.clk.clone());
            cell.set_port(id!("EN"), port.en.clone());
            cell.set_port(id!("ADDR"), port.addr.clone());
            cell.set_port(id!("DATA"), port.data.clone());
        }
        for (index, init) in self.inits.iter_mut().enumerate() {
            let cell_id = match init.cell {
                Some(cell) => cell,
                None => {
                    let name = module.generated_name("meminit");
                    let cell = module.add_cell(name, id!("$meminit"));
                    init.cell = Some(cell);
                    cell
                }
            };
            let cell = module.cell_mut(cell_id);
            cell.attributes = init.attributes.clone();
            cell.set_param(id!("MEMID"), memid.as_str());
            cell.set_param(id!("ABITS"), init.addr.len());
            cell.set_param(id!("WIDTH"), width);
            cell.set_param(id!("WORDS"), init.data.len() / width);
            cell.set_param(id!("PRIORITY"), index);
            cell.set_port(id!("ADDR"), SigSpec::from(&init.addr));
            cell.set_port(id!("DATA"), SigSpec::from(&init.data));
        }
    }
}
