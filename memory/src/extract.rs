use std::collections::HashMap;

use spinel_netlist::{CellId, Const, FfInitVals, FlipFlop, IdString, Module, SigBit, SigSpec, State};

use crate::Mem;

impl Mem {
    /// Hoists the clocking of read port `index` out of the memory, leaving the
    /// port asynchronous, and returns the materialized flip-flop cell.
    ///
    /// When the port has no enable, resets, or initial value, and is
    /// transparent with respect to every write port, the register is inserted
    /// on the address input instead of the data output; constant address bits
    /// are never fed through the register, which both saves bits and keeps
    /// wide-port alignment intact.  In every other case the register lands on
    /// the data output, with a bypass mux per transparent write port.
    ///
    /// Returns `None` when the port was asynchronous already, or when the
    /// address-register style found no address bits to register.
    pub fn extract_rdff(&mut self, module: &mut Module, initvals: &mut FfInitVals, index: usize) -> Option<CellId> {
        if !self.rd_ports[index].clk_enable {
            return None;
        }

        let mut trans_use_addr = true;

        // With no write ports either style would work; data is cheaper.
        if self.wr_ports.is_empty() {
            trans_use_addr = false;
        }

        {
            let port = &self.rd_ports[index];
            if port.en != SigSpec::from(State::One)
                || port.srst != SigSpec::from(State::Zero)
                || port.arst != SigSpec::from(State::Zero)
                || !port.init_value.is_undef()
            {
                trans_use_addr = false;
            }
            if trans_use_addr && !port.transparency_mask.iter().all(|&bit| bit) {
                trans_use_addr = false;
            }
        }

        let cell;
        if trans_use_addr {
            let port = &self.rd_ports[index];
            let reg_width = port.addr.iter().filter(|bit| bit.is_wire()).count();
            if reg_width != 0 {
                let clk = port.clk.clone();
                let clk_polarity = port.clk_polarity;
                let mut addr = port.addr.clone();
                let sig_q =
                    module.add_wire(IdString::intern(&format!("${}$rdreg[{}]$q", self.memid, index)), reg_width);
                let mut sig_d = SigSpec::new();
                let mut pos = 0;
                for bit in 0..addr.len() {
                    if addr[bit].is_wire() {
                        sig_d.push(addr[bit]);
                        addr[bit] = sig_q[pos];
                        pos += 1;
                    }
                }
                let name = IdString::intern(&format!("${}$rdreg[{}]", self.memid, index));
                cell = Some(module.add_dff(Some(name), &clk, &sig_d, &sig_q, clk_polarity));
                self.rd_ports[index].addr = addr;
            } else {
                cell = None;
            }
        } else {
            let port = &self.rd_ports[index];
            assert!(port.arst == SigSpec::from(State::Zero) || port.srst == SigSpec::from(State::Zero));

            let async_d =
                module.add_wire(IdString::intern(&format!("${}$rdreg[{}]$d", self.memid, index)), port.data.len());
            let mut sig_d = async_d.clone();

            for wr_index in 0..self.wr_ports.len() {
                if !self.rd_ports[index].transparency_mask[wr_index] {
                    continue;
                }
                let port = &self.rd_ports[index];
                let wport = &self.wr_ports[wr_index];
                assert!(wport.clk_enable);
                assert_eq!(wport.clk, port.clk);
                assert_eq!(wport.clk_polarity, port.clk_polarity);
                let min_wide_log2 = port.wide_log2.min(wport.wide_log2);
                let max_wide_log2 = port.wide_log2.max(wport.wide_log2);
                let wide_write = wport.wide_log2 > port.wide_log2;
                let raddr_base = port.addr.clone();
                let waddr_base = wport.addr.clone();
                let wdata = wport.data.clone();
                let wen = wport.en.clone();
                let mut sub = 0;
                while sub < 1usize << max_wide_log2 {
                    let mut raddr = raddr_base.clone();
                    let mut waddr = waddr_base.clone();
                    for bit in min_wide_log2..max_wide_log2 {
                        let state = SigBit::from(sub >> bit & 1 != 0);
                        if wide_write {
                            waddr[bit] = state;
                        } else {
                            raddr[bit] = state;
                        }
                    }
                    let addr_eq = if raddr != waddr {
                        let name = IdString::intern(&format!(
                            "${}$rdtransen[{}][{}][{}]$d",
                            self.memid, index, wr_index, sub
                        ));
                        Some(module.add_eq(Some(name), &raddr, &waddr))
                    } else {
                        None
                    };
                    let ewidth = self.width << min_wide_log2;
                    let wsub = if wide_write { sub } else { 0 };
                    let rsub = if wide_write { 0 } else { sub };
                    let mut pos = 0;
                    while pos < ewidth {
                        let mut epos = pos;
                        while epos < ewidth && wen[epos + wsub * self.width] == wen[pos + wsub * self.width] {
                            epos += 1;
                        }
                        let cur = sig_d.extract(pos + rsub * self.width, epos - pos);
                        let other = wdata.extract(pos + wsub * self.width, epos - pos);
                        let en_bit = SigSpec::from(wen[pos + wsub * self.width]);
                        let cond = match &addr_eq {
                            Some(addr_eq) => {
                                let name = IdString::intern(&format!(
                                    "${}$rdtransgate[{}][{}][{}][{}]$d",
                                    self.memid, index, wr_index, sub, pos
                                ));
                                module.add_and(Some(name), &en_bit, addr_eq)
                            }
                            None => en_bit,
                        };
                        let name = IdString::intern(&format!(
                            "${}$rdtransmux[{}][{}][{}][{}]$d",
                            self.memid, index, wr_index, sub, pos
                        ));
                        let merged = module.add_mux(Some(name), &cur, &other, &cond);
                        sig_d.replace(pos + rsub * self.width, &merged);
                        pos = epos;
                    }
                    sub += 1 << min_wide_log2;
                }
            }

            let port = &self.rd_ports[index];
            let mut ff = FlipFlop::new(sig_d, port.data.clone(), port.clk.clone());
            ff.clk_polarity = port.clk_polarity;
            if port.en != SigSpec::from(State::One) {
                ff.en = port.en.clone();
            }
            if port.arst != SigSpec::from(State::Zero) {
                ff.arst = port.arst.clone();
                ff.arst_value = port.arst_value.clone();
            }
            if port.srst != SigSpec::from(State::Zero) {
                ff.srst = port.srst.clone();
                ff.srst_value = port.srst_value.clone();
                ff.ce_over_srst = ff.has_enable() && port.ce_over_srst;
            }
            ff.init_value = port.init_value.clone();
            let name = IdString::intern(&format!("${}$rdreg[{}]", self.memid, index));
            cell = Some(ff.emit(module, name, Some(initvals)));
            self.rd_ports[index].data = async_d;
        }

        tracing::debug!(
            "extracted {} register from read port {} of {}.{}",
            if trans_use_addr { "address" } else { "data" },
            index,
            module.name,
            self.memid,
        );

        let wr_count = self.wr_ports.len();
        let port = &mut self.rd_ports[index];
        port.en = State::One.into();
        port.clk = State::Zero.into();
        port.arst = State::Zero.into();
        port.srst = State::Zero.into();
        port.clk_enable = false;
        port.clk_polarity = true;
        port.ce_over_srst = false;
        port.arst_value = Const::undef(port.data.len());
        port.srst_value = Const::undef(port.data.len());
        port.init_value = Const::undef(port.data.len());
        port.transparency_mask = vec![false; wr_count];

        cell
    }

    /// Removes the priority of write port `index2` over write port `index1`
    /// by gating port `index1`'s enables: it no longer writes where port
    /// `index2` writes the same address in the same cycle.
    pub fn emulate_priority(&mut self, module: &mut Module, index1: usize, index2: usize) {
        if !self.wr_ports[index2].priority_mask[index1] {
            return;
        }
        let width = self.width;
        let port1 = &self.wr_ports[index1];
        let port2 = &self.wr_ports[index2];
        let min_wide_log2 = port1.wide_log2.min(port2.wide_log2);
        let max_wide_log2 = port1.wide_log2.max(port2.wide_log2);
        let wide1 = port1.wide_log2 > port2.wide_log2;
        let addr1_base = port1.addr.clone();
        let addr2_base = port2.addr.clone();
        let en2 = port2.en.clone();
        let mut en1 = port1.en.clone();
        let mut sub = 0;
        while sub < 1usize << max_wide_log2 {
            let mut addr1 = addr1_base.clone();
            let mut addr2 = addr2_base.clone();
            for bit in min_wide_log2..max_wide_log2 {
                let state = SigBit::from(sub >> bit & 1 != 0);
                if wide1 {
                    addr1[bit] = state;
                } else {
                    addr2[bit] = state;
                }
            }
            let addr_eq = module.add_eq(None, &addr1, &addr2);
            let ewidth = width << min_wide_log2;
            let sub1 = if wide1 { sub } else { 0 };
            let sub2 = if wide1 { 0 } else { sub };
            // Enable bits repeat; gate each distinct pair only once.
            let mut cache: HashMap<(SigBit, SigBit), SigBit> = HashMap::new();
            for pos in 0..ewidth {
                let key = (en1[pos + sub1 * width], en2[pos + sub2 * width]);
                let gated = match cache.get(&key) {
                    Some(&bit) => bit,
                    None => {
                        let active2 = module.add_and(None, &addr_eq, &SigSpec::from(key.1));
                        let nactive2 = module.add_not(None, &active2);
                        let gated = module.add_and(None, &SigSpec::from(key.0), &nactive2)[0];
                        cache.insert(key, gated);
                        gated
                    }
                };
                en1[pos + sub1 * width] = gated;
            }
            sub += 1 << min_wide_log2;
        }
        self.wr_ports[index1].en = en1;
        self.wr_ports[index2].priority_mask[index1] = false;
        tracing::trace!("emulated priority of write port {} over {} in {}", index2, index1, self.memid);
    }

    /// Removes the transparency of read port `rd_index` with respect to write
    /// port `wr_index` by inserting a one-cycle-delayed bypass in front of
    /// the read port.
    ///
    /// Write ports with priority over `wr_index` that are also transparent to
    /// this read port are emulated first, highest index first: the bypass
    /// forwards `wr_index`'s data and enables verbatim, so a higher-priority
    /// write would otherwise be shadowed by it.
    pub fn emulate_transparency(&mut self, module: &mut Module, wr_index: usize, rd_index: usize) {
        assert!(self.rd_ports[rd_index].transparency_mask[wr_index]);
        for index in (wr_index + 1..self.wr_ports.len()).rev() {
            if self.wr_ports[index].priority_mask[wr_index] && self.rd_ports[rd_index].transparency_mask[index] {
                self.emulate_transparency(module, index, rd_index);
            }
        }
        let width = self.width;
        let rport = &self.rd_ports[rd_index];
        let wport = &self.wr_ports[wr_index];
        let min_wide_log2 = rport.wide_log2.min(wport.wide_log2);
        let max_wide_log2 = rport.wide_log2.max(wport.wide_log2);
        let wide_write = wport.wide_log2 > rport.wide_log2;
        let rclk = rport.clk.clone();
        let rclk_polarity = rport.clk_polarity;
        let raddr_base = rport.addr.clone();
        let waddr_base = wport.addr.clone();
        let wdata = wport.data.clone();
        let wen = wport.en.clone();
        let mut rdata = rport.data.clone();
        // The write data, delayed to line up with the registered read.
        let name = module.generated_name("wdata_q");
        let wdata_q = module.add_wire(name, wdata.len());
        module.add_dff(None, &rclk, &wdata, &wdata_q, rclk_polarity);
        let mut sub = 0;
        while sub < 1usize << max_wide_log2 {
            let mut raddr = raddr_base.clone();
            let mut waddr = waddr_base.clone();
            for bit in min_wide_log2..max_wide_log2 {
                let state = SigBit::from(sub >> bit & 1 != 0);
                if wide_write {
                    waddr[bit] = state;
                } else {
                    raddr[bit] = state;
                }
            }
            let addr_eq =
                if raddr != waddr { Some(module.add_eq(None, &raddr, &waddr)) } else { None };
            let ewidth = width << min_wide_log2;
            let wsub = if wide_write { sub } else { 0 };
            let rsub = if wide_write { 0 } else { sub };
            let name = module.generated_name("rdata_a");
            let rdata_a = module.add_wire(name, ewidth);
            let mut pos = 0;
            while pos < ewidth {
                let mut epos = pos;
                while epos < ewidth && wen[epos + wsub * width] == wen[pos + wsub * width] {
                    epos += 1;
                }
                let en_bit = SigSpec::from(wen[pos + wsub * width]);
                let cond = match &addr_eq {
                    Some(addr_eq) => module.add_and(None, &en_bit, addr_eq),
                    None => en_bit,
                };
                let name = module.generated_name("cond_q");
                let cond_q = module.add_wire(name, 1);
                module.add_dff(None, &rclk, &cond, &cond_q, rclk_polarity);
                let cur = rdata_a.extract(pos, epos - pos);
                let other = wdata_q.extract(pos + wsub * width, epos - pos);
                module.add_mux_into(None, &cur, &other, &cond_q, &rdata.extract(pos + rsub * width, epos - pos));
                pos = epos;
            }
            rdata.replace(rsub * width, &rdata_a);
            sub += 1 << min_wide_log2;
        }
        self.rd_ports[rd_index].data = rdata;
        self.rd_ports[rd_index].transparency_mask[wr_index] = false;
        tracing::trace!(
            "emulated transparency of read port {} with write port {} in {}",
            rd_index,
            wr_index,
            self.memid,
        );
    }
}
