use std::collections::HashMap;

use crate::{id, CellId, Const, IdString, Module, SigBit, SigSpec, State};

/// A flip-flop under construction, emitted as a single `$dff` cell.
///
/// The output is determined by the following rules:
///
/// - at the beginning of time, the output is set to `init_value`
/// - whenever `arst` is active, the output is set to `arst_value`
/// - whenever `arst` is not active, and an active edge happens on `clk`:
///   - if `ce_over_srst` is true:
///     - if `en` is false, output value is unchanged
///     - if `srst` is active, the output is set to `srst_value`
///   - if `ce_over_srst` is false:
///     - if `srst` is active, the output is set to `srst_value`
///     - if `en` is false, output value is unchanged
///   - otherwise, the output is set to `data`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlipFlop {
    pub data: SigSpec,
    pub q: SigSpec,
    pub clk: SigSpec,
    pub clk_polarity: bool,
    pub en: SigSpec,
    pub arst: SigSpec,
    pub srst: SigSpec,
    pub ce_over_srst: bool,

    pub arst_value: Const,
    pub srst_value: Const,
    pub init_value: Const,
}

impl FlipFlop {
    pub fn new(data: SigSpec, q: SigSpec, clk: impl Into<SigSpec>) -> Self {
        assert_eq!(data.len(), q.len());
        let width = data.len();
        FlipFlop {
            data,
            q,
            clk: clk.into(),
            clk_polarity: true,
            en: State::One.into(),
            arst: State::Zero.into(),
            srst: State::Zero.into(),
            ce_over_srst: false,
            arst_value: Const::undef(width),
            srst_value: Const::undef(width),
            init_value: Const::undef(width),
        }
    }

    pub fn with_enable(self, en: impl Into<SigSpec>) -> Self {
        Self { en: en.into(), ..self }
    }

    pub fn with_arst(self, arst: impl Into<SigSpec>, arst_value: impl Into<Const>) -> Self {
        Self { arst: arst.into(), arst_value: arst_value.into(), ..self }
    }

    pub fn with_srst(self, srst: impl Into<SigSpec>, srst_value: impl Into<Const>) -> Self {
        Self { srst: srst.into(), srst_value: srst_value.into(), ..self }
    }

    pub fn with_init(self, value: impl Into<Const>) -> Self {
        Self { init_value: value.into(), ..self }
    }

    pub fn output_len(&self) -> usize {
        self.data.len()
    }

    pub fn has_enable(&self) -> bool {
        self.en != SigSpec::from(State::One)
    }

    pub fn has_arst(&self) -> bool {
        self.arst != SigSpec::from(State::Zero)
    }

    pub fn has_srst(&self) -> bool {
        self.srst != SigSpec::from(State::Zero)
    }

    pub fn has_init_value(&self) -> bool {
        !self.init_value.is_undef()
    }

    /// Writes the flip-flop into the module as a `$dff` cell.  The initial
    /// value, if any, is recorded in `initvals` against the `q` signal.
    pub fn emit(self, module: &mut Module, name: IdString, mut initvals: Option<&mut FfInitVals>) -> CellId {
        assert_eq!(self.clk.len(), 1);
        assert_eq!(self.en.len(), 1);
        assert_eq!(self.arst.len(), 1);
        assert_eq!(self.srst.len(), 1);
        assert_eq!(self.data.len(), self.q.len());
        assert_eq!(self.arst_value.len(), self.data.len());
        assert_eq!(self.srst_value.len(), self.data.len());
        assert_eq!(self.init_value.len(), self.data.len());
        let cell = module.add_cell(name, id!("$dff"));
        let cell_mut = module.cell_mut(cell);
        cell_mut.set_param(id!("WIDTH"), self.data.len());
        cell_mut.set_param(id!("CLK_POLARITY"), self.clk_polarity);
        cell_mut.set_param(id!("CE_OVER_SRST"), self.ce_over_srst);
        cell_mut.set_param(id!("ARST_VALUE"), self.arst_value);
        cell_mut.set_param(id!("SRST_VALUE"), self.srst_value);
        cell_mut.set_port(id!("CLK"), self.clk);
        cell_mut.set_port(id!("EN"), self.en);
        cell_mut.set_port(id!("ARST"), self.arst);
        cell_mut.set_port(id!("SRST"), self.srst);
        cell_mut.set_port(id!("D"), self.data);
        cell_mut.set_port(id!("Q"), self.q.clone());
        if !self.init_value.is_undef() {
            let initvals = initvals.as_mut().expect("flip-flop with initial value requires an FfInitVals store");
            initvals.set_init(module, &self.q, &self.init_value);
        }
        cell
    }
}

/// Tracks initial values of wire bits, mirrored in the `init` attribute of
/// the wires themselves.
#[derive(Debug, Default)]
pub struct FfInitVals {
    bits: HashMap<SigBit, State>,
}

impl FfInitVals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the store from the `init` attributes present on module wires.
    pub fn from_module(module: &Module) -> Self {
        let mut initvals = FfInitVals::new();
        for (wire_id, wire) in module.wires() {
            let Some(init) = wire.attributes.get(&id!("init")) else {
                continue;
            };
            for (offset, state) in init.as_const().iter().enumerate().take(wire.width) {
                if state != State::Undef {
                    initvals.bits.insert(SigBit::Wire { wire: wire_id, offset }, state);
                }
            }
        }
        initvals
    }

    pub fn set_init(&mut self, module: &mut Module, sig: &SigSpec, value: &Const) {
        assert_eq!(sig.len(), value.len());
        for (bit, state) in sig.iter().zip(value.iter()) {
            let SigBit::Wire { wire, offset } = bit else {
                assert!(state == State::Undef || bit.as_state() == Some(state), "initial value on constant bit");
                continue;
            };
            if state == State::Undef {
                self.bits.remove(&bit);
            } else {
                self.bits.insert(bit, state);
            }
            let wire = module.wire_mut(wire);
            let mut init = match wire.attributes.get(&id!("init")) {
                Some(value) => value.as_const().clone(),
                None => Const::undef(wire.width),
            };
            init[offset] = state;
            if init.is_undef() {
                wire.attributes.remove(&id!("init"));
            } else {
                wire.attributes.insert(id!("init"), init.into());
            }
        }
    }

    pub fn get_init(&self, sig: &SigSpec) -> Const {
        Const::from_iter(sig.iter().map(|bit| match bit {
            SigBit::Const(state) => state,
            bit => self.bits.get(&bit).copied().unwrap_or(State::Undef),
        }))
    }
}
