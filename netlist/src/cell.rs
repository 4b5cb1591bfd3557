use std::collections::BTreeMap;

use crate::{Const, IdString, ParamValue, SigSpec};

/// A cell instance: a typed primitive with parameter, connection, and
/// attribute maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub name: IdString,
    pub ty: IdString,
    pub parameters: BTreeMap<IdString, ParamValue>,
    pub connections: BTreeMap<IdString, SigSpec>,
    pub attributes: BTreeMap<IdString, ParamValue>,
}

impl Cell {
    pub fn new(name: IdString, ty: IdString) -> Cell {
        Cell {
            name,
            ty,
            parameters: BTreeMap::new(),
            connections: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn set_param(&mut self, key: IdString, value: impl Into<ParamValue>) {
        self.parameters.insert(key, value.into());
    }

    pub fn param(&self, key: IdString) -> &ParamValue {
        match self.parameters.get(&key) {
            Some(value) => value,
            None => panic!("cell {} has no parameter {}", self.name, key),
        }
    }

    pub fn param_int(&self, key: IdString) -> i64 {
        self.param(key).as_int()
    }

    pub fn param_bool(&self, key: IdString) -> bool {
        self.param(key).as_bool()
    }

    pub fn param_const(&self, key: IdString) -> &Const {
        self.param(key).as_const()
    }

    pub fn param_str(&self, key: IdString) -> &str {
        self.param(key).as_str()
    }

    pub fn set_port(&mut self, key: IdString, sig: impl Into<SigSpec>) {
        self.connections.insert(key, sig.into());
    }

    pub fn port(&self, key: IdString) -> &SigSpec {
        match self.connections.get(&key) {
            Some(sig) => sig,
            None => panic!("cell {} has no connection {}", self.name, key),
        }
    }

    pub fn has_port(&self, key: IdString) -> bool {
        self.connections.contains_key(&key)
    }
}
