//! Kernels and their subkernel partitions.

use std::fmt;

use crate::cfg::ControlFlowGraph;
use crate::declaration::{Declaration, Parameter};

/// Process-wide identity of a subkernel, assigned by the partitioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubkernelId(pub u32);

impl fmt::Display for SubkernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One partition of a kernel's control-flow graph; the unit of translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Subkernel {
    pub id: SubkernelId,
    pub name: String,
    /// Declarations local to this subkernel, in declaration order.
    pub locals: Vec<Declaration>,
    pub cfg: ControlFlowGraph,
}

impl Subkernel {
    pub fn new(id: SubkernelId, name: impl Into<String>, cfg: ControlFlowGraph) -> Self {
        Self { id, name: name.into(), locals: Vec::new(), cfg }
    }

    pub fn with_local(mut self, local: Declaration) -> Self {
        self.locals.push(local);
        self
    }

    pub fn local(&self, name: &str) -> Option<&Declaration> {
        self.locals.iter().find(|local| local.name == name)
    }
}

/// A named entry point (or callable function) and its subkernels.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    pub name: String,
    /// Name of the owning [`Module`](crate::Module).
    pub module: String,
    pub parameters: Vec<Parameter>,
    pub subkernels: Vec<Subkernel>,
}

impl Kernel {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self { name: name.into(), module: module.into(), parameters: Vec::new(), subkernels: Vec::new() }
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_subkernel(mut self, subkernel: Subkernel) -> Self {
        self.subkernels.push(subkernel);
        self
    }

    pub fn subkernel(&self, id: SubkernelId) -> Option<&Subkernel> {
        self.subkernels.iter().find(|sk| sk.id == id)
    }

    pub fn subkernel_by_name(&self, name: &str) -> Option<&Subkernel> {
        self.subkernels.iter().find(|sk| sk.name == name)
    }

    /// First subkernel; execution of a launch starts here.
    pub fn entry(&self) -> Option<&Subkernel> {
        self.subkernels.first()
    }
}
