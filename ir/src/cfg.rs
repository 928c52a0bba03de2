//! Control-flow graph of a subkernel.
//!
//! Blocks are stored in layout order; a block without a terminator falls through to the
//! next one. Branches name their target by label.

use crate::instruction::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self { label: label.into(), instructions }
    }

    /// Whether the last instruction transfers control unconditionally.
    pub fn is_terminated(&self) -> bool {
        self.instructions.last().is_some_and(|inst| inst.opcode.is_terminator() && inst.guard.is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: BasicBlock) -> BlockId {
        self.blocks.push(block);
        BlockId(self.blocks.len() - 1)
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn find_label(&self, label: &str) -> Option<BlockId> {
        self.blocks.iter().position(|block| block.label == label).map(BlockId)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }

    pub fn instructions_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.blocks.iter_mut().flat_map(|block| block.instructions.iter_mut())
    }
}

impl FromIterator<BasicBlock> for ControlFlowGraph {
    fn from_iter<T: IntoIterator<Item = BasicBlock>>(iter: T) -> Self {
        Self { blocks: iter.into_iter().collect() }
    }
}
