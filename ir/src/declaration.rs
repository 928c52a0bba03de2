//! Variable declarations and kernel parameters.

use warpjit_dtype::{AddressSpace, ScalarType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Attribute {
    #[default]
    None,
    /// Size unknown at compile time (`.extern .shared`), fixed at launch.
    Extern,
}

/// A module-level or subkernel-local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub space: AddressSpace,
    pub attribute: Attribute,
    pub ty: ScalarType,
    /// Declared alignment; `0` means the element width.
    pub alignment: u32,
    pub elements: u32,
}

impl Declaration {
    pub fn new(name: impl Into<String>, space: AddressSpace, ty: ScalarType) -> Self {
        Self { name: name.into(), space, attribute: Attribute::None, ty, alignment: 0, elements: 1 }
    }

    pub fn global(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, AddressSpace::Global, ty)
    }

    pub fn shared(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, AddressSpace::Shared, ty)
    }

    pub fn extern_shared(name: impl Into<String>, ty: ScalarType) -> Self {
        Self { attribute: Attribute::Extern, elements: 0, ..Self::new(name, AddressSpace::Shared, ty) }
    }

    pub fn constant(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, AddressSpace::Const, ty)
    }

    pub fn local(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, AddressSpace::Local, ty)
    }

    pub fn with_elements(mut self, elements: u32) -> Self {
        self.elements = elements;
        self
    }

    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn is_extern(&self) -> bool {
        self.attribute == Attribute::Extern
    }

    pub fn alignment(&self) -> u32 {
        if self.alignment == 0 { self.ty.bytes() } else { self.alignment }
    }

    pub fn size(&self) -> u32 {
        self.ty.bytes() * self.elements
    }
}

/// A declared kernel or function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: ScalarType,
    pub elements: u32,
    /// Declared alignment; `0` means the element width.
    pub alignment: u32,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: ScalarType) -> Self {
        Self { name: name.into(), ty, elements: 1, alignment: 0 }
    }

    pub fn with_elements(mut self, elements: u32) -> Self {
        self.elements = elements;
        self
    }

    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn alignment(&self) -> u32 {
        if self.alignment == 0 { self.ty.bytes() } else { self.alignment }
    }

    pub fn size(&self) -> u32 {
        self.ty.bytes() * self.elements
    }
}
