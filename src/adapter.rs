// Adapter enumeration results
//
// Plain values produced by `Instance::enumerate_adapters`. They hold no
// native handles and stay valid after the instance is gone.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

/// Optional capabilities an adapter reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdapterSupports {
    pub geometry_shader: bool,
    pub anisotropy: bool,
    pub max_anisotropy: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Adapter {
    /// Position in the enumeration; pass it to `Instance::create_device`.
    pub index: usize,
    pub name: String,
    pub kind: AdapterKind,
    /// Dedicated video memory in bytes.
    pub dedicated_memory: u64,
    pub supports: AdapterSupports,
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({:?}, {} MiB, geometry shaders: {}, anisotropy: {} x{})",
            self.index,
            self.name,
            self.kind,
            self.dedicated_memory / (1024 * 1024),
            self.supports.geometry_shader,
            self.supports.anisotropy,
            self.supports.max_anisotropy,
        )
    }
}
