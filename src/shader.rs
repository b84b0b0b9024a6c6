// Shader modules
//
// Both backends consume SPIR-V. Bytecode is checked here once, before any
// backend sees it, so malformed input always surfaces as
// `ShaderCompilationError` regardless of the backend.

use crate::backend::software::SoftwareShaderModule;
use crate::backend::vulkan::VulkanShaderModule;
use crate::device::DeviceId;
use crate::error::{GpuError, Result};
use crate::instance::Backend;

const SPIRV_MAGIC: u32 = 0x0723_0203;
const SPIRV_HEADER_WORDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderModuleDescription {
    pub stage: ShaderStage,
    pub bytecode: Vec<u8>,
    pub entry_point: String,
}

impl ShaderModuleDescription {
    pub fn new(stage: ShaderStage, bytecode: impl Into<Vec<u8>>, entry_point: &str) -> Self {
        Self { stage, bytecode: bytecode.into(), entry_point: entry_point.to_string() }
    }
}

/// Decode SPIR-V bytes into words, fixing up byte order if needed.
pub(crate) fn decode_spirv(bytecode: &[u8]) -> Result<Vec<u32>> {
    if bytecode.is_empty() {
        return Err(GpuError::ShaderCompilationError("bytecode is empty".into()));
    }
    if bytecode.len() % 4 != 0 {
        return Err(GpuError::ShaderCompilationError(format!(
            "bytecode length {} is not a multiple of 4",
            bytecode.len()
        )));
    }
    if bytecode.len() < SPIRV_HEADER_WORDS * 4 {
        return Err(GpuError::ShaderCompilationError("bytecode is shorter than a SPIR-V header".into()));
    }

    let mut words: Vec<u32> = bytecode
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    if words[0] == SPIRV_MAGIC.swap_bytes() {
        for word in &mut words {
            *word = word.swap_bytes();
        }
    } else if words[0] != SPIRV_MAGIC {
        return Err(GpuError::ShaderCompilationError(format!(
            "bad SPIR-V magic number {:#010x}",
            words[0]
        )));
    }

    Ok(words)
}

pub(crate) fn validate_entry_point(entry_point: &str) -> Result<()> {
    if entry_point.is_empty() || entry_point.contains('\0') {
        return Err(GpuError::ShaderCompilationError(format!(
            "invalid entry point name {entry_point:?}"
        )));
    }
    Ok(())
}

pub enum ShaderModule {
    Vulkan(VulkanShaderModule),
    Software(SoftwareShaderModule),
}

impl ShaderModule {
    pub fn backend(&self) -> Backend {
        match self {
            ShaderModule::Vulkan(_) => Backend::Vulkan,
            ShaderModule::Software(_) => Backend::Software,
        }
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        match self {
            ShaderModule::Vulkan(m) => m.device_id(),
            ShaderModule::Software(m) => m.device_id(),
        }
    }

    pub fn stage(&self) -> ShaderStage {
        match self {
            ShaderModule::Vulkan(m) => m.stage(),
            ShaderModule::Software(m) => m.stage(),
        }
    }

    pub fn entry_point(&self) -> &str {
        match self {
            ShaderModule::Vulkan(m) => m.entry_point(),
            ShaderModule::Software(m) => m.entry_point(),
        }
    }
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("backend", &self.backend())
            .field("stage", &self.stage())
            .field("entry_point", &self.entry_point())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest byte string that passes `decode_spirv`: a header with no
    /// instructions.
    fn minimal_spirv() -> Vec<u8> {
        [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect()
    }

    #[test]
    fn accepts_header_in_either_byte_order() {
        let le = minimal_spirv();
        assert_eq!(decode_spirv(&le).unwrap()[0], SPIRV_MAGIC);

        let be: Vec<u8> = le.chunks(4).flat_map(|c| [c[3], c[2], c[1], c[0]]).collect();
        assert_eq!(decode_spirv(&be).unwrap(), decode_spirv(&le).unwrap());
    }

    #[test]
    fn rejects_malformed_bytecode() {
        assert!(matches!(decode_spirv(&[]), Err(GpuError::ShaderCompilationError(_))));
        assert!(decode_spirv(&[1, 2, 3]).is_err());
        assert!(decode_spirv(&[0; 20]).is_err());
        assert!(decode_spirv(&minimal_spirv()[..16]).is_err());
    }

    #[test]
    fn entry_points_must_be_c_compatible() {
        assert!(validate_entry_point("main").is_ok());
        assert!(validate_entry_point("").is_err());
        assert!(validate_entry_point("ma\0in").is_err());
    }
}
