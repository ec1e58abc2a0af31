// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Files are read whole, checked for the
// SPIR-V header and turned into modules that are dropped as soon as the
// pipeline has been built.

use super::device::DeviceContext;
use super::error::{RenderResult, RendererError};
use super::owner::{owned, ResourceOwner};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Reads a compiled shader from disk.
pub fn load_spirv(path: impl AsRef<Path>) -> RenderResult<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| RendererError::ShaderLoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let words = parse_spirv(&bytes, path)?;
    log::debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
    Ok(words)
}

/// Converts raw bytes into SPIR-V words. `path` is only used for errors.
pub fn parse_spirv(bytes: &[u8], path: &Path) -> RenderResult<Vec<u32>> {
    let fail = |reason: &str| RendererError::ShaderLoadFailed {
        path: path.to_path_buf(),
        reason: reason.to_owned(),
    };

    if bytes.is_empty() {
        return Err(fail("file is empty"));
    }

    if bytes.len() % 4 != 0 {
        return Err(fail("length is not a multiple of four"));
    }
    let first = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if u32::from_le_bytes(first) != SPIRV_MAGIC && u32::from_be_bytes(first) != SPIRV_MAGIC {
        return Err(fail("missing SPIR-V magic number"));
    }

    // Byte-swapped modules come back in native order.
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| fail(&e.to_string()))
}

pub fn create_shader_module(
    device: &Arc<DeviceContext>,
    code: &[u32],
) -> RenderResult<ResourceOwner<vk::ShaderModule>> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    let module = unsafe { device.device.create_shader_module(&create_info, None) }
        .map_err(RendererError::pipeline("vkCreateShaderModule"))?;

    Ok(owned(device, module, |ctx: &DeviceContext, module| unsafe {
        ctx.device.destroy_shader_module(module, None);
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn reason(err: RendererError) -> String {
        match err {
            RendererError::ShaderLoadFailed { reason, .. } => reason,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn valid_module_is_returned_word_for_word() {
        let words = [SPIRV_MAGIC, 0x0001_0000, 0, 5, 0];
        let parsed = parse_spirv(&module_bytes(&words), Path::new("tri.vert.spv")).unwrap();
        assert_eq!(parsed, words);
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = parse_spirv(&[], Path::new("empty.spv")).unwrap_err();
        assert_eq!(reason(err), "file is empty");
    }

    #[test]
    fn ragged_length_is_rejected() {
        let mut bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.push(0);
        let err = parse_spirv(&bytes, Path::new("ragged.spv")).unwrap_err();
        assert_eq!(reason(err), "length is not a multiple of four");
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bytes = module_bytes(&[0xdead_beef, 0x0001_0000]);
        let err = parse_spirv(&bytes, Path::new("text.spv")).unwrap_err();
        assert_eq!(reason(err), "missing SPIR-V magic number");
    }

    #[test]
    fn big_endian_module_is_swapped() {
        let bytes: Vec<u8> = [SPIRV_MAGIC, 7].iter().flat_map(|w| w.to_be_bytes()).collect();
        let parsed = parse_spirv(&bytes, Path::new("be.spv")).unwrap();
        assert_eq!(parsed, vec![SPIRV_MAGIC, 7]);
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.spv");

        let err = load_spirv(&path).unwrap_err();
        match err {
            RendererError::ShaderLoadFailed { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_on_disk_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0])).unwrap();
        file.flush().unwrap();

        let words = load_spirv(file.path()).unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(words[0], SPIRV_MAGIC);
    }
}
