use object::macho;
use object::read::macho::{FatArch, MachOFatFile32, MachOFatFile64};
use object::FileKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{read_header, PlatformProfile};

/// Enough for the fat header and any realistic number of slices.
const FAT_HEADER_LEN: u64 = 4096;

/// Mach-O platforms. Binaries may be fat, so each slice is dumped separately.
#[derive(Debug, Clone, Default)]
pub struct MacProfile;

impl PlatformProfile for MacProfile {
    fn name(&self) -> &'static str {
        "Darwin"
    }

    fn system_dirs(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from("/usr/lib"),
            PathBuf::from("/System/Library/Frameworks"),
            PathBuf::from("/System/Library/PrivateFrameworks"),
        ]
    }

    fn library_extension(&self) -> &'static str {
        ".dylib"
    }

    fn matches_library_name(&self, file_name: &str) -> bool {
        file_name.ends_with(self.library_extension())
    }

    fn is_native_format(&self, kind: FileKind) -> bool {
        matches!(
            kind,
            FileKind::MachO32 | FileKind::MachO64 | FileKind::MachOFat32 | FileKind::MachOFat64
        )
    }

    fn architectures(&self, path: &Path) -> Vec<Option<String>> {
        let data = match read_header(path, FAT_HEADER_LEN) {
            Ok(data) => data,
            Err(err) => {
                debug!("Can't read Mach-O header of {}: {}", path.display(), err);
                return Vec::new();
            }
        };
        mach_o_architectures(&data)
            .into_iter()
            .map(|arch| Some(arch.to_string()))
            .collect()
    }
}

/// Architecture names, as `lipo` and `dump_syms -a` spell them, for every
/// slice described by a Mach-O header. Malformed headers yield nothing.
pub fn mach_o_architectures(data: &[u8]) -> Vec<&'static str> {
    match FileKind::parse(data) {
        Ok(FileKind::MachOFat32) => match MachOFatFile32::parse(data) {
            Ok(fat) => fat
                .arches()
                .iter()
                .filter_map(|arch| arch_name(arch.cputype(), arch.cpusubtype()))
                .collect(),
            Err(_) => Vec::new(),
        },
        Ok(FileKind::MachOFat64) => match MachOFatFile64::parse(data) {
            Ok(fat) => fat
                .arches()
                .iter()
                .filter_map(|arch| arch_name(arch.cputype(), arch.cpusubtype()))
                .collect(),
            Err(_) => Vec::new(),
        },
        Ok(FileKind::MachO32 | FileKind::MachO64) => thin_arch(data).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn thin_arch(data: &[u8]) -> Option<&'static str> {
    let word = |offset: usize| -> Option<u32> {
        let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
        // MH_MAGIC written big-endian starts with 0xfe
        Some(if data[0] == 0xfe {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    };
    arch_name(word(4)?, word(8)?)
}

fn arch_name(cputype: u32, cpusubtype: u32) -> Option<&'static str> {
    let subtype = cpusubtype & !macho::CPU_SUBTYPE_MASK;
    let name = match cputype {
        macho::CPU_TYPE_X86 => "i386",
        macho::CPU_TYPE_X86_64 if subtype == macho::CPU_SUBTYPE_X86_64_H => "x86_64h",
        macho::CPU_TYPE_X86_64 => "x86_64",
        macho::CPU_TYPE_ARM64 if subtype == macho::CPU_SUBTYPE_ARM64E => "arm64e",
        macho::CPU_TYPE_ARM64 => "arm64",
        macho::CPU_TYPE_ARM64_32 => "arm64_32",
        macho::CPU_TYPE_ARM => match subtype {
            macho::CPU_SUBTYPE_ARM_V6 => "armv6",
            macho::CPU_SUBTYPE_ARM_V7 => "armv7",
            macho::CPU_SUBTYPE_ARM_V7S => "armv7s",
            macho::CPU_SUBTYPE_ARM_V7K => "armv7k",
            _ => "arm",
        },
        macho::CPU_TYPE_POWERPC => "ppc",
        macho::CPU_TYPE_POWERPC64 => "ppc64",
        other => {
            debug!("Unknown Mach-O cputype {:#x}", other);
            return None;
        }
    };
    Some(name)
}
