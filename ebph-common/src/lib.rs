//! Wire-stable primitives shared between the ebpH detection engine
//! (`ebph-core`) and the process that hosts it (`ebphd`).
//!
//! Everything in this crate is deliberately small and `Pod`-friendly: it is
//! the part of the system that has to agree byte-for-byte across a save/load
//! round trip, so it is kept independent of any particular allocator- or
//! async-runtime choice made further up the stack.

use bytemuck::{Pod, Zeroable};
use sha2::{Digest, Sha256};

pub mod syscall_names;
pub use syscall_names::syscall_name;

/// Canonical sliding window length (`W` in `spec.md`). The useful lookahead
/// depth is `WINDOW_SIZE - 1`, chosen so that one byte holds every lookahead
/// bit for a given `(curr, prev)` pair.
pub const WINDOW_SIZE: usize = 9;

/// `W - 1`: number of distinct lookahead distances tracked per pair.
pub const LOOKAHEAD_DEPTH: usize = WINDOW_SIZE - 1;

/// Canonical locality frame length (`L` in `spec.md`).
pub const LOCALITY_FRAME_SIZE: usize = 128;

/// Layout version folded into the persisted-profile magic number. Bump this
/// whenever `PersistedProfileHeader`'s field layout changes so that old
/// on-disk profiles are discarded instead of misread.
pub const PROFILE_STRUCT_VERSION: u8 = 1;

/// Size, in bytes, of one lookahead-pair table cell. `LOOKAHEAD_DEPTH` (8)
/// bits fit in exactly one byte at the canonical `WINDOW_SIZE`.
pub const LPT_CELL_BYTES: u8 = 1;

/// Fixed size of the NUL-padded `exe_path` field in the persisted header.
pub const EXE_PATH_CAPACITY: usize = 128;

/// A system call / security-hook identifier in `[0, call_space)`.
///
/// Stored as `u16` so a single unmatched sentinel (`EMPTY`) fits comfortably
/// above any realistic call space while keeping sequence windows cheap to
/// copy and compare.
pub type CallNumber = u16;

/// Sentinel meaning "no call observed yet" inside a window or locality frame.
pub const EMPTY_CALL: CallNumber = CallNumber::MAX;

/// A stable 64-bit identifier for one executable's profile, derived from its
/// filesystem identity (device + inode or equivalent). Never reused across
/// distinct executables for the profile's lifetime.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct ProfileKey(pub u64);

impl ProfileKey {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Derive a profile key from a filesystem identity (device, inode).
    /// Device and inode alone are stable for the life of the mount; this is
    /// advisory glue for the daemon side, not part of the detection math.
    pub fn from_device_inode(dev: u64, ino: u64) -> Self {
        // Mix the two halves instead of simply XOR-ing so that common
        // small-device/large-inode combinations don't collide trivially.
        let mixed = dev
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .rotate_left(31)
            ^ ino;
        Self(mixed)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl std::fmt::Debug for ProfileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProfileKey({:016x})", self.0)
    }
}

/// Lifecycle status of a profile. `Frozen` and `Normal` from `spec.md` §4.D
/// are collapsed into a single `Normal` state here: the instant a profile
/// is promoted it snapshots `train_lpt` into `test_lpt` *and* starts
/// enforcing against it, so there is no observable window where the two
/// would behave differently. See `DESIGN.md` for the full rationale.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub enum ProfileStatus {
    Training = 0,
    Normal = 1,
}

impl ProfileStatus {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Training),
            1 => Some(Self::Normal),
            _ => None,
        }
    }
}

/// Compute the 64-bit magic number that tags a persisted profile's layout.
///
/// The loader discards any record whose magic doesn't match the running
/// binary's `(call_space, window, cell size, struct layout version)`, per
/// `spec.md` §6. We hash with SHA-256 and keep the first 8 bytes rather than
/// relying on an unstable-across-toolchains hasher, since this number has to
/// compare equal across process restarts and rebuilds with the same logical
/// layout.
pub fn calculate_profile_magic(call_space: u16) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(call_space.to_le_bytes());
    hasher.update((WINDOW_SIZE as u32).to_le_bytes());
    hasher.update([LPT_CELL_BYTES]);
    hasher.update([PROFILE_STRUCT_VERSION]);
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[0..8].try_into().unwrap())
}

/// The fixed-size prefix of a persisted profile record (`spec.md` §6,
/// items 1-5). The two variable-length `call_space * call_space` lookahead
/// tables follow immediately after this header in the file and are appended
/// by `ebph-core::persistence`, since their size depends on the runtime call
/// space and therefore can't be `Pod` at a fixed size.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct PersistedProfileHeader {
    pub magic: u64,
    pub profile_key: u64,
    pub status: u8,
    pub _pad: [u8; 7],
    pub train_count: u64,
    pub last_mod_count: u64,
    pub normal_count: u64,
    pub anomalies: u64,
    pub sequences: u64,
    pub exe_path: [u8; EXE_PATH_CAPACITY],
}

impl PersistedProfileHeader {
    pub fn exe_path_str(&self) -> String {
        let end = self
            .exe_path
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.exe_path.len());
        String::from_utf8_lossy(&self.exe_path[..end]).into_owned()
    }

    pub fn set_exe_path(&mut self, path: &str) {
        self.exe_path = [0u8; EXE_PATH_CAPACITY];
        let bytes = path.as_bytes();
        let n = bytes.len().min(EXE_PATH_CAPACITY);
        self.exe_path[..n].copy_from_slice(&bytes[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn header_is_pod_sized_and_8_byte_aligned() {
        assert_eq!(size_of::<PersistedProfileHeader>() % 8, 0);
    }

    #[test]
    fn magic_is_stable_for_same_inputs() {
        assert_eq!(calculate_profile_magic(256), calculate_profile_magic(256));
        assert_ne!(calculate_profile_magic(256), calculate_profile_magic(257));
    }

    #[test]
    fn exe_path_round_trips() {
        let mut header = PersistedProfileHeader::zeroed();
        header.set_exe_path("/usr/bin/sshd");
        assert_eq!(header.exe_path_str(), "/usr/bin/sshd");
    }

    #[test]
    fn profile_key_from_device_inode_is_deterministic() {
        let a = ProfileKey::from_device_inode(8, 123456);
        let b = ProfileKey::from_device_inode(8, 123456);
        let c = ProfileKey::from_device_inode(8, 123457);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[cfg(feature = "user")]
    #[test]
    fn profile_key_serializes_as_newtype() {
        let key = ProfileKey::new(42);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "42");
    }
}
