//! Resource identifier generation

use rand::Rng;

/// Generate a random version-4 UUID string
#[must_use]
pub fn uuid_v4() -> String {
    let mut rng = rand::thread_rng();
    let a: u32 = rng.gen();
    let b: u16 = rng.gen();
    let c: u16 = (rng.gen::<u16>() & 0x0FFF) | 0x4000; // version 4
    let d: u16 = (rng.gen::<u16>() & 0x3FFF) | 0x8000; // RFC 4122 variant
    let e: u64 = rng.gen::<u64>() & 0xFFFF_FFFF_FFFF;

    format!("{a:08x}-{b:04x}-{c:04x}-{d:04x}-{e:012x}")
}

/// Check the canonical 8-4-4-4-12 UUID shape
#[must_use]
pub fn is_valid_uuid(id: &str) -> bool {
    if id.len() != 36 {
        return false;
    }

    id.char_indices().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => c.is_ascii_hexdigit(),
    })
}
