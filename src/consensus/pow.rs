//! Proof-of-work check and the sequential nonce search (spec §4.2/§6).

use crate::blockchain::block::BlockHeader;

use super::difficulty::{hash_meets_target, CompactDifficulty};

/// Whether `header` satisfies its own target.
pub fn header_meets_target(header: &BlockHeader) -> bool {
    let target = CompactDifficulty(header.difficulty_compact as u32).to_target();
    hash_meets_target(&header.hash_hex(), &target)
}

/// Tries every nonce in `[0, 2^32)`, calling `should_continue` between
/// attempts so callers can implement cooperative cancellation. Returns the
/// winning nonce, or `None` if the whole space was searched (or
/// cancellation was observed) without a hit.
pub fn search_for_nonce(
    header: &mut BlockHeader,
    mut should_continue: impl FnMut() -> bool,
) -> Option<u32> {
    let target = CompactDifficulty(header.difficulty_compact as u32).to_target();
    let mut nonce: u32 = 0;
    loop {
        if !should_continue() {
            return None;
        }
        header.nonce = nonce;
        if hash_meets_target(&header.hash_hex(), &target) {
            return Some(nonce);
        }
        match nonce.checked_add(1) {
            Some(next) => nonce = next,
            None => return None,
        }
    }
}
