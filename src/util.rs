use std::time::{SystemTime, UNIX_EPOCH};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_ID_LEN: usize = 13;

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Generate a short lowercase base-36 identifier, used for the process-wide
/// `system_fingerprint` and for provisional stream ids before the backend
/// assigns a real turn id.
pub(crate) fn random_base36_id() -> String {
    let mut out = String::with_capacity(RANDOM_ID_LEN);
    for _ in 0..RANDOM_ID_LEN {
        out.push(BASE36[fastrand::usize(..BASE36.len())] as char);
    }
    out
}
