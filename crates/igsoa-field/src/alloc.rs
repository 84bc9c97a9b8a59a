// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Guarded Buffer Allocation
// ─────────────────────────────────────────────────────────────────────

use igsoa_types::{GridGeometry, GwError, GwResult};

/// Allocations above this size are logged as warnings.
pub const LARGE_ALLOCATION_BYTES: u128 = 1 << 30;

pub(crate) fn exhausted(what: &str, required_bytes: u128, geometry: &GridGeometry) -> GwError {
    let err = GwError::ResourceExhausted {
        what: what.to_string(),
        required_bytes,
        nx: geometry.nx,
        ny: geometry.ny,
        nz: geometry.nz,
    };
    log::error!("{err}");
    err
}

/// Bytes needed for `len` elements of `elem_bytes`, computed without overflow.
pub(crate) fn required_bytes(len: u128, elem_bytes: usize) -> u128 {
    len.saturating_mul(elem_bytes as u128)
}

/// Number of grid nodes, or `None` if it does not fit in `usize`.
pub(crate) fn node_count(geometry: &GridGeometry) -> Option<usize> {
    geometry
        .nx
        .checked_mul(geometry.ny)
        .and_then(|n| n.checked_mul(geometry.nz))
}

pub(crate) fn node_count_u128(geometry: &GridGeometry) -> u128 {
    geometry.nx as u128 * geometry.ny as u128 * geometry.nz as u128
}

/// Allocate `len` copies of `fill`, reporting failure instead of aborting.
pub fn guarded_vec<T: Clone>(
    what: &str,
    len: usize,
    fill: T,
    geometry: &GridGeometry,
) -> GwResult<Vec<T>> {
    let bytes = required_bytes(len as u128, std::mem::size_of::<T>());
    if bytes > isize::MAX as u128 {
        return Err(exhausted(what, bytes, geometry));
    }
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| exhausted(what, bytes, geometry))?;
    buf.resize(len, fill);
    Ok(buf)
}
