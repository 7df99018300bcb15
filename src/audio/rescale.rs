// Overflow-safe rational rescaling
//
// `frames * dst_rate / src_rate` overflows 32-bit (and for long streams
// 64-bit) arithmetic and truncates by default. All frame-count conversions
// between rates go through `rescale_rnd`, which widens to 128 bits and
// applies an explicit rounding mode.

/// Rounding mode for `rescale_rnd`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero
    Down,
    /// Away from zero; used for capacity planning so buffers are never short
    Up,
    /// To nearest, halfway cases away from zero
    NearInf,
}

/// Compute `a * b / c` without intermediate overflow.
///
/// Returns `None` when `c` is zero or the result does not fit in a `u64`.
pub fn rescale_rnd(a: u64, b: u64, c: u64, rounding: Rounding) -> Option<u64> {
    if c == 0 {
        return None;
    }
    let product = a as u128 * b as u128;
    let divisor = c as u128;
    let quotient = match rounding {
        Rounding::Down => product / divisor,
        Rounding::Up => product.div_ceil(divisor),
        Rounding::NearInf => (product + divisor / 2) / divisor,
    };
    u64::try_from(quotient).ok()
}

/// Convert a frame count from `from_rate` to `to_rate`
pub fn rescale_frames(frames: u64, to_rate: u32, from_rate: u32, rounding: Rounding) -> Option<u64> {
    rescale_rnd(frames, to_rate as u64, from_rate as u64, rounding)
}
