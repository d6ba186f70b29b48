use super::error::SeparateError;

/// Left/right zero-padding and inference stride for one separation pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Padding {
    pub left: usize,
    pub right: usize,
    /// Retained width of each patch's output, and the tiling stride.
    pub roi_size: usize,
}

/// Compute the padding that makes `cropsize`-wide patches tile an input of
/// `n_frames` time frames exactly.
///
/// The padded total is the smallest multiple of `roi_size` that covers
/// `n_frames`, plus an `offset` margin on each side so the first and last
/// patches have their full border available. Pure function of its inputs.
pub fn make_padding(
    n_frames: usize,
    cropsize: usize,
    offset: usize,
) -> Result<Padding, SeparateError> {
    if cropsize <= 2 * offset {
        return Err(SeparateError::InvalidConfiguration(format!(
            "cropsize ({cropsize}) must exceed twice the model offset ({offset})"
        )));
    }
    let roi_size = cropsize - 2 * offset;

    let regions = n_frames.div_ceil(roi_size).max(1);
    let padded_total = regions * roi_size + 2 * offset;

    Ok(Padding {
        left: offset,
        right: padded_total - n_frames - offset,
        roi_size,
    })
}
