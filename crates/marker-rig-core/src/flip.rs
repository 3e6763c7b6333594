//! In-place mirroring of captured frames.

use serde::{Deserialize, Serialize};

use crate::FrameSlot;

/// Mirror transform applied to a frame after capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flip {
    #[default]
    None,
    /// Swap rows top to bottom.
    Vertical,
    /// Swap pixels left to right within each row.
    Horizontal,
    /// Both axes (a 180 degree rotation).
    Both,
}

impl Flip {
    /// Flip to apply for the user-facing mirroring settings of a camera.
    ///
    /// Capture sources deliver rows bottom-up, so every entry carries an
    /// extra vertical flip relative to what the settings name.
    pub fn from_mirroring(flip_horizontal: bool, flip_vertical: bool) -> Self {
        match (flip_horizontal, flip_vertical) {
            (false, false) => Flip::Vertical,
            (true, false) => Flip::Both,
            (false, true) => Flip::None,
            (true, true) => Flip::Horizontal,
        }
    }

    #[inline]
    pub fn flips_rows(self) -> bool {
        matches!(self, Flip::Vertical | Flip::Both)
    }

    #[inline]
    pub fn flips_columns(self) -> bool {
        matches!(self, Flip::Horizontal | Flip::Both)
    }
}

/// Apply `flip` to the pixels of `slot` without allocating.
pub fn flip_in_place(slot: &mut FrameSlot, flip: Flip) {
    let format = slot.format();
    let stride = format.row_stride();
    let bpp = format.bytes_per_pixel;
    let data = slot.data_mut();

    if flip.flips_rows() {
        let rows = format.height;
        for top in 0..rows / 2 {
            let bottom = rows - 1 - top;
            let (head, tail) = data.split_at_mut(bottom * stride);
            head[top * stride..(top + 1) * stride].swap_with_slice(&mut tail[..stride]);
        }
    }

    if flip.flips_columns() {
        for row in data.chunks_exact_mut(stride) {
            let width = format.width;
            for left in 0..width / 2 {
                let right = width - 1 - left;
                let (head, tail) = row.split_at_mut(right * bpp);
                head[left * bpp..(left + 1) * bpp].swap_with_slice(&mut tail[..bpp]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameFormat;

    fn slot_3x2() -> FrameSlot {
        // 3 pixels wide, 2 rows, 2 bytes per pixel.
        let mut slot = FrameSlot::new(FrameFormat::new(3, 2, 2)).expect("slot");
        slot.data_mut()
            .copy_from_slice(&[1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6]);
        slot
    }

    #[test]
    fn mirroring_table_is_literal() {
        assert_eq!(Flip::from_mirroring(false, false), Flip::Vertical);
        assert_eq!(Flip::from_mirroring(true, false), Flip::Both);
        assert_eq!(Flip::from_mirroring(false, true), Flip::None);
        assert_eq!(Flip::from_mirroring(true, true), Flip::Horizontal);
    }

    #[test]
    fn vertical_swaps_rows() {
        let mut slot = slot_3x2();
        flip_in_place(&mut slot, Flip::Vertical);
        assert_eq!(slot.data(), &[4, 4, 5, 5, 6, 6, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn horizontal_keeps_pixel_bytes_together() {
        let mut slot = slot_3x2();
        flip_in_place(&mut slot, Flip::Horizontal);
        assert_eq!(slot.data(), &[3, 3, 2, 2, 1, 1, 6, 6, 5, 5, 4, 4]);
    }

    #[test]
    fn both_rotates_half_turn() {
        let mut slot = slot_3x2();
        flip_in_place(&mut slot, Flip::Both);
        assert_eq!(slot.data(), &[6, 6, 5, 5, 4, 4, 3, 3, 2, 2, 1, 1]);

        let mut untouched = slot_3x2();
        flip_in_place(&mut untouched, Flip::None);
        assert_eq!(untouched.data(), slot_3x2().data());
    }

    #[test]
    fn odd_row_count_keeps_middle_row() {
        let mut slot = FrameSlot::new(FrameFormat::gray8(1, 3)).expect("slot");
        slot.data_mut().copy_from_slice(&[1, 2, 3]);
        flip_in_place(&mut slot, Flip::Vertical);
        assert_eq!(slot.data(), &[3, 2, 1]);
    }
}
