//! Frame placement policies.

use super::CoreMapEntry;
use core::ops::Range;

/// A placement algorithm for allocating frames.
pub trait PlacementAlgorithm: Default {
    /// Returns a range indicating the frame numbers to be allocated, or [`None`] if no
    /// sufficiently large range of free frames exists.
    fn place(&mut self, core_map: &[CoreMapEntry], frames_requested: usize)
        -> Option<Range<usize>>;
}

#[derive(Default)]
pub struct NextFit {
    /// The next frame number to start searching for free frames.
    position: usize,
}

impl PlacementAlgorithm for NextFit {
    fn place(
        &mut self,
        core_map: &[CoreMapEntry],
        frames_requested: usize,
    ) -> Option<Range<usize>> {
        let total_frames = core_map.len();
        if frames_requested == 0 || frames_requested > total_frames {
            return None;
        }

        let mut block_start_ind = self.position;
        let mut wrapped_around = false;

        while !(wrapped_around && block_start_ind >= self.position) {
            if block_start_ind + frames_requested > total_frames {
                // Wrap around only once, otherwise a large request could spin forever.
                if wrapped_around {
                    break;
                }
                block_start_ind = 0;
                wrapped_around = true;
                continue;
            }

            // Count the free frames starting from block_start_ind, up to the number requested
            let mut block_size = 0;
            while block_size < frames_requested
                && !core_map[block_start_ind + block_size].allocated()
            {
                block_size += 1;
            }

            if block_size == frames_requested {
                self.position = (block_start_ind + block_size) % total_frames;
                return Some(block_start_ind..(block_start_ind + block_size));
            }
            // Previous block too small, keep searching starting from one past the allocated frame
            block_start_ind += block_size + 1;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Marks the core map entries in `range` as allocated.
    fn fill_coremap_range(core_map: &mut [CoreMapEntry], range: &Range<usize>) {
        for i in range.clone() {
            assert!(!core_map[i].allocated());
            core_map[i] = core_map[i].with_allocated(true);
        }
    }

    #[test]
    fn test_next_fit() {
        let mut core_map = [CoreMapEntry::default(); 16];
        fill_coremap_range(&mut core_map, &(1..4));
        fill_coremap_range(&mut core_map, &(8..12));
        fill_coremap_range(&mut core_map, &(14..16));

        // Frames left are 0, 4-7, 12-13 (inclusive)

        let mut algorithm = NextFit::default();
        assert_eq!(algorithm.place(&core_map, 4), Some(4..8));
        fill_coremap_range(&mut core_map, &(4..8));

        // Next search starts from position 8
        assert_eq!(algorithm.place(&core_map, 1), Some(12..13));
        fill_coremap_range(&mut core_map, &(12..13));

        assert_eq!(algorithm.place(&core_map, 2), None);
        assert_eq!(algorithm.place(&core_map, 1), Some(13..14));
        assert_eq!(algorithm.place(&core_map, 1), Some(0..1));
    }

    #[test]
    fn test_next_fit_wrap_around() {
        let mut core_map = [CoreMapEntry::default(); 16];
        let mut algorithm = NextFit { position: 8 };
        fill_coremap_range(&mut core_map, &(0..1));
        assert_eq!(algorithm.place(&core_map, 16), None);
        assert_eq!(algorithm.place(&core_map, 15), Some(1..16));
    }

    #[test]
    fn test_next_fit_full() {
        let mut core_map = [CoreMapEntry::default(); 4];
        fill_coremap_range(&mut core_map, &(0..4));
        assert_eq!(NextFit::default().place(&core_map, 1), None);
    }
}
