use crate::mem::frame_table::Binding;

pub trait PageReplacementPolicy: Send {
    /// Picks the frame to evict next from `frames`, indexed by frame number.
    ///
    /// Free and pinned frames are never picked. Returns [`None`] if there is
    /// nothing to pick.
    fn select_victim(&mut self, frames: &[Option<Binding>]) -> Option<usize>;
}

/// Second-chance replacement. The hand sweeps the frames in order, clearing
/// accessed bits as it passes, and stops at the first frame whose page has
/// not been touched since the last sweep.
#[derive(Default)]
pub struct ClockEviction {
    hand: usize,
}

impl PageReplacementPolicy for ClockEviction {
    fn select_victim(&mut self, frames: &[Option<Binding>]) -> Option<usize> {
        if frames.is_empty() {
            return None;
        }

        // After one full sweep every accessed bit is clear, so a second sweep
        // finds a victim unless all frames are pinned or free.
        for _ in 0..2 * frames.len() {
            let index = self.hand % frames.len();
            self.hand = (index + 1) % frames.len();

            let Some(binding) = &frames[index] else {
                continue;
            };
            if binding.pinned {
                continue;
            }
            let owner = &binding.owner;
            if owner.page_manager.is_accessed(owner.va) {
                owner.page_manager.set_accessed(owner.va, false);
                continue;
            }
            return Some(index);
        }

        None
    }
}
