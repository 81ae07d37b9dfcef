/// Position in the dataset for point-by-point navigation.
///
/// Starts unset; `next` from unset goes to the first row, `prev` to the last.
/// Both wrap around.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PointCursor {
    index: Option<usize>,
}

impl PointCursor {
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Advance over `len` rows. `None` when there are no rows.
    pub fn next(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let i = match self.index {
            Some(i) if i + 1 < len => i + 1,
            Some(_) | None => 0,
        };
        self.index = Some(i);
        self.index
    }

    pub fn prev(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let i = match self.index {
            Some(i) if i > 0 && i <= len => i - 1,
            Some(_) | None => len - 1,
        };
        self.index = Some(i);
        self.index
    }

    /// Jump to `index`; rejected when out of range.
    pub fn select(&mut self, index: usize, len: usize) -> Option<usize> {
        if index >= len {
            log::warn!("point index {index} out of range (0..{len})");
            return None;
        }
        self.index = Some(index);
        self.index
    }

    pub fn clear(&mut self) {
        self.index = None;
    }
}
