// SPDX-License-Identifier: MIT OR Apache-2.0

/// Reads fuzzer bytes as typed values, yielding zeros once exhausted.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    pub fn next_u8(&mut self) -> u8 {
        let byte = self.data.get(self.offset).copied().unwrap_or(0);
        self.offset = self.offset.saturating_add(1);
        byte
    }

    pub fn next_u16(&mut self) -> u16 {
        u16::from_le_bytes([self.next_u8(), self.next_u8()])
    }

    pub fn next_i16(&mut self) -> i16 {
        i16::from_le_bytes([self.next_u8(), self.next_u8()])
    }
}

/// Maps `seed` into `[low, high]`.
pub fn bounded(seed: u8, low: usize, high: usize) -> usize {
    low + usize::from(seed) % (high - low + 1)
}

/// Up to `max_len` indices below `limit`.
pub fn index_list(cursor: &mut ByteCursor<'_>, max_len: u8, limit: usize) -> Vec<usize> {
    let len = bounded(cursor.next_u8(), 0, usize::from(max_len));
    (0..len)
        .map(|_| usize::from(cursor.next_u16()) % limit.max(1))
        .collect()
}
