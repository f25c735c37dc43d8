/// A Buffer represents a segment of receiving data (maybe unfinished).
#[derive(Debug, Default)]
pub struct Buffer {
    inner: Vec<u8>,
    cur_pos: usize,
}

impl Buffer {
    pub fn with_len(len: usize) -> Self {
        Buffer {
            inner: vec![0u8; len],
            cur_pos: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        assert!(self.is_clear());
        &self.inner
    }

    pub fn into_vec(self) -> Vec<u8> {
        assert!(self.is_clear());
        self.inner
    }

    pub fn mark_handled(&mut self, nbytes: usize) {
        self.cur_pos += nbytes;
        assert!(self.cur_pos <= self.inner.len());
    }

    pub fn is_clear(&self) -> bool {
        self.cur_pos == self.inner.len()
    }

    pub fn get_remain_buffer_mut(&mut self) -> &mut [u8] {
        &mut self.inner[self.cur_pos..]
    }
}
