/// Read cursor and write buffer of a [`ClusterPipe`](crate::ClusterPipe).
///
/// The read side only tracks a cursor: the bytes themselves stay in the
/// endpoint's read buffer (the master's chunk or the slave's held packet).
#[derive(Debug)]
pub(crate) struct StreamBuffering {
    read_pos: usize,
    read_len: usize,
    write_buf: Vec<u8>,
    write_capacity: usize,
}

impl StreamBuffering {
    pub(crate) fn new(write_capacity: usize) -> Self {
        let write_capacity = write_capacity.max(1);
        Self {
            read_pos: 0,
            read_len: 0,
            write_buf: Vec::with_capacity(write_capacity),
            write_capacity,
        }
    }

    /// Bytes read from the endpoint but not yet handed to the caller.
    pub(crate) fn unread(&self) -> usize {
        self.read_len - self.read_pos
    }

    /// Record that the endpoint's read buffer now holds `len` fresh bytes.
    pub(crate) fn refilled(&mut self, len: usize) {
        self.read_pos = 0;
        self.read_len = len;
    }

    /// Copy unread bytes of `source` into `out` and advance the cursor.
    pub(crate) fn take(&mut self, source: &[u8], out: &mut [u8]) -> usize {
        let end = self.read_len.min(source.len());
        let available = &source[self.read_pos.min(end)..end];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.read_pos += n;
        n
    }

    /// Append as much of `data` as fits. Returns the number of bytes taken.
    pub(crate) fn stage(&mut self, data: &[u8]) -> usize {
        let space = self.write_capacity - self.write_buf.len();
        let n = space.min(data.len());
        self.write_buf.extend_from_slice(&data[..n]);
        n
    }

    pub(crate) fn is_write_full(&self) -> bool {
        self.write_buf.len() >= self.write_capacity
    }

    pub(crate) fn pending_write(&self) -> &[u8] {
        &self.write_buf
    }

    pub(crate) fn clear_write(&mut self) {
        self.write_buf.clear();
    }
}
