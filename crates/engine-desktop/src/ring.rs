// Interleaved sample ring between the decode thread and the output callback

use parking_lot::Mutex;
use std::sync::Arc;

/// Fixed-capacity FIFO of interleaved f32 samples.
/// One slot stays empty so that full and empty can be told apart.
pub struct SampleRing {
    buffer: Vec<f32>,
    write_pos: usize,
    read_pos: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1) + 1],
            write_pos: 0,
            read_pos: 0,
        }
    }

    fn slots(&self) -> usize {
        self.buffer.len()
    }

    /// Copy as much of `data` as fits, returning the number of samples taken
    pub fn write(&mut self, data: &[f32]) -> usize {
        let count = data.len().min(self.free());
        if count == 0 {
            return 0;
        }

        let first = count.min(self.slots() - self.write_pos);
        self.buffer[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        self.buffer[..count - first].copy_from_slice(&data[first..count]);
        self.write_pos = (self.write_pos + count) % self.slots();
        count
    }

    /// Fill `output` from the ring, returning the number of samples copied
    pub fn read(&mut self, output: &mut [f32]) -> usize {
        let count = output.len().min(self.len());
        if count == 0 {
            return 0;
        }

        let first = count.min(self.slots() - self.read_pos);
        output[..first].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + first]);
        output[first..count].copy_from_slice(&self.buffer[..count - first]);
        self.read_pos = (self.read_pos + count) % self.slots();
        count
    }

    /// Samples waiting to be read
    pub fn len(&self) -> usize {
        (self.write_pos + self.slots() - self.read_pos) % self.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == self.read_pos
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots() - 1
    }

    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
    }

    /// Change capacity, dropping buffered samples
    pub fn resize(&mut self, capacity: usize) {
        if capacity != self.capacity() {
            self.buffer = vec![0.0; capacity.max(1) + 1];
        }
        self.clear();
    }
}

/// [`SampleRing`] shared between threads
#[derive(Clone)]
pub struct SharedRing {
    inner: Arc<Mutex<SampleRing>>,
}

impl SharedRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SampleRing::new(capacity))),
        }
    }

    pub fn write(&self, data: &[f32]) -> usize {
        self.inner.lock().write(data)
    }

    pub fn read(&self, output: &mut [f32]) -> usize {
        self.inner.lock().read(output)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear()
    }

    pub fn resize(&self, capacity: usize) {
        self.inner.lock().resize(capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_stops_at_capacity() {
        let mut ring = SampleRing::new(4);
        assert_eq!(ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0]), 4);
        assert_eq!(ring.free(), 0);
        assert_eq!(ring.write(&[6.0]), 0);
    }

    #[test]
    fn test_wraps_around() {
        let mut ring = SampleRing::new(4);
        let mut out = [0.0; 3];

        ring.write(&[1.0, 2.0, 3.0]);
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(ring.write(&[4.0, 5.0, 6.0, 7.0]), 4);

        let mut out = [0.0; 6];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(&out[..4], &[4.0, 5.0, 6.0, 7.0]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_resize_drops_content() {
        let ring = SharedRing::new(8);
        ring.write(&[1.0; 6]);
        ring.resize(16);
        assert!(ring.is_empty());
        assert_eq!(ring.write(&[0.5; 20]), 16);
        assert_eq!(ring.len(), 16);
    }
}
