/// Two handles alternating between read and write roles.
///
/// A kernel reads from [`DoubleBuffer::read`] and writes into
/// [`DoubleBuffer::write`]; after the dispatch, [`DoubleBuffer::swap`] makes the
/// freshly written handle the next read source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubleBuffer<T: Copy> {
    front: T,
    back: T,
}

impl<T: Copy> DoubleBuffer<T> {
    pub fn new(front: T, back: T) -> Self {
        Self { front, back }
    }

    pub fn read(&self) -> T {
        self.front
    }

    pub fn write(&self) -> T {
        self.back
    }

    /// Exchange roles and return the new `(read, write)` pair.
    pub fn swap(&mut self) -> (T, T) {
        std::mem::swap(&mut self.front, &mut self.back);
        (self.front, self.back)
    }

    pub fn both(&self) -> [T; 2] {
        [self.front, self.back]
    }
}
