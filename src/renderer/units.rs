/// Hands out texture units in increasing order. Each scene owns one, so
/// independent scenes never share a counter.
#[derive(Debug, Default)]
pub struct TextureUnits {
    next: u32,
}

impl TextureUnits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> u32 {
        let unit = self.next;
        self.next += 1;
        unit
    }

    /// Number of units handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next
    }
}
