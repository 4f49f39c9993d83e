use std::marker::PhantomData;

/// Issues process-local keys. Keys are never recycled, so a stale key can
/// never alias a newer subscriber or timeout.
pub struct KeyGenerator<K: From<u64>> {
    next_key: u64,
    phantom: PhantomData<K>,
}

impl<K: From<u64>> KeyGenerator<K> {
    pub fn new() -> Self {
        Self {
            next_key: 0,
            phantom: PhantomData,
        }
    }

    pub fn generate(&mut self) -> K {
        let key = self.next_key;
        self.next_key = self.next_key.wrapping_add(1);
        K::from(key)
    }
}

impl<K: From<u64>> Default for KeyGenerator<K> {
    fn default() -> Self {
        Self::new()
    }
}
