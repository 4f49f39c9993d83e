/// Bitset recording which tracked properties of an object changed since its
/// last outgoing context
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DiffMask {
    mask: Vec<u8>,
}

impl DiffMask {
    /// Creates a new DiffMask able to hold `bit_length` bits
    pub fn new(bit_length: u8) -> Self {
        let byte_length = (bit_length as usize).div_ceil(8).max(1);
        Self {
            mask: vec![0; byte_length],
        }
    }

    pub fn byte_count(&self) -> usize {
        self.mask.len()
    }

    pub fn bit(&self, index: u8) -> Option<bool> {
        let byte = self.mask.get((index / 8) as usize)?;
        Some(byte & (1 << (index % 8)) != 0)
    }

    pub fn set_bit(&mut self, index: u8, value: bool) {
        let byte_index = (index / 8) as usize;
        if byte_index >= self.mask.len() {
            self.mask.resize(byte_index + 1, 0);
        }
        let bit = 1 << (index % 8);
        if value {
            self.mask[byte_index] |= bit;
        } else {
            self.mask[byte_index] &= !bit;
        }
    }

    /// Marks every bit below `bit_length`
    pub fn set_all(&mut self, bit_length: u8) {
        for index in 0..bit_length {
            self.set_bit(index, true);
        }
    }

    pub fn clear(&mut self) {
        for byte in self.mask.iter_mut() {
            *byte = 0;
        }
    }

    pub fn is_clear(&self) -> bool {
        self.mask.iter().all(|byte| *byte == 0)
    }

    pub fn or(&mut self, other: &DiffMask) {
        if other.mask.len() > self.mask.len() {
            self.mask.resize(other.mask.len(), 0);
        }
        for (byte, other_byte) in self.mask.iter_mut().zip(other.mask.iter()) {
            *byte |= *other_byte;
        }
    }

    /// Indices of set bits, ascending
    pub fn set_indices(&self) -> Vec<u8> {
        let mut output = Vec::new();
        for (byte_index, byte) in self.mask.iter().enumerate() {
            for bit in 0..8u8 {
                if byte & (1 << bit) != 0 {
                    output.push(byte_index as u8 * 8 + bit);
                }
            }
        }
        output
    }
}
