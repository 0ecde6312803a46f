// -----------------------------------------------------------------------------
// BackBuffer

/// A byte buffer that grows toward lower addresses.
///
/// The flat format is assembled leaf-first: a child's bytes must exist
/// before any offset pointing at it can be computed, so construction
/// proceeds from the end of the final buffer toward its start. Positions
/// during construction are *end offsets*: the distance from the final
/// buffer's end to the byte just past an item. An item prepended when the
/// buffer held `n` bytes and spanning `k` bytes has end offset `n + k`,
/// and its first byte lands at final position `total - (n + k)`.
///
/// Storage is kept reversed so a prepend is an append internally.
pub(crate) struct BackBuffer {
    rev: Vec<u8>,
}

impl BackBuffer {
    #[inline]
    pub(crate) fn new() -> Self {
        Self { rev: Vec::new() }
    }

    /// Bytes accumulated so far; doubles as the end offset of the most
    /// recently prepended item.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.rev.len()
    }

    /// Places `bytes` in front of everything written so far.
    #[inline]
    pub(crate) fn prepend(&mut self, bytes: &[u8]) {
        self.rev.extend(bytes.iter().rev());
    }

    /// Prepends `n` zero bytes.
    #[inline]
    pub(crate) fn pad(&mut self, n: usize) {
        self.rev.resize(self.rev.len() + n, 0);
    }

    /// Pads so that an item of `item_len` bytes prepended next starts at a
    /// final position divisible by `align`, assuming the total buffer
    /// length ends up divisible by `align` as well. Returns the padding
    /// inserted.
    pub(crate) fn align_for(&mut self, item_len: usize, align: usize) -> usize {
        self.align_interior(item_len, 0, align)
    }

    /// Like [`align_for`](Self::align_for), but aligns the byte `skip`
    /// bytes into the item instead of its first byte. Sequences use this
    /// to align their element data rather than their length prefix.
    pub(crate) fn align_interior(&mut self, item_len: usize, skip: usize, align: usize) -> usize {
        let pad = pad_for(self.len(), item_len, skip, align);
        self.pad(pad);
        pad
    }

    /// The assembled buffer, front to back.
    pub(crate) fn into_bytes(mut self) -> Vec<u8> {
        self.rev.reverse();
        self.rev
    }
}

/// Padding needed before an item of `item_len` bytes so that the byte
/// `skip` bytes into it lands `align`-aligned from the buffer end.
#[inline]
pub(crate) fn pad_for(len: usize, item_len: usize, skip: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    debug_assert!(skip <= item_len);
    let rem = (len + item_len - skip) % align;
    if rem == 0 { 0 } else { align - rem }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_reverses_into_forward_order() {
        let mut buf = BackBuffer::new();
        buf.prepend(&[3, 4]);
        buf.prepend(&[1, 2]);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.into_bytes(), [1, 2, 3, 4]);
    }

    #[test]
    fn end_offsets_address_from_the_back() {
        let mut buf = BackBuffer::new();
        buf.prepend(&[0xAA; 3]);
        let first_eo = buf.len();
        buf.prepend(&[0xBB; 2]);
        let total = buf.len();
        let bytes = buf.into_bytes();
        // First prepended item sits at the end of the final buffer.
        assert_eq!(&bytes[total - first_eo..], [0xAA; 3]);
    }

    #[test]
    fn alignment_pads_the_item_start() {
        let mut buf = BackBuffer::new();
        buf.prepend(&[1, 2, 3]);
        let pad = buf.align_for(4, 4);
        assert_eq!(pad, 1);
        buf.prepend(&[9; 4]);
        // Start position = total - eo must be 4-aligned once the total is.
        assert_eq!(buf.len() % 4, 0);
    }

    #[test]
    fn interior_alignment_skips_the_prefix() {
        // A 4-byte count followed by 8-byte elements: the element data,
        // not the count, must land on an 8-byte boundary.
        let mut buf = BackBuffer::new();
        buf.prepend(&[0; 6]);
        buf.align_interior(4 + 16, 4, 8);
        let eo = buf.len() + 4 + 16;
        assert_eq!((eo - 4) % 8, 0);
    }
}
