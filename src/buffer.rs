//! Position channel
//!
//! A flat `[x0, y0, x1, y1, ...]` buffer handed back and forth between the
//! render role and the simulation role. The buffer is moved, never cloned,
//! so exactly one side can write to it at any time. Each buffer carries the
//! layout (slot -> node id) it was written with, which lets the reader drop
//! slots for nodes that disappeared while the buffer was away.

use std::sync::Arc;

/// Node ids in buffer slot order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeLayout {
    ids: Vec<String>,
}

impl NodeLayout {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn id(&self, slot: usize) -> Option<&str> {
        self.ids.get(slot).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Exclusively owned coordinate buffer
#[derive(Debug, Default)]
pub struct PositionBuffer {
    coords: Vec<f32>,
    layout: Arc<NodeLayout>,
}

impl PositionBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `nodes` positions
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            coords: Vec::with_capacity(nodes * 2),
            layout: Arc::default(),
        }
    }

    /// Overwrite the buffer with `positions`, written under `layout`.
    ///
    /// The buffer is resized to exactly two floats per layout slot; the
    /// allocation is reused when it is already large enough.
    pub fn write<I>(&mut self, layout: &Arc<NodeLayout>, positions: I)
    where
        I: IntoIterator<Item = (f32, f32)>,
    {
        self.coords.clear();
        for (x, y) in positions.into_iter().take(layout.len()) {
            self.coords.push(x);
            self.coords.push(y);
        }
        self.coords.resize(layout.len() * 2, 0.0);
        self.layout = Arc::clone(layout);
    }

    /// Layout the buffer was last written with
    pub fn layout(&self) -> &Arc<NodeLayout> {
        &self.layout
    }

    /// Number of node slots
    pub fn node_count(&self) -> usize {
        self.coords.len() / 2
    }

    pub fn capacity(&self) -> usize {
        self.coords.capacity()
    }

    /// Position stored in `slot`
    pub fn get(&self, slot: usize) -> Option<(f32, f32)> {
        let x = *self.coords.get(slot * 2)?;
        let y = *self.coords.get(slot * 2 + 1)?;
        Some((x, y))
    }

    /// `(id, x, y)` for every slot that has both an id and a position
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32, f32)> + '_ {
        self.coords
            .chunks_exact(2)
            .zip(self.layout.ids())
            .map(|(xy, id)| (id.as_str(), xy[0], xy[1]))
    }

    /// Flat coordinates
    pub fn as_slice(&self) -> &[f32] {
        &self.coords
    }

    /// Raw native-endian bytes of the coordinates
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(ids: &[&str]) -> Arc<NodeLayout> {
        Arc::new(NodeLayout::new(ids.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn write_sizes_to_two_per_node() {
        let mut buffer = PositionBuffer::new();
        let layout = layout(&["a", "b", "c"]);
        buffer.write(&layout, [(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)]);

        assert_eq!(buffer.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buffer.node_count(), 3);
        assert_eq!(buffer.get(1), Some((3.0, 4.0)));
        assert_eq!(buffer.get(3), None);
    }

    #[test]
    fn write_reuses_allocation_when_shrinking() {
        let mut buffer = PositionBuffer::with_capacity(10);
        let capacity = buffer.capacity();
        buffer.write(&layout(&["a"]), [(1.0, 1.0)]);

        assert_eq!(buffer.as_slice().len(), 2);
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn short_input_is_zero_padded_and_long_input_truncated() {
        let mut buffer = PositionBuffer::new();
        buffer.write(&layout(&["a", "b"]), [(1.0, 1.0)]);
        assert_eq!(buffer.as_slice(), &[1.0, 1.0, 0.0, 0.0]);

        buffer.write(&layout(&["a"]), [(1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(buffer.as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn iter_pairs_ids_with_positions() {
        let mut buffer = PositionBuffer::new();
        buffer.write(&layout(&["a", "b"]), [(1.0, 2.0), (3.0, 4.0)]);

        let items: Vec<_> = buffer.iter().collect();
        assert_eq!(items, vec![("a", 1.0, 2.0), ("b", 3.0, 4.0)]);
    }

    #[test]
    fn bytes_view_covers_all_coordinates() {
        let mut buffer = PositionBuffer::new();
        buffer.write(&layout(&["a", "b"]), [(1.0, 2.0), (3.0, 4.0)]);
        assert_eq!(buffer.as_bytes().len(), 4 * std::mem::size_of::<f32>());
        assert_eq!(&buffer.as_bytes()[..4], &1.0f32.to_ne_bytes());
    }
}
